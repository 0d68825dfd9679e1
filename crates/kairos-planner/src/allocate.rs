// Two-pass time allocation.
//
// Pass 1 walks the canonically sorted candidates and, with variation
// enforced, admits at most one slice per project, deferring the rest.
// The extension pass then deepens the pass-1 slices (top-scored first)
// before pass 2 spends whatever budget is left on the deferred
// candidates. The effect: when variation deferred a project's second
// item, spare time first grows the project's best slice instead of
// opening another front.

use std::collections::HashSet;

use kairos_types::{codes, Blocker, ReasonEntry, Slice};

use crate::score::ScoredCandidate;

#[derive(Debug, Clone, Default)]
pub struct AllocationOutcome {
    pub slices: Vec<Slice>,
    pub blockers: Vec<Blocker>,
    pub allocated_min: i64,
}

enum Attempt {
    Alloc(i64),
    Blocked(Blocker),
}

pub fn allocate(
    candidates: &[ScoredCandidate],
    available_min: i64,
    max_slices: usize,
    enforce_variation: bool,
) -> AllocationOutcome {
    let mut outcome = AllocationOutcome::default();
    if available_min <= 0 || max_slices == 0 || candidates.is_empty() {
        return outcome;
    }

    let mut remaining = available_min;
    let mut used_projects: HashSet<String> = HashSet::new();
    let mut deferred: Vec<&ScoredCandidate> = Vec::new();

    // pass 1: variation-first
    for cand in candidates {
        if outcome.slices.len() >= max_slices {
            break;
        }
        if enforce_variation && used_projects.contains(&cand.candidate.project_id) {
            deferred.push(cand);
            continue;
        }
        match try_alloc(cand, remaining) {
            Attempt::Blocked(blocker) => outcome.blockers.push(blocker),
            Attempt::Alloc(alloc) => {
                remaining -= alloc;
                used_projects.insert(cand.candidate.project_id.clone());
                outcome.slices.push(build_slice(cand, alloc));
            }
        }
    }

    // extension pass: deepen existing slices while deferred work waits
    if remaining > 0 && !deferred.is_empty() {
        for slice in outcome.slices.iter_mut() {
            if remaining == 0 {
                break;
            }
            let cap = extension_cap(slice);
            let headroom = cap - slice.alloc_min;
            if headroom <= 0 {
                continue;
            }
            let grow = headroom.min(remaining);
            slice.alloc_min += grow;
            remaining -= grow;
        }
    }

    // pass 2: fill from the deferred candidates, no variation rule
    for cand in deferred {
        if outcome.slices.len() >= max_slices || remaining <= 0 {
            break;
        }
        match try_alloc(cand, remaining) {
            Attempt::Blocked(blocker) => outcome.blockers.push(blocker),
            Attempt::Alloc(alloc) => {
                remaining -= alloc;
                outcome.slices.push(build_slice(cand, alloc));
            }
        }
    }

    for slice in outcome.slices.iter_mut() {
        if slice.alloc_min != slice.session.default_session_min {
            slice.reasons.push(ReasonEntry::new(
                codes::BOUNDS_APPLIED,
                format!(
                    "allocated {} min (default {})",
                    slice.alloc_min, slice.session.default_session_min
                ),
                0.0,
            ));
        }
    }

    outcome.allocated_min = outcome.slices.iter().map(|s| s.alloc_min).sum();
    outcome
}

fn try_alloc(cand: &ScoredCandidate, remaining: i64) -> Attempt {
    let item = &cand.candidate.item;
    let session = item.session;

    if remaining < session.min_session_min {
        return Attempt::Blocked(Blocker {
            entity_id: item.id.clone(),
            entity_title: item.title.clone(),
            code: codes::MIN_SESSION.to_string(),
            message: format!(
                "minimum session of {} min exceeds the {} min still available",
                session.min_session_min, remaining
            ),
        });
    }

    let work_left = item.planned_min - item.logged_min;
    if item.planned_min > 0 && work_left <= 0 {
        return Attempt::Blocked(Blocker {
            entity_id: item.id.clone(),
            entity_title: item.title.clone(),
            code: codes::WORK_COMPLETE.to_string(),
            message: "no planned work remaining".to_string(),
        });
    }

    let upper = session.max_session_min.min(remaining);
    let mut alloc = session.default_session_min.clamp(session.min_session_min, upper);
    if work_left > 0 && work_left < alloc {
        alloc = work_left.clamp(session.min_session_min, upper);
    }
    Attempt::Alloc(alloc)
}

/// How far a pass-1 slice may grow: never past the item's max session,
/// never past its remaining planned work (when it has a plan).
fn extension_cap(slice: &Slice) -> i64 {
    // work_remaining was bounded at allocation time; reconstruct it from
    // the carried fields.
    match slice.work_remaining_min {
        Some(work_left) => slice.session.max_session_min.min(work_left.max(slice.alloc_min)),
        None => slice.session.max_session_min,
    }
}

fn build_slice(cand: &ScoredCandidate, alloc: i64) -> Slice {
    let item = &cand.candidate.item;
    let work_left = item.planned_min - item.logged_min;
    Slice {
        work_item_id: item.id.clone(),
        project_id: cand.candidate.project_id.clone(),
        node_id: cand.candidate.node_id.clone(),
        title: item.title.clone(),
        alloc_min: alloc,
        session: item.session,
        splittable: item.splittable,
        due_date: cand.due_date,
        risk: cand.risk,
        score: cand.score,
        reasons: cand.reasons.clone(),
        work_remaining_min: (item.planned_min > 0).then_some(work_left.max(0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::tests::candidate;
    use crate::score::ScoredCandidate;
    use kairos_types::RiskLevel;

    fn scored(
        id: &str,
        project: &str,
        score: f64,
        planned: i64,
        logged: i64,
    ) -> ScoredCandidate {
        let mut cand = candidate(id, project);
        cand.item.planned_min = planned;
        cand.item.logged_min = logged;
        ScoredCandidate {
            candidate: cand,
            risk: RiskLevel::OnTrack,
            due_date: None,
            score,
            reasons: Vec::new(),
        }
    }

    fn with_bounds(mut s: ScoredCandidate, min: i64, default: i64, max: i64) -> ScoredCandidate {
        s.candidate.item.session.min_session_min = min;
        s.candidate.item.session.default_session_min = default;
        s.candidate.item.session.max_session_min = max;
        s
    }

    #[test]
    fn respects_budget_bounds_and_slice_count() {
        let candidates = vec![
            scored("a", "A", 90.0, 600, 0),
            scored("b", "B", 80.0, 600, 0),
            scored("c", "C", 70.0, 600, 0),
            scored("d", "D", 60.0, 600, 0),
        ];
        let outcome = allocate(&candidates, 70, 2, true);
        assert!(outcome.allocated_min <= 70);
        assert!(outcome.slices.len() <= 2);
        for slice in &outcome.slices {
            assert!(slice.alloc_min >= slice.session.min_session_min);
            assert!(slice.alloc_min <= slice.session.max_session_min);
            assert!(slice.alloc_min > 0);
        }
    }

    #[test]
    fn variation_defers_second_slice_from_same_project() {
        // S2: A(60), A(55), B(40); 90 min; one slice from A, one from B,
        // then the extension grows A's best slice with the leftover.
        let candidates = vec![
            scored("a1", "A", 60.0, 600, 0),
            scored("a2", "A", 55.0, 600, 0),
            scored("b1", "B", 40.0, 600, 0),
        ];
        let outcome = allocate(&candidates, 90, 5, true);
        assert_eq!(outcome.slices.len(), 2);
        assert_eq!(outcome.slices[0].work_item_id, "a1");
        assert_eq!(outcome.slices[1].work_item_id, "b1");
        // a1 grew from the default 30 up to its 60-min max
        assert_eq!(outcome.slices[0].alloc_min, 60);
        assert_eq!(outcome.slices[1].alloc_min, 30);
        assert_eq!(outcome.allocated_min, 90);
    }

    #[test]
    fn extension_respects_max_session_then_fills_deferred() {
        // S3: wi1 (score 80, max 40) and wi2 (score 70, max 60), same
        // project, 90 min: wi1 extends to its 40-min cap, wi2 then
        // fills with a default slice.
        let candidates = vec![
            with_bounds(scored("wi1", "A", 80.0, 600, 0), 15, 30, 40),
            with_bounds(scored("wi2", "A", 70.0, 600, 0), 15, 30, 60),
        ];
        let outcome = allocate(&candidates, 90, 5, true);
        assert_eq!(outcome.slices.len(), 2);
        assert_eq!(outcome.slices[0].work_item_id, "wi1");
        assert_eq!(outcome.slices[0].alloc_min, 40);
        assert_eq!(outcome.slices[1].work_item_id, "wi2");
        assert_eq!(outcome.slices[1].alloc_min, 30);
    }

    #[test]
    fn extension_never_exceeds_remaining_work() {
        let candidates = vec![
            with_bounds(scored("a1", "A", 80.0, 35, 0), 15, 30, 120),
            with_bounds(scored("a2", "A", 70.0, 600, 0), 15, 30, 120),
        ];
        let outcome = allocate(&candidates, 200, 5, true);
        // a1 holds at its 35 planned minutes even with budget to spare
        assert_eq!(outcome.slices[0].work_item_id, "a1");
        assert_eq!(outcome.slices[0].alloc_min, 35);
    }

    #[test]
    fn completed_work_is_blocked_not_sliced() {
        let candidates = vec![scored("a1", "A", 80.0, 60, 60)];
        let outcome = allocate(&candidates, 90, 5, true);
        assert!(outcome.slices.is_empty());
        assert_eq!(outcome.blockers.len(), 1);
        assert_eq!(outcome.blockers[0].code, codes::WORK_COMPLETE);
    }

    #[test]
    fn min_session_above_budget_is_blocked() {
        let candidates = vec![with_bounds(scored("a1", "A", 80.0, 600, 0), 45, 60, 90)];
        let outcome = allocate(&candidates, 30, 5, true);
        assert!(outcome.slices.is_empty());
        assert_eq!(outcome.blockers.len(), 1);
        assert_eq!(outcome.blockers[0].code, codes::MIN_SESSION);
    }

    #[test]
    fn small_remaining_work_shrinks_the_slice() {
        // 20 minutes of work left with a 30-min default: the slice is
        // cut to the work, floored at the session minimum.
        let candidates = vec![with_bounds(scored("a1", "A", 80.0, 100, 80), 15, 30, 60)];
        let outcome = allocate(&candidates, 90, 5, true);
        assert_eq!(outcome.slices.len(), 1);
        assert_eq!(outcome.slices[0].alloc_min, 20);
        assert!(outcome.slices[0]
            .reasons
            .iter()
            .any(|r| r.code == codes::BOUNDS_APPLIED));
    }

    #[test]
    fn no_variation_packs_one_project() {
        let candidates = vec![
            scored("a1", "A", 80.0, 600, 0),
            scored("a2", "A", 70.0, 600, 0),
            scored("a3", "A", 60.0, 600, 0),
        ];
        let outcome = allocate(&candidates, 90, 5, false);
        assert_eq!(outcome.slices.len(), 3);
        assert_eq!(outcome.allocated_min, 90);
    }

    #[test]
    fn zero_budget_allocates_nothing() {
        let candidates = vec![scored("a1", "A", 80.0, 600, 0)];
        let outcome = allocate(&candidates, 0, 5, true);
        assert!(outcome.slices.is_empty());
        assert_eq!(outcome.allocated_min, 0);
    }

    #[test]
    fn bounds_annotation_marks_non_default_allocations() {
        let candidates = vec![
            scored("a1", "A", 80.0, 600, 0),
            scored("a2", "A", 70.0, 600, 0),
        ];
        let outcome = allocate(&candidates, 90, 5, true);
        // a1 extended past the default -> annotated; pass-2 a2 at the
        // default -> not annotated
        assert!(outcome.slices[0]
            .reasons
            .iter()
            .any(|r| r.code == codes::BOUNDS_APPLIED));
        assert!(!outcome.slices[1]
            .reasons
            .iter()
            .any(|r| r.code == codes::BOUNDS_APPLIED));
    }
}
