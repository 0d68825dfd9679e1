// Smoothed re-estimation from observed unit pace.

use kairos_types::{DurationMode, WorkItem};

/// Re-estimate planned minutes for a unit-tracked, in-flight,
/// estimate-mode item from its observed pace.
///
/// The 70/30 blend dampens early-sample noise; the logged-minutes floor
/// forbids regressing a plan below work already done. Ineligible items
/// (no units, terminal, fixed or derived mode) return None.
pub fn reestimate(item: &WorkItem) -> Option<i64> {
    if item.status.is_terminal() || item.duration_mode != DurationMode::Estimate {
        return None;
    }
    let units_done = item.units.units_done.unwrap_or(0);
    let units_total = item.units.units_total.unwrap_or(0);
    if units_done <= 0 || units_total <= 0 {
        return None;
    }

    let implied_total = item.logged_min as f64 * units_total as f64 / units_done as f64;
    let blended = 0.7 * item.planned_min as f64 + 0.3 * implied_total;
    Some((blended.round() as i64).max(item.logged_min))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kairos_types::{SessionPolicy, UnitTracking, WorkItemStatus};

    fn item(planned: i64, logged: i64, total: Option<i64>, done: Option<i64>) -> WorkItem {
        WorkItem {
            id: "wi1".into(),
            node_id: "n1".into(),
            seq: 1,
            title: "Read textbook".into(),
            description: String::new(),
            item_type: "reading".into(),
            status: WorkItemStatus::InProgress,
            archived_at: None,
            completed_at: None,
            duration_mode: DurationMode::Estimate,
            planned_min: planned,
            logged_min: logged,
            duration_source: "manual".into(),
            estimate_confidence: 0.5,
            session: SessionPolicy::default(),
            splittable: true,
            units: UnitTracking {
                units_kind: Some("pages".into()),
                units_total: total,
                units_done: done,
            },
            due_date: None,
            not_before: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn blends_seventy_thirty() {
        // 60 logged over 20 of 100 pages implies 300 total;
        // 0.7 * 200 + 0.3 * 300 = 230
        let result = reestimate(&item(200, 60, Some(100), Some(20)));
        assert_eq!(result, Some(230));
    }

    #[test]
    fn never_regresses_below_logged() {
        // Fast pace implies 50 total; blend would give
        // 0.7 * 200 + 0.3 * 50 = 155, still above logged -> kept.
        let result = reestimate(&item(200, 40, Some(100), Some(80)));
        assert_eq!(result, Some(155));

        // Slow plan, heavy logging: blend 0.7*30 + 0.3*120 = 57 < 90 logged
        let result = reestimate(&item(30, 90, Some(40), Some(30)));
        assert_eq!(result, Some(90));
    }

    #[test]
    fn zero_units_pass_through() {
        assert_eq!(reestimate(&item(200, 60, Some(100), Some(0))), None);
        assert_eq!(reestimate(&item(200, 60, Some(0), Some(10))), None);
        assert_eq!(reestimate(&item(200, 60, None, None)), None);
    }

    #[test]
    fn terminal_and_fixed_items_pass_through() {
        let mut done = item(200, 60, Some(100), Some(20));
        done.status = WorkItemStatus::Done;
        done.completed_at = Some(Utc::now());
        assert_eq!(reestimate(&done), None);

        let mut fixed = item(200, 60, Some(100), Some(20));
        fixed.duration_mode = DurationMode::Fixed;
        assert_eq!(reestimate(&fixed), None);

        let mut derived = item(200, 60, Some(100), Some(20));
        derived.duration_mode = DurationMode::Derived;
        assert_eq!(reestimate(&derived), None);
    }

    #[test]
    fn result_is_at_least_logged_for_any_pace() {
        for (planned, logged, total, done) in [
            (10i64, 500i64, 100i64, 99i64),
            (1000, 5, 10, 1),
            (0, 120, 50, 25),
        ] {
            let result = reestimate(&item(planned, logged, Some(total), Some(done))).unwrap();
            assert!(result >= logged, "result {result} below logged {logged}");
        }
    }
}
