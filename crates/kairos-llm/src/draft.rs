// Project draft conversation.
//
// Two states, gathering and ready. Ready means the draft could be
// committed as-is: name and domain present, at least one node, at least
// one work item. Any user edit demotes a ready draft back to gathering
// until the completeness check passes again; only a ready draft can
// finish.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use kairos_types::NodeKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftState {
    Gathering,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftItem {
    pub title: String,
    pub planned_min: Option<i64>,
    pub item_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftNode {
    pub title: String,
    pub kind: NodeKind,
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub items: Vec<DraftItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectDraft {
    pub name: Option<String>,
    pub domain: Option<String>,
    pub short_id: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub target_date: Option<NaiveDate>,
    #[serde(default)]
    pub nodes: Vec<DraftNode>,
}

impl ProjectDraft {
    fn is_complete(&self) -> bool {
        self.name.as_deref().is_some_and(|n| !n.trim().is_empty())
            && self.domain.as_deref().is_some_and(|d| !d.trim().is_empty())
            && !self.nodes.is_empty()
            && self.nodes.iter().any(|n| !n.items.is_empty())
    }
}

/// Incremental update from either the model or the user. None fields
/// leave the draft untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DraftPatch {
    pub name: Option<String>,
    pub domain: Option<String>,
    pub short_id: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub target_date: Option<NaiveDate>,
    /// Replaces the node list when present.
    pub nodes: Option<Vec<DraftNode>>,
}

#[derive(Debug, Clone)]
pub struct DraftConversation {
    state: DraftState,
    draft: ProjectDraft,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DraftError {
    #[error("draft is not ready: {0}")]
    NotReady(String),
}

impl Default for DraftConversation {
    fn default() -> Self {
        Self::new()
    }
}

impl DraftConversation {
    pub fn new() -> Self {
        Self {
            state: DraftState::Gathering,
            draft: ProjectDraft::default(),
        }
    }

    pub fn state(&self) -> DraftState {
        self.state
    }

    pub fn draft(&self) -> &ProjectDraft {
        &self.draft
    }

    /// Apply a patch. Editing always re-enters gathering first; the
    /// draft is promoted back to ready only if the completeness check
    /// passes afterwards.
    pub fn apply(&mut self, patch: DraftPatch) -> DraftState {
        self.state = DraftState::Gathering;
        if let Some(name) = patch.name {
            self.draft.name = Some(name);
        }
        if let Some(domain) = patch.domain {
            self.draft.domain = Some(domain);
        }
        if let Some(short_id) = patch.short_id {
            self.draft.short_id = Some(short_id);
        }
        if let Some(start) = patch.start_date {
            self.draft.start_date = Some(start);
        }
        if let Some(target) = patch.target_date {
            self.draft.target_date = Some(target);
        }
        if let Some(nodes) = patch.nodes {
            self.draft.nodes = nodes;
        }
        if self.draft.is_complete() {
            self.state = DraftState::Ready;
        }
        self.state
    }

    /// Consume the conversation; only a ready draft finishes.
    pub fn finish(self) -> Result<ProjectDraft, DraftError> {
        match self.state {
            DraftState::Ready => Ok(self.draft),
            DraftState::Gathering => {
                let missing = self.missing_summary();
                Err(DraftError::NotReady(missing))
            }
        }
    }

    fn missing_summary(&self) -> String {
        let mut missing = Vec::new();
        if self.draft.name.as_deref().map_or(true, |n| n.trim().is_empty()) {
            missing.push("name");
        }
        if self
            .draft
            .domain
            .as_deref()
            .map_or(true, |d| d.trim().is_empty())
        {
            missing.push("domain");
        }
        if self.draft.nodes.is_empty() {
            missing.push("at least one node");
        } else if self.draft.nodes.iter().all(|n| n.items.is_empty()) {
            missing.push("at least one work item");
        }
        missing.join(", ")
    }
}
