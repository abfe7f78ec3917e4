use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::partition::PartitionKeyId;
use super::priority::Priority;

/// Coarse lifecycle bucket a workflow state belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StateBelong {
    Open,
    Working,
    Done,
    Wontfix,
    Reopen,
    Resolved,
    Closed,
}

/// A state the source says the item may move to, and whether the current
/// user is permitted to perform that move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionButton {
    pub state_id: String,
    pub state_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_belong: Option<StateBelong>,
    pub permission: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Issue type, e.g. `TASK` or `BUG`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_type: Option<String>,
    /// Workflow state id the item currently sits in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub labels: Vec<Label>,
    /// Transition buttons as evaluated by the source. Never recomputed here.
    #[serde(default)]
    pub transitions: Vec<TransitionButton>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl WorkItem {
    /// Partition keys the source allows this item to move to next.
    pub fn allowed_targets(&self) -> Vec<PartitionKeyId> {
        self.transitions
            .iter()
            .filter(|t| t.permission)
            .map(|t| PartitionKeyId::from(t.state_id.as_str()))
            .collect()
    }
}
