use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::deadline::ExpireType;
use super::partition::Partition;
use super::priority::Priority;
use super::work_item::StateBelong;

pub const DEFAULT_PAGE_SIZE: u64 = 50;

/// Project/workflow portion of a filter, which is all the state resolver needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub project_id: u64,
    pub issue_types: Vec<String>,
}

/// Query scope handed to an item source. Built once per request; every
/// column works on its own narrowed clone.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub project_id: u64,
    #[serde(default)]
    pub issue_types: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration_id: Option<i64>,
    pub page_no: u64,
    pub page_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub states: Vec<String>,
    #[serde(default)]
    pub state_belongs: Vec<StateBelong>,
    #[serde(default)]
    pub priorities: Vec<Priority>,
    #[serde(default)]
    pub assignees: Vec<String>,
    #[serde(default)]
    pub creators: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    /// Planned-finish lower bound, unix milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_finished_at: Option<i64>,
    /// Planned-finish upper bound, unix milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_finished_at: Option<i64>,
    #[serde(default)]
    pub empty_plan_finished_at: bool,
    /// Source-specific predicates passed through untouched.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl Filter {
    pub fn new(project_id: u64) -> Self {
        Self {
            project_id,
            page_no: 1,
            page_size: DEFAULT_PAGE_SIZE,
            ..Default::default()
        }
    }

    pub fn with_issue_type(mut self, issue_type: impl Into<String>) -> Self {
        self.issue_types = vec![issue_type.into()];
        self
    }

    pub fn with_iteration(mut self, iteration_id: i64) -> Self {
        self.iteration_id = Some(iteration_id);
        self
    }

    pub fn with_page(mut self, page_no: u64, page_size: u64) -> Self {
        self.page_no = page_no;
        self.page_size = page_size;
        self
    }

    /// Number of items before the requested page, or `None` when the page
    /// lies beyond what a `u64` offset can address.
    pub fn page_offset(&self) -> Option<u64> {
        self.page_no.saturating_sub(1).checked_mul(self.page_size)
    }

    pub fn scope(&self) -> Scope {
        Scope {
            project_id: self.project_id,
            issue_types: self.issue_types.clone(),
        }
    }

    /// Copy of this filter restricted to a single column.
    ///
    /// A state column drops any `state_belongs` predicate: it only makes sense
    /// across the whole board and would otherwise empty unrelated columns.
    pub fn narrow_to(&self, partition: &Partition) -> Filter {
        let mut narrowed = self.clone();
        match partition {
            Partition::State { state_id } => {
                narrowed.states = vec![state_id.clone()];
                narrowed.state_belongs.clear();
            }
            Partition::Priority { priority } => {
                narrowed.priorities = vec![*priority];
            }
            Partition::Deadline { bucket, window } => match (bucket, window) {
                (ExpireType::Undefined, _) | (_, None) => {
                    narrowed.empty_plan_finished_at = true;
                    narrowed.start_finished_at = None;
                    narrowed.end_finished_at = None;
                }
                (_, Some(window)) => {
                    let start = window.start.map(|s| s * 1000);
                    narrowed.start_finished_at = match (start, self.start_finished_at) {
                        (Some(s), Some(base)) if s < base => Some(base),
                        (s, base) => s.or(base),
                    };
                    let end = window.end.map(|e| e * 1000);
                    narrowed.end_finished_at = match (end, self.end_finished_at) {
                        (Some(e), Some(base)) if e > base => Some(base),
                        (None, base) => base,
                        (e, _) => e,
                    };
                }
            },
        }
        narrowed
    }
}
