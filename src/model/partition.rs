use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::deadline::{DeadlineWindow, ExpireType};
use super::priority::Priority;

/// Opaque column identifier: a workflow state id, a priority name, or a
/// deadline bucket name depending on the board kind.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionKeyId(String);

impl PartitionKeyId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PartitionKeyId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PartitionKeyId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for PartitionKeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoardKind {
    #[default]
    Status,
    Priority,
    Deadline,
}

impl BoardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoardKind::Status => "status",
            BoardKind::Priority => "priority",
            BoardKind::Deadline => "deadline",
        }
    }
}

impl fmt::Display for BoardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BoardKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "status" | "state" => Ok(BoardKind::Status),
            "priority" => Ok(BoardKind::Priority),
            "deadline" | "time" => Ok(BoardKind::Deadline),
            other => Err(format!(
                "unknown board kind '{other}', expected status, priority or deadline"
            )),
        }
    }
}

/// The predicate a column substitutes into the base filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Partition {
    State {
        state_id: String,
    },
    Priority {
        priority: Priority,
    },
    Deadline {
        bucket: ExpireType,
        #[serde(skip_serializing_if = "Option::is_none")]
        window: Option<DeadlineWindow>,
    },
}

impl Partition {
    pub fn board_kind(&self) -> BoardKind {
        match self {
            Partition::State { .. } => BoardKind::Status,
            Partition::Priority { .. } => BoardKind::Priority,
            Partition::Deadline { .. } => BoardKind::Deadline,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionKey {
    pub id: PartitionKeyId,
    pub label: String,
    pub partition: Partition,
}

impl PartitionKey {
    pub fn state(id: impl Into<String>, label: impl Into<String>) -> Self {
        let state_id = id.into();
        Self {
            id: PartitionKeyId::from(state_id.as_str()),
            label: label.into(),
            partition: Partition::State { state_id },
        }
    }

    pub fn priority(priority: Priority) -> Self {
        Self {
            id: PartitionKeyId::from(priority.as_str()),
            label: priority.display_name().to_string(),
            partition: Partition::Priority { priority },
        }
    }

    pub fn deadline(bucket: ExpireType, midnight: i64) -> Self {
        Self {
            id: PartitionKeyId::from(bucket.as_str()),
            label: bucket.display_name().to_string(),
            partition: Partition::Deadline {
                bucket,
                window: bucket.window(midnight),
            },
        }
    }
}
