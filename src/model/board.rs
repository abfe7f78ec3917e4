use serde::{Deserialize, Serialize};

use super::partition::{PartitionKey, PartitionKeyId};
use super::work_item::WorkItem;

/// Something the user can do with a card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum ItemOperation {
    MoveTo {
        target: PartitionKeyId,
        text: String,
        disabled: bool,
    },
    Drag {
        targets: Vec<PartitionKeyId>,
        disabled: bool,
    },
}

/// Something the user can do with a whole column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum ContainerOperation {
    /// Fetch another page of this column only.
    ChangePageNo { kanban_key: PartitionKeyId },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    #[serde(flatten)]
    pub item: WorkItem,
    #[serde(default)]
    pub operations: Vec<ItemOperation>,
}

/// One board column: the items of a single partition key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionContainer {
    pub key: PartitionKey,
    pub cards: Vec<Card>,
    pub page_no: u64,
    pub page_size: u64,
    pub total: u64,
    #[serde(default)]
    pub operations: Vec<ContainerOperation>,
}

impl PartitionContainer {
    pub fn contains(&self, item_id: &str) -> bool {
        self.cards.iter().any(|c| c.item.id == item_id)
    }

    pub fn item_ids(&self) -> Vec<&str> {
        self.cards.iter().map(|c| c.item.id.as_str()).collect()
    }
}

/// Columns in resolver order plus every user id the cards reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResult {
    pub columns: Vec<PartitionContainer>,
    pub user_ids: Vec<String>,
    /// `false` when only a subset of columns was fetched.
    pub refresh_board: bool,
}

impl AggregateResult {
    pub fn column(&self, key: &PartitionKeyId) -> Option<&PartitionContainer> {
        self.columns.iter().find(|c| &c.key.id == key)
    }

    pub fn keys(&self) -> Vec<&PartitionKeyId> {
        self.columns.iter().map(|c| &c.key.id).collect()
    }

    /// Replace columns of `self` with the same-keyed columns of `refreshed`.
    /// Columns `self` does not already have are ignored; user ids are merged.
    pub fn splice(&mut self, refreshed: AggregateResult) {
        for column in refreshed.columns {
            if let Some(slot) = self.columns.iter_mut().find(|c| c.key.id == column.key.id) {
                *slot = column;
            }
        }
        for uid in refreshed.user_ids {
            if !self.user_ids.contains(&uid) {
                self.user_ids.push(uid);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nick: Option<String>,
}

/// A completed aggregation together with resolved user metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardView {
    #[serde(flatten)]
    pub result: AggregateResult,
    pub users: Vec<UserInfo>,
}
