use std::collections::HashSet;

use tracing::{debug, warn};

use super::operations::OperationSwitch;
use super::Board;
use crate::error::BoardError;
use crate::model::{Card, Filter, PartitionContainer, PartitionKey};
use crate::providers::ItemSource;

/// One fetched column plus the user ids its page referenced.
#[derive(Debug, Clone)]
pub struct FetchedColumn {
    pub container: PartitionContainer,
    pub user_ids: Vec<String>,
}

impl Board {
    /// Fetch a single column without going through the aggregator.
    pub async fn fetch_one(
        &self,
        base: &Filter,
        key: &PartitionKey,
    ) -> Result<FetchedColumn, BoardError> {
        let filter = self.normalize(base);
        let switch = OperationSwitch::for_kind(key.partition.board_kind());
        fetch_partition(self.source.as_ref(), &filter, key, switch).await
    }
}

/// Call the source once for `key` and build its container.
///
/// Duplicate ids within the page keep their first occurrence.
pub(crate) async fn fetch_partition(
    source: &dyn ItemSource,
    base: &Filter,
    key: &PartitionKey,
    switch: OperationSwitch,
) -> Result<FetchedColumn, BoardError> {
    let filter = base.narrow_to(&key.partition);
    let page = source.page(&filter).await.map_err(|source| {
        warn!(key = %key.id, error = %source, "column fetch failed");
        BoardError::PartitionFetchFailed {
            key: key.id.clone(),
            source,
        }
    })?;

    let mut seen = HashSet::new();
    let mut cards = Vec::with_capacity(page.items.len());
    for item in page.items {
        if !seen.insert(item.id.clone()) {
            warn!(key = %key.id, item = %item.id, "dropping duplicate item within column");
            continue;
        }
        let operations = switch.item_operations(&item, key);
        cards.push(Card { item, operations });
    }

    let mut user_ids = Vec::new();
    let assignees = cards.iter().filter_map(|c| c.item.assignee.clone());
    for uid in page.user_ids.into_iter().chain(assignees) {
        if !uid.is_empty() && !user_ids.contains(&uid) {
            user_ids.push(uid);
        }
    }

    debug!(key = %key.id, items = cards.len(), total = page.total, "fetched column");

    Ok(FetchedColumn {
        container: PartitionContainer {
            key: key.clone(),
            cards,
            page_no: filter.page_no,
            page_size: filter.page_size,
            total: page.total,
            operations: switch.container_operations(key),
        },
        user_ids,
    })
}
