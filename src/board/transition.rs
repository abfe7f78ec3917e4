use tracing::{debug, info};

use super::Board;
use crate::error::BoardError;
use crate::model::{AggregateResult, BoardKind, Filter, Partition, PartitionKey, PartitionKeyId};
use crate::providers::Actor;

impl Board {
    /// Move one item into `target` with a single sink call, then re-read the
    /// whole board. Nothing is re-read when the move fails.
    ///
    /// Legality is not checked here; the source already evaluated it when it
    /// attached transitions to the item.
    pub async fn move_item(
        &self,
        base: &Filter,
        ordered: &[PartitionKey],
        item_id: &str,
        target: &PartitionKeyId,
        actor: &Actor,
    ) -> Result<AggregateResult, BoardError> {
        let key = movable_key(ordered, target)?;

        self.sink
            .transition(item_id, &key.partition, actor)
            .await
            .map_err(|source| BoardError::TransitionFailed {
                item_id: item_id.to_string(),
                target: target.clone(),
                source,
            })?;
        info!(item = item_id, target = %target, actor = %actor.user_id, "item moved");

        self.aggregate(base, ordered, &[]).await
    }

    /// Drop `item_id`, currently shown in column `from`, onto `target`.
    /// Dropping an item back onto its own column re-reads the board without
    /// calling the sink.
    pub async fn drag_item(
        &self,
        base: &Filter,
        ordered: &[PartitionKey],
        item_id: &str,
        from: &PartitionKeyId,
        target: &PartitionKeyId,
        actor: &Actor,
    ) -> Result<AggregateResult, BoardError> {
        if from != target {
            return self.move_item(base, ordered, item_id, target, actor).await;
        }
        movable_key(ordered, target)?;
        debug!(item = item_id, target = %target, "item already in target column");
        self.aggregate(base, ordered, &[]).await
    }
}

fn movable_key<'a>(
    ordered: &'a [PartitionKey],
    target: &PartitionKeyId,
) -> Result<&'a PartitionKey, BoardError> {
    let key = ordered
        .iter()
        .find(|k| &k.id == target)
        .ok_or_else(|| BoardError::UnknownPartition {
            key: target.clone(),
        })?;
    if matches!(key.partition, Partition::Deadline { .. }) {
        return Err(BoardError::UnsupportedTransition {
            kind: BoardKind::Deadline,
        });
    }
    Ok(key)
}
