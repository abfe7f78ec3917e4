use tracing::warn;

use super::Board;
use crate::error::BoardError;
use crate::model::{AggregateResult, Filter, PartitionKey, PartitionKeyId};

impl Board {
    /// Re-fetch a single column. The result has `refresh_board == false`
    /// and holds only that column.
    pub async fn refresh_one(
        &self,
        base: &Filter,
        ordered: &[PartitionKey],
        key: &PartitionKeyId,
    ) -> Result<AggregateResult, BoardError> {
        self.aggregate(base, ordered, std::slice::from_ref(key)).await
    }

    /// Refresh `key` and splice it into `previous`. On failure `previous`
    /// is left exactly as rendered.
    pub async fn refresh_into(
        &self,
        previous: &mut AggregateResult,
        base: &Filter,
        ordered: &[PartitionKey],
        key: &PartitionKeyId,
    ) -> Result<(), BoardError> {
        match self.refresh_one(base, ordered, key).await {
            Ok(refreshed) => {
                previous.splice(refreshed);
                Ok(())
            }
            Err(err) => {
                warn!(key = %key, error = %err, "column refresh failed, keeping previous column");
                Err(err)
            }
        }
    }
}
