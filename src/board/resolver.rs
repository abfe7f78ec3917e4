use std::collections::HashSet;

use chrono::Local;

use super::Board;
use crate::error::BoardError;
use crate::model::{BoardKind, ExpireType, PartitionKey, Priority, Scope};
use crate::providers::StateGroup;

impl Board {
    /// Ordered column keys for a board of `kind`.
    pub async fn resolve(
        &self,
        kind: BoardKind,
        scope: &Scope,
    ) -> Result<Vec<PartitionKey>, BoardError> {
        match kind {
            BoardKind::Status => {
                if scope.issue_types.len() != 1 {
                    return Err(BoardError::InvalidScope(format!(
                        "a status board needs exactly one issue type, got {}",
                        scope.issue_types.len()
                    )));
                }
                let groups = self.states.resolve_states(scope).await.map_err(|source| {
                    BoardError::StateLookupFailed {
                        project_id: scope.project_id,
                        source,
                    }
                })?;
                Ok(status_keys(groups))
            }
            BoardKind::Priority => Ok(priority_keys()),
            BoardKind::Deadline => Ok(deadline_keys(local_midnight())),
        }
    }
}

/// Workflow order: groups in order, states in group order. Repeated state
/// ids keep their first position.
pub fn status_keys(groups: Vec<StateGroup>) -> Vec<PartitionKey> {
    let mut seen = HashSet::new();
    groups
        .into_iter()
        .flat_map(|g| g.states)
        .filter(|s| seen.insert(s.id.clone()))
        .map(|s| PartitionKey::state(s.id, s.name))
        .collect()
}

pub fn priority_keys() -> Vec<PartitionKey> {
    Priority::ALL.into_iter().map(PartitionKey::priority).collect()
}

pub fn deadline_keys(midnight: i64) -> Vec<PartitionKey> {
    ExpireType::ALL
        .into_iter()
        .map(|bucket| PartitionKey::deadline(bucket, midnight))
        .collect()
}

/// Today's local midnight in unix seconds.
pub fn local_midnight() -> i64 {
    let now = Local::now();
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|dt| dt.and_local_timezone(Local).earliest())
        .map(|dt| dt.timestamp())
        .unwrap_or_else(|| now.timestamp())
}
