//! Fan-out/fan-in over the selected columns.
//!
//! Every fetch runs in its own task and writes its outcome into one shared map.
//! The map lock is held only for that insert. All tasks are joined before the
//! aggregator reports anything, including on failure and cancellation, and the
//! columns are then replayed in resolver order.

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::fetch::{fetch_partition, FetchedColumn};
use super::operations::OperationSwitch;
use super::Board;
use crate::error::BoardError;
use crate::model::{AggregateResult, Filter, PartitionKey, PartitionKeyId};
use crate::providers::ItemSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    FanningOut,
    Joining,
    Done,
    Failed,
}

type Outcomes = Arc<Mutex<HashMap<PartitionKeyId, Result<FetchedColumn, BoardError>>>>;

impl Board {
    /// Aggregate `ordered`, or only the keys in `restrict_to` when it is
    /// non-empty. Fails if any selected column fails.
    pub async fn aggregate(
        &self,
        base: &Filter,
        ordered: &[PartitionKey],
        restrict_to: &[PartitionKeyId],
    ) -> Result<AggregateResult, BoardError> {
        self.aggregate_with_cancel(base, ordered, restrict_to, &CancellationToken::new())
            .await
    }

    pub async fn aggregate_with_cancel(
        &self,
        base: &Filter,
        ordered: &[PartitionKey],
        restrict_to: &[PartitionKeyId],
        cancel: &CancellationToken,
    ) -> Result<AggregateResult, BoardError> {
        let mut phase = Phase::Idle;
        let selected = select_keys(ordered, restrict_to)?;
        let refresh_board = restrict_to.is_empty();
        if selected.is_empty() {
            return Ok(AggregateResult {
                columns: vec![],
                user_ids: vec![],
                refresh_board,
            });
        }

        let base = self.normalize(base);
        let outcomes: Outcomes = Arc::new(Mutex::new(HashMap::with_capacity(selected.len())));
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_fetches.max(1)));
        let timeout = self.config.fetch_timeout;
        let deadline = Instant::now() + timeout;

        advance(&mut phase, Phase::FanningOut, selected.len());
        let mut tasks = JoinSet::new();
        for key in &selected {
            let key = key.clone();
            let switch = OperationSwitch::for_kind(key.partition.board_kind());
            let filter = base.clone();
            let source = Arc::clone(&self.source);
            let outcomes = Arc::clone(&outcomes);
            let permits = Arc::clone(&permits);
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let outcome =
                    run_fetch(source, &filter, &key, switch, permits, &cancel, deadline, timeout)
                        .await;
                outcomes.lock().await.insert(key.id, outcome);
            });
        }

        advance(&mut phase, Phase::Joining, selected.len());
        let mut join_error = None;
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                join_error.get_or_insert(err);
            }
        }

        if let Some(err) = join_error {
            advance(&mut phase, Phase::Failed, selected.len());
            return Err(BoardError::TaskJoin(err));
        }

        let mut outcomes = std::mem::take(&mut *outcomes.lock().await);
        let mut columns = Vec::with_capacity(selected.len());
        let mut failures = Vec::new();
        for key in &selected {
            match outcomes.remove(&key.id) {
                Some(Ok(column)) => columns.push(column),
                Some(Err(err)) => failures.push(err),
                None => {
                    advance(&mut phase, Phase::Failed, selected.len());
                    return Err(BoardError::MissingPartition {
                        key: key.id.clone(),
                    });
                }
            }
        }

        if !failures.is_empty() {
            advance(&mut phase, Phase::Failed, selected.len());
            return Err(reduce_failures(failures));
        }

        let result = replay(columns, refresh_board);
        advance(&mut phase, Phase::Done, selected.len());
        Ok(result)
    }
}

fn advance(phase: &mut Phase, next: Phase, columns: usize) {
    debug!(from = ?*phase, to = ?next, columns, "aggregation phase");
    *phase = next;
}

/// Keys to fetch, in resolver order.
fn select_keys(
    ordered: &[PartitionKey],
    restrict_to: &[PartitionKeyId],
) -> Result<Vec<PartitionKey>, BoardError> {
    if let Some(unknown) = restrict_to
        .iter()
        .find(|id| !ordered.iter().any(|k| &k.id == *id))
    {
        return Err(BoardError::UnknownPartition {
            key: unknown.clone(),
        });
    }

    let mut seen = HashSet::new();
    Ok(ordered
        .iter()
        .filter(|k| restrict_to.is_empty() || restrict_to.contains(&k.id))
        .filter(|k| seen.insert(k.id.clone()))
        .cloned()
        .collect())
}

#[allow(clippy::too_many_arguments)]
async fn run_fetch(
    source: Arc<dyn ItemSource>,
    filter: &Filter,
    key: &PartitionKey,
    switch: OperationSwitch,
    permits: Arc<Semaphore>,
    cancel: &CancellationToken,
    deadline: Instant,
    timeout: Duration,
) -> Result<FetchedColumn, BoardError> {
    let work = async {
        let _permit = permits
            .acquire()
            .await
            .map_err(|_| BoardError::Cancelled)?;
        fetch_partition(source.as_ref(), filter, key, switch).await
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(BoardError::Cancelled),
        outcome = timeout_at(deadline, AssertUnwindSafe(work).catch_unwind()) => match outcome {
            Err(_) => {
                warn!(key = %key.id, ?timeout, "column fetch timed out");
                Err(BoardError::DeadlineExceeded {
                    key: key.id.clone(),
                    timeout,
                })
            }
            Ok(Err(_)) => {
                warn!(key = %key.id, "column fetch panicked");
                Err(BoardError::FetchPanicked { key: key.id.clone() })
            }
            Ok(Ok(result)) => result,
        },
    }
}

/// Collapse concurrent failures into one error. `failures` is in resolver
/// order and non-empty. Cancellation wins over everything else.
fn reduce_failures(mut failures: Vec<BoardError>) -> BoardError {
    if failures.iter().any(|e| matches!(e, BoardError::Cancelled)) {
        return BoardError::Cancelled;
    }
    if failures.len() == 1 {
        return failures.remove(0);
    }
    let failed = failures
        .iter()
        .filter_map(|e| e.partition().cloned())
        .collect();
    BoardError::FetchesFailed {
        failed,
        first: Box::new(failures.remove(0)),
    }
}

/// Build the result in resolver order. An item already placed in an earlier
/// column is dropped from later ones.
fn replay(columns: Vec<FetchedColumn>, refresh_board: bool) -> AggregateResult {
    let mut placed = HashSet::new();
    let mut user_ids: Vec<String> = Vec::new();
    let mut containers = Vec::with_capacity(columns.len());

    for FetchedColumn {
        mut container,
        user_ids: column_users,
    } in columns
    {
        let key = container.key.id.clone();
        container.cards.retain(|card| {
            if placed.insert(card.item.id.clone()) {
                true
            } else {
                warn!(key = %key, item = %card.item.id, "dropping item already placed in an earlier column");
                false
            }
        });
        for uid in column_users {
            if !user_ids.contains(&uid) {
                user_ids.push(uid);
            }
        }
        containers.push(container);
    }

    AggregateResult {
        columns: containers,
        user_ids,
        refresh_board,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(ids: &[&str]) -> Vec<PartitionKey> {
        ids.iter().map(|id| PartitionKey::state(*id, *id)).collect()
    }

    #[test]
    fn select_keys_keeps_resolver_order() {
        let ordered = keys(&["a", "b", "c"]);
        let selected = select_keys(&ordered, &["c".into(), "a".into()]).unwrap();
        let ids: Vec<_> = selected.iter().map(|k| k.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn select_keys_rejects_unknown_restriction() {
        let err = select_keys(&keys(&["a"]), &["z".into()]).unwrap_err();
        assert!(matches!(err, BoardError::UnknownPartition { key } if key.as_str() == "z"));
    }

    #[test]
    fn reduce_prefers_cancellation() {
        let err = reduce_failures(vec![
            BoardError::FetchPanicked { key: "a".into() },
            BoardError::Cancelled,
        ]);
        assert!(matches!(err, BoardError::Cancelled));
    }

    #[test]
    fn reduce_keeps_single_failure_as_is() {
        let err = reduce_failures(vec![BoardError::FetchPanicked { key: "b".into() }]);
        assert!(matches!(err, BoardError::FetchPanicked { key } if key.as_str() == "b"));
    }

    #[test]
    fn reduce_reports_first_in_resolver_order() {
        let err = reduce_failures(vec![
            BoardError::FetchPanicked { key: "a".into() },
            BoardError::DeadlineExceeded {
                key: "c".into(),
                timeout: Duration::from_secs(1),
            },
        ]);
        match err {
            BoardError::FetchesFailed { failed, first } => {
                assert_eq!(failed, vec![PartitionKeyId::from("a"), PartitionKeyId::from("c")]);
                assert!(matches!(*first, BoardError::FetchPanicked { .. }));
            }
            other => panic!("expected FetchesFailed, got {other:?}"),
        }
    }
}
