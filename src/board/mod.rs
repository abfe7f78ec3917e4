//! The board engine: resolve columns, fetch them concurrently, replay them in
//! column order, and apply single-item moves.

pub mod aggregate;
pub mod fetch;
pub mod operations;
pub mod refresh;
pub mod resolver;
pub mod transition;


use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::BoardError;
use crate::model::{BoardKind, BoardView, Filter, UserInfo, DEFAULT_PAGE_SIZE};
use crate::providers::{IdentityResolver, ItemSource, StateResolver, TransitionSink};

pub use aggregate::Phase;
pub use fetch::FetchedColumn;
pub use operations::OperationSwitch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardConfig {
    /// Page size used when the base filter leaves it at zero.
    pub page_size: u64,
    /// Upper bound on concurrent calls to the item source.
    pub max_concurrent_fetches: usize,
    /// Deadline shared by every fetch of one aggregation.
    pub fetch_timeout: Duration,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_concurrent_fetches: 8,
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

/// Owns the collaborators. Holds no board state between calls.
#[derive(Clone)]
pub struct Board {
    source: Arc<dyn ItemSource>,
    states: Arc<dyn StateResolver>,
    sink: Arc<dyn TransitionSink>,
    identities: Option<Arc<dyn IdentityResolver>>,
    config: BoardConfig,
}

impl Board {
    pub fn new(
        source: Arc<dyn ItemSource>,
        states: Arc<dyn StateResolver>,
        sink: Arc<dyn TransitionSink>,
    ) -> Self {
        Self {
            source,
            states,
            sink,
            identities: None,
            config: BoardConfig::default(),
        }
    }

    /// Wire one provider that implements every collaborator role.
    pub fn from_provider<P>(provider: Arc<P>) -> Self
    where
        P: ItemSource + StateResolver + TransitionSink + IdentityResolver + 'static,
    {
        Self {
            source: provider.clone(),
            states: provider.clone(),
            sink: provider.clone(),
            identities: Some(provider),
            config: BoardConfig::default(),
        }
    }

    pub fn with_config(mut self, config: BoardConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_identity_resolver(mut self, identities: Arc<dyn IdentityResolver>) -> Self {
        self.identities = Some(identities);
        self
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Resolve columns, aggregate every one of them, then resolve the
    /// referenced users with a single identity call.
    pub async fn render(&self, kind: BoardKind, base: &Filter) -> Result<BoardView, BoardError> {
        let keys = self.resolve(kind, &base.scope()).await?;
        let result = self.aggregate(base, &keys, &[]).await?;
        let users = self.identify(&result.user_ids).await?;
        Ok(BoardView { result, users })
    }

    pub async fn identify(&self, user_ids: &[String]) -> Result<Vec<UserInfo>, BoardError> {
        let Some(identities) = &self.identities else {
            return Ok(vec![]);
        };
        if user_ids.is_empty() {
            return Ok(vec![]);
        }
        debug!(count = user_ids.len(), "resolving users");
        identities
            .resolve_users(user_ids)
            .await
            .map_err(|source| BoardError::IdentityLookupFailed { source })
    }

    /// Fill in paging the caller left unset.
    fn normalize(&self, base: &Filter) -> Filter {
        let mut filter = base.clone();
        if filter.page_no == 0 {
            filter.page_no = 1;
        }
        if filter.page_size == 0 {
            filter.page_size = self.config.page_size;
        }
        filter
    }
}
