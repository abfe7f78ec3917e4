pub mod issues;
pub mod jira;
pub mod local;

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::board::Board;
use crate::config::{AppConfig, SourceConfig};
use crate::model::{Filter, Partition, Scope, StateBelong, UserInfo, WorkItem};

/// One page of items for a single column.
#[derive(Debug, Clone, Default)]
pub struct ItemPage {
    pub items: Vec<WorkItem>,
    pub total: u64,
    /// User ids the source wants resolved alongside the items.
    pub user_ids: Vec<String>,
}

/// Workflow states sharing a lifecycle bucket, in workflow order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_belong: Option<StateBelong>,
    pub states: Vec<StateName>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateName {
    pub id: String,
    pub name: String,
}

/// The user on whose behalf a mutation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: String,
}

impl Actor {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

#[async_trait]
pub trait ItemSource: Send + Sync {
    fn name(&self) -> &str;
    /// Items matching `filter`, which always names exactly one column.
    async fn page(&self, filter: &Filter) -> Result<ItemPage>;
}

#[async_trait]
pub trait StateResolver: Send + Sync {
    async fn resolve_states(&self, scope: &Scope) -> Result<Vec<StateGroup>>;
}

#[async_trait]
pub trait TransitionSink: Send + Sync {
    /// Apply one change moving `item_id` into `target`.
    async fn transition(&self, item_id: &str, target: &Partition, actor: &Actor) -> Result<()>;
}

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve_users(&self, user_ids: &[String]) -> Result<Vec<UserInfo>>;
}

#[cfg(test)]
pub mod tests;

pub fn create_board(config: &AppConfig) -> Result<Board> {
    let board_config = config.board.engine_config();
    let board = match &config.source {
        Some(SourceConfig::Issues(cfg)) => Board::from_provider(Arc::new(
            issues::IssueServiceProvider::new(cfg.base_url.clone(), cfg.org_id, cfg.user_id.clone()),
        )),
        Some(SourceConfig::Jira(cfg)) => Board::from_provider(Arc::new(jira::JiraProvider::new(
            cfg.domain.clone(),
            cfg.email.clone(),
            cfg.api_token.clone(),
            cfg.project_key.clone(),
        ))),
        Some(SourceConfig::Local(cfg)) => {
            Board::from_provider(Arc::new(local::LocalProvider::open(&cfg.path)?))
        }
        None => bail!(
            "No item source configured. Add a [source] table to {}",
            crate::config::config_path().display()
        ),
    };
    Ok(board.with_config(board_config))
}
