use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::board::BoardConfig;
use crate::model::{BoardKind, Filter};

#[derive(Debug, Deserialize, Default)]
pub struct AppConfig {
    pub source: Option<SourceConfig>,
    #[serde(default)]
    pub board: BoardSettings,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    Issues(IssuesConfig),
    Jira(JiraConfig),
    Local(LocalConfig),
}

#[derive(Debug, Deserialize)]
pub struct IssuesConfig {
    pub base_url: String,
    #[serde(default)]
    pub org_id: Option<i64>,
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct JiraConfig {
    pub domain: String,
    pub email: String,
    pub api_token: String,
    pub project_key: String,
}

#[derive(Debug, Deserialize)]
pub struct LocalConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BoardSettings {
    pub project_id: u64,
    pub kind: BoardKind,
    pub issue_type: String,
    pub iteration_id: Option<i64>,
    pub page_size: u64,
    pub max_concurrent_fetches: usize,
    pub fetch_timeout_secs: u64,
    pub actor: Option<String>,
}

impl Default for BoardSettings {
    fn default() -> Self {
        let engine = BoardConfig::default();
        Self {
            project_id: 0,
            kind: BoardKind::Status,
            issue_type: "TASK".into(),
            iteration_id: None,
            page_size: engine.page_size,
            max_concurrent_fetches: engine.max_concurrent_fetches,
            fetch_timeout_secs: engine.fetch_timeout.as_secs(),
            actor: None,
        }
    }
}

impl BoardSettings {
    pub fn engine_config(&self) -> BoardConfig {
        BoardConfig {
            page_size: self.page_size.max(1),
            max_concurrent_fetches: self.max_concurrent_fetches.max(1),
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs.max(1)),
        }
    }

    /// Base filter for a render with no user-supplied predicates.
    pub fn base_filter(&self) -> Filter {
        let mut filter = Filter::new(self.project_id)
            .with_issue_type(self.issue_type.clone())
            .with_page(1, self.page_size.max(1));
        filter.iteration_id = self.iteration_id;
        filter
    }
}

pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os("KANBAN_CONFIG") {
        return PathBuf::from(path);
    }
    data_dir().join("config.toml")
}

pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".kanban")
}

pub fn load_config() -> Result<AppConfig> {
    load_config_from(&config_path())
}

pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let config: AppConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(config)
}
