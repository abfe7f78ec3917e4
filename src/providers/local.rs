use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{
    Actor, IdentityResolver, ItemPage, ItemSource, StateGroup, StateResolver, TransitionSink,
};
use crate::model::{
    Filter, Partition, Scope, StateBelong, TransitionButton, UserInfo, WorkItem,
};

/// Board contents as stored on disk.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub states: Vec<StateGroup>,
    #[serde(default)]
    pub items: Vec<WorkItem>,
    #[serde(default)]
    pub users: Vec<UserInfo>,
}

impl Snapshot {
    fn belong_of(&self, state_id: &str) -> Option<StateBelong> {
        self.states
            .iter()
            .find(|g| g.states.iter().any(|s| s.id == state_id))
            .and_then(|g| g.state_belong)
    }

    fn has_state(&self, state_id: &str) -> bool {
        self.states
            .iter()
            .any(|g| g.states.iter().any(|s| s.id == state_id))
    }

    fn matches(&self, item: &WorkItem, filter: &Filter) -> bool {
        let any_of = |wanted: &[String], value: Option<&String>| {
            wanted.is_empty() || value.is_some_and(|v| wanted.contains(v))
        };

        if !any_of(&filter.issue_types, item.item_type.as_ref()) {
            return false;
        }
        if !any_of(&filter.states, item.state.as_ref()) {
            return false;
        }
        if !any_of(&filter.assignees, item.assignee.as_ref()) {
            return false;
        }
        if filter.iteration_id.is_some() && filter.iteration_id != item.iteration_id {
            return false;
        }
        if !filter.state_belongs.is_empty() {
            let belong = item.state.as_deref().and_then(|s| self.belong_of(s));
            if !belong.is_some_and(|b| filter.state_belongs.contains(&b)) {
                return false;
            }
        }
        if !filter.priorities.is_empty()
            && !item.priority.is_some_and(|p| filter.priorities.contains(&p))
        {
            return false;
        }
        if !filter.labels.is_empty()
            && !item.labels.iter().any(|l| filter.labels.contains(&l.name))
        {
            return false;
        }
        if let Some(title) = &filter.title {
            if !item.title.to_lowercase().contains(&title.to_lowercase()) {
                return false;
            }
        }

        let finish = item.plan_finished_at.map(|dt| dt.timestamp_millis());
        if filter.empty_plan_finished_at {
            return finish.is_none();
        }
        if filter.start_finished_at.is_some() || filter.end_finished_at.is_some() {
            let Some(finish) = finish else {
                return false;
            };
            if filter.start_finished_at.is_some_and(|s| finish < s)
                || filter.end_finished_at.is_some_and(|e| finish > e)
            {
                return false;
            }
        }
        true
    }

    /// Every other known state, all permitted, when the item lists none.
    fn transitions_for(&self, item: &WorkItem) -> Vec<TransitionButton> {
        if !item.transitions.is_empty() {
            return item.transitions.clone();
        }
        self.states
            .iter()
            .flat_map(|g| g.states.iter().map(move |s| (g.state_belong, s)))
            .filter(|(_, s)| item.state.as_deref() != Some(s.id.as_str()))
            .map(|(belong, s)| TransitionButton {
                state_id: s.id.clone(),
                state_name: s.name.clone(),
                state_belong: belong,
                permission: true,
            })
            .collect()
    }
}

/// File-backed provider for offline boards.
pub struct LocalProvider {
    path: PathBuf,
    snapshot: RwLock<Snapshot>,
}

impl LocalProvider {
    /// Load the snapshot at `path`. A missing file is an empty board.
    pub fn open(path: &Path) -> Result<Self> {
        let snapshot = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse board snapshot {}", path.display()))?
        } else {
            Snapshot::default()
        };
        Ok(Self::with_snapshot(path.to_path_buf(), snapshot))
    }

    pub fn with_snapshot(path: PathBuf, snapshot: Snapshot) -> Self {
        Self {
            path,
            snapshot: RwLock::new(snapshot),
        }
    }

    /// Write `json` to the snapshot file. Callers hold the write guard so
    /// saves land in the order their changes were applied.
    async fn save(&self, json: String) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl ItemSource for LocalProvider {
    fn name(&self) -> &str {
        "Local"
    }

    async fn page(&self, filter: &Filter) -> Result<ItemPage> {
        let snapshot = self.snapshot.read().await;
        let matched: Vec<&WorkItem> = snapshot
            .items
            .iter()
            .filter(|item| snapshot.matches(item, filter))
            .collect();
        let page_size = filter.page_size.max(1);
        let skip = filter
            .page_no
            .saturating_sub(1)
            .checked_mul(page_size)
            .and_then(|offset| usize::try_from(offset).ok())
            .with_context(|| format!("Page {} is out of range", filter.page_no))?;
        let page_size = usize::try_from(page_size).unwrap_or(usize::MAX);
        let items = matched
            .iter()
            .skip(skip)
            .take(page_size)
            .map(|item| {
                let mut item = (*item).clone();
                item.transitions = snapshot.transitions_for(&item);
                item
            })
            .collect();
        Ok(ItemPage {
            items,
            total: matched.len() as u64,
            user_ids: vec![],
        })
    }
}

#[async_trait]
impl StateResolver for LocalProvider {
    async fn resolve_states(&self, _scope: &Scope) -> Result<Vec<StateGroup>> {
        Ok(self.snapshot.read().await.states.clone())
    }
}

#[async_trait]
impl TransitionSink for LocalProvider {
    async fn transition(&self, item_id: &str, target: &Partition, _actor: &Actor) -> Result<()> {
        let mut snapshot = self.snapshot.write().await;
        if let Partition::State { state_id } = target {
            if !snapshot.has_state(state_id) {
                bail!("Unknown state {state_id}");
            }
        }
        let item = snapshot
            .items
            .iter_mut()
            .find(|i| i.id == item_id)
            .with_context(|| format!("Item {item_id} not found"))?;
        match target {
            Partition::State { state_id } => item.state = Some(state_id.clone()),
            Partition::Priority { priority } => item.priority = Some(*priority),
            Partition::Deadline { .. } => bail!("Items cannot be moved between deadline buckets"),
        }
        let json = serde_json::to_string_pretty(&*snapshot)?;
        self.save(json).await
    }
}

#[async_trait]
impl IdentityResolver for LocalProvider {
    async fn resolve_users(&self, user_ids: &[String]) -> Result<Vec<UserInfo>> {
        let snapshot = self.snapshot.read().await;
        Ok(user_ids
            .iter()
            .filter_map(|id| snapshot.users.iter().find(|u| &u.id == id).cloned())
            .collect())
    }
}
