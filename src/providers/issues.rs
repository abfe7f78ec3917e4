use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use super::{
    Actor, IdentityResolver, ItemPage, ItemSource, StateGroup, StateName, StateResolver,
    TransitionSink,
};
use crate::model::{
    Filter, Label, Partition, Priority, Scope, StateBelong, TransitionButton, UserInfo, WorkItem,
};

/// Client for the issue service's HTTP API.
pub struct IssueServiceProvider {
    base_url: String,
    org_id: Option<i64>,
    user_id: String,
    client: reqwest::Client,
}

/// Response wrapper every issue service endpoint uses.
#[derive(Deserialize)]
pub(crate) struct Envelope<T> {
    success: bool,
    data: Option<T>,
    err: Option<EnvelopeError>,
    #[serde(rename = "userIDs", default)]
    user_ids: Vec<String>,
}

#[derive(Deserialize)]
struct EnvelopeError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    msg: String,
}

#[derive(Deserialize)]
struct IssuePage {
    #[serde(default)]
    total: u64,
    #[serde(default)]
    list: Vec<IssueDto>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IssueDto {
    id: i64,
    title: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(rename = "type", default)]
    issue_type: Option<String>,
    #[serde(default)]
    state: Option<i64>,
    #[serde(default)]
    priority: Option<Priority>,
    #[serde(default)]
    assignee: Option<String>,
    #[serde(rename = "iterationID", default)]
    iteration_id: Option<i64>,
    #[serde(default)]
    plan_finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    issue_button: Vec<IssueButton>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueButton {
    #[serde(rename = "stateID")]
    state_id: i64,
    state_name: String,
    #[serde(default)]
    state_belong: Option<StateBelong>,
    #[serde(default)]
    permission: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StateRelation {
    #[serde(rename = "stateID")]
    pub state_id: i64,
    pub state_name: String,
    #[serde(default)]
    pub state_belong: Option<StateBelong>,
}

#[derive(Deserialize)]
struct UserList {
    #[serde(default)]
    users: Vec<UserInfo>,
}

impl IssueServiceProvider {
    pub fn new(base_url: String, org_id: Option<i64>, user_id: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            org_id,
            user_id,
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str, user_id: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{path}", self.base_url))
            .header("User-ID", user_id)
            .header("Accept", "application/json");
        match self.org_id {
            Some(org) => builder.header("Org-ID", org.to_string()),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: reqwest::RequestBuilder) -> Result<Envelope<T>> {
        let resp = builder.send().await.context("Issue service request failed")?;
        let status = resp.status();
        let envelope: Envelope<T> = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse issue service response ({status})"))?;
        check_envelope(envelope)
    }

    async fn call<T: DeserializeOwned>(&self, builder: reqwest::RequestBuilder) -> Result<(T, Vec<String>)> {
        let envelope = self.send(builder).await?;
        let data = envelope
            .data
            .ok_or_else(|| anyhow!("Issue service response has no data"))?;
        Ok((data, envelope.user_ids))
    }
}

pub(crate) fn check_envelope<T>(envelope: Envelope<T>) -> Result<Envelope<T>> {
    if !envelope.success {
        let err = envelope.err.unwrap_or(EnvelopeError {
            code: String::new(),
            msg: "unknown error".into(),
        });
        if err.code.is_empty() {
            bail!("Issue service error: {}", err.msg);
        }
        bail!("Issue service error {}: {}", err.code, err.msg);
    }
    Ok(envelope)
}

/// Query pairs for `GET /api/issues`.
pub(crate) fn issue_query(filter: &Filter) -> Vec<(String, String)> {
    let mut query = vec![
        ("projectID".to_string(), filter.project_id.to_string()),
        ("pageNo".to_string(), filter.page_no.to_string()),
        ("pageSize".to_string(), filter.page_size.to_string()),
    ];
    let mut push_all = |name: &str, values: Vec<String>| {
        query.extend(values.into_iter().map(|v| (name.to_string(), v)));
    };
    push_all("type", filter.issue_types.clone());
    push_all("state", filter.states.clone());
    push_all(
        "stateBelongs",
        filter
            .state_belongs
            .iter()
            .filter_map(|b| serde_json::to_value(b).ok())
            .filter_map(|v| v.as_str().map(String::from))
            .collect(),
    );
    push_all(
        "priority",
        filter.priorities.iter().map(|p| p.as_str().to_string()).collect(),
    );
    push_all("assignee", filter.assignees.clone());
    push_all("creator", filter.creators.clone());
    push_all("label", filter.labels.clone());
    if let Some(iteration) = filter.iteration_id {
        query.push(("iterationID".into(), iteration.to_string()));
    }
    if let Some(title) = &filter.title {
        query.push(("title".into(), title.clone()));
    }
    if filter.empty_plan_finished_at {
        query.push(("isEmptyPlanFinishedAt".into(), "true".into()));
    } else {
        if let Some(start) = filter.start_finished_at {
            query.push(("startFinishedAt".into(), start.to_string()));
        }
        if let Some(end) = filter.end_finished_at {
            query.push(("endFinishedAt".into(), end.to_string()));
        }
    }
    for (k, v) in &filter.extra {
        query.push((k.clone(), v.clone()));
    }
    query
}

pub(crate) fn encode_query(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Consecutive relations with the same lifecycle bucket form one group.
pub(crate) fn group_relations(relations: Vec<StateRelation>) -> Vec<StateGroup> {
    let mut groups: Vec<StateGroup> = Vec::new();
    for rel in relations {
        let state = StateName {
            id: rel.state_id.to_string(),
            name: rel.state_name,
        };
        if let Some(last) = groups
            .last_mut()
            .filter(|g| g.state_belong == rel.state_belong)
        {
            last.states.push(state);
            continue;
        }
        groups.push(StateGroup {
            state_belong: rel.state_belong,
            states: vec![state],
        });
    }
    groups
}

impl From<IssueDto> for WorkItem {
    fn from(dto: IssueDto) -> Self {
        WorkItem {
            id: dto.id.to_string(),
            title: dto.title,
            description: dto.content,
            item_type: dto.issue_type,
            state: dto.state.map(|s| s.to_string()),
            priority: dto.priority,
            assignee: dto.assignee.filter(|a| !a.is_empty()),
            iteration_id: dto.iteration_id,
            plan_finished_at: dto.plan_finished_at,
            labels: dto
                .labels
                .into_iter()
                .map(|name| Label { name, color: None })
                .collect(),
            transitions: dto
                .issue_button
                .into_iter()
                .map(|b| TransitionButton {
                    state_id: b.state_id.to_string(),
                    state_name: b.state_name,
                    state_belong: b.state_belong,
                    permission: b.permission,
                })
                .collect(),
            url: None,
        }
    }
}

#[async_trait]
impl ItemSource for IssueServiceProvider {
    fn name(&self) -> &str {
        "Issues"
    }

    async fn page(&self, filter: &Filter) -> Result<ItemPage> {
        let path = format!("/api/issues?{}", encode_query(&issue_query(filter)));
        let (page, user_ids): (IssuePage, _) = self
            .call(self.request(reqwest::Method::GET, &path, &self.user_id))
            .await?;
        Ok(ItemPage {
            total: page.total,
            items: page.list.into_iter().map(WorkItem::from).collect(),
            user_ids,
        })
    }
}

#[async_trait]
impl StateResolver for IssueServiceProvider {
    async fn resolve_states(&self, scope: &Scope) -> Result<Vec<StateGroup>> {
        let mut pairs = vec![("projectID".to_string(), scope.project_id.to_string())];
        pairs.extend(scope.issue_types.iter().map(|t| ("issueType".to_string(), t.clone())));
        let path = format!(
            "/api/issues/actions/get-state-relations?{}",
            encode_query(&pairs)
        );
        let (relations, _): (Vec<StateRelation>, _) = self
            .call(self.request(reqwest::Method::GET, &path, &self.user_id))
            .await?;
        Ok(group_relations(relations))
    }
}

#[async_trait]
impl TransitionSink for IssueServiceProvider {
    async fn transition(&self, item_id: &str, target: &Partition, actor: &Actor) -> Result<()> {
        let id: i64 = item_id
            .parse()
            .with_context(|| format!("Issue id {item_id} is not numeric"))?;
        let body = match target {
            Partition::State { state_id } => {
                let state: i64 = state_id
                    .parse()
                    .with_context(|| format!("State id {state_id} is not numeric"))?;
                json!({ "id": id, "state": state })
            }
            Partition::Priority { priority } => json!({ "id": id, "priority": priority }),
            Partition::Deadline { .. } => bail!("Issues cannot be moved between deadline buckets"),
        };
        let builder = self
            .request(reqwest::Method::PUT, &format!("/api/issues/{id}"), &actor.user_id)
            .json(&body);
        self.send::<serde_json::Value>(builder).await?;
        Ok(())
    }
}

#[async_trait]
impl IdentityResolver for IssueServiceProvider {
    async fn resolve_users(&self, user_ids: &[String]) -> Result<Vec<UserInfo>> {
        let pairs: Vec<(String, String)> = user_ids
            .iter()
            .map(|id| ("userID".to_string(), id.clone()))
            .collect();
        let path = format!("/api/users?{}", encode_query(&pairs));
        let (list, _): (UserList, _) = self
            .call(self.request(reqwest::Method::GET, &path, &self.user_id))
            .await?;
        Ok(list.users)
    }
}
