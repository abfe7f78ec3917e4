use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;

use super::{
    Actor, IdentityResolver, ItemPage, ItemSource, StateGroup, StateName, StateResolver,
    TransitionSink,
};
use crate::model::{
    Filter, Label, Partition, Priority, Scope, StateBelong, TransitionButton, UserInfo, WorkItem,
};
use crate::util::adf::extract_text_from_adf;

const SEARCH_FIELDS: &str = "summary,description,status,priority,labels,assignee,duedate,issuetype";

pub struct JiraProvider {
    base_url: String,
    auth_header: String,
    project_key: String,
    client: reqwest::Client,
}

impl JiraProvider {
    pub fn new(domain: String, email: String, api_token: String, project_key: String) -> Self {
        let creds = format!("{email}:{api_token}");
        let encoded = base64::engine::general_purpose::STANDARD.encode(creds);
        Self {
            base_url: format!("https://{domain}.atlassian.net"),
            auth_header: format!("Basic {encoded}"),
            project_key,
            client: reqwest::Client::new(),
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let resp = self
            .client
            .get(url)
            .header("Authorization", &self.auth_header)
            .header("Accept", "application/json")
            .send()
            .await
            .context("Jira API request failed")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Jira API returned {status}: {body}");
        }
        resp.json().await.context("Failed to parse Jira response")
    }

    async fn send_json(&self, method: reqwest::Method, url: &str, body: serde_json::Value) -> Result<()> {
        let resp = self
            .client
            .request(method, url)
            .header("Authorization", &self.auth_header)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .context("Jira API request failed")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Jira API returned {status}: {body}");
        }
        Ok(())
    }

    fn to_work_item(&self, issue: JiraIssue) -> WorkItem {
        let description = issue
            .fields
            .description
            .as_ref()
            .and_then(extract_text_from_adf)
            .map(|d| d.chars().take(500).collect::<String>());

        let url = format!("{}/browse/{}", self.base_url, issue.key);
        let transitions = issue
            .transitions
            .into_iter()
            .map(|t| TransitionButton {
                state_belong: t.to.status_category.as_ref().and_then(|c| category_belong(&c.key)),
                state_id: t.to.id,
                state_name: t.to.name,
                // Jira only lists transitions the caller may perform.
                permission: true,
            })
            .collect();

        WorkItem {
            id: issue.key,
            title: issue.fields.summary.unwrap_or_default(),
            description,
            item_type: issue.fields.issuetype.map(|t| t.name),
            state: issue.fields.status.map(|s| s.id),
            priority: issue
                .fields
                .priority
                .and_then(|p| priority_from_jira(&p.name)),
            assignee: issue.fields.assignee.map(|a| a.account_id),
            iteration_id: None,
            plan_finished_at: issue.fields.duedate.as_deref().and_then(parse_due_date),
            labels: issue
                .fields
                .labels
                .into_iter()
                .map(|name| Label { name, color: None })
                .collect(),
            transitions,
            url: Some(url),
        }
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    issues: Vec<JiraIssue>,
    #[serde(default)]
    total: u64,
}

#[derive(Deserialize)]
struct JiraIssue {
    key: String,
    fields: IssueFields,
    #[serde(default)]
    transitions: Vec<JiraTransition>,
}

#[derive(Deserialize)]
struct IssueFields {
    summary: Option<String>,
    description: Option<serde_json::Value>,
    status: Option<StatusField>,
    priority: Option<PriorityField>,
    #[serde(default)]
    labels: Vec<String>,
    assignee: Option<AssigneeField>,
    duedate: Option<String>,
    issuetype: Option<IssueTypeField>,
}

#[derive(Deserialize)]
struct StatusField {
    id: String,
}

#[derive(Deserialize)]
struct PriorityField {
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssigneeField {
    account_id: String,
}

#[derive(Deserialize)]
struct IssueTypeField {
    name: String,
}

#[derive(Deserialize)]
struct JiraTransition {
    id: String,
    to: JiraStatus,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JiraStatus {
    id: String,
    name: String,
    status_category: Option<StatusCategory>,
}

#[derive(Deserialize)]
struct StatusCategory {
    key: String,
}

#[derive(Deserialize)]
struct ProjectIssueType {
    name: String,
    statuses: Vec<JiraStatus>,
}

#[derive(Deserialize)]
struct TransitionsResponse {
    transitions: Vec<JiraTransition>,
}

#[derive(Deserialize)]
struct BulkUsers {
    values: Vec<JiraUser>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JiraUser {
    account_id: String,
    display_name: String,
}

pub(crate) fn priority_from_jira(name: &str) -> Option<Priority> {
    match name.to_ascii_lowercase().as_str() {
        "highest" | "urgent" | "blocker" => Some(Priority::Urgent),
        "high" => Some(Priority::High),
        "medium" | "normal" => Some(Priority::Normal),
        "low" | "lowest" => Some(Priority::Low),
        _ => None,
    }
}

pub(crate) fn priority_to_jira(priority: Priority) -> &'static str {
    match priority {
        Priority::Urgent => "Highest",
        Priority::High => "High",
        Priority::Normal => "Medium",
        Priority::Low => "Low",
    }
}

pub(crate) fn category_belong(key: &str) -> Option<StateBelong> {
    match key {
        "new" => Some(StateBelong::Open),
        "indeterminate" => Some(StateBelong::Working),
        "done" => Some(StateBelong::Done),
        _ => None,
    }
}

fn parse_due_date(date: &str) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn jql_date(ms: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(ms).map(|dt| format!("\"{}\"", dt.format("%Y-%m-%d")))
}

fn quoted(values: impl IntoIterator<Item = impl AsRef<str>>) -> String {
    values
        .into_iter()
        .map(|v| format!("\"{}\"", v.as_ref().replace('"', "\\\"")))
        .collect::<Vec<_>>()
        .join(", ")
}

/// JQL for one column of `filter` inside `project_key`.
pub(crate) fn jql_for(project_key: &str, filter: &Filter) -> String {
    let mut clauses = vec![format!("project = {}", quoted([project_key]))];
    if !filter.issue_types.is_empty() {
        clauses.push(format!("issuetype in ({})", quoted(&filter.issue_types)));
    }
    if !filter.states.is_empty() {
        clauses.push(format!("status in ({})", quoted(&filter.states)));
    }
    if !filter.priorities.is_empty() {
        let names = filter.priorities.iter().map(|p| priority_to_jira(*p));
        clauses.push(format!("priority in ({})", quoted(names)));
    }
    if !filter.assignees.is_empty() {
        clauses.push(format!("assignee in ({})", quoted(&filter.assignees)));
    }
    if !filter.creators.is_empty() {
        clauses.push(format!("reporter in ({})", quoted(&filter.creators)));
    }
    if !filter.labels.is_empty() {
        clauses.push(format!("labels in ({})", quoted(&filter.labels)));
    }
    if let Some(title) = &filter.title {
        clauses.push(format!("summary ~ {}", quoted([title])));
    }
    if filter.empty_plan_finished_at {
        clauses.push("duedate is EMPTY".into());
    } else {
        if let Some(start) = filter.start_finished_at.and_then(jql_date) {
            clauses.push(format!("duedate >= {start}"));
        }
        if let Some(end) = filter.end_finished_at.and_then(jql_date) {
            clauses.push(format!("duedate <= {end}"));
        }
    }
    format!("{} ORDER BY rank ASC", clauses.join(" AND "))
}

#[async_trait]
impl ItemSource for JiraProvider {
    fn name(&self) -> &str {
        "Jira"
    }

    async fn page(&self, filter: &Filter) -> Result<ItemPage> {
        let jql = jql_for(&self.project_key, filter);
        let start_at = filter
            .page_offset()
            .with_context(|| format!("Page {} is out of range", filter.page_no))?;
        let url = format!(
            "{}/rest/api/3/search?jql={}&startAt={start_at}&maxResults={}&expand=transitions&fields={SEARCH_FIELDS}",
            self.base_url,
            urlencoding::encode(&jql),
            filter.page_size,
        );

        let search: SearchResponse = self.get(&url).await?;
        let items: Vec<WorkItem> = search
            .issues
            .into_iter()
            .map(|issue| self.to_work_item(issue))
            .collect();

        Ok(ItemPage {
            total: search.total,
            items,
            user_ids: vec![],
        })
    }
}

#[async_trait]
impl StateResolver for JiraProvider {
    async fn resolve_states(&self, scope: &Scope) -> Result<Vec<StateGroup>> {
        let url = format!(
            "{}/rest/api/3/project/{}/statuses",
            self.base_url,
            urlencoding::encode(&self.project_key)
        );
        let types: Vec<ProjectIssueType> = self.get(&url).await?;
        let wanted = scope.issue_types.first();
        let issue_type = types
            .into_iter()
            .find(|t| wanted.map_or(true, |w| t.name.eq_ignore_ascii_case(w)))
            .with_context(|| {
                format!(
                    "Issue type {:?} not found in Jira project {}",
                    wanted, self.project_key
                )
            })?;

        let mut groups: Vec<StateGroup> = [StateBelong::Open, StateBelong::Working, StateBelong::Done]
            .into_iter()
            .map(|belong| StateGroup {
                state_belong: Some(belong),
                states: vec![],
            })
            .collect();
        let mut other = StateGroup {
            state_belong: None,
            states: vec![],
        };
        for status in issue_type.statuses {
            let belong = status.status_category.as_ref().and_then(|c| category_belong(&c.key));
            let state = StateName {
                id: status.id,
                name: status.name,
            };
            match groups.iter_mut().find(|g| g.state_belong == belong && belong.is_some()) {
                Some(group) => group.states.push(state),
                None => other.states.push(state),
            }
        }
        groups.push(other);
        groups.retain(|g| !g.states.is_empty());
        Ok(groups)
    }
}

#[async_trait]
impl TransitionSink for JiraProvider {
    async fn transition(&self, item_id: &str, target: &Partition, _actor: &Actor) -> Result<()> {
        let issue_url = format!("{}/rest/api/3/issue/{}", self.base_url, urlencoding::encode(item_id));
        match target {
            Partition::State { state_id } => {
                let available: TransitionsResponse =
                    self.get(&format!("{issue_url}/transitions")).await?;
                let transition = available
                    .transitions
                    .into_iter()
                    .find(|t| &t.to.id == state_id)
                    .with_context(|| format!("No transition from {item_id} to status {state_id}"))?;
                self.send_json(
                    reqwest::Method::POST,
                    &format!("{issue_url}/transitions"),
                    json!({ "transition": { "id": transition.id } }),
                )
                .await
            }
            Partition::Priority { priority } => {
                self.send_json(
                    reqwest::Method::PUT,
                    &issue_url,
                    json!({ "fields": { "priority": { "name": priority_to_jira(*priority) } } }),
                )
                .await
            }
            Partition::Deadline { .. } => bail!("Jira issues cannot be moved between deadline buckets"),
        }
    }
}

#[async_trait]
impl IdentityResolver for JiraProvider {
    async fn resolve_users(&self, user_ids: &[String]) -> Result<Vec<UserInfo>> {
        let query = user_ids
            .iter()
            .map(|id| format!("accountId={}", urlencoding::encode(id)))
            .collect::<Vec<_>>()
            .join("&");
        let url = format!("{}/rest/api/3/user/bulk?{query}", self.base_url);
        let users: BulkUsers = self.get(&url).await?;
        Ok(users
            .values
            .into_iter()
            .map(|u| UserInfo {
                id: u.account_id,
                name: u.display_name,
                nick: None,
            })
            .collect())
    }
}
