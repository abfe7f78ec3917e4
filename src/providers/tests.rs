use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use super::issues::{self, IssueDto, StateRelation};
use super::jira;
use super::local::{LocalProvider, Snapshot};
use super::{
    create_board, Actor, IdentityResolver, ItemPage, ItemSource, StateGroup, StateName,
    StateResolver, TransitionSink,
};
use crate::board::Board;
use crate::config::{AppConfig, LocalConfig, SourceConfig};
use crate::error::BoardError;
use crate::model::{
    BoardKind, ExpireType, Filter, Label, Partition, PartitionKey, PartitionKeyId, Priority,
    StateBelong, UserInfo, WorkItem,
};

/// A provider that records transitions and serves a fixed page.
struct MockProvider {
    items: Vec<WorkItem>,
    moved: Arc<Mutex<Vec<(String, Partition, String)>>>,
    should_fail: bool,
}

impl MockProvider {
    fn new(items: Vec<WorkItem>) -> Self {
        Self {
            items,
            moved: Arc::new(Mutex::new(Vec::new())),
            should_fail: false,
        }
    }

    fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }
}

#[async_trait]
impl ItemSource for MockProvider {
    fn name(&self) -> &str {
        "Mock"
    }

    async fn page(&self, filter: &Filter) -> Result<ItemPage> {
        let items: Vec<WorkItem> = self
            .items
            .iter()
            .filter(|i| filter.priorities.is_empty() || i.priority.is_some_and(|p| filter.priorities.contains(&p)))
            .cloned()
            .collect();
        Ok(ItemPage {
            total: items.len() as u64,
            items,
            user_ids: vec![],
        })
    }
}

#[async_trait]
impl StateResolver for MockProvider {
    async fn resolve_states(&self, _scope: &crate::model::Scope) -> Result<Vec<StateGroup>> {
        Ok(vec![])
    }
}

#[async_trait]
impl TransitionSink for MockProvider {
    async fn transition(&self, item_id: &str, target: &Partition, actor: &Actor) -> Result<()> {
        if self.should_fail {
            anyhow::bail!("Mock failure");
        }
        self.moved
            .lock()
            .unwrap()
            .push((item_id.to_string(), target.clone(), actor.user_id.clone()));
        Ok(())
    }
}

#[async_trait]
impl IdentityResolver for MockProvider {
    async fn resolve_users(&self, _user_ids: &[String]) -> Result<Vec<UserInfo>> {
        Ok(vec![])
    }
}

fn make_work_item(id: &str, state: &str, priority: Option<Priority>) -> WorkItem {
    WorkItem {
        id: id.to_string(),
        title: format!("Test item {id}"),
        description: None,
        item_type: Some("TASK".into()),
        state: Some(state.to_string()),
        priority,
        assignee: None,
        iteration_id: None,
        plan_finished_at: None,
        labels: vec![],
        transitions: vec![],
        url: None,
    }
}

fn states() -> Vec<StateGroup> {
    let group = |belong, states: &[(&str, &str)]| StateGroup {
        state_belong: Some(belong),
        states: states
            .iter()
            .map(|(id, name)| StateName {
                id: id.to_string(),
                name: name.to_string(),
            })
            .collect(),
    };
    vec![
        group(StateBelong::Open, &[("1", "Open")]),
        group(StateBelong::Working, &[("2", "Doing")]),
        group(StateBelong::Done, &[("3", "Done")]),
    ]
}

fn snapshot() -> Snapshot {
    let mut due = make_work_item("4", "2", Some(Priority::High));
    due.plan_finished_at = Some(Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap());
    due.labels = vec![Label {
        name: "backend".into(),
        color: None,
    }];
    due.assignee = Some("u1".into());
    Snapshot {
        states: states(),
        items: vec![
            make_work_item("1", "1", Some(Priority::Urgent)),
            make_work_item("2", "1", Some(Priority::Low)),
            make_work_item("3", "3", None),
            due,
        ],
        users: vec![UserInfo {
            id: "u1".into(),
            name: "ada".into(),
            nick: Some("Ada".into()),
        }],
    }
}

fn base() -> Filter {
    Filter::new(1).with_issue_type("TASK")
}

#[tokio::test]
async fn priority_move_reaches_the_sink_with_actor() {
    let provider = Arc::new(MockProvider::new(vec![make_work_item(
        "9",
        "1",
        Some(Priority::Low),
    )]));
    let board = Board::from_provider(provider.clone());
    let keys: Vec<PartitionKey> = Priority::ALL.into_iter().map(PartitionKey::priority).collect();

    let result = board
        .move_item(&base(), &keys, "9", &PartitionKeyId::from("HIGH"), &Actor::new("u7"))
        .await
        .unwrap();

    let moved = provider.moved.lock().unwrap();
    assert_eq!(
        *moved,
        vec![(
            "9".to_string(),
            Partition::Priority {
                priority: Priority::High
            },
            "u7".to_string()
        )]
    );
    assert_eq!(result.columns.len(), 4);
}

#[tokio::test]
async fn sink_errors_propagate_through_the_board() {
    let provider = Arc::new(MockProvider::new(vec![]).with_failure());
    let board = Board::from_provider(provider.clone());
    let keys = vec![PartitionKey::priority(Priority::Low)];

    let err = board
        .move_item(&base(), &keys, "9", &PartitionKeyId::from("LOW"), &Actor::new("u7"))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("Mock failure"));
    assert!(provider.moved.lock().unwrap().is_empty());
}

#[test]
fn create_board_requires_a_source() {
    let err = create_board(&AppConfig::default()).err().unwrap();
    assert!(err.to_string().contains("No item source configured"));
}

#[tokio::test]
async fn create_board_wires_local_source() {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig {
        source: Some(SourceConfig::Local(LocalConfig {
            path: dir.path().join("board.json"),
        })),
        board: Default::default(),
    };
    let board = create_board(&config).unwrap();
    assert_eq!(board.source_name(), "Local");
    assert_eq!(board.config().max_concurrent_fetches, 8);
}

// Issue service

fn values<'a>(query: &'a [(String, String)], key: &str) -> Vec<&'a str> {
    query
        .iter()
        .filter(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
        .collect()
}

#[test]
fn issue_query_repeats_multi_value_predicates() {
    let mut filter = base().with_iteration(5);
    filter.states = vec!["11".into()];
    filter.state_belongs = vec![StateBelong::Open, StateBelong::Working];
    filter.priorities = vec![Priority::High];
    filter.title = Some("login bug".into());
    filter.start_finished_at = Some(1_000);

    let query = issues::issue_query(&filter);
    let get = |k: &str| values(&query, k);

    assert_eq!(get("projectID"), vec!["1"]);
    assert_eq!(get("type"), vec!["TASK"]);
    assert_eq!(get("state"), vec!["11"]);
    assert_eq!(get("stateBelongs"), vec!["OPEN", "WORKING"]);
    assert_eq!(get("priority"), vec!["HIGH"]);
    assert_eq!(get("iterationID"), vec!["5"]);
    assert_eq!(get("startFinishedAt"), vec!["1000"]);
    assert!(get("isEmptyPlanFinishedAt").is_empty());

    let encoded = issues::encode_query(&query);
    assert!(encoded.contains("title=login%20bug"));
}

#[test]
fn empty_finish_flag_replaces_range() {
    let mut filter = base();
    filter.empty_plan_finished_at = true;
    filter.start_finished_at = Some(1);
    let query = issues::issue_query(&filter);
    assert!(query.contains(&("isEmptyPlanFinishedAt".into(), "true".into())));
    assert!(!query.iter().any(|(k, _)| k == "startFinishedAt"));
}

#[test]
fn state_relations_group_by_consecutive_bucket() {
    let relations: Vec<StateRelation> = serde_json::from_str(
        r#"[
            {"stateID": 1, "stateName": "Open", "stateBelong": "OPEN"},
            {"stateID": 2, "stateName": "Doing", "stateBelong": "WORKING"},
            {"stateID": 5, "stateName": "Testing", "stateBelong": "WORKING"},
            {"stateID": 3, "stateName": "Done", "stateBelong": "DONE"}
        ]"#,
    )
    .unwrap();

    let groups = issues::group_relations(relations);
    assert_eq!(groups.len(), 3);
    assert_eq!(groups[1].state_belong, Some(StateBelong::Working));
    let ids: Vec<_> = groups[1].states.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["2", "5"]);
}

#[test]
fn issue_dto_keeps_source_permissions() {
    let dto: IssueDto = serde_json::from_str(
        r#"{
            "id": 42,
            "title": "Fix login",
            "type": "TASK",
            "state": 1,
            "priority": "URGENT",
            "assignee": "",
            "iterationID": 3,
            "planFinishedAt": "2024-03-10T00:00:00Z",
            "labels": ["backend"],
            "issueButton": [
                {"stateID": 2, "stateName": "Doing", "stateBelong": "WORKING", "permission": true},
                {"stateID": 3, "stateName": "Done", "stateBelong": "DONE", "permission": false}
            ]
        }"#,
    )
    .unwrap();

    let item = WorkItem::from(dto);
    assert_eq!(item.id, "42");
    assert_eq!(item.state.as_deref(), Some("1"));
    assert_eq!(item.priority, Some(Priority::Urgent));
    assert_eq!(item.assignee, None);
    assert_eq!(item.labels[0].name, "backend");
    assert_eq!(item.transitions.len(), 2);
    assert_eq!(item.allowed_targets(), vec![PartitionKeyId::from("2")]);
}

#[test]
fn unsuccessful_envelope_carries_server_message() {
    let envelope = serde_json::from_str(
        r#"{"success": false, "err": {"code": "403", "msg": "no permission"}}"#,
    )
    .unwrap();
    let err = issues::check_envelope::<serde_json::Value>(envelope)
        .err()
        .unwrap();
    assert_eq!(err.to_string(), "Issue service error 403: no permission");
}

// Jira

#[test]
fn jira_priorities_map_both_ways() {
    for p in Priority::ALL {
        assert_eq!(jira::priority_from_jira(jira::priority_to_jira(p)), Some(p));
    }
    assert_eq!(jira::priority_from_jira("Lowest"), Some(Priority::Low));
    assert_eq!(jira::priority_from_jira("Trivial"), None);
    assert_eq!(jira::category_belong("indeterminate"), Some(StateBelong::Working));
}

#[test]
fn jql_narrows_to_one_status_column() {
    let filter = base().narrow_to(&Partition::State {
        state_id: "10001".into(),
    });
    let jql = jira::jql_for("ENG", &filter);
    assert_eq!(
        jql,
        r#"project = "ENG" AND issuetype in ("TASK") AND status in ("10001") ORDER BY rank ASC"#
    );
}

#[test]
fn jql_translates_deadline_windows() {
    let undefined = base().narrow_to(&Partition::Deadline {
        bucket: ExpireType::Undefined,
        window: None,
    });
    assert!(jira::jql_for("ENG", &undefined).contains("duedate is EMPTY"));

    let mut ranged = base();
    ranged.start_finished_at = Some(1_710_028_800_000); // 2024-03-10
    ranged.priorities = vec![Priority::Normal];
    let jql = jira::jql_for("ENG", &ranged);
    assert!(jql.contains(r#"duedate >= "2024-03-10""#));
    assert!(jql.contains(r#"priority in ("Medium")"#));
}

#[tokio::test]
async fn jira_page_beyond_addressable_range_fails_before_any_request() {
    let provider = jira::JiraProvider::new(
        "example".into(),
        "dev@example.com".into(),
        "token".into(),
        "ENG".into(),
    );
    let err = provider
        .page(&base().with_page(u64::MAX, 50))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("out of range"));
}

// Local

#[tokio::test]
async fn local_page_filters_and_pages() {
    let provider = LocalProvider::with_snapshot("unused.json".into(), snapshot());

    let open = base().narrow_to(&Partition::State {
        state_id: "1".into(),
    });
    let page = provider.page(&open.clone().with_page(1, 1)).await.unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].id, "1");

    let second = provider.page(&open.with_page(2, 1)).await.unwrap();
    assert_eq!(second.items[0].id, "2");

    let mut working = base();
    working.state_belongs = vec![StateBelong::Working];
    working.labels = vec!["backend".into()];
    let page = provider.page(&working).await.unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].id, "4");
}

#[tokio::test]
async fn local_page_beyond_addressable_range_is_an_error() {
    let provider = LocalProvider::with_snapshot("unused.json".into(), snapshot());
    let err = provider
        .page(&base().with_page(u64::MAX, 50))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("out of range"));
}

#[tokio::test]
async fn refresh_of_unreachable_page_fails_the_column_without_panicking() {
    let provider = Arc::new(LocalProvider::with_snapshot("unused.json".into(), snapshot()));
    let board = Board::from_provider(provider);
    let keys = board.resolve(BoardKind::Status, &base().scope()).await.unwrap();

    let err = board
        .refresh_one(&base().with_page(u64::MAX, 50), &keys, &PartitionKeyId::from("1"))
        .await
        .unwrap_err();

    match err {
        BoardError::PartitionFetchFailed { key, source } => {
            assert_eq!(key.as_str(), "1");
            assert!(source.to_string().contains("out of range"));
        }
        other => panic!("expected PartitionFetchFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn local_page_offers_every_other_state_by_default() {
    let provider = LocalProvider::with_snapshot("unused.json".into(), snapshot());
    let page = provider
        .page(&base().narrow_to(&Partition::State {
            state_id: "3".into(),
        }))
        .await
        .unwrap();
    let targets = page.items[0].allowed_targets();
    assert_eq!(targets, vec![PartitionKeyId::from("1"), PartitionKeyId::from("2")]);
}

#[tokio::test]
async fn local_deadline_filter_uses_finish_dates() {
    let provider = LocalProvider::with_snapshot("unused.json".into(), snapshot());

    let mut empty = base();
    empty.empty_plan_finished_at = true;
    assert_eq!(provider.page(&empty).await.unwrap().total, 3);

    let mut ranged = base();
    ranged.start_finished_at = Some(Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap().timestamp_millis());
    ranged.end_finished_at = Some(Utc.with_ymd_and_hms(2024, 3, 10, 23, 59, 59).unwrap().timestamp_millis());
    let page = provider.page(&ranged).await.unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].id, "4");
}

#[tokio::test]
async fn local_transition_persists_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("board.json");
    std::fs::write(&path, serde_json::to_string(&snapshot()).unwrap()).unwrap();

    let provider = LocalProvider::open(&path).unwrap();
    provider
        .transition(
            "1",
            &Partition::State {
                state_id: "3".into(),
            },
            &Actor::new("u1"),
        )
        .await
        .unwrap();

    let reopened = LocalProvider::open(&path).unwrap();
    let done = reopened
        .page(&base().narrow_to(&Partition::State {
            state_id: "3".into(),
        }))
        .await
        .unwrap();
    let ids: Vec<_> = done.items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "3"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_local_moves_all_reach_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("board.json");
    let provider = Arc::new(LocalProvider::with_snapshot(path.clone(), snapshot()));

    let moves = ["1", "2", "4"].map(|id| {
        let provider = Arc::clone(&provider);
        tokio::spawn(async move {
            provider
                .transition(
                    id,
                    &Partition::State {
                        state_id: "3".into(),
                    },
                    &Actor::new("u1"),
                )
                .await
        })
    });
    for handle in moves {
        handle.await.unwrap().unwrap();
    }

    let reopened = LocalProvider::open(&path).unwrap();
    let done = reopened
        .page(&base().narrow_to(&Partition::State {
            state_id: "3".into(),
        }))
        .await
        .unwrap();
    assert_eq!(done.total, 4);
}

#[tokio::test]
async fn local_transition_rejects_unknown_state() {
    let provider = LocalProvider::with_snapshot("unused.json".into(), snapshot());
    let err = provider
        .transition(
            "1",
            &Partition::State {
                state_id: "99".into(),
            },
            &Actor::new("u1"),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Unknown state 99"));
}

#[tokio::test]
async fn local_open_missing_file_is_empty_board() {
    let dir = tempfile::tempdir().unwrap();
    let provider = LocalProvider::open(&dir.path().join("nope.json")).unwrap();
    let states = provider.resolve_states(&base().scope()).await.unwrap();
    assert!(states.is_empty());
}

#[tokio::test]
async fn local_board_renders_and_moves_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("board.json");
    let provider = Arc::new(LocalProvider::with_snapshot(path.clone(), snapshot()));
    let board = Board::from_provider(provider);

    let view = board.render(BoardKind::Status, &base()).await.unwrap();
    let counts: Vec<usize> = view.result.columns.iter().map(|c| c.cards.len()).collect();
    assert_eq!(counts, vec![2, 1, 1]);
    assert_eq!(view.users.len(), 1);
    assert_eq!(view.users[0].name, "ada");

    let keys: Vec<PartitionKey> = view.result.columns.iter().map(|c| c.key.clone()).collect();
    let moved = board
        .move_item(&base(), &keys, "2", &PartitionKeyId::from("2"), &Actor::new("u1"))
        .await
        .unwrap();
    assert_eq!(moved.columns[0].item_ids(), vec!["1"]);
    assert_eq!(moved.columns[1].item_ids(), vec!["2", "4"]);
    assert!(path.exists());
}
