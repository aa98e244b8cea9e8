use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use taskflow_core::action::{Action, DueShortcut};
use taskflow_core::api::ApiClient;
use taskflow_core::dispatch::Command;
use taskflow_core::session::{MemoryStore, SessionStore, UserState};
use taskflow_core::grouping::Bucket;
use taskflow_core::task::{Priority, Status};
use taskflow_core::view::Reply;
use taskflow_core::wizard::Prompt;
use taskflow_core::{App, BotError, ChatUser, Inbound, UiSettings, dispatch};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const USER: i64 = 4242;

async fn harness() -> (MockServer, App) {
    let server = MockServer::start().await;
    let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());
    let api = ApiClient::new(&server.uri(), "/api/v1", Duration::from_secs(5), store.clone())
        .expect("client");
    (server, App::new(api, store, UiSettings::default()))
}

async fn logged_in(app: &App) {
    app.session(USER)
        .set_tokens("old-access", "refresh-1")
        .await
        .expect("tokens");
}

fn task_json(id: i64, title: &str, priority: &str) -> Value {
    json!({
        "id": id,
        "title": title,
        "status": "todo",
        "priority": priority,
        "due_date": null
    })
}

fn page_json(count: i64, total: usize) -> Value {
    let tasks: Vec<Value> = (1..=count)
        .map(|i| task_json(i, &format!("task {i}"), "medium"))
        .collect();
    json!({ "tasks": tasks, "total": total })
}

fn user() -> ChatUser {
    ChatUser {
        id: USER,
        first_name: Some("Ann".to_string()),
        last_name: None,
    }
}

fn offers(replies: &[Reply], action: &Action) -> bool {
    replies
        .iter()
        .filter_map(|r| r.screen().and_then(|s| s.keyboard()))
        .any(|kb| kb.contains(action))
}

async fn mount_pages(server: &MockServer, total: usize) {
    Mock::given(method("GET"))
        .and(path("/api/v1/tasks/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_json(10, total)))
        .mount(server)
        .await;
}

async fn press(app: &App, action: Action) -> Vec<Reply> {
    dispatch(app, &user(), Inbound::Button(action))
        .await
        .expect("dispatch")
}

fn first_text(replies: &[Reply]) -> String {
    replies
        .iter()
        .find_map(|r| r.screen().map(|s| s.text.clone()))
        .unwrap_or_default()
}

#[tokio::test]
async fn expired_token_is_refreshed_once_and_retried() {
    let (server, app) = harness().await;
    logged_in(&app).await;

    Mock::given(method("GET"))
        .and(path("/api/v1/tasks/"))
        .and(header("authorization", "Bearer old-access"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh"))
        .and(body_partial_json(json!({ "refresh_token": "refresh-1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "new-access",
            "refresh_token": "refresh-2"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/tasks/"))
        .and(header("authorization", "Bearer new-access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_json(1, 1)))
        .expect(1)
        .mount(&server)
        .await;

    let page = app.api.tasks().list(USER, &[]).await.expect("list");
    assert_eq!(page.total, 1);
    assert_eq!(
        app.session(USER).access_token().await.expect("token"),
        Some("new-access".to_string())
    );
}

#[tokio::test]
async fn failed_refresh_surfaces_auth_required() {
    let (server, app) = harness().await;
    logged_in(&app).await;

    Mock::given(method("GET"))
        .and(path("/api/v1/tasks/"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let err = app.api.tasks().list(USER, &[]).await.expect_err("must fail");
    assert!(matches!(err, BotError::AuthRequired));
}

#[tokio::test]
async fn second_401_after_refresh_is_not_retried_again() {
    let (server, app) = harness().await;
    logged_in(&app).await;

    Mock::given(method("GET"))
        .and(path("/api/v1/tasks/"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "new-access",
            "refresh_token": "refresh-2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = app.api.tasks().list(USER, &[]).await.expect_err("must fail");
    assert!(matches!(err, BotError::AuthRequired));
}

#[tokio::test]
async fn tasks_require_login() {
    let (_server, app) = harness().await;
    let replies = dispatch(&app, &user(), Inbound::Command(Command::Tasks))
        .await
        .expect("dispatch");
    assert!(first_text(&replies).contains("not logged in"));
}

#[tokio::test]
async fn list_filters_and_paging_round_trip() {
    let (server, app) = harness().await;
    logged_in(&app).await;

    Mock::given(method("GET"))
        .and(path("/api/v1/tasks/"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_json(10, 23)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/tasks/"))
        .and(query_param("offset", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_json(10, 23)))
        .mount(&server)
        .await;

    let replies = dispatch(&app, &user(), Inbound::Command(Command::Tasks))
        .await
        .expect("entry");
    assert!(first_text(&replies).contains("1/3"));

    dispatch(&app, &user(), Inbound::Button(Action::QuickUrgent))
        .await
        .expect("urgent");
    let profile = app.session(USER).profile().await.expect("profile");
    assert_eq!(
        profile.priorities.iter().copied().collect::<Vec<_>>(),
        vec![Priority::High, Priority::Urgent]
    );

    let replies = dispatch(&app, &user(), Inbound::Button(Action::PageNext))
        .await
        .expect("next");
    assert!(first_text(&replies).contains("2/3"));
    assert_eq!(app.session(USER).profile().await.expect("profile").page_offset, 10);

    dispatch(&app, &user(), Inbound::Button(Action::Reset))
        .await
        .expect("reset");
    let profile = app.session(USER).profile().await.expect("profile");
    assert_eq!(profile.page_offset, 0);
    assert!(profile.priorities.is_empty());

    let requests = server.received_requests().await.expect("recording");
    let urgent_query = requests
        .iter()
        .filter_map(|r| r.url.query().map(str::to_string))
        .find(|q| q.contains("priority=urgent"))
        .expect("urgent filter sent");
    assert!(urgent_query.contains("priority=high"));
}

#[tokio::test]
async fn failed_fetch_keeps_the_stored_profile() {
    let (server, app) = harness().await;
    logged_in(&app).await;

    Mock::given(method("GET"))
        .and(path("/api/v1/tasks/"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let replies = dispatch(&app, &user(), Inbound::Button(Action::QuickOverdue))
        .await
        .expect("dispatch");
    assert!(first_text(&replies).contains("Could not load"));
    let profile = app.session(USER).profile().await.expect("profile");
    assert_eq!(profile.overdue_only, None);
}

#[tokio::test]
async fn login_wizard_rejects_bad_email_then_logs_in() {
    let (server, app) = harness().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/login"))
        .and(body_partial_json(json!({ "email": "ann@example.com", "password": "secret1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "a-1",
            "refresh_token": "r-1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = app.session(USER);
    dispatch(&app, &user(), Inbound::Command(Command::Login))
        .await
        .expect("start");
    assert_eq!(session.prompt().await.expect("prompt"), Some(Prompt::LoginEmail));

    let replies = dispatch(&app, &user(), Inbound::from_text("not-an-email"))
        .await
        .expect("bad email");
    assert!(first_text(&replies).contains("email"));
    assert_eq!(session.prompt().await.expect("prompt"), Some(Prompt::LoginEmail));

    dispatch(&app, &user(), Inbound::from_text("Ann@Example.com"))
        .await
        .expect("email");
    assert_eq!(session.prompt().await.expect("prompt"), Some(Prompt::LoginPassword));

    dispatch(&app, &user(), Inbound::from_text("secret1"))
        .await
        .expect("password");
    assert_eq!(session.prompt().await.expect("prompt"), None);
    assert!(session.is_authenticated().await.expect("auth"));
    assert_eq!(session.state().await.expect("state"), Some(UserState::LoggedIn));
}

#[tokio::test]
async fn new_task_wizard_skips_category_step_without_categories() {
    let (server, app) = harness().await;
    logged_in(&app).await;

    Mock::given(method("GET"))
        .and(path("/api/v1/categories/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{ "id": 1, "name": "Uncategorized" }])),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/tasks/"))
        .and(body_partial_json(json!({ "title": "Buy milk", "priority": "high" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(task_json(7, "Buy milk", "high")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/tasks/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_json(1, 1)))
        .mount(&server)
        .await;

    let session = app.session(USER);
    dispatch(&app, &user(), Inbound::Command(Command::NewTask))
        .await
        .expect("start");
    dispatch(&app, &user(), Inbound::from_text("Buy milk"))
        .await
        .expect("title");
    dispatch(&app, &user(), Inbound::from_text("-"))
        .await
        .expect("description");
    assert_eq!(session.prompt().await.expect("prompt"), Some(Prompt::TaskPriority));

    dispatch(&app, &user(), Inbound::Button(Action::WizardPriority(Some(Priority::High))))
        .await
        .expect("priority");
    assert_eq!(session.prompt().await.expect("prompt"), Some(Prompt::TaskDue));

    let replies = dispatch(&app, &user(), Inbound::Button(Action::WizardDue(DueShortcut::Tomorrow)))
        .await
        .expect("due");
    assert!(replies.iter().any(|r| matches!(r, Reply::Notice { text, .. } if text.contains("created"))));
    assert_eq!(session.prompt().await.expect("prompt"), None);
    assert!(session.scratch().await.expect("scratch").title.is_none());
}

#[tokio::test]
async fn cancel_clears_a_pending_wizard() {
    let (_server, app) = harness().await;
    logged_in(&app).await;
    let session = app.session(USER);

    dispatch(&app, &user(), Inbound::Command(Command::NewTask))
        .await
        .expect("start");
    dispatch(&app, &user(), Inbound::from_text("Cancel"))
        .await
        .expect("cancel");
    assert_eq!(session.prompt().await.expect("prompt"), None);

    let replies = dispatch(&app, &user(), Inbound::Button(Action::WizardDue(DueShortcut::Today)))
        .await
        .expect("stale");
    assert!(matches!(replies.as_slice(), [Reply::Notice { alert: true, .. }]));
}

#[tokio::test]
async fn missing_task_renders_not_found() {
    let (server, app) = harness().await;
    logged_in(&app).await;

    Mock::given(method("GET"))
        .and(path("/api/v1/tasks/99"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let replies = dispatch(&app, &user(), Inbound::Button(Action::OpenTask(99)))
        .await
        .expect("dispatch");
    assert!(first_text(&replies).contains("not found"));
}

#[tokio::test]
async fn logout_clears_tokens_even_when_the_call_fails() {
    let (server, app) = harness().await;
    logged_in(&app).await;

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/logout"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    dispatch(&app, &user(), Inbound::Command(Command::Logout))
        .await
        .expect("logout");
    let session = app.session(USER);
    assert!(!session.is_authenticated().await.expect("auth"));
    assert_eq!(session.state().await.expect("state"), Some(UserState::LoggedOut));
}

#[tokio::test]
async fn concurrent_401s_share_one_refresh() {
    let (server, app) = harness().await;
    logged_in(&app).await;

    Mock::given(method("GET"))
        .and(path("/api/v1/tasks/"))
        .and(header("authorization", "Bearer old-access"))
        .respond_with(ResponseTemplate::new(401).set_delay(Duration::from_millis(50)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "access_token": "new-access",
                    "refresh_token": "refresh-2"
                }))
                .set_delay(Duration::from_millis(50)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/tasks/"))
        .and(header("authorization", "Bearer new-access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_json(1, 1)))
        .expect(2)
        .mount(&server)
        .await;

    let tasks = app.api.tasks();
    let (a, b) = tokio::join!(tasks.list(USER, &[]), tasks.list(USER, &[]));
    assert_eq!(a.expect("first").total, 1);
    assert_eq!(b.expect("second").total, 1);
}

#[tokio::test]
async fn selector_toggles_stay_in_the_draft_until_apply() {
    let (server, app) = harness().await;
    logged_in(&app).await;
    mount_pages(&server, 23).await;
    let session = app.session(USER);

    press(&app, Action::PageNext).await;
    assert_eq!(session.profile().await.expect("profile").page_offset, 10);

    let replies = press(
        &app,
        Action::PriorityToggle {
            draft: BTreeSet::new(),
            value: Priority::Low,
        },
    )
    .await;
    let draft = BTreeSet::from([Priority::Low]);
    assert!(offers(&replies, &Action::PriorityApply(draft.clone())));
    assert!(session.profile().await.expect("profile").priorities.is_empty());

    let replies = press(&app, Action::PriorityClear).await;
    assert!(offers(&replies, &Action::PriorityApply(BTreeSet::new())));
    assert!(session.profile().await.expect("profile").priorities.is_empty());

    let replies = press(
        &app,
        Action::StatusToggle {
            draft: BTreeSet::from([Status::Todo]),
            value: Status::Done,
        },
    )
    .await;
    assert!(offers(
        &replies,
        &Action::StatusApply(BTreeSet::from([Status::Todo, Status::Done]))
    ));
    assert_eq!(
        session.profile().await.expect("profile").statuses,
        BTreeSet::from([Status::Todo, Status::InProgress])
    );

    press(&app, Action::PriorityApply(draft.clone())).await;
    let profile = session.profile().await.expect("profile");
    assert_eq!(profile.priorities, draft);
    assert_eq!(profile.page_offset, 0);

    press(&app, Action::StatusApply(BTreeSet::from([Status::Done]))).await;
    let profile = session.profile().await.expect("profile");
    assert_eq!(profile.statuses, BTreeSet::from([Status::Done]));
    assert_eq!(profile.priorities, draft);
}

#[tokio::test]
async fn back_renders_the_stored_profile_after_a_draft() {
    let (server, app) = harness().await;
    logged_in(&app).await;
    mount_pages(&server, 23).await;
    let session = app.session(USER);

    press(
        &app,
        Action::PriorityToggle {
            draft: BTreeSet::new(),
            value: Priority::Urgent,
        },
    )
    .await;
    let replies = press(&app, Action::BackToList).await;
    assert!(first_text(&replies).contains("1/3"));
    assert!(offers(&replies, &Action::PageNext));
    assert!(session.profile().await.expect("profile").priorities.is_empty());

    let requests = server.received_requests().await.expect("recording");
    assert_eq!(requests.len(), 1);
    assert!(
        requests[0]
            .url
            .query()
            .is_none_or(|q| !q.contains("priority="))
    );
}

#[tokio::test]
async fn search_prompt_sets_and_clears_the_search() {
    let (server, app) = harness().await;
    logged_in(&app).await;
    mount_pages(&server, 3).await;
    let session = app.session(USER);

    press(&app, Action::Search).await;
    assert_eq!(session.prompt().await.expect("prompt"), Some(Prompt::Search));

    dispatch(&app, &user(), Inbound::from_text("  milk "))
        .await
        .expect("search");
    assert_eq!(session.prompt().await.expect("prompt"), None);
    assert_eq!(
        session.profile().await.expect("profile").search_text.as_deref(),
        Some("milk")
    );

    let requests = server.received_requests().await.expect("recording");
    assert!(requests.iter().any(|r| {
        r.url
            .query_pairs()
            .any(|(k, v)| k == "search" && v == "milk")
    }));

    press(&app, Action::Search).await;
    dispatch(&app, &user(), Inbound::from_text("-"))
        .await
        .expect("clear");
    assert_eq!(session.prompt().await.expect("prompt"), None);
    assert_eq!(session.profile().await.expect("profile").search_text, None);
}

#[tokio::test]
async fn category_picker_paging_keeps_the_filter() {
    let (server, app) = harness().await;
    logged_in(&app).await;
    mount_pages(&server, 3).await;
    let categories: Vec<Value> = (1..=12)
        .map(|id| json!({ "id": id, "name": format!("cat {id}") }))
        .collect();
    Mock::given(method("GET"))
        .and(path("/api/v1/categories/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Value::Array(categories)))
        .mount(&server)
        .await;
    let session = app.session(USER);

    press(&app, Action::CategoryFilterSet(5)).await;
    let before = session.profile().await.expect("profile");
    assert_eq!(before.category_id, Some(5));

    press(&app, Action::CategoryFilterPage(1)).await;
    let after = session.profile().await.expect("profile");
    assert_eq!(after.category_picker_page, 1);
    assert_eq!(after.category_id, Some(5));
    assert_eq!(after.page_offset, before.page_offset);
}

#[tokio::test]
async fn group_more_advances_one_bucket_until_the_page_changes() {
    let (server, app) = harness().await;
    logged_in(&app).await;
    mount_pages(&server, 23).await;
    let session = app.session(USER);

    let replies = press(&app, Action::Refresh).await;
    assert!(offers(&replies, &Action::GroupMore(Bucket::Rest)));

    press(&app, Action::GroupMore(Bucket::Rest)).await;
    let profile = session.profile().await.expect("profile");
    assert_eq!(profile.cursor(Bucket::Rest), app.ui.group_page_size);
    assert_eq!(profile.cursor(Bucket::Urgent), 0);
    assert_eq!(profile.page_offset, 0);

    press(&app, Action::PageNext).await;
    let profile = session.profile().await.expect("profile");
    assert_eq!(profile.page_offset, 10);
    assert_eq!(profile.cursor(Bucket::Rest), 0);
}

#[tokio::test]
async fn next_on_the_last_page_is_refused() {
    let (server, app) = harness().await;
    logged_in(&app).await;
    mount_pages(&server, 10).await;
    let session = app.session(USER);

    let replies = press(&app, Action::PageNext).await;
    assert!(matches!(replies.as_slice(), [Reply::Notice { .. }]));
    assert_eq!(session.profile().await.expect("profile").page_offset, 0);
}

#[tokio::test]
async fn failed_edit_keeps_the_prompt_for_a_retry() {
    let (server, app) = harness().await;
    logged_in(&app).await;

    Mock::given(method("PATCH"))
        .and(path("/api/v1/tasks/5"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/v1/tasks/5"))
        .and(body_partial_json(json!({ "title": "New title" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(task_json(5, "New title", "low")))
        .expect(1)
        .mount(&server)
        .await;
    let session = app.session(USER);

    press(&app, Action::EditTitle(5)).await;
    let pending = Some(Prompt::EditTitle { task_id: 5 });
    assert_eq!(session.prompt().await.expect("prompt"), pending);

    let replies = dispatch(&app, &user(), Inbound::from_text("New title"))
        .await
        .expect("first attempt");
    assert!(first_text(&replies).contains("try again"));
    assert_eq!(session.prompt().await.expect("prompt"), pending);

    let replies = dispatch(&app, &user(), Inbound::from_text("New title"))
        .await
        .expect("retry");
    assert!(first_text(&replies).contains("New title"));
    assert_eq!(session.prompt().await.expect("prompt"), None);
}
