use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::datetime::format_api_date;
use crate::error::{BotError, BotResult};
use crate::session::{SessionStore, StoreError, keys};
use crate::task::{Category, Priority, Status, Task, TaskPage, visible_categories};

#[derive(Debug, Clone, Deserialize)]
pub struct Tokens {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// Authenticated HTTP access to the task API.
///
/// A 401 triggers exactly one token refresh and one retry. Refreshes for the
/// same user are serialized; a request that waited on another's refresh reuses
/// the rotated token instead of refreshing again.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    store: Arc<dyn SessionStore>,
    refresh_locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

fn join_url(base: &str, prefix: &str) -> String {
    let base = base.trim_end_matches('/');
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{prefix}")
    }
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        prefix: &str,
        timeout: Duration,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self, BotError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let base_url = join_url(base_url, prefix);
        info!(base_url = %base_url, timeout_secs = timeout.as_secs(), "api client ready");
        Ok(Self {
            http,
            base_url,
            store,
            refresh_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(
        &self,
        token: Option<&str>,
        method: &Method,
        path: &str,
        json: Option<&Value>,
        params: Option<&[(String, String)]>,
    ) -> Result<Response, reqwest::Error> {
        let mut req = self.http.request(method.clone(), self.url(path));
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        if let Some(params) = params {
            req = req.query(params);
        }
        if let Some(body) = json {
            req = req.json(body);
        }
        req.send().await
    }

    #[tracing::instrument(skip(self, json, params), fields(method = %method))]
    pub async fn request(
        &self,
        user_id: i64,
        method: Method,
        path: &str,
        json: Option<&Value>,
        params: Option<&[(String, String)]>,
    ) -> BotResult<Response> {
        let token = self.store.get(&keys::access_token(user_id)).await?;
        let resp = self
            .send(token.as_deref(), &method, path, json, params)
            .await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }

        debug!("got 401, attempting refresh");
        if !self.refresh(user_id, token.as_deref()).await? {
            return Ok(resp);
        }
        let token = self.store.get(&keys::access_token(user_id)).await?;
        let retried = self
            .send(token.as_deref(), &method, path, json, params)
            .await?;
        debug!(status = retried.status().as_u16(), "retried after refresh");
        Ok(retried)
    }

    async fn refresh_lock(&self, user_id: i64) -> Arc<Mutex<()>> {
        self.refresh_locks
            .lock()
            .await
            .entry(user_id)
            .or_default()
            .clone()
    }

    /// Drops the user's entry once no other request holds or waits on it.
    async fn release_refresh_lock(&self, user_id: i64, lock: &Arc<Mutex<()>>) {
        let mut locks = self.refresh_locks.lock().await;
        if Arc::strong_count(lock) <= 2 {
            locks.remove(&user_id);
        }
    }

    #[tracing::instrument(skip(self, stale))]
    async fn refresh(&self, user_id: i64, stale: Option<&str>) -> Result<bool, BotError> {
        let lock = self.refresh_lock(user_id).await;
        let outcome = {
            let _guard = lock.lock().await;
            self.refresh_tokens(user_id, stale).await
        };
        self.release_refresh_lock(user_id, &lock).await;
        outcome
    }

    async fn refresh_tokens(&self, user_id: i64, stale: Option<&str>) -> Result<bool, BotError> {
        let current = self.store.get(&keys::access_token(user_id)).await?;
        if current.is_some() && current.as_deref() != stale {
            debug!("token already rotated by a concurrent request");
            return Ok(true);
        }

        let Some(refresh_token) = self.store.get(&keys::refresh_token(user_id)).await? else {
            debug!("no refresh token stored");
            return Ok(false);
        };

        let resp = self
            .http
            .post(self.url("/auth/refresh"))
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await?;
        if resp.status() != StatusCode::OK {
            warn!(status = resp.status().as_u16(), "token refresh rejected");
            return Ok(false);
        }

        let body: RefreshResponse = match resp.json().await {
            Ok(body) => body,
            Err(err) => {
                warn!(error = %err, "token refresh returned an unreadable body");
                return Ok(false);
            }
        };
        let (Some(access), Some(refresh)) = (body.access_token, body.refresh_token) else {
            warn!("token refresh response missing tokens");
            return Ok(false);
        };
        store_tokens(self.store.as_ref(), user_id, &access, &refresh).await?;
        info!("refreshed access token");
        Ok(true)
    }

    pub fn tasks(&self) -> TasksApi<'_> {
        TasksApi { client: self }
    }

    pub fn categories(&self) -> CategoriesApi<'_> {
        CategoriesApi { client: self }
    }

    pub fn auth(&self) -> AuthApi<'_> {
        AuthApi { client: self }
    }
}

async fn store_tokens(
    store: &dyn SessionStore,
    user_id: i64,
    access: &str,
    refresh: &str,
) -> Result<(), StoreError> {
    store.set(&keys::access_token(user_id), access, None).await?;
    store.set(&keys::refresh_token(user_id), refresh, None).await
}

/// Maps a response status onto the error taxonomy.
pub fn check_status(resp: Response) -> BotResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    match status {
        StatusCode::UNAUTHORIZED => Err(BotError::AuthRequired),
        StatusCode::NOT_FOUND => Err(BotError::NotFound),
        _ => Err(BotError::Remote {
            status: status.as_u16(),
        }),
    }
}

async fn read_json<T: DeserializeOwned>(resp: Response) -> BotResult<T> {
    let bytes = check_status(resp)?.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Decodes a body when there is one; empty bodies yield `None`.
async fn read_optional_json<T: DeserializeOwned>(resp: Response) -> BotResult<Option<T>> {
    let bytes = check_status(resp)?.bytes().await?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    Ok(serde_json::from_slice(&bytes).ok())
}

async fn error_detail(resp: Response) -> Option<String> {
    let body: Value = resp.json().await.ok()?;
    match body.get("detail")? {
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListBody {
    Wrapped {
        tasks: Vec<Task>,
        #[serde(default)]
        total: Option<usize>,
    },
    Bare(Vec<Task>),
}

impl From<ListBody> for TaskPage {
    fn from(body: ListBody) -> Self {
        match body {
            ListBody::Wrapped { tasks, total } => {
                let total = total.unwrap_or(tasks.len());
                TaskPage { tasks, total }
            }
            ListBody::Bare(tasks) => TaskPage {
                total: tasks.len(),
                tasks,
            },
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
}

/// A single-field change sent with PATCH.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskPatch {
    Title(String),
    Description(Option<String>),
    Status(Status),
    Priority(Priority),
    Due(Option<NaiveDate>),
    Category(Option<i64>),
}

impl TaskPatch {
    pub fn to_json(&self) -> Value {
        match self {
            TaskPatch::Title(title) => json!({ "title": title }),
            TaskPatch::Description(desc) => json!({ "description": desc }),
            TaskPatch::Status(status) => json!({ "status": status.as_str() }),
            TaskPatch::Priority(priority) => json!({ "priority": priority.as_str() }),
            TaskPatch::Due(due) => json!({ "due_date": due.map(format_api_date) }),
            TaskPatch::Category(id) => json!({ "category_id": id }),
        }
    }
}

pub struct TasksApi<'a> {
    client: &'a ApiClient,
}

impl TasksApi<'_> {
    #[tracing::instrument(skip(self, params))]
    pub async fn list(&self, user_id: i64, params: &[(String, String)]) -> BotResult<TaskPage> {
        let resp = self
            .client
            .request(user_id, Method::GET, "/tasks/", None, Some(params))
            .await?;
        let body: ListBody = read_json(resp).await?;
        Ok(body.into())
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(&self, user_id: i64, task_id: i64) -> BotResult<Task> {
        let resp = self
            .client
            .request(user_id, Method::GET, &format!("/tasks/{task_id}"), None, None)
            .await?;
        read_json(resp).await
    }

    #[tracing::instrument(skip(self, task), fields(title_len = task.title.len()))]
    pub async fn create(&self, user_id: i64, task: &NewTask) -> BotResult<Option<Task>> {
        let body = serde_json::to_value(task)?;
        let resp = self
            .client
            .request(user_id, Method::POST, "/tasks/", Some(&body), None)
            .await?;
        read_optional_json(resp).await
    }

    /// Applies the patch and returns the updated task, fetching it when the
    /// response carries no body.
    #[tracing::instrument(skip(self, patch))]
    pub async fn update(&self, user_id: i64, task_id: i64, patch: &TaskPatch) -> BotResult<Task> {
        let body = patch.to_json();
        let resp = self
            .client
            .request(user_id, Method::PATCH, &format!("/tasks/{task_id}"), Some(&body), None)
            .await?;
        self.task_or_refetch(user_id, task_id, resp).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn archive(&self, user_id: i64, task_id: i64) -> BotResult<Task> {
        let resp = self
            .client
            .request(user_id, Method::POST, &format!("/tasks/{task_id}/archive"), None, None)
            .await?;
        self.task_or_refetch(user_id, task_id, resp).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn restore(&self, user_id: i64, task_id: i64) -> BotResult<Task> {
        let resp = self
            .client
            .request(user_id, Method::POST, &format!("/tasks/{task_id}/restore"), None, None)
            .await?;
        self.task_or_refetch(user_id, task_id, resp).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, user_id: i64, task_id: i64) -> BotResult<()> {
        let resp = self
            .client
            .request(user_id, Method::DELETE, &format!("/tasks/{task_id}"), None, None)
            .await?;
        check_status(resp)?;
        Ok(())
    }

    async fn task_or_refetch(&self, user_id: i64, task_id: i64, resp: Response) -> BotResult<Task> {
        match read_optional_json::<Task>(resp).await? {
            Some(task) => Ok(task),
            None => self.get(user_id, task_id).await,
        }
    }
}

pub struct CategoriesApi<'a> {
    client: &'a ApiClient,
}

impl CategoriesApi<'_> {
    /// User-facing categories; the catch-all sentinel is dropped.
    #[tracing::instrument(skip(self))]
    pub async fn list(&self, user_id: i64) -> BotResult<Vec<Category>> {
        let resp = self
            .client
            .request(user_id, Method::GET, "/categories/", None, None)
            .await?;
        let all: Vec<Category> = read_json(resp).await?;
        Ok(visible_categories(all))
    }

    #[tracing::instrument(skip(self, name))]
    pub async fn create(&self, user_id: i64, name: &str) -> BotResult<()> {
        let body = json!({ "name": name });
        let resp = self
            .client
            .request(user_id, Method::POST, "/categories/", Some(&body), None)
            .await?;
        check_status(resp)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, name))]
    pub async fn rename(&self, user_id: i64, category_id: i64, name: &str) -> BotResult<()> {
        let body = json!({ "name": name });
        let resp = self
            .client
            .request(
                user_id,
                Method::PUT,
                &format!("/categories/{category_id}"),
                Some(&body),
                None,
            )
            .await?;
        check_status(resp)?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, user_id: i64, category_id: i64) -> BotResult<()> {
        let resp = self
            .client
            .request(user_id, Method::DELETE, &format!("/categories/{category_id}"), None, None)
            .await?;
        check_status(resp)?;
        Ok(())
    }
}

pub struct AuthApi<'a> {
    client: &'a ApiClient,
}

impl AuthApi<'_> {
    /// Credential exchange; rejected credentials come back as `InvalidInput`.
    #[tracing::instrument(skip_all)]
    pub async fn login(&self, email: &str, password: &str) -> BotResult<Tokens> {
        let resp = self
            .client
            .http
            .post(self.client.url("/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let status = resp.status();
        if matches!(status, StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED) {
            let hint = error_detail(resp)
                .await
                .unwrap_or_else(|| "Wrong email or password.".to_string());
            return Err(BotError::invalid(hint));
        }
        read_json(resp).await
    }

    #[tracing::instrument(skip_all)]
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        first_name: &str,
        last_name: &str,
    ) -> BotResult<()> {
        let body = json!({
            "email": email,
            "first_name": first_name,
            "last_name": last_name,
            "password": password,
        });
        let resp = self
            .client
            .http
            .post(self.client.url("/auth/register"))
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if status.is_client_error() {
            let hint = error_detail(resp)
                .await
                .unwrap_or_else(|| "Registration was rejected.".to_string());
            return Err(BotError::invalid(hint));
        }
        check_status(resp)?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn logout(&self, user_id: i64) -> BotResult<()> {
        let resp = self
            .client
            .request(user_id, Method::POST, "/auth/logout", None, None)
            .await?;
        if !resp.status().is_success() {
            warn!(status = resp.status().as_u16(), "logout call failed, clearing session anyway");
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn me(&self, user_id: i64) -> BotResult<Account> {
        let resp = self
            .client
            .request(user_id, Method::GET, "/auth/me", None, None)
            .await?;
        read_json(resp).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use super::{ApiClient, ListBody, TaskPatch, join_url};
    use crate::session::{MemoryStore, SessionStore};
    use crate::task::{Status, TaskPage};

    #[tokio::test]
    async fn refresh_locks_are_released() {
        let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());
        let client = ApiClient::new("http://127.0.0.1:9", "", Duration::from_secs(1), store)
            .expect("client");

        for user_id in 1..=3 {
            let refreshed = client.refresh(user_id, None).await.expect("refresh");
            assert!(!refreshed);
        }
        assert!(client.refresh_locks.lock().await.is_empty());
    }

    #[test]
    fn joins_base_and_prefix() {
        assert_eq!(join_url("http://localhost:8000/", "/api/v1"), "http://localhost:8000/api/v1");
        assert_eq!(join_url("http://api", ""), "http://api");
    }

    #[test]
    fn list_body_accepts_both_shapes() {
        let wrapped: ListBody = serde_json::from_value(json!({
            "tasks": [{"id": 1, "status": "todo"}],
            "total": 23
        }))
        .expect("wrapped");
        let page: TaskPage = wrapped.into();
        assert_eq!(page.total, 23);
        assert_eq!(page.tasks.len(), 1);

        let bare: ListBody =
            serde_json::from_value(json!([{"id": 1, "status": "todo"}, {"id": 2, "status": "done"}]))
                .expect("bare");
        let page: TaskPage = bare.into();
        assert_eq!(page.total, 2);
    }

    #[test]
    fn patches_serialize_nulls_for_clears() {
        assert_eq!(TaskPatch::Due(None).to_json(), json!({"due_date": null}));
        assert_eq!(TaskPatch::Category(Some(3)).to_json(), json!({"category_id": 3}));
        assert_eq!(
            TaskPatch::Status(Status::InProgress).to_json(),
            json!({"status": "in_progress"})
        );
    }
}
