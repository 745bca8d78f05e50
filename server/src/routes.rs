//! HTTP route handlers for the todolist server.
//!
//! This module provides the HTTP API endpoints:
//!
//! - `GET /health` - Health check endpoint
//! - `POST /tasks` - Create tasks
//! - `GET /tasks` - List tasks with filters and pagination
//! - `PATCH /tasks` - Partially update tasks
//! - `POST /tasks/read` - Read tasks by filename
//! - `POST /tasks/archive` - Move tasks into `archive/`
//! - `POST /reminders` - Schedule ad-hoc reminders
//! - `GET /reminders` - List pending reminders
//! - `DELETE /reminders` - Cancel reminders
//!
//! # Architecture
//!
//! All routes share application state through [`AppState`], which contains:
//! - Configuration (including the optional API token)
//! - The GitHub-backed [`TaskStore`]
//! - The [`ReminderEngine`] that task writes feed into
//! - Server start time for uptime reporting
//!
//! Every endpoint except `/health` requires the bearer token when one is
//! configured.

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Query, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use uuid::Uuid;

use todolist_reminders::{IngestReport, Rejection, ReminderEngine, ReminderEntry, ReminderKey};

use crate::auth;
use crate::config::Config;
use crate::error::ApiError;
use crate::store::TaskStore;
use crate::tasks::{task_path, ListQuery, StoredTask, Task, TaskPage};

// ============================================================================
// Constants
// ============================================================================

/// Maximum request body size (1 MB).
const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Source key for reminders not linked to a task.
const ADHOC_SOURCE: &str = "adhoc";

/// Suffix of the source key for ad-hoc reminders linked to a task.
const LINKED_ADHOC_SUFFIX: &str = "#adhoc";

/// Title used when an ad-hoc reminder has none.
const DEFAULT_REMINDER_TITLE: &str = "Reminder";

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for all route handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<Config>,

    /// Task persistence.
    pub store: TaskStore,

    /// Reminder queue fed by task writes.
    pub engine: Arc<ReminderEngine>,

    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Creates application state from its components.
    #[must_use]
    pub fn new(config: Config, store: TaskStore, engine: Arc<ReminderEngine>) -> Self {
        Self {
            config: Arc::new(config),
            store,
            engine,
            start_time: Instant::now(),
        }
    }

    fn authorize(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        auth::authorize(headers, self.config.api_token.as_deref())?;
        Ok(())
    }

    /// Aligns the pending reminders of a stored task with its current list.
    ///
    /// Ad-hoc reminders linked to the task live under their own source key
    /// and are not touched.
    fn sync_reminders(&self, stored: &StoredTask) -> IngestReport {
        stored
            .task
            .reminder_view(&stored.path)
            .resync_into(&self.engine)
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &"<Config>")
            .field("pending_reminders", &self.engine.pending_len())
            .field("start_time", &self.start_time)
            .finish()
    }
}

// ============================================================================
// Router
// ============================================================================

/// Creates the application router with all routes configured.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/tasks", post(create_tasks).get(list_tasks).patch(update_tasks))
        .route("/tasks/read", post(read_tasks))
        .route("/tasks/archive", post(archive_tasks))
        .route(
            "/reminders",
            post(create_reminders)
                .get(list_reminders)
                .delete(delete_reminders),
        )
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Body of `POST /tasks`.
#[derive(Debug, Deserialize)]
pub struct CreateTasksRequest {
    pub tasks: Vec<Value>,
    /// Optional explicit filenames, matched to `tasks` by position.
    #[serde(default)]
    pub filenames: Vec<Option<String>>,
}

/// Response of `POST /tasks`.
#[derive(Debug, Serialize)]
pub struct CreateTasksResponse {
    pub created: Vec<String>,
    pub reminders: IngestReport,
}

/// Body of `POST /tasks/read` and `POST /tasks/archive`.
#[derive(Debug, Deserialize)]
pub struct FilenamesRequest {
    pub filenames: Vec<String>,
}

/// One task in a read response.
#[derive(Debug, Serialize)]
pub struct TaskWithSha {
    pub filename: String,
    pub task: Task,
    pub sha: String,
}

/// Response of `POST /tasks/read`.
#[derive(Debug, Serialize)]
pub struct ReadTasksResponse {
    pub tasks: Vec<TaskWithSha>,
}

/// Body of `PATCH /tasks`. Each update holds `filename` plus the fields to
/// replace.
#[derive(Debug, Deserialize)]
pub struct UpdateTasksRequest {
    pub updates: Vec<Map<String, Value>>,
}

/// Response of `PATCH /tasks`.
#[derive(Debug, Serialize)]
pub struct UpdateTasksResponse {
    pub updated: Vec<String>,
    pub reminders: IngestReport,
}

/// Response of `POST /tasks/archive`.
#[derive(Debug, Serialize)]
pub struct ArchiveTasksResponse {
    pub archived: Vec<String>,
    pub cancelled_reminders: usize,
}

/// One reminder of `POST /reminders`.
#[derive(Debug, Deserialize)]
pub struct ReminderRequest {
    pub title: Option<String>,
    pub message: Option<String>,
    pub due_at: Option<String>,
    pub task_filename: Option<String>,
}

/// Body of `POST /reminders`.
#[derive(Debug, Deserialize)]
pub struct CreateRemindersRequest {
    pub reminders: Vec<ReminderRequest>,
    /// Task linked to every reminder that does not name its own.
    pub task_filename: Option<String>,
}

/// Outcome of one reminder in `POST /reminders`.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReminderResult {
    Added { id: Uuid, due_at: String },
    Duplicate { id: Uuid },
    Rejected { error: String, code: &'static str },
}

/// Response of `POST /reminders`.
#[derive(Debug, Serialize)]
pub struct CreateRemindersResponse {
    pub results: Vec<ReminderResult>,
}

/// Response of `GET /reminders`.
#[derive(Debug, Serialize)]
pub struct ListRemindersResponse {
    pub reminders: Vec<ReminderEntry>,
    pub delivered: u64,
}

/// Body of `DELETE /reminders`.
#[derive(Debug, Default, Deserialize)]
pub struct DeleteRemindersRequest {
    #[serde(default)]
    pub ids: Vec<String>,
    #[serde(default)]
    pub all: bool,
}

/// Response of `DELETE /reminders`.
#[derive(Debug, Serialize)]
pub struct DeleteRemindersResponse {
    pub removed: usize,
    pub not_found: Vec<String>,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Server status (always "ok" if responding).
    pub status: String,

    /// Server uptime in seconds.
    pub uptime_seconds: u64,

    /// Reminders waiting to be delivered.
    pub pending_reminders: usize,

    /// Reminders delivered since start.
    pub delivered_reminders: u64,
}

// ============================================================================
// Task endpoints
// ============================================================================

/// POST /tasks - Create tasks.
///
/// All payloads are validated before anything is written. Reminders of the
/// created tasks are scheduled immediately.
async fn create_tasks(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateTasksRequest>,
) -> Result<Json<CreateTasksResponse>, ApiError> {
    state.authorize(&headers)?;
    if request.tasks.is_empty() {
        return Err(ApiError::bad_request("tasks must not be empty"));
    }

    let tasks = request
        .tasks
        .into_iter()
        .map(Task::from_json)
        .collect::<Result<Vec<_>, _>>()?;

    let now = state.engine.now();
    let mut created = Vec::with_capacity(tasks.len());
    let mut reminders = IngestReport::default();

    for (idx, task) in tasks.into_iter().enumerate() {
        let filename = request.filenames.get(idx).and_then(Option::as_deref);
        let stored = state.store.create(task, filename, now).await?;
        reminders += state.sync_reminders(&stored);
        created.push(stored.path);
    }

    info!(count = created.len(), scheduled = reminders.scheduled, "Created tasks");
    Ok(Json(CreateTasksResponse { created, reminders }))
}

/// POST /tasks/read - Read tasks by filename.
async fn read_tasks(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<FilenamesRequest>,
) -> Result<Json<ReadTasksResponse>, ApiError> {
    state.authorize(&headers)?;
    require_filenames(&request.filenames)?;

    let mut tasks = Vec::with_capacity(request.filenames.len());
    for name in &request.filenames {
        let stored = state.store.read(name).await?;
        tasks.push(TaskWithSha {
            filename: stored.path,
            task: stored.task,
            sha: stored.sha,
        });
    }

    Ok(Json(ReadTasksResponse { tasks }))
}

/// PATCH /tasks - Merge fields into stored tasks.
async fn update_tasks(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<UpdateTasksRequest>,
) -> Result<Json<UpdateTasksResponse>, ApiError> {
    state.authorize(&headers)?;
    if request.updates.is_empty() {
        return Err(ApiError::bad_request("updates must not be empty"));
    }

    let filenames = request
        .updates
        .iter()
        .map(|update| match update.get("filename") {
            Some(Value::String(name)) if !name.trim().is_empty() => Ok(name.clone()),
            _ => Err(ApiError::bad_request_with_code(
                "every update needs a filename",
                "missing_filename",
            )),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let now = state.engine.now();
    let mut updated = Vec::with_capacity(filenames.len());
    let mut reminders = IngestReport::default();

    for (filename, fields) in filenames.iter().zip(&request.updates) {
        let stored = state.store.update(filename, fields, now).await?;
        reminders += state.sync_reminders(&stored);
        updated.push(stored.path);
    }

    info!(count = updated.len(), scheduled = reminders.scheduled, "Updated tasks");
    Ok(Json(UpdateTasksResponse { updated, reminders }))
}

/// POST /tasks/archive - Move tasks into `archive/` and drop their reminders.
async fn archive_tasks(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<FilenamesRequest>,
) -> Result<Json<ArchiveTasksResponse>, ApiError> {
    state.authorize(&headers)?;
    require_filenames(&request.filenames)?;

    let mut archived = Vec::with_capacity(request.filenames.len());
    let mut cancelled_reminders = 0;

    for name in &request.filenames {
        let target = state.store.archive(name).await?;
        let path = task_path(name);
        cancelled_reminders += state.engine.cancel_source(&path);
        cancelled_reminders += state.engine.cancel_source(&linked_adhoc_source(&path));
        archived.push(target);
    }

    Ok(Json(ArchiveTasksResponse {
        archived,
        cancelled_reminders,
    }))
}

/// GET /tasks - List active tasks.
///
/// # Query Parameters
///
/// - `status`, `priority`, `urgency` - comma-separated lists
/// - `tags` - comma-separated, a task must carry all of them
/// - `assignee` - exact match
/// - `due_before`, `due_after` - RFC 3339 bounds, inclusive
/// - `page`, `page_size`, `include_description`
async fn list_tasks(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<TaskPage>, ApiError> {
    state.authorize(&headers)?;
    let filter = query.parse()?;
    let page = state.store.list(&filter).await?;
    debug!(total = page.total, page = page.page, "Listed tasks");
    Ok(Json(page))
}

fn require_filenames(filenames: &[String]) -> Result<(), ApiError> {
    if filenames.is_empty() || filenames.iter().any(|name| name.trim().is_empty()) {
        return Err(ApiError::bad_request_with_code(
            "filenames must be a non-empty list of non-empty names",
            "missing_filename",
        ));
    }
    Ok(())
}

// ============================================================================
// Reminder endpoints
// ============================================================================

/// POST /reminders - Schedule ad-hoc reminders.
///
/// Each reminder is handled on its own; one bad entry does not reject the
/// others.
async fn create_reminders(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateRemindersRequest>,
) -> Result<Json<CreateRemindersResponse>, ApiError> {
    state.authorize(&headers)?;

    let results = request
        .reminders
        .iter()
        .map(|reminder| schedule_one(&state.engine, reminder, request.task_filename.as_deref()))
        .collect();

    Ok(Json(CreateRemindersResponse { results }))
}

/// Source key of the ad-hoc reminders attached to the task at `path`.
fn linked_adhoc_source(path: &str) -> String {
    format!("{path}{LINKED_ADHOC_SUFFIX}")
}

fn schedule_one(
    engine: &ReminderEngine,
    reminder: &ReminderRequest,
    default_task: Option<&str>,
) -> ReminderResult {
    let Some(due_at) = reminder.due_at.as_deref().filter(|d| !d.trim().is_empty()) else {
        return ReminderResult::Rejected {
            error: "missing due_at timestamp".to_string(),
            code: "missing_due_at",
        };
    };

    let title = reminder.title.as_deref().unwrap_or(DEFAULT_REMINDER_TITLE);
    let message = reminder.message.as_deref().unwrap_or_default();

    // Task-linked reminders are keyed by instant under the task's ad-hoc
    // source; unlinked ones by instant and title.
    let (source_key, origin_token) =
        match reminder.task_filename.as_deref().or(default_task) {
            Some(task) => (linked_adhoc_source(&task_path(task)), due_at.to_string()),
            None => (ADHOC_SOURCE.to_string(), format!("{due_at}#{title}")),
        };

    match engine.try_schedule(&source_key, &origin_token, due_at, title, message) {
        Ok(entry) => ReminderResult::Added {
            id: entry.id,
            due_at: entry.due_instant.to_rfc3339(),
        },
        Err(Rejection::Duplicate) => ReminderResult::Duplicate {
            id: ReminderKey::new(source_key, origin_token).id(),
        },
        Err(Rejection::PastDue { due }) => ReminderResult::Rejected {
            error: format!("due_at {} is not in the future", due.to_rfc3339()),
            code: "past_due",
        },
        Err(Rejection::Malformed(err)) => ReminderResult::Rejected {
            error: format!("invalid due_at: {err}"),
            code: "invalid_due_at",
        },
    }
}

/// GET /reminders - Pending reminders in due order.
async fn list_reminders(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ListRemindersResponse>, ApiError> {
    state.authorize(&headers)?;
    Ok(Json(ListRemindersResponse {
        reminders: state.engine.pending(),
        delivered: state.engine.delivered_count(),
    }))
}

/// DELETE /reminders - Cancel reminders by id, or all of them.
async fn delete_reminders(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<DeleteRemindersRequest>,
) -> Result<Json<DeleteRemindersResponse>, ApiError> {
    state.authorize(&headers)?;

    if request.all {
        let removed = state.engine.clear();
        info!(removed, "Cleared all pending reminders");
        return Ok(Json(DeleteRemindersResponse {
            removed,
            not_found: Vec::new(),
        }));
    }

    if request.ids.is_empty() {
        return Err(ApiError::bad_request_with_code(
            "must specify either ids or all",
            "missing_ids",
        ));
    }

    let mut removed = 0;
    let mut not_found = Vec::new();
    for raw in request.ids {
        match Uuid::parse_str(&raw) {
            Ok(id) if state.engine.cancel(id) => removed += 1,
            _ => not_found.push(raw),
        }
    }

    Ok(Json(DeleteRemindersResponse { removed, not_found }))
}

// ============================================================================
// GET /health - Health Check
// ============================================================================

/// GET /health - Health check endpoint.
///
/// No authentication required.
///
/// # Response
///
/// ```json
/// {
///   "status": "ok",
///   "uptime_seconds": 3600,
///   "pending_reminders": 4,
///   "delivered_reminders": 12
/// }
/// ```
async fn get_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        pending_reminders: state.engine.pending_len(),
        delivered_reminders: state.engine.delivered_count(),
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::{DateTime, TimeZone, Utc};
    use tower::ServiceExt;
    use todolist_reminders::{EngineConfig, ManualClock};

    use crate::config::{GitHubConfig, NotifierKind};
    use crate::github::GitHubClient;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    /// Creates a test configuration pointing at an unroutable GitHub.
    fn test_config(api_token: Option<&str>) -> Config {
        Config {
            github: GitHubConfig {
                owner: "octo".to_string(),
                repo: "tasks".to_string(),
                token: "gh-token".to_string(),
                branch: "main".to_string(),
                api_url: "http://127.0.0.1:9".to_string(),
            },
            port: 8080,
            api_token: api_token.map(str::to_string),
            data_dir: PathBuf::from("/tmp/todolist-test"),
            sound_path: PathBuf::from("/tmp/todolist-test/bell.wav"),
            notifier: NotifierKind::Log,
            reminder_poll_interval: Duration::from_millis(250),
            shutdown_timeout: Duration::from_secs(2),
        }
    }

    fn test_state(api_token: Option<&str>) -> AppState {
        let config = test_config(api_token);
        let client = GitHubClient::new(&config.github).expect("client");
        let engine = Arc::new(ReminderEngine::with_clock(
            EngineConfig::default(),
            Arc::new(ManualClock::new(start())),
        ));
        AppState::new(config, TaskStore::new(client), engine)
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    // ========================================================================
    // Health endpoint tests
    // ========================================================================

    #[tokio::test]
    async fn health_returns_ok_without_auth() {
        let app = create_router(test_state(Some("secret")));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let health: HealthResponse =
            serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(health.status, "ok");
        assert_eq!(health.pending_reminders, 0);
    }

    // ========================================================================
    // Auth tests
    // ========================================================================

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let app = create_router(test_state(Some("secret")));

        let response = app
            .oneshot(Request::builder().uri("/reminders").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["code"], "missing_token");
    }

    #[tokio::test]
    async fn wrong_token_is_unauthorized() {
        let app = create_router(test_state(Some("secret")));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/reminders")
                    .header("Authorization", "Bearer wrong")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["code"], "invalid_token");
    }

    #[tokio::test]
    async fn correct_token_is_accepted() {
        let app = create_router(test_state(Some("secret")));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/reminders")
                    .header("Authorization", "Bearer secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    // ========================================================================
    // Validation tests (rejected before GitHub is contacted)
    // ========================================================================

    #[tokio::test]
    async fn create_rejects_empty_task_list() {
        let app = create_router(test_state(None));
        let response = app
            .oneshot(json_request("POST", "/tasks", serde_json::json!({ "tasks": [] })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn create_rejects_blank_title() {
        let app = create_router(test_state(None));
        let response = app
            .oneshot(json_request(
                "POST",
                "/tasks",
                serde_json::json!({ "tasks": [{ "title": "  " }] }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "invalid_task");
    }

    #[tokio::test]
    async fn update_requires_filename_on_every_entry() {
        let app = create_router(test_state(None));
        let response = app
            .oneshot(json_request(
                "PATCH",
                "/tasks",
                serde_json::json!({ "updates": [{ "status": "done" }] }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "missing_filename");
    }

    #[tokio::test]
    async fn list_rejects_unknown_status() {
        let app = create_router(test_state(None));
        let response = app
            .oneshot(Request::builder().uri("/tasks?status=blocked").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unreachable_github_is_bad_gateway() {
        let app = create_router(test_state(None));
        let response = app
            .oneshot(json_request(
                "POST",
                "/tasks/read",
                serde_json::json!({ "filenames": ["a.yaml"] }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    // ========================================================================
    // Reminder endpoint tests
    // ========================================================================

    #[tokio::test]
    async fn create_reminders_reports_each_item() {
        let state = test_state(None);
        let app = create_router(state.clone());

        let response = app
            .oneshot(json_request(
                "POST",
                "/reminders",
                serde_json::json!({
                    "task_filename": "standup.yaml",
                    "reminders": [
                        { "title": "Standup", "message": "Join", "due_at": "2026-03-01T10:00:00Z" },
                        { "title": "Standup", "due_at": "2026-03-01T10:00:00Z" },
                        { "title": "Old", "due_at": "2026-02-01T10:00:00Z" },
                        { "title": "Bad", "due_at": "tomorrow-ish" },
                        { "title": "Missing" }
                    ]
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let statuses: Vec<&str> = body["results"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["status"].as_str().unwrap())
            .collect();
        assert_eq!(
            statuses,
            vec!["added", "duplicate", "rejected", "rejected", "rejected"]
        );
        assert_eq!(body["results"][0]["id"], body["results"][1]["id"]);
        assert_eq!(body["results"][2]["code"], "past_due");
        assert_eq!(body["results"][3]["code"], "invalid_due_at");
        assert_eq!(body["results"][4]["code"], "missing_due_at");

        let pending = state.engine.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].source_key, "tasks/standup.yaml#adhoc");
    }

    #[tokio::test]
    async fn list_and_delete_reminders() {
        let state = test_state(None);
        let first = state
            .engine
            .try_schedule("adhoc", "a", "2026-03-01T12:00:00Z", "Later", "m")
            .unwrap();
        state
            .engine
            .try_schedule("adhoc", "b", "2026-03-01T10:00:00Z", "Sooner", "m")
            .unwrap();

        let response = create_router(state.clone())
            .oneshot(Request::builder().uri("/reminders").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["reminders"][0]["title"], "Sooner");
        assert_eq!(body["reminders"][1]["title"], "Later");

        let response = create_router(state.clone())
            .oneshot(json_request(
                "DELETE",
                "/reminders",
                serde_json::json!({ "ids": [first.id.to_string(), "not-a-uuid"] }),
            ))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["removed"], 1);
        assert_eq!(body["not_found"], serde_json::json!(["not-a-uuid"]));
        assert_eq!(state.engine.pending_len(), 1);

        let response = create_router(state.clone())
            .oneshot(json_request("DELETE", "/reminders", serde_json::json!({ "all": true })))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["removed"], 1);
        assert_eq!(state.engine.pending_len(), 0);
    }

    #[tokio::test]
    async fn delete_reminders_requires_ids_or_all() {
        let app = create_router(test_state(None));
        let response = app
            .oneshot(json_request("DELETE", "/reminders", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "missing_ids");
    }

    // ========================================================================
    // Reminder sync on task writes
    // ========================================================================

    fn state_with_clock(clock: &ManualClock) -> AppState {
        let config = test_config(None);
        let client = GitHubClient::new(&config.github).expect("client");
        let engine = Arc::new(ReminderEngine::with_clock(
            EngineConfig::default(),
            Arc::new(clock.clone()),
        ));
        AppState::new(config, TaskStore::new(client), engine)
    }

    fn stored(path: &str, task: Value) -> StoredTask {
        StoredTask {
            path: path.to_string(),
            sha: "sha".to_string(),
            task: Task::from_json(task).unwrap(),
        }
    }

    #[test]
    fn task_edit_keeps_linked_adhoc_reminders() {
        let state = test_state(None);
        let reminder = ReminderRequest {
            title: Some("Look at the PR".to_string()),
            message: None,
            due_at: Some("2026-03-01T12:00:00Z".to_string()),
            task_filename: Some("review.yaml".to_string()),
        };
        assert!(matches!(
            schedule_one(&state.engine, &reminder, None),
            ReminderResult::Added { .. }
        ));

        let report = state.sync_reminders(&stored(
            "tasks/review.yaml",
            serde_json::json!({ "title": "Review" }),
        ));

        assert_eq!(report.cancelled, 0);
        let pending = state.engine.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].title, "Look at the PR");
    }

    #[test]
    fn task_edit_keeps_a_due_reminder_that_was_not_popped_yet() {
        let clock = ManualClock::new(start());
        let state = state_with_clock(&clock);
        let due = (start() + chrono::Duration::seconds(1)).to_rfc3339();

        let first = state.sync_reminders(&stored(
            "tasks/a.yaml",
            serde_json::json!({ "title": "A", "reminders": [due] }),
        ));
        assert_eq!(first.scheduled, 1);

        clock.advance(chrono::Duration::seconds(2));
        let second = state.sync_reminders(&stored(
            "tasks/a.yaml",
            serde_json::json!({ "title": "A renamed", "reminders": [due] }),
        ));

        assert_eq!(second.past_due, 0);
        let pending = state.engine.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].title, "A renamed");
    }

    #[test]
    fn task_edit_drops_reminders_removed_from_the_task() {
        let state = test_state(None);
        state.sync_reminders(&stored(
            "tasks/a.yaml",
            serde_json::json!({
                "title": "A",
                "reminders": ["2026-03-01T10:00:00Z", "2026-03-01T11:00:00Z"],
            }),
        ));

        let report = state.sync_reminders(&stored(
            "tasks/a.yaml",
            serde_json::json!({ "title": "A", "reminders": ["2026-03-01T11:00:00Z"] }),
        ));

        assert_eq!(report.cancelled, 1);
        let tokens: Vec<String> = state
            .engine
            .pending()
            .into_iter()
            .map(|e| e.origin_token)
            .collect();
        assert_eq!(tokens, vec!["2026-03-01T11:00:00Z"]);
    }
}
