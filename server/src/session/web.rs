use askama::Template;
use axum::{
    Form, Json, Router,
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::CurrentUser;
use crate::session::{
    Booking, ProgressUpdate, Session, SessionService, SessionServiceError, SessionStatus,
};
use crate::task::{TaskService, TaskServiceError};

#[derive(Clone, Debug)]
pub struct SessionState {
    pub db: Arc<sea_orm::DatabaseConnection>,
}

#[derive(Debug, Deserialize)]
pub struct BookSessionForm {
    task_id: i32,
    planned_start: String,
    planned_end: String,
    #[serde(default)]
    notes: String,
}

#[derive(Debug, Deserialize)]
pub struct SessionListQuery {
    status: Option<String>,
    overtime_planned: Option<i64>,
    overtime_remaining: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct BookFormQuery {
    task_id: Option<i32>,
}

/// JSON payload accepted by the progress endpoint. Absent fields keep the
/// stored value.
#[derive(Debug, Deserialize)]
pub struct ProgressUpdateRequest {
    actual_minutes: Option<i32>,
    completion_percent: Option<i32>,
    notes: Option<String>,
    #[serde(default)]
    mark_complete: bool,
}

#[derive(Debug, Serialize)]
pub struct ProgressUpdateResponse {
    success: bool,
    status: &'static str,
    status_display: &'static str,
    actual_minutes: i32,
    completion_percent: i32,
}

#[derive(Debug, Deserialize)]
pub struct RescheduleRequest {
    planned_start: String,
    planned_end: String,
}

#[derive(Debug, Serialize)]
pub struct RescheduleResponse {
    success: bool,
}

/// JSON error payload for the progress and reschedule endpoints.
#[derive(Debug, Serialize)]
pub struct JsonError {
    error: String,
}

/// Custom error type for session handler operations.
#[derive(Debug, thiserror::Error)]
enum SessionError {
    /// Represents an error during template rendering.
    #[error("Template rendering failed")]
    Template(#[from] askama::Error),
    /// Represents a session service error.
    #[error("Session service error")]
    Service(#[from] SessionServiceError),
    /// Represents a task service error.
    #[error("Task service error")]
    Task(#[from] TaskServiceError),
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        let (status_code, user_facing_error_message) = match &self {
            SessionError::Service(err) if err.is_validation() => {
                (StatusCode::BAD_REQUEST, err.to_string())
            }
            SessionError::Service(
                SessionServiceError::SessionNotFound(_) | SessionServiceError::TaskNotFound(_),
            ) => (StatusCode::NOT_FOUND, "Session not found.".to_string()),
            SessionError::Task(TaskServiceError::TaskNotFound(_)) => {
                (StatusCode::NOT_FOUND, "Task not found.".to_string())
            }
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An unexpected error occurred while processing your request. Please try again later."
                    .to_string(),
            ),
        };

        (
            status_code,
            Html(format!(
                "<h1>Error</h1><p>{}</p>",
                user_facing_error_message
            )),
        )
            .into_response()
    }
}

/// Maps a service error to the JSON error payload used by the progress and
/// reschedule endpoints.
fn json_error(err: SessionServiceError) -> (StatusCode, Json<JsonError>) {
    let (status_code, message) = match &err {
        SessionServiceError::Database(_) => {
            tracing::error!("Session operation failed: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An unexpected error occurred.".to_string(),
            )
        }
        SessionServiceError::SessionNotFound(_) => {
            (StatusCode::NOT_FOUND, "Session not found.".to_string())
        }
        _ => (StatusCode::BAD_REQUEST, err.to_string()),
    };
    (status_code, Json(JsonError { error: message }))
}

/// Parses the browser's datetime-local format, with or without seconds.
fn parse_form_datetime(value: &str) -> Option<DateTime<Utc>> {
    const FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S"];
    FORMATS.iter().find_map(|format| {
        NaiveDateTime::parse_from_str(value, format)
            .ok()
            .map(|naive| naive.and_utc())
    })
}

/// Parses a timestamp from a JSON body: RFC 3339 or the form format.
fn parse_json_datetime(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
        .or_else(|| parse_form_datetime(value))
}

/// Presentation form of a session for the HTML pages.
pub struct SessionView {
    pub id: i32,
    pub task_title: String,
    pub planned_start: String,
    pub planned_end: String,
    pub planned_minutes: i64,
    pub actual_minutes: i32,
    pub completion_percent: i32,
    pub status: &'static str,
    pub status_label: &'static str,
    pub notes: String,
    pub can_cancel: bool,
    pub can_delete: bool,
    pub can_log_progress: bool,
    pub can_reschedule: bool,
}

impl SessionView {
    fn new(session: Session, task_title: String) -> Self {
        let status = session.status();
        Self {
            id: session.id(),
            task_title,
            planned_start: session.planned_start().format("%Y-%m-%d %H:%M").to_string(),
            planned_end: session.planned_end().format("%Y-%m-%d %H:%M").to_string(),
            planned_minutes: session.planned_minutes(),
            actual_minutes: session.actual_minutes(),
            completion_percent: session.completion_percent(),
            status: status.as_str(),
            status_label: status.label(),
            notes: session.notes().to_string(),
            can_cancel: matches!(status, SessionStatus::Pending | SessionStatus::InProgress),
            can_delete: status == SessionStatus::Cancelled,
            can_log_progress: matches!(
                status,
                SessionStatus::InProgress | SessionStatus::Completed
            ),
            can_reschedule: matches!(status, SessionStatus::Pending | SessionStatus::InProgress),
        }
    }
}

/// A task offered in the booking form, with its remaining target minutes.
pub struct TaskChoice {
    pub id: i32,
    pub title: String,
    pub remaining: i64,
    pub selected: bool,
}

#[derive(Template)]
#[template(path = "sessions/session_list.html")]
struct SessionListTemplate {
    sessions: Vec<SessionView>,
    status_filter: String,
    warning: Option<String>,
}

#[derive(Template)]
#[template(path = "sessions/session_book.html")]
struct SessionBookTemplate {
    tasks: Vec<TaskChoice>,
    error: Option<String>,
}

#[derive(Template)]
#[template(path = "sessions/session_detail.html")]
struct SessionDetailTemplate {
    session: SessionView,
}

/// Builds the booking form's task choices: the user's active tasks with the
/// minutes left before each target.
async fn task_choices(
    db: &sea_orm::DatabaseConnection,
    username: &str,
    selected_task_id: Option<i32>,
) -> Result<Vec<TaskChoice>, SessionError> {
    let task_service = TaskService::new(db);
    let session_service = SessionService::new(db);

    let mut choices = Vec::new();
    for task in task_service.get_active_tasks(username).await? {
        let remaining = session_service.remaining_minutes(&task).await?.max(0);
        choices.push(TaskChoice {
            id: task.id(),
            title: task.title().to_string(),
            remaining,
            selected: selected_task_id == Some(task.id()),
        });
    }
    Ok(choices)
}

/// Re-renders the booking form with a validation message and a 400 status.
async fn book_form_error(
    state: &SessionState,
    username: &str,
    message: String,
) -> Result<Response, SessionError> {
    let tasks = task_choices(&state.db, username, None).await?;
    let template = SessionBookTemplate {
        tasks,
        error: Some(message),
    };
    let html = template.render().map_err(SessionError::from)?;
    Ok((StatusCode::BAD_REQUEST, Html(html)).into_response())
}

/// Handler for the /sessions endpoint that lists the user's sessions,
/// optionally narrowed to one status.
#[tracing::instrument(skip(state))]
async fn session_list_handler(
    State(state): State<Arc<SessionState>>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<SessionListQuery>,
) -> Result<Html<String>, SessionError> {
    let status_filter = query.status.unwrap_or_default();
    let status = SessionStatus::parse(&status_filter);

    let session_service = SessionService::new(&state.db);
    let rows = session_service
        .get_sessions_with_tasks(&user.username, status)
        .await?;
    let sessions = rows
        .into_iter()
        .map(|(session, title)| SessionView::new(session, title))
        .collect();

    let warning = match (query.overtime_planned, query.overtime_remaining) {
        (Some(planned), Some(remaining)) => Some(format!(
            "Heads up: this session ({} min) exceeds your remaining target ({} min). Progress will be capped at 100%.",
            planned, remaining
        )),
        _ => None,
    };

    let template = SessionListTemplate {
        sessions,
        status_filter,
        warning,
    };
    template.render().map(Html).map_err(SessionError::from)
}

/// Handler for serving the session booking form. A `task_id` query parameter
/// preselects that task.
#[tracing::instrument(skip(state))]
async fn book_form_handler(
    State(state): State<Arc<SessionState>>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<BookFormQuery>,
) -> Result<Html<String>, SessionError> {
    let tasks = task_choices(&state.db, &user.username, query.task_id).await?;
    let template = SessionBookTemplate { tasks, error: None };
    template.render().map(Html).map_err(SessionError::from)
}

/// Handler for booking a session via POST request. Redirects to the session
/// list on success; an overtime warning survives the redirect as query
/// parameters.
#[tracing::instrument(skip(state))]
async fn book_session_handler(
    State(state): State<Arc<SessionState>>,
    Extension(user): Extension<CurrentUser>,
    Form(form): Form<BookSessionForm>,
) -> Result<Response, SessionError> {
    let Some(start) = parse_form_datetime(&form.planned_start) else {
        return book_form_error(&state, &user.username, "Invalid date format.".to_string()).await;
    };
    let Some(end) = parse_form_datetime(&form.planned_end) else {
        return book_form_error(&state, &user.username, "Invalid date format.".to_string()).await;
    };

    let session_service = SessionService::new(&state.db);
    match session_service
        .book_session(&user.username, form.task_id, start, end, form.notes)
        .await
    {
        Ok(Booking {
            overtime: Some(warning),
            ..
        }) => Ok(Redirect::to(&format!(
            "/sessions?overtime_planned={}&overtime_remaining={}",
            warning.planned_minutes, warning.remaining_minutes
        ))
        .into_response()),
        Ok(_) => Ok(Redirect::to("/sessions").into_response()),
        Err(SessionServiceError::TaskNotFound(_)) => {
            book_form_error(
                &state,
                &user.username,
                "Select one of your active tasks.".to_string(),
            )
            .await
        }
        Err(err) if err.is_validation() => {
            book_form_error(&state, &user.username, err.to_string()).await
        }
        Err(err) => Err(SessionError::Service(err)),
    }
}

/// Handler for the session detail page.
#[tracing::instrument(skip(state))]
async fn session_detail_handler(
    State(state): State<Arc<SessionState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Html<String>, SessionError> {
    let session_service = SessionService::new(&state.db);
    let session = session_service.view_session(&user.username, id).await?;
    let task = TaskService::new(&state.db)
        .get_task(&user.username, session.task_id())
        .await?;

    let template = SessionDetailTemplate {
        session: SessionView::new(session, task.title().to_string()),
    };
    template.render().map(Html).map_err(SessionError::from)
}

/// Handler for recording progress via a JSON POST request.
#[tracing::instrument(skip(state))]
async fn update_progress_handler(
    State(state): State<Arc<SessionState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i32>,
    Json(payload): Json<ProgressUpdateRequest>,
) -> Result<Json<ProgressUpdateResponse>, (StatusCode, Json<JsonError>)> {
    let session_service = SessionService::new(&state.db);
    let update = ProgressUpdate {
        actual_minutes: payload.actual_minutes,
        completion_percent: payload.completion_percent,
        notes: payload.notes,
        mark_complete: payload.mark_complete,
    };

    match session_service
        .update_progress(&user.username, id, update)
        .await
    {
        Ok(session) => Ok(Json(ProgressUpdateResponse {
            success: true,
            status: session.status().as_str(),
            status_display: session.status().label(),
            actual_minutes: session.actual_minutes(),
            completion_percent: session.completion_percent(),
        })),
        Err(err) => Err(json_error(err)),
    }
}

/// Handler for moving a session to a new time slot via a JSON POST request.
#[tracing::instrument(skip(state))]
async fn reschedule_handler(
    State(state): State<Arc<SessionState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i32>,
    Json(payload): Json<RescheduleRequest>,
) -> Result<Json<RescheduleResponse>, (StatusCode, Json<JsonError>)> {
    let (Some(start), Some(end)) = (
        parse_json_datetime(&payload.planned_start),
        parse_json_datetime(&payload.planned_end),
    ) else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(JsonError {
                error: "Invalid date format.".to_string(),
            }),
        ));
    };

    let session_service = SessionService::new(&state.db);
    match session_service
        .reschedule_session(&user.username, id, start, end)
        .await
    {
        Ok(_) => Ok(Json(RescheduleResponse { success: true })),
        Err(err) => Err(json_error(err)),
    }
}

/// Handler for cancelling a session via POST request.
#[tracing::instrument(skip(state))]
async fn cancel_session_handler(
    State(state): State<Arc<SessionState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Redirect, SessionError> {
    let session_service = SessionService::new(&state.db);
    session_service.cancel_session(&user.username, id).await?;
    Ok(Redirect::to("/sessions"))
}

/// Handler for deleting a cancelled session via POST request.
#[tracing::instrument(skip(state))]
async fn delete_session_handler(
    State(state): State<Arc<SessionState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Redirect, SessionError> {
    let session_service = SessionService::new(&state.db);
    session_service.delete_session(&user.username, id).await?;
    Ok(Redirect::to("/sessions"))
}

/// Creates and returns the session router with all session-related routes.
pub fn create_session_router(state: Arc<SessionState>) -> Router {
    Router::new()
        .route("/sessions", get(session_list_handler))
        .route(
            "/sessions/book",
            get(book_form_handler).post(book_session_handler),
        )
        .route("/sessions/{id}", get(session_detail_handler))
        .route("/sessions/{id}/progress", post(update_progress_handler))
        .route("/sessions/{id}/reschedule", post(reschedule_handler))
        .route("/sessions/{id}/cancel", post(cancel_session_handler))
        .route("/sessions/{id}/delete", post(delete_session_handler))
        .with_state(state)
}
