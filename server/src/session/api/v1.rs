use crate::auth::CurrentUser;
use crate::session::web::SessionState;
use crate::session::{Session, SessionService, SessionStatus};
use crate::web::api::v1::ServerErrorResponse;
use axum::{
    Router,
    extract::{Extension, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// JSON representation of a session for API responses.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionJson {
    /// Unique identifier for the session
    id: i32,
    /// ID of the task the session is booked against
    task_id: i32,
    /// Planned start, RFC 3339
    planned_start: String,
    /// Planned end, RFC 3339
    planned_end: String,
    /// Planned duration in minutes
    planned_minutes: i64,
    /// Minutes actually spent so far
    actual_minutes: i32,
    /// Self-assessed completion percentage
    completion_percent: i32,
    /// Lifecycle status: pending, in_progress, completed or cancelled
    status: String,
    /// Free-form notes
    notes: String,
    /// Creation time, RFC 3339
    created_at: String,
}

impl From<Session> for SessionJson {
    fn from(session: Session) -> Self {
        Self {
            id: session.id(),
            task_id: session.task_id(),
            planned_start: session.planned_start().to_rfc3339(),
            planned_end: session.planned_end().to_rfc3339(),
            planned_minutes: session.planned_minutes(),
            actual_minutes: session.actual_minutes(),
            completion_percent: session.completion_percent(),
            status: session.status().as_str().to_string(),
            notes: session.notes().to_string(),
            created_at: session.created_at().to_rfc3339(),
        }
    }
}

/// API response for listing the user's sessions.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionsResponse {
    /// List of sessions
    sessions: Vec<SessionJson>,
    /// Total number of sessions
    count: usize,
}

/// Query parameters for filtering sessions.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SessionsQuery {
    /// Optional status to filter sessions by
    #[serde(default)]
    status: Option<String>,
    /// Optional task ID to filter sessions by
    #[serde(default)]
    task_id: Option<i32>,
}

/// Handler for GET /api/v1/sessions - the user's sessions in JSON format.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/api/v1/sessions",
    params(
        ("status" = Option<String>, Query, description = "Optional status to filter sessions by"),
        ("task_id" = Option<i32>, Query, description = "Optional task ID to filter sessions by")
    ),
    responses(
        (status = 200, description = "Successfully retrieved sessions", body = SessionsResponse),
        (status = 400, description = "Unknown status filter", body = ServerErrorResponse),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 500, description = "Internal server error", body = ServerErrorResponse)
    ),
    tag = "Sessions"
)]
pub async fn get_sessions_handler(
    State(state): State<Arc<SessionState>>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<SessionsQuery>,
) -> Result<Json<SessionsResponse>, (StatusCode, Json<ServerErrorResponse>)> {
    let status = match query.status.as_deref() {
        None | Some("") => None,
        Some(raw) => match SessionStatus::parse(raw) {
            Some(status) => Some(status),
            None => {
                return Err((
                    StatusCode::BAD_REQUEST,
                    Json(ServerErrorResponse::new(format!(
                        "Unknown status filter '{}'",
                        raw
                    ))),
                ));
            }
        },
    };

    let service = SessionService::new(&state.db);
    match service.get_sessions(&user.username, status).await {
        Ok(sessions) => {
            let sessions: Vec<SessionJson> = sessions
                .into_iter()
                .filter(|session| {
                    query
                        .task_id
                        .map(|task_id| session.task_id() == task_id)
                        .unwrap_or(true)
                })
                .map(SessionJson::from)
                .collect();
            let count = sessions.len();
            Ok(Json(SessionsResponse { sessions, count }))
        }
        Err(err) => {
            tracing::error!("Failed to get sessions: {}", err);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ServerErrorResponse::new(
                    "Failed to retrieve sessions".to_string(),
                )),
            ))
        }
    }
}

/// Creates and returns the sessions API router.
pub fn create_api_router(state: Arc<SessionState>) -> Router {
    Router::new()
        .route("/sessions", get(get_sessions_handler))
        .with_state(state)
}
