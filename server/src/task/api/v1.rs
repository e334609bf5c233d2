use crate::auth::CurrentUser;
use crate::task::web::TaskState;
use crate::task::{TaskOverview, TaskService, TaskServiceError};
use crate::web::api::v1::ServerErrorResponse;
use axum::{
    Router,
    extract::{Extension, State},
    http::StatusCode,
    response::Json,
    routing::get,
};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

/// JSON representation of a task and its derived aggregates.
#[derive(Debug, Serialize, ToSchema)]
pub struct TaskJson {
    /// Unique identifier for the task
    id: i32,
    /// Task title
    title: String,
    /// Optional longer description
    description: String,
    /// ID of the task's category, if any
    category_id: Option<i32>,
    /// Target duration in minutes
    target_minutes: i32,
    /// Creation time, RFC 3339
    created_at: String,
    /// Minutes logged across the task's counted sessions
    total_actual_minutes: i64,
    /// Time-based progress, capped at 100
    progress_percent: i32,
    /// Minutes logged beyond the target
    extra_minutes: i64,
    /// Rounded mean completion percentage of counted sessions
    average_quality: i32,
    /// Consecutive days with a session within the last week
    recent_streak: u32,
    /// Whether the task reached its target
    completed: bool,
}

impl From<TaskOverview> for TaskJson {
    fn from(overview: TaskOverview) -> Self {
        let completed = overview.is_completed();
        Self {
            id: overview.task.id(),
            title: overview.task.title().to_string(),
            description: overview.task.description().to_string(),
            category_id: overview.task.category_id(),
            target_minutes: overview.task.target_minutes(),
            created_at: overview.task.created_at().to_rfc3339(),
            total_actual_minutes: overview.total_actual_minutes,
            progress_percent: overview.progress_percent,
            extra_minutes: overview.extra_minutes,
            average_quality: overview.average_quality,
            recent_streak: overview.recent_streak,
            completed,
        }
    }
}

/// API response for listing the user's tasks.
#[derive(Debug, Serialize, ToSchema)]
pub struct TasksResponse {
    /// List of active tasks
    tasks: Vec<TaskJson>,
    /// Total number of tasks
    count: usize,
}

/// Handler for GET /api/v1/tasks - the user's active tasks with aggregates.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/api/v1/tasks",
    responses(
        (status = 200, description = "Successfully retrieved tasks", body = TasksResponse),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 500, description = "Internal server error", body = ServerErrorResponse)
    ),
    tag = "Tasks"
)]
pub async fn get_tasks_handler(
    State(state): State<Arc<TaskState>>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<TasksResponse>, (StatusCode, Json<ServerErrorResponse>)> {
    let service = TaskService::new(&state.db);

    let overviews = async {
        let tasks = service.get_active_tasks(&user.username).await?;
        let mut overviews = Vec::with_capacity(tasks.len());
        for task in &tasks {
            overviews.push(service.task_overview(task).await?);
        }
        Ok::<_, TaskServiceError>(overviews)
    }
    .await;

    match overviews {
        Ok(overviews) => {
            let tasks: Vec<TaskJson> = overviews.into_iter().map(TaskJson::from).collect();
            let count = tasks.len();
            Ok(Json(TasksResponse { tasks, count }))
        }
        Err(err) => {
            tracing::error!("Failed to get tasks: {}", err);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ServerErrorResponse::new(
                    "Failed to retrieve tasks".to_string(),
                )),
            ))
        }
    }
}

/// Creates and returns the tasks API router.
pub fn create_api_router(state: Arc<TaskState>) -> Router {
    Router::new()
        .route("/tasks", get(get_tasks_handler))
        .with_state(state)
}
