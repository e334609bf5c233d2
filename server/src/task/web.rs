use askama::Template;
use axum::{
    Form, Router,
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::CurrentUser;
use crate::category::{Category, CategoryService, CategoryServiceError};
use crate::task::{Dashboard, TaskOverview, TaskService, TaskServiceError};

/// Number of in-progress tasks shown per dashboard page.
const TASKS_PER_PAGE: usize = 8;

#[derive(Clone, Debug)]
pub struct TaskState {
    pub db: Arc<sea_orm::DatabaseConnection>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskForm {
    title: String,
    #[serde(default)]
    description: String,
    // The category select submits an empty string for "no category".
    #[serde(default)]
    category_id: String,
    target_minutes: i32,
}

#[derive(Debug, Deserialize)]
pub struct TaskListQuery {
    page: Option<usize>,
}

/// Custom error type for task handler operations.
#[derive(Debug, thiserror::Error)]
enum TaskError {
    /// Represents an error during template rendering.
    #[error("Template rendering failed")]
    Template(#[from] askama::Error),
    /// Represents a task service error.
    #[error("Task service error")]
    Service(#[from] TaskServiceError),
    /// Represents a category service error.
    #[error("Category service error")]
    Category(#[from] CategoryServiceError),
}

impl IntoResponse for TaskError {
    fn into_response(self) -> Response {
        let (status_code, user_facing_error_message) = match &self {
            TaskError::Service(TaskServiceError::TaskNotFound(_)) => {
                (StatusCode::NOT_FOUND, "Task not found.")
            }
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An unexpected error occurred while processing your request. Please try again later.",
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

#[derive(Template)]
#[template(path = "tasks/task_list.html")]
struct TaskListTemplate {
    in_progress: Vec<TaskOverview>,
    completed: Vec<TaskOverview>,
    dashboard: Dashboard,
    page: usize,
    total_pages: usize,
}

#[derive(Template)]
#[template(path = "tasks/task_form.html")]
struct TaskFormTemplate {
    categories: Vec<Category>,
    error: Option<String>,
}

impl TaskFormTemplate {
    pub fn new(categories: Vec<Category>, error: Option<String>) -> Self {
        Self { categories, error }
    }
}

/// Handler for the /tasks dashboard: the user's active tasks split into
/// in-progress and completed, plus the user-wide stats.
#[tracing::instrument(skip(state))]
async fn task_list_handler(
    State(state): State<Arc<TaskState>>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<TaskListQuery>,
) -> Result<Html<String>, TaskError> {
    let task_service = TaskService::new(&state.db);
    let tasks = task_service.get_active_tasks(&user.username).await?;

    let mut in_progress = Vec::new();
    let mut completed = Vec::new();
    for task in &tasks {
        let overview = task_service.task_overview(task).await?;
        if overview.is_completed() {
            completed.push(overview);
        } else {
            in_progress.push(overview);
        }
    }

    let total_pages = in_progress.len().div_ceil(TASKS_PER_PAGE).max(1);
    let page = query.page.unwrap_or(1).clamp(1, total_pages);
    let in_progress: Vec<TaskOverview> = in_progress
        .into_iter()
        .skip((page - 1) * TASKS_PER_PAGE)
        .take(TASKS_PER_PAGE)
        .collect();

    let dashboard = task_service.dashboard(&user.username).await?;

    let template = TaskListTemplate {
        in_progress,
        completed,
        dashboard,
        page,
        total_pages,
    };
    template.render().map(Html).map_err(TaskError::from)
}

/// Handler for serving the task creation form.
#[tracing::instrument(skip(state))]
async fn task_form_handler(
    State(state): State<Arc<TaskState>>,
) -> Result<Html<String>, TaskError> {
    let categories = CategoryService::new(&state.db).get_all_categories().await?;
    let template = TaskFormTemplate::new(categories, None);
    template.render().map(Html).map_err(TaskError::from)
}

/// Handler for creating a new task via POST request.
#[tracing::instrument(skip(state))]
async fn create_task_handler(
    State(state): State<Arc<TaskState>>,
    Extension(user): Extension<CurrentUser>,
    Form(form): Form<CreateTaskForm>,
) -> Result<Response, TaskError> {
    let task_service = TaskService::new(&state.db);
    let category_id = form.category_id.trim().parse::<i32>().ok();

    match task_service
        .create_task(
            &user.username,
            form.title,
            form.description,
            category_id,
            form.target_minutes,
        )
        .await
    {
        Ok(_) => Ok(Redirect::to("/tasks").into_response()),
        Err(
            err @ (TaskServiceError::InvalidTargetMinutes(_)
            | TaskServiceError::CategoryNotFound(_)),
        ) => {
            let categories = CategoryService::new(&state.db).get_all_categories().await?;
            let template = TaskFormTemplate::new(categories, Some(err.to_string()));
            let html = template.render().map_err(TaskError::from)?;
            Ok((StatusCode::BAD_REQUEST, Html(html)).into_response())
        }
        Err(err) => Err(TaskError::Service(err)),
    }
}

/// Handler for deleting a task via POST request. The task's sessions go with
/// it; the task itself is only deactivated.
#[tracing::instrument(skip(state))]
async fn delete_task_handler(
    State(state): State<Arc<TaskState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Redirect, TaskError> {
    let task_service = TaskService::new(&state.db);
    task_service.delete_task(&user.username, id).await?;
    Ok(Redirect::to("/tasks"))
}

/// Creates and returns the task router with all task-related routes.
pub fn create_task_router(state: Arc<TaskState>) -> Router {
    Router::new()
        .route("/tasks", get(task_list_handler))
        .route(
            "/tasks/create",
            get(task_form_handler).post(create_task_handler),
        )
        .route(
            "/tasks/{id}/delete",
            axum::routing::post(delete_task_handler),
        )
        .with_state(state)
}
