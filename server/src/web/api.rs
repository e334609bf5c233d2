use std::sync::Arc;

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
};
use tower::ServiceBuilder;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::{self, AuthState};
use crate::session::web::SessionState;
use crate::task::web::TaskState;

pub mod v1 {
    use serde::Serialize;
    use utoipa::ToSchema;

    /// JSON payload returned for unexpected API failures.
    #[derive(Debug, Serialize, ToSchema)]
    pub struct ServerErrorResponse {
        /// Human readable description of the failure
        pub message: String,
    }

    impl ServerErrorResponse {
        pub fn new(message: String) -> Self {
            Self { message }
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::task::api::v1::get_tasks_handler,
        crate::session::api::v1::get_sessions_handler,
    ),
    components(schemas(
        crate::task::api::v1::TaskJson,
        crate::task::api::v1::TasksResponse,
        crate::session::api::v1::SessionJson,
        crate::session::api::v1::SessionsResponse,
        v1::ServerErrorResponse,
    )),
    tags(
        (name = "Tasks", description = "Read access to tasks and their aggregates"),
        (name = "Sessions", description = "Read access to booked sessions"),
    )
)]
struct ApiDoc;

/// Creates the API routes for JSON API endpoints, served under /api/v1 with
/// bearer-token authentication, plus the swagger-ui for the documentation.
pub fn create_api_router(
    auth_state: Arc<AuthState>,
    task_state: Arc<TaskState>,
    session_state: Arc<SessionState>,
) -> Router {
    let login_router = auth::api::v1::create_api_router(auth_state.clone());
    let protected_routes = Router::new()
        .merge(crate::task::api::v1::create_api_router(task_state))
        .merge(crate::session::api::v1::create_api_router(session_state))
        .layer(ServiceBuilder::new().layer(from_fn(auth::api::v1::require_auth_middleware)));
    let api_routes = login_router.merge(protected_routes);

    Router::new()
        .nest("/api/v1", api_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(ServiceBuilder::new().layer(from_fn_with_state(
            auth_state,
            auth::api::v1::auth_user_middleware,
        )))
}
