use axum::middleware::{from_fn, from_fn_with_state};
use axum::response::Redirect;
use migration::MigratorTrait;
use sea_orm::Database;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{AuthState, auth_user_middleware, create_login_router, login_redirect_middleware};
use crate::category::web::{CategoryState, create_category_router};
use crate::config;
use crate::session::web::{SessionState, create_session_router};
use crate::task::web::{TaskState, create_task_router};

pub mod api;

#[tracing::instrument(skip(config))]
pub async fn start_web_server(config: config::Config) -> anyhow::Result<()> {
    use axum::Router;

    let server_address = format!("0.0.0.0:{}", &config.port);
    let listener = tokio::net::TcpListener::bind(&server_address).await?;
    tracing::info!("Web server running on http://{}", server_address);

    let db = Database::connect(&config.db_url).await?;
    migration::Migrator::up(&db, None).await?;
    tracing::info!("Database migrations applied successfully");

    let db = Arc::new(db);
    let auth_state = Arc::new(AuthState::from_config(&config));
    let task_state = Arc::new(TaskState { db: db.clone() });
    let session_state = Arc::new(SessionState { db: db.clone() });
    let category_state = Arc::new(CategoryState { db });

    let login_router = create_login_router(auth_state.clone());

    let protected_routes = Router::new()
        .merge(create_task_router(task_state.clone()))
        .merge(create_session_router(session_state.clone()))
        .merge(create_category_router(category_state))
        .layer(
            ServiceBuilder::new()
                .layer(from_fn_with_state(auth_state.clone(), auth_user_middleware))
                .layer(from_fn(login_redirect_middleware)),
        );

    let public_routes = Router::new()
        .route("/health", axum::routing::get(health_check_handler))
        .route("/", axum::routing::get(home_handler))
        .merge(login_router)
        .layer(
            ServiceBuilder::new()
                .layer(from_fn_with_state(auth_state.clone(), auth_user_middleware)),
        );

    let api_router = api::create_api_router(auth_state, task_state, session_state);

    let app = Router::new()
        .merge(protected_routes)
        .merge(public_routes)
        .merge(api_router)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::new()),
        );

    axum::serve(listener, app).await?;
    Ok(())
}

/// Liveness probe.
#[tracing::instrument]
pub async fn health_check_handler() -> &'static str {
    "OK"
}

/// The dashboard is the home page.
#[tracing::instrument]
pub async fn home_handler() -> Redirect {
    Redirect::to("/tasks")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn home_redirects_to_the_dashboard() {
        let app = axum::Router::new().route("/", axum::routing::get(home_handler));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response.headers().get("location").unwrap();
        assert_eq!(location, "/tasks");
    }

    #[tokio::test]
    async fn health_check_reports_ok() {
        let app =
            axum::Router::new().route("/health", axum::routing::get(health_check_handler));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(body, "OK");
    }
}
