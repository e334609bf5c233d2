use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use std::sync::Arc;
use tower::ServiceExt;
use trackit_server::auth::{AuthState, create_login_router};
use trackit_server::config::Config;
use trackit_server::web::{health_check_handler, home_handler};

fn test_config() -> Config {
    Config {
        db_url: "".to_string(),
        port: 8080,
        admin_username: "admin".to_string(),
        admin_password: "password".to_string(),
        jwt_secret: "test_secret".to_string(),
    }
}

fn public_app() -> axum::Router {
    let auth_state = Arc::new(AuthState::from_config(&test_config()));
    axum::Router::new()
        .route("/health", axum::routing::get(health_check_handler))
        .route("/", axum::routing::get(home_handler))
        .merge(create_login_router(auth_state))
}

async fn body_text(response: axum::response::Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

#[tokio::test]
async fn can_check_health_endpoint() {
    let app = public_app();

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
    let body = body_text(response).await;
    assert_eq!(body, "OK");
}

#[tokio::test]
async fn home_redirects_to_tasks() {
    let app = public_app();

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = response.headers().get("location").unwrap();
    assert_eq!(location, "/tasks");
}

#[tokio::test]
async fn can_render_the_login_page() {
    let app = public_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/login")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("Login"));
    assert!(body.contains("form"));
}

#[tokio::test]
async fn successful_login_sets_the_auth_cookie_and_redirects() {
    let app = public_app();

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/login")
                .header("content-type", "application/x-www-form-urlencoded")
                .body(Body::from("username=admin&password=password"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = response.headers().get("location").unwrap();
    assert_eq!(location, "/tasks");

    let set_cookie = response
        .headers()
        .get("set-cookie")
        .expect("Expected an auth cookie")
        .to_str()
        .unwrap();
    assert!(set_cookie.starts_with("auth_token="));
    assert!(set_cookie.contains("HttpOnly"));
}

#[tokio::test]
async fn failed_login_renders_an_error() {
    let app = public_app();

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/login")
                .header("content-type", "application/x-www-form-urlencoded")
                .body(Body::from("username=admin&password=wrong"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get("set-cookie").is_none());
    let body = body_text(response).await;
    assert!(body.contains("Invalid username or password."));
}
