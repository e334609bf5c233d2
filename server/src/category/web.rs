use askama::Template;
use axum::{
    Form, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::category::{Category, CategoryService, CategoryServiceError};

#[derive(Clone, Debug)]
pub struct CategoryState {
    pub db: Arc<sea_orm::DatabaseConnection>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCategoryForm {
    name: String,
    #[serde(default)]
    description: String,
}

/// Custom error type for category handler operations.
#[derive(Debug, thiserror::Error)]
enum CategoryError {
    /// Represents an error during template rendering.
    #[error("Template rendering failed")]
    Template(#[from] askama::Error),
    /// Represents a category service error.
    #[error("Category service error")]
    Service(#[from] CategoryServiceError),
}

impl IntoResponse for CategoryError {
    fn into_response(self) -> Response {
        let (status_code, user_facing_error_message) = match &self {
            CategoryError::Service(CategoryServiceError::CategoryNotFound(_)) => {
                (StatusCode::NOT_FOUND, "Category not found.".to_string())
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

#[derive(Template)]
#[template(path = "categories/categories.html")]
struct CategoriesTemplate {
    categories: Vec<Category>,
    error: Option<String>,
}

impl CategoriesTemplate {
    pub fn new(categories: Vec<Category>, error: Option<String>) -> Self {
        Self { categories, error }
    }
}

/// Handler for the /categories endpoint that displays all categories.
#[tracing::instrument(skip(state))]
async fn categories_handler(
    State(state): State<Arc<CategoryState>>,
) -> Result<Html<String>, CategoryError> {
    let category_service = CategoryService::new(&state.db);
    let categories = category_service.get_all_categories().await?;
    let template = CategoriesTemplate::new(categories, None);
    template.render().map(Html).map_err(CategoryError::from)
}

/// Handler for creating a new category via POST request.
#[tracing::instrument(skip(state))]
async fn create_category_handler(
    State(state): State<Arc<CategoryState>>,
    Form(form): Form<CreateCategoryForm>,
) -> Result<Response, CategoryError> {
    let category_service = CategoryService::new(&state.db);

    match category_service
        .create_category(form.name, form.description)
        .await
    {
        Ok(_) => Ok(Redirect::to("/categories").into_response()),
        Err(err @ CategoryServiceError::DuplicateName(_)) => {
            let categories = category_service.get_all_categories().await?;
            let template = CategoriesTemplate::new(categories, Some(err.to_string()));
            let html = template.render().map_err(CategoryError::from)?;
            Ok((StatusCode::BAD_REQUEST, Html(html)).into_response())
        }
        Err(err) => Err(CategoryError::Service(err)),
    }
}

/// Handler for deleting a category via POST request.
#[tracing::instrument(skip(state))]
async fn delete_category_handler(
    State(state): State<Arc<CategoryState>>,
    Path(id): Path<i32>,
) -> Result<Redirect, CategoryError> {
    let category_service = CategoryService::new(&state.db);
    category_service.delete_category(id).await?;
    Ok(Redirect::to("/categories"))
}

/// Creates and returns the category router with all category-related routes.
pub fn create_category_router(state: Arc<CategoryState>) -> Router {
    Router::new()
        .route(
            "/categories",
            get(categories_handler).post(create_category_handler),
        )
        .route(
            "/categories/{id}/delete",
            axum::routing::post(delete_category_handler),
        )
        .with_state(state)
}
