use crate::entities::*;
use sea_orm::*;

pub mod web;

/// A grouping label for tasks. Categories are shared across the install.
#[derive(Debug, PartialEq, Clone, Eq)]
pub struct Category {
    id: i32,
    name: String,
    description: String,
}

impl Category {
    pub fn new(id: i32, name: String, description: String) -> Self {
        Self {
            id,
            name,
            description,
        }
    }

    /// Returns the ID of the category.
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Returns the name of the category.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the description of the category.
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl From<category::Model> for Category {
    fn from(model: category::Model) -> Self {
        Category::new(model.id, model.name, model.description)
    }
}

/// Error type for CategoryService operations.
#[derive(Debug, thiserror::Error)]
pub enum CategoryServiceError {
    /// Represents a duplicate category name.
    #[error("Category '{0}' already exists")]
    DuplicateName(String),
    /// Represents a category not found error.
    #[error("Category with ID {0} not found")]
    CategoryNotFound(i32),
    /// Represents a database error.
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

pub struct CategoryService<'a> {
    db: &'a sea_orm::DatabaseConnection,
}

impl CategoryService<'_> {
    pub fn new(db: &sea_orm::DatabaseConnection) -> CategoryService {
        CategoryService { db }
    }

    /// Creates a new category. Names are unique across the install.
    ///
    /// # Returns
    ///
    /// A `Result` containing the created `Category` if successful, or an error otherwise.
    #[tracing::instrument(skip(self))]
    pub async fn create_category(
        &self,
        name: String,
        description: String,
    ) -> Result<Category, CategoryServiceError> {
        if self.name_exists(&name).await? {
            return Err(CategoryServiceError::DuplicateName(name));
        }

        let active_model = category::ActiveModel {
            name: ActiveValue::Set(name),
            description: ActiveValue::Set(description),
            created_at: ActiveValue::Set(chrono::Utc::now()),
            ..Default::default()
        };
        let created_model = active_model.insert(self.db).await?;
        Ok(Category::from(created_model))
    }

    /// Retrieves all categories ordered by name.
    #[tracing::instrument(skip(self))]
    pub async fn get_all_categories(&self) -> Result<Vec<Category>, CategoryServiceError> {
        let categories = category::Entity::find()
            .order_by_asc(category::Column::Name)
            .all(self.db)
            .await?
            .into_iter()
            .map(Category::from)
            .collect();
        Ok(categories)
    }

    /// Deletes a category by its ID. Tasks that referenced it keep running
    /// with their category cleared.
    #[tracing::instrument(skip(self))]
    pub async fn delete_category(&self, id: i32) -> Result<Category, CategoryServiceError> {
        let category_to_delete = category::Entity::find_by_id(id)
            .one(self.db)
            .await?
            .ok_or(CategoryServiceError::CategoryNotFound(id))?;

        let category_copy = Category::from(category_to_delete);
        category::Entity::delete_by_id(id).exec(self.db).await?;
        Ok(category_copy)
    }

    /// Checks whether a category with the given name already exists.
    #[tracing::instrument(skip(self))]
    async fn name_exists(&self, name: &str) -> Result<bool, CategoryServiceError> {
        let existing = category::Entity::find()
            .filter(category::Column::Name.eq(name))
            .one(self.db)
            .await?;
        Ok(existing.is_some())
    }
}
