pub use sea_orm_migration::prelude::*;

mod m20250810_000001_create_categories_table;
mod m20250810_000002_create_tasks_table;
mod m20250810_000003_create_sessions_table;
mod m20250824_000001_add_session_indexes;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250810_000001_create_categories_table::Migration),
            Box::new(m20250810_000002_create_tasks_table::Migration),
            Box::new(m20250810_000003_create_sessions_table::Migration),
            Box::new(m20250824_000001_add_session_indexes::Migration),
        ]
    }
}
