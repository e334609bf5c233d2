use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // The conflict check and the day-by-day aggregates both scan a
        // user's sessions by planned start.
        manager
            .create_index(
                Index::create()
                    .name("idx_sessions_username_planned_start")
                    .table(Sessions::Table)
                    .col(Sessions::Username)
                    .col(Sessions::PlannedStart)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_sessions_task_id")
                    .table(Sessions::Table)
                    .col(Sessions::TaskId)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_tasks_username")
                    .table(Tasks::Table)
                    .col(Tasks::Username)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_sessions_username_planned_start")
                    .table(Sessions::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_sessions_task_id")
                    .table(Sessions::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_tasks_username")
                    .table(Tasks::Table)
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum Sessions {
    Table,
    Username,
    PlannedStart,
    TaskId,
}

#[derive(DeriveIden)]
enum Tasks {
    Table,
    Username,
}
