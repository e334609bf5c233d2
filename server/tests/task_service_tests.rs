use chrono::{DateTime, Duration, NaiveTime, Utc};
use sea_orm::{ActiveModelTrait, ActiveValue, DatabaseConnection};
use testcontainers_modules::{postgres, testcontainers};
use trackit_server::entities::session;
use trackit_server::entities::session::SessionStatus;
use trackit_server::session::SessionService;
use trackit_server::task::{Task, TaskService, TaskServiceError};

mod common;

pub struct TestContext {
    #[allow(dead_code)] // container is kept to ensure it's not dropped
    pub container: testcontainers::ContainerAsync<postgres::Postgres>,
    pub db: DatabaseConnection,
}

async fn setup() -> anyhow::Result<TestContext> {
    // Allow multiple calls to init for tests.
    let _ = tracing_subscriber::fmt().try_init();
    let container = common::setup_container().await?;
    let db = common::setup_db(&container).await?;
    Ok(TestContext { db, container })
}

async fn create_task(db: &DatabaseConnection, username: &str, target_minutes: i32) -> Task {
    TaskService::new(db)
        .create_task(
            username,
            "Read the async book".to_string(),
            "".to_string(),
            None,
            target_minutes,
        )
        .await
        .expect("Failed to create task")
}

/// Inserts a 60-minute session directly so tests can control its status,
/// minutes and start time.
async fn insert_session(
    db: &DatabaseConnection,
    task: &Task,
    status: SessionStatus,
    actual_minutes: i32,
    completion_percent: i32,
    start: DateTime<Utc>,
) -> session::Model {
    let active_model = session::ActiveModel {
        task_id: ActiveValue::Set(task.id()),
        username: ActiveValue::Set(task.username().to_string()),
        planned_start: ActiveValue::Set(start),
        planned_end: ActiveValue::Set(start + Duration::minutes(60)),
        actual_minutes: ActiveValue::Set(actual_minutes),
        completion_percent: ActiveValue::Set(completion_percent),
        status: ActiveValue::Set(status),
        notes: ActiveValue::Set("".to_string()),
        created_at: ActiveValue::Set(Utc::now()),
        ..Default::default()
    };
    active_model
        .insert(db)
        .await
        .expect("Failed to insert session")
}

/// A fixed point of the current UTC day, so day-bucketed assertions do not
/// depend on the wall clock.
fn today_at(hour: u32) -> DateTime<Utc> {
    Utc::now()
        .date_naive()
        .and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap())
        .and_utc()
}

#[tokio::test]
async fn can_create_task() {
    let state = setup().await.expect("Failed to setup test context");
    let task = create_task(&state.db, "alice", 120).await;

    assert_eq!(task.username(), "alice");
    assert_eq!(task.title(), "Read the async book");
    assert_eq!(task.target_minutes(), 120);
    assert!(task.is_active());
}

#[tokio::test]
async fn rejects_non_positive_target_minutes() {
    let state = setup().await.expect("Failed to setup test context");
    let task_service = TaskService::new(&state.db);

    let result = task_service
        .create_task("alice", "Bad task".to_string(), "".to_string(), None, 0)
        .await;
    assert!(matches!(
        result,
        Err(TaskServiceError::InvalidTargetMinutes(0))
    ));
}

#[tokio::test]
async fn rejects_unknown_category() {
    let state = setup().await.expect("Failed to setup test context");
    let task_service = TaskService::new(&state.db);

    let result = task_service
        .create_task("alice", "Task".to_string(), "".to_string(), Some(999), 60)
        .await;
    assert!(matches!(
        result,
        Err(TaskServiceError::CategoryNotFound(999))
    ));
}

#[tokio::test]
async fn tasks_are_scoped_to_their_owner() {
    let state = setup().await.expect("Failed to setup test context");
    let task = create_task(&state.db, "alice", 60).await;

    let task_service = TaskService::new(&state.db);
    let result = task_service.get_task("bob", task.id()).await;
    assert!(matches!(result, Err(TaskServiceError::TaskNotFound(_))));

    let tasks = task_service
        .get_active_tasks("bob")
        .await
        .expect("Failed to get tasks");
    assert!(tasks.is_empty());
}

#[tokio::test]
async fn deleting_a_task_removes_its_sessions_and_deactivates_it() {
    let state = setup().await.expect("Failed to setup test context");
    let task = create_task(&state.db, "alice", 60).await;
    let session = insert_session(
        &state.db,
        &task,
        SessionStatus::Completed,
        30,
        80,
        Utc::now() - Duration::hours(2),
    )
    .await;

    let task_service = TaskService::new(&state.db);
    let deleted = task_service
        .delete_task("alice", task.id())
        .await
        .expect("Failed to delete task");
    assert!(!deleted.is_active());

    let active = task_service
        .get_active_tasks("alice")
        .await
        .expect("Failed to get tasks");
    assert!(active.is_empty());

    let session_service = SessionService::new(&state.db);
    let result = session_service.get_session("alice", session.id).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn progress_is_capped_even_when_the_target_is_exceeded() {
    let state = setup().await.expect("Failed to setup test context");
    let task = create_task(&state.db, "alice", 60).await;
    insert_session(
        &state.db,
        &task,
        SessionStatus::Completed,
        45,
        90,
        Utc::now() - Duration::hours(4),
    )
    .await;
    insert_session(
        &state.db,
        &task,
        SessionStatus::Completed,
        45,
        70,
        Utc::now() - Duration::hours(2),
    )
    .await;

    let overview = TaskService::new(&state.db)
        .task_overview(&task)
        .await
        .expect("Failed to compute overview");

    assert_eq!(overview.total_actual_minutes, 90);
    assert_eq!(overview.progress_percent, 100);
    assert_eq!(overview.extra_minutes, 30);
    assert!(overview.is_completed());
    assert_eq!(overview.average_quality, 80);
}

#[tokio::test]
async fn cancelled_and_pending_sessions_never_count_toward_progress() {
    let state = setup().await.expect("Failed to setup test context");
    let task = create_task(&state.db, "alice", 60).await;
    insert_session(
        &state.db,
        &task,
        SessionStatus::Cancelled,
        60,
        100,
        Utc::now() - Duration::hours(6),
    )
    .await;
    insert_session(
        &state.db,
        &task,
        SessionStatus::Pending,
        0,
        0,
        Utc::now() + Duration::hours(6),
    )
    .await;
    insert_session(
        &state.db,
        &task,
        SessionStatus::InProgress,
        20,
        50,
        Utc::now() - Duration::hours(1),
    )
    .await;

    let overview = TaskService::new(&state.db)
        .task_overview(&task)
        .await
        .expect("Failed to compute overview");

    assert_eq!(overview.total_actual_minutes, 20);
    assert_eq!(overview.progress_percent, 33);
    assert!(!overview.is_completed());
}

#[tokio::test]
async fn average_quality_ignores_sessions_without_a_rating() {
    let state = setup().await.expect("Failed to setup test context");
    let task = create_task(&state.db, "alice", 120).await;
    insert_session(
        &state.db,
        &task,
        SessionStatus::Completed,
        30,
        0,
        Utc::now() - Duration::hours(4),
    )
    .await;
    insert_session(
        &state.db,
        &task,
        SessionStatus::Completed,
        30,
        60,
        Utc::now() - Duration::hours(2),
    )
    .await;

    let overview = TaskService::new(&state.db)
        .task_overview(&task)
        .await
        .expect("Failed to compute overview");

    assert_eq!(overview.average_quality, 60);
}

#[tokio::test]
async fn dashboard_counts_todays_minutes_and_streak() {
    let state = setup().await.expect("Failed to setup test context");
    let task = create_task(&state.db, "alice", 600).await;
    // One counted session booked for noon today.
    insert_session(&state.db, &task, SessionStatus::InProgress, 25, 50, today_at(12)).await;
    // A cancelled one the same day must not count.
    insert_session(&state.db, &task, SessionStatus::Cancelled, 90, 0, today_at(9)).await;

    let dashboard = TaskService::new(&state.db)
        .dashboard("alice")
        .await
        .expect("Failed to compute dashboard");

    assert_eq!(dashboard.today_minutes, 25);
    assert!(dashboard.week_minutes >= 25);
    assert_eq!(dashboard.streak, 1);
}

#[tokio::test]
async fn dashboard_is_empty_for_a_fresh_user() {
    let state = setup().await.expect("Failed to setup test context");

    let dashboard = TaskService::new(&state.db)
        .dashboard("alice")
        .await
        .expect("Failed to compute dashboard");

    assert_eq!(dashboard.streak, 0);
    assert_eq!(dashboard.week_minutes, 0);
    assert_eq!(dashboard.today_minutes, 0);
}
