use std::collections::HashSet;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use sea_orm::*;

use crate::entities::session::SessionStatus;
use crate::entities::*;

pub mod api;
pub mod web;

/// Number of days the dashboard streak looks back.
const DASHBOARD_STREAK_DAYS: u32 = 30;
/// Number of days a task's own streak looks back.
const TASK_STREAK_DAYS: u32 = 7;

/// A study goal with a target duration, owned by a single user.
#[derive(Debug, PartialEq, Clone, Eq)]
pub struct Task {
    id: i32,
    username: String,
    category_id: Option<i32>,
    title: String,
    description: String,
    target_minutes: i32,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl Task {
    /// Returns the ID of the task.
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Returns the username of the task's owner.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the ID of the task's category, if any.
    pub fn category_id(&self) -> Option<i32> {
        self.category_id
    }

    /// Returns the title of the task.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns the description of the task.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the target duration of the task in minutes.
    pub fn target_minutes(&self) -> i32 {
        self.target_minutes
    }

    /// Returns whether the task is active.
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Returns the creation time of the task.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl From<task::Model> for Task {
    fn from(model: task::Model) -> Self {
        Task {
            id: model.id,
            username: model.username,
            category_id: model.category_id,
            title: model.title,
            description: model.description,
            target_minutes: model.target_minutes,
            is_active: model.is_active,
            created_at: model.created_at,
        }
    }
}

/// A task together with the aggregates derived from its booked sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOverview {
    pub task: Task,
    pub total_actual_minutes: i64,
    pub progress_percent: i32,
    pub extra_minutes: i64,
    pub average_quality: i32,
    pub recent_streak: u32,
}

impl TaskOverview {
    /// A task counts as completed once its time-based progress reaches 100%.
    pub fn is_completed(&self) -> bool {
        self.progress_percent >= 100
    }
}

/// User-wide stats shown on the dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dashboard {
    pub streak: u32,
    pub week_minutes: i64,
    pub today_minutes: i64,
}

/// Error type for TaskService operations.
#[derive(Debug, thiserror::Error)]
pub enum TaskServiceError {
    /// Represents a task not found error.
    #[error("Task with ID {0} not found")]
    TaskNotFound(i32),
    /// Represents a reference to a category that does not exist.
    #[error("Category with ID {0} not found")]
    CategoryNotFound(i32),
    /// Represents a non-positive target duration.
    #[error("Target minutes must be greater than zero")]
    InvalidTargetMinutes(i32),
    /// Represents a database error.
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

pub struct TaskService<'a> {
    db: &'a sea_orm::DatabaseConnection,
}

impl TaskService<'_> {
    pub fn new(db: &sea_orm::DatabaseConnection) -> TaskService {
        TaskService { db }
    }

    /// Creates a new task for the given user.
    ///
    /// # Returns
    ///
    /// A `Result` containing the created `Task` if successful, or an error otherwise.
    #[tracing::instrument(skip(self))]
    pub async fn create_task(
        &self,
        username: &str,
        title: String,
        description: String,
        category_id: Option<i32>,
        target_minutes: i32,
    ) -> Result<Task, TaskServiceError> {
        if target_minutes <= 0 {
            return Err(TaskServiceError::InvalidTargetMinutes(target_minutes));
        }

        if let Some(category_id) = category_id {
            let category = category::Entity::find_by_id(category_id).one(self.db).await?;
            if category.is_none() {
                return Err(TaskServiceError::CategoryNotFound(category_id));
            }
        }

        let active_model = task::ActiveModel {
            username: ActiveValue::Set(username.to_string()),
            category_id: ActiveValue::Set(category_id),
            title: ActiveValue::Set(title),
            description: ActiveValue::Set(description),
            target_minutes: ActiveValue::Set(target_minutes),
            is_active: ActiveValue::Set(true),
            created_at: ActiveValue::Set(Utc::now()),
            ..Default::default()
        };
        let created_model = active_model.insert(self.db).await?;
        Ok(Task::from(created_model))
    }

    /// Retrieves one of the user's tasks by its ID.
    #[tracing::instrument(skip(self))]
    pub async fn get_task(&self, username: &str, id: i32) -> Result<Task, TaskServiceError> {
        let model = task::Entity::find_by_id(id)
            .filter(task::Column::Username.eq(username))
            .one(self.db)
            .await?
            .ok_or(TaskServiceError::TaskNotFound(id))?;
        Ok(Task::from(model))
    }

    /// Retrieves the user's active tasks, oldest first.
    #[tracing::instrument(skip(self))]
    pub async fn get_active_tasks(&self, username: &str) -> Result<Vec<Task>, TaskServiceError> {
        let tasks = task::Entity::find()
            .filter(task::Column::Username.eq(username))
            .filter(task::Column::IsActive.eq(true))
            .order_by_asc(task::Column::Id)
            .all(self.db)
            .await?
            .into_iter()
            .map(Task::from)
            .collect();
        Ok(tasks)
    }

    /// Deletes a task: removes all of its sessions and deactivates it.
    ///
    /// # Returns
    ///
    /// A `Result` containing the deactivated `Task` if successful, or an error otherwise.
    #[tracing::instrument(skip(self))]
    pub async fn delete_task(&self, username: &str, id: i32) -> Result<Task, TaskServiceError> {
        let model = task::Entity::find_by_id(id)
            .filter(task::Column::Username.eq(username))
            .one(self.db)
            .await?
            .ok_or(TaskServiceError::TaskNotFound(id))?;

        session::Entity::delete_many()
            .filter(session::Column::TaskId.eq(id))
            .exec(self.db)
            .await?;

        let mut active_model: task::ActiveModel = model.into();
        active_model.is_active = ActiveValue::Set(false);
        let updated_model = active_model.update(self.db).await?;
        Ok(Task::from(updated_model))
    }

    /// Computes the derived aggregates for a task from its sessions.
    /// Cancelled and not-yet-started sessions never count.
    #[tracing::instrument(skip(self, task))]
    pub async fn task_overview(&self, task: &Task) -> Result<TaskOverview, TaskServiceError> {
        let sessions = session::Entity::find()
            .filter(session::Column::TaskId.eq(task.id()))
            .filter(
                session::Column::Status
                    .is_not_in([SessionStatus::Cancelled, SessionStatus::Pending]),
            )
            .all(self.db)
            .await?;

        let total_actual_minutes: i64 = sessions.iter().map(|s| s.actual_minutes as i64).sum();
        let qualities: Vec<i32> = sessions
            .iter()
            .map(|s| s.completion_percent)
            .filter(|percent| *percent != 0)
            .collect();
        let days: HashSet<NaiveDate> = sessions
            .iter()
            .map(|s| s.planned_start.date_naive())
            .collect();

        Ok(TaskOverview {
            total_actual_minutes,
            progress_percent: progress_percent(total_actual_minutes, task.target_minutes()),
            extra_minutes: extra_minutes(total_actual_minutes, task.target_minutes()),
            average_quality: average_quality(&qualities),
            recent_streak: consecutive_day_streak(&days, Utc::now().date_naive(), TASK_STREAK_DAYS),
            task: task.clone(),
        })
    }

    /// Computes the user-wide dashboard stats: the day streak and the
    /// minutes studied this week and today.
    #[tracing::instrument(skip(self))]
    pub async fn dashboard(&self, username: &str) -> Result<Dashboard, TaskServiceError> {
        let today = Utc::now().date_naive();
        let window_start = (today - Duration::days(DASHBOARD_STREAK_DAYS as i64 - 1))
            .and_time(NaiveTime::MIN)
            .and_utc();
        let window_end = (today + Duration::days(1)).and_time(NaiveTime::MIN).and_utc();

        let sessions = session::Entity::find()
            .filter(session::Column::Username.eq(username))
            .filter(
                session::Column::Status
                    .is_not_in([SessionStatus::Cancelled, SessionStatus::Pending]),
            )
            .filter(session::Column::PlannedStart.gte(window_start))
            .filter(session::Column::PlannedStart.lt(window_end))
            .all(self.db)
            .await?;

        let days: HashSet<NaiveDate> = sessions
            .iter()
            .map(|s| s.planned_start.date_naive())
            .collect();
        let week_start = today - Duration::days(today.weekday().num_days_from_monday() as i64);
        let week_minutes = sessions
            .iter()
            .filter(|s| s.planned_start.date_naive() >= week_start)
            .map(|s| s.actual_minutes as i64)
            .sum();
        let today_minutes = sessions
            .iter()
            .filter(|s| s.planned_start.date_naive() == today)
            .map(|s| s.actual_minutes as i64)
            .sum();

        Ok(Dashboard {
            streak: consecutive_day_streak(&days, today, DASHBOARD_STREAK_DAYS),
            week_minutes,
            today_minutes,
        })
    }
}

/// Time-based completion of a task as a percentage, capped at 100.
/// Tasks without a target report zero.
pub fn progress_percent(total_actual_minutes: i64, target_minutes: i32) -> i32 {
    if target_minutes <= 0 {
        return 0;
    }
    (total_actual_minutes * 100 / target_minutes as i64).min(100) as i32
}

/// Minutes logged beyond the target, floored at zero.
pub fn extra_minutes(total_actual_minutes: i64, target_minutes: i32) -> i64 {
    (total_actual_minutes - target_minutes as i64).max(0)
}

/// Rounded mean of the given completion percentages; zero when empty.
pub fn average_quality(percents: &[i32]) -> i32 {
    if percents.is_empty() {
        return 0;
    }
    let sum: i64 = percents.iter().map(|percent| *percent as i64).sum();
    (sum as f64 / percents.len() as f64).round() as i32
}

/// Counts consecutive days with activity, walking backward from `today` and
/// stopping at the first gap or the edge of the window.
pub fn consecutive_day_streak(days: &HashSet<NaiveDate>, today: NaiveDate, window: u32) -> u32 {
    let mut streak = 0;
    for offset in 0..window {
        let day = today - Duration::days(offset as i64);
        if days.contains(&day) {
            streak += 1;
        } else {
            break;
        }
    }
    streak
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn progress_is_capped_at_100() {
        assert_eq!(progress_percent(500, 60), 100);
    }

    #[test]
    fn progress_is_zero_without_target() {
        assert_eq!(progress_percent(120, 0), 0);
    }

    #[test]
    fn progress_truncates_partial_percentages() {
        // 50 / 120 = 41.66%, reported as 41
        assert_eq!(progress_percent(50, 120), 41);
    }

    #[test]
    fn extra_minutes_floors_at_zero() {
        assert_eq!(extra_minutes(45, 60), 0);
        assert_eq!(extra_minutes(90, 60), 30);
    }

    #[test]
    fn average_quality_is_zero_when_no_sessions_count() {
        assert_eq!(average_quality(&[]), 0);
    }

    #[test]
    fn average_quality_rounds_to_nearest() {
        assert_eq!(average_quality(&[80, 85]), 83);
        assert_eq!(average_quality(&[70, 75]), 73);
    }

    #[test]
    fn streak_counts_back_from_today() {
        let today = date(2025, 8, 20);
        let days: HashSet<NaiveDate> = [
            date(2025, 8, 20),
            date(2025, 8, 19),
            date(2025, 8, 18),
        ]
        .into_iter()
        .collect();
        assert_eq!(consecutive_day_streak(&days, today, 7), 3);
    }

    #[test]
    fn streak_stops_at_first_gap() {
        let today = date(2025, 8, 20);
        let days: HashSet<NaiveDate> = [
            date(2025, 8, 20),
            // no session on the 19th
            date(2025, 8, 18),
            date(2025, 8, 17),
        ]
        .into_iter()
        .collect();
        assert_eq!(consecutive_day_streak(&days, today, 7), 1);
    }

    #[test]
    fn streak_is_zero_without_a_session_today() {
        let today = date(2025, 8, 20);
        let days: HashSet<NaiveDate> = [date(2025, 8, 19)].into_iter().collect();
        assert_eq!(consecutive_day_streak(&days, today, 7), 0);
    }

    #[test]
    fn streak_is_bounded_by_the_window() {
        let today = date(2025, 8, 20);
        let days: HashSet<NaiveDate> = (0..14)
            .map(|offset| today - Duration::days(offset))
            .collect();
        assert_eq!(consecutive_day_streak(&days, today, 7), 7);
    }
}
