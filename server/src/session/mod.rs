use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::*;

use crate::entities::*;

pub use crate::entities::session::SessionStatus;

pub mod api;
pub mod web;

/// Maximum multiple of the planned duration a progress log may record.
const MAX_ACTUAL_FACTOR: i64 = 3;

/// A planned block of study time booked against a task.
#[derive(Debug, PartialEq, Clone, Eq)]
pub struct Session {
    id: i32,
    task_id: i32,
    username: String,
    planned_start: DateTime<Utc>,
    planned_end: DateTime<Utc>,
    actual_minutes: i32,
    completion_percent: i32,
    status: SessionStatus,
    notes: String,
    created_at: DateTime<Utc>,
}

impl Session {
    /// Returns the ID of the session.
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Returns the ID of the task the session is booked against.
    pub fn task_id(&self) -> i32 {
        self.task_id
    }

    /// Returns the username of the session's owner.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the planned start of the session.
    pub fn planned_start(&self) -> DateTime<Utc> {
        self.planned_start
    }

    /// Returns the planned end of the session.
    pub fn planned_end(&self) -> DateTime<Utc> {
        self.planned_end
    }

    /// Returns the minutes actually spent so far.
    pub fn actual_minutes(&self) -> i32 {
        self.actual_minutes
    }

    /// Returns the self-assessed completion percentage.
    pub fn completion_percent(&self) -> i32 {
        self.completion_percent
    }

    /// Returns the lifecycle status of the session.
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Returns the notes attached to the session.
    pub fn notes(&self) -> &str {
        &self.notes
    }

    /// Returns the creation time of the session.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Planned duration in whole minutes.
    pub fn planned_minutes(&self) -> i64 {
        planned_minutes(self.planned_start, self.planned_end)
    }
}

impl From<session::Model> for Session {
    fn from(model: session::Model) -> Self {
        Session {
            id: model.id,
            task_id: model.task_id,
            username: model.username,
            planned_start: model.planned_start,
            planned_end: model.planned_end,
            actual_minutes: model.actual_minutes,
            completion_percent: model.completion_percent,
            status: model.status,
            notes: model.notes,
            created_at: model.created_at,
        }
    }
}

/// Planned duration of a time block in whole minutes.
pub fn planned_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_minutes()
}

/// Error type for SessionService operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionServiceError {
    /// Represents a session not found error.
    #[error("Session with ID {0} not found")]
    SessionNotFound(i32),
    /// Represents a task not found error.
    #[error("Task with ID {0} not found")]
    TaskNotFound(i32),
    /// Represents a time block whose end does not come after its start.
    #[error("End time must be after start time.")]
    EndNotAfterStart,
    /// Represents an overlap with another booked session.
    #[error("This time slot conflicts with an existing session.")]
    Conflict,
    /// Represents a booking against a task whose target is already reached.
    #[error("\"{0}\" target already reached! Choose a different task or create a new one.")]
    TargetReached(String),
    /// Represents a progress update against a cancelled session.
    #[error("Cannot update a cancelled session.")]
    UpdateCancelled,
    /// Represents a progress update against a session that has not started.
    #[error("This session has not started yet. Adjust the time if you want to log progress early.")]
    UpdateBeforeStart,
    /// Represents a progress update without any time spent.
    #[error("Please enter actual time spent before saving progress.")]
    MissingActualMinutes,
    /// Represents a negative time log.
    #[error("actual_minutes cannot be negative.")]
    NegativeActualMinutes,
    /// Represents a time log beyond the allowed multiple of the plan.
    #[error("Time seems too high. Max allowed: {0} min (3x planned).")]
    ActualMinutesTooHigh(i64),
    /// Represents a completion percentage outside the allowed range.
    #[error("completion_percent must be between 0 and 100.")]
    CompletionPercentOutOfRange,
    /// Represents a cancel request against a finished session.
    #[error("This session cannot be cancelled.")]
    NotCancellable,
    /// Represents a delete request against a session that is not cancelled.
    #[error("Only cancelled sessions can be deleted.")]
    NotDeletable,
    /// Represents a reschedule request against a finished session.
    #[error("Cannot reschedule this session.")]
    NotReschedulable,
    /// Represents a database error.
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

impl SessionServiceError {
    /// Whether the error is a business-rule violation, as opposed to a
    /// missing record or an infrastructure failure.
    pub fn is_validation(&self) -> bool {
        !matches!(
            self,
            SessionServiceError::Database(_)
                | SessionServiceError::SessionNotFound(_)
                | SessionServiceError::TaskNotFound(_)
        )
    }
}

/// Non-blocking warning raised when a booking's planned duration exceeds the
/// remaining target of its task.
#[derive(Debug, PartialEq, Clone, Eq)]
pub struct OvertimeWarning {
    pub planned_minutes: i64,
    pub remaining_minutes: i64,
    pub task_title: String,
}

impl std::fmt::Display for OvertimeWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Heads up: this session ({} min) exceeds your remaining target ({} min) for \"{}\". Progress will be capped at 100%.",
            self.planned_minutes, self.remaining_minutes, self.task_title
        )
    }
}

/// Outcome of a successful booking.
#[derive(Debug)]
pub struct Booking {
    pub session: Session,
    pub overtime: Option<OvertimeWarning>,
}

/// Fields accepted by a progress update. `None` keeps the stored value.
#[derive(Debug, Default, Clone)]
pub struct ProgressUpdate {
    pub actual_minutes: Option<i32>,
    pub completion_percent: Option<i32>,
    pub notes: Option<String>,
    pub mark_complete: bool,
}

/// Validates a progress log against the planned duration.
pub fn validate_progress(
    planned_minutes: i64,
    actual_minutes: i32,
    completion_percent: i32,
) -> Result<(), SessionServiceError> {
    if actual_minutes == 0 {
        return Err(SessionServiceError::MissingActualMinutes);
    }
    if actual_minutes < 0 {
        return Err(SessionServiceError::NegativeActualMinutes);
    }
    let max_minutes = planned_minutes * MAX_ACTUAL_FACTOR;
    if actual_minutes as i64 > max_minutes {
        return Err(SessionServiceError::ActualMinutesTooHigh(max_minutes));
    }
    if !(0..=100).contains(&completion_percent) {
        return Err(SessionServiceError::CompletionPercentOutOfRange);
    }
    Ok(())
}

pub struct SessionService<'a> {
    db: &'a sea_orm::DatabaseConnection,
}

impl SessionService<'_> {
    pub fn new(db: &sea_orm::DatabaseConnection) -> SessionService {
        SessionService { db }
    }

    /// Books a new session against one of the user's active tasks.
    ///
    /// Rejects overlapping bookings and tasks whose target is already
    /// reached. Bookings whose planned duration exceeds the remaining target
    /// succeed but carry an overtime warning.
    #[tracing::instrument(skip(self))]
    pub async fn book_session(
        &self,
        username: &str,
        task_id: i32,
        planned_start: DateTime<Utc>,
        planned_end: DateTime<Utc>,
        notes: String,
    ) -> Result<Booking, SessionServiceError> {
        if planned_end <= planned_start {
            return Err(SessionServiceError::EndNotAfterStart);
        }

        let task = task::Entity::find_by_id(task_id)
            .filter(task::Column::Username.eq(username))
            .filter(task::Column::IsActive.eq(true))
            .one(self.db)
            .await?
            .ok_or(SessionServiceError::TaskNotFound(task_id))?;

        if self
            .has_conflict(username, planned_start, planned_end, None)
            .await?
        {
            return Err(SessionServiceError::Conflict);
        }

        let remaining = task.target_minutes as i64 - self.booked_minutes(task_id).await?;
        if remaining <= 0 {
            return Err(SessionServiceError::TargetReached(task.title.clone()));
        }

        let session_minutes = planned_minutes(planned_start, planned_end);
        let overtime = (session_minutes > remaining).then(|| OvertimeWarning {
            planned_minutes: session_minutes,
            remaining_minutes: remaining,
            task_title: task.title.clone(),
        });

        let active_model = session::ActiveModel {
            task_id: ActiveValue::Set(task_id),
            username: ActiveValue::Set(username.to_string()),
            planned_start: ActiveValue::Set(planned_start),
            planned_end: ActiveValue::Set(planned_end),
            actual_minutes: ActiveValue::Set(0),
            completion_percent: ActiveValue::Set(0),
            status: ActiveValue::Set(SessionStatus::Pending),
            notes: ActiveValue::Set(notes),
            created_at: ActiveValue::Set(Utc::now()),
            ..Default::default()
        };
        let created_model = active_model.insert(self.db).await?;

        Ok(Booking {
            session: Session::from(created_model),
            overtime,
        })
    }

    /// Checks whether the interval overlaps any of the user's non-cancelled
    /// sessions. Half-open test: existing.start < end and existing.end > start.
    #[tracing::instrument(skip(self))]
    pub async fn has_conflict(
        &self,
        username: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_session_id: Option<i32>,
    ) -> Result<bool, SessionServiceError> {
        let mut query = session::Entity::find()
            .filter(session::Column::Username.eq(username))
            .filter(session::Column::Status.ne(SessionStatus::Cancelled))
            .filter(session::Column::PlannedStart.lt(end))
            .filter(session::Column::PlannedEnd.gt(start));
        if let Some(id) = exclude_session_id {
            query = query.filter(session::Column::Id.ne(id));
        }
        Ok(query.one(self.db).await?.is_some())
    }

    /// Minutes already logged against a task, ignoring cancelled and
    /// not-yet-started sessions.
    #[tracing::instrument(skip(self))]
    pub async fn booked_minutes(&self, task_id: i32) -> Result<i64, SessionServiceError> {
        let sessions = session::Entity::find()
            .filter(session::Column::TaskId.eq(task_id))
            .filter(
                session::Column::Status
                    .is_not_in([SessionStatus::Cancelled, SessionStatus::Pending]),
            )
            .all(self.db)
            .await?;
        Ok(sessions.iter().map(|s| s.actual_minutes as i64).sum())
    }

    /// Remaining minutes before a task reaches its target. May be negative
    /// when the target is already exceeded.
    pub async fn remaining_minutes(
        &self,
        task: &crate::task::Task,
    ) -> Result<i64, SessionServiceError> {
        Ok(task.target_minutes() as i64 - self.booked_minutes(task.id()).await?)
    }

    /// Flips the user's pending sessions whose planned start has passed to
    /// in_progress.
    #[tracing::instrument(skip(self))]
    pub async fn start_due_sessions(&self, username: &str) -> Result<(), SessionServiceError> {
        session::Entity::update_many()
            .col_expr(
                session::Column::Status,
                Expr::value(SessionStatus::InProgress),
            )
            .filter(session::Column::Username.eq(username))
            .filter(session::Column::Status.eq(SessionStatus::Pending))
            .filter(session::Column::PlannedStart.lte(Utc::now()))
            .exec(self.db)
            .await?;
        Ok(())
    }

    /// Retrieves the user's sessions ordered by planned start, flipping due
    /// pending sessions to in_progress first. An optional status narrows the
    /// result.
    #[tracing::instrument(skip(self))]
    pub async fn get_sessions(
        &self,
        username: &str,
        status: Option<SessionStatus>,
    ) -> Result<Vec<Session>, SessionServiceError> {
        self.start_due_sessions(username).await?;

        let mut query = session::Entity::find()
            .filter(session::Column::Username.eq(username))
            .order_by_asc(session::Column::PlannedStart);
        if let Some(status) = status {
            query = query.filter(session::Column::Status.eq(status));
        }
        let sessions = query
            .all(self.db)
            .await?
            .into_iter()
            .map(Session::from)
            .collect();
        Ok(sessions)
    }

    /// Same as [`get_sessions`](Self::get_sessions), but pairs every session
    /// with the title of its task for display.
    #[tracing::instrument(skip(self))]
    pub async fn get_sessions_with_tasks(
        &self,
        username: &str,
        status: Option<SessionStatus>,
    ) -> Result<Vec<(Session, String)>, SessionServiceError> {
        self.start_due_sessions(username).await?;

        let mut query = session::Entity::find()
            .filter(session::Column::Username.eq(username))
            .order_by_asc(session::Column::PlannedStart);
        if let Some(status) = status {
            query = query.filter(session::Column::Status.eq(status));
        }
        let rows = query.find_also_related(task::Entity).all(self.db).await?;
        Ok(rows
            .into_iter()
            .map(|(session, task)| {
                let title = task.map(|task| task.title).unwrap_or_default();
                (Session::from(session), title)
            })
            .collect())
    }

    /// Retrieves one of the user's sessions by its ID.
    #[tracing::instrument(skip(self))]
    pub async fn get_session(
        &self,
        username: &str,
        id: i32,
    ) -> Result<Session, SessionServiceError> {
        let model = self.find_owned(username, id).await?;
        Ok(Session::from(model))
    }

    /// Retrieves a session for display, applying the lazy pending →
    /// in_progress transition when its planned start has passed.
    #[tracing::instrument(skip(self))]
    pub async fn view_session(
        &self,
        username: &str,
        id: i32,
    ) -> Result<Session, SessionServiceError> {
        let model = self.find_owned(username, id).await?;
        if model.status == SessionStatus::Pending && model.planned_start <= Utc::now() {
            let mut active_model: session::ActiveModel = model.into();
            active_model.status = ActiveValue::Set(SessionStatus::InProgress);
            return Ok(Session::from(active_model.update(self.db).await?));
        }
        Ok(Session::from(model))
    }

    /// Records progress against a started session.
    ///
    /// The session must be in_progress or completed; the logged time must be
    /// positive and at most three times the planned duration. The status
    /// becomes completed only when `mark_complete` is set, otherwise
    /// in_progress.
    #[tracing::instrument(skip(self))]
    pub async fn update_progress(
        &self,
        username: &str,
        id: i32,
        update: ProgressUpdate,
    ) -> Result<Session, SessionServiceError> {
        let model = self.find_owned(username, id).await?;
        match model.status {
            SessionStatus::Cancelled => return Err(SessionServiceError::UpdateCancelled),
            SessionStatus::Pending => return Err(SessionServiceError::UpdateBeforeStart),
            _ => {}
        }

        let actual_minutes = update.actual_minutes.unwrap_or(model.actual_minutes);
        let completion_percent = update
            .completion_percent
            .unwrap_or(model.completion_percent);
        validate_progress(
            planned_minutes(model.planned_start, model.planned_end),
            actual_minutes,
            completion_percent,
        )?;

        let notes = update.notes.unwrap_or_else(|| model.notes.clone());
        let mut active_model: session::ActiveModel = model.into();
        active_model.actual_minutes = ActiveValue::Set(actual_minutes);
        active_model.completion_percent = ActiveValue::Set(completion_percent);
        active_model.notes = ActiveValue::Set(notes);
        active_model.status = ActiveValue::Set(if update.mark_complete {
            SessionStatus::Completed
        } else {
            SessionStatus::InProgress
        });
        let updated_model = active_model.update(self.db).await?;
        Ok(Session::from(updated_model))
    }

    /// Cancels a session that has not finished yet.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_session(
        &self,
        username: &str,
        id: i32,
    ) -> Result<Session, SessionServiceError> {
        let model = self.find_owned(username, id).await?;
        if matches!(
            model.status,
            SessionStatus::Completed | SessionStatus::Cancelled
        ) {
            return Err(SessionServiceError::NotCancellable);
        }

        let mut active_model: session::ActiveModel = model.into();
        active_model.status = ActiveValue::Set(SessionStatus::Cancelled);
        let updated_model = active_model.update(self.db).await?;
        Ok(Session::from(updated_model))
    }

    /// Deletes a cancelled session.
    #[tracing::instrument(skip(self))]
    pub async fn delete_session(
        &self,
        username: &str,
        id: i32,
    ) -> Result<Session, SessionServiceError> {
        let model = self.find_owned(username, id).await?;
        if model.status != SessionStatus::Cancelled {
            return Err(SessionServiceError::NotDeletable);
        }

        let session_copy = Session::from(model);
        session::Entity::delete_by_id(id).exec(self.db).await?;
        Ok(session_copy)
    }

    /// Moves a pending or in-progress session to a new time slot.
    ///
    /// The new interval must be valid and conflict-free; a pending session
    /// whose new start has already passed comes back in_progress.
    #[tracing::instrument(skip(self))]
    pub async fn reschedule_session(
        &self,
        username: &str,
        id: i32,
        new_start: DateTime<Utc>,
        new_end: DateTime<Utc>,
    ) -> Result<Session, SessionServiceError> {
        let model = self.find_owned(username, id).await?;
        if !matches!(
            model.status,
            SessionStatus::Pending | SessionStatus::InProgress
        ) {
            return Err(SessionServiceError::NotReschedulable);
        }
        if new_end <= new_start {
            return Err(SessionServiceError::EndNotAfterStart);
        }
        if self
            .has_conflict(username, new_start, new_end, Some(id))
            .await?
        {
            return Err(SessionServiceError::Conflict);
        }

        let status = if model.status == SessionStatus::Pending && new_start <= Utc::now() {
            SessionStatus::InProgress
        } else {
            model.status
        };
        let mut active_model: session::ActiveModel = model.into();
        active_model.planned_start = ActiveValue::Set(new_start);
        active_model.planned_end = ActiveValue::Set(new_end);
        active_model.status = ActiveValue::Set(status);
        let updated_model = active_model.update(self.db).await?;
        Ok(Session::from(updated_model))
    }

    async fn find_owned(
        &self,
        username: &str,
        id: i32,
    ) -> Result<session::Model, SessionServiceError> {
        session::Entity::find_by_id(id)
            .filter(session::Column::Username.eq(username))
            .one(self.db)
            .await?
            .ok_or(SessionServiceError::SessionNotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(value: &str) -> DateTime<Utc> {
        value.parse().unwrap()
    }

    #[test]
    fn planned_minutes_spans_the_block() {
        let start = utc("2025-08-20T10:00:00Z");
        let end = utc("2025-08-20T11:30:00Z");
        assert_eq!(planned_minutes(start, end), 90);
    }

    #[test]
    fn progress_requires_some_time_spent() {
        let result = validate_progress(60, 0, 50);
        assert!(matches!(
            result,
            Err(SessionServiceError::MissingActualMinutes)
        ));
    }

    #[test]
    fn progress_rejects_negative_minutes() {
        let result = validate_progress(60, -5, 50);
        assert!(matches!(
            result,
            Err(SessionServiceError::NegativeActualMinutes)
        ));
    }

    #[test]
    fn progress_rejects_more_than_three_times_the_plan() {
        let result = validate_progress(60, 181, 50);
        assert!(matches!(
            result,
            Err(SessionServiceError::ActualMinutesTooHigh(180))
        ));
    }

    #[test]
    fn progress_allows_exactly_three_times_the_plan() {
        assert!(validate_progress(60, 180, 50).is_ok());
    }

    #[test]
    fn progress_bounds_completion_percent() {
        assert!(matches!(
            validate_progress(60, 30, 101),
            Err(SessionServiceError::CompletionPercentOutOfRange)
        ));
        assert!(matches!(
            validate_progress(60, 30, -1),
            Err(SessionServiceError::CompletionPercentOutOfRange)
        ));
        assert!(validate_progress(60, 30, 0).is_ok());
        assert!(validate_progress(60, 30, 100).is_ok());
    }
}
