//! Task queue storage and persistence.
//!
//! Provides SQLite-backed storage for pending tasks and the completed task log.

use super::models::*;
use super::schema::TASK_QUEUE_VERSIONED_SCHEMAS;
use crate::sqlite_persistence::{open_in_memory, open_versioned_database};
use crate::task_identity::compute_task_id;
use anyhow::{anyhow, Result};
use rusqlite::{params, types::Type, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Trait for task queue storage operations.
///
/// Every state transition is atomic: a task is handed to at most one worker,
/// and lane cancellation never races with dequeue.
pub trait TaskStore: Send + Sync {
    // === Scheduling ===

    /// Schedule a task. An equivalent unresolved task makes this a no-op,
    /// unless the request asks to replace a pending one.
    fn enqueue(&self, request: TaskRequest) -> Result<EnqueueOutcome>;

    /// Find the pending (or in-flight) task for the given work, if any.
    fn find_pending(&self, kind: TaskKind, params: &TaskParams) -> Result<Option<Task>>;

    /// Find the download task of a media item.
    fn find_download_task(&self, media_id: &str) -> Result<Option<Task>> {
        self.find_pending(TaskKind::DownloadMedia, &TaskParams::new([media_id]))
    }

    // === State Transitions (atomic) ===

    /// Claim the next ready task (`run_at <= now`) and mark it in-flight.
    fn dequeue_ready(&self, now: i64) -> Result<Option<Task>>;

    /// Move an in-flight task into the completed log.
    fn complete(&self, task: &Task, error: Option<&str>, duration_ms: i64) -> Result<()>;

    /// Record a failed attempt and release the task for another try at `run_at`.
    fn retry_later(&self, task: &Task, run_at: i64, error: &str) -> Result<()>;

    /// Release tasks left in-flight by a previous process. Returns the count.
    fn requeue_in_flight(&self) -> Result<usize>;

    // === Cancellation ===

    /// Remove pending tasks of `kind` in `lane`. In-flight tasks are untouched.
    fn cancel_lane_tasks(&self, kind: TaskKind, lane: &str) -> Result<usize>;

    /// Remove every pending task in `lane`.
    fn cancel_lane(&self, lane: &str) -> Result<usize>;

    /// Remove a single pending task. Returns true if one was removed.
    fn drop_pending(&self, kind: TaskKind, params: &TaskParams) -> Result<bool>;

    // === Queries ===

    /// Pending tasks in dequeue order.
    fn list_pending(&self, limit: usize) -> Result<Vec<Task>>;

    fn count_pending(&self) -> Result<usize>;

    /// Completed tasks, newest first, optionally for one lane and/or failures only.
    fn list_completed(
        &self,
        lane: Option<&str>,
        only_errors: bool,
        limit: usize,
    ) -> Result<Vec<CompletedTask>>;

    // === Maintenance ===

    /// Delete completed records finished before `cutoff`. Returns the count.
    fn purge_completed_older_than(&self, cutoff: i64) -> Result<usize>;
}

/// SQLite-backed task store.
pub struct SqliteTaskStore {
    conn: Arc<Mutex<Connection>>,
}

const DEQUEUE_ORDER: &str = "priority DESC, run_at ASC, created_at ASC";

impl SqliteTaskStore {
    /// Opens an existing database or creates a new one with the current schema.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_database(db_path.as_ref(), TASK_QUEUE_VERSIONED_SCHEMAS, "Task")?;
        Ok(SqliteTaskStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Creates a store that lives in memory.
    pub fn in_memory() -> Result<Self> {
        let conn = open_in_memory(TASK_QUEUE_VERSIONED_SCHEMAS)?;
        Ok(SqliteTaskStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Task store connection lock poisoned"))
    }

    fn parse_kind(value: String, column: usize) -> rusqlite::Result<TaskKind> {
        TaskKind::from_str(&value).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                Type::Text,
                format!("unknown task kind '{}'", value).into(),
            )
        })
    }

    fn parse_params(value: String, column: usize) -> rusqlite::Result<TaskParams> {
        TaskParams::from_json(&value).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                Type::Text,
                format!("malformed task params '{}'", value).into(),
            )
        })
    }

    /// Helper to convert a `pending_tasks` row to a Task.
    fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<Task> {
        Ok(Task {
            id: row.get("task_id")?,
            kind: Self::parse_kind(row.get("kind")?, 1)?,
            params: Self::parse_params(row.get("params")?, 2)?,
            lane: row.get("lane")?,
            priority: row.get("priority")?,
            run_at: row.get("run_at")?,
            label: row.get("label")?,
            attempts: row.get("attempts")?,
            created_at: row.get("created_at")?,
            locked_at: row.get("locked_at")?,
            failed_at: row.get("failed_at")?,
            last_error: row.get("last_error")?,
        })
    }

    /// Helper to convert a `completed_tasks` row to a CompletedTask.
    fn row_to_completed(row: &rusqlite::Row) -> rusqlite::Result<CompletedTask> {
        Ok(CompletedTask {
            id: row.get("id")?,
            task_id: row.get("task_id")?,
            kind: Self::parse_kind(row.get("kind")?, 2)?,
            params: Self::parse_params(row.get("params")?, 3)?,
            lane: row.get("lane")?,
            label: row.get("label")?,
            priority: row.get("priority")?,
            attempts: row.get("attempts")?,
            ran_at: row.get("ran_at")?,
            failed_at: row.get("failed_at")?,
            last_error: row.get("last_error")?,
            duration_ms: row.get("duration_ms")?,
            completed_at: row.get("completed_at")?,
        })
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }
}

impl TaskStore for SqliteTaskStore {
    fn enqueue(&self, request: TaskRequest) -> Result<EnqueueOutcome> {
        let task_id = request.task_id();
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let existing: Option<Option<i64>> = tx
            .query_row(
                "SELECT locked_at FROM pending_tasks WHERE task_id = ?1",
                [&task_id],
                |row| row.get(0),
            )
            .optional()?;

        let outcome = match existing {
            Some(Some(_)) => EnqueueOutcome::InFlight,
            Some(None) if !request.replace_existing => EnqueueOutcome::AlreadyPending,
            Some(None) => {
                tx.execute("DELETE FROM pending_tasks WHERE task_id = ?1", [&task_id])?;
                EnqueueOutcome::Replaced
            }
            None => EnqueueOutcome::Inserted,
        };

        if outcome.is_scheduled() {
            tx.execute(
                r#"INSERT INTO pending_tasks (
                    task_id, kind, params, lane, priority, run_at, label,
                    attempts, created_at, locked_at, failed_at, last_error
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, NULL, NULL, NULL)"#,
                params![
                    task_id,
                    request.kind.as_str(),
                    request.params.canonical_json(),
                    request.lane,
                    request.priority,
                    request.run_at,
                    request.label,
                    Self::now(),
                ],
            )?;
        }
        tx.commit()?;

        debug!(
            "Enqueue {} [{}] in lane {}: {:?}",
            request.kind, task_id, request.lane, outcome
        );
        Ok(outcome)
    }

    fn find_pending(&self, kind: TaskKind, params: &TaskParams) -> Result<Option<Task>> {
        let task_id = compute_task_id(kind, params);
        let conn = self.lock()?;
        let task = conn
            .query_row(
                "SELECT * FROM pending_tasks WHERE task_id = ?1",
                [&task_id],
                Self::row_to_task,
            )
            .optional()?;
        Ok(task)
    }

    fn dequeue_ready(&self, now: i64) -> Result<Option<Task>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let candidate = tx
            .query_row(
                &format!(
                    "SELECT * FROM pending_tasks WHERE locked_at IS NULL AND run_at <= ?1 \
                     ORDER BY {} LIMIT 1",
                    DEQUEUE_ORDER
                ),
                [now],
                Self::row_to_task,
            )
            .optional()?;

        let Some(mut task) = candidate else {
            return Ok(None);
        };

        let claimed = tx.execute(
            "UPDATE pending_tasks SET locked_at = ?1 WHERE task_id = ?2 AND locked_at IS NULL",
            params![now, task.id],
        )?;
        tx.commit()?;

        if claimed != 1 {
            return Ok(None);
        }
        task.locked_at = Some(now);
        Ok(Some(task))
    }

    fn complete(&self, task: &Task, error: Option<&str>, duration_ms: i64) -> Result<()> {
        let now = Self::now();
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM pending_tasks WHERE task_id = ?1", [&task.id])?;
        let attempts = if error.is_some() {
            task.attempts + 1
        } else {
            task.attempts
        };
        tx.execute(
            r#"INSERT INTO completed_tasks (
                task_id, kind, params, lane, label, priority, attempts,
                ran_at, failed_at, last_error, duration_ms, completed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"#,
            params![
                task.id,
                task.kind.as_str(),
                task.params.canonical_json(),
                task.lane,
                task.label,
                task.priority,
                attempts,
                task.locked_at.unwrap_or(now),
                error.map(|_| now),
                error,
                duration_ms,
                now,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn retry_later(&self, task: &Task, run_at: i64, error: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"UPDATE pending_tasks
               SET locked_at = NULL, run_at = ?1, attempts = attempts + 1,
                   failed_at = ?2, last_error = ?3
               WHERE task_id = ?4"#,
            params![run_at, Self::now(), error, task.id],
        )?;
        Ok(())
    }

    fn requeue_in_flight(&self) -> Result<usize> {
        let conn = self.lock()?;
        let released = conn.execute(
            "UPDATE pending_tasks SET locked_at = NULL WHERE locked_at IS NOT NULL",
            [],
        )?;
        if released > 0 {
            info!("Released {} tasks left in-flight by a previous run", released);
        }
        Ok(released)
    }

    fn cancel_lane_tasks(&self, kind: TaskKind, lane: &str) -> Result<usize> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM pending_tasks WHERE kind = ?1 AND lane = ?2 AND locked_at IS NULL",
            params![kind.as_str(), lane],
        )?;
        Ok(removed)
    }

    fn cancel_lane(&self, lane: &str) -> Result<usize> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM pending_tasks WHERE lane = ?1 AND locked_at IS NULL",
            [lane],
        )?;
        Ok(removed)
    }

    fn drop_pending(&self, kind: TaskKind, params: &TaskParams) -> Result<bool> {
        let task_id = compute_task_id(kind, params);
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM pending_tasks WHERE task_id = ?1 AND locked_at IS NULL",
            [&task_id],
        )?;
        Ok(removed > 0)
    }

    fn list_pending(&self, limit: usize) -> Result<Vec<Task>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT * FROM pending_tasks ORDER BY {} LIMIT ?1",
            DEQUEUE_ORDER
        ))?;
        let tasks = stmt
            .query_map([limit as i64], Self::row_to_task)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tasks)
    }

    fn count_pending(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM pending_tasks", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn list_completed(
        &self,
        lane: Option<&str>,
        only_errors: bool,
        limit: usize,
    ) -> Result<Vec<CompletedTask>> {
        let conn = self.lock()?;
        let mut sql = String::from("SELECT * FROM completed_tasks WHERE (?1 IS NULL OR lane = ?1)");
        if only_errors {
            sql.push_str(" AND failed_at IS NOT NULL ORDER BY failed_at DESC, id DESC");
        } else {
            sql.push_str(" ORDER BY completed_at DESC, id DESC");
        }
        sql.push_str(" LIMIT ?2");

        let mut stmt = conn.prepare(&sql)?;
        let tasks = stmt
            .query_map(params![lane, limit as i64], Self::row_to_completed)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tasks)
    }

    fn purge_completed_older_than(&self, cutoff: i64) -> Result<usize> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM completed_tasks WHERE completed_at < ?1",
            [cutoff],
        )?;
        Ok(deleted)
    }
}
