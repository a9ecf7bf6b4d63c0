//! Database schema for tasks.db.

use crate::sqlite_column;
use crate::sqlite_persistence::{SqlType, Table, VersionedSchema};

/// Pending and in-flight tasks. A row with `locked_at` set belongs to a worker.
const PENDING_TASKS_TABLE_V0: Table = Table {
    name: "pending_tasks",
    columns: &[
        sqlite_column!("task_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("kind", &SqlType::Text, non_null = true),
        sqlite_column!("params", &SqlType::Text, non_null = true),
        sqlite_column!("lane", &SqlType::Text, non_null = true),
        sqlite_column!("priority", &SqlType::Integer, non_null = true),
        sqlite_column!("run_at", &SqlType::Integer, non_null = true),
        sqlite_column!("label", &SqlType::Text, non_null = true),
        sqlite_column!(
            "attempts",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
        sqlite_column!("locked_at", &SqlType::Integer),
        sqlite_column!("failed_at", &SqlType::Integer),
        sqlite_column!("last_error", &SqlType::Text),
    ],
    indices: &[
        ("idx_pending_ready", "locked_at, run_at"),
        ("idx_pending_lane", "lane, kind"),
    ],
};

/// Append-only log of tasks that left the queue.
const COMPLETED_TASKS_TABLE_V0: Table = Table {
    name: "completed_tasks",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("task_id", &SqlType::Text, non_null = true),
        sqlite_column!("kind", &SqlType::Text, non_null = true),
        sqlite_column!("params", &SqlType::Text, non_null = true),
        sqlite_column!("lane", &SqlType::Text, non_null = true),
        sqlite_column!("label", &SqlType::Text, non_null = true),
        sqlite_column!("priority", &SqlType::Integer, non_null = true),
        sqlite_column!("attempts", &SqlType::Integer, non_null = true),
        sqlite_column!("ran_at", &SqlType::Integer, non_null = true),
        sqlite_column!("failed_at", &SqlType::Integer),
        sqlite_column!("last_error", &SqlType::Text),
        sqlite_column!("duration_ms", &SqlType::Integer),
        sqlite_column!("completed_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[
        ("idx_completed_lane", "lane, failed_at"),
        ("idx_completed_at", "completed_at"),
        ("idx_completed_task_id", "task_id"),
    ],
};

pub const TASK_QUEUE_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[PENDING_TASKS_TABLE_V0, COMPLETED_TASKS_TABLE_V0],
    migration: None,
}];
