//! Task queue data models.
//!
//! Tasks reference catalog entities only through opaque id strings carried in
//! their [`TaskParams`]; nothing in here knows what a source or media item is.

use crate::task_identity::compute_task_id;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of work a task performs. Each kind is bound to exactly one handler
/// in the [`TaskRegistry`](super::TaskRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Enumerate a source and persist discovered media. Args: `[source_id]`.
    IndexSource,
    /// Make sure a source's output directory exists. Args: `[source_id]`.
    CheckSourceDirectory,
    /// Fetch the metadata document of a media item. Args: `[media_id]`.
    FetchMetadata,
    /// Fetch and resize a media thumbnail. Args: `[media_id, url]`.
    FetchThumbnail,
    /// Download the media file. Args: `[media_id]`.
    DownloadMedia,
    /// Ask a media server to rescan its libraries. Args: `[server_id]`.
    RescanMediaServer,
}

impl TaskKind {
    pub const ALL: [TaskKind; 6] = [
        TaskKind::IndexSource,
        TaskKind::CheckSourceDirectory,
        TaskKind::FetchMetadata,
        TaskKind::FetchThumbnail,
        TaskKind::DownloadMedia,
        TaskKind::RescanMediaServer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::IndexSource => "index_source",
            TaskKind::CheckSourceDirectory => "check_source_directory",
            TaskKind::FetchMetadata => "fetch_metadata",
            TaskKind::FetchThumbnail => "fetch_thumbnail",
            TaskKind::DownloadMedia => "download_media",
            TaskKind::RescanMediaServer => "rescan_media_server",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }

    /// Default scheduling priority. Higher values are dequeued first.
    pub fn default_priority(&self) -> i32 {
        match self {
            TaskKind::CheckSourceDirectory => 20,
            TaskKind::IndexSource => 15,
            TaskKind::FetchMetadata => 10,
            TaskKind::FetchThumbnail => 5,
            TaskKind::RescanMediaServer => 3,
            TaskKind::DownloadMedia => 1,
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Arguments of a task.
///
/// Positional arguments keep their order; named options are kept in a sorted
/// map so that the serialized form does not depend on insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskParams {
    pub args: Vec<String>,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl TaskParams {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            options: BTreeMap::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn first_arg(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    /// Order-stable JSON encoding, used both for storage and for task ids.
    pub fn canonical_json(&self) -> String {
        // Vec<String> and BTreeMap<String, String> always serialize
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn from_json(json: &str) -> Option<Self> {
        serde_json::from_str(json).ok()
    }
}

/// Request to schedule a task.
#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub kind: TaskKind,
    pub params: TaskParams,
    pub lane: String,
    pub priority: i32,
    /// Unix timestamp (seconds) before which the task is not ready.
    pub run_at: i64,
    pub label: String,
    /// Replace an equivalent pending task instead of ignoring the request.
    pub replace_existing: bool,
}

impl TaskRequest {
    pub fn new(kind: TaskKind, params: TaskParams, lane: impl Into<String>, now: i64) -> Self {
        Self {
            kind,
            params,
            lane: lane.into(),
            priority: kind.default_priority(),
            run_at: now,
            label: kind.as_str().to_string(),
            replace_existing: false,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn scheduled_at(mut self, run_at: i64) -> Self {
        self.run_at = run_at;
        self
    }

    pub fn replacing(mut self) -> Self {
        self.replace_existing = true;
        self
    }

    pub fn task_id(&self) -> String {
        compute_task_id(self.kind, &self.params)
    }
}

/// A pending or in-flight task.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: String,
    pub kind: TaskKind,
    pub params: TaskParams,
    pub lane: String,
    pub priority: i32,
    pub run_at: i64,
    pub label: String,
    /// Number of failed attempts so far.
    pub attempts: u32,
    pub created_at: i64,
    /// Set while a worker owns the task.
    pub locked_at: Option<i64>,
    pub failed_at: Option<i64>,
    pub last_error: Option<String>,
}

impl Task {
    pub fn is_in_flight(&self) -> bool {
        self.locked_at.is_some()
    }
}

/// Outcome record of a task that left the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedTask {
    pub id: i64,
    pub task_id: String,
    pub kind: TaskKind,
    pub params: TaskParams,
    pub lane: String,
    pub label: String,
    pub priority: i32,
    pub attempts: u32,
    pub ran_at: i64,
    pub failed_at: Option<i64>,
    pub last_error: Option<String>,
    pub duration_ms: Option<i64>,
    pub completed_at: i64,
}

impl CompletedTask {
    pub fn has_failed(&self) -> bool {
        self.failed_at.is_some()
    }
}

/// Result of an enqueue request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Inserted,
    /// An equivalent pending task was replaced.
    Replaced,
    /// An equivalent task is already pending; nothing changed.
    AlreadyPending,
    /// An equivalent task is currently being executed; nothing changed.
    InFlight,
}

impl EnqueueOutcome {
    pub fn is_scheduled(&self) -> bool {
        matches!(self, EnqueueOutcome::Inserted | EnqueueOutcome::Replaced)
    }
}
