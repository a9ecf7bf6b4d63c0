//! Deterministic task identifiers and helpers mapping tasks back to what they
//! concern.

mod subject;

pub use subject::{resolve_stored_task_subject, resolve_task_subject, TaskSubject};

use crate::task_queue::{CompletedTask, TaskKind, TaskParams};
use sha2::{Digest, Sha256};

/// Derives the identifier of the logical work `(kind, params)`.
///
/// Two requests for the same kind with equal params always get the same id,
/// which is what the queue deduplicates on.
pub fn compute_task_id(kind: TaskKind, params: &TaskParams) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update(b"\n");
    hasher.update(params.canonical_json().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Returns the human readable part of a failed task's error trace.
///
/// Empty when the task did not fail or its trace carries no `Kind: message` line.
pub fn extract_error_summary(task: &CompletedTask) -> String {
    if !task.has_failed() {
        return String::new();
    }
    task.last_error
        .as_deref()
        .map(summarize_trace)
        .unwrap_or_default()
}

/// Takes the last line of `trace` and strips its leading `Kind:` prefix.
pub fn summarize_trace(trace: &str) -> String {
    let Some(last_line) = trace.trim().lines().last() else {
        return String::new();
    };
    match last_line.split_once(':') {
        Some((_, message)) => message.trim().to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed_task(trace: Option<&str>) -> CompletedTask {
        CompletedTask {
            id: 1,
            task_id: "abc".to_string(),
            kind: TaskKind::DownloadMedia,
            params: TaskParams::new(["m"]),
            lane: "s".to_string(),
            label: "download".to_string(),
            priority: 1,
            attempts: 1,
            ran_at: 10,
            failed_at: Some(20),
            last_error: trace.map(str::to_string),
            duration_ms: Some(5),
            completed_at: 20,
        }
    }

    #[test]
    fn test_task_id_is_stable() {
        let params = TaskParams::new(["6a1f"]);
        let first = compute_task_id(TaskKind::FetchMetadata, &params);
        let second = compute_task_id(TaskKind::FetchMetadata, &params.clone());

        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_task_id_depends_on_kind_and_args() {
        let params = TaskParams::new(["6a1f"]);
        let metadata = compute_task_id(TaskKind::FetchMetadata, &params);
        let download = compute_task_id(TaskKind::DownloadMedia, &params);
        let other = compute_task_id(TaskKind::FetchMetadata, &TaskParams::new(["6a20"]));

        assert_ne!(metadata, download);
        assert_ne!(metadata, other);
    }

    #[test]
    fn test_task_id_ignores_option_insertion_order() {
        let a = TaskParams::new(["m"])
            .with_option("quality", "85")
            .with_option("height", "240");
        let b = TaskParams::new(["m"])
            .with_option("height", "240")
            .with_option("quality", "85");

        assert_eq!(
            compute_task_id(TaskKind::FetchThumbnail, &a),
            compute_task_id(TaskKind::FetchThumbnail, &b)
        );
    }

    #[test]
    fn test_positional_arg_order_matters() {
        assert_ne!(
            compute_task_id(TaskKind::FetchThumbnail, &TaskParams::new(["a", "b"])),
            compute_task_id(TaskKind::FetchThumbnail, &TaskParams::new(["b", "a"]))
        );
    }

    #[test]
    fn test_error_summary_strips_kind_prefix() {
        let task = failed_task(Some("Traceback...\nDownloadFailedException: disk full"));
        assert_eq!(extract_error_summary(&task), "disk full");
    }

    #[test]
    fn test_error_summary_keeps_colons_in_message() {
        let task = failed_task(Some(
            "download_media failed\nTransientExternalFailure: request failed: timed out\n",
        ));
        assert_eq!(extract_error_summary(&task), "request failed: timed out");
    }

    #[test]
    fn test_error_summary_empty_cases() {
        assert_eq!(extract_error_summary(&failed_task(Some(""))), "");
        assert_eq!(extract_error_summary(&failed_task(None)), "");
        assert_eq!(extract_error_summary(&failed_task(Some("no prefix here"))), "");

        let mut succeeded = failed_task(Some("Kind: stale"));
        succeeded.failed_at = None;
        assert_eq!(extract_error_summary(&succeeded), "");
    }
}
