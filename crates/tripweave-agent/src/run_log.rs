use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast::{error::RecvError, Receiver};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use tripweave_core::types::{SessionId, WorkflowEvent};

/// JSONL audit logger for one workflow run.
///
/// Reads `WorkflowEvent`s for its session and writes one JSON object per
/// line. The file is append-only and flushed per entry, so every line written
/// before a crash stays intact.
pub struct RunLogger {
    log_dir: PathBuf,
    level: u8,
}

/// A single log entry written to the JSONL file.
#[derive(Serialize)]
struct LogEntry {
    timestamp: String,
    session_id: String,
    event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<serde_json::Value>,
}

impl RunLogger {
    /// Logs go to `{log_dir}/{session_id}/{timestamp}.jsonl`.
    /// `level` controls verbosity: 1=run summary, 2=task transitions, 3=negotiation rounds.
    pub fn new(log_dir: PathBuf, level: u8) -> Self {
        Self { log_dir, level }
    }

    /// Run the logger until cancellation or the run's `RunFinished`/`RunError`.
    ///
    /// Takes an already-subscribed receiver so no event published between
    /// spawning the logger and its first poll is lost.
    pub async fn run(
        self,
        mut rx: Receiver<WorkflowEvent>,
        session_id: SessionId,
        cancel: CancellationToken,
    ) {
        let session_dir = self.log_dir.join(&session_id.0);
        if let Err(e) = tokio::fs::create_dir_all(&session_dir).await {
            error!(error = %e, "Failed to create log directory");
            return;
        }

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let log_path = session_dir.join(format!("{}.jsonl", timestamp));

        let file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await
        {
            Ok(f) => f,
            Err(e) => {
                error!(error = %e, path = %log_path.display(), "Failed to open log file");
                return;
            }
        };

        info!(path = %log_path.display(), "RunLogger started");

        let mut writer = tokio::io::BufWriter::new(file);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("RunLogger cancelled");
                    break;
                }
                result = rx.recv() => {
                    match result {
                        Ok(event) => {
                            if event.session_id() != &session_id {
                                continue;
                            }
                            let finished = matches!(
                                event,
                                WorkflowEvent::RunFinished { .. } | WorkflowEvent::RunError { .. }
                            );

                            if let Some(entry) = self.event_to_entry(&event) {
                                if let Ok(json) = serde_json::to_string(&entry) {
                                    let line = format!("{}\n", json);
                                    if let Err(e) = writer.write_all(line.as_bytes()).await {
                                        error!(error = %e, "Failed to write log entry");
                                        break;
                                    }
                                    if let Err(e) = writer.flush().await {
                                        error!(error = %e, "Failed to flush log");
                                    }
                                }
                            }

                            if finished {
                                break;
                            }
                        }
                        Err(RecvError::Lagged(n)) => {
                            debug!(skipped = n, "RunLogger lagged, skipped events");
                        }
                        Err(RecvError::Closed) => {
                            debug!("EventBus closed, RunLogger stopping");
                            break;
                        }
                    }
                }
            }
        }

        writer.flush().await.ok();
        debug!(path = %log_path.display(), "RunLogger finished");
    }

    /// Convert an event to a log entry, or `None` when filtered by level.
    fn event_to_entry(&self, event: &WorkflowEvent) -> Option<LogEntry> {
        let entry = |event_type: &str, role: Option<String>, detail: Option<serde_json::Value>| {
            Some(LogEntry {
                timestamp: Utc::now().to_rfc3339(),
                session_id: event.session_id().0.clone(),
                event_type: event_type.to_string(),
                role,
                detail,
            })
        };

        match event {
            // L1: run summary
            WorkflowEvent::RunStarted { .. } => entry("run_started", None, None),
            WorkflowEvent::RunFinished { status, .. } => entry(
                "run_finished",
                None,
                Some(serde_json::json!({ "status": status })),
            ),
            WorkflowEvent::RunError { error, .. } => entry(
                "run_error",
                None,
                Some(serde_json::json!({ "error": error })),
            ),
            WorkflowEvent::AllocationSealed { allocation, .. } => entry(
                "allocation_sealed",
                None,
                Some(serde_json::json!({
                    "status": allocation.status,
                    "total": allocation.total,
                    "requested": allocation.requested,
                    "rounds": allocation.rounds,
                    "shortfall": allocation.shortfall,
                })),
            ),

            // L2: task transitions
            WorkflowEvent::TaskStarted { role, attempt, .. } if self.level >= 2 => entry(
                "task_started",
                Some(role.to_string()),
                Some(serde_json::json!({ "attempt": attempt })),
            ),
            WorkflowEvent::TaskRetrying {
                role,
                attempt,
                backoff_ms,
                error,
                ..
            } if self.level >= 2 => entry(
                "task_retrying",
                Some(role.to_string()),
                Some(serde_json::json!({
                    "attempt": attempt,
                    "backoff_ms": backoff_ms,
                    "error": truncate_str(error, 300),
                })),
            ),
            WorkflowEvent::TaskSucceeded {
                role,
                attempts,
                elapsed_ms,
                ..
            } if self.level >= 2 => entry(
                "task_succeeded",
                Some(role.to_string()),
                Some(serde_json::json!({ "attempts": attempts, "elapsed_ms": elapsed_ms })),
            ),
            WorkflowEvent::TaskFailed {
                role,
                reason,
                short_circuited,
                ..
            } if self.level >= 2 => entry(
                "task_failed",
                Some(role.to_string()),
                Some(serde_json::json!({
                    "reason": truncate_str(reason, 300),
                    "short_circuited": short_circuited,
                })),
            ),

            // L3: negotiation transcript
            WorkflowEvent::Negotiation { round, .. } if self.level >= 3 => entry(
                "negotiation_round",
                Some(round.role.to_string()),
                serde_json::to_value(round).ok(),
            ),

            _ => None,
        }
    }
}

/// Truncate a string for logging, on a char boundary.
fn truncate_str(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tripweave_core::event::EventBus;
    use tripweave_core::types::{AgentRole, RunStatus};

    fn sid() -> SessionId {
        SessionId::from_str("sess-1")
    }

    #[test]
    fn test_entry_skips_empty_fields() {
        let logger = RunLogger::new(PathBuf::from("/tmp"), 1);
        let entry = logger
            .event_to_entry(&WorkflowEvent::RunStarted { session_id: sid() })
            .unwrap();
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("run_started"));
        assert!(json.contains("sess-1"));
        assert!(!json.contains("role"));
        assert!(!json.contains("detail"));
    }

    #[test]
    fn test_event_level_filtering() {
        let started = WorkflowEvent::TaskStarted {
            session_id: sid(),
            role: AgentRole::Weather,
            attempt: 1,
        };

        let logger = RunLogger::new(PathBuf::from("/tmp"), 1);
        assert!(logger.event_to_entry(&started).is_none());
        assert!(logger
            .event_to_entry(&WorkflowEvent::RunFinished {
                session_id: sid(),
                status: RunStatus::Completed,
            })
            .is_some());

        let logger2 = RunLogger::new(PathBuf::from("/tmp"), 2);
        let entry = logger2.event_to_entry(&started).unwrap();
        assert_eq!(entry.role.as_deref(), Some("weather"));
    }

    #[test]
    fn test_truncate_str_respects_char_boundary() {
        assert_eq!(truncate_str("abc", 10), "abc");
        assert_eq!(truncate_str("résumé", 2), "r");
    }

    #[tokio::test]
    async fn test_writes_only_own_session_and_stops_on_finish() {
        let dir = tempfile::tempdir().unwrap();
        let bus = EventBus::new(16);
        let rx = bus.subscribe();
        let other = SessionId::from_str("other");

        bus.publish(WorkflowEvent::RunStarted { session_id: sid() });
        bus.publish(WorkflowEvent::RunStarted {
            session_id: other.clone(),
        });
        bus.publish(WorkflowEvent::RunFinished {
            session_id: sid(),
            status: RunStatus::PartiallyCompleted,
        });

        RunLogger::new(dir.path().to_path_buf(), 2)
            .run(rx, sid(), CancellationToken::new())
            .await;

        let session_dir = dir.path().join("sess-1");
        let file = std::fs::read_dir(&session_dir)
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .path();
        let content = std::fs::read_to_string(file).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("run_started"));
        assert!(lines[1].contains("partially-completed"));
        assert!(!content.contains("other"));
    }
}
