use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use tripweave_core::config::{AppConfig, NegotiationConfig, WorkflowConfig};
use tripweave_core::error::{Result, TripweaveError};
use tripweave_core::event::EventBus;
use tripweave_core::traits::SessionStore;
use tripweave_core::types::{
    AgentTask, RunStatus, Session, SessionId, SessionSummary, TaskStatus, TravelRequest,
    WorkflowEvent,
};
use tripweave_tools::ToolKit;

use crate::agents::AgentRoster;
use crate::graph::GraphExecutor;
use crate::itinerary::assemble;
use crate::negotiation::NegotiationCoordinator;
use crate::run_log::RunLogger;

/// Entry point for planning runs: validates the request, creates the session,
/// drives the graph and seals the session with its itinerary.
#[derive(Clone)]
pub struct WorkflowEngine {
    store: Arc<dyn SessionStore>,
    executor: GraphExecutor,
    event_bus: Arc<EventBus>,
    run_log: Option<(PathBuf, u8)>,
}

/// A spawned run logger for one session.
struct LogTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl LogTask {
    /// Wait for the logger to drain its queue, cancelling it first if the
    /// run ended without a terminal event.
    async fn close(self, cancel: bool) {
        if cancel {
            self.cancel.cancel();
        }
        if tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .is_err()
        {
            warn!("Run logger did not stop in time");
        }
    }
}

impl WorkflowEngine {
    pub fn new(
        store: Arc<dyn SessionStore>,
        roster: AgentRoster,
        tools: ToolKit,
        workflow: WorkflowConfig,
        negotiation: NegotiationConfig,
    ) -> Self {
        let event_bus = Arc::new(EventBus::default());
        let roster = Arc::new(roster);
        let negotiator = Arc::new(NegotiationCoordinator::new(
            store.clone(),
            roster.clone(),
            tools,
            negotiation,
            event_bus.clone(),
        ));
        let executor = GraphExecutor::new(
            store.clone(),
            roster,
            negotiator,
            workflow,
            event_bus.clone(),
        );
        Self {
            store,
            executor,
            event_bus,
            run_log: None,
        }
    }

    /// Wire the shipped agents, tools and reasoning client from configuration.
    pub fn from_config(config: &AppConfig, store: Arc<dyn SessionStore>) -> Self {
        let llm = tripweave_llm::client_from_config(config);
        let tools = ToolKit::from_config(&config.tools);
        let roster = AgentRoster::standard(llm, tools.clone());
        let engine = Self::new(
            store,
            roster,
            tools,
            config.workflow.clone(),
            config.negotiation.clone(),
        );
        match (config.log_dir(), config.log.as_ref()) {
            (Some(dir), Some(log)) => engine.with_run_log(dir, log.level),
            _ => engine,
        }
    }

    /// Write a JSONL audit log per run under `dir`.
    pub fn with_run_log(mut self, dir: PathBuf, level: u8) -> Self {
        self.run_log = Some((dir, level));
        self
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        self.event_bus.clone()
    }

    /// Run a request to completion and return the sealed session.
    pub async fn run(&self, request: TravelRequest) -> Result<Session> {
        let (sid, log) = self.begin(request).await?;
        self.drive(&sid, log).await?;
        self.store.get(&sid).await
    }

    /// Start a run in the background and return its session id immediately.
    pub async fn start(&self, request: TravelRequest) -> Result<SessionId> {
        let (sid, log) = self.begin(request).await?;
        let engine = self.clone();
        let id = sid.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.drive(&id, log).await {
                error!(session_id = %id, error = %e, "Background run failed");
            }
        });
        Ok(sid)
    }

    /// Latest durable state of a session.
    pub async fn session(&self, id: &SessionId) -> Result<Session> {
        self.store.get(id).await
    }

    pub async fn list(&self, limit: usize) -> Result<Vec<SessionSummary>> {
        self.store.list(limit).await
    }

    /// Continue a session left in progress, e.g. by a crash.
    ///
    /// Tasks that were running are reset to pending and re-run; finished tasks
    /// keep their results. Sealed sessions are rejected.
    pub async fn resume(&self, id: &SessionId) -> Result<Session> {
        let session = self.store.get(id).await?;
        if session.is_sealed() {
            return Err(TripweaveError::SessionSealed(id.to_string()));
        }

        let interrupted: Vec<AgentTask> = session
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Running)
            .cloned()
            .collect();
        for mut task in interrupted {
            task.status = TaskStatus::Pending;
            task.started_at = None;
            task.finished_at = None;
            task.error = None;
            self.store.update_task(id, &task).await?;
        }

        info!(session_id = %id, destination = %session.request.destination, "Run resumed");
        let log = self.attach(id);
        self.drive(id, log).await?;
        self.store.get(id).await
    }

    /// Validate and create the session.
    async fn begin(&self, request: TravelRequest) -> Result<(SessionId, Option<LogTask>)> {
        request.validate()?;
        let sid = self.store.create(&request).await?;
        info!(session_id = %sid, destination = %request.destination, "Run started");
        let log = self.attach(&sid);
        Ok((sid, log))
    }

    /// Attach the run logger before the first event is published.
    fn attach(&self, sid: &SessionId) -> Option<LogTask> {
        let log = self.run_log.as_ref().map(|(dir, level)| {
            let cancel = CancellationToken::new();
            let logger = RunLogger::new(dir.clone(), *level);
            let handle = tokio::spawn(logger.run(
                self.event_bus.subscribe(),
                sid.clone(),
                cancel.clone(),
            ));
            LogTask { cancel, handle }
        });
        self.event_bus.publish(WorkflowEvent::RunStarted {
            session_id: sid.clone(),
        });
        log
    }

    async fn drive(&self, sid: &SessionId, log: Option<LogTask>) -> Result<RunStatus> {
        let outcome = match self.executor.execute(sid).await {
            Ok(status) => self.seal(sid, status).await,
            Err(e) => Err(e),
        };
        if let Some(log) = log {
            log.close(outcome.is_err()).await;
        }
        outcome
    }

    /// Assemble the itinerary and finalize the session.
    async fn seal(&self, sid: &SessionId, status: RunStatus) -> Result<RunStatus> {
        let sealed = async {
            let mut session = self.store.get(sid).await?;
            session.status = status;
            let itinerary = assemble(&session)?;
            self.store.finalize(sid, &itinerary, status).await
        };
        if let Err(e) = sealed.await {
            error!(session_id = %sid, error = %e, "Failed to finalize session");
            self.event_bus.publish(WorkflowEvent::RunError {
                session_id: sid.clone(),
                error: e.to_string(),
            });
            return Err(e);
        }

        info!(session_id = %sid, %status, "Run finished");
        self.event_bus.publish(WorkflowEvent::RunFinished {
            session_id: sid.clone(),
            status,
        });
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testing::scripted_roster;
    use tripweave_core::types::{AgentResult, AgentRole};
    use tripweave_store::SqliteSessionStore;
    use tripweave_test_utils::{sample_request, static_tools, ScriptedResource};

    fn engine(roster: AgentRoster) -> (WorkflowEngine, Arc<dyn SessionStore>) {
        let store: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::in_memory().unwrap());
        let workflow = WorkflowConfig {
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            ..WorkflowConfig::default()
        };
        let engine = WorkflowEngine::new(
            store.clone(),
            roster,
            static_tools(),
            workflow,
            NegotiationConfig::default(),
        );
        (engine, store)
    }

    #[tokio::test]
    async fn test_run_seals_session_with_itinerary() {
        let (engine, store) = engine(scripted_roster());
        let session = engine.run(sample_request()).await.unwrap();

        assert_eq!(session.status, RunStatus::Completed);
        assert!(session.finalized_at.is_some());
        let itinerary = session.itinerary.as_ref().unwrap();
        assert_eq!(itinerary.status, RunStatus::Completed);
        assert_eq!(itinerary.trip_summary, "A relaxed week in Lisbon");
        assert_eq!(itinerary.days.len(), 7);
        assert!(itinerary.unavailable.is_empty());

        let err = store
            .update_task(&session.id, &AgentTask::new(AgentRole::Weather))
            .await
            .unwrap_err();
        assert!(matches!(err, TripweaveError::SessionSealed(_)));
    }

    #[tokio::test]
    async fn test_invalid_request_creates_no_session() {
        let (engine, _) = engine(scripted_roster());
        let mut request = sample_request();
        request.budget = String::new();

        let err = engine.run(request).await.unwrap_err();
        assert!(matches!(err, TripweaveError::InvalidRequest(ref f) if f == &["budget"]));
        assert!(engine.list(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_partial_run_lists_unavailable_sections() {
        let roster = scripted_roster()
            .with_resource(Arc::new(ScriptedResource::failing(AgentRole::Transport)))
            .unwrap();
        let (engine, _) = engine(roster);
        let session = engine.run(sample_request()).await.unwrap();

        assert_eq!(session.status, RunStatus::PartiallyCompleted);
        let unavailable: Vec<AgentRole> = session
            .itinerary
            .unwrap()
            .unavailable
            .iter()
            .map(|u| u.role)
            .collect();
        assert_eq!(
            unavailable,
            vec![
                AgentRole::Transport,
                AgentRole::Budget,
                AgentRole::Booking,
                AgentRole::FinalItinerary
            ]
        );
    }

    #[tokio::test]
    async fn test_start_returns_before_completion() {
        let roster = scripted_roster()
            .with_resource(Arc::new(
                ScriptedResource::new(AgentRole::Accommodation, &[2200.0])
                    .with_delay(Duration::from_millis(50)),
            ))
            .unwrap();
        let (engine, _) = engine(roster);
        let sid = engine.start(sample_request()).await.unwrap();

        let early = engine.session(&sid).await.unwrap();
        assert_eq!(early.status, RunStatus::InProgress);

        let mut session = early;
        for _ in 0..200 {
            if session.status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            session = engine.session(&sid).await.unwrap();
        }
        assert_eq!(session.status, RunStatus::Completed);
        assert!(session
            .tasks
            .values()
            .all(|t| t.status == TaskStatus::Succeeded));
    }

    #[tokio::test]
    async fn test_run_log_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _) = engine(scripted_roster());
        let engine = engine.with_run_log(dir.path().to_path_buf(), 3);
        let session = engine.run(sample_request()).await.unwrap();

        let file = std::fs::read_dir(dir.path().join(&session.id.0))
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .path();
        let content = std::fs::read_to_string(file).unwrap();
        assert!(content.lines().next().unwrap().contains("run_started"));
        assert!(content.contains("negotiation_round"));
        assert!(content.contains("allocation_sealed"));
        assert!(content.contains("run_finished"));
    }

    #[tokio::test]
    async fn test_resume_finishes_interrupted_session() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("sessions.db");

        // A run that died with Weather done and Destination mid-flight.
        let sid = {
            let store = SqliteSessionStore::open(&db).unwrap();
            let sid = store.create(&sample_request()).await.unwrap();
            let mut weather = AgentTask::new(AgentRole::Weather);
            weather.status = TaskStatus::Succeeded;
            weather.attempts = 1;
            let result = AgentResult::succeeded(
                AgentRole::Weather,
                serde_json::json!({"summary": "Recorded before the crash"}),
                None,
                1,
            );
            store.complete_task(&sid, &weather, &result).await.unwrap();
            let mut destination = AgentTask::new(AgentRole::Destination);
            destination.status = TaskStatus::Running;
            destination.attempts = 1;
            store.update_task(&sid, &destination).await.unwrap();
            sid
        };

        let store: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::open(&db).unwrap());
        let engine = WorkflowEngine::new(
            store,
            scripted_roster(),
            static_tools(),
            WorkflowConfig::default(),
            NegotiationConfig::default(),
        );
        let session = engine.resume(&sid).await.unwrap();

        assert_eq!(session.status, RunStatus::Completed);
        assert!(session.finalized_at.is_some());
        assert!(session
            .tasks
            .values()
            .all(|t| t.status == TaskStatus::Succeeded));
        assert_eq!(
            session.results[&AgentRole::Weather].payload["summary"],
            "Recorded before the crash"
        );
        assert_eq!(session.tasks[&AgentRole::Destination].attempts, 1);

        let err = engine.resume(&sid).await.unwrap_err();
        assert!(matches!(err, TripweaveError::SessionSealed(_)));
    }
}
