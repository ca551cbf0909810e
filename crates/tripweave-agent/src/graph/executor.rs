use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use tripweave_core::config::WorkflowConfig;
use tripweave_core::error::{Result, TripweaveError};
use tripweave_core::event::EventBus;
use tripweave_core::traits::{AgentContext, AgentOutput, SessionStore};
use tripweave_core::types::{
    AgentResult, AgentRole, AgentTask, RunStatus, Session, SessionId, TaskStatus, WorkflowEvent,
};
use tripweave_llm::retry::calculate_backoff;

use crate::agents::AgentRoster;
use crate::negotiation::NegotiationCoordinator;

/// Runs the static role graph for one session until every task is resolved.
///
/// All cross-task state goes through the session store: a task's context is
/// read fresh when it launches, and a dependent only launches after the
/// dependency's `succeeded` status has been written.
#[derive(Clone)]
pub struct GraphExecutor {
    store: Arc<dyn SessionStore>,
    roster: Arc<AgentRoster>,
    negotiator: Arc<NegotiationCoordinator>,
    config: WorkflowConfig,
    event_bus: Arc<EventBus>,
}

impl GraphExecutor {
    pub fn new(
        store: Arc<dyn SessionStore>,
        roster: Arc<AgentRoster>,
        negotiator: Arc<NegotiationCoordinator>,
        config: WorkflowConfig,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            roster,
            negotiator,
            config,
            event_bus,
        }
    }

    /// Drive the session's graph to completion and return its terminal status.
    ///
    /// Returns `Err` only for fatal errors (persistence), after aborting every
    /// running task.
    pub async fn execute(&self, sid: &SessionId) -> Result<RunStatus> {
        let start = Instant::now();
        let deadline =
            tokio::time::Instant::now() + Duration::from_secs(self.config.run_timeout_secs);
        let mut running: HashSet<AgentRole> = HashSet::new();
        let mut join_set: JoinSet<(AgentRole, Result<()>)> = JoinSet::new();
        let mut timed_out = false;

        loop {
            let mut session = match self.store.get(sid).await {
                Ok(session) => session,
                Err(e) => return Err(self.abort(sid, &mut join_set, e).await),
            };
            if let Err(e) = self.short_circuit(&mut session, &running).await {
                return Err(self.abort(sid, &mut join_set, e).await);
            }

            for role in AgentRole::ALL {
                if running.contains(&role) || !is_ready(&session, role) {
                    continue;
                }
                debug!(session_id = %sid, %role, "Launching task");
                running.insert(role);
                let this = self.clone();
                let sid = sid.clone();
                join_set.spawn(async move {
                    let outcome = this.run_task(&sid, role).await;
                    (role, outcome)
                });
            }

            if join_set.is_empty() {
                break;
            }

            tokio::select! {
                joined = join_set.join_next() => match joined {
                    Some(Ok((role, Ok(())))) => {
                        running.remove(&role);
                    }
                    Some(Ok((role, Err(e)))) => {
                        running.remove(&role);
                        error!(session_id = %sid, %role, error = %e, "Fatal task error");
                        return Err(self.abort(sid, &mut join_set, e).await);
                    }
                    Some(Err(e)) => {
                        // The role stays in `running`; it is failed after the loop.
                        error!(session_id = %sid, error = %e, "Task join failed");
                    }
                    None => break,
                },
                _ = tokio::time::sleep_until(deadline) => {
                    warn!(
                        session_id = %sid,
                        timeout_secs = self.config.run_timeout_secs,
                        "Run timed out, aborting running tasks"
                    );
                    join_set.abort_all();
                    while join_set.join_next().await.is_some() {}
                    timed_out = true;
                    break;
                }
            }
        }

        let reason = if timed_out { "run timed out" } else { "task aborted" };
        let session = match self.settle(sid, reason).await {
            Ok(session) => session,
            Err(e) => return Err(self.abort(sid, &mut join_set, e).await),
        };

        let status = if timed_out {
            RunStatus::PartiallyCompleted
        } else {
            terminal_status(&session)
        };
        info!(
            session_id = %sid,
            %status,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Graph resolved"
        );
        Ok(status)
    }

    /// Fail every task left unresolved once the loop has stopped.
    async fn settle(&self, sid: &SessionId, reason: &str) -> Result<Session> {
        let mut session = self.store.get(sid).await?;
        for role in AgentRole::ALL {
            if !session.task_status(role).is_resolved() {
                self.fail_task(&mut session, role, reason, false).await?;
            }
        }
        Ok(session)
    }

    /// Fail every pending task whose dependency failed. `AgentRole::ALL` is in
    /// topological order, so one pass reaches transitive dependents.
    async fn short_circuit(
        &self,
        session: &mut Session,
        running: &HashSet<AgentRole>,
    ) -> Result<()> {
        for role in AgentRole::ALL {
            if running.contains(&role) || session.task_status(role) != TaskStatus::Pending {
                continue;
            }
            let failed_dep = role
                .dependencies()
                .iter()
                .find(|dep| session.task_status(**dep) == TaskStatus::Failed);
            if let Some(dep) = failed_dep {
                let reason = format!("dependency {} failed", dep);
                self.fail_task(session, role, &reason, true).await?;
            }
        }
        Ok(())
    }

    /// Record a failed result and task without running the agent.
    async fn fail_task(
        &self,
        session: &mut Session,
        role: AgentRole,
        reason: &str,
        short_circuited: bool,
    ) -> Result<()> {
        let mut task = session
            .tasks
            .get(&role)
            .cloned()
            .unwrap_or_else(|| AgentTask::new(role));
        task.status = TaskStatus::Failed;
        task.finished_at = Some(Utc::now());
        task.error = Some(reason.to_string());

        let result = AgentResult::failed(role, reason, task.attempts);
        self.store.complete_task(&session.id, &task, &result).await?;
        session.results.insert(role, result);
        session.tasks.insert(role, task);

        warn!(session_id = %session.id, %role, reason, short_circuited, "Task failed");
        self.event_bus.publish(WorkflowEvent::TaskFailed {
            session_id: session.id.clone(),
            role,
            reason: reason.to_string(),
            short_circuited,
        });
        Ok(())
    }

    async fn abort(
        &self,
        sid: &SessionId,
        join_set: &mut JoinSet<(AgentRole, Result<()>)>,
        e: TripweaveError,
    ) -> TripweaveError {
        join_set.abort_all();
        while join_set.join_next().await.is_some() {}
        self.event_bus.publish(WorkflowEvent::RunError {
            session_id: sid.clone(),
            error: e.to_string(),
        });
        e
    }

    /// Run one role with retries. Agent failures are recorded, not returned;
    /// `Err` means the run must stop.
    async fn run_task(&self, sid: &SessionId, role: AgentRole) -> Result<()> {
        let retry = self.config.retry();
        let started = Instant::now();
        let mut task = AgentTask::new(role);
        task.started_at = Some(Utc::now());

        loop {
            task.attempts += 1;
            task.status = TaskStatus::Running;
            self.store.update_task(sid, &task).await?;
            self.event_bus.publish(WorkflowEvent::TaskStarted {
                session_id: sid.clone(),
                role,
                attempt: task.attempts,
            });
            info!(session_id = %sid, %role, attempt = task.attempts, "Task started");

            match self.attempt(sid, role).await {
                Ok(output) => {
                    let result = AgentResult::succeeded(
                        role,
                        output.payload,
                        output.proposed_cost,
                        task.attempts,
                    );
                    task.status = TaskStatus::Succeeded;
                    task.finished_at = Some(Utc::now());
                    self.store.complete_task(sid, &task, &result).await?;

                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    info!(session_id = %sid, %role, attempts = task.attempts, elapsed_ms, "Task succeeded");
                    self.event_bus.publish(WorkflowEvent::TaskSucceeded {
                        session_id: sid.clone(),
                        role,
                        attempts: task.attempts,
                        elapsed_ms,
                    });
                    return Ok(());
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) if e.is_transient() && task.attempts <= retry.max_retries => {
                    let backoff = calculate_backoff(task.attempts - 1, &retry);
                    warn!(
                        session_id = %sid,
                        %role,
                        attempt = task.attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Retrying task"
                    );
                    self.event_bus.publish(WorkflowEvent::TaskRetrying {
                        session_id: sid.clone(),
                        role,
                        attempt: task.attempts,
                        backoff_ms: backoff.as_millis() as u64,
                        error: e.to_string(),
                    });
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    let reason = e.to_string();
                    let result = AgentResult::failed(role, &reason, task.attempts);
                    task.status = TaskStatus::Failed;
                    task.finished_at = Some(Utc::now());
                    task.error = Some(reason.clone());
                    self.store.complete_task(sid, &task, &result).await?;

                    warn!(session_id = %sid, %role, attempts = task.attempts, error = %reason, "Task failed");
                    self.event_bus.publish(WorkflowEvent::TaskFailed {
                        session_id: sid.clone(),
                        role,
                        reason,
                        short_circuited: false,
                    });
                    return Ok(());
                }
            }
        }
    }

    /// One bounded attempt against a fresh context.
    async fn attempt(&self, sid: &SessionId, role: AgentRole) -> Result<AgentOutput> {
        let session = self.store.get(sid).await?;
        let mut ctx = AgentContext::from_session(&session);
        let timeout_secs = self.config.task_timeout_secs;

        let work = async move {
            if role == AgentRole::Budget {
                let allocation = self.negotiator.negotiate(&ctx).await?;
                ctx.allocation = Some(allocation);
            }
            self.roster.execute(role, ctx).await
        };

        match tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            AssertUnwindSafe(work).catch_unwind(),
        )
        .await
        {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(TripweaveError::TaskFailed {
                role,
                reason: format!("agent panicked: {}", panic_message(&panic)),
            }),
            Err(_) => Err(TripweaveError::TaskTimeout { role, timeout_secs }),
        }
    }
}

/// Pending with every dependency succeeded.
fn is_ready(session: &Session, role: AgentRole) -> bool {
    session.task_status(role) == TaskStatus::Pending
        && role
            .dependencies()
            .iter()
            .all(|dep| session.task_status(*dep) == TaskStatus::Succeeded)
}

fn terminal_status(session: &Session) -> RunStatus {
    let any_succeeded = session
        .tasks
        .values()
        .any(|t| t.status == TaskStatus::Succeeded);
    let terminal_failed = AgentRole::ALL
        .into_iter()
        .filter(|r| r.is_terminal())
        .any(|r| session.task_status(r) == TaskStatus::Failed);

    if !any_succeeded {
        RunStatus::Failed
    } else if terminal_failed {
        RunStatus::PartiallyCompleted
    } else {
        RunStatus::Completed
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
