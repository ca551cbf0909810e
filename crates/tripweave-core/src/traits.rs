use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::itinerary::ItineraryDocument;
use crate::types::*;

/// Reasoning provider: a single prompt/response exchange with a language model.
pub trait ReasoningClient: Send + Sync + 'static {
    /// Send a system prompt and a user prompt, returning the model's text reply.
    fn complete(&self, system: &str, prompt: &str) -> BoxFuture<'_, Result<String>>;
}

/// Read-only view handed to an agent when its task runs.
///
/// `results` only contains roles that had already succeeded when the task was
/// launched, read from the session store.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub session_id: SessionId,
    pub request: Arc<TravelRequest>,
    pub results: BTreeMap<AgentRole, AgentResult>,
    pub allocation: Option<BudgetAllocation>,
}

impl AgentContext {
    /// Build a context from a session snapshot.
    pub fn from_session(session: &Session) -> Self {
        Self {
            session_id: session.id.clone(),
            request: Arc::new(session.request.clone()),
            results: session
                .results
                .iter()
                .filter(|(_, r)| r.status == TaskStatus::Succeeded)
                .map(|(role, r)| (*role, r.clone()))
                .collect(),
            allocation: session.allocation.clone(),
        }
    }

    pub fn upstream(&self, role: AgentRole) -> Option<&AgentResult> {
        self.results.get(&role)
    }

    /// Typed payload of an upstream role, if it succeeded.
    pub fn payload<T: DeserializeOwned + Default>(&self, role: AgentRole) -> Option<T> {
        self.results.get(&role).map(|r| r.payload_as::<T>())
    }
}

/// What an agent returns from one successful execution.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentOutput {
    pub payload: serde_json::Value,
    /// Set by the negotiated roles.
    pub proposed_cost: Option<Money>,
}

impl AgentOutput {
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            payload,
            proposed_cost: None,
        }
    }

    pub fn with_cost(mut self, cost: Money) -> Self {
        self.proposed_cost = Some(cost);
        self
    }
}

/// Agent: one stateless unit of research, curation or analysis work.
pub trait Agent: Send + Sync + 'static {
    /// The fixed role this agent fills.
    fn role(&self) -> AgentRole;

    /// Run the agent against its input context.
    fn execute(&self, ctx: AgentContext) -> BoxFuture<'_, Result<AgentOutput>>;
}

/// An agent that proposes a cost and can revise it on request.
pub trait ResourceAgent: Agent {
    /// Return a revised cost estimate honouring `constraint` as far as possible.
    fn revise(
        &self,
        ctx: AgentContext,
        previous: Money,
        constraint: CounterConstraint,
    ) -> BoxFuture<'_, Result<Money>>;
}

/// Session store: durable record of workflow runs.
///
/// Every write is durable before the returned future resolves. Writes to a
/// sealed session fail with `SessionSealed`.
pub trait SessionStore: Send + Sync + 'static {
    /// Persist a new in-progress session for the request.
    fn create(&self, request: &TravelRequest) -> BoxFuture<'_, Result<SessionId>>;

    /// Replace the state of one task.
    fn update_task(&self, sid: &SessionId, task: &AgentTask) -> BoxFuture<'_, Result<()>>;

    /// Record a role's result; an older timestamp than the stored one is ignored.
    fn record(&self, sid: &SessionId, result: &AgentResult) -> BoxFuture<'_, Result<()>>;

    /// Write a role's result and its task state in one atomic update, so no
    /// reader sees one without the other.
    fn complete_task(
        &self,
        sid: &SessionId,
        task: &AgentTask,
        result: &AgentResult,
    ) -> BoxFuture<'_, Result<()>>;

    /// Append a negotiation round. A round whose seq is already present
    /// replaces that round and drops every later one for the role.
    fn append_negotiation(
        &self,
        sid: &SessionId,
        round: &NegotiationRound,
    ) -> BoxFuture<'_, Result<()>>;

    fn set_allocation(
        &self,
        sid: &SessionId,
        allocation: &BudgetAllocation,
    ) -> BoxFuture<'_, Result<()>>;

    fn record_conversion(
        &self,
        sid: &SessionId,
        conversion: &CurrencyConversion,
    ) -> BoxFuture<'_, Result<()>>;

    /// Store the itinerary and terminal status, sealing the session.
    fn finalize(
        &self,
        sid: &SessionId,
        itinerary: &ItineraryDocument,
        status: RunStatus,
    ) -> BoxFuture<'_, Result<()>>;

    /// Load the latest durable state of a session.
    fn get(&self, sid: &SessionId) -> BoxFuture<'_, Result<Session>>;

    /// Most recently updated sessions first.
    fn list(&self, limit: usize) -> BoxFuture<'_, Result<Vec<SessionSummary>>>;
}
