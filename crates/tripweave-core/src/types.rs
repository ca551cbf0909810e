use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, TripweaveError};
use crate::itinerary::ItineraryDocument;

/// Unique session identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The fixed set of agent roles in a planning run.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentRole {
    Weather,
    Destination,
    Accommodation,
    Transport,
    Activities,
    LocalInsider,
    Budget,
    Booking,
    FinalItinerary,
}

/// Roles that propose a cost and negotiate it with the budget agent.
pub const NEGOTIATED_ROLES: [AgentRole; 3] = [
    AgentRole::Accommodation,
    AgentRole::Transport,
    AgentRole::Activities,
];

impl AgentRole {
    pub const ALL: [AgentRole; 9] = [
        AgentRole::Weather,
        AgentRole::Destination,
        AgentRole::Accommodation,
        AgentRole::Transport,
        AgentRole::Activities,
        AgentRole::LocalInsider,
        AgentRole::Budget,
        AgentRole::Booking,
        AgentRole::FinalItinerary,
    ];

    /// Roles whose output must be `succeeded` before this role may run.
    pub fn dependencies(self) -> &'static [AgentRole] {
        use AgentRole::*;
        match self {
            Weather | Destination | Accommodation | Transport => &[],
            Activities => &[Destination],
            LocalInsider => &[Activities],
            Budget => &[Accommodation, Transport, Activities],
            Booking => &[Budget],
            FinalItinerary => &[
                Booking,
                Weather,
                Destination,
                Accommodation,
                Transport,
                Activities,
                LocalInsider,
            ],
        }
    }

    /// Roles that list this role as a direct dependency.
    pub fn dependents(self) -> Vec<AgentRole> {
        Self::ALL
            .into_iter()
            .filter(|r| r.dependencies().contains(&self))
            .collect()
    }

    /// Whether the role takes part in budget negotiation.
    pub fn is_negotiated(self) -> bool {
        NEGOTIATED_ROLES.contains(&self)
    }

    /// Terminal roles decide between `completed` and `partially-completed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, AgentRole::Booking | AgentRole::FinalItinerary)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AgentRole::Weather => "weather",
            AgentRole::Destination => "destination",
            AgentRole::Accommodation => "accommodation",
            AgentRole::Transport => "transport",
            AgentRole::Activities => "activities",
            AgentRole::LocalInsider => "local-insider",
            AgentRole::Budget => "budget",
            AgentRole::Booking => "booking",
            AgentRole::FinalItinerary => "final-itinerary",
        }
    }

    /// Human-readable agent name.
    pub fn display_name(self) -> &'static str {
        match self {
            AgentRole::Weather => "Weather Specialist",
            AgentRole::Destination => "Destination Researcher",
            AgentRole::Accommodation => "Accommodation Advisor",
            AgentRole::Transport => "Transportation Specialist",
            AgentRole::Activities => "Activities Curator",
            AgentRole::LocalInsider => "Local Insider",
            AgentRole::Budget => "Budget Optimizer",
            AgentRole::Booking => "Booking Assistant",
            AgentRole::FinalItinerary => "Itinerary Planner",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == s)
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An amount of money in a currency, kept at cent precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Money {
    pub amount: f64,
    pub currency: String,
}

impl Money {
    pub fn new(amount: f64, currency: impl Into<String>) -> Self {
        Self {
            amount: round_cents(amount),
            currency: currency.into().to_uppercase(),
        }
    }

    pub fn from_cents(cents: i64, currency: impl Into<String>) -> Self {
        Self::new(cents as f64 / 100.0, currency)
    }

    pub fn cents(&self) -> i64 {
        (self.amount * 100.0).round() as i64
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2} {}", self.amount, self.currency)
    }
}

pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// How far total spend may exceed the requested budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetFlexibility {
    Strict,
    Moderate,
    Flexible,
}

impl BudgetFlexibility {
    /// Keyword match on free text; anything unrecognised is moderate.
    pub fn parse(text: &str) -> Self {
        let lower = text.to_lowercase();
        if lower.contains("strict") || lower.contains("fixed") {
            BudgetFlexibility::Strict
        } else if lower.contains("flex") {
            BudgetFlexibility::Flexible
        } else {
            BudgetFlexibility::Moderate
        }
    }
}

/// The user's travel request. Created once per session, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TravelRequest {
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub travel_purpose: String,
    #[serde(default)]
    pub travel_companions: String,
    #[serde(default)]
    pub travel_dates: String,
    #[serde(default)]
    pub departure_location: String,
    #[serde(default)]
    pub date_flexibility: String,
    #[serde(default)]
    pub accommodation_type: String,
    #[serde(default)]
    pub budget: String,
    #[serde(default)]
    pub interests_activities: Vec<String>,
    #[serde(default)]
    pub travel_style: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub budget_flexibility: String,
}

impl TravelRequest {
    /// Presence-only validation of every required field.
    pub fn validate(&self) -> Result<()> {
        let text_fields = [
            ("destination", &self.destination),
            ("travel_purpose", &self.travel_purpose),
            ("travel_companions", &self.travel_companions),
            ("travel_dates", &self.travel_dates),
            ("departure_location", &self.departure_location),
            ("date_flexibility", &self.date_flexibility),
            ("accommodation_type", &self.accommodation_type),
            ("budget", &self.budget),
            ("travel_style", &self.travel_style),
            ("duration", &self.duration),
            ("budget_flexibility", &self.budget_flexibility),
        ];

        let mut missing: Vec<String> = text_fields
            .iter()
            .filter(|(_, v)| v.trim().is_empty())
            .map(|(k, _)| k.to_string())
            .collect();

        if self.interests_activities.iter().all(|i| i.trim().is_empty()) {
            missing.push("interests_activities".to_string());
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(TripweaveError::InvalidRequest(missing))
        }
    }

    /// Parse the free-text budget, e.g. `"$4,500 USD"` or `"€3000"`.
    pub fn budget(&self) -> Result<Money> {
        parse_money(&self.budget)
    }

    pub fn budget_flexibility(&self) -> BudgetFlexibility {
        BudgetFlexibility::parse(&self.budget_flexibility)
    }

    /// First integer in the duration text; a trip lasts at least one day.
    pub fn duration_days(&self) -> u32 {
        static DIGITS: OnceLock<Regex> = OnceLock::new();
        let re = DIGITS.get_or_init(|| Regex::new(r"\d+").expect("static regex"));
        re.find(&self.duration)
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .filter(|d| *d > 0)
            .unwrap_or(1)
    }
}

/// Parse an amount with an optional ISO code or currency symbol.
pub fn parse_money(text: &str) -> Result<Money> {
    static AMOUNT: OnceLock<Regex> = OnceLock::new();
    static CODE: OnceLock<Regex> = OnceLock::new();
    let amount_re =
        AMOUNT.get_or_init(|| Regex::new(r"\d[\d,]*(?:\.\d+)?").expect("static regex"));
    let code_re = CODE.get_or_init(|| Regex::new(r"\b[A-Z]{3}\b").expect("static regex"));

    let amount = amount_re
        .find(text)
        .and_then(|m| m.as_str().replace(',', "").parse::<f64>().ok())
        .ok_or_else(|| TripweaveError::InvalidBudget(format!("no amount in '{}'", text)))?;

    if amount <= 0.0 {
        return Err(TripweaveError::InvalidBudget(format!(
            "amount must be positive in '{}'",
            text
        )));
    }

    let currency = code_re
        .find(text)
        .map(|m| m.as_str().to_string())
        .or_else(|| currency_from_symbol(text))
        .unwrap_or_else(|| "USD".to_string());

    Ok(Money::new(amount, currency))
}

fn currency_from_symbol(text: &str) -> Option<String> {
    let code = if text.contains('€') {
        "EUR"
    } else if text.contains('£') {
        "GBP"
    } else if text.contains('¥') {
        "JPY"
    } else if text.contains('₹') {
        "INR"
    } else if text.contains('$') {
        "USD"
    } else {
        return None;
    };
    Some(code.to_string())
}

/// Lifecycle of one agent task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn is_resolved(self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }
}

/// One node of the dependency graph and its current state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTask {
    pub role: AgentRole,
    pub dependencies: Vec<AgentRole>,
    pub status: TaskStatus,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
}

impl AgentTask {
    pub fn new(role: AgentRole) -> Self {
        Self {
            role,
            dependencies: role.dependencies().to_vec(),
            status: TaskStatus::Pending,
            attempts: 0,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }
}

/// The output of one agent task. Read-only once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub role: AgentRole,
    pub status: TaskStatus,
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Cost estimate proposed by a negotiated role.
    #[serde(default)]
    pub proposed_cost: Option<Money>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub error: Option<String>,
}

impl AgentResult {
    pub fn succeeded(
        role: AgentRole,
        payload: serde_json::Value,
        proposed_cost: Option<Money>,
        attempts: u32,
    ) -> Self {
        Self {
            role,
            status: TaskStatus::Succeeded,
            payload,
            proposed_cost,
            timestamp: Utc::now(),
            attempts,
            error: None,
        }
    }

    pub fn failed(role: AgentRole, reason: impl Into<String>, attempts: u32) -> Self {
        Self {
            role,
            status: TaskStatus::Failed,
            payload: serde_json::Value::Null,
            proposed_cost: None,
            timestamp: Utc::now(),
            attempts,
            error: Some(reason.into()),
        }
    }

    /// Deserialize the payload into a role-specific shape.
    pub fn payload_as<T: serde::de::DeserializeOwned + Default>(&self) -> T {
        serde_json::from_value(self.payload.clone()).unwrap_or_default()
    }
}

/// The budget agent's response to a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NegotiationVerdict {
    Accepted,
    ReviseRequested,
    RejectedFinal,
}

/// Constraint sent with a revision request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterConstraint {
    pub max_cost: Money,
    pub reason: String,
}

/// One proposal/verdict exchange for a resource role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationRound {
    pub seq: u32,
    pub role: AgentRole,
    pub proposed: Money,
    pub verdict: NegotiationVerdict,
    #[serde(default)]
    pub counter: Option<CounterConstraint>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AllocationStatus {
    Accepted,
    RejectedFinal,
}

/// Accepted per-category spend once negotiation has terminated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetAllocation {
    pub accommodation: Money,
    pub transport: Money,
    pub activities: Money,
    pub total: Money,
    pub currency: String,
    pub requested: Money,
    pub ceiling: Money,
    pub status: AllocationStatus,
    /// Percentage by which `total` exceeds `requested` (negative when under).
    pub overage_pct: f64,
    /// Gap left unresolved when the round cap forced a scale-down.
    pub shortfall: Money,
    pub rounds: u32,
}

impl BudgetAllocation {
    pub fn category(&self, role: AgentRole) -> Option<&Money> {
        match role {
            AgentRole::Accommodation => Some(&self.accommodation),
            AgentRole::Transport => Some(&self.transport),
            AgentRole::Activities => Some(&self.activities),
            _ => None,
        }
    }

    pub fn remaining(&self) -> Money {
        Money::from_cents(self.requested.cents() - self.total.cents(), &self.currency)
    }
}

/// An audited currency conversion and the provider that served it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyConversion {
    pub amount: f64,
    pub from: String,
    pub to: String,
    pub converted: f64,
    pub rate: f64,
    pub provider: String,
    pub timestamp: DateTime<Utc>,
}

/// Overall status of a workflow run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    #[default]
    InProgress,
    Completed,
    PartiallyCompleted,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::InProgress)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::InProgress => "in-progress",
            RunStatus::Completed => "completed",
            RunStatus::PartiallyCompleted => "partially-completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable record of one workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub request: TravelRequest,
    pub status: RunStatus,
    pub tasks: BTreeMap<AgentRole, AgentTask>,
    #[serde(default)]
    pub results: BTreeMap<AgentRole, AgentResult>,
    #[serde(default)]
    pub negotiations: BTreeMap<AgentRole, Vec<NegotiationRound>>,
    #[serde(default)]
    pub allocation: Option<BudgetAllocation>,
    #[serde(default)]
    pub conversions: Vec<CurrencyConversion>,
    #[serde(default)]
    pub itinerary: Option<ItineraryDocument>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub finalized_at: Option<DateTime<Utc>>,
}

impl Session {
    /// A fresh in-progress session with every task pending.
    pub fn new(request: TravelRequest) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            request,
            status: RunStatus::InProgress,
            tasks: AgentRole::ALL
                .into_iter()
                .map(|r| (r, AgentTask::new(r)))
                .collect(),
            results: BTreeMap::new(),
            negotiations: BTreeMap::new(),
            allocation: None,
            conversions: Vec::new(),
            itinerary: None,
            created_at: now,
            updated_at: now,
            finalized_at: None,
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn task_status(&self, role: AgentRole) -> TaskStatus {
        self.tasks
            .get(&role)
            .map(|t| t.status)
            .unwrap_or(TaskStatus::Pending)
    }

    /// Result for a role, only if that role succeeded.
    pub fn succeeded(&self, role: AgentRole) -> Option<&AgentResult> {
        self.results
            .get(&role)
            .filter(|r| r.status == TaskStatus::Succeeded)
    }

    /// Failed roles with their recorded reason.
    pub fn failures(&self) -> Vec<(AgentRole, String)> {
        self.tasks
            .values()
            .filter(|t| t.status == TaskStatus::Failed)
            .map(|t| {
                let reason = t
                    .error
                    .clone()
                    .or_else(|| self.results.get(&t.role).and_then(|r| r.error.clone()))
                    .unwrap_or_else(|| "unknown error".to_string());
                (t.role, reason)
            })
            .collect()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            destination: self.request.destination.clone(),
            status: self.status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Listing row for stored sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub destination: String,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Workflow event broadcast to all subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// A run was accepted and its session created.
    RunStarted { session_id: SessionId },
    /// A task attempt started.
    TaskStarted {
        session_id: SessionId,
        role: AgentRole,
        attempt: u32,
    },
    /// A task attempt failed transiently and will be retried.
    TaskRetrying {
        session_id: SessionId,
        role: AgentRole,
        attempt: u32,
        backoff_ms: u64,
        error: String,
    },
    TaskSucceeded {
        session_id: SessionId,
        role: AgentRole,
        attempts: u32,
        elapsed_ms: u64,
    },
    /// A task failed, either after its own attempts or because a dependency failed.
    TaskFailed {
        session_id: SessionId,
        role: AgentRole,
        reason: String,
        short_circuited: bool,
    },
    /// A negotiation round was recorded.
    Negotiation {
        session_id: SessionId,
        round: NegotiationRound,
    },
    /// Negotiation terminated and the allocation was sealed.
    AllocationSealed {
        session_id: SessionId,
        allocation: BudgetAllocation,
    },
    /// The run reached a terminal status.
    RunFinished {
        session_id: SessionId,
        status: RunStatus,
    },
    /// The run aborted on a fatal error.
    RunError { session_id: SessionId, error: String },
}

impl WorkflowEvent {
    pub fn session_id(&self) -> &SessionId {
        match self {
            WorkflowEvent::RunStarted { session_id }
            | WorkflowEvent::TaskStarted { session_id, .. }
            | WorkflowEvent::TaskRetrying { session_id, .. }
            | WorkflowEvent::TaskSucceeded { session_id, .. }
            | WorkflowEvent::TaskFailed { session_id, .. }
            | WorkflowEvent::Negotiation { session_id, .. }
            | WorkflowEvent::AllocationSealed { session_id, .. }
            | WorkflowEvent::RunFinished { session_id, .. }
            | WorkflowEvent::RunError { session_id, .. } => session_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample_request() -> TravelRequest {
        TravelRequest {
            destination: "Lisbon, Portugal".into(),
            travel_purpose: "leisure".into(),
            travel_companions: "couple".into(),
            travel_dates: "2026-05-10 to 2026-05-17".into(),
            departure_location: "New York JFK".into(),
            date_flexibility: "slightly flexible".into(),
            accommodation_type: "boutique hotel".into(),
            budget: "$4500 USD".into(),
            interests_activities: vec!["food tours".into(), "museums".into()],
            travel_style: "Mid-range".into(),
            duration: "7 days".into(),
            budget_flexibility: "Moderate".into(),
        }
    }

    #[test]
    fn test_role_dependencies() {
        assert!(AgentRole::Weather.dependencies().is_empty());
        assert_eq!(
            AgentRole::Activities.dependencies(),
            &[AgentRole::Destination]
        );
        assert_eq!(
            AgentRole::LocalInsider.dependencies(),
            &[AgentRole::Activities]
        );
        assert_eq!(AgentRole::Booking.dependencies(), &[AgentRole::Budget]);
        assert_eq!(AgentRole::FinalItinerary.dependencies().len(), 7);
    }

    #[test]
    fn test_role_dependents() {
        let deps = AgentRole::Activities.dependents();
        assert!(deps.contains(&AgentRole::LocalInsider));
        assert!(deps.contains(&AgentRole::Budget));
        assert!(deps.contains(&AgentRole::FinalItinerary));
        assert!(AgentRole::FinalItinerary.dependents().is_empty());
    }

    #[test]
    fn test_role_serde_kebab_case() {
        let json = serde_json::to_string(&AgentRole::LocalInsider).unwrap();
        assert_eq!(json, "\"local-insider\"");
        assert_eq!(AgentRole::parse("final-itinerary"), Some(AgentRole::FinalItinerary));
        assert_eq!(AgentRole::parse("nope"), None);
    }

    #[test]
    fn test_parse_budget_variants() {
        let m = parse_money("$4500 USD").unwrap();
        assert_eq!(m, Money::new(4500.0, "USD"));

        let m = parse_money("4,500.50 EUR").unwrap();
        assert_eq!(m.amount, 4500.5);
        assert_eq!(m.currency, "EUR");

        assert_eq!(parse_money("€3000").unwrap().currency, "EUR");
        assert_eq!(parse_money("£1200").unwrap().currency, "GBP");
        assert_eq!(parse_money("3000").unwrap().currency, "USD");
    }

    #[test]
    fn test_parse_budget_rejects_missing_amount() {
        assert!(matches!(
            parse_money("a lot of money"),
            Err(TripweaveError::InvalidBudget(_))
        ));
        assert!(parse_money("0 USD").is_err());
    }

    #[test]
    fn test_budget_flexibility_parse() {
        assert_eq!(BudgetFlexibility::parse("Strict"), BudgetFlexibility::Strict);
        assert_eq!(BudgetFlexibility::parse("moderate"), BudgetFlexibility::Moderate);
        assert_eq!(BudgetFlexibility::parse("Flexible"), BudgetFlexibility::Flexible);
        assert_eq!(BudgetFlexibility::parse("whatever"), BudgetFlexibility::Moderate);
    }

    #[test]
    fn test_validate_accepts_complete_request() {
        assert!(sample_request().validate().is_ok());
    }

    #[test]
    fn test_validate_reports_missing_fields() {
        let mut req = sample_request();
        req.destination = "  ".into();
        req.interests_activities.clear();
        match req.validate() {
            Err(TripweaveError::InvalidRequest(missing)) => {
                assert_eq!(missing, vec!["destination", "interests_activities"]);
            }
            other => panic!("expected InvalidRequest, got {:?}", other),
        }
    }

    #[test]
    fn test_duration_days() {
        let mut req = sample_request();
        assert_eq!(req.duration_days(), 7);
        req.duration = "about a week".into();
        assert_eq!(req.duration_days(), 1);
        req.duration = "10-12 days".into();
        assert_eq!(req.duration_days(), 10);
    }

    #[test]
    fn test_new_session_has_all_tasks_pending() {
        let session = Session::new(sample_request());
        assert_eq!(session.tasks.len(), 9);
        assert!(session
            .tasks
            .values()
            .all(|t| t.status == TaskStatus::Pending));
        assert_eq!(session.status, RunStatus::InProgress);
        assert!(!session.is_sealed());
    }

    #[test]
    fn test_session_json_roundtrip_keeps_role_keys() {
        let mut session = Session::new(sample_request());
        session.results.insert(
            AgentRole::LocalInsider,
            AgentResult::succeeded(
                AgentRole::LocalInsider,
                serde_json::json!({"hidden_gems": ["LX Factory"]}),
                None,
                1,
            ),
        );
        let json = serde_json::to_string(&session).unwrap();
        assert!(json.contains("\"local-insider\""));
        let parsed: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, session);
    }

    #[test]
    fn test_money_cents() {
        let m = Money::new(10.005, "usd");
        assert_eq!(m.currency, "USD");
        assert_eq!(Money::from_cents(450000, "USD").amount, 4500.0);
        assert_eq!(Money::new(19.99, "USD").cents(), 1999);
    }
}
