//! Mocks and fixtures shared by the Tripweave test suites.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::{json, Value};

use tripweave_core::error::{Result, TripweaveError};
use tripweave_core::traits::{Agent, AgentContext, AgentOutput, ReasoningClient, ResourceAgent};
use tripweave_core::types::{AgentRole, CounterConstraint, Money, SessionId, TravelRequest};
use tripweave_tools::{
    DailyForecast, FxChain, SearchHit, SearchProvider, StaticRateProvider, ToolKit,
    WeatherProvider, WeatherReport,
};

// ── Fixtures ────────────────────────────────────────────────────

/// Two travellers, Lisbon, $4500 with moderate flexibility, one week.
pub fn sample_request() -> TravelRequest {
    TravelRequest {
        destination: "Lisbon, Portugal".into(),
        travel_purpose: "leisure".into(),
        travel_companions: "couple".into(),
        travel_dates: "2026-05-10 to 2026-05-17".into(),
        departure_location: "Boston, USA".into(),
        date_flexibility: "slightly flexible".into(),
        accommodation_type: "boutique hotel".into(),
        budget: "$4500 USD".into(),
        interests_activities: vec!["food tours".into(), "museums".into(), "fado".into()],
        travel_style: "mid-range".into(),
        duration: "7 days".into(),
        budget_flexibility: "moderate".into(),
    }
}

/// A context with no upstream results.
pub fn context(request: TravelRequest) -> AgentContext {
    AgentContext {
        session_id: SessionId::new(),
        request: Arc::new(request),
        results: Default::default(),
        allocation: None,
    }
}

/// Offline tools: fixed weather, one search hit, static EUR/USD/GBP rates.
pub fn static_tools() -> ToolKit {
    let rates = HashMap::from([
        ("EURUSD".to_string(), 1.10),
        ("GBPUSD".to_string(), 1.25),
    ]);
    ToolKit::new(
        Arc::new(StaticWeather),
        FxChain::new(vec![Arc::new(StaticRateProvider::new(rates))]),
    )
    .with_search(Arc::new(StaticSearch))
}

// ── Tool providers ──────────────────────────────────────────────

pub struct StaticWeather;

impl WeatherProvider for StaticWeather {
    fn name(&self) -> &str {
        "static"
    }

    fn forecast(&self, destination: &str, dates: &str) -> BoxFuture<'_, Result<WeatherReport>> {
        let report = WeatherReport {
            location: destination.to_string(),
            latitude: 38.72,
            longitude: -9.14,
            requested_dates: dates.to_string(),
            days: vec![DailyForecast {
                date: "2026-05-10".into(),
                temp_max_c: Some(23.0),
                temp_min_c: Some(14.0),
                precipitation_chance: Some(10.0),
            }],
        };
        Box::pin(async move { Ok(report) })
    }
}

pub struct StaticSearch;

impl SearchProvider for StaticSearch {
    fn name(&self) -> &str {
        "static"
    }

    fn search(&self, query: &str) -> BoxFuture<'_, Result<Vec<SearchHit>>> {
        let hit = SearchHit {
            title: format!("Result for {}", query),
            url: "https://example.org/guide".into(),
            snippet: "Local guide".into(),
        };
        Box::pin(async move { Ok(vec![hit]) })
    }
}

// ── Reasoning ───────────────────────────────────────────────────

/// Reasoning client that replays scripted replies and records prompts.
///
/// When the script runs out the last reply repeats.
pub struct MockReasoning {
    replies: Mutex<VecDeque<Result<String>>>,
    last: Mutex<Option<String>>,
    prompts: Mutex<Vec<String>>,
}

impl MockReasoning {
    pub fn fixed(reply: &str) -> Self {
        Self::sequence(vec![Ok(reply.to_string())])
    }

    pub fn sequence(replies: Vec<Result<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            last: Mutex::new(None),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Every user prompt received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl ReasoningClient for MockReasoning {
    fn complete(&self, _system: &str, prompt: &str) -> BoxFuture<'_, Result<String>> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let next = self.replies.lock().unwrap().pop_front();
        let reply = match next {
            Some(Ok(text)) => {
                *self.last.lock().unwrap() = Some(text.clone());
                Ok(text)
            }
            Some(Err(e)) => Err(e),
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| TripweaveError::Reasoning("script exhausted".into())),
        };
        Box::pin(async move { reply })
    }
}

// ── Agents ──────────────────────────────────────────────────────

/// Agent that returns a fixed payload, optionally after a delay.
pub struct ScriptedAgent {
    role: AgentRole,
    payload: Value,
    delay: Option<Duration>,
    calls: AtomicU32,
}

impl ScriptedAgent {
    pub fn new(role: AgentRole, payload: Value) -> Self {
        Self {
            role,
            payload,
            delay: None,
            calls: AtomicU32::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Agent for ScriptedAgent {
    fn role(&self) -> AgentRole {
        self.role
    }

    fn execute(&self, _ctx: AgentContext) -> BoxFuture<'_, Result<AgentOutput>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(AgentOutput::new(self.payload.clone()))
        })
    }
}

/// Agent that fails a set number of times before succeeding, or always.
pub struct FailingAgent {
    role: AgentRole,
    transient_failures: u32,
    permanent: bool,
    calls: AtomicU32,
}

impl FailingAgent {
    /// Fails `n` times with a transient tool error, then succeeds.
    pub fn transient(role: AgentRole, n: u32) -> Self {
        Self {
            role,
            transient_failures: n,
            permanent: false,
            calls: AtomicU32::new(0),
        }
    }

    /// Fails every attempt with a permanent error.
    pub fn permanent(role: AgentRole) -> Self {
        Self {
            role,
            transient_failures: 0,
            permanent: true,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Agent for FailingAgent {
    fn role(&self) -> AgentRole {
        self.role
    }

    fn execute(&self, _ctx: AgentContext) -> BoxFuture<'_, Result<AgentOutput>> {
        Box::pin(async move {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.permanent {
                return Err(TripweaveError::TaskFailed {
                    role: self.role,
                    reason: "scripted permanent failure".into(),
                });
            }
            if n < self.transient_failures {
                return Err(TripweaveError::ToolFailure {
                    tool: "search".into(),
                    message: format!("HTTP 503 on attempt {}", n + 1),
                });
            }
            Ok(AgentOutput::new(json!({ "attempt": n + 1 })))
        })
    }
}

/// Resource agent proposing scripted costs: the first entry on `execute`,
/// the following entries on successive revisions (the last one repeats).
pub struct ScriptedResource {
    role: AgentRole,
    costs: Vec<f64>,
    currency: String,
    fail: bool,
    delay: Option<Duration>,
    revisions: Mutex<Vec<CounterConstraint>>,
    calls: AtomicU32,
}

impl ScriptedResource {
    pub fn new(role: AgentRole, costs: &[f64]) -> Self {
        Self {
            role,
            costs: costs.to_vec(),
            currency: "USD".into(),
            fail: false,
            delay: None,
            revisions: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
        }
    }

    /// A resource role whose initial execution fails permanently.
    pub fn failing(role: AgentRole) -> Self {
        Self {
            fail: true,
            ..Self::new(role, &[0.0])
        }
    }

    pub fn with_currency(mut self, currency: &str) -> Self {
        self.currency = currency.to_string();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Counter-constraints received, in order.
    pub fn revisions(&self) -> Vec<CounterConstraint> {
        self.revisions.lock().unwrap().clone()
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn cost_at(&self, i: usize) -> Money {
        let amount = self
            .costs
            .get(i)
            .or_else(|| self.costs.last())
            .copied()
            .unwrap_or(0.0);
        Money::new(amount, &self.currency)
    }
}

impl Agent for ScriptedResource {
    fn role(&self) -> AgentRole {
        self.role
    }

    fn execute(&self, _ctx: AgentContext) -> BoxFuture<'_, Result<AgentOutput>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(TripweaveError::TaskFailed {
                    role: self.role,
                    reason: "no availability".into(),
                });
            }
            let cost = self.cost_at(0);
            Ok(AgentOutput::new(json!({
                "summary": format!("{} plan", self.role),
                "estimated_cost": cost,
            }))
            .with_cost(cost))
        })
    }
}

impl ResourceAgent for ScriptedResource {
    fn revise(
        &self,
        _ctx: AgentContext,
        _previous: Money,
        constraint: CounterConstraint,
    ) -> BoxFuture<'_, Result<Money>> {
        Box::pin(async move {
            let n = {
                let mut revisions = self.revisions.lock().unwrap();
                revisions.push(constraint);
                revisions.len()
            };
            Ok(self.cost_at(n))
        })
    }
}
