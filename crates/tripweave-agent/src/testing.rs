//! Fixtures shared by the executor and workflow tests.

use std::sync::Arc;

use serde_json::json;

use tripweave_core::config::{NegotiationConfig, WorkflowConfig};
use tripweave_core::event::EventBus;
use tripweave_core::traits::SessionStore;
use tripweave_core::types::{AgentRole, Session, SessionId};
use tripweave_store::SqliteSessionStore;
use tripweave_test_utils::{
    sample_request, static_tools, MockReasoning, ScriptedAgent, ScriptedResource,
};

use crate::agents::AgentRoster;
use crate::graph::GraphExecutor;
use crate::negotiation::NegotiationCoordinator;

/// Every role scripted; the resource proposals total 4900 USD.
pub(crate) fn scripted_roster() -> AgentRoster {
    let agents = [
        (
            AgentRole::Weather,
            json!({
                "summary": "Mild spring days, showers possible",
                "risk_alerts": ["Showers likely on day 3"],
                "packing_checklist": ["Light rain jacket"]
            }),
        ),
        (
            AgentRole::Destination,
            json!({
                "summary": "Walkable, hilly city",
                "entry_requirements": ["Passport valid three months past departure"],
                "practical_notes": ["Buy a Viva Viagem card"]
            }),
        ),
        (
            AgentRole::LocalInsider,
            json!({
                "hidden_gems": ["LX Factory"],
                "traveler_hacks": ["Ride tram 28 before 9am"]
            }),
        ),
        (
            AgentRole::Budget,
            json!({"recommendation": "Comfortably within budget"}),
        ),
        (
            AgentRole::Booking,
            json!({
                "steps": [{"order": 1, "item": "Flights", "deadline": "2026-03-10"}],
                "checklist": ["Book flights"]
            }),
        ),
        (
            AgentRole::FinalItinerary,
            json!({
                "trip_summary": "A relaxed week in Lisbon",
                "final_checklist": ["Check passport"]
            }),
        ),
    ];

    let llm = Arc::new(MockReasoning::fixed("{}"));
    let mut roster = AgentRoster::standard(llm, static_tools());
    for (role, payload) in agents {
        roster = roster
            .with_agent(Arc::new(ScriptedAgent::new(role, payload)))
            .unwrap();
    }
    for (role, cost) in [
        (AgentRole::Accommodation, 2200.0),
        (AgentRole::Transport, 1700.0),
        (AgentRole::Activities, 1000.0),
    ] {
        roster = roster
            .with_resource(Arc::new(ScriptedResource::new(role, &[cost])))
            .unwrap();
    }
    roster
}

/// An executor with one fresh session, over an in-memory store by default.
pub(crate) struct Harness {
    pub store: Arc<dyn SessionStore>,
    pub bus: Arc<EventBus>,
    pub executor: GraphExecutor,
    pub sid: SessionId,
}

impl Harness {
    pub async fn new(roster: AgentRoster, config: WorkflowConfig) -> Self {
        let store: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::in_memory().unwrap());
        Self::with_store(roster, config, store).await
    }

    pub async fn with_store(
        roster: AgentRoster,
        config: WorkflowConfig,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        let bus = Arc::new(EventBus::default());
        let roster = Arc::new(roster);
        let negotiator = Arc::new(NegotiationCoordinator::new(
            store.clone(),
            roster.clone(),
            static_tools(),
            NegotiationConfig::default(),
            bus.clone(),
        ));
        let executor = GraphExecutor::new(store.clone(), roster, negotiator, config, bus.clone());
        let sid = store.create(&sample_request()).await.unwrap();
        Self {
            store,
            bus,
            executor,
            sid,
        }
    }

    pub async fn session(&self) -> Session {
        self.store.get(&self.sid).await.unwrap()
    }
}
