pub mod common;
pub mod planning;
pub mod prompts;
pub mod research;
pub mod resource;

use std::sync::Arc;

use futures::future::BoxFuture;

use tripweave_core::error::{Result, TripweaveError};
use tripweave_core::traits::{Agent, AgentContext, AgentOutput, ReasoningClient, ResourceAgent};
use tripweave_core::types::AgentRole;
use tripweave_tools::ToolKit;

pub use planning::{BookingAgent, BudgetAgent, FinalItineraryAgent};
pub use research::{DestinationAgent, LocalInsiderAgent, WeatherAgent};
pub use resource::{AccommodationAgent, ActivitiesAgent, TransportAgent};

/// Exactly one agent per role. The three negotiated roles hold resource agents
/// so the coordinator can ask them to revise.
#[derive(Clone)]
pub struct AgentRoster {
    weather: Arc<dyn Agent>,
    destination: Arc<dyn Agent>,
    accommodation: Arc<dyn ResourceAgent>,
    transport: Arc<dyn ResourceAgent>,
    activities: Arc<dyn ResourceAgent>,
    local_insider: Arc<dyn Agent>,
    budget: Arc<dyn Agent>,
    booking: Arc<dyn Agent>,
    final_itinerary: Arc<dyn Agent>,
}

impl AgentRoster {
    /// The shipped agents, sharing one reasoning client and tool kit.
    pub fn standard(llm: Arc<dyn ReasoningClient>, tools: ToolKit) -> Self {
        Self {
            weather: Arc::new(WeatherAgent::new(llm.clone(), tools.clone())),
            destination: Arc::new(DestinationAgent::new(llm.clone(), tools.clone())),
            accommodation: Arc::new(AccommodationAgent::new(llm.clone(), tools.clone())),
            transport: Arc::new(TransportAgent::new(llm.clone(), tools.clone())),
            activities: Arc::new(ActivitiesAgent::new(llm.clone(), tools.clone())),
            local_insider: Arc::new(LocalInsiderAgent::new(llm.clone(), tools)),
            budget: Arc::new(BudgetAgent::new(llm.clone())),
            booking: Arc::new(BookingAgent::new(llm.clone())),
            final_itinerary: Arc::new(FinalItineraryAgent::new(llm)),
        }
    }

    /// Replace the agent in the slot named by `agent.role()`.
    ///
    /// Negotiated roles must be replaced with [`with_resource`](Self::with_resource).
    pub fn with_agent(mut self, agent: Arc<dyn Agent>) -> Result<Self> {
        let slot = match agent.role() {
            AgentRole::Weather => &mut self.weather,
            AgentRole::Destination => &mut self.destination,
            AgentRole::LocalInsider => &mut self.local_insider,
            AgentRole::Budget => &mut self.budget,
            AgentRole::Booking => &mut self.booking,
            AgentRole::FinalItinerary => &mut self.final_itinerary,
            role => {
                return Err(TripweaveError::Config(format!(
                    "{} is negotiated and needs a resource agent",
                    role
                )))
            }
        };
        *slot = agent;
        Ok(self)
    }

    /// Replace one of the negotiated roles.
    pub fn with_resource(mut self, agent: Arc<dyn ResourceAgent>) -> Result<Self> {
        let slot = match agent.role() {
            AgentRole::Accommodation => &mut self.accommodation,
            AgentRole::Transport => &mut self.transport,
            AgentRole::Activities => &mut self.activities,
            role => {
                return Err(TripweaveError::Config(format!(
                    "{} does not take part in negotiation",
                    role
                )))
            }
        };
        *slot = agent;
        Ok(self)
    }

    /// The resource agent for a negotiated role.
    pub fn resource(&self, role: AgentRole) -> Option<&Arc<dyn ResourceAgent>> {
        match role {
            AgentRole::Accommodation => Some(&self.accommodation),
            AgentRole::Transport => Some(&self.transport),
            AgentRole::Activities => Some(&self.activities),
            _ => None,
        }
    }

    /// Run the agent filling `role`.
    pub fn execute(&self, role: AgentRole, ctx: AgentContext) -> BoxFuture<'_, Result<AgentOutput>> {
        match role {
            AgentRole::Weather => self.weather.execute(ctx),
            AgentRole::Destination => self.destination.execute(ctx),
            AgentRole::Accommodation => self.accommodation.execute(ctx),
            AgentRole::Transport => self.transport.execute(ctx),
            AgentRole::Activities => self.activities.execute(ctx),
            AgentRole::LocalInsider => self.local_insider.execute(ctx),
            AgentRole::Budget => self.budget.execute(ctx),
            AgentRole::Booking => self.booking.execute(ctx),
            AgentRole::FinalItinerary => self.final_itinerary.execute(ctx),
        }
    }
}
