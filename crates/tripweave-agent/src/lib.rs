pub mod agents;
pub mod graph;
pub mod itinerary;
pub mod negotiation;
pub mod run_log;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use agents::AgentRoster;
pub use graph::GraphExecutor;
pub use itinerary::{assemble, render_markdown};
pub use negotiation::NegotiationCoordinator;
pub use run_log::RunLogger;
pub use workflow::WorkflowEngine;
