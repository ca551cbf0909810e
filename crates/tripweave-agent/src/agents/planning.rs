use std::sync::Arc;

use futures::future::BoxFuture;

use tripweave_core::error::{Result, TripweaveError};
use tripweave_core::payload::{BookingTimeline, BudgetReport, PlannerSummary};
use tripweave_core::traits::{Agent, AgentContext, AgentOutput, ReasoningClient};
use tripweave_core::types::{AgentRole, AllocationStatus, BudgetAllocation};

use super::common::{ask_json, request_brief, typed, upstream_section};
use super::prompts;

fn allocation_section(a: &BudgetAllocation) -> String {
    let status = match a.status {
        AllocationStatus::Accepted => "accepted",
        AllocationStatus::RejectedFinal => "scaled down to the requested budget",
    };
    format!(
        "\n## Negotiated allocation ({}, {} rounds)\n\
         - accommodation: {}\n\
         - transport: {}\n\
         - activities: {}\n\
         - total: {}\n\
         - requested budget: {}\n\
         - ceiling: {}\n\
         - unresolved shortfall: {}\n",
        status,
        a.rounds,
        a.accommodation,
        a.transport,
        a.activities,
        a.total,
        a.requested,
        a.ceiling,
        a.shortfall,
    )
}

/// Frames the negotiated allocation into a full budget report.
pub struct BudgetAgent {
    llm: Arc<dyn ReasoningClient>,
}

impl BudgetAgent {
    pub fn new(llm: Arc<dyn ReasoningClient>) -> Self {
        Self { llm }
    }
}

impl Agent for BudgetAgent {
    fn role(&self) -> AgentRole {
        AgentRole::Budget
    }

    fn execute(&self, ctx: AgentContext) -> BoxFuture<'_, Result<AgentOutput>> {
        Box::pin(async move {
            let allocation = ctx.allocation.clone().ok_or_else(|| TripweaveError::TaskFailed {
                role: self.role(),
                reason: "no negotiated allocation".into(),
            })?;

            let mut prompt = request_brief(&ctx.request);
            prompt.push_str(&allocation_section(&allocation));
            for role in [
                AgentRole::Accommodation,
                AgentRole::Transport,
                AgentRole::Activities,
            ] {
                prompt.push_str(&upstream_section(&ctx, role));
            }
            for role in [AgentRole::Weather, AgentRole::Destination, AgentRole::LocalInsider] {
                if ctx.upstream(role).is_some() {
                    prompt.push_str(&upstream_section(&ctx, role));
                }
            }

            let value = ask_json(self.llm.as_ref(), self.role(), prompts::BUDGET, &prompt).await?;
            let mut report: BudgetReport = typed(self.role(), value)?;
            report.allocation = Some(allocation);
            Ok(AgentOutput::new(serde_json::to_value(report)?))
        })
    }
}

/// Orders the bookings with deadlines.
pub struct BookingAgent {
    llm: Arc<dyn ReasoningClient>,
}

impl BookingAgent {
    pub fn new(llm: Arc<dyn ReasoningClient>) -> Self {
        Self { llm }
    }
}

impl Agent for BookingAgent {
    fn role(&self) -> AgentRole {
        AgentRole::Booking
    }

    fn execute(&self, ctx: AgentContext) -> BoxFuture<'_, Result<AgentOutput>> {
        Box::pin(async move {
            let mut prompt = request_brief(&ctx.request);
            for role in [
                AgentRole::Budget,
                AgentRole::Accommodation,
                AgentRole::Transport,
                AgentRole::Activities,
            ] {
                prompt.push_str(&upstream_section(&ctx, role));
            }

            let value = ask_json(self.llm.as_ref(), self.role(), prompts::BOOKING, &prompt).await?;
            let mut timeline: BookingTimeline = typed(self.role(), value)?;
            timeline.steps.sort_by_key(|s| s.order);
            Ok(AgentOutput::new(serde_json::to_value(timeline)?))
        })
    }
}

/// Writes the closing summary over every other role's output.
pub struct FinalItineraryAgent {
    llm: Arc<dyn ReasoningClient>,
}

impl FinalItineraryAgent {
    pub fn new(llm: Arc<dyn ReasoningClient>) -> Self {
        Self { llm }
    }
}

impl Agent for FinalItineraryAgent {
    fn role(&self) -> AgentRole {
        AgentRole::FinalItinerary
    }

    fn execute(&self, ctx: AgentContext) -> BoxFuture<'_, Result<AgentOutput>> {
        Box::pin(async move {
            let mut prompt = request_brief(&ctx.request);
            for role in self.role().dependencies() {
                prompt.push_str(&upstream_section(&ctx, *role));
            }

            let value =
                ask_json(self.llm.as_ref(), self.role(), prompts::FINAL_ITINERARY, &prompt).await?;
            let summary: PlannerSummary = typed(self.role(), value)?;
            Ok(AgentOutput::new(serde_json::to_value(summary)?))
        })
    }
}
