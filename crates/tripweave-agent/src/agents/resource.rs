use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use tripweave_core::error::{Result, TripweaveError};
use tripweave_core::payload::{ActivityPlan, StayPlan, TransportPlan};
use tripweave_core::traits::{Agent, AgentContext, AgentOutput, ReasoningClient, ResourceAgent};
use tripweave_core::types::{AgentRole, CounterConstraint, Money};
use tripweave_tools::{hits_to_prompt, ToolKit};

use super::common::{
    ask_json, budget_currency, normalize_cost, request_brief, soft_tool, typed, upstream_section,
};
use super::prompts;

/// Pull the mandatory `estimated_cost` out of a resource reply.
fn require_cost(role: AgentRole, value: &mut Value, currency: &str) -> Result<Money> {
    normalize_cost(value, "estimated_cost", currency).ok_or_else(|| {
        TripweaveError::ReasoningParse(format!("{} reply has no usable estimated_cost", role))
    })
}

async fn web_research(role: AgentRole, tools: &ToolKit, query: String) -> String {
    if !tools.has_search() {
        return String::new();
    }
    match soft_tool(role, "search", tools.search(&query)).await {
        Some(hits) => format!("\n## Web research\n{}\n", hits_to_prompt(&hits)),
        None => String::new(),
    }
}

/// Ask the model for a cheaper estimate under a counter-constraint.
async fn revise_estimate(
    llm: &dyn ReasoningClient,
    role: AgentRole,
    ctx: &AgentContext,
    previous: &Money,
    constraint: &CounterConstraint,
) -> Result<Money> {
    let mut prompt = request_brief(&ctx.request);
    prompt.push_str(&upstream_section(ctx, role));
    prompt.push_str(&format!(
        "\n## Revision request\nYour previous estimate: {}\nRequested maximum: {}\nReason: {}\n",
        previous, constraint.max_cost, constraint.reason
    ));

    let mut value = ask_json(llm, role, prompts::REVISE, &prompt).await?;
    require_cost(role, &mut value, &previous.currency)
}

/// Finds named stays and prices the whole stay.
pub struct AccommodationAgent {
    llm: Arc<dyn ReasoningClient>,
    tools: ToolKit,
}

impl AccommodationAgent {
    pub fn new(llm: Arc<dyn ReasoningClient>, tools: ToolKit) -> Self {
        Self { llm, tools }
    }
}

impl Agent for AccommodationAgent {
    fn role(&self) -> AgentRole {
        AgentRole::Accommodation
    }

    fn execute(&self, ctx: AgentContext) -> BoxFuture<'_, Result<AgentOutput>> {
        Box::pin(async move {
            let req = &ctx.request;
            let mut prompt = request_brief(req);
            prompt.push_str(&format!("Nights to price: {}\n", req.duration_days()));
            prompt.push_str(
                &web_research(
                    self.role(),
                    &self.tools,
                    format!(
                        "{} {} {} price per night best areas",
                        req.destination, req.accommodation_type, req.travel_style
                    ),
                )
                .await,
            );

            let mut value =
                ask_json(self.llm.as_ref(), self.role(), prompts::ACCOMMODATION, &prompt).await?;
            let cost = require_cost(self.role(), &mut value, &budget_currency(req))?;
            let plan: StayPlan = typed(self.role(), value)?;
            Ok(AgentOutput::new(serde_json::to_value(plan)?).with_cost(cost))
        })
    }
}

impl ResourceAgent for AccommodationAgent {
    fn revise(
        &self,
        ctx: AgentContext,
        previous: Money,
        constraint: CounterConstraint,
    ) -> BoxFuture<'_, Result<Money>> {
        Box::pin(async move {
            revise_estimate(self.llm.as_ref(), self.role(), &ctx, &previous, &constraint).await
        })
    }
}

/// Prices outbound, return and local transport.
pub struct TransportAgent {
    llm: Arc<dyn ReasoningClient>,
    tools: ToolKit,
}

impl TransportAgent {
    pub fn new(llm: Arc<dyn ReasoningClient>, tools: ToolKit) -> Self {
        Self { llm, tools }
    }
}

impl Agent for TransportAgent {
    fn role(&self) -> AgentRole {
        AgentRole::Transport
    }

    fn execute(&self, ctx: AgentContext) -> BoxFuture<'_, Result<AgentOutput>> {
        Box::pin(async move {
            let req = &ctx.request;
            let mut prompt = request_brief(req);
            prompt.push_str(
                &web_research(
                    self.role(),
                    &self.tools,
                    format!(
                        "flights from {} to {} {} price",
                        req.departure_location, req.destination, req.travel_dates
                    ),
                )
                .await,
            );

            let mut value =
                ask_json(self.llm.as_ref(), self.role(), prompts::TRANSPORT, &prompt).await?;
            let cost = require_cost(self.role(), &mut value, &budget_currency(req))?;
            let plan: TransportPlan = typed(self.role(), value)?;
            Ok(AgentOutput::new(serde_json::to_value(plan)?).with_cost(cost))
        })
    }
}

impl ResourceAgent for TransportAgent {
    fn revise(
        &self,
        ctx: AgentContext,
        previous: Money,
        constraint: CounterConstraint,
    ) -> BoxFuture<'_, Result<Money>> {
        Box::pin(async move {
            revise_estimate(self.llm.as_ref(), self.role(), &ctx, &previous, &constraint).await
        })
    }
}

/// Builds the day-by-day activity plan.
pub struct ActivitiesAgent {
    llm: Arc<dyn ReasoningClient>,
    tools: ToolKit,
}

impl ActivitiesAgent {
    pub fn new(llm: Arc<dyn ReasoningClient>, tools: ToolKit) -> Self {
        Self { llm, tools }
    }
}

impl Agent for ActivitiesAgent {
    fn role(&self) -> AgentRole {
        AgentRole::Activities
    }

    fn execute(&self, ctx: AgentContext) -> BoxFuture<'_, Result<AgentOutput>> {
        Box::pin(async move {
            let req = &ctx.request;
            let mut prompt = request_brief(req);
            prompt.push_str(&format!("Days to plan: {}\n", req.duration_days()));
            prompt.push_str(&upstream_section(&ctx, AgentRole::Destination));
            // Weather is optional context; it may still be running.
            if ctx.upstream(AgentRole::Weather).is_some() {
                prompt.push_str(&upstream_section(&ctx, AgentRole::Weather));
            }
            prompt.push_str(
                &web_research(
                    self.role(),
                    &self.tools,
                    format!(
                        "{} {} tours tickets prices",
                        req.destination,
                        req.interests_activities.join(" ")
                    ),
                )
                .await,
            );

            let mut value =
                ask_json(self.llm.as_ref(), self.role(), prompts::ACTIVITIES, &prompt).await?;
            let cost = require_cost(self.role(), &mut value, &budget_currency(req))?;
            let plan: ActivityPlan = typed(self.role(), value)?;
            Ok(AgentOutput::new(serde_json::to_value(plan)?).with_cost(cost))
        })
    }
}

impl ResourceAgent for ActivitiesAgent {
    fn revise(
        &self,
        ctx: AgentContext,
        previous: Money,
        constraint: CounterConstraint,
    ) -> BoxFuture<'_, Result<Money>> {
        Box::pin(async move {
            revise_estimate(self.llm.as_ref(), self.role(), &ctx, &previous, &constraint).await
        })
    }
}
