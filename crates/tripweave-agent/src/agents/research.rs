use std::sync::Arc;

use futures::future::BoxFuture;

use tripweave_core::error::Result;
use tripweave_core::payload::{DestinationBrief, InsiderTips, WeatherBrief};
use tripweave_core::traits::{Agent, AgentContext, AgentOutput, ReasoningClient};
use tripweave_core::types::AgentRole;
use tripweave_tools::{hits_to_prompt, ToolKit};

use super::common::{ask_json, request_brief, soft_tool, typed, upstream_section};
use super::prompts;

/// Researches climate and forecast conditions for the travel window.
pub struct WeatherAgent {
    llm: Arc<dyn ReasoningClient>,
    tools: ToolKit,
}

impl WeatherAgent {
    pub fn new(llm: Arc<dyn ReasoningClient>, tools: ToolKit) -> Self {
        Self { llm, tools }
    }
}

impl Agent for WeatherAgent {
    fn role(&self) -> AgentRole {
        AgentRole::Weather
    }

    fn execute(&self, ctx: AgentContext) -> BoxFuture<'_, Result<AgentOutput>> {
        Box::pin(async move {
            let req = &ctx.request;
            let mut prompt = request_brief(req);

            if let Some(report) = soft_tool(
                self.role(),
                "weather",
                self.tools.get_weather(&req.destination, &req.travel_dates),
            )
            .await
            {
                prompt.push_str("\n## Forecast data\n");
                prompt.push_str(&report.to_prompt_lines());
            }

            if self.tools.has_search() {
                let query = format!("{} weather {} climate", req.destination, req.travel_dates);
                if let Some(hits) = soft_tool(self.role(), "search", self.tools.search(&query)).await {
                    prompt.push_str("\n## Climate research\n");
                    prompt.push_str(&hits_to_prompt(&hits));
                }
            }

            let value = ask_json(self.llm.as_ref(), self.role(), prompts::WEATHER, &prompt).await?;
            let brief: WeatherBrief = typed(self.role(), value)?;
            Ok(AgentOutput::new(serde_json::to_value(brief)?))
        })
    }
}

/// Entry requirements, safety and cultural context.
pub struct DestinationAgent {
    llm: Arc<dyn ReasoningClient>,
    tools: ToolKit,
}

impl DestinationAgent {
    pub fn new(llm: Arc<dyn ReasoningClient>, tools: ToolKit) -> Self {
        Self { llm, tools }
    }
}

impl Agent for DestinationAgent {
    fn role(&self) -> AgentRole {
        AgentRole::Destination
    }

    fn execute(&self, ctx: AgentContext) -> BoxFuture<'_, Result<AgentOutput>> {
        Box::pin(async move {
            let req = &ctx.request;
            let mut prompt = request_brief(req);

            if self.tools.has_search() {
                let query = format!(
                    "{} entry requirements travel advisory for travellers from {}",
                    req.destination, req.departure_location
                );
                if let Some(hits) = soft_tool(self.role(), "search", self.tools.search(&query)).await {
                    prompt.push_str("\n## Web research\n");
                    prompt.push_str(&hits_to_prompt(&hits));
                }
            }

            let value =
                ask_json(self.llm.as_ref(), self.role(), prompts::DESTINATION, &prompt).await?;
            let brief: DestinationBrief = typed(self.role(), value)?;
            Ok(AgentOutput::new(serde_json::to_value(brief)?))
        })
    }
}

/// Hidden gems and local etiquette around the planned activities.
pub struct LocalInsiderAgent {
    llm: Arc<dyn ReasoningClient>,
    tools: ToolKit,
}

impl LocalInsiderAgent {
    pub fn new(llm: Arc<dyn ReasoningClient>, tools: ToolKit) -> Self {
        Self { llm, tools }
    }
}

impl Agent for LocalInsiderAgent {
    fn role(&self) -> AgentRole {
        AgentRole::LocalInsider
    }

    fn execute(&self, ctx: AgentContext) -> BoxFuture<'_, Result<AgentOutput>> {
        Box::pin(async move {
            let req = &ctx.request;
            let mut prompt = request_brief(req);
            prompt.push_str(&upstream_section(&ctx, AgentRole::Activities));

            if self.tools.has_search() {
                let query = format!(
                    "{} local favourites hidden gems {}",
                    req.destination,
                    req.interests_activities.join(" ")
                );
                if let Some(hits) = soft_tool(self.role(), "search", self.tools.search(&query)).await {
                    prompt.push_str("\n## Web research\n");
                    prompt.push_str(&hits_to_prompt(&hits));
                }
            }

            let value =
                ask_json(self.llm.as_ref(), self.role(), prompts::LOCAL_INSIDER, &prompt).await?;
            let tips: InsiderTips = typed(self.role(), value)?;
            Ok(AgentOutput::new(serde_json::to_value(tips)?))
        })
    }
}
