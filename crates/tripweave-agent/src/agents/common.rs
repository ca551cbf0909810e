use std::future::Future;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use tripweave_core::error::{Result, TripweaveError};
use tripweave_core::traits::{AgentContext, ReasoningClient};
use tripweave_core::types::{parse_money, AgentRole, Money, TravelRequest};
use tripweave_llm::extract_json;

use super::prompts::JSON_RULES;

/// The traveller's request as prompt text.
pub fn request_brief(req: &TravelRequest) -> String {
    format!(
        "Travel request:\n\
         - destination: {}\n\
         - travel_purpose: {}\n\
         - travel_companions: {}\n\
         - travel_dates: {}\n\
         - departure_location: {}\n\
         - date_flexibility: {}\n\
         - accommodation_type: {}\n\
         - budget: {}\n\
         - interests_activities: {}\n\
         - travel_style: {}\n\
         - duration: {}\n\
         - budget_flexibility: {}\n",
        req.destination,
        req.travel_purpose,
        req.travel_companions,
        req.travel_dates,
        req.departure_location,
        req.date_flexibility,
        req.accommodation_type,
        req.budget,
        req.interests_activities.join(", "),
        req.travel_style,
        req.duration,
        req.budget_flexibility,
    )
}

/// An upstream role's payload rendered for a prompt.
pub fn upstream_section(ctx: &AgentContext, role: AgentRole) -> String {
    match ctx.upstream(role) {
        Some(result) => format!(
            "\n## {} findings\n{}\n",
            role.display_name(),
            serde_json::to_string_pretty(&result.payload).unwrap_or_default()
        ),
        None => format!("\n## {} findings\nunavailable\n", role.display_name()),
    }
}

/// Await a tool call, keeping the agent alive when the tool is down.
pub async fn soft_tool<T>(
    role: AgentRole,
    tool: &str,
    call: impl Future<Output = Result<T>>,
) -> Option<T> {
    match call.await {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(%role, tool, error = %e, "Tool unavailable, continuing without it");
            None
        }
    }
}

/// Send one prompt and return the JSON object in the reply.
pub async fn ask_json(
    llm: &dyn ReasoningClient,
    role: AgentRole,
    system: &str,
    prompt: &str,
) -> Result<Value> {
    let system = format!("{}\n\n{}", system, JSON_RULES);
    let reply = llm.complete(&system, prompt).await?;
    debug!(%role, chars = reply.len(), "Reasoning reply received");
    extract_json(&reply)
}

/// Deserialize a reply into a payload struct.
pub fn typed<T: DeserializeOwned>(role: AgentRole, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| TripweaveError::ReasoningParse(format!("{} reply: {}", role, e)))
}

/// Read a cost field in whatever shape the model used and rewrite it as `Money`.
///
/// Accepts a bare number, a string such as `"$2,100"` or `"1800 EUR"`, or an
/// `{"amount", "currency"}` object. Amounts without a currency take
/// `default_currency`. Non-positive or unreadable amounts clear the field.
pub fn normalize_cost(value: &mut Value, key: &str, default_currency: &str) -> Option<Money> {
    let money = value.get(key).and_then(|raw| money_from_value(raw, default_currency));
    if let Some(obj) = value.as_object_mut() {
        match &money {
            Some(m) => {
                obj.insert(key.to_string(), serde_json::to_value(m).unwrap_or(Value::Null));
            }
            None => {
                obj.remove(key);
            }
        }
    }
    money
}

fn money_from_value(raw: &Value, default_currency: &str) -> Option<Money> {
    let money = match raw {
        Value::Number(n) => Money::new(n.as_f64()?, default_currency),
        Value::String(s) => {
            let bare = s
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | ' '));
            if bare {
                let amount = s.replace([',', ' '], "").parse::<f64>().ok()?;
                Money::new(amount, default_currency)
            } else {
                parse_money(s).ok()?
            }
        }
        Value::Object(obj) => {
            let amount = obj.get("amount").and_then(|a| match a {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.replace(',', "").parse().ok(),
                _ => None,
            })?;
            let currency = obj
                .get("currency")
                .and_then(|c| c.as_str())
                .filter(|c| c.len() == 3)
                .unwrap_or(default_currency);
            Money::new(amount, currency)
        }
        _ => return None,
    };
    (money.amount > 0.0).then_some(money)
}

/// Currency resource roles price in: the request budget's, USD when unreadable.
pub fn budget_currency(req: &TravelRequest) -> String {
    req.budget()
        .map(|b| b.currency)
        .unwrap_or_else(|_| "USD".to_string())
}
