//! Role-specific payload shapes carried in `AgentResult::payload`.
//!
//! Every field defaults, so a partially filled model reply still parses and
//! the itinerary assembler can work with whatever a role produced.

use serde::{Deserialize, Serialize};

use crate::types::{BudgetAllocation, Money};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherBrief {
    pub summary: String,
    pub best_travel_window: String,
    pub daily_notes: Vec<String>,
    pub risk_alerts: Vec<String>,
    pub packing_checklist: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DestinationBrief {
    pub summary: String,
    pub entry_requirements: Vec<String>,
    pub safety_alerts: Vec<String>,
    pub local_norms: Vec<String>,
    pub practical_notes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StayOption {
    pub name: String,
    pub area: String,
    pub nightly_price: Option<f64>,
    pub trip_total: Option<f64>,
    pub pros: String,
    pub budget_fit: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StayPlan {
    pub summary: String,
    pub options: Vec<StayOption>,
    pub estimated_cost: Option<Money>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportOption {
    pub name: String,
    pub mode: String,
    pub details: String,
    pub estimated_cost: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportPlan {
    pub summary: String,
    pub outbound: Vec<TransportOption>,
    pub inbound: Vec<TransportOption>,
    pub local_mobility: Vec<String>,
    pub estimated_cost: Option<Money>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityDay {
    pub day: u32,
    pub title: String,
    pub morning: String,
    pub afternoon: String,
    pub evening: String,
    pub estimated_cost: Option<f64>,
    pub booking_note: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityPlan {
    pub summary: String,
    pub days: Vec<ActivityDay>,
    pub estimated_cost: Option<Money>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsiderTips {
    pub hidden_gems: Vec<String>,
    pub food_picks: Vec<String>,
    pub etiquette: Vec<String>,
    pub traveler_hacks: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetLine {
    pub item: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetReport {
    pub allocation: Option<BudgetAllocation>,
    pub assumptions: Vec<String>,
    pub extra_lines: Vec<BudgetLine>,
    pub saving_tips: Vec<String>,
    pub contingency: Option<f64>,
    pub recommendation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookingStep {
    pub order: u32,
    pub item: String,
    pub deadline: String,
    pub estimated_cost: Option<f64>,
    pub notes: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookingTimeline {
    pub steps: Vec<BookingStep>,
    pub checklist: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerSummary {
    pub trip_summary: String,
    pub highlights: Vec<String>,
    pub final_checklist: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_payload_parses_with_defaults() {
        let v = serde_json::json!({
            "summary": "Three stays near Baixa",
            "options": [{"name": "Casa do Rio", "nightly_price": 180.0}]
        });
        let plan: StayPlan = serde_json::from_value(v).unwrap();
        assert_eq!(plan.options.len(), 1);
        assert_eq!(plan.options[0].area, "");
        assert!(plan.estimated_cost.is_none());
    }

    #[test]
    fn test_activity_day_defaults() {
        let day: ActivityDay = serde_json::from_value(serde_json::json!({"day": 2})).unwrap();
        assert_eq!(day.day, 2);
        assert!(day.morning.is_empty());
    }
}
