use serde::{Deserialize, Serialize};

use crate::payload::{BookingStep, StayOption, TransportOption};
use crate::types::{AgentRole, AllocationStatus, Money, RunStatus, SessionId};

/// Final plan assembled from a terminal session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItineraryDocument {
    pub session_id: SessionId,
    pub status: RunStatus,
    pub destination: String,
    pub travel_dates: String,
    pub trip_summary: String,
    pub days: Vec<DayPlan>,
    pub accommodation: Vec<StayOption>,
    pub transport: Vec<TransportOption>,
    pub local_mobility: Vec<String>,
    pub budget: Option<BudgetSummary>,
    pub booking_timeline: Vec<BookingStep>,
    pub packing_and_tips: Vec<String>,
    pub checklist: Vec<String>,
    /// Roles whose output is missing from the plan, with the reason.
    pub unavailable: Vec<UnavailableSection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayPlan {
    pub day: u32,
    pub title: String,
    pub morning: String,
    pub afternoon: String,
    pub evening: String,
    pub estimated_cost: Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetSummary {
    pub lines: Vec<(String, Money)>,
    pub total: Money,
    pub requested: Money,
    pub remaining: Money,
    pub status: AllocationStatus,
    pub overage_pct: f64,
    pub shortfall: Money,
    /// Estimated spend outside the negotiated categories, e.g. food.
    #[serde(default)]
    pub extras: Vec<(String, Money)>,
    #[serde(default)]
    pub contingency: Option<Money>,
    #[serde(default)]
    pub saving_tips: Vec<String>,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default)]
    pub recommendation: String,
}

impl BudgetSummary {
    /// Negotiated total plus the estimated extras.
    pub fn estimated_total(&self) -> Money {
        let extras: i64 = self.extras.iter().map(|(_, m)| m.cents()).sum();
        Money::from_cents(self.total.cents() + extras, &self.total.currency)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnavailableSection {
    pub role: AgentRole,
    pub reason: String,
}
