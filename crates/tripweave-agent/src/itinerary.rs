//! Builds the final plan from a terminal session.
//!
//! Assembly is pure: the same session always yields the same document, so a
//! finalized session can be re-rendered at any time.

use std::fmt::Write as _;

use serde::de::DeserializeOwned;

use tripweave_core::error::{Result, TripweaveError};
use tripweave_core::itinerary::{BudgetSummary, DayPlan, ItineraryDocument, UnavailableSection};
use tripweave_core::payload::{
    ActivityPlan, BookingTimeline, BudgetReport, DestinationBrief, InsiderTips, PlannerSummary, StayPlan,
    TransportPlan, WeatherBrief,
};
use tripweave_core::types::{AgentRole, AllocationStatus, Money, Session};

/// Assemble the itinerary for a session that reached a terminal status.
pub fn assemble(session: &Session) -> Result<ItineraryDocument> {
    if !session.status.is_terminal() {
        return Err(TripweaveError::NotTerminal(session.id.to_string()));
    }

    let weather: Option<WeatherBrief> = payload(session, AgentRole::Weather);
    let destination: Option<DestinationBrief> = payload(session, AgentRole::Destination);
    let stays: Option<StayPlan> = payload(session, AgentRole::Accommodation);
    let transport: Option<TransportPlan> = payload(session, AgentRole::Transport);
    let activities: Option<ActivityPlan> = payload(session, AgentRole::Activities);
    let insider: Option<InsiderTips> = payload(session, AgentRole::LocalInsider);
    let report: Option<BudgetReport> = payload(session, AgentRole::Budget);
    let booking: Option<BookingTimeline> = payload(session, AgentRole::Booking);
    let planner: Option<PlannerSummary> = payload(session, AgentRole::FinalItinerary);

    let currency = session
        .request
        .budget()
        .map(|m| m.currency)
        .unwrap_or_else(|_| "USD".to_string());

    let trip_summary = planner
        .as_ref()
        .map(|p| p.trip_summary.clone())
        .filter(|s| !s.is_empty())
        .or_else(|| destination.as_ref().map(|d| d.summary.clone()))
        .unwrap_or_default();

    let days = match activities.as_ref().filter(|a| !a.days.is_empty()) {
        Some(plan) => {
            let mut days: Vec<DayPlan> = plan
                .days
                .iter()
                .map(|d| DayPlan {
                    day: d.day,
                    title: d.title.clone(),
                    morning: d.morning.clone(),
                    afternoon: d.afternoon.clone(),
                    evening: d.evening.clone(),
                    estimated_cost: d.estimated_cost.map(|c| Money::new(c, currency.as_str())),
                })
                .collect();
            days.sort_by_key(|d| d.day);
            days
        }
        None => (1..=session.request.duration_days())
            .map(|day| DayPlan {
                day,
                title: format!("Day {}", day),
                morning: String::new(),
                afternoon: String::new(),
                evening: String::new(),
                estimated_cost: None,
            })
            .collect(),
    };

    let (transport_options, local_mobility) = match transport {
        Some(t) => {
            let mut options = t.outbound;
            options.extend(t.inbound);
            (options, t.local_mobility)
        }
        None => (Vec::new(), Vec::new()),
    };

    let report = report.unwrap_or_default();
    let budget = session.allocation.as_ref().map(|a| BudgetSummary {
        extras: report
            .extra_lines
            .iter()
            .filter(|l| !l.item.trim().is_empty())
            .map(|l| (l.item.trim().to_string(), Money::new(l.amount, a.currency.as_str())))
            .collect(),
        contingency: report
            .contingency
            .filter(|c| *c > 0.0)
            .map(|c| Money::new(c, a.currency.as_str())),
        saving_tips: dedup(report.saving_tips.clone()),
        assumptions: dedup(report.assumptions.clone()),
        recommendation: report.recommendation.trim().to_string(),
        lines: vec![
            ("Accommodation".to_string(), a.accommodation.clone()),
            ("Transport".to_string(), a.transport.clone()),
            ("Activities".to_string(), a.activities.clone()),
        ],
        total: a.total.clone(),
        requested: a.requested.clone(),
        remaining: a.remaining(),
        status: a.status,
        overage_pct: a.overage_pct,
        shortfall: a.shortfall.clone(),
    });

    let mut packing_and_tips = Vec::new();
    if let Some(w) = &weather {
        packing_and_tips.extend(w.packing_checklist.iter().cloned());
        packing_and_tips.extend(w.risk_alerts.iter().cloned());
    }
    if let Some(d) = &destination {
        packing_and_tips.extend(d.practical_notes.iter().cloned());
        packing_and_tips.extend(d.local_norms.iter().cloned());
    }
    if let Some(i) = &insider {
        packing_and_tips.extend(i.hidden_gems.iter().cloned());
        packing_and_tips.extend(i.food_picks.iter().cloned());
        packing_and_tips.extend(i.etiquette.iter().cloned());
        packing_and_tips.extend(i.traveler_hacks.iter().cloned());
    }

    let mut checklist = Vec::new();
    if let Some(d) = &destination {
        checklist.extend(d.entry_requirements.iter().cloned());
    }
    if let Some(b) = &booking {
        checklist.extend(b.checklist.iter().cloned());
    }
    if let Some(p) = &planner {
        checklist.extend(p.final_checklist.iter().cloned());
    }

    let mut booking_timeline = booking.map(|b| b.steps).unwrap_or_default();
    booking_timeline.sort_by_key(|s| s.order);

    Ok(ItineraryDocument {
        session_id: session.id.clone(),
        status: session.status,
        destination: session.request.destination.clone(),
        travel_dates: session.request.travel_dates.clone(),
        trip_summary,
        days,
        accommodation: stays.map(|s| s.options).unwrap_or_default(),
        transport: transport_options,
        local_mobility,
        budget,
        booking_timeline,
        packing_and_tips: dedup(packing_and_tips),
        checklist: dedup(checklist),
        unavailable: session
            .failures()
            .into_iter()
            .map(|(role, reason)| UnavailableSection { role, reason })
            .collect(),
    })
}

fn payload<T: DeserializeOwned + Default>(session: &Session, role: AgentRole) -> Option<T> {
    session.succeeded(role).map(|r| r.payload_as())
}

/// Drop blanks and repeats, keeping first occurrence order.
fn dedup(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && seen.insert(s.to_lowercase()))
        .collect()
}

/// Render the plan as Markdown in eight fixed sections.
pub fn render_markdown(doc: &ItineraryDocument) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {} ({})", doc.destination, doc.travel_dates);
    let _ = writeln!(out, "\n_Status: {}_", doc.status);

    if !doc.unavailable.is_empty() {
        let _ = writeln!(out, "\n> Some sections are unavailable:");
        for u in &doc.unavailable {
            let _ = writeln!(out, "> - {}: {}", u.role.display_name(), u.reason);
        }
    }

    let _ = writeln!(out, "\n## 1. Trip Summary\n");
    let _ = writeln!(out, "{}", or_placeholder(&doc.trip_summary));

    let _ = writeln!(out, "\n## 2. Day-by-Day Itinerary\n");
    for day in &doc.days {
        let _ = write!(out, "### Day {}", day.day);
        if !day.title.is_empty() && day.title != format!("Day {}", day.day) {
            let _ = write!(out, ": {}", day.title);
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "- Morning: {}", or_placeholder(&day.morning));
        let _ = writeln!(out, "- Afternoon: {}", or_placeholder(&day.afternoon));
        let _ = writeln!(out, "- Evening: {}", or_placeholder(&day.evening));
        if let Some(cost) = &day.estimated_cost {
            let _ = writeln!(out, "- Estimated cost: {}", cost);
        }
    }

    let _ = writeln!(out, "\n## 3. Accommodation Plan\n");
    if doc.accommodation.is_empty() {
        let _ = writeln!(out, "{}", or_placeholder(""));
    }
    for stay in &doc.accommodation {
        let _ = write!(out, "- **{}**", stay.name);
        if !stay.area.is_empty() {
            let _ = write!(out, " ({})", stay.area);
        }
        if let Some(price) = stay.nightly_price {
            let _ = write!(out, ", {:.2}/night", price);
        }
        if !stay.pros.is_empty() {
            let _ = write!(out, ": {}", stay.pros);
        }
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "\n## 4. Transportation Plan\n");
    if doc.transport.is_empty() && doc.local_mobility.is_empty() {
        let _ = writeln!(out, "{}", or_placeholder(""));
    }
    for option in &doc.transport {
        let _ = write!(out, "- **{}**", option.name);
        if !option.mode.is_empty() {
            let _ = write!(out, " [{}]", option.mode);
        }
        if !option.details.is_empty() {
            let _ = write!(out, ": {}", option.details);
        }
        if let Some(cost) = option.estimated_cost {
            let _ = write!(out, " (~{:.2})", cost);
        }
        let _ = writeln!(out);
    }
    for tip in &doc.local_mobility {
        let _ = writeln!(out, "- {}", tip);
    }

    let _ = writeln!(out, "\n## 5. Budget Breakdown\n");
    match &doc.budget {
        Some(b) => {
            let _ = writeln!(out, "| Category | Amount |");
            let _ = writeln!(out, "|---|---|");
            for (label, amount) in &b.lines {
                let _ = writeln!(out, "| {} | {} |", label, amount);
            }
            let _ = writeln!(out, "| **Total** | **{}** |", b.total);
            let _ = writeln!(out, "\nRequested budget: {}", b.requested);
            match b.status {
                AllocationStatus::Accepted => {
                    let _ = writeln!(out, "Remaining: {} ({:+.2}% vs budget)", b.remaining, b.overage_pct);
                }
                AllocationStatus::RejectedFinal => {
                    let _ = writeln!(
                        out,
                        "Negotiation did not converge; categories were scaled to the budget. Unresolved shortfall: {}",
                        b.shortfall
                    );
                }
            }
            if !b.extras.is_empty() {
                let _ = writeln!(out, "\n| Other estimates | Amount |");
                let _ = writeln!(out, "|---|---|");
                for (label, amount) in &b.extras {
                    let _ = writeln!(out, "| {} | {} |", label, amount);
                }
                let _ = writeln!(out, "\nEstimated total with extras: {}", b.estimated_total());
            }
            if let Some(contingency) = &b.contingency {
                let _ = writeln!(out, "Recommended contingency: {}", contingency);
            }
            if !b.recommendation.is_empty() {
                let _ = writeln!(out, "\n{}", b.recommendation);
            }
            if !b.saving_tips.is_empty() {
                let _ = writeln!(out, "\nSaving tips:");
                for tip in &b.saving_tips {
                    let _ = writeln!(out, "- {}", tip);
                }
            }
            if !b.assumptions.is_empty() {
                let _ = writeln!(out, "\nAssumptions:");
                for a in &b.assumptions {
                    let _ = writeln!(out, "- {}", a);
                }
            }
        }
        None => {
            let _ = writeln!(out, "{}", or_placeholder(""));
        }
    }

    let _ = writeln!(out, "\n## 6. Booking Priority Timeline\n");
    if doc.booking_timeline.is_empty() {
        let _ = writeln!(out, "{}", or_placeholder(""));
    }
    for step in &doc.booking_timeline {
        let _ = write!(out, "{}. {}", step.order, step.item);
        if !step.deadline.is_empty() {
            let _ = write!(out, " (by {})", step.deadline);
        }
        if let Some(cost) = step.estimated_cost {
            let _ = write!(out, " ~{:.2}", cost);
        }
        if !step.notes.is_empty() {
            let _ = write!(out, ": {}", step.notes);
        }
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "\n## 7. Packing + Local Tips\n");
    bullets(&mut out, &doc.packing_and_tips);

    let _ = writeln!(out, "\n## 8. Final Checklist\n");
    if doc.checklist.is_empty() {
        let _ = writeln!(out, "{}", or_placeholder(""));
    }
    for item in &doc.checklist {
        let _ = writeln!(out, "- [ ] {}", item);
    }

    out
}

fn bullets(out: &mut String, items: &[String]) {
    if items.is_empty() {
        let _ = writeln!(out, "{}", or_placeholder(""));
    }
    for item in items {
        let _ = writeln!(out, "- {}", item);
    }
}

fn or_placeholder(text: &str) -> &str {
    if text.trim().is_empty() {
        "_Not available._"
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tripweave_core::types::{
        AgentResult, BudgetAllocation, RunStatus, TaskStatus,
    };
    use tripweave_test_utils::sample_request;

    fn succeed(session: &mut Session, role: AgentRole, payload: serde_json::Value) {
        session
            .results
            .insert(role, AgentResult::succeeded(role, payload, None, 1));
        session.tasks.get_mut(&role).unwrap().status = TaskStatus::Succeeded;
    }

    fn fail(session: &mut Session, role: AgentRole, reason: &str) {
        session
            .results
            .insert(role, AgentResult::failed(role, reason, 1));
        let task = session.tasks.get_mut(&role).unwrap();
        task.status = TaskStatus::Failed;
        task.error = Some(reason.to_string());
    }

    fn allocation() -> BudgetAllocation {
        BudgetAllocation {
            accommodation: Money::new(2200.0, "USD"),
            transport: Money::new(1700.0, "USD"),
            activities: Money::new(1000.0, "USD"),
            total: Money::new(4900.0, "USD"),
            currency: "USD".into(),
            requested: Money::new(4500.0, "USD"),
            ceiling: Money::new(4950.0, "USD"),
            status: AllocationStatus::Accepted,
            overage_pct: 8.89,
            shortfall: Money::new(0.0, "USD"),
            rounds: 1,
        }
    }

    #[test]
    fn test_rejects_in_progress_session() {
        let session = Session::new(sample_request());
        assert!(matches!(
            assemble(&session),
            Err(TripweaveError::NotTerminal(_))
        ));
    }

    #[test]
    fn test_complete_session() {
        let mut session = Session::new(sample_request());
        succeed(
            &mut session,
            AgentRole::Activities,
            json!({"days": [
                {"day": 2, "title": "Belém", "morning": "Tower", "estimated_cost": 40.0},
                {"day": 1, "title": "Alfama", "evening": "Fado dinner"}
            ]}),
        );
        succeed(
            &mut session,
            AgentRole::Accommodation,
            json!({"options": [{"name": "Casa do Rio", "area": "Baixa", "nightly_price": 180.0}]}),
        );
        succeed(
            &mut session,
            AgentRole::Transport,
            json!({"outbound": [{"name": "TAP TP218", "mode": "flight"}],
                   "inbound": [{"name": "TAP TP217", "mode": "flight"}],
                   "local_mobility": ["Metro day pass"]}),
        );
        succeed(
            &mut session,
            AgentRole::Booking,
            json!({"steps": [
                {"order": 2, "item": "Hotel"},
                {"order": 1, "item": "Flights", "deadline": "2026-03-10", "estimated_cost": 1700.0}
            ], "checklist": ["Book flights"]}),
        );
        succeed(
            &mut session,
            AgentRole::Budget,
            json!({
                "extra_lines": [{"item": "Food", "amount": 350.0}, {"item": "Misc", "amount": 100.0}],
                "contingency": 250.0,
                "saving_tips": ["Lisboa Card for transit"],
                "assumptions": ["Two travellers sharing a room"],
                "recommendation": "Trim one paid tour to close the 400.00 USD gap."
            }),
        );
        succeed(
            &mut session,
            AgentRole::Weather,
            json!({"packing_checklist": ["Rain jacket"], "risk_alerts": ["Showers day 3"]}),
        );
        succeed(
            &mut session,
            AgentRole::FinalItinerary,
            json!({"trip_summary": "A week in Lisbon", "final_checklist": ["book flights", "Check passport"]}),
        );
        session.allocation = Some(allocation());
        session.status = RunStatus::Completed;

        let doc = assemble(&session).unwrap();
        assert_eq!(doc.trip_summary, "A week in Lisbon");
        assert_eq!(doc.days.len(), 2);
        assert_eq!(doc.days[0].title, "Alfama");
        assert_eq!(doc.days[1].estimated_cost, Some(Money::new(40.0, "USD")));
        assert_eq!(doc.accommodation[0].name, "Casa do Rio");
        assert_eq!(doc.transport.len(), 2);
        assert_eq!(doc.local_mobility, vec!["Metro day pass"]);
        assert_eq!(doc.booking_timeline[0].item, "Flights");
        assert_eq!(doc.checklist, vec!["Book flights", "Check passport"]);
        assert_eq!(doc.packing_and_tips, vec!["Rain jacket", "Showers day 3"]);
        let budget = doc.budget.as_ref().unwrap();
        assert_eq!(budget.remaining, Money::new(-400.0, "USD"));
        assert_eq!(budget.extras.len(), 2);
        assert_eq!(budget.estimated_total(), Money::new(5350.0, "USD"));
        assert_eq!(budget.contingency, Some(Money::new(250.0, "USD")));
        assert!(doc.unavailable.is_empty());

        // Deterministic.
        assert_eq!(assemble(&session).unwrap(), doc);

        let md = render_markdown(&doc);
        for heading in [
            "## 1. Trip Summary",
            "## 2. Day-by-Day Itinerary",
            "## 3. Accommodation Plan",
            "## 4. Transportation Plan",
            "## 5. Budget Breakdown",
            "## 6. Booking Priority Timeline",
            "## 7. Packing + Local Tips",
            "## 8. Final Checklist",
        ] {
            assert!(md.contains(heading), "missing {}", heading);
        }
        assert!(md.contains("| **Total** | **4900.00 USD** |"));
        assert!(md.contains("| Food | 350.00 USD |"));
        assert!(md.contains("Estimated total with extras: 5350.00 USD"));
        assert!(md.contains("Recommended contingency: 250.00 USD"));
        assert!(md.contains("Trim one paid tour"));
        assert!(md.contains("- Lisboa Card for transit"));
        assert!(md.contains("1. Flights (by 2026-03-10) ~1700.00"));
        assert!(md.contains("- [ ] Check passport"));
    }

    #[test]
    fn test_missing_roles_are_reported_unavailable() {
        let mut session = Session::new(sample_request());
        fail(&mut session, AgentRole::Activities, "Task activities failed: no slots");
        fail(&mut session, AgentRole::Booking, "dependency budget failed");
        session.status = RunStatus::PartiallyCompleted;

        let doc = assemble(&session).unwrap();
        // Seven-day skeleton from the request duration.
        assert_eq!(doc.days.len(), 7);
        assert_eq!(doc.days[6].title, "Day 7");
        assert!(doc.budget.is_none());
        assert_eq!(doc.unavailable.len(), 2);
        assert!(doc
            .unavailable
            .iter()
            .any(|u| u.role == AgentRole::Booking && u.reason == "dependency budget failed"));

        let md = render_markdown(&doc);
        assert!(md.contains("Some sections are unavailable"));
        assert!(md.contains("Booking Assistant: dependency budget failed"));
    }
}
