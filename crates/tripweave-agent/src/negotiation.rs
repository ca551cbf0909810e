//! Budget negotiation between the Budget role and the three resource roles.
//!
//! The coordinator runs inside the Budget task. Proposals are normalised to
//! the budget's currency, compared against a ceiling derived from the budget
//! flexibility, and the worst offenders are asked to revise until the total
//! fits or the round cap is reached. Every round lands in the session store
//! as it happens, so the transcript survives a crash mid-negotiation.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, info, warn};

use tripweave_core::config::NegotiationConfig;
use tripweave_core::error::{Result, TripweaveError};
use tripweave_core::event::EventBus;
use tripweave_core::traits::{AgentContext, SessionStore};
use tripweave_core::types::{
    AgentRole, AllocationStatus, BudgetAllocation, CounterConstraint, Money, NegotiationRound,
    NegotiationVerdict, SessionId, WorkflowEvent, NEGOTIATED_ROLES,
};
use tripweave_tools::ToolKit;

use crate::agents::AgentRoster;

/// Ceiling and per-role targets, all in cents of the budget currency.
#[derive(Debug, Clone)]
struct Limits {
    currency: String,
    requested: i64,
    ceiling: i64,
    targets: BTreeMap<AgentRole, i64>,
}

impl Limits {
    fn target(&self, role: AgentRole) -> i64 {
        self.targets.get(&role).copied().unwrap_or(0)
    }
}

pub struct NegotiationCoordinator {
    store: Arc<dyn SessionStore>,
    roster: Arc<AgentRoster>,
    tools: ToolKit,
    config: NegotiationConfig,
    event_bus: Arc<EventBus>,
}

impl NegotiationCoordinator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        roster: Arc<AgentRoster>,
        tools: ToolKit,
        config: NegotiationConfig,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            roster,
            tools,
            config,
            event_bus,
        }
    }

    /// Negotiate the three resource proposals in `ctx` into a sealed allocation.
    ///
    /// Always terminates within `max_rounds` revision rounds. An unresolved
    /// negotiation is not an error: the allocation comes back `rejected-final`.
    pub async fn negotiate(&self, ctx: &AgentContext) -> Result<BudgetAllocation> {
        let sid = &ctx.session_id;
        let limits = &self.limits(ctx)?;

        let mut proposals: BTreeMap<AgentRole, i64> = BTreeMap::new();
        for role in NEGOTIATED_ROLES {
            let cost = ctx
                .upstream(role)
                .and_then(|r| r.proposed_cost.clone())
                .ok_or_else(|| TripweaveError::TaskFailed {
                    role: AgentRole::Budget,
                    reason: format!("{} has no cost proposal", role),
                })?;
            let cost = self.normalise(sid, cost, &limits.currency).await?;
            proposals.insert(role, cost.cents());
        }

        info!(
            session_id = %sid,
            requested = limits.requested,
            ceiling = limits.ceiling,
            "Budget negotiation started"
        );

        let max_rounds = self.config.max_rounds;
        let mut selected: Vec<AgentRole> = Vec::new();
        let mut counters: BTreeMap<AgentRole, CounterConstraint> = BTreeMap::new();

        for seq in 0..=max_rounds {
            if seq > 0 {
                let revisions = selected.iter().map(|role| {
                    let role = *role;
                    let previous = Money::from_cents(proposals[&role], &limits.currency);
                    let counter = counters.get(&role).cloned();
                    async move {
                        let agent = self.roster.resource(role).ok_or_else(|| {
                            TripweaveError::TaskFailed {
                                role: AgentRole::Budget,
                                reason: format!("{} cannot revise", role),
                            }
                        })?;
                        let counter = counter.ok_or_else(|| TripweaveError::TaskFailed {
                            role: AgentRole::Budget,
                            reason: format!("no counter-constraint for {}", role),
                        })?;
                        let max_cost = counter.max_cost.clone();
                        let revised = agent.revise(ctx.clone(), previous.clone(), counter).await?;
                        let mut revised = self.normalise(sid, revised, &limits.currency).await?;
                        if revised.cents() > max_cost.cents() {
                            warn!(session_id = %sid, %role, revised = %revised, max = %max_cost, "Revision above the counter-constraint");
                        }
                        if revised.cents() > previous.cents() {
                            warn!(session_id = %sid, %role, revised = %revised, previous = %previous, "Revision raised the proposal, keeping the previous one");
                            revised = previous;
                        }
                        Ok::<_, TripweaveError>((role, revised))
                    }
                });
                for outcome in join_all(revisions).await {
                    let (role, revised) = outcome?;
                    debug!(session_id = %sid, %role, revised = %revised, "Revised proposal");
                    proposals.insert(role, revised.cents());
                }
            }

            let total: i64 = proposals.values().sum();

            if total <= limits.ceiling {
                self.record_round(sid, seq, &proposals, limits, |_| {
                    (NegotiationVerdict::Accepted, None)
                })
                .await?;
                let allocation = accepted(&proposals, limits, seq + 1);
                return self.seal(sid, allocation).await;
            }

            if seq == max_rounds {
                self.record_round(sid, seq, &proposals, limits, |_| {
                    (NegotiationVerdict::RejectedFinal, None)
                })
                .await?;
                let allocation = scaled_down(&proposals, limits, seq + 1);
                warn!(
                    session_id = %sid,
                    rounds = allocation.rounds,
                    shortfall = %allocation.shortfall,
                    "Negotiation unresolved, allocation scaled to the requested budget"
                );
                return self.seal(sid, allocation).await;
            }

            let excess = total - limits.ceiling;
            selected = select_revisions(&proposals, limits);
            counters = selected
                .iter()
                .map(|role| {
                    let max = (proposals[role] - excess).max(limits.target(*role));
                    let constraint = CounterConstraint {
                        max_cost: Money::from_cents(max, &limits.currency),
                        reason: format!(
                            "total {} exceeds the ceiling {} by {}",
                            Money::from_cents(total, &limits.currency),
                            Money::from_cents(limits.ceiling, &limits.currency),
                            Money::from_cents(excess, &limits.currency),
                        ),
                    };
                    (*role, constraint)
                })
                .collect();

            self.record_round(sid, seq, &proposals, limits, |role| {
                match counters.get(&role) {
                    Some(c) => (NegotiationVerdict::ReviseRequested, Some(c.clone())),
                    None => (NegotiationVerdict::Accepted, None),
                }
            })
            .await?;
        }

        // The loop always returns at seq == max_rounds.
        Err(TripweaveError::TaskFailed {
            role: AgentRole::Budget,
            reason: "negotiation ended without a verdict".into(),
        })
    }

    fn limits(&self, ctx: &AgentContext) -> Result<Limits> {
        let budget = ctx.request.budget()?;
        let tolerance = self.config.tolerance_pct(ctx.request.budget_flexibility());
        let requested = budget.cents();
        let ceiling = (requested as f64 * (1.0 + tolerance / 100.0)).round() as i64;
        let targets = NEGOTIATED_ROLES
            .into_iter()
            .map(|role| {
                let target = (ceiling as f64 * self.config.share(role)).round() as i64;
                (role, target)
            })
            .collect();
        Ok(Limits {
            currency: budget.currency,
            requested,
            ceiling,
            targets,
        })
    }

    /// Convert a proposal into the budget currency, auditing the conversion.
    async fn normalise(&self, sid: &SessionId, cost: Money, currency: &str) -> Result<Money> {
        if cost.currency == currency {
            return Ok(cost);
        }
        let conversion = self
            .tools
            .convert_currency(cost.amount, &cost.currency, currency)
            .await?;
        debug!(
            session_id = %sid,
            from = %cost,
            converted = conversion.converted,
            provider = %conversion.provider,
            "Normalised proposal currency"
        );
        self.store.record_conversion(sid, &conversion).await?;
        Ok(Money::new(conversion.converted, currency))
    }

    async fn record_round(
        &self,
        sid: &SessionId,
        seq: u32,
        proposals: &BTreeMap<AgentRole, i64>,
        limits: &Limits,
        verdict: impl Fn(AgentRole) -> (NegotiationVerdict, Option<CounterConstraint>),
    ) -> Result<()> {
        for (role, cents) in proposals {
            let (verdict, counter) = verdict(*role);
            let round = NegotiationRound {
                seq,
                role: *role,
                proposed: Money::from_cents(*cents, &limits.currency),
                verdict,
                counter,
                timestamp: Utc::now(),
            };
            self.store.append_negotiation(sid, &round).await?;
            info!(session_id = %sid, seq, %role, ?verdict, proposed = %round.proposed, "Negotiation round");
            self.event_bus.publish(WorkflowEvent::Negotiation {
                session_id: sid.clone(),
                round,
            });
        }
        Ok(())
    }

    async fn seal(&self, sid: &SessionId, allocation: BudgetAllocation) -> Result<BudgetAllocation> {
        self.store.set_allocation(sid, &allocation).await?;
        info!(
            session_id = %sid,
            status = ?allocation.status,
            total = %allocation.total,
            rounds = allocation.rounds,
            "Allocation sealed"
        );
        self.event_bus.publish(WorkflowEvent::AllocationSealed {
            session_id: sid.clone(),
            allocation: allocation.clone(),
        });
        Ok(allocation)
    }
}

/// Roles asked to revise: the largest cost contributors, then the largest
/// absolute overage over target. Roles still tied revise together.
fn select_revisions(proposals: &BTreeMap<AgentRole, i64>, limits: &Limits) -> Vec<AgentRole> {
    let rank = |role: AgentRole, cents: i64| (cents, cents - limits.target(role));
    let best = proposals
        .iter()
        .map(|(role, cents)| rank(*role, *cents))
        .max();
    match best {
        Some(best) => proposals
            .iter()
            .filter(|(role, cents)| rank(**role, **cents) == best)
            .map(|(role, _)| *role)
            .collect(),
        None => Vec::new(),
    }
}

fn accepted(proposals: &BTreeMap<AgentRole, i64>, limits: &Limits, rounds: u32) -> BudgetAllocation {
    let total: i64 = proposals.values().sum();
    let overage_pct = if limits.requested > 0 {
        (total - limits.requested) as f64 / limits.requested as f64 * 100.0
    } else {
        0.0
    };
    allocation(
        proposals,
        limits,
        AllocationStatus::Accepted,
        (overage_pct * 100.0).round() / 100.0,
        0,
        rounds,
    )
}

/// Scale every category so the total equals the requested budget exactly.
/// Cents lost to flooring go to the largest category.
fn scaled_down(
    proposals: &BTreeMap<AgentRole, i64>,
    limits: &Limits,
    rounds: u32,
) -> BudgetAllocation {
    let total: i64 = proposals.values().sum();
    let budget = limits.requested;
    let mut scaled: BTreeMap<AgentRole, i64> = proposals
        .iter()
        .map(|(role, cents)| {
            let share = if total > 0 {
                (*cents as i128 * budget as i128 / total as i128) as i64
            } else {
                0
            };
            (*role, share)
        })
        .collect();

    let remainder = budget - scaled.values().sum::<i64>();
    let largest = proposals
        .iter()
        .max_by_key(|(_, cents)| **cents)
        .map(|(role, _)| *role);
    if let Some(slot) = largest.and_then(|role| scaled.get_mut(&role)) {
        *slot += remainder;
    }

    allocation(
        &scaled,
        limits,
        AllocationStatus::RejectedFinal,
        0.0,
        total - budget,
        rounds,
    )
}

fn allocation(
    cents: &BTreeMap<AgentRole, i64>,
    limits: &Limits,
    status: AllocationStatus,
    overage_pct: f64,
    shortfall: i64,
    rounds: u32,
) -> BudgetAllocation {
    let money = |c: i64| Money::from_cents(c, &limits.currency);
    let part = |role: AgentRole| money(cents.get(&role).copied().unwrap_or(0));
    BudgetAllocation {
        accommodation: part(AgentRole::Accommodation),
        transport: part(AgentRole::Transport),
        activities: part(AgentRole::Activities),
        total: money(cents.values().sum()),
        currency: limits.currency.clone(),
        requested: money(limits.requested),
        ceiling: money(limits.ceiling),
        status,
        overage_pct,
        shortfall: money(shortfall),
        rounds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tripweave_core::config::ShareConfig;
    use tripweave_core::traits::Agent;
    use tripweave_core::types::{AgentResult, TravelRequest};
    use tripweave_store::SqliteSessionStore;
    use tripweave_test_utils::{
        context, sample_request, static_tools, MockReasoning, ScriptedResource,
    };

    struct Fixture {
        store: Arc<dyn SessionStore>,
        coordinator: NegotiationCoordinator,
        ctx: AgentContext,
        resources: Vec<Arc<ScriptedResource>>,
    }

    /// Costs per role: the first entry is the proposal, the rest are revisions.
    async fn fixture(
        request: TravelRequest,
        acc: &[f64],
        transport: &[f64],
        activities: &[f64],
    ) -> Fixture {
        fixture_with(NegotiationConfig::default(), request, acc, transport, activities).await
    }

    async fn fixture_with(
        config: NegotiationConfig,
        request: TravelRequest,
        acc: &[f64],
        transport: &[f64],
        activities: &[f64],
    ) -> Fixture {
        let store: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::in_memory().unwrap());
        let sid = store.create(&request).await.unwrap();

        let resources = vec![
            Arc::new(ScriptedResource::new(AgentRole::Accommodation, acc)),
            Arc::new(ScriptedResource::new(AgentRole::Transport, transport)),
            Arc::new(ScriptedResource::new(AgentRole::Activities, activities)),
        ];
        let llm = Arc::new(MockReasoning::fixed("{}"));
        let mut roster = AgentRoster::standard(llm, static_tools());
        for r in &resources {
            roster = roster.with_resource(r.clone()).unwrap();
        }

        let mut ctx = context(request);
        ctx.session_id = sid;
        for r in &resources {
            let role = r.role();
            let output = r.execute(ctx.clone()).await.unwrap();
            ctx.results.insert(
                role,
                AgentResult::succeeded(role, output.payload, output.proposed_cost, 1),
            );
        }

        let coordinator = NegotiationCoordinator::new(
            store.clone(),
            Arc::new(roster),
            static_tools(),
            config,
            Arc::new(EventBus::default()),
        );
        Fixture {
            store,
            coordinator,
            ctx,
            resources,
        }
    }

    #[tokio::test]
    async fn test_accepted_at_round_zero() {
        let f = fixture(sample_request(), &[2200.0], &[1800.0], &[900.0]).await;
        let allocation = f.coordinator.negotiate(&f.ctx).await.unwrap();

        assert_eq!(allocation.status, AllocationStatus::Accepted);
        assert_eq!(allocation.rounds, 1);
        assert_eq!(allocation.total, Money::new(4900.0, "USD"));
        assert_eq!(allocation.ceiling, Money::new(4950.0, "USD"));
        assert!(allocation.total.cents() <= allocation.ceiling.cents());
        assert!((allocation.overage_pct - 8.89).abs() < 0.01);
        assert_eq!(allocation.shortfall.cents(), 0);

        let session = f.store.get(&f.ctx.session_id).await.unwrap();
        for role in NEGOTIATED_ROLES {
            let rounds = &session.negotiations[&role];
            assert_eq!(rounds.len(), 1);
            assert_eq!(rounds[0].verdict, NegotiationVerdict::Accepted);
        }
        assert_eq!(session.allocation, Some(allocation));
        assert!(f.resources.iter().all(|r| r.revisions().is_empty()));
    }

    #[tokio::test]
    async fn test_unresolved_after_three_rounds_scales_to_budget() {
        let f = fixture(
            sample_request(),
            &[3000.0, 2800.0, 2600.0, 2400.0],
            &[2000.0],
            &[1000.0],
        )
        .await;
        let allocation = f.coordinator.negotiate(&f.ctx).await.unwrap();

        assert_eq!(allocation.status, AllocationStatus::RejectedFinal);
        assert_eq!(allocation.rounds, 4);
        assert_eq!(allocation.total, Money::new(4500.0, "USD"));
        assert_eq!(
            allocation.accommodation.cents()
                + allocation.transport.cents()
                + allocation.activities.cents(),
            450000
        );
        assert_eq!(allocation.overage_pct, 0.0);
        assert_eq!(allocation.shortfall, Money::new(900.0, "USD"));
        // 2400/5400 of 4500, plus the cent lost to flooring.
        assert_eq!(allocation.accommodation, Money::new(2000.01, "USD"));
        assert_eq!(allocation.transport, Money::new(1666.66, "USD"));
        assert_eq!(allocation.activities, Money::new(833.33, "USD"));

        // Accommodation is the largest contributor every round.
        let revisions = f.resources[0].revisions();
        assert_eq!(revisions.len(), 3);
        assert_eq!(revisions[0].max_cost, Money::new(2227.5, "USD"));
        assert!(f.resources[1].revisions().is_empty());

        let session = f.store.get(&f.ctx.session_id).await.unwrap();
        let acc = &session.negotiations[&AgentRole::Accommodation];
        assert_eq!(acc.len(), 4);
        assert_eq!(
            acc.iter().map(|r| r.seq).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
        assert_eq!(acc[0].verdict, NegotiationVerdict::ReviseRequested);
        assert_eq!(acc[3].proposed, Money::new(2400.0, "USD"));
        assert_eq!(acc[3].verdict, NegotiationVerdict::RejectedFinal);

        let transport = &session.negotiations[&AgentRole::Transport];
        assert_eq!(transport.len(), 4);
        assert_eq!(transport[0].verdict, NegotiationVerdict::Accepted);
        assert_eq!(transport[3].verdict, NegotiationVerdict::RejectedFinal);
    }

    #[tokio::test]
    async fn test_revision_that_fits_is_accepted() {
        let f = fixture(sample_request(), &[3000.0, 2200.0], &[1700.0], &[990.0]).await;
        let allocation = f.coordinator.negotiate(&f.ctx).await.unwrap();

        assert_eq!(allocation.status, AllocationStatus::Accepted);
        assert_eq!(allocation.rounds, 2);
        assert_eq!(allocation.total, Money::new(4890.0, "USD"));
        assert_eq!(allocation.accommodation, Money::new(2200.0, "USD"));
    }

    #[tokio::test]
    async fn test_tied_roles_revise_together() {
        let mut request = sample_request();
        request.budget = "$3000 USD".into();
        request.budget_flexibility = "strict".into();
        // Equal costs and equal shares tie on both keys.
        let config = NegotiationConfig {
            shares: ShareConfig {
                accommodation: 1.0,
                transport: 1.0,
                activities: 1.0,
            },
            ..NegotiationConfig::default()
        };
        let f = fixture_with(
            config,
            request,
            &[1200.0, 1000.0],
            &[1200.0, 1000.0],
            &[1200.0, 1000.0],
        )
        .await;

        let allocation = f.coordinator.negotiate(&f.ctx).await.unwrap();
        assert_eq!(allocation.status, AllocationStatus::Accepted);
        assert_eq!(allocation.rounds, 2);
        assert_eq!(allocation.total, Money::new(3000.0, "USD"));
        for r in &f.resources {
            let revisions = r.revisions();
            assert_eq!(revisions.len(), 1);
            assert_eq!(revisions[0].max_cost, Money::new(1000.0, "USD"));
        }
    }

    #[tokio::test]
    async fn test_foreign_currency_is_converted_and_audited() {
        let f = fixture(sample_request(), &[2000.0], &[1500.0], &[500.0]).await;
        let mut ctx = f.ctx.clone();
        ctx.results.insert(
            AgentRole::Transport,
            AgentResult::succeeded(
                AgentRole::Transport,
                serde_json::json!({}),
                Some(Money::new(1000.0, "EUR")),
                1,
            ),
        );

        let allocation = f.coordinator.negotiate(&ctx).await.unwrap();
        assert_eq!(allocation.transport, Money::new(1100.0, "USD"));

        let session = f.store.get(&ctx.session_id).await.unwrap();
        assert_eq!(session.conversions.len(), 1);
        assert_eq!(session.conversions[0].from, "EUR");
        assert_eq!(session.conversions[0].provider, "static");
    }

    #[tokio::test]
    async fn test_missing_proposal_fails_budget() {
        let f = fixture(sample_request(), &[2000.0], &[1500.0], &[500.0]).await;
        let mut ctx = f.ctx.clone();
        ctx.results.remove(&AgentRole::Activities);
        let err = f.coordinator.negotiate(&ctx).await.unwrap_err();
        assert!(matches!(
            err,
            TripweaveError::TaskFailed {
                role: AgentRole::Budget,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_raised_revision_keeps_previous_proposal() {
        let f = fixture(sample_request(), &[3000.0, 3500.0], &[2000.0], &[1000.0]).await;
        let allocation = f.coordinator.negotiate(&f.ctx).await.unwrap();

        assert_eq!(allocation.status, AllocationStatus::RejectedFinal);
        assert_eq!(allocation.shortfall, Money::new(1500.0, "USD"));
        let session = f.store.get(&f.ctx.session_id).await.unwrap();
        let acc = &session.negotiations[&AgentRole::Accommodation];
        assert!(acc
            .iter()
            .all(|r| r.proposed == Money::new(3000.0, "USD")));
    }

    fn limits() -> Limits {
        Limits {
            currency: "USD".into(),
            requested: 450000,
            ceiling: 495000,
            targets: BTreeMap::from([
                (AgentRole::Accommodation, 222750),
                (AgentRole::Transport, 173250),
                (AgentRole::Activities, 99000),
            ]),
        }
    }

    #[test]
    fn test_largest_contributor_revises() {
        // Transport is further over its target, accommodation costs more.
        let proposals = BTreeMap::from([
            (AgentRole::Accommodation, 280000),
            (AgentRole::Transport, 225225),
            (AgentRole::Activities, 50000),
        ]);
        assert_eq!(
            select_revisions(&proposals, &limits()),
            vec![AgentRole::Accommodation]
        );
    }

    #[test]
    fn test_equal_cost_breaks_on_absolute_overage() {
        let proposals = BTreeMap::from([
            (AgentRole::Accommodation, 250000),
            (AgentRole::Transport, 250000),
            (AgentRole::Activities, 50000),
        ]);
        assert_eq!(
            select_revisions(&proposals, &limits()),
            vec![AgentRole::Transport]
        );
    }
}
