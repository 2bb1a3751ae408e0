use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::error::FundModelError;
use crate::fund::company::{Company, CompanyId, FinancingRound};
use crate::fund::distributions::{sample_moment, to_money, to_years, uniform};
use crate::fund::events::{fund_year, CashFlowEvent, CashFlowSource};
use crate::fund::follow_on::{decide_followon, PortfolioSnapshot};
use crate::fund::lifecycle::{advance, draw_time_in_stage, MilestoneOutcome};
use crate::fund::parameters::{CapitalCallPolicy, FeeBasis, ParameterSet};
use crate::types::*;
use crate::FundModelResult;

/// Latest start of the first deal, in years.
const FIRST_DEAL_WINDOW: f64 = 0.5;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum FundEventKind {
    ScheduledCall(u32),
    Fee(u32),
    ConsiderInvestment,
    Milestone(CompanyId),
}

/// Heap entry. Ordered by time, then insertion sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct ScheduledEvent {
    time: Years,
    seq: u64,
    kind: FundEventKind,
}

/// Everything one simulated fund produced, before distribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundRun {
    /// Chronological gross cash-flow stream
    pub events: Vec<CashFlowEvent>,
    pub companies: Vec<Company>,
    pub extensions_granted: u32,
    /// Horizon after extensions
    pub horizon: Years,
    /// When the fund stopped: the horizon, or an earlier wind-down date
    pub end_time: Years,
    pub wound_down_early: bool,
    pub capital_constrained: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constrained_at: Option<Years>,
    pub total_called: Money,
    pub total_fees: Money,
    pub total_invested: Money,
    /// Sum of initial checks
    pub initial_invested: Money,
    /// Exit proceeds kept in the fund instead of distributed
    pub total_recycled: Money,
    /// Called or recycled but never spent; released to partners in the
    /// final year
    pub undeployed_cash: Money,
}

impl FundRun {
    /// Mark-to-model value of companies still open at the end.
    pub fn residual_value(&self) -> Money {
        self.companies.iter().map(|c| c.residual_value()).sum()
    }

    pub fn average_check(&self) -> Option<Money> {
        if self.companies.is_empty() {
            None
        } else {
            Some((self.initial_invested / Decimal::from(self.companies.len())).round_dp(MONEY_DP))
        }
    }
}

/// Mutable state of one trial while its event queue drains.
struct FundState<'a> {
    params: &'a ParameterSet,
    queue: BinaryHeap<Reverse<ScheduledEvent>>,
    seq: u64,
    events: Vec<CashFlowEvent>,
    companies: Vec<Company>,
    deals_by_year: Vec<u32>,
    cash: Money,
    called: Money,
    fees: Money,
    invested: Money,
    initial_invested: Money,
    recycled: Money,
    constrained_at: Option<Years>,
}

// ---------------------------------------------------------------------------
// Orchestration
// ---------------------------------------------------------------------------

/// Simulate one fund from inception to horizon (or wind-down).
///
/// Deterministic for a given `rng` state. The configuration is expected to
/// have passed [`ParameterSet::validate`].
pub fn run_fund(params: &ParameterSet, rng: &mut StdRng) -> FundModelResult<FundRun> {
    let mut extensions_granted = 0u32;
    for p in &params.extension_probabilities {
        if uniform(rng) < *p {
            extensions_granted += 1;
        } else {
            break;
        }
    }
    let horizon = params.horizon(extensions_granted);

    let mut state = FundState {
        params,
        queue: BinaryHeap::new(),
        seq: 0,
        events: Vec::new(),
        companies: Vec::new(),
        deals_by_year: Vec::new(),
        cash: Decimal::ZERO,
        called: Decimal::ZERO,
        fees: Decimal::ZERO,
        invested: Decimal::ZERO,
        initial_invested: Decimal::ZERO,
        recycled: Decimal::ZERO,
        constrained_at: None,
    };

    // Installments fall on inception and each anniversary. An anniversary
    // call funds the coming year but books in the year just closed.
    if params.capital_calls == CapitalCallPolicy::Scheduled {
        for k in 0..ceil_years(params.commitment_period_years) {
            state.schedule(Decimal::from(k), FundEventKind::ScheduledCall(k));
        }
    }
    // Fees are paid in arrears at each year end, the last one at the horizon.
    for year in 1..=ceil_years(horizon) {
        state.schedule(Decimal::from(year).min(horizon), FundEventKind::Fee(year));
    }
    let first_deal = to_years(FIRST_DEAL_WINDOW * uniform(rng), "first_deal")?;
    state.schedule(first_deal, FundEventKind::ConsiderInvestment);

    let mut end_time = horizon;
    let mut wound_down_early = false;

    while let Some(Reverse(next)) = state.queue.pop() {
        if next.time > horizon {
            break;
        }
        let now = next.time;
        match next.kind {
            FundEventKind::ScheduledCall(k) => state.scheduled_call(k, now),
            FundEventKind::Fee(year) => {
                if Decimal::from(year - 1) >= params.commitment_period_years
                    && !state.companies.iter().any(|c| c.is_active())
                {
                    log::debug!("fund wound down at t={now}: no active companies");
                    end_time = now;
                    wound_down_early = true;
                    break;
                }
                state.charge_fee(year, now, horizon);
            }
            FundEventKind::ConsiderInvestment => state.consider_investment(now, rng)?,
            FundEventKind::Milestone(id) => state.milestone(id, now, rng)?,
        }
    }

    Ok(FundRun {
        extensions_granted,
        horizon,
        end_time,
        wound_down_early,
        capital_constrained: state.constrained_at.is_some(),
        constrained_at: state.constrained_at,
        total_called: state.called,
        total_fees: state.fees,
        total_invested: state.invested,
        initial_invested: state.initial_invested,
        total_recycled: state.recycled,
        undeployed_cash: state.cash,
        events: state.events,
        companies: state.companies,
    })
}

impl FundState<'_> {
    fn schedule(&mut self, time: Years, kind: FundEventKind) {
        self.queue.push(Reverse(ScheduledEvent {
            time,
            seq: self.seq,
            kind,
        }));
        self.seq += 1;
    }

    fn is_constrained(&self) -> bool {
        self.constrained_at.is_some()
    }

    fn mark_constrained(&mut self, now: Years, need: Money) {
        if self.constrained_at.is_none() {
            log::debug!(
                "capital constrained at t={now}: needed {need}, uncalled {}",
                self.params.fund_size - self.called
            );
            self.constrained_at = Some(now);
        }
    }

    fn call(&mut self, amount: Money, now: Years) {
        self.cash += amount;
        self.called += amount;
        self.events.push(CashFlowEvent::capital_call(amount, now));
    }

    fn scheduled_call(&mut self, k: u32, now: Years) {
        if self.is_constrained() {
            return;
        }
        let n = ceil_years(self.params.commitment_period_years);
        let installment = (self.params.fund_size / Decimal::from(n)).round_dp(MONEY_DP);
        let remaining = self.params.fund_size - self.called;
        let amount = if k + 1 == n {
            remaining
        } else {
            installment.min(remaining)
        };
        if amount > Decimal::ZERO {
            self.call(amount, now);
        }
    }

    /// Make sure `need` is in the bank, calling capital if the policy allows.
    /// Returns false (and flags the trial) when commitments cannot cover it.
    fn ensure_cash(&mut self, need: Money, now: Years) -> bool {
        if self.is_constrained() {
            return false;
        }
        if self.cash >= need {
            return true;
        }
        let shortfall = need - self.cash;
        let uncalled = self.params.fund_size - self.called;
        if uncalled < shortfall {
            self.mark_constrained(now, need);
            return false;
        }
        let amount = match &self.params.capital_calls {
            CapitalCallPolicy::Scheduled => shortfall,
            CapitalCallPolicy::OnDemand {
                tranche_pct,
                min_cash_buffer_pct,
            } => {
                let tranche = (self.params.fund_size * tranche_pct).round_dp(MONEY_DP);
                let buffer = (self.params.fund_size * min_cash_buffer_pct).round_dp(MONEY_DP);
                let tranches = ((shortfall + buffer) / tranche).ceil();
                (tranches * tranche).min(uncalled)
            }
        };
        self.call(amount, now);
        true
    }

    /// Fee for fund year `year`, charged at its close. Rate and basis follow
    /// the period the year started in.
    fn charge_fee(&mut self, year: u32, now: Years, horizon: Years) {
        if self.is_constrained() {
            return;
        }
        let params = self.params;
        let year_start = Decimal::from(year - 1);
        let rate = if year_start < params.commitment_period_years {
            params.fees.investment_period_rate
        } else if year_start < params.fund_life_years {
            params.fees.post_investment_rate
        } else {
            params.fees.extension_rate
        };
        let base = match params.fees.basis {
            FeeBasis::CalledCapital => self.called,
            FeeBasis::CommittedThenInvested if year_start < params.commitment_period_years => {
                params.fund_size
            }
            FeeBasis::CommittedThenInvested => self
                .companies
                .iter()
                .filter(|c| c.is_active())
                .map(|c| c.invested)
                .sum(),
        };
        // A partial final year is charged pro rata.
        let fraction = (horizon - year_start).min(Decimal::ONE);
        let fee = (rate * base * fraction).round_dp(MONEY_DP);
        if fee <= Decimal::ZERO {
            return;
        }
        if !self.ensure_cash(fee, now) {
            return;
        }
        self.cash -= fee;
        self.fees += fee;
        self.events.push(CashFlowEvent::management_fee(fee, now));
    }

    fn consider_investment(&mut self, now: Years, rng: &mut StdRng) -> FundModelResult<()> {
        let params = self.params;
        if self.is_constrained() || now >= params.commitment_period_years {
            return Ok(());
        }

        let year = fund_year(now) as usize;
        if self.deals_by_year.len() < year {
            self.deals_by_year.resize(year, 0);
        }
        let slots_left = self.companies.len() < params.pacing.num_investments as usize;
        let year_has_room = self.deals_by_year[year - 1] < params.pacing.max_deals_per_year;

        if slots_left && year_has_room {
            self.make_investment(now, year as u32, rng)?;
        }

        if !self.is_constrained() {
            let spacing = (0.5 + uniform(rng)) / f64::from(params.pacing.max_deals_per_year);
            let next = now + to_years(spacing, "deal_spacing")?;
            self.schedule(next, FundEventKind::ConsiderInvestment);
        }
        Ok(())
    }

    fn make_investment(&mut self, now: Years, year: u32, rng: &mut StdRng) -> FundModelResult<()> {
        let params = self.params;
        let weights = params.stage_mix_for_year(year);
        let picker = WeightedIndex::new(weights).map_err(|e| FundModelError::InvalidConfiguration {
            field: "pacing.stage_mix".into(),
            reason: format!("Invalid stage weights: {e}"),
        })?;
        let stage_idx = picker.sample(rng);
        let stage = &params.stages[stage_idx];
        let entry = stage.entry.as_ref().ok_or_else(|| {
            FundModelError::config(
                "pacing.stage_mix",
                format!("Stage '{}' has no entry terms", stage.name),
            )
        })?;

        let sampled = sample_moment(rng, &entry.post_money, "entry.post_money")?;
        let post_money = to_money(sampled, "entry.post_money")?
            .max(entry.min_post_money)
            .min(entry.max_post_money);
        let check = (post_money * entry.ownership).round_dp(MONEY_DP);

        if self.invested + check > params.investable_capital() {
            return Ok(());
        }
        if !self.ensure_cash(check, now) {
            return Ok(());
        }

        let id = self.companies.len();
        self.cash -= check;
        self.invested += check;
        self.initial_invested += check;
        self.deals_by_year[year as usize - 1] += 1;
        self.events.push(CashFlowEvent::investment(id, check, now));
        self.companies
            .push(Company::new(id, stage_idx, now, check, entry.ownership, post_money));

        let first_milestone = now + draw_time_in_stage(stage, rng)?;
        self.schedule(first_milestone, FundEventKind::Milestone(id));
        Ok(())
    }

    fn milestone(&mut self, id: CompanyId, now: Years, rng: &mut StdRng) -> FundModelResult<()> {
        let params = self.params;
        if !self.companies[id].is_active() {
            return Ok(());
        }
        let step = advance(
            &self.companies[id],
            &params.stages,
            params.max_company_life_years,
            now,
            rng,
        )?;
        self.companies[id] = step.company;

        if let MilestoneOutcome::Advanced(round) = &step.outcome {
            let amount = self.follow_on_amount(id, round, now);
            if amount > Decimal::ZERO {
                self.cash -= amount;
                self.invested += amount;
                self.events.push(CashFlowEvent::investment(id, amount, now));
            }
            self.companies[id].participate(round, amount);
        }
        for event in step.events {
            let exit = match event.source {
                CashFlowSource::Exit { .. } => Some((event.amount, event.time)),
                _ => None,
            };
            self.events.push(event);
            if let Some((proceeds, at)) = exit {
                self.recycle(id, proceeds, at);
            }
        }

        if let Some(t) = step.next_milestone {
            self.schedule(t, FundEventKind::Milestone(id));
        }
        Ok(())
    }

    /// Hold back up to the remaining recycling allowance from an exit.
    fn recycle(&mut self, id: CompanyId, proceeds: Money, now: Years) {
        let limit = self.params.recycling.limit(self.params.fund_size);
        let amount = proceeds.min(limit - self.recycled).max(Decimal::ZERO);
        if amount <= Decimal::ZERO {
            return;
        }
        self.cash += amount;
        self.recycled += amount;
        self.events.push(CashFlowEvent::recycled(id, amount, now));
        log::debug!("recycled {amount} of {proceeds} from company {id} at t={now}");
    }

    /// Amount the fund puts into `round`, already funded from cash. Zero is
    /// a pass.
    fn follow_on_amount(&mut self, id: CompanyId, round: &FinancingRound, now: Years) -> Money {
        let company = &self.companies[id];
        if !company.supported || self.is_constrained() {
            return Decimal::ZERO;
        }
        let params = self.params;
        let round_size = company.pro_rata(round);
        let snapshot = PortfolioSnapshot::at(&self.companies, id, now);
        let decision = decide_followon(&snapshot, id, round_size, &params.follow_on);
        let budget_left = (params.investable_capital() - self.invested).max(Decimal::ZERO);
        let amount = decision.amount.min(round.new_money).min(budget_left);
        if amount <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        if !self.ensure_cash(amount, now) {
            return Decimal::ZERO;
        }
        amount
    }
}

fn ceil_years(years: Years) -> u32 {
    years.ceil().to_u32().unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
