use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::FundModelError;
use crate::fund::events::{fund_year, CashFlowEvent, CashFlowSource};
use crate::fund::parameters::{CatchUpBasis, WaterfallTerms};
use crate::types::*;
use crate::FundModelResult;

// ---------------------------------------------------------------------------
// Input types
// ---------------------------------------------------------------------------

/// Input for distributing an explicit cash-flow stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaterfallInput {
    /// Gross fund cash flows; need not be sorted
    pub events: Vec<CashFlowEvent>,
    pub terms: WaterfallTerms,
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// Running balances folded forward year by year.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WaterfallState {
    pub lp_unreturned: Money,
    pub gp_unreturned: Money,
    /// Accrued, unpaid preferred return owed to LPs
    pub pref_balance: Money,
    pub catch_up_paid: Money,
    pub carry_paid: Money,
    pub lp_roc_paid: Money,
    pub lp_pref_paid: Money,
    /// Called cash not yet spent or distributed
    pub fund_cash: Money,
}

/// One fund year of the distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterfallYear {
    pub year: u32,
    /// Explicit capital calls
    pub capital_called: Money,
    /// Shortfall funded by partners beyond explicit calls
    pub implicit_call: Money,
    pub fees: Money,
    pub investments: Money,
    pub proceeds: Money,
    /// Proceeds held back in fund cash for reinvestment
    pub recycled: Money,
    /// Cash that entered the tiers this year
    pub distributable: Money,
    pub pref_start: Money,
    pub pref_accrued: Money,
    pub pref_paid: Money,
    pub pref_end: Money,
    pub lp_return_of_capital: Money,
    pub gp_return_of_capital: Money,
    pub lp_preferred: Money,
    pub gp_catch_up: Money,
    /// LP share inside a partial catch-up tier
    pub lp_catch_up: Money,
    pub lp_carry_split: Money,
    pub gp_carry: Money,
    pub lp_contribution: Money,
    pub gp_contribution: Money,
    pub lp_distribution: Money,
    pub gp_distribution: Money,
    /// LP distributions less LP contributions
    pub lp_net_cashflow: Money,
    pub lp_unreturned_end: Money,
    pub fund_cash_end: Money,
}

/// Life-of-fund totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WaterfallTotals {
    pub capital_called: Money,
    pub implicit_calls: Money,
    pub fees: Money,
    pub investments: Money,
    pub proceeds: Money,
    pub recycled: Money,
    pub lp_contributed: Money,
    pub gp_contributed: Money,
    pub lp_distributed: Money,
    pub gp_distributed: Money,
    pub total_catch_up: Money,
    /// GP carried interest (catch-up plus carry split)
    pub total_carry: Money,
    pub residual_lp_unreturned: Money,
    pub residual_pref: Money,
}

/// Result of distributing one cash-flow stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionResult {
    /// Net LP cash flow per fund year, year 1 first
    pub net_lp_cashflows: Vec<Money>,
    pub years: Vec<WaterfallYear>,
    pub totals: WaterfallTotals,
    pub final_state: WaterfallState,
}

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

impl WaterfallYear {
    /// Copy with every amount rounded to `dp` places, for display.
    pub fn rounded(&self, dp: u32) -> Self {
        let r = |v: Money| v.round_dp(dp);
        WaterfallYear {
            year: self.year,
            capital_called: r(self.capital_called),
            implicit_call: r(self.implicit_call),
            fees: r(self.fees),
            investments: r(self.investments),
            proceeds: r(self.proceeds),
            recycled: r(self.recycled),
            distributable: r(self.distributable),
            pref_start: r(self.pref_start),
            pref_accrued: r(self.pref_accrued),
            pref_paid: r(self.pref_paid),
            pref_end: r(self.pref_end),
            lp_return_of_capital: r(self.lp_return_of_capital),
            gp_return_of_capital: r(self.gp_return_of_capital),
            lp_preferred: r(self.lp_preferred),
            gp_catch_up: r(self.gp_catch_up),
            lp_catch_up: r(self.lp_catch_up),
            lp_carry_split: r(self.lp_carry_split),
            gp_carry: r(self.gp_carry),
            lp_contribution: r(self.lp_contribution),
            gp_contribution: r(self.gp_contribution),
            lp_distribution: r(self.lp_distribution),
            gp_distribution: r(self.gp_distribution),
            lp_net_cashflow: r(self.lp_net_cashflow),
            lp_unreturned_end: r(self.lp_unreturned_end),
            fund_cash_end: r(self.fund_cash_end),
        }
    }
}

impl WaterfallTotals {
    pub fn rounded(&self, dp: u32) -> Self {
        let r = |v: Money| v.round_dp(dp);
        WaterfallTotals {
            capital_called: r(self.capital_called),
            implicit_calls: r(self.implicit_calls),
            fees: r(self.fees),
            investments: r(self.investments),
            proceeds: r(self.proceeds),
            recycled: r(self.recycled),
            lp_contributed: r(self.lp_contributed),
            gp_contributed: r(self.gp_contributed),
            lp_distributed: r(self.lp_distributed),
            gp_distributed: r(self.gp_distributed),
            total_catch_up: r(self.total_catch_up),
            total_carry: r(self.total_carry),
            residual_lp_unreturned: r(self.residual_lp_unreturned),
            residual_pref: r(self.residual_pref),
        }
    }
}

impl WaterfallState {
    pub fn rounded(&self, dp: u32) -> Self {
        let r = |v: Money| v.round_dp(dp);
        WaterfallState {
            lp_unreturned: r(self.lp_unreturned),
            gp_unreturned: r(self.gp_unreturned),
            pref_balance: r(self.pref_balance),
            catch_up_paid: r(self.catch_up_paid),
            carry_paid: r(self.carry_paid),
            lp_roc_paid: r(self.lp_roc_paid),
            lp_pref_paid: r(self.lp_pref_paid),
            fund_cash: r(self.fund_cash),
        }
    }
}

impl DistributionResult {
    /// Rounded view of the whole result. Balances are computed at full
    /// precision; only the copy is rounded, so totals may differ from the
    /// sum of rounded rows in the last place.
    pub fn rounded(&self, dp: u32) -> Self {
        DistributionResult {
            net_lp_cashflows: self.net_lp_cashflows.iter().map(|v| v.round_dp(dp)).collect(),
            years: self.years.iter().map(|y| y.rounded(dp)).collect(),
            totals: self.totals.rounded(dp),
            final_state: self.final_state.rounded(dp),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct YearFlows {
    calls: Money,
    fees: Money,
    investments: Money,
    proceeds: Money,
    recycled: Money,
}

// ---------------------------------------------------------------------------
// Distribution
// ---------------------------------------------------------------------------

/// Convert a gross cash-flow stream into the LP/GP split, year by year.
///
/// European (whole-fund) waterfall: return of capital (LP first, then GP),
/// compounding preferred return, GP catch-up, then the carry split. Every
/// year from 1 to the last year with activity is processed so the hurdle
/// keeps compounding through quiet years. Cash still held after the final
/// year's outflows is distributed in that year. Nothing is rounded to cents:
/// rate products are carried to [`PRECISION_DP`] places and every other
/// amount is exact. Use [`DistributionResult::rounded`] for display.
pub fn distribute(events: &[CashFlowEvent], terms: &WaterfallTerms) -> DistributionResult {
    let buckets = bucket_by_year(events);
    let final_year = buckets.len() as u32;

    let mut state = WaterfallState::default();
    let mut years = Vec::with_capacity(buckets.len());
    for (i, flows) in buckets.iter().enumerate() {
        let year = i as u32 + 1;
        let (next, row) = distribute_year(state, flows, terms, year, year == final_year);
        state = next;
        years.push(row);
    }

    let totals = years.iter().fold(WaterfallTotals::default(), |mut t, y| {
        t.capital_called += y.capital_called;
        t.implicit_calls += y.implicit_call;
        t.fees += y.fees;
        t.investments += y.investments;
        t.proceeds += y.proceeds;
        t.recycled += y.recycled;
        t.lp_contributed += y.lp_contribution;
        t.gp_contributed += y.gp_contribution;
        t.lp_distributed += y.lp_distribution;
        t.gp_distributed += y.gp_distribution;
        t.total_catch_up += y.gp_catch_up;
        t.total_carry += y.gp_catch_up + y.gp_carry;
        t
    });
    let totals = WaterfallTotals {
        residual_lp_unreturned: state.lp_unreturned,
        residual_pref: state.pref_balance,
        ..totals
    };

    DistributionResult {
        net_lp_cashflows: years.iter().map(|y| y.lp_net_cashflow).collect(),
        years,
        totals,
        final_state: state,
    }
}

fn bucket_by_year(events: &[CashFlowEvent]) -> Vec<YearFlows> {
    let last = events.iter().map(|e| fund_year(e.time)).max().unwrap_or(0);
    let mut buckets = vec![YearFlows::default(); last as usize];
    for e in events {
        let b = &mut buckets[fund_year(e.time) as usize - 1];
        match e.source {
            CashFlowSource::CapitalCall => b.calls -= e.amount,
            CashFlowSource::ManagementFee => b.fees -= e.amount,
            CashFlowSource::Investment { .. } => b.investments -= e.amount,
            CashFlowSource::Exit { .. } => b.proceeds += e.amount,
            CashFlowSource::Recycled { .. } => b.recycled -= e.amount,
        }
    }
    buckets
}

/// Split `amount` between GP (by commitment share) and LP.
fn split_commitment(amount: Money, gp_pct: Rate) -> (Money, Money) {
    let gp = (amount * gp_pct).round_dp(PRECISION_DP);
    (amount - gp, gp)
}

fn distribute_year(
    mut s: WaterfallState,
    flows: &YearFlows,
    terms: &WaterfallTerms,
    year: u32,
    is_final: bool,
) -> (WaterfallState, WaterfallYear) {
    // 1. Hurdle accrues on prior-year balances.
    let pref_start = s.pref_balance;
    let pref_accrued =
        (terms.preferred_return * (s.lp_unreturned + s.pref_balance)).round_dp(PRECISION_DP);
    s.pref_balance += pref_accrued;

    // 2. Contributions and net cash.
    let (lp_call, gp_call) = split_commitment(flows.calls, terms.gp_commitment_pct);
    s.lp_unreturned += lp_call;
    s.gp_unreturned += gp_call;

    // Recycled proceeds never leave the fund; they join called cash.
    let recycled = flows.recycled.min(flows.proceeds).max(Decimal::ZERO);
    let mut available = s.fund_cash + flows.calls + recycled;
    let outflow = flows.fees + flows.investments;
    let mut proceeds = flows.proceeds - recycled;
    let mut implicit_call = Decimal::ZERO;
    if outflow > available {
        let shortfall = outflow - available;
        let from_proceeds = shortfall.min(proceeds);
        proceeds -= from_proceeds;
        implicit_call = shortfall - from_proceeds;
        available = Decimal::ZERO;
    } else {
        available -= outflow;
    }
    let (lp_implicit, gp_implicit) = split_commitment(implicit_call, terms.gp_commitment_pct);
    s.lp_unreturned += lp_implicit;
    s.gp_unreturned += gp_implicit;
    s.fund_cash = available;

    let mut remaining = proceeds;
    if is_final {
        remaining += s.fund_cash;
        s.fund_cash = Decimal::ZERO;
    }
    let distributable = remaining;

    // 3. Return of capital, LP first.
    let lp_roc = remaining.min(s.lp_unreturned);
    remaining -= lp_roc;
    s.lp_unreturned -= lp_roc;
    s.lp_roc_paid += lp_roc;
    let gp_roc = remaining.min(s.gp_unreturned);
    remaining -= gp_roc;
    s.gp_unreturned -= gp_roc;

    // 4. Preferred return.
    let pref_paid = remaining.min(s.pref_balance);
    remaining -= pref_paid;
    s.pref_balance -= pref_paid;
    s.lp_pref_paid += pref_paid;

    // 5. GP catch-up.
    let (gp_catch_up, lp_catch_up) = if remaining > Decimal::ZERO && terms.carry > Decimal::ZERO {
        let base = match terms.catch_up_basis {
            CatchUpBasis::CapitalAndPreferred => s.lp_roc_paid + s.lp_pref_paid,
            CatchUpBasis::PreferredReturn => s.lp_pref_paid,
        };
        let target = (base * terms.carry / (Decimal::ONE - terms.carry)).round_dp(PRECISION_DP);
        let owed = (target - s.catch_up_paid).max(Decimal::ZERO);
        let tier = remaining
            .min((owed / terms.catch_up_pct).round_dp(PRECISION_DP))
            .max(Decimal::ZERO);
        let gp = (tier * terms.catch_up_pct).round_dp(PRECISION_DP).min(owed);
        remaining -= tier;
        (gp, tier - gp)
    } else {
        (Decimal::ZERO, Decimal::ZERO)
    };
    s.catch_up_paid += gp_catch_up;

    // 6. Carry split.
    let gp_carry = (remaining * terms.carry).round_dp(PRECISION_DP);
    let lp_carry_split = remaining - gp_carry;
    s.carry_paid += gp_carry;

    let lp_contribution = lp_call + lp_implicit;
    let gp_contribution = gp_call + gp_implicit;
    let lp_distribution = lp_roc + pref_paid + lp_catch_up + lp_carry_split;
    let gp_distribution = gp_roc + gp_catch_up + gp_carry;

    let row = WaterfallYear {
        year,
        capital_called: flows.calls,
        implicit_call,
        fees: flows.fees,
        investments: flows.investments,
        proceeds: flows.proceeds,
        recycled,
        distributable,
        pref_start,
        pref_accrued,
        pref_paid,
        pref_end: s.pref_balance,
        lp_return_of_capital: lp_roc,
        gp_return_of_capital: gp_roc,
        lp_preferred: pref_paid,
        gp_catch_up,
        lp_catch_up,
        lp_carry_split,
        gp_carry,
        lp_contribution,
        gp_contribution,
        lp_distribution,
        gp_distribution,
        lp_net_cashflow: lp_distribution - lp_contribution,
        lp_unreturned_end: s.lp_unreturned,
        fund_cash_end: s.fund_cash,
    };
    (s, row)
}

/// Distribute an explicit event stream with validation and warnings.
pub fn distribute_waterfall(
    input: &WaterfallInput,
) -> FundModelResult<ComputationOutput<DistributionResult>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    input.terms.validate()?;
    if input.events.is_empty() {
        return Err(FundModelError::InsufficientData(
            "At least one cash flow event is required".into(),
        ));
    }
    for (i, e) in input.events.iter().enumerate() {
        if e.time < Decimal::ZERO {
            return Err(FundModelError::InvalidInput {
                field: format!("events[{i}].time"),
                reason: "Event time cannot be negative".into(),
            });
        }
    }

    let result = distribute(&input.events, &input.terms);

    if result.totals.total_carry.is_zero() && input.terms.carry > Decimal::ZERO {
        warnings.push("Hurdle not cleared: no catch-up or carried interest paid".into());
    }
    if result.totals.implicit_calls > Decimal::ZERO {
        warnings.push(format!(
            "Outflows exceeded called cash; {} funded by implicit calls",
            result.totals.implicit_calls.round_dp(MONEY_DP)
        ));
    }
    if result.totals.residual_lp_unreturned > Decimal::ZERO {
        warnings.push(format!(
            "LP capital not fully returned: {} outstanding",
            result.totals.residual_lp_unreturned.round_dp(MONEY_DP)
        ));
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "European Waterfall (ROC, compounding preferred return, GP catch-up, carry)",
        &serde_json::json!({
            "num_events": input.events.len(),
            "preferred_return": input.terms.preferred_return.to_string(),
            "carry": input.terms.carry.to_string(),
            "catch_up_pct": input.terms.catch_up_pct.to_string(),
            "gp_commitment_pct": input.terms.gp_commitment_pct.to_string(),
            "year_convention": "fund year n covers (n-1, n]; t = 0 is year 1",
        }),
        warnings,
        elapsed,
        result,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn terms(pref: Rate, carry: Rate, gp_pct: Rate) -> WaterfallTerms {
        WaterfallTerms {
            preferred_return: pref,
            carry,
            catch_up_pct: dec!(1),
            catch_up_basis: CatchUpBasis::CapitalAndPreferred,
            gp_commitment_pct: gp_pct,
        }
    }

    fn call(amount: Money, t: Years) -> CashFlowEvent {
        CashFlowEvent::capital_call(amount, t)
    }

    fn invest(amount: Money, t: Years) -> CashFlowEvent {
        CashFlowEvent::investment(0, amount, t)
    }

    fn exit(amount: Money, t: Years) -> CashFlowEvent {
        CashFlowEvent::exit(0, amount, t)
    }

    #[test]
    fn test_simple_return_of_capital_only() {
        let events = vec![call(dec!(100), dec!(0)), invest(dec!(100), dec!(0.5)), exit(dec!(80), dec!(2.5))];
        let r = distribute(&events, &terms(dec!(0.08), dec!(0.2), dec!(0)));
        assert_eq!(r.years.len(), 3);
        assert_eq!(r.totals.lp_distributed, dec!(80));
        assert_eq!(r.totals.total_carry, dec!(0));
        assert_eq!(r.totals.residual_lp_unreturned, dec!(20));
        assert_eq!(r.net_lp_cashflows, vec![dec!(-100), dec!(0), dec!(80)]);
    }

    #[test]
    fn test_full_catch_up_then_split() {
        // 100 in at year 1, 300 out in year 2, no hurdle, 20% carry.
        let events = vec![call(dec!(100), dec!(0)), invest(dec!(100), dec!(0)), exit(dec!(300), dec!(1.5))];
        let r = distribute(&events, &terms(dec!(0), dec!(0.2), dec!(0)));
        let y2 = &r.years[1];
        assert_eq!(y2.lp_return_of_capital, dec!(100));
        assert_eq!(y2.pref_paid, dec!(0));
        // target = 100 * 0.2 / 0.8 = 25
        assert_eq!(y2.gp_catch_up, dec!(25));
        assert_eq!(y2.gp_carry, dec!(35));
        assert_eq!(y2.lp_carry_split, dec!(140));
        assert_eq!(r.totals.gp_distributed, dec!(60));
        assert_eq!(r.totals.lp_distributed, dec!(240));
    }

    #[test]
    fn test_preferred_return_compounds_on_prior_balances() {
        let events = vec![call(dec!(100), dec!(0)), invest(dec!(100), dec!(0)), exit(dec!(1), dec!(2.5))];
        let r = distribute(&events, &terms(dec!(0.10), dec!(0.2), dec!(0)));
        assert_eq!(r.years[0].pref_accrued, dec!(0));
        assert_eq!(r.years[1].pref_accrued, dec!(10));
        assert_eq!(r.years[2].pref_accrued, dec!(11));
        assert_eq!(r.years[2].pref_end, dec!(21));
    }

    #[test]
    fn test_partial_catch_up_pct() {
        let events = vec![call(dec!(100), dec!(0)), invest(dec!(100), dec!(0)), exit(dec!(300), dec!(1.5))];
        let mut t = terms(dec!(0), dec!(0.2), dec!(0));
        t.catch_up_pct = dec!(0.5);
        let r = distribute(&events, &t);
        let y2 = &r.years[1];
        // Catch-up tier of 50 split 25 GP / 25 LP.
        assert_eq!(y2.gp_catch_up, dec!(25));
        assert_eq!(y2.lp_catch_up, dec!(25));
        assert_eq!(y2.gp_carry, dec!(30));
    }

    #[test]
    fn test_preferred_return_basis_catch_up() {
        let events = vec![call(dec!(100), dec!(0)), invest(dec!(100), dec!(0)), exit(dec!(300), dec!(1.5))];
        let mut t = terms(dec!(0.10), dec!(0.2), dec!(0));
        t.catch_up_basis = CatchUpBasis::PreferredReturn;
        let r = distribute(&events, &t);
        let y2 = &r.years[1];
        assert_eq!(y2.pref_paid, dec!(10));
        // 10 * 0.25
        assert_eq!(y2.gp_catch_up, dec!(2.5));
    }

    #[test]
    fn test_gp_commitment_split_and_gp_roc_after_lp() {
        let events = vec![call(dec!(100), dec!(0)), invest(dec!(100), dec!(0)), exit(dec!(99.5), dec!(1.5))];
        let r = distribute(&events, &terms(dec!(0), dec!(0.2), dec!(0.01)));
        assert_eq!(r.years[0].lp_contribution, dec!(99));
        assert_eq!(r.years[0].gp_contribution, dec!(1));
        assert_eq!(r.years[1].lp_return_of_capital, dec!(99));
        assert_eq!(r.years[1].gp_return_of_capital, dec!(0.5));
    }

    #[test]
    fn test_shortfall_covered_by_proceeds_then_implicit_call() {
        let events = vec![
            call(dec!(10), dec!(0)),
            invest(dec!(10), dec!(0)),
            invest(dec!(20), dec!(1.2)),
            exit(dec!(15), dec!(1.5)),
        ];
        let r = distribute(&events, &terms(dec!(0), dec!(0.2), dec!(0)));
        let y2 = &r.years[1];
        assert_eq!(y2.distributable, dec!(0));
        assert_eq!(y2.implicit_call, dec!(5));
        assert_eq!(r.totals.lp_contributed, dec!(15));
    }

    #[test]
    fn test_unspent_cash_released_in_final_year() {
        let events = vec![call(dec!(50), dec!(0)), invest(dec!(30), dec!(0.5)), exit(dec!(10), dec!(3.5))];
        let r = distribute(&events, &terms(dec!(0), dec!(0.2), dec!(0)));
        assert_eq!(r.years[0].fund_cash_end, dec!(20));
        assert_eq!(r.years[3].distributable, dec!(30));
        assert_eq!(r.final_state.fund_cash, dec!(0));
        assert_eq!(r.totals.lp_distributed, dec!(30));
    }

    #[test]
    fn test_zero_carry_when_hurdle_not_cleared() {
        let events = vec![call(dec!(100), dec!(0)), invest(dec!(100), dec!(0)), exit(dec!(107), dec!(1.5))];
        let r = distribute(&events, &terms(dec!(0.08), dec!(0.2), dec!(0)));
        assert_eq!(r.totals.total_catch_up, dec!(0));
        assert_eq!(r.totals.total_carry, dec!(0));
        assert_eq!(r.final_state.pref_balance, dec!(1));
    }

    #[test]
    fn test_balances_keep_sub_cent_precision() {
        let events = vec![
            call(dec!(100.01), dec!(0)),
            call(dec!(0.01), dec!(1.5)),
            exit(dec!(1), dec!(2.5)),
        ];
        let r = distribute(&events, &terms(dec!(0.08), dec!(0.2), dec!(0)));
        // 8% of 100.01, not rounded to 8.00
        assert_eq!(r.years[1].pref_accrued, dec!(8.0008));
        // 8% of (100.02 + 8.0008)
        assert_eq!(r.years[2].pref_accrued, dec!(8.641664));
        assert_eq!(r.years[1].pref_end, dec!(8.0008));

        let split = distribute(&events, &terms(dec!(0.08), dec!(0.2), dec!(0.015)));
        assert_eq!(split.years[0].gp_contribution, dec!(1.50015));
        assert_eq!(split.years[0].lp_contribution, dec!(98.50985));
    }

    #[test]
    fn test_rounded_view_leaves_exact_result_untouched() {
        let events = vec![
            call(dec!(100.01), dec!(0)),
            call(dec!(0.01), dec!(1.5)),
            exit(dec!(1), dec!(2.5)),
        ];
        let r = distribute(&events, &terms(dec!(0.08), dec!(0.2), dec!(0)));
        let shown = r.rounded(MONEY_DP);
        assert_eq!(shown.years[1].pref_accrued, dec!(8.00));
        assert_eq!(shown.years[2].pref_accrued, dec!(8.64));
        assert_eq!(r.years[1].pref_accrued, dec!(8.0008));
        assert_eq!(shown.years.len(), r.years.len());
    }

    #[test]
    fn test_year_end_flows_book_in_closing_year() {
        let events = vec![
            call(dec!(100), dec!(0)),
            invest(dec!(100), dec!(0)),
            call(dec!(50), dec!(1)),
            invest(dec!(50), dec!(1)),
            exit(dec!(200), dec!(2)),
        ];
        let r = distribute(&events, &terms(dec!(0), dec!(0), dec!(0)));
        assert_eq!(r.years.len(), 2);
        assert_eq!(r.years[0].capital_called, dec!(150));
        assert_eq!(r.net_lp_cashflows, vec![dec!(-150), dec!(200)]);
    }

    #[test]
    fn test_recycled_proceeds_fund_later_outflows() {
        let events = vec![
            call(dec!(100), dec!(0)),
            invest(dec!(100), dec!(0.5)),
            exit(dec!(60), dec!(1.5)),
            CashFlowEvent::recycled(0, dec!(20), dec!(1.5)),
            invest(dec!(20), dec!(2.5)),
            exit(dec!(90), dec!(3.5)),
        ];
        let r = distribute(&events, &terms(dec!(0), dec!(0.2), dec!(0)));
        assert_eq!(r.years[1].recycled, dec!(20));
        assert_eq!(r.years[1].distributable, dec!(40));
        assert_eq!(r.years[1].fund_cash_end, dec!(20));
        // The follow-on is paid from recycled cash, not a new call.
        assert_eq!(r.years[2].implicit_call, dec!(0));
        assert_eq!(r.totals.recycled, dec!(20));
        assert_eq!(r.totals.lp_contributed, dec!(100));
        assert_eq!(
            r.totals.lp_distributed + r.totals.gp_distributed,
            dec!(100) + dec!(150) - dec!(120)
        );
    }

    #[test]
    fn test_recycled_amount_capped_at_year_proceeds() {
        let events = vec![
            call(dec!(10), dec!(0)),
            exit(dec!(5), dec!(0.5)),
            CashFlowEvent::recycled(0, dec!(8), dec!(0.5)),
        ];
        let r = distribute(&events, &terms(dec!(0), dec!(0), dec!(0)));
        assert_eq!(r.years[0].recycled, dec!(5));
        assert_eq!(r.totals.lp_distributed, dec!(15));
    }

    #[test]
    fn test_distribute_waterfall_validates_terms() {
        let input = WaterfallInput {
            events: vec![call(dec!(1), dec!(0))],
            terms: terms(dec!(0.08), dec!(1), dec!(0)),
        };
        assert!(matches!(
            distribute_waterfall(&input),
            Err(FundModelError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_distribute_waterfall_rejects_empty_stream() {
        let input = WaterfallInput {
            events: vec![],
            terms: terms(dec!(0.08), dec!(0.2), dec!(0)),
        };
        assert!(matches!(
            distribute_waterfall(&input),
            Err(FundModelError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_distribute_waterfall_warns_on_missed_hurdle() {
        let input = WaterfallInput {
            events: vec![call(dec!(100), dec!(0)), invest(dec!(100), dec!(0)), exit(dec!(90), dec!(2))],
            terms: terms(dec!(0.08), dec!(0.2), dec!(0)),
        };
        let out = distribute_waterfall(&input).unwrap();
        assert!(out.warnings.iter().any(|w| w.contains("Hurdle not cleared")));
        assert!(out.warnings.iter().any(|w| w.contains("not fully returned")));
        assert_eq!(out.metadata.precision, "rust_decimal_128bit");
    }
}
