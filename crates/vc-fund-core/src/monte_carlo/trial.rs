use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::fund::company::CompanyOutcome;
use crate::fund::events::{fund_year, CashFlowEvent, CashFlowSource};
use crate::fund::orchestrator::{run_fund, FundRun};
use crate::fund::parameters::ParameterSet;
use crate::time_value::{irr, multiple};
use crate::types::*;
use crate::waterfall::distribution::{distribute, DistributionResult, WaterfallYear};
use crate::FundModelResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Input for simulating a single fund.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationInput {
    pub params: ParameterSet,
    pub seed: u64,
    /// Include the raw event stream and waterfall table in the result
    #[serde(default)]
    pub include_detail: bool,
}

/// Event stream and year-by-year waterfall of one trial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialDetail {
    pub events: Vec<CashFlowEvent>,
    pub waterfall: Vec<WaterfallYear>,
}

/// Outcome of one simulated fund. Undefined metrics are `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialResult {
    pub seed: u64,
    /// Annual IRR of net LP cash flows
    pub net_irr: Option<f64>,
    /// Annual IRR of company-level flows (realized only)
    pub gross_irr: Option<f64>,
    /// LP distributions over LP contributions (DPI)
    pub net_multiple: Option<Multiple>,
    /// Exit proceeds over capital invested
    pub gross_multiple: Option<Multiple>,
    /// Exit proceeds plus residual value over capital invested
    pub gross_tvpi: Option<Multiple>,
    /// Catch-up plus carry paid to the GP
    pub total_carry: Money,
    /// GP carry as a share of total fund profit
    pub carry_share_of_profit: Option<f64>,
    pub lp_contributed: Money,
    pub lp_distributed: Money,
    pub gp_contributed: Money,
    pub gp_distributed: Money,
    /// Net LP cash flow per fund year
    pub net_lp_cashflows: Vec<Money>,
    pub capital_called: Money,
    pub total_invested: Money,
    pub exit_proceeds: Money,
    /// Exit proceeds reinvested instead of distributed
    pub recycled: Money,
    /// Mark-to-model value of open positions; never distributed
    pub residual_value: Money,
    pub capital_constrained: bool,
    pub fund_life: Years,
    pub extensions_granted: u32,
    pub num_investments: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_check: Option<Money>,
    pub outcomes: Vec<CompanyOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<TrialDetail>,
}

impl TrialResult {
    /// Copy with money amounts rounded to `dp` places, for display. Ratios
    /// and IRRs are left as computed.
    pub fn rounded(&self, dp: u32) -> Self {
        let r = |v: Money| v.round_dp(dp);
        TrialResult {
            total_carry: r(self.total_carry),
            lp_contributed: r(self.lp_contributed),
            lp_distributed: r(self.lp_distributed),
            gp_contributed: r(self.gp_contributed),
            gp_distributed: r(self.gp_distributed),
            net_lp_cashflows: self.net_lp_cashflows.iter().map(|v| r(*v)).collect(),
            detail: self.detail.as_ref().map(|d| TrialDetail {
                events: d.events.clone(),
                waterfall: d.waterfall.iter().map(|y| y.rounded(dp)).collect(),
            }),
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Annual company-level flows (investments out, exits in), year 1 first.
pub fn gross_cashflows(events: &[CashFlowEvent]) -> Vec<Money> {
    let last = events
        .iter()
        .filter(|e| e.is_company_flow())
        .map(|e| fund_year(e.time))
        .max()
        .unwrap_or(0);
    let mut flows = vec![Decimal::ZERO; last as usize];
    for e in events.iter().filter(|e| e.is_company_flow()) {
        flows[fund_year(e.time) as usize - 1] += e.amount;
    }
    flows
}

/// Score a finished fund run against its waterfall.
pub fn evaluate_trial(
    params: &ParameterSet,
    seed: u64,
    run: FundRun,
    dist: DistributionResult,
    include_detail: bool,
) -> TrialResult {
    let totals = &dist.totals;
    let exit_proceeds: Money = run
        .events
        .iter()
        .filter(|e| matches!(e.source, CashFlowSource::Exit { .. }))
        .map(|e| e.amount)
        .sum();
    let residual_value = run.residual_value();

    let contributed = totals.lp_contributed + totals.gp_contributed;
    let distributed = totals.lp_distributed + totals.gp_distributed;
    let profit = distributed - contributed;
    let carry_share_of_profit = if profit > Decimal::ZERO {
        (totals.total_carry / profit).to_f64()
    } else {
        None
    };

    let gross_flows = gross_cashflows(&run.events);

    TrialResult {
        seed,
        net_irr: irr(&dist.net_lp_cashflows).ok(),
        gross_irr: irr(&gross_flows).ok(),
        net_multiple: multiple(totals.lp_distributed, totals.lp_contributed).ok(),
        gross_multiple: multiple(exit_proceeds, run.total_invested).ok(),
        gross_tvpi: multiple(exit_proceeds + residual_value, run.total_invested).ok(),
        total_carry: totals.total_carry,
        carry_share_of_profit,
        lp_contributed: totals.lp_contributed,
        lp_distributed: totals.lp_distributed,
        gp_contributed: totals.gp_contributed,
        gp_distributed: totals.gp_distributed,
        net_lp_cashflows: dist.net_lp_cashflows.clone(),
        capital_called: run.total_called,
        total_invested: run.total_invested,
        exit_proceeds,
        recycled: run.total_recycled,
        residual_value,
        capital_constrained: run.capital_constrained,
        fund_life: run.end_time,
        extensions_granted: run.extensions_granted,
        num_investments: run.companies.len(),
        average_check: run.average_check(),
        outcomes: run
            .companies
            .iter()
            .map(|c| c.outcome(&params.stages))
            .collect(),
        detail: if include_detail {
            Some(TrialDetail {
                events: run.events,
                waterfall: dist.years,
            })
        } else {
            None
        },
    }
}

/// Run and score one trial seeded with `seed`. Assumes `params` has been
/// validated; any trial of a batch can be replayed alone through this.
pub fn simulate_trial(
    params: &ParameterSet,
    seed: u64,
    include_detail: bool,
) -> FundModelResult<TrialResult> {
    let mut rng = StdRng::seed_from_u64(seed);
    let run = run_fund(params, &mut rng)?;
    let dist = distribute(&run.events, &params.waterfall);
    Ok(evaluate_trial(params, seed, run, dist, include_detail))
}

/// Validate the configuration and simulate one fund.
pub fn simulate_fund(input: &SimulationInput) -> FundModelResult<ComputationOutput<TrialResult>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    input.params.validate()?;
    let result = simulate_trial(&input.params, input.seed, input.include_detail)?;

    if result.capital_constrained {
        warnings.push("Commitments exhausted: trial truncated after capital constraint".into());
    }
    if result.net_irr.is_none() {
        warnings.push("Net IRR undefined (no sign change or no convergence)".into());
    }
    if result.residual_value > Decimal::ZERO {
        warnings.push(format!(
            "{} of residual value held in open positions at horizon (excluded from IRR)",
            result.residual_value
        ));
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Event-driven VC fund simulation with European waterfall",
        &serde_json::json!({
            "scenario": input.params.scenario.name,
            "seed": input.seed,
            "fund_size": input.params.fund_size.to_string(),
            "num_stages": input.params.stages.len(),
        }),
        warnings,
        elapsed,
        result,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
