use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::FundModelError;
use crate::types::*;
use crate::FundModelResult;

const PROBABILITY_TOLERANCE: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Opaque scenario identity. Carried through to outputs, never interpreted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// A positive quantity described by its first two moments. Sampled as a
/// log-normal matched to `mean` and `std_dev`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MomentDistribution {
    pub mean: f64,
    pub std_dev: f64,
}

impl MomentDistribution {
    pub fn new(mean: f64, std_dev: f64) -> Self {
        Self { mean, std_dev }
    }

    fn validate(&self, field: &str) -> FundModelResult<()> {
        if !self.mean.is_finite() || self.mean <= 0.0 {
            return Err(FundModelError::config(
                format!("{field}.mean"),
                "Mean must be positive and finite",
            ));
        }
        if !self.std_dev.is_finite() || self.std_dev < 0.0 {
            return Err(FundModelError::config(
                format!("{field}.std_dev"),
                "Standard deviation must be non-negative and finite",
            ));
        }
        Ok(())
    }
}

/// Terms on which the fund writes an initial check into a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryTerms {
    /// Distribution of the entry round's post-money valuation
    pub post_money: MomentDistribution,
    /// Floor applied to the sampled post-money
    pub min_post_money: Money,
    /// Cap applied to the sampled post-money
    pub max_post_money: Money,
    /// Target ownership bought at entry (check = post-money * ownership)
    pub ownership: Rate,
}

/// One lifecycle stage. Stages are ordered; the last one can only exit,
/// fail, or stay put.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDefinition {
    pub name: String,
    /// Probability of raising the next round at a milestone
    pub success_probability: f64,
    /// Probability of a write-off at a milestone
    pub failure_probability: f64,
    /// Probability of an early exit from this stage at a milestone
    #[serde(default)]
    pub exit_probability: f64,
    /// Years between milestones while in this stage
    pub time_in_stage: MomentDistribution,
    /// Post-money step-up multiple applied when the company advances
    pub step_up: MomentDistribution,
    /// Exit proceeds as a multiple of capital invested
    pub exit_multiple: MomentDistribution,
    /// New money raised in a round out of this stage, as a fraction of its post-money
    pub round_dilution: Rate,
    /// Present when the fund makes initial investments at this stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<EntryTerms>,
}

impl StageDefinition {
    /// Probability that a milestone passes with no event.
    pub fn no_event_probability(&self) -> f64 {
        (1.0 - self.success_probability - self.exit_probability - self.failure_probability)
            .max(0.0)
    }
}

/// Stage weights for new deals from a given fund year onwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageMix {
    /// First fund year (1-based) this mix applies to
    pub from_year: u32,
    /// One weight per stage, in stage order
    pub weights: Vec<f64>,
}

/// Deal flow during the investment period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestmentPacing {
    /// Portfolio slots (maximum number of initial investments)
    pub num_investments: u32,
    /// Maximum new deals closed in any fund year
    pub max_deals_per_year: u32,
    /// Year-indexed stage mix; the latest entry with `from_year <= year` applies
    pub stage_mix: Vec<StageMix>,
}

/// How the fund draws on LP commitments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CapitalCallPolicy {
    /// Equal annual calls at the start of each investment-period year, topped
    /// up on demand when an outlay would otherwise go unfunded.
    Scheduled,
    /// Calls in standard tranches whenever cash would fall below the buffer.
    OnDemand {
        /// Tranche size as a fraction of fund size
        tranche_pct: Rate,
        /// Cash buffer maintained after a call, as a fraction of fund size
        min_cash_buffer_pct: Rate,
    },
}

/// What the annual management fee is charged on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeBasis {
    /// Committed capital during the investment period, cost basis of the
    /// still-active portfolio afterwards
    #[default]
    CommittedThenInvested,
    /// Capital called to date
    CalledCapital,
}

/// Stepped management-fee schedule, charged at the start of each fund year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    #[serde(default)]
    pub basis: FeeBasis,
    pub investment_period_rate: Rate,
    pub post_investment_rate: Rate,
    /// Rate during granted extension years
    pub extension_rate: Rate,
}

/// Follow-on sizing rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FollowOnStrategy {
    /// Every round gets the same fraction of the pro-rata entitlement
    Flat { rate: Rate },
    /// Rate depends on the company's percentile rank by KPI among active peers
    Tiered {
        /// Ranks at or above this are tier 1
        top_cutoff: f64,
        /// Ranks at or above this (and below `top_cutoff`) are tier 2
        bottom_cutoff: f64,
        /// Rates for tiers 1, 2 and 3
        tier_rates: [Rate; 3],
    },
}

/// Cumulative amount the GP catch-up restores carry against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CatchUpBasis {
    /// LP return of capital plus LP preferred return paid
    #[default]
    CapitalAndPreferred,
    /// LP preferred return paid only
    PreferredReturn,
}

/// Contractual distribution terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterfallTerms {
    /// Annual compounding hurdle on unreturned LP capital
    pub preferred_return: Rate,
    /// GP share of profits
    pub carry: Rate,
    /// GP share of cash inside the catch-up tier (1.0 = full catch-up)
    pub catch_up_pct: Rate,
    #[serde(default)]
    pub catch_up_basis: CatchUpBasis,
    /// GP share of every capital call
    pub gp_commitment_pct: Rate,
}

/// Reinvestment of exit proceeds instead of distributing them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RecyclingTerms {
    #[serde(default)]
    pub enabled: bool,
    /// Cap on cumulative recycled proceeds, as a share of commitments
    #[serde(default)]
    pub limit_pct: Rate,
}

impl RecyclingTerms {
    /// Cumulative amount that may be held back from distributions.
    pub fn limit(&self, fund_size: Money) -> Money {
        if self.enabled {
            (fund_size * self.limit_pct).round_dp(MONEY_DP)
        } else {
            Decimal::ZERO
        }
    }
}

/// Complete, immutable configuration of one fund.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    #[serde(default)]
    pub scenario: ScenarioMeta,
    /// Total commitments (LP + GP)
    pub fund_size: Money,
    /// Investment period in years
    pub commitment_period_years: Years,
    /// Base fund term before extensions
    pub fund_life_years: Years,
    /// One-year extension probabilities, drawn in order until one fails
    #[serde(default)]
    pub extension_probabilities: Vec<f64>,
    /// Share of commitments that may be deployed into companies
    pub investable_capital_pct: Rate,
    pub stages: Vec<StageDefinition>,
    pub pacing: InvestmentPacing,
    pub capital_calls: CapitalCallPolicy,
    pub fees: FeeSchedule,
    pub follow_on: FollowOnStrategy,
    pub waterfall: WaterfallTerms,
    #[serde(default)]
    pub recycling: RecyclingTerms,
    /// Companies older than this at a milestone are written off
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_company_life_years: Option<Years>,
}

// ---------------------------------------------------------------------------
// Accessors
// ---------------------------------------------------------------------------

impl ParameterSet {
    /// Capital available for initial and follow-on checks.
    pub fn investable_capital(&self) -> Money {
        (self.fund_size * self.investable_capital_pct).round_dp(MONEY_DP)
    }

    /// Fund horizon once `extensions` one-year extensions have been granted.
    pub fn horizon(&self, extensions: u32) -> Years {
        self.fund_life_years + Decimal::from(extensions)
    }

    /// Stage weights in force during fund year `year` (1-based).
    pub fn stage_mix_for_year(&self, year: u32) -> &[f64] {
        self.pacing
            .stage_mix
            .iter()
            .rev()
            .find(|mix| mix.from_year <= year)
            .or_else(|| self.pacing.stage_mix.first())
            .map(|mix| mix.weights.as_slice())
            .unwrap_or(&[])
    }

    pub fn stage_names(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.name.clone()).collect()
    }

    /// Eagerly check every invariant so that no trial can start on a bad
    /// configuration.
    pub fn validate(&self) -> FundModelResult<()> {
        if self.fund_size <= Decimal::ZERO {
            return Err(FundModelError::config("fund_size", "Fund size must be positive"));
        }
        if self.commitment_period_years <= Decimal::ZERO {
            return Err(FundModelError::config(
                "commitment_period_years",
                "Commitment period must be positive",
            ));
        }
        if self.fund_life_years < self.commitment_period_years {
            return Err(FundModelError::config(
                "fund_life_years",
                "Fund life must be at least the commitment period",
            ));
        }
        for (i, p) in self.extension_probabilities.iter().enumerate() {
            check_probability(*p, &format!("extension_probabilities[{i}]"))?;
        }
        if self.investable_capital_pct <= Decimal::ZERO || self.investable_capital_pct > Decimal::ONE
        {
            return Err(FundModelError::config(
                "investable_capital_pct",
                "Must be in (0, 1]",
            ));
        }
        if let Some(max_life) = self.max_company_life_years {
            if max_life <= Decimal::ZERO {
                return Err(FundModelError::config(
                    "max_company_life_years",
                    "Must be positive when set",
                ));
            }
        }

        self.validate_stages()?;
        self.validate_pacing()?;
        self.validate_capital_calls()?;
        self.validate_fees()?;
        self.follow_on.validate()?;
        self.waterfall.validate()?;
        if self.recycling.limit_pct < Decimal::ZERO {
            return Err(FundModelError::config(
                "recycling.limit_pct",
                "Recycling limit cannot be negative",
            ));
        }
        Ok(())
    }

    fn validate_stages(&self) -> FundModelResult<()> {
        if self.stages.is_empty() {
            return Err(FundModelError::config("stages", "At least one stage is required"));
        }
        for (i, stage) in self.stages.iter().enumerate() {
            let field = format!("stages[{i}]");
            check_probability(stage.success_probability, &format!("{field}.success_probability"))?;
            check_probability(stage.failure_probability, &format!("{field}.failure_probability"))?;
            check_probability(stage.exit_probability, &format!("{field}.exit_probability"))?;
            let total =
                stage.success_probability + stage.failure_probability + stage.exit_probability;
            if total > 1.0 + PROBABILITY_TOLERANCE {
                return Err(FundModelError::config(
                    field,
                    format!("Stage probabilities sum to {total}, must not exceed 1"),
                ));
            }
            stage.time_in_stage.validate(&format!("{field}.time_in_stage"))?;
            stage.step_up.validate(&format!("{field}.step_up"))?;
            stage.exit_multiple.validate(&format!("{field}.exit_multiple"))?;
            if stage.round_dilution < Decimal::ZERO || stage.round_dilution >= Decimal::ONE {
                return Err(FundModelError::config(
                    format!("{field}.round_dilution"),
                    "Must be in [0, 1)",
                ));
            }
            if let Some(entry) = &stage.entry {
                entry.post_money.validate(&format!("{field}.entry.post_money"))?;
                if entry.min_post_money <= Decimal::ZERO
                    || entry.min_post_money > entry.max_post_money
                {
                    return Err(FundModelError::config(
                        format!("{field}.entry"),
                        "Post-money bounds must satisfy 0 < min <= max",
                    ));
                }
                if entry.ownership <= Decimal::ZERO || entry.ownership >= Decimal::ONE {
                    return Err(FundModelError::config(
                        format!("{field}.entry.ownership"),
                        "Must be in (0, 1)",
                    ));
                }
            }
        }
        Ok(())
    }

    fn validate_pacing(&self) -> FundModelResult<()> {
        let pacing = &self.pacing;
        if pacing.num_investments == 0 {
            return Err(FundModelError::config(
                "pacing.num_investments",
                "At least one investment slot is required",
            ));
        }
        if pacing.max_deals_per_year == 0 {
            return Err(FundModelError::config(
                "pacing.max_deals_per_year",
                "Must be at least 1",
            ));
        }
        if pacing.stage_mix.is_empty() {
            return Err(FundModelError::config(
                "pacing.stage_mix",
                "At least one stage mix entry is required",
            ));
        }
        let mut previous_year = None;
        for (i, mix) in pacing.stage_mix.iter().enumerate() {
            let field = format!("pacing.stage_mix[{i}]");
            if previous_year.is_some_and(|prev| mix.from_year <= prev) {
                return Err(FundModelError::config(
                    field,
                    "Entries must have strictly increasing from_year",
                ));
            }
            previous_year = Some(mix.from_year);
            if mix.weights.len() != self.stages.len() {
                return Err(FundModelError::config(
                    field,
                    format!(
                        "Expected {} weights (one per stage), got {}",
                        self.stages.len(),
                        mix.weights.len()
                    ),
                ));
            }
            if mix.weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
                return Err(FundModelError::config(field, "Weights must be non-negative"));
            }
            if mix.weights.iter().sum::<f64>() <= 0.0 {
                return Err(FundModelError::config(field, "Weights must not all be zero"));
            }
            for (stage, weight) in self.stages.iter().zip(&mix.weights) {
                if *weight > 0.0 && stage.entry.is_none() {
                    return Err(FundModelError::config(
                        field,
                        format!("Stage '{}' has weight but no entry terms", stage.name),
                    ));
                }
            }
        }
        Ok(())
    }

    fn validate_capital_calls(&self) -> FundModelResult<()> {
        if let CapitalCallPolicy::OnDemand {
            tranche_pct,
            min_cash_buffer_pct,
        } = &self.capital_calls
        {
            if *tranche_pct <= Decimal::ZERO || *tranche_pct > Decimal::ONE {
                return Err(FundModelError::config(
                    "capital_calls.tranche_pct",
                    "Must be in (0, 1]",
                ));
            }
            if *min_cash_buffer_pct < Decimal::ZERO || *min_cash_buffer_pct >= Decimal::ONE {
                return Err(FundModelError::config(
                    "capital_calls.min_cash_buffer_pct",
                    "Must be in [0, 1)",
                ));
            }
        }
        Ok(())
    }

    fn validate_fees(&self) -> FundModelResult<()> {
        let rates = [
            ("fees.investment_period_rate", self.fees.investment_period_rate),
            ("fees.post_investment_rate", self.fees.post_investment_rate),
            ("fees.extension_rate", self.fees.extension_rate),
        ];
        for (field, rate) in rates {
            if rate < Decimal::ZERO || rate >= Decimal::ONE {
                return Err(FundModelError::config(field, "Fee rate must be in [0, 1)"));
            }
        }
        Ok(())
    }
}

impl FollowOnStrategy {
    pub fn validate(&self) -> FundModelResult<()> {
        match self {
            FollowOnStrategy::Flat { rate } => {
                if *rate < Decimal::ZERO {
                    return Err(FundModelError::config(
                        "follow_on.rate",
                        "Follow-on rate cannot be negative",
                    ));
                }
            }
            FollowOnStrategy::Tiered {
                top_cutoff,
                bottom_cutoff,
                tier_rates,
            } => {
                if !(0.0..1.0).contains(bottom_cutoff)
                    || !(0.0..1.0).contains(top_cutoff)
                    || top_cutoff < bottom_cutoff
                {
                    return Err(FundModelError::config(
                        "follow_on",
                        "Cutoffs must satisfy 0 <= bottom_cutoff <= top_cutoff < 1",
                    ));
                }
                if tier_rates.iter().any(|r| *r < Decimal::ZERO) {
                    return Err(FundModelError::config(
                        "follow_on.tier_rates",
                        "Tier rates cannot be negative",
                    ));
                }
            }
        }
        Ok(())
    }
}

impl WaterfallTerms {
    pub fn validate(&self) -> FundModelResult<()> {
        if self.preferred_return < Decimal::ZERO {
            return Err(FundModelError::config(
                "waterfall.preferred_return",
                "Preferred return cannot be negative",
            ));
        }
        if self.carry < Decimal::ZERO || self.carry >= Decimal::ONE {
            return Err(FundModelError::config("waterfall.carry", "Must be in [0, 1)"));
        }
        if self.catch_up_pct <= Decimal::ZERO || self.catch_up_pct > Decimal::ONE {
            return Err(FundModelError::config(
                "waterfall.catch_up_pct",
                "Must be in (0, 1]",
            ));
        }
        if self.gp_commitment_pct < Decimal::ZERO || self.gp_commitment_pct >= Decimal::ONE {
            return Err(FundModelError::config(
                "waterfall.gp_commitment_pct",
                "Must be in [0, 1)",
            ));
        }
        Ok(())
    }
}

fn check_probability(p: f64, field: &str) -> FundModelResult<()> {
    if !p.is_finite() || !(0.0..=1.0).contains(&p) {
        return Err(FundModelError::config(field, "Probability must be in [0, 1]"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Reference configuration
// ---------------------------------------------------------------------------

impl ParameterSet {
    /// A $100M early-stage fund: seed and Series A entry, tiered follow-ons,
    /// 2/20 economics with an 8% hurdle.
    pub fn reference_fund() -> Self {
        ParameterSet {
            scenario: ScenarioMeta {
                name: "Reference early-stage fund".into(),
                run_date: None,
                notes: None,
            },
            fund_size: dec!(100000000),
            commitment_period_years: dec!(5),
            fund_life_years: dec!(10),
            extension_probabilities: vec![0.5, 0.25],
            investable_capital_pct: dec!(0.82),
            stages: vec![
                StageDefinition {
                    name: "Seed".into(),
                    success_probability: 0.45,
                    failure_probability: 0.35,
                    exit_probability: 0.05,
                    time_in_stage: MomentDistribution::new(1.5, 0.5),
                    step_up: MomentDistribution::new(2.5, 1.0),
                    exit_multiple: MomentDistribution::new(1.5, 1.0),
                    round_dilution: dec!(0.20),
                    entry: Some(EntryTerms {
                        post_money: MomentDistribution::new(12_000_000.0, 4_000_000.0),
                        min_post_money: dec!(5000000),
                        max_post_money: dec!(25000000),
                        ownership: dec!(0.15),
                    }),
                },
                StageDefinition {
                    name: "Series A".into(),
                    success_probability: 0.50,
                    failure_probability: 0.25,
                    exit_probability: 0.08,
                    time_in_stage: MomentDistribution::new(2.0, 0.7),
                    step_up: MomentDistribution::new(2.2, 0.8),
                    exit_multiple: MomentDistribution::new(2.0, 1.5),
                    round_dilution: dec!(0.20),
                    entry: Some(EntryTerms {
                        post_money: MomentDistribution::new(40_000_000.0, 12_000_000.0),
                        min_post_money: dec!(20000000),
                        max_post_money: dec!(80000000),
                        ownership: dec!(0.12),
                    }),
                },
                StageDefinition {
                    name: "Series B".into(),
                    success_probability: 0.55,
                    failure_probability: 0.20,
                    exit_probability: 0.10,
                    time_in_stage: MomentDistribution::new(2.0, 0.7),
                    step_up: MomentDistribution::new(2.0, 0.7),
                    exit_multiple: MomentDistribution::new(2.5, 1.8),
                    round_dilution: dec!(0.15),
                    entry: None,
                },
                StageDefinition {
                    name: "Growth".into(),
                    success_probability: 0.60,
                    failure_probability: 0.15,
                    exit_probability: 0.0,
                    time_in_stage: MomentDistribution::new(2.5, 1.0),
                    step_up: MomentDistribution::new(1.5, 0.5),
                    exit_multiple: MomentDistribution::new(4.0, 3.0),
                    round_dilution: dec!(0.10),
                    entry: None,
                },
            ],
            pacing: InvestmentPacing {
                num_investments: 30,
                max_deals_per_year: 10,
                stage_mix: vec![
                    StageMix {
                        from_year: 1,
                        weights: vec![0.7, 0.3, 0.0, 0.0],
                    },
                    StageMix {
                        from_year: 3,
                        weights: vec![0.4, 0.6, 0.0, 0.0],
                    },
                ],
            },
            capital_calls: CapitalCallPolicy::OnDemand {
                tranche_pct: dec!(0.10),
                min_cash_buffer_pct: dec!(0.025),
            },
            fees: FeeSchedule {
                basis: FeeBasis::CommittedThenInvested,
                investment_period_rate: dec!(0.02),
                post_investment_rate: dec!(0.015),
                extension_rate: dec!(0.01),
            },
            follow_on: FollowOnStrategy::Tiered {
                top_cutoff: 0.7,
                bottom_cutoff: 0.3,
                tier_rates: [dec!(1.0), dec!(0.5), dec!(0.0)],
            },
            waterfall: WaterfallTerms {
                preferred_return: dec!(0.08),
                carry: dec!(0.20),
                catch_up_pct: dec!(1.0),
                catch_up_basis: CatchUpBasis::CapitalAndPreferred,
                gp_commitment_pct: dec!(0.01),
            },
            recycling: RecyclingTerms::default(),
            max_company_life_years: Some(dec!(12)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn expect_config_error(params: &ParameterSet, expected_field: &str) {
        match params.validate() {
            Err(FundModelError::InvalidConfiguration { field, .. }) => {
                assert!(
                    field.starts_with(expected_field),
                    "expected field {expected_field}, got {field}"
                );
            }
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn test_reference_fund_is_valid() {
        ParameterSet::reference_fund().validate().unwrap();
    }

    #[test]
    fn test_probabilities_over_one_rejected() {
        let mut params = ParameterSet::reference_fund();
        params.stages[1].success_probability = 0.8;
        expect_config_error(&params, "stages[1]");
    }

    #[test]
    fn test_probability_out_of_range_rejected() {
        let mut params = ParameterSet::reference_fund();
        params.stages[0].failure_probability = -0.1;
        expect_config_error(&params, "stages[0].failure_probability");
    }

    #[test]
    fn test_no_event_probability_is_remainder() {
        let stage = &ParameterSet::reference_fund().stages[0];
        assert!((stage.no_event_probability() - 0.15).abs() < 1e-12);
    }

    #[test]
    fn test_inverted_cutoffs_rejected() {
        let mut params = ParameterSet::reference_fund();
        params.follow_on = FollowOnStrategy::Tiered {
            top_cutoff: 0.2,
            bottom_cutoff: 0.6,
            tier_rates: [dec!(1), dec!(0.5), dec!(0)],
        };
        expect_config_error(&params, "follow_on");
    }

    #[test]
    fn test_cutoff_of_one_rejected() {
        let mut params = ParameterSet::reference_fund();
        params.follow_on = FollowOnStrategy::Tiered {
            top_cutoff: 1.0,
            bottom_cutoff: 0.3,
            tier_rates: [dec!(1), dec!(0.5), dec!(0)],
        };
        expect_config_error(&params, "follow_on");
    }

    #[test]
    fn test_full_carry_rejected() {
        let mut params = ParameterSet::reference_fund();
        params.waterfall.carry = dec!(1);
        expect_config_error(&params, "waterfall.carry");
    }

    #[test]
    fn test_negative_std_dev_rejected() {
        let mut params = ParameterSet::reference_fund();
        params.stages[2].step_up.std_dev = -1.0;
        expect_config_error(&params, "stages[2].step_up.std_dev");
    }

    #[test]
    fn test_stage_mix_weight_count_must_match() {
        let mut params = ParameterSet::reference_fund();
        params.pacing.stage_mix[0].weights = vec![1.0];
        expect_config_error(&params, "pacing.stage_mix[0]");
    }

    #[test]
    fn test_stage_mix_weight_needs_entry_terms() {
        let mut params = ParameterSet::reference_fund();
        params.pacing.stage_mix[0].weights = vec![0.5, 0.0, 0.5, 0.0];
        expect_config_error(&params, "pacing.stage_mix[0]");
    }

    #[test]
    fn test_life_shorter_than_commitment_rejected() {
        let mut params = ParameterSet::reference_fund();
        params.fund_life_years = dec!(4);
        expect_config_error(&params, "fund_life_years");
    }

    #[test]
    fn test_stage_mix_for_year_uses_latest_applicable_entry() {
        let params = ParameterSet::reference_fund();
        assert_eq!(params.stage_mix_for_year(1), &[0.7, 0.3, 0.0, 0.0]);
        assert_eq!(params.stage_mix_for_year(2), &[0.7, 0.3, 0.0, 0.0]);
        assert_eq!(params.stage_mix_for_year(4), &[0.4, 0.6, 0.0, 0.0]);
    }

    #[test]
    fn test_horizon_adds_extensions() {
        let params = ParameterSet::reference_fund();
        assert_eq!(params.horizon(2), dec!(12));
        assert_eq!(params.investable_capital(), dec!(82000000));
    }

    #[test]
    fn test_negative_recycling_limit_rejected() {
        let mut params = ParameterSet::reference_fund();
        params.recycling = RecyclingTerms {
            enabled: true,
            limit_pct: dec!(-0.1),
        };
        expect_config_error(&params, "recycling.limit_pct");
    }

    #[test]
    fn test_recycling_limit_is_zero_when_disabled() {
        let terms = RecyclingTerms {
            enabled: false,
            limit_pct: dec!(0.2),
        };
        assert_eq!(terms.limit(dec!(100000000)), dec!(0));
        let enabled = RecyclingTerms { enabled: true, ..terms };
        assert_eq!(enabled.limit(dec!(100000000)), dec!(20000000));
    }

    #[test]
    fn test_recycling_defaults_to_disabled_when_omitted() {
        let mut json = serde_json::to_value(ParameterSet::reference_fund()).unwrap();
        json.as_object_mut().unwrap().remove("recycling");
        let back: ParameterSet = serde_json::from_value(json).unwrap();
        assert_eq!(back.recycling, RecyclingTerms::default());
    }

    #[test]
    fn test_json_round_trip_with_defaults() {
        let params = ParameterSet::reference_fund();
        let json = serde_json::to_value(&params).unwrap();
        let back: ParameterSet = serde_json::from_value(json).unwrap();
        assert_eq!(back, params);
    }
}
