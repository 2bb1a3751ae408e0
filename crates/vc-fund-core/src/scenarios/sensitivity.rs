use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::FundModelError;
use crate::fund::parameters::{FollowOnStrategy, ParameterSet};
use crate::monte_carlo::aggregation::BatchSummary;
use crate::monte_carlo::runner::{run_batch, McConfig};
use crate::types::*;
use crate::FundModelResult;

const MAX_SWEEP_POINTS: usize = 500;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A ParameterSet field a sweep can vary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name")]
pub enum SensitivityParameter {
    FundSize,
    PreferredReturn,
    CarriedInterest,
    GpCommitment,
    InvestmentPeriodFeeRate,
    /// Flat follow-on rate. For a tiered strategy an absolute value sets the
    /// tier 1 rate and a multiplicative value scales every tier.
    FollowOnRate,
    NumInvestments,
    InvestableCapitalPct,
    StageSuccessProbability { stage: usize },
    StageFailureProbability { stage: usize },
    StepUpMean { stage: usize },
    ExitMultipleMean { stage: usize },
    TimeInStageMean { stage: usize },
}

/// How sweep values are applied to the base value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SweepMode {
    /// Values replace the field
    #[default]
    Absolute,
    /// Values multiply the base field
    Multiplicative,
}

/// Candidate values of a sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepValues {
    List(Vec<Decimal>),
    /// From `min` to `max` (inclusive) in steps of `step`
    Range {
        min: Decimal,
        max: Decimal,
        step: Decimal,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivitySweep {
    pub parameter: SensitivityParameter,
    #[serde(default)]
    pub mode: SweepMode,
    pub values: SweepValues,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityInput {
    pub params: ParameterSet,
    #[serde(default)]
    pub config: McConfig,
    pub sweeps: Vec<SensitivitySweep>,
}

/// Headline batch statistics tracked along a curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeStats {
    pub trials_completed: usize,
    pub median_net_irr: Option<f64>,
    pub median_net_multiple: Option<f64>,
    pub mean_net_multiple: Option<f64>,
    pub median_gross_multiple: Option<f64>,
    pub probability_of_capital_loss: f64,
    pub capital_constrained_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityPoint {
    /// Sweep value as given
    pub value: Decimal,
    /// Field value the batch ran with
    pub applied_value: Decimal,
    #[serde(flatten)]
    pub stats: OutcomeStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityCurve {
    pub parameter: SensitivityParameter,
    pub field: String,
    pub mode: SweepMode,
    pub base_value: Decimal,
    pub points: Vec<SensitivityPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityOutput {
    pub scenario: String,
    pub base_case: OutcomeStats,
    pub curves: Vec<SensitivityCurve>,
}

// ---------------------------------------------------------------------------
// Parameter access
// ---------------------------------------------------------------------------

fn to_f64(value: Decimal, field: &str) -> FundModelResult<f64> {
    value.to_f64().ok_or_else(|| FundModelError::InvalidInput {
        field: field.to_string(),
        reason: format!("{value} is not representable as f64"),
    })
}

fn from_f64(value: f64, field: &str) -> FundModelResult<Decimal> {
    Decimal::from_f64(value).ok_or_else(|| FundModelError::InvalidInput {
        field: field.to_string(),
        reason: format!("{value} is not representable as a decimal"),
    })
}

impl SensitivityParameter {
    /// Dotted path of the field within a ParameterSet.
    pub fn field(&self) -> String {
        match self {
            SensitivityParameter::FundSize => "fund_size".into(),
            SensitivityParameter::PreferredReturn => "waterfall.preferred_return".into(),
            SensitivityParameter::CarriedInterest => "waterfall.carry".into(),
            SensitivityParameter::GpCommitment => "waterfall.gp_commitment_pct".into(),
            SensitivityParameter::InvestmentPeriodFeeRate => "fees.investment_period_rate".into(),
            SensitivityParameter::FollowOnRate => "follow_on".into(),
            SensitivityParameter::NumInvestments => "pacing.num_investments".into(),
            SensitivityParameter::InvestableCapitalPct => "investable_capital_pct".into(),
            SensitivityParameter::StageSuccessProbability { stage } => {
                format!("stages[{stage}].success_probability")
            }
            SensitivityParameter::StageFailureProbability { stage } => {
                format!("stages[{stage}].failure_probability")
            }
            SensitivityParameter::StepUpMean { stage } => format!("stages[{stage}].step_up.mean"),
            SensitivityParameter::ExitMultipleMean { stage } => {
                format!("stages[{stage}].exit_multiple.mean")
            }
            SensitivityParameter::TimeInStageMean { stage } => {
                format!("stages[{stage}].time_in_stage.mean")
            }
        }
    }

    fn stage_index(&self, params: &ParameterSet) -> FundModelResult<Option<usize>> {
        let stage = match self {
            SensitivityParameter::StageSuccessProbability { stage }
            | SensitivityParameter::StageFailureProbability { stage }
            | SensitivityParameter::StepUpMean { stage }
            | SensitivityParameter::ExitMultipleMean { stage }
            | SensitivityParameter::TimeInStageMean { stage } => *stage,
            _ => return Ok(None),
        };
        if stage >= params.stages.len() {
            return Err(FundModelError::InvalidInput {
                field: self.field(),
                reason: format!("Stage index out of range ({} stages)", params.stages.len()),
            });
        }
        Ok(Some(stage))
    }

    /// Current value of the field in `params`.
    pub fn base_value(&self, params: &ParameterSet) -> FundModelResult<Decimal> {
        let field = self.field();
        let stage = self.stage_index(params)?.unwrap_or(0);
        match self {
            SensitivityParameter::FundSize => Ok(params.fund_size),
            SensitivityParameter::PreferredReturn => Ok(params.waterfall.preferred_return),
            SensitivityParameter::CarriedInterest => Ok(params.waterfall.carry),
            SensitivityParameter::GpCommitment => Ok(params.waterfall.gp_commitment_pct),
            SensitivityParameter::InvestmentPeriodFeeRate => Ok(params.fees.investment_period_rate),
            SensitivityParameter::FollowOnRate => Ok(match &params.follow_on {
                FollowOnStrategy::Flat { rate } => *rate,
                FollowOnStrategy::Tiered { tier_rates, .. } => tier_rates[0],
            }),
            SensitivityParameter::NumInvestments => Ok(Decimal::from(params.pacing.num_investments)),
            SensitivityParameter::InvestableCapitalPct => Ok(params.investable_capital_pct),
            SensitivityParameter::StageSuccessProbability { .. } => {
                from_f64(params.stages[stage].success_probability, &field)
            }
            SensitivityParameter::StageFailureProbability { .. } => {
                from_f64(params.stages[stage].failure_probability, &field)
            }
            SensitivityParameter::StepUpMean { .. } => {
                from_f64(params.stages[stage].step_up.mean, &field)
            }
            SensitivityParameter::ExitMultipleMean { .. } => {
                from_f64(params.stages[stage].exit_multiple.mean, &field)
            }
            SensitivityParameter::TimeInStageMean { .. } => {
                from_f64(params.stages[stage].time_in_stage.mean, &field)
            }
        }
    }

    /// Copy of `params` with the field set from `value` under `mode`.
    /// Returns the substituted set and the value actually applied.
    pub fn apply(
        &self,
        params: &ParameterSet,
        mode: SweepMode,
        value: Decimal,
    ) -> FundModelResult<(ParameterSet, Decimal)> {
        let field = self.field();
        let base = self.base_value(params)?;
        let applied = match mode {
            SweepMode::Absolute => value,
            SweepMode::Multiplicative => base * value,
        };
        let stage = self.stage_index(params)?.unwrap_or(0);
        let mut p = params.clone();

        match self {
            SensitivityParameter::FundSize => p.fund_size = applied.round_dp(MONEY_DP),
            SensitivityParameter::PreferredReturn => p.waterfall.preferred_return = applied,
            SensitivityParameter::CarriedInterest => p.waterfall.carry = applied,
            SensitivityParameter::GpCommitment => p.waterfall.gp_commitment_pct = applied,
            SensitivityParameter::InvestmentPeriodFeeRate => p.fees.investment_period_rate = applied,
            SensitivityParameter::FollowOnRate => match &mut p.follow_on {
                FollowOnStrategy::Flat { rate } => *rate = applied,
                FollowOnStrategy::Tiered { tier_rates, .. } => match mode {
                    SweepMode::Absolute => tier_rates[0] = applied,
                    SweepMode::Multiplicative => {
                        for r in tier_rates.iter_mut() {
                            *r *= value;
                        }
                    }
                },
            },
            SensitivityParameter::NumInvestments => {
                if applied.fract() != Decimal::ZERO {
                    return Err(FundModelError::InvalidInput {
                        field,
                        reason: format!("{applied} is not a whole number of investments"),
                    });
                }
                p.pacing.num_investments =
                    applied.to_u32().ok_or_else(|| FundModelError::InvalidInput {
                        field: field.clone(),
                        reason: format!("{applied} is out of range"),
                    })?;
            }
            SensitivityParameter::InvestableCapitalPct => p.investable_capital_pct = applied,
            SensitivityParameter::StageSuccessProbability { .. } => {
                p.stages[stage].success_probability = to_f64(applied, &field)?
            }
            SensitivityParameter::StageFailureProbability { .. } => {
                p.stages[stage].failure_probability = to_f64(applied, &field)?
            }
            SensitivityParameter::StepUpMean { .. } => {
                p.stages[stage].step_up.mean = to_f64(applied, &field)?
            }
            SensitivityParameter::ExitMultipleMean { .. } => {
                p.stages[stage].exit_multiple.mean = to_f64(applied, &field)?
            }
            SensitivityParameter::TimeInStageMean { .. } => {
                p.stages[stage].time_in_stage.mean = to_f64(applied, &field)?
            }
        }
        Ok((p, applied))
    }
}

// ---------------------------------------------------------------------------
// Sweeps
// ---------------------------------------------------------------------------

/// Expand sweep values. Ranges run from min to max with step, and always
/// include max.
pub fn generate_sweep_values(values: &SweepValues, field: &str) -> FundModelResult<Vec<Decimal>> {
    let out = match values {
        SweepValues::List(list) => {
            if list.is_empty() {
                return Err(FundModelError::InvalidInput {
                    field: field.to_string(),
                    reason: "At least one sweep value is required".into(),
                });
            }
            list.clone()
        }
        SweepValues::Range { min, max, step } => {
            if *step <= Decimal::ZERO {
                return Err(FundModelError::InvalidInput {
                    field: field.to_string(),
                    reason: "Step must be positive".into(),
                });
            }
            if min > max {
                return Err(FundModelError::InvalidInput {
                    field: field.to_string(),
                    reason: "Min must be <= max".into(),
                });
            }
            let mut out = Vec::new();
            let mut current = *min;
            while current <= *max && out.len() <= MAX_SWEEP_POINTS {
                out.push(current);
                current += *step;
            }
            if let Some(&last) = out.last() {
                if last < *max {
                    out.push(*max);
                }
            }
            out
        }
    };
    if out.len() > MAX_SWEEP_POINTS {
        return Err(FundModelError::InvalidInput {
            field: field.to_string(),
            reason: format!("Sweep has more than {MAX_SWEEP_POINTS} points"),
        });
    }
    Ok(out)
}

fn stats(summary: &BatchSummary) -> OutcomeStats {
    OutcomeStats {
        trials_completed: summary.trials_completed,
        median_net_irr: summary.net_irr.as_ref().map(|m| m.median),
        median_net_multiple: summary.net_multiple.as_ref().map(|m| m.median),
        mean_net_multiple: summary.net_multiple.as_ref().map(|m| m.mean),
        median_gross_multiple: summary.gross_multiple.as_ref().map(|m| m.median),
        probability_of_capital_loss: summary.probability_of_capital_loss,
        capital_constrained_rate: summary.capital_constrained_rate,
    }
}

struct PreparedSweep {
    sweep: SensitivitySweep,
    base_value: Decimal,
    runs: Vec<(Decimal, Decimal, ParameterSet)>,
}

/// Validate every substituted ParameterSet before any batch runs.
fn prepare(input: &SensitivityInput) -> FundModelResult<Vec<PreparedSweep>> {
    let mut prepared = Vec::with_capacity(input.sweeps.len());
    for sweep in &input.sweeps {
        let field = sweep.parameter.field();
        let base_value = sweep.parameter.base_value(&input.params)?;
        let mut runs = Vec::new();
        for value in generate_sweep_values(&sweep.values, &field)? {
            let (params, applied) = sweep.parameter.apply(&input.params, sweep.mode, value)?;
            params.validate()?;
            runs.push((value, applied, params));
        }
        prepared.push(PreparedSweep {
            sweep: sweep.clone(),
            base_value,
            runs,
        });
    }
    Ok(prepared)
}

/// Rerun the batch for every sweep value with the same seeds, so curves
/// differ only through the varied field.
pub fn run_sensitivity(
    input: &SensitivityInput,
) -> FundModelResult<ComputationOutput<SensitivityOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if input.sweeps.is_empty() {
        return Err(FundModelError::InvalidInput {
            field: "sweeps".into(),
            reason: "At least one sweep is required".into(),
        });
    }
    input.params.validate()?;
    input.config.validate()?;
    let prepared = prepare(input)?;

    let config = McConfig {
        retain_trials: false,
        detail: false,
        ..input.config.clone()
    };

    let base = run_batch(&input.params, &config, None)?;
    let base_case = stats(&base.summary);

    let mut curves = Vec::with_capacity(prepared.len());
    for prep in prepared {
        let field = prep.sweep.parameter.field();
        log::info!("sensitivity sweep over {field}: {} points", prep.runs.len());
        let mut points = Vec::with_capacity(prep.runs.len());
        for (value, applied, params) in &prep.runs {
            let batch = run_batch(params, &config, None)?;
            if batch.summary.net_multiple.is_none() {
                warnings.push(format!("{field} = {applied}: no trial had a defined net multiple"));
            }
            points.push(SensitivityPoint {
                value: *value,
                applied_value: *applied,
                stats: stats(&batch.summary),
            });
        }
        curves.push(SensitivityCurve {
            parameter: prep.sweep.parameter,
            field,
            mode: prep.sweep.mode,
            base_value: prep.base_value,
            points,
        });
    }

    let output = SensitivityOutput {
        scenario: input.params.scenario.name.clone(),
        base_case,
        curves,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata_f64(
        "One-way sensitivity of Monte Carlo fund outcomes (common random numbers)",
        &serde_json::json!({
            "num_trials_per_point": input.config.num_trials,
            "base_seed": input.config.base_seed,
            "sweeps": input.sweeps.iter().map(|s| s.parameter.field()).collect::<Vec<_>>(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
