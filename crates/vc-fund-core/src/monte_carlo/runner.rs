use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error::FundModelError;
use crate::fund::parameters::ParameterSet;
use crate::monte_carlo::aggregation::{BatchAccumulator, BatchSummary};
use crate::monte_carlo::cancellation::CancellationToken;
use crate::monte_carlo::trial::{simulate_trial, TrialResult};
use crate::types::*;
use crate::FundModelResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Batch settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McConfig {
    #[serde(default = "default_num_trials")]
    pub num_trials: u32,
    /// Trial `i` is seeded with `base_seed + i` (wrapping)
    #[serde(default)]
    pub base_seed: u64,
    /// Confidence level for VaR / expected shortfall
    #[serde(default = "default_var_confidence")]
    pub var_confidence: f64,
    /// Keep every trial result in the output
    #[serde(default)]
    pub retain_trials: bool,
    /// Keep event streams and waterfall tables on retained trials
    #[serde(default)]
    pub detail: bool,
    /// Worker threads; the global pool when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,
}

fn default_num_trials() -> u32 {
    1_000
}

fn default_var_confidence() -> f64 {
    0.95
}

impl Default for McConfig {
    fn default() -> Self {
        McConfig {
            num_trials: default_num_trials(),
            base_seed: 0,
            var_confidence: default_var_confidence(),
            retain_trials: false,
            detail: false,
            threads: None,
        }
    }
}

impl McConfig {
    pub fn validate(&self) -> FundModelResult<()> {
        if self.num_trials == 0 {
            return Err(FundModelError::InvalidInput {
                field: "num_trials".into(),
                reason: "Must be at least 1".into(),
            });
        }
        if !(self.var_confidence > 0.0 && self.var_confidence < 1.0) {
            return Err(FundModelError::InvalidInput {
                field: "var_confidence".into(),
                reason: "Must be in (0, 1)".into(),
            });
        }
        if self.threads == Some(0) {
            return Err(FundModelError::InvalidInput {
                field: "threads".into(),
                reason: "Must be at least 1 when set".into(),
            });
        }
        Ok(())
    }
}

/// Top-level input for a Monte Carlo batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloInput {
    pub params: ParameterSet,
    #[serde(default)]
    pub config: McConfig,
}

/// Output of a Monte Carlo batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloOutput {
    pub scenario: String,
    pub summary: BatchSummary,
    /// True when the batch stopped early; the summary covers completed trials
    pub cancelled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trials: Option<Vec<TrialResult>>,
}

/// Raw result of [`run_batch`].
#[derive(Debug, Clone)]
pub struct BatchRun {
    pub summary: BatchSummary,
    pub trials: Vec<TrialResult>,
    pub cancelled: bool,
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Seed of trial `index` in a batch.
pub fn trial_seed(base_seed: u64, index: u64) -> u64 {
    base_seed.wrapping_add(index)
}

/// Run `config.num_trials` independent trials and reduce them. Trials share
/// the immutable configuration; each owns its portfolio and RNG. The token
/// is polled before every trial.
pub fn run_batch(
    params: &ParameterSet,
    config: &McConfig,
    token: Option<&CancellationToken>,
) -> FundModelResult<BatchRun> {
    params.validate()?;
    config.validate()?;

    let n = config.num_trials as usize;
    let progress_step = (n / 10).max(1);
    let done = AtomicUsize::new(0);
    let retain = config.retain_trials;
    let detail = config.retain_trials && config.detail;

    log::info!(
        "starting batch of {n} trials (scenario '{}', base seed {})",
        params.scenario.name,
        config.base_seed
    );

    let run_one = |i: usize| -> FundModelResult<Option<TrialResult>> {
        if token.is_some_and(|t| t.is_cancelled()) {
            return Ok(None);
        }
        let trial = simulate_trial(params, trial_seed(config.base_seed, i as u64), detail)?;
        let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
        if finished % progress_step == 0 {
            log::info!("{finished}/{n} trials complete");
        }
        Ok(Some(trial))
    };

    let fold = |mut acc: BatchAccumulator,
                trial: FundModelResult<Option<TrialResult>>|
     -> FundModelResult<BatchAccumulator> {
        match trial? {
            Some(t) => acc.push(t),
            None => acc.skip(),
        }
        Ok(acc)
    };

    let reduce = || -> FundModelResult<BatchAccumulator> {
        #[cfg(feature = "parallel")]
        {
            (0..n)
                .into_par_iter()
                .map(run_one)
                .try_fold(|| BatchAccumulator::new(retain), fold)
                .try_reduce(|| BatchAccumulator::new(retain), |a, b| Ok(a.merge(b)))
        }
        #[cfg(not(feature = "parallel"))]
        {
            (0..n)
                .map(run_one)
                .try_fold(BatchAccumulator::new(retain), fold)
        }
    };

    let acc = match config.threads {
        #[cfg(feature = "parallel")]
        Some(threads) => rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| FundModelError::InvalidInput {
                field: "threads".into(),
                reason: format!("Could not build thread pool: {e}"),
            })?
            .install(reduce)?,
        _ => reduce()?,
    };

    let completed = acc.completed();
    let (summary, trials) = acc.finalize(config.var_confidence);
    let cancelled = completed < n;
    if cancelled {
        log::warn!("batch cancelled after {completed}/{n} trials");
    } else {
        log::info!("batch complete: {completed} trials");
    }

    Ok(BatchRun {
        summary,
        trials,
        cancelled,
    })
}

/// Run a Monte Carlo batch to completion.
pub fn run_monte_carlo(
    input: &MonteCarloInput,
) -> FundModelResult<ComputationOutput<MonteCarloOutput>> {
    run_monte_carlo_with_cancel(input, None)
}

/// Run a Monte Carlo batch that stops early once `token` is cancelled.
pub fn run_monte_carlo_with_cancel(
    input: &MonteCarloInput,
    token: Option<&CancellationToken>,
) -> FundModelResult<ComputationOutput<MonteCarloOutput>> {
    let start = Instant::now();
    let batch = run_batch(&input.params, &input.config, token)?;
    let warnings = batch_warnings(&batch);

    let output = MonteCarloOutput {
        scenario: input.params.scenario.name.clone(),
        summary: batch.summary,
        cancelled: batch.cancelled,
        trials: if input.config.retain_trials {
            Some(batch.trials)
        } else {
            None
        },
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata_f64(
        "Monte Carlo VC fund simulation (independent seeded trials, European waterfall)",
        &serde_json::json!({
            "num_trials": input.config.num_trials,
            "base_seed": input.config.base_seed,
            "var_confidence": input.config.var_confidence,
            "fund_size": input.params.fund_size.to_string(),
            "seed_derivation": "base_seed + trial_index (wrapping)",
        }),
        warnings,
        elapsed,
        output,
    ))
}

pub(crate) fn batch_warnings(batch: &BatchRun) -> Vec<String> {
    let mut warnings = Vec::new();
    let s = &batch.summary;
    if batch.cancelled {
        warnings.push(format!(
            "Batch cancelled: statistics cover {} completed trials",
            s.trials_completed
        ));
    }
    if s.capital_constrained_rate > 0.0 {
        warnings.push(format!(
            "{:.1}% of trials ran out of committed capital",
            s.capital_constrained_rate * 100.0
        ));
    }
    if s.degeneracy.total() > 0 {
        warnings.push(format!(
            "Undefined metrics excluded: net IRR {}, gross IRR {}, net multiple {}, gross multiple {}",
            s.degeneracy.net_irr,
            s.degeneracy.gross_irr,
            s.degeneracy.net_multiple,
            s.degeneracy.gross_multiple
        ));
    }
    warnings
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn input(num_trials: u32) -> MonteCarloInput {
        MonteCarloInput {
            params: ParameterSet::reference_fund(),
            config: McConfig {
                num_trials,
                base_seed: 42,
                ..McConfig::default()
            },
        }
    }

    #[test]
    fn test_trial_seed_wraps() {
        assert_eq!(trial_seed(u64::MAX, 1), 0);
        assert_eq!(trial_seed(10, 5), 15);
    }

    #[test]
    fn test_batch_is_reproducible() {
        let a = run_monte_carlo(&input(40)).unwrap();
        let b = run_monte_carlo(&input(40)).unwrap();
        assert_eq!(a.result.summary, b.result.summary);
        assert_eq!(a.result.summary.trials_completed, 40);
        assert!(!a.result.cancelled);
    }

    #[test]
    fn test_thread_count_does_not_change_result() {
        let mut single = input(24);
        single.config.threads = Some(1);
        let mut multi = input(24);
        multi.config.threads = Some(4);
        let a = run_monte_carlo(&single).unwrap();
        let b = run_monte_carlo(&multi).unwrap();
        assert_eq!(a.result.summary, b.result.summary);
    }

    #[test]
    fn test_retained_trial_replays_alone() {
        let mut inp = input(12);
        inp.config.retain_trials = true;
        let out = run_monte_carlo(&inp).unwrap();
        let trials = out.result.trials.unwrap();
        assert_eq!(trials.len(), 12);
        let fifth = &trials[5];
        assert_eq!(fifth.seed, 47);
        let replay = simulate_trial(&inp.params, fifth.seed, false).unwrap();
        assert_eq!(replay.net_lp_cashflows, fifth.net_lp_cashflows);
        assert_eq!(replay.net_irr, fifth.net_irr);
    }

    #[test]
    fn test_cancelled_token_returns_partial_summary() {
        let token = CancellationToken::new();
        token.cancel();
        let out = run_monte_carlo_with_cancel(&input(10), Some(&token)).unwrap();
        assert!(out.result.cancelled);
        assert_eq!(out.result.summary.trials_completed, 0);
        assert_eq!(out.result.summary.trials_skipped, 10);
        assert!(out.result.summary.net_irr.is_none());
        assert!(out.warnings.iter().any(|w| w.contains("cancelled")));
    }

    #[test]
    fn test_invalid_config_rejected_before_trials() {
        let mut inp = input(10);
        inp.params.stages[0].success_probability = 2.0;
        assert!(matches!(
            run_monte_carlo(&inp),
            Err(FundModelError::InvalidConfiguration { .. })
        ));
        assert!(matches!(
            run_monte_carlo(&input(0)),
            Err(FundModelError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_summary_statistics_are_ordered() {
        let out = run_monte_carlo(&input(60)).unwrap();
        let m = out.result.summary.net_multiple.unwrap();
        assert!(m.min <= m.percentiles.p5);
        assert!(m.percentiles.p5 <= m.median);
        assert!(m.median <= m.percentiles.p95);
        assert!(m.percentiles.p95 <= m.max);
        assert!(m.expected_shortfall <= m.value_at_risk);
        assert_eq!(out.metadata.precision, "ieee754_f64");
    }
}
