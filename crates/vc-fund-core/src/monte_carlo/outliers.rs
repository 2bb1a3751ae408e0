use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

use crate::error::FundModelError;
use crate::fund::company::CompanyStatus;
use crate::fund::parameters::ParameterSet;
use crate::monte_carlo::aggregation::percentile_sorted;
use crate::monte_carlo::runner::{batch_warnings, run_batch, McConfig};
use crate::monte_carlo::trial::TrialResult;
use crate::types::*;
use crate::FundModelResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Trial metric used to rank trials.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutlierMetric {
    #[default]
    NetMultiple,
    NetIrr,
    GrossMultiple,
}

impl OutlierMetric {
    pub fn value(&self, trial: &TrialResult) -> Option<f64> {
        match self {
            OutlierMetric::NetMultiple => trial.net_multiple.and_then(|m| m.to_f64()),
            OutlierMetric::NetIrr => trial.net_irr,
            OutlierMetric::GrossMultiple => trial.gross_multiple.and_then(|m| m.to_f64()),
        }
        .filter(|v| v.is_finite())
    }
}

/// Input for outlier analysis of a fresh batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlierInput {
    pub params: ParameterSet,
    #[serde(default)]
    pub config: McConfig,
    /// Fraction of ranked trials in each tail slice
    #[serde(default = "default_slice_pct")]
    pub slice_pct: f64,
    #[serde(default)]
    pub metric: OutlierMetric,
    /// Exit-multiple bucket edges, ascending
    #[serde(default = "default_exit_multiple_edges")]
    pub exit_multiple_edges: Vec<f64>,
}

fn default_slice_pct() -> f64 {
    0.1
}

fn default_exit_multiple_edges() -> Vec<f64> {
    vec![1.0, 3.0, 5.0, 10.0]
}

/// Portfolio profile of one tail slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceProfile {
    pub label: String,
    pub trial_count: usize,
    pub metric_min: f64,
    pub metric_max: f64,
    pub metric_median: f64,
    pub exits: usize,
    pub failures: usize,
    /// Companies still active at the horizon
    pub ongoing: usize,
    /// Failures keyed by the stage the company failed in
    pub failures_by_stage: BTreeMap<String, usize>,
    /// Exits per exit-multiple bucket, in bucket order
    pub exits_by_multiple: Vec<(String, usize)>,
    /// Seeds of the trials in the slice, best first for the top slice
    pub seeds: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierOutput {
    pub metric: OutlierMetric,
    pub slice_pct: f64,
    /// Trials that had a defined metric value
    pub ranked_trials: usize,
    pub excluded_trials: usize,
    pub top: SliceProfile,
    pub bottom: SliceProfile,
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

fn validate_slice(slice_pct: f64, edges: &[f64]) -> FundModelResult<()> {
    if !(slice_pct > 0.0 && slice_pct <= 0.5) {
        return Err(FundModelError::InvalidInput {
            field: "slice_pct".into(),
            reason: "Must be in (0, 0.5]".into(),
        });
    }
    if edges.iter().any(|e| !e.is_finite() || *e < 0.0) {
        return Err(FundModelError::InvalidInput {
            field: "exit_multiple_edges".into(),
            reason: "Edges must be finite and non-negative".into(),
        });
    }
    if edges.windows(2).any(|w| w[0] >= w[1]) {
        return Err(FundModelError::InvalidInput {
            field: "exit_multiple_edges".into(),
            reason: "Edges must be strictly ascending".into(),
        });
    }
    Ok(())
}

/// Bucket labels for `edges`: `<e0`, `e0-e1`, ..., `>=en`.
pub fn bucket_labels(edges: &[f64]) -> Vec<String> {
    if edges.is_empty() {
        return vec!["all".into()];
    }
    let mut labels = Vec::with_capacity(edges.len() + 1);
    labels.push(format!("<{}x", edges[0]));
    for w in edges.windows(2) {
        labels.push(format!("{}x-{}x", w[0], w[1]));
    }
    labels.push(format!(">={}x", edges[edges.len() - 1]));
    labels
}

fn bucket_index(multiple: f64, edges: &[f64]) -> usize {
    edges.iter().take_while(|e| multiple >= **e).count()
}

fn profile(
    label: &str,
    slice: &[(f64, &TrialResult)],
    stage_names: &[String],
    edges: &[f64],
) -> SliceProfile {
    let mut values: Vec<f64> = slice.iter().map(|(v, _)| *v).collect();
    values.sort_by(|a, b| a.total_cmp(b));

    let labels = bucket_labels(edges);
    let mut bucket_counts = vec![0usize; labels.len()];
    let mut failures_by_stage: BTreeMap<String, usize> = BTreeMap::new();
    let (mut exits, mut failures, mut ongoing) = (0, 0, 0);

    for (_, trial) in slice {
        for outcome in &trial.outcomes {
            match outcome.status {
                CompanyStatus::Exited => {
                    exits += 1;
                    let m = outcome.exit_multiple.unwrap_or(0.0);
                    bucket_counts[bucket_index(m, edges)] += 1;
                }
                CompanyStatus::Failed => {
                    failures += 1;
                    let stage = stage_names
                        .get(outcome.final_stage_index)
                        .cloned()
                        .unwrap_or_else(|| outcome.final_stage.clone());
                    *failures_by_stage.entry(stage).or_insert(0) += 1;
                }
                CompanyStatus::Active => ongoing += 1,
            }
        }
    }

    SliceProfile {
        label: label.to_string(),
        trial_count: slice.len(),
        metric_min: values.first().copied().unwrap_or(f64::NAN),
        metric_max: values.last().copied().unwrap_or(f64::NAN),
        metric_median: percentile_sorted(&values, 50.0),
        exits,
        failures,
        ongoing,
        failures_by_stage,
        exits_by_multiple: labels.into_iter().zip(bucket_counts).collect(),
        seeds: slice.iter().map(|(_, t)| t.seed).collect(),
    }
}

/// Rank `trials` by `metric` and profile the top and bottom slices.
/// Trials whose metric is undefined are excluded from the ranking.
pub fn analyze_trials(
    trials: &[TrialResult],
    stage_names: &[String],
    metric: OutlierMetric,
    slice_pct: f64,
    edges: &[f64],
) -> FundModelResult<OutlierOutput> {
    validate_slice(slice_pct, edges)?;

    let mut ranked: Vec<(f64, &TrialResult)> = trials
        .iter()
        .filter_map(|t| metric.value(t).map(|v| (v, t)))
        .collect();
    if ranked.is_empty() {
        return Err(FundModelError::InsufficientData(
            "No trial has a defined value for the outlier metric".into(),
        ));
    }
    // Best first; seed breaks ties so the ranking is reproducible.
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.seed.cmp(&b.1.seed)));

    let n = ranked.len();
    let k = ((n as f64 * slice_pct).ceil() as usize).clamp(1, n);

    let top = profile("top", &ranked[..k], stage_names, edges);
    let mut bottom_slice = ranked[n - k..].to_vec();
    bottom_slice.reverse();
    let bottom = profile("bottom", &bottom_slice, stage_names, edges);

    Ok(OutlierOutput {
        metric,
        slice_pct,
        ranked_trials: n,
        excluded_trials: trials.len() - n,
        top,
        bottom,
    })
}

/// Run a batch with trials retained and profile its best and worst slices.
pub fn analyze_outliers(input: &OutlierInput) -> FundModelResult<ComputationOutput<OutlierOutput>> {
    let start = Instant::now();
    validate_slice(input.slice_pct, &input.exit_multiple_edges)?;

    let config = McConfig {
        retain_trials: true,
        ..input.config.clone()
    };
    let batch = run_batch(&input.params, &config, None)?;
    let mut warnings = batch_warnings(&batch);

    let output = analyze_trials(
        &batch.trials,
        &input.params.stage_names(),
        input.metric,
        input.slice_pct,
        &input.exit_multiple_edges,
    )?;
    if output.excluded_trials > 0 {
        warnings.push(format!(
            "{} trials excluded from ranking (undefined metric)",
            output.excluded_trials
        ));
    }
    if output.top.trial_count as f64 > output.ranked_trials as f64 * input.slice_pct {
        warnings.push("Slice size rounded up to a whole trial".into());
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata_f64(
        "Outlier slice analysis of Monte Carlo trials",
        &serde_json::json!({
            "metric": input.metric,
            "slice_pct": input.slice_pct,
            "num_trials": input.config.num_trials,
            "base_seed": input.config.base_seed,
            "exit_multiple_edges": input.exit_multiple_edges,
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
