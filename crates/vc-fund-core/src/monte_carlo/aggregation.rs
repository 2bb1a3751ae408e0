use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::monte_carlo::trial::TrialResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Percentile summary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct McPercentiles {
    pub p5: f64,
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
}

/// A single histogram bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: u32,
    pub frequency: f64,
}

/// Distribution of one metric across trials where it was defined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub percentiles: McPercentiles,
    /// Value at the (1 - confidence) percentile
    pub value_at_risk: f64,
    /// Mean of values at or below the VaR threshold
    pub expected_shortfall: f64,
}

/// Trials whose metric was undefined, per metric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegeneracyCounts {
    pub net_irr: usize,
    pub gross_irr: usize,
    pub net_multiple: usize,
    pub gross_multiple: usize,
    pub carry_share: usize,
}

impl DegeneracyCounts {
    pub fn total(&self) -> usize {
        self.net_irr + self.gross_irr + self.net_multiple + self.gross_multiple + self.carry_share
    }

    fn merge(self, other: Self) -> Self {
        DegeneracyCounts {
            net_irr: self.net_irr + other.net_irr,
            gross_irr: self.gross_irr + other.gross_irr,
            net_multiple: self.net_multiple + other.net_multiple,
            gross_multiple: self.gross_multiple + other.gross_multiple,
            carry_share: self.carry_share + other.carry_share,
        }
    }
}

/// Cross-trial statistics for one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub trials_completed: usize,
    pub trials_skipped: usize,
    pub var_confidence: f64,
    pub net_irr: Option<MetricSummary>,
    pub gross_irr: Option<MetricSummary>,
    pub net_multiple: Option<MetricSummary>,
    pub gross_multiple: Option<MetricSummary>,
    pub gross_tvpi: Option<MetricSummary>,
    pub total_carry: Option<MetricSummary>,
    pub net_multiple_histogram: Vec<HistogramBin>,
    /// Share of trials returning LPs less than they contributed
    pub probability_of_capital_loss: f64,
    pub capital_constrained_rate: f64,
    pub average_extensions: f64,
    pub degeneracy: DegeneracyCounts,
}

// ---------------------------------------------------------------------------
// Accumulator
// ---------------------------------------------------------------------------

/// Associative, commutative reduction over trial results. Keeps raw metric
/// values and integer counts; all statistics are computed after sorting in
/// [`BatchAccumulator::finalize`], so merge order cannot change the output.
#[derive(Debug, Clone, Default)]
pub struct BatchAccumulator {
    net_irr: Vec<f64>,
    gross_irr: Vec<f64>,
    net_multiple: Vec<f64>,
    gross_multiple: Vec<f64>,
    gross_tvpi: Vec<f64>,
    total_carry: Vec<f64>,
    completed: usize,
    skipped: usize,
    capital_constrained: usize,
    capital_loss: usize,
    extensions: u64,
    degeneracy: DegeneracyCounts,
    retain: bool,
    retained: Vec<TrialResult>,
}

impl BatchAccumulator {
    /// `retain` keeps every pushed trial for later inspection.
    pub fn new(retain: bool) -> Self {
        Self {
            retain,
            ..Self::default()
        }
    }

    pub fn push(&mut self, trial: TrialResult) {
        self.completed += 1;
        if trial.capital_constrained {
            self.capital_constrained += 1;
        }
        self.extensions += u64::from(trial.extensions_granted);

        record(&mut self.net_irr, &mut self.degeneracy.net_irr, trial.net_irr);
        record(&mut self.gross_irr, &mut self.degeneracy.gross_irr, trial.gross_irr);

        let net_multiple = trial.net_multiple.and_then(|m| m.to_f64());
        if net_multiple.is_some_and(|m| m < 1.0) {
            self.capital_loss += 1;
        }
        record(&mut self.net_multiple, &mut self.degeneracy.net_multiple, net_multiple);
        record(
            &mut self.gross_multiple,
            &mut self.degeneracy.gross_multiple,
            trial.gross_multiple.and_then(|m| m.to_f64()),
        );
        if let Some(tvpi) = trial.gross_tvpi.and_then(|m| m.to_f64()) {
            self.gross_tvpi.push(tvpi);
        }
        if trial.carry_share_of_profit.is_none() {
            self.degeneracy.carry_share += 1;
        }
        if let Some(carry) = trial.total_carry.to_f64() {
            self.total_carry.push(carry);
        }

        if self.retain {
            self.retained.push(trial);
        }
    }

    /// Count a trial that was not run (cancelled batch).
    pub fn skip(&mut self) {
        self.skipped += 1;
    }

    pub fn merge(mut self, other: Self) -> Self {
        self.net_irr.extend(other.net_irr);
        self.gross_irr.extend(other.gross_irr);
        self.net_multiple.extend(other.net_multiple);
        self.gross_multiple.extend(other.gross_multiple);
        self.gross_tvpi.extend(other.gross_tvpi);
        self.total_carry.extend(other.total_carry);
        self.completed += other.completed;
        self.skipped += other.skipped;
        self.capital_constrained += other.capital_constrained;
        self.capital_loss += other.capital_loss;
        self.extensions += other.extensions;
        self.degeneracy = self.degeneracy.merge(other.degeneracy);
        self.retain |= other.retain;
        self.retained.extend(other.retained);
        self
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Compute statistics. Retained trials come back ordered by seed.
    pub fn finalize(mut self, var_confidence: f64) -> (BatchSummary, Vec<TrialResult>) {
        let n = self.completed;
        let rate = |count: usize| if n == 0 { 0.0 } else { count as f64 / n as f64 };

        sort_values(&mut self.net_multiple);
        let net_multiple_histogram = if self.net_multiple.is_empty() {
            Vec::new()
        } else {
            build_histogram(&self.net_multiple, 20)
        };

        let summary = BatchSummary {
            trials_completed: n,
            trials_skipped: self.skipped,
            var_confidence,
            net_irr: summarize(&mut self.net_irr, var_confidence),
            gross_irr: summarize(&mut self.gross_irr, var_confidence),
            net_multiple: summarize(&mut self.net_multiple, var_confidence),
            gross_multiple: summarize(&mut self.gross_multiple, var_confidence),
            gross_tvpi: summarize(&mut self.gross_tvpi, var_confidence),
            total_carry: summarize(&mut self.total_carry, var_confidence),
            net_multiple_histogram,
            probability_of_capital_loss: rate(self.capital_loss),
            capital_constrained_rate: rate(self.capital_constrained),
            average_extensions: if n == 0 {
                0.0
            } else {
                self.extensions as f64 / n as f64
            },
            degeneracy: self.degeneracy,
        };

        self.retained.sort_by_key(|t| t.seed);
        (summary, self.retained)
    }
}

fn record(values: &mut Vec<f64>, undefined: &mut usize, value: Option<f64>) {
    match value {
        Some(v) if v.is_finite() => values.push(v),
        _ => *undefined += 1,
    }
}

// ---------------------------------------------------------------------------
// Statistics helpers
// ---------------------------------------------------------------------------

fn sort_values(values: &mut [f64]) {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
}

/// Compute the percentile value from a **sorted** slice using linear
/// interpolation. `p` is in percent.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = rank - lower as f64;
        sorted[lower] * (1.0 - frac) + sorted[upper] * frac
    }
}

/// Build a histogram with `num_bins` equal-width bins over a **sorted**,
/// non-empty slice.
pub fn build_histogram(sorted: &[f64], num_bins: usize) -> Vec<HistogramBin> {
    let min_val = sorted[0];
    let max_val = sorted[sorted.len() - 1];

    // All values identical
    if (max_val - min_val).abs() < f64::EPSILON {
        return vec![HistogramBin {
            lower: min_val,
            upper: max_val,
            count: sorted.len() as u32,
            frequency: 1.0,
        }];
    }

    let bin_width = (max_val - min_val) / num_bins as f64;
    let n = sorted.len() as f64;

    let mut bins: Vec<HistogramBin> = (0..num_bins)
        .map(|i| HistogramBin {
            lower: min_val + i as f64 * bin_width,
            upper: if i == num_bins - 1 {
                max_val
            } else {
                min_val + (i + 1) as f64 * bin_width
            },
            count: 0,
            frequency: 0.0,
        })
        .collect();

    for &val in sorted {
        let idx = (((val - min_val) / bin_width).floor() as usize).min(num_bins - 1);
        bins[idx].count += 1;
    }
    for bin in &mut bins {
        bin.frequency = bin.count as f64 / n;
    }
    bins
}

/// Sort `values` in place and summarize them. `None` when empty.
pub fn summarize(values: &mut [f64], var_confidence: f64) -> Option<MetricSummary> {
    if values.is_empty() {
        return None;
    }
    sort_values(values);
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

    let value_at_risk = percentile_sorted(values, (1.0 - var_confidence) * 100.0);
    let tail: Vec<f64> = values
        .iter()
        .copied()
        .take_while(|v| *v <= value_at_risk)
        .collect();
    let expected_shortfall = if tail.is_empty() {
        values[0]
    } else {
        tail.iter().sum::<f64>() / tail.len() as f64
    };

    Some(MetricSummary {
        count: values.len(),
        mean,
        median: percentile_sorted(values, 50.0),
        std_dev: variance.sqrt(),
        min: values[0],
        max: values[values.len() - 1],
        percentiles: McPercentiles {
            p5: percentile_sorted(values, 5.0),
            p10: percentile_sorted(values, 10.0),
            p25: percentile_sorted(values, 25.0),
            p50: percentile_sorted(values, 50.0),
            p75: percentile_sorted(values, 75.0),
            p90: percentile_sorted(values, 90.0),
            p95: percentile_sorted(values, 95.0),
        },
        value_at_risk,
        expected_shortfall,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn trial(seed: u64, net_irr: Option<f64>, net_multiple: Option<Decimal>) -> TrialResult {
        TrialResult {
            seed,
            net_irr,
            gross_irr: Some(0.1),
            net_multiple,
            gross_multiple: Some(dec!(2)),
            gross_tvpi: Some(dec!(2.5)),
            total_carry: dec!(0),
            carry_share_of_profit: None,
            lp_contributed: dec!(100),
            lp_distributed: dec!(100),
            gp_contributed: dec!(1),
            gp_distributed: dec!(1),
            net_lp_cashflows: vec![],
            capital_called: dec!(101),
            total_invested: dec!(90),
            exit_proceeds: dec!(180),
            recycled: dec!(0),
            residual_value: dec!(0),
            capital_constrained: seed % 2 == 0,
            fund_life: dec!(10),
            extensions_granted: 1,
            num_investments: 10,
            average_check: Some(dec!(9)),
            outcomes: vec![],
            detail: None,
        }
    }

    #[test]
    fn test_percentile_interpolation() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile_sorted(&sorted, 50.0), 3.0);
        assert_eq!(percentile_sorted(&sorted, 25.0), 2.0);
        assert!((percentile_sorted(&sorted, 10.0) - 1.4).abs() < 1e-12);
    }

    #[test]
    fn test_var_and_expected_shortfall() {
        let mut values: Vec<f64> = (1..=100).map(f64::from).collect();
        let s = summarize(&mut values, 0.95).unwrap();
        assert!((s.value_at_risk - 5.95).abs() < 1e-9);
        assert!((s.expected_shortfall - 3.0).abs() < 1e-9);
        assert_eq!(s.median, 50.5);
    }

    #[test]
    fn test_histogram_counts_all_values() {
        let sorted: Vec<f64> = (0..1000).map(|i| i as f64 / 10.0).collect();
        let bins = build_histogram(&sorted, 20);
        assert_eq!(bins.len(), 20);
        assert_eq!(bins.iter().map(|b| b.count).sum::<u32>(), 1000);
        let freq: f64 = bins.iter().map(|b| b.frequency).sum();
        assert!((freq - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_metrics_are_counted_not_summarized() {
        let mut acc = BatchAccumulator::new(false);
        acc.push(trial(1, Some(0.12), Some(dec!(1.5))));
        acc.push(trial(2, None, None));
        acc.push(trial(3, Some(f64::NAN), Some(dec!(0.8))));
        let (summary, retained) = acc.finalize(0.95);
        assert!(retained.is_empty());
        assert_eq!(summary.trials_completed, 3);
        assert_eq!(summary.net_irr.as_ref().unwrap().count, 1);
        assert_eq!(summary.degeneracy.net_irr, 2);
        assert_eq!(summary.degeneracy.net_multiple, 1);
        assert_eq!(summary.degeneracy.carry_share, 3);
        assert!((summary.probability_of_capital_loss - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_merge_order_does_not_change_summary() {
        let trials: Vec<TrialResult> = (0..40)
            .map(|i| {
                trial(
                    i,
                    Some(0.01 * i as f64 - 0.1),
                    Some(Decimal::from(i) / dec!(10)),
                )
            })
            .collect();

        let mut forward = BatchAccumulator::new(true);
        for t in trials.iter().cloned() {
            forward.push(t);
        }

        let mut a = BatchAccumulator::new(true);
        let mut b = BatchAccumulator::new(true);
        for (i, t) in trials.iter().cloned().enumerate().rev() {
            if i % 3 == 0 {
                a.push(t);
            } else {
                b.push(t);
            }
        }
        let (s1, r1) = forward.finalize(0.95);
        let (s2, r2) = b.merge(a).finalize(0.95);
        assert_eq!(s1, s2);
        assert_eq!(
            r1.iter().map(|t| t.seed).collect::<Vec<_>>(),
            r2.iter().map(|t| t.seed).collect::<Vec<_>>()
        );
        assert!((s1.capital_constrained_rate - 0.5).abs() < 1e-12);
    }
}
