use clap::{Args, ValueEnum};
use serde_json::Value;

use vc_fund_core::fund::parameters::ParameterSet;
use vc_fund_core::monte_carlo::outliers::{analyze_outliers, OutlierInput, OutlierMetric};
use vc_fund_core::monte_carlo::runner::McConfig;

use super::monte_carlo::BatchFlags;
use super::{is_request, load_value};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum MetricArg {
    NetMultiple,
    NetIrr,
    GrossMultiple,
}

impl From<MetricArg> for OutlierMetric {
    fn from(m: MetricArg) -> Self {
        match m {
            MetricArg::NetMultiple => OutlierMetric::NetMultiple,
            MetricArg::NetIrr => OutlierMetric::NetIrr,
            MetricArg::GrossMultiple => OutlierMetric::GrossMultiple,
        }
    }
}

/// Arguments for outlier slice analysis
#[derive(Args)]
pub struct OutliersArgs {
    /// Path to a ParameterSet (or OutlierInput) file, JSON or YAML
    #[arg(long)]
    pub input: Option<String>,

    #[command(flatten)]
    pub batch: BatchFlags,

    /// Fraction of ranked trials in each tail slice, in (0, 0.5]
    #[arg(long)]
    pub slice_pct: Option<f64>,

    /// Metric used to rank trials
    #[arg(long, value_enum)]
    pub metric: Option<MetricArg>,
}

pub fn run_outliers(args: OutliersArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let value = load_value(args.input.as_deref(), "outlier analysis")?;
    let mut out_input: OutlierInput = if is_request(&value) {
        serde_json::from_value(value)?
    } else {
        let params: ParameterSet = serde_json::from_value(value)?;
        OutlierInput {
            params,
            config: McConfig::default(),
            slice_pct: 0.1,
            metric: OutlierMetric::default(),
            exit_multiple_edges: vec![1.0, 3.0, 5.0, 10.0],
        }
    };
    args.batch.apply(&mut out_input.config);
    if let Some(pct) = args.slice_pct {
        out_input.slice_pct = pct;
    }
    if let Some(m) = args.metric {
        out_input.metric = m.into();
    }
    let result = analyze_outliers(&out_input)?;
    Ok(serde_json::to_value(result)?)
}
