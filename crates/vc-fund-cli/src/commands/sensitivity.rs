use clap::Args;
use serde_json::Value;

use vc_fund_core::scenarios::sensitivity::{self, SensitivityInput};

use super::load;
use super::monte_carlo::BatchFlags;

/// Arguments for a one-way sensitivity suite
#[derive(Args)]
pub struct SensitivityArgs {
    /// Path to a SensitivityInput file (params, config, sweeps), JSON or YAML
    #[arg(long)]
    pub input: Option<String>,

    #[command(flatten)]
    pub batch: BatchFlags,
}

pub fn run_sensitivity(args: SensitivityArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut sens_input: SensitivityInput = load(args.input.as_deref(), "sensitivity analysis")?;
    args.batch.apply(&mut sens_input.config);
    let result = sensitivity::run_sensitivity(&sens_input)?;
    Ok(serde_json::to_value(result)?)
}
