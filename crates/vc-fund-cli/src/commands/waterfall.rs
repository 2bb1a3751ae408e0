use clap::Args;
use serde_json::Value;

use vc_fund_core::types::MONEY_DP;
use vc_fund_core::waterfall::distribution::{distribute_waterfall, WaterfallInput};

use super::load;

/// Arguments for distributing an explicit cash-flow stream
#[derive(Args)]
pub struct WaterfallArgs {
    /// Path to a WaterfallInput file (events + terms), JSON or YAML
    #[arg(long)]
    pub input: Option<String>,

    /// Report amounts at full decimal precision instead of cents
    #[arg(long)]
    pub exact: bool,
}

pub fn run_waterfall(args: WaterfallArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let wf_input: WaterfallInput = load(args.input.as_deref(), "waterfall distribution")?;
    let mut result = distribute_waterfall(&wf_input)?;
    if !args.exact {
        result.result = result.result.rounded(MONEY_DP);
    }
    Ok(serde_json::to_value(result)?)
}
