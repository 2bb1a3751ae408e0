use clap::Args;
use serde_json::Value;

use vc_fund_core::fund::parameters::ParameterSet;
use vc_fund_core::monte_carlo::trial::{simulate_fund, SimulationInput};
use vc_fund_core::types::MONEY_DP;

use super::{is_request, load_value};

/// Arguments for a single seeded fund simulation
#[derive(Args)]
pub struct SimulateArgs {
    /// Path to a ParameterSet (or SimulationInput) file, JSON or YAML
    #[arg(long)]
    pub input: Option<String>,

    /// Trial seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Include the event stream and year-by-year waterfall
    #[arg(long)]
    pub detail: bool,

    /// Report amounts at full decimal precision instead of cents
    #[arg(long)]
    pub exact: bool,
}

pub fn run_simulate(args: SimulateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let value = load_value(args.input.as_deref(), "fund simulation")?;
    let mut sim_input: SimulationInput = if is_request(&value) {
        serde_json::from_value(value)?
    } else {
        let params: ParameterSet = serde_json::from_value(value)?;
        SimulationInput {
            params,
            seed: 0,
            include_detail: false,
        }
    };
    if let Some(seed) = args.seed {
        sim_input.seed = seed;
    }
    sim_input.include_detail |= args.detail;

    let mut result = simulate_fund(&sim_input)?;
    if !args.exact {
        result.result = result.result.rounded(MONEY_DP);
    }
    Ok(serde_json::to_value(result)?)
}
