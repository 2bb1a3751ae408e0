use clap::Args;
use serde_json::Value;
use std::time::Duration;

use vc_fund_core::fund::parameters::ParameterSet;
use vc_fund_core::monte_carlo::cancellation::CancellationToken;
use vc_fund_core::monte_carlo::runner::{
    run_monte_carlo_with_cancel, McConfig, MonteCarloInput,
};

use super::{is_request, load_value};

/// Batch flags shared by every command that runs trials
#[derive(Args, Clone, Default)]
pub struct BatchFlags {
    /// Number of trials
    #[arg(long)]
    pub trials: Option<u32>,

    /// Base seed; trial i uses base + i
    #[arg(long)]
    pub seed: Option<u64>,

    /// Worker threads (defaults to all cores)
    #[arg(long)]
    pub threads: Option<usize>,
}

impl BatchFlags {
    pub fn apply(&self, config: &mut McConfig) {
        if let Some(n) = self.trials {
            config.num_trials = n;
        }
        if let Some(seed) = self.seed {
            config.base_seed = seed;
        }
        if self.threads.is_some() {
            config.threads = self.threads;
        }
    }
}

/// Arguments for a Monte Carlo batch
#[derive(Args)]
pub struct MonteCarloArgs {
    /// Path to a ParameterSet (or MonteCarloInput) file, JSON or YAML
    #[arg(long)]
    pub input: Option<String>,

    #[command(flatten)]
    pub batch: BatchFlags,

    /// Confidence level for VaR and expected shortfall
    #[arg(long)]
    pub var_confidence: Option<f64>,

    /// Include every trial result in the output
    #[arg(long)]
    pub retain_trials: bool,

    /// Stop after this many seconds and report the completed trials
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

pub fn run_monte_carlo(args: MonteCarloArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let value = load_value(args.input.as_deref(), "Monte Carlo simulation")?;
    let mut mc_input: MonteCarloInput = if is_request(&value) {
        serde_json::from_value(value)?
    } else {
        let params: ParameterSet = serde_json::from_value(value)?;
        MonteCarloInput {
            params,
            config: McConfig::default(),
        }
    };
    args.batch.apply(&mut mc_input.config);
    if let Some(c) = args.var_confidence {
        mc_input.config.var_confidence = c;
    }
    mc_input.config.retain_trials |= args.retain_trials;

    let token = CancellationToken::new();
    if let Some(secs) = args.timeout_secs {
        token.cancel_after(Duration::from_secs(secs));
    }

    let result = run_monte_carlo_with_cancel(&mc_input, Some(&token))?;
    Ok(serde_json::to_value(result)?)
}
