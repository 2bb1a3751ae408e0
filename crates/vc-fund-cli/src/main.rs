mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;

use commands::monte_carlo::MonteCarloArgs;
use commands::outliers::OutliersArgs;
use commands::sensitivity::SensitivityArgs;
use commands::simulate::SimulateArgs;
use commands::template::TemplateArgs;
use commands::waterfall::WaterfallArgs;

/// Monte Carlo venture fund simulation
#[derive(Parser)]
#[command(
    name = "vcfund",
    version,
    about = "Monte Carlo venture fund simulation and LP/GP waterfall analysis",
    long_about = "Simulates venture fund portfolios company by company (stage progression, \
                  follow-on reserves, capital calls, fees) and distributes the resulting \
                  cash flows through a European waterfall. Runs single seeded trials, \
                  parallel Monte Carlo batches, sensitivity sweeps and outlier analysis."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate one fund with a fixed seed
    Simulate(SimulateArgs),
    /// Run a Monte Carlo batch of independent trials
    MonteCarlo(MonteCarloArgs),
    /// Distribute an explicit cash-flow stream through the waterfall
    Waterfall(WaterfallArgs),
    /// Rerun the batch across parameter sweeps
    Sensitivity(SensitivityArgs),
    /// Profile the best and worst trials of a batch
    Outliers(OutliersArgs),
    /// Print the reference fund configuration
    Template(TemplateArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Simulate(args) => commands::simulate::run_simulate(args),
        Commands::MonteCarlo(args) => commands::monte_carlo::run_monte_carlo(args),
        Commands::Waterfall(args) => commands::waterfall::run_waterfall(args),
        Commands::Sensitivity(args) => commands::sensitivity::run_sensitivity(args),
        Commands::Outliers(args) => commands::outliers::run_outliers(args),
        Commands::Template(args) => match commands::template::run_template(args) {
            Ok(Some(value)) => Ok(value),
            Ok(None) => return,
            Err(e) => Err(e),
        },
        Commands::Version => {
            println!("vcfund {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
