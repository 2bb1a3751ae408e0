use clap::Args;
use serde_json::Value;

use vc_fund_core::fund::parameters::ParameterSet;

/// Arguments for printing the reference fund configuration
#[derive(Args)]
pub struct TemplateArgs {
    /// Print YAML instead of going through --output
    #[arg(long)]
    pub yaml: bool,
}

/// Returns None when the template was already printed as YAML.
pub fn run_template(args: TemplateArgs) -> Result<Option<Value>, Box<dyn std::error::Error>> {
    let params = ParameterSet::reference_fund();
    if args.yaml {
        print!("{}", serde_yaml::to_string(&params)?);
        return Ok(None);
    }
    Ok(Some(serde_json::to_value(params)?))
}
