use napi::Result as NapiResult;
use napi_derive::napi;

use vc_fund_core::fund::parameters::ParameterSet;
use vc_fund_core::monte_carlo::{outliers, runner, trial};
use vc_fund_core::scenarios::sensitivity;
use vc_fund_core::waterfall::distribution;

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

#[napi]
pub fn simulate_fund(input_json: String) -> NapiResult<String> {
    let input: trial::SimulationInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = trial::simulate_fund(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn run_monte_carlo(input_json: String) -> NapiResult<String> {
    let input: runner::MonteCarloInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = runner::run_monte_carlo(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Waterfall
// ---------------------------------------------------------------------------

#[napi]
pub fn distribute_waterfall(input_json: String) -> NapiResult<String> {
    let input: distribution::WaterfallInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = distribution::distribute_waterfall(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Analytics
// ---------------------------------------------------------------------------

#[napi]
pub fn run_sensitivity(input_json: String) -> NapiResult<String> {
    let input: sensitivity::SensitivityInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = sensitivity::run_sensitivity(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn analyze_outliers(input_json: String) -> NapiResult<String> {
    let input: outliers::OutlierInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = outliers::analyze_outliers(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[napi]
pub fn reference_parameters() -> NapiResult<String> {
    serde_json::to_string(&ParameterSet::reference_fund()).map_err(to_napi_error)
}

#[napi]
pub fn validate_parameters(params_json: String) -> NapiResult<bool> {
    let params: ParameterSet = serde_json::from_str(&params_json).map_err(to_napi_error)?;
    params.validate().map_err(to_napi_error)?;
    Ok(true)
}
