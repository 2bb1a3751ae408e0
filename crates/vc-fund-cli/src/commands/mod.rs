pub mod monte_carlo;
pub mod outliers;
pub mod sensitivity;
pub mod simulate;
pub mod template;
pub mod waterfall;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::input;

/// Load command input from `--input` or piped stdin.
pub(crate) fn load_value(path: Option<&str>, what: &str) -> Result<Value, Box<dyn std::error::Error>> {
    if let Some(path) = path {
        input::file::read_input(path)
    } else if let Some(data) = input::stdin::read_stdin()? {
        Ok(data)
    } else {
        Err(format!("--input <file.json|file.yaml> or stdin required for {what}").into())
    }
}

pub(crate) fn load<T: DeserializeOwned>(
    path: Option<&str>,
    what: &str,
) -> Result<T, Box<dyn std::error::Error>> {
    Ok(serde_json::from_value(load_value(path, what)?)?)
}

/// Inputs may be a bare ParameterSet or a full request with a `params` key.
pub(crate) fn is_request(value: &Value) -> bool {
    value.get("params").is_some()
}
