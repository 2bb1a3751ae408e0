use serde_json::Value;
use std::io;

use super::flatten;

/// Write the result as two-column `field,value` CSV to stdout.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    let body = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    let mut rows = Vec::new();
    flatten("", body, &mut rows);

    let _ = wtr.write_record(["field", "value"]);
    for (field, val) in &rows {
        let field = if field.is_empty() { "value" } else { field.as_str() };
        let _ = wtr.write_record([field, val.as_str()]);
    }
    let _ = wtr.flush();
}
