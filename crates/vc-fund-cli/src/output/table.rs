use serde_json::Value;
use tabled::{builder::Builder, Table};

use super::flatten;

/// Format the result envelope as a field/value table, followed by warnings.
pub fn print_table(value: &Value) {
    let Some(envelope) = value.as_object() else {
        println!("{}", value);
        return;
    };
    let body = envelope.get("result").unwrap_or(value);

    let mut rows = Vec::new();
    flatten("", body, &mut rows);
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (field, val) in rows {
        builder.push_record([field, val]);
    }
    println!("{}", Table::from(builder));

    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings.iter().filter_map(Value::as_str) {
                println!("  - {}", w);
            }
        }
    }

    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}
