use serde_json::Value;

use super::format_scalar;

/// Headline figure per command, first non-null match wins.
const PRIORITY_POINTERS: [&str; 7] = [
    "/net_irr",
    "/summary/net_irr/median",
    "/net_multiple",
    "/totals/lp_distributed",
    "/base_case/median_net_multiple",
    "/top/metric_median",
    "/fund_size",
];

/// Print just the key answer value from the output.
pub fn print_minimal(value: &Value) {
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    for pointer in PRIORITY_POINTERS {
        if let Some(val) = result_obj.pointer(pointer) {
            if !val.is_null() {
                println!("{}", format_scalar(val));
                return;
            }
        }
    }

    if let Value::Object(map) = result_obj {
        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, format_scalar(val));
            return;
        }
    }

    println!("{}", format_scalar(result_obj));
}
