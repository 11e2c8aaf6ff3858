use serde_json::Value;
use tabled::{builder::Builder, Table};

use super::display_value;

const STATEMENT_SECTIONS: &[(&str, &str)] = &[
    ("income_statements", "Income Statement"),
    ("balance_sheets", "Balance Sheet"),
    ("cash_flow_statements", "Cash Flow Statement"),
    ("debt_schedule", "Debt Schedule"),
];

/// Render the forecast as per-statement tables, one row per period.
pub fn print_table(value: &Value) {
    let Some(envelope) = value.as_object() else {
        println!("{}", value);
        return;
    };

    match envelope.get("result").and_then(Value::as_object) {
        Some(result) => {
            for (key, title) in STATEMENT_SECTIONS {
                if let Some(Value::Array(rows)) = result.get(*key) {
                    if !rows.is_empty() {
                        println!("{}", title);
                        print_period_table(rows);
                        println!();
                    }
                }
            }
            print_checks(result.get("checks"));
        }
        None => print_flat_object(value),
    }

    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings {
                if let Value::String(s) = w {
                    println!("  - {}", s);
                }
            }
        }
    }

    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

fn print_period_table(rows: &[Value]) {
    let Some(Value::Object(first)) = rows.first() else {
        return;
    };
    let headers: Vec<String> = first.keys().cloned().collect();

    let mut builder = Builder::default();
    builder.push_record(&headers);
    for row in rows {
        if let Value::Object(map) = row {
            let record: Vec<String> = headers
                .iter()
                .map(|h| map.get(h.as_str()).map(display_value).unwrap_or_default())
                .collect();
            builder.push_record(record);
        }
    }
    println!("{}", Table::from(builder));
}

fn print_checks(checks: Option<&Value>) {
    let Some(Value::Object(checks)) = checks else {
        return;
    };
    println!("Checks");
    let mut builder = Builder::default();
    builder.push_record(["Check", "Result"]);
    for (name, outcome) in checks {
        builder.push_record([name.as_str(), &display_value(outcome)]);
    }
    println!("{}", Table::from(builder));
}

fn print_flat_object(value: &Value) {
    if let Value::Object(map) = value {
        let mut builder = Builder::default();
        builder.push_record(["Field", "Value"]);
        for (key, val) in map {
            builder.push_record([key.as_str(), &display_value(val)]);
        }
        println!("{}", Table::from(builder));
    }
}
