use serde_json::Value;
use std::io;

use super::display_value;

const STATEMENT_KEYS: &[&str] = &[
    "income_statements",
    "balance_sheets",
    "cash_flow_statements",
];

/// Write the statement arrays as CSV to stdout. Each statement gets a
/// `statement` discriminator column so the three sections survive in one
/// stream.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    let result = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    match result {
        Value::Object(map) if STATEMENT_KEYS.iter().any(|k| map.contains_key(*k)) => {
            for key in STATEMENT_KEYS {
                if let Some(Value::Array(rows)) = map.get(*key) {
                    write_statement_csv(&mut wtr, key, rows);
                }
            }
        }
        Value::Object(map) => {
            let _ = wtr.write_record(["field", "value"]);
            for (key, val) in map {
                let _ = wtr.write_record([key.as_str(), &display_value(val)]);
            }
        }
        Value::Array(arr) => {
            write_statement_csv(&mut wtr, "rows", arr);
        }
        _ => {
            let _ = wtr.write_record([&display_value(result)]);
        }
    }

    let _ = wtr.flush();
}

fn write_statement_csv(wtr: &mut csv::Writer<io::StdoutLock<'_>>, statement: &str, rows: &[Value]) {
    let Some(Value::Object(first)) = rows.first() else {
        return;
    };

    let headers: Vec<&str> = first.keys().map(|k| k.as_str()).collect();
    let mut header_row = vec!["statement"];
    header_row.extend(&headers);
    let _ = wtr.write_record(&header_row);

    for row in rows {
        if let Value::Object(map) = row {
            let mut record = vec![statement.to_string()];
            record.extend(
                headers
                    .iter()
                    .map(|h| map.get(*h).map(display_value).unwrap_or_default()),
            );
            let _ = wtr.write_record(&record);
        }
    }
}
