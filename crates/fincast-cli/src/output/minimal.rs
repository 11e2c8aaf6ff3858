use serde_json::Value;

use super::display_value;

/// Print a one-line verdict: convergence status, worst residual, and the
/// final period's ending cash.
pub fn print_minimal(value: &Value) {
    let result = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    let circularity = result
        .get("checks")
        .and_then(|c| c.get("circularity"))
        .and_then(Value::as_object);

    if let Some(circularity) = circularity {
        let converged = circularity
            .get("all_converged")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let worst = circularity
            .get("worst_error")
            .map(display_value)
            .unwrap_or_default();

        if converged {
            println!("converged (worst residual {})", worst);
        } else {
            let periods = circularity
                .get("non_converged_periods")
                .map(display_value)
                .unwrap_or_default();
            println!(
                "NOT_CONVERGED in periods [{}] (worst residual {})",
                periods, worst
            );
        }

        if let Some(Value::Array(cash_flows)) = result.get("cash_flow_statements") {
            if let Some(last) = cash_flows.last().and_then(Value::as_object) {
                if let Some(ending) = last.get("ending_cash") {
                    println!("final ending cash: {}", display_value(ending));
                }
            }
        }
        return;
    }

    // Not a forecast envelope, print the first field
    if let Value::Object(map) = result {
        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, display_value(val));
            return;
        }
    }
    println!("{}", display_value(result));
}
