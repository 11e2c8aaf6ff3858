use clap::Args;
use serde::Deserialize;
use serde_json::Value;

use fincast_core::drivers::{ForecastAssumptions, HistoricalBaseline};
use fincast_core::forecast::builder::build_forecast;

use crate::input;

/// One forecast request: historical state plus the driver tree.
#[derive(Deserialize)]
pub struct ForecastRequest {
    pub baseline: HistoricalBaseline,
    pub assumptions: ForecastAssumptions,
}

/// Arguments for the forecast command
#[derive(Args)]
pub struct ForecastArgs {
    /// Path to JSON input file
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_forecast(args: ForecastArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let request: ForecastRequest = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        return Err("--input <file.json> or stdin required for forecast".into());
    };
    let result = build_forecast(&request.baseline, &request.assumptions)?;
    Ok(serde_json::to_value(result)?)
}
