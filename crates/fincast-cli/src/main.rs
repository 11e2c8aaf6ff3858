mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;

use commands::forecast::ForecastArgs;

/// Three-statement financial forecasting with decimal precision
#[derive(Parser)]
#[command(
    name = "fincast",
    version,
    about = "Three-statement financial forecasting",
    long_about = "Builds linked income statement, balance sheet, and cash flow \
                  forecasts from a historical baseline and a declarative driver \
                  tree, resolving the interest/cash/revolver circularity with \
                  decimal precision."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full forecast from a JSON request (--input file or stdin)
    Forecast(ForecastArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn main() {
    let cli = Cli::parse();

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Forecast(args) => commands::forecast::run_forecast(args),
        Commands::Version => {
            println!("fincast {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
