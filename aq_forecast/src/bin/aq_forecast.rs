//! Command-line front end for the air-quality forecaster.
//!
//! ```text
//! aq_forecast forecast --input sensor.csv --hours 12
//! aq_forecast retrain --input sensor.json --no-ensemble
//! aq_forecast diagnose --input sensor.csv
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use aq_forecast::data::DataLoader;
use aq_forecast::diagnostics::DataDiagnostics;
use aq_forecast::sanitize::Sanitizer;
use aq_forecast::{ForecastRequest, ForecastService, ObservationRecord, PredictorConfig};
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "aq_forecast")]
#[command(about = "Short-horizon PM2.5 and AQI forecasting from sensor records")]
struct Cli {
    /// Predictor configuration file (JSON); defaults are used when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Sensor records as a CSV file or a JSON array
    #[arg(long, short)]
    input: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train on the records and forecast the following hours
    Forecast {
        #[command(flatten)]
        input: InputArgs,

        /// Sensor identifier echoed in the response
        #[arg(long, default_value = "unknown")]
        sensor_id: String,

        /// Hours to forecast (clamped to the configured maximum); the
        /// configured default horizon when omitted
        #[arg(long)]
        hours: Option<usize>,

        /// Use the configured default weights instead of score-based weights
        #[arg(long)]
        no_ensemble: bool,
    },
    /// Train on the records and print the training report
    Retrain {
        #[command(flatten)]
        input: InputArgs,

        #[arg(long)]
        no_ensemble: bool,
    },
    /// Report data-quality diagnostics for the records
    Diagnose {
        #[command(flatten)]
        input: InputArgs,
    },
}

fn load_records(path: &Path) -> aq_forecast::Result<Vec<ObservationRecord>> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    if is_json {
        DataLoader::from_json_str(&fs::read_to_string(path)?)
    } else {
        DataLoader::from_csv(path)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => PredictorConfig::from_json_file(path)?,
        None => PredictorConfig::default(),
    };

    match cli.command {
        Command::Forecast {
            input,
            sensor_id,
            hours,
            no_ensemble,
        } => {
            let records = load_records(&input.input)?;
            info!(records = records.len(), path = %input.input.display(), "records loaded");

            let service = ForecastService::new(config)?;
            let mut request = ForecastRequest::new(sensor_id, records).with_ensemble(!no_ensemble);
            if let Some(hours) = hours {
                request = request.with_hours_ahead(hours);
            }
            let response = service.predict(&request)?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Retrain { input, no_ensemble } => {
            let records = load_records(&input.input)?;
            let service = ForecastService::new(config)?;
            let report = service.retrain(&records, !no_ensemble)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Diagnose { input } => {
            let records = load_records(&input.input)?;
            let sanitizer = Sanitizer::new(config.clip_percentiles);
            let diagnostics = DataDiagnostics::inspect(&records, &sanitizer);
            println!("{}", serde_json::to_string_pretty(&diagnostics)?);
        }
    }

    Ok(())
}
