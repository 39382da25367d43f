//! `qn`: train nowcast models and score grids or aftershock rings.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use qn_common::{BoundingBox, Result};
use qn_config::{get_preset, list_presets, resolve_config, PresetName, ServiceConfig, TrainingConfig};
use serde::Serialize;
use tracing::{error, info};

use qn_core::artifact::{ModelArtifact, MODEL_FILE_NAME};
use qn_core::catalog::{CatalogSource, StaticCatalog, UsgsClient};
use qn_core::logging::{init_logging, LogFormat};
use qn_core::service::{AftershockQuery, ModelSource, ModelStore, NowcastService, PredictionQuery};
use qn_core::train::TrainingPipeline;
use qn_core::ExitCode;

const CLI_CLIENT: &str = "cli";

#[derive(Parser)]
#[command(name = "qn")]
#[command(version, about = "Short-horizon earthquake nowcasting", long_about = None)]
struct Cli {
    /// Service configuration file (otherwise QN_CONFIG, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CatalogArgs {
    /// Read events from a saved GeoJSON FeatureCollection instead of the network
    #[arg(long)]
    catalog_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit, calibrate and evaluate a model, writing nowcast.json and nowcast_eval.json
    Train {
        /// Regional preset
        #[arg(long, default_value = "southeast_asia", conflicts_with = "training_config")]
        preset: PresetName,

        /// Training configuration JSON
        #[arg(long)]
        training_config: Option<PathBuf>,

        /// Output directory
        #[arg(short, long, default_value = "models")]
        out: PathBuf,

        #[command(flatten)]
        catalog: CatalogArgs,
    },

    /// Score a grid with a trained model
    Predict {
        /// Model artifact
        #[arg(short, long, default_value = "models/nowcast.json")]
        model: PathBuf,

        /// Use the built-in placeholder coefficients instead of a trained model
        #[arg(long)]
        placeholder: bool,

        /// minLon,minLat,maxLon,maxLat (defaults to the model's region)
        #[arg(long, allow_hyphen_values = true)]
        bbox: Option<BoundingBox>,

        /// Cell size in degrees
        #[arg(long)]
        cell_deg: Option<f64>,

        /// Horizon in days
        #[arg(long)]
        horizon: Option<f64>,

        /// Omit cells at or below this probability
        #[arg(long)]
        min_probability: Option<f64>,

        /// Include per-cell feature vectors
        #[arg(long)]
        features: bool,

        #[command(flatten)]
        catalog: CatalogArgs,
    },

    /// Probability ring around a mainshock
    Aftershock {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        #[arg(long)]
        mag: f64,

        /// RFC 3339 timestamp or epoch milliseconds
        #[arg(long, value_parser = parse_time)]
        time: DateTime<Utc>,

        #[arg(long)]
        event_id: Option<String>,

        /// Minimum aftershock magnitude
        #[arg(long)]
        m0: Option<f64>,

        /// Horizon in days
        #[arg(long)]
        horizon: Option<f64>,

        /// Ring radius in km
        #[arg(long)]
        radius: Option<f64>,

        /// Points on the ring
        #[arg(long)]
        points: Option<usize>,

        #[command(flatten)]
        catalog: CatalogArgs,
    },

    /// List regional training presets
    Presets,

    /// Print the JSON Schema of the model artifact
    Schema,
}

fn parse_time(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    if let Ok(ms) = s.parse::<i64>() {
        return DateTime::from_timestamp_millis(ms).ok_or_else(|| format!("timestamp out of range: {s}"));
    }
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("invalid time '{s}': {e}"))
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    let code = match run(cli) {
        Ok(()) => ExitCode::Ok,
        Err(e) => {
            let code = ExitCode::for_error(&e);
            error!(error = %e, code = e.code(), "command failed");
            let body = serde_json::json!({
                "error": e.to_string(),
                "code": e.code(),
                "status": e.http_status(),
                "suggested_cell_deg": e.suggested_cell_deg(),
            });
            eprintln!("{body}");
            code
        }
    };
    process::exit(code.as_i32());
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Presets => print_json(&list_presets()),
        Commands::Schema => print_json(&schemars::schema_for!(ModelArtifact)),
        Commands::Train {
            preset,
            training_config,
            out,
            catalog,
        } => {
            let (service, _) = load_service_config(cli.config.as_deref())?;
            let config = match training_config {
                Some(path) => TrainingConfig::from_file(&path)?,
                None => get_preset(preset),
            };
            let source = catalog_source(&catalog, &service)?;
            let pipeline = TrainingPipeline::new(config, source)?;
            let (outcome, paths) = pipeline.run_and_persist(Utc::now(), &out)?;
            print_json(&serde_json::json!({
                "model": paths.model,
                "evaluation": paths.evaluation,
                "metrics": outcome.report.metrics,
                "dataset": outcome.report.dataset,
            }))
        }
        Commands::Predict {
            model,
            placeholder,
            bbox,
            cell_deg,
            horizon,
            min_probability,
            features,
            catalog,
        } => {
            let (config, _) = load_service_config(cli.config.as_deref())?;
            let source = catalog_source(&catalog, &config)?;
            let store = if placeholder {
                ModelStore::new(ModelSource::Placeholder)
            } else {
                ModelStore::from_path(model_path(&model))
            };
            let service = NowcastService::new(config, Arc::new(store), source);
            let query = PredictionQuery {
                bbox,
                cell_deg,
                horizon_days: horizon,
                min_probability,
                include_features: features,
            };
            print_json(&service.predict(CLI_CLIENT, &query)?.response)
        }
        Commands::Aftershock {
            lat,
            lon,
            mag,
            time,
            event_id,
            m0,
            horizon,
            radius,
            points,
            catalog,
        } => {
            let (config, _) = load_service_config(cli.config.as_deref())?;
            let source = catalog_source(&catalog, &config)?;
            let service = NowcastService::new(
                config,
                Arc::new(ModelStore::new(ModelSource::Placeholder)),
                source,
            );
            let query = AftershockQuery {
                event_id,
                m0,
                horizon_days: horizon,
                radius_km: radius,
                n_points: points,
                ..AftershockQuery::new(lat, lon, mag, time)
            };
            print_json(&service.aftershock(CLI_CLIENT, &query)?.response)
        }
    }
}

fn load_service_config(path: Option<&Path>) -> Result<(ServiceConfig, qn_config::ConfigSource)> {
    let (config, source) = resolve_config(path)?;
    info!(source = ?source, "service configuration resolved");
    Ok((config, source))
}

fn catalog_source(args: &CatalogArgs, config: &ServiceConfig) -> Result<Arc<dyn CatalogSource>> {
    match &args.catalog_file {
        Some(path) => Ok(Arc::new(StaticCatalog::from_geojson_file(path)?)),
        None => Ok(Arc::new(UsgsClient::new(
            config.catalog_url.clone(),
            Duration::from_secs(config.fetch_timeout_secs),
        ))),
    }
}

/// A directory argument means the artifact inside it.
fn model_path(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(MODEL_FILE_NAME)
    } else {
        path.to_path_buf()
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
