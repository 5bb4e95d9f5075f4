//! Pesca model tooling CLI
//!
//! Offline jobs for training the fishing score model and converting it to ONNX.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use pesca::{Config, Result};

#[derive(Parser)]
#[command(name = "pesca")]
#[command(about = "Fishing score model training and ONNX conversion", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Episode data commands
    Data {
        #[command(subcommand)]
        action: DataCommands,
    },
    /// Train the gradient-boosted score model
    Train {
        /// Episode export to train on
        #[arg(long, env = "DATA_FILE")]
        data_file: Option<String>,
        /// Directory receiving the model and scaler
        #[arg(long, env = "OUTPUT_DIR")]
        output_dir: Option<String>,
        /// Override the minimum number of episodes
        #[arg(long)]
        min_samples: Option<usize>,
        /// Override the split and boosting seed
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Convert the trained model to ONNX and smoke-test it
    Convert {
        /// Directory holding the model, receives the graph
        #[arg(long, env = "OUTPUT_DIR")]
        output_dir: Option<String>,
        /// Feature count declared on the graph input
        #[arg(long)]
        input_width: Option<usize>,
    },
    /// Score a set of conditions with the converted model
    Predict {
        /// Latitude in degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        /// Longitude in degrees
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        /// Air temperature (°C)
        #[arg(long, allow_hyphen_values = true)]
        temp: Option<f64>,
        /// Wind speed (km/h)
        #[arg(long)]
        wind: Option<f64>,
        /// Pressure (hPa)
        #[arg(long)]
        pressure: Option<f64>,
        /// Cloud cover (%)
        #[arg(long)]
        clouds: Option<f64>,
        /// Wave height (m)
        #[arg(long)]
        wave_height: Option<f64>,
        /// Water temperature (°C)
        #[arg(long)]
        water_temp: Option<f64>,
        /// Current speed (knots)
        #[arg(long)]
        current_speed: Option<f64>,
        /// Moon phase (0 new, 0.5 full)
        #[arg(long)]
        moon_phase: Option<f64>,
        /// Pressure trend (-1 falling, 0 stable, 1 rising)
        #[arg(long, allow_hyphen_values = true)]
        pressure_trend: Option<f64>,
        /// Time of the outing (RFC 3339), defaults to now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
        /// Rule-based score to compare against
        #[arg(long)]
        rule_score: Option<f64>,
        /// Output format: table, json, csv
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },
    /// Model management commands
    Model {
        #[command(subcommand)]
        action: ModelCommands,
    },
    /// Initialize configuration
    Init,
}

#[derive(Subcommand)]
enum DataCommands {
    /// Export episodes with feedback from the episode store
    Export {
        /// SQLite episode store
        #[arg(long)]
        database: Option<String>,
        /// Output JSON document
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Show how a training document would be used
    Status {
        /// Episode export to inspect
        #[arg(long, env = "DATA_FILE")]
        data_file: Option<String>,
    },
}

#[derive(Subcommand)]
enum ModelCommands {
    /// Show model information
    Info,
    /// Download released artifacts
    Fetch {
        /// Download even when files are present
        #[arg(long)]
        force: bool,
    },
}

#[derive(Clone, Debug)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown format: {}. Use table, json, or csv.", s)),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load or create config
    let mut config = if std::path::Path::new(&cli.config).exists() {
        match Config::load(&cli.config) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading config: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        Config::default()
    };

    // Run command
    let result = match cli.command {
        Commands::Data { action } => match action {
            DataCommands::Export { database, output } => {
                commands::data_export(&config, database, output)
            }
            DataCommands::Status { data_file } => {
                if let Some(path) = data_file {
                    config.data.data_file = path;
                }
                commands::data_status(&config)
            }
        },
        Commands::Train {
            data_file,
            output_dir,
            min_samples,
            seed,
        } => {
            if let Some(path) = data_file {
                config.data.data_file = path;
            }
            if let Some(dir) = output_dir {
                config.data.output_dir = dir;
            }
            if let Some(n) = min_samples {
                config.data.min_samples = n;
            }
            if let Some(s) = seed {
                config.training.seed = s;
            }
            commands::train(&config)
        }
        Commands::Convert {
            output_dir,
            input_width,
        } => {
            if let Some(dir) = output_dir {
                config.data.output_dir = dir;
            }
            if let Some(w) = input_width {
                config.export.input_width = w;
            }
            commands::convert(&config)
        }
        Commands::Predict {
            lat,
            lon,
            temp,
            wind,
            pressure,
            clouds,
            wave_height,
            water_temp,
            current_speed,
            moon_phase,
            pressure_trend,
            at,
            rule_score,
            format,
        } => {
            let weather = pesca::data::WeatherObservation {
                temp,
                wind,
                pressure,
                clouds,
                wave_height,
                water_temp,
                current_speed,
                moon_phase,
                pressure_trend,
            };
            let at = at.unwrap_or_else(Utc::now);
            commands::predict(&config, &weather, lat, lon, at, rule_score, format)
        }
        Commands::Model { action } => match action {
            ModelCommands::Info => commands::model_info(&config),
            ModelCommands::Fetch { force } => commands::model_fetch(&config, force),
        },
        Commands::Init => commands::init(&cli.config),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

mod commands {
    use super::*;
    use pesca::data::dataset::summarize_export;
    use pesca::data::{EpisodeExport, EpisodeStore, WeatherObservation};
    use pesca::model::GradientBoostingRegressor;
    use pesca::predict::{compare_predictions, fetch_artifacts, ModelHealth, Predictor};

    pub fn init(config_path: &str) -> Result<()> {
        let config = Config::default();
        config.save(config_path)?;
        println!("Created default config at {}", config_path);

        std::fs::create_dir_all(&config.data.output_dir)?;
        println!("Created {} directory", config.data.output_dir);

        println!("\nNext steps:");
        println!("  1. Edit {} to customize settings", config_path);
        println!("  2. Run 'pesca data export' to export episodes with feedback");
        println!("  3. Run 'pesca train' to train the model");
        println!("  4. Run 'pesca convert' to produce the ONNX graph");

        Ok(())
    }

    pub fn data_export(
        config: &Config,
        database: Option<String>,
        output: Option<String>,
    ) -> Result<()> {
        let database = database.unwrap_or_else(|| config.data.database_path.clone());
        let output = output.unwrap_or_else(|| config.data.data_file.clone());

        println!("Exporting episodes from {}...", database);
        let store = EpisodeStore::open(&database)?;
        let (total, with_feedback) = store.count_episodes()?;
        println!("  Episodes in store: {} ({} with feedback)", total, with_feedback);

        let export = store.export_with_feedback()?;
        export.save(&output)?;
        println!("Exported {} episodes to {}", export.len(), output);

        if export.len() < config.data.min_samples {
            println!(
                "Note: training needs at least {} episodes",
                config.data.min_samples
            );
        }

        Ok(())
    }

    pub fn data_status(config: &Config) -> Result<()> {
        let export = EpisodeExport::load(&config.data.data_file)?;
        let summary = summarize_export(&export);

        println!("Training Data Status");
        println!("───────────────────────────────");
        println!("  Path:             {}", config.data.data_file);
        if let Some(stamp) = &export.exported_at {
            println!("  Exported at:      {}", stamp);
        }
        println!("  Episodes:         {}", summary.total);
        println!("  Usable:           {}", summary.used);
        println!("  Missing label:    {}", summary.skipped_missing_label);
        println!("  Missing context:  {}", summary.skipped_missing_context);
        println!(
            "  Minimum required: {} ({})",
            config.data.min_samples,
            if summary.total >= config.data.min_samples {
                "ok"
            } else {
                "insufficient"
            }
        );

        Ok(())
    }

    pub fn train(config: &Config) -> Result<()> {
        println!("Training on {}...", config.data.data_file);
        let report = pesca::training::run_training(config)?;

        println!("\nTraining Results");
        println!("───────────────────────────────");
        println!(
            "  Episodes:   {} used of {} ({} skipped)",
            report.summary.used,
            report.summary.total,
            report.summary.total - report.summary.used
        );
        println!("  Split:      {} train / {} test", report.n_train, report.n_test);
        println!("  Features:   {}", report.n_features);
        println!("  Train:      {}", report.train_metrics);
        println!("  Test:       {}", report.test_metrics);
        println!("\nModel saved to {}", report.artifacts.model_path.display());
        println!("Scaler saved to {}", report.artifacts.scaler_path.display());

        Ok(())
    }

    pub fn convert(config: &Config) -> Result<()> {
        println!("Converting model in {}...", config.data.output_dir);
        let report = pesca::export::run_conversion(config)?;

        let shape: Vec<String> = report
            .input_shape
            .iter()
            .map(|d| d.map_or("None".to_string(), |v| v.to_string()))
            .collect();

        println!("\nConversion Results");
        println!("───────────────────────────────");
        println!("  Graph:       {}", report.onnx_path.display());
        println!("  Trees:       {}", report.n_trees);
        println!("  Input shape: ({})", shape.join(", "));
        if report.width_mismatch {
            println!(
                "  Warning:     model trained on {} features",
                report.trained_features
            );
        }
        if !report.pinned_features.is_empty() {
            println!("  Pinned:      features {:?}", report.pinned_features);
        }
        if let Some(value) = report.test_output.first() {
            println!("  Test output: {:.4}", value);
        }
        if let Some(reference) = report.reference_output {
            println!("  Reference:   {:.4}", reference);
        }

        Ok(())
    }

    pub fn predict(
        config: &Config,
        weather: &WeatherObservation,
        lat: f64,
        lon: f64,
        at: DateTime<Utc>,
        rule_score: Option<f64>,
        format: OutputFormat,
    ) -> Result<()> {
        let predictor = Predictor::load(config)?;
        let prediction = predictor.predict_conditions(weather, lat, lon, at)?;
        let comparison = rule_score.map(|rule| compare_predictions(prediction.score, rule));

        match format {
            OutputFormat::Table => {
                println!("Fishing Score Prediction");
                println!("───────────────────────────────");
                println!("  Location:  {:.4}, {:.4}", lat, lon);
                println!("  Time:      {}", at.to_rfc3339());
                println!("  Score:     {:.2} (raw {:.3})", prediction.score, prediction.raw);
                if let Some(c) = &comparison {
                    println!("  Rule:      {:.2}", c.rule_score);
                    println!("  Agreement: {} (difference {:.2})", c.agreement, c.difference);
                }
            }
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "lat": lat,
                    "lon": lon,
                    "at": at.to_rfc3339(),
                    "prediction": prediction,
                    "comparison": comparison,
                });
                println!("{}", serde_json::to_string_pretty(&json)?);
            }
            OutputFormat::Csv => {
                println!("lat,lon,at,score,raw,rule_score,agreement");
                println!(
                    "{},{},{},{:.3},{:.3},{},{}",
                    lat,
                    lon,
                    at.to_rfc3339(),
                    prediction.score,
                    prediction.raw,
                    comparison
                        .map(|c| format!("{:.3}", c.rule_score))
                        .unwrap_or_default(),
                    comparison
                        .map(|c| c.agreement.to_string())
                        .unwrap_or_default()
                );
            }
        }

        Ok(())
    }

    pub fn model_info(config: &Config) -> Result<()> {
        let health = ModelHealth::check(config);

        println!("Model Information");
        println!("───────────────────────────────");
        println!("{}", health);
        println!("  Version:          {}", health.version);

        if health.model_present {
            let model = GradientBoostingRegressor::load(&health.model_path)?;
            let leaves: usize = model.trees().iter().map(|t| t.n_leaves()).sum();
            let splits: usize = model.trees().iter().map(|t| t.n_splits()).sum();
            let depth = model.trees().iter().map(|t| t.depth()).max().unwrap_or(0);
            println!("\n  Estimators:       {}", model.n_estimators());
            println!("  Trees fitted:     {}", model.trees().len());
            println!("  Total leaves:     {}", leaves);
            println!("  Total splits:     {}", splits);
            println!("  Deepest tree:     {}", depth);
            println!("  Learning rate:    {}", model.learning_rate());
            println!("  Features:         {}", model.n_features());
            println!("  Base prediction:  {:.4}", model.init_prediction());
            if let Some(loss) = model.stage_losses().last() {
                println!("  Final train MSE:  {:.4}", loss);
            }
        }

        if !health.is_servable() {
            println!("\nRun 'pesca convert' or 'pesca model fetch' to get a servable model.");
        }

        Ok(())
    }

    pub fn model_fetch(config: &Config, force: bool) -> Result<()> {
        println!("Fetching artifacts from {}...", config.predict.release_url);
        let written = fetch_artifacts(config, force)?;
        if written.is_empty() {
            println!("All artifacts already present (use --force to download again)");
        }
        for path in written {
            println!("  Downloaded {}", path.display());
        }

        Ok(())
    }
}
