mod classifier;
mod cli;
mod config;
mod datasources;
mod error;
mod logic;
mod models;

use anyhow::Context;
use chrono::Utc;
use classifier::{ClassifierPipeline, PredictResponse};
use clap::Parser;
use cli::{Cli, Commands};
use config::Config;
use datasources::{load_ideal_conditions_file, SensorApiClient};
use error::CropError;
use logic::{calculations, watering_status, AdvisoryEngine, HistoryWindow, LivePoller, PollerSnapshot};
use models::{IdealConditionsTable, SensorReading};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Initialize logging
    let default_level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Init = cli.command {
        Config::setup_interactive().context("interactive setup failed")?;
        return Ok(());
    }

    let config = Config::load(cli.config.clone()).context("failed to load configuration")?;
    let client = SensorApiClient::new(config.api.clone())?;

    match cli.command {
        Commands::Init => {}
        Commands::Check => run_check(&config, &client).await,
        Commands::Predict { features } => run_predict(&config, &client, features).await?,
        Commands::Adjust { crop, reading } => run_adjust(&config, &client, crop, reading).await?,
        Commands::Crops => run_crops(&config, &client).await?,
        Commands::History { window } => run_history(&client, window).await?,
        Commands::Watch { crop } => run_watch(&config, client, crop).await?,
    }

    Ok(())
}

async fn load_ideal_conditions(
    config: &Config,
    client: &SensorApiClient,
) -> error::Result<IdealConditionsTable> {
    match &config.ideal_conditions.file {
        Some(path) => load_ideal_conditions_file(path).await,
        None => client.fetch_ideal_conditions().await,
    }
}

async fn run_check(config: &Config, client: &SensorApiClient) {
    println!("Configuration OK");

    let classifier = ClassifierPipeline::new();
    match classifier.load_from_path(&config.model.path).await {
        Ok(()) => println!(
            "Model: OK ({} classes, features {})",
            classifier.labels().len(),
            classifier.schema().keys().join(", ")
        ),
        Err(e) => println!("Model: FAILED ({})", e),
    }

    match client.test_connection().await {
        Ok(true) => println!("Sensor API: OK ({})", client.base_url()),
        Ok(false) => println!("Sensor API: ERROR RESPONSE ({})", client.base_url()),
        Err(e) => println!("Sensor API: OFFLINE ({})", e),
    }

    match load_ideal_conditions(config, client).await {
        Ok(table) => {
            let incomplete = table.profiles().filter(|p| !p.is_complete()).count();
            println!(
                "Ideal conditions: {} crops ({} incomplete)",
                table.len(),
                incomplete
            );
        }
        Err(e) => println!("Ideal conditions: UNAVAILABLE ({})", e),
    }
}

async fn run_predict(
    config: &Config,
    client: &SensorApiClient,
    features: Option<String>,
) -> anyhow::Result<()> {
    let classifier = ClassifierPipeline::new();
    if let Err(e) = classifier.load_from_path(&config.model.path).await {
        tracing::warn!("Failed to load model: {}", e);
    }

    let request: serde_json::Value = match features {
        Some(json) => serde_json::from_str(&json).context("--features is not valid JSON")?,
        None => serde_json::to_value(client.fetch_latest().await?)?,
    };

    let result = classifier.predict(&request);
    let response = PredictResponse::from_result(&result);
    println!("{}", serde_json::to_string_pretty(&response)?);

    match result {
        Ok(_) => Ok(()),
        Err(e) if e.is_prediction_error() => {
            anyhow::bail!("prediction failed with status {}", response.status_code())
        }
        Err(e) => Err(e.into()),
    }
}

async fn run_adjust(
    config: &Config,
    client: &SensorApiClient,
    crop: Option<String>,
    reading: Option<String>,
) -> anyhow::Result<()> {
    let reading: SensorReading = match reading {
        Some(json) => serde_json::from_str(&json).context("--reading is not a valid reading")?,
        None => client.fetch_latest().await?,
    };
    let table = load_ideal_conditions(config, client).await?;
    let engine = AdvisoryEngine::new(Arc::new(table));

    print_reading(&reading);
    print_advice(&engine, &reading, crop.as_deref());
    Ok(())
}

async fn run_crops(config: &Config, client: &SensorApiClient) -> anyhow::Result<()> {
    let table = load_ideal_conditions(config, client).await?;
    if table.is_empty() {
        println!("No crops with ideal-condition data.");
        return Ok(());
    }
    for profile in table.profiles() {
        if profile.is_complete() {
            println!("{}", profile.name);
        } else {
            let missing: Vec<&str> = profile
                .missing_attributes()
                .iter()
                .map(|a| a.key())
                .collect();
            println!("{} (incomplete: missing {})", profile.name, missing.join(", "));
        }
    }
    Ok(())
}

async fn run_history(client: &SensorApiClient, window: HistoryWindow) -> anyhow::Result<()> {
    let entries = client.fetch_history().await?;
    let recent = window.filter(&entries, Utc::now());

    if recent.is_empty() {
        println!("No historical data available for the selected time range.");
        return Ok(());
    }

    println!("{} ({} readings)", window, recent.len());
    println!(
        "{:<14} {:>10} {:>10} {:>10} {:>10}",
        "Attribute", "Latest", "Min", "Avg", "Max"
    );
    for summary in calculations::summarize(&recent) {
        let a = summary.attribute;
        println!(
            "{:<14} {:>10} {:>10} {:>10} {:>10}",
            a.display_name(),
            a.format_value(summary.latest),
            a.format_value(summary.min),
            a.format_value(summary.average),
            a.format_value(summary.max)
        );
    }
    Ok(())
}

async fn run_watch(
    config: &Config,
    client: SensorApiClient,
    crop: Option<String>,
) -> anyhow::Result<()> {
    let engine = match &crop {
        Some(_) => match load_ideal_conditions(config, &client).await {
            Ok(table) => Some(AdvisoryEngine::new(Arc::new(table))),
            Err(e) => {
                tracing::warn!("Ideal conditions unavailable: {}", e);
                None
            }
        },
        None => None,
    };

    let classifier = Arc::new(ClassifierPipeline::new());
    let poller = LivePoller::new(
        client,
        Arc::clone(&classifier),
        Duration::from_secs(config.poller.interval_secs),
    );
    let mut updates = poller.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    // The model loads in the background; predictions report it as
    // unavailable until it is ready, then one refresh picks it up.
    {
        let poller = poller.clone();
        let path = config.model.path.clone();
        tokio::spawn(async move {
            if let Err(e) = poller.load_model(&path).await {
                tracing::warn!("Failed to load model: {}", e);
            }
        });
    }

    poller.manual_refresh().await;
    let mut shown = poller.snapshot();
    print_snapshot(&shown, engine.as_ref(), crop.as_deref());
    if !classifier.is_ready() {
        println!("Model still loading; the recommendation follows once it is ready.");
    }

    poller.start_polling();
    println!(
        "Polling every {}s (r = refresh, l = toggle live, q = quit)",
        poller.interval().as_secs()
    );

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                if snapshot.last_updated != shown.last_updated
                    || snapshot.last_error != shown.last_error
                    || snapshot.recommendation != shown.recommendation
                {
                    print_snapshot(&snapshot, engine.as_ref(), crop.as_deref());
                    shown = snapshot;
                }
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match line.trim() {
                    "r" if poller.is_in_flight() => println!("Refresh already in progress"),
                    "r" => {
                        let poller = poller.clone();
                        tokio::spawn(async move {
                            match poller.manual_refresh().await {
                                logic::CycleOutcome::Skipped => println!("Refresh already in progress"),
                                logic::CycleOutcome::UpstreamUnavailable(reason) => {
                                    println!("Refresh failed ({})", reason)
                                }
                                logic::CycleOutcome::Updated { reading, recommendation } => {
                                    tracing::debug!(?reading, %recommendation, "manual refresh complete")
                                }
                            }
                        });
                    }
                    "l" => {
                        poller.set_live(!poller.is_live());
                        println!("Live updates {}", if poller.is_live() { "on" } else { "paused" });
                    }
                    "q" => break,
                    "" => {}
                    other => println!(
                        "Unknown command '{}' (r = refresh, l = toggle live, q = quit)",
                        other
                    ),
                },
                Ok(None) => stdin_open = false,
                Err(e) => {
                    tracing::warn!("stdin read failed: {}", e);
                    stdin_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    poller.stop_polling();
    Ok(())
}

fn print_reading(reading: &SensorReading) {
    println!("Sensor Data");
    for attribute in models::Attribute::ALL {
        println!(
            "  {:<14} {}",
            attribute.display_name(),
            attribute.format_value(reading.value(attribute))
        );
    }
}

fn print_advice(engine: &AdvisoryEngine, reading: &SensorReading, crop: Option<&str>) {
    let status = watering_status(reading);
    println!("{} {}", status.symbol(), status.message());

    match engine.advise(reading, crop) {
        Ok(advice) if advice.is_optimal() => println!("Adjustments: {}", advice),
        Ok(advice) => {
            println!("Adjustments:");
            for suggestion in advice.suggestions() {
                println!("  {} {}", suggestion.direction.symbol(), suggestion.message);
            }
        }
        Err(e @ CropError::NotFound(_)) => println!(
            "No specific adjustments available ({}). Known crops: {}",
            e,
            engine.crop_names().join(", ")
        ),
        Err(e @ (CropError::NoSelection | CropError::IncompleteProfile { .. })) => {
            println!("No specific adjustments available ({}).", e)
        }
        Err(e) => println!("Adjustments unavailable ({}).", e),
    }
}

fn print_snapshot(snapshot: &PollerSnapshot, engine: Option<&AdvisoryEngine>, crop: Option<&str>) {
    println!();
    match snapshot.last_updated {
        Some(at) => println!("Last updated {}", at.with_timezone(&chrono::Local).format("%H:%M:%S")),
        None => println!("Waiting for first reading"),
    }
    if let Some(error) = &snapshot.last_error {
        println!("Sensor API unavailable ({}); showing last good reading", error);
    }

    let Some(reading) = &snapshot.reading else {
        return;
    };
    print_reading(reading);
    println!("Recommended crop: {}", snapshot.recommendation);

    if let Some(engine) = engine {
        print_advice(engine, reading, crop);
    }
}
