use ayto_calc::config::LoggingSettings;
use ayto_calc::{load_export, snapshot, MemoryStore, ProbabilityEngine, ProbabilityWorker, Settings, WorkerMessage};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: ayto-calc <export.json> [--timeline]";

fn init_logging(logging: &LoggingSettings) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true);

    match logging.format.as_str() {
        "pretty" => subscriber.pretty().init(),
        "json" => subscriber.json().init(),
        _ => subscriber.init(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present
    dotenv::dotenv().ok();

    let loaded = Settings::load();
    init_logging(&loaded.as_ref().map(|s| s.logging.clone()).unwrap_or_default());

    let settings = match loaded {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!("Configuration loaded successfully");

    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("{}", USAGE);
        return ExitCode::from(2);
    };
    let timeline = match args.next().as_deref() {
        None => false,
        Some("--timeline") => true,
        Some(other) => {
            eprintln!("Unknown argument '{}'\n{}", other, USAGE);
            return ExitCode::from(2);
        }
    };

    let store = match load_export(&path) {
        Ok(data) => MemoryStore::from_import(data),
        Err(e) => {
            error!("Failed to import {}: {}", path, e);
            return ExitCode::FAILURE;
        }
    };
    let input = match snapshot(&store) {
        Ok(input) => input,
        Err(e) => {
            error!("Failed to read store: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let engine = match ProbabilityEngine::new(settings.engine) {
        Ok(engine) => engine,
        Err(e) => {
            error!("Invalid engine settings: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if timeline {
        return print_timeline(engine, input).await;
    }

    let (worker, mut events) = ProbabilityWorker::spawn(engine);
    let generation = worker.submit(input);
    let mut code = ExitCode::FAILURE;

    while let Some(event) = events.recv().await {
        if event.generation != generation {
            continue;
        }
        match &event.message {
            WorkerMessage::Progress { progress, step } => {
                info!("{:>5.1}% {}", progress * 100.0, step);
                continue;
            }
            WorkerMessage::Result { .. } => code = ExitCode::SUCCESS,
            WorkerMessage::Error { error } => error!("Calculation failed: {}", error),
        }

        match serde_json::to_string_pretty(&event.message) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to serialize result: {}", e);
                code = ExitCode::FAILURE;
            }
        }
        break;
    }

    worker.shutdown().await;
    code
}

async fn print_timeline(engine: ProbabilityEngine, input: ayto_calc::ProbabilityInput) -> ExitCode {
    let entries = match tokio::task::spawn_blocking(move || engine.timeline(&input)).await {
        Ok(Ok(entries)) => entries,
        Ok(Err(e)) => {
            error!("Timeline failed: {}", e);
            return ExitCode::FAILURE;
        }
        Err(e) => {
            error!("Timeline task failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let json: Vec<_> = entries
        .into_iter()
        .map(|entry| serde_json::json!({ "night": entry.night, "result": entry.result }))
        .collect();
    match serde_json::to_string_pretty(&json) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to serialize timeline: {}", e);
            ExitCode::FAILURE
        }
    }
}
