use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use metagen::{
    Generator,
    config::Config,
    sink,
    worker::{fetch_all, run_generator},
};

pub const NAME: &str = "metagen";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[arg(short = 'c', long = "config", default_value = "/etc/metagen/metagen.toml")]
    config: String,
    /// Fetch every plugin once, print the results as JSON and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let cfg = match Config::new(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _guards = match cfg.init_logger() {
        Ok(guards) => guards,
        Err(e) => {
            eprintln!("Error initializing logging: {e}");
            return ExitCode::FAILURE;
        }
    };

    let generators = cfg.generators();

    if args.once {
        return run_once(&generators).await;
    }

    let sink = match sink::from_config(&cfg.sink) {
        Ok(sink) => sink,
        Err(e) => {
            error!("Failed to instantiate sink: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        "Starting {NAME} version {VERSION} with {} metadata plugin(s), sink: {}",
        generators.len(),
        sink.name()
    );

    for generator in generators {
        tokio::spawn(run_generator(
            generator,
            Arc::clone(&sink),
            cfg.worker.initial_delay(),
        ));
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Unable to listen for shutdown signal: {e}");
        return ExitCode::FAILURE;
    }

    info!("Shutting down");
    ExitCode::SUCCESS
}

async fn run_once(generators: &[Generator]) -> ExitCode {
    let mut failed = false;
    let mut output = Map::new();

    for (namespace, result) in fetch_all(generators).await {
        match result {
            Ok(metadata) => {
                output.insert(namespace.to_string(), metadata);
            }
            Err(e) => {
                warn!("{e}");
                failed = true;
            }
        }
    }

    match serde_json::to_string_pretty(&Value::Object(output)) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            error!("Failed to serialize metadata: {e}");
            return ExitCode::FAILURE;
        }
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
