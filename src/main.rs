use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use clap_serde_derive::ClapSerde;
use tokio::net::TcpListener;
use tracing::{error, info};

use whisper_relay::config::Config;
use whisper_relay::relay::cache::store::RedisStore;
use whisper_relay::relay::cache::ResultCache;
use whisper_relay::relay::model::whisper::WhisperEngine;
use whisper_relay::relay::pool::InferencePool;
use whisper_relay::relay::translate::HttpTranslator;
use whisper_relay::relay::{AppState, RuntimeSettings};
use whisper_relay::routes;
use whisper_relay::telemetry::init_telemetry;

#[cfg(unix)]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env, default_value = "WhisperRelay.toml")]
    config_file: String,

    /// Configuration options
    #[command(flatten)]
    pub opt_config: <Config as ClapSerde>::Opt,
}

macro_rules! exit_err {
    ($code:expr, $fmt:expr $(, $arg:expr)*) => {
        {
            error!($fmt $(, $arg)*);
            std::process::exit($code);
        }
    };
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = match Config::from_toml(&args.config_file) {
        Ok(conf) => conf.merge(args.opt_config),
        Err(err) => {
            if args.config_file == "WhisperRelay.toml" {
                Config::default().merge(args.opt_config)
            } else {
                eprintln!(
                    "Failed to read configuration file {} with error: {}",
                    args.config_file, err
                );
                std::process::exit(1);
            }
        }
    };

    let otlp_endpoint = (!config.otlp_endpoint.is_empty()).then(|| config.otlp_endpoint.clone());
    init_telemetry(&otlp_endpoint, config.console_log);

    info!(
        model = config.model_name,
        path = config.model_path,
        device = config.device,
        "Loading speech model"
    );
    let model = match WhisperEngine::load(&config.model_path) {
        Ok(engine) => Arc::new(engine),
        Err(err) => exit_err!(1, "Failed to load model {}: {:#}", config.model_path, err),
    };

    let store = match RedisStore::connect(&config.redis_url).await {
        Ok(store) => Arc::new(store),
        Err(err) => exit_err!(1, "Failed to connect to {}: {:#}", config.redis_url, err),
    };

    let translator = match HttpTranslator::new(&config.translator_url) {
        Ok(client) => Arc::new(client),
        Err(err) => exit_err!(1, "Failed to build translation client: {:#}", err),
    };

    let state = AppState {
        model,
        pool: Arc::new(InferencePool::new(config.workers)),
        cache: ResultCache::new(store),
        translator,
        settings: Arc::new(RuntimeSettings {
            model_name: config.model_name.clone(),
            device: config.device.clone(),
            gpu_available: config.device != "cpu",
            cache_ttl: config.cache_ttl,
        }),
    };

    let listener = TcpListener::bind(format!("{}:{}", config.address, config.port)).await?;
    info!("Listening on {}", listener.local_addr()?);
    info!(
        workers = config.workers,
        cache_ttl = config.cache_ttl,
        translator = config.translator_url,
        "Relay ready"
    );

    axum::serve(listener, routes::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutting down..."),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }
}
