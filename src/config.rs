use anyhow::Result;
use clap_serde_derive::ClapSerde;
use serde::Deserialize;

#[derive(ClapSerde, Deserialize, Debug)]
pub struct Config {
    /// The address the listener binds to
    #[arg(short, long, env, default_value = "0.0.0.0")]
    pub address: String,

    /// The port the listener binds to
    #[arg(short, long, env, default_value = "8000")]
    pub port: u16,

    /// Connection URL of the shared result cache
    #[arg(long, env, default_value = "redis://127.0.0.1:6379/0")]
    pub redis_url: String,

    /// Number of blocking inference workers
    #[arg(short, long, env, default_value = "4")]
    pub workers: usize,

    /// Path to the GGML whisper model file
    #[arg(short, long, env, default_value = "models/ggml-large-v3.bin")]
    pub model_path: String,

    /// Display name of the model, reported by /health
    #[arg(long, env, default_value = "large-v3")]
    pub model_name: String,

    /// Compute device label, reported by /health
    #[arg(long, env, default_value = "cpu")]
    pub device: String,

    /// Base URL of the text translation backend
    #[arg(long, env, default_value = "http://127.0.0.1:5000")]
    pub translator_url: String,

    /// Lifetime of cached results in seconds
    #[arg(long, env, default_value = "3600")]
    pub cache_ttl: u64,

    /// OTLP collector endpoint, telemetry export is disabled when empty
    #[arg(long, env, default_value = "")]
    pub otlp_endpoint: String,

    /// Log to the console even when an OTLP endpoint is set
    #[arg(long, env, default_value = "false")]
    pub console_log: bool,
}

impl Config {
    pub fn from_toml(path: &str) -> Result<Self> {
        let str = std::fs::read_to_string(path)?;
        let config = toml::from_str(&str)?;
        Ok(config)
    }
}
