//! audio-relay server binary
//!
//! Reads `.env`, loads the JSON configuration named by `AUDIO_RELAY_CONFIG`
//! (default `audio-relay.json`, optional), then runs the worker pool and the
//! REST API until SIGTERM or SIGINT.

use audio_relay::{Config, RelayService};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const CONFIG_ENV: &str = "AUDIO_RELAY_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "audio-relay.json";
const LOG_JSON_ENV: &str = "AUDIO_RELAY_LOG_JSON";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env is normal in production
    let _ = dotenvy::dotenv();

    init_tracing()?;

    let config = load_config()?;
    tracing::info!(
        bind_address = %config.api.bind_address,
        storage = %config.relay.base_url,
        gate_backend = ?config.gate.backend,
        "Configuration loaded"
    );

    let service = RelayService::new(config)?;
    let config = Arc::new(service.config().clone());
    let service = Arc::new(service);

    let dispatcher = service.start_worker_pool();

    audio_relay::api::serve_until(service.clone(), config, audio_relay::shutdown_signal()).await?;

    service.shutdown().await?;
    if let Some(dispatcher) = dispatcher {
        let _ = dispatcher.await;
    }

    tracing::info!("audio-relay stopped");
    Ok(())
}

fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "{}=info,tower_http=info,axum=info",
            env!("CARGO_CRATE_NAME")
        )
        .into()
    });
    let json = std::env::var(LOG_JSON_ENV).is_ok_and(|v| v == "1" || v == "true");

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(false))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .try_init()?;
    }
    Ok(())
}

fn load_config() -> audio_relay::Result<Config> {
    let mut config = match std::env::var(CONFIG_ENV) {
        Ok(path) => Config::load(&PathBuf::from(path))?,
        Err(_) => {
            let path = PathBuf::from(DEFAULT_CONFIG_PATH);
            if path.exists() {
                Config::load(&path)?
            } else {
                tracing::info!(path = %path.display(), "No configuration file, using defaults");
                Config::default()
            }
        }
    };

    config.apply_env();
    config.validate()?;
    Ok(config)
}
