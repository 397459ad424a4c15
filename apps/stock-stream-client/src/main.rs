//! Stock Stream Client Binary
//!
//! Connects to the dashboard backend and logs chart snapshots and ticks for
//! a list of symbols until interrupted.
//!
//! # Usage
//!
//! ```bash
//! STREAM_SYMBOLS=005930,000660 cargo run -p stock-stream-client
//! ```
//!
//! # Environment Variables
//!
//! - `STREAM_ORIGIN`: Page origin the endpoint derives from (default: <http://localhost:8000>)
//! - `STREAM_PATH`: Endpoint path (default: /ws/stocks)
//! - `STREAM_SYMBOLS`: Comma-separated symbols to subscribe (default: none)
//! - `STREAM_DEFAULT_TIMEFRAME`: Timeframe for subscriptions (default: D)
//! - `STREAM_RECONNECT_DELAY_MS`: Delay before a redial (default: 3000)
//! - `STREAM_METRICS_PORT`: Prometheus metrics port, 0 disables (default: 0)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log level (default: info)

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use stock_stream_client::{ClientConfig, StreamClient, Symbol, SymbolConsumer, init_metrics};
use tokio::signal;

/// How long to wait for the dispatch loop after shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider was already installed");
    }

    load_dotenv();

    let _telemetry_guard = stock_stream_client::init_telemetry()?;

    tracing::info!("Starting stock stream client");

    let config = ClientConfig::from_env().context("invalid stream configuration")?;
    log_config(&config);

    if config.metrics_port != 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
        init_metrics(addr)?;
    }

    let (client, dispatch) = StreamClient::spawn(&config);

    let symbols = symbols_from_env();
    if symbols.is_empty() {
        tracing::warn!("STREAM_SYMBOLS is empty, connecting without subscriptions");
        client.connect();
    }
    for symbol in symbols {
        client.subscribe(symbol.clone(), logging_consumer(symbol));
    }

    let mut connected = client.connected();
    tokio::spawn(async move {
        while connected.changed().await.is_ok() {
            let is_connected = *connected.borrow_and_update();
            tracing::info!(connected = is_connected, "Connection status changed");
        }
    });

    await_shutdown().await;
    client.shutdown();

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, dispatch).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "Dispatch loop panicked"),
        Err(_) => tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Dispatch loop did not stop in time"
        ),
    }

    tracing::info!("Stock stream client stopped");
    Ok(())
}

/// Consumer that logs everything it receives for `symbol`.
fn logging_consumer(symbol: Symbol) -> SymbolConsumer {
    let chart_symbol = symbol.clone();
    SymbolConsumer::new()
        .on_chart(move |chart| {
            tracing::info!(symbol = %chart_symbol, data = %chart.as_value(), "Chart snapshot");
        })
        .on_tick(move |tick| {
            tracing::info!(symbol = %symbol, data = %tick.payload(), "Tick");
        })
}

/// Parse `STREAM_SYMBOLS` into symbols, skipping blanks and duplicates.
fn symbols_from_env() -> Vec<Symbol> {
    parse_symbols(&std::env::var("STREAM_SYMBOLS").unwrap_or_default())
}

fn parse_symbols(raw: &str) -> Vec<Symbol> {
    let mut symbols: Vec<Symbol> = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let symbol = Symbol::from(part);
        if !symbols.contains(&symbol) {
            symbols.push(symbol);
        }
    }
    symbols
}

/// Log the parsed configuration.
fn log_config(config: &ClientConfig) {
    tracing::info!(
        endpoint = %config.endpoint(),
        default_timeframe = %config.stream.default_timeframe,
        reconnect_delay_ms = u64::try_from(config.reconnect.delay_initial.as_millis()).unwrap_or(u64::MAX),
        metrics_port = config.metrics_port,
        "Configuration loaded"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_symbols_trims_and_dedupes() {
        let symbols = parse_symbols(" 005930, 000660 ,,005930 ");
        assert_eq!(symbols, vec![Symbol::from("005930"), Symbol::from("000660")]);
    }

    #[test]
    fn parse_symbols_empty() {
        assert!(parse_symbols("").is_empty());
        assert!(parse_symbols(" , ").is_empty());
    }
}
