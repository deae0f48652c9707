//! HEDGELOCK: paired long/short martingale engine.
//!
//! Entry point. Loads configuration, initialises structured logging, starts
//! the public price feed and one account loop per configured account, and
//! waits for Ctrl+C. On shutdown every loop finishes its in-flight tick and
//! persists its state before the process exits.

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

use hedgelock::config::AppConfig;
use hedgelock::engine::account::{AccountRunner, RunnerSettings};
use hedgelock::events::{log_events, EventSink};
use hedgelock::exchange::paper::PaperGateway;
use hedgelock::exchange::retry::RetryingGateway;
use hedgelock::exchange::ticker::{run_price_feed, PriceBoard, PublicTicker};
use hedgelock::exchange::ExchangeGateway;
use hedgelock::storage::{JsonFileStore, StateStore};

const BANNER: &str = r#"
 _   _ _____ ____   ____ _____ _     ___   ____ _  __
| | | | ____|  _ \ / ___| ____| |   / _ \ / ___| |/ /
| |_| |  _| | | | | |  _|  _| | |  | | | | |   | ' /
|  _  | |___| |_| | |_| | |___| |__| |_| | |___| . \
|_| |_|_____|____/ \____|_____|_____\___/ \____|_|\_\

  Paired martingale with reversible hedge locks
  v0.1.0 (paper trading)
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::var("HEDGELOCK_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        config = %config_path,
        accounts = cfg.accounts.len(),
        tick_interval_ms = cfg.engine.tick_interval_ms,
        state_dir = %cfg.engine.state_dir,
        "HEDGELOCK starting up"
    );

    // -- Shared services -------------------------------------------------

    let store: Arc<dyn StateStore> = Arc::new(JsonFileStore::new(&cfg.engine.state_dir)?);
    let events = EventSink::new(cfg.engine.event_buffer);
    let prices = Arc::new(PriceBoard::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let event_log = tokio::spawn(log_events(events.subscribe()));

    let mut symbols: Vec<String> = cfg.accounts.iter().map(|a| a.symbol.clone()).collect();
    symbols.sort();
    symbols.dedup();
    let ticker = PublicTicker::new(&cfg.price_feed.base_url, cfg.price_feed.timeout_secs)?;
    let feed = tokio::spawn(run_price_feed(
        ticker,
        prices.clone(),
        symbols,
        Duration::from_millis(cfg.price_feed.poll_interval_ms.max(1)),
        shutdown_rx.clone(),
    ));

    // -- Account loops ---------------------------------------------------

    let settings = RunnerSettings::from_config(&cfg);
    // Senders stay alive for the process lifetime; an external reloader
    // would push merged strategy updates through them.
    let mut config_senders = Vec::new();
    let mut runners = Vec::new();

    for account in &cfg.accounts {
        let gateway: Arc<dyn ExchangeGateway> = Arc::new(RetryingGateway::new(PaperGateway::new(
            &format!("paper-{}", account.id),
            prices.clone(),
        )));
        let (config_tx, config_rx) = watch::channel(account.strategy.clone());
        config_senders.push(config_tx);

        let mut runner = AccountRunner::new(
            &account.id,
            &account.symbol,
            gateway,
            store.clone(),
            events.clone(),
            config_rx,
            settings.clone(),
        );
        if let Err(e) = runner.load(Utc::now()) {
            error!(account = %account.id, error = %e, "Failed to load state, account not started");
            continue;
        }
        runners.push(tokio::spawn(runner.run(shutdown_rx.clone())));
    }

    info!(running = runners.len(), "Account loops started");

    // -- Shutdown --------------------------------------------------------

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C, shutting down");
    }
    info!("Shutdown signal received, waiting for in-flight ticks");
    let _ = shutdown_tx.send(true);

    for result in futures::future::join_all(runners).await {
        match result {
            Ok(state) => info!(state = %state, "Account stopped"),
            Err(e) => error!(error = %e, "Account task panicked"),
        }
    }
    let _ = feed.await;

    drop(config_senders);
    drop(events);
    let _ = event_log.await;

    info!("HEDGELOCK stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("hedgelock=info"));

    let json_logging = std::env::var("HEDGELOCK_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
