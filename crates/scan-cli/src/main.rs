use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use scan_core::{MarketSource, Store};
use scan_market_source::RestMarketSource;
use scan_monitor::TradeMonitor;
use scan_scheduler::{Scheduler, SchedulerConfig};
use scan_store::{ScanDb, ScanStore};

mod alerter;
mod commands;
mod config;

use alerter::ConsoleAlerter;
use config::AppConfig;

const EXIT_OK: i32 = 0;
const EXIT_CONFIG_ERROR: i32 = 1;
const EXIT_ADAPTER_ERROR: i32 = 2;
const EXIT_STORE_CORRUPTION: i32 = 3;

fn init_tracing() {
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    std::panic::set_hook(Box::new(|info| {
        tracing::error!("PANIC: {info}");
    }));

    let args: Vec<String> = std::env::args().skip(1).collect();
    let code = run(&args).await;
    std::process::exit(code);
}

async fn run(args: &[String]) -> i32 {
    let command = args.first().map(String::as_str).unwrap_or("run");

    if command == "setup" {
        let path = std::env::var("PUMPSCAN_CONFIG").unwrap_or_else(|_| "pumpscan.toml".to_string());
        return match config::write_starter_config(&path) {
            Ok(()) => {
                tracing::info!("wrote starter config to {path}");
                EXIT_OK
            }
            Err(err) => {
                tracing::error!(%err, "setup failed");
                EXIT_CONFIG_ERROR
            }
        };
    }

    let config = match AppConfig::load() {
        Ok(c) => c,
        Err(err) => {
            tracing::error!(%err, "configuration error");
            return EXIT_CONFIG_ERROR;
        }
    };

    let db = match ScanDb::new(&config.store.path).await {
        Ok(db) => db,
        Err(err) => {
            tracing::error!(%err, "failed to open store");
            return EXIT_STORE_CORRUPTION;
        }
    };
    let store: Arc<dyn Store> = Arc::new(ScanStore::new(db));

    match command {
        "run" if args.iter().any(|a| a == "--cleanup") => run_cleanup(&config, store).await,
        "run" if args.iter().any(|a| a == "--stats") => run_stats(store).await,
        "run" if args.iter().any(|a| a == "--once") => run_once(&config, store).await,
        "run" => run_forever(&config, store).await,
        other => {
            tracing::error!("unrecognized subcommand {other:?}; expected run|setup");
            EXIT_CONFIG_ERROR
        }
    }
}

fn build_sources(config: &AppConfig) -> Result<Vec<Arc<dyn MarketSource>>> {
    let sources: Vec<Arc<dyn MarketSource>> = config
        .exchanges
        .iter()
        .filter(|e| e.enabled)
        .map(|e| {
            Arc::new(RestMarketSource::new(e.name.clone(), e.base_url.clone(), e.requests_per_second)) as Arc<dyn MarketSource>
        })
        .collect();
    if sources.is_empty() {
        anyhow::bail!("no enabled exchanges configured");
    }
    Ok(sources)
}

fn build_scheduler(config: &AppConfig, store: Arc<dyn Store>, alerter: Arc<ConsoleAlerter>) -> Result<Scheduler> {
    let sources = build_sources(config)?;
    let scheduler_config = SchedulerConfig {
        max_concurrency: config.scan.concurrency,
        per_symbol_timeout: Duration::from_secs(config.scan.per_symbol_timeout_s),
        cadence: Duration::from_secs(config.scan.cadence_seconds),
        account_usd: config.risk.account_usd,
        risk_pct: config.risk.risk_pct,
    };
    Ok(Scheduler::new(store, alerter, sources, scheduler_config))
}

async fn run_once(config: &AppConfig, store: Arc<dyn Store>) -> i32 {
    let alerter = Arc::new(ConsoleAlerter::new(config.min_classification()));
    let scheduler = match build_scheduler(config, store, alerter) {
        Ok(s) => s,
        Err(err) => {
            tracing::error!(%err, "failed to start adapters");
            return EXIT_ADAPTER_ERROR;
        }
    };

    match scheduler.run_cycle().await {
        Ok(report) => {
            tracing::info!(
                symbols_total = report.symbols_total,
                elapsed_ms = report.elapsed_ms,
                "single cycle complete"
            );
            EXIT_OK
        }
        Err(err) if err.is_fatal() => {
            tracing::error!(%err, "fatal error during cycle");
            EXIT_STORE_CORRUPTION
        }
        Err(err) => {
            tracing::error!(%err, "cycle failed");
            EXIT_ADAPTER_ERROR
        }
    }
}

async fn run_forever(config: &AppConfig, store: Arc<dyn Store>) -> i32 {
    let alerter = Arc::new(ConsoleAlerter::new(config.min_classification()));
    let scheduler = match build_scheduler(config, store.clone(), alerter.clone()) {
        Ok(s) => Arc::new(s),
        Err(err) => {
            tracing::error!(%err, "failed to start adapters");
            return EXIT_ADAPTER_ERROR;
        }
    };

    let sources = match build_sources(config) {
        Ok(s) => s,
        Err(err) => {
            tracing::error!(%err, "failed to start adapters");
            return EXIT_ADAPTER_ERROR;
        }
    };
    let monitor = Arc::new(TradeMonitor::new(store.clone(), sources, alerter as Arc<dyn scan_core::Alerter>));

    tracing::info!(
        "pumpscan running. cadence={}s concurrency={} account=${:.0}. Press Ctrl+C to stop.",
        config.scan.cadence_seconds,
        config.scan.concurrency,
        config.risk.account_usd,
    );

    let scheduler_task = tokio::spawn({
        let scheduler = scheduler.clone();
        async move {
            if let Err(err) = scheduler.run_forever().await {
                tracing::error!(%err, "scheduler loop exited");
            }
        }
    });

    let monitor_task = tokio::spawn({
        let monitor = monitor.clone();
        let cadence = Duration::from_secs(300);
        async move {
            let mut interval = tokio::time::interval(cadence);
            loop {
                interval.tick().await;
                if let Err(err) = monitor.tick().await {
                    tracing::error!(%err, "trade monitor tick failed");
                }
            }
        }
    });

    let shutdown = async {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received SIGINT");
            }
        }
    };
    tokio::pin!(shutdown);

    tokio::select! {
        _ = shutdown => {},
        result = scheduler_task => {
            tracing::error!(?result, "scheduler task ended unexpectedly");
        }
        result = monitor_task => {
            tracing::error!(?result, "monitor task ended unexpectedly");
        }
    }

    EXIT_OK
}

async fn run_stats(store: Arc<dyn Store>) -> i32 {
    let trades = match store.all_open_trades().await {
        Ok(t) => t,
        Err(err) => {
            tracing::error!(%err, "failed to read trades");
            return EXIT_STORE_CORRUPTION;
        }
    };
    println!("open trades: {}", trades.len());
    for trade in &trades {
        println!(
            "  {}: entry={:.6} stop={:.6} size=${:.2} trail_stage={}",
            trade.symbol, trade.entry, trade.stop, trade.size_usd, trade.trail_stage
        );
    }
    EXIT_OK
}

async fn run_cleanup(config: &AppConfig, store: Arc<dyn Store>) -> i32 {
    let retention = Duration::from_secs(u64::from(config.store.retention_days) * 86_400);
    let cutoff = (chrono::Utc::now() - chrono::Duration::from_std(retention).unwrap_or_default()).timestamp_millis();

    match store.purge_older_than(cutoff).await {
        Ok(removed) => {
            tracing::info!(removed, retention_days = config.store.retention_days, "cleanup complete");
            EXIT_OK
        }
        Err(err) => {
            tracing::error!(%err, "cleanup failed");
            EXIT_STORE_CORRUPTION
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_sources_rejects_empty_exchange_list() {
        let config = AppConfig {
            exchanges: Vec::new(),
            scan: config::ScanConfig::default(),
            alerts: config::AlertsConfig::default(),
            risk: config::RiskConfig {
                account_usd: 10_000.0,
                risk_pct: 0.02,
                max_open_trades: 3,
            },
            store: config::StoreConfig::default(),
            thresholds: config::ThresholdsConfig::default(),
        };
        assert!(build_sources(&config).is_err());
    }
}
