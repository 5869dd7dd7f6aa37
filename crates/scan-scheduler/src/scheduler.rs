use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use scan_core::{Alerter, CycleReport, MarketSource, ScanError, Store};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::mode::{assign_mode, Mode};

/// Tunables for one scan cycle. Defaults match §4.8: bounded concurrency of
/// 6, a 30s per-symbol budget, and a cycle deadline 30s short of the cadence
/// so the next cycle never piles on top of a still-running one.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub max_concurrency: usize,
    pub per_symbol_timeout: Duration,
    pub cadence: Duration,
    pub account_usd: f64,
    pub risk_pct: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 6,
            per_symbol_timeout: Duration::from_secs(30),
            cadence: Duration::from_secs(5 * 60),
            account_usd: 10_000.0,
            risk_pct: 0.02,
        }
    }
}

impl SchedulerConfig {
    fn cycle_deadline(&self) -> Duration {
        self.cadence.saturating_sub(Duration::from_secs(30))
    }
}

/// Drives one scan cycle across the union of symbols every configured
/// `MarketSource` lists, fanning out with bounded concurrency and a
/// per-symbol in-flight guard so the same symbol is never scanned twice
/// concurrently (§4.8 step 4, §5).
pub struct Scheduler {
    store: Arc<dyn Store>,
    alerter: Arc<dyn Alerter>,
    sources: Vec<Arc<dyn MarketSource>>,
    config: SchedulerConfig,
    in_flight: DashMap<String, ()>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn Store>,
        alerter: Arc<dyn Alerter>,
        sources: Vec<Arc<dyn MarketSource>>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            alerter,
            sources,
            config,
            in_flight: DashMap::new(),
        }
    }

    async fn union_symbols(&self) -> Result<Vec<String>, ScanError> {
        let mut symbols = std::collections::BTreeSet::new();
        for source in &self.sources {
            for s in source.list_futures_symbols().await? {
                symbols.insert(s);
            }
        }
        Ok(symbols.into_iter().collect())
    }

    /// Runs exactly one cycle over the current symbol union and returns its
    /// aggregate report. Errors from individual symbols degrade that
    /// symbol's quality rather than aborting the cycle (§7: fetch errors are
    /// never fatal to the cycle).
    pub async fn run_cycle(&self) -> Result<CycleReport, ScanError> {
        let started_at = Utc::now();
        let start = std::time::Instant::now();
        let symbols = self.union_symbols().await?;
        let deadline = self.config.cycle_deadline();

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut tasks: JoinSet<(String, Result<scan_core::ScanResult, ScanError>)> = JoinSet::new();

        let mut symbols_bootstrap = 0usize;
        for symbol in &symbols {
            if self.in_flight.contains_key(symbol) {
                continue;
            }
            if matches!(assign_mode(self.store.as_ref(), symbol).await, Ok(Mode::Bootstrap)) {
                symbols_bootstrap += 1;
            }
        }

        for symbol in symbols.clone() {
            if self.in_flight.contains_key(&symbol) {
                continue;
            }
            self.in_flight.insert(symbol.clone(), ());

            let permit = semaphore.clone().acquire_owned().await.expect("semaphore never closes");
            let store = self.store.clone();
            let alerter = self.alerter.clone();
            let sources = self.sources.clone();
            let per_symbol_timeout = self.config.per_symbol_timeout;
            let account_usd = self.config.account_usd;
            let risk_pct = self.config.risk_pct;

            tasks.spawn(async move {
                let _permit = permit;
                let result = tokio::time::timeout(
                    per_symbol_timeout,
                    crate::pipeline::run_symbol(store.as_ref(), alerter.as_ref(), &sources, &symbol, account_usd, risk_pct),
                )
                .await
                .unwrap_or_else(|_| {
                    Err(ScanError::TransientFetch {
                        exchange: "scheduler".to_string(),
                        symbol: symbol.clone(),
                        detail: "per-symbol timeout exceeded".to_string(),
                    })
                });
                (symbol, result)
            });
        }

        let mut classifications = std::collections::BTreeMap::new();
        let mut symbols_degraded = 0usize;

        let cycle_wait = tokio::time::sleep(deadline);
        tokio::pin!(cycle_wait);

        loop {
            tokio::select! {
                joined = tasks.join_next() => {
                    match joined {
                        Some(Ok((symbol, outcome))) => {
                            self.in_flight.remove(&symbol);
                            match outcome {
                                Ok(result) => {
                                    *classifications.entry(result.classification.label().to_string()).or_insert(0) += 1;
                                    if result.quality != scan_core::Quality::High {
                                        symbols_degraded += 1;
                                    }
                                }
                                Err(err) => {
                                    symbols_degraded += 1;
                                    if err.is_fatal() {
                                        let _ = self.alerter.send_operator_notice(&format!("{symbol}: {err}")).await;
                                    }
                                }
                            }
                        }
                        Some(Err(join_err)) => {
                            tracing::error!(%join_err, "symbol task panicked");
                        }
                        None => break,
                    }
                }
                _ = &mut cycle_wait => {
                    tracing::warn!(remaining = tasks.len(), "cycle deadline reached, abandoning remaining symbols");
                    tasks.abort_all();
                    break;
                }
            }
        }

        let report = CycleReport {
            started_at,
            symbols_total: symbols.len(),
            symbols_bootstrap,
            symbols_degraded,
            elapsed_ms: start.elapsed().as_millis() as u64,
            classifications,
        };
        self.alerter.send_cycle_report(&report).await?;
        Ok(report)
    }

    /// Runs cycles on `config.cadence` until the process is interrupted.
    pub async fn run_forever(&self) -> Result<(), ScanError> {
        let mut interval = tokio::time::interval(self.config.cadence);
        loop {
            interval.tick().await;
            if let Err(err) = self.run_cycle().await {
                tracing::error!(%err, "scan cycle failed");
            }
        }
    }
}
