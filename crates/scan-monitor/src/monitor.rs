use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use scan_core::{Alerter, MarketSource, RegisteredTrade, ScanError, Store, TradeState};

use crate::trail;

const DEGRADATION_DECLINED: u8 = 0b01;
const DEGRADATION_BELOW_FLOOR: u8 = 0b10;
const DEGRADATION_FLOOR: f64 = 48.0;
const DEGRADATION_DROP: f64 = 10.0;
const TICKS_PER_HOUR: u64 = 12; // at the 5-minute cadence this module runs on.

/// One outcome of evaluating a registered trade against its current price
/// and latest scan result (§4.9).
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    StopHit { symbol: String, price: f64 },
    TakeProfitHit { symbol: String, index: usize, price: f64 },
    TrailAdjusted { symbol: String, new_stop: f64 },
    Degradation { symbol: String, reason: String },
}

/// Periodic watcher over every open `RegisteredTrade`: stop/TP detection,
/// the trailing-stop schedule, and score-degradation warnings. Runs as an
/// independent 5-minute tick alongside the scan scheduler (§5).
pub struct TradeMonitor {
    store: Arc<dyn Store>,
    sources: Vec<Arc<dyn MarketSource>>,
    alerter: Arc<dyn Alerter>,
    ticks: AtomicU64,
}

impl TradeMonitor {
    pub fn new(store: Arc<dyn Store>, sources: Vec<Arc<dyn MarketSource>>, alerter: Arc<dyn Alerter>) -> Self {
        Self {
            store,
            sources,
            alerter,
            ticks: AtomicU64::new(0),
        }
    }

    async fn fetch_price(&self, symbol: &str) -> Option<f64> {
        for source in &self.sources {
            if let Ok(Some(ticker)) = source.fetch_ticker(symbol).await {
                return Some(ticker.price);
            }
        }
        None
    }

    /// Runs one monitoring pass over every open trade, persisting any stop,
    /// trail, or take-profit updates and alerting on each event.
    pub async fn tick(&self) -> Result<Vec<MonitorEvent>, ScanError> {
        let mut events = Vec::new();
        let trades = self.store.all_open_trades().await?;

        for mut trade in trades {
            let Some(price_now) = self.fetch_price(&trade.symbol).await else {
                tracing::warn!(symbol = %trade.symbol, "trade monitor: no price available this tick");
                continue;
            };

            if price_now <= trade.stop {
                self.store.close_trade(&trade.symbol).await?;
                events.push(MonitorEvent::StopHit {
                    symbol: trade.symbol.clone(),
                    price: price_now,
                });
                self.notify(&format!(
                    "STOP_HIT {} @ {:.6} (stop was {:.6})",
                    trade.symbol, price_now, trade.stop
                ))
                .await;
                continue;
            }

            for (i, tp) in trade.tps.iter().enumerate() {
                if !trade.tps_hit[i] && price_now >= *tp {
                    trade.tps_hit[i] = true;
                    events.push(MonitorEvent::TakeProfitHit {
                        symbol: trade.symbol.clone(),
                        index: i,
                        price: price_now,
                    });
                    self.notify(&format!(
                        "TP_HIT {} tp{} @ {:.6} — sell 25%",
                        trade.symbol,
                        i + 1,
                        price_now
                    ))
                    .await;
                }
            }

            let (new_stop, new_stage) = trail::apply(trade.entry, trade.stop, trade.trail_stage, price_now);
            if new_stop > trade.stop {
                trade.stop = new_stop;
                trade.trail_stage = new_stage;
                events.push(MonitorEvent::TrailAdjusted {
                    symbol: trade.symbol.clone(),
                    new_stop,
                });
            }

            if let Some(reason) = self.check_degradation(&mut trade).await? {
                events.push(MonitorEvent::Degradation {
                    symbol: trade.symbol.clone(),
                    reason: reason.clone(),
                });
                self.notify(&format!("DEGRADATION {}: {reason}", trade.symbol)).await;
            }

            self.store.upsert_trade(&trade).await?;
        }

        let tick_no = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
        if tick_no.is_multiple_of(TICKS_PER_HOUR) {
            self.send_hourly_digest().await?;
        }

        Ok(events)
    }

    async fn check_degradation(&self, trade: &mut RegisteredTrade) -> Result<Option<String>, ScanError> {
        let recent = self.store.recent_scan_results(&trade.symbol, 1).await?;
        let Some(latest) = recent.last() else {
            return Ok(None);
        };

        let mut warned = trade.degradation_warned_at.unwrap_or(0);
        let declined = trade.opened_final_score - latest.final_score >= DEGRADATION_DROP;
        let below_floor = latest.final_score < DEGRADATION_FLOOR;

        let mut reason = None;
        if declined && warned & DEGRADATION_DECLINED == 0 {
            reason = Some(format!(
                "final score declined from {:.1} to {:.1} since open",
                trade.opened_final_score, latest.final_score
            ));
            warned |= DEGRADATION_DECLINED;
        } else if below_floor && warned & DEGRADATION_BELOW_FLOOR == 0 {
            reason = Some(format!("final score dropped to {:.1}, below the watch floor", latest.final_score));
            warned |= DEGRADATION_BELOW_FLOOR;
        }

        if reason.is_some() {
            trade.degradation_warned_at = Some(warned);
        }
        Ok(reason)
    }

    async fn send_hourly_digest(&self) -> Result<(), ScanError> {
        let trades = self.store.all_open_trades().await?;
        if trades.is_empty() {
            return Ok(());
        }

        let mut lines = vec![format!("hourly status digest — {} open trade(s)", trades.len())];
        for trade in &trades {
            if trade.state != TradeState::Open {
                continue;
            }
            let price_now = self.fetch_price(&trade.symbol).await.unwrap_or(trade.entry);
            let pnl_pct = (price_now / trade.entry - 1.0) * 100.0;
            let score = self
                .store
                .recent_scan_results(&trade.symbol, 1)
                .await?
                .last()
                .map(|r| r.final_score)
                .unwrap_or(trade.opened_final_score);
            lines.push(format!(
                "{}: price={:.6} pnl={:+.2}% score={:.1} stop={:.6}",
                trade.symbol, price_now, pnl_pct, score, trade.stop
            ));
        }
        self.notify(&lines.join("\n")).await;
        Ok(())
    }

    async fn notify(&self, message: &str) {
        if let Err(err) = self.alerter.send_operator_notice(message).await {
            tracing::error!(%err, "failed to dispatch trade monitor notice");
        }
    }

    /// Registers a new trade from a `/trade` command (§4.9, §6).
    pub async fn register_trade(&self, symbol: &str, entry: f64, size_usd: f64, stop_pct: f64, opened_final_score: f64) -> Result<(), ScanError> {
        let trade = RegisteredTrade {
            symbol: symbol.to_string(),
            entry,
            size_usd,
            stop: entry * (1.0 - stop_pct),
            tps: [entry * 1.03, entry * 1.055, entry * 1.09, entry * 1.09],
            tps_hit: [false; 4],
            state: TradeState::Open,
            opened_at: Utc::now(),
            trail_stage: 0,
            opened_final_score,
            degradation_warned_at: None,
        };
        self.store.upsert_trade(&trade).await
    }
}
