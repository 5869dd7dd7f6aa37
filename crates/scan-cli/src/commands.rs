use std::sync::Arc;

use async_trait::async_trait;
use scan_core::{AdjustField, Command, CommandHandler, ScanError, Store};
use scan_monitor::TradeMonitor;
use scan_scheduler::Scheduler;

/// Parses one line of the `/trade`, `/close`, `/status`, `/adjust`, `/scan`,
/// `/watchlist` command surface (§6). Transport-agnostic: a chat bot or
/// console REPL both just call this before dispatching to `Handler`.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let mut parts = line.split_whitespace();
    let head = parts.next().ok_or_else(|| "empty command".to_string())?;

    match head {
        "/trade" => {
            let symbol = parts.next().ok_or("usage: /trade SYMBOL entry size stop_pct")?;
            let entry: f64 = parts
                .next()
                .ok_or("missing entry")?
                .parse()
                .map_err(|_| "entry must be a number".to_string())?;
            let size_usd: f64 = parts
                .next()
                .ok_or("missing size")?
                .parse()
                .map_err(|_| "size must be a number".to_string())?;
            let stop_pct: f64 = parts
                .next()
                .ok_or("missing stop_pct")?
                .parse()
                .map_err(|_| "stop_pct must be a number".to_string())?;
            Ok(Command::Trade {
                symbol: symbol.to_uppercase(),
                entry,
                size_usd,
                stop_pct,
            })
        }
        "/close" => {
            let symbol = parts.next().ok_or("usage: /close SYMBOL")?;
            Ok(Command::Close {
                symbol: symbol.to_uppercase(),
            })
        }
        "/status" => Ok(Command::Status),
        "/adjust" => {
            let symbol = parts.next().ok_or("usage: /adjust SYMBOL {stop|tp1|tp2|tp3} value")?;
            let field = match parts.next().ok_or("missing field")? {
                "stop" => AdjustField::Stop,
                "tp1" => AdjustField::Tp1,
                "tp2" => AdjustField::Tp2,
                "tp3" => AdjustField::Tp3,
                other => return Err(format!("unknown field {other:?}, expected stop|tp1|tp2|tp3")),
            };
            let value: f64 = parts
                .next()
                .ok_or("missing value")?
                .parse()
                .map_err(|_| "value must be a number".to_string())?;
            Ok(Command::Adjust {
                symbol: symbol.to_uppercase(),
                field,
                value,
            })
        }
        "/scan" => Ok(Command::Scan),
        "/watchlist" => Ok(Command::Watchlist),
        other => Err(format!("unrecognized command {other:?}")),
    }
}

/// Dispatches parsed commands against the live monitor/scheduler/store.
pub struct Handler {
    store: Arc<dyn Store>,
    monitor: Arc<TradeMonitor>,
    scheduler: Arc<Scheduler>,
}

impl Handler {
    pub fn new(store: Arc<dyn Store>, monitor: Arc<TradeMonitor>, scheduler: Arc<Scheduler>) -> Self {
        Self { store, monitor, scheduler }
    }
}

#[async_trait]
impl CommandHandler for Handler {
    async fn handle(&self, command: Command) -> Result<String, ScanError> {
        match command {
            Command::Trade { symbol, entry, size_usd, stop_pct } => {
                let opened_final_score = self
                    .store
                    .recent_scan_results(&symbol, 1)
                    .await?
                    .last()
                    .map(|r| r.final_score)
                    .unwrap_or(0.0);
                self.monitor
                    .register_trade(&symbol, entry, size_usd, stop_pct, opened_final_score)
                    .await?;
                Ok(format!("opened {symbol} @ {entry:.6}, stop {stop_pct:.1}% below entry"))
            }
            Command::Close { symbol } => {
                self.store.close_trade(&symbol).await?;
                Ok(format!("closed {symbol}"))
            }
            Command::Status => {
                let trades = self.store.all_open_trades().await?;
                if trades.is_empty() {
                    return Ok("no open trades".to_string());
                }
                let lines: Vec<String> = trades
                    .iter()
                    .map(|t| format!("{}: entry={:.6} stop={:.6} size=${:.2}", t.symbol, t.entry, t.stop, t.size_usd))
                    .collect();
                Ok(lines.join("\n"))
            }
            Command::Adjust { symbol, field, value } => {
                let Some(mut trade) = self.store.get_trade(&symbol).await? else {
                    return Ok(format!("no open trade for {symbol}"));
                };
                match field {
                    AdjustField::Stop => trade.stop = value,
                    AdjustField::Tp1 => trade.tps[0] = value,
                    AdjustField::Tp2 => trade.tps[1] = value,
                    AdjustField::Tp3 => trade.tps[2] = value,
                }
                self.store.upsert_trade(&trade).await?;
                Ok(format!("adjusted {symbol} {:?} to {value:.6}", field))
            }
            Command::Scan => {
                let report = self.scheduler.run_cycle().await?;
                Ok(format!(
                    "scan complete: {} symbols, {} degraded, {}ms",
                    report.symbols_total, report.symbols_degraded, report.elapsed_ms
                ))
            }
            Command::Watchlist => {
                let trades = self.store.all_open_trades().await?;
                Ok(format!("{} symbol(s) under active trade management", trades.len()))
            }
        }
    }
}
