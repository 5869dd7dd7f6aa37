use async_trait::async_trait;

use crate::error::ScanError;
use crate::types::{
    Alert, BookSnapshot, Candle, CycleReport, FundingPoint, LsPoint, Millis, OiPoint,
    RegisteredTrade, Sample, ScanResult, SeriesKind, TickerPoint,
};

/// Uniform view over one exchange's futures market data (§4.2).
///
/// Missing data is reported as absent (`None` / empty `Vec`), never as zero —
/// callers must be able to distinguish "this exchange doesn't list it" from
/// "open interest is zero".
#[async_trait]
pub trait MarketSource: Send + Sync {
    /// Stable name used to key rate limits and quality attribution.
    fn name(&self) -> &str;

    async fn list_futures_symbols(&self) -> Result<Vec<String>, ScanError>;

    async fn fetch_candles(&self, symbol: &str, limit: usize) -> Result<Vec<Candle>, ScanError>;

    async fn fetch_ticker(&self, symbol: &str) -> Result<Option<TickerPoint>, ScanError>;

    async fn fetch_oi(&self, symbol: &str) -> Result<Option<OiPoint>, ScanError>;

    async fn fetch_funding(&self, symbol: &str) -> Result<Option<FundingPoint>, ScanError>;

    async fn fetch_book(&self, symbol: &str, depth: usize) -> Result<Option<BookSnapshot>, ScanError>;

    async fn fetch_ls_ratio(&self, symbol: &str) -> Result<Option<LsPoint>, ScanError>;
}

/// Append-only per-(symbol, series) store (§4.1). Pure value semantics: the
/// trait never leaks the backing engine (SQLite, in-memory, etc).
#[async_trait]
pub trait Store: Send + Sync {
    /// Idempotent on `t`: reinserting the same timestamp replaces the payload.
    async fn append(&self, symbol: &str, sample: Sample) -> Result<(), ScanError>;

    /// Ascending-`t` slice in `[t_from, t_to]`.
    async fn range(
        &self,
        symbol: &str,
        kind: SeriesKind,
        t_from: Millis,
        t_to: Millis,
    ) -> Result<Vec<Sample>, ScanError>;

    /// Last `n` samples, ascending `t`.
    async fn latest(&self, symbol: &str, kind: SeriesKind, n: usize) -> Result<Vec<Sample>, ScanError>;

    /// Sample count currently retained for `(symbol, kind)`, used by the
    /// scheduler's bootstrap/incremental mode assignment (§4.8).
    async fn count(&self, symbol: &str, kind: SeriesKind) -> Result<usize, ScanError>;

    async fn push_scan_result(&self, result: ScanResult) -> Result<(), ScanError>;

    /// Last `n` ScanResults for a symbol, ascending `t` (newest last).
    async fn recent_scan_results(&self, symbol: &str, n: usize) -> Result<Vec<ScanResult>, ScanError>;

    async fn upsert_trade(&self, trade: &RegisteredTrade) -> Result<(), ScanError>;

    async fn get_trade(&self, symbol: &str) -> Result<Option<RegisteredTrade>, ScanError>;

    async fn all_open_trades(&self) -> Result<Vec<RegisteredTrade>, ScanError>;

    async fn close_trade(&self, symbol: &str) -> Result<(), ScanError>;

    /// Deletes series samples and scan results older than `cutoff` (epoch
    /// millis). Returns the number of rows removed. Used by `run --cleanup`
    /// and the scheduler's retention sweep (§6 `store.retention_days`).
    async fn purge_older_than(&self, cutoff: Millis) -> Result<u64, ScanError>;
}

/// Sink-neutral alert dispatch (§6). Console and chat-bot sinks implement the
/// same trait and are interchangeable.
#[async_trait]
pub trait Alerter: Send + Sync {
    async fn send_alert(&self, alert: &Alert) -> Result<(), ScanError>;

    async fn send_cycle_report(&self, report: &CycleReport) -> Result<(), ScanError>;

    /// Side-channel notification for operator-facing faults (StoreIO
    /// exhaustion, StoreCorruption) that are not per-symbol alerts.
    async fn send_operator_notice(&self, message: &str) -> Result<(), ScanError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdjustField {
    Stop,
    Tp1,
    Tp2,
    Tp3,
}

/// Parsed form of the `/trade`, `/close`, `/status`, `/adjust`, `/scan`,
/// `/watchlist` command surface (§6). Transport (Telegram, console REPL,
/// etc.) is out of scope; this is the dispatch contract a transport calls into.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Trade {
        symbol: String,
        entry: f64,
        size_usd: f64,
        stop_pct: f64,
    },
    Close {
        symbol: String,
    },
    Status,
    Adjust {
        symbol: String,
        field: AdjustField,
        value: f64,
    },
    Scan,
    Watchlist,
}

#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, command: Command) -> Result<String, ScanError>;
}
