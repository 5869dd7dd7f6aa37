use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Epoch milliseconds, matching the wire format of every adapter payload.
pub type Millis = i64;

/// Hourly OHLCV bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub t: Millis,
    pub o: f64,
    pub h: f64,
    pub l: f64,
    pub c: f64,
    pub v: f64,
}

/// Open interest, keyed by exchange so cross-venue aggregation never confuses
/// "absent on this exchange" with "zero".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OiPoint {
    pub t: Millis,
    pub oi_usd_by_exchange: BTreeMap<String, f64>,
}

impl OiPoint {
    pub fn total(&self) -> f64 {
        self.oi_usd_by_exchange.values().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingPoint {
    pub t: Millis,
    pub rate_by_exchange: BTreeMap<String, f64>,
}

impl FundingPoint {
    pub fn mean_rate(&self) -> Option<f64> {
        if self.rate_by_exchange.is_empty() {
            return None;
        }
        Some(self.rate_by_exchange.values().sum::<f64>() / self.rate_by_exchange.len() as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LsPoint {
    pub t: Millis,
    pub ratio_by_exchange: BTreeMap<String, f64>,
}

impl LsPoint {
    pub fn mean_ratio(&self) -> Option<f64> {
        if self.ratio_by_exchange.is_empty() {
            return None;
        }
        Some(self.ratio_by_exchange.values().sum::<f64>() / self.ratio_by_exchange.len() as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerPoint {
    pub t: Millis,
    pub price: f64,
    pub vol24: f64,
    pub bid: f64,
    pub ask: f64,
    pub per_exchange: BTreeMap<String, f64>,
}

/// A single price level in an order book.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub size: f64,
}

/// Latest-only snapshot (never retained historically, per §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub t: Millis,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    pub per_exchange: Vec<String>,
}

/// Discriminates a stored series independent of its payload type, so the
/// Store's retention/append contract can be expressed generically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeriesKind {
    Candle,
    Oi,
    Funding,
    Ls,
    Ticker,
    Book,
}

impl SeriesKind {
    /// Minimum retained sample count per §3 ("retained >= N").
    pub fn retention(&self) -> usize {
        match self {
            SeriesKind::Candle => 500,
            SeriesKind::Oi => 200,
            SeriesKind::Funding => 100,
            SeriesKind::Ls => 100,
            SeriesKind::Ticker => 500,
            SeriesKind::Book => 1,
        }
    }

    /// Bootstrap threshold used by the scheduler's mode assignment (§4.8).
    pub fn bootstrap_floor(&self) -> usize {
        match self {
            SeriesKind::Candle => 500,
            SeriesKind::Oi => 200,
            SeriesKind::Funding => 100,
            SeriesKind::Ls => 100,
            SeriesKind::Ticker => 0,
            SeriesKind::Book => 0,
        }
    }
}

/// A stored sample of any kind, tagged by its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Sample {
    Candle(Candle),
    Oi(OiPoint),
    Funding(FundingPoint),
    Ls(LsPoint),
    Ticker(TickerPoint),
    Book(BookSnapshot),
}

impl Sample {
    pub fn t(&self) -> Millis {
        match self {
            Sample::Candle(x) => x.t,
            Sample::Oi(x) => x.t,
            Sample::Funding(x) => x.t,
            Sample::Ls(x) => x.t,
            Sample::Ticker(x) => x.t,
            Sample::Book(x) => x.t,
        }
    }

    pub fn kind(&self) -> SeriesKind {
        match self {
            Sample::Candle(_) => SeriesKind::Candle,
            Sample::Oi(_) => SeriesKind::Oi,
            Sample::Funding(_) => SeriesKind::Funding,
            Sample::Ls(_) => SeriesKind::Ls,
            Sample::Ticker(_) => SeriesKind::Ticker,
            Sample::Book(_) => SeriesKind::Book,
        }
    }
}

/// Data sufficiency badge, aggregated as the minimum across active signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Quality {
    Low,
    Med,
    High,
}

impl Quality {
    pub fn label(&self) -> &'static str {
        match self {
            Quality::Low => "LOW",
            Quality::Med => "MED",
            Quality::High => "HIGH",
        }
    }

    /// Combine two quality badges, keeping the weaker one (min aggregation, §4.4).
    pub fn combine(self, other: Quality) -> Quality {
        std::cmp::Ord::min(self, other)
    }
}

/// The nine signal evaluators of §4.4, in spec order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalKind {
    OiSurge,
    FundingRate,
    LiquidationLeverage,
    CrossExchangeVolume,
    DepthImbalance,
    VolumePriceDecouple,
    VolatilityCompression,
    LongShortRatio,
    FuturesVolumeDivergence,
}

impl SignalKind {
    pub const ALL: [SignalKind; 9] = [
        SignalKind::OiSurge,
        SignalKind::FundingRate,
        SignalKind::LiquidationLeverage,
        SignalKind::CrossExchangeVolume,
        SignalKind::DepthImbalance,
        SignalKind::VolumePriceDecouple,
        SignalKind::VolatilityCompression,
        SignalKind::LongShortRatio,
        SignalKind::FuturesVolumeDivergence,
    ];

    /// Scorer weight, §4.5 step 1. Sums to 1.00.
    pub fn weight(&self) -> f64 {
        match self {
            SignalKind::OiSurge => 0.18,
            SignalKind::FundingRate => 0.17,
            SignalKind::LiquidationLeverage => 0.15,
            SignalKind::CrossExchangeVolume => 0.12,
            SignalKind::DepthImbalance => 0.11,
            SignalKind::VolumePriceDecouple => 0.08,
            SignalKind::VolatilityCompression => 0.08,
            SignalKind::LongShortRatio => 0.06,
            SignalKind::FuturesVolumeDivergence => 0.05,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SignalKind::OiSurge => "oi_surge",
            SignalKind::FundingRate => "funding_rate",
            SignalKind::LiquidationLeverage => "liquidation_leverage",
            SignalKind::CrossExchangeVolume => "cross_exchange_volume",
            SignalKind::DepthImbalance => "depth_imbalance",
            SignalKind::VolumePriceDecouple => "volume_price_decouple",
            SignalKind::VolatilityCompression => "volatility_compression",
            SignalKind::LongShortRatio => "long_short_ratio",
            SignalKind::FuturesVolumeDivergence => "futures_volume_divergence",
        }
    }
}

/// Output of a single signal evaluator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Signal {
    pub kind: SignalKind,
    pub score: f64,
    pub raw: f64,
    pub quality: Quality,
}

/// Interaction bonuses of §4.5 step 2, applied at most once per cycle each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bonus {
    SqueezeSetup,
    CascadeSetup,
    AccumulationSetup,
}

impl Bonus {
    pub fn multiplier(&self) -> f64 {
        match self {
            Bonus::SqueezeSetup => 1.25,
            Bonus::CascadeSetup => 1.30,
            Bonus::AccumulationSetup => 1.20,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Bonus::SqueezeSetup => "squeeze_setup",
            Bonus::CascadeSetup => "cascade_setup",
            Bonus::AccumulationSetup => "accumulation_setup",
        }
    }
}

/// §4.5 step 5 classification, ordered weakest to strongest for rank comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Classification {
    None,
    Monitor,
    Watchlist,
    HighAlert,
    Critical,
}

impl Classification {
    pub fn from_score(score: f64) -> Self {
        if score >= 78.0 {
            Classification::Critical
        } else if score >= 62.0 {
            Classification::HighAlert
        } else if score >= 48.0 {
            Classification::Watchlist
        } else if score >= 33.0 {
            Classification::Monitor
        } else {
            Classification::None
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            Classification::None => 0,
            Classification::Monitor => 1,
            Classification::Watchlist => 2,
            Classification::HighAlert => 3,
            Classification::Critical => 4,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Classification::None => "NONE",
            Classification::Monitor => "MONITOR",
            Classification::Watchlist => "WATCHLIST",
            Classification::HighAlert => "HIGH_ALERT",
            Classification::Critical => "CRITICAL",
        }
    }

    /// Smart-levels engine only runs for these (§4.6).
    pub fn needs_levels(&self) -> bool {
        matches!(
            self,
            Classification::Critical | Classification::HighAlert | Classification::Watchlist
        )
    }
}

/// Method that produced the winning stop candidate (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopMethod {
    Atr,
    SwingLow,
    BookSupport,
}

impl StopMethod {
    pub fn label(&self) -> &'static str {
        match self {
            StopMethod::Atr => "atr",
            StopMethod::SwingLow => "swing_low",
            StopMethod::BookSupport => "book_support",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EntryBand {
    pub low: f64,
    pub high: f64,
    pub ideal: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TakeProfit {
    pub price: f64,
    pub portion: f64,
}

/// Smart-levels output (§4.6), only present when `Classification::needs_levels()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Levels {
    pub stop: f64,
    pub stop_method: StopMethod,
    pub stop_pct: f64,
    pub entry: EntryBand,
    pub take_profits: [TakeProfit; 4],
    pub trail_pct: f64,
    pub risk_reward: f64,
    pub position_size_usd: f64,
}

/// Events detected by comparing two adjacent ScanResults (§4.7).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum Event {
    ScoreJump { delta: f64 },
    Upgrade { from: Classification, to: Classification },
    Ignition { return_6h: f64 },
}

impl Event {
    /// Fixed emission ordering: SCORE_JUMP, UPGRADE, IGNITION.
    pub fn ordinal(&self) -> u8 {
        match self {
            Event::ScoreJump { .. } => 0,
            Event::Upgrade { .. } => 1,
            Event::Ignition { .. } => 2,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Event::ScoreJump { .. } => "SCORE_JUMP",
            Event::Upgrade { .. } => "UPGRADE",
            Event::Ignition { .. } => "IGNITION",
        }
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.ordinal() == other.ordinal()
    }
}
impl Eq for Event {}
impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ordinal().cmp(&other.ordinal())
    }
}

/// Result of scanning one symbol in one cycle (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub symbol: String,
    pub t: Millis,
    pub base_score: f64,
    pub final_score: f64,
    pub classification: Classification,
    pub signals: [Signal; 9],
    pub bonuses_applied: Vec<Bonus>,
    pub penalty_applied: bool,
    pub levels: Option<Levels>,
    pub quality: Quality,
}

impl ScanResult {
    pub fn signal(&self, kind: SignalKind) -> Signal {
        self.signals
            .iter()
            .copied()
            .find(|s| s.kind == kind)
            .expect("all nine signal kinds are always present")
    }
}

/// Aggregate per-cycle statistics for `run --stats` digests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub symbols_total: usize,
    pub symbols_bootstrap: usize,
    pub symbols_degraded: usize,
    pub elapsed_ms: u64,
    pub classifications: BTreeMap<String, usize>,
}

/// Lifecycle state of a registered trade (§3, §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeState {
    Open,
    Closed,
}

/// A user-registered open position tracked by the trade monitor (§4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredTrade {
    pub symbol: String,
    pub entry: f64,
    pub size_usd: f64,
    pub stop: f64,
    pub tps: [f64; 4],
    pub tps_hit: [bool; 4],
    pub state: TradeState,
    pub opened_at: DateTime<Utc>,
    pub trail_stage: u8,
    pub opened_final_score: f64,
    pub degradation_warned_at: Option<u8>,
}

/// Alert protocol (§6): sink-neutral structured message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub severity: Classification,
    pub symbol: String,
    pub classification: Classification,
    pub score: f64,
    pub signals: [Signal; 9],
    pub bonuses: Vec<Bonus>,
    pub penalty: bool,
    pub levels: Option<Levels>,
    pub events: Vec<Event>,
    pub quality: Quality,
}
