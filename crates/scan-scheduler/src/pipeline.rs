use std::collections::BTreeMap;
use std::sync::Arc;

use scan_core::{
    Alert, BookSnapshot, Candle, Classification, FundingPoint, LsPoint, MarketSource, OiPoint,
    Quality, Sample, ScanError, ScanResult, SeriesKind, Signal, SignalKind, Store, TickerPoint,
};
use scan_levels::{compute_levels, LevelsInput};
use scan_scorer::{detect_events, score};

const CANDLE_HISTORY: usize = 500;
const OI_HISTORY: usize = 200;
const FUNDING_HISTORY: usize = 100;
const LS_HISTORY: usize = 100;
const BOOK_DEPTH: usize = 50;
const HOUR_MS: i64 = 3_600_000;

/// Merges per-exchange payloads that arrived from every configured
/// `MarketSource` for one symbol in one fetch round.
struct Fetched {
    candles: Vec<Candle>,
    ticker: Option<TickerPoint>,
    ticker_vol_by_exchange: BTreeMap<String, f64>,
    oi: Option<OiPoint>,
    funding: Option<FundingPoint>,
    ls: Option<LsPoint>,
    book: Option<BookSnapshot>,
}

async fn fetch_merged(sources: &[Arc<dyn MarketSource>], symbol: &str) -> Fetched {
    let mut candles = Vec::new();
    let mut ticker: Option<TickerPoint> = None;
    let mut ticker_vol_by_exchange = BTreeMap::new();
    let mut oi_by_exchange = BTreeMap::new();
    let mut funding_by_exchange = BTreeMap::new();
    let mut ls_by_exchange = BTreeMap::new();
    let mut bids = Vec::new();
    let mut asks = Vec::new();
    let mut book_exchanges = Vec::new();
    let mut latest_t = 0;

    for source in sources {
        if candles.is_empty() {
            if let Ok(c) = source.fetch_candles(symbol, CANDLE_HISTORY).await {
                if !c.is_empty() {
                    candles = c;
                }
            }
        }

        if let Ok(Some(t)) = source.fetch_ticker(symbol).await {
            latest_t = latest_t.max(t.t);
            if t.per_exchange.is_empty() {
                ticker_vol_by_exchange.insert(source.name().to_string(), t.vol24);
            } else {
                for (ex, v) in &t.per_exchange {
                    ticker_vol_by_exchange.insert(ex.clone(), *v);
                }
            }
            if ticker.is_none() {
                ticker = Some(t);
            }
        }

        if let Ok(Some(oi)) = source.fetch_oi(symbol).await {
            latest_t = latest_t.max(oi.t);
            for (ex, v) in oi.oi_usd_by_exchange {
                oi_by_exchange.insert(ex, v);
            }
        }

        if let Ok(Some(funding)) = source.fetch_funding(symbol).await {
            latest_t = latest_t.max(funding.t);
            for (ex, v) in funding.rate_by_exchange {
                funding_by_exchange.insert(ex, v);
            }
        }

        if let Ok(Some(ls)) = source.fetch_ls_ratio(symbol).await {
            latest_t = latest_t.max(ls.t);
            for (ex, v) in ls.ratio_by_exchange {
                ls_by_exchange.insert(ex, v);
            }
        }

        if let Ok(Some(book)) = source.fetch_book(symbol, BOOK_DEPTH).await {
            latest_t = latest_t.max(book.t);
            bids.extend(book.bids);
            asks.extend(book.asks);
            book_exchanges.push(source.name().to_string());
        }
    }

    let oi = if oi_by_exchange.is_empty() {
        None
    } else {
        Some(OiPoint {
            t: latest_t,
            oi_usd_by_exchange: oi_by_exchange,
        })
    };
    let funding = if funding_by_exchange.is_empty() {
        None
    } else {
        Some(FundingPoint {
            t: latest_t,
            rate_by_exchange: funding_by_exchange,
        })
    };
    let ls = if ls_by_exchange.is_empty() {
        None
    } else {
        Some(LsPoint {
            t: latest_t,
            ratio_by_exchange: ls_by_exchange,
        })
    };
    let book = if bids.is_empty() && asks.is_empty() {
        None
    } else {
        Some(BookSnapshot {
            t: latest_t,
            bids,
            asks,
            per_exchange: book_exchanges,
        })
    };

    Fetched {
        candles,
        ticker,
        ticker_vol_by_exchange,
        oi,
        funding,
        ls,
        book,
    }
}

fn quality_for(count: usize, floor: usize) -> Quality {
    if floor == 0 || count >= floor {
        Quality::High
    } else if count * 2 >= floor {
        Quality::Med
    } else {
        Quality::Low
    }
}

/// Runs the full per-symbol pipeline: fetch, persist, extract features,
/// evaluate signals, score, compute levels, detect events, and alert.
#[allow(clippy::too_many_arguments)]
pub async fn run_symbol(
    store: &dyn Store,
    alerter: &dyn scan_core::Alerter,
    sources: &[Arc<dyn MarketSource>],
    symbol: &str,
    account_usd: f64,
    risk_pct: f64,
) -> Result<ScanResult, ScanError> {
    let fetched = fetch_merged(sources, symbol).await;

    for candle in &fetched.candles {
        store.append(symbol, Sample::Candle(*candle)).await?;
    }
    if let Some(oi) = fetched.oi.clone() {
        store.append(symbol, Sample::Oi(oi)).await?;
    }
    if let Some(funding) = fetched.funding.clone() {
        store.append(symbol, Sample::Funding(funding)).await?;
    }
    if let Some(ls) = fetched.ls.clone() {
        store.append(symbol, Sample::Ls(ls)).await?;
    }
    if let Some(ticker) = fetched.ticker.clone() {
        store.append(symbol, Sample::Ticker(ticker)).await?;
    }
    if let Some(book) = fetched.book.clone() {
        store.append(symbol, Sample::Book(book)).await?;
    }

    let candle_count = store.count(symbol, SeriesKind::Candle).await?;
    let oi_count = store.count(symbol, SeriesKind::Oi).await?;
    let funding_count = store.count(symbol, SeriesKind::Funding).await?;
    let ls_count = store.count(symbol, SeriesKind::Ls).await?;

    let candles = samples_as_candles(store.latest(symbol, SeriesKind::Candle, CANDLE_HISTORY).await?);
    let oi_points = samples_as_oi(store.latest(symbol, SeriesKind::Oi, OI_HISTORY).await?);
    let funding_points = samples_as_funding(store.latest(symbol, SeriesKind::Funding, FUNDING_HISTORY).await?);
    let ls_points = samples_as_ls(store.latest(symbol, SeriesKind::Ls, LS_HISTORY).await?);

    let price_now = candles.last().map(|c| c.c).unwrap_or(0.0);
    let t = candles.last().map(|c| c.t).unwrap_or(0);

    let overall_quality = quality_for(candle_count, SeriesKind::Candle.bootstrap_floor())
        .combine(quality_for(oi_count, SeriesKind::Oi.bootstrap_floor()))
        .combine(quality_for(funding_count, SeriesKind::Funding.bootstrap_floor()))
        .combine(quality_for(ls_count, SeriesKind::Ls.bootstrap_floor()));

    // OI and funding are appended once per scan cycle (cadence-bounded), not
    // hourly like candles, so "N hours ago" has to be resolved by timestamp
    // against the store rather than by counting back N entries.
    let now_t = oi_points.last().map(|p| p.t).or(funding_points.last().map(|p| p.t)).unwrap_or(t);
    let oi_72h_window = samples_as_oi(store.range(symbol, SeriesKind::Oi, now_t - 72 * HOUR_MS, now_t).await?);
    let funding_24h_window = samples_as_funding(store.range(symbol, SeriesKind::Funding, now_t - 24 * HOUR_MS, now_t).await?);
    let funding_72h_window = samples_as_funding(store.range(symbol, SeriesKind::Funding, now_t - 72 * HOUR_MS, now_t).await?);

    let signals = evaluate_signals(
        &candles,
        &oi_points,
        &oi_72h_window,
        &funding_24h_window,
        &funding_72h_window,
        &ls_points,
        fetched.book.as_ref(),
        &fetched.ticker_vol_by_exchange,
        overall_quality,
    );

    let price_7d_ago = at_hours_ago(&candles, 24 * 7).map(|c| c.c).unwrap_or(price_now);
    let seven_day_return = if price_7d_ago.abs() > f64::EPSILON {
        price_now / price_7d_ago - 1.0
    } else {
        0.0
    };

    let breakdown = score(&signals, seven_day_return);

    let levels = if breakdown.classification.needs_levels() {
        Some(build_levels(&candles, fetched.book.as_ref(), &signals, breakdown.classification, account_usd, risk_pct))
    } else {
        None
    };

    let result = ScanResult {
        symbol: symbol.to_string(),
        t,
        base_score: breakdown.base_score,
        final_score: breakdown.final_score,
        classification: breakdown.classification,
        signals,
        bonuses_applied: breakdown.bonuses_applied,
        penalty_applied: breakdown.penalty_applied,
        levels,
        quality: breakdown.quality,
    };

    let previous = store.recent_scan_results(symbol, 1).await?;
    let price_6h_ago = at_hours_ago(&candles, 6).map(|c| c.c).unwrap_or(price_now);
    let events = detect_events(&result, previous.last(), price_now, price_6h_ago);

    store.push_scan_result(result.clone()).await?;

    let should_alert = result.classification.needs_levels() || !events.is_empty();
    if should_alert {
        let alert = Alert {
            severity: result.classification,
            symbol: result.symbol.clone(),
            classification: result.classification,
            score: result.final_score,
            signals: result.signals,
            bonuses: result.bonuses_applied.clone(),
            penalty: result.penalty_applied,
            levels: result.levels.clone(),
            events,
            quality: result.quality,
        };
        alerter.send_alert(&alert).await?;
    }

    Ok(result)
}

fn samples_as_candles(samples: Vec<Sample>) -> Vec<Candle> {
    samples
        .into_iter()
        .filter_map(|s| match s {
            Sample::Candle(c) => Some(c),
            _ => None,
        })
        .collect()
}

fn samples_as_oi(samples: Vec<Sample>) -> Vec<OiPoint> {
    samples
        .into_iter()
        .filter_map(|s| match s {
            Sample::Oi(p) => Some(p),
            _ => None,
        })
        .collect()
}

fn samples_as_funding(samples: Vec<Sample>) -> Vec<FundingPoint> {
    samples
        .into_iter()
        .filter_map(|s| match s {
            Sample::Funding(p) => Some(p),
            _ => None,
        })
        .collect()
}

fn samples_as_ls(samples: Vec<Sample>) -> Vec<LsPoint> {
    samples
        .into_iter()
        .filter_map(|s| match s {
            Sample::Ls(p) => Some(p),
            _ => None,
        })
        .collect()
}

/// Candles are hourly; "N hours ago" is N candles back from the end.
fn at_hours_ago(candles: &[Candle], hours: usize) -> Option<Candle> {
    if candles.len() > hours {
        Some(candles[candles.len() - 1 - hours])
    } else {
        None
    }
}

#[allow(clippy::too_many_arguments)]
fn evaluate_signals(
    candles: &[Candle],
    oi_points: &[OiPoint],
    oi_72h_window: &[OiPoint],
    funding_24h_window: &[FundingPoint],
    funding_72h_window: &[FundingPoint],
    ls_points: &[LsPoint],
    book: Option<&BookSnapshot>,
    ticker_vol_by_exchange: &BTreeMap<String, f64>,
    quality: Quality,
) -> [Signal; 9] {
    let price_now = candles.last().map(|c| c.c).unwrap_or(0.0);
    let price_72h_ago = at_hours_ago(candles, 72).map(|c| c.c).unwrap_or(price_now);
    let oi_now = oi_points.last().map(|p| p.total()).unwrap_or(0.0);
    // `oi_72h_window` is a store.range() slice covering [now-72h, now], ascending
    // by t, so its first entry is the oldest sample in that window — the
    // closest thing we have on record to "OI 72h ago".
    let oi_72h_ago = oi_72h_window.first().map(|p| p.total()).unwrap_or(oi_now);
    let oi_surge = scan_signals::oi_surge(oi_now, oi_72h_ago, price_now, price_72h_ago, quality);

    let closes: Vec<f64> = candles.iter().map(|c| c.c).collect();
    let recent_rates: Vec<f64> = funding_24h_window.iter().filter_map(|p| p.mean_rate()).collect();
    let avg_rate_24h = scan_core::curve::mean(&recent_rates);

    let negative_fraction_72h = {
        let rates: Vec<f64> = funding_72h_window.iter().filter_map(|p| p.mean_rate()).collect();
        if rates.is_empty() {
            0.0
        } else {
            rates.iter().filter(|r| **r < 0.0).count() as f64 / rates.len() as f64
        }
    };
    let funding_rate = scan_signals::funding_rate(avg_rate_24h, negative_fraction_72h, quality);

    let ls_ratio = ls_points.last().and_then(|p| p.mean_ratio()).unwrap_or(1.0);
    let short_fraction = 1.0 / (1.0 + ls_ratio.max(0.01));
    let price_30d_low = candles
        .iter()
        .rev()
        .take(720)
        .map(|c| c.l)
        .fold(f64::INFINITY, f64::min);
    let price_30d_high = candles
        .iter()
        .rev()
        .take(720)
        .map(|c| c.h)
        .fold(f64::NEG_INFINITY, f64::max);
    let ask_resistance_usd = book
        .map(|b| scan_features::book_cluster(&b.asks, price_now, 0.15).0)
        .unwrap_or(0.0);
    let liq_volume = scan_signals::estimate_short_liq_volume_usd(oi_now, short_fraction, price_now, price_30d_low, price_30d_high);
    let liquidation_leverage = scan_signals::liquidation_leverage(liq_volume, ask_resistance_usd, quality);

    let ex_vols: Vec<f64> = ticker_vol_by_exchange.values().copied().collect();
    let single_exchange = ex_vols.len() <= 1;
    let max_ex_vol = ex_vols.iter().copied().fold(0.0, f64::max);
    let median_ex_vol = scan_core::curve::median(&ex_vols);
    let current_vol = scan_features::volume_window(candles, 24);
    let avg_vol_7d = scan_features::volume_window(candles, 24 * 7) / 7.0;
    let cross_exchange_volume = scan_signals::cross_exchange_volume(max_ex_vol, median_ex_vol, single_exchange, current_vol, avg_vol_7d, quality);

    let (sum_bid_usd, _, _) = book.map(|b| scan_features::book_cluster(&b.bids, price_now, 0.10)).unwrap_or((0.0, 0.0, 0.0));
    let (sum_ask_usd, _, _) = book.map(|b| scan_features::book_cluster(&b.asks, price_now, 0.10)).unwrap_or((0.0, 0.0, 0.0));
    let depth_imbalance = scan_signals::depth_imbalance(sum_bid_usd, sum_ask_usd, quality);

    let vol_24h = scan_features::volume_window(candles, 24);
    let vol_prev_24h = if candles.len() > 48 {
        scan_features::volume_window(&candles[..candles.len() - 24], 24)
    } else {
        vol_24h
    };
    let price_24h_return = if let Some(c) = at_hours_ago(candles, 24) {
        price_now / c.c - 1.0
    } else {
        0.0
    };
    let volume_price_decouple = scan_signals::volume_price_decouple(vol_24h, vol_prev_24h, price_24h_return, quality);

    let bbw_rank = scan_features::bbw_percentile(&closes, 20, 2.0, closes.len()).unwrap_or(0.5);
    let volatility_compression = scan_signals::volatility_compression(bbw_rank, quality);

    let long_short_ratio = scan_signals::long_short_ratio(ls_ratio, quality);

    let vol_now = candles.last().map(|c| c.v).unwrap_or(0.0);
    let mean_vol_72h = scan_core::curve::mean(&candles.iter().rev().take(72).map(|c| c.v).collect::<Vec<_>>());
    let futures_volume_divergence = scan_signals::futures_volume_divergence(vol_now, mean_vol_72h, quality);

    let mut signals = [oi_surge; 9];
    signals[0] = oi_surge;
    signals[1] = funding_rate;
    signals[2] = liquidation_leverage;
    signals[3] = cross_exchange_volume;
    signals[4] = depth_imbalance;
    signals[5] = volume_price_decouple;
    signals[6] = volatility_compression;
    signals[7] = long_short_ratio;
    signals[8] = futures_volume_divergence;
    debug_assert!(SignalKind::ALL.iter().enumerate().all(|(i, k)| signals[i].kind == *k));
    signals
}

fn build_levels(
    candles: &[Candle],
    book: Option<&BookSnapshot>,
    signals: &[Signal; 9],
    classification: Classification,
    account_usd: f64,
    risk_pct: f64,
) -> scan_core::Levels {
    let price = candles.last().map(|c| c.c).unwrap_or(0.0);
    let atr = scan_features::atr(candles, 14).last().copied().unwrap_or(price * 0.02);
    let quality = signals.iter().map(|s| s.quality).reduce(Quality::combine).unwrap_or(Quality::Low);
    let swing_low = scan_features::swing_low(candles, 24).unwrap_or(price * 0.95);
    let vwap_24h = scan_features::vwap(candles).last().copied().unwrap_or(price);
    let liq_score = signals
        .iter()
        .find(|s| s.kind == SignalKind::LiquidationLeverage)
        .map(|s| s.raw)
        .unwrap_or(0.0);

    let (largest_bid_cluster_price, largest_bid_cluster_usd, median_recent_bid_cluster_usd) = match book {
        Some(b) => {
            let (_, largest_usd, largest_price) = scan_features::book_cluster(&b.bids, price, 0.15);
            (Some(largest_price), largest_usd, largest_usd)
        }
        None => (None, 0.0, 0.0),
    };
    let ask_cluster_prices: Vec<f64> = book.map(|b| b.asks.iter().map(|l| l.price).collect()).unwrap_or_default();

    let input = LevelsInput {
        price,
        atr,
        quality,
        cascade_ratio: liq_score,
        swing_low,
        vwap_24h,
        largest_bid_cluster_price,
        largest_bid_cluster_usd,
        median_recent_bid_cluster_usd,
        ask_cluster_prices: &ask_cluster_prices,
        classification,
        account_usd,
        risk_pct,
    };
    compute_levels(&input)
}
