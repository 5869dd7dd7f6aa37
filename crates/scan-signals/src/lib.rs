//! Nine independent signal evaluators, one per `SignalKind`. Each is a pure
//! function: raw feature in, `Signal{score, raw, quality}` out. Curves are
//! piecewise-linear anchor tables evaluated via `scan_core::curve::eval`.

use scan_core::curve::eval;
use scan_core::{Quality, Signal, SignalKind};

/// Open interest surge vs. 72h ago, dampened when the move is mostly price-driven.
pub fn oi_surge(oi_now: f64, oi_72h_ago: f64, price_now: f64, price_72h_ago: f64, quality: Quality) -> Signal {
    let raw = if oi_72h_ago.abs() > f64::EPSILON {
        (oi_now - oi_72h_ago) / oi_72h_ago
    } else {
        0.0
    };
    let price_move = if price_72h_ago.abs() > f64::EPSILON {
        (price_now / price_72h_ago - 1.0).abs()
    } else {
        0.0
    };
    let anchors = [(0.10, 45.0), (0.20, 68.0), (0.30, 80.0), (0.40, 90.0)];
    let dampener = (1.0 - 10.0 * (price_move - 0.02).max(0.0)).max(0.0);
    let score = (eval(raw, &anchors) * dampener).clamp(0.0, 100.0);
    Signal {
        kind: SignalKind::OiSurge,
        score,
        raw,
        quality,
    }
}

/// Funding rate magnitude (negative only) plus persistence of negative funding over 72h.
pub fn funding_rate(avg_rate_24h: f64, negative_fraction_72h: f64, quality: Quality) -> Signal {
    let magnitude = if avg_rate_24h > 0.0 {
        0.0
    } else {
        let anchors = [(0.00001, 45.0), (0.00002, 65.0), (0.00003, 78.0), (0.00005, 90.0)];
        eval(avg_rate_24h.abs(), &anchors)
    };
    let persistence_anchors = [(0.3, 20.0), (0.5, 45.0), (0.7, 70.0), (0.85, 90.0)];
    let persistence = eval(negative_fraction_72h, &persistence_anchors);
    let score = (0.55 * magnitude + 0.45 * persistence).clamp(0.0, 100.0);
    Signal {
        kind: SignalKind::FundingRate,
        score,
        raw: avg_rate_24h,
        quality,
    }
}

/// Uniform-distribution proxy for short liquidation notional within reach of
/// `1.15 * price_now`, used when the true entry-price distribution of open
/// shorts is unknown (see DESIGN.md for the approximation this stands in for).
pub fn estimate_short_liq_volume_usd(
    oi_total: f64,
    short_fraction: f64,
    price_now: f64,
    price_30d_low: f64,
    price_30d_high: f64,
) -> f64 {
    let short_notional = oi_total * short_fraction;
    let range = price_30d_high - price_30d_low;
    if range <= f64::EPSILON {
        return 0.0;
    }
    let threshold = 1.15 * price_now;
    let within = ((threshold - price_30d_low) / range).clamp(0.0, 1.0);
    short_notional * within
}

/// Ratio of estimated short liquidation volume to resting ask-side resistance.
pub fn liquidation_leverage(liq_volume_usd: f64, ask_resistance_usd: f64, quality: Quality) -> Signal {
    let raw = if ask_resistance_usd > f64::EPSILON {
        liq_volume_usd / ask_resistance_usd
    } else {
        0.0
    };
    let anchors = [(2.0, 35.0), (3.0, 55.0), (5.0, 75.0), (8.0, 90.0)];
    let score = eval(raw, &anchors);
    Signal {
        kind: SignalKind::LiquidationLeverage,
        score,
        raw,
        quality,
    }
}

/// Max/median exchange volume ratio, falling back to a 7d self-comparison
/// when only one exchange lists the symbol.
pub fn cross_exchange_volume(
    max_ex_vol: f64,
    median_ex_vol: f64,
    single_exchange: bool,
    current_vol: f64,
    avg_vol_7d: f64,
    quality: Quality,
) -> Signal {
    let raw = if single_exchange {
        if avg_vol_7d > f64::EPSILON {
            current_vol / avg_vol_7d
        } else {
            0.0
        }
    } else if median_ex_vol > f64::EPSILON {
        max_ex_vol / median_ex_vol
    } else {
        0.0
    };
    let anchors = [(1.5, 35.0), (2.0, 55.0), (3.0, 75.0), (4.0, 88.0)];
    let score = eval(raw, &anchors);
    Signal {
        kind: SignalKind::CrossExchangeVolume,
        score,
        raw,
        quality,
    }
}

/// Resting bid/ask notional ratio within the book's relevant window.
pub fn depth_imbalance(sum_bid_usd: f64, sum_ask_usd: f64, quality: Quality) -> Signal {
    let raw = if sum_ask_usd > f64::EPSILON {
        sum_bid_usd / sum_ask_usd
    } else {
        0.0
    };
    let anchors = [(1.3, 30.0), (1.5, 50.0), (2.0, 75.0), (2.5, 88.0), (3.0, 95.0)];
    let score = eval(raw, &anchors);
    Signal {
        kind: SignalKind::DepthImbalance,
        score,
        raw,
        quality,
    }
}

/// Volume growth day-over-day, dampened when price has already moved.
pub fn volume_price_decouple(vol_24h: f64, vol_prev_24h: f64, price_24h_return: f64, quality: Quality) -> Signal {
    let raw = if vol_prev_24h > f64::EPSILON {
        vol_24h / vol_prev_24h - 1.0
    } else {
        0.0
    };
    let anchors = [(0.35, 50.0), (0.75, 78.0), (1.0, 88.0)];
    let dampener = (1.0 - 12.0 * (price_24h_return.abs() - 0.02).max(0.0)).max(0.0);
    let score = (eval(raw, &anchors) * dampener).clamp(0.0, 100.0);
    Signal {
        kind: SignalKind::VolumePriceDecouple,
        score,
        raw,
        quality,
    }
}

/// Tighter Bollinger bands than usual (low percentile rank) score higher.
pub fn volatility_compression(bbw_percentile_rank: f64, quality: Quality) -> Signal {
    let raw = (1.0 - bbw_percentile_rank).clamp(0.0, 1.0);
    let anchors = [(0.65, 42.0), (0.75, 58.0), (0.85, 75.0), (0.95, 95.0)];
    let score = eval(raw, &anchors);
    Signal {
        kind: SignalKind::VolatilityCompression,
        score,
        raw,
        quality,
    }
}

/// Long/short account ratio. Below 1.0, shorts dominate and the curve rises
/// as the ratio falls further; at or above 1.0 the score decays to 0 by 1.2.
pub fn long_short_ratio(ratio: f64, quality: Quality) -> Signal {
    let score = if ratio >= 1.0 {
        let t = ((ratio - 1.0) / 0.2).clamp(0.0, 1.0);
        (8.0 - t * 8.0).max(0.0)
    } else {
        let inv = (1.0 - ratio).max(0.0);
        let anchors = [(0.10, 30.0), (0.20, 55.0), (0.30, 75.0), (0.40, 90.0)];
        eval(inv, &anchors)
    };
    Signal {
        kind: SignalKind::LongShortRatio,
        score: score.clamp(0.0, 100.0),
        raw: ratio,
        quality,
    }
}

/// Current futures volume vs. its 72h mean.
pub fn futures_volume_divergence(vol_now: f64, mean_vol_72h: f64, quality: Quality) -> Signal {
    let raw = if mean_vol_72h > f64::EPSILON {
        vol_now / mean_vol_72h
    } else {
        0.0
    };
    let anchors = [(1.5, 35.0), (2.0, 55.0), (3.0, 78.0), (4.0, 90.0)];
    let score = eval(raw, &anchors);
    Signal {
        kind: SignalKind::FuturesVolumeDivergence,
        score,
        raw,
        quality,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oi_surge_matches_anchor_table() {
        let s = oi_surge(1.20, 1.0, 100.0, 100.0, Quality::High);
        assert!((s.score - 68.0).abs() < 1e-6);
    }

    #[test]
    fn oi_surge_price_dampener_zeroes_at_large_move() {
        let s = oi_surge(1.20, 1.0, 112.0, 100.0, Quality::High);
        assert_eq!(s.score, 0.0);
    }

    #[test]
    fn funding_rate_positive_rate_has_zero_magnitude() {
        let s = funding_rate(0.0001, 0.5, Quality::Med);
        assert!((s.score - 0.45 * 45.0).abs() < 1e-6);
    }

    #[test]
    fn long_short_ratio_inverts_below_one() {
        let strong_short = long_short_ratio(0.60, Quality::High);
        let weak_short = long_short_ratio(0.90, Quality::High);
        assert!(strong_short.score > weak_short.score);
    }

    #[test]
    fn long_short_ratio_decays_above_one() {
        let s = long_short_ratio(1.2, Quality::High);
        assert_eq!(s.score, 0.0);
        let s2 = long_short_ratio(1.0, Quality::High);
        assert!((s2.score - 8.0).abs() < 1e-6);
    }

    #[test]
    fn volatility_compression_rewards_tight_bands() {
        let tight = volatility_compression(0.05, Quality::High);
        let loose = volatility_compression(0.95, Quality::High);
        assert!(tight.score < loose.score);
    }

    #[test]
    fn estimate_short_liq_volume_respects_range() {
        let v = estimate_short_liq_volume_usd(1_000_000.0, 0.5, 100.0, 80.0, 120.0);
        assert!(v > 0.0 && v <= 500_000.0);
    }
}
