use scan_core::{BookSnapshot, Candle};

/// Return val if it is finite, otherwise return default.
#[inline]
pub fn finite_or(val: f64, default: f64) -> f64 {
    if val.is_finite() {
        val
    } else {
        default
    }
}

/// Simple Moving Average
pub fn sma(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return vec![];
    }

    let mut result = Vec::with_capacity(data.len() - period + 1);
    for i in period - 1..data.len() {
        let sum: f64 = data[i + 1 - period..=i].iter().sum();
        result.push(finite_or(sum / period as f64, 0.0));
    }
    result
}

/// Average True Range, Wilder's smoothing.
pub fn atr(candles: &[Candle], period: usize) -> Vec<f64> {
    if period == 0 || candles.len() < period + 1 {
        return vec![];
    }

    let mut true_ranges = Vec::new();
    for i in 1..candles.len() {
        let high_low = candles[i].h - candles[i].l;
        let high_close = (candles[i].h - candles[i - 1].c).abs();
        let low_close = (candles[i].l - candles[i - 1].c).abs();
        true_ranges.push(high_low.max(high_close).max(low_close));
    }

    let mut atr_values = Vec::new();
    let mut atr = true_ranges[..period].iter().sum::<f64>() / period as f64;
    atr = finite_or(atr, 0.0);
    atr_values.push(atr);

    for tr in &true_ranges[period..] {
        atr = (atr * (period - 1) as f64 + tr) / period as f64;
        atr_values.push(finite_or(atr, 0.0));
    }

    atr_values
}

/// Bollinger Bands
pub struct BollingerBands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

pub fn bollinger_bands(data: &[f64], period: usize, std_dev: f64) -> BollingerBands {
    if period == 0 || data.len() < period {
        return BollingerBands {
            upper: vec![],
            middle: vec![],
            lower: vec![],
        };
    }

    let middle = sma(data, period);
    let mut upper = Vec::with_capacity(middle.len());
    let mut lower = Vec::with_capacity(middle.len());

    for i in period - 1..data.len() {
        let slice = &data[i + 1 - period..=i];
        let mean = middle[i + 1 - period];
        let variance: f64 = slice.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / period as f64;
        let std = variance.sqrt();

        upper.push(finite_or(mean + std_dev * std, mean));
        lower.push(finite_or(mean - std_dev * std, mean));
    }

    BollingerBands {
        upper,
        middle,
        lower,
    }
}

/// Bollinger Band Width, `(upper - lower) / middle`, one value per Bollinger window.
pub fn bbw_series(data: &[f64], period: usize, std_dev: f64) -> Vec<f64> {
    let bands = bollinger_bands(data, period, std_dev);
    bands
        .upper
        .iter()
        .zip(bands.middle.iter())
        .zip(bands.lower.iter())
        .map(|((u, m), l)| finite_or((u - l) / m, 0.0))
        .collect()
}

/// Percentile rank of the latest BBW reading within its own trailing history
/// (low percentile = the band has squeezed tighter than usual, §4.4.7).
pub fn bbw_percentile(closes: &[f64], period: usize, std_dev: f64, lookback: usize) -> Option<f64> {
    let series = bbw_series(closes, period, std_dev);
    if series.is_empty() {
        return None;
    }
    let current = *series.last().unwrap();
    let window_start = series.len().saturating_sub(lookback);
    Some(scan_core::curve::percentile_rank(current, &series[window_start..]))
}

/// Lowest low over the trailing `k` candles (default 24h of hourly candles).
pub fn swing_low(candles: &[Candle], k: usize) -> Option<f64> {
    if candles.is_empty() {
        return None;
    }
    let start = candles.len().saturating_sub(k);
    candles[start..]
        .iter()
        .map(|c| c.l)
        .fold(None, |acc, l| Some(acc.map_or(l, |a: f64| a.min(l))))
}

/// Notional sum of resting size within `window_pct` of `mid_price` on one side
/// of the book. Returns `(total_usd, largest_cluster_usd, cluster_price)` where
/// the cluster is the single price level carrying the most notional.
pub fn book_cluster(levels: &[scan_core::BookLevel], mid_price: f64, window_pct: f64) -> (f64, f64, f64) {
    if mid_price <= 0.0 {
        return (0.0, 0.0, 0.0);
    }
    let band = mid_price * window_pct;
    let mut total = 0.0;
    let mut largest = 0.0;
    let mut largest_price = 0.0;
    for level in levels {
        if (level.price - mid_price).abs() <= band {
            let usd = level.price * level.size;
            total += usd;
            if usd > largest {
                largest = usd;
                largest_price = level.price;
            }
        }
    }
    (total, largest, largest_price)
}

/// Convenience wrapper computing support-side clustering directly from a book
/// snapshot's bids.
pub fn bid_cluster(book: &BookSnapshot, mid_price: f64, window_pct: f64) -> (f64, f64, f64) {
    book_cluster(&book.bids, mid_price, window_pct)
}

/// Sum of quote-volume (`close * volume`) over the trailing `n` candles.
pub fn volume_window(candles: &[Candle], n: usize) -> f64 {
    let start = candles.len().saturating_sub(n);
    candles[start..].iter().map(|c| c.c * c.v).sum()
}

/// Volume-Weighted Average Price, running series aligned to the input candles.
pub fn vwap(candles: &[Candle]) -> Vec<f64> {
    if candles.is_empty() {
        return vec![];
    }

    let mut vwap_values = Vec::with_capacity(candles.len());
    let mut cumulative_tpv = 0.0;
    let mut cumulative_volume = 0.0;

    for candle in candles {
        let typical_price = (candle.h + candle.l + candle.c) / 3.0;
        cumulative_tpv += typical_price * candle.v;
        cumulative_volume += candle.v;

        let vwap = if cumulative_volume > 0.0 {
            cumulative_tpv / cumulative_volume
        } else {
            typical_price
        };

        vwap_values.push(finite_or(vwap, typical_price));
    }

    vwap_values
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(t: i64, o: f64, h: f64, l: f64, c: f64, v: f64) -> Candle {
        Candle { t, o, h, l, c, v }
    }

    #[test]
    fn sma_basic() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0];
        let out = sma(&data, 3);
        assert_eq!(out.len(), 3);
        assert!((out[0] - 2.0).abs() < 1e-9);
        assert!((out[2] - 4.0).abs() < 1e-9);
    }

    #[test]
    fn atr_requires_period_plus_one_candles() {
        let candles: Vec<Candle> = (0..5).map(|i| candle(i, 1.0, 1.5, 0.5, 1.0, 10.0)).collect();
        assert!(atr(&candles, 5).is_empty());
        assert!(!atr(&candles, 3).is_empty());
    }

    #[test]
    fn bbw_series_is_nonnegative() {
        let data = [10.0, 11.0, 9.0, 12.0, 8.0, 13.0, 10.0, 11.0, 12.0, 9.0];
        let series = bbw_series(&data, 5, 2.0);
        assert!(series.iter().all(|&x| x >= 0.0));
    }

    #[test]
    fn swing_low_finds_minimum_in_window() {
        let candles = vec![
            candle(0, 10.0, 11.0, 9.0, 10.0, 1.0),
            candle(1, 10.0, 11.0, 7.0, 10.0, 1.0),
            candle(2, 10.0, 11.0, 8.0, 10.0, 1.0),
        ];
        assert_eq!(swing_low(&candles, 24), Some(7.0));
        assert_eq!(swing_low(&candles, 1), Some(8.0));
    }

    #[test]
    fn book_cluster_sums_within_window() {
        let levels = vec![
            scan_core::BookLevel { price: 100.0, size: 2.0 },
            scan_core::BookLevel { price: 99.0, size: 10.0 },
            scan_core::BookLevel { price: 50.0, size: 100.0 },
        ];
        let (total, largest, largest_price) = book_cluster(&levels, 100.0, 0.02);
        assert!((total - (200.0 + 990.0)).abs() < 1e-6);
        assert!((largest - 990.0).abs() < 1e-6);
        assert!((largest_price - 99.0).abs() < 1e-6);
    }

    #[test]
    fn volume_window_sums_quote_volume() {
        let candles = vec![
            candle(0, 1.0, 1.0, 1.0, 10.0, 5.0),
            candle(1, 1.0, 1.0, 1.0, 20.0, 5.0),
        ];
        assert!((volume_window(&candles, 2) - (50.0 + 100.0)).abs() < 1e-9);
    }
}
