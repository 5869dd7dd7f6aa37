use scan_core::{Classification, EntryBand, Levels, Quality, StopMethod, TakeProfit};

/// Everything the smart-levels engine needs for one symbol, collected by the
/// scheduler before dispatch. Pure input; no Store/MarketSource access here.
pub struct LevelsInput<'a> {
    pub price: f64,
    pub atr: f64,
    pub quality: Quality,
    pub cascade_ratio: f64,
    pub swing_low: f64,
    pub vwap_24h: f64,
    pub largest_bid_cluster_price: Option<f64>,
    pub largest_bid_cluster_usd: f64,
    pub median_recent_bid_cluster_usd: f64,
    pub ask_cluster_prices: &'a [f64],
    pub classification: Classification,
    pub account_usd: f64,
    pub risk_pct: f64,
}

fn select_stop(input: &LevelsInput) -> (f64, StopMethod) {
    let atr_mult = if input.quality == Quality::Low {
        1.5
    } else if input.cascade_ratio >= 5.0 {
        2.5
    } else {
        2.0
    };
    let atr_stop = input.price - atr_mult * input.atr;
    let swing_stop = input.swing_low - 0.25 * input.atr;

    let mut candidates = vec![(atr_stop, StopMethod::Atr), (swing_stop, StopMethod::SwingLow)];

    if let Some(cluster_price) = input.largest_bid_cluster_price {
        if input.largest_bid_cluster_usd >= 0.5 * input.median_recent_bid_cluster_usd {
            candidates.push((cluster_price - 0.1 * input.atr, StopMethod::BookSupport));
        }
    }

    let valid: Vec<_> = candidates
        .into_iter()
        .filter(|&(s, _)| input.price - s >= input.atr)
        .collect();

    valid
        .into_iter()
        .min_by(|a, b| a.0.partial_cmp(&b.0).unwrap())
        .unwrap_or((atr_stop, StopMethod::Atr))
}

fn entry_band(input: &LevelsInput, stop: f64) -> EntryBand {
    let price = input.price;
    match input.classification {
        Classification::Critical => EntryBand {
            low: price * 0.998,
            high: price * 1.004,
            ideal: price,
        },
        Classification::HighAlert => {
            let low = input.vwap_24h.max(price * 0.985);
            let high = price * 0.995;
            EntryBand {
                low,
                high,
                ideal: (low + high) / 2.0,
            }
        }
        _ => {
            // WATCHLIST, or any other classification reaching the levels engine.
            let low = input.swing_low;
            let high = input.swing_low + 0.25 * input.atr;
            let _ = stop;
            EntryBand { low, high, ideal: low }
        }
    }
}

fn snap_tp(unadjusted: f64, price: f64, ask_cluster_prices: &[f64]) -> f64 {
    let floor = unadjusted * 0.85;
    let nearest = ask_cluster_prices
        .iter()
        .copied()
        .filter(|&c| c > price && c <= unadjusted)
        .fold(None, |acc: Option<f64>, c| Some(acc.map_or(c, |a: f64| a.max(c))));

    match nearest {
        Some(cluster) => (cluster * 0.998).max(floor),
        None => unadjusted,
    }
}

/// Smart-levels computation of §4.6: stop selection, entry band, four take
/// profits, risk:reward, and position size. Only meaningful for symbols whose
/// classification is `needs_levels()`.
pub fn compute_levels(input: &LevelsInput) -> Levels {
    let (stop, stop_method) = select_stop(input);
    let stop_pct = ((input.price - stop) / input.price).clamp(0.025, 0.15);
    let stop = input.price * (1.0 - stop_pct);

    let entry = entry_band(input, stop);

    let k = (1.0 + 0.1 * (input.cascade_ratio - 3.0)).clamp(1.0, 1.8);
    let multiples = [3.0, 5.5, 9.0];
    let mut tp_prices = [0.0; 3];
    for (i, m) in multiples.iter().enumerate() {
        let unadjusted = input.price + m * k * input.atr;
        tp_prices[i] = snap_tp(unadjusted, input.price, input.ask_cluster_prices);
    }

    let take_profits = [
        TakeProfit {
            price: tp_prices[0],
            portion: 0.25,
        },
        TakeProfit {
            price: tp_prices[1],
            portion: 0.25,
        },
        TakeProfit {
            price: tp_prices[2],
            portion: 0.25,
        },
        TakeProfit {
            price: tp_prices[2],
            portion: 0.25,
        },
    ];

    let trail_pct = 2.0 * input.atr / input.price;
    let risk_reward = (tp_prices[0] - input.price) / (input.price - stop);
    let position_size_usd = input.account_usd * input.risk_pct / stop_pct;

    Levels {
        stop,
        stop_method,
        stop_pct,
        entry,
        take_profits,
        trail_pct,
        risk_reward,
        position_size_usd,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_input() -> LevelsInput<'static> {
        LevelsInput {
            price: 1.000,
            atr: 0.020,
            quality: Quality::High,
            cascade_ratio: 1.0,
            swing_low: 0.955,
            vwap_24h: 0.97,
            largest_bid_cluster_price: Some(0.97),
            largest_bid_cluster_usd: 10_000.0,
            median_recent_bid_cluster_usd: 10_000.0,
            ask_cluster_prices: &[],
            classification: Classification::Watchlist,
            account_usd: 10_000.0,
            risk_pct: 0.02,
        }
    }

    #[test]
    fn stop_selection_picks_swing_low_in_s5() {
        let input = base_input();
        let (stop, method) = select_stop(&input);
        assert!((stop - 0.950).abs() < 1e-9);
        assert_eq!(method, StopMethod::SwingLow);
    }

    #[test]
    fn stop_pct_is_bounded() {
        let input = base_input();
        let levels = compute_levels(&input);
        assert!(levels.stop_pct >= 0.025 && levels.stop_pct <= 0.15);
        assert!(input.price - levels.stop >= 0.0);
    }

    #[test]
    fn tp_ordering_is_increasing() {
        let input = base_input();
        let levels = compute_levels(&input);
        assert!(input.price < levels.take_profits[0].price);
        assert!(levels.take_profits[0].price < levels.take_profits[1].price);
        assert!(levels.take_profits[1].price < levels.take_profits[2].price);
    }

    #[test]
    fn cascade_ratio_five_yields_s6_trail_pct() {
        let mut input = base_input();
        input.cascade_ratio = 5.0;
        input.classification = Classification::Critical;
        let levels = compute_levels(&input);
        assert!((levels.trail_pct - 0.04).abs() < 1e-9);
        assert!((levels.take_profits[0].price - 1.060).abs() < 1e-6);
        assert!((levels.take_profits[1].price - 1.110).abs() < 1e-6);
        assert!((levels.take_profits[2].price - 1.180).abs() < 1e-6);
    }

    #[test]
    fn position_size_scales_with_account_and_risk() {
        let input = base_input();
        let levels = compute_levels(&input);
        let expected = input.account_usd * input.risk_pct / levels.stop_pct;
        assert!((levels.position_size_usd - expected).abs() < 1e-6);
    }
}
