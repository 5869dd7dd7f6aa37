use scan_core::{Bonus, Classification, Quality, Signal, SignalKind};

/// Output of the weighting/bonus/penalty pipeline, before levels are attached.
pub struct ScoreBreakdown {
    pub base_score: f64,
    pub final_score: f64,
    pub bonuses_applied: Vec<Bonus>,
    pub penalty_applied: bool,
    pub classification: Classification,
    pub quality: Quality,
}

fn lookup(signals: &[Signal; 9], kind: SignalKind) -> f64 {
    signals.iter().find(|s| s.kind == kind).map(|s| s.score).unwrap_or(0.0)
}

/// Weighted sum, multiplicative interaction bonuses (squeeze, cascade,
/// accumulation, each applied at most once), the extension penalty, and
/// classification thresholding.
pub fn score(signals: &[Signal; 9], seven_day_return: f64) -> ScoreBreakdown {
    let base_score: f64 = signals.iter().map(|s| s.kind.weight() * s.score).sum();

    let oi = lookup(signals, SignalKind::OiSurge);
    let funding = lookup(signals, SignalKind::FundingRate);
    let liq = lookup(signals, SignalKind::LiquidationLeverage);
    let cross_ex = lookup(signals, SignalKind::CrossExchangeVolume);
    let decouple = lookup(signals, SignalKind::VolumePriceDecouple);
    let volcomp = lookup(signals, SignalKind::VolatilityCompression);
    let ls = lookup(signals, SignalKind::LongShortRatio);

    let mut running = base_score;
    let mut bonuses_applied = Vec::new();

    if oi >= 45.0 && funding >= 45.0 && volcomp >= 45.0 {
        running *= Bonus::SqueezeSetup.multiplier();
        bonuses_applied.push(Bonus::SqueezeSetup);
    }
    if liq >= 40.0 && funding >= 40.0 && ls >= 40.0 {
        running *= Bonus::CascadeSetup.multiplier();
        bonuses_applied.push(Bonus::CascadeSetup);
    }
    if oi >= 40.0 && decouple >= 40.0 && cross_ex >= 40.0 {
        running *= Bonus::AccumulationSetup.multiplier();
        bonuses_applied.push(Bonus::AccumulationSetup);
    }

    let penalty_applied = seven_day_return > 0.15;
    if penalty_applied {
        running *= 0.60;
    }

    let final_score = running.clamp(0.0, 100.0);
    let classification = Classification::from_score(final_score);

    let quality = signals
        .iter()
        .map(|s| s.quality)
        .reduce(Quality::combine)
        .unwrap_or(Quality::Low);

    ScoreBreakdown {
        base_score,
        final_score,
        bonuses_applied,
        penalty_applied,
        classification,
        quality,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_core::SignalKind;

    fn signal(kind: SignalKind, score: f64) -> Signal {
        Signal {
            kind,
            score,
            raw: 0.0,
            quality: Quality::High,
        }
    }

    fn signals_s1() -> [Signal; 9] {
        [
            signal(SignalKind::OiSurge, 78.0),
            signal(SignalKind::FundingRate, 72.0),
            signal(SignalKind::LiquidationLeverage, 65.0),
            signal(SignalKind::CrossExchangeVolume, 48.0),
            signal(SignalKind::DepthImbalance, 58.0),
            signal(SignalKind::VolumePriceDecouple, 42.0),
            signal(SignalKind::VolatilityCompression, 55.0),
            signal(SignalKind::LongShortRatio, 38.0),
            signal(SignalKind::FuturesVolumeDivergence, 32.0),
        ]
    }

    #[test]
    fn squeeze_setup_produces_critical() {
        let breakdown = score(&signals_s1(), 0.04);
        assert!((breakdown.base_score - 59.69).abs() < 0.01);
        assert!(breakdown.bonuses_applied.contains(&Bonus::SqueezeSetup));
        assert!(breakdown.bonuses_applied.contains(&Bonus::AccumulationSetup));
        assert!(!breakdown.bonuses_applied.contains(&Bonus::CascadeSetup));
        assert!(!breakdown.penalty_applied);
        assert!((breakdown.final_score - 89.53).abs() < 0.1);
        assert_eq!(breakdown.classification, Classification::Critical);
    }

    #[test]
    fn extension_penalty_demotes_to_watchlist() {
        let breakdown = score(&signals_s1(), 0.18);
        assert!(breakdown.penalty_applied);
        assert!((breakdown.final_score - 53.72).abs() < 0.1);
        assert_eq!(breakdown.classification, Classification::Watchlist);
    }

    #[test]
    fn longs_dominate_yields_none() {
        let signals = [
            signal(SignalKind::OiSurge, 70.0),
            signal(SignalKind::FundingRate, 0.0),
            signal(SignalKind::LiquidationLeverage, 20.0),
            signal(SignalKind::CrossExchangeVolume, 20.0),
            signal(SignalKind::DepthImbalance, 20.0),
            signal(SignalKind::VolumePriceDecouple, 20.0),
            signal(SignalKind::VolatilityCompression, 20.0),
            signal(SignalKind::LongShortRatio, 6.0),
            signal(SignalKind::FuturesVolumeDivergence, 20.0),
        ];
        let breakdown = score(&signals, 0.0);
        assert!(breakdown.bonuses_applied.is_empty());
        assert_eq!(breakdown.classification, Classification::None);
    }

    #[test]
    fn all_zero_signals_yield_zero_final_score() {
        let signals: [Signal; 9] = SignalKind::ALL.map(|kind| signal(kind, 0.0));
        let breakdown = score(&signals, 0.0);
        assert_eq!(breakdown.final_score, 0.0);
    }

    #[test]
    fn all_max_signals_with_no_penalty_saturate_but_bonuses_still_apply() {
        let signals: [Signal; 9] = SignalKind::ALL.map(|kind| signal(kind, 100.0));
        let breakdown = score(&signals, 0.0);
        assert!((breakdown.base_score - 100.0).abs() < 1e-9);
        assert_eq!(breakdown.final_score, 100.0);
    }

    #[test]
    fn weights_sum_to_one() {
        let total: f64 = SignalKind::ALL.iter().map(|k| k.weight()).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }
}
