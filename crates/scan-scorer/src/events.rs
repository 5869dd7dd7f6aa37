use scan_core::{Classification, Event, ScanResult};

/// Compares two adjacent ScanResults and returns events in fixed emission
/// order: SCORE_JUMP, UPGRADE, IGNITION.
pub fn detect_events(current: &ScanResult, prev: Option<&ScanResult>, price_now: f64, price_6h_ago: f64) -> Vec<Event> {
    let mut events = Vec::new();

    if let Some(prev) = prev {
        let delta = current.final_score - prev.final_score;
        if delta >= 15.0 {
            events.push(Event::ScoreJump { delta });
        }
        if current.classification.rank() > prev.classification.rank() {
            events.push(Event::Upgrade {
                from: prev.classification,
                to: current.classification,
            });
        }
    }

    if price_6h_ago.abs() > f64::EPSILON {
        let return_6h = price_now / price_6h_ago - 1.0;
        if return_6h >= 0.05 && current.final_score >= 48.0 {
            events.push(Event::Ignition { return_6h });
        }
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_core::{Bonus, Quality, Signal, SignalKind};

    fn dummy_result(final_score: f64, classification: Classification) -> ScanResult {
        let signals: [Signal; 9] = SignalKind::ALL.map(|kind| Signal {
            kind,
            score: 0.0,
            raw: 0.0,
            quality: Quality::High,
        });
        ScanResult {
            symbol: "TESTUSDT".into(),
            t: 0,
            base_score: final_score,
            final_score,
            classification,
            signals,
            bonuses_applied: Vec::<Bonus>::new(),
            penalty_applied: false,
            levels: None,
            quality: Quality::High,
        }
    }

    #[test]
    fn score_jump_and_upgrade_fire_together() {
        let prev = dummy_result(55.0, Classification::Watchlist);
        let current = dummy_result(73.0, Classification::HighAlert);
        let events = detect_events(&current, Some(&prev), 100.0, 100.0);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Event::ScoreJump { delta } if (delta - 18.0).abs() < 1e-9));
        assert!(matches!(events[1], Event::Upgrade { .. }));
    }

    #[test]
    fn ignition_requires_both_conditions() {
        let current = dummy_result(50.0, Classification::Watchlist);
        let events = detect_events(&current, None, 106.0, 100.0);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Event::Ignition { .. }));

        let current_low_score = dummy_result(40.0, Classification::Monitor);
        let events = detect_events(&current_low_score, None, 106.0, 100.0);
        assert!(events.is_empty());
    }

    #[test]
    fn no_prev_suppresses_jump_and_upgrade() {
        let current = dummy_result(90.0, Classification::Critical);
        let events = detect_events(&current, None, 100.0, 100.0);
        assert!(events.is_empty());
    }
}
