//! Piecewise-linear curve evaluation shared by all nine signal evaluators (§9
//! design notes: "encode anchor tables as data, not code branches").

/// An `(raw, score)` anchor point. Anchor tables are sorted ascending by `raw`.
pub type Anchor = (f64, f64);

/// Evaluate a piecewise-linear curve at `raw`, given ascending anchors.
///
/// Below the first anchor, linearly interpolates from `(0.0, 0.0)` to the
/// first anchor (the behavior every evaluator in §4.4 documents as "below X,
/// linear down to 0 at 0"). Above the last anchor, the curve saturates at the
/// last anchor's score. Result is clamped to `[0, 100]`.
pub fn eval(raw: f64, anchors: &[Anchor]) -> f64 {
    if anchors.is_empty() {
        return 0.0;
    }
    if raw <= 0.0 {
        return 0.0;
    }

    let (first_raw, first_score) = anchors[0];
    if raw <= first_raw {
        let score = if first_raw > 0.0 {
            (raw / first_raw) * first_score
        } else {
            first_score
        };
        return score.clamp(0.0, 100.0);
    }

    for window in anchors.windows(2) {
        let (r0, s0) = window[0];
        let (r1, s1) = window[1];
        if raw <= r1 {
            if (r1 - r0).abs() < f64::EPSILON {
                return s1.clamp(0.0, 100.0);
            }
            let t = (raw - r0) / (r1 - r0);
            return (s0 + t * (s1 - s0)).clamp(0.0, 100.0);
        }
    }

    anchors.last().unwrap().1.clamp(0.0, 100.0)
}

/// Mean of a data slice.
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        0.0
    } else {
        data.iter().sum::<f64>() / data.len() as f64
    }
}

/// Median of a data slice (not mutated in place; clones internally).
pub fn median(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<f64> = data.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Percentile rank of `value` within `data`, in `[0.0, 1.0]`. Ties count as
/// half (midpoint interpolation), matching the teacher's adaptive-threshold
/// percentile helper.
pub fn percentile_rank(value: f64, data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.5;
    }
    let count_below = data.iter().filter(|&&x| x < value).count();
    let count_equal = data.iter().filter(|&&x| (x - value).abs() < f64::EPSILON).count();
    (count_below as f64 + 0.5 * count_equal as f64) / data.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eval_interpolates_between_anchors() {
        let anchors = [(0.10, 45.0), (0.20, 68.0), (0.30, 80.0), (0.40, 90.0)];
        assert!((eval(0.0, &anchors) - 0.0).abs() < 1e-9);
        assert!((eval(0.05, &anchors) - 22.5).abs() < 1e-9);
        assert!((eval(0.10, &anchors) - 45.0).abs() < 1e-9);
        assert!((eval(0.15, &anchors) - 56.5).abs() < 1e-9);
        assert!((eval(0.40, &anchors) - 90.0).abs() < 1e-9);
        assert!((eval(1.0, &anchors) - 90.0).abs() < 1e-9); // saturates
    }

    #[test]
    fn eval_clamps_to_0_100() {
        let anchors = [(1.0, 150.0)];
        assert!(eval(2.0, &anchors) <= 100.0);
    }

    #[test]
    fn percentile_rank_matches_expectation() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert!((percentile_rank(3.0, &data) - 0.5).abs() < 0.01);
        assert!(percentile_rank(5.0, &data) > 0.8);
        assert!(percentile_rank(1.0, &data) < 0.2);
    }

    #[test]
    fn median_odd_and_even() {
        assert!((median(&[1.0, 3.0, 2.0]) - 2.0).abs() < 1e-9);
        assert!((median(&[1.0, 2.0, 3.0, 4.0]) - 2.5).abs() < 1e-9);
    }
}
