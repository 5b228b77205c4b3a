//! Pairwise RSSI correlation: alignment, Pearson, and the stationary-proxy
//! heuristic. Pure functions over `(timestamp, rssi)` samples; no storage.

use chrono::{DateTime, Utc};

pub const MIN_ALIGNED_SAMPLES: usize = 10;
const TIMESTAMP_TOLERANCE_MS: i64 = 2_000;
const MAX_WINDOW: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub timestamp: DateTime<Utc>,
    pub rssi: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignmentStrategy {
    Timestamp,
    SlidingWindow,
}

#[derive(Debug, Clone)]
pub struct Aligned {
    pub a: Vec<f64>,
    pub b: Vec<f64>,
    pub strategy: AlignmentStrategy,
}

/// Two-pointer sweep pairing samples within `TIMESTAMP_TOLERANCE_MS` of
/// each other, each sample consumed at most once.
fn align_by_timestamp(a: &[Point], b: &[Point]) -> Vec<(f64, f64)> {
    let mut a_sorted = a.to_vec();
    let mut b_sorted = b.to_vec();
    a_sorted.sort_by_key(|p| p.timestamp);
    b_sorted.sort_by_key(|p| p.timestamp);

    let mut pairs = Vec::new();
    let (mut i, mut j) = (0usize, 0usize);
    while i < a_sorted.len() && j < b_sorted.len() {
        let delta = a_sorted[i].timestamp - b_sorted[j].timestamp;
        let delta_ms = delta.num_milliseconds();
        if delta_ms.abs() <= TIMESTAMP_TOLERANCE_MS {
            pairs.push((a_sorted[i].rssi as f64, b_sorted[j].rssi as f64));
            i += 1;
            j += 1;
        } else if delta_ms < 0 {
            i += 1;
        } else {
            j += 1;
        }
    }
    pairs
}

/// Best-correlated fixed-size window between the two series, tried at
/// every offset of the longer series against the shorter.
fn align_by_sliding_window(a: &[Point], b: &[Point]) -> (Vec<f64>, Vec<f64>) {
    let mut a_with_t: Vec<_> = a.to_vec();
    let mut b_with_t: Vec<_> = b.to_vec();
    a_with_t.sort_by_key(|p| p.timestamp);
    b_with_t.sort_by_key(|p| p.timestamp);
    let a_sorted: Vec<f64> = a_with_t.iter().map(|p| p.rssi as f64).collect();
    let b_sorted: Vec<f64> = b_with_t.iter().map(|p| p.rssi as f64).collect();

    let (long, short) = if a_sorted.len() >= b_sorted.len() {
        (&a_sorted, &b_sorted)
    } else {
        (&b_sorted, &a_sorted)
    };
    let w = short.len().min(long.len()).min(MAX_WINDOW);
    if w == 0 {
        return (Vec::new(), Vec::new());
    }

    let short_window = &short[0..w];
    let mut best_score = f64::MIN;
    let mut best_window: Vec<f64> = long[0..w].to_vec();

    for offset in 0..=(long.len() - w) {
        let candidate = &long[offset..offset + w];
        let (rho, _, _) = pearson(candidate, short_window);
        if rho.abs() > best_score.abs() || best_score == f64::MIN {
            best_score = rho;
            best_window = candidate.to_vec();
        }
    }

    if a_sorted.len() >= b_sorted.len() {
        (best_window, short_window.to_vec())
    } else {
        (short_window.to_vec(), best_window)
    }
}

/// Aligns two streams; returns `None` if fewer than `MIN_ALIGNED_SAMPLES`
/// can be matched by either strategy ("insufficient_data").
pub fn align(a: &[Point], b: &[Point]) -> Option<Aligned> {
    let by_timestamp = align_by_timestamp(a, b);
    if by_timestamp.len() >= MIN_ALIGNED_SAMPLES {
        let (av, bv): (Vec<f64>, Vec<f64>) = by_timestamp.into_iter().unzip();
        return Some(Aligned {
            a: av,
            b: bv,
            strategy: AlignmentStrategy::Timestamp,
        });
    }

    let (av, bv) = align_by_sliding_window(a, b);
    if av.len() >= MIN_ALIGNED_SAMPLES {
        return Some(Aligned {
            a: av,
            b: bv,
            strategy: AlignmentStrategy::SlidingWindow,
        });
    }

    None
}

/// Pearson correlation, (mean_a, mean_b). Zero-variance inputs yield ρ = 0.
pub fn pearson(a: &[f64], b: &[f64]) -> (f64, f64, f64) {
    assert_eq!(a.len(), b.len(), "pearson requires equal-length series");
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..a.len() {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }

    let rho = if var_a == 0.0 || var_b == 0.0 {
        0.0
    } else {
        cov / (var_a.sqrt() * var_b.sqrt())
    };

    (rho, mean_a, mean_b)
}

pub fn std_dev(values: &[f64], mean: f64) -> f64 {
    let n = values.len() as f64;
    if n == 0.0 {
        return 0.0;
    }
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    NotSuspicious,
    Suspicious { reason: &'static str },
}

impl Verdict {
    pub fn is_suspicious(&self) -> bool {
        matches!(self, Verdict::Suspicious { .. })
    }
}

#[derive(Debug, Clone)]
pub struct PairResult {
    pub correlation: Option<f64>,
    pub aligned_length: usize,
    pub mean_a: Option<f64>,
    pub mean_b: Option<f64>,
    pub std_a: Option<f64>,
    pub std_b: Option<f64>,
    pub strategy: Option<AlignmentStrategy>,
    pub verdict: Verdict,
    pub severity: Option<Severity>,
    pub reason: Option<&'static str>,
}

impl PairResult {
    fn insufficient_data() -> Self {
        PairResult {
            correlation: None,
            aligned_length: 0,
            mean_a: None,
            mean_b: None,
            std_a: None,
            std_b: None,
            strategy: None,
            verdict: Verdict::NotSuspicious,
            severity: None,
            reason: Some("insufficient_data"),
        }
    }
}

/// Verdict classification per the priority-ordered rules.
fn classify(rho: f64, std_a: f64, std_b: f64, mean_delta: f64) -> Verdict {
    let stationary_both = std_a < 8.0 && std_b < 8.0;
    let same_location = mean_delta <= 12.0;
    let one_very_still = std_a < 3.0 || std_b < 3.0;
    let both_relatively_still = std_a < 8.0 && std_b < 8.0;
    let suspicious_stationary =
        (stationary_both && same_location) || (one_very_still && both_relatively_still && same_location);

    if rho.abs() >= 0.8 {
        if mean_delta > 15.0 {
            return Verdict::NotSuspicious;
        }
        return Verdict::Suspicious {
            reason: "high_correlation",
        };
    }
    if suspicious_stationary {
        return Verdict::Suspicious {
            reason: "stationary_proxy",
        };
    }
    if rho.abs() >= 0.6 && same_location {
        return Verdict::Suspicious {
            reason: "moderate_correlation_same_location",
        };
    }
    Verdict::NotSuspicious
}

/// Full pairwise analysis: alignment, Pearson, stationary heuristic, verdict
/// and severity.
pub fn analyze_pair(a: &[Point], b: &[Point]) -> PairResult {
    let Some(aligned) = align(a, b) else {
        return PairResult::insufficient_data();
    };

    let (rho, mean_a, mean_b) = pearson(&aligned.a, &aligned.b);
    let std_a = std_dev(&aligned.a, mean_a);
    let std_b = std_dev(&aligned.b, mean_b);
    let mean_delta = (mean_a - mean_b).abs();

    let verdict = classify(rho, std_a, std_b, mean_delta);
    let severity = verdict
        .is_suspicious()
        .then(|| if rho.abs() >= 0.95 { Severity::Critical } else { Severity::Warning });
    let reason = match &verdict {
        Verdict::Suspicious { reason } => Some(*reason),
        Verdict::NotSuspicious => None,
    };

    PairResult {
        correlation: Some(rho),
        aligned_length: aligned.a.len(),
        mean_a: Some(mean_a),
        mean_b: Some(mean_b),
        std_a: Some(std_a),
        std_b: Some(std_b),
        strategy: Some(aligned.strategy),
        verdict,
        severity,
        reason,
    }
}

/// One entry of an N-way pair sweep, identifying which two streams it covers.
#[derive(Debug, Clone)]
pub struct SweepEntry {
    pub index_a: usize,
    pub index_b: usize,
    pub result: PairResult,
}

/// Computes `analyze_pair` for all `N*(N-1)/2` combinations.
pub fn analyze_all_pairs(streams: &[Vec<Point>]) -> Vec<SweepEntry> {
    let mut out = Vec::with_capacity(streams.len() * streams.len().saturating_sub(1) / 2);
    for i in 0..streams.len() {
        for j in (i + 1)..streams.len() {
            out.push(SweepEntry {
                index_a: i,
                index_b: j,
                result: analyze_pair(&streams[i], &streams[j]),
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn ts(base: DateTime<Utc>, offset_secs: i64) -> DateTime<Utc> {
        base + Duration::seconds(offset_secs)
    }

    fn series(base: DateTime<Utc>, rssi: &[i32], cadence_secs: i64, start_offset: i64) -> Vec<Point> {
        rssi.iter()
            .enumerate()
            .map(|(i, &r)| Point {
                timestamp: ts(base, start_offset + i as i64 * cadence_secs),
                rssi: r,
            })
            .collect()
    }

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 10, 9, 0, 0).unwrap()
    }

    #[test]
    fn identical_inputs_correlate_perfectly() {
        let base = base_time();
        let values: Vec<i32> = (0..15).map(|i| -60 + (i % 5)).collect();
        let a = series(base, &values, 5, 0);
        let b = series(base, &values, 5, 0);

        let result = analyze_pair(&a, &b);
        assert!((result.correlation.unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn zero_variance_series_yields_zero_correlation() {
        let base = base_time();
        let flat_a = vec![-60; 15];
        let varying_b: Vec<i32> = (0..15).map(|i| -60 + i).collect();
        let a = series(base, &flat_a, 5, 0);
        let b = series(base, &varying_b, 5, 0);

        let result = analyze_pair(&a, &b);
        assert_eq!(result.correlation, Some(0.0));
    }

    #[test]
    fn fewer_than_ten_matches_is_insufficient_data() {
        let base = base_time();
        let a = series(base, &[-60; 5], 5, 0);
        let b = series(base, &[-61; 5], 5, 0);

        let result = analyze_pair(&a, &b);
        assert_eq!(result.correlation, None);
        assert_eq!(result.reason, Some("insufficient_data"));
    }

    #[test]
    fn aligned_length_exactly_ten_is_reported() {
        let base = base_time();
        let values: Vec<i32> = (0..10).map(|i| -60 + i).collect();
        let a = series(base, &values, 5, 0);
        let b = series(base, &values, 5, 0);

        let result = analyze_pair(&a, &b);
        assert_eq!(result.aligned_length, 10);
        assert!(result.correlation.is_some());
    }

    #[test]
    fn stationary_proxy_is_flagged_despite_low_correlation() {
        let base = base_time();
        // Near-flat series, low variance, close means, weakly correlated.
        let a: Vec<i32> = vec![-60, -60, -61, -60, -59, -60, -61, -60, -60, -59, -60, -61, -60, -59, -60, -60, -61, -60, -59, -60];
        let b: Vec<i32> = vec![-61, -60, -60, -61, -60, -61, -60, -61, -59, -60, -61, -60, -61, -60, -61, -60, -61, -59, -60, -61];
        let sa = series(base, &a, 5, 0);
        let sb = series(base, &b, 5, 0);

        let result = analyze_pair(&sa, &sb);
        assert!(result.verdict.is_suspicious());
        assert_eq!(result.reason, Some("stationary_proxy"));
        assert_eq!(result.severity, Some(Severity::Warning));
    }

    #[test]
    fn high_correlation_but_distant_means_is_not_suspicious() {
        let base = base_time();
        let a: Vec<i32> = (0..15).map(|i| -40 + (i % 5)).collect();
        let b: Vec<i32> = (0..15).map(|i| -70 + (i % 5)).collect();
        let sa = series(base, &a, 5, 0);
        let sb = series(base, &b, 5, 0);

        let result = analyze_pair(&sa, &sb);
        assert!(result.correlation.unwrap().abs() >= 0.8);
        assert!(!result.verdict.is_suspicious());
    }

    #[test]
    fn sliding_window_fallback_finds_offset() {
        let base = base_time();
        let a_values: Vec<i32> = (0..50).map(|i| -60 + ((i * 7) % 11)).collect();
        let a = series(base, &a_values, 5, 0);
        // B mirrors A's values but on a half-step offset (27.5s + 5s cadence),
        // so no sample of B ever lands within 2s of a sample of A: timestamp
        // alignment necessarily finds zero matches and the sliding-window
        // fallback has to find the shift by correlating raw value vectors.
        let b_values: Vec<i32> = a_values.clone();
        let b: Vec<Point> = b_values
            .iter()
            .enumerate()
            .map(|(i, &r)| Point {
                timestamp: base + Duration::milliseconds(27_500 + i as i64 * 5_000),
                rssi: r,
            })
            .collect();

        let result = analyze_pair(&a, &b);
        assert_eq!(result.strategy, Some(AlignmentStrategy::SlidingWindow));
        assert!(result.correlation.unwrap().abs() > 0.9);
    }

    #[test]
    fn analyze_all_pairs_covers_every_combination() {
        let base = base_time();
        let values: Vec<i32> = (0..15).map(|i| -60 + (i % 5)).collect();
        let streams = vec![
            series(base, &values, 5, 0),
            series(base, &values, 5, 0),
            series(base, &values, 5, 0),
        ];
        let results = analyze_all_pairs(&streams);
        assert_eq!(results.len(), 3);
    }
}
