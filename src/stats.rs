use crate::models::Confidence;

/// Summary statistics over a set of comparable prices.
///
/// Quartiles are taken at the truncated 25th/75th percentile index of the
/// sorted sample, not interpolated. Small samples therefore disagree slightly
/// with textbook percentiles; downstream price output depends on this exact
/// behavior, so keep it.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceStats {
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub q1: f64,
    pub q3: f64,
    pub sample_size: usize,
}

pub fn summarize(prices: &[f64]) -> Option<PriceStats> {
    if prices.is_empty() {
        return None;
    }
    let mut sorted = prices.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let len = sorted.len();
    let mean = sorted.iter().sum::<f64>() / len as f64;
    let median = if len % 2 == 0 {
        (sorted[len / 2 - 1] + sorted[len / 2]) / 2.0
    } else {
        sorted[len / 2]
    };
    let q1 = sorted[len / 4];
    let q3 = sorted[(len * 3) / 4];

    Some(PriceStats {
        mean,
        median,
        min: sorted[0],
        max: sorted[len - 1],
        q1,
        q3,
        sample_size: len,
    })
}

/// IQR fences: values outside `[Q1 - 1.5*IQR, Q3 + 1.5*IQR]` are outliers.
pub fn outlier_bounds(stats: &PriceStats) -> (f64, f64) {
    let iqr = stats.q3 - stats.q1;
    (stats.q1 - 1.5 * iqr, stats.q3 + 1.5 * iqr)
}

#[derive(Debug, Clone)]
pub struct FilteredStats {
    pub stats: PriceStats,
    pub outliers: usize,
}

/// Statistics with IQR outliers removed and the survivors re-summarized.
/// If filtering would empty the sample, the unfiltered statistics stand.
pub fn summarize_filtered(prices: &[f64]) -> Option<FilteredStats> {
    let unfiltered = summarize(prices)?;
    let (low, high) = outlier_bounds(&unfiltered);
    let kept: Vec<f64> = prices
        .iter()
        .copied()
        .filter(|p| *p >= low && *p <= high)
        .collect();
    let outliers = prices.len() - kept.len();

    match summarize(&kept) {
        Some(stats) => Some(FilteredStats { stats, outliers }),
        None => Some(FilteredStats {
            stats: unfiltered,
            outliers: 0,
        }),
    }
}

/// Confidence grade for a filtered sample.
pub fn confidence(stats: &PriceStats) -> Confidence {
    if stats.median <= 0.0 {
        return Confidence::Low;
    }
    let spread = (stats.max - stats.min) / stats.median;
    if stats.sample_size >= 10 && spread < 1.0 {
        Confidence::High
    } else if (stats.sample_size >= 10 && spread < 2.0)
        || (5..=9).contains(&stats.sample_size)
    {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarize_empty_is_none() {
        assert!(summarize(&[]).is_none());
    }

    #[test]
    fn median_averages_middle_pair_for_even_samples() {
        let stats = summarize(&[10.0, 20.0, 30.0, 40.0]).unwrap();
        assert_eq!(stats.median, 25.0);
        assert_eq!(stats.min, 10.0);
        assert_eq!(stats.max, 40.0);
    }

    #[test]
    fn quartiles_use_truncated_indexes() {
        // len 5: q1 at index 1, q3 at index 3
        let stats = summarize(&[20.0, 22.0, 21.0, 23.0, 500.0]).unwrap();
        assert_eq!(stats.q1, 21.0);
        assert_eq!(stats.q3, 23.0);
    }

    #[test]
    fn extreme_outlier_is_removed_and_counted() {
        let filtered = summarize_filtered(&[20.0, 22.0, 21.0, 23.0, 500.0]).unwrap();
        assert_eq!(filtered.outliers, 1);
        assert_eq!(filtered.stats.sample_size, 4);
        assert_eq!(filtered.stats.max, 23.0);
        assert_eq!(filtered.stats.median, 21.5);
        assert!((filtered.stats.mean - 21.5).abs() < 1e-9);
    }

    #[test]
    fn uniform_sample_has_no_outliers() {
        let filtered = summarize_filtered(&[30.0, 30.0, 30.0, 30.0]).unwrap();
        assert_eq!(filtered.outliers, 0);
        assert_eq!(filtered.stats.sample_size, 4);
    }

    fn sample(count: usize, min: f64, max: f64, median: f64) -> PriceStats {
        PriceStats {
            mean: median,
            median,
            min,
            max,
            q1: min,
            q3: max,
            sample_size: count,
        }
    }

    #[test]
    fn confidence_thresholds() {
        // 12 samples, spread/median = 0.5 -> high
        assert_eq!(confidence(&sample(12, 80.0, 130.0, 100.0)), Confidence::High);
        // 12 samples, spread/median = 1.5 -> medium
        assert_eq!(
            confidence(&sample(12, 20.0, 170.0, 100.0)),
            Confidence::Medium
        );
        // 5-9 samples are medium regardless of spread
        assert_eq!(
            confidence(&sample(6, 10.0, 500.0, 50.0)),
            Confidence::Medium
        );
        // 4 samples -> low even when tight
        assert_eq!(confidence(&sample(4, 99.0, 101.0, 100.0)), Confidence::Low);
        // wide spread with many samples -> low
        assert_eq!(confidence(&sample(15, 5.0, 400.0, 50.0)), Confidence::Low);
    }
}
