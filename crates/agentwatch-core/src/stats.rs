//! Small statistics helpers shared by the tracker and analytics

use std::collections::{BTreeMap, HashMap};

use sha2::{Digest, Sha256};

/// Fewer samples than this and p95 is reported as absent
pub const MIN_P95_SAMPLES: usize = 20;

/// Process-independent 32-bit hash of a string
pub fn stable_hash(value: &str) -> u32 {
    let digest = Sha256::digest(value.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Sort a sample in ascending order
pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}

/// Arithmetic mean, 0 for an empty sample
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Median of an ascending sample; the two middle values are averaged for even sizes
pub fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    match n {
        0 => 0.0,
        _ if n % 2 == 1 => sorted[n / 2],
        _ => (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0,
    }
}

/// Value at zero-based index `floor(q * n)` of an ascending sample
pub fn nearest_rank(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let idx = ((q * sorted.len() as f64).floor() as usize).min(sorted.len() - 1);
    Some(sorted[idx])
}

/// p95 of an ascending sample, absent below [`MIN_P95_SAMPLES`]
pub fn p95(sorted: &[f64]) -> Option<f64> {
    if sorted.len() < MIN_P95_SAMPLES {
        return None;
    }
    nearest_rank(sorted, 0.95)
}

/// The `n` highest counts; ties are broken by name
pub fn top_n(counts: &HashMap<String, u64>, n: usize) -> BTreeMap<String, u64> {
    let mut entries: Vec<(&String, &u64)> = counts.iter().collect();
    entries.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    entries
        .into_iter()
        .take(n)
        .map(|(k, v)| (k.clone(), *v))
        .collect()
}

/// Add every count of `from` into `into`
pub fn merge_counts(into: &mut HashMap<String, u64>, from: &HashMap<String, u64>) {
    for (name, count) in from {
        *into.entry(name.clone()).or_insert(0) += count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_p95_absent_below_twenty_samples() {
        let values: Vec<f64> = (1..=19).map(f64::from).collect();
        assert_eq!(p95(&values), None);
    }

    #[test]
    fn test_p95_twenty_samples_takes_last() {
        let values: Vec<f64> = (1..=20).map(f64::from).collect();
        // floor(0.95 * 20) = 19
        assert_eq!(p95(&values), Some(20.0));
    }

    #[test]
    fn test_p95_hundred_samples() {
        let values: Vec<f64> = (1..=100).map(f64::from).collect();
        // floor(0.95 * 100) = 95 -> the 96th value
        assert_eq!(p95(&values), Some(96.0));
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[1.0, 2.0, 3.0]), 2.0);
        assert_eq!(median(&[1.0, 2.0, 3.0, 4.0]), 2.5);
        assert_eq!(median(&[]), 0.0);
    }

    #[test]
    fn test_nearest_rank_upper_median() {
        assert_eq!(nearest_rank(&[1.0, 2.0, 3.0, 4.0], 0.5), Some(3.0));
        assert_eq!(nearest_rank(&[], 0.5), None);
    }

    #[test]
    fn test_sorted_and_mean() {
        assert_eq!(sorted(&[3.0, 1.0, 2.0]), vec![1.0, 2.0, 3.0]);
        assert_eq!(mean(&[1.0, 2.0, 3.0, 4.0]), 2.5);
        assert_eq!(mean(&[]), 0.0);
    }

    #[test]
    fn test_top_n_orders_by_count_then_name() {
        let counts: HashMap<String, u64> = [("b", 3), ("a", 3), ("c", 5), ("d", 1)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let top = top_n(&counts, 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top["c"], 5);
        assert_eq!(top["a"], 3);
        assert!(!top.contains_key("b"));
    }

    #[test]
    fn test_stable_hash_is_deterministic() {
        assert_eq!(stable_hash("get_balance"), stable_hash("get_balance"));
        assert_ne!(stable_hash("get_balance"), stable_hash("transfer_money"));
    }
}
