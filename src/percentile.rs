//! Exact order statistics over unordered samples.

use std::cmp::Ordering;

/// Returns the element of rank `ceil((n - 1) / 100 * percentile)`.
///
/// Selection is done in place with quickselect, so `samples` is reordered. No interpolation
/// happens: the result is always one of the samples. Returns `None` for an empty slice.
pub fn find_percentile<T: PartialOrd + Copy>(samples: &mut [T], percentile: f64) -> Option<T> {
    if samples.is_empty() {
        return None;
    }
    let rank = percentile_rank(samples.len(), percentile);
    let value = order_stat::kth_by(samples, rank, |a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    Some(*value)
}

fn percentile_rank(len: usize, percentile: f64) -> usize {
    let rank = ((len - 1) as f64 / 100.0 * percentile.clamp(0.0, 100.0)).ceil() as usize;
    rank.min(len - 1)
}
