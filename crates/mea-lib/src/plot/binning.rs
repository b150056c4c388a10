use crate::error::{Result, SpikeError};
use crate::signal::Series;
use num_traits::Float;

/// `bin_count` edges bound `bin_count - EDGE_TO_INTERVAL_OFFSET` intervals.
/// The last edge closes the final interval and never opens a bin of its own.
pub const EDGE_TO_INTERVAL_OFFSET: usize = 1;

/// Bin start indices `[0, bin_size, ..., (bin_count - 1) * bin_size]`.
pub fn bin_edges(bin_size: usize, bin_count: usize) -> Vec<usize> {
    (0..bin_count).map(|i| i.saturating_mul(bin_size)).collect()
}

/// Number of `(min, max)` pairs produced for `bin_count` edges.
pub fn interval_count(bin_count: usize) -> usize {
    bin_count.saturating_sub(EDGE_TO_INTERVAL_OFFSET)
}

/// Min/max per fixed-stride interval, for drawing long traces without
/// losing amplitude extremes.
///
/// Intervals past the end of the data are `(0, 0)`; a partial interval at
/// the end is clipped to the data.
pub fn bin_extrema(series: &Series, bin_size: usize, bin_count: usize) -> Result<Vec<(f64, f64)>> {
    bin_extrema_slice(&series.data, bin_size, bin_count)
}

/// Slice form of [`bin_extrema`], usable for `f32` traces as well.
pub fn bin_extrema_slice<T: Float>(
    data: &[T],
    bin_size: usize,
    bin_count: usize,
) -> Result<Vec<(T, T)>> {
    if bin_size == 0 {
        return Err(SpikeError::invalid("bin_size", "must be at least 1"));
    }
    if bin_count == 0 {
        return Err(SpikeError::invalid("bin_count", "must be at least 1"));
    }
    let edges = bin_edges(bin_size, bin_count);
    let mut out = Vec::with_capacity(interval_count(bin_count));
    for pair in edges.windows(2) {
        out.push(extrema(data, pair[0], pair[1]));
    }
    Ok(out)
}

fn extrema<T: Float>(data: &[T], start: usize, end: usize) -> (T, T) {
    let end = end.min(data.len());
    let start = start.min(end);
    data[start..end]
        .iter()
        .fold(None, |acc: Option<(T, T)>, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
        .unwrap_or((T::zero(), T::zero()))
}
