/// Returned by [`delay_from`] when nothing follows `t`.
pub const NO_FOLLOWING_EVENT: f64 = f64::MAX;

/// Time from `t` to the first value strictly after it.
///
/// `sorted_values` must be ascending; this is not checked. Returns
/// [`NO_FOLLOWING_EVENT`] when no value exceeds `t`.
pub fn delay_from(sorted_values: &[f64], t: f64) -> f64 {
    let next = sorted_values.partition_point(|&v| v <= t);
    sorted_values
        .get(next)
        .map_or(NO_FOLLOWING_EVENT, |&v| v - t)
}

/// For every time in `from`, the delay to the next time in `to` (both ascending).
pub fn delays_between(from: &[f64], to: &[f64]) -> Vec<f64> {
    from.iter().map(|&t| delay_from(to, t)).collect()
}
