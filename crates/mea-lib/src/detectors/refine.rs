use crate::error::{Result, SpikeError};
use crate::signal::Series;

/// Vertex time of the parabola through three `(time, amplitude)` points.
///
/// Three points determine the quadratic exactly, so the least-squares fit
/// reduces to divided differences. Collinear points (zero curvature) and
/// repeated times have no vertex and fail with [`SpikeError::DegenerateFit`].
pub fn refine(times: [f64; 3], amplitudes: [f64; 3]) -> Result<f64> {
    let [t0, t1, t2] = times;
    let [y0, y1, y2] = amplitudes;
    if t0 == t1 || t1 == t2 || t0 == t2 {
        return Err(SpikeError::DegenerateFit);
    }
    let slope_01 = (y1 - y0) / (t1 - t0);
    let slope_12 = (y2 - y1) / (t2 - t1);
    let a = (slope_12 - slope_01) / (t2 - t0);
    if a == 0.0 || !a.is_finite() {
        return Err(SpikeError::DegenerateFit);
    }
    // b = slope_01 - a (t0 + t1), vertex = -b / 2a
    Ok(0.5 * (t0 + t1) - slope_01 / (2.0 * a))
}

/// Refine the extremum at `index` using its two neighbours.
pub(crate) fn refine_at(series: &Series, index: usize) -> Result<f64> {
    let times = [
        series.time_at(index - 1),
        series.time_at(index),
        series.time_at(index + 1),
    ];
    let amplitudes = [
        series.data[index - 1],
        series.data[index],
        series.data[index + 1],
    ];
    refine(times, amplitudes)
}
