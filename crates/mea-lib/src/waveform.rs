use crate::error::{ensure_positive, Result, SpikeError};
use crate::signal::Series;
use log::debug;
use serde::{Deserialize, Serialize};

pub const DEFAULT_WAVEFORM_WINDOW_S: f64 = 0.003;

// absorbs representation error in ratios such as 0.0015 / 1e-4
const INDEX_EPSILON: f64 = 1e-9;

/// Fixed-length snippets cut around spike times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waveforms {
    /// Samples on each side of the centre; snippets hold `2 * span` samples
    pub span: usize,
    /// Spike times that produced a snippet, in input order
    pub times: Vec<f64>,
    pub snippets: Vec<Vec<f64>>,
}

impl Waveforms {
    pub fn len(&self) -> usize {
        self.snippets.len()
    }
    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }
}

fn floor_ratio(value: f64, step: f64) -> f64 {
    (value / step + INDEX_EPSILON).floor()
}

/// Cut `[x - span, x + span)` around each spike, where `x` is the sample at
/// or before the spike time and `span = floor(window_s / 2 / dt)`.
///
/// Spikes whose window does not fit inside the series are skipped.
pub fn extract_waveforms(series: &Series, times: &[f64], window_s: f64) -> Result<Waveforms> {
    ensure_positive("window_s", window_s)?;
    let span = floor_ratio(window_s / 2.0, series.dt) as usize;
    if span == 0 {
        return Err(SpikeError::invalid(
            "window_s",
            format!("window of {window_s} s is shorter than two samples"),
        ));
    }

    let mut out = Waveforms {
        span,
        times: Vec::new(),
        snippets: Vec::new(),
    };
    for &t in times {
        let offset = floor_ratio(t - series.t0, series.dt);
        if !offset.is_finite() || offset < span as f64 {
            debug!("spike at {t} s too close to the start, skipped");
            continue;
        }
        let centre = offset as usize;
        let Some(snippet) = series.data.get(centre - span..centre + span) else {
            debug!("spike at {t} s too close to the end, skipped");
            continue;
        };
        out.times.push(t);
        out.snippets.push(snippet.to_vec());
    }
    Ok(out)
}
