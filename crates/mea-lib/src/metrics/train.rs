use crate::signal::PeakRecord;
use serde::{Deserialize, Serialize};

/// Summary statistics of one electrode's spike train.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpikeTrainStats {
    pub count: usize,
    /// Spikes per second over the recording duration
    pub firing_rate_hz: f64,
    pub mean_amplitude: f64,
    /// Mean inter-spike interval (seconds)
    pub mean_isi: f64,
    pub sd_isi: f64,
}

impl SpikeTrainStats {
    pub fn from_peaks(peaks: &[PeakRecord], duration_s: f64) -> Self {
        let count = peaks.len();
        let firing_rate_hz = if duration_s > 0.0 {
            count as f64 / duration_s
        } else {
            0.0
        };
        let mean_amplitude = if count > 0 {
            peaks.iter().map(|p| p.amplitude).sum::<f64>() / count as f64
        } else {
            0.0
        };
        let isi: Vec<f64> = peaks.windows(2).map(|w| w[1].time - w[0].time).collect();
        let (mean_isi, sd_isi) = if isi.is_empty() {
            (0.0, 0.0)
        } else {
            let mean = isi.iter().sum::<f64>() / isi.len() as f64;
            let sd = if isi.len() > 1 {
                (isi.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (isi.len() as f64 - 1.0))
                    .sqrt()
            } else {
                0.0
            };
            (mean, sd)
        };

        SpikeTrainStats {
            count,
            firing_rate_hz,
            mean_amplitude,
            mean_isi,
            sd_isi,
        }
    }
}
