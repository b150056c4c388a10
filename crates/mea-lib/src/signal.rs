use crate::error::{ensure_positive, Result, SpikeError};
use serde::{Deserialize, Serialize};

/// Uniformly sampled single-electrode trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    /// Sampling interval in seconds
    pub dt: f64,
    /// Time of the first sample in seconds
    pub t0: f64,
    /// Samples
    pub data: Vec<f64>,
}

impl Series {
    /// Build a series, rejecting a non-positive or non-finite sampling interval.
    pub fn new(data: Vec<f64>, dt: f64, t0: f64) -> Result<Self> {
        ensure_positive("dt", dt)?;
        if !t0.is_finite() {
            return Err(SpikeError::invalid("t0", "start time must be finite"));
        }
        Ok(Self { dt, t0, data })
    }

    pub fn from_sample_rate(data: Vec<f64>, fs: f64) -> Result<Self> {
        ensure_positive("fs", fs)?;
        Self::new(data, 1.0 / fs, 0.0)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    pub fn sample_rate(&self) -> f64 {
        1.0 / self.dt
    }
    pub fn nyquist(&self) -> f64 {
        self.sample_rate() / 2.0
    }
    pub fn duration(&self) -> f64 {
        self.data.len() as f64 * self.dt
    }

    /// Time of sample `index`; defined for indices past the end as well.
    pub fn time_at(&self, index: usize) -> f64 {
        self.t0 + index as f64 * self.dt
    }

    /// Same timing, different samples.
    pub fn with_data(&self, data: Vec<f64>) -> Self {
        Self {
            dt: self.dt,
            t0: self.t0,
            data,
        }
    }
}

/// Signed detection thresholds derived once per series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub positive: f64,
    pub negative: f64,
}

impl Thresholds {
    /// Symmetric pair around zero.
    pub fn symmetric(positive: f64) -> Result<Self> {
        ensure_positive("positive_threshold", positive)?;
        Ok(Self {
            positive,
            negative: -positive,
        })
    }
}

/// One detected spike.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakRecord {
    /// Sub-sample refined peak time (seconds)
    pub time: f64,
    /// Sample value at `index` of the scanned trace
    pub amplitude: f64,
    /// Signed threshold that qualified the peak
    pub threshold: f64,
    /// Discrete sample the peak originates from
    pub index: usize,
}

impl PeakRecord {
    pub fn is_negative(&self) -> bool {
        self.threshold < 0.0
    }
}
