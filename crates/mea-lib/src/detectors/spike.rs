use crate::{
    detectors::refine::refine_at,
    error::{ensure_positive, Result, SpikeError},
    filter::{Butterworth, FilterBand, SPIKE_BAND_HIGH_HZ, SPIKE_BAND_LOW_HZ},
    signal::{PeakRecord, Series, Thresholds},
};
use anyhow::Context;
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Converts a median absolute value into a Gaussian noise standard deviation.
pub const MAD_TO_SIGMA: f64 = 0.6745;
pub const DEFAULT_AMPLIFICATION: f64 = 6.0;
/// Refractory period between two emitted spikes (seconds).
pub const DEFAULT_REFRACTORY_S: f64 = 0.001;
/// Window searched for the second lobe of a biphasic spike (seconds).
pub const DEFAULT_LOOKAROUND_S: f64 = 0.0015;

/// The paired negative lobe only has to reach this fraction of the negative threshold.
const PAIRED_LOBE_RELAXATION: f64 = 0.7;
/// A positive lobe this many times larger than its negative partner wins outright.
const POSITIVE_DOMINANCE_RATIO: f64 = 2.1;
/// Samples kept clear at the end of the scan so neighbours stay in bounds.
const SCAN_MARGIN: usize = 4;

/// Configurable parameters for filtering, thresholding and peak picking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpikeDetectionConfig {
    /// Threshold in units of the estimated noise standard deviation.
    pub amplification_factor: f64,
    /// Only report negative-going spikes.
    pub negative_only: bool,
    pub low_cutoff_hz: f64,
    pub high_cutoff_hz: f64,
    pub refractory_s: f64,
    pub lookaround_s: f64,
}

impl Default for SpikeDetectionConfig {
    fn default() -> Self {
        Self {
            amplification_factor: DEFAULT_AMPLIFICATION,
            negative_only: false,
            low_cutoff_hz: SPIKE_BAND_LOW_HZ,
            high_cutoff_hz: SPIKE_BAND_HIGH_HZ,
            refractory_s: DEFAULT_REFRACTORY_S,
            lookaround_s: DEFAULT_LOOKAROUND_S,
        }
    }
}

impl SpikeDetectionConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_positive("amplification_factor", self.amplification_factor)?;
        ensure_positive("refractory_s", self.refractory_s)?;
        ensure_positive("lookaround_s", self.lookaround_s)?;
        if !self.low_cutoff_hz.is_finite() || self.low_cutoff_hz < 0.0 {
            return Err(SpikeError::invalid(
                "low_cutoff_hz",
                format!("expected a finite value >= 0, got {}", self.low_cutoff_hz),
            ));
        }
        ensure_positive("high_cutoff_hz", self.high_cutoff_hz)?;
        Ok(())
    }

    pub fn band(&self) -> FilterBand {
        FilterBand::from_cutoffs(self.low_cutoff_hz, self.high_cutoff_hz)
    }
}

impl FromStr for SpikeDetectionConfig {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let cfg: Self = toml::from_str(s).context("parsing spike detection config")?;
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Sample counts derived from the sampling interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanWindow {
    pub min_separation: usize,
    pub lookaround: usize,
}

impl ScanWindow {
    /// 1 ms refractory period and 1.5 ms lookaround.
    pub fn for_interval(dt: f64) -> Result<Self> {
        Self::from_durations(dt, DEFAULT_REFRACTORY_S, DEFAULT_LOOKAROUND_S)
    }

    pub fn from_durations(dt: f64, refractory_s: f64, lookaround_s: f64) -> Result<Self> {
        let dt = ensure_positive("dt", dt)?;
        let refractory_s = ensure_positive("refractory_s", refractory_s)?;
        let lookaround_s = ensure_positive("lookaround_s", lookaround_s)?;
        let mut min_separation = (refractory_s / dt).floor() as usize;
        if min_separation == 0 {
            warn!("refractory period {refractory_s}s is shorter than one sample ({dt}s); using 1 sample");
            min_separation = 1;
        }
        let lookaround = (lookaround_s / dt).floor() as usize;
        Ok(Self {
            min_separation,
            lookaround,
        })
    }
}

/// Filtered trace and the thresholds derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conditioned {
    pub filtered: Series,
    pub thresholds: Thresholds,
}

/// Band-pass (200 Hz – 4 kHz, zero phase) and threshold a raw trace.
pub fn condition(raw: &Series, amplification_factor: f64) -> Result<Conditioned> {
    condition_with_band(raw, amplification_factor, FilterBand::default())
}

pub fn condition_with_band(
    raw: &Series,
    amplification_factor: f64,
    band: FilterBand,
) -> Result<Conditioned> {
    ensure_positive("amplification_factor", amplification_factor)?;
    ensure_positive("dt", raw.dt)?;
    if raw.data.iter().any(|v| !v.is_finite()) {
        return Err(SpikeError::invalid("data", "trace contains non-finite samples"));
    }
    let filter = Butterworth::design(band, raw.sample_rate())?;
    let filtered = raw.with_data(filter.filtfilt(&raw.data)?);
    let thresholds = robust_thresholds(&filtered.data, amplification_factor);
    debug!(
        "conditioned {} samples with {:?}: thresholds +/-{:.4}",
        raw.len(),
        band,
        thresholds.positive
    );
    Ok(Conditioned {
        filtered,
        thresholds,
    })
}

/// `amplification_factor × median(|x| / 0.6745)` and its negation.
///
/// A silent trace yields zero thresholds, which the picker treats like any
/// other pair: with no strict extrema nothing is emitted.
pub fn robust_thresholds(data: &[f64], amplification_factor: f64) -> Thresholds {
    let mut scaled: Vec<f64> = data.iter().map(|v| v.abs() / MAD_TO_SIGMA).collect();
    let positive = amplification_factor * median(&mut scaled);
    Thresholds {
        positive,
        negative: -positive,
    }
}

fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        0.5 * (values[mid - 1] + values[mid])
    } else {
        values[mid]
    }
}

/// Which lobe of a biphasic spike represents it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lobe {
    Positive,
    Negative,
}

/// Tie-break between a positive lobe and its paired negative lobe.
///
/// A clear amplitude winner is taken directly. Comparable lobes follow the
/// polarity of the previously emitted peak (`last_choice`, 0 before any
/// peak); with no history the larger magnitude wins, ties going positive.
pub fn choose_lobe(positive: f64, negative: f64, last_choice: f64) -> Lobe {
    let negative_magnitude = negative.abs();
    if positive > POSITIVE_DOMINANCE_RATIO * negative_magnitude {
        Lobe::Positive
    } else if negative_magnitude > positive {
        Lobe::Negative
    } else if last_choice == 0.0 {
        // only reached with |negative| <= positive, so this yields Positive inside the scanner
        if negative_magnitude > positive.abs() {
            Lobe::Negative
        } else {
            Lobe::Positive
        }
    } else if last_choice < 0.0 {
        Lobe::Negative
    } else {
        Lobe::Positive
    }
}

/// Pick spikes from an already filtered trace with the default 1 ms / 1.5 ms window.
pub fn find_peaks(
    filtered: &Series,
    thresholds: Thresholds,
    negative_only: bool,
) -> Result<Vec<PeakRecord>> {
    let window = ScanWindow::for_interval(filtered.dt)?;
    find_peaks_with_window(filtered, thresholds, negative_only, window)
}

pub fn find_peaks_with_window(
    filtered: &Series,
    thresholds: Thresholds,
    negative_only: bool,
    window: ScanWindow,
) -> Result<Vec<PeakRecord>> {
    ensure_positive("dt", filtered.dt)?;
    if !thresholds.positive.is_finite() || !thresholds.negative.is_finite() {
        return Err(SpikeError::invalid("thresholds", "must be finite"));
    }
    if window.min_separation == 0 {
        return Err(SpikeError::invalid(
            "min_separation",
            "must be at least one sample",
        ));
    }
    let needed = window.lookaround.saturating_add(SCAN_MARGIN);
    if filtered.len() <= needed {
        return Err(SpikeError::InsufficientData {
            needed,
            actual: filtered.len(),
        });
    }
    debug!(
        "scanning {} samples: min separation {}, lookaround {}, negative only {}",
        filtered.len(),
        window.min_separation,
        window.lookaround,
        negative_only
    );
    let scanner = PeakScanner {
        series: filtered,
        data: &filtered.data,
        thresholds,
        window,
        negative_only,
        end: filtered.len() - needed,
        cursor: 1,
        state: ScanState::Seeking,
        last_choice: 0.0,
        last_negative_peak: None,
        peaks: Vec::new(),
    };
    scanner.run()
}

/// Result of the full filter → threshold → pick pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpikeDetection {
    pub thresholds: Thresholds,
    pub window: ScanWindow,
    pub peaks: Vec<PeakRecord>,
}

/// Run conditioning and peak picking on a raw trace.
pub fn detect_spikes(raw: &Series, cfg: &SpikeDetectionConfig) -> Result<SpikeDetection> {
    cfg.validate()?;
    let conditioned = condition_with_band(raw, cfg.amplification_factor, cfg.band())?;
    let window = ScanWindow::from_durations(raw.dt, cfg.refractory_s, cfg.lookaround_s)?;
    let peaks = find_peaks_with_window(
        &conditioned.filtered,
        conditioned.thresholds,
        cfg.negative_only,
        window,
    )?;
    debug!("detected {} spikes", peaks.len());
    Ok(SpikeDetection {
        thresholds: conditioned.thresholds,
        window,
        peaks,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Seeking,
    /// A positive candidate at this index waits for its partner lobe.
    LookaroundPending(usize),
}

struct PeakScanner<'a> {
    series: &'a Series,
    data: &'a [f64],
    thresholds: Thresholds,
    window: ScanWindow,
    negative_only: bool,
    end: usize,
    cursor: usize,
    state: ScanState,
    last_choice: f64,
    last_negative_peak: Option<usize>,
    peaks: Vec<PeakRecord>,
}

impl PeakScanner<'_> {
    fn run(mut self) -> Result<Vec<PeakRecord>> {
        while self.cursor < self.end {
            self.state = match self.state {
                ScanState::Seeking => self.seek()?,
                ScanState::LookaroundPending(positive) => self.resolve(positive)?,
            };
        }
        Ok(self.peaks)
    }

    fn seek(&mut self) -> Result<ScanState> {
        let n = self.cursor;
        if self.is_local_min(n) && self.data[n] < self.thresholds.negative {
            self.emit(n, self.thresholds.negative)?;
            self.last_negative_peak = Some(n);
            self.cursor = n.saturating_add(self.window.min_separation);
            return Ok(ScanState::Seeking);
        }
        if !self.negative_only
            && self.is_local_max(n)
            && self.data[n] > self.thresholds.positive
            && self.clear_of_last_negative(n)
        {
            return Ok(ScanState::LookaroundPending(n));
        }
        self.cursor += 1;
        Ok(ScanState::Seeking)
    }

    fn resolve(&mut self, n: usize) -> Result<ScanState> {
        let negative = self
            .paired_negative_lobe(n)
            .filter(|&j| choose_lobe(self.data[n], self.data[j], self.last_choice) == Lobe::Negative)
            // a partner that only met the relaxed pairing level never becomes a record
            .filter(|&j| self.data[j] < self.thresholds.negative);
        match negative {
            Some(j) => {
                self.emit(j, self.thresholds.negative)?;
                self.last_negative_peak = Some(j);
                self.cursor = j.saturating_add(self.window.min_separation);
            }
            None => {
                self.emit(n, self.thresholds.positive)?;
                self.cursor = n.saturating_add(self.window.min_separation);
            }
        }
        Ok(ScanState::Seeking)
    }

    /// First strict local minimum within the lookaround that reaches the relaxed level.
    fn paired_negative_lobe(&self, n: usize) -> Option<usize> {
        let relaxed = PAIRED_LOBE_RELAXATION * self.thresholds.negative;
        (n + 1..=n + self.window.lookaround)
            .find(|&j| self.is_local_min(j) && self.data[j] < relaxed)
    }

    fn clear_of_last_negative(&self, n: usize) -> bool {
        match self.last_negative_peak {
            Some(last) => n.saturating_sub(last) > self.window.lookaround,
            None => true,
        }
    }

    fn is_local_min(&self, i: usize) -> bool {
        self.data[i] < self.data[i - 1] && self.data[i] < self.data[i + 1]
    }

    fn is_local_max(&self, i: usize) -> bool {
        self.data[i] > self.data[i - 1] && self.data[i] > self.data[i + 1]
    }

    fn emit(&mut self, index: usize, threshold: f64) -> Result<()> {
        let time = refine_at(self.series, index)?;
        let amplitude = self.data[index];
        trace!("spike at sample {index} (t={time:.6}s, amplitude {amplitude:.4})");
        self.last_choice = amplitude;
        self.peaks.push(PeakRecord {
            time,
            amplitude,
            threshold,
            index,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    const DT: f64 = 1e-4;

    fn thresholds(level: f64) -> Thresholds {
        Thresholds::symmetric(level).unwrap()
    }

    fn trace_with(len: usize, shapes: &[(usize, [f64; 3])]) -> Series {
        let mut data = vec![0.0; len];
        for &(centre, shape) in shapes {
            data[centre - 1] = shape[0];
            data[centre] = shape[1];
            data[centre + 1] = shape[2];
        }
        Series::new(data, DT, 0.0).unwrap()
    }

    #[test]
    fn scan_window_from_sampling_interval() {
        assert_eq!(
            ScanWindow::for_interval(1e-4).unwrap(),
            ScanWindow {
                min_separation: 10,
                lookaround: 15
            }
        );
        let coarse = ScanWindow::for_interval(2e-3).unwrap();
        assert_eq!(coarse.min_separation, 1);
        assert_eq!(coarse.lookaround, 0);
        assert!(ScanWindow::for_interval(0.0).is_err());
    }

    #[test]
    fn lobe_choice_prefers_dominant_positive() {
        assert_eq!(choose_lobe(30.0, -10.0, 0.0), Lobe::Positive);
        assert_eq!(choose_lobe(30.0, -10.0, -5.0), Lobe::Positive);
    }

    #[test]
    fn lobe_choice_prefers_larger_negative() {
        assert_eq!(choose_lobe(10.0, -20.0, 0.0), Lobe::Negative);
        assert_eq!(choose_lobe(10.0, -20.0, 50.0), Lobe::Negative);
    }

    #[test]
    fn comparable_lobes_follow_history() {
        assert_eq!(choose_lobe(20.0, -15.0, 0.0), Lobe::Positive);
        assert_eq!(choose_lobe(20.0, -20.0, 0.0), Lobe::Positive);
        assert_eq!(choose_lobe(20.0, -15.0, -30.0), Lobe::Negative);
        assert_eq!(choose_lobe(20.0, -15.0, 12.0), Lobe::Positive);
    }

    #[test]
    fn single_negative_dip() {
        let series = trace_with(120, &[(51, [-25.0, -50.0, -25.0])]);
        let peaks = find_peaks(&series, thresholds(10.0), true).unwrap();
        assert_eq!(peaks.len(), 1);
        let peak = peaks[0];
        assert_eq!(peak.index, 51);
        assert_eq!(peak.amplitude, -50.0);
        assert_eq!(peak.threshold, -10.0);
        assert!((peak.time - series.time_at(51)).abs() <= DT);
    }

    #[test]
    fn noise_below_threshold_yields_nothing() {
        let mut rng = StdRng::seed_from_u64(7);
        let data: Vec<f64> = (0..1000).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let series = Series::new(data, DT, 0.0).unwrap();
        assert!(find_peaks(&series, thresholds(10.0), false).unwrap().is_empty());
        assert!(find_peaks(&series, thresholds(10.0), true).unwrap().is_empty());
    }

    #[test]
    fn dominant_positive_lobe_is_reported() {
        let series = trace_with(100, &[(30, [20.0, 60.0, 20.0]), (35, [-10.0, -20.0, -10.0])]);
        let peaks = find_peaks(&series, thresholds(10.0), false).unwrap();
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].index, 30);
        assert_eq!(peaks[0].threshold, 10.0);
    }

    #[test]
    fn larger_negative_lobe_is_reported() {
        let series = trace_with(100, &[(30, [5.0, 15.0, 5.0]), (35, [-20.0, -40.0, -20.0])]);
        let peaks = find_peaks(&series, thresholds(10.0), false).unwrap();
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].index, 35);
        assert_eq!(peaks[0].amplitude, -40.0);
        assert_eq!(peaks[0].threshold, -10.0);
    }

    #[test]
    fn first_relaxed_partner_is_the_one_compared() {
        // -8 is above the negative threshold but below 0.7 of it, so it pairs
        // before the deeper lobe at 38 is reached
        let series = trace_with(
            100,
            &[
                (30, [5.0, 20.0, 5.0]),
                (33, [-4.0, -8.0, -4.0]),
                (38, [-20.0, -50.0, -20.0]),
            ],
        );
        let peaks = find_peaks(&series, thresholds(10.0), false).unwrap();
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].index, 30);
    }

    #[test]
    fn sub_threshold_partner_is_never_reported() {
        // history is negative, lobes are comparable, but -9 never crossed -10
        let series = trace_with(
            100,
            &[(10, [-10.0, -30.0, -10.0]), (40, [4.0, 11.0, 4.0]), (43, [-4.0, -9.0, -4.0])],
        );
        let peaks = find_peaks(&series, thresholds(10.0), false).unwrap();
        let indices: Vec<usize> = peaks.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![10, 40]);
        assert_eq!(peaks[1].threshold, 10.0);
    }

    #[test]
    fn ambiguous_spikes_follow_previous_polarity() {
        let series = trace_with(
            200,
            &[
                (30, [5.0, 20.0, 5.0]),
                (34, [-5.0, -15.0, -5.0]),
                (60, [-10.0, -30.0, -10.0]),
                (100, [5.0, 20.0, 5.0]),
                (104, [-5.0, -15.0, -5.0]),
            ],
        );
        let peaks = find_peaks(&series, thresholds(10.0), false).unwrap();
        let indices: Vec<usize> = peaks.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![30, 60, 104]);
        assert_eq!(peaks[2].threshold, -10.0);
    }

    #[test]
    fn positive_right_after_negative_is_ignored() {
        let series = trace_with(100, &[(20, [-10.0, -30.0, -10.0]), (32, [10.0, 40.0, 10.0])]);
        let peaks = find_peaks(&series, thresholds(10.0), false).unwrap();
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].index, 20);

        // outside the lookaround window it counts again
        let series = trace_with(100, &[(20, [-10.0, -30.0, -10.0]), (40, [10.0, 40.0, 10.0])]);
        let peaks = find_peaks(&series, thresholds(10.0), false).unwrap();
        assert_eq!(peaks.len(), 2);
    }

    #[test]
    fn unpaired_positive_and_negative_only() {
        let series = trace_with(100, &[(40, [10.0, 30.0, 10.0])]);
        let peaks = find_peaks(&series, thresholds(10.0), false).unwrap();
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].threshold, 10.0);
        assert!(find_peaks(&series, thresholds(10.0), true).unwrap().is_empty());
    }

    #[test]
    fn peaks_in_the_scan_margin_are_not_visited() {
        // lookaround 15 + margin 4: the last visited index is len - 20
        let series = trace_with(100, &[(80, [-10.0, -30.0, -10.0])]);
        assert_eq!(find_peaks(&series, thresholds(10.0), true).unwrap().len(), 1);
        let series = trace_with(100, &[(81, [-10.0, -30.0, -10.0])]);
        assert!(find_peaks(&series, thresholds(10.0), true).unwrap().is_empty());
    }

    #[test]
    fn short_series_is_rejected() {
        let series = Series::new(vec![0.0; 19], DT, 0.0).unwrap();
        assert_eq!(
            find_peaks(&series, thresholds(1.0), false),
            Err(SpikeError::InsufficientData {
                needed: 19,
                actual: 19
            })
        );
        let series = Series::new(vec![0.0; 20], DT, 0.0).unwrap();
        assert!(find_peaks(&series, thresholds(1.0), false).unwrap().is_empty());
    }

    #[test]
    fn zero_separation_window_is_rejected() {
        let series = trace_with(120, &[(50, [-10.0, -30.0, -10.0])]);
        let window = ScanWindow {
            min_separation: 0,
            lookaround: 15,
        };
        assert!(matches!(
            find_peaks_with_window(&series, thresholds(5.0), true, window),
            Err(SpikeError::InvalidParameter { name: "min_separation", .. })
        ));
    }

    #[test]
    fn oversized_windows_do_not_overflow() {
        let series = trace_with(120, &[(50, [-10.0, -30.0, -10.0]), (90, [-10.0, -30.0, -10.0])]);
        let huge_separation = ScanWindow {
            min_separation: usize::MAX,
            lookaround: 15,
        };
        let peaks = find_peaks_with_window(&series, thresholds(5.0), true, huge_separation).unwrap();
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].index, 50);

        let huge_lookaround = ScanWindow {
            min_separation: 10,
            lookaround: usize::MAX,
        };
        assert!(matches!(
            find_peaks_with_window(&series, thresholds(5.0), true, huge_lookaround),
            Err(SpikeError::InsufficientData { needed: usize::MAX, actual: 120 })
        ));

        let cfg = SpikeDetectionConfig {
            lookaround_s: 1e30,
            refractory_s: 1e30,
            ..SpikeDetectionConfig::default()
        };
        cfg.validate().unwrap();
        let raw = Series::new(vec![0.0; 4000], DT, 0.0).unwrap();
        assert!(matches!(
            detect_spikes(&raw, &cfg),
            Err(SpikeError::InsufficientData { .. })
        ));
    }

    fn spiky_noise(seed: u64, len: usize) -> Series {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut data: Vec<f64> = (0..len).map(|_| rng.gen_range(-3.0..3.0)).collect();
        for _ in 0..len / 40 {
            let at = rng.gen_range(2..len - 2);
            let amp = rng.gen_range(-60.0..60.0);
            data[at] += amp;
            data[at - 1] += 0.4 * amp;
            data[at + 1] += 0.5 * amp;
        }
        Series::new(data, DT, 0.25).unwrap()
    }

    #[test]
    fn scan_properties_hold_on_random_traces() {
        for seed in 0..20 {
            let series = spiky_noise(seed, 4000);
            let t = thresholds(12.0);
            let window = ScanWindow::for_interval(DT).unwrap();
            for negative_only in [false, true] {
                let peaks = find_peaks(&series, t, negative_only).unwrap();
                assert_eq!(peaks, find_peaks(&series, t, negative_only).unwrap());
                for pair in peaks.windows(2) {
                    assert!(pair[1].index >= pair[0].index + window.min_separation);
                }
                for peak in &peaks {
                    if peak.is_negative() {
                        assert_eq!(peak.threshold, t.negative);
                        assert!(peak.amplitude <= t.negative);
                    } else {
                        assert!(!negative_only);
                        assert_eq!(peak.threshold, t.positive);
                        assert!(peak.amplitude >= t.positive);
                    }
                    assert_eq!(peak.amplitude, series.data[peak.index]);
                    assert!(peak.time >= series.time_at(peak.index - 1));
                    assert!(peak.time <= series.time_at(peak.index + 1));
                }
            }
        }
    }

    #[test]
    fn thresholds_use_median_absolute_value() {
        let t = robust_thresholds(&[1.0, -2.0, 3.0, -4.0], 1.0);
        assert!((t.positive - 2.5 / MAD_TO_SIGMA).abs() < 1e-12);
        assert_eq!(t.negative, -t.positive);
        let t = robust_thresholds(&[-3.0, 1.0, 2.0], 6.0);
        assert!((t.positive - 6.0 * 2.0 / MAD_TO_SIGMA).abs() < 1e-12);
    }

    #[test]
    fn condition_validates_inputs() {
        let short = Series::new(vec![0.0; 15], DT, 0.0).unwrap();
        assert!(matches!(
            condition(&short, 6.0),
            Err(SpikeError::InsufficientData { .. })
        ));
        let ok = Series::new(vec![0.0; 64], DT, 0.0).unwrap();
        assert!(matches!(
            condition(&ok, 0.0),
            Err(SpikeError::InvalidParameter { name: "amplification_factor", .. })
        ));
        let mut bad = ok.clone();
        bad.data[3] = f64::NAN;
        assert!(condition(&bad, 6.0).is_err());
    }

    /// Noise plus sharp negative-going spikes at known samples.
    fn recording(fs: f64, seconds: f64, spikes: &[usize]) -> Series {
        let mut rng = StdRng::seed_from_u64(42);
        let n = (fs * seconds) as usize;
        let mut data: Vec<f64> = (0..n).map(|_| rng.gen_range(-2.0..2.0)).collect();
        for &at in spikes {
            for (offset, v) in [-30.0, -80.0, -30.0, 15.0, 20.0, 10.0].iter().enumerate() {
                data[at - 1 + offset] += v;
            }
        }
        Series::from_sample_rate(data, fs).unwrap()
    }

    #[test]
    fn detects_injected_spikes_end_to_end() {
        let spikes = [1200, 2500, 3700, 5100, 8000, 9100];
        let raw = recording(10_000.0, 1.0, &spikes);
        let detection = detect_spikes(&raw, &SpikeDetectionConfig::default()).unwrap();
        assert!(detection.thresholds.positive > 0.0);
        assert_eq!(detection.peaks.len(), spikes.len());
        for (peak, &at) in detection.peaks.iter().zip(&spikes) {
            assert!(peak.is_negative());
            assert!((peak.time - raw.time_at(at)).abs() < 3.0 * raw.dt);
        }
    }

    #[test]
    fn detection_is_deterministic() {
        let raw = recording(20_000.0, 0.5, &[2000, 6000]);
        let cfg = SpikeDetectionConfig::default();
        assert_eq!(detect_spikes(&raw, &cfg), detect_spikes(&raw, &cfg));
    }

    #[test]
    fn config_from_toml_overrides_defaults() {
        let cfg: SpikeDetectionConfig = "amplification_factor = 4.5\nnegative_only = true\n"
            .parse()
            .unwrap();
        assert_eq!(cfg.amplification_factor, 4.5);
        assert!(cfg.negative_only);
        assert_eq!(cfg.low_cutoff_hz, SPIKE_BAND_LOW_HZ);
        assert!("amplification_factor = -1.0".parse::<SpikeDetectionConfig>().is_err());
    }
}
