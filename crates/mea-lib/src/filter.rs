//! Second-order Butterworth filters applied forward and backward (zero phase).
//!
//! Coefficients come from the analog prototype `1 / (s² + √2·s + 1)`,
//! frequency-transformed in the analog domain and mapped to `z` with a
//! pre-warped bilinear transform. Filtering follows the usual `filtfilt`
//! recipe: odd extension at both ends and steady-state initial conditions, so
//! peaks in the output line up with peaks in the input.

use crate::error::{ensure_positive, Result, SpikeError};
use crate::signal::Series;
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, SQRT_2};

/// Default pass band for extracellular spikes (Hz).
pub const SPIKE_BAND_LOW_HZ: f64 = 200.0;
pub const SPIKE_BAND_HIGH_HZ: f64 = 4000.0;

/// Below this low cutoff only the low-pass stage is applied.
const LOWPASS_ONLY_BELOW_HZ: f64 = 0.1;
/// Above this high cutoff only the high-pass stage is applied.
const HIGHPASS_ONLY_ABOVE_HZ: f64 = 10_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterBand {
    LowPass { high_hz: f64 },
    HighPass { low_hz: f64 },
    BandPass { low_hz: f64, high_hz: f64 },
}

impl FilterBand {
    /// Pick the filter shape from a pair of cutoffs: a near-zero low cutoff
    /// degrades to low-pass, a very high upper cutoff to high-pass.
    pub fn from_cutoffs(low_hz: f64, high_hz: f64) -> Self {
        if low_hz < LOWPASS_ONLY_BELOW_HZ {
            FilterBand::LowPass { high_hz }
        } else if high_hz > HIGHPASS_ONLY_ABOVE_HZ {
            FilterBand::HighPass { low_hz }
        } else {
            FilterBand::BandPass { low_hz, high_hz }
        }
    }
}

impl Default for FilterBand {
    fn default() -> Self {
        FilterBand::BandPass {
            low_hz: SPIKE_BAND_LOW_HZ,
            high_hz: SPIKE_BAND_HIGH_HZ,
        }
    }
}

/// Transfer function coefficients, `a[0] == 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Butterworth {
    pub b: Vec<f64>,
    pub a: Vec<f64>,
}

impl Butterworth {
    /// Design the 2nd-order filter for `band` at the given sampling rate.
    pub fn design(band: FilterBand, sample_rate: f64) -> Result<Self> {
        ensure_positive("sample_rate", sample_rate)?;
        let nyquist = sample_rate / 2.0;
        let (num, den) = match band {
            FilterBand::LowPass { high_hz } => {
                let w = prewarp("high_cutoff_hz", high_hz, nyquist)?;
                (vec![w * w], vec![w * w, SQRT_2 * w, 1.0])
            }
            FilterBand::HighPass { low_hz } => {
                let w = prewarp("low_cutoff_hz", low_hz, nyquist)?;
                (vec![0.0, 0.0, 1.0], vec![w * w, SQRT_2 * w, 1.0])
            }
            FilterBand::BandPass { low_hz, high_hz } => {
                if low_hz >= high_hz {
                    return Err(SpikeError::invalid(
                        "low_cutoff_hz",
                        format!("must be below the high cutoff ({low_hz} >= {high_hz})"),
                    ));
                }
                let wl = prewarp("low_cutoff_hz", low_hz, nyquist)?;
                let wh = prewarp("high_cutoff_hz", high_hz, nyquist)?;
                let bw = wh - wl;
                let w0_sq = wl * wh;
                // s -> (s² + w0²) / (bw·s) applied to the 2nd-order prototype
                (
                    vec![0.0, 0.0, bw * bw],
                    vec![
                        w0_sq * w0_sq,
                        SQRT_2 * bw * w0_sq,
                        2.0 * w0_sq + bw * bw,
                        SQRT_2 * bw,
                        1.0,
                    ],
                )
            }
        };
        Ok(bilinear(&num, &den))
    }

    pub fn order(&self) -> usize {
        self.a.len().max(self.b.len()) - 1
    }

    /// Number of samples reflected onto each end before filtering.
    pub fn padlen(&self) -> usize {
        3 * self.a.len().max(self.b.len())
    }

    /// Single forward pass in transposed direct form II. `state` holds the
    /// delay line on entry and is left at its final value.
    pub fn lfilter(&self, input: &[f64], state: &mut [f64]) -> Vec<f64> {
        let n = self.order();
        debug_assert_eq!(state.len(), n);
        let mut out = Vec::with_capacity(input.len());
        for &x in input {
            let y = self.b[0] * x + state[0];
            for k in 0..n {
                let carry = if k + 1 < n { state[k + 1] } else { 0.0 };
                state[k] = self.b[k + 1] * x - self.a[k + 1] * y + carry;
            }
            out.push(y);
        }
        out
    }

    /// Delay-line contents for the steady state of a unit step.
    pub fn lfilter_zi(&self) -> Vec<f64> {
        let n = self.order();
        let gain = self.b.iter().sum::<f64>() / self.a.iter().sum::<f64>();
        let mut zi = vec![0.0; n];
        let mut acc = 0.0;
        for k in (0..n).rev() {
            acc += self.b[k + 1] - self.a[k + 1] * gain;
            zi[k] = acc;
        }
        zi
    }

    /// Zero-phase forward-backward filtering.
    pub fn filtfilt(&self, input: &[f64]) -> Result<Vec<f64>> {
        let padlen = self.padlen();
        if input.len() <= padlen {
            return Err(SpikeError::InsufficientData {
                needed: padlen,
                actual: input.len(),
            });
        }
        let extended = odd_extend(input, padlen);
        let zi = self.lfilter_zi();

        let mut state: Vec<f64> = zi.iter().map(|z| z * extended[0]).collect();
        let mut forward = self.lfilter(&extended, &mut state);
        forward.reverse();

        let mut state: Vec<f64> = zi.iter().map(|z| z * forward[0]).collect();
        let mut backward = self.lfilter(&forward, &mut state);
        backward.reverse();

        Ok(backward[padlen..backward.len() - padlen].to_vec())
    }

    /// Magnitude of the frequency response at `freq_hz`.
    pub fn gain_at(&self, freq_hz: f64, sample_rate: f64) -> f64 {
        let omega = std::f64::consts::TAU * freq_hz / sample_rate;
        let eval = |coeffs: &[f64]| {
            coeffs
                .iter()
                .enumerate()
                .fold((0.0, 0.0), |(re, im), (k, c)| {
                    let phase = -(k as f64) * omega;
                    (re + c * phase.cos(), im + c * phase.sin())
                })
        };
        let (nr, ni) = eval(&self.b);
        let (dr, di) = eval(&self.a);
        nr.hypot(ni) / dr.hypot(di)
    }
}

/// Filter a series with the band chosen by [`FilterBand::from_cutoffs`].
pub fn bandpass_filter(series: &Series, low_hz: f64, high_hz: f64) -> Result<Series> {
    let band = FilterBand::from_cutoffs(low_hz, high_hz);
    let filter = Butterworth::design(band, series.sample_rate())?;
    let filtered = filter.filtfilt(&series.data)?;
    Ok(series.with_data(filtered))
}

/// Pre-warped analog frequency for the unit-rate bilinear transform.
fn prewarp(name: &'static str, cutoff_hz: f64, nyquist: f64) -> Result<f64> {
    let wn = ensure_positive(name, cutoff_hz)? / nyquist;
    if wn >= 1.0 {
        return Err(SpikeError::invalid(
            name,
            format!("{cutoff_hz} Hz is at or above the Nyquist frequency ({nyquist} Hz)"),
        ));
    }
    Ok((FRAC_PI_2 * wn).tan())
}

/// Map `H(s) = Σ num[k]·s^k / Σ den[k]·s^k` to `z` with
/// `s = (1 - z⁻¹) / (1 + z⁻¹)`. Coefficients are in ascending powers of `s`
/// and the result in ascending powers of `z⁻¹`, normalised so `a[0] == 1`.
fn bilinear(num: &[f64], den: &[f64]) -> Butterworth {
    let order = den.len() - 1;
    let expand = |coeffs: &[f64]| {
        let mut out = vec![0.0; order + 1];
        for (k, &c) in coeffs.iter().enumerate() {
            if c == 0.0 {
                continue;
            }
            let term = poly_mul(&poly_pow(&[1.0, -1.0], k), &poly_pow(&[1.0, 1.0], order - k));
            for (o, t) in out.iter_mut().zip(term) {
                *o += c * t;
            }
        }
        out
    };
    let mut b = expand(num);
    let mut a = expand(den);
    let a0 = a[0];
    b.iter_mut().for_each(|v| *v /= a0);
    a.iter_mut().for_each(|v| *v /= a0);
    Butterworth { b, a }
}

fn poly_mul(lhs: &[f64], rhs: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; lhs.len() + rhs.len() - 1];
    for (i, l) in lhs.iter().enumerate() {
        for (j, r) in rhs.iter().enumerate() {
            out[i + j] += l * r;
        }
    }
    out
}

fn poly_pow(base: &[f64], exp: usize) -> Vec<f64> {
    (0..exp).fold(vec![1.0], |acc, _| poly_mul(&acc, base))
}

fn odd_extend(input: &[f64], padlen: usize) -> Vec<f64> {
    let n = input.len();
    let first = input[0];
    let last = input[n - 1];
    let mut out = Vec::with_capacity(n + 2 * padlen);
    out.extend((1..=padlen).rev().map(|i| 2.0 * first - input[i]));
    out.extend_from_slice(input);
    out.extend((1..=padlen).map(|i| 2.0 * last - input[n - 1 - i]));
    out
}
