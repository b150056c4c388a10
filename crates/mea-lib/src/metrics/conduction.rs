//! Flagging of conduction signals: one action potential travelling along an
//! axon shows up on neighbouring electrodes with a near-constant latency.
//! Only the electrode with the strongest signal is kept as the source.

use crate::io::csv::SpikeRow;
use log::debug;
use std::collections::BTreeMap;

pub const DEFAULT_COFIRING_SEPARATION_S: f64 = 0.0005;
/// Two electrodes are compared on spikes that cofire within this window.
pub const CONDUCTION_WINDOW_S: f64 = 0.0012;
/// A pair needs more cofiring spikes than this to count as conduction.
pub const MIN_CONDUCTION_SPIKES: usize = 30;
/// Upper bound on the latency standard deviation of a conduction pair.
pub const MAX_CONDUCTION_JITTER_S: f64 = 0.0003;
/// Electrodes within this fraction of the largest mean amplitude tie for keeping.
const KEEP_AMPLITUDE_FRACTION: f64 = 0.8;

/// Isolated pairs of spikes, as time-ordered indices into `rows`.
///
/// Rows are split wherever consecutive times differ by more than `min_sep`;
/// only runs of exactly two spikes are cofiring events.
pub fn cofiring_events(rows: &[SpikeRow], min_sep: f64) -> Vec<[usize; 2]> {
    let all: Vec<usize> = (0..rows.len()).collect();
    cofiring_among(rows, &all, min_sep)
}

fn cofiring_among(rows: &[SpikeRow], candidates: &[usize], min_sep: f64) -> Vec<[usize; 2]> {
    let mut order = candidates.to_vec();
    order.sort_by(|&a, &b| rows[a].time.total_cmp(&rows[b].time));
    let mut events = Vec::new();
    let mut start = 0;
    for end in 1..=order.len() {
        let split =
            end == order.len() || rows[order[end]].time - rows[order[end - 1]].time > min_sep;
        if split {
            if end - start == 2 {
                events.push([order[start], order[start + 1]]);
            }
            start = end;
        }
    }
    events
}

/// Electrode to keep among cofiring spikes: the first alphabetically of
/// those whose mean |amplitude| exceeds 80 % of the largest one.
pub fn choose_keep_electrode<'a>(rows: impl IntoIterator<Item = &'a SpikeRow>) -> Option<String> {
    let mut sums: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for row in rows {
        let entry = sums.entry(row.electrode.as_str()).or_insert((0.0, 0));
        entry.0 += row.amplitude;
        entry.1 += 1;
    }
    let means: Vec<(&str, f64)> = sums
        .into_iter()
        .map(|(electrode, (sum, n))| (electrode, (sum / n as f64).abs()))
        .collect();
    let largest = means
        .iter()
        .map(|&(_, mean)| mean)
        .fold(f64::NEG_INFINITY, f64::max);
    means
        .into_iter()
        .find(|&(_, mean)| mean > KEEP_AMPLITUDE_FRACTION * largest)
        .map(|(electrode, _)| electrode.to_string())
}

/// One flag per row: `true` for spikes that are conduction copies of a
/// spike on another electrode. Analog channels are never considered.
pub fn tag_conductance_spikes(rows: &[SpikeRow]) -> Vec<bool> {
    let mut by_electrode: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, row) in rows.iter().enumerate() {
        if !row.electrode.starts_with("analog") {
            by_electrode.entry(row.electrode.as_str()).or_default().push(i);
        }
    }
    let electrodes: Vec<(&str, &Vec<usize>)> = by_electrode.iter().map(|(e, i)| (*e, i)).collect();

    let mut flags = vec![false; rows.len()];
    for (pos, &(first, first_rows)) in electrodes.iter().enumerate() {
        for &(second, second_rows) in &electrodes[pos + 1..] {
            let candidates: Vec<usize> = first_rows.iter().chain(second_rows).copied().collect();
            let events: Vec<[usize; 2]> = cofiring_among(rows, &candidates, CONDUCTION_WINDOW_S)
                .into_iter()
                .filter(|&[a, b]| rows[a].electrode != rows[b].electrode)
                .collect();
            if 2 * events.len() <= MIN_CONDUCTION_SPIKES {
                continue;
            }
            // signed latency from the first electrode to the second
            let latencies: Vec<f64> = events
                .iter()
                .map(|&[a, b]| {
                    let (from, to) = if rows[a].electrode == first { (a, b) } else { (b, a) };
                    rows[to].time - rows[from].time
                })
                .collect();
            let jitter = sample_sd(&latencies);
            if jitter >= MAX_CONDUCTION_JITTER_S {
                continue;
            }
            let Some(keep) = choose_keep_electrode(events.iter().flatten().map(|&i| &rows[i])) else {
                continue;
            };
            debug!(
                "{first}/{second}: {} cofiring events, jitter {:.3} ms, keeping {keep}",
                events.len(),
                jitter * 1e3
            );
            for &i in events.iter().flatten() {
                if rows[i].electrode != keep {
                    flags[i] = true;
                }
            }
        }
    }
    flags
}

fn sample_sd(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::INFINITY;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() as f64 - 1.0);
    var.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(electrode: &str, time: f64, amplitude: f64) -> SpikeRow {
        SpikeRow {
            electrode: electrode.into(),
            time,
            amplitude,
            threshold: -10.0,
        }
    }

    /// `events` spikes on d4, each followed on e4 after `latency(k)` seconds.
    fn conduction_rows(events: usize, latency: impl Fn(usize) -> f64) -> Vec<SpikeRow> {
        let mut rows = Vec::new();
        for k in 0..events {
            let t = 0.01 * k as f64;
            rows.push(row("d4", t, -50.0));
            rows.push(row("e4", t + latency(k), -20.0));
            rows.push(row("analog1", t + 0.0003, -80.0));
        }
        rows
    }

    #[test]
    fn only_isolated_pairs_cofire() {
        let rows = [
            row("b", 0.0003, -1.0),
            row("a", 0.0, -1.0),
            row("a", 0.01, -1.0),
            row("b", 0.0102, -1.0),
            row("c", 0.0104, -1.0),
            row("a", 0.5, -1.0),
        ];
        assert_eq!(cofiring_events(&rows, DEFAULT_COFIRING_SEPARATION_S), vec![[1, 0]]);
        assert!(cofiring_events(&[], DEFAULT_COFIRING_SEPARATION_S).is_empty());
    }

    #[test]
    fn keep_the_strongest_electrode() {
        let rows = [row("b", 0.0, -60.0), row("a", 0.0, -30.0), row("c", 0.0, -10.0)];
        assert_eq!(choose_keep_electrode(&rows), Some("b".to_string()));
    }

    #[test]
    fn comparable_amplitudes_keep_the_first_alphabetically() {
        let rows = [
            row("b", 0.0, -60.0),
            row("a", 0.0, -50.0),
            row("a", 0.1, -50.0),
            row("c", 0.0, 5.0),
        ];
        assert_eq!(choose_keep_electrode(&rows), Some("a".to_string()));
        assert_eq!(choose_keep_electrode(std::iter::empty::<&SpikeRow>()), None);
    }

    #[test]
    fn steady_latency_pair_is_tagged() {
        let rows = conduction_rows(20, |k| if k % 2 == 0 { 0.00048 } else { 0.00052 });
        let flags = tag_conductance_spikes(&rows);
        for (row, flag) in rows.iter().zip(&flags) {
            assert_eq!(*flag, row.electrode == "e4", "{} at {}", row.electrode, row.time);
        }
    }

    #[test]
    fn jittery_pair_is_not_tagged() {
        let rows = conduction_rows(20, |k| if k % 2 == 0 { 0.0001 } else { 0.0011 });
        assert!(tag_conductance_spikes(&rows).iter().all(|f| !f));
    }

    #[test]
    fn too_few_cofiring_spikes() {
        let rows = conduction_rows(15, |_| 0.0005);
        assert!(tag_conductance_spikes(&rows).iter().all(|f| !f));
    }

    #[test]
    fn jitter_needs_two_latencies() {
        assert_eq!(sample_sd(&[0.5]), f64::INFINITY);
        assert!((sample_sd(&[1.0, 3.0]) - 2f64.sqrt()).abs() < 1e-12);
    }
}
