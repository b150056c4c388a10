use crate::io::csv::SpikeRow;
use std::collections::BTreeMap;

/// Spike rows grouped by electrode, iterated in a sortable electrode order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpikeTable {
    groups: BTreeMap<String, Vec<SpikeRow>>,
    order: Vec<String>,
}

fn rows_of<'a>(groups: &'a BTreeMap<String, Vec<SpikeRow>>, electrode: &str) -> &'a [SpikeRow] {
    groups.get(electrode).map(Vec::as_slice).unwrap_or(&[])
}

impl SpikeTable {
    /// Group rows by electrode, keeping their input order within a group.
    /// Electrodes start out in alphabetical order.
    pub fn from_rows(rows: &[SpikeRow]) -> Self {
        let mut groups: BTreeMap<String, Vec<SpikeRow>> = BTreeMap::new();
        for row in rows {
            groups
                .entry(row.electrode.clone())
                .or_default()
                .push(row.clone());
        }
        let order = groups.keys().cloned().collect();
        Self { groups, order }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
    pub fn electrodes(&self) -> &[String] {
        &self.order
    }

    /// Rows of `electrode`; empty when it never fired.
    pub fn get(&self, electrode: &str) -> &[SpikeRow] {
        rows_of(&self.groups, electrode)
    }

    /// Electrode at `position` in the current order.
    pub fn nth(&self, position: usize) -> Option<(&str, &[SpikeRow])> {
        self.order
            .get(position)
            .map(|e| (e.as_str(), self.get(e)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[SpikeRow])> + '_ {
        self.order.iter().map(|e| (e.as_str(), self.get(e)))
    }

    /// Latest spike time over all electrodes.
    pub fn max_time(&self) -> Option<f64> {
        self.groups
            .values()
            .flatten()
            .map(|row| row.time)
            .reduce(f64::max)
    }

    /// Most active electrodes first.
    pub fn sort_by_firing_rate(&mut self) {
        self.sort_by_key(|rows| rows.len() as f64, true);
    }

    /// Stable sort of the electrode order by a per-electrode key.
    pub fn sort_by_key(&mut self, key: impl Fn(&[SpikeRow]) -> f64, descending: bool) {
        let groups = &self.groups;
        self.order.sort_by(|a, b| {
            let ord = key(rows_of(groups, a)).total_cmp(&key(rows_of(groups, b)));
            if descending {
                ord.reverse()
            } else {
                ord
            }
        });
    }
}
