//! Labels of the 12×12 MEA grid.
//!
//! Columns are lettered `a`..`m` skipping `i`, rows are numbered from 1.
//! The four corners of the top and bottom rows carry the analog inputs
//! `analog1`..`analog8` instead of recording electrodes.

use crate::error::{Result, SpikeError};

pub const GRID_SIZE: usize = 12;

const COLUMNS: [char; GRID_SIZE] = ['a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'j', 'k', 'l', 'm'];

const ANALOG_POSITIONS: [(usize, usize); 8] = [
    (0, 0),
    (1, 0),
    (10, 0),
    (11, 0),
    (0, 11),
    (1, 11),
    (10, 11),
    (11, 11),
];

const ANALOG_TAGS: [(&str, &str); 8] = [
    ("a1", "analog1"),
    ("b1", "analog2"),
    ("l1", "analog3"),
    ("m1", "analog4"),
    ("a12", "analog5"),
    ("b12", "analog6"),
    ("l12", "analog7"),
    ("m12", "analog8"),
];

/// Grid `(column, row)` for an electrode label such as `D4`, `m12` or `analog3`.
pub fn coordinates_for_electrode(label: &str) -> Result<(usize, usize)> {
    let tag = label.trim().to_ascii_lowercase();
    if let Some(channel) = tag.strip_prefix("analog") {
        return channel
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| ANALOG_POSITIONS.get(i).copied())
            .ok_or_else(|| unknown(label));
    }

    let mut chars = tag.chars();
    let column = chars
        .next()
        .and_then(|c| COLUMNS.iter().position(|&col| col == c))
        .ok_or_else(|| unknown(label))?;
    let row = chars
        .as_str()
        .parse::<usize>()
        .ok()
        .filter(|n| (1..=GRID_SIZE).contains(n))
        .ok_or_else(|| unknown(label))?;
    Ok((column, row - 1))
}

/// Label for grid coordinates.
///
/// The row part of the label is the raw `y` value, so the corner positions
/// `(0, 1)`, `(1, 1)`, `(10, 1)`, `(11, 1)` and their `y = 12` counterparts
/// come back as analog channels.
pub fn tag_for_electrode(x: usize, y: usize) -> Result<String> {
    let letter = COLUMNS
        .get(x)
        .ok_or_else(|| SpikeError::invalid("x", format!("column {x} is off the grid")))?;
    let tag = format!("{letter}{y}");
    Ok(ANALOG_TAGS
        .iter()
        .find(|(grid, _)| *grid == tag)
        .map_or(tag, |(_, analog)| analog.to_string()))
}

fn unknown(label: &str) -> SpikeError {
    SpikeError::invalid("electrode", format!("unknown electrode label `{label}`"))
}
