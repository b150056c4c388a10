use anyhow::{Context, Result};
use csv::{ReaderBuilder, Trim, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

use crate::signal::PeakRecord;

/// One row of a spike table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpikeRow {
    pub electrode: String,
    pub time: f64,
    pub amplitude: f64,
    pub threshold: f64,
}

/// Write `electrode,time,amplitude,threshold` rows, header first.
pub fn write_spike_csv<W: Write>(writer: W, electrode: &str, peaks: &[PeakRecord]) -> Result<()> {
    let mut out = WriterBuilder::new().has_headers(true).from_writer(writer);
    for peak in peaks {
        out.serialize(SpikeRow {
            electrode: electrode.to_string(),
            time: peak.time,
            amplitude: peak.amplitude,
            threshold: peak.threshold,
        })
        .context("writing spike row")?;
    }
    // an empty table still carries its header
    if peaks.is_empty() {
        out.write_record(["electrode", "time", "amplitude", "threshold"])?;
    }
    out.flush().context("flushing spike table")?;
    Ok(())
}

/// Read a spike table produced by [`write_spike_csv`].
pub fn read_spike_csv<R: Read>(reader: R) -> Result<Vec<SpikeRow>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(reader);
    let mut rows = Vec::new();
    for (idx, record) in rdr.deserialize().enumerate() {
        let row: SpikeRow = record.with_context(|| format!("parsing spike row {}", idx + 1))?;
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peaks() -> Vec<PeakRecord> {
        vec![
            PeakRecord {
                time: 0.12,
                amplitude: -42.5,
                threshold: -20.0,
                index: 1200,
            },
            PeakRecord {
                time: 0.5,
                amplitude: 31.0,
                threshold: 20.0,
                index: 5000,
            },
        ]
    }

    #[test]
    fn header_and_rows() {
        let mut buf = Vec::new();
        write_spike_csv(&mut buf, "d4", &peaks()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "electrode,time,amplitude,threshold");
        assert_eq!(lines[1], "d4,0.12,-42.5,-20.0");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn empty_table_keeps_header() {
        let mut buf = Vec::new();
        write_spike_csv(&mut buf, "a2", &[]).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "electrode,time,amplitude,threshold\n"
        );
    }

    #[test]
    fn reads_rows_back() {
        let mut buf = Vec::new();
        write_spike_csv(&mut buf, "m12", &peaks()).unwrap();
        let rows = read_spike_csv(buf.as_slice()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].electrode, "m12");
        assert_eq!(rows[1].amplitude, 31.0);
    }
}
