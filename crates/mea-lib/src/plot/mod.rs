pub mod binning;

use crate::error::{Result, SpikeError};
use crate::signal::{PeakRecord, Series, Thresholds};
use serde::{Deserialize, Serialize};

pub use binning::{bin_edges, bin_extrema, bin_extrema_slice, interval_count};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Axis {
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Style {
    pub width: f32,
    pub dash: Option<[f32; 2]>,
    pub color: Color,
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
pub struct Color(pub u32);

impl Color {
    pub fn rgb(&self) -> (u8, u8, u8) {
        (
            ((self.0 >> 16) & 0xFF) as u8,
            ((self.0 >> 8) & 0xFF) as u8,
            (self.0 & 0xFF) as u8,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub style: Style,
}

/// Vertical min/max bars, one per bin: `[time, min, max]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeSeries {
    pub name: String,
    pub bars: Vec<[f64; 3]>,
    pub style: Style,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub style: Style,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Layer {
    Line(LineSeries),
    Envelope(EnvelopeSeries),
    Markers(MarkerSeries),
}

impl Layer {
    /// `(x_min, x_max, y_min, y_max)` covered by this layer, if any.
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        let points: Vec<[f64; 2]> = match self {
            Layer::Line(line) => line.points.clone(),
            Layer::Markers(markers) => markers.points.clone(),
            Layer::Envelope(env) => env
                .bars
                .iter()
                .flat_map(|b| [[b[0], b[1]], [b[0], b[2]]])
                .collect(),
        };
        points.iter().fold(None, |acc, p| {
            let (x0, x1, y0, y1) = acc.unwrap_or((p[0], p[0], p[1], p[1]));
            Some((x0.min(p[0]), x1.max(p[0]), y0.min(p[1]), y1.max(p[1])))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub title: Option<String>,
    pub x: Axis,
    pub y: Axis,
    pub layers: Vec<Layer>,
}

impl Figure {
    pub fn new(title: impl Into<Option<String>>) -> Self {
        Self {
            title: title.into(),
            x: Axis { label: None },
            y: Axis { label: None },
            layers: Vec::new(),
        }
    }

    pub fn add_layer(&mut self, layer: Layer) {
        self.layers.push(layer);
    }

    /// Union of all layer bounds, or `None` for an empty figure.
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        self.layers
            .iter()
            .filter_map(Layer::bounds)
            .reduce(|a, b| (a.0.min(b.0), a.1.max(b.1), a.2.min(b.2), a.3.max(b.3)))
    }
}

/// Summary of a long trace: a min/max envelope over `bins` equal bins,
/// the detection thresholds and a marker per spike.
pub fn figure_from_trace(
    title: &str,
    series: &Series,
    peaks: &[PeakRecord],
    thresholds: Option<Thresholds>,
    bins: usize,
) -> Result<Figure> {
    if bins == 0 {
        return Err(SpikeError::invalid("bins", "must be at least 1"));
    }
    let bin_size = series.len().div_ceil(bins).max(1);
    // one extra edge closes the last bin
    let edges = bins + binning::EDGE_TO_INTERVAL_OFFSET;
    let extrema = bin_extrema(series, bin_size, edges)?;
    let bars = bin_edges(bin_size, edges)
        .into_iter()
        .zip(extrema)
        .filter(|(start, _)| *start < series.len())
        .map(|(start, (lo, hi))| [series.time_at(start), lo, hi])
        .collect();

    let mut fig = Figure::new(Some(title.into()));
    fig.x.label = Some("time (s)".into());
    fig.y.label = Some("amplitude".into());
    fig.add_layer(Layer::Envelope(EnvelopeSeries {
        name: title.into(),
        bars,
        style: Style {
            width: 1.0,
            dash: None,
            color: Color(0x1F4E79),
        },
    }));

    if let Some(thresholds) = thresholds {
        let span = [series.t0, series.time_at(series.len())];
        for (name, level) in [("+threshold", thresholds.positive), ("-threshold", thresholds.negative)] {
            fig.add_layer(Layer::Line(LineSeries {
                name: name.into(),
                points: span.iter().map(|&t| [t, level]).collect(),
                style: Style {
                    width: 1.0,
                    dash: Some([4.0, 4.0]),
                    color: Color(0x888888),
                },
            }));
        }
    }

    fig.add_layer(Layer::Markers(MarkerSeries {
        name: "spikes".into(),
        points: peaks.iter().map(|p| [p.time, p.amplitude]).collect(),
        style: Style {
            width: 3.0,
            dash: None,
            color: Color(0xFF0077),
        },
    }));
    Ok(fig)
}
