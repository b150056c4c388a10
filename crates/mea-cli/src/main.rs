use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, warn};
use mea_lib::{
    detectors::spike::{
        condition_with_band, detect_spikes, find_peaks_with_window, ScanWindow, SpikeDetection,
        SpikeDetectionConfig,
    },
    electrode::{coordinates_for_electrode, tag_for_electrode},
    filter::{bandpass_filter, SPIKE_BAND_HIGH_HZ, SPIKE_BAND_LOW_HZ},
    io::{csv as csv_io, csv::SpikeRow, text as text_io},
    metrics::{delay_from, tag_conductance_spikes, SpikeTrainStats, NO_FOLLOWING_EVENT},
    plot::{bin_extrema_slice, figure_from_trace, Figure, Layer, Style},
    signal::Series,
    waveform::{extract_waveforms, DEFAULT_WAVEFORM_WINDOW_S},
};
use plotters::prelude::*;
use serde::Serialize;
use std::{
    io,
    path::{Path, PathBuf},
};

const PLOT_SIZE: (u32, u32) = (1000, 480);

#[derive(Parser)]
#[command(
    name = "mea",
    version,
    about = "MEA: spike detection and trace summaries for microelectrode array recordings"
)]
struct Cli {
    /// Default log filter; RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

/// Where the samples come from and how they are timed.
#[derive(Args)]
struct TraceArgs {
    /// Newline-delimited samples; read from stdin when omitted
    #[arg(long)]
    input: Option<PathBuf>,
    /// Sampling rate (Hz)
    #[arg(long, conflicts_with = "dt")]
    fs: Option<f64>,
    /// Sampling interval (s)
    #[arg(long)]
    dt: Option<f64>,
    /// Time of the first sample (s)
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    t0: f64,
}

impl TraceArgs {
    fn samples(&self) -> Result<Vec<f64>> {
        text_io::read_f64_input(self.input.as_deref(), io::stdin())
    }

    fn series(&self) -> Result<Series> {
        let dt = match (self.fs, self.dt) {
            (Some(fs), _) if fs > 0.0 => 1.0 / fs,
            (Some(fs), _) => bail!("--fs must be positive, got {fs}"),
            (None, Some(dt)) => dt,
            (None, None) => bail!("one of --fs or --dt is required"),
        };
        let series = Series::new(self.samples()?, dt, self.t0)?;
        info!(
            "loaded {} samples at {} Hz ({:.3} s)",
            series.len(),
            series.sample_rate(),
            series.duration()
        );
        Ok(series)
    }
}

#[derive(Args)]
struct DetectArgs {
    /// TOML file with detection parameters; the flags below override it
    #[arg(long)]
    config: Option<PathBuf>,
    /// Threshold in units of the estimated noise standard deviation
    #[arg(long)]
    amp: Option<f64>,
    /// Only report negative-going spikes
    #[arg(long)]
    negative_only: bool,
    /// Lower band edge (Hz); below 0.1 the filter is low-pass only
    #[arg(long)]
    low_hz: Option<f64>,
    /// Upper band edge (Hz); above 10 kHz the filter is high-pass only
    #[arg(long)]
    high_hz: Option<f64>,
}

impl DetectArgs {
    fn config(&self) -> Result<SpikeDetectionConfig> {
        let mut cfg = match &self.config {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?
                .parse::<SpikeDetectionConfig>()?,
            None => SpikeDetectionConfig::default(),
        };
        if let Some(amp) = self.amp {
            cfg.amplification_factor = amp;
        }
        if self.negative_only {
            cfg.negative_only = true;
        }
        if let Some(low) = self.low_hz {
            cfg.low_cutoff_hz = low;
        }
        if let Some(high) = self.high_hz {
            cfg.high_cutoff_hz = high;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect spikes in a raw trace
    Detect {
        #[command(flatten)]
        trace: TraceArgs,
        #[command(flatten)]
        detect: DetectArgs,
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
        /// Electrode label written with every spike
        #[arg(long, default_value = "unknown")]
        electrode: String,
    },
    /// Band-pass filter a raw trace and report the detection thresholds
    Condition {
        #[command(flatten)]
        trace: TraceArgs,
        #[command(flatten)]
        detect: DetectArgs,
    },
    /// Min/max per fixed-size bin
    Bin {
        #[command(flatten)]
        trace: TraceArgs,
        #[arg(long)]
        bin_size: usize,
        /// Number of bin edges; one fewer pair is produced
        #[arg(long)]
        bin_count: usize,
        /// Filter to the spike band before binning (needs --fs or --dt)
        #[arg(long)]
        filtered: bool,
    },
    /// Delay from --t to the next value of an ascending list
    Delay {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long, allow_negative_numbers = true)]
        t: f64,
    },
    /// Cut fixed-length snippets around spike times
    Waveforms {
        #[command(flatten)]
        trace: TraceArgs,
        /// Newline-delimited spike times (s)
        #[arg(long)]
        times: PathBuf,
        #[arg(long, default_value_t = DEFAULT_WAVEFORM_WINDOW_S)]
        window_s: f64,
        /// Filter to the spike band before cutting
        #[arg(long)]
        filtered: bool,
    },
    /// Detect spikes and summarise the train
    Stats {
        #[command(flatten)]
        trace: TraceArgs,
        #[command(flatten)]
        detect: DetectArgs,
    },
    /// Convert between electrode labels and grid coordinates
    Electrode {
        #[arg(required_unless_present = "x", conflicts_with = "x")]
        label: Option<String>,
        #[arg(long, requires = "y")]
        x: Option<usize>,
        #[arg(long, requires = "x")]
        y: Option<usize>,
    },
    /// Render the filtered trace, thresholds and spikes to a PNG
    Plot {
        #[command(flatten)]
        trace: TraceArgs,
        #[command(flatten)]
        detect: DetectArgs,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 1000)]
        bins: usize,
        #[arg(long)]
        title: Option<String>,
    },
    /// Flag conduction copies in a spike table written by `detect --format csv`
    Conduction {
        #[arg(long)]
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_level.as_str()))
        .init();
    match cli.command {
        Commands::Detect {
            trace,
            detect,
            format,
            electrode,
        } => cmd_detect(&trace, &detect, format, &electrode)?,
        Commands::Condition { trace, detect } => cmd_condition(&trace, &detect)?,
        Commands::Bin {
            trace,
            bin_size,
            bin_count,
            filtered,
        } => cmd_bin(&trace, bin_size, bin_count, filtered)?,
        Commands::Delay { input, t } => cmd_delay(input.as_deref(), t)?,
        Commands::Waveforms {
            trace,
            times,
            window_s,
            filtered,
        } => cmd_waveforms(&trace, &times, window_s, filtered)?,
        Commands::Stats { trace, detect } => cmd_stats(&trace, &detect)?,
        Commands::Electrode { label, x, y } => cmd_electrode(label.as_deref(), x, y)?,
        Commands::Plot {
            trace,
            detect,
            out,
            bins,
            title,
        } => cmd_plot(&trace, &detect, &out, bins, title.as_deref())?,
        Commands::Conduction { input } => cmd_conduction(&input)?,
    }
    Ok(())
}

#[derive(Serialize)]
struct DetectOutput<'a> {
    electrode: &'a str,
    #[serde(flatten)]
    detection: &'a SpikeDetection,
}

fn cmd_detect(
    trace: &TraceArgs,
    detect: &DetectArgs,
    format: OutputFormat,
    electrode: &str,
) -> Result<()> {
    let series = trace.series()?;
    let detection = detect_spikes(&series, &detect.config()?)?;
    match format {
        OutputFormat::Json => {
            let out = DetectOutput {
                electrode,
                detection: &detection,
            };
            println!("{}", serde_json::to_string(&out)?);
        }
        OutputFormat::Csv => csv_io::write_spike_csv(io::stdout().lock(), electrode, &detection.peaks)?,
    }
    Ok(())
}

fn cmd_condition(trace: &TraceArgs, detect: &DetectArgs) -> Result<()> {
    let series = trace.series()?;
    let cfg = detect.config()?;
    let conditioned = condition_with_band(&series, cfg.amplification_factor, cfg.band())?;
    println!("{}", serde_json::to_string(&conditioned)?);
    Ok(())
}

fn cmd_bin(trace: &TraceArgs, bin_size: usize, bin_count: usize, filtered: bool) -> Result<()> {
    let data = if filtered {
        bandpass_filter(&trace.series()?, SPIKE_BAND_LOW_HZ, SPIKE_BAND_HIGH_HZ)?.data
    } else {
        trace.samples()?
    };
    let extrema = bin_extrema_slice(&data, bin_size, bin_count)?;
    println!("{}", serde_json::to_string(&extrema)?);
    Ok(())
}

fn cmd_delay(input: Option<&Path>, t: f64) -> Result<()> {
    let values = text_io::read_f64_input(input, io::stdin())?;
    if values.windows(2).any(|w| w[1] < w[0]) {
        bail!("values must be sorted in ascending order");
    }
    let delay = Some(delay_from(&values, t)).filter(|&d| d != NO_FOLLOWING_EVENT);
    println!("{}", serde_json::to_string(&delay)?);
    Ok(())
}

fn cmd_waveforms(trace: &TraceArgs, times: &Path, window_s: f64, filtered: bool) -> Result<()> {
    let mut series = trace.series()?;
    if filtered {
        series = bandpass_filter(&series, SPIKE_BAND_LOW_HZ, SPIKE_BAND_HIGH_HZ)?;
    }
    let times = text_io::read_f64_series(times)?;
    let waveforms = extract_waveforms(&series, &times, window_s)?;
    if waveforms.len() < times.len() {
        info!(
            "{} of {} spikes too close to the edges",
            times.len() - waveforms.len(),
            times.len()
        );
    }
    println!("{}", serde_json::to_string(&waveforms)?);
    Ok(())
}

fn cmd_stats(trace: &TraceArgs, detect: &DetectArgs) -> Result<()> {
    let series = trace.series()?;
    let detection = detect_spikes(&series, &detect.config()?)?;
    let stats = SpikeTrainStats::from_peaks(&detection.peaks, series.duration());
    println!("{}", serde_json::to_string(&stats)?);
    Ok(())
}

#[derive(Serialize)]
struct ElectrodeOutput {
    label: String,
    x: usize,
    y: usize,
}

fn cmd_electrode(label: Option<&str>, x: Option<usize>, y: Option<usize>) -> Result<()> {
    let out = match (label, x, y) {
        (Some(label), _, _) => {
            let (x, y) = coordinates_for_electrode(label)?;
            ElectrodeOutput {
                label: label.trim().to_ascii_lowercase(),
                x,
                y,
            }
        }
        (None, Some(x), Some(y)) => ElectrodeOutput {
            label: tag_for_electrode(x, y)?,
            x,
            y,
        },
        _ => bail!("give an electrode label or both --x and --y"),
    };
    println!("{}", serde_json::to_string(&out)?);
    Ok(())
}

fn cmd_plot(
    trace: &TraceArgs,
    detect: &DetectArgs,
    out: &Path,
    bins: usize,
    title: Option<&str>,
) -> Result<()> {
    let series = trace.series()?;
    let cfg = detect.config()?;
    let conditioned = condition_with_band(&series, cfg.amplification_factor, cfg.band())?;
    let window = ScanWindow::from_durations(series.dt, cfg.refractory_s, cfg.lookaround_s)?;
    let peaks = find_peaks_with_window(
        &conditioned.filtered,
        conditioned.thresholds,
        cfg.negative_only,
        window,
    )?;
    let fig = figure_from_trace(
        title.unwrap_or("Filtered trace"),
        &conditioned.filtered,
        &peaks,
        Some(conditioned.thresholds),
        bins,
    )?;
    if let Err(err) = draw_plotters_figure(out, &fig, true) {
        warn!("drawing with text failed ({err}); retrying without text");
        draw_plotters_figure(out, &fig, false)?;
    }
    info!("wrote {}", out.display());
    Ok(())
}

#[derive(Serialize)]
struct TaggedSpike<'a> {
    #[serde(flatten)]
    row: &'a SpikeRow,
    conductance: bool,
}

fn cmd_conduction(input: &Path) -> Result<()> {
    let file = std::fs::File::open(input)
        .with_context(|| format!("failed to open {}", input.display()))?;
    let rows = csv_io::read_spike_csv(file)?;
    let flags = tag_conductance_spikes(&rows);
    info!(
        "{} of {} spikes are conduction copies",
        flags.iter().filter(|f| **f).count(),
        rows.len()
    );
    let tagged: Vec<TaggedSpike> = rows
        .iter()
        .zip(flags)
        .map(|(row, conductance)| TaggedSpike { row, conductance })
        .collect();
    println!("{}", serde_json::to_string(&tagged)?);
    Ok(())
}

/// Render `fig` to a PNG. Without `with_text` no caption or axis labels are
/// drawn, so no font is needed.
fn draw_plotters_figure(path: &Path, fig: &Figure, with_text: bool) -> Result<()> {
    let backend = BitMapBackend::new(path, PLOT_SIZE);
    let root = backend.into_drawing_area();
    root.fill(&WHITE)?;
    let (x_min, x_max, y_min, y_max) = fig.bounds().unwrap_or((0.0, 1.0, -1.0, 1.0));
    let (x_min, x_max) = widen(x_min, x_max, 0.0);
    let (y_min, y_max) = widen(y_min, y_max, 0.05);
    let mut builder = ChartBuilder::on(&root);
    builder.margin(10);
    if with_text {
        builder
            .caption(
                fig.title.clone().unwrap_or_else(|| "Trace".into()),
                ("sans-serif", 24),
            )
            .x_label_area_size(30)
            .y_label_area_size(50);
    }
    let mut chart = builder.build_cartesian_2d(x_min..x_max, y_min..y_max)?;
    if with_text {
        let mut mesh = chart.configure_mesh();
        if let Some(label) = &fig.x.label {
            mesh.x_desc(label.as_str());
        }
        if let Some(label) = &fig.y.label {
            mesh.y_desc(label.as_str());
        }
        mesh.draw()?;
    }

    for layer in &fig.layers {
        match layer {
            Layer::Line(line) => {
                let style = shape_style(&line.style);
                match line.style.dash {
                    None => {
                        chart.draw_series(LineSeries::new(
                            line.points.iter().map(|p| (p[0], p[1])),
                            style,
                        ))?;
                    }
                    Some(pattern) => {
                        chart.draw_series(
                            dash_segments(&line.points, pattern, x_max - x_min)
                                .into_iter()
                                .map(|segment| PathElement::new(segment, style)),
                        )?;
                    }
                }
            }
            Layer::Envelope(env) => {
                let style = shape_style(&env.style);
                chart.draw_series(
                    env.bars
                        .iter()
                        .map(|b| PathElement::new(vec![(b[0], b[1]), (b[0], b[2])], style)),
                )?;
            }
            Layer::Markers(markers) => {
                let style = shape_style(&markers.style).filled();
                chart.draw_series(
                    markers
                        .points
                        .iter()
                        .map(|p| Circle::new((p[0], p[1]), markers.style.width as u32, style)),
                )?;
            }
        }
    }
    root.present()?;
    Ok(())
}

fn shape_style(style: &Style) -> ShapeStyle {
    let (r, g, b) = style.color.rgb();
    RGBColor(r, g, b).stroke_width(style.width.max(1.0) as u32)
}

/// Pad a range by `margin` of its span, and give a flat range some height.
fn widen(min: f64, max: f64, margin: f64) -> (f64, f64) {
    let span = max - min;
    if span.abs() < f64::EPSILON {
        (min - 1.0, max + 1.0)
    } else {
        (min - span * margin, max + span * margin)
    }
}

/// Split a polyline into `[on, off]` pixel dashes; lengths are measured along x.
fn dash_segments(points: &[[f64; 2]], pattern: [f32; 2], x_span: f64) -> Vec<Vec<(f64, f64)>> {
    let units_per_px = x_span / f64::from(PLOT_SIZE.0);
    let on = f64::from(pattern[0].max(1.0)) * units_per_px;
    let period = on + f64::from(pattern[1].max(0.0)) * units_per_px;
    let mut out = Vec::new();
    for pair in points.windows(2) {
        let ([x0, y0], [x1, y1]) = (pair[0], pair[1]);
        let len = (x1 - x0).abs();
        if len == 0.0 || period <= 0.0 {
            continue;
        }
        let at = |d: f64| (x0 + (x1 - x0) * d / len, y0 + (y1 - y0) * d / len);
        let mut start = 0.0;
        while start < len {
            out.push(vec![at(start), at((start + on).min(len))]);
            start += period;
        }
    }
    out
}
