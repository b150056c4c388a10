pub mod detectors;
pub mod electrode;
pub mod error;
pub mod filter;
pub mod io;
pub mod metrics;
pub mod plot;
pub mod signal;
pub mod waveform;

pub use detectors::*;
pub use electrode::{coordinates_for_electrode, tag_for_electrode};
pub use error::{Result, SpikeError};
pub use filter::{bandpass_filter, Butterworth, FilterBand};
pub use metrics::*;
pub use signal::*;
pub use waveform::{extract_waveforms, Waveforms, DEFAULT_WAVEFORM_WINDOW_S};
