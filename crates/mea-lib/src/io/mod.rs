pub mod csv;
pub mod text;

pub use self::csv::{read_spike_csv, write_spike_csv, SpikeRow};
pub use text::{parse_f64_series, read_f64_input, read_f64_series};
