pub mod conduction;
pub mod latency;
pub mod table;
pub mod train;

pub use conduction::{choose_keep_electrode, cofiring_events, tag_conductance_spikes};
pub use latency::{delay_from, delays_between, NO_FOLLOWING_EVENT};
pub use table::SpikeTable;
pub use train::SpikeTrainStats;
