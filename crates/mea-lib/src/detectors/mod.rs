pub mod refine;
pub mod spike;

pub use refine::refine;
pub use spike::{
    choose_lobe, condition, condition_with_band, detect_spikes, find_peaks,
    find_peaks_with_window, robust_thresholds, Conditioned, Lobe, ScanWindow, SpikeDetection,
    SpikeDetectionConfig,
};
