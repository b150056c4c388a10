use thiserror::Error;

/// Failures surfaced by the detection, filtering and binning routines.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpikeError {
    /// The series is shorter than the filter padding or the scan margin.
    #[error("insufficient data: need more than {needed} samples, got {actual}")]
    InsufficientData { needed: usize, actual: usize },
    /// Three refinement points lie on a line (or share a time), so no vertex exists.
    #[error("degenerate quadratic fit: the three points have no curvature")]
    DegenerateFit,
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

impl SpikeError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        SpikeError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SpikeError>;

/// Reject values that are not finite and strictly positive.
pub(crate) fn ensure_positive(name: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(SpikeError::invalid(
            name,
            format!("expected a finite value > 0, got {value}"),
        ))
    }
}
