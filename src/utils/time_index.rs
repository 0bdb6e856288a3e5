//! Mapping timestamps onto an integer time index.
//!
//! Regression-based transforms fit against `t = (timestamp - origin) / step`.
//! Only timestamps that fall exactly on the grid are accepted.

use crate::error::{PanelError, Result};
use chrono::{DateTime, Duration, Utc};

/// Integer grid position of `timestamp` relative to `origin`.
///
/// Timestamps before the origin map to negative positions.
pub fn grid_index(timestamp: DateTime<Utc>, origin: DateTime<Utc>, step: Duration) -> Result<i64> {
    let step_ns = step
        .num_nanoseconds()
        .filter(|&ns| ns > 0)
        .ok_or_else(|| PanelError::InvalidParameter(format!("invalid time step {step}")))?;
    let offset_ns = (timestamp - origin).num_nanoseconds().ok_or_else(|| {
        PanelError::PreconditionViolation(format!(
            "timestamp {timestamp} is too far from origin {origin}"
        ))
    })?;

    if offset_ns % step_ns != 0 {
        return Err(PanelError::PreconditionViolation(format!(
            "timestamp {timestamp} is not aligned to a {step} grid starting at {origin}"
        )));
    }
    Ok(offset_ns / step_ns)
}

/// Grid positions for a whole timestamp slice, as `f64` regressors.
pub fn grid_indices(
    timestamps: &[DateTime<Utc>],
    origin: DateTime<Utc>,
    step: Duration,
) -> Result<Vec<f64>> {
    timestamps
        .iter()
        .map(|&t| grid_index(t, origin, step).map(|i| i as f64))
        .collect()
}
