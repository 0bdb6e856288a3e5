//! Single-entity time series: ordered `(timestamp, value)` records.

use crate::error::{PanelError, Result};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

/// An ordered sequence of timestamped values belonging to one entity.
///
/// Timestamps are strictly increasing (no duplicates) and every value is
/// finite. Both invariants are checked on construction.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    timestamps: Vec<DateTime<Utc>>,
    values: Vec<f64>,
}

impl Series {
    /// Create a new series, validating ordering and finiteness.
    pub fn new(timestamps: Vec<DateTime<Utc>>, values: Vec<f64>) -> Result<Self> {
        if timestamps.len() != values.len() {
            return Err(PanelError::PreconditionViolation(format!(
                "{} timestamps but {} values",
                timestamps.len(),
                values.len()
            )));
        }

        for i in 1..timestamps.len() {
            if timestamps[i] == timestamps[i - 1] {
                return Err(PanelError::PreconditionViolation(format!(
                    "duplicate timestamp {} at index {}",
                    timestamps[i], i
                )));
            }
            if timestamps[i] < timestamps[i - 1] {
                return Err(PanelError::PreconditionViolation(format!(
                    "timestamps must be strictly increasing (index {i})"
                )));
            }
        }

        if let Some(i) = values.iter().position(|v| !v.is_finite()) {
            return Err(PanelError::PreconditionViolation(format!(
                "non-finite value {} at index {}",
                values[i], i
            )));
        }

        Ok(Self { timestamps, values })
    }

    /// Create a series without validation. Callers guarantee the invariants.
    pub(crate) fn from_parts_unchecked(timestamps: Vec<DateTime<Utc>>, values: Vec<f64>) -> Self {
        debug_assert_eq!(timestamps.len(), values.len());
        Self { timestamps, values }
    }

    /// Number of observations.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamps.first().copied()
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamps.last().copied()
    }

    /// Iterate over `(timestamp, value)` records.
    pub fn iter(&self) -> impl Iterator<Item = (DateTime<Utc>, f64)> + '_ {
        self.timestamps
            .iter()
            .copied()
            .zip(self.values.iter().copied())
    }

    /// Extract the records in `start..end`.
    pub fn slice(&self, start: usize, end: usize) -> Result<Series> {
        if start > end {
            return Err(PanelError::InvalidParameter(
                "start must be <= end".to_string(),
            ));
        }
        if end > self.len() {
            return Err(PanelError::InvalidParameter(format!(
                "slice end {} exceeds series length {}",
                end,
                self.len()
            )));
        }

        Ok(Series {
            timestamps: self.timestamps[start..end].to_vec(),
            values: self.values[start..end].to_vec(),
        })
    }

    /// Same timestamps, new values.
    pub fn with_values(&self, values: Vec<f64>) -> Result<Series> {
        Series::new(self.timestamps.clone(), values)
    }

    /// Split into owned timestamp and value vectors.
    pub fn into_parts(self) -> (Vec<DateTime<Utc>>, Vec<f64>) {
        (self.timestamps, self.values)
    }

    /// Infer the sampling step as the modal spacing between timestamps.
    ///
    /// Ties resolve to the smallest spacing.
    pub fn infer_step(&self) -> Result<Duration> {
        if self.len() < 2 {
            return Err(PanelError::InsufficientData {
                needed: 2,
                got: self.len(),
            });
        }

        let mut counts: BTreeMap<Duration, usize> = BTreeMap::new();
        for w in self.timestamps.windows(2) {
            *counts.entry(w[1] - w[0]).or_insert(0) += 1;
        }

        counts
            .iter()
            .fold(None, |best: Option<(Duration, usize)>, (&step, &count)| match best {
                Some((_, best_count)) if best_count >= count => best,
                _ => Some((step, count)),
            })
            .map(|(step, _)| step)
            .ok_or_else(|| PanelError::ComputationError("empty spacing data".to_string()))
    }
}
