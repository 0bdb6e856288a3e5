//! Per-entity fitted state retained by transforms for inversion.

use crate::core::{EntityId, Series};
use crate::error::{PanelError, Result};
use chrono::{DateTime, Duration, Utc};
use std::collections::btree_map;
use std::collections::BTreeMap;

/// Fitted parameters for one entity plus named auxiliary series.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct EntityState<P> {
    /// Parameters needed to invert the transform for this entity.
    pub params: P,
    /// Derived series kept for inspection (e.g. the fitted seasonal component).
    pub artifacts: BTreeMap<String, Vec<f64>>,
}

impl<P> EntityState<P> {
    pub fn new(params: P) -> Self {
        Self {
            params,
            artifacts: BTreeMap::new(),
        }
    }

    pub fn with_artifact(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.artifacts.insert(name.into(), values);
        self
    }

    pub fn artifact(&self, name: &str) -> Option<&[f64]> {
        self.artifacts.get(name).map(Vec::as_slice)
    }
}

/// Mapping from entity to its fitted state.
///
/// Created empty with the transform, filled by `fit_apply`, read by `invert`.
/// A re-fit replaces the state of the entities it saw and keeps the rest.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct TransformState<P> {
    entities: BTreeMap<EntityId, EntityState<P>>,
}

impl<P> Default for TransformState<P> {
    fn default() -> Self {
        Self {
            entities: BTreeMap::new(),
        }
    }
}

impl<P> TransformState<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn contains(&self, entity: &EntityId) -> bool {
        self.entities.contains_key(entity)
    }

    /// State for `entity`, or `MissingState` if it was never fitted.
    pub fn get(&self, entity: &EntityId) -> Result<&EntityState<P>> {
        self.entities
            .get(entity)
            .ok_or_else(|| PanelError::MissingState {
                entity: entity.clone(),
            })
    }

    pub fn params(&self, entity: &EntityId) -> Result<&P> {
        self.get(entity).map(|s| &s.params)
    }

    /// Named artifact for an entity, if both exist.
    pub fn artifact(&self, entity: &EntityId, name: &str) -> Option<&[f64]> {
        self.entities.get(entity).and_then(|s| s.artifact(name))
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityId> {
        self.entities.keys()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, EntityId, EntityState<P>> {
        self.entities.iter()
    }

    pub(crate) fn insert(&mut self, entity: EntityId, state: EntityState<P>) {
        self.entities.insert(entity, state);
    }

    /// Overwrite-by-entity merge: entities in `fresh` replace existing ones.
    pub fn merge(&mut self, fresh: TransformState<P>) {
        self.entities.extend(fresh.entities);
    }
}

impl<P> FromIterator<(EntityId, EntityState<P>)> for TransformState<P> {
    fn from_iter<T: IntoIterator<Item = (EntityId, EntityState<P>)>>(iter: T) -> Self {
        Self {
            entities: iter.into_iter().collect(),
        }
    }
}

/// Raw observations kept by lag-based transforms to seed their inverse.
///
/// `head` holds the records that precede the transformed output window, used
/// to rebuild the fitted window itself. `tail` holds the last raw values,
/// used to continue a series past the fitted window (e.g. a forecast).
/// A continuation must be contiguous: it starts one sampling step after the
/// last fitted observation and advances by that step.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct SeedHistory {
    pub head_timestamps: Vec<DateTime<Utc>>,
    pub head_values: Vec<f64>,
    pub tail_values: Vec<f64>,
    pub first_output_timestamp: DateTime<Utc>,
    pub last_timestamp: DateTime<Utc>,
    /// Modal sampling step of the fitted series in nanoseconds, `None` when
    /// it had a single observation.
    pub step_ns: Option<i64>,
}

/// How an inverse call lines up with the fitted window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedAlignment {
    /// The input starts where the transformed output started.
    FittedWindow,
    /// The input starts after the last fitted observation.
    Continuation,
}

impl SeedHistory {
    /// Capture seeds of width `window` from a raw series of at least
    /// `window + 1` observations.
    pub(crate) fn capture(series: &Series, window: usize) -> Self {
        let n = series.len();
        let timestamps = series.timestamps();
        let values = series.values();
        Self {
            head_timestamps: timestamps[..window].to_vec(),
            head_values: values[..window].to_vec(),
            tail_values: values[n - window..].to_vec(),
            first_output_timestamp: timestamps[window],
            last_timestamp: timestamps[n - 1],
            step_ns: series
                .infer_step()
                .ok()
                .and_then(|step| step.num_nanoseconds()),
        }
    }

    /// Sampling step of the fitted series, if it had at least two records.
    pub fn step(&self) -> Option<Duration> {
        self.step_ns.map(Duration::nanoseconds)
    }

    /// Decide which seeds apply to an inverse input with the given
    /// (non-empty) timestamps.
    pub fn align(&self, entity: &EntityId, timestamps: &[DateTime<Utc>]) -> Result<SeedAlignment> {
        let Some(&start) = timestamps.first() else {
            return Err(PanelError::PreconditionViolation(format!(
                "entity {entity}: cannot align an empty inverse input"
            )));
        };
        if start == self.first_output_timestamp {
            return Ok(SeedAlignment::FittedWindow);
        }
        if start <= self.last_timestamp {
            return Err(PanelError::PreconditionViolation(format!(
                "entity {entity}: inverse input starting at {start} matches neither the \
                 transformed window ({}) nor a continuation after {}",
                self.first_output_timestamp, self.last_timestamp
            )));
        }

        let Some(step) = self.step() else {
            return Ok(SeedAlignment::Continuation);
        };
        let expected = self.last_timestamp + step;
        if start != expected {
            return Err(PanelError::PreconditionViolation(format!(
                "entity {entity}: continuation must start at {expected}, one step after the \
                 last fitted observation, got {start}"
            )));
        }
        if let Some(gap) = timestamps.windows(2).find(|w| w[1] - w[0] != step) {
            return Err(PanelError::PreconditionViolation(format!(
                "entity {entity}: continuation is not contiguous between {} and {}",
                gap[0], gap[1]
            )));
        }
        Ok(SeedAlignment::Continuation)
    }

    pub fn seeds(&self, alignment: SeedAlignment) -> &[f64] {
        match alignment {
            SeedAlignment::FittedWindow => &self.head_values,
            SeedAlignment::Continuation => &self.tail_values,
        }
    }

    /// Attach the inverted values to their timestamps, prepending the head
    /// records when rebuilding the fitted window.
    pub(crate) fn assemble(
        &self,
        alignment: SeedAlignment,
        input: &Series,
        reconstructed: Vec<f64>,
    ) -> Result<Series> {
        match alignment {
            SeedAlignment::FittedWindow => {
                let mut timestamps = self.head_timestamps.clone();
                timestamps.extend_from_slice(input.timestamps());
                let mut values = self.head_values.clone();
                values.extend(reconstructed);
                Series::new(timestamps, values)
            }
            SeedAlignment::Continuation => input.with_values(reconstructed),
        }
    }
}
