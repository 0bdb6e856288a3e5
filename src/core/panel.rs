//! Panel time series: many independent entities, each with its own series.

use super::{EntityId, Series};
use crate::error::Result;
use chrono::{DateTime, Utc};
use std::collections::btree_map;
use std::collections::{BTreeMap, BTreeSet};

/// A collection of named entities, each an ordered series of timestamped values.
///
/// Entities are stored in key order so every operation that walks the panel
/// is deterministic.
///
/// # Example
/// ```
/// use anofox_panel::core::PanelSeries;
/// use chrono::{Duration, TimeZone, Utc};
///
/// let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
/// let rows = vec![
///     ("a", base, 1.0),
///     ("b", base, 10.0),
///     ("a", base + Duration::days(1), 2.0),
/// ];
/// let panel = PanelSeries::from_long(rows).unwrap();
///
/// assert_eq!(panel.n_entities(), 2);
/// assert_eq!(panel.len(), 3);
/// ```
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PanelSeries {
    entities: BTreeMap<EntityId, Series>,
}

impl PanelSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a panel from long-format `(entity, timestamp, value)` records.
    ///
    /// Records may arrive in any order; they are sorted by timestamp within
    /// each entity. Duplicate timestamps for one entity are rejected.
    pub fn from_long<E, I>(rows: I) -> Result<Self>
    where
        E: Into<EntityId>,
        I: IntoIterator<Item = (E, DateTime<Utc>, f64)>,
    {
        let mut grouped: BTreeMap<EntityId, Vec<(DateTime<Utc>, f64)>> = BTreeMap::new();
        for (entity, timestamp, value) in rows {
            grouped
                .entry(entity.into())
                .or_default()
                .push((timestamp, value));
        }

        let mut panel = PanelSeries::new();
        for (entity, mut records) in grouped {
            records.sort_by_key(|(t, _)| *t);
            let (timestamps, values): (Vec<_>, Vec<_>) = records.into_iter().unzip();
            let series = Series::new(timestamps, values).map_err(|e| e.in_entity(&entity))?;
            panel.entities.insert(entity, series);
        }
        Ok(panel)
    }

    /// Flatten back to long-format records, ordered by entity then timestamp.
    pub fn to_long(&self) -> Vec<(EntityId, DateTime<Utc>, f64)> {
        self.entities
            .iter()
            .flat_map(|(entity, series)| series.iter().map(move |(t, v)| (entity.clone(), t, v)))
            .collect()
    }

    /// Insert or replace an entity's series.
    pub fn insert(&mut self, entity: impl Into<EntityId>, series: Series) -> Option<Series> {
        self.entities.insert(entity.into(), series)
    }

    /// Builder-style insert.
    pub fn with_entity(mut self, entity: impl Into<EntityId>, series: Series) -> Self {
        self.insert(entity, series);
        self
    }

    pub fn get(&self, entity: &EntityId) -> Option<&Series> {
        self.entities.get(entity)
    }

    pub fn contains(&self, entity: &EntityId) -> bool {
        self.entities.contains_key(entity)
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityId> {
        self.entities.keys()
    }

    pub fn entity_set(&self) -> BTreeSet<EntityId> {
        self.entities.keys().cloned().collect()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, EntityId, Series> {
        self.entities.iter()
    }

    pub fn n_entities(&self) -> usize {
        self.entities.len()
    }

    /// Total number of records across all entities.
    pub fn len(&self) -> usize {
        self.entities.values().map(Series::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Length of the shortest entity series, `None` for an empty panel.
    pub fn min_length(&self) -> Option<usize> {
        self.entities.values().map(Series::len).min()
    }

    /// Whether both panels carry exactly the same entity identifiers.
    pub fn same_entities(&self, other: &PanelSeries) -> bool {
        self.entities.len() == other.entities.len()
            && self.entities.keys().zip(other.entities.keys()).all(|(a, b)| a == b)
    }
}

impl FromIterator<(EntityId, Series)> for PanelSeries {
    fn from_iter<T: IntoIterator<Item = (EntityId, Series)>>(iter: T) -> Self {
        Self {
            entities: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for PanelSeries {
    type Item = (EntityId, Series);
    type IntoIter = btree_map::IntoIter<EntityId, Series>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.into_iter()
    }
}

impl<'a> IntoIterator for &'a PanelSeries {
    type Item = (&'a EntityId, &'a Series);
    type IntoIter = btree_map::Iter<'a, EntityId, Series>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn from_long_sorts_within_entity() {
        let b = base();
        let rows = vec![
            ("a", b + Duration::days(2), 3.0),
            ("a", b, 1.0),
            ("a", b + Duration::days(1), 2.0),
        ];
        let panel = PanelSeries::from_long(rows).unwrap();
        let a = panel.get(&EntityId::from("a")).unwrap();
        assert_eq!(a.values(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn from_long_rejects_duplicates() {
        let b = base();
        let rows = vec![("a", b, 1.0), ("a", b, 2.0)];
        let err = PanelSeries::from_long(rows).unwrap_err();
        assert!(err.to_string().contains("entity a"));
    }

    #[test]
    fn to_long_round_trips() {
        let b = base();
        let rows = vec![
            (EntityId::from(2), b, 5.0),
            (EntityId::from(1), b, 1.0),
            (EntityId::from(1), b + Duration::hours(1), 2.0),
        ];
        let panel = PanelSeries::from_long(rows).unwrap();
        let long = panel.to_long();
        assert_eq!(long.len(), 3);
        assert_eq!(long[0].0, EntityId::from(1));
        assert_eq!(long[2].0, EntityId::from(2));
        assert_eq!(PanelSeries::from_long(long).unwrap(), panel);
    }

    #[test]
    fn entity_set_comparison() {
        let b = base();
        let s = Series::new(vec![b], vec![1.0]).unwrap();
        let p1 = PanelSeries::new()
            .with_entity("a", s.clone())
            .with_entity("b", s.clone());
        let p2 = PanelSeries::new().with_entity("a", s.clone());
        assert!(!p1.same_entities(&p2));
        let p3 = p2.with_entity("b", s);
        assert!(p1.same_entities(&p3));
        assert_eq!(p1.min_length(), Some(1));
        assert_eq!(PanelSeries::new().min_length(), None);
    }
}
