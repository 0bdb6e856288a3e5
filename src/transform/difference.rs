//! Lagged differencing.
//!
//! Forward: `y[i] = x[i] - x[i - order * seasonal_period]`. The first
//! `order * seasonal_period` observations of each entity have no lagged
//! partner and are dropped from the output; they are kept as seeds for the
//! cumulative-sum inverse.

use super::parallel::{fit_entities, invert_entities};
use super::state::{EntityState, SeedHistory, TransformState};
use super::Transformer;
use crate::core::{EntityId, PanelSeries, Series};
use crate::error::{PanelError, Result};
use log::debug;

/// Fitted state of one differenced entity.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct DifferenceParams {
    /// `order * seasonal_period`.
    pub lag: usize,
    /// Raw values needed to reconstruct levels, `None` when `lag == 0`.
    pub seeds: Option<SeedHistory>,
}

/// Lagged differencing transform.
///
/// # Example
/// ```
/// use anofox_panel::core::{EntityId, PanelSeries, Series};
/// use anofox_panel::transform::{Difference, Transformer};
/// use chrono::{Duration, TimeZone, Utc};
///
/// let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
/// let stamps: Vec<_> = (0..5).map(|i| base + Duration::days(i)).collect();
/// let series = Series::new(stamps, vec![1.0, 3.0, 6.0, 10.0, 15.0]).unwrap();
/// let panel = PanelSeries::new().with_entity("a", series);
///
/// let mut diff = Difference::new(1, 1).unwrap();
/// let out = diff.fit_apply(&panel).unwrap();
/// assert_eq!(out.get(&EntityId::from("a")).unwrap().values(), &[2.0, 3.0, 4.0, 5.0]);
///
/// let restored = diff.invert(&out).unwrap();
/// assert_eq!(restored, panel);
/// ```
#[derive(Debug, Clone)]
pub struct Difference {
    order: usize,
    seasonal_period: usize,
    state: TransformState<DifferenceParams>,
}

impl Difference {
    /// Create a differencing transform. `seasonal_period` must be at least 1.
    pub fn new(order: usize, seasonal_period: usize) -> Result<Self> {
        if seasonal_period == 0 {
            return Err(PanelError::InvalidParameter(
                "seasonal_period must be >= 1".to_string(),
            ));
        }
        Ok(Self {
            order,
            seasonal_period,
            state: TransformState::new(),
        })
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn seasonal_period(&self) -> usize {
        self.seasonal_period
    }

    /// Number of observations consumed per entity.
    pub fn lag(&self) -> usize {
        self.order * self.seasonal_period
    }

    pub fn state(&self) -> &TransformState<DifferenceParams> {
        &self.state
    }

    fn fit_entity(
        &self,
        entity: &EntityId,
        series: &Series,
    ) -> Result<(EntityState<DifferenceParams>, Series)> {
        let lag = self.lag();
        if lag == 0 {
            let params = DifferenceParams { lag, seeds: None };
            return Ok((EntityState::new(params), series.clone()));
        }
        let n = series.len();
        if n < lag + 1 {
            return Err(PanelError::PreconditionViolation(format!(
                "entity {entity}: differencing at lag {lag} needs at least {} observations, got {n}",
                lag + 1
            )));
        }

        let values = series.values();
        let diffed: Vec<f64> = values
            .iter()
            .skip(lag)
            .zip(values.iter())
            .map(|(curr, prev)| curr - prev)
            .collect();

        let output = Series::from_parts_unchecked(series.timestamps()[lag..].to_vec(), diffed);
        let params = DifferenceParams {
            lag,
            seeds: Some(SeedHistory::capture(series, lag)),
        };
        Ok((EntityState::new(params), output))
    }
}

/// Cumulative-sum reconstruction: `x[i] = y[i] + x[i - lag]`, walking
/// forward from `seeds` (the `lag` raw values preceding `diffed`).
pub fn integrate(diffed: &[f64], seeds: &[f64], lag: usize) -> Vec<f64> {
    if lag == 0 {
        return diffed.to_vec();
    }
    let mut history = seeds.to_vec();
    for &d in diffed {
        let prev = history[history.len() - lag];
        history.push(prev + d);
    }
    history.split_off(seeds.len())
}

fn invert_entity(entity: &EntityId, params: &DifferenceParams, series: &Series) -> Result<Series> {
    let Some(seeds) = params.seeds.as_ref() else {
        return Ok(series.clone());
    };
    if series.is_empty() {
        return Ok(series.clone());
    }
    let alignment = seeds.align(entity, series.timestamps())?;
    let restored = integrate(series.values(), seeds.seeds(alignment), params.lag);
    seeds.assemble(alignment, series, restored)
}

impl Transformer for Difference {
    fn fit_apply(&mut self, panel: &PanelSeries) -> Result<PanelSeries> {
        let (fresh, output) = fit_entities(panel, |entity, series| self.fit_entity(entity, series))?;
        debug!(
            "Difference(order={}, sp={}) fitted on {} entities",
            self.order,
            self.seasonal_period,
            fresh.len()
        );
        self.state.merge(fresh);
        Ok(output)
    }

    fn invert(&self, panel: &PanelSeries) -> Result<PanelSeries> {
        invert_entities(panel, &self.state, invert_entity)
    }

    fn name(&self) -> &str {
        "Difference"
    }

    fn fitted_entities(&self) -> Vec<EntityId> {
        self.state.entities().cloned().collect()
    }
}
