//! Per-entity standardization.
//!
//! x_scaled = (x - mean) / std

use super::parallel::{fit_entities, invert_entities};
use super::state::{EntityState, TransformState};
use super::Transformer;
use crate::core::{EntityId, PanelSeries, Series};
use crate::error::{PanelError, Result};
use crate::utils::stats::{max_abs, mean, std_dev};
use log::{debug, trace};

/// Relative size below which a standard deviation counts as zero.
const DEGENERATE_STD_RATIO: f64 = 1e-12;

/// Affine parameters of one entity. `mean` is 0 and `std` is 1 when the
/// corresponding flag is off.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleParams {
    pub mean: f64,
    pub std: f64,
}

impl ScaleParams {
    pub fn apply(&self, x: f64) -> f64 {
        (x - self.mean) / self.std
    }

    pub fn inverse(&self, y: f64) -> f64 {
        y * self.std + self.mean
    }
}

/// Standardization with optional centering and scaling.
#[derive(Debug, Clone)]
pub struct Scale {
    use_mean: bool,
    use_std: bool,
    state: TransformState<ScaleParams>,
}

impl Default for Scale {
    fn default() -> Self {
        Self::new(true, true)
    }
}

impl Scale {
    pub fn new(use_mean: bool, use_std: bool) -> Self {
        Self {
            use_mean,
            use_std,
            state: TransformState::new(),
        }
    }

    pub fn use_mean(&self) -> bool {
        self.use_mean
    }

    pub fn use_std(&self) -> bool {
        self.use_std
    }

    pub fn state(&self) -> &TransformState<ScaleParams> {
        &self.state
    }

    fn fit_entity(
        &self,
        entity: &EntityId,
        series: &Series,
    ) -> Result<(EntityState<ScaleParams>, Series)> {
        let values = series.values();
        let mean = if self.use_mean { mean(values) } else { 0.0 };
        let std = if self.use_std {
            if values.len() < 2 {
                return Err(PanelError::InsufficientData {
                    needed: 2,
                    got: values.len(),
                });
            }
            let std = std_dev(values);
            // A constant series leaves only rounding noise in the std.
            if std <= DEGENERATE_STD_RATIO * max_abs(values) {
                return Err(PanelError::DegenerateVariance {
                    entity: entity.clone(),
                });
            }
            std
        } else {
            1.0
        };
        trace!("entity {entity}: scale mean={mean:.6}, std={std:.6}");

        let params = ScaleParams { mean, std };
        let output = series.with_values(values.iter().map(|&x| params.apply(x)).collect())?;
        Ok((EntityState::new(params), output))
    }
}

fn invert_entity(_entity: &EntityId, params: &ScaleParams, series: &Series) -> Result<Series> {
    series.with_values(
        series
            .values()
            .iter()
            .map(|&y| params.inverse(y))
            .collect(),
    )
}

impl Transformer for Scale {
    fn fit_apply(&mut self, panel: &PanelSeries) -> Result<PanelSeries> {
        let (fresh, output) = fit_entities(panel, |entity, series| self.fit_entity(entity, series))?;
        debug!(
            "Scale(use_mean={}, use_std={}) fitted on {} entities",
            self.use_mean,
            self.use_std,
            fresh.len()
        );
        self.state.merge(fresh);
        Ok(output)
    }

    fn invert(&self, panel: &PanelSeries) -> Result<PanelSeries> {
        invert_entities(panel, &self.state, invert_entity)
    }

    fn name(&self) -> &str {
        "Scale"
    }

    fn fitted_entities(&self) -> Vec<EntityId> {
        self.state.entities().cloned().collect()
    }
}
