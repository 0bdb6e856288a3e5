//! Ordered composition of transforms.
//!
//! `fit_apply` threads a panel through each stage in declared order;
//! `invert` walks the stages in reverse. The pipeline holds no numeric logic
//! of its own. Entity-set consistency is checked once at the boundary.

use super::{Transform, Transformer};
use crate::core::{EntityId, PanelSeries};
use crate::error::{PanelError, Result};
use log::debug;
use std::collections::BTreeSet;

/// A sequence of transforms applied in order and inverted in reverse.
///
/// # Example
/// ```
/// use anofox_panel::core::{PanelSeries, Series};
/// use anofox_panel::transform::{Difference, Pipeline, Scale, Transformer};
/// use chrono::{Duration, TimeZone, Utc};
///
/// let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
/// let stamps: Vec<_> = (0..6).map(|i| base + Duration::days(i)).collect();
/// let series = Series::new(stamps, vec![3.0, 5.0, 4.0, 8.0, 9.0, 7.0]).unwrap();
/// let panel = PanelSeries::new().with_entity("a", series);
///
/// let mut pipeline = Pipeline::default()
///     .then(Difference::new(1, 1).unwrap())
///     .then(Scale::new(true, true));
/// let out = pipeline.fit_apply(&panel).unwrap();
/// let restored = pipeline.invert(&out).unwrap();
/// assert_eq!(restored.len(), panel.len());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    transforms: Vec<Transform>,
    fitted_entities: Option<BTreeSet<EntityId>>,
}

impl Pipeline {
    pub fn new(transforms: Vec<Transform>) -> Self {
        Self {
            transforms,
            fitted_entities: None,
        }
    }

    /// Append a stage.
    pub fn then(mut self, transform: impl Into<Transform>) -> Self {
        self.transforms.push(transform.into());
        self
    }

    pub fn transforms(&self) -> &[Transform] {
        &self.transforms
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Stage names in application order.
    pub fn names(&self) -> Vec<&str> {
        self.transforms.iter().map(|t| t.name()).collect()
    }

    fn check_entities(&self, panel: &PanelSeries) -> Result<()> {
        let fitted = self
            .fitted_entities
            .as_ref()
            .ok_or(PanelError::PipelineNotFitted)?;
        let given = panel.entity_set();
        if &given != fitted {
            let missing: Vec<String> = fitted.difference(&given).map(ToString::to_string).collect();
            let unseen: Vec<String> = given.difference(fitted).map(ToString::to_string).collect();
            return Err(PanelError::PreconditionViolation(format!(
                "pipeline was fitted on a different entity set (missing: [{}], unseen: [{}])",
                missing.join(", "),
                unseen.join(", ")
            )));
        }
        Ok(())
    }
}

impl Transformer for Pipeline {
    /// Fit every stage in order. Stages are fitted on copies and committed
    /// together, so a failing stage leaves the previous fit untouched.
    fn fit_apply(&mut self, panel: &PanelSeries) -> Result<PanelSeries> {
        let mut staged = self.transforms.clone();
        let mut current = panel.clone();
        for transform in staged.iter_mut() {
            current = transform.fit_apply(&current)?;
            debug!(
                "pipeline stage {} produced {} records",
                transform.name(),
                current.len()
            );
        }
        self.transforms = staged;
        self.fitted_entities = Some(panel.entity_set());
        Ok(current)
    }

    fn invert(&self, panel: &PanelSeries) -> Result<PanelSeries> {
        self.check_entities(panel)?;
        let mut current = panel.clone();
        for transform in self.transforms.iter().rev() {
            current = transform.invert(&current)?;
        }
        Ok(current)
    }

    fn name(&self) -> &str {
        "Pipeline"
    }

    fn fitted_entities(&self) -> Vec<EntityId> {
        self.fitted_entities
            .as_ref()
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn is_fitted(&self) -> bool {
        self.fitted_entities.is_some()
    }
}
