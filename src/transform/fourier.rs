//! Seasonal removal by harmonic regression.
//!
//! Per entity, the series is regressed on an intercept plus `K` cosine/sine
//! pairs of period `sp` observations. The fitted harmonic part (without the
//! intercept) is the seasonal component; it is subtracted on the forward
//! pass and added back, evaluated at the inverted timestamps, on invert.

use super::parallel::{fit_entities, invert_entities};
use super::state::{EntityState, TransformState};
use super::Transformer;
use crate::core::{EntityId, PanelSeries, Series};
use crate::error::{PanelError, Result};
use crate::utils::ols::{ols_fit, OlsFit};
use crate::utils::time_index::grid_indices;
use chrono::{DateTime, Duration, Utc};
use log::{debug, trace};
use std::f64::consts::PI;

/// Fitted harmonic regression of one entity.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct FourierParams {
    /// Timestamp at time index 0.
    pub origin: DateTime<Utc>,
    /// Inferred sampling step in nanoseconds.
    pub step_ns: i64,
    pub intercept: f64,
    /// `[cos_1, sin_1, cos_2, sin_2, ...]`.
    pub coefficients: Vec<f64>,
}

impl FourierParams {
    pub fn step(&self) -> Duration {
        Duration::nanoseconds(self.step_ns)
    }
}

/// Fourier deseasonalization with `harmonics` terms of period `seasonal_period`.
#[derive(Debug, Clone)]
pub struct DeseasonalizeFourier {
    seasonal_period: usize,
    harmonics: usize,
    state: TransformState<FourierParams>,
}

impl DeseasonalizeFourier {
    /// Requires `seasonal_period >= 2` and `1 <= harmonics <= seasonal_period / 2`.
    pub fn new(seasonal_period: usize, harmonics: usize) -> Result<Self> {
        if seasonal_period < 2 {
            return Err(PanelError::InvalidParameter(format!(
                "seasonal_period must be >= 2, got {seasonal_period}"
            )));
        }
        if harmonics == 0 || 2 * harmonics > seasonal_period {
            return Err(PanelError::InvalidParameter(format!(
                "harmonics must be in 1..={} for seasonal_period {seasonal_period}, got {harmonics}",
                seasonal_period / 2
            )));
        }
        Ok(Self {
            seasonal_period,
            harmonics,
            state: TransformState::new(),
        })
    }

    pub fn seasonal_period(&self) -> usize {
        self.seasonal_period
    }

    pub fn harmonics(&self) -> usize {
        self.harmonics
    }

    pub fn state(&self) -> &TransformState<FourierParams> {
        &self.state
    }

    /// Seasonal component of a fitted entity over its fit window.
    pub fn seasonal_component(&self, entity: &EntityId) -> Option<&[f64]> {
        self.state.artifact(entity, "seasonal")
    }

    /// Design columns for time index `t`, cosine before sine per harmonic.
    fn design(&self, index: &[f64]) -> Vec<Vec<f64>> {
        let sp = self.seasonal_period as f64;
        let mut columns = Vec::with_capacity(2 * self.harmonics);
        for k in 1..=self.harmonics {
            let omega = 2.0 * PI * k as f64 / sp;
            columns.push(index.iter().map(|t| (omega * t).cos()).collect());
            columns.push(index.iter().map(|t| (omega * t).sin()).collect());
        }
        columns
    }

    fn fit_entity(
        &self,
        entity: &EntityId,
        series: &Series,
    ) -> Result<(EntityState<FourierParams>, Series)> {
        let needed = 2 * self.harmonics + 2;
        if series.len() < needed {
            return Err(PanelError::InsufficientData {
                needed,
                got: series.len(),
            });
        }

        let step = series.infer_step()?;
        let step_ns = step.num_nanoseconds().ok_or_else(|| {
            PanelError::PreconditionViolation(format!(
                "entity {entity}: sampling step {step} is out of range"
            ))
        })?;
        let origin = series.timestamps()[0];
        let index =
            grid_indices(series.timestamps(), origin, step).map_err(|e| e.in_entity(entity))?;

        let columns = self.design(&index);
        let fit = ols_fit(series.values(), &columns)?;
        let seasonal = fit.regression_component(&columns)?;
        trace!(
            "entity {entity}: fourier intercept={:.6}, coefficients={:?}",
            fit.intercept,
            fit.coefficients
        );

        let residual = series
            .values()
            .iter()
            .zip(&seasonal)
            .map(|(x, s)| x - s)
            .collect();
        let output = series.with_values(residual)?;

        let OlsFit {
            intercept,
            coefficients,
        } = fit;
        let params = FourierParams {
            origin,
            step_ns,
            intercept,
            coefficients,
        };
        Ok((
            EntityState::new(params).with_artifact("seasonal", seasonal),
            output,
        ))
    }

    fn invert_entity(
        &self,
        entity: &EntityId,
        params: &FourierParams,
        series: &Series,
    ) -> Result<Series> {
        let index = grid_indices(series.timestamps(), params.origin, params.step())
            .map_err(|e| e.in_entity(entity))?;
        let fit = OlsFit {
            intercept: params.intercept,
            coefficients: params.coefficients.clone(),
        };
        let seasonal = fit.regression_component(&self.design(&index))?;
        series.with_values(
            series
                .values()
                .iter()
                .zip(&seasonal)
                .map(|(r, s)| r + s)
                .collect(),
        )
    }
}

impl Transformer for DeseasonalizeFourier {
    fn fit_apply(&mut self, panel: &PanelSeries) -> Result<PanelSeries> {
        let (fresh, output) = fit_entities(panel, |entity, series| self.fit_entity(entity, series))?;
        debug!(
            "DeseasonalizeFourier(sp={}, K={}) fitted on {} entities",
            self.seasonal_period,
            self.harmonics,
            fresh.len()
        );
        self.state.merge(fresh);
        Ok(output)
    }

    fn invert(&self, panel: &PanelSeries) -> Result<PanelSeries> {
        invert_entities(panel, &self.state, |entity, params, series| {
            self.invert_entity(entity, params, series)
        })
    }

    fn name(&self) -> &str {
        "DeseasonalizeFourier"
    }

    fn fitted_entities(&self) -> Vec<EntityId> {
        self.state.entities().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn daily(values: Vec<f64>) -> Series {
        let stamps = (0..values.len())
            .map(|i| base() + Duration::days(i as i64))
            .collect();
        Series::new(stamps, values).unwrap()
    }

    fn seasonal_values(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let t = i as f64;
                50.0 + 4.0 * (2.0 * PI * t / 7.0).sin() + 1.5 * (4.0 * PI * t / 7.0).cos()
            })
            .collect()
    }

    #[test]
    fn pure_seasonal_signal_leaves_level() {
        let panel = PanelSeries::new().with_entity("a", daily(seasonal_values(42)));
        let mut fourier = DeseasonalizeFourier::new(7, 2).unwrap();
        let out = fourier.fit_apply(&panel).unwrap();

        for r in out.get(&EntityId::from("a")).unwrap().values() {
            assert_relative_eq!(*r, 50.0, epsilon = 1e-5);
        }
        let params = fourier.state().params(&EntityId::from("a")).unwrap();
        assert_relative_eq!(params.coefficients[1], 4.0, epsilon = 1e-5);
        assert_relative_eq!(params.coefficients[2], 1.5, epsilon = 1e-5);
        assert_eq!(params.step(), Duration::days(1));
    }

    #[test]
    fn seasonal_artifact_is_exposed() {
        let panel = PanelSeries::new().with_entity("a", daily(seasonal_values(21)));
        let mut fourier = DeseasonalizeFourier::new(7, 1).unwrap();
        fourier.fit_apply(&panel).unwrap();
        let seasonal = fourier.seasonal_component(&EntityId::from("a")).unwrap();
        assert_eq!(seasonal.len(), 21);
        assert!(fourier.seasonal_component(&EntityId::from("b")).is_none());
    }

    #[test]
    fn round_trip_restores_input() {
        let values: Vec<f64> = seasonal_values(30)
            .iter()
            .enumerate()
            .map(|(i, v)| v + 0.3 * i as f64 + if i % 4 == 0 { 1.0 } else { -0.5 })
            .collect();
        let panel = PanelSeries::new().with_entity("a", daily(values.clone()));
        let mut fourier = DeseasonalizeFourier::new(7, 3).unwrap();
        let out = fourier.fit_apply(&panel).unwrap();
        let restored = fourier.invert(&out).unwrap();
        for (a, b) in restored
            .get(&EntityId::from("a"))
            .unwrap()
            .values()
            .iter()
            .zip(&values)
        {
            assert_relative_eq!(a, b, epsilon = 1e-9);
        }
    }

    #[test]
    fn underdetermined_fit_fails() {
        let panel = PanelSeries::new().with_entity("a", daily(seasonal_values(7)));
        let mut fourier = DeseasonalizeFourier::new(12, 3).unwrap();
        let err = fourier.fit_apply(&panel).unwrap_err();
        assert_eq!(err, PanelError::InsufficientData { needed: 8, got: 7 });
    }

    #[test]
    fn parameter_validation() {
        assert!(DeseasonalizeFourier::new(1, 1).is_err());
        assert!(DeseasonalizeFourier::new(12, 0).is_err());
        assert!(DeseasonalizeFourier::new(12, 7).is_err());
        assert!(DeseasonalizeFourier::new(12, 6).is_ok());
    }
}
