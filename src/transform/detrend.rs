//! Trend removal against a regular time index.
//!
//! Each entity's timestamps are mapped onto a grid of step `freq` anchored at
//! its first timestamp. Gaps in the grid are allowed; timestamps that fall
//! between grid points are not.

use super::parallel::{fit_entities, invert_entities};
use super::state::{EntityState, TransformState};
use super::Transformer;
use crate::core::{EntityId, PanelSeries, Series};
use crate::error::{PanelError, Result};
use crate::utils::ols::linear_fit;
use crate::utils::stats::mean;
use crate::utils::time_index::grid_indices;
use chrono::{DateTime, Duration, Utc};
use log::{debug, trace};

/// Shape of the fitted trend.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetrendMethod {
    /// Least-squares line through the time index.
    #[default]
    Linear,
    /// Constant level.
    Mean,
}

/// Fitted trend of one entity: `intercept + slope * t`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct TrendParams {
    /// Timestamp at `t = 0`.
    pub origin: DateTime<Utc>,
    pub intercept: f64,
    /// Zero for [`DetrendMethod::Mean`].
    pub slope: f64,
}

impl TrendParams {
    /// Trend values at the given grid positions.
    pub fn evaluate(&self, index: &[f64]) -> Vec<f64> {
        index.iter().map(|t| self.intercept + self.slope * t).collect()
    }
}

/// Detrending transform.
#[derive(Debug, Clone)]
pub struct Detrend {
    freq: Duration,
    method: DetrendMethod,
    state: TransformState<TrendParams>,
}

impl Detrend {
    /// Create a detrending transform with sampling frequency `freq`.
    pub fn new(freq: Duration, method: DetrendMethod) -> Result<Self> {
        if freq <= Duration::zero() {
            return Err(PanelError::InvalidParameter(format!(
                "freq must be positive, got {freq}"
            )));
        }
        Ok(Self {
            freq,
            method,
            state: TransformState::new(),
        })
    }

    pub fn linear(freq: Duration) -> Result<Self> {
        Self::new(freq, DetrendMethod::Linear)
    }

    pub fn mean(freq: Duration) -> Result<Self> {
        Self::new(freq, DetrendMethod::Mean)
    }

    pub fn freq(&self) -> Duration {
        self.freq
    }

    pub fn method(&self) -> DetrendMethod {
        self.method
    }

    pub fn state(&self) -> &TransformState<TrendParams> {
        &self.state
    }

    fn fit_entity(
        &self,
        entity: &EntityId,
        series: &Series,
    ) -> Result<(EntityState<TrendParams>, Series)> {
        let origin = series.first_timestamp().ok_or_else(|| {
            PanelError::PreconditionViolation(format!("entity {entity}: empty series"))
        })?;
        let index = grid_indices(series.timestamps(), origin, self.freq)
            .map_err(|e| e.in_entity(entity))?;
        let values = series.values();

        let (intercept, slope) = match self.method {
            DetrendMethod::Linear => linear_fit(&index, values)?,
            DetrendMethod::Mean => (mean(values), 0.0),
        };
        trace!("entity {entity}: trend intercept={intercept:.6}, slope={slope:.6}");

        let params = TrendParams {
            origin,
            intercept,
            slope,
        };
        let trend = params.evaluate(&index);
        let residual = values.iter().zip(&trend).map(|(x, t)| x - t).collect();

        let output = series.with_values(residual)?;
        Ok((EntityState::new(params).with_artifact("trend", trend), output))
    }

    fn invert_entity(
        &self,
        entity: &EntityId,
        params: &TrendParams,
        series: &Series,
    ) -> Result<Series> {
        let index = grid_indices(series.timestamps(), params.origin, self.freq)
            .map_err(|e| e.in_entity(entity))?;
        let trend = params.evaluate(&index);
        series.with_values(
            series
                .values()
                .iter()
                .zip(&trend)
                .map(|(r, t)| r + t)
                .collect(),
        )
    }
}

impl Transformer for Detrend {
    fn fit_apply(&mut self, panel: &PanelSeries) -> Result<PanelSeries> {
        let (fresh, output) = fit_entities(panel, |entity, series| self.fit_entity(entity, series))?;
        debug!(
            "Detrend({:?}, freq={}) fitted on {} entities",
            self.method,
            self.freq,
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
        "Detrend"
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

    fn hourly(values: Vec<f64>) -> Series {
        let stamps = (0..values.len())
            .map(|i| base() + Duration::hours(i as i64))
            .collect();
        Series::new(stamps, values).unwrap()
    }

    #[test]
    fn linear_trend_is_removed() {
        let values: Vec<f64> = (0..10).map(|i| 3.0 + 0.5 * i as f64).collect();
        let panel = PanelSeries::new().with_entity("a", hourly(values));
        let mut detrend = Detrend::linear(Duration::hours(1)).unwrap();
        let out = detrend.fit_apply(&panel).unwrap();

        for r in out.get(&EntityId::from("a")).unwrap().values() {
            assert_relative_eq!(*r, 0.0, epsilon = 1e-10);
        }
        let params = detrend.state().params(&EntityId::from("a")).unwrap();
        assert_relative_eq!(params.intercept, 3.0, epsilon = 1e-10);
        assert_relative_eq!(params.slope, 0.5, epsilon = 1e-10);
        assert_eq!(
            detrend
                .state()
                .artifact(&EntityId::from("a"), "trend")
                .map(<[f64]>::len),
            Some(10)
        );
    }

    #[test]
    fn mean_method_subtracts_level() {
        let panel = PanelSeries::new().with_entity("a", hourly(vec![1.0, 2.0, 6.0]));
        let mut detrend = Detrend::mean(Duration::hours(1)).unwrap();
        let out = detrend.fit_apply(&panel).unwrap();
        assert_eq!(
            out.get(&EntityId::from("a")).unwrap().values(),
            &[-2.0, -1.0, 3.0]
        );
    }

    #[test]
    fn round_trip_with_gaps() {
        let stamps = [0, 1, 2, 5, 6, 9]
            .iter()
            .map(|&h| base() + Duration::hours(h))
            .collect();
        let series = Series::new(stamps, vec![1.0, 2.5, 2.0, 6.0, 7.5, 9.0]).unwrap();
        let panel = PanelSeries::new().with_entity("a", series.clone());

        let mut detrend = Detrend::linear(Duration::hours(1)).unwrap();
        let out = detrend.fit_apply(&panel).unwrap();
        let restored = detrend.invert(&out).unwrap();
        let got = restored.get(&EntityId::from("a")).unwrap();
        for (a, b) in got.values().iter().zip(series.values()) {
            assert_relative_eq!(a, b, epsilon = 1e-9);
        }
    }

    #[test]
    fn invert_extends_trend_to_forecast_horizon() {
        let values: Vec<f64> = (0..6).map(|i| 2.0 * i as f64).collect();
        let panel = PanelSeries::new().with_entity("a", hourly(values));
        let mut detrend = Detrend::linear(Duration::hours(1)).unwrap();
        detrend.fit_apply(&panel).unwrap();

        let future = Series::new(
            vec![base() + Duration::hours(8), base() + Duration::hours(9)],
            vec![0.0, 1.0],
        )
        .unwrap();
        let restored = detrend
            .invert(&PanelSeries::new().with_entity("a", future))
            .unwrap();
        let values = restored.get(&EntityId::from("a")).unwrap().values();
        assert_relative_eq!(values[0], 16.0, epsilon = 1e-9);
        assert_relative_eq!(values[1], 19.0, epsilon = 1e-9);
    }

    #[test]
    fn off_grid_timestamps_are_rejected() {
        let stamps = vec![
            base(),
            base() + Duration::hours(1),
            base() + Duration::minutes(150),
        ];
        let series = Series::new(stamps, vec![1.0, 2.0, 3.0]).unwrap();
        let mut detrend = Detrend::linear(Duration::hours(1)).unwrap();
        let err = detrend
            .fit_apply(&PanelSeries::new().with_entity("a", series))
            .unwrap_err();
        assert!(matches!(err, PanelError::PreconditionViolation(_)));
    }

    #[test]
    fn linear_needs_two_points() {
        let mut detrend = Detrend::linear(Duration::hours(1)).unwrap();
        let err = detrend
            .fit_apply(&PanelSeries::new().with_entity("a", hourly(vec![1.0])))
            .unwrap_err();
        assert_eq!(err, PanelError::InsufficientData { needed: 2, got: 1 });
    }

    #[test]
    fn non_positive_freq_is_invalid() {
        assert!(Detrend::linear(Duration::zero()).is_err());
        assert!(Detrend::mean(Duration::hours(-1)).is_err());
    }
}
