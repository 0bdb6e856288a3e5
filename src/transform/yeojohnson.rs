//! Yeo-Johnson power transformation.
//!
//! Extends Box-Cox to the whole real line with one branch per sign:
//!
//! | input | lambda | output |
//! |---|---|---|
//! | x >= 0 | != 0 | ((x + 1)^lambda - 1) / lambda |
//! | x >= 0 | == 0 | ln(x + 1) |
//! | x < 0 | != 2 | -((1 - x)^(2 - lambda) - 1) / (2 - lambda) |
//! | x < 0 | == 2 | -ln(1 - x) |
//!
//! The map preserves sign, so the inverse picks its branch from the sign of
//! the transformed value.

use super::boxcox::{
    resolve_lambda, validate_method, LambdaSearch, PowerMethod, PowerParams, LAMBDA_ZERO,
};
use super::parallel::{fit_entities, invert_entities};
use super::state::{EntityState, TransformState};
use super::Transformer;
use crate::core::{EntityId, PanelSeries, Series};
use crate::error::{PanelError, Result};
use crate::utils::stats::population_variance;
use log::{debug, trace};

/// Yeo-Johnson map of a single value.
pub fn yeojohnson_value(x: f64, lambda: f64) -> f64 {
    if x >= 0.0 {
        if lambda.abs() < LAMBDA_ZERO {
            x.ln_1p()
        } else {
            ((x + 1.0).powf(lambda) - 1.0) / lambda
        }
    } else {
        let mirrored = 2.0 - lambda;
        if mirrored.abs() < LAMBDA_ZERO {
            -(-x).ln_1p()
        } else {
            -((1.0 - x).powf(mirrored) - 1.0) / mirrored
        }
    }
}

/// Inverse Yeo-Johnson of a single value; `None` outside the inverse domain.
pub fn inv_yeojohnson_value(y: f64, lambda: f64) -> Option<f64> {
    let x = if y >= 0.0 {
        if lambda.abs() < LAMBDA_ZERO {
            y.exp_m1()
        } else {
            let base = lambda * y + 1.0;
            if base <= 0.0 {
                return None;
            }
            base.powf(1.0 / lambda) - 1.0
        }
    } else {
        let mirrored = 2.0 - lambda;
        if mirrored.abs() < LAMBDA_ZERO {
            -(-y).exp_m1()
        } else {
            let base = 1.0 - mirrored * y;
            if base <= 0.0 {
                return None;
            }
            1.0 - base.powf(1.0 / mirrored)
        }
    };
    x.is_finite().then_some(x)
}

/// Profile log-likelihood of Yeo-Johnson transformed data (constants dropped).
///
/// llf = -n/2 * ln(variance) + (lambda - 1) * sum(sign(x) * ln(|x| + 1))
pub fn yeojohnson_log_likelihood(series: &[f64], lambda: f64) -> f64 {
    let n = series.len();
    if n < 2 {
        return f64::NEG_INFINITY;
    }

    let transformed: Vec<f64> = series
        .iter()
        .map(|&x| yeojohnson_value(x, lambda))
        .collect();
    if transformed.iter().any(|x| !x.is_finite()) {
        return f64::NEG_INFINITY;
    }

    let variance = population_variance(&transformed);
    if !(variance > 0.0 && variance.is_finite()) {
        return f64::NEG_INFINITY;
    }

    let log_sum: f64 = series.iter().map(|x| x.signum() * x.abs().ln_1p()).sum();
    -0.5 * n as f64 * variance.ln() + (lambda - 1.0) * log_sum
}

/// Maximum likelihood Yeo-Johnson lambda.
pub fn yeojohnson_lambda(series: &[f64], search: &LambdaSearch) -> f64 {
    resolve_lambda(series, PowerMethod::Mle, search, yeojohnson_log_likelihood)
}

/// Yeo-Johnson transform over a panel. Accepts any finite values.
#[derive(Debug, Clone)]
pub struct YeoJohnson {
    method: PowerMethod,
    search: LambdaSearch,
    state: TransformState<PowerParams>,
}

impl Default for YeoJohnson {
    fn default() -> Self {
        Self::new()
    }
}

impl YeoJohnson {
    /// Per-entity maximum likelihood lambda in `[-5, 5]`.
    pub fn new() -> Self {
        Self {
            method: PowerMethod::Mle,
            search: LambdaSearch::default(),
            state: TransformState::new(),
        }
    }

    pub fn with_method(mut self, method: PowerMethod) -> Result<Self> {
        validate_method(method)?;
        self.method = method;
        Ok(self)
    }

    pub fn with_search(mut self, search: LambdaSearch) -> Result<Self> {
        search.validate()?;
        self.search = search;
        Ok(self)
    }

    pub fn method(&self) -> PowerMethod {
        self.method
    }

    pub fn state(&self) -> &TransformState<PowerParams> {
        &self.state
    }

    pub fn lambda(&self, entity: &EntityId) -> Result<f64> {
        self.state.params(entity).map(|p| p.lambda)
    }

    fn fit_entity(
        &self,
        entity: &EntityId,
        series: &Series,
    ) -> Result<(EntityState<PowerParams>, Series)> {
        let values = series.values();
        let lambda = resolve_lambda(values, self.method, &self.search, yeojohnson_log_likelihood);
        trace!("entity {entity}: yeo-johnson lambda={lambda:.6}");

        let output = series.with_values(
            values
                .iter()
                .map(|&x| yeojohnson_value(x, lambda))
                .collect(),
        )?;
        Ok((EntityState::new(PowerParams { lambda }), output))
    }
}

fn invert_entity(entity: &EntityId, params: &PowerParams, series: &Series) -> Result<Series> {
    let restored = series
        .values()
        .iter()
        .enumerate()
        .map(|(index, &y)| {
            inv_yeojohnson_value(y, params.lambda).ok_or_else(|| PanelError::InvertDomain {
                entity: entity.clone(),
                index,
                value: y,
            })
        })
        .collect::<Result<Vec<f64>>>()?;
    series.with_values(restored)
}

impl Transformer for YeoJohnson {
    fn fit_apply(&mut self, panel: &PanelSeries) -> Result<PanelSeries> {
        let (fresh, output) = fit_entities(panel, |entity, series| self.fit_entity(entity, series))?;
        debug!(
            "YeoJohnson({:?}) fitted on {} entities",
            self.method,
            fresh.len()
        );
        self.state.merge(fresh);
        Ok(output)
    }

    fn invert(&self, panel: &PanelSeries) -> Result<PanelSeries> {
        invert_entities(panel, &self.state, invert_entity)
    }

    fn name(&self) -> &str {
        "YeoJohnson"
    }

    fn fitted_entities(&self) -> Vec<EntityId> {
        self.state.entities().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::boxcox::boxcox_value;
    use approx::assert_relative_eq;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn panel(values: Vec<f64>) -> PanelSeries {
        let base: DateTime<Utc> = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let stamps = (0..values.len())
            .map(|i| base + Duration::days(i as i64))
            .collect();
        PanelSeries::new().with_entity("a", Series::new(stamps, values).unwrap())
    }

    #[test]
    fn positive_branch_is_shifted_boxcox() {
        for lambda in [-1.0, 0.0, 0.7, 3.0] {
            for x in [0.0, 0.5, 4.0] {
                assert_relative_eq!(
                    yeojohnson_value(x, lambda),
                    boxcox_value(x + 1.0, lambda),
                    epsilon = 1e-12
                );
            }
        }
    }

    #[test]
    fn lambda_one_is_identity() {
        for x in [-3.0, -0.5, 0.0, 2.5] {
            assert_relative_eq!(yeojohnson_value(x, 1.0), x, epsilon = 1e-12);
        }
    }

    #[test]
    fn lambda_two_negative_branch_is_log() {
        assert_relative_eq!(yeojohnson_value(-1.0, 2.0), -(2.0_f64).ln(), epsilon = 1e-12);
    }

    #[test]
    fn inverse_value_roundtrip_across_signs() {
        for lambda in [-1.0, 0.0, 0.5, 2.0, 3.5] {
            for x in [-4.0, -0.25, 0.0, 0.25, 6.0] {
                let y = yeojohnson_value(x, lambda);
                let back = inv_yeojohnson_value(y, lambda).unwrap();
                assert_relative_eq!(back, x, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn inverse_domain() {
        // lambda * y + 1 <= 0 on the positive branch
        assert_eq!(inv_yeojohnson_value(2.0, -1.0), None);
        // 1 - (2 - lambda) * y <= 0 on the negative branch
        assert_eq!(inv_yeojohnson_value(-1.0, 3.0), None);
    }

    #[test]
    fn transform_accepts_mixed_signs() {
        let values = vec![-3.0, -1.0, 0.0, 0.5, 2.0, 8.0, 20.0];
        let mut yj = YeoJohnson::new();
        let out = yj.fit_apply(&panel(values.clone())).unwrap();

        let lambda = yj.lambda(&EntityId::from("a")).unwrap();
        assert!((-5.0..=5.0).contains(&lambda));

        let restored = yj.invert(&out).unwrap();
        for (a, b) in restored
            .get(&EntityId::from("a"))
            .unwrap()
            .values()
            .iter()
            .zip(&values)
        {
            assert_relative_eq!(a, b, epsilon = 1e-8);
        }
    }

    #[test]
    fn fixed_lambda_is_used() {
        let mut yj = YeoJohnson::new().with_method(PowerMethod::Fixed(0.0)).unwrap();
        let out = yj.fit_apply(&panel(vec![0.0, 1.0, -1.0])).unwrap();
        let values = out.get(&EntityId::from("a")).unwrap().values();
        assert_relative_eq!(values[1], 2.0_f64.ln(), epsilon = 1e-12);
        assert_relative_eq!(values[2], -(2.0_f64.powi(2) - 1.0) / 2.0, epsilon = 1e-12);
    }

    #[test]
    fn invert_out_of_domain_is_reported() {
        let mut yj = YeoJohnson::new().with_method(PowerMethod::Fixed(-1.0)).unwrap();
        yj.fit_apply(&panel(vec![1.0, 2.0])).unwrap();
        let err = yj.invert(&panel(vec![0.5, 2.0])).unwrap_err();
        assert!(matches!(err, PanelError::InvertDomain { index: 1, .. }));
    }
}
