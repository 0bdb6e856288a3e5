//! Box-Cox power transformation.
//!
//! For lambda != 0: y = (x^lambda - 1) / lambda
//! For lambda == 0: y = ln(x)
//!
//! Lambda is either fixed or estimated per entity by maximizing the profile
//! log-likelihood. The estimation machinery here is shared with
//! [`YeoJohnson`](super::YeoJohnson).

use super::parallel::{fit_entities, invert_entities};
use super::state::{EntityState, TransformState};
use super::Transformer;
use crate::core::{EntityId, PanelSeries, Series};
use crate::error::{PanelError, Result};
use crate::utils::optimization::{minimize_bounded, GoldenSectionConfig};
use crate::utils::stats::population_variance;
use log::{debug, trace};

/// Lambda magnitude treated as the logarithmic limit.
pub(crate) const LAMBDA_ZERO: f64 = 1e-10;

/// Base values in `(-INVERT_CLAMP, 0]` are rounding noise and clamp to 0.
const INVERT_CLAMP: f64 = 1e-12;

/// How lambda is chosen for each entity.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PowerMethod {
    /// Maximum likelihood estimate within [`LambdaSearch`] bounds.
    #[default]
    Mle,
    /// The same lambda for every entity.
    Fixed(f64),
}

/// Search interval and optimizer settings for MLE lambda.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct LambdaSearch {
    pub lower: f64,
    pub upper: f64,
    pub optimizer: GoldenSectionConfig,
}

impl Default for LambdaSearch {
    fn default() -> Self {
        Self {
            lower: -5.0,
            upper: 5.0,
            optimizer: GoldenSectionConfig::default(),
        }
    }
}

impl LambdaSearch {
    pub fn new(lower: f64, upper: f64) -> Result<Self> {
        let search = Self {
            lower,
            upper,
            ..Self::default()
        };
        search.validate()?;
        Ok(search)
    }

    pub fn with_optimizer(mut self, optimizer: GoldenSectionConfig) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.lower.is_finite() && self.upper.is_finite() && self.lower < self.upper) {
            return Err(PanelError::InvalidParameter(format!(
                "lambda search interval [{}, {}] must be finite and non-empty",
                self.lower, self.upper
            )));
        }
        Ok(())
    }
}

/// Fitted lambda of one entity.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerParams {
    pub lambda: f64,
}

pub(crate) fn validate_method(method: PowerMethod) -> Result<()> {
    match method {
        PowerMethod::Fixed(lambda) if !lambda.is_finite() => Err(PanelError::InvalidParameter(
            format!("fixed lambda must be finite, got {lambda}"),
        )),
        _ => Ok(()),
    }
}

/// Resolve lambda for one entity.
///
/// Under [`PowerMethod::Mle`] a series with fewer than two observations or
/// zero spread has a flat likelihood and gets lambda = 1.
pub(crate) fn resolve_lambda<L>(
    values: &[f64],
    method: PowerMethod,
    search: &LambdaSearch,
    log_likelihood: L,
) -> f64
where
    L: Fn(&[f64], f64) -> f64,
{
    match method {
        PowerMethod::Fixed(lambda) => lambda,
        PowerMethod::Mle => {
            if values.len() < 2 || population_variance(values) <= 0.0 {
                return 1.0;
            }
            let optimum = minimize_bounded(
                |lambda| -log_likelihood(values, lambda),
                search.lower,
                search.upper,
                &search.optimizer,
            );
            if optimum.value.is_finite() {
                optimum.point
            } else {
                1.0
            }
        }
    }
}

/// Box-Cox map of a single positive value.
pub fn boxcox_value(x: f64, lambda: f64) -> f64 {
    if lambda.abs() < LAMBDA_ZERO {
        x.ln()
    } else {
        (x.powf(lambda) - 1.0) / lambda
    }
}

/// Inverse Box-Cox of a single value; `None` outside the inverse domain.
///
/// For lambda != 0: x = (lambda * y + 1)^(1/lambda)
/// For lambda == 0: x = exp(y)
pub fn inv_boxcox_value(y: f64, lambda: f64) -> Option<f64> {
    let x = if lambda.abs() < LAMBDA_ZERO {
        y.exp()
    } else {
        let mut base = lambda * y + 1.0;
        if base <= 0.0 {
            if lambda > 0.0 && base > -INVERT_CLAMP {
                base = 0.0;
            } else {
                return None;
            }
        }
        base.powf(1.0 / lambda)
    };
    x.is_finite().then_some(x)
}

/// Profile log-likelihood of Box-Cox transformed data (constants dropped).
///
/// llf = -n/2 * ln(variance) + (lambda - 1) * sum(ln(x))
pub fn boxcox_log_likelihood(series: &[f64], lambda: f64) -> f64 {
    let n = series.len();
    if n < 2 {
        return f64::NEG_INFINITY;
    }

    let transformed: Vec<f64> = series.iter().map(|&x| boxcox_value(x, lambda)).collect();
    if transformed.iter().any(|x| !x.is_finite()) {
        return f64::NEG_INFINITY;
    }

    let variance = population_variance(&transformed);
    if !(variance > 0.0 && variance.is_finite()) {
        return f64::NEG_INFINITY;
    }

    let log_sum: f64 = series.iter().map(|x| x.ln()).sum();
    -0.5 * n as f64 * variance.ln() + (lambda - 1.0) * log_sum
}

/// Maximum likelihood Box-Cox lambda for strictly positive data.
pub fn boxcox_lambda(series: &[f64], search: &LambdaSearch) -> f64 {
    resolve_lambda(series, PowerMethod::Mle, search, boxcox_log_likelihood)
}

/// Box-Cox transform over a panel.
///
/// Every value of every entity must be strictly positive; a single violation
/// fails the whole batch.
#[derive(Debug, Clone)]
pub struct BoxCox {
    method: PowerMethod,
    search: LambdaSearch,
    state: TransformState<PowerParams>,
}

impl Default for BoxCox {
    fn default() -> Self {
        Self::mle()
    }
}

impl BoxCox {
    pub fn new(method: PowerMethod) -> Result<Self> {
        validate_method(method)?;
        Ok(Self {
            method,
            search: LambdaSearch::default(),
            state: TransformState::new(),
        })
    }

    /// Per-entity maximum likelihood lambda in `[-5, 5]`.
    pub fn mle() -> Self {
        Self {
            method: PowerMethod::Mle,
            search: LambdaSearch::default(),
            state: TransformState::new(),
        }
    }

    pub fn fixed(lambda: f64) -> Result<Self> {
        Self::new(PowerMethod::Fixed(lambda))
    }

    pub fn with_search(mut self, search: LambdaSearch) -> Result<Self> {
        search.validate()?;
        self.search = search;
        Ok(self)
    }

    pub fn method(&self) -> PowerMethod {
        self.method
    }

    pub fn search(&self) -> &LambdaSearch {
        &self.search
    }

    pub fn state(&self) -> &TransformState<PowerParams> {
        &self.state
    }

    /// Fitted lambda of an entity.
    pub fn lambda(&self, entity: &EntityId) -> Result<f64> {
        self.state.params(entity).map(|p| p.lambda)
    }

    fn fit_entity(
        &self,
        entity: &EntityId,
        series: &Series,
    ) -> Result<(EntityState<PowerParams>, Series)> {
        let values = series.values();
        if let Some((index, &value)) = values.iter().enumerate().find(|(_, &x)| x <= 0.0) {
            return Err(PanelError::NonPositiveValue {
                entity: entity.clone(),
                index,
                value,
            });
        }

        let lambda = resolve_lambda(values, self.method, &self.search, boxcox_log_likelihood);
        trace!("entity {entity}: box-cox lambda={lambda:.6}");

        let output = series.with_values(values.iter().map(|&x| boxcox_value(x, lambda)).collect())?;
        Ok((EntityState::new(PowerParams { lambda }), output))
    }
}

fn invert_entity(entity: &EntityId, params: &PowerParams, series: &Series) -> Result<Series> {
    let restored = series
        .values()
        .iter()
        .enumerate()
        .map(|(index, &y)| {
            inv_boxcox_value(y, params.lambda).ok_or_else(|| PanelError::InvertDomain {
                entity: entity.clone(),
                index,
                value: y,
            })
        })
        .collect::<Result<Vec<f64>>>()?;
    series.with_values(restored)
}

impl Transformer for BoxCox {
    fn fit_apply(&mut self, panel: &PanelSeries) -> Result<PanelSeries> {
        let (fresh, output) = fit_entities(panel, |entity, series| self.fit_entity(entity, series))?;
        debug!(
            "BoxCox({:?}) fitted on {} entities",
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
        "BoxCox"
    }

    fn fitted_entities(&self) -> Vec<EntityId> {
        self.state.entities().cloned().collect()
    }
}
