//! Fixed-window fractional differencing.
//!
//! Applies a truncated binomial expansion of `(1 - B)^d`:
//!
//! `w_0 = 1`, `w_k = -w_{k-1} * (d - k + 1) / k`
//!
//! Weights are generated until the first one whose magnitude drops below
//! `min_weight`, at most `MAX_WEIGHTS` of them. The weights depend only on
//! `d` and `min_weight` and are shared by every entity; an entity shorter
//! than the weight vector fails to fit. With `K` retained weights the output is the weighted sum
//! `y[t] = sum_{k<K} w_k * x[t-k]`, defined from `t = K - 1` on, so the first
//! `K - 1` observations of each entity are dropped.
//!
//! Because `w_0 = 1` the truncated filter is inverted by the recurrence
//! `x[t] = y[t] - sum_{k>=1} w_k * x[t-k]`, seeded with stored raw history.
//! That inverse is exact for the truncated filter. Relative to the
//! untruncated operator `(1 - B)^d` the transform is an approximation whose
//! error per observation is bounded by `max|x| * sum_{k>=K} |w_k|`, a tail
//! mass that shrinks monotonically as `min_weight` decreases.

use super::parallel::{fit_entities, invert_entities};
use super::state::{EntityState, SeedHistory, TransformState};
use super::Transformer;
use crate::core::{EntityId, PanelSeries, Series};
use crate::error::{PanelError, Result};
use crate::utils::stats::max_abs;
use log::{debug, trace};

/// Upper limit on the number of retained weights.
const MAX_WEIGHTS: usize = 10_000;

/// Terms summed explicitly when estimating the discarded tail mass.
const TAIL_HORIZON: usize = 100_000;

/// Fitted state of one fractionally differenced entity.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct FractionalParams {
    /// Raw history (`weights - 1` values) seeding the inverse recurrence.
    pub seeds: SeedHistory,
    /// Per-observation error bound relative to the untruncated operator.
    pub truncation_bound: f64,
}

/// Fractional differencing transform.
#[derive(Debug, Clone)]
pub struct FractionalDifference {
    d: f64,
    min_weight: f64,
    /// Shared by all entities: depends only on `d` and `min_weight`.
    weights: Vec<f64>,
    tail_mass: f64,
    state: TransformState<FractionalParams>,
}

impl FractionalDifference {
    /// Create a fractional differencing transform.
    ///
    /// `d` must be positive and finite, `min_weight` in `(0, 1)`.
    pub fn new(d: f64, min_weight: f64) -> Result<Self> {
        if !d.is_finite() || d <= 0.0 {
            return Err(PanelError::InvalidParameter(format!(
                "d must be positive and finite, got {d}"
            )));
        }
        if !(min_weight > 0.0 && min_weight < 1.0) {
            return Err(PanelError::InvalidParameter(format!(
                "min_weight must be in (0, 1), got {min_weight}"
            )));
        }

        let weights = fracdiff_weights(d, min_weight)?;
        let tail_mass = tail_mass(d, weights.len());
        trace!(
            "fractional weights d={d} min_weight={min_weight}: {} retained, tail mass {tail_mass:e}",
            weights.len()
        );

        Ok(Self {
            d,
            min_weight,
            weights,
            tail_mass,
            state: TransformState::new(),
        })
    }

    pub fn d(&self) -> f64 {
        self.d
    }

    pub fn min_weight(&self) -> f64 {
        self.min_weight
    }

    /// Retained filter weights, `w_0 = 1` first.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Number of leading observations dropped per entity.
    pub fn window(&self) -> usize {
        self.weights.len() - 1
    }

    /// Sum of the magnitudes of the discarded weights.
    pub fn tail_mass(&self) -> f64 {
        self.tail_mass
    }

    /// Error bound of the truncated filter against `(1 - B)^d` for inputs
    /// bounded by `max_abs` in magnitude.
    pub fn truncation_bound(&self, max_abs: f64) -> f64 {
        max_abs * self.tail_mass
    }

    pub fn state(&self) -> &TransformState<FractionalParams> {
        &self.state
    }

    fn fit_entity(
        &self,
        entity: &EntityId,
        series: &Series,
    ) -> Result<(EntityState<FractionalParams>, Series)> {
        let window = self.window();
        let n = series.len();
        if n < window + 1 {
            return Err(PanelError::PreconditionViolation(format!(
                "entity {entity}: fractional differencing with {} weights needs at least {} \
                 observations, got {n}",
                self.weights.len(),
                window + 1
            )));
        }

        let values = series.values();
        let filtered: Vec<f64> = (window..n)
            .map(|t| {
                self.weights
                    .iter()
                    .enumerate()
                    .map(|(k, w)| w * values[t - k])
                    .sum()
            })
            .collect();

        let output = Series::from_parts_unchecked(series.timestamps()[window..].to_vec(), filtered);
        let params = FractionalParams {
            seeds: SeedHistory::capture(series, window),
            truncation_bound: self.truncation_bound(max_abs(values)),
        };
        Ok((EntityState::new(params), output))
    }

    fn invert_entity(
        &self,
        entity: &EntityId,
        params: &FractionalParams,
        series: &Series,
    ) -> Result<Series> {
        let window = self.window();
        if window == 0 || series.is_empty() {
            return Ok(series.clone());
        }
        let alignment = params.seeds.align(entity, series.timestamps())?;
        let seeds = params.seeds.seeds(alignment);

        let mut history = seeds.to_vec();
        for &y in series.values() {
            let t = history.len();
            let lagged: f64 = self
                .weights
                .iter()
                .enumerate()
                .skip(1)
                .map(|(k, w)| w * history[t - k])
                .sum();
            history.push(y - lagged);
        }
        let restored = history.split_off(seeds.len());
        params.seeds.assemble(alignment, series, restored)
    }
}

/// Generate binomial weights of `(1 - B)^d` until `|w_k| < min_weight`.
///
/// Fails with `InvalidParameter` when more than 10 000 weights would be
/// retained.
pub fn fracdiff_weights(d: f64, min_weight: f64) -> Result<Vec<f64>> {
    let mut weights = vec![1.0];
    let mut k = 1usize;
    loop {
        let prev = weights[k - 1];
        let w = -prev * (d - k as f64 + 1.0) / k as f64;
        if w.abs() < min_weight {
            break;
        }
        weights.push(w);
        k += 1;
        if weights.len() > MAX_WEIGHTS {
            return Err(PanelError::InvalidParameter(format!(
                "min_weight {min_weight} retains more than {MAX_WEIGHTS} weights for d={d}"
            )));
        }
    }
    Ok(weights)
}

/// Sum of `|w_k|` for `k >= retained`.
///
/// Terms up to a fixed horizon are summed exactly; beyond it the weights
/// follow a power law `|w_k| ~ C k^{-(1+d)}`, whose remaining sum is
/// approximately `|w_M| * M / d`. The horizon does not depend on `retained`,
/// so the estimate is non-increasing in `retained`.
fn tail_mass(d: f64, retained: usize) -> f64 {
    let horizon = TAIL_HORIZON.max(retained);
    let mut w = 1.0_f64;
    let mut mass = 0.0;
    for k in 1..horizon {
        w = -w * (d - k as f64 + 1.0) / k as f64;
        if w == 0.0 {
            return mass;
        }
        if k >= retained {
            mass += w.abs();
        }
    }
    let next = -w * (d - horizon as f64 + 1.0) / horizon as f64;
    mass + next.abs() * horizon as f64 / d
}

impl Transformer for FractionalDifference {
    fn fit_apply(&mut self, panel: &PanelSeries) -> Result<PanelSeries> {
        let (fresh, output) = fit_entities(panel, |entity, series| self.fit_entity(entity, series))?;
        debug!(
            "FractionalDifference(d={}, min_weight={}) fitted on {} entities with {} weights",
            self.d,
            self.min_weight,
            fresh.len(),
            self.weights.len()
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
        "FractionalDifference"
    }

    fn fitted_entities(&self) -> Vec<EntityId> {
        self.state.entities().cloned().collect()
    }
}
