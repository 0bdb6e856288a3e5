//! Two-sided CUSUM detector with self-calibrating warmup.
//!
//! The detector alternates between two phases:
//!
//! - **Warmup**: buffer `warmup_period` values, then estimate the reference
//!   mean and sample standard deviation from them.
//! - **Monitoring**: standardize each value against the reference and update
//!   `S+ = max(0, S+ + z - k)`, `S- = min(0, S- + z + k)`. When either sum
//!   leaves `[-threshold, threshold]` the step is flagged, the sums and
//!   buffer are cleared and the detector returns to warmup.
//!
//! A zero-variance warmup uses a floor of `1e-10` for the standard deviation,
//! so any later deviation from a constant baseline is flagged quickly.
//! Non-finite values are skipped: they emit 0 and do not touch any state.
//!
//! # Example
//!
//! ```
//! use anofox_panel::changepoint::{CusumConfig, CusumDetector};
//!
//! let mut series: Vec<f64> = (0..60).map(|i| if i % 2 == 0 { 0.1 } else { -0.1 }).collect();
//! series.extend(vec![3.0; 10]);
//!
//! let detector = CusumDetector::new(CusumConfig::default().warmup_period(40)).unwrap();
//! let flags = detector.detect_slice(&series);
//! assert_eq!(flags.len(), series.len());
//! assert!(flags[..60].iter().all(|&f| f == 0));
//! assert_eq!(flags.iter().position(|&f| f == 1), Some(60));
//! ```

use crate::core::{EntityId, PanelSeries};
use crate::error::{PanelError, Result};
use crate::transform::parallel::map_entities;
use log::{debug, trace};
use std::collections::BTreeMap;

/// Lower bound on the reference standard deviation.
const MIN_STD: f64 = 1e-10;

/// Configuration for the CUSUM detector.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CusumConfig {
    /// Decision threshold on the standardized sums (τ > 0).
    pub threshold: f64,
    /// Number of observations used to estimate the baseline (W >= 2).
    pub warmup_period: usize,
    /// Allowance subtracted per step, in standard deviations (k >= 0).
    pub drift: f64,
}

impl Default for CusumConfig {
    fn default() -> Self {
        Self {
            threshold: 5.0,
            warmup_period: 50,
            drift: 1.0,
        }
    }
}

impl CusumConfig {
    pub fn new(threshold: f64, warmup_period: usize, drift: f64) -> Self {
        Self {
            threshold,
            warmup_period,
            drift,
        }
    }

    /// Set the decision threshold.
    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the warmup length.
    pub fn warmup_period(mut self, warmup_period: usize) -> Self {
        self.warmup_period = warmup_period;
        self
    }

    /// Set the per-step allowance.
    pub fn drift(mut self, drift: f64) -> Self {
        self.drift = drift;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.threshold.is_finite() && self.threshold > 0.0) {
            return Err(PanelError::InvalidParameter(format!(
                "threshold must be positive and finite, got {}",
                self.threshold
            )));
        }
        if self.warmup_period < 2 {
            return Err(PanelError::InvalidParameter(format!(
                "warmup_period must be >= 2, got {}",
                self.warmup_period
            )));
        }
        if !(self.drift.is_finite() && self.drift >= 0.0) {
            return Err(PanelError::InvalidParameter(format!(
                "drift must be non-negative and finite, got {}",
                self.drift
            )));
        }
        Ok(())
    }
}

/// Phase of the detector state machine.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CusumPhase {
    Warmup,
    Monitoring,
}

/// Streaming state of one CUSUM run.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct CusumState {
    config: CusumConfig,
    phase: CusumPhase,
    buffer: Vec<f64>,
    reference_mean: f64,
    reference_std: f64,
    s_pos: f64,
    s_neg: f64,
    /// Number of values consumed, including skipped non-finite ones.
    steps: usize,
}

impl CusumState {
    fn new(config: CusumConfig) -> Self {
        Self {
            config,
            phase: CusumPhase::Warmup,
            buffer: Vec::with_capacity(config.warmup_period),
            reference_mean: 0.0,
            reference_std: 1.0,
            s_pos: 0.0,
            s_neg: 0.0,
            steps: 0,
        }
    }

    pub fn phase(&self) -> CusumPhase {
        self.phase
    }

    /// Reference `(mean, std)` while monitoring.
    pub fn reference(&self) -> Option<(f64, f64)> {
        match self.phase {
            CusumPhase::Monitoring => Some((self.reference_mean, self.reference_std)),
            CusumPhase::Warmup => None,
        }
    }

    /// Current `(S+, S-)`.
    pub fn sums(&self) -> (f64, f64) {
        (self.s_pos, self.s_neg)
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Return to the initial warmup phase.
    pub fn reset(&mut self) {
        self.phase = CusumPhase::Warmup;
        self.buffer.clear();
        self.s_pos = 0.0;
        self.s_neg = 0.0;
    }

    /// Consume one value. Returns `true` if this step is a detected change.
    pub fn update(&mut self, x: f64) -> bool {
        let step = self.steps;
        self.steps += 1;
        if !x.is_finite() {
            return false;
        }

        match self.phase {
            CusumPhase::Warmup => {
                self.buffer.push(x);
                if self.buffer.len() >= self.config.warmup_period {
                    self.calibrate();
                    trace!(
                        "CUSUM calibrated at step {step}: mean={:.6}, std={:.6}",
                        self.reference_mean,
                        self.reference_std
                    );
                }
                false
            }
            CusumPhase::Monitoring => {
                let z = (x - self.reference_mean) / self.reference_std;
                let k = self.config.drift;
                self.s_pos = (self.s_pos + z - k).max(0.0);
                self.s_neg = (self.s_neg + z + k).min(0.0);

                let tau = self.config.threshold;
                if self.s_pos > tau || self.s_neg < -tau {
                    debug!(
                        "CUSUM event at step {step}: S+={:.4}, S-={:.4}",
                        self.s_pos, self.s_neg
                    );
                    self.reset();
                    true
                } else {
                    false
                }
            }
        }
    }

    fn calibrate(&mut self) {
        let n = self.buffer.len() as f64;
        let mean = self.buffer.iter().sum::<f64>() / n;
        let variance = self
            .buffer
            .iter()
            .map(|x| (x - mean).powi(2))
            .sum::<f64>()
            / (n - 1.0);
        self.reference_mean = mean;
        self.reference_std = variance.sqrt().max(MIN_STD);
        self.s_pos = 0.0;
        self.s_neg = 0.0;
        self.phase = CusumPhase::Monitoring;
    }
}

/// CUSUM change detector.
///
/// The detector itself is immutable; every [`detect`](Self::detect) call
/// starts a fresh run.
#[derive(Debug, Clone)]
pub struct CusumDetector {
    config: CusumConfig,
}

impl CusumDetector {
    pub fn new(config: CusumConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &CusumConfig {
        &self.config
    }

    /// A fresh streaming state for push-style use.
    pub fn state(&self) -> CusumState {
        CusumState::new(self.config)
    }

    /// Lazily flag each value of `values` with 0 or 1.
    pub fn detect<I>(&self, values: I) -> CusumFlags<I::IntoIter>
    where
        I: IntoIterator<Item = f64>,
    {
        CusumFlags {
            values: values.into_iter(),
            state: self.state(),
        }
    }

    pub fn detect_slice(&self, values: &[f64]) -> Vec<u8> {
        self.detect(values.iter().copied()).collect()
    }

    /// Indices of flagged steps.
    pub fn events(&self, values: &[f64]) -> Vec<usize> {
        self.detect(values.iter().copied())
            .enumerate()
            .filter_map(|(i, flag)| (flag == 1).then_some(i))
            .collect()
    }

    /// Run an independent detector over every entity of a panel.
    pub fn detect_panel(&self, panel: &PanelSeries) -> Result<BTreeMap<EntityId, Vec<u8>>> {
        let flags = map_entities(panel, |_, series| Ok(self.detect_slice(series.values())))?;
        debug!("CUSUM ran over {} entities", flags.len());
        Ok(flags.into_iter().collect())
    }
}

/// Iterator of event flags aligned one-to-one with its input.
#[derive(Debug, Clone)]
pub struct CusumFlags<I> {
    values: I,
    state: CusumState,
}

impl<I> CusumFlags<I> {
    pub fn state(&self) -> &CusumState {
        &self.state
    }
}

impl<I> Iterator for CusumFlags<I>
where
    I: Iterator<Item = f64>,
{
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        self.values.next().map(|x| u8::from(self.state.update(x)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.values.size_hint()
    }
}

/// Flag changes in `values`; one flag per input value.
pub fn cusum(values: &[f64], threshold: f64, warmup_period: usize, drift: f64) -> Result<Vec<u8>> {
    let detector = CusumDetector::new(CusumConfig::new(threshold, warmup_period, drift))?;
    Ok(detector.detect_slice(values))
}
