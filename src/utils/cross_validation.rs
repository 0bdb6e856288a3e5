//! Time-ordered train/test splitting for panel data.
//!
//! Every entity is split independently along its own time axis, so a split
//! never leaks future observations of an entity into its training window.

use crate::core::{PanelSeries, Series};
use crate::error::{PanelError, Result};

/// Size of the test window.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TestSize {
    /// Fixed number of trailing observations per entity.
    Count(usize),
    /// Fraction of each entity's observations, in `[0, 1]`.
    Fraction(f64),
}

impl Default for TestSize {
    fn default() -> Self {
        Self::Fraction(0.25)
    }
}

/// One train/test fold.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelSplit {
    pub train: PanelSeries,
    pub test: PanelSeries,
}

/// Configuration for window-based cross-validation splits.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSplitConfig {
    /// Number of test observations per fold.
    pub test_size: usize,
    /// Number of folds.
    pub n_splits: usize,
    /// Offset between consecutive folds.
    pub step_size: usize,
    /// Fixed training window (sliding); `None` means expanding.
    pub window_size: Option<usize>,
}

impl Default for WindowSplitConfig {
    fn default() -> Self {
        Self {
            test_size: 1,
            n_splits: 5,
            step_size: 1,
            window_size: None,
        }
    }
}

impl WindowSplitConfig {
    /// Expanding window: the training set grows with each fold.
    pub fn expanding(test_size: usize, n_splits: usize) -> Self {
        Self {
            test_size,
            n_splits,
            ..Default::default()
        }
    }

    /// Sliding window: fixed-length training set.
    pub fn sliding(test_size: usize, n_splits: usize, window_size: usize) -> Self {
        Self {
            test_size,
            n_splits,
            window_size: Some(window_size),
            ..Default::default()
        }
    }

    /// Set the step size between folds.
    pub fn with_step_size(mut self, step_size: usize) -> Self {
        self.step_size = step_size;
        self
    }

    /// Distance from the end of the series to the start of fold `i`'s test window.
    fn cutoff(&self, fold: usize) -> usize {
        self.test_size + (self.n_splits - 1 - fold) * self.step_size
    }

    fn validate(&self) -> Result<()> {
        if self.test_size == 0 {
            return Err(PanelError::InvalidParameter(
                "test_size must be greater than 0".to_string(),
            ));
        }
        if self.n_splits == 0 {
            return Err(PanelError::InvalidParameter(
                "n_splits must be greater than 0".to_string(),
            ));
        }
        if self.window_size == Some(0) {
            return Err(PanelError::InvalidParameter(
                "window_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Split every entity into a leading train window and a trailing test window.
///
/// # Example
/// ```
/// use anofox_panel::core::{PanelSeries, Series};
/// use anofox_panel::utils::cross_validation::{train_test_split, TestSize};
/// use chrono::{Duration, TimeZone, Utc};
///
/// let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
/// let stamps: Vec<_> = (0..8).map(|i| base + Duration::days(i)).collect();
/// let series = Series::new(stamps, (0..8).map(|i| i as f64).collect()).unwrap();
/// let panel = PanelSeries::new().with_entity("a", series);
///
/// let split = train_test_split(&panel, TestSize::Count(3)).unwrap();
/// assert_eq!(split.train.len(), 5);
/// assert_eq!(split.test.len(), 3);
/// ```
pub fn train_test_split(panel: &PanelSeries, test_size: TestSize) -> Result<PanelSplit> {
    match test_size {
        TestSize::Fraction(f) if !(0.0..=1.0).contains(&f) => {
            return Err(PanelError::InvalidParameter(
                "test_size fraction must be between 0 and 1".to_string(),
            ));
        }
        TestSize::Count(count) => {
            let smallest = panel.min_length().unwrap_or(0);
            if count > smallest {
                return Err(PanelError::InvalidParameter(format!(
                    "test_size {count} exceeds the length of the smallest entity ({smallest})"
                )));
            }
        }
        TestSize::Fraction(_) => {}
    }

    let mut train = PanelSeries::new();
    let mut test = PanelSeries::new();
    for (entity, series) in panel {
        let n = series.len();
        let train_len = match test_size {
            TestSize::Count(count) => n - count,
            TestSize::Fraction(f) => (n as f64 * (1.0 - f)).floor() as usize,
        };
        train.insert(entity.clone(), series.slice(0, train_len)?);
        test.insert(entity.clone(), series.slice(train_len, n)?);
    }

    Ok(PanelSplit { train, test })
}

/// Repeated splits with a growing training window and a fixed-size test window.
///
/// Folds are ordered oldest first; the last fold's test window ends at the
/// last observation of every entity.
pub fn expanding_window_split(
    panel: &PanelSeries,
    test_size: usize,
    n_splits: usize,
    step_size: usize,
) -> Result<Vec<PanelSplit>> {
    window_split(
        panel,
        &WindowSplitConfig::expanding(test_size, n_splits).with_step_size(step_size),
    )
}

/// Repeated splits with a fixed-length training window sliding forward.
pub fn sliding_window_split(
    panel: &PanelSeries,
    test_size: usize,
    n_splits: usize,
    step_size: usize,
    window_size: usize,
) -> Result<Vec<PanelSplit>> {
    window_split(
        panel,
        &WindowSplitConfig::sliding(test_size, n_splits, window_size).with_step_size(step_size),
    )
}

/// Window-based splitting driven by a [`WindowSplitConfig`].
pub fn window_split(panel: &PanelSeries, config: &WindowSplitConfig) -> Result<Vec<PanelSplit>> {
    config.validate()?;

    (0..config.n_splits)
        .map(|fold| {
            let cutoff = config.cutoff(fold);
            let mut train = PanelSeries::new();
            let mut test = PanelSeries::new();
            for (entity, series) in panel {
                let (train_series, test_series) = split_entity(series, cutoff, config)?;
                train.insert(entity.clone(), train_series);
                test.insert(entity.clone(), test_series);
            }
            Ok(PanelSplit { train, test })
        })
        .collect()
}

fn split_entity(
    series: &Series,
    cutoff: usize,
    config: &WindowSplitConfig,
) -> Result<(Series, Series)> {
    let n = series.len();
    let needed = cutoff + config.window_size.unwrap_or(1);
    if n < needed {
        return Err(PanelError::InsufficientData { needed, got: n });
    }

    let test_start = n - cutoff;
    let train_start = config.window_size.map_or(0, |w| test_start - w);
    Ok((
        series.slice(train_start, test_start)?,
        series.slice(test_start, test_start + config.test_size)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EntityId;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn make_series(n: usize) -> Series {
        let base: DateTime<Utc> = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let stamps = (0..n).map(|i| base + Duration::days(i as i64)).collect();
        Series::new(stamps, (0..n).map(|i| i as f64).collect()).unwrap()
    }

    fn make_panel() -> PanelSeries {
        PanelSeries::new()
            .with_entity("a", make_series(10))
            .with_entity("b", make_series(12))
    }

    #[test]
    fn count_split() {
        let split = train_test_split(&make_panel(), TestSize::Count(3)).unwrap();
        let a_train = split.train.get(&EntityId::from("a")).unwrap();
        let b_test = split.test.get(&EntityId::from("b")).unwrap();
        assert_eq!(a_train.len(), 7);
        assert_eq!(b_test.values(), &[9.0, 10.0, 11.0]);
    }

    #[test]
    fn fraction_split_truncates_train_length() {
        let split = train_test_split(&make_panel(), TestSize::Fraction(0.25)).unwrap();
        // 10 * 0.75 = 7.5 -> 7
        assert_eq!(split.train.get(&EntityId::from("a")).unwrap().len(), 7);
        assert_eq!(split.train.get(&EntityId::from("b")).unwrap().len(), 9);
    }

    #[test]
    fn invalid_test_sizes() {
        let panel = make_panel();
        assert!(train_test_split(&panel, TestSize::Fraction(1.5)).is_err());
        assert!(train_test_split(&panel, TestSize::Fraction(-0.1)).is_err());
        assert!(train_test_split(&panel, TestSize::Count(11)).is_err());
    }

    #[test]
    fn expanding_folds_grow() {
        let folds = expanding_window_split(&make_panel(), 3, 3, 1).unwrap();
        assert_eq!(folds.len(), 3);
        let a = EntityId::from("a");
        let lens: Vec<usize> = folds.iter().map(|f| f.train.get(&a).unwrap().len()).collect();
        assert_eq!(lens, vec![5, 6, 7]);
        // Last fold tests on the final observations
        assert_eq!(folds[2].test.get(&a).unwrap().values(), &[7.0, 8.0, 9.0]);
        assert_eq!(folds[0].test.get(&a).unwrap().values(), &[5.0, 6.0, 7.0]);
    }

    #[test]
    fn sliding_folds_keep_window() {
        let folds = sliding_window_split(&make_panel(), 2, 3, 2, 4).unwrap();
        let a = EntityId::from("a");
        for fold in &folds {
            assert_eq!(fold.train.get(&a).unwrap().len(), 4);
            assert_eq!(fold.test.get(&a).unwrap().len(), 2);
        }
        assert_eq!(folds[0].train.get(&a).unwrap().values(), &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(folds[2].train.get(&a).unwrap().values(), &[4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn too_short_entities_fail() {
        let err = sliding_window_split(&make_panel(), 3, 3, 2, 6).unwrap_err();
        assert!(matches!(err, PanelError::InsufficientData { .. }));
    }

    #[test]
    fn zero_sizes_are_invalid() {
        assert!(expanding_window_split(&make_panel(), 0, 3, 1).is_err());
        assert!(expanding_window_split(&make_panel(), 1, 0, 1).is_err());
    }
}
