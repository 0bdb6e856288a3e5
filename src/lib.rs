//! # anofox-panel
//!
//! Invertible transforms and changepoint detection for panel time series.
//!
//! A panel is a set of independent series keyed by entity. Every transform
//! is fit per entity, keeps the state it needs to map values (or forecasts)
//! back to the original scale, and runs its per-entity work in parallel.
//!
//! - [`transform`]: Difference, FractionalDifference, Detrend,
//!   DeseasonalizeFourier, Scale, BoxCox, YeoJohnson and their [`Pipeline`]
//!   composition.
//! - [`changepoint`]: a self-calibrating two-sided CUSUM detector.
//! - [`utils`]: panel train/test and window splits, OLS and scalar
//!   optimization helpers.
//!
//! ## Example
//!
//! ```
//! use anofox_panel::prelude::*;
//! use chrono::{Duration, TimeZone, Utc};
//!
//! let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
//! let rows = (0..24).flat_map(|i| {
//!     let t = base + Duration::days(i);
//!     [("north", t, 10.0 + i as f64), ("south", t, 50.0 - 0.5 * i as f64)]
//! });
//! let panel = PanelSeries::from_long(rows).unwrap();
//!
//! let mut pipeline = Pipeline::default()
//!     .then(Detrend::linear(Duration::days(1)).unwrap())
//!     .then(Difference::new(1, 1).unwrap());
//! let out = pipeline.fit_apply(&panel).unwrap();
//! let restored = pipeline.invert(&out).unwrap();
//! assert_eq!(restored.len(), panel.len());
//! ```

// Allow some clippy warnings for cleaner code in specific cases
#![allow(clippy::needless_range_loop)]

pub mod changepoint;
pub mod core;
pub mod error;
pub mod transform;
pub mod utils;

pub use error::{PanelError, Result};
pub use transform::Pipeline;

pub mod prelude {
    pub use crate::changepoint::{cusum, CusumConfig, CusumDetector};
    pub use crate::core::{EntityId, PanelSeries, Series};
    pub use crate::error::{PanelError, Result};
    pub use crate::transform::{
        BoxCox, DeseasonalizeFourier, Detrend, DetrendMethod, Difference, FractionalDifference,
        Pipeline, PowerMethod, Scale, Transform, Transformer, YeoJohnson,
    };
    pub use crate::utils::{train_test_split, TestSize};
}
