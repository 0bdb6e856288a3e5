//! Changepoint detection.
//!
//! # Available Algorithms
//!
//! - **CUSUM**: sequential two-sided cumulative-sum detector for mean
//!   shifts, recalibrating its baseline after every detected event.
//!
//! # Example
//!
//! ```
//! use anofox_panel::changepoint::cusum;
//!
//! // Create series with a level shift after a noisy baseline
//! let mut series: Vec<f64> = (0..50).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }).collect();
//! series.extend(vec![5.0; 5]);
//!
//! let flags = cusum(&series, 5.0, 50, 1.0).unwrap();
//! assert_eq!(flags.len(), 55);
//! assert_eq!(flags[50], 1);
//! ```

pub mod cusum;

pub use cusum::{cusum, CusumConfig, CusumDetector, CusumFlags, CusumPhase, CusumState};
