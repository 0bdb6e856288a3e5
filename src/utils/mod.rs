//! Shared numeric and panel utilities.

pub mod cross_validation;
pub mod ols;
pub mod optimization;
pub mod stats;
pub mod time_index;

pub use cross_validation::{
    expanding_window_split, sliding_window_split, train_test_split, window_split, PanelSplit,
    TestSize, WindowSplitConfig,
};
pub use ols::{linear_fit, ols_fit, OlsFit};
pub use optimization::{minimize_bounded, GoldenSectionConfig, ScalarOptimum};
pub use time_index::{grid_index, grid_indices};
