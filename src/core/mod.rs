//! Core data structures for panel time series.

mod entity;
mod panel;
mod series;

pub use entity::EntityId;
pub use panel::PanelSeries;
pub use series::Series;
