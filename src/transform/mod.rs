//! Invertible, stateful transforms for panel time series.
//!
//! Every transform is fit per entity on the first application
//! ([`Transformer::fit_apply`]) and keeps the per-entity parameters it needs
//! to map transformed values, or forecasts made on the transformed scale,
//! back to the original scale ([`Transformer::invert`]).
//!
//! | Transform | Output length | Inverse |
//! |---|---|---|
//! | [`Difference`] | `n - order * seasonal_period` | exact |
//! | [`FractionalDifference`] | `n - (weights - 1)` | exact for the truncated filter |
//! | [`Detrend`] | `n` | exact |
//! | [`DeseasonalizeFourier`] | `n` | exact |
//! | [`Scale`] | `n` | exact |
//! | [`BoxCox`] | `n` | exact |
//! | [`YeoJohnson`] | `n` | exact |
//!
//! # Example
//!
//! ```
//! use anofox_panel::core::{PanelSeries, Series};
//! use anofox_panel::transform::{Scale, Transformer};
//! use chrono::{Duration, TimeZone, Utc};
//!
//! let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
//! let stamps: Vec<_> = (0..5).map(|i| base + Duration::days(i)).collect();
//! let series = Series::new(stamps, vec![1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
//! let panel = PanelSeries::new().with_entity("a", series);
//!
//! let mut scale = Scale::new(true, true);
//! let scaled = scale.fit_apply(&panel).unwrap();
//! let restored = scale.invert(&scaled).unwrap();
//! assert_eq!(restored.len(), panel.len());
//! ```

pub mod boxcox;
pub mod detrend;
pub mod difference;
pub mod fourier;
pub mod fractional;
pub(crate) mod parallel;
pub mod pipeline;
pub mod scale;
pub mod state;
pub mod yeojohnson;

pub use boxcox::{BoxCox, LambdaSearch, PowerMethod, PowerParams};
pub use detrend::{Detrend, DetrendMethod, TrendParams};
pub use difference::{Difference, DifferenceParams};
pub use fourier::{DeseasonalizeFourier, FourierParams};
pub use fractional::{FractionalDifference, FractionalParams};
pub use pipeline::Pipeline;
pub use scale::{Scale, ScaleParams};
pub use state::{EntityState, SeedAlignment, SeedHistory, TransformState};
pub use yeojohnson::YeoJohnson;

use crate::core::{EntityId, PanelSeries};
use crate::error::Result;

/// Common interface of all panel transforms.
pub trait Transformer {
    /// Fit per-entity parameters on `panel` and return the transformed panel.
    ///
    /// Entities present in `panel` replace any previously fitted state;
    /// entities absent from it keep theirs.
    fn fit_apply(&mut self, panel: &PanelSeries) -> Result<PanelSeries>;

    /// Map a panel on the transformed scale back to the original scale.
    ///
    /// Fails with `MissingState` for any entity that was never fitted.
    fn invert(&self, panel: &PanelSeries) -> Result<PanelSeries>;

    /// Transform name, used in logs.
    fn name(&self) -> &str;

    /// Entities with fitted state, in key order.
    fn fitted_entities(&self) -> Vec<EntityId>;

    fn is_fitted(&self) -> bool {
        !self.fitted_entities().is_empty()
    }
}

/// The closed set of transforms a [`Pipeline`] can hold.
#[derive(Debug, Clone)]
pub enum Transform {
    Difference(Difference),
    FractionalDifference(FractionalDifference),
    Detrend(Detrend),
    DeseasonalizeFourier(DeseasonalizeFourier),
    Scale(Scale),
    BoxCox(BoxCox),
    YeoJohnson(YeoJohnson),
}

macro_rules! dispatch {
    ($self:expr, $t:ident => $body:expr) => {
        match $self {
            Transform::Difference($t) => $body,
            Transform::FractionalDifference($t) => $body,
            Transform::Detrend($t) => $body,
            Transform::DeseasonalizeFourier($t) => $body,
            Transform::Scale($t) => $body,
            Transform::BoxCox($t) => $body,
            Transform::YeoJohnson($t) => $body,
        }
    };
}

impl Transformer for Transform {
    fn fit_apply(&mut self, panel: &PanelSeries) -> Result<PanelSeries> {
        dispatch!(self, t => t.fit_apply(panel))
    }

    fn invert(&self, panel: &PanelSeries) -> Result<PanelSeries> {
        dispatch!(self, t => t.invert(panel))
    }

    fn name(&self) -> &str {
        dispatch!(self, t => t.name())
    }

    fn fitted_entities(&self) -> Vec<EntityId> {
        dispatch!(self, t => t.fitted_entities())
    }
}

macro_rules! impl_from_transform {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Transform {
                fn from(t: $variant) -> Self {
                    Transform::$variant(t)
                }
            }
        )*
    };
}

impl_from_transform!(
    Difference,
    FractionalDifference,
    Detrend,
    DeseasonalizeFourier,
    Scale,
    BoxCox,
    YeoJohnson,
);
