//! Fan-out/fan-in of per-entity work.
//!
//! Entities never read each other's data, so transform fit/invert and panel
//! CUSUM detection run as an independent map over the panel. With the
//! `parallel` feature the map runs on the rayon pool; results are always
//! reduced in entity key order, so a failing batch reports the error of its
//! smallest failing entity.

use super::state::{EntityState, TransformState};
use crate::core::{EntityId, PanelSeries, Series};
use crate::error::Result;
#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Run `f` on every entity of `panel`; fail the batch on the first error in
/// key order.
pub(crate) fn map_entities<T, F>(panel: &PanelSeries, f: F) -> Result<Vec<(EntityId, T)>>
where
    T: Send,
    F: Fn(&EntityId, &Series) -> Result<T> + Sync + Send,
{
    let entries: Vec<(&EntityId, &Series)> = panel.iter().collect();

    #[cfg(feature = "parallel")]
    let results: Vec<Result<T>> = entries.par_iter().map(|&(id, s)| f(id, s)).collect();

    #[cfg(not(feature = "parallel"))]
    let results: Vec<Result<T>> = entries.iter().map(|&(id, s)| f(id, s)).collect();

    entries
        .into_iter()
        .zip(results)
        .map(|((id, _), r)| r.map(|t| (id.clone(), t)))
        .collect()
}

/// Fit every entity and split the outcome into fresh state and output panel.
pub(crate) fn fit_entities<P, F>(
    panel: &PanelSeries,
    f: F,
) -> Result<(TransformState<P>, PanelSeries)>
where
    P: Send,
    F: Fn(&EntityId, &Series) -> Result<(EntityState<P>, Series)> + Sync + Send,
{
    let fitted = map_entities(panel, f)?;
    let mut state = TransformState::new();
    let mut output = PanelSeries::new();
    for (entity, (entity_state, series)) in fitted {
        state.insert(entity.clone(), entity_state);
        output.insert(entity, series);
    }
    Ok((state, output))
}

/// Invert every entity of `panel` against its stored state.
pub(crate) fn invert_entities<P, F>(
    panel: &PanelSeries,
    state: &TransformState<P>,
    f: F,
) -> Result<PanelSeries>
where
    P: Sync,
    F: Fn(&EntityId, &P, &Series) -> Result<Series> + Sync + Send,
{
    let inverted = map_entities(panel, |entity, series| {
        let params = state.params(entity)?;
        f(entity, params, series)
    })?;
    Ok(inverted.into_iter().collect())
}
