//! Integration tests for transform invertibility and entity independence.
//!
//! Each transform is fit on a multi-entity panel, inverted, and compared to
//! the input within floating-point tolerance.

use anofox_panel::core::{EntityId, PanelSeries, Series};
use anofox_panel::error::PanelError;
use anofox_panel::transform::{
    BoxCox, DeseasonalizeFourier, Detrend, Difference, FractionalDifference, PowerMethod, Scale,
    Transform, Transformer, YeoJohnson,
};
use approx::assert_relative_eq;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::f64::consts::PI;

// ============================================================================
// Fixtures
// ============================================================================

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap()
}

fn daily(values: Vec<f64>) -> Series {
    let stamps = (0..values.len())
        .map(|i| base() + Duration::days(i as i64))
        .collect();
    Series::new(stamps, values).unwrap()
}

/// Positive seasonal series with trend; `offset` makes entities differ.
fn store_sales(n: usize, offset: f64) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let t = i as f64;
            0.8 + 0.1 * offset
                + 0.25 * (2.0 * PI * t / 7.0).sin()
                + 0.004 * t
                + 0.02 * ((t * 1.7 + offset).sin())
        })
        .collect()
}

fn panel() -> PanelSeries {
    PanelSeries::new()
        .with_entity("store_1", daily(store_sales(70, 0.0)))
        .with_entity("store_2", daily(store_sales(70, 1.0)))
        .with_entity(EntityId::from(42), daily(store_sales(56, 2.5)))
}

fn assert_panels_close(actual: &PanelSeries, expected: &PanelSeries, tol: f64) {
    assert!(actual.same_entities(expected));
    for (id, series) in expected.iter() {
        let got = actual.get(id).unwrap();
        assert_eq!(got.timestamps(), series.timestamps(), "entity {id}");
        for (a, b) in got.values().iter().zip(series.values()) {
            assert_relative_eq!(*a, *b, max_relative = tol, epsilon = tol);
        }
    }
}

fn all_invertible() -> Vec<Transform> {
    vec![
        Difference::new(1, 1).unwrap().into(),
        Difference::new(1, 7).unwrap().into(),
        Detrend::linear(Duration::days(1)).unwrap().into(),
        Detrend::mean(Duration::days(1)).unwrap().into(),
        DeseasonalizeFourier::new(7, 3).unwrap().into(),
        FractionalDifference::new(0.35, 1e-2).unwrap().into(),
        Scale::default().into(),
        Scale::new(false, true).into(),
        BoxCox::mle().into(),
        BoxCox::fixed(0.0).unwrap().into(),
        YeoJohnson::new().into(),
    ]
}

/// Whether two fitted transforms of the same kind hold identical
/// parameters for `id`.
fn same_entity_params(a: &Transform, b: &Transform, id: &EntityId) -> bool {
    match (a, b) {
        (Transform::Difference(a), Transform::Difference(b)) => {
            a.state().params(id) == b.state().params(id)
        }
        (Transform::FractionalDifference(a), Transform::FractionalDifference(b)) => {
            a.state().params(id) == b.state().params(id)
        }
        (Transform::Detrend(a), Transform::Detrend(b)) => {
            a.state().params(id) == b.state().params(id)
        }
        (Transform::DeseasonalizeFourier(a), Transform::DeseasonalizeFourier(b)) => {
            a.state().params(id) == b.state().params(id)
        }
        (Transform::Scale(a), Transform::Scale(b)) => {
            a.state().params(id) == b.state().params(id)
        }
        (Transform::BoxCox(a), Transform::BoxCox(b)) => {
            a.state().params(id) == b.state().params(id)
        }
        (Transform::YeoJohnson(a), Transform::YeoJohnson(b)) => {
            a.state().params(id) == b.state().params(id)
        }
        _ => false,
    }
}

// ============================================================================
// Invertibility
// ============================================================================

#[test]
fn every_transform_round_trips() {
    let input = panel();
    for mut transform in all_invertible() {
        let out = transform.fit_apply(&input).unwrap();
        let restored = transform.invert(&out).unwrap();
        assert_panels_close(&restored, &input, 1e-9);
    }
}

#[test]
fn fractional_difference_round_trips_truncated_filter() {
    let input = panel();
    let mut fd = FractionalDifference::new(0.35, 1e-2).unwrap();
    let out = fd.fit_apply(&input).unwrap();
    for (id, series) in input.iter() {
        assert_eq!(out.get(id).unwrap().len(), series.len() - fd.window());
    }
    let restored = fd.invert(&out).unwrap();
    assert_panels_close(&restored, &input, 1e-9);
}

#[test]
fn fractional_truncation_error_shrinks_with_min_weight() {
    // Reference: the untruncated expansion over the full available history.
    let values = store_sales(400, 0.0);
    let d = 0.4;
    let mut full_weights = vec![1.0];
    for k in 1..values.len() {
        let prev = full_weights[k - 1];
        full_weights.push(-prev * (d - k as f64 + 1.0) / k as f64);
    }
    let untruncated =
        |t: usize| -> f64 { (0..=t).map(|k| full_weights[k] * values[t - k]).sum() };

    let input = PanelSeries::new().with_entity("a", daily(values.clone()));
    let mut previous_error = f64::INFINITY;
    for min_weight in [1e-1, 3e-2, 1e-2, 3e-3, 1e-3] {
        let mut fd = FractionalDifference::new(d, min_weight).unwrap();
        let out = fd.fit_apply(&input).unwrap();
        let filtered = out.get(&EntityId::from("a")).unwrap().values();

        let max_error = filtered
            .iter()
            .enumerate()
            .map(|(i, y)| (y - untruncated(i + fd.window())).abs())
            .fold(0.0_f64, f64::max);

        let bound = fd
            .state()
            .params(&EntityId::from("a"))
            .unwrap()
            .truncation_bound;
        assert!(
            max_error <= bound + 1e-12,
            "min_weight {min_weight}: error {max_error} exceeds bound {bound}"
        );
        assert!(max_error <= previous_error + 1e-12);
        previous_error = max_error;
    }
}

#[test]
fn difference_inverts_forecast_continuation() {
    let input = panel();
    let mut diff = Difference::new(1, 7).unwrap();
    diff.fit_apply(&input).unwrap();

    // A flat forecast of seasonal differences for the week after store_1 ends.
    let store_1 = input.get(&EntityId::from("store_1")).unwrap();
    let last = store_1.last_timestamp().unwrap();
    let horizon: Vec<_> = (1..=7).map(|h| last + Duration::days(h)).collect();
    let forecast =
        PanelSeries::new().with_entity("store_1", Series::new(horizon, vec![0.0; 7]).unwrap());

    let restored = diff.invert(&forecast).unwrap();
    let levels = restored.get(&EntityId::from("store_1")).unwrap().values();
    let last_week = &store_1.values()[store_1.len() - 7..];
    for (a, b) in levels.iter().zip(last_week) {
        assert_relative_eq!(a, b, epsilon = 1e-12);
    }
}

// ============================================================================
// Entity independence
// ============================================================================

#[test]
fn entities_are_transformed_independently() {
    let input = panel();
    for transform in all_invertible() {
        let mut joint = transform.clone();
        let joint_out = joint.fit_apply(&input).unwrap();

        for (id, series) in input.iter() {
            let single_input = PanelSeries::new().with_entity(id.clone(), series.clone());
            let mut single = transform.clone();
            let single_out = single.fit_apply(&single_input).unwrap();
            assert_eq!(
                joint_out.get(id),
                single_out.get(id),
                "{} differs for entity {id}",
                transform.name()
            );
            assert!(joint.fitted_entities().contains(id));
            assert!(
                same_entity_params(&joint, &single, id),
                "{} fitted different parameters for entity {id}",
                transform.name()
            );
        }
    }
}

#[test]
fn refit_replaces_only_seen_entities() {
    let input = panel();
    let mut bc = BoxCox::mle();
    bc.fit_apply(&input).unwrap();
    let before = bc.lambda(&EntityId::from("store_2")).unwrap();

    let refit = PanelSeries::new().with_entity("store_1", daily(vec![1.0, 10.0, 100.0, 1000.0]));
    bc.fit_apply(&refit).unwrap();

    assert_eq!(bc.lambda(&EntityId::from("store_2")).unwrap(), before);
    assert_eq!(bc.fitted_entities().len(), 3);
}

// ============================================================================
// Failure modes
// ============================================================================

#[test]
fn boxcox_rejects_non_positive_values() {
    let mut values = store_sales(30, 0.0);
    values[12] = -0.5;
    let bad: PanelSeries = panel()
        .into_iter()
        .chain([(EntityId::from("broken"), daily(values))])
        .collect();

    let mut bc = BoxCox::new(PowerMethod::Mle).unwrap();
    let err = bc.fit_apply(&bad).unwrap_err();
    assert_eq!(
        err,
        PanelError::NonPositiveValue {
            entity: EntityId::from("broken"),
            index: 12,
            value: -0.5
        }
    );
    assert!(!bc.is_fitted());
}

#[test]
fn scale_rejects_constant_entity() {
    let input = panel().with_entity("flat", daily(vec![3.5; 20]));
    let err = Scale::default().fit_apply(&input).unwrap_err();
    assert_eq!(
        err,
        PanelError::DegenerateVariance {
            entity: EntityId::from("flat")
        }
    );
}

#[test]
fn smallest_failing_entity_is_reported() {
    let input = PanelSeries::new()
        .with_entity("c", daily(vec![1.0; 5]))
        .with_entity("a", daily(vec![2.0, 3.0, 4.0]))
        .with_entity("b", daily(vec![7.0; 5]));
    let err = Scale::default().fit_apply(&input).unwrap_err();
    assert_eq!(
        err,
        PanelError::DegenerateVariance {
            entity: EntityId::from("b")
        }
    );
}

#[test]
fn invert_unknown_entity_is_missing_state() {
    let mut scale = Scale::default();
    scale.fit_apply(&panel()).unwrap();
    let unseen = PanelSeries::new().with_entity("store_9", daily(vec![0.0, 1.0]));
    assert_eq!(
        scale.invert(&unseen).unwrap_err(),
        PanelError::MissingState {
            entity: EntityId::from("store_9")
        }
    );
}

#[test]
fn short_entity_fails_differencing() {
    let input = panel().with_entity("new_store", daily(vec![1.0, 2.0, 3.0]));
    let err = Difference::new(1, 7).unwrap().fit_apply(&input).unwrap_err();
    assert!(matches!(err, PanelError::PreconditionViolation(msg) if msg.contains("new_store")));
}

#[test]
fn artifacts_are_retrievable_by_name() {
    let input = panel();
    let mut fourier = DeseasonalizeFourier::new(7, 2).unwrap();
    fourier.fit_apply(&input).unwrap();
    for (id, series) in input.iter() {
        let seasonal = fourier.state().artifact(id, "seasonal").unwrap();
        assert_eq!(seasonal.len(), series.len());
    }

    let mut detrend = Detrend::linear(Duration::days(1)).unwrap();
    detrend.fit_apply(&input).unwrap();
    assert!(detrend
        .state()
        .artifact(&EntityId::from("store_1"), "trend")
        .is_some());
}
