//! Bounded scalar optimization for parameter estimation.

/// Result of a bounded scalar minimization.
#[derive(Debug, Clone)]
pub struct ScalarOptimum {
    /// The minimizing point found.
    pub point: f64,
    /// The objective value at `point`.
    pub value: f64,
    /// Number of golden-section iterations performed.
    pub iterations: usize,
    /// Whether the bracket shrank below the tolerance.
    pub converged: bool,
}

/// Configuration for grid-seeded golden-section search.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct GoldenSectionConfig {
    /// Number of evenly spaced grid points used to bracket the minimum.
    pub grid_points: usize,
    /// Maximum number of golden-section iterations.
    pub max_iter: usize,
    /// Bracket width at which the search stops.
    pub tolerance: f64,
}

impl Default for GoldenSectionConfig {
    fn default() -> Self {
        Self {
            grid_points: 101,
            max_iter: 200,
            tolerance: 1e-8,
        }
    }
}

const INV_PHI: f64 = 0.618_033_988_749_894_8;

/// Minimize a univariate function on `[lower, upper]`.
///
/// A coarse grid locates the best bracket (the objective may be multimodal
/// or non-finite in places), then golden-section search refines inside it.
/// Non-finite objective values are treated as `+inf`.
///
/// # Example
/// ```
/// use anofox_panel::utils::optimization::{minimize_bounded, GoldenSectionConfig};
///
/// let result = minimize_bounded(|x| (x - 1.5).powi(2), -5.0, 5.0, &GoldenSectionConfig::default());
/// assert!((result.point - 1.5).abs() < 1e-6);
/// ```
pub fn minimize_bounded<F>(
    objective: F,
    lower: f64,
    upper: f64,
    config: &GoldenSectionConfig,
) -> ScalarOptimum
where
    F: Fn(f64) -> f64,
{
    let f = |x: f64| {
        let v = objective(x);
        if v.is_finite() {
            v
        } else {
            f64::INFINITY
        }
    };

    if lower.partial_cmp(&upper) != Some(std::cmp::Ordering::Less) {
        return ScalarOptimum {
            point: lower,
            value: f(lower),
            iterations: 0,
            converged: true,
        };
    }

    let grid_points = config.grid_points.max(3);
    let step = (upper - lower) / (grid_points - 1) as f64;
    let grid: Vec<f64> = (0..grid_points).map(|i| lower + step * i as f64).collect();
    let values: Vec<f64> = grid.iter().map(|&x| f(x)).collect();

    let best = values
        .iter()
        .enumerate()
        .fold(0, |best, (i, &v)| if v < values[best] { i } else { best });

    let mut a = grid[best.saturating_sub(1)];
    let mut b = grid[(best + 1).min(grid_points - 1)];

    let mut c = b - INV_PHI * (b - a);
    let mut d = a + INV_PHI * (b - a);
    let mut fc = f(c);
    let mut fd = f(d);

    let mut iterations = 0;
    let mut converged = false;
    while iterations < config.max_iter {
        if (b - a).abs() < config.tolerance {
            converged = true;
            break;
        }
        iterations += 1;
        if fc < fd {
            b = d;
            d = c;
            fd = fc;
            c = b - INV_PHI * (b - a);
            fc = f(c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + INV_PHI * (b - a);
            fd = f(d);
        }
    }

    let mid = 0.5 * (a + b);
    let fmid = f(mid);

    // The refined point never loses to the best grid point.
    let (point, value) = if fmid <= values[best] {
        (mid, fmid)
    } else {
        (grid[best], values[best])
    };

    ScalarOptimum {
        point,
        value,
        iterations,
        converged,
    }
}
