use super::{ForceLaw, OptimizerConfig};
use crate::projection::ClassColumn;
use rayon::prelude::*;

/// Squared distances below this are clamped to avoid dividing by zero.
pub(crate) const MIN_R2: f64 = 1e-4;

/// Above this many points the per-point force sums run on the rayon pool.
pub(crate) const PARALLEL_THRESHOLD: usize = 1000;

/// Force vector acting on every projected point.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ForceField {
    pub fx: Vec<f64>,
    pub fy: Vec<f64>,
}

impl ForceField {
    pub fn zeros(n: usize) -> Self {
        ForceField {
            fx: vec![0.0; n],
            fy: vec![0.0; n],
        }
    }
}

/// Attraction and repulsion acting on one point, kept apart for force balancing.
#[derive(Debug, Clone, Copy, Default)]
struct PointForce {
    attract_x: f64,
    attract_y: f64,
    repel_x: f64,
    repel_y: f64,
}

enum ClassView<'a> {
    Discrete(&'a [usize]),
    Continuous { values: &'a [f64], range: f64 },
}

impl<'a> ClassView<'a> {
    fn new(classes: &'a ClassColumn) -> Self {
        match classes {
            ClassColumn::Discrete { values, .. } => ClassView::Discrete(values),
            ClassColumn::Continuous { values } => {
                let (lo, hi) = values
                    .iter()
                    .fold((f64::MAX, f64::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
                ClassView::Continuous {
                    values,
                    range: if hi > lo { hi - lo } else { 0.0 },
                }
            }
        }
    }

    /// 0 for identical classes, 1 for maximally different ones.
    fn difference(&self, i: usize, j: usize) -> f64 {
        match self {
            ClassView::Discrete(values) => {
                if values[i] == values[j] {
                    0.0
                } else {
                    1.0
                }
            }
            ClassView::Continuous { values, range } => {
                if *range > 0.0 {
                    (values[i] - values[j]).abs() / range
                } else {
                    0.0
                }
            }
        }
    }
}

/// Forces from every ordered pair (i, j), i ≠ j, under the configured law.
///
/// With [`ForceLaw::Knn`] a point only feels the k points closest to it in projected
/// space.
pub(crate) fn all_pairs_forces(
    x: &[f64],
    y: &[f64],
    classes: &ClassColumn,
    config: &OptimizerConfig,
) -> ForceField {
    all_pairs_forces_on(x, y, classes, config, x.len() >= PARALLEL_THRESHOLD)
}

fn all_pairs_forces_on(
    x: &[f64],
    y: &[f64],
    classes: &ClassColumn,
    config: &OptimizerConfig,
    parallel: bool,
) -> ForceField {
    let n = x.len();
    let view = ClassView::new(classes);
    let neighbours = match config.law {
        ForceLaw::Knn => {
            let k = config
                .knn_neighbours
                .unwrap_or_else(|| (n as f64).sqrt().round() as usize)
                .clamp(1, n.saturating_sub(1).max(1));
            Some(nearest_neighbours(x, y, k, parallel))
        }
        _ => None,
    };

    let point_force = |i: usize| -> PointForce {
        let mut force = PointForce::default();
        let mut add = |j: usize| {
            let dx = x[j] - x[i];
            let dy = y[j] - y[i];
            let r2 = (dx * dx + dy * dy).max(MIN_R2);
            let r = r2.sqrt();
            let delta = view.difference(i, j);
            let attract = if delta < 1.0 {
                (1.0 - delta) * config.law.attraction(r2, config.attract_g, config.sigma)
            } else {
                0.0
            };
            let repel = if delta > 0.0 {
                delta * config.law.repulsion(r2, config.repel_g, config.sigma)
            } else {
                0.0
            };
            force.attract_x += attract * dx / r;
            force.attract_y += attract * dy / r;
            force.repel_x += repel * dx / r;
            force.repel_y += repel * dy / r;
        };

        match &neighbours {
            Some(lists) => lists[i].iter().for_each(|&j| add(j)),
            None => (0..n).filter(|&j| j != i).for_each(add),
        }
        force
    };

    let forces: Vec<PointForce> = if parallel {
        (0..n).into_par_iter().map(point_force).collect()
    } else {
        (0..n).map(point_force).collect()
    };

    let repel_scale = if config.force_balancing {
        balancing_factor(&forces)
    } else {
        1.0
    };

    ForceField {
        fx: forces
            .iter()
            .map(|f| f.attract_x + repel_scale * f.repel_x)
            .collect(),
        fy: forces
            .iter()
            .map(|f| f.attract_y + repel_scale * f.repel_y)
            .collect(),
    }
}

/// Scale for the repulsion field so that its total magnitude matches the attraction's.
fn balancing_factor(forces: &[PointForce]) -> f64 {
    let attract: f64 = forces.iter().map(|f| f.attract_x.hypot(f.attract_y)).sum();
    let repel: f64 = forces.iter().map(|f| f.repel_x.hypot(f.repel_y)).sum();
    if attract > 0.0 && repel > 0.0 {
        attract / repel
    } else {
        1.0
    }
}

/// For every point the indices of its `k` nearest other points, closest first.
fn nearest_neighbours(x: &[f64], y: &[f64], k: usize, parallel: bool) -> Vec<Vec<usize>> {
    let n = x.len();
    let neighbours_of = |i: usize| -> Vec<usize> {
        let mut others: Vec<(f64, usize)> = (0..n)
            .filter(|&j| j != i)
            .map(|j| ((x[j] - x[i]).powi(2) + (y[j] - y[i]).powi(2), j))
            .collect();
        let k = k.min(others.len());
        if k == 0 {
            return Vec::new();
        }
        others.select_nth_unstable_by(k - 1, |a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        others.truncate(k);
        others.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        others.into_iter().map(|(_, j)| j).collect()
    };

    if parallel {
        (0..n).into_par_iter().map(neighbours_of).collect()
    } else {
        (0..n).map(neighbours_of).collect()
    }
}

/// All ordered pairs visited by rotating a copy of the point arrays one position at a
/// time, using the `Linear` law.
pub(crate) fn rotation_forces(
    x: &[f64],
    y: &[f64],
    classes: &[usize],
    attract_g: f64,
    repel_g: f64,
) -> ForceField {
    let n = x.len();
    let mut field = ForceField::zeros(n);
    let mut x2 = x.to_vec();
    let mut y2 = y.to_vec();
    let mut c2 = classes.to_vec();

    for _ in 1..n {
        x2.rotate_left(1);
        y2.rotate_left(1);
        c2.rotate_left(1);
        for i in 0..n {
            let dx = x2[i] - x[i];
            let dy = y2[i] - y[i];
            let r2 = (dx * dx + dy * dy).max(MIN_R2);
            let r = r2.sqrt();
            let f = ForceLaw::Linear.magnitude(r2, classes[i] == c2[i], attract_g, repel_g, 1.0);
            field.fx[i] += f * dx / r;
            field.fy[i] += f * dy / r;
        }
    }
    field
}
