use super::pairwise::ForceField;
use crate::anchors::{canonicalize_mirror, RestraintMode};
use crate::error::{FreeVizError, Result};
use ndarray::{Array1, ArrayView2, Axis};
use rayon::prelude::*;
use std::f64::consts::PI;

const PARALLEL_CELLS: usize = 1 << 16;

/// Chain rule of the linear projection: the force on a point is attributed to each anchor
/// in proportion to that attribute's (scaled) contribution to the point's coordinates.
pub(crate) fn backpropagate(
    data: ArrayView2<f64>,
    field: &ForceField,
    scale: &[f64],
) -> (Vec<f64>, Vec<f64>) {
    let wx: Array1<f64> = field.fx.iter().zip(scale).map(|(f, s)| f * s).collect();
    let wy: Array1<f64> = field.fy.iter().zip(scale).map(|(f, s)| f * s).collect();

    if data.len() >= PARALLEL_CELLS {
        data.axis_iter(Axis(0))
            .into_par_iter()
            .map(|row| (row.dot(&wx), row.dot(&wy)))
            .unzip()
    } else {
        (data.dot(&wx).to_vec(), data.dot(&wy).to_vec())
    }
}

/// Moves the anchors along the gradient, scaled so no component exceeds 1/20, under the
/// given restraint; then rescales the set onto the unit circle.
///
/// Returns the new coordinates and leaves the inputs untouched on error.
pub(crate) fn apply_gradient(
    xs: &[f64],
    ys: &[f64],
    gx: &[f64],
    gy: &[f64],
    restraint: RestraintMode,
    mirror_symmetry: bool,
) -> Result<(Vec<f64>, Vec<f64>)> {
    let m = gx
        .iter()
        .chain(gy)
        .map(|g| g.abs())
        .fold(0.0, f64::max);
    if m == 0.0 || !m.is_finite() {
        return Err(FreeVizError::ZeroGradient);
    }
    let step = 1.0 / (20.0 * m);
    let n = xs.len();

    let mut nx = Vec::with_capacity(n);
    let mut ny = Vec::with_capacity(n);
    for k in 0..n {
        let (x, y) = (xs[k], ys[k]);
        let (dx, dy) = (gx[k] * step, gy[k] * step);
        let r = x.hypot(y);
        let (x, y) = match restraint {
            RestraintMode::Free => (x + dx, y + dy),
            RestraintMode::Radial => {
                let (mx, my) = if r > 0.0 {
                    let (tx, ty) = (-y / r, x / r);
                    let t = dx * tx + dy * ty;
                    (x + t * tx, y + t * ty)
                } else {
                    (x + dx, y + dy)
                };
                let len = mx.hypot(my);
                if len > 0.0 {
                    (mx / len, my / len)
                } else {
                    (mx, my)
                }
            }
            RestraintMode::OrderedRadial => {
                let (ux, uy) = if r > 0.0 {
                    (x / r, y / r)
                } else {
                    let angle = 2.0 * PI * k as f64 / n as f64;
                    (angle.cos(), angle.sin())
                };
                let radius = (r + dx * ux + dy * uy).max(0.0);
                (radius * ux, radius * uy)
            }
        };
        nx.push(x);
        ny.push(y);
    }

    let max_r = nx
        .iter()
        .zip(&ny)
        .map(|(x, y)| x * x + y * y)
        .fold(0.0, f64::max)
        .sqrt();
    if max_r == 0.0 || !max_r.is_finite() {
        return Err(FreeVizError::DegenerateAnchors);
    }
    nx.iter_mut().for_each(|x| *x /= max_r);
    ny.iter_mut().for_each(|y| *y /= max_r);

    if mirror_symmetry && restraint != RestraintMode::OrderedRadial {
        canonicalize_mirror(&mut nx, &mut ny);
    }
    Ok((nx, ny))
}
