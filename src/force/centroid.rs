use super::pairwise::ForceField;
use log::debug;
use std::f64::consts::PI;

/// Class-centroid forces: every point is pulled towards a destination derived from its
/// class centroid.
///
/// Centroids repel each other with a 1/r³ weight along the centroid-to-centroid direction.
/// The resulting move vectors are scaled so the longest is 1/2, added to the centroids and
/// then shifted by the vector that would bring the global mean of all points to the origin.
/// Two coinciding centroids fall back to a fixed direction 2πi/C for class i. Classes with
/// no points neither move nor repel.
pub(crate) fn centroid_forces(
    x: &[f64],
    y: &[f64],
    classes: &[usize],
    class_count: usize,
) -> ForceField {
    let n = x.len();
    let mut sums = vec![(0.0, 0.0, 0usize); class_count];
    for ((&px, &py), &c) in x.iter().zip(y).zip(classes) {
        let entry = &mut sums[c];
        entry.0 += px;
        entry.1 += py;
        entry.2 += 1;
    }
    let centroids: Vec<Option<(f64, f64)>> = sums
        .iter()
        .map(|&(sx, sy, count)| (count > 0).then(|| (sx / count as f64, sy / count as f64)))
        .collect();
    if centroids.iter().any(Option::is_none) {
        debug!(
            "Skipping {} classes without projected examples",
            centroids.iter().filter(|c| c.is_none()).count()
        );
    }

    let center_x = -x.iter().sum::<f64>() / n as f64;
    let center_y = -y.iter().sum::<f64>() / n as f64;

    let mut moves = vec![(0.0, 0.0); class_count];
    for (i, ci) in centroids.iter().enumerate() {
        let Some((xi, yi)) = *ci else { continue };
        for (j, cj) in centroids.iter().enumerate() {
            let Some((xj, yj)) = *cj else { continue };
            if i == j {
                continue;
            }
            let r = (xi - xj).hypot(yi - yj);
            if r == 0.0 {
                let angle = 2.0 * PI * i as f64 / class_count as f64;
                moves[i].0 += angle.cos();
                moves[i].1 += angle.sin();
            } else {
                let w = 1.0 / (r * r * r);
                moves[i].0 += w * (xi - xj);
                moves[i].1 += w * (yi - yj);
            }
        }
    }

    let max_length = moves.iter().map(|(mx, my)| mx.hypot(*my)).fold(0.0, f64::max);
    let destinations: Vec<(f64, f64)> = centroids
        .iter()
        .zip(&moves)
        .map(|(c, &(mx, my))| {
            let (cx, cy) = c.unwrap_or((0.0, 0.0));
            let (mx, my) = if max_length > 0.0 {
                (mx / (2.0 * max_length), my / (2.0 * max_length))
            } else {
                (0.0, 0.0)
            };
            (cx + mx + center_x, cy + my + center_y)
        })
        .collect();

    let mut field = ForceField::zeros(n);
    for (k, &c) in classes.iter().enumerate() {
        field.fx[k] = destinations[c].0 - x[k];
        field.fy[k] = destinations[c].1 - y[k];
    }
    field
}
