/// Rotate so the first non-origin anchor sits on the positive x axis, then mirror across
/// the x axis if the next non-origin anchor ended up below it.
pub(crate) fn canonicalize_mirror(xs: &mut [f64], ys: &mut [f64]) {
    let mut non_origin = xs
        .iter()
        .zip(ys.iter())
        .enumerate()
        .filter(|(_, (x, y))| x.hypot(**y) > 1e-12)
        .map(|(i, _)| i);

    let Some(first) = non_origin.next() else {
        return;
    };
    let second = non_origin.next();

    let angle = ys[first].atan2(xs[first]);
    let (sin, cos) = (-angle).sin_cos();
    for (x, y) in xs.iter_mut().zip(ys.iter_mut()) {
        let (rx, ry) = (*x * cos - *y * sin, *x * sin + *y * cos);
        *x = rx;
        *y = ry;
    }
    ys[first] = 0.0;

    if let Some(second) = second {
        if ys[second] < 0.0 {
            ys.iter_mut().for_each(|y| *y = -*y);
        }
    }
}
