//! Circular statistics for angles in radians.

use std::f64::consts::TAU;

/// Mean resultant of the non-NaN angles: `(mean sin, mean cos)`.
fn mean_resultant<I: IntoIterator<Item = f64>>(angles: I) -> Option<(f64, f64)> {
    let mut sin_sum = 0.0;
    let mut cos_sum = 0.0;
    let mut count = 0usize;

    for angle in angles.into_iter().filter(|a| !a.is_nan()) {
        sin_sum += angle.sin();
        cos_sum += angle.cos();
        count += 1;
    }

    if count == 0 {
        None
    } else {
        Some((sin_sum / count as f64, cos_sum / count as f64))
    }
}

/// Circular mean in `[0, 2π)`, NaN when no angle is valid.
pub fn circular_mean<I: IntoIterator<Item = f64>>(angles: I) -> f64 {
    match mean_resultant(angles) {
        Some((s, c)) => s.atan2(c).rem_euclid(TAU),
        None => f64::NAN,
    }
}

/// Circular standard deviation `sqrt(-2 ln R)`, NaN when no angle is valid.
pub fn circular_std<I: IntoIterator<Item = f64>>(angles: I) -> f64 {
    match mean_resultant(angles) {
        Some((s, c)) => {
            let r = s.hypot(c).min(1.0);
            (-2.0 * r.ln()).sqrt()
        }
        None => f64::NAN,
    }
}
