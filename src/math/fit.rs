//! Small dense fits used by the time-calibration extrapolation and the
//! per-phase pH response curves.

use nalgebra::{Matrix2, Matrix3, Vector2, Vector3};

/// Coefficients `(a, b, c)` of `a·x² + b·x + c` through three points.
///
/// Returns `None` when the abscissae are degenerate (two coincident x
/// values make the Vandermonde matrix singular).
pub fn quadratic_through(points: &[(f64, f64); 3]) -> Option<(f64, f64, f64)> {
    let m = Matrix3::new(
        points[0].0 * points[0].0,
        points[0].0,
        1.0,
        points[1].0 * points[1].0,
        points[1].0,
        1.0,
        points[2].0 * points[2].0,
        points[2].0,
        1.0,
    );
    let y = Vector3::new(points[0].1, points[1].1, points[2].1);
    let solved = m.lu().solve(&y)?;
    Some((solved[0], solved[1], solved[2]))
}

/// Least-squares `(slope, intercept)` over paired samples, via the 2×2
/// normal equations. Returns `None` for fewer than two samples or a
/// singular system (all x equal).
pub fn linear_regression(xs: &[f64], ys: &[f64]) -> Option<(f64, f64)> {
    if xs.len() < 2 || xs.len() != ys.len() {
        return None;
    }
    let n = xs.len() as f64;
    let sx: f64 = xs.iter().sum();
    let sy: f64 = ys.iter().sum();
    let sxx: f64 = xs.iter().map(|x| x * x).sum();
    let sxy: f64 = xs.iter().zip(ys).map(|(x, y)| x * y).sum();

    let m = Matrix2::new(sxx, sx, sx, n);
    let v = Vector2::new(sxy, sy);
    let solved = m.lu().solve(&v)?;
    Some((solved[0], solved[1]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quadratic_recovers_parabola() {
        let (a, b, c) = quadratic_through(&[(0.0, 1.0), (1.0, 4.0), (2.0, 9.0)]).unwrap();
        // x² + 2x + 1
        assert!((a - 1.0).abs() < 1e-9);
        assert!((b - 2.0).abs() < 1e-9);
        assert!((c - 1.0).abs() < 1e-9);
    }

    #[test]
    fn quadratic_rejects_coincident_abscissae() {
        assert!(quadratic_through(&[(1.0, 1.0), (1.0, 2.0), (2.0, 3.0)]).is_none());
    }

    #[test]
    fn regression_recovers_line() {
        let xs = [1.0, 2.0, 3.0, 4.0];
        let ys = [3.0, 5.0, 7.0, 9.0];
        let (slope, intercept) = linear_regression(&xs, &ys).unwrap();
        assert!((slope - 2.0).abs() < 1e-9);
        assert!((intercept - 1.0).abs() < 1e-9);
    }
}
