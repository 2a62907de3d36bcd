//! Ellipse geometry for trimming fiducial selections.
//!
//! An [`Ellipse`] is the set `{ p : (p - c)ᵀ A (p - c) ≤ 1 }` for a
//! symmetric positive-definite `A`. Points are in chip coordinates
//! (`x` = sample, `y` = line).
//!
//! Three solvers feed the trimming loop in [`crate::centroid`]:
//!
//! - [`minimum_bounding_ellipse`]: multiplicative reweighting toward the
//!   minimum-area ellipse enclosing a point set.
//! - [`best_fit_ellipse`]: Gauss-Helmert adjustment of an ellipse to
//!   boundary points, ignoring points farther than `play` pixels from the
//!   current estimate.
//! - [`ellipse_from_five_points`]: the exact conic through five points,
//!   used to draw random candidates.

use std::f64::consts::PI;

use nalgebra::{Matrix5, SMatrix, Vector5};

use crate::chip::Chip;
use crate::selection::is_selected;
use crate::types::Point;

/// Default convergence tolerance for [`minimum_bounding_ellipse`].
pub const BOUNDING_TOLERANCE: f64 = 1e-10;

/// Default iteration cap for [`minimum_bounding_ellipse`].
pub const BOUNDING_MAX_ITERATIONS: usize = 500;

/// Default iteration cap for [`best_fit_ellipse`].
pub const BEST_FIT_MAX_ITERATIONS: usize = 50;

/// Convergence threshold on centre corrections, in pixels.
const CENTER_CONVERGENCE: f64 = 1e-4;

/// Convergence threshold on matrix corrections, relative to the trace.
const MATRIX_CONVERGENCE: f64 = 1e-6;

/// Minimum number of observations for the five-parameter adjustment.
const MIN_OBSERVATIONS: usize = 5;

/// Errors from ellipse construction and fitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EllipseError {
    /// Collinear points or fewer than five distinct points.
    #[error("degenerate point set: collinear or fewer than 5 distinct points")]
    Degenerate,

    /// The conic or matrix does not describe a real ellipse.
    #[error("conic is not a real ellipse")]
    NotAnEllipse,

    /// Too few points lay within `play` of the estimate.
    #[error("only {used} observations within play, need {MIN_OBSERVATIONS}")]
    TooFewObservations {
        /// Observations that survived the play test.
        used: usize,
    },

    /// The normal equations could not be factored.
    #[error("normal equations are singular")]
    Singular,

    /// The adjustment hit its iteration cap.
    #[error("adjustment did not converge in {0} iterations")]
    NotConverged(usize),
}

/// An ellipse with its quadratic form and derived axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipse {
    center: Point,
    matrix: [f64; 3],
    semi_major: f64,
    semi_minor: f64,
    major_axis: Point,
    minor_axis: Point,
}

impl Ellipse {
    /// Build from a centre and the unique entries `[a00, a01, a11]` of `A`.
    ///
    /// # Errors
    ///
    /// Returns [`EllipseError::NotAnEllipse`] unless `A` is finite and
    /// positive definite.
    pub fn from_matrix(center: Point, matrix: [f64; 3]) -> Result<Self, EllipseError> {
        let [a00, a01, a11] = matrix;
        let finite = matrix.iter().all(|v| v.is_finite()) && center.x.is_finite() && center.y.is_finite();
        if !finite || a00 <= 0.0 || a00.mul_add(a11, -a01 * a01) <= 0.0 {
            return Err(EllipseError::NotAnEllipse);
        }
        let half_trace = 0.5 * (a00 + a11);
        let spread = (0.5 * (a00 - a11)).hypot(a01);
        let small = half_trace - spread;
        let large = half_trace + spread;
        if small <= 0.0 {
            return Err(EllipseError::NotAnEllipse);
        }

        // Eigenvector of the small eigenvalue is the major axis.
        let v1 = Point::new(small - a11, a01);
        let v2 = Point::new(a01, small - a00);
        let v = if v1.x.hypot(v1.y) >= v2.x.hypot(v2.y) { v1 } else { v2 };
        let norm = v.x.hypot(v.y);
        let mut major = if norm > 0.0 {
            Point::new(v.x / norm, v.y / norm)
        } else {
            Point::new(1.0, 0.0)
        };
        if major.x < 0.0 || (major.x == 0.0 && major.y < 0.0) {
            major = Point::new(-major.x, -major.y);
        }

        Ok(Self {
            center,
            matrix,
            semi_major: 1.0 / small.sqrt(),
            semi_minor: 1.0 / large.sqrt(),
            major_axis: major,
            minor_axis: Point::new(-major.y, major.x),
        })
    }

    /// Build from centre, semi-axes and the angle of the first axis
    /// (radians, measured from +sample toward +line).
    ///
    /// # Errors
    ///
    /// Returns [`EllipseError::NotAnEllipse`] for non-positive axes.
    pub fn from_center_axes_angle(
        center: Point,
        a: f64,
        b: f64,
        theta: f64,
    ) -> Result<Self, EllipseError> {
        if !(a > 0.0 && b > 0.0) {
            return Err(EllipseError::NotAnEllipse);
        }
        let (sin, cos) = theta.sin_cos();
        let ia = 1.0 / (a * a);
        let ib = 1.0 / (b * b);
        Self::from_matrix(
            center,
            [
                (cos * cos).mul_add(ia, sin * sin * ib),
                cos * sin * (ia - ib),
                (sin * sin).mul_add(ia, cos * cos * ib),
            ],
        )
    }

    /// Build from general conic coefficients
    /// `a x² + b xy + c y² + d x + e y + f = 0`.
    ///
    /// # Errors
    ///
    /// Returns [`EllipseError::NotAnEllipse`] when the conic is a
    /// hyperbola, parabola, imaginary or degenerate ellipse.
    pub fn from_conic(coeffs: [f64; 6]) -> Result<Self, EllipseError> {
        let [a, b, c, d, e, f] = coeffs;
        let disc = b.mul_add(b, -4.0 * a * c);
        if disc >= 0.0 || disc.is_nan() {
            return Err(EllipseError::NotAnEllipse);
        }
        let delta = a.mul_add(c, -b * b / 4.0) * f + b * e * d / 4.0
            - c * d * d / 4.0
            - a * e * e / 4.0;
        let sign = delta * c;
        if sign >= 0.0 || sign.is_nan() {
            return Err(EllipseError::NotAnEllipse);
        }
        let cx = 2.0f64.mul_add(c * d, -b * e) / disc;
        let cy = 2.0f64.mul_add(a * e, -b * d) / disc;
        let k = (a * cx).mul_add(cx, (b * cx).mul_add(cy, c * cy * cy)) - f;
        if k == 0.0 || !k.is_finite() {
            return Err(EllipseError::NotAnEllipse);
        }
        Self::from_matrix(Point::new(cx, cy), [a / k, b / (2.0 * k), c / k])
    }

    /// Centre in chip coordinates.
    #[must_use]
    pub const fn center(&self) -> Point {
        self.center
    }

    /// Unique entries `[a00, a01, a11]` of the quadratic form.
    #[must_use]
    pub const fn matrix(&self) -> [f64; 3] {
        self.matrix
    }

    /// Semi-major axis length.
    #[must_use]
    pub const fn semi_major(&self) -> f64 {
        self.semi_major
    }

    /// Semi-minor axis length.
    #[must_use]
    pub const fn semi_minor(&self) -> f64 {
        self.semi_minor
    }

    /// Unit vector along the major axis.
    #[must_use]
    pub const fn major_axis(&self) -> Point {
        self.major_axis
    }

    /// Unit vector along the minor axis.
    #[must_use]
    pub const fn minor_axis(&self) -> Point {
        self.minor_axis
    }

    /// Area, `π·a·b`.
    #[must_use]
    pub fn area(&self) -> f64 {
        PI * self.semi_major * self.semi_minor
    }

    /// `(p - c)ᵀ A (p - c)`.
    #[must_use]
    pub fn quadratic_form(&self, p: Point) -> f64 {
        let [a00, a01, a11] = self.matrix;
        let dx = p.x - self.center.x;
        let dy = p.y - self.center.y;
        dx.mul_add(a00.mul_add(dx, a01 * dy), dy * a01.mul_add(dx, a11 * dy))
    }

    /// Half-extent of the axis-aligned bounding box.
    #[must_use]
    pub fn half_extent(&self) -> Point {
        let [a00, a01, a11] = self.matrix;
        let det = a00.mul_add(a11, -a01 * a01);
        Point::new((a11 / det).sqrt(), (a00 / det).sqrt())
    }

    /// Whether the ellipse lies inside a `samples x lines` chip, whose
    /// cells cover `[0.5, samples + 0.5] x [0.5, lines + 0.5]`.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn contained_in(&self, samples: usize, lines: usize) -> bool {
        let h = self.half_extent();
        self.center.x - h.x >= 0.5
            && self.center.y - h.y >= 0.5
            && self.center.x + h.x <= samples as f64 + 0.5
            && self.center.y + h.y <= lines as f64 + 0.5
    }

    /// Map an ellipse found in normalised coordinates `u = (p - origin) / scale`
    /// back to the original frame.
    fn denormalize(&self, origin: Point, scale: f64) -> Result<Self, EllipseError> {
        let s2 = scale * scale;
        Self::from_matrix(
            Point::new(
                self.center.x.mul_add(scale, origin.x),
                self.center.y.mul_add(scale, origin.y),
            ),
            self.matrix.map(|v| v / s2),
        )
    }
}

/// Whether `p` lies inside `ellipse` inflated by the relative factor `play`:
/// `(p - c)ᵀ A (p - c) ≤ (1 + play)²`.
#[must_use]
pub fn point_in_ellipse(ellipse: &Ellipse, p: Point, play: f64) -> bool {
    let limit = 1.0 + play;
    ellipse.quadratic_form(p) <= limit * limit
}

/// Number of distinct points, by exact coordinate.
fn distinct_count(points: &[Point]) -> usize {
    let mut keys: Vec<(u64, u64)> = points
        .iter()
        .map(|p| (p.x.to_bits(), p.y.to_bits()))
        .collect();
    keys.sort_unstable();
    keys.dedup();
    keys.len()
}

/// Approximate minimum-area ellipse enclosing `points`.
///
/// Titterington's multiplicative update: weights start uniform, then
/// each point's weight is scaled by its Mahalanobis distance under the
/// weighted covariance, divided by the dimension. Iteration stops when
/// no weight moves by more than `tolerance`. The result is scaled so the
/// farthest point lies on the boundary.
///
/// # Errors
///
/// Returns [`EllipseError::Degenerate`] for fewer than five distinct
/// points or a collinear set.
pub fn minimum_bounding_ellipse(
    points: &[Point],
    tolerance: f64,
    max_iterations: usize,
) -> Result<Ellipse, EllipseError> {
    if distinct_count(points) < 5 {
        return Err(EllipseError::Degenerate);
    }
    #[allow(clippy::cast_precision_loss)]
    let mut weights = vec![1.0 / points.len() as f64; points.len()];
    let mut distances = vec![0.0; points.len()];

    for _ in 0..max_iterations {
        let (center, inverse) = weighted_inverse_covariance(points, &weights)?;
        let mut delta = 0.0f64;
        for ((w, d), p) in weights.iter_mut().zip(distances.iter_mut()).zip(points) {
            *d = quad(inverse, center, *p);
            let next = *w * *d / 2.0;
            delta = delta.max((next - *w).abs());
            *w = next;
        }
        if delta <= tolerance {
            break;
        }
    }

    let (center, inverse) = weighted_inverse_covariance(points, &weights)?;
    let farthest = points
        .iter()
        .map(|p| quad(inverse, center, *p))
        .fold(0.0f64, f64::max);
    if farthest <= 0.0 || farthest.is_nan() {
        return Err(EllipseError::Degenerate);
    }
    Ellipse::from_matrix(center, inverse.map(|v| v / farthest))
}

/// Weighted mean and inverse weighted covariance `[a00, a01, a11]`.
fn weighted_inverse_covariance(
    points: &[Point],
    weights: &[f64],
) -> Result<(Point, [f64; 3]), EllipseError> {
    let total: f64 = weights.iter().sum();
    let (mut cx, mut cy) = (0.0, 0.0);
    for (p, w) in points.iter().zip(weights) {
        cx = w.mul_add(p.x, cx);
        cy = w.mul_add(p.y, cy);
    }
    cx /= total;
    cy /= total;
    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    for (p, w) in points.iter().zip(weights) {
        let dx = p.x - cx;
        let dy = p.y - cy;
        sxx = (w * dx).mul_add(dx, sxx);
        sxy = (w * dx).mul_add(dy, sxy);
        syy = (w * dy).mul_add(dy, syy);
    }
    sxx /= total;
    sxy /= total;
    syy /= total;
    let det = sxx.mul_add(syy, -sxy * sxy);
    if !det.is_finite() || det <= 1e-12 * sxx * syy {
        return Err(EllipseError::Degenerate);
    }
    Ok((Point::new(cx, cy), [syy / det, -sxy / det, sxx / det]))
}

fn quad(m: [f64; 3], c: Point, p: Point) -> f64 {
    let dx = p.x - c.x;
    let dy = p.y - c.y;
    dx.mul_add(m[0].mul_add(dx, m[1] * dy), dy * m[1].mul_add(dx, m[2] * dy))
}

/// Refine `initial` to the boundary points by Gauss-Helmert adjustment.
///
/// Unknowns are `(a00, a01, a11, cx, cy)`. Each iteration linearises
/// `F(p) = (p - c)ᵀ A (p - c) - 1` at every point, weights it by the
/// inverse squared gradient norm, and skips points whose first-order
/// distance `|F| / |∇F|` exceeds `play` pixels.
///
/// # Errors
///
/// - [`EllipseError::TooFewObservations`] when fewer than five points
///   lie within `play`.
/// - [`EllipseError::Singular`] when the normal matrix is not positive
///   definite.
/// - [`EllipseError::NotAnEllipse`] when an update leaves the ellipse set.
/// - [`EllipseError::NotConverged`] after `max_iterations`.
pub fn best_fit_ellipse(
    initial: &Ellipse,
    points: &[Point],
    play: f64,
    max_iterations: usize,
) -> Result<Ellipse, EllipseError> {
    let [mut a0, mut a1, mut a2] = initial.matrix;
    let (mut cx, mut cy) = (initial.center.x, initial.center.y);

    for _ in 0..max_iterations {
        let mut normal = Matrix5::<f64>::zeros();
        let mut rhs = Vector5::<f64>::zeros();
        let mut used = 0usize;
        for p in points {
            let dx = p.x - cx;
            let dy = p.y - cy;
            let f = dx.mul_add(a0.mul_add(dx, a1 * dy), dy * a1.mul_add(dx, a2 * dy)) - 1.0;
            let b0 = 2.0 * a0.mul_add(dx, a1 * dy);
            let b1 = 2.0 * a1.mul_add(dx, a2 * dy);
            let gradient_sq = b0.mul_add(b0, b1 * b1);
            if gradient_sq <= 0.0 || gradient_sq.is_nan() {
                continue;
            }
            let weight = 1.0 / gradient_sq;
            let misclosure = -f;
            if (misclosure * weight.sqrt()).abs() > play {
                continue;
            }
            let a = Vector5::new(dx * dx, 2.0 * dx * dy, dy * dy, -b0, -b1);
            normal += a * a.transpose() * weight;
            rhs += a * (weight * misclosure);
            used += 1;
        }
        if used < MIN_OBSERVATIONS {
            return Err(EllipseError::TooFewObservations { used });
        }
        let delta = normal
            .cholesky()
            .ok_or(EllipseError::Singular)?
            .solve(&rhs);
        a0 += delta[0];
        a1 += delta[1];
        a2 += delta[2];
        cx += delta[3];
        cy += delta[4];

        let current = Ellipse::from_matrix(Point::new(cx, cy), [a0, a1, a2])?;
        let trace = a0.abs() + a2.abs();
        let matrix_done = delta.iter().take(3).all(|d| d.abs() <= MATRIX_CONVERGENCE * trace);
        let center_done = delta[3].abs() <= CENTER_CONVERGENCE && delta[4].abs() <= CENTER_CONVERGENCE;
        if matrix_done && center_done {
            return Ok(current);
        }
    }
    Err(EllipseError::NotConverged(max_iterations))
}

/// The conic through five points, if it is an ellipse.
///
/// Points are centred and scaled to unit RMS radius before solving, and
/// the conic is the null vector of the 5x6 design matrix
/// `[x², xy, y², x, y, 1]` (smallest eigenvector of its normal matrix).
///
/// # Errors
///
/// - [`EllipseError::Degenerate`] for repeated or collinear points, or
///   when the five points do not determine a unique conic.
/// - [`EllipseError::NotAnEllipse`] when the unique conic is not an ellipse.
pub fn ellipse_from_five_points(points: &[Point; 5]) -> Result<Ellipse, EllipseError> {
    if distinct_count(points) < 5 {
        return Err(EllipseError::Degenerate);
    }
    let mx = points.iter().map(|p| p.x).sum::<f64>() / 5.0;
    let my = points.iter().map(|p| p.y).sum::<f64>() / 5.0;
    let rms = (points
        .iter()
        .map(|p| (p.x - mx).mul_add(p.x - mx, (p.y - my) * (p.y - my)))
        .sum::<f64>()
        / 5.0)
        .sqrt();
    if rms <= 0.0 || rms.is_nan() {
        return Err(EllipseError::Degenerate);
    }
    let design = SMatrix::<f64, 5, 6>::from_fn(|r, c| {
        let u = (points[r].x - mx) / rms;
        let v = (points[r].y - my) / rms;
        match c {
            0 => u * u,
            1 => u * v,
            2 => v * v,
            3 => u,
            4 => v,
            _ => 1.0,
        }
    });
    let eigen = (design.transpose() * design).symmetric_eigen();
    let mut order: Vec<usize> = (0..6).collect();
    order.sort_by(|&i, &j| eigen.eigenvalues[i].total_cmp(&eigen.eigenvalues[j]));
    let largest = eigen.eigenvalues[order[5]];
    if eigen.eigenvalues[order[1]] <= 1e-10 * largest {
        return Err(EllipseError::Degenerate);
    }
    let null = eigen.eigenvectors.column(order[0]);
    let normalized = Ellipse::from_conic([null[0], null[1], null[2], null[3], null[4], null[5]])?;
    normalized.denormalize(Point::new(mx, my), rms)
}

/// Boundary cells of a selection: selected cells with at least one
/// unselected or off-chip 4-neighbour. Returned in line-major order as
/// chip coordinates.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn edge_points_of_selection(selection: &Chip) -> Vec<Point> {
    let (samples, lines) = (selection.samples(), selection.lines());
    let selected = |s: usize, l: usize| is_selected(selection.at(s, l));
    let mut edges = Vec::new();
    for l in 1..=lines {
        for s in 1..=samples {
            if !selected(s, l) {
                continue;
            }
            let interior = s > 1
                && l > 1
                && s < samples
                && l < lines
                && selected(s - 1, l)
                && selected(s + 1, l)
                && selected(s, l - 1)
                && selected(s, l + 1);
            if !interior {
                edges.push(Point::new(s as f64, l as f64));
            }
        }
    }
    edges
}

/// How a selection sits relative to an ellipse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coverage {
    /// Chip cells whose centre is inside the ellipse.
    pub interior: usize,
    /// Interior cells that are selected.
    pub interior_selected: usize,
    /// Selected cells anywhere in the chip.
    pub selected: usize,
}

impl Coverage {
    /// Percentage of the ellipse interior that is selected.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn percent_selected(&self) -> f64 {
        if self.interior == 0 {
            return 0.0;
        }
        self.interior_selected as f64 / self.interior as f64 * 100.0
    }

    /// Percentage of the selection lying outside the ellipse.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn percent_outside(&self) -> f64 {
        if self.selected == 0 {
            return 0.0;
        }
        (self.selected - self.interior_selected) as f64 / self.selected as f64 * 100.0
    }
}

/// Measure `ellipse` against a selection chip. `selected` is the
/// selection's total count, passed in so repeated candidates only scan
/// the ellipse's bounding box.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
#[must_use]
pub fn coverage(ellipse: &Ellipse, selection: &Chip, selected: usize) -> Coverage {
    let h = ellipse.half_extent();
    let c = ellipse.center();
    let clamp = |v: f64, n: usize| v.max(1.0).min(n as f64) as usize;
    let s0 = clamp((c.x - h.x).floor(), selection.samples());
    let s1 = clamp((c.x + h.x).ceil(), selection.samples());
    let l0 = clamp((c.y - h.y).floor(), selection.lines());
    let l1 = clamp((c.y + h.y).ceil(), selection.lines());
    let mut result = Coverage {
        interior: 0,
        interior_selected: 0,
        selected,
    };
    if selection.area() == 0 {
        return result;
    }
    for l in l0..=l1 {
        for s in s0..=s1 {
            if point_in_ellipse(ellipse, Point::new(s as f64, l as f64), 0.0) {
                result.interior += 1;
                if is_selected(selection.at(s, l)) {
                    result.interior_selected += 1;
                }
            }
        }
    }
    result
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::cast_precision_loss)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::selection::SELECTED;

    fn points_on(e: &Ellipse, n: usize) -> Vec<Point> {
        let c = e.center();
        let (ma, mi) = (e.major_axis(), e.minor_axis());
        (0..n)
            .map(|i| {
                let t = 2.0 * PI * i as f64 / n as f64;
                let (u, v) = (e.semi_major() * t.cos(), e.semi_minor() * t.sin());
                Point::new(c.x + u * ma.x + v * mi.x, c.y + u * ma.y + v * mi.y)
            })
            .collect()
    }

    fn disk_selection(size: usize, cx: f64, cy: f64, r: f64) -> Chip {
        Chip::from_fn(size, size, |s, l| {
            let dx = s as f64 - cx;
            let dy = l as f64 - cy;
            if dx.hypot(dy) <= r { SELECTED } else { 0.0 }
        })
    }

    #[test]
    fn center_axes_angle_contains_center_and_vertex() {
        for &(a, b, theta) in &[(10.0, 4.0, 0.3), (5.0, 5.0, 0.0), (7.0, 2.0, -1.2)] {
            let c = Point::new(12.0, -3.5);
            let e = Ellipse::from_center_axes_angle(c, a, b, theta).unwrap();
            assert!(point_in_ellipse(&e, c, 0.0));
            let m = e.major_axis();
            let vertex = Point::new(c.x + a * m.x, c.y + a * m.y);
            assert!(point_in_ellipse(&e, vertex, 1e-6));
            let beyond = Point::new(c.x + 1.01 * a * m.x, c.y + 1.01 * a * m.y);
            assert!(!point_in_ellipse(&e, beyond, 0.0));
        }
    }

    #[test]
    fn axes_and_area() {
        let e = Ellipse::from_center_axes_angle(Point::new(0.0, 0.0), 6.0, 2.0, 0.5).unwrap();
        assert_relative_eq!(e.semi_major(), 6.0, epsilon = 1e-9);
        assert_relative_eq!(e.semi_minor(), 2.0, epsilon = 1e-9);
        assert_relative_eq!(e.area(), 12.0 * PI, epsilon = 1e-9);
        let m = e.major_axis();
        assert_relative_eq!(m.y.atan2(m.x), 0.5, epsilon = 1e-9);
        assert!(e.semi_major() >= e.semi_minor());
    }

    #[test]
    fn matrix_must_be_positive_definite() {
        let c = Point::new(0.0, 0.0);
        assert_eq!(
            Ellipse::from_matrix(c, [1.0, 2.0, 1.0]),
            Err(EllipseError::NotAnEllipse)
        );
        assert_eq!(
            Ellipse::from_matrix(c, [-1.0, 0.0, -1.0]),
            Err(EllipseError::NotAnEllipse)
        );
        assert!(Ellipse::from_center_axes_angle(c, 0.0, 1.0, 0.0).is_err());
    }

    #[test]
    fn conic_of_unit_circle() {
        let e = Ellipse::from_conic([1.0, 0.0, 1.0, -4.0, -6.0, 12.0]).unwrap();
        // (x - 2)² + (y - 3)² = 1
        assert_relative_eq!(e.center().x, 2.0, epsilon = 1e-12);
        assert_relative_eq!(e.center().y, 3.0, epsilon = 1e-12);
        assert_relative_eq!(e.semi_major(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn conic_rejects_hyperbola_and_imaginary() {
        assert!(Ellipse::from_conic([1.0, 0.0, -1.0, 0.0, 0.0, -1.0]).is_err());
        assert!(Ellipse::from_conic([1.0, 0.0, 1.0, 0.0, 0.0, 1.0]).is_err());
    }

    #[test]
    fn five_points_recover_ellipse() {
        let truth =
            Ellipse::from_center_axes_angle(Point::new(40.0, 25.0), 9.0, 5.0, 0.7).unwrap();
        let pts = points_on(&truth, 5);
        let e = ellipse_from_five_points(&[pts[0], pts[1], pts[2], pts[3], pts[4]]).unwrap();
        assert_relative_eq!(e.center().x, 40.0, epsilon = 1e-6);
        assert_relative_eq!(e.center().y, 25.0, epsilon = 1e-6);
        assert_relative_eq!(e.semi_major(), 9.0, epsilon = 1e-6);
        assert_relative_eq!(e.semi_minor(), 5.0, epsilon = 1e-6);
    }

    #[test]
    fn five_collinear_points_are_degenerate() {
        let pts = [0.0, 1.0, 2.0, 3.0, 4.0].map(|t| Point::new(t, 2.0 * t + 1.0));
        assert_eq!(ellipse_from_five_points(&pts), Err(EllipseError::Degenerate));
        let repeated = [Point::new(1.0, 1.0); 5];
        assert_eq!(
            ellipse_from_five_points(&repeated),
            Err(EllipseError::Degenerate)
        );
    }

    #[test]
    fn bounding_ellipse_encloses_all_points() {
        let truth =
            Ellipse::from_center_axes_angle(Point::new(20.0, 20.0), 8.0, 3.0, 0.4).unwrap();
        let mut pts = points_on(&truth, 24);
        pts.push(Point::new(20.0, 20.0));
        pts.push(Point::new(22.0, 21.0));
        let e = minimum_bounding_ellipse(&pts, BOUNDING_TOLERANCE, BOUNDING_MAX_ITERATIONS)
            .unwrap();
        for p in &pts {
            assert!(point_in_ellipse(&e, *p, 1e-9));
        }
        assert_relative_eq!(e.center().x, 20.0, epsilon = 0.05);
        assert_relative_eq!(e.center().y, 20.0, epsilon = 0.05);
        assert!(e.area() < truth.area() * 1.05);
    }

    #[test]
    fn bounding_ellipse_rejects_degenerate_sets() {
        let line: Vec<Point> = (0..10).map(|i| Point::new(f64::from(i), 3.0)).collect();
        assert_eq!(
            minimum_bounding_ellipse(&line, BOUNDING_TOLERANCE, BOUNDING_MAX_ITERATIONS),
            Err(EllipseError::Degenerate)
        );
        let few = [Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(0.0, 1.0)];
        assert_eq!(
            minimum_bounding_ellipse(&few, BOUNDING_TOLERANCE, BOUNDING_MAX_ITERATIONS),
            Err(EllipseError::Degenerate)
        );
    }

    #[test]
    fn best_fit_converges_from_rough_start() {
        let truth =
            Ellipse::from_center_axes_angle(Point::new(30.0, 30.0), 10.0, 6.0, 0.3).unwrap();
        let pts = points_on(&truth, 40);
        let start = Ellipse::from_center_axes_angle(Point::new(30.8, 29.5), 9.0, 7.0, 0.0).unwrap();
        let fit = best_fit_ellipse(&start, &pts, 5.0, BEST_FIT_MAX_ITERATIONS).unwrap();
        assert_relative_eq!(fit.center().x, 30.0, epsilon = 1e-4);
        assert_relative_eq!(fit.center().y, 30.0, epsilon = 1e-4);
        assert_relative_eq!(fit.semi_major(), 10.0, epsilon = 1e-4);
        assert_relative_eq!(fit.semi_minor(), 6.0, epsilon = 1e-4);
    }

    #[test]
    fn best_fit_ignores_outliers_beyond_play() {
        let truth = Ellipse::from_center_axes_angle(Point::new(30.0, 30.0), 8.0, 8.0, 0.0).unwrap();
        let mut pts = points_on(&truth, 36);
        pts.push(Point::new(55.0, 30.0));
        pts.push(Point::new(30.0, 2.0));
        let fit = best_fit_ellipse(&truth, &pts, 1.0, BEST_FIT_MAX_ITERATIONS).unwrap();
        assert_relative_eq!(fit.center().x, 30.0, epsilon = 1e-4);
        assert_relative_eq!(fit.semi_major(), 8.0, epsilon = 1e-4);
    }

    #[test]
    fn best_fit_needs_five_observations() {
        let truth = Ellipse::from_center_axes_angle(Point::new(0.0, 0.0), 5.0, 5.0, 0.0).unwrap();
        let pts = points_on(&truth, 4);
        assert_eq!(
            best_fit_ellipse(&truth, &pts, 1.0, BEST_FIT_MAX_ITERATIONS),
            Err(EllipseError::TooFewObservations { used: 4 })
        );
    }

    #[test]
    fn edge_points_trace_the_boundary() {
        let sel = disk_selection(21, 11.0, 11.0, 5.0);
        let edges = edge_points_of_selection(&sel);
        assert!(!edges.is_empty());
        for p in &edges {
            let d = (p.x - 11.0).hypot(p.y - 11.0);
            assert!(d > 3.5 && d <= 5.0, "edge point {p:?} at distance {d}");
        }
        assert!(!edges.contains(&Point::new(11.0, 11.0)));
    }

    #[test]
    fn edge_points_include_chip_border() {
        let sel = Chip::filled(3, 3, SELECTED);
        assert_eq!(edge_points_of_selection(&sel).len(), 8);
    }

    #[test]
    fn coverage_of_matching_disk() {
        let sel = disk_selection(31, 16.0, 16.0, 6.0);
        let total = crate::selection::selected_count(&sel);
        let e = Ellipse::from_center_axes_angle(Point::new(16.0, 16.0), 6.0, 6.0, 0.0).unwrap();
        let cov = coverage(&e, &sel, total);
        assert_relative_eq!(cov.percent_selected(), 100.0);
        assert_relative_eq!(cov.percent_outside(), 0.0);
        let small = Ellipse::from_center_axes_angle(Point::new(16.0, 16.0), 3.0, 3.0, 0.0).unwrap();
        assert!(coverage(&small, &sel, total).percent_outside() > 50.0);
    }

    #[test]
    fn containment_in_chip() {
        let e = Ellipse::from_center_axes_angle(Point::new(10.0, 10.0), 5.0, 2.0, 0.0).unwrap();
        assert!(e.contained_in(20, 20));
        assert!(!e.contained_in(14, 20));
    }
}
