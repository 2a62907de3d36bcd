//! Area-based match scores.
//!
//! The [`MatchAlgorithm`] trait is the seam between the template
//! matcher's search and the score it optimises. [`MatchAlgorithmKind`]
//! selects an implementation at runtime.

use serde::{Deserialize, Serialize};

/// Selects which match score the template matcher optimises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MatchAlgorithmKind {
    /// Absolute Pearson correlation, `|r|` in `[0, 1]`. Ideal fit is 1.
    #[default]
    MaximumCorrelation,
    /// Mean absolute DN difference. Ideal fit is 0.
    MinimumDifference,
}

/// A score over paired pattern and subsearch pixels.
pub trait MatchAlgorithm {
    /// Score a pattern against an equally sized subsearch. Pairs where
    /// either value is not finite are skipped. `None` when the score is
    /// undefined (too few pairs, or a flat patch for correlation).
    fn score(&self, pattern: &[f64], subsearch: &[f64]) -> Option<f64>;

    /// Score a perfect match would produce.
    fn ideal(&self) -> f64;

    /// Whether `candidate` is at least as close to the ideal as `incumbent`.
    fn better(&self, candidate: f64, incumbent: f64) -> bool {
        (candidate - self.ideal()).abs() <= (incumbent - self.ideal()).abs()
    }

    /// Whether `score` passes the acceptance `tolerance`.
    fn meets_tolerance(&self, score: f64, tolerance: f64) -> bool;
}

impl MatchAlgorithm for MatchAlgorithmKind {
    fn score(&self, pattern: &[f64], subsearch: &[f64]) -> Option<f64> {
        match *self {
            Self::MaximumCorrelation => correlation(pattern, subsearch).map(f64::abs),
            Self::MinimumDifference => mean_absolute_difference(pattern, subsearch),
        }
    }

    fn ideal(&self) -> f64 {
        match *self {
            Self::MaximumCorrelation => 1.0,
            Self::MinimumDifference => 0.0,
        }
    }

    fn meets_tolerance(&self, score: f64, tolerance: f64) -> bool {
        match *self {
            Self::MaximumCorrelation => score >= tolerance,
            Self::MinimumDifference => score <= tolerance,
        }
    }
}

fn valid_pairs<'a>(a: &'a [f64], b: &'a [f64]) -> impl Iterator<Item = (f64, f64)> + 'a {
    a.iter()
        .zip(b)
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .map(|(&x, &y)| (x, y))
}

/// Pearson correlation over valid pairs.
#[allow(clippy::cast_precision_loss)]
fn correlation(a: &[f64], b: &[f64]) -> Option<f64> {
    let (mut n, mut sa, mut sb) = (0usize, 0.0, 0.0);
    for (x, y) in valid_pairs(a, b) {
        n += 1;
        sa += x;
        sb += y;
    }
    if n < 2 {
        return None;
    }
    let (ma, mb) = (sa / n as f64, sb / n as f64);
    let (mut sab, mut saa, mut sbb) = (0.0, 0.0, 0.0);
    for (x, y) in valid_pairs(a, b) {
        let (dx, dy) = (x - ma, y - mb);
        sab = dx.mul_add(dy, sab);
        saa = dx.mul_add(dx, saa);
        sbb = dy.mul_add(dy, sbb);
    }
    let denom = (saa * sbb).sqrt();
    (denom > 0.0).then(|| (sab / denom).clamp(-1.0, 1.0))
}

#[allow(clippy::cast_precision_loss)]
fn mean_absolute_difference(a: &[f64], b: &[f64]) -> Option<f64> {
    let (mut n, mut sum) = (0usize, 0.0);
    for (x, y) in valid_pairs(a, b) {
        n += 1;
        sum += (x - y).abs();
    }
    (n > 0).then(|| sum / n as f64)
}
