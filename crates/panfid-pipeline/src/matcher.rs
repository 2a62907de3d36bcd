//! Template matching of a pattern chip inside a search chip.
//!
//! [`TemplateMatcher::register`] walks a fixed sequence of checks and
//! searches, and reports where it stopped as a [`MatchResult`]:
//!
//! 1. The pattern must have enough valid pixels and enough contrast
//!    (an extreme pixel at least `min_z_score` standard deviations from
//!    the mean).
//! 2. Both chips are optionally replaced by their Sobel gradient.
//! 3. With a reduction factor above one, a coarse search on block-averaged
//!    chips narrows the full-resolution search to a small window.
//! 4. Every whole-pixel position in the search window is scored; the best
//!    one must meet the tolerance.
//! 5. Optionally, a surface model over the scores around the best pixel
//!    gives a sub-pixel offset.
//!
//! Positions are the search-chip cell under the pattern's tack cell.
//! Reported coordinates are in the parent image.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use nalgebra::{Matrix6, Vector6};
use serde::{Deserialize, Serialize};

use crate::algorithm::{MatchAlgorithm, MatchAlgorithmKind};
use crate::centroid::center_of_mass_weighted;
use crate::chip::{Chip, ChipError, NO_DATA};
use crate::selection::select_from;
use crate::types::Point;

/// Scores this close to the ideal skip sub-pixel refinement.
const IDEAL_EPSILON: f64 = 1e-5;

/// Fraction of the peak-to-edge rise used as the surface threshold.
const SURFACE_EDGE_FRACTION: f64 = 0.2;

/// Errors that make a registration impossible to attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    /// The configuration or the chip sizes cannot work together.
    #[error("invalid match configuration: {0}")]
    InvalidConfig(String),

    /// A chip was addressed outside its bounds.
    #[error(transparent)]
    BadIndex(#[from] ChipError),
}

/// Filter applied to both chips before scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GradientFilter {
    /// Score raw DN values.
    #[default]
    None,
    /// Score Sobel gradient magnitudes.
    Sobel,
}

/// Model fitted to the score surface for sub-pixel refinement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SurfaceModelKind {
    /// Weighted centre of the cells above
    /// `greatest_edge + 0.2 * (peak - greatest_edge)`.
    #[default]
    Centroid,
    /// Stationary point of a least-squares quadratic surface.
    Quadratic,
}

/// Template matcher parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Minimum acceptable score (maximum for difference scores).
    pub tolerance: f64,
    /// Refine whole-pixel matches to sub-pixel.
    pub subpixel_accuracy: bool,
    /// Block size for the coarse search; 1 disables it.
    pub reduction_factor: usize,
    /// Minimum extreme z-score in the pattern.
    pub min_z_score: f64,
    /// Minimum percent of valid pattern pixels.
    pub pattern_valid_percent: f64,
    /// Minimum percent of valid pixels under the pattern at a position.
    pub subsearch_valid_percent: f64,
    /// Side of the square score window used for sub-pixel fitting.
    pub surface_window: usize,
    /// Largest accepted sub-pixel shift, per axis, in search-chip cells.
    pub distance_tolerance: f64,
    /// Filter applied to both chips before scoring.
    pub gradient: GradientFilter,
    /// Score to optimise.
    pub algorithm: MatchAlgorithmKind,
    /// Sub-pixel surface model.
    pub surface_model: SurfaceModelKind,
}

impl MatchConfig {
    /// Default acceptance tolerance.
    pub const DEFAULT_TOLERANCE: f64 = 0.7;
    /// Default for sub-pixel refinement.
    pub const DEFAULT_SUBPIXEL_ACCURACY: bool = true;
    /// Default reduction factor.
    pub const DEFAULT_REDUCTION_FACTOR: usize = 1;
    /// Default minimum z-score.
    pub const DEFAULT_MIN_Z_SCORE: f64 = 1.0;
    /// Default pattern valid percent.
    pub const DEFAULT_PATTERN_VALID_PERCENT: f64 = 50.0;
    /// Default subsearch valid percent.
    pub const DEFAULT_SUBSEARCH_VALID_PERCENT: f64 = 50.0;
    /// Default surface window.
    pub const DEFAULT_SURFACE_WINDOW: usize = 5;
    /// Default distance tolerance.
    pub const DEFAULT_DISTANCE_TOLERANCE: f64 = 1.5;

    /// Check every parameter.
    ///
    /// # Errors
    ///
    /// [`MatchError::InvalidConfig`] naming the first bad parameter.
    pub fn validate(&self) -> Result<(), MatchError> {
        let bad = |msg: String| Err(MatchError::InvalidConfig(msg));
        if self.reduction_factor == 0 {
            return bad("reduction_factor must be at least 1".to_owned());
        }
        if self.surface_window < 3 || self.surface_window % 2 == 0 {
            return bad(format!(
                "surface_window must be odd and at least 3, got {}",
                self.surface_window
            ));
        }
        if self.distance_tolerance <= 0.0 || self.distance_tolerance.is_nan() {
            return bad(format!(
                "distance_tolerance must be positive, got {}",
                self.distance_tolerance
            ));
        }
        for (name, value) in [
            ("pattern_valid_percent", self.pattern_valid_percent),
            ("subsearch_valid_percent", self.subsearch_valid_percent),
        ] {
            if !(value > 0.0 && value <= 100.0) {
                return bad(format!("{name} must be in (0, 100], got {value}"));
            }
        }
        if self.min_z_score <= 0.0 || self.min_z_score.is_nan() {
            return bad(format!(
                "min_z_score must be positive, got {}",
                self.min_z_score
            ));
        }
        let tolerance_ok = match self.algorithm {
            MatchAlgorithmKind::MaximumCorrelation => (0.0..=1.0).contains(&self.tolerance),
            MatchAlgorithmKind::MinimumDifference => self.tolerance >= 0.0,
        };
        if !tolerance_ok {
            return bad(format!(
                "tolerance {} out of range for {:?}",
                self.tolerance, self.algorithm
            ));
        }
        Ok(())
    }
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            tolerance: Self::DEFAULT_TOLERANCE,
            subpixel_accuracy: Self::DEFAULT_SUBPIXEL_ACCURACY,
            reduction_factor: Self::DEFAULT_REDUCTION_FACTOR,
            min_z_score: Self::DEFAULT_MIN_Z_SCORE,
            pattern_valid_percent: Self::DEFAULT_PATTERN_VALID_PERCENT,
            subsearch_valid_percent: Self::DEFAULT_SUBSEARCH_VALID_PERCENT,
            surface_window: Self::DEFAULT_SURFACE_WINDOW,
            distance_tolerance: Self::DEFAULT_DISTANCE_TOLERANCE,
            gradient: GradientFilter::default(),
            algorithm: MatchAlgorithmKind::default(),
            surface_model: SurfaceModelKind::default(),
        }
    }
}

/// A successful registration in parent-image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    /// Parent sample.
    pub sample: f64,
    /// Parent line.
    pub line: f64,
    /// Score at the whole-pixel best match.
    pub score: f64,
}

impl Registration {
    /// Position as a [`Point`].
    #[must_use]
    pub const fn position(&self) -> Point {
        Point::new(self.sample, self.line)
    }
}

/// Outcome of one registration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchResult {
    /// Matched to the nearest pixel.
    SuccessPixel(Registration),
    /// Matched with sub-pixel refinement.
    SuccessSubPixel(Registration),
    /// Too few valid pattern pixels.
    PatternNotEnoughValidData {
        /// Percent of valid pattern pixels.
        valid_percent: f64,
    },
    /// The pattern is too bland to match.
    PatternZScoreNotMet {
        /// Largest absolute z-score found.
        z_score: f64,
    },
    /// No position in the search chip could be scored.
    FitChipNoData,
    /// The best score missed the tolerance.
    FitChipToleranceNotMet {
        /// Best score found.
        score: f64,
    },
    /// Too few scored cells around the best pixel.
    SurfaceModelNotEnoughValidData,
    /// The surface model had no usable extremum.
    SurfaceModelSolutionInvalid,
    /// The sub-pixel shift exceeded the distance tolerance.
    SurfaceModelDistanceInvalid {
        /// Sample shift in search-chip cells.
        sample_offset: f64,
        /// Line shift in search-chip cells.
        line_offset: f64,
    },
}

impl MatchResult {
    /// Data-free status.
    #[must_use]
    pub const fn status(&self) -> MatchStatus {
        match self {
            Self::SuccessPixel(_) => MatchStatus::SuccessPixel,
            Self::SuccessSubPixel(_) => MatchStatus::SuccessSubPixel,
            Self::PatternNotEnoughValidData { .. } => MatchStatus::PatternNotEnoughValidData,
            Self::PatternZScoreNotMet { .. } => MatchStatus::PatternZScoreNotMet,
            Self::FitChipNoData => MatchStatus::FitChipNoData,
            Self::FitChipToleranceNotMet { .. } => MatchStatus::FitChipToleranceNotMet,
            Self::SurfaceModelNotEnoughValidData => MatchStatus::SurfaceModelNotEnoughValidData,
            Self::SurfaceModelSolutionInvalid => MatchStatus::SurfaceModelSolutionInvalid,
            Self::SurfaceModelDistanceInvalid { .. } => MatchStatus::SurfaceModelDistanceInvalid,
        }
    }

    /// The registration, for either success variant.
    #[must_use]
    pub const fn registration(&self) -> Option<Registration> {
        match self {
            Self::SuccessPixel(r) | Self::SuccessSubPixel(r) => Some(*r),
            _ => None,
        }
    }

    /// Whether the match succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.registration().is_some()
    }
}

/// [`MatchResult`] without its data, for counting and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MatchStatus {
    /// See [`MatchResult::SuccessPixel`].
    SuccessPixel,
    /// See [`MatchResult::SuccessSubPixel`].
    SuccessSubPixel,
    /// See [`MatchResult::PatternNotEnoughValidData`].
    PatternNotEnoughValidData,
    /// See [`MatchResult::PatternZScoreNotMet`].
    PatternZScoreNotMet,
    /// See [`MatchResult::FitChipNoData`].
    FitChipNoData,
    /// See [`MatchResult::FitChipToleranceNotMet`].
    FitChipToleranceNotMet,
    /// See [`MatchResult::SurfaceModelNotEnoughValidData`].
    SurfaceModelNotEnoughValidData,
    /// See [`MatchResult::SurfaceModelSolutionInvalid`].
    SurfaceModelSolutionInvalid,
    /// See [`MatchResult::SurfaceModelDistanceInvalid`].
    SurfaceModelDistanceInvalid,
}

impl MatchStatus {
    /// Every status, in report order.
    pub const ALL: [Self; 9] = [
        Self::SuccessPixel,
        Self::SuccessSubPixel,
        Self::PatternNotEnoughValidData,
        Self::PatternZScoreNotMet,
        Self::FitChipNoData,
        Self::FitChipToleranceNotMet,
        Self::SurfaceModelNotEnoughValidData,
        Self::SurfaceModelSolutionInvalid,
        Self::SurfaceModelDistanceInvalid,
    ];

    /// Whether this is a success status.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::SuccessPixel | Self::SuccessSubPixel)
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Per-status registration counters for one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchStatistics {
    /// Registrations attempted.
    pub attempts: usize,
    /// Count per outcome; statuses never seen are absent.
    pub counts: BTreeMap<MatchStatus, usize>,
}

impl MatchStatistics {
    fn record(&mut self, status: MatchStatus) {
        self.attempts += 1;
        *self.counts.entry(status).or_insert(0) += 1;
    }

    /// Times `status` was produced.
    #[must_use]
    pub fn count(&self, status: MatchStatus) -> usize {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    /// Successful registrations of either kind.
    #[must_use]
    pub fn successes(&self) -> usize {
        self.count(MatchStatus::SuccessPixel) + self.count(MatchStatus::SuccessSubPixel)
    }

    /// Human-readable counter table.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = vec![format!(
            "Registrations: {} attempted, {} succeeded",
            self.attempts,
            self.successes()
        )];
        for status in MatchStatus::ALL {
            let n = self.count(status);
            if n > 0 {
                lines.push(format!("  {:<32} {n:>6}", status.to_string()));
            }
        }
        lines.join("\n")
    }
}

/// Inclusive range of search-chip positions.
#[derive(Debug, Clone, Copy)]
struct Bounds {
    s0: usize,
    s1: usize,
    l0: usize,
    l1: usize,
}

impl Bounds {
    /// Every position where the whole pattern lies inside the search chip.
    fn full(pattern: &Chip, search: &Chip) -> Option<Self> {
        let (ts, tl) = pattern.tack_cell();
        let s1 = (search.samples() + ts).checked_sub(pattern.samples())?;
        let l1 = (search.lines() + tl).checked_sub(pattern.lines())?;
        (s1 >= ts && l1 >= tl).then_some(Self {
            s0: ts,
            s1,
            l0: tl,
            l1,
        })
    }

    /// Intersection with a square of half-width `half` around `(s, l)`.
    fn around(self, s: usize, l: usize, half: usize) -> Option<Self> {
        let b = Self {
            s0: self.s0.max(s.saturating_sub(half)),
            s1: self.s1.min(s + half),
            l0: self.l0.max(l.saturating_sub(half)),
            l1: self.l1.min(l + half),
        };
        (b.s0 <= b.s1 && b.l0 <= b.l1).then_some(b)
    }
}

/// Best whole-pixel position and the score surface of one scan.
struct Scan {
    best: Option<(usize, usize, f64)>,
    surface: Chip,
}

/// Template matcher with per-sweep statistics.
#[derive(Debug, Clone)]
pub struct TemplateMatcher {
    config: MatchConfig,
    statistics: MatchStatistics,
}

impl TemplateMatcher {
    /// Create a matcher after validating `config`.
    ///
    /// # Errors
    ///
    /// [`MatchError::InvalidConfig`] for a bad configuration.
    pub fn new(config: MatchConfig) -> Result<Self, MatchError> {
        config.validate()?;
        Ok(Self {
            config,
            statistics: MatchStatistics::default(),
        })
    }

    /// Matcher configuration.
    #[must_use]
    pub const fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Counters accumulated since creation or the last reset.
    #[must_use]
    pub const fn statistics(&self) -> &MatchStatistics {
        &self.statistics
    }

    /// Clear the counters.
    pub fn reset_statistics(&mut self) {
        self.statistics = MatchStatistics::default();
    }

    /// Check that `pattern` survives the configured reduction.
    ///
    /// # Errors
    ///
    /// [`MatchError::InvalidConfig`] when either reduced side would be
    /// shorter than two cells.
    pub fn check_pattern(&self, pattern: &Chip) -> Result<(), MatchError> {
        let r = self.config.reduction_factor;
        if pattern.samples() / r < 2 || pattern.lines() / r < 2 {
            return Err(MatchError::InvalidConfig(format!(
                "pattern chip {}x{} too small for reduction factor {r}",
                pattern.samples(),
                pattern.lines()
            )));
        }
        Ok(())
    }

    /// Check that `search` leaves room around `pattern` for the surface
    /// window.
    ///
    /// # Errors
    ///
    /// [`MatchError::InvalidConfig`] when the search chip is too small.
    pub fn check_search(&self, pattern: &Chip, search: &Chip) -> Result<(), MatchError> {
        let margin = self.config.surface_window / 2 + 1;
        if search.samples() < pattern.samples() + margin || search.lines() < pattern.lines() + margin
        {
            return Err(MatchError::InvalidConfig(format!(
                "search chip {}x{} too small for pattern {}x{} and surface window {}",
                search.samples(),
                search.lines(),
                pattern.samples(),
                pattern.lines(),
                self.config.surface_window
            )));
        }
        Ok(())
    }

    /// Register `pattern` inside `search`.
    ///
    /// # Errors
    ///
    /// [`MatchError::InvalidConfig`] when the chip sizes cannot work with
    /// the configuration. Every image-dependent failure is a
    /// [`MatchResult`] variant instead.
    pub fn register(&mut self, pattern: &Chip, search: &Chip) -> Result<MatchResult, MatchError> {
        self.check_pattern(pattern)?;
        self.check_search(pattern, search)?;
        let result = self.evaluate(pattern, search);
        self.statistics.record(result.status());
        log::debug!(
            "register at ({:.1}, {:.1}): {:?}",
            search.tack().x,
            search.tack().y,
            result
        );
        Ok(result)
    }

    fn evaluate(&self, pattern: &Chip, search: &Chip) -> MatchResult {
        let cfg = &self.config;
        let (lo, hi) = pattern.valid_range();
        let valid_percent = pattern.valid_percent(lo, hi);
        if valid_percent < cfg.pattern_valid_percent {
            return MatchResult::PatternNotEnoughValidData { valid_percent };
        }
        let z_score = pattern
            .statistics()
            .and_then(|s| s.extreme_z_scores())
            .map_or(0.0, |(zmax, zmin)| zmax.abs().max(zmin.abs()));
        if z_score < cfg.min_z_score {
            return MatchResult::PatternZScoreNotMet { z_score };
        }

        let (pattern, search): (Cow<'_, Chip>, Cow<'_, Chip>) = match cfg.gradient {
            GradientFilter::None => (Cow::Borrowed(pattern), Cow::Borrowed(search)),
            GradientFilter::Sobel => (Cow::Owned(pattern.sobel()), Cow::Owned(search.sobel())),
        };

        let Some(full) = Bounds::full(&pattern, &search) else {
            return MatchResult::FitChipNoData;
        };
        let r = cfg.reduction_factor;
        let bounds = if r > 1 {
            let reduced_pattern = pattern.reduce(r);
            let reduced_search = search.reduce(r);
            let coarse = Bounds::full(&reduced_pattern, &reduced_search)
                .and_then(|b| self.scan(&reduced_pattern, &reduced_search, b).best);
            let Some((bs, bl, _)) = coarse else {
                return MatchResult::FitChipNoData;
            };
            let map = |b: usize| (b - 1) * r + (r - 1) / 2 + 1;
            match full.around(map(bs), map(bl), r + cfg.surface_window + 1) {
                Some(b) => b,
                None => return MatchResult::FitChipNoData,
            }
        } else {
            full
        };

        let scan = self.scan(&pattern, &search, bounds);
        let Some((bs, bl, score)) = scan.best else {
            return MatchResult::FitChipNoData;
        };
        let alg = cfg.algorithm;
        if !alg.meets_tolerance(score, cfg.tolerance) {
            return MatchResult::FitChipToleranceNotMet { score };
        }

        let (pts, ptl) = pattern.tack_cell();
        let pc = pattern.center();
        #[allow(clippy::cast_precision_loss)]
        let (ox, oy) = (pc.x - pts as f64, pc.y - ptl as f64);
        #[allow(clippy::cast_precision_loss)]
        let at = |dx: f64, dy: f64| {
            let p = search.chip_to_parent(bs as f64 + dx + ox, bl as f64 + dy + oy);
            Registration {
                sample: p.x,
                line: p.y,
                score,
            }
        };

        if !cfg.subpixel_accuracy || (score - alg.ideal()).abs() < IDEAL_EPSILON {
            return MatchResult::SuccessPixel(at(0.0, 0.0));
        }

        let w = cfg.surface_window;
        let Ok(window) = scan.surface.extract(w, w, bs, bl) else {
            return MatchResult::SurfaceModelNotEnoughValidData;
        };
        let valid = window.as_slice().iter().filter(|v| v.is_finite()).count();
        if valid * 3 <= 2 * w * w {
            return MatchResult::SurfaceModelNotEnoughValidData;
        }
        let Some(window) = peak_up(&window) else {
            return MatchResult::SurfaceModelSolutionInvalid;
        };
        let offset = match cfg.surface_model {
            SurfaceModelKind::Centroid => centroid_offset(&window),
            SurfaceModelKind::Quadratic => quadratic_offset(&window),
        };
        let Some(offset) = offset else {
            return MatchResult::SurfaceModelSolutionInvalid;
        };
        if offset.x.abs() > cfg.distance_tolerance || offset.y.abs() > cfg.distance_tolerance {
            return MatchResult::SurfaceModelDistanceInvalid {
                sample_offset: offset.x,
                line_offset: offset.y,
            };
        }
        MatchResult::SuccessSubPixel(at(offset.x, offset.y))
    }

    /// Score every position in `bounds`, line-major. Ties go to the later
    /// position.
    fn scan(&self, pattern: &Chip, search: &Chip, bounds: Bounds) -> Scan {
        let alg = self.config.algorithm;
        let (pw, ph) = (pattern.samples(), pattern.lines());
        let (pts, ptl) = pattern.tack_cell();
        let pattern_values: Vec<f64> = pattern
            .as_slice()
            .iter()
            .map(|&v| if pattern.is_valid_value(v) { v } else { NO_DATA })
            .collect();
        let mut subsearch = vec![NO_DATA; pw * ph];
        let mut surface = search.same_geometry(NO_DATA);
        let mut best: Option<(usize, usize, f64)> = None;
        #[allow(clippy::cast_precision_loss)]
        let needed = self.config.subsearch_valid_percent / 100.0 * (pw * ph) as f64;

        for l in bounds.l0..=bounds.l1 {
            for s in bounds.s0..=bounds.s1 {
                let mut valid = 0usize;
                for pl in 1..=ph {
                    for ps in 1..=pw {
                        let v = search.at(s + ps - pts, l + pl - ptl);
                        let keep = search.is_valid_value(v);
                        valid += usize::from(keep);
                        subsearch[(pl - 1) * pw + (ps - 1)] = if keep { v } else { NO_DATA };
                    }
                }
                #[allow(clippy::cast_precision_loss)]
                let enough = valid as f64 >= needed;
                if !enough {
                    continue;
                }
                let Some(score) = alg.score(&pattern_values, &subsearch) else {
                    continue;
                };
                surface.put(s, l, score);
                if best.is_none_or(|(_, _, b)| alg.better(score, b)) {
                    best = Some((s, l, score));
                }
            }
        }
        Scan { best, surface }
    }
}

/// Orient a score window so its centre is a peak.
///
/// When the centre is below the greatest edge value (difference scores),
/// every valid value is reflected about the window's mid-range, which
/// keeps weights non-negative.
fn peak_up(window: &Chip) -> Option<Chip> {
    let (ts, tl) = window.tack_cell();
    let centre = window.at(ts, tl);
    if !centre.is_finite() {
        return None;
    }
    let edge = greatest_edge(window)?;
    if centre >= edge {
        return Some(window.clone());
    }
    let (lo, hi) = window
        .as_slice()
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let mut flipped = window.clone();
    for l in 1..=window.lines() {
        for s in 1..=window.samples() {
            let v = window.at(s, l);
            if v.is_finite() {
                flipped.put(s, l, lo + hi - v);
            }
        }
    }
    Some(flipped)
}

/// Largest valid value on the window border.
fn greatest_edge(window: &Chip) -> Option<f64> {
    let (w, h) = (window.samples(), window.lines());
    let mut edge: Option<f64> = None;
    for l in 1..=h {
        for s in 1..=w {
            let border = s == 1 || l == 1 || s == w || l == h;
            let v = window.at(s, l);
            if border && v.is_finite() {
                edge = Some(edge.map_or(v, |e| e.max(v)));
            }
        }
    }
    edge
}

/// Weighted centre of the region above the edge threshold, as an offset
/// from the window centre.
#[allow(clippy::cast_precision_loss)]
fn centroid_offset(window: &Chip) -> Option<Point> {
    let (ts, tl) = window.tack_cell();
    let peak = window.at(ts, tl);
    let edge = greatest_edge(window)?;
    let threshold = SURFACE_EDGE_FRACTION.mul_add(peak - edge, edge);
    let mut region = Chip::default();
    let count = select_from(window, &mut region, (ts, tl), threshold, f64::INFINITY).ok()?;
    if count == 0 {
        return None;
    }
    let com = center_of_mass_weighted(window, &region).ok()?;
    Some(Point::new(com.x - ts as f64, com.y - tl as f64))
}

/// Stationary point of `z = a + bx + cy + dx² + exy + fy²` fitted to the
/// valid cells, as an offset from the window centre. Must be a maximum.
#[allow(clippy::cast_precision_loss)]
fn quadratic_offset(window: &Chip) -> Option<Point> {
    let (ts, tl) = window.tack_cell();
    let mut normal = Matrix6::<f64>::zeros();
    let mut rhs = Vector6::<f64>::zeros();
    for l in 1..=window.lines() {
        for s in 1..=window.samples() {
            let z = window.at(s, l);
            if !z.is_finite() {
                continue;
            }
            let x = s as f64 - ts as f64;
            let y = l as f64 - tl as f64;
            let row = Vector6::new(1.0, x, y, x * x, x * y, y * y);
            normal += row * row.transpose();
            rhs += row * z;
        }
    }
    let coef = normal.cholesky()?.solve(&rhs);
    let (b, c, d, e, f) = (coef[1], coef[2], coef[3], coef[4], coef[5]);
    let det = (4.0 * d).mul_add(f, -e * e);
    if det <= 0.0 || d >= 0.0 || det.is_nan() || d.is_nan() {
        return None;
    }
    let x = e.mul_add(c, -2.0 * f * b) / det;
    let y = e.mul_add(b, -2.0 * d * c) / det;
    (x.is_finite() && y.is_finite()).then_some(Point::new(x, y))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic, clippy::cast_precision_loss)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::source::{PixelType, Raster};

    fn blob_image(cx: f64, cy: f64) -> Raster {
        Raster::from_fn(120, 100, PixelType::F32, |s, l| {
            let d2 = (s as f64 - cx).powi(2) + (l as f64 - cy).powi(2);
            10.0 + 200.0 * (-d2 / 8.0).exp()
        })
    }

    fn chip_at(image: &Raster, size: usize, s: f64, l: f64) -> Chip {
        let mut chip = Chip::new(size, size);
        chip.tack_at(s, l);
        chip.load(image, 1, 1.0);
        chip
    }

    fn matcher(config: MatchConfig) -> TemplateMatcher {
        TemplateMatcher::new(config).unwrap()
    }

    #[test]
    fn default_config_is_valid() {
        assert!(MatchConfig::default().validate().is_ok());
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let cases = [
            MatchConfig {
                surface_window: 4,
                ..MatchConfig::default()
            },
            MatchConfig {
                surface_window: 1,
                ..MatchConfig::default()
            },
            MatchConfig {
                reduction_factor: 0,
                ..MatchConfig::default()
            },
            MatchConfig {
                distance_tolerance: 0.0,
                ..MatchConfig::default()
            },
            MatchConfig {
                tolerance: 1.5,
                ..MatchConfig::default()
            },
            MatchConfig {
                pattern_valid_percent: 0.0,
                ..MatchConfig::default()
            },
            MatchConfig {
                subsearch_valid_percent: 101.0,
                ..MatchConfig::default()
            },
        ];
        for config in cases {
            assert!(
                matches!(config.validate(), Err(MatchError::InvalidConfig(_))),
                "{config:?}"
            );
        }
        let difference = MatchConfig {
            tolerance: 25.0,
            algorithm: MatchAlgorithmKind::MinimumDifference,
            ..MatchConfig::default()
        };
        assert!(difference.validate().is_ok());
    }

    #[test]
    fn pattern_too_small_to_reduce() {
        let mut m = matcher(MatchConfig {
            reduction_factor: 4,
            ..MatchConfig::default()
        });
        let pattern = Chip::new(5, 5);
        let search = Chip::new(40, 40);
        assert!(matches!(
            m.check_pattern(&pattern),
            Err(MatchError::InvalidConfig(_))
        ));
        assert!(m.register(&pattern, &search).is_err());
        assert_eq!(m.statistics().attempts, 0);
    }

    #[test]
    fn search_too_small_for_window() {
        let mut m = matcher(MatchConfig::default());
        let pattern = Chip::filled(15, 15, 1.0);
        let search = Chip::filled(17, 40, 1.0);
        assert!(m.register(&pattern, &search).is_err());
    }

    #[test]
    fn self_match_is_success_pixel_at_tack() {
        let image = blob_image(50.0, 40.0);
        let pattern = chip_at(&image, 15, 50.0, 40.0);
        let search = chip_at(&image, 41, 50.0, 40.0);
        let config = MatchConfig::default();
        let mut m = matcher(config);
        let result = m.register(&pattern, &search).unwrap();
        let MatchResult::SuccessPixel(reg) = result else {
            panic!("unexpected {result:?}");
        };
        assert!(reg.position().distance(Point::new(50.0, 40.0)) <= config.distance_tolerance);
        assert_relative_eq!(reg.sample, 50.0);
        assert_relative_eq!(reg.line, 40.0);
        assert_relative_eq!(reg.score, 1.0, epsilon = 1e-9);
        assert_eq!(m.statistics().count(MatchStatus::SuccessPixel), 1);
    }

    #[test]
    fn finds_offset_pattern() {
        let image = blob_image(60.0, 35.0);
        let template = blob_image(50.0, 40.0);
        let pattern = chip_at(&template, 15, 50.0, 40.0);
        let search = chip_at(&image, 41, 55.0, 40.0);
        let mut m = matcher(MatchConfig::default());
        let reg = m.register(&pattern, &search).unwrap().registration().unwrap();
        assert_relative_eq!(reg.sample, 60.0, epsilon = 1e-9);
        assert_relative_eq!(reg.line, 35.0, epsilon = 1e-9);
    }

    #[test]
    fn even_pattern_reports_its_centre() {
        let image = blob_image(50.5, 40.5);
        let mut pattern = Chip::new(14, 14);
        pattern.tack_on_grid(50.5, 40.5, 1.0);
        pattern.load(&image, 1, 1.0);
        let search = chip_at(&image, 41, 50.0, 40.0);
        let mut m = matcher(MatchConfig::default());
        let reg = m.register(&pattern, &search).unwrap().registration().unwrap();
        assert_relative_eq!(reg.sample, 50.5, epsilon = 1e-9);
        assert_relative_eq!(reg.line, 40.5, epsilon = 1e-9);
    }

    #[test]
    fn reduced_search_agrees_with_full_search() {
        let image = blob_image(62.0, 47.0);
        let template = blob_image(50.0, 40.0);
        let pattern = chip_at(&template, 15, 50.0, 40.0);
        let search = chip_at(&image, 41, 58.0, 44.0);
        let mut m = matcher(MatchConfig {
            reduction_factor: 2,
            ..MatchConfig::default()
        });
        let reg = m.register(&pattern, &search).unwrap().registration().unwrap();
        assert_relative_eq!(reg.sample, 62.0, epsilon = 1e-9);
        assert_relative_eq!(reg.line, 47.0, epsilon = 1e-9);
    }

    #[test]
    fn bland_pattern_fails_z_score() {
        let pattern = Chip::filled(15, 15, 7.0);
        let search = Chip::filled(41, 41, 7.0);
        let mut m = matcher(MatchConfig::default());
        assert!(matches!(
            m.register(&pattern, &search).unwrap(),
            MatchResult::PatternZScoreNotMet { .. }
        ));
    }

    #[test]
    fn sparse_pattern_fails_valid_data() {
        let pattern = Chip::from_fn(15, 15, |s, _| if s <= 3 { s as f64 } else { f64::NAN });
        let search = Chip::filled(41, 41, 7.0);
        let mut m = matcher(MatchConfig::default());
        assert!(matches!(
            m.register(&pattern, &search).unwrap(),
            MatchResult::PatternNotEnoughValidData { .. }
        ));
    }

    #[test]
    fn flat_search_has_no_data() {
        let image = blob_image(50.0, 40.0);
        let pattern = chip_at(&image, 15, 50.0, 40.0);
        let search = Chip::filled(41, 41, 3.0);
        let mut m = matcher(MatchConfig::default());
        assert_eq!(
            m.register(&pattern, &search).unwrap(),
            MatchResult::FitChipNoData
        );
    }

    #[test]
    fn unrelated_search_misses_tolerance() {
        let image = blob_image(50.0, 40.0);
        let pattern = chip_at(&image, 15, 50.0, 40.0);
        // Vertical stripes correlate poorly with a round blob.
        let search = Chip::from_fn(41, 41, |s, _| if s % 2 == 0 { 10.0 } else { 0.0 });
        let mut m = matcher(MatchConfig {
            tolerance: 0.9,
            ..MatchConfig::default()
        });
        assert!(matches!(
            m.register(&pattern, &search).unwrap(),
            MatchResult::FitChipToleranceNotMet { .. }
        ));
    }

    #[test]
    fn subpixel_centroid_moves_toward_true_centre() {
        let image = blob_image(50.3, 40.0);
        let template = blob_image(50.0, 40.0);
        let pattern = chip_at(&template, 15, 50.0, 40.0);
        let search = chip_at(&image, 41, 50.0, 40.0);
        let mut m = matcher(MatchConfig::default());
        let result = m.register(&pattern, &search).unwrap();
        let MatchResult::SuccessSubPixel(reg) = result else {
            panic!("unexpected {result:?}");
        };
        assert!(reg.sample > 50.0 && reg.sample < 50.6, "sample {}", reg.sample);
        assert!((reg.line - 40.0).abs() < 0.05);
    }

    #[test]
    fn subpixel_quadratic_recovers_shift() {
        let image = blob_image(50.3, 40.0);
        let template = blob_image(50.0, 40.0);
        let pattern = chip_at(&template, 15, 50.0, 40.0);
        let search = chip_at(&image, 41, 50.0, 40.0);
        let mut m = matcher(MatchConfig {
            surface_model: SurfaceModelKind::Quadratic,
            ..MatchConfig::default()
        });
        let reg = m.register(&pattern, &search).unwrap().registration().unwrap();
        assert!((reg.sample - 50.3).abs() < 0.15, "sample {}", reg.sample);
        assert!((reg.line - 40.0).abs() < 0.05);
    }

    #[test]
    fn tight_distance_tolerance_rejects_shift() {
        let image = blob_image(50.3, 40.0);
        let template = blob_image(50.0, 40.0);
        let pattern = chip_at(&template, 15, 50.0, 40.0);
        let search = chip_at(&image, 41, 50.0, 40.0);
        let mut m = matcher(MatchConfig {
            distance_tolerance: 0.01,
            ..MatchConfig::default()
        });
        assert!(matches!(
            m.register(&pattern, &search).unwrap(),
            MatchResult::SurfaceModelDistanceInvalid { .. }
        ));
    }

    #[test]
    fn minimum_difference_finds_pattern() {
        let image = blob_image(57.0, 43.0);
        let template = blob_image(50.0, 40.0);
        let pattern = chip_at(&template, 15, 50.0, 40.0);
        let search = chip_at(&image, 41, 55.0, 42.0);
        let mut m = matcher(MatchConfig {
            algorithm: MatchAlgorithmKind::MinimumDifference,
            tolerance: 5.0,
            ..MatchConfig::default()
        });
        let result = m.register(&pattern, &search).unwrap();
        let MatchResult::SuccessPixel(reg) = result else {
            panic!("unexpected {result:?}");
        };
        assert_relative_eq!(reg.sample, 57.0, epsilon = 1e-9);
        assert_relative_eq!(reg.line, 43.0, epsilon = 1e-9);
    }

    #[test]
    fn sobel_filtered_match() {
        let image = blob_image(53.0, 38.0);
        let template = blob_image(50.0, 40.0);
        let pattern = chip_at(&template, 15, 50.0, 40.0);
        let search = chip_at(&image, 41, 50.0, 40.0);
        let mut m = matcher(MatchConfig {
            gradient: GradientFilter::Sobel,
            subpixel_accuracy: false,
            ..MatchConfig::default()
        });
        let reg = m.register(&pattern, &search).unwrap().registration().unwrap();
        assert_relative_eq!(reg.sample, 53.0, epsilon = 1e-9);
        assert_relative_eq!(reg.line, 38.0, epsilon = 1e-9);
    }

    #[test]
    fn statistics_count_each_outcome() {
        let image = blob_image(50.0, 40.0);
        let pattern = chip_at(&image, 15, 50.0, 40.0);
        let search = chip_at(&image, 41, 50.0, 40.0);
        let flat = Chip::filled(41, 41, 3.0);
        let mut m = matcher(MatchConfig::default());
        m.register(&pattern, &search).unwrap();
        m.register(&pattern, &flat).unwrap();
        m.register(&pattern, &flat).unwrap();
        let stats = m.statistics();
        assert_eq!(stats.attempts, 3);
        assert_eq!(stats.successes(), 1);
        assert_eq!(stats.count(MatchStatus::FitChipNoData), 2);
        assert!(stats.report().contains("FitChipNoData"));
        m.reset_statistics();
        assert_eq!(m.statistics().attempts, 0);
    }

    #[test]
    fn peak_up_reflects_valleys() {
        let window = Chip::from_fn(3, 3, |s, l| if (s, l) == (2, 2) { 1.0 } else { 5.0 });
        let up = peak_up(&window).unwrap();
        assert_relative_eq!(up.get(2, 2).unwrap(), 5.0);
        assert_relative_eq!(up.get(1, 1).unwrap(), 1.0);
    }
}
