//! Sub-pixel centring of a bright mark inside an input chip.
//!
//! A [`Centroid`] runs three steps over a chip whose tack sits on or near
//! a fiducial:
//!
//! 1. [`select_adaptive`](Centroid::select_adaptive): flood fill from the
//!    seed over a DN window chosen so the selected coverage lands close to
//!    a target percentage.
//! 2. [`elliptical_reduction`](Centroid::elliptical_reduction): fit the
//!    largest ellipse that the selection fills, then drop selected cells
//!    outside it (scratches and neighbouring marks attached to the disk).
//! 3. [`center_of_mass`]: the mean position of what is left.
//!
//! How the DN window grows is the one place the mission variants differ,
//! so it is a strategy: [`AdaptiveWindow`], implemented by
//! [`CentroidKind`].

use rand::SeedableRng;
use rand::seq::index;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::chip::Chip;
use crate::ellipse::{
    BEST_FIT_MAX_ITERATIONS, BOUNDING_MAX_ITERATIONS, BOUNDING_TOLERANCE, Ellipse,
    best_fit_ellipse, coverage, edge_points_of_selection, ellipse_from_five_points,
    minimum_bounding_ellipse, point_in_ellipse,
};
use crate::selection::{UNSELECTED, is_selected, select_from, selected_count};
use crate::types::Point;

/// Largest share of the selection an acceptable ellipse may leave outside.
const MAX_OUTSIDE_PERCENT: f64 = 33.0;

/// An acceptable candidate must beat the incumbent by this much area.
const MIN_AREA_GAIN: f64 = 1.0;

/// Errors from centring. Each one turns the fiducial into a Missing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CentroidError {
    /// No connected in-range region through the seed.
    #[error("empty selection: no in-range region through the seed")]
    EmptySelection,

    /// No acceptable ellipse could be fitted to the selection.
    #[error("degenerate ellipse: selection could not be trimmed")]
    DegenerateEllipse,

    /// Weighted centring over cells whose weights sum to zero.
    #[error("selected cells carry no weight")]
    ZeroWeight,
}

/// Selects how the adaptive DN window grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CentroidKind {
    /// Symmetric window around the seed value.
    Generic,
    /// Bright target on a dark background: `[t, max]` with `t` lowered
    /// from the seed value toward the DN floor.
    #[default]
    ApolloPan,
}

/// Strategy for the candidate DN windows tried by adaptive selection.
pub trait AdaptiveWindow {
    /// Windows to try for a seed value, narrowest first. `floor` and
    /// `ceiling` bound every window.
    fn windows(&self, seed: f64, floor: f64, ceiling: f64, steps: usize) -> Vec<(f64, f64)>;
}

impl AdaptiveWindow for CentroidKind {
    #[allow(clippy::cast_precision_loss)]
    fn windows(&self, seed: f64, floor: f64, ceiling: f64, steps: usize) -> Vec<(f64, f64)> {
        let steps = steps.max(1);
        (1..=steps)
            .map(|k| {
                let f = k as f64 / steps as f64;
                match *self {
                    Self::Generic => {
                        let reach = (seed - floor).max(ceiling - seed) * f;
                        ((seed - reach).max(floor), (seed + reach).min(ceiling))
                    }
                    Self::ApolloPan => ((seed - floor).mul_add(-f, seed), ceiling),
                }
            })
            .collect()
    }
}

/// Tuning for adaptive selection and elliptical trimming.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CentroidParams {
    /// Coverage (percent of the chip) the adaptive selection aims for.
    pub target_selection_percent: f64,
    /// Number of windows tried by the adaptive selection.
    pub adaptive_steps: usize,
    /// Minimum percent of an ellipse's interior that must be selected.
    pub percent_selected: f64,
    /// Trim tolerance in pixels.
    pub play: f64,
    /// Consecutive non-improving random candidates before giving up.
    pub patience_limit: usize,
    /// Maximum fit-and-trim rounds.
    pub max_trim_rounds: usize,
    /// Seed for the candidate sampler.
    pub ransac_seed: u64,
    /// How far, in cells, the fill seed may move from the tack cell when
    /// the tack cell itself is out of range.
    pub seed_radius: f64,
}

impl Default for CentroidParams {
    fn default() -> Self {
        Self {
            target_selection_percent: 2.0,
            adaptive_steps: 20,
            percent_selected: 95.0,
            play: 1.5,
            patience_limit: 2000,
            max_trim_rounds: 8,
            ransac_seed: 0,
            seed_radius: 5.0,
        }
    }
}

/// Outcome of an adaptive selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selection {
    /// DN window that produced the selection.
    pub window: (f64, f64),
    /// Selected cells.
    pub count: usize,
    /// Percent of the chip selected.
    pub coverage: f64,
    /// Cell the fill started from.
    pub seed: (usize, usize),
}

/// Result of a full [`Centroid::refine`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Refinement {
    /// Centre of mass in chip coordinates.
    pub chip_position: Point,
    /// Centre of mass in parent-image coordinates.
    pub position: Point,
    /// The adaptive selection before trimming.
    pub selection: Selection,
    /// Cells left after trimming.
    pub trimmed_count: usize,
    /// Ellipse of the last trimming round.
    pub ellipse: Ellipse,
}

/// Adaptive selection, trimming and centring over one input chip.
#[derive(Debug, Clone)]
pub struct Centroid {
    kind: CentroidKind,
    params: CentroidParams,
    min_dn: f64,
    max_dn: f64,
}

impl Centroid {
    /// A centroid with an unbounded DN range.
    #[must_use]
    pub const fn new(kind: CentroidKind, params: CentroidParams) -> Self {
        Self {
            kind,
            params,
            min_dn: f64::NEG_INFINITY,
            max_dn: f64::INFINITY,
        }
    }

    /// Restrict the DN range the selector may accept.
    pub const fn set_dn_range(&mut self, min: f64, max: f64) {
        self.min_dn = min;
        self.max_dn = max;
    }

    /// Configured DN range.
    #[must_use]
    pub const fn dn_range(&self) -> (f64, f64) {
        (self.min_dn, self.max_dn)
    }

    /// Variant in use.
    #[must_use]
    pub const fn kind(&self) -> CentroidKind {
        self.kind
    }

    /// Nearest cell to the tack cell whose value lies in `[lo, hi]`,
    /// no further than `seed_radius` cells away.
    ///
    /// Ties go to the brighter cell, then to scan order.
    #[allow(clippy::cast_precision_loss)]
    fn seed_cell(&self, input: &Chip, lo: f64, hi: f64) -> Option<(usize, usize)> {
        let (ts, tl) = input.tack_cell();
        let in_range = |v: f64| v.is_finite() && v >= lo && v <= hi;
        if input.area() > 0 && in_range(input.at(ts, tl)) {
            return Some((ts, tl));
        }
        let radius = self.params.seed_radius;
        let mut best: Option<((usize, usize), usize, f64)> = None;
        for l in 1..=input.lines() {
            for s in 1..=input.samples() {
                let v = input.at(s, l);
                if !in_range(v) {
                    continue;
                }
                let d = s.abs_diff(ts).pow(2) + l.abs_diff(tl).pow(2);
                if d as f64 > radius * radius {
                    continue;
                }
                let better = best.is_none_or(|(_, bd, bv)| d < bd || (d == bd && v > bv));
                if better {
                    best = Some(((s, l), d, v));
                }
            }
        }
        best.map(|(cell, _, _)| cell)
    }

    /// Flood fill over the configured DN range.
    ///
    /// # Errors
    ///
    /// [`CentroidError::EmptySelection`] when no in-range cell exists.
    pub fn select_fixed(&self, input: &Chip, output: &mut Chip) -> Result<usize, CentroidError> {
        let seed =
            self.seed_cell(input, self.min_dn, self.max_dn).ok_or(CentroidError::EmptySelection)?;
        let count = select_from(input, output, seed, self.min_dn, self.max_dn)
            .map_err(|_| CentroidError::EmptySelection)?;
        if count == 0 {
            return Err(CentroidError::EmptySelection);
        }
        Ok(count)
    }

    /// Flood fill over the DN window whose coverage is closest to the
    /// target. Coverage only grows along the candidate sequence, so the
    /// search stops at the first window that reaches the target.
    ///
    /// # Errors
    ///
    /// [`CentroidError::EmptySelection`] when the chip has no valid cell
    /// in the DN range.
    pub fn select_adaptive(
        &self,
        input: &Chip,
        output: &mut Chip,
    ) -> Result<Selection, CentroidError> {
        let stats = input.statistics().ok_or(CentroidError::EmptySelection)?;
        let floor = self.min_dn.max(stats.min);
        let ceiling = self.max_dn.min(stats.max);
        if floor > ceiling {
            return Err(CentroidError::EmptySelection);
        }
        let seed = self.seed_cell(input, floor, ceiling).ok_or(CentroidError::EmptySelection)?;
        let seed_value = input.at(seed.0, seed.1);
        let target = self.params.target_selection_percent;

        let mut best: Option<Selection> = None;
        for window in self
            .kind
            .windows(seed_value, floor, ceiling, self.params.adaptive_steps)
        {
            let count = select_from(input, output, seed, window.0, window.1)
                .map_err(|_| CentroidError::EmptySelection)?;
            if count == 0 {
                continue;
            }
            #[allow(clippy::cast_precision_loss)]
            let coverage = count as f64 / input.area() as f64 * 100.0;
            let candidate = Selection {
                window,
                count,
                coverage,
                seed,
            };
            if best.is_none_or(|b| (coverage - target).abs() < (b.coverage - target).abs()) {
                best = Some(candidate);
            }
            if coverage >= target {
                break;
            }
        }

        let best = best.ok_or(CentroidError::EmptySelection)?;
        select_from(input, output, seed, best.window.0, best.window.1)
            .map_err(|_| CentroidError::EmptySelection)?;
        log::trace!(
            "adaptive window [{:.2}, {:.2}] selects {} cells ({:.2}%)",
            best.window.0,
            best.window.1,
            best.count,
            best.coverage
        );
        Ok(best)
    }

    /// Trim `selection` to the largest ellipse it fills.
    ///
    /// Each round fits a seed ellipse (bounding ellipse of the edge
    /// points, refined to them), then draws random five-point conics from
    /// the edge points and keeps the largest acceptable one. Selected
    /// cells outside that ellipse, inflated by `play` pixels along the
    /// minor axis, are cleared. Rounds repeat while cells are removed.
    ///
    /// # Errors
    ///
    /// - [`CentroidError::EmptySelection`] when the selection is or
    ///   becomes empty.
    /// - [`CentroidError::DegenerateEllipse`] when no acceptable ellipse
    ///   exists.
    pub fn elliptical_reduction(&self, selection: &mut Chip) -> Result<Ellipse, CentroidError> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.params.ransac_seed);
        let mut count = selected_count(selection);
        if count == 0 {
            return Err(CentroidError::EmptySelection);
        }
        let mut last = None;
        for round in 0..self.params.max_trim_rounds.max(1) {
            let edges = edge_points_of_selection(selection);
            let ellipse = self
                .largest_acceptable(selection, &edges, count, &mut rng)
                .ok_or(CentroidError::DegenerateEllipse)?;
            let relative_play = self.params.play / ellipse.semi_minor();
            let removed = trim_outside(selection, &ellipse, relative_play);
            count -= removed;
            log::trace!(
                "trim round {round}: ellipse {:.2}x{:.2} at ({:.2}, {:.2}), removed {removed}",
                ellipse.semi_major(),
                ellipse.semi_minor(),
                ellipse.center().x,
                ellipse.center().y
            );
            if count == 0 {
                return Err(CentroidError::EmptySelection);
            }
            last = Some(ellipse);
            if removed == 0 {
                break;
            }
        }
        last.ok_or(CentroidError::DegenerateEllipse)
    }

    fn acceptable(&self, ellipse: &Ellipse, selection: &Chip, count: usize) -> bool {
        if !ellipse.contained_in(selection.samples(), selection.lines()) {
            return false;
        }
        let cov = coverage(ellipse, selection, count);
        cov.percent_selected() >= self.params.percent_selected
            && cov.percent_outside() <= MAX_OUTSIDE_PERCENT
    }

    fn largest_acceptable(
        &self,
        selection: &Chip,
        edges: &[Point],
        count: usize,
        rng: &mut ChaCha8Rng,
    ) -> Option<Ellipse> {
        let play = self.params.play;
        let mut best = minimum_bounding_ellipse(edges, BOUNDING_TOLERANCE, BOUNDING_MAX_ITERATIONS)
            .ok()
            .map(|mbe| best_fit_ellipse(&mbe, edges, play, BEST_FIT_MAX_ITERATIONS).unwrap_or(mbe))
            .filter(|e| self.acceptable(e, selection, count));

        if edges.len() < 5 {
            return best;
        }
        let mut misses = 0;
        while misses < self.params.patience_limit {
            misses += 1;
            let picked = index::sample(rng, edges.len(), 5);
            let five: [Point; 5] = std::array::from_fn(|i| edges[picked.index(i)]);
            let Ok(conic) = ellipse_from_five_points(&five) else {
                continue;
            };
            let Ok(candidate) = best_fit_ellipse(&conic, edges, play, BEST_FIT_MAX_ITERATIONS)
            else {
                continue;
            };
            let grows = best.is_none_or(|b| candidate.area() >= b.area() + MIN_AREA_GAIN);
            if grows && self.acceptable(&candidate, selection, count) {
                best = Some(candidate);
                misses = 0;
            }
        }
        best
    }

    /// Adaptive selection, trimming and centring in one call.
    ///
    /// `selection` is scratch space, reused across calls.
    ///
    /// # Errors
    ///
    /// Any [`CentroidError`] from the individual steps.
    pub fn refine(&self, input: &Chip, selection: &mut Chip) -> Result<Refinement, CentroidError> {
        let chosen = self.select_adaptive(input, selection)?;
        let ellipse = self.elliptical_reduction(selection)?;
        let trimmed_count = selected_count(selection);
        let chip_position = center_of_mass(selection)?;
        Ok(Refinement {
            chip_position,
            position: input.chip_to_parent(chip_position.x, chip_position.y),
            selection: chosen,
            trimmed_count,
            ellipse,
        })
    }
}

/// Clear selected cells outside `ellipse` inflated by `play`. Returns
/// the number cleared.
#[allow(clippy::cast_precision_loss)]
fn trim_outside(selection: &mut Chip, ellipse: &Ellipse, play: f64) -> usize {
    let mut removed = 0;
    for l in 1..=selection.lines() {
        for s in 1..=selection.samples() {
            if is_selected(selection.at(s, l))
                && !point_in_ellipse(ellipse, Point::new(s as f64, l as f64), play)
            {
                selection.put(s, l, UNSELECTED);
                removed += 1;
            }
        }
    }
    removed
}

/// Uniform centroid of the selected cells, in chip coordinates.
///
/// # Errors
///
/// [`CentroidError::EmptySelection`] when nothing is selected.
#[allow(clippy::cast_precision_loss)]
pub fn center_of_mass(selection: &Chip) -> Result<Point, CentroidError> {
    let (mut sx, mut sy, mut n) = (0.0, 0.0, 0usize);
    for l in 1..=selection.lines() {
        for s in 1..=selection.samples() {
            if is_selected(selection.at(s, l)) {
                sx += s as f64;
                sy += l as f64;
                n += 1;
            }
        }
    }
    if n == 0 {
        return Err(CentroidError::EmptySelection);
    }
    let n = n as f64;
    Ok(Point::new(sx / n, sy / n))
}

/// Centroid of the selected cells weighted by `input` values. Invalid
/// input cells carry no weight.
///
/// # Errors
///
/// - [`CentroidError::EmptySelection`] when nothing is selected.
/// - [`CentroidError::ZeroWeight`] when the weights sum to zero or less.
#[allow(clippy::cast_precision_loss)]
pub fn center_of_mass_weighted(input: &Chip, selection: &Chip) -> Result<Point, CentroidError> {
    let (mut sx, mut sy, mut total, mut n) = (0.0, 0.0, 0.0, 0usize);
    let lines = selection.lines().min(input.lines());
    let samples = selection.samples().min(input.samples());
    for l in 1..=lines {
        for s in 1..=samples {
            if !is_selected(selection.at(s, l)) {
                continue;
            }
            n += 1;
            if let Some(w) = input.valid_at(s, l) {
                sx = w.mul_add(s as f64, sx);
                sy = w.mul_add(l as f64, sy);
                total += w;
            }
        }
    }
    if n == 0 {
        return Err(CentroidError::EmptySelection);
    }
    if total <= 0.0 || total.is_nan() {
        return Err(CentroidError::ZeroWeight);
    }
    Ok(Point::new(sx / total, sy / total))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::cast_precision_loss)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::selection::{SELECTED, selected_points};

    /// Bright disk (value 200) of radius `r` at integer cell `(c, c)` on
    /// background 5.
    fn disk_chip(size: usize, c: f64, r: f64) -> Chip {
        Chip::from_fn(size, size, |s, l| {
            if (s as f64 - c).hypot(l as f64 - c) <= r { 200.0 } else { 5.0 }
        })
    }

    fn quick_params() -> CentroidParams {
        CentroidParams {
            patience_limit: 100,
            ..CentroidParams::default()
        }
    }

    #[test]
    fn apollo_windows_lower_the_floor() {
        let w = CentroidKind::ApolloPan.windows(200.0, 12.0, 250.0, 4);
        assert_eq!(w.len(), 4);
        assert_relative_eq!(w[0].0, 153.0);
        assert_relative_eq!(w[3].0, 12.0);
        assert!(w.iter().all(|&(_, hi)| (hi - 250.0).abs() < f64::EPSILON));
    }

    #[test]
    fn generic_windows_are_symmetric_until_clamped() {
        let w = CentroidKind::Generic.windows(100.0, 0.0, 150.0, 2);
        assert_eq!(w[0], (50.0, 150.0));
        assert_eq!(w[1], (0.0, 150.0));
    }

    #[test]
    fn default_kind_is_apollo() {
        assert_eq!(CentroidKind::default(), CentroidKind::ApolloPan);
    }

    #[test]
    fn center_of_mass_of_symmetric_blob() {
        let sel = Chip::from_fn(9, 9, |s, l| {
            if s.abs_diff(5) + l.abs_diff(4) <= 2 { SELECTED } else { 0.0 }
        });
        let p = center_of_mass(&sel).unwrap();
        assert_relative_eq!(p.x, 5.0);
        assert_relative_eq!(p.y, 4.0);
    }

    #[test]
    fn center_of_mass_empty_is_error() {
        assert_eq!(
            center_of_mass(&Chip::new(4, 4)),
            Err(CentroidError::EmptySelection)
        );
    }

    #[test]
    fn weighted_center_follows_weights() {
        let sel = Chip::filled(3, 1, SELECTED);
        let input = Chip::from_fn(3, 1, |s, _| if s == 3 { 3.0 } else { 1.0 });
        let p = center_of_mass_weighted(&input, &sel).unwrap();
        // (1 + 2 + 9) / 5
        assert_relative_eq!(p.x, 2.4);
        let zero = Chip::new(3, 1);
        assert_eq!(
            center_of_mass_weighted(&zero, &sel),
            Err(CentroidError::ZeroWeight)
        );
    }

    #[test]
    fn select_fixed_moves_seed_to_nearest_in_range_cell() {
        // Tack cell (5, 5) is background; disk sits at (7, 5).
        let input = Chip::from_fn(9, 9, |s, l| {
            if (s as f64 - 7.0).hypot(l as f64 - 5.0) <= 1.0 { 100.0 } else { 0.0 }
        });
        let mut centroid = Centroid::new(CentroidKind::Generic, quick_params());
        centroid.set_dn_range(50.0, 150.0);
        let mut out = Chip::default();
        assert_eq!(centroid.select_fixed(&input, &mut out).unwrap(), 5);
        assert!(is_selected(out.get(7, 5).unwrap()));
    }

    #[test]
    fn seed_does_not_jump_to_a_distant_speck() {
        // Background chip with one bright cell far from the tack cell.
        let input = Chip::from_fn(31, 31, |s, l| if (s, l) == (28, 4) { 100.0 } else { 0.0 });
        let mut centroid = Centroid::new(CentroidKind::Generic, quick_params());
        centroid.set_dn_range(50.0, 150.0);
        let mut out = Chip::default();
        assert_eq!(
            centroid.select_fixed(&input, &mut out),
            Err(CentroidError::EmptySelection)
        );
        let params = CentroidParams {
            seed_radius: 20.0,
            ..quick_params()
        };
        let mut centroid = Centroid::new(CentroidKind::Generic, params);
        centroid.set_dn_range(50.0, 150.0);
        assert_eq!(centroid.select_fixed(&input, &mut out).unwrap(), 1);
    }

    #[test]
    fn select_fixed_without_in_range_cells_is_empty() {
        let input = Chip::filled(5, 5, 1.0);
        let mut centroid = Centroid::new(CentroidKind::Generic, quick_params());
        centroid.set_dn_range(10.0, 20.0);
        let mut out = Chip::default();
        assert_eq!(
            centroid.select_fixed(&input, &mut out),
            Err(CentroidError::EmptySelection)
        );
    }

    #[test]
    fn adaptive_selection_stays_above_floor() {
        let input = disk_chip(41, 21.0, 6.0);
        let mut centroid = Centroid::new(CentroidKind::ApolloPan, quick_params());
        centroid.set_dn_range(12.0, f64::INFINITY);
        let mut out = Chip::default();
        let sel = centroid.select_adaptive(&input, &mut out).unwrap();
        assert!(sel.window.0 >= 12.0);
        assert_eq!(sel.count, selected_count(&out));
        // Background never joins the selection.
        assert!(!is_selected(out.get(1, 1).unwrap()));
        assert_eq!(sel.seed, (21, 21));
    }

    #[test]
    fn adaptive_selection_picks_coverage_closest_to_target() {
        // Ramp of concentric rings: value falls off with distance.
        let input = Chip::from_fn(51, 51, |s, l| {
            200.0 - 10.0 * (s as f64 - 26.0).hypot(l as f64 - 26.0)
        });
        let params = CentroidParams {
            target_selection_percent: 5.0,
            adaptive_steps: 40,
            ..quick_params()
        };
        let mut centroid = Centroid::new(CentroidKind::ApolloPan, params);
        centroid.set_dn_range(12.0, f64::INFINITY);
        let mut out = Chip::default();
        let sel = centroid.select_adaptive(&input, &mut out).unwrap();
        assert!((sel.coverage - 5.0).abs() < 1.5, "coverage {}", sel.coverage);
    }

    #[test]
    fn reduction_keeps_a_clean_disk() {
        let input = disk_chip(41, 21.0, 8.0);
        let mut centroid = Centroid::new(CentroidKind::ApolloPan, quick_params());
        centroid.set_dn_range(12.0, f64::INFINITY);
        let mut sel = Chip::default();
        let before = centroid.select_fixed(&input, &mut sel).unwrap();
        let e = centroid.elliptical_reduction(&mut sel).unwrap();
        assert_eq!(selected_count(&sel), before);
        assert_relative_eq!(e.center().x, 21.0, epsilon = 0.2);
        assert_relative_eq!(e.center().y, 21.0, epsilon = 0.2);
    }

    #[test]
    fn reduction_trims_an_attached_scratch() {
        // Disk at (20, 20) with a one-pixel scratch running right.
        let input = Chip::from_fn(45, 41, |s, l| {
            let disk = (s as f64 - 20.0).hypot(l as f64 - 20.0) <= 8.0;
            let scratch = l == 20 && (28..=40).contains(&s);
            if disk || scratch { 200.0 } else { 5.0 }
        });
        let mut centroid = Centroid::new(CentroidKind::ApolloPan, quick_params());
        centroid.set_dn_range(12.0, f64::INFINITY);
        let mut sel = Chip::default();
        centroid.select_fixed(&input, &mut sel).unwrap();
        let untrimmed = center_of_mass(&sel).unwrap();
        assert!(untrimmed.x > 20.5);

        centroid.elliptical_reduction(&mut sel).unwrap();
        let trimmed = center_of_mass(&sel).unwrap();
        assert!((trimmed.x - 20.0).abs() < 0.2, "trimmed x {}", trimmed.x);
        assert!(selected_points(&sel).iter().all(|p| p.x <= 31.0));
    }

    #[test]
    fn reduction_of_empty_selection_fails() {
        let centroid = Centroid::new(CentroidKind::ApolloPan, quick_params());
        let mut sel = Chip::new(10, 10);
        assert_eq!(
            centroid.elliptical_reduction(&mut sel),
            Err(CentroidError::EmptySelection)
        );
    }

    #[test]
    fn reduction_of_a_line_is_degenerate() {
        let centroid = Centroid::new(CentroidKind::ApolloPan, quick_params());
        let mut sel = Chip::from_fn(20, 20, |_, l| if l == 10 { SELECTED } else { 0.0 });
        assert_eq!(
            centroid.elliptical_reduction(&mut sel),
            Err(CentroidError::DegenerateEllipse)
        );
    }

    #[test]
    fn refine_reports_parent_position() {
        let mut input = disk_chip(41, 21.0, 6.0);
        input.tack_at(500.0, 300.0);
        let mut centroid = Centroid::new(CentroidKind::ApolloPan, quick_params());
        centroid.set_dn_range(12.0, f64::INFINITY);
        let mut sel = Chip::default();
        let r = centroid.refine(&input, &mut sel).unwrap();
        assert_relative_eq!(r.position.x, 500.0, epsilon = 1e-9);
        assert_relative_eq!(r.position.y, 300.0, epsilon = 1e-9);
        assert_eq!(r.trimmed_count, r.selection.count);
    }

    #[test]
    fn reduction_is_deterministic() {
        let input = disk_chip(41, 21.0, 7.0);
        let mut centroid = Centroid::new(CentroidKind::ApolloPan, quick_params());
        centroid.set_dn_range(12.0, f64::INFINITY);
        let mut a = Chip::default();
        let mut b = Chip::default();
        centroid.select_fixed(&input, &mut a).unwrap();
        centroid.select_fixed(&input, &mut b).unwrap();
        let ea = centroid.elliptical_reduction(&mut a).unwrap();
        let eb = centroid.elliptical_reduction(&mut b).unwrap();
        assert_eq!(ea, eb);
        assert_eq!(a, b);
    }
}
