//! Chips: small in-memory tiles sampled from a parent image.
//!
//! A chip is addressed with 1-based `(sample, line)` indices. Its
//! *tack point* is the parent-image position that the chip's centre maps
//! to. A chip loaded at scale `k` around tack `(S, L)` reads the parent at
//!
//! ```text
//! (S + (s - (samples + 1) / 2) * k,  L + (l - (lines + 1) / 2) * k)
//! ```
//!
//! for every chip cell `(s, l)`. No-data is stored as `NaN`; a cell is
//! *valid* when its value is finite and inside the chip's valid range.

use serde::{Deserialize, Serialize};

use crate::source::ImageSource;
use crate::types::Point;

/// Value stored for pixels that could not be read.
pub const NO_DATA: f64 = f64::NAN;

/// Interpolation used when a chip cell maps to a fractional parent
/// position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Interpolator {
    /// Nearest pixel.
    Nearest,
    /// 2x2 bilinear.
    Bilinear,
    /// 4x4 cubic convolution (Catmull-Rom).
    #[default]
    Cubic,
}

/// Errors from chip addressing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChipError {
    /// A 1-based index fell outside the chip.
    #[error("chip index ({sample}, {line}) outside {samples}x{lines} chip")]
    BadIndex {
        /// Requested sample.
        sample: usize,
        /// Requested line.
        line: usize,
        /// Chip width.
        samples: usize,
        /// Chip height.
        lines: usize,
    },
}

/// Summary statistics over the valid cells of a chip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChipStatistics {
    /// Number of valid cells.
    pub count: usize,
    /// Mean of valid cells.
    pub mean: f64,
    /// Population standard deviation of valid cells.
    pub std_dev: f64,
    /// Smallest valid value.
    pub min: f64,
    /// Largest valid value.
    pub max: f64,
}

impl ChipStatistics {
    /// Largest absolute z-score among the extrema, or `None` for a flat chip.
    ///
    /// Returns `(z_of_max, z_of_min)`; the latter is usually negative.
    #[must_use]
    pub fn extreme_z_scores(&self) -> Option<(f64, f64)> {
        (self.std_dev > 0.0).then(|| {
            (
                (self.max - self.mean) / self.std_dev,
                (self.min - self.mean) / self.std_dev,
            )
        })
    }
}

/// A rectangular tile of `f64` pixels tied to a parent image.
#[derive(Debug, Clone, PartialEq)]
pub struct Chip {
    samples: usize,
    lines: usize,
    data: Vec<f64>,
    tack: Point,
    scale: f64,
    interpolator: Interpolator,
    valid_min: f64,
    valid_max: f64,
}

impl Default for Chip {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl Chip {
    /// Allocate a zero-filled chip.
    #[must_use]
    pub fn new(samples: usize, lines: usize) -> Self {
        Self::filled(samples, lines, 0.0)
    }

    /// Allocate a chip with every cell set to `value`.
    #[must_use]
    pub fn filled(samples: usize, lines: usize, value: f64) -> Self {
        Self {
            samples,
            lines,
            data: vec![value; samples * lines],
            tack: Point::new(0.0, 0.0),
            scale: 1.0,
            interpolator: Interpolator::default(),
            valid_min: f64::NEG_INFINITY,
            valid_max: f64::INFINITY,
        }
    }

    /// Build a chip by evaluating `f(sample, line)` for every 1-based cell.
    #[must_use]
    pub fn from_fn(samples: usize, lines: usize, mut f: impl FnMut(usize, usize) -> f64) -> Self {
        let mut chip = Self::new(samples, lines);
        for l in 1..=lines {
            for s in 1..=samples {
                chip.put(s, l, f(s, l));
            }
        }
        chip
    }

    /// A chip with the same geometry as `self` (size, tack, scale) and
    /// every cell set to `value`.
    #[must_use]
    pub fn same_geometry(&self, value: f64) -> Self {
        Self {
            data: vec![value; self.data.len()],
            valid_min: f64::NEG_INFINITY,
            valid_max: f64::INFINITY,
            ..self.clone_header()
        }
    }

    fn clone_header(&self) -> Self {
        Self {
            samples: self.samples,
            lines: self.lines,
            data: Vec::new(),
            tack: self.tack,
            scale: self.scale,
            interpolator: self.interpolator,
            valid_min: self.valid_min,
            valid_max: self.valid_max,
        }
    }

    /// Resize and zero-fill.
    pub fn set_size(&mut self, samples: usize, lines: usize) {
        self.samples = samples;
        self.lines = lines;
        self.data.clear();
        self.data.resize(samples * lines, 0.0);
    }

    /// Make `self` the same size, tack and scale as `other`, zero-filled.
    ///
    /// Reuses the existing allocation when possible.
    pub fn reset_like(&mut self, other: &Self) {
        self.set_size(other.samples, other.lines);
        self.tack = other.tack;
        self.scale = other.scale;
    }

    /// Chip width.
    #[must_use]
    pub const fn samples(&self) -> usize {
        self.samples
    }

    /// Chip height.
    #[must_use]
    pub const fn lines(&self) -> usize {
        self.lines
    }

    /// Number of cells.
    #[must_use]
    pub const fn area(&self) -> usize {
        self.samples * self.lines
    }

    /// Parent-image tack point.
    #[must_use]
    pub const fn tack(&self) -> Point {
        self.tack
    }

    /// Parent pixels per chip cell from the last load.
    #[must_use]
    pub const fn scale(&self) -> f64 {
        self.scale
    }

    /// Set the parent-image reference point for the chip centre.
    pub const fn tack_at(&mut self, sample: f64, line: f64) {
        self.tack = Point::new(sample, line);
    }

    /// Tack near `(sample, line)` so that, loaded at the whole-number
    /// `scale`, every cell lands on a whole parent pixel.
    ///
    /// Even-sized chips have a half-cell centre, so at odd scales their
    /// tack is snapped to the nearest half-integer instead.
    pub fn tack_on_grid(&mut self, sample: f64, line: f64, scale: f64) {
        let c = self.center();
        let ox = (c.x * scale).rem_euclid(1.0);
        let oy = (c.y * scale).rem_euclid(1.0);
        self.scale = scale;
        self.tack = Point::new((sample - ox).round() + ox, (line - oy).round() + oy);
    }

    /// Current interpolator.
    #[must_use]
    pub const fn interpolator(&self) -> Interpolator {
        self.interpolator
    }

    /// Choose the interpolator used by [`load`](Self::load).
    pub const fn set_interpolator(&mut self, interpolator: Interpolator) {
        self.interpolator = interpolator;
    }

    /// Restrict which values count as valid.
    pub const fn set_valid_range(&mut self, min: f64, max: f64) {
        self.valid_min = min;
        self.valid_max = max;
    }

    /// Inclusive valid range.
    #[must_use]
    pub const fn valid_range(&self) -> (f64, f64) {
        (self.valid_min, self.valid_max)
    }

    /// Fractional chip centre, `((samples + 1) / 2, (lines + 1) / 2)`.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn center(&self) -> Point {
        Point::new(
            (self.samples as f64 + 1.0) / 2.0,
            (self.lines as f64 + 1.0) / 2.0,
        )
    }

    /// Integer cell nearest the centre, rounding down on even sizes.
    #[must_use]
    pub const fn tack_cell(&self) -> (usize, usize) {
        (
            self.samples.saturating_sub(1) / 2 + 1,
            self.lines.saturating_sub(1) / 2 + 1,
        )
    }

    /// Fill the chip from `image` at the given scale.
    ///
    /// Every cell is read at its parent position using the chip's
    /// interpolator. Cells that fall outside the image become
    /// [`NO_DATA`].
    pub fn load<I: ImageSource + ?Sized>(&mut self, image: &I, band: usize, scale: f64) {
        self.scale = scale;
        for l in 1..=self.lines {
            for s in 1..=self.samples {
                #[allow(clippy::cast_precision_loss)]
                let p = self.chip_to_parent(s as f64, l as f64);
                let v = interpolate(image, band, p, self.interpolator).unwrap_or(NO_DATA);
                self.put(s, l, v);
            }
        }
    }

    /// Checked read.
    ///
    /// # Errors
    ///
    /// Returns [`ChipError::BadIndex`] outside `1..=samples`, `1..=lines`.
    pub fn get(&self, sample: usize, line: usize) -> Result<f64, ChipError> {
        self.check(sample, line)?;
        Ok(self.at(sample, line))
    }

    /// Checked write.
    ///
    /// # Errors
    ///
    /// Returns [`ChipError::BadIndex`] outside `1..=samples`, `1..=lines`.
    pub fn set(&mut self, sample: usize, line: usize, value: f64) -> Result<(), ChipError> {
        self.check(sample, line)?;
        self.put(sample, line, value);
        Ok(())
    }

    const fn check(&self, sample: usize, line: usize) -> Result<(), ChipError> {
        if sample == 0 || line == 0 || sample > self.samples || line > self.lines {
            return Err(ChipError::BadIndex {
                sample,
                line,
                samples: self.samples,
                lines: self.lines,
            });
        }
        Ok(())
    }

    /// Unchecked read for indices the caller has already bounded.
    pub(crate) fn at(&self, sample: usize, line: usize) -> f64 {
        self.data[(line - 1) * self.samples + (sample - 1)]
    }

    /// Unchecked write for indices the caller has already bounded.
    pub(crate) fn put(&mut self, sample: usize, line: usize, value: f64) {
        self.data[(line - 1) * self.samples + (sample - 1)] = value;
    }

    /// Whether `value` is finite and inside the valid range.
    #[must_use]
    pub fn is_valid_value(&self, value: f64) -> bool {
        value.is_finite() && value >= self.valid_min && value <= self.valid_max
    }

    /// Value at a cell if it is valid.
    pub(crate) fn valid_at(&self, sample: usize, line: usize) -> Option<f64> {
        let v = self.at(sample, line);
        self.is_valid_value(v).then_some(v)
    }

    /// Set every cell to `value`.
    pub fn fill(&mut self, value: f64) {
        self.data.fill(value);
    }

    /// Row-major cell values.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Convert a chip position to parent-image coordinates.
    #[must_use]
    pub fn chip_to_parent(&self, sample: f64, line: f64) -> Point {
        let c = self.center();
        Point::new(
            (sample - c.x).mul_add(self.scale, self.tack.x),
            (line - c.y).mul_add(self.scale, self.tack.y),
        )
    }

    /// Convert a parent-image position to chip coordinates.
    #[must_use]
    pub fn parent_to_chip(&self, sample: f64, line: f64) -> Point {
        let c = self.center();
        Point::new(
            (sample - self.tack.x) / self.scale + c.x,
            (line - self.tack.y) / self.scale + c.y,
        )
    }

    /// Copy a `width x height` sub-chip whose tack cell sits on
    /// `(sample, line)` of this chip.
    ///
    /// Cells that fall outside this chip are [`NO_DATA`]. The result
    /// keeps this chip's scale and valid range, and is tacked at the
    /// parent position of its own centre.
    ///
    /// # Errors
    ///
    /// Returns [`ChipError::BadIndex`] when `(sample, line)` is outside
    /// the chip.
    pub fn extract(
        &self,
        width: usize,
        height: usize,
        sample: usize,
        line: usize,
    ) -> Result<Self, ChipError> {
        self.check(sample, line)?;
        let mut sub = Self::filled(width, height, NO_DATA);
        sub.scale = self.scale;
        sub.interpolator = self.interpolator;
        sub.valid_min = self.valid_min;
        sub.valid_max = self.valid_max;
        let (ts, tl) = sub.tack_cell();
        for l in 1..=height {
            for s in 1..=width {
                if let Some((ps, pl)) = self.offset_cell(sample, line, s, ts, l, tl) {
                    sub.put(s, l, self.at(ps, pl));
                }
            }
        }
        let c = sub.center();
        #[allow(clippy::cast_precision_loss)]
        let centre_in_self = Point::new(
            sample as f64 + (c.x - ts as f64),
            line as f64 + (c.y - tl as f64),
        );
        sub.tack = self.chip_to_parent(centre_in_self.x, centre_in_self.y);
        Ok(sub)
    }

    /// Cell of `self` at `(anchor + (s - ts), anchor_line + (l - tl))`
    /// if inside.
    fn offset_cell(
        &self,
        anchor_s: usize,
        anchor_l: usize,
        s: usize,
        ts: usize,
        l: usize,
        tl: usize,
    ) -> Option<(usize, usize)> {
        let ps = (anchor_s + s).checked_sub(ts)?;
        let pl = (anchor_l + l).checked_sub(tl)?;
        (ps >= 1 && pl >= 1 && ps <= self.samples && pl <= self.lines).then_some((ps, pl))
    }

    /// Percentage of cells whose value is finite and inside `[min, max]`.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn valid_percent(&self, min: f64, max: f64) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        let valid = self
            .data
            .iter()
            .filter(|v| v.is_finite() && **v >= min && **v <= max)
            .count();
        valid as f64 / self.data.len() as f64 * 100.0
    }

    /// Statistics over the valid cells, or `None` when there are none.
    #[must_use]
    pub fn statistics(&self) -> Option<ChipStatistics> {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &v in self.data.iter().filter(|v| self.is_valid_value(**v)) {
            count += 1;
            sum += v;
            sum_sq = v.mul_add(v, sum_sq);
            min = min.min(v);
            max = max.max(v);
        }
        if count == 0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let n = count as f64;
        let mean = sum / n;
        let variance = mean.mul_add(-mean, sum_sq / n).max(0.0);
        Some(ChipStatistics {
            count,
            mean,
            std_dev: variance.sqrt(),
            min,
            max,
        })
    }

    /// Average non-overlapping `factor x factor` blocks.
    ///
    /// Only valid cells contribute to a block; a block with none becomes
    /// [`NO_DATA`]. Trailing cells that do not fill a whole block are
    /// dropped. The reduced chip keeps the parent mapping: its scale is
    /// `scale * factor` and its tack is the parent position of its centre.
    /// A factor of 0 or 1, or one that would leave no cells, returns a copy.
    #[must_use]
    pub fn reduce(&self, factor: usize) -> Self {
        let rs = self.samples / factor.max(1);
        let rl = self.lines / factor.max(1);
        if factor <= 1 || rs == 0 || rl == 0 {
            return self.clone();
        }
        let mut reduced = Self::filled(rs, rl, NO_DATA);
        reduced.interpolator = self.interpolator;
        reduced.valid_min = self.valid_min;
        reduced.valid_max = self.valid_max;
        for l in 1..=rl {
            for s in 1..=rs {
                let mut sum = 0.0;
                let mut n = 0usize;
                for bl in (l - 1) * factor + 1..=l * factor {
                    for bs in (s - 1) * factor + 1..=s * factor {
                        if let Some(v) = self.valid_at(bs, bl) {
                            sum += v;
                            n += 1;
                        }
                    }
                }
                if n > 0 {
                    #[allow(clippy::cast_precision_loss)]
                    reduced.put(s, l, sum / n as f64);
                }
            }
        }
        #[allow(clippy::cast_precision_loss)]
        let f = factor as f64;
        let c = reduced.center();
        let half = f.mul_add(0.5, 0.5);
        reduced.tack = self.chip_to_parent((c.x - 1.0).mul_add(f, half), (c.y - 1.0).mul_add(f, half));
        reduced.scale = self.scale * f;
        reduced
    }

    /// Sobel gradient magnitude with clamped borders.
    ///
    /// Invalid neighbours are replaced by the centre value so a single
    /// missing pixel does not poison its 3x3 neighbourhood. Invalid
    /// centres stay [`NO_DATA`].
    #[must_use]
    pub fn sobel(&self) -> Self {
        let mut out = self.same_geometry(NO_DATA);
        for l in 1..=self.lines {
            for s in 1..=self.samples {
                let Some(centre) = self.valid_at(s, l) else {
                    continue;
                };
                let px = |ds: isize, dl: isize| -> f64 {
                    let cs = s.saturating_add_signed(ds).clamp(1, self.samples);
                    let cl = l.saturating_add_signed(dl).clamp(1, self.lines);
                    self.valid_at(cs, cl).unwrap_or(centre)
                };
                let gx = 2.0f64.mul_add(px(1, 0) - px(-1, 0), px(1, -1) - px(-1, -1))
                    + px(1, 1)
                    - px(-1, 1);
                let gy = 2.0f64.mul_add(px(0, 1) - px(0, -1), px(-1, 1) - px(-1, -1))
                    + px(1, 1)
                    - px(1, -1);
                out.put(s, l, gx.hypot(gy));
            }
        }
        out
    }
}

/// Read `image` at a fractional 1-based position.
///
/// Falls back to nearest-neighbour when any contributing neighbour is
/// missing, so chips loaded at an image border keep their edge pixels.
#[allow(clippy::cast_possible_truncation)]
fn interpolate<I: ImageSource + ?Sized>(
    image: &I,
    band: usize,
    p: Point,
    interpolator: Interpolator,
) -> Option<f64> {
    if !p.x.is_finite() || !p.y.is_finite() {
        return None;
    }
    let nearest = || image.read(p.x.round() as i64, p.y.round() as i64, band);
    match interpolator {
        Interpolator::Nearest => nearest(),
        Interpolator::Bilinear => weighted_read(image, band, p, 0, |t| [1.0 - t, t]).or_else(nearest),
        Interpolator::Cubic => weighted_read(image, band, p, 1, cubic_weights).or_else(nearest),
    }
}

/// Separable weighted read over an `N x N` neighbourhood starting
/// `back` pixels before the floor of `p`. Zero weights skip their pixel.
fn weighted_read<I: ImageSource + ?Sized, const N: usize>(
    image: &I,
    band: usize,
    p: Point,
    back: i64,
    weights: impl Fn(f64) -> [f64; N],
) -> Option<f64> {
    let fx = p.x.floor();
    let fy = p.y.floor();
    let wx = weights(p.x - fx);
    let wy = weights(p.y - fy);
    #[allow(clippy::cast_possible_truncation)]
    let (x0, y0) = (fx as i64 - back, fy as i64 - back);
    let mut sum = 0.0;
    for (j, &wyj) in wy.iter().enumerate() {
        if wyj == 0.0 {
            continue;
        }
        for (i, &wxi) in wx.iter().enumerate() {
            if wxi == 0.0 {
                continue;
            }
            #[allow(clippy::cast_possible_wrap)]
            let v = image.read(x0 + i as i64, y0 + j as i64, band)?;
            sum += wxi * wyj * v;
        }
    }
    Some(sum)
}

/// Catmull-Rom cubic convolution weights (`a = -0.5`) for offset `t`
/// in `[0, 1)`.
fn cubic_weights(t: f64) -> [f64; 4] {
    let t2 = t * t;
    let t3 = t2 * t;
    [
        0.5 * (-t3 + 2.0 * t2 - t),
        0.5 * (3.0 * t3 - 5.0 * t2 + 2.0),
        0.5 * (-3.0 * t3 + 4.0 * t2 + t),
        0.5 * (t3 - t2),
    ]
}
