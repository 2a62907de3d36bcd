//! 4-connected flood fill over a dynamic-range window.
//!
//! The output is a *selection chip*: same geometry as the input, with
//! `1.0` on every reached cell and `0.0` elsewhere. The selection chip is
//! its own visited set, and the work queue is reserved up front for the
//! whole chip area so the fill never reallocates.

use std::collections::VecDeque;

use crate::chip::{Chip, ChipError};
use crate::types::Point;

/// Value written to selected cells.
pub const SELECTED: f64 = 1.0;

/// Value written to unselected cells.
pub const UNSELECTED: f64 = 0.0;

/// Whether a selection-chip value marks a selected cell.
#[must_use]
pub fn is_selected(value: f64) -> bool {
    value > 0.5
}

/// Flood fill from the input chip's tack cell.
///
/// See [`select_from`]. An empty chip selects nothing.
pub fn select(input: &Chip, output: &mut Chip, min: f64, max: f64) -> usize {
    let (s, l) = input.tack_cell();
    select_from(input, output, (s, l), min, max).unwrap_or_else(|_| {
        output.reset_like(input);
        0
    })
}

/// Flood fill from `seed` over cells whose value lies in `[min, max]`.
///
/// `output` is resized to match `input` and overwritten. Returns the
/// number of selected cells; zero means the seed itself was outside the
/// window (or invalid), and the output is then entirely unselected.
///
/// # Errors
///
/// Returns [`ChipError::BadIndex`] when `seed` is outside the chip.
pub fn select_from(
    input: &Chip,
    output: &mut Chip,
    seed: (usize, usize),
    min: f64,
    max: f64,
) -> Result<usize, ChipError> {
    output.reset_like(input);
    let seed_value = input.get(seed.0, seed.1)?;
    let in_range = |v: f64| v.is_finite() && v >= min && v <= max;
    if !in_range(seed_value) {
        return Ok(0);
    }

    let (samples, lines) = (input.samples(), input.lines());
    let mut queue = VecDeque::with_capacity(input.area());
    output.put(seed.0, seed.1, SELECTED);
    queue.push_back(seed);
    let mut count = 1;

    while let Some((s, l)) = queue.pop_front() {
        let neighbours = [
            (s > 1).then(|| (s - 1, l)),
            (s < samples).then_some((s + 1, l)),
            (l > 1).then(|| (s, l - 1)),
            (l < lines).then_some((s, l + 1)),
        ];
        for (ns, nl) in neighbours.into_iter().flatten() {
            if is_selected(output.at(ns, nl)) || !in_range(input.at(ns, nl)) {
                continue;
            }
            output.put(ns, nl, SELECTED);
            queue.push_back((ns, nl));
            count += 1;
        }
    }
    Ok(count)
}

/// Number of selected cells.
#[must_use]
pub fn selected_count(selection: &Chip) -> usize {
    selection
        .as_slice()
        .iter()
        .filter(|v| is_selected(**v))
        .count()
}

/// Chip coordinates of every selected cell, in line-major order.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn selected_points(selection: &Chip) -> Vec<Point> {
    let mut points = Vec::new();
    for l in 1..=selection.lines() {
        for s in 1..=selection.samples() {
            if is_selected(selection.at(s, l)) {
                points.push(Point::new(s as f64, l as f64));
            }
        }
    }
    points
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::cast_precision_loss)]
mod tests {
    use super::*;

    /// 7x7 chip with a bright plus-shaped blob around (4, 4) and a
    /// disconnected bright cell at (1, 1).
    fn blob() -> Chip {
        Chip::from_fn(7, 7, |s, l| {
            let plus = (s == 4 && (2..=6).contains(&l)) || (l == 4 && (2..=6).contains(&s));
            if plus || (s, l) == (1, 1) { 10.0 } else { 0.0 }
        })
    }

    #[test]
    fn fills_connected_region_only() {
        let input = blob();
        let mut out = Chip::default();
        let n = select(&input, &mut out, 5.0, 20.0);
        assert_eq!(n, 9);
        assert_eq!(selected_count(&out), 9);
        assert!(!is_selected(out.get(1, 1).unwrap()));
        assert!(is_selected(out.get(4, 2).unwrap()));
        assert_eq!((out.samples(), out.lines()), (7, 7));
    }

    #[test]
    fn diagonal_cells_are_not_connected() {
        let input = Chip::from_fn(3, 3, |s, l| if s == l { 1.0 } else { 0.0 });
        let mut out = Chip::default();
        assert_eq!(select(&input, &mut out, 0.5, 1.5), 1);
    }

    #[test]
    fn seed_outside_range_is_empty() {
        let input = blob();
        let mut out = Chip::filled(7, 7, 1.0);
        let n = select_from(&input, &mut out, (2, 2), 5.0, 20.0).unwrap();
        assert_eq!(n, 0);
        assert_eq!(selected_count(&out), 0);
    }

    #[test]
    fn no_data_blocks_the_fill() {
        let mut input = Chip::filled(5, 1, 3.0);
        input.set(3, 1, f64::NAN).unwrap();
        let mut out = Chip::default();
        assert_eq!(select_from(&input, &mut out, (1, 1), 0.0, 10.0).unwrap(), 2);
    }

    #[test]
    fn seed_outside_chip_is_bad_index() {
        let input = blob();
        let mut out = Chip::default();
        assert!(select_from(&input, &mut out, (8, 1), 0.0, 1.0).is_err());
    }

    #[test]
    fn select_is_idempotent() {
        let input = Chip::from_fn(40, 30, |s, l| {
            let x = s as f64 - 20.0;
            let y = l as f64 - 15.0;
            ((x * 0.7).sin() * 5.0 + (y * 0.3).cos() * 7.0).abs()
        });
        let mut first = Chip::default();
        let mut second = Chip::default();
        let a = select(&input, &mut first, 2.0, 9.0);
        let b = select(&input, &mut second, 2.0, 9.0);
        assert_eq!(a, b);
        assert_eq!(first, second);
    }

    #[test]
    fn whole_chip_fill_terminates() {
        let input = Chip::filled(400, 300, 1.0);
        let mut out = Chip::default();
        assert_eq!(select(&input, &mut out, 0.0, 2.0), 120_000);
        assert_eq!(selected_count(&out), out.area());
    }

    #[test]
    fn selected_points_are_chip_coordinates() {
        let input = blob();
        let mut out = Chip::default();
        select(&input, &mut out, 5.0, 20.0);
        let pts = selected_points(&out);
        assert_eq!(pts.len(), 9);
        assert_eq!(pts[0], Point::new(4.0, 2.0));
    }
}
