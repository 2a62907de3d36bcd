//! Mission constants for the fiducial sweep.
//!
//! A [`MissionProfile`] records a camera's fiducial layout in pixels at a
//! baseline scan resolution. [`SweepGeometry`] is the same layout
//! rescaled to the resolution of a particular scan.

use serde::{Deserialize, Serialize};

use crate::types::LocatorError;

/// Extra advance applied before a sweep column, as a fraction of the
/// average fiducial spacing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnAdjustment {
    /// Zero-based sweep column the adjustment applies to.
    pub column: usize,
    /// Fraction of `average_samples` added to the advance (negative
    /// values pull the column back).
    pub fraction: f64,
}

/// Fiducial layout of one camera, in pixels at `baseline_resolution`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionProfile {
    /// Profile name for reports.
    pub name: String,
    /// Fiducials on a full frame (top and bottom rows together).
    pub fiducial_count: usize,
    /// Scan resolution the pixel constants are given at, in microns.
    pub baseline_resolution: f64,
    /// Load scale for search chips.
    pub scale: f64,
    /// Height of the strip searched for the first fiducial.
    pub search_height: f64,
    /// Side of one first-fiducial search cell, and of sweep search chips.
    pub search_cell_size: f64,
    /// Overlap between neighbouring first-fiducial search cells.
    pub cell_overlap: f64,
    /// Average sample spacing between fiducial columns.
    pub average_samples: f64,
    /// Average line spacing from a top fiducial to its bottom partner.
    pub average_lines: f64,
    /// Side of the full-resolution chip the centroid runs on.
    pub input_chip_size: f64,
    /// Trim play is `play_numerator / resolution` pixels ...
    pub play_numerator: f64,
    /// ... but never less than this.
    pub play_floor: f64,
    /// Load scale for the reference pattern. Not rescaled.
    pub pattern_scale: f64,
    /// Per-column advance adjustments.
    pub column_adjustments: Vec<ColumnAdjustment>,
}

impl MissionProfile {
    /// Apollo 15-17 panoramic camera, 5 micron baseline.
    ///
    /// The two central columns sit half a spacing closer to their
    /// neighbours.
    #[must_use]
    pub fn apollo_pan() -> Self {
        Self {
            name: "apollo-pan".to_owned(),
            fiducial_count: 90,
            baseline_resolution: 5.0,
            scale: 10.0,
            search_height: 1400.0,
            search_cell_size: 350.0,
            cell_overlap: 125.0,
            average_samples: 5286.0,
            average_lines: 23459.0,
            input_chip_size: 200.0,
            play_numerator: 10.0,
            play_floor: 0.5,
            pattern_scale: 10.0,
            column_adjustments: vec![
                ColumnAdjustment {
                    column: 22,
                    fraction: -0.5,
                },
                ColumnAdjustment {
                    column: 23,
                    fraction: -0.5,
                },
            ],
        }
    }

    /// Number of sweep columns.
    #[must_use]
    pub const fn columns(&self) -> usize {
        self.fiducial_count / 2
    }

    /// Sum of the adjustment fractions for `column`.
    #[must_use]
    pub fn adjustment(&self, column: usize) -> f64 {
        self.column_adjustments
            .iter()
            .filter(|a| a.column == column)
            .map(|a| a.fraction)
            .sum()
    }

    /// Check that the constants describe a usable layout.
    ///
    /// # Errors
    ///
    /// [`LocatorError::InvalidConfig`] naming the first bad constant.
    pub fn validate(&self) -> Result<(), LocatorError> {
        if self.fiducial_count < 2 || self.fiducial_count % 2 != 0 {
            return Err(LocatorError::InvalidConfig(format!(
                "fiducial_count must be even and at least 2, got {}",
                self.fiducial_count
            )));
        }
        let positive = [
            ("baseline_resolution", self.baseline_resolution),
            ("scale", self.scale),
            ("search_height", self.search_height),
            ("search_cell_size", self.search_cell_size),
            ("average_samples", self.average_samples),
            ("average_lines", self.average_lines),
            ("input_chip_size", self.input_chip_size),
            ("play_floor", self.play_floor),
            ("pattern_scale", self.pattern_scale),
        ];
        for (name, value) in positive {
            if !(value > 0.0 && value.is_finite()) {
                return Err(LocatorError::InvalidConfig(format!(
                    "profile {name} must be positive, got {value}"
                )));
            }
        }
        if !(self.cell_overlap >= 0.0 && self.cell_overlap < self.search_cell_size) {
            return Err(LocatorError::InvalidConfig(format!(
                "cell_overlap {} must be in [0, search_cell_size)",
                self.cell_overlap
            )));
        }
        if self.play_numerator < 0.0 || self.play_numerator.is_nan() {
            return Err(LocatorError::InvalidConfig(format!(
                "play_numerator must be non-negative, got {}",
                self.play_numerator
            )));
        }
        if let Some(a) = self
            .column_adjustments
            .iter()
            .find(|a| !a.fraction.is_finite() || a.fraction <= -1.0)
        {
            return Err(LocatorError::InvalidConfig(format!(
                "column {} adjustment {} must be finite and above -1",
                a.column, a.fraction
            )));
        }
        Ok(())
    }

    /// Constants rescaled to a scan at `resolution` microns per pixel.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    #[must_use]
    pub fn geometry(&self, resolution: f64) -> SweepGeometry {
        let factor = self.baseline_resolution / resolution;
        let scale = self.scale * factor;
        let search_cell_size = self.search_cell_size * factor;
        SweepGeometry {
            scale,
            search_height: self.search_height * factor,
            search_cell_size,
            cell_step: (self.search_cell_size - self.cell_overlap) * factor,
            average_samples: self.average_samples * factor,
            average_lines: self.average_lines * factor,
            search_cells: (search_cell_size / scale) as usize,
            input_chip: (self.input_chip_size * factor).ceil() as usize,
            play: (self.play_numerator / resolution).max(self.play_floor),
        }
    }
}

impl Default for MissionProfile {
    fn default() -> Self {
        Self::apollo_pan()
    }
}

/// Profile constants in pixels of one scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepGeometry {
    /// Load scale for search chips.
    pub scale: f64,
    /// Height of the first-fiducial strip.
    pub search_height: f64,
    /// Side of a search cell in image pixels.
    pub search_cell_size: f64,
    /// Distance between neighbouring first-fiducial cells.
    pub cell_step: f64,
    /// Column spacing.
    pub average_samples: f64,
    /// Top-to-bottom spacing.
    pub average_lines: f64,
    /// Side of a search chip in chip cells.
    pub search_cells: usize,
    /// Side of the centroid input chip.
    pub input_chip: usize,
    /// Trim play in pixels.
    pub play: f64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn apollo_baseline_geometry() {
        let g = MissionProfile::apollo_pan().geometry(5.0);
        assert_relative_eq!(g.scale, 10.0);
        assert_relative_eq!(g.average_samples, 5286.0);
        assert_relative_eq!(g.cell_step, 225.0);
        assert_eq!(g.search_cells, 35);
        assert_eq!(g.input_chip, 200);
        assert_relative_eq!(g.play, 2.0);
    }

    #[test]
    fn finer_scan_scales_up() {
        let g = MissionProfile::apollo_pan().geometry(2.5);
        assert_relative_eq!(g.scale, 20.0);
        assert_relative_eq!(g.average_lines, 46918.0);
        assert_eq!(g.search_cells, 35);
        assert_eq!(g.input_chip, 400);
        assert_relative_eq!(g.play, 4.0);
    }

    #[test]
    fn coarse_scan_hits_play_floor() {
        let g = MissionProfile::apollo_pan().geometry(40.0);
        assert_relative_eq!(g.play, 0.5);
        assert_eq!(g.input_chip, 25);
        assert_relative_eq!(MissionProfile::apollo_pan().geometry(20.0).play, 0.5);
    }

    #[test]
    fn central_columns_are_pulled_back() {
        let p = MissionProfile::apollo_pan();
        assert_relative_eq!(p.adjustment(22), -0.5);
        assert_relative_eq!(p.adjustment(23), -0.5);
        assert_relative_eq!(p.adjustment(5), 0.0);
        assert_eq!(p.columns(), 45);
    }

    #[test]
    fn profile_validation() {
        assert!(MissionProfile::apollo_pan().validate().is_ok());
        let odd = MissionProfile {
            fiducial_count: 89,
            ..MissionProfile::apollo_pan()
        };
        assert!(odd.validate().unwrap_err().is_config());
        let overlap = MissionProfile {
            cell_overlap: 400.0,
            ..MissionProfile::apollo_pan()
        };
        assert!(overlap.validate().is_err());
    }

    #[test]
    fn profile_serde_round_trip() {
        let p = MissionProfile::apollo_pan();
        let json = serde_json::to_string(&p).unwrap();
        let back: MissionProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
    }
}
