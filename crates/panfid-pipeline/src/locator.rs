//! The fiducial sweep.
//!
//! [`FiducialLocator`] holds the reference pattern chip and a validated
//! configuration. Each call to [`locate`](FiducialLocator::locate) runs
//! one sweep over a scanned image:
//!
//! 1. A grid of search cells covering a strip at the top-left of the
//!    image is matched against the pattern, samples outer and lines
//!    inner, so the leftmost mark in the strip is found first. The first
//!    cell whose match also centres cleanly becomes fiducial 0.
//! 2. The sweep then walks the image one column per
//!    `average_samples`. Each column measures its bottom fiducial
//!    `average_lines` below the current anchor, then its top fiducial
//!    at the anchor. A measured top fiducial becomes the new anchor, so
//!    drift in the scan is followed from column to column.
//!
//! A failed match does not lose a fiducial: the centroid runs on the
//! predicted site instead. Only a failed centroid gives a Missing record.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::centroid::{Centroid, CentroidError, Refinement};
use crate::chip::Chip;
use crate::config::LocatorConfig;
use crate::diagnostics::{CentroidOutcome, Clock, FiducialDiagnostics, NoClock, SweepDiagnostics};
use crate::matcher::{MatchResult, TemplateMatcher};
use crate::profile::SweepGeometry;
use crate::source::ImageSource;
use crate::types::{Fiducial, FiducialStatus, LocateResult, LocatorError, Point};

/// Band the reference pattern is read from.
const PATTERN_BAND: usize = 1;

/// Locates the fiducial marks of one camera in scanned images.
#[derive(Debug, Clone)]
pub struct FiducialLocator {
    config: LocatorConfig,
    geometry: SweepGeometry,
    pattern: Chip,
    matcher: TemplateMatcher,
}

impl FiducialLocator {
    /// Validate `config` and load the pattern chip from `pattern_image`.
    ///
    /// The pattern chip is `(side - 2) / pattern_scale` cells on each
    /// axis, centred on the pattern image and loaded at the profile's
    /// pattern scale.
    ///
    /// # Errors
    ///
    /// [`LocatorError::InvalidConfig`] for an invalid configuration, or
    /// when the pattern chip is too small for the reduction factor or too
    /// large for the search chips.
    pub fn new<P: ImageSource + ?Sized>(
        pattern_image: &P,
        config: LocatorConfig,
    ) -> Result<Self, LocatorError> {
        config.validate()?;
        let geometry = config.geometry();
        let pattern = pattern_chip(pattern_image, &config);
        let matcher = TemplateMatcher::new(config.match_config())?;
        matcher.check_pattern(&pattern)?;
        let search = Chip::new(geometry.search_cells, geometry.search_cells);
        matcher.check_search(&pattern, &search)?;
        log::debug!(
            "pattern chip {}x{} at scale {}, search chips {}x{} at scale {:.3}",
            pattern.samples(),
            pattern.lines(),
            pattern.scale(),
            geometry.search_cells,
            geometry.search_cells,
            geometry.scale
        );
        Ok(Self {
            config,
            geometry,
            pattern,
            matcher,
        })
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &LocatorConfig {
        &self.config
    }

    /// Profile constants at the configured resolution.
    #[must_use]
    pub const fn geometry(&self) -> &SweepGeometry {
        &self.geometry
    }

    /// The loaded reference pattern.
    #[must_use]
    pub const fn pattern(&self) -> &Chip {
        &self.pattern
    }

    /// Sweep `image` and return every attempted fiducial.
    ///
    /// # Errors
    ///
    /// [`LocatorError::NoFirstFiducial`] when the first-fiducial strip
    /// holds no measurable mark.
    pub fn locate<I: ImageSource + ?Sized>(&self, image: &I) -> Result<LocateResult, LocatorError> {
        let never = AtomicBool::new(false);
        self.locate_with_diagnostics(image, &never, &NoClock)
            .map(|(result, _)| result)
    }

    /// Sweep `image`, collecting diagnostics and honouring `cancel`.
    ///
    /// `cancel` is checked before every grid cell and every fiducial.
    ///
    /// # Errors
    ///
    /// - [`LocatorError::NoFirstFiducial`] when the first-fiducial strip
    ///   holds no measurable mark.
    /// - [`LocatorError::Cancelled`] when `cancel` was raised.
    pub fn locate_with_diagnostics<I: ImageSource + ?Sized, C: Clock>(
        &self,
        image: &I,
        cancel: &AtomicBool,
        clock: &C,
    ) -> Result<(LocateResult, SweepDiagnostics), LocatorError> {
        let start = clock.now();
        let mut sweep = Sweep::new(self, image, cancel, clock);

        let grid_start = clock.now();
        let first = sweep.first_fiducial()?;
        let first_fiducial_duration = clock.elapsed(grid_start);
        log::info!(
            "first fiducial at ({:.3}, {:.3}) after {} cells",
            first.sample,
            first.line,
            sweep.cells
        );

        let mut fiducials = vec![first];
        sweep.walk(first.position(), &mut fiducials)?;
        fiducials.sort_by_key(|f| f.index);

        let result = LocateResult {
            fiducials,
            expected: self.config.profile.fiducial_count,
            dimensions: image.dimensions(),
        };
        log::info!(
            "{} fiducials found ({} attempted)",
            result.summary(),
            result.fiducials.len()
        );

        let diagnostics = SweepDiagnostics {
            dimensions: image.dimensions(),
            geometry: self.geometry,
            first_fiducial_cells: sweep.cells,
            first_fiducial_duration,
            fiducials: sweep.entries,
            matcher: sweep.matcher.statistics().clone(),
            total_duration: clock.elapsed(start),
        };
        Ok((result, diagnostics))
    }
}

/// Pattern chip centred on `image`, cells on whole pattern pixels.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn pattern_chip<P: ImageSource + ?Sized>(image: &P, config: &LocatorConfig) -> Chip {
    let k = config.profile.pattern_scale;
    let cells = |n: usize| (n.saturating_sub(2) as f64 / k) as usize;
    let mut chip = Chip::new(cells(image.samples()), cells(image.lines()));
    chip.set_interpolator(config.interpolator);
    chip.tack_on_grid(
        (image.samples() as f64 + 1.0) / 2.0,
        (image.lines() as f64 + 1.0) / 2.0,
        k,
    );
    chip.load(image, PATTERN_BAND, k);
    chip
}

/// Mutable state of one sweep: chip buffers reused across fiducials,
/// the per-run matcher, and the diagnostics gathered so far.
struct Sweep<'a, I: ?Sized, C: Clock> {
    locator: &'a FiducialLocator,
    image: &'a I,
    cancel: &'a AtomicBool,
    clock: &'a C,
    matcher: TemplateMatcher,
    centroid: Centroid,
    search: Chip,
    input: Chip,
    selection: Chip,
    cells: usize,
    entries: Vec<FiducialDiagnostics>,
}

impl<'a, I: ImageSource + ?Sized, C: Clock> Sweep<'a, I, C> {
    fn new(
        locator: &'a FiducialLocator,
        image: &'a I,
        cancel: &'a AtomicBool,
        clock: &'a C,
    ) -> Self {
        let config = &locator.config;
        let g = &locator.geometry;
        let mut matcher = locator.matcher.clone();
        matcher.reset_statistics();
        let mut centroid = Centroid::new(config.centroid, config.centroid_params());
        let (min_dn, max_dn) = config.dn_range(image.pixel_type());
        centroid.set_dn_range(min_dn, max_dn);
        let mut search = Chip::new(g.search_cells, g.search_cells);
        search.set_interpolator(config.interpolator);
        let mut input = Chip::new(g.input_chip, g.input_chip);
        input.set_interpolator(config.interpolator);
        Self {
            locator,
            image,
            cancel,
            clock,
            matcher,
            centroid,
            search,
            input,
            selection: Chip::default(),
            cells: 0,
            entries: Vec::new(),
        }
    }

    fn check_cancel(&self, index: usize, site: Point) -> Result<(), LocatorError> {
        if self.cancel.load(Ordering::Relaxed) {
            log::info!("sweep cancelled before fiducial {index}");
            return Err(LocatorError::Cancelled {
                index,
                sample: site.x,
                line: site.y,
            });
        }
        Ok(())
    }

    /// Match the pattern in a search chip tacked at `site`.
    fn register(&mut self, site: Point) -> Result<MatchResult, LocatorError> {
        let scale = self.locator.geometry.scale;
        self.search.tack_on_grid(site.x, site.y, scale);
        self.search
            .load(self.image, self.locator.config.band, scale);
        Ok(self.matcher.register(&self.locator.pattern, &self.search)?)
    }

    /// Centroid of the mark in a full-resolution input chip at `at`.
    fn centre(&mut self, at: Point) -> Result<Refinement, CentroidError> {
        self.input.tack_on_grid(at.x, at.y, 1.0);
        self.input.load(self.image, self.locator.config.band, 1.0);
        self.centroid.refine(&self.input, &mut self.selection)
    }

    /// Search the first-fiducial grid.
    fn first_fiducial(&mut self) -> Result<Fiducial, LocatorError> {
        let g = self.locator.geometry;
        let half = g.search_cell_size / 2.0;
        let mut sample = half;
        while sample < g.average_samples + half {
            let mut line = half;
            while line < g.search_height + half {
                let site = Point::new(sample, line);
                self.check_cancel(0, site)?;
                self.cells += 1;
                let started = self.clock.now();
                let result = self.register(site)?;
                if let Some(registration) = result.registration() {
                    let at = registration.position();
                    match self.centre(at) {
                        Ok(refined) => {
                            self.entries.push(FiducialDiagnostics {
                                index: 0,
                                predicted: site,
                                centred_at: at,
                                match_status: result.status(),
                                centroid: CentroidOutcome::from(&refined),
                                status: FiducialStatus::Found,
                                duration: self.clock.elapsed(started),
                            });
                            return Ok(Fiducial::found(0, refined.position));
                        }
                        Err(e) => {
                            log::debug!("grid cell ({sample:.1}, {line:.1}) matched but {e}");
                        }
                    }
                }
                line += g.cell_step;
            }
            sample += g.cell_step;
        }
        let dims = self.image.dimensions();
        log::warn!(
            "no fiducial in {} first-fiducial cells of a {}x{} image",
            self.cells,
            dims.samples,
            dims.lines
        );
        Err(LocatorError::NoFirstFiducial {
            cells: self.cells,
            samples: dims.samples,
            lines: dims.lines,
        })
    }

    /// Measure fiducial `index` predicted at `site`. A failed match falls
    /// back to centring on the predicted site.
    fn measure(&mut self, index: usize, site: Point) -> Result<Fiducial, LocatorError> {
        self.check_cancel(index, site)?;
        let started = self.clock.now();
        let result = self.register(site)?;
        let at = result.registration().map_or(site, |r| r.position());
        let (fiducial, centroid) = match self.centre(at) {
            Ok(refined) => (
                Fiducial::found(index, refined.position),
                CentroidOutcome::from(&refined),
            ),
            Err(e) => {
                log::warn!(
                    "fiducial {index} missing at ({:.2}, {:.2}): {}, {e}",
                    site.x,
                    site.y,
                    result.status()
                );
                (Fiducial::missing(index, site), CentroidOutcome::from(e))
            }
        };
        log::debug!(
            "fiducial {index}: predicted ({:.2}, {:.2}) measured ({:.3}, {:.3}) {}",
            site.x,
            site.y,
            fiducial.sample,
            fiducial.line,
            fiducial.status
        );
        self.entries.push(FiducialDiagnostics {
            index,
            predicted: site,
            centred_at: at,
            match_status: result.status(),
            centroid,
            status: fiducial.status,
            duration: self.clock.elapsed(started),
        });
        Ok(fiducial)
    }

    /// Walk the columns from the first fiducial.
    #[allow(clippy::cast_precision_loss)]
    fn walk(&mut self, first: Point, out: &mut Vec<Fiducial>) -> Result<(), LocatorError> {
        let locator = self.locator;
        let g = locator.geometry;
        let profile = &locator.config.profile;
        let end = self.image.samples() as f64;
        let (mut sample, mut line) = (first.x, first.y);
        for column in 0..profile.columns() {
            if sample >= end {
                break;
            }
            sample = profile
                .adjustment(column)
                .mul_add(g.average_samples, sample);

            let bottom = self.measure(2 * column + 1, Point::new(sample, line + g.average_lines))?;
            out.push(bottom);

            // Column 0's top fiducial is the first fiducial.
            if column > 0 {
                let top = self.measure(2 * column, Point::new(sample, line))?;
                if top.status == FiducialStatus::Found {
                    sample = top.sample;
                    line = top.line;
                }
                out.push(top);
            }
            sample += g.average_samples;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::panic,
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap
)]
mod tests {
    use super::*;
    use crate::profile::{ColumnAdjustment, MissionProfile};
    use crate::source::{PixelType, Raster};
    use crate::testing::{Disk, noise_patch, render_disks};

    /// Single large mark: 2048 square scan, r=8 disk.
    fn large_mark_config() -> LocatorConfig {
        LocatorConfig {
            reduction_factor: 2,
            distance_tolerance: 2.0,
            play: Some(1.5),
            patience_limit: 50,
            profile: MissionProfile {
                name: "large-mark".to_owned(),
                scale: 1.0,
                search_height: 520.0,
                search_cell_size: 64.0,
                cell_overlap: 16.0,
                average_samples: 1200.0,
                average_lines: 3000.0,
                input_chip_size: 200.0,
                pattern_scale: 1.0,
                column_adjustments: Vec::new(),
                ..MissionProfile::apollo_pan()
            },
            ..LocatorConfig::default()
        }
    }

    /// 45 columns of r=5 marks, 40 pixels apart, rows 60 lines apart.
    fn strip_config() -> LocatorConfig {
        LocatorConfig {
            target_selection_percent: 10.0,
            distance_tolerance: 2.0,
            play: Some(1.5),
            patience_limit: 50,
            profile: MissionProfile {
                name: "strip".to_owned(),
                scale: 1.0,
                search_height: 40.0,
                search_cell_size: 32.0,
                cell_overlap: 8.0,
                average_samples: 40.0,
                average_lines: 60.0,
                input_chip_size: 32.0,
                pattern_scale: 1.0,
                column_adjustments: Vec::new(),
                ..MissionProfile::apollo_pan()
            },
            ..LocatorConfig::default()
        }
    }

    fn pattern(side: usize, radius: f64) -> Raster {
        let c = (side as f64 + 1.0) / 2.0;
        render_disks(side, side, &[Disk::new(c, c, radius)])
    }

    /// Ground truth for the strip scene: top then bottom per column.
    fn strip_truth(columns: usize) -> Vec<Point> {
        let mut truth = Vec::with_capacity(columns * 2);
        for k in 0..columns {
            let kf = k as f64;
            let s = 0.3f64.mul_add(kf.sin(), 40.0f64.mul_add(kf, 40.3));
            let top = Point::new(s, 0.3f64.mul_add((1.3 * kf).cos(), 39.6));
            let bottom = Point::new(
                0.2f64.mul_add(kf.cos(), s),
                0.25f64.mul_add((1.7 * kf).sin(), 99.6),
            );
            truth.push(top);
            truth.push(bottom);
        }
        truth
    }

    fn strip_scene(columns: usize) -> Raster {
        let disks: Vec<Disk> = strip_truth(columns)
            .iter()
            .map(|p| Disk::new(p.x, p.y, 5.0))
            .collect();
        render_disks(columns * 40 + 40, 130, &disks)
    }

    #[test]
    fn single_mark_found_to_a_tenth_of_a_pixel() {
        let image = render_disks(2048, 2048, &[Disk::new(1000.25, 500.75, 8.0)]);
        let locator = FiducialLocator::new(&pattern(24, 8.0), large_mark_config()).unwrap();
        let result = locator.locate(&image).unwrap();

        assert_eq!(result.found_count(), 1);
        let first = result.get(0).unwrap();
        assert_eq!(first.status, FiducialStatus::Found);
        assert!((first.sample - 1000.25).abs() < 0.1, "sample {}", first.sample);
        assert!((first.line - 500.75).abs() < 0.1, "line {}", first.line);
        // The bottom partner is predicted off the image.
        assert_eq!(result.get(1).unwrap().status, FiducialStatus::Missing);
        assert_eq!(result.fiducials.len(), 2);
        assert_eq!(result.summary(), "1/90");
    }

    #[test]
    fn neighbouring_mark_does_not_add_a_fiducial() {
        let image = render_disks(
            2048,
            2048,
            &[
                Disk::new(1000.25, 500.75, 8.0),
                Disk::new(1050.0, 500.0, 8.0),
            ],
        );
        let locator = FiducialLocator::new(&pattern(24, 8.0), large_mark_config()).unwrap();
        let result = locator.locate(&image).unwrap();

        assert_eq!(result.found_count(), 1);
        let first = result.get(0).unwrap();
        assert!((first.sample - 1000.25).abs() < 0.1);
        assert!((first.line - 500.75).abs() < 0.1);
    }

    #[test]
    fn leftmost_mark_is_fiducial_zero() {
        // The second mark sits higher in the strip but further right.
        let config = LocatorConfig {
            profile: MissionProfile {
                fiducial_count: 2,
                search_height: 56.0,
                average_samples: 64.0,
                ..strip_config().profile
            },
            ..strip_config()
        };
        let image = render_disks(
            120,
            100,
            &[Disk::new(40.3, 64.4, 5.0), Disk::new(64.3, 16.4, 5.0)],
        );
        let locator = FiducialLocator::new(&pattern(16, 5.0), config).unwrap();
        let never = AtomicBool::new(false);
        let (result, diagnostics) = locator
            .locate_with_diagnostics(&image, &never, &NoClock)
            .unwrap();
        let first = result.get(0).unwrap();
        assert_eq!(first.status, FiducialStatus::Found);
        assert!(
            (first.sample - 40.3).abs() < 0.25 && (first.line - 64.4).abs() < 0.25,
            "fiducial 0 at ({}, {})",
            first.sample,
            first.line
        );
        // Columns at sample 16 and 40 are walked top to bottom.
        assert_eq!(diagnostics.first_fiducial_cells, 6);
    }

    #[test]
    fn column_adjustment_moves_predicted_sites() {
        let config = LocatorConfig {
            profile: MissionProfile {
                fiducial_count: 12,
                column_adjustments: vec![ColumnAdjustment {
                    column: 2,
                    fraction: -0.5,
                }],
                ..strip_config().profile
            },
            ..strip_config()
        };
        // Column 2 onwards sits half a spacing closer.
        let truth: Vec<Point> = strip_truth(6)
            .into_iter()
            .enumerate()
            .map(|(i, p)| if i / 2 >= 2 { Point::new(p.x - 20.0, p.y) } else { p })
            .collect();
        let disks: Vec<Disk> = truth.iter().map(|p| Disk::new(p.x, p.y, 5.0)).collect();
        let image = render_disks(280, 130, &disks);
        let locator = FiducialLocator::new(&pattern(16, 5.0), config).unwrap();
        let result = locator.locate(&image).unwrap();

        assert_eq!(result.fiducials.len(), 12);
        assert_eq!(result.summary(), "12/12");
        for (i, f) in result.fiducials.iter().enumerate() {
            assert!(
                (f.sample - truth[i].x).abs() < 0.25 && (f.line - truth[i].y).abs() < 0.25,
                "fiducial {i} at ({}, {}) expected ({}, {})",
                f.sample,
                f.line,
                truth[i].x,
                truth[i].y
            );
        }
    }

    #[test]
    fn noise_only_scan_has_no_first_fiducial() {
        let mut image = Raster::from_fn(200, 100, PixelType::U8, |_, _| 5.0);
        noise_patch(&mut image, Point::new(100.5, 50.5), 200, 7);
        let locator = FiducialLocator::new(&pattern(16, 5.0), strip_config()).unwrap();
        match locator.locate(&image) {
            Err(LocatorError::NoFirstFiducial {
                cells,
                samples,
                lines,
            }) => {
                assert_eq!(cells, 4);
                assert_eq!((samples, lines), (200, 100));
            }
            other => panic!("expected NoFirstFiducial, got {other:?}"),
        }
    }

    #[test]
    fn pattern_too_small_for_reduction_is_config_error() {
        let config = LocatorConfig {
            reduction_factor: 4,
            ..strip_config()
        };
        let err = FiducialLocator::new(&pattern(5, 1.5), config).unwrap_err();
        assert!(err.is_config(), "{err}");
    }

    #[test]
    fn pattern_larger_than_search_chip_is_config_error() {
        let err = FiducialLocator::new(&pattern(40, 8.0), strip_config()).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn full_strip_measures_every_fiducial() {
        let image = strip_scene(45);
        let truth = strip_truth(45);
        let locator = FiducialLocator::new(&pattern(16, 5.0), strip_config()).unwrap();
        let result = locator.locate(&image).unwrap();

        assert_eq!(result.fiducials.len(), 90);
        assert_eq!(result.found_count(), 90);
        for (i, f) in result.fiducials.iter().enumerate() {
            assert_eq!(f.index, i);
            let expected = truth[i];
            assert!(
                (f.sample - expected.x).abs() < 0.25 && (f.line - expected.y).abs() < 0.25,
                "fiducial {i} at ({}, {}) expected ({}, {})",
                f.sample,
                f.line,
                expected.x,
                expected.y
            );
        }
    }

    #[test]
    fn obscured_mark_is_missing_and_sweep_continues() {
        let mut image = strip_scene(45);
        let truth = strip_truth(45);
        // Fiducial 17 is the bottom mark of column 8.
        noise_patch(&mut image, truth[17], 16, 17);
        let locator = FiducialLocator::new(&pattern(16, 5.0), strip_config()).unwrap();
        let result = locator.locate(&image).unwrap();

        assert_eq!(result.fiducials.len(), 90);
        assert_eq!(result.found_count(), 89);
        let missing = result.get(17).unwrap();
        assert_eq!(missing.status, FiducialStatus::Missing);
        assert!((missing.sample - truth[17].x).abs() < 1.0);
        assert!((missing.line - truth[17].y).abs() < 1.0);
        for index in [16, 18, 19, 20] {
            let f = result.get(index).unwrap();
            assert_eq!(f.status, FiducialStatus::Found);
            assert!((f.sample - truth[index].x).abs() < 0.25);
        }
    }

    #[test]
    fn sweep_is_deterministic() {
        let config = LocatorConfig {
            profile: MissionProfile {
                fiducial_count: 8,
                ..strip_config().profile
            },
            ..strip_config()
        };
        let image = strip_scene(4);
        let locator = FiducialLocator::new(&pattern(16, 5.0), config).unwrap();
        let never = AtomicBool::new(false);
        let run = || {
            let (result, diagnostics) = locator
                .locate_with_diagnostics(&image, &never, &NoClock)
                .unwrap();
            (
                serde_json::to_string(&result).unwrap(),
                serde_json::to_string(&diagnostics).unwrap(),
            )
        };
        let first = run();
        assert_eq!(first, run());
        let result: LocateResult = serde_json::from_str(&first.0).unwrap();
        assert_eq!(result.found_count(), 8);
        assert_eq!(result.summary(), "8/8");
    }

    #[test]
    fn diagnostics_cover_every_fiducial() {
        let config = LocatorConfig {
            profile: MissionProfile {
                fiducial_count: 6,
                ..strip_config().profile
            },
            ..strip_config()
        };
        let image = strip_scene(3);
        let locator = FiducialLocator::new(&pattern(16, 5.0), config).unwrap();
        let never = AtomicBool::new(false);
        let (result, diagnostics) = locator
            .locate_with_diagnostics(&image, &never, &NoClock)
            .unwrap();
        assert_eq!(diagnostics.fiducials.len(), result.fiducials.len());
        assert_eq!(diagnostics.first_fiducial_cells, 4);
        assert_eq!(diagnostics.found_count(), 6);
        assert!(diagnostics.matcher.attempts >= 6);
        // Sweep order: first fiducial, then bottom before top per column.
        let order: Vec<usize> = diagnostics.fiducials.iter().map(|f| f.index).collect();
        assert_eq!(order, vec![0, 1, 3, 2, 5, 4]);
    }

    #[test]
    fn raised_cancel_flag_stops_before_first_cell() {
        let image = strip_scene(2);
        let locator = FiducialLocator::new(&pattern(16, 5.0), strip_config()).unwrap();
        let cancel = AtomicBool::new(true);
        let err = locator
            .locate_with_diagnostics(&image, &cancel, &NoClock)
            .unwrap_err();
        assert!(matches!(err, LocatorError::Cancelled { index: 0, .. }));
    }

    #[test]
    fn sweep_stops_at_image_edge() {
        // Ten columns of marks but room for only the first six columns.
        let image = {
            let full = strip_scene(10);
            Raster::from_fn(250, 130, PixelType::U8, |s, l| {
                full.read(s as i64, l as i64, 1).unwrap_or(5.0)
            })
        };
        let locator = FiducialLocator::new(&pattern(16, 5.0), strip_config()).unwrap();
        let result = locator.locate(&image).unwrap();
        let last = result.fiducials.iter().map(|f| f.index).max().unwrap();
        assert_eq!(last, 11);
        assert!(result.found_count() >= 10);
    }
}
