//! Locator configuration.

use serde::{Deserialize, Serialize};

use crate::algorithm::MatchAlgorithmKind;
use crate::centroid::{CentroidKind, CentroidParams};
use crate::chip::Interpolator;
use crate::matcher::{GradientFilter, MatchConfig, SurfaceModelKind};
use crate::profile::{MissionProfile, SweepGeometry};
use crate::source::PixelType;
use crate::types::LocatorError;

/// Every tunable of a locator run.
///
/// Missing fields deserialize to their defaults, so a JSON config only
/// needs to name what it changes. Invalid values are rejected by
/// [`validate`](Self::validate) with [`LocatorError::InvalidConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Scan resolution in microns per pixel.
    pub resolution_microns: f64,

    /// Image band to read (1-based).
    pub band: usize,

    /// Interpolator for chip loads.
    pub interpolator: Interpolator,

    /// Minimum acceptable match score.
    pub tolerance: f64,

    /// Refine matches to sub-pixel precision.
    pub subpixel_accuracy: bool,

    /// Coarse search reduction factor.
    pub reduction_factor: usize,

    /// Minimum z-score extremum in the pattern.
    pub min_z_score: f64,

    /// Minimum percent of valid pattern pixels.
    pub pattern_valid_percent: f64,

    /// Minimum percent of valid pixels per subsearch.
    pub subsearch_valid_percent: f64,

    /// Side of the surface-model window (odd, at least 3).
    pub surface_window: usize,

    /// Largest accepted sub-pixel shift in search-chip cells.
    pub distance_tolerance: f64,

    /// Gradient filter applied before matching.
    pub gradient: GradientFilter,

    /// Match score.
    pub match_algorithm: MatchAlgorithmKind,

    /// Sub-pixel surface model.
    pub surface_model: SurfaceModelKind,

    /// Trim play in pixels. `None` derives it from the profile and the
    /// resolution.
    pub play: Option<f64>,

    /// Coverage the adaptive selection aims for, in percent of the input
    /// chip.
    pub target_selection_percent: f64,

    /// Minimum percent of an ellipse interior that must be selected.
    pub percent_selected: f64,

    /// Consecutive non-improving random ellipses before giving up.
    pub patience_limit: usize,

    /// Windows tried by the adaptive selection.
    pub adaptive_steps: usize,

    /// Maximum fit-and-trim rounds per fiducial.
    pub max_trim_rounds: usize,

    /// Seed for the ellipse candidate sampler.
    pub ransac_seed: u64,

    /// Furthest the fill seed may move from an out-of-range centre
    /// pixel, in pixels.
    pub seed_radius: f64,

    /// Lowest DN a fiducial cell may have. `None` uses the pixel type's
    /// bright-target floor.
    pub min_dn: Option<f64>,

    /// Highest DN a fiducial cell may have. `None` is unbounded.
    pub max_dn: Option<f64>,

    /// Adaptive selection variant.
    pub centroid: CentroidKind,

    /// Camera layout.
    pub profile: MissionProfile,
}

impl LocatorConfig {
    /// Default scan resolution in microns.
    pub const DEFAULT_RESOLUTION_MICRONS: f64 = 5.0;

    /// Default band.
    pub const DEFAULT_BAND: usize = 1;

    /// Default adaptive selection target in percent.
    pub const DEFAULT_TARGET_SELECTION_PERCENT: f64 = 2.0;

    /// Default percent of an ellipse interior that must be selected.
    pub const DEFAULT_PERCENT_SELECTED: f64 = 95.0;

    /// Default patience for the ellipse sampler.
    pub const DEFAULT_PATIENCE_LIMIT: usize = 2000;

    /// Default number of adaptive windows.
    pub const DEFAULT_ADAPTIVE_STEPS: usize = 20;

    /// Default number of trim rounds.
    pub const DEFAULT_MAX_TRIM_ROUNDS: usize = 8;

    /// Default seed search radius in pixels.
    pub const DEFAULT_SEED_RADIUS: f64 = 5.0;

    /// Validate every field.
    ///
    /// # Errors
    ///
    /// [`LocatorError::InvalidConfig`] describing the first bad value.
    pub fn validate(&self) -> Result<(), LocatorError> {
        if !(self.resolution_microns > 0.0 && self.resolution_microns.is_finite()) {
            return Err(LocatorError::InvalidConfig(format!(
                "resolution_microns must be positive, got {}",
                self.resolution_microns
            )));
        }
        if self.band == 0 {
            return Err(LocatorError::InvalidConfig(
                "band is 1-based and must be at least 1".to_owned(),
            ));
        }
        self.match_config().validate()?;
        if let Some(play) = self.play
            && !(play >= 0.0 && play.is_finite())
        {
            return Err(LocatorError::InvalidConfig(format!(
                "play must be non-negative, got {play}"
            )));
        }
        if !(self.target_selection_percent > 0.0 && self.target_selection_percent <= 100.0) {
            return Err(LocatorError::InvalidConfig(format!(
                "target_selection_percent must be in (0, 100], got {}",
                self.target_selection_percent
            )));
        }
        if !(self.percent_selected > 0.0 && self.percent_selected <= 100.0) {
            return Err(LocatorError::InvalidConfig(format!(
                "percent_selected must be in (0, 100], got {}",
                self.percent_selected
            )));
        }
        if self.adaptive_steps == 0 {
            return Err(LocatorError::InvalidConfig(
                "adaptive_steps must be at least 1".to_owned(),
            ));
        }
        if self.max_trim_rounds == 0 {
            return Err(LocatorError::InvalidConfig(
                "max_trim_rounds must be at least 1".to_owned(),
            ));
        }
        if !(self.seed_radius >= 0.0 && self.seed_radius.is_finite()) {
            return Err(LocatorError::InvalidConfig(format!(
                "seed_radius must be non-negative, got {}",
                self.seed_radius
            )));
        }
        if let (Some(lo), Some(hi)) = (self.min_dn, self.max_dn)
            && lo > hi
        {
            return Err(LocatorError::InvalidConfig(format!(
                "min_dn {lo} exceeds max_dn {hi}"
            )));
        }
        self.profile.validate()?;
        let geometry = self.geometry();
        if geometry.search_cells < 3 || geometry.input_chip < 3 {
            return Err(LocatorError::InvalidConfig(format!(
                "resolution {} leaves {}-cell search chips and {}-pixel input chips",
                self.resolution_microns, geometry.search_cells, geometry.input_chip
            )));
        }
        Ok(())
    }

    /// Matcher settings.
    #[must_use]
    pub const fn match_config(&self) -> MatchConfig {
        MatchConfig {
            tolerance: self.tolerance,
            subpixel_accuracy: self.subpixel_accuracy,
            reduction_factor: self.reduction_factor,
            min_z_score: self.min_z_score,
            pattern_valid_percent: self.pattern_valid_percent,
            subsearch_valid_percent: self.subsearch_valid_percent,
            surface_window: self.surface_window,
            distance_tolerance: self.distance_tolerance,
            gradient: self.gradient,
            algorithm: self.match_algorithm,
            surface_model: self.surface_model,
        }
    }

    /// Profile constants at this resolution, with the play override
    /// applied.
    #[must_use]
    pub fn geometry(&self) -> SweepGeometry {
        let mut geometry = self.profile.geometry(self.resolution_microns);
        if let Some(play) = self.play {
            geometry.play = play;
        }
        geometry
    }

    /// Centroid settings.
    #[must_use]
    pub fn centroid_params(&self) -> CentroidParams {
        CentroidParams {
            target_selection_percent: self.target_selection_percent,
            adaptive_steps: self.adaptive_steps,
            percent_selected: self.percent_selected,
            play: self.geometry().play,
            patience_limit: self.patience_limit,
            max_trim_rounds: self.max_trim_rounds,
            ransac_seed: self.ransac_seed,
            seed_radius: self.seed_radius,
        }
    }

    /// DN range for the centroid on an image of `pixel_type`.
    #[must_use]
    pub fn dn_range(&self, pixel_type: PixelType) -> (f64, f64) {
        (
            self.min_dn
                .unwrap_or_else(|| pixel_type.bright_target_floor()),
            self.max_dn.unwrap_or(f64::INFINITY),
        )
    }
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            resolution_microns: Self::DEFAULT_RESOLUTION_MICRONS,
            band: Self::DEFAULT_BAND,
            interpolator: Interpolator::default(),
            tolerance: MatchConfig::DEFAULT_TOLERANCE,
            subpixel_accuracy: MatchConfig::DEFAULT_SUBPIXEL_ACCURACY,
            reduction_factor: MatchConfig::DEFAULT_REDUCTION_FACTOR,
            min_z_score: MatchConfig::DEFAULT_MIN_Z_SCORE,
            pattern_valid_percent: MatchConfig::DEFAULT_PATTERN_VALID_PERCENT,
            subsearch_valid_percent: MatchConfig::DEFAULT_SUBSEARCH_VALID_PERCENT,
            surface_window: MatchConfig::DEFAULT_SURFACE_WINDOW,
            distance_tolerance: MatchConfig::DEFAULT_DISTANCE_TOLERANCE,
            gradient: GradientFilter::default(),
            match_algorithm: MatchAlgorithmKind::default(),
            surface_model: SurfaceModelKind::default(),
            play: None,
            target_selection_percent: Self::DEFAULT_TARGET_SELECTION_PERCENT,
            percent_selected: Self::DEFAULT_PERCENT_SELECTED,
            patience_limit: Self::DEFAULT_PATIENCE_LIMIT,
            adaptive_steps: Self::DEFAULT_ADAPTIVE_STEPS,
            max_trim_rounds: Self::DEFAULT_MAX_TRIM_ROUNDS,
            ransac_seed: 0,
            seed_radius: Self::DEFAULT_SEED_RADIUS,
            min_dn: None,
            max_dn: None,
            centroid: CentroidKind::default(),
            profile: MissionProfile::default(),
        }
    }
}
