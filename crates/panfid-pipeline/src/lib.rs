//! panfid-pipeline: sub-pixel fiducial mark location (sans-IO).
//!
//! Finds the fiducial marks exposed along the edges of scanned
//! panoramic film frames:
//! first-fiducial grid search -> per-column template matching ->
//! adaptive selection -> elliptical trimming -> centre of mass.
//!
//! This crate has **no I/O dependencies** -- it reads pixels through the
//! [`ImageSource`] trait and returns structured data. Decoding files and
//! writing tables lives in `panfid-cli` and `panfid-export`.

pub mod algorithm;
pub mod centroid;
pub mod chip;
pub mod config;
pub mod diagnostics;
pub mod ellipse;
pub mod locator;
pub mod matcher;
pub mod profile;
pub mod selection;
pub mod source;
pub mod types;

#[cfg(test)]
mod testing;

pub use algorithm::{MatchAlgorithm, MatchAlgorithmKind};
pub use centroid::{AdaptiveWindow, Centroid, CentroidError, CentroidKind, CentroidParams};
pub use chip::{Chip, ChipError, Interpolator};
pub use config::LocatorConfig;
pub use diagnostics::{Clock, NoClock, SweepDiagnostics};
pub use ellipse::{Ellipse, EllipseError};
pub use locator::FiducialLocator;
pub use matcher::{MatchConfig, MatchResult, MatchStatus, TemplateMatcher};
pub use profile::{MissionProfile, SweepGeometry};
pub use source::{ImageSource, PixelType, Raster};
pub use types::{Dimensions, Fiducial, FiducialStatus, LocateResult, LocatorError, Point};

/// Locate every fiducial in `image` using `pattern` as the reference mark.
///
/// Shorthand for [`FiducialLocator::new`] followed by
/// [`FiducialLocator::locate`]. Build a [`FiducialLocator`] directly to
/// sweep several scans with the same pattern.
///
/// # Errors
///
/// - [`LocatorError::InvalidConfig`] for a bad configuration or a
///   pattern that does not fit it.
/// - [`LocatorError::NoFirstFiducial`] when the first-fiducial strip
///   holds no measurable mark.
pub fn locate<I, P>(
    image: &I,
    pattern: &P,
    config: LocatorConfig,
) -> Result<LocateResult, LocatorError>
where
    I: ImageSource + ?Sized,
    P: ImageSource + ?Sized,
{
    FiducialLocator::new(pattern, config)?.locate(image)
}
