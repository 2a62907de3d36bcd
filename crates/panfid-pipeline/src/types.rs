//! Shared types for the fiducial locator.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::chip::ChipError;
use crate::matcher::MatchError;

/// A 2D point in image coordinates.
///
/// `x` runs along samples and `y` along lines. Both follow the 1-based
/// pixel-centre convention: the first pixel of an image covers
/// `[0.5, 1.5)` and is centred on `1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Sample position.
    pub x: f64,
    /// Line position.
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Number of samples (columns).
    pub samples: usize,
    /// Number of lines (rows).
    pub lines: usize,
}

/// Whether a fiducial was measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FiducialStatus {
    /// The mark was located and refined to a sub-pixel centre.
    Found,
    /// The mark was attempted but could not be measured. The record
    /// carries the predicted site instead of a measurement.
    Missing,
}

impl FiducialStatus {
    /// Lowercase label used in tabular output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Found => "found",
            Self::Missing => "missing",
        }
    }
}

impl fmt::Display for FiducialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One fiducial record in the output table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fiducial {
    /// Fiducial index. Even indices are top-row marks, odd indices are
    /// bottom-row marks.
    pub index: usize,
    /// Sample coordinate in the scanned image.
    pub sample: f64,
    /// Line coordinate in the scanned image.
    pub line: f64,
    /// Measurement status.
    pub status: FiducialStatus,
}

impl Fiducial {
    /// A measured fiducial.
    #[must_use]
    pub const fn found(index: usize, position: Point) -> Self {
        Self {
            index,
            sample: position.x,
            line: position.y,
            status: FiducialStatus::Found,
        }
    }

    /// A fiducial that could not be measured at its predicted site.
    #[must_use]
    pub const fn missing(index: usize, predicted: Point) -> Self {
        Self {
            index,
            sample: predicted.x,
            line: predicted.y,
            status: FiducialStatus::Missing,
        }
    }

    /// Position as a [`Point`].
    #[must_use]
    pub const fn position(&self) -> Point {
        Point::new(self.sample, self.line)
    }

    /// Whether this is a top-row fiducial.
    #[must_use]
    pub const fn is_top(&self) -> bool {
        self.index % 2 == 0
    }
}

/// Result of sweeping one scanned image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocateResult {
    /// Every attempted fiducial, ordered by index.
    pub fiducials: Vec<Fiducial>,
    /// Number of fiducials the mission profile expects on a full frame.
    pub expected: usize,
    /// Dimensions of the scanned image.
    pub dimensions: Dimensions,
}

impl LocateResult {
    /// Number of fiducials with [`FiducialStatus::Found`].
    #[must_use]
    pub fn found_count(&self) -> usize {
        self.fiducials
            .iter()
            .filter(|f| f.status == FiducialStatus::Found)
            .count()
    }

    /// Iterate over the measured fiducials only.
    pub fn found(&self) -> impl Iterator<Item = &Fiducial> {
        self.fiducials
            .iter()
            .filter(|f| f.status == FiducialStatus::Found)
    }

    /// Look up a record by fiducial index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Fiducial> {
        self.fiducials
            .binary_search_by_key(&index, |f| f.index)
            .ok()
            .and_then(|i| self.fiducials.get(i))
    }

    /// The `<found>/<total>` summary line.
    #[must_use]
    pub fn summary(&self) -> String {
        format!("{}/{}", self.found_count(), self.expected)
    }
}

/// Errors that abort a locator run.
///
/// Per-fiducial failures never surface here; they become
/// [`FiducialStatus::Missing`] records.
#[derive(Debug, thiserror::Error)]
pub enum LocatorError {
    /// Locator configuration is invalid.
    #[error("invalid locator configuration: {0}")]
    InvalidConfig(String),

    /// A chip was addressed outside its bounds.
    #[error(transparent)]
    BadIndex(#[from] ChipError),

    /// The whole first-fiducial strip was searched without a measurement.
    #[error(
        "no fiducials found: {cells} first-fiducial cells searched in a {samples}x{lines} image"
    )]
    NoFirstFiducial {
        /// Number of grid cells tried.
        cells: usize,
        /// Image width in samples.
        samples: usize,
        /// Image height in lines.
        lines: usize,
    },

    /// The cancel flag was raised before the given fiducial was attempted.
    #[error("sweep cancelled before fiducial {index} (last site {sample:.2}, {line:.2})")]
    Cancelled {
        /// Index of the fiducial that was about to be measured.
        index: usize,
        /// Sample of the site about to be searched.
        sample: f64,
        /// Line of the site about to be searched.
        line: f64,
    },
}

impl From<MatchError> for LocatorError {
    fn from(err: MatchError) -> Self {
        match err {
            MatchError::InvalidConfig(msg) => Self::InvalidConfig(msg),
            MatchError::BadIndex(e) => Self::BadIndex(e),
        }
    }
}

impl LocatorError {
    /// Whether this error stems from invalid configuration rather than
    /// image content.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::InvalidConfig(_))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[allow(clippy::cast_precision_loss)]
    fn result_with(statuses: &[FiducialStatus]) -> LocateResult {
        let fiducials = statuses
            .iter()
            .enumerate()
            .map(|(i, &status)| Fiducial {
                index: i,
                sample: i as f64 * 10.0,
                line: 5.0,
                status,
            })
            .collect();
        LocateResult {
            fiducials,
            expected: 90,
            dimensions: Dimensions {
                samples: 100,
                lines: 100,
            },
        }
    }

    #[test]
    fn point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((a.distance(b) - 5.0).abs() < f64::EPSILON);
        assert!((a.distance_squared(b) - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn fiducial_row_follows_index_parity() {
        assert!(Fiducial::found(0, Point::new(1.0, 1.0)).is_top());
        assert!(!Fiducial::missing(17, Point::new(1.0, 1.0)).is_top());
    }

    #[test]
    fn summary_counts_found_only() {
        use FiducialStatus::{Found, Missing};
        let result = result_with(&[Found, Missing, Found]);
        assert_eq!(result.found_count(), 2);
        assert_eq!(result.summary(), "2/90");
        assert_eq!(result.found().count(), 2);
    }

    #[test]
    fn get_finds_record_by_index() {
        use FiducialStatus::{Found, Missing};
        let result = result_with(&[Found, Missing, Found]);
        assert_eq!(result.get(1).unwrap().status, Missing);
        assert!(result.get(7).is_none());
    }

    #[test]
    fn status_display() {
        assert_eq!(FiducialStatus::Found.to_string(), "found");
        assert_eq!(FiducialStatus::Missing.to_string(), "missing");
    }

    #[test]
    fn match_config_error_maps_to_invalid_config() {
        let err: LocatorError = MatchError::InvalidConfig("bad".to_owned()).into();
        assert!(err.is_config());
        assert!(err.to_string().contains("bad"));
    }

    #[test]
    fn result_serde_round_trip() {
        use FiducialStatus::{Found, Missing};
        let result = result_with(&[Found, Missing]);
        let json = serde_json::to_string(&result).unwrap();
        let back: LocateResult = serde_json::from_str(&json).unwrap();
        assert_eq!(result, back);
    }
}
