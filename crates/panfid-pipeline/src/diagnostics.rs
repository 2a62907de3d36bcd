//! Sweep diagnostics: per-fiducial outcomes, matcher counters and timing.
//!
//! These are collected on every run of
//! [`FiducialLocator::locate_with_diagnostics`](crate::FiducialLocator::locate_with_diagnostics)
//! and are meant for tuning a profile against real scans.
//!
//! The core has no clock of its own. Callers hand in a [`Clock`]; the
//! CLI uses `std::time::Instant`, tests use [`NoClock`] or a counter.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::centroid::{CentroidError, Refinement};
use crate::matcher::{MatchStatistics, MatchStatus};
use crate::profile::SweepGeometry;
use crate::types::{Dimensions, FiducialStatus, Point};

/// Source of timestamps for diagnostics.
pub trait Clock {
    /// Opaque timestamp.
    type Instant: Copy;

    /// Current time.
    fn now(&self) -> Self::Instant;

    /// Time passed since `since`.
    fn elapsed(&self, since: Self::Instant) -> Duration;
}

/// A clock that never advances. Every duration is zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoClock;

impl Clock for NoClock {
    type Instant = ();

    fn now(&self) {}

    fn elapsed(&self, (): ()) -> Duration {
        Duration::ZERO
    }
}

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// What the centroid made of one input chip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CentroidOutcome {
    /// Refined to a sub-pixel centre.
    Refined {
        /// Lower bound of the chosen DN window.
        window_low: f64,
        /// Upper bound of the chosen DN window.
        window_high: f64,
        /// Cells selected by the adaptive flood fill.
        selected: usize,
        /// Cells left after elliptical trimming.
        trimmed: usize,
        /// Semi-major axis of the trimming ellipse.
        semi_major: f64,
        /// Semi-minor axis of the trimming ellipse.
        semi_minor: f64,
    },
    /// No in-range region through the seed.
    EmptySelection,
    /// No acceptable ellipse.
    DegenerateEllipse,
    /// Selected cells carried no weight.
    ZeroWeight,
}

impl CentroidOutcome {
    /// Short label for the report table.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Refined { .. } => "refined",
            Self::EmptySelection => "empty selection",
            Self::DegenerateEllipse => "degenerate ellipse",
            Self::ZeroWeight => "zero weight",
        }
    }
}

impl From<&Refinement> for CentroidOutcome {
    fn from(r: &Refinement) -> Self {
        Self::Refined {
            window_low: r.selection.window.0,
            window_high: r.selection.window.1,
            selected: r.selection.count,
            trimmed: r.trimmed_count,
            semi_major: r.ellipse.semi_major(),
            semi_minor: r.ellipse.semi_minor(),
        }
    }
}

impl From<CentroidError> for CentroidOutcome {
    fn from(e: CentroidError) -> Self {
        match e {
            CentroidError::EmptySelection => Self::EmptySelection,
            CentroidError::DegenerateEllipse => Self::DegenerateEllipse,
            CentroidError::ZeroWeight => Self::ZeroWeight,
        }
    }
}

/// One measured (or attempted) fiducial.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FiducialDiagnostics {
    /// Fiducial index.
    pub index: usize,
    /// Site the search chip was tacked at.
    pub predicted: Point,
    /// Where the input chip was centred: the match position, or the
    /// predicted site when matching failed.
    pub centred_at: Point,
    /// Matcher outcome.
    pub match_status: MatchStatus,
    /// Centroid outcome.
    pub centroid: CentroidOutcome,
    /// Final status of the record.
    pub status: FiducialStatus,
    /// Wall-clock duration of this fiducial (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

/// Diagnostics collected from a single sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepDiagnostics {
    /// Scanned image size.
    pub dimensions: Dimensions,
    /// Profile constants at the configured resolution.
    pub geometry: SweepGeometry,
    /// First-fiducial grid cells searched, including the successful one.
    pub first_fiducial_cells: usize,
    /// Wall-clock duration of the first-fiducial search (seconds).
    #[serde(with = "duration_serde")]
    pub first_fiducial_duration: Duration,
    /// Per-fiducial entries in sweep order.
    pub fiducials: Vec<FiducialDiagnostics>,
    /// Matcher counters for the whole run, grid search included.
    pub matcher: MatchStatistics,
    /// Total wall-clock duration (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
}

/// Convert a `Duration` to fractional milliseconds.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

impl SweepDiagnostics {
    /// Fiducials recorded as found.
    #[must_use]
    pub fn found_count(&self) -> usize {
        self.fiducials
            .iter()
            .filter(|f| f.status == FiducialStatus::Found)
            .count()
    }

    /// Fiducials that reached the centroid through the predicted-site
    /// fallback rather than a match.
    #[must_use]
    pub fn fallback_count(&self) -> usize {
        self.fiducials
            .iter()
            .filter(|f| !f.match_status.is_success())
            .count()
    }

    /// Format a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Sweep Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{}  |  scale {:.3}  |  play {:.3}px",
            self.dimensions.samples, self.dimensions.lines, self.geometry.scale, self.geometry.play,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(format!(
            "First fiducial: {} cells in {:.3}ms",
            self.first_fiducial_cells,
            duration_ms(self.first_fiducial_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<6} {:<8} {:<32} {:<20} {:>10}",
            "Index", "Status", "Match", "Centroid", "Duration"
        ));
        lines.push("-".repeat(80));
        for f in &self.fiducials {
            lines.push(format!(
                "{:<6} {:<8} {:<32} {:<20} {:>8.3}ms",
                f.index,
                f.status.as_str(),
                f.match_status.to_string(),
                f.centroid.label(),
                duration_ms(f.duration),
            ));
        }

        lines.push(String::new());
        lines.push(format!(
            "Found: {}/{}  |  Fallback centring: {}",
            self.found_count(),
            self.fiducials.len(),
            self.fallback_count(),
        ));
        lines.push(self.matcher.report());

        lines.join("\n")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::Cell;

    use super::*;

    /// Advances one millisecond per reading.
    struct TickClock(Cell<u64>);

    impl Clock for TickClock {
        type Instant = u64;

        fn now(&self) -> u64 {
            let t = self.0.get();
            self.0.set(t + 1);
            t
        }

        fn elapsed(&self, since: u64) -> Duration {
            Duration::from_millis(self.now() - since)
        }
    }

    fn sample() -> SweepDiagnostics {
        SweepDiagnostics {
            dimensions: Dimensions {
                samples: 400,
                lines: 200,
            },
            geometry: crate::profile::MissionProfile::apollo_pan().geometry(5.0),
            first_fiducial_cells: 3,
            first_fiducial_duration: Duration::from_millis(4),
            fiducials: vec![
                FiducialDiagnostics {
                    index: 0,
                    predicted: Point::new(40.0, 40.0),
                    centred_at: Point::new(40.5, 39.5),
                    match_status: MatchStatus::SuccessSubPixel,
                    centroid: CentroidOutcome::Refined {
                        window_low: 12.0,
                        window_high: 200.0,
                        selected: 90,
                        trimmed: 88,
                        semi_major: 5.2,
                        semi_minor: 5.1,
                    },
                    status: FiducialStatus::Found,
                    duration: Duration::from_millis(2),
                },
                FiducialDiagnostics {
                    index: 1,
                    predicted: Point::new(40.0, 100.0),
                    centred_at: Point::new(40.0, 100.0),
                    match_status: MatchStatus::FitChipNoData,
                    centroid: CentroidOutcome::EmptySelection,
                    status: FiducialStatus::Missing,
                    duration: Duration::from_millis(1),
                },
            ],
            matcher: MatchStatistics::default(),
            total_duration: Duration::from_millis(10),
        }
    }

    #[test]
    fn no_clock_reports_zero() {
        let clock = NoClock;
        let t = clock.now();
        assert_eq!(clock.elapsed(t), Duration::ZERO);
    }

    #[test]
    fn tick_clock_measures_readings() {
        let clock = TickClock(Cell::new(0));
        let t = clock.now();
        assert_eq!(clock.elapsed(t), Duration::from_millis(1));
    }

    #[test]
    fn counts_found_and_fallback() {
        let d = sample();
        assert_eq!(d.found_count(), 1);
        assert_eq!(d.fallback_count(), 1);
    }

    #[test]
    fn report_lists_every_fiducial() {
        let report = sample().report();
        assert!(report.contains("Sweep Diagnostics Report"));
        assert!(report.contains("Found: 1/2"));
        assert!(report.contains("FitChipNoData"));
        assert!(report.contains("empty selection"));
        assert!(report.contains("Registrations: 0 attempted"));
    }

    #[test]
    fn centroid_error_maps_to_outcome() {
        assert_eq!(
            CentroidOutcome::from(CentroidError::DegenerateEllipse),
            CentroidOutcome::DegenerateEllipse
        );
        assert_eq!(CentroidOutcome::ZeroWeight.label(), "zero weight");
    }

    #[test]
    fn diagnostics_serde_round_trip() {
        let d = sample();
        let json = serde_json::to_string(&d).unwrap();
        let back: SweepDiagnostics = serde_json::from_str(&json).unwrap();
        assert_eq!(d, back);
    }

    #[test]
    fn negative_duration_rejected() {
        let mut value = serde_json::to_value(sample()).unwrap();
        value["total_duration"] = serde_json::json!(-1.0);
        assert!(serde_json::from_value::<SweepDiagnostics>(value).is_err());
    }
}
