//! Plain-text fiducial table.
//!
//! One record per line, whitespace separated:
//!
//! ```text
//! index sample line status
//! ```
//!
//! Lines beginning with `#` are metadata comments. Coordinates are
//! 1-based image pixels printed to three decimals. Missing records carry
//! the site where the mark was expected.
//!
//! This is a pure function with no I/O -- it returns a `String`.

use std::fmt::Write;

use panfid_pipeline::LocateResult;

/// Metadata to embed as `#`-prefixed comment lines at the top of the
/// table.
///
/// All fields are optional. When present, the corresponding comment
/// line is emitted.
#[derive(Debug, Clone, Default)]
pub struct TableMetadata<'a> {
    /// Scanned image filename, emitted as `# Source: <filename>`.
    pub source: Option<&'a str>,

    /// Mission profile name, emitted as `# Profile: <name>`.
    pub profile: Option<&'a str>,

    /// Full `LocatorConfig` JSON, emitted as `# Config: <json>`.
    pub config_json: Option<&'a str>,
}

/// The `<found>/<total>` summary line.
#[must_use]
pub fn summary_line(result: &LocateResult) -> String {
    format!("fiducials found: {}", result.summary())
}

/// Serialize a located fiducial table.
///
/// # Examples
///
/// ```
/// use panfid_pipeline::{Dimensions, Fiducial, LocateResult, Point};
/// use panfid_export::table::{TableMetadata, to_table};
///
/// let result = LocateResult {
///     fiducials: vec![Fiducial::found(0, Point::new(12.5, 40.25))],
///     expected: 90,
///     dimensions: Dimensions { samples: 100, lines: 100 },
/// };
/// let table = to_table(&result, &TableMetadata::default());
/// assert!(table.contains("0 12.500 40.250 found"));
/// ```
#[must_use]
pub fn to_table(result: &LocateResult, metadata: &TableMetadata<'_>) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "# panfid");
    if let Some(source) = metadata.source {
        for line in source.lines() {
            let _ = writeln!(out, "# Source: {line}");
        }
    }
    if let Some(profile) = metadata.profile {
        let _ = writeln!(out, "# Profile: {profile}");
    }
    if let Some(json) = metadata.config_json {
        // JSON may be pretty-printed; keep it on one comment line.
        let compact: String = json.lines().map(str::trim).collect();
        let _ = writeln!(out, "# Config: {compact}");
    }
    let _ = writeln!(
        out,
        "# Image: {}x{}",
        result.dimensions.samples, result.dimensions.lines
    );
    let _ = writeln!(out, "# {}", summary_line(result));
    let _ = writeln!(out, "index sample line status");

    for f in &result.fiducials {
        let _ = writeln!(
            out,
            "{} {:.3} {:.3} {}",
            f.index, f.sample, f.line, f.status
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use panfid_pipeline::{Dimensions, Fiducial, Point};

    use super::*;

    fn result() -> LocateResult {
        LocateResult {
            fiducials: vec![
                Fiducial::found(0, Point::new(1000.25, 500.75)),
                Fiducial::missing(1, Point::new(1000.0, 3500.0)),
            ],
            expected: 90,
            dimensions: Dimensions {
                samples: 2048,
                lines: 2048,
            },
        }
    }

    #[test]
    fn rows_follow_header() {
        let table = to_table(&result(), &TableMetadata::default());
        let rows: Vec<&str> = table.lines().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(
            rows,
            vec![
                "index sample line status",
                "0 1000.250 500.750 found",
                "1 1000.000 3500.000 missing",
            ]
        );
    }

    #[test]
    fn summary_counts_found_against_expected() {
        assert_eq!(summary_line(&result()), "fiducials found: 1/90");
        let table = to_table(&result(), &TableMetadata::default());
        assert!(table.contains("# fiducials found: 1/90"));
        assert!(table.contains("# Image: 2048x2048"));
    }

    #[test]
    fn metadata_lines_are_comments() {
        let metadata = TableMetadata {
            source: Some("AS15-P-0001.tif"),
            profile: Some("apollo-pan"),
            config_json: Some("{\n  \"band\": 1\n}"),
        };
        let table = to_table(&result(), &metadata);
        assert!(table.starts_with("# panfid\n"));
        assert!(table.contains("# Source: AS15-P-0001.tif"));
        assert!(table.contains("# Profile: apollo-pan"));
        assert!(table.contains("# Config: {\"band\": 1}"));
    }

    #[test]
    fn empty_result_has_header_only() {
        let empty = LocateResult {
            fiducials: Vec::new(),
            ..result()
        };
        let table = to_table(&empty, &TableMetadata::default());
        assert_eq!(table.lines().last(), Some("index sample line status"));
    }
}
