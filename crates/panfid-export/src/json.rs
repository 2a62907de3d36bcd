//! JSON export of a located fiducial table, optionally with the sweep
//! diagnostics alongside.

use panfid_pipeline::{LocateResult, SweepDiagnostics};
use serde::Serialize;

use crate::ExportError;

#[derive(Serialize)]
struct Document<'a> {
    summary: String,
    found: usize,
    #[serde(flatten)]
    result: &'a LocateResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    diagnostics: Option<&'a SweepDiagnostics>,
}

/// Serialize `result` as pretty-printed JSON.
///
/// The document carries the `fiducials`, `expected` and `dimensions`
/// fields of [`LocateResult`] plus `summary` and `found`. Diagnostics
/// are included under `diagnostics` when given.
///
/// # Errors
///
/// [`ExportError::Json`] if serialization fails.
pub fn to_json(
    result: &LocateResult,
    diagnostics: Option<&SweepDiagnostics>,
) -> Result<String, ExportError> {
    let doc = Document {
        summary: result.summary(),
        found: result.found_count(),
        result,
        diagnostics,
    };
    Ok(serde_json::to_string_pretty(&doc)?)
}
