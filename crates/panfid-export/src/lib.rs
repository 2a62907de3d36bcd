//! panfid-export: Pure serializers for located fiducials (sans-IO)
//!
//! Converts a [`LocateResult`](panfid_pipeline::LocateResult) into a
//! plain-text table, JSON, or a diagnostic overlay raster.

pub mod json;
pub mod overlay;
pub mod table;

pub use json::to_json;
pub use overlay::to_overlay;
pub use table::{TableMetadata, summary_line, to_table};

/// Errors from the serializers that can fail.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// JSON serialization failed.
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}
