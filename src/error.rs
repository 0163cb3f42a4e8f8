use std::path::PathBuf;

/// Failures at the storage boundary.
///
/// Categories:
/// - Access: the backend could not be reached or an I/O call failed
/// - Data: a stored record could not be decoded, or a value could not be encoded
///
/// None of these escape the pipeline core. `PipelineStore` logs them and
/// treats the affected record as absent (reads) or the write as dropped.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    // Access
    #[error("Storage I/O failed at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    // Data
    #[error("Malformed record '{key}': {source}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode record '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// Returns true if the stored bytes exist but could not be decoded.
    pub fn is_malformed(&self) -> bool {
        matches!(self, StoreError::Malformed { .. })
    }

    /// Returns true if the backend itself failed, independent of the data.
    pub fn is_access_failure(&self) -> bool {
        matches!(self, StoreError::Io { .. } | StoreError::Unavailable(_))
    }
}
