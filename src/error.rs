//! Error taxonomy for warehouse loads

use crate::store::StoreError;

/// Error type for load operations
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// Unknown table, missing schema definition or invalid schema metadata
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Fact resolution references a table that has not been loaded yet
    #[error("Referenced table '{table}' has not been loaded (needed by '{referenced_by}')")]
    MissingDimension {
        /// Table that was expected to exist
        table: String,
        /// Fact table whose resolution needed it
        referenced_by: String,
    },

    /// Dimension row carries no business-key value to match on
    #[error("Row {row} of '{table}' has no business key value ({keys})")]
    UnresolvedBusinessKey {
        /// Dimension table
        table: String,
        /// Zero-based row index within the batch
        row: usize,
        /// Business key columns that were all missing
        keys: String,
    },

    /// Connection or DDL-timing problem; safe to retry later
    #[error("Transient store error: {0}")]
    TransientStore(String),

    /// Unexpected duplicate surrogate key or broken dimension invariant
    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),

    /// Any other store failure
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for LoadError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ConnectionFailed(msg) => LoadError::TransientStore(msg),
            other => LoadError::Store(other),
        }
    }
}

impl LoadError {
    /// Whether a later rerun could succeed without changing input or configuration
    pub fn is_transient(&self) -> bool {
        matches!(self, LoadError::TransientStore(_))
    }
}

/// Result type for load operations
pub type LoadResult<T> = Result<T, LoadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_failure_is_transient() {
        let err: LoadError = StoreError::ConnectionFailed("lock poisoned".to_string()).into();
        assert!(err.is_transient());

        let err: LoadError = StoreError::QueryFailed("syntax".to_string()).into();
        assert!(!err.is_transient());
        assert!(err.to_string().contains("syntax"));
    }

    #[test]
    fn test_missing_dimension_message() {
        let err = LoadError::MissingDimension {
            table: "dimmensajero".to_string(),
            referenced_by: "fact_servicios".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("dimmensajero"));
        assert!(msg.contains("fact_servicios"));
    }
}
