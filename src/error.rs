//! Error types for dataset preprocessing.

use thiserror::Error;

/// Failures raised while turning a raw CSV split into a [`Dataset`](crate::Dataset).
///
/// `line` is the 1-based record number in the source file.
#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("malformed input at record {line}: {reason}")]
    MalformedInput { line: u64, reason: String },

    #[error("label out of range at record {line}: {label}")]
    LabelRange { line: u64, label: i64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PreprocessError {
    /// Map a `csv` crate error onto our kinds. Errors that wrap an I/O
    /// failure stay `Io`; everything else means the bytes were not a valid row.
    pub(crate) fn from_csv(err: csv::Error, line: u64) -> Self {
        match err.into_kind() {
            csv::ErrorKind::Io(io) => PreprocessError::Io(io),
            other => PreprocessError::MalformedInput {
                line,
                reason: format!("{:?}", other),
            },
        }
    }
}

/// Result type for preprocessing operations
pub type Result<T> = std::result::Result<T, PreprocessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PreprocessError::MalformedInput {
            line: 3,
            reason: "expected 3 fields, found 2".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("record 3"));
        assert!(msg.contains("expected 3 fields"));

        let err = PreprocessError::LabelRange { line: 7, label: -1 };
        assert!(format!("{}", err).contains("-1"));

        let err = PreprocessError::from(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "missing",
        ));
        assert!(matches!(err, PreprocessError::Io(_)));
    }
}
