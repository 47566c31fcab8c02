//! Error types for data parsing in headwatch-types.

use thiserror::Error;

/// Errors that can occur when converting raw values into headwatch types.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// A millisecond timestamp outside the representable calendar range.
    #[error("Invalid timestamp: {0} ms is out of range")]
    InvalidTimestamp(i64),

    /// A calendar date string that is not `YYYY-MM-DD`.
    #[error("Invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),
}

/// Result type alias using headwatch-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ParseError::InvalidTimestamp(i64::MAX);
        assert!(err.to_string().contains("out of range"));

        let err = ParseError::InvalidDate("yesterday".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid date 'yesterday': expected YYYY-MM-DD"
        );
    }
}
