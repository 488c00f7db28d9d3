use thiserror::Error;

/// Top-level error type for the Visioneer backend.
///
/// Infrastructure failures (configuration, storage, serialization) surface
/// here. The conversational layer wraps these in its own error type so
/// that nothing raw ever reaches a user.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VisioneerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for VisioneerError {
    fn from(err: toml::de::Error) -> Self {
        VisioneerError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for VisioneerError {
    fn from(err: toml::ser::Error) -> Self {
        VisioneerError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for VisioneerError {
    fn from(err: serde_json::Error) -> Self {
        VisioneerError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Visioneer operations.
pub type Result<T> = std::result::Result<T, VisioneerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let cases: Vec<(VisioneerError, &str)> = vec![
            (
                VisioneerError::Config("bad key".to_string()),
                "Configuration error: bad key",
            ),
            (
                VisioneerError::Storage("disk full".to_string()),
                "Storage error: disk full",
            ),
            (
                VisioneerError::NotFound("product 7".to_string()),
                "Not found: product 7",
            ),
            (
                VisioneerError::Api("bind failed".to_string()),
                "API error: bind failed",
            ),
            (
                VisioneerError::Serialization("invalid json".to_string()),
                "Serialization error: invalid json",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: VisioneerError = io_err.into();
        assert!(matches!(err, VisioneerError::Io(_)));
        assert!(err.to_string().starts_with("I/O error:"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let err: std::result::Result<toml::Value, _> = toml::from_str("invalid = [[[");
        let converted: VisioneerError = err.unwrap_err().into();
        assert!(matches!(converted, VisioneerError::Config(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let err: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let converted: VisioneerError = err.unwrap_err().into();
        assert!(matches!(converted, VisioneerError::Serialization(_)));
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let io_result: std::result::Result<i32, std::io::Error> = Ok(42);
            let value = io_result?;
            Ok(value.to_string())
        }

        assert_eq!(inner().unwrap(), "42");
    }
}
