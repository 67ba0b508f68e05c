use thiserror::Error;

/// Errors surfaced by the language switcher.
///
/// Provider failures never show up here: a failed geolocation lookup is
/// recovered inside `location` and at worst produces an empty `LocationInfo`.
#[derive(Debug, Error)]
pub enum SwitchError {
    /// A caller named a language code that is not in the catalog.
    #[error("Unsupported language: '{0}'")]
    UnsupportedLanguage(String),

    /// The catalog definition itself is inconsistent.
    #[error("Invalid language catalog: {0}")]
    InvalidCatalog(String),

    /// The durable key-value store could not be read or written.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<std::io::Error> for SwitchError {
    fn from(err: std::io::Error) -> Self {
        SwitchError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for SwitchError {
    fn from(err: serde_json::Error) -> Self {
        SwitchError::Storage(err.to_string())
    }
}

pub type Result<T, E = SwitchError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_language_message() {
        let err = SwitchError::UnsupportedLanguage("xx".to_string());
        assert_eq!(err.to_string(), "Unsupported language: 'xx'");
    }

    #[test]
    fn test_io_error_maps_to_storage() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: SwitchError = io.into();
        assert!(matches!(err, SwitchError::Storage(_)));
        assert!(err.to_string().contains("denied"));
    }
}
