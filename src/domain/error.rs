use thiserror::Error;

/// Cache layer errors
///
/// Only unavailability and transport failures are surfaced as errors. A missing
/// key is `Ok(None)`, corrupted or tampered entries are repaired and reported as
/// misses.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache not configured: no local or managed backend available")]
    NotConfigured,

    #[error("Cache unavailable: {message}")]
    Unavailable { message: String },

    #[error("Connection error: {message}")]
    Connection { message: String },

    #[error("Backend error: {message}")]
    Backend { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl CacheError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// True when no backend is usable at all; callers treat this as a miss.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::NotConfigured | Self::Unavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_error() {
        let error = CacheError::unavailable("not connected");
        assert_eq!(error.to_string(), "Cache unavailable: not connected");
        assert!(error.is_unavailable());
    }

    #[test]
    fn test_not_configured_is_unavailable() {
        assert!(CacheError::NotConfigured.is_unavailable());
    }

    #[test]
    fn test_backend_error_is_not_unavailable() {
        let error = CacheError::backend("connection reset");
        assert_eq!(error.to_string(), "Backend error: connection reset");
        assert!(!error.is_unavailable());
    }
}
