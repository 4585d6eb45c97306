//! Error types shared across the graft crates

use std::path::PathBuf;

/// Result type alias using [`Error`]
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Main error type for the graft harness
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A decoration with this name is already visible from the scope
    #[error("decoration '{0}' is already registered")]
    DuplicateDecoration(String),

    /// No decoration with this name is visible from the scope
    #[error("unknown decoration '{0}'")]
    UnknownDecoration(String),

    /// A route with this method and path is already registered
    #[error("route already registered: {method} {path}")]
    DuplicateRoute {
        /// HTTP method of the conflicting route
        method: String,
        /// Path of the conflicting route
        path: String,
    },

    /// Plugin error
    #[error("plugin '{plugin}': {message}")]
    Plugin {
        /// Plugin name
        plugin: String,
        /// Error message
        message: String,
    },

    /// A call asked for its replaced original, but nothing was replaced
    #[error("no replaced original to call")]
    NoOriginal,

    /// The instance has been closed; wrappers around it are revoked
    #[error("instance has been closed")]
    Closed,

    /// A fixture file could not be loaded
    #[error("fixture {}: {message}", .path.display())]
    Fixture {
        /// Path of the offending fixture file
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a plugin error
    pub fn plugin(plugin: impl Into<String>, message: impl ToString) -> Self {
        Self::Plugin {
            plugin: plugin.into(),
            message: message.to_string(),
        }
    }

    /// Create a fixture error
    pub fn fixture(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Fixture {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Convert the error to an HTTP status code for inject responses
    pub fn to_status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Error::Closed => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::DuplicateDecoration("foo".to_string());
        assert_eq!(err.to_string(), "decoration 'foo' is already registered");

        let err = Error::plugin("bar", "boom");
        assert_eq!(err.to_string(), "plugin 'bar': boom");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            Error::Closed.to_status_code(),
            http::StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            Error::NoOriginal.to_status_code(),
            http::StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
