//! Error types for raster pyramid construction.

use thiserror::Error;

/// Result type alias using PyramidError.
pub type PyramidResult<T> = Result<T, PyramidError>;

/// Primary error type for pyramid operations.
#[derive(Debug, Error)]
pub enum PyramidError {
    // === Input Errors ===
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // === Pyramid Errors ===
    #[error("Cannot merge rasters: {0}")]
    Merge(String),

    #[error("No value range configured for statistic: {0}")]
    RangeResolution(String),

    // === Storage Errors ===
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Invalid raster file: {0}")]
    Format(String),

    // === Rendering Errors ===
    #[error("Rendering failed: {0}")]
    Render(String),
}

impl PyramidError {
    /// Create an InvalidInput error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a Configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a Merge error.
    pub fn merge(msg: impl Into<String>) -> Self {
        Self::Merge(msg.into())
    }

    /// Create a Format error.
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    /// Short, stable name of the error kind, used in build reports and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PyramidError::InvalidInput(_) => "InvalidInput",
            PyramidError::Configuration(_) => "Configuration",
            PyramidError::Merge(_) => "Merge",
            PyramidError::RangeResolution(_) => "RangeResolution",
            PyramidError::Io(_) => "Io",
            PyramidError::Format(_) => "Format",
            PyramidError::Render(_) => "Render",
        }
    }

    /// Whether this error must abort a build before any tile is processed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PyramidError::Configuration(_))
    }
}

// Conversion from common error types
impl From<std::io::Error> for PyramidError {
    fn from(err: std::io::Error) -> Self {
        PyramidError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PyramidError {
    fn from(err: serde_json::Error) -> Self {
        PyramidError::Format(format!("JSON error: {}", err))
    }
}
