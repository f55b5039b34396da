//! Error types for the WBR build pipeline.
//!
//! Fatal errors abort the request and carry enough context (`kind`, `path`,
//! `detail`) to report a structured failure. Non-fatal conditions never show
//! up here: an undefined value in a rollup period renders as `"N/A"`, and an
//! annotation that cannot be attached becomes an entry in the deck's
//! `eventErrors` list.

/// Result type for WBR operations.
pub type WbrResult<T> = Result<T, WbrError>;

/// Error type for the WBR pipeline.
#[derive(Debug, thiserror::Error)]
pub enum WbrError {
    /// YAML parse/validation failures, unknown metric references, dependency
    /// cycles, reserved-suffix collisions, malformed scaling masks.
    #[error("Configuration error at {path}: {message}")]
    Config { path: String, message: String },

    /// Source data problems: missing `Date` column, unparseable dates, no
    /// rows for the configured week ending.
    #[error("Data error: {message}")]
    Data { message: String },

    /// Credential lookup, driver connect, or query execution failures.
    #[error("Connection error for '{source_name}': {message}")]
    Connection { source_name: String, message: String },

    /// Unexpected condition; reported with a sanitized message.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl WbrError {
    /// Create a configuration error with a config path such as
    /// `metrics.ClickThruRate.function`.
    pub fn config(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a data error.
    pub fn data(message: impl Into<String>) -> Self {
        Self::Data {
            message: message.into(),
        }
    }

    /// Create a connection error tagged with the failing source or
    /// connection name.
    pub fn connection(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// The error kind as a stable lowercase tag, used in structured
    /// responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Data { .. } => "data",
            Self::Connection { .. } => "connection",
            Self::Internal { .. } => "internal",
        }
    }
}

impl From<std::io::Error> for WbrError {
    fn from(err: std::io::Error) -> Self {
        WbrError::data(format!("I/O error: {}", err))
    }
}

impl From<serde_yaml::Error> for WbrError {
    fn from(err: serde_yaml::Error) -> Self {
        WbrError::config("yaml", err.to_string())
    }
}
