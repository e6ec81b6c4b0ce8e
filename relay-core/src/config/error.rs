//! Errors raised while loading and validating relay configuration

use std::fmt;
use thiserror::Error;

/// Failure to produce a usable [`RelayConfig`](super::RelayConfig)
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read relay configuration '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed relay configuration '{path}'{}: {message}", location(.line, .column))]
    ParseError {
        path: String,
        line: Option<usize>,
        column: Option<usize>,
        message: String,
    },

    #[error(transparent)]
    ValidationError(#[from] ValidationError),

    #[error("Environment variable '{var}' is referenced but not set")]
    EnvVarNotFound { var: String },

    #[error("Environment variable '{var}' = '{value}' is not {expected}")]
    InvalidEnvValue {
        var: String,
        value: String,
        expected: String,
    },

    #[error("{message}")]
    Invalid { message: String },
}

fn location(line: &Option<usize>, column: &Option<usize>) -> String {
    match (*line, *column) {
        (Some(line), Some(column)) => format!(" (line {}, column {})", line, column),
        (Some(line), None) => format!(" (line {})", line),
        _ => String::new(),
    }
}

/// A rule broken by one configuration field
#[derive(Debug, Error)]
pub struct ValidationError {
    /// Dotted path of the offending field, e.g. `providers[2].health.cooldown_secs`
    pub field_path: String,
    pub kind: ValidationErrorKind,
    pub context: Option<String>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid relay configuration at '{}': {}", self.field_path, self.kind)?;
        match &self.context {
            Some(ctx) => write!(f, " ({})", ctx),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ValidationErrorKind {
    #[error("field is required")]
    Missing,

    #[error("expected {expected}, got '{actual}'")]
    InvalidValue { expected: String, actual: String },

    #[error("{message}")]
    OutOfRange { message: String },

    #[error("{message}")]
    InvalidFormat { message: String },

    #[error("'{value}' appears more than once")]
    Duplicate { value: String },

    #[error("{message}")]
    Conflict { message: String },

    #[error("not a usable URL: {message}")]
    InvalidUrl { message: String },

    #[error("version '{found}' is not supported (supported: {supported})")]
    UnsupportedVersion { supported: String, found: String },
}

impl ValidationError {
    pub fn new(field_path: impl Into<String>, kind: ValidationErrorKind) -> Self {
        Self {
            field_path: field_path.into(),
            kind,
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn required(field_path: impl Into<String>) -> Self {
        Self::new(field_path, ValidationErrorKind::Missing)
    }

    pub fn invalid_value(
        field_path: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        let kind = ValidationErrorKind::InvalidValue {
            expected: expected.into(),
            actual: actual.into(),
        };
        Self::new(field_path, kind)
    }

    pub fn out_of_range(field_path: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(field_path, ValidationErrorKind::OutOfRange { message })
    }

    pub fn invalid_format(field_path: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(field_path, ValidationErrorKind::InvalidFormat { message })
    }

    pub fn duplicate(field_path: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        Self::new(field_path, ValidationErrorKind::Duplicate { value })
    }

    /// Two settings that cannot hold at the same time
    pub fn conflict(field_path: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(field_path, ValidationErrorKind::Conflict { message })
    }

    pub fn invalid_url(field_path: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(field_path, ValidationErrorKind::InvalidUrl { message })
    }

    pub fn unsupported_version(supported: impl Into<String>, found: impl Into<String>) -> Self {
        let kind = ValidationErrorKind::UnsupportedVersion {
            supported: supported.into(),
            found: found.into(),
        };
        Self::new("version", kind)
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
