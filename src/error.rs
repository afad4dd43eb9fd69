use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ImageError>;

/// A single schema or range violation found while validating tool arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Coarse classification of an upstream failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    RateLimited,
    InvalidRequest,
    ContentPolicy,
    Authentication,
    Server,
    Other,
}

impl RemoteErrorKind {
    pub fn from_status(status: u16, code: Option<&str>) -> Self {
        if matches!(code, Some("content_policy_violation" | "moderation_blocked")) {
            return Self::ContentPolicy;
        }
        match status {
            401 | 403 => Self::Authentication,
            429 => Self::RateLimited,
            400 | 404 | 413 | 422 => Self::InvalidRequest,
            500..=599 => Self::Server,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::RateLimited => "rate limited",
            Self::InvalidRequest => "invalid request",
            Self::ContentPolicy => "content policy rejection",
            Self::Authentication => "authentication failed",
            Self::Server => "server error",
            Self::Other => "request failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("{0}")]
    Configuration(String),

    #[error("invalid parameters: {}", join_violations(.0))]
    Validation(Vec<FieldViolation>),

    #[error("invalid prompt: {0}")]
    InvalidPrompt(String),

    #[error("{kind} not found: {}", .path.display())]
    FileNotFound { kind: &'static str, path: PathBuf },

    #[error("{kind} is not readable: {}: {message}", .path.display())]
    FileRead {
        kind: &'static str,
        path: PathBuf,
        message: String,
    },

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("image API {kind}{}: {message}", status_suffix(.status))]
    RemoteApi {
        kind: RemoteErrorKind,
        status: Option<u16>,
        message: String,
    },

    #[error("No images were generated")]
    EmptyResult,

    #[error("failed to write {}: {message}", .path.display())]
    Write { path: PathBuf, message: String },

    #[error("image payload is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

impl ImageError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldViolation::new(field, message)])
    }

    /// Classifies a failure to open or read a caller-supplied input file.
    pub fn file_read(kind: &'static str, path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        let path = path.into();
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::FileNotFound { kind, path }
        } else {
            Self::FileRead {
                kind,
                path,
                message: err.to_string(),
            }
        }
    }

    pub fn remote(kind: RemoteErrorKind, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::RemoteApi {
            kind,
            status,
            message: message.into(),
        }
    }

    pub fn write(path: impl Into<PathBuf>, err: impl fmt::Display) -> Self {
        Self::Write {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for ImageError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            RemoteErrorKind::Server
        } else {
            RemoteErrorKind::Other
        };
        Self::remote(kind, err.status().map(|s| s.as_u16()), err.to_string())
    }
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|code| format!(" (HTTP {code})")).unwrap_or_default()
}
