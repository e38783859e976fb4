use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Failures of the credential file and of account mutations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("login and agent name are required")]
    MissingField,

    #[error("login '{0}' already exists")]
    DuplicateLogin(String),

    #[error("you cannot delete your own account")]
    SelfDelete,

    #[error("login '{0}' not found")]
    UnknownLogin(String),

    #[error("credential file {path} is not valid JSON: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to access credential file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize accounts: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid login or password")]
    InvalidCredentials,

    #[error("first access: change your password before opening the dashboard")]
    PasswordChangeRequired,

    #[error("this action requires an admin account")]
    AdminOnly,

    #[error("both password fields must be filled in")]
    EmptyPassword,

    #[error("passwords do not match")]
    PasswordMismatch,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Non-fatal conditions recorded while loading a dataset.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    MissingSource {
        path: PathBuf,
    },
    MalformedRow {
        path: PathBuf,
        line: u64,
        reason: String,
    },
    SchemaMismatch {
        path: PathBuf,
        missing: Vec<&'static str>,
    },
    SkippedSource {
        path: PathBuf,
        reason: String,
    },
}

impl Diagnostic {
    /// Emits the diagnostic as a log event at the level its kind calls for.
    pub fn log(&self) {
        match self {
            Diagnostic::MissingSource { .. } => tracing::info!("{self}"),
            _ => tracing::warn!("{self}"),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::MissingSource { path } => {
                write!(f, "source {} not found", path.display())
            }
            Diagnostic::MalformedRow { path, line, reason } => {
                write!(f, "skipped row {line} of {}: {reason}", path.display())
            }
            Diagnostic::SchemaMismatch { path, missing } => write!(
                f,
                "{} is missing expected columns: {}",
                path.display(),
                missing.join(", ")
            ),
            Diagnostic::SkippedSource { path, reason } => {
                write!(f, "skipped {}: {reason}", path.display())
            }
        }
    }
}
