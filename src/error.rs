//! Error taxonomy shared by the pricing, conflict, optimizer and simulation layers.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One rejected request field and everything wrong with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field: String,
    pub messages: Vec<String>,
}

/// A malformed request. Carries every issue found, not just the first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        let field = field.into();
        let message = message.into();
        match self.issues.iter_mut().find(|issue| issue.field == field) {
            Some(issue) => issue.messages.push(message),
            None => self.issues.push(ValidationIssue {
                field,
                messages: vec![message],
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// `Ok(())` when nothing was pushed.
    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid request")?;
        for (i, issue) in self.issues.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{} {}", issue.field, issue.messages.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Error)]
pub enum DataError {
    #[error("course {0} not found in catalog")]
    UnknownCourse(u32),

    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("xlsx error: {0}")]
    Xlsx(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("row {row}: {message}")]
    InvalidRecord { row: usize, message: String },

    #[error("invalid time '{0}', expected HH:MM or HH:MM:SS")]
    InvalidTime(String),

    #[error("catalog failed validation with {} issue(s)", .0.len())]
    InvalidCatalog(Vec<String>),

    #[error("unsupported data file '{}'", .0.display())]
    UnsupportedFormat(PathBuf),
}

/// Price-table lookup failures. Both are fatal for the run that hit them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PriceError {
    #[error("seed {seed} is not a column of the z-score table")]
    UnknownSeed { seed: u64 },

    #[error("z-score index {index} outside table of {rows} rows")]
    IndexOutOfRange { index: i64, rows: usize },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    #[error("solver exceeded deadline of {0:?}")]
    Timeout(Duration),

    #[error("solver failed: {0}")]
    Backend(String),

    #[error("solver worker exited without a result")]
    WorkerLost,

    #[error("solver returned an infeasible assignment: {0}")]
    InvalidSolution(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Price(#[from] PriceError),

    #[error(transparent)]
    Solver(#[from] SolverError),
}

/// Coarse category of an [Error], used to tag failed simulation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Data,
    Configuration,
    IndexOutOfRange,
    Solver,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Data(_) => ErrorKind::Data,
            Self::Price(PriceError::UnknownSeed { .. }) => ErrorKind::Configuration,
            Self::Price(PriceError::IndexOutOfRange { .. }) => ErrorKind::IndexOutOfRange,
            Self::Solver(_) => ErrorKind::Solver,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
