//! Error types for the weekly dashboard service.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A filesystem operation on the data or archive directory failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The static form page could not be read.
    #[error("cannot read form page {path}: {source}")]
    FormPage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading, writing or styling the workbook failed.
    #[error("workbook error: {0:#}")]
    Workbook(#[from] anyhow::Error),

    /// A blocking task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),

    #[error("failed to load configuration: {0}")]
    Config(Box<figment::Error>),

    #[error("invalid configuration: {message}")]
    ConfigValidation { message: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_names_the_path() {
        let err = Error::io(
            "data/dashboard_2026-W42.xlsx",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("data/dashboard_2026-W42.xlsx"));
        assert!(msg.contains("access denied"));
    }

    #[test]
    fn workbook_error_keeps_context_chain() {
        let inner = anyhow::anyhow!("</sheetData> tag not found").context("cannot open sheet");
        let err: Error = inner.into();
        assert_eq!(
            err.to_string(),
            "workbook error: cannot open sheet: </sheetData> tag not found"
        );
    }
}
