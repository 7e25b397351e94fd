//! Errors raised by background task handlers.
//!
//! The worker retries recoverable errors within the task's retry budget and fails
//! unrecoverable ones immediately (bad CSV, missing source file, cancelled report).

use std::fmt;

use crate::error::{AppError, ErrorMetadata};

#[derive(Debug)]
pub struct TaskError {
    inner: anyhow::Error,
    recoverable: bool,
}

impl TaskError {
    /// Fail the task without consuming further retries.
    pub fn unrecoverable(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            recoverable: false,
        }
    }

    /// Fail this attempt; the queue reschedules while retries remain.
    pub fn recoverable(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            recoverable: true,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.recoverable
    }

    pub fn inner(&self) -> &anyhow::Error {
        &self.inner
    }

    pub fn into_inner(self) -> anyhow::Error {
        self.inner
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl From<anyhow::Error> for TaskError {
    fn from(err: anyhow::Error) -> Self {
        Self::recoverable(err)
    }
}

impl From<AppError> for TaskError {
    /// Recoverability follows the error's own metadata, so a CSV format error
    /// or a state conflict is never retried.
    fn from(err: AppError) -> Self {
        let recoverable = err.is_recoverable();
        Self {
            inner: anyhow::Error::new(err),
            recoverable,
        }
    }
}

pub trait TaskResultExt<T> {
    /// Mark this result as unrecoverable on error
    fn unrecoverable(self) -> Result<T, TaskError>;
}

impl<T, E: Into<anyhow::Error>> TaskResultExt<T> for Result<T, E> {
    fn unrecoverable(self) -> Result<T, TaskError> {
        self.map_err(|e| TaskError::unrecoverable(e.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unrecoverable_error() {
        let err = TaskError::unrecoverable(anyhow::anyhow!("source CSV missing"));
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("source CSV missing"));
    }

    #[test]
    fn test_from_anyhow_is_recoverable() {
        let err: TaskError = anyhow::anyhow!("blob storage timeout").into();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_from_app_error_follows_metadata() {
        let csv: TaskError = AppError::CsvFormat {
            message: "missing column Category".to_string(),
            row_errors: vec![],
        }
        .into();
        assert!(!csv.is_recoverable());

        let storage: TaskError = AppError::Storage("connection reset".to_string()).into();
        assert!(storage.is_recoverable());
        assert!(storage.inner().downcast_ref::<AppError>().is_some());
    }

    #[test]
    fn test_result_ext() {
        let result: Result<(), anyhow::Error> = Err(anyhow::anyhow!("report cancelled"));
        let task_result = result.unrecoverable();
        assert!(!task_result.unwrap_err().is_recoverable());
    }
}
