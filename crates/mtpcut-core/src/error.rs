//! Unified error type for the cutting-plane workspace.
//!
//! The variants follow the failure classes of a batch run: configuration,
//! case data and scenario data are fatal before the round loop starts, solver
//! failures are terminal inside it. Crate-specific error types convert into
//! [`MtpError`] at API boundaries.
//!
//! ```
//! use mtpcut_core::{MtpError, MtpResult};
//!
//! fn check_periods(t: usize) -> MtpResult<()> {
//!     if t == 0 {
//!         return Err(MtpError::Config("T must be positive".into()));
//!     }
//!     Ok(())
//! }
//! assert!(check_periods(0).is_err());
//! ```

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MtpError {
    /// I/O errors (file access)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or unreadable configuration, unknown keys
    #[error("Configuration error: {0}")]
    Config(String),

    /// Missing or malformed case file
    #[error("Case read error: {0}")]
    CaseRead(String),

    /// Missing or malformed loads/ramp data for the selected policy
    #[error("Scenario error: {0}")]
    Scenario(String),

    /// Solver failure (infeasible, unbounded, numerical)
    #[error("Solver error: {0}")]
    Solver(String),

    /// Data validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0}")]
    Other(String),
}

pub type MtpResult<T> = Result<T, MtpError>;

impl From<anyhow::Error> for MtpError {
    fn from(err: anyhow::Error) -> Self {
        MtpError::Other(format!("{err:#}"))
    }
}

impl From<serde_json::Error> for MtpError {
    fn from(err: serde_json::Error) -> Self {
        MtpError::Other(err.to_string())
    }
}

impl MtpError {
    /// Fatal errors abort the run before the round loop starts.
    pub fn is_fatal_at_start(&self) -> bool {
        matches!(
            self,
            MtpError::Config(_) | MtpError::CaseRead(_) | MtpError::Scenario(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MtpError::Config("main_mtp: illegal input foo".into());
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("foo"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: MtpError = io_err.into();
        assert!(matches!(err, MtpError::Io(_)));
    }

    #[test]
    fn test_fatal_classes() {
        assert!(MtpError::Scenario("missing".into()).is_fatal_at_start());
        assert!(MtpError::CaseRead("missing".into()).is_fatal_at_start());
        assert!(!MtpError::Solver("infeasible".into()).is_fatal_at_start());
    }

    #[test]
    fn test_anyhow_context_preserved() {
        let err: MtpError = anyhow::anyhow!("inner").context("outer").into();
        let msg = err.to_string();
        assert!(msg.contains("outer") && msg.contains("inner"));
    }
}
