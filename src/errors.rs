// src/errors.rs

//! Crate-wide error types.
//!
//! [`LoadError`] is the job-status taxonomy: everything a waiter can see
//! re-raised from [`crate::LoadJob::wait`], plus the synchronous cycle
//! rejection from [`crate::LoadTask::schedule`]. It is `Clone` because the
//! same stored error is handed to every waiter of a job.
//!
//! [`ConfigError`] covers configuration loading and is kept separate so that
//! `std::io::Error` / `toml::de::Error` conversions do not leak into the
//! cloneable job taxonomy.

use thiserror::Error;

/// Errors produced by the loader and re-raised to waiters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// The submitted jobs contain a dependency cycle. Raised synchronously
    /// from `LoadTask::schedule`; no scheduler state is changed. The message
    /// names exactly the jobs lying on the cycle.
    #[error("load job dependency cycle detected: {0}")]
    Cycle(String),

    /// The job's function returned an error (or panicked).
    #[error("load job '{name}' failed: {message}")]
    Failed { name: String, message: String },

    /// The job was canceled before it could run: its owning task was
    /// removed, or a dependency failed or was canceled. When the cause is a
    /// dependency, `message` embeds the dependency's full error text so the
    /// root cause survives any number of propagation hops.
    #[error("load job '{name}' canceled: {message}")]
    Canceled { name: String, message: String },
}

impl LoadError {
    /// True for the `Cycle` variant.
    pub fn is_cycle(&self) -> bool {
        matches!(self, LoadError::Cycle(_))
    }

    /// True for the `Failed` variant.
    pub fn is_failed(&self) -> bool {
        matches!(self, LoadError::Failed { .. })
    }

    /// True for the `Canceled` variant.
    pub fn is_canceled(&self) -> bool {
        matches!(self, LoadError::Canceled { .. })
    }
}

/// Errors produced while loading or validating a [`crate::LoaderConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, LoadError>;
