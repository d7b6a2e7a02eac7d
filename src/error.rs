// src/error.rs

use thiserror::Error;

/// How far an error is allowed to propagate
///
/// - `Fatal`: the whole run stops after cleanup
/// - `Package`: the package being processed fails, the others carry on
/// - `Advisory`: printed, processing continues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Fatal,
    Package,
    Advisory,
}

/// Core error types for Settle
#[derive(Error, Debug)]
pub enum Error {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database initialization error
    #[error("Failed to initialize database: {0}")]
    InitError(String),

    /// Database not found
    #[error("Database not found at path: {0}")]
    DatabaseNotFound(String),

    /// Another process holds the administrative lock
    #[error("status database area is locked by another process ({0})")]
    Locked(String),

    /// Lock file could not be created or locked for a reason other than contention
    #[error("unable to lock status database area: {0}")]
    LockFailed(String),

    /// Invalid package name
    #[error("illegal package name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// Invalid version string
    #[error("invalid version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },

    /// Malformed administrative or control file
    #[error("parse error in {0}")]
    ParseError(String),

    /// Package is in a state that the requested action cannot start from
    #[error("{0}")]
    NotReady(String),

    /// Illegal status change
    #[error("package {package}: illegal status change from {from} to {to}")]
    InvalidTransition {
        package: String,
        from: String,
        to: String,
    },

    /// Unsatisfiable dependencies
    #[error("dependency problems - leaving unconfigured")]
    DependencyProblem { package: String, details: String },

    /// Package flagged as requiring reinstallation
    #[error("Package is in a very bad inconsistent state - you should\n reinstall it before attempting configuration.")]
    ReinstallRequired(String),

    /// Symlink chain too long while dereferencing a conffile
    #[error("{package}: config file '{path}' is a circular link\n (= '{resolved}')")]
    CircularLink {
        package: String,
        path: String,
        resolved: String,
    },

    /// Conffile could not be dereferenced (readlink failure, odd file type)
    #[error("{0}")]
    ConffileDeref(String),

    /// The resolved conffile could not be moved into place
    #[error("unable to install '{from}' as '{to}': {source}")]
    ConffileInstall {
        from: String,
        to: String,
        source: std::io::Error,
    },

    /// Interactive prompt could not be completed
    #[error("{0}")]
    Prompt(String),

    /// Maintainer script failed
    #[error("subprocess {script} {status}")]
    ScriptFailed { script: String, status: String },

    /// Maintainer script could not be started
    #[error("unable to execute {0}")]
    ScriptSpawn(String),

    /// Trigger processing loops without making progress
    #[error("trigger cycle detected while processing {0}")]
    TriggerCycle(String),

    /// Diversion table violates its invariants
    #[error("diversions: {0}")]
    Diversion(String),
}

impl Error {
    /// Classify this error within the fatal / per-package / advisory taxonomy
    pub fn severity(&self) -> Severity {
        match self {
            Error::Database(_)
            | Error::InitError(_)
            | Error::DatabaseNotFound(_)
            | Error::LockFailed(_)
            | Error::ConffileInstall { .. }
            | Error::Diversion(_) => Severity::Fatal,
            Error::CircularLink { .. } | Error::ConffileDeref(_) => Severity::Advisory,
            _ => Severity::Package,
        }
    }

    /// True when the whole run has to stop
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

/// Result type alias using Settle's Error type
pub type Result<T> = std::result::Result<T, Error>;
