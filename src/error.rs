//! # Error types used by the ngbuild core.
//!
//! [`CoreError`] collects the sentinel errors the core exposes to callers
//! (build lifecycle misuse, closed bus, failed provisioning) together with
//! the carrier variants for I/O, JSON, regex and signal failures that bubble
//! up from the boundary.
//!
//! The sentinels are part of the public contract: integrations match on them
//! to distinguish "not yet" from "never" (e.g. [`CoreError::ProcessNotFinished`]
//! vs [`CoreError::ProcessAlreadyFinished`]).

use thiserror::Error;

/// # Errors produced by the ngbuild core.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CoreError {
    /// `exit_code()` was called before the build finished.
    #[error("process not finished")]
    ProcessNotFinished,

    /// A pipe or stream accessor was called before the build started.
    #[error("process not started yet")]
    ProcessNotStarted,

    /// `start()` was called on a build that already started.
    #[error("process already started")]
    ProcessAlreadyStarted,

    /// `stop()` was called on a build that is not running.
    #[error("process already finished")]
    ProcessAlreadyFinished,

    /// The event bus has been shut down.
    #[error("bus is closed")]
    BusClosed,

    /// A regex helper was asked for captures on a non-matching input.
    #[error("could not match regexp")]
    NoRegexMatch,

    /// An integration API was used without an authenticated client.
    #[error("no client available")]
    NoClient,

    /// No attached integration accepted the build's repositories.
    #[error("could not provision with any loaded integration")]
    NoProvider,

    /// A required `BuildConfig` field was empty.
    #[error("{field} is required")]
    InvalidBuildConfig {
        /// Name of the missing field.
        field: &'static str,
    },

    /// No build with the given token exists in the app.
    #[error("couldn't find build '{token}'")]
    BuildNotFound {
        /// The unknown token.
        token: String,
    },

    /// The build's parent app has been dropped.
    #[error("parent app is gone")]
    AppGone,

    /// A configuration file or directory could not be located.
    #[error("configuration missing: {0}")]
    ConfigMissing(&'static str),

    /// A listener pattern failed to compile.
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Filesystem or process I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON (de)serialisation failure.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Signalling the build's process group failed.
    #[cfg(unix)]
    #[error("signal error: {0}")]
    Signal(#[from] nix::Error),
}

impl CoreError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            CoreError::ProcessNotFinished => "process_not_finished",
            CoreError::ProcessNotStarted => "process_not_started",
            CoreError::ProcessAlreadyStarted => "process_already_started",
            CoreError::ProcessAlreadyFinished => "process_already_finished",
            CoreError::BusClosed => "bus_closed",
            CoreError::NoRegexMatch => "no_regex_match",
            CoreError::NoClient => "no_client",
            CoreError::NoProvider => "no_provider",
            CoreError::InvalidBuildConfig { .. } => "invalid_build_config",
            CoreError::BuildNotFound { .. } => "build_not_found",
            CoreError::AppGone => "app_gone",
            CoreError::ConfigMissing(_) => "config_missing",
            CoreError::Pattern(_) => "invalid_pattern",
            CoreError::Io(_) => "io",
            CoreError::Json(_) => "json",
            #[cfg(unix)]
            CoreError::Signal(_) => "signal",
        }
    }
}
