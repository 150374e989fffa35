//! Build execution: configuration, state machine and the per-build
//! supervisor.
//!
//! ## Files & responsibilities
//! - **config.rs**: [`BuildConfig`] inputs, guarded metadata, validation.
//! - **state.rs**: lock-free lifecycle state with `has_started`/`has_stopped`
//!   predicates.
//! - **build.rs**: [`Build`] itself; workspace provisioning hand-off, child
//!   process supervision, deadline enforcement, zombie detection, reference
//!   counting and history access.
//! - **workspace.rs**: unique workspace directories under `buildLocation`.
//! - **proc.rs**: zombie probing and process-group signalling.

mod build;
mod config;
mod proc;
mod state;
mod workspace;

pub use build::{
    Build, EXIT_LOST_PROCESS, EXIT_NO_PROVIDER, EXIT_RUNNER_FAILED, EXIT_STOP_FAILED, EXIT_SUCCESS,
};
pub use config::{BuildConfig, Metadata};
