//! # Atomic build state.
//!
//! The state is a bitfield-style `u32` so the two hot predicates —
//! "has this build ever started" and "has it finished" — are single atomic
//! loads with no lock. Transitions are strictly forward:
//!
//! ```text
//! null ──▶ waiting-for-provisioning ──▶ started ──▶ finished
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

use crate::error::CoreError;

const NULL: u32 = 0;
const WAITING_FOR_PROVISIONING: u32 = 1 << 1;
const STARTED: u32 = 1 << 2;
const FINISHED: u32 = 1 << 3;

/// Lock-free build lifecycle state.
pub(crate) struct BuildState(AtomicU32);

impl BuildState {
    pub(crate) fn new() -> Self {
        Self(AtomicU32::new(NULL))
    }

    /// True once the build left the null state, in any direction.
    pub(crate) fn has_started(&self) -> bool {
        self.0.load(AtomicOrdering::SeqCst) != NULL
    }

    /// True once the build reached its terminal state.
    pub(crate) fn has_stopped(&self) -> bool {
        self.0.load(AtomicOrdering::SeqCst) & FINISHED != 0
    }

    /// One-shot null → waiting-for-provisioning transition; the second and
    /// every later attempt observes a non-null state and fails.
    pub(crate) fn begin_provisioning(&self) -> Result<(), CoreError> {
        self.0
            .compare_exchange(
                NULL,
                WAITING_FOR_PROVISIONING,
                AtomicOrdering::SeqCst,
                AtomicOrdering::SeqCst,
            )
            .map(|_| ())
            .map_err(|_| CoreError::ProcessAlreadyStarted)
    }

    pub(crate) fn set_started(&self) {
        self.0.store(STARTED, AtomicOrdering::SeqCst);
    }

    pub(crate) fn set_finished(&self) {
        self.0.store(FINISHED, AtomicOrdering::SeqCst);
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.0.load(AtomicOrdering::SeqCst) {
            NULL => "null",
            WAITING_FOR_PROVISIONING => "waiting for provisioning",
            STARTED => "started",
            FINISHED => "finished",
            _ => "unknown",
        };
        f.write_str(name)
    }
}
