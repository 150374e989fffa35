//! One-producer/many-consumer byte fan-out.
//!
//! A child process produces its output exactly once; every interested party
//! (web recorder, chat notifier, further integrations) wants an independent,
//! blocking, restartable view of it. [`PipeStream`] reads the producer a
//! single time into an append-only buffer and hands out any number of
//! [`PipeReader`] cursors, each replaying from offset zero — including
//! cursors attached after the producer finished.
//!
//! [`StdioStreams`] is the companion form wrapping a stdout/stderr pair in
//! one object, with a combined done-signal used by the build supervisor.

mod stdio;
mod stream;

pub use stdio::StdioStreams;
pub use stream::{PipeReader, PipeStream};
