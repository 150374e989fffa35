//! # Paired stdout/stderr multiplexers.
//!
//! The build supervisor tees both output streams of a child process. This
//! wrapper holds one [`PipeStream`] per stream and exposes a combined
//! done-signal that resolves only when **both** streams have closed, which
//! is the supervisor's cue that the child is ready to be waited on.

use tokio::io::AsyncRead;

use crate::pipes::{PipeReader, PipeStream};

/// Named stdout+stderr multiplexer pair.
pub struct StdioStreams {
    stdout: PipeStream,
    stderr: PipeStream,
}

impl StdioStreams {
    /// Wraps the two output streams of a child process.
    pub fn new<O, E>(stdout: O, stderr: E) -> Self
    where
        O: AsyncRead + Send + Unpin + 'static,
        E: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            stdout: PipeStream::new(stdout),
            stderr: PipeStream::new(stderr),
        }
    }

    /// Fresh replay cursor over the child's stdout.
    pub fn stdout_reader(&self) -> PipeReader {
        self.stdout.new_reader()
    }

    /// Fresh replay cursor over the child's stderr.
    pub fn stderr_reader(&self) -> PipeReader {
        self.stderr.new_reader()
    }

    /// Resolves once both streams are closed.
    pub async fn done(&self) {
        tokio::join!(self.stdout.closed(), self.stderr.closed());
    }

    /// Whether both streams are closed.
    pub fn is_done(&self) -> bool {
        self.stdout.is_closed() && self.stderr.is_closed()
    }

    /// Force-closes both streams; buffered bytes remain readable.
    pub fn close(&self) {
        self.stdout.close();
        self.stderr.close();
    }
}
