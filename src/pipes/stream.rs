//! # Single-stream pipe multiplexer.
//!
//! [`PipeStream`] owns one readable byte source and a growing in-memory
//! buffer. A dedicated pump task copies the source into the buffer in
//! chunks, waking waiting readers after every append, and marks the stream
//! closed on EOF or error. [`PipeReader`] is an independent cursor over the
//! buffer.
//!
//! ## Rules
//! - The buffer is append-only for the life of the multiplexer
//! - A cursor's position never decreases; two cursors at the same offset
//!   always observe the same bytes
//! - Readers attached at any time (including after close) replay the full
//!   history from offset zero
//! - After EOF, reads return `Ok(0)` indefinitely

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Chunk size for the pump task's reads.
const READ_CHUNK: usize = 1024;

#[derive(Debug)]
struct PipeShared {
    buf: RwLock<Vec<u8>>,
    /// Buffer length mirror; lets readers poll availability lock-free.
    len: AtomicUsize,
    closed: AtomicBool,
    wake: Notify,
}

impl PipeShared {
    fn append(&self, chunk: &[u8]) {
        let mut buf = self.buf.write();
        buf.extend_from_slice(chunk);
        self.len.store(buf.len(), AtomicOrdering::Release);
        drop(buf);
        self.wake.notify_waiters();
    }

    fn close(&self) {
        self.closed.store(true, AtomicOrdering::Release);
        self.wake.notify_waiters();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(AtomicOrdering::Acquire)
    }
}

/// Fan-out multiplexer over one byte source.
pub struct PipeStream {
    shared: Arc<PipeShared>,
    pump: JoinHandle<()>,
}

impl PipeStream {
    /// Starts multiplexing `source`.
    ///
    /// The pump task runs until the source reports EOF or an error; non-EOF
    /// errors are logged and treated as end of stream, so readers drain the
    /// bytes buffered so far and then observe EOF.
    pub fn new<R>(source: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let shared = Arc::new(PipeShared {
            buf: RwLock::new(Vec::new()),
            len: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            wake: Notify::new(),
        });

        let pump = tokio::spawn(Self::run_pump(source, shared.clone()));

        Self { shared, pump }
    }

    async fn run_pump<R>(mut source: R, shared: Arc<PipeShared>)
    where
        R: AsyncRead + Unpin,
    {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match source.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => shared.append(&chunk[..n]),
                Err(err) => {
                    tracing::error!("pipe read errored: {err}");
                    break;
                }
            }
        }
        shared.close();
    }

    /// Returns a fresh cursor positioned at offset zero.
    pub fn new_reader(&self) -> PipeReader {
        PipeReader {
            shared: self.shared.clone(),
            position: 0,
        }
    }

    /// Whether the stream has reached EOF (or was force-closed).
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Number of bytes buffered so far.
    pub fn len(&self) -> usize {
        self.shared.len.load(AtomicOrdering::Acquire)
    }

    /// Whether no bytes have been buffered yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Force-closes the stream: stops the pump and wakes all readers.
    ///
    /// Used when the producer is known dead while its pipe is still held
    /// open by a grandchild process. Buffered bytes remain readable.
    pub fn close(&self) {
        self.pump.abort();
        self.shared.close();
    }

    /// Resolves once the stream is closed.
    pub async fn closed(&self) {
        loop {
            let notified = self.shared.wake.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.shared.is_closed() {
                return;
            }
            notified.await;
        }
    }
}

impl Drop for PipeStream {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Independent, restartable cursor over a [`PipeStream`] buffer.
#[derive(Debug)]
pub struct PipeReader {
    shared: Arc<PipeShared>,
    position: usize,
}

impl PipeReader {
    /// Reads buffered bytes at the cursor into `buf`.
    ///
    /// Returns at least one byte whenever data is available at or after the
    /// cursor, `Ok(0)` iff the cursor sits at the final buffer length and
    /// the stream is closed, and suspends otherwise. A zero-length `buf` is
    /// an error, never a suspension.
    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "buffer is too small to read any data",
            ));
        }

        loop {
            let notified = self.shared.wake.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.position < self.shared.len.load(AtomicOrdering::Acquire) {
                let cache = self.shared.buf.read();
                let n = buf.len().min(cache.len() - self.position);
                buf[..n].copy_from_slice(&cache[self.position..self.position + n]);
                self.position += n;
                return Ok(n);
            }

            if self.shared.is_closed() {
                return Ok(0);
            }

            notified.await;
        }
    }

    /// Drains the stream from the cursor to EOF.
    pub async fn read_to_end(&mut self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.read(&mut chunk).await? {
                0 => return Ok(out),
                n => out.extend_from_slice(&chunk[..n]),
            }
        }
    }

    /// Drains the stream from the cursor to EOF as UTF-8 text.
    pub async fn read_to_string(&mut self) -> io::Result<String> {
        let bytes = self.read_to_end().await?;
        String::from_utf8(bytes)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }

    /// Current cursor offset.
    pub fn position(&self) -> usize {
        self.position
    }
}
