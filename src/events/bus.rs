//! # Regex-addressed event bus.
//!
//! [`EventBus`] maps compiled regular expressions to ordered subscriber
//! lists. An emitted topic string is queued on a bounded channel; a single
//! core loop dequeues topics and, for every pattern that matches, invokes
//! each subscriber with the named-capture map.
//!
//! ## Key characteristics
//! - **Pattern reuse**: two listeners on the same pattern source share one
//!   compiled regex and one subscriber list
//! - **Serial dispatch**: subscribers for one topic run in registration
//!   order and complete before the next topic is dispatched
//! - **Back-pressure**: `emit` suspends only when the 128-slot queue is full
//! - **Cancellation**: every listener gets a process-unique [`HandlerId`]
//!
//! ## Rules
//! - Callbacks must not block indefinitely; long-running work is the
//!   callback's responsibility to offload
//! - A panicking callback is caught and logged; the bus survives
//! - After [`EventBus::close`], `emit` is a no-op and `add_listener` returns
//!   [`CoreError::BusClosed`]

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use regex::Regex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::CoreError;
use crate::events::pattern;

/// Capacity of the internal topic queue.
const EVENT_QUEUE_CAPACITY: usize = 128;

/// Cancellation handle for a listener registered with
/// [`EventBus::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct BusListener {
    id: HandlerId,
    callback: Box<dyn Fn(&HashMap<String, String>) + Send + Sync>,
}

struct PatternSubscribers {
    source: String,
    pattern: Regex,
    listeners: Vec<BusListener>,
}

struct BusShared {
    patterns: RwLock<Vec<PatternSubscribers>>,
    closed: AtomicBool,
    handler_seq: AtomicU64,
}

impl BusShared {
    /// Dispatches one topic to every matching subscriber.
    ///
    /// The subscriber list stays locked for the duration of the dispatch so
    /// `remove_handler` has strict semantics: once it returns, the callback
    /// will not fire again.
    fn fire(&self, topic: &str) {
        let patterns = self.patterns.read();
        for entry in patterns.iter() {
            let Ok(captures) = pattern::named_group_matches(&entry.pattern, topic) else {
                continue;
            };

            for listener in &entry.listeners {
                let call = AssertUnwindSafe(|| (listener.callback)(&captures));
                if std::panic::catch_unwind(call).is_err() {
                    tracing::error!(pattern = %entry.source, topic, "event listener panicked");
                }
            }
        }
    }
}

/// Per-app publish/subscribe bus keyed by regular expressions.
#[derive(Clone)]
pub struct EventBus {
    shared: Arc<BusShared>,
    tx: mpsc::Sender<String>,
    done: CancellationToken,
}

impl EventBus {
    /// Creates a bus and spawns its core dispatch loop.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let shared = Arc::new(BusShared {
            patterns: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
            handler_seq: AtomicU64::new(0),
        });
        let done = CancellationToken::new();

        tokio::spawn(Self::core_loop(rx, Arc::downgrade(&shared), done.clone()));

        Self { shared, tx, done }
    }

    /// Dequeues topics until the bus is closed or every handle is dropped.
    async fn core_loop(
        mut rx: mpsc::Receiver<String>,
        shared: Weak<BusShared>,
        done: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = done.cancelled() => break,
                topic = rx.recv() => {
                    let Some(topic) = topic else { break };
                    let Some(shared) = shared.upgrade() else { break };
                    shared.fire(&topic);
                }
            }
        }

        if let Some(shared) = shared.upgrade() {
            shared.closed.store(true, AtomicOrdering::SeqCst);
        }
    }

    /// Registers `listener` for every topic matching `pattern`.
    ///
    /// The pattern is compiled once per distinct source string; later
    /// registrations with the same source share the compiled regex. Returns a
    /// fresh monotone [`HandlerId`] usable with
    /// [`remove_handler`](Self::remove_handler).
    pub fn add_listener<F>(&self, pattern: &str, listener: F) -> Result<HandlerId, CoreError>
    where
        F: Fn(&HashMap<String, String>) + Send + Sync + 'static,
    {
        if self.is_closed() {
            return Err(CoreError::BusClosed);
        }

        let id = HandlerId(self.shared.handler_seq.fetch_add(1, AtomicOrdering::SeqCst) + 1);
        let subscriber = BusListener {
            id,
            callback: Box::new(listener),
        };

        let mut patterns = self.shared.patterns.write();
        if let Some(entry) = patterns.iter_mut().find(|p| p.source == pattern) {
            entry.listeners.push(subscriber);
            return Ok(id);
        }

        let compiled = Regex::new(pattern)?;
        patterns.push(PatternSubscribers {
            source: pattern.to_string(),
            pattern: compiled,
            listeners: vec![subscriber],
        });

        Ok(id)
    }

    /// Cancels the listener with the given id.
    ///
    /// Linear scan across all patterns; a pattern that loses its last
    /// subscriber is dropped entirely.
    pub fn remove_handler(&self, id: HandlerId) {
        let mut patterns = self.shared.patterns.write();
        for index in 0..patterns.len() {
            if let Some(pos) = patterns[index].listeners.iter().position(|l| l.id == id) {
                patterns[index].listeners.remove(pos);
                if patterns[index].listeners.is_empty() {
                    patterns.remove(index);
                }
                return;
            }
        }
    }

    /// Queues a topic for dispatch.
    ///
    /// Suspends only while the internal queue is full. Emitting on a closed
    /// bus silently drops the topic.
    pub async fn emit(&self, topic: impl Into<String>) {
        if self.is_closed() {
            return;
        }
        let _ = self.tx.send(topic.into()).await;
    }

    /// Shuts the bus down: the core loop exits and later `emit` /
    /// `add_listener` calls observe the closed flag.
    pub fn close(&self) {
        self.shared.closed.store(true, AtomicOrdering::SeqCst);
        self.done.cancel();
    }

    /// Whether the bus has been shut down.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(AtomicOrdering::SeqCst)
    }

    #[cfg(test)]
    fn pattern_count(&self) -> usize {
        self.shared.patterns.read().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
