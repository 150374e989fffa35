//! Regex-addressed events: topics, pattern matching and the per-app bus.
//!
//! This module groups the topic **grammar**, the named-group **matcher** and
//! the **bus** used by apps, builds and integrations to publish/subscribe to
//! lifecycle topics.
//!
//! ## Contents
//! - [`EventBus`], [`HandlerId`] regex-keyed pub/sub with cancellable handlers
//! - [`topics`] the well-known topic constants and builder functions
//! - [`pattern`] named-capture extraction shared by the bus and integrations
//!
//! ## Quick reference
//! - **Publishers**: builds (`/provisioning/`, `/started/`, `/complete/`),
//!   apps (`/log/…`), and any integration via `App::send_event`.
//! - **Consumers**: anything registered through `App::listen`; callbacks run
//!   serially on the bus core loop, in registration order, one topic at a
//!   time.

mod bus;
pub mod pattern;
pub mod topics;

pub use bus::{EventBus, HandlerId};
pub use topics::LogLevel;
