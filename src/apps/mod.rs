//! Application containers and their discovery.
//!
//! - **app.rs**: [`App`] — builds grouped by key, bound integrations,
//!   config access and the per-app event bus.
//! - **discovery.rs**: ngbuild-directory probing and app enumeration.

mod app;
mod discovery;

pub use app::App;
pub(crate) use app::AppInner;
pub use discovery::{get_apps, ngbuild_directory};
