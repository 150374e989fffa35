//! # ngbuild
//!
//! **ngbuild** is a small continuous-integration orchestrator core: it
//! watches source-control events through pluggable integrations, runs build
//! scripts in isolated workspaces and fans build lifecycle events out to
//! downstream notifiers.
//!
//! ## Features
//!
//! | Area               | Description                                                          | Key types / traits            |
//! |--------------------|----------------------------------------------------------------------|-------------------------------|
//! | **Apps**           | Named configuration scopes owning builds, integrations and a bus.    | [`App`], [`get_apps`]         |
//! | **Builds**         | Supervised runner processes: deadlines, process groups, refcounts.   | [`Build`], [`BuildConfig`]    |
//! | **Events**         | Regex-addressed pub/sub; subscribers receive named captures.         | [`EventBus`], [`HandlerId`]   |
//! | **Pipes**          | One-producer/many-cursor byte fan-out with full replay.              | [`PipeStream`], [`PipeReader`]|
//! | **Integrations**   | Provider/notifier plug-in contract consumed by the core.             | [`Integration`]               |
//! | **Boundary**       | Layered JSON config, persistent cache, shared HTTP router.           | [`config`], [`cache`], [`http`]|
//!
//! ```no_run
//! use std::time::Duration;
//! use ngbuild::{App, BuildConfig, SIGNAL_BUILD_COMPLETE};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let app = App::new("demo", "/etc/ngbuild/apps/demo", Vec::new());
//!
//!     app.listen(SIGNAL_BUILD_COMPLETE, |captures| {
//!         println!("build {} finished", captures["token"]);
//!     })?;
//!
//!     let config = BuildConfig {
//!         title: "pull request 24".into(),
//!         url: "https://example.com/pr/24".into(),
//!         head_repo: "git@example.com:demo.git".into(),
//!         head_branch: "feature".into(),
//!         head_hash: "0a1b2c3".into(),
//!         base_repo: "git@example.com:demo.git".into(),
//!         base_branch: "main".into(),
//!         base_hash: "4d5e6f7".into(),
//!         group: "pulls/24".into(),
//!         deadline: Duration::from_secs(600),
//!         ..BuildConfig::default()
//!     };
//!
//!     let token = app.new_build("pulls/24", config).await?;
//!     let build = app.get_build(&token)?;
//!     println!("started build {}", build.token());
//!     Ok(())
//! }
//! ```
//!
//! ---

pub mod apps;
pub mod builds;
pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod integrations;
pub mod pipes;
pub mod token;

// ---- Public re-exports ----

pub use apps::{get_apps, ngbuild_directory, App};
pub use builds::{
    Build, BuildConfig, EXIT_LOST_PROCESS, EXIT_NO_PROVIDER, EXIT_RUNNER_FAILED, EXIT_STOP_FAILED,
    EXIT_SUCCESS,
};
pub use error::CoreError;
pub use events::topics::{
    EVENT_CORE_LOG, SIGNAL_BUILD_COMPLETE, SIGNAL_BUILD_PROVISIONING, SIGNAL_BUILD_STARTED,
};
pub use events::{EventBus, HandlerId, LogLevel};
pub use integrations::{integrations, set_integrations, Integration};
pub use pipes::{PipeReader, PipeStream, StdioStreams};
