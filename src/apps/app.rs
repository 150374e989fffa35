//! # Application container.
//!
//! An [`App`] is a named configuration scope: it owns its builds (grouped by
//! key), its private event bus and its bound integrations. Handles are cheap
//! clones over a shared inner; builds hold a weak back-reference to that
//! inner, so the App→Build direction is the only strong ownership.
//!
//! ## Rules
//! - Builds are registered under their group **before** `start()` runs, so
//!   listeners firing during provisioning can already resolve the token
//! - `new_build` retries token generation until the token is unused within
//!   this app
//! - Every integration's `attach_to_app` runs exactly once, at construction

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde::de::DeserializeOwned;

use crate::builds::{Build, BuildConfig};
use crate::config::{self, CoreConfig};
use crate::error::CoreError;
use crate::events::topics::{self, LogLevel};
use crate::events::{EventBus, HandlerId};
use crate::integrations::Integration;

/// Runner executable used when neither the caller nor the app config
/// names one.
const DEFAULT_BUILD_RUNNER: &str = "build.sh";

pub(crate) struct AppInner {
    name: String,
    location: PathBuf,
    root: PathBuf,
    builds: RwLock<HashMap<String, Vec<Arc<Build>>>>,
    integrations: Vec<Arc<dyn Integration>>,
    bus: EventBus,
}

/// Named configuration scope owning builds, integrations and an event bus.
#[derive(Clone)]
pub struct App {
    inner: Arc<AppInner>,
}

impl App {
    /// Creates an app rooted at `location` (`<ngbuild-dir>/apps/<name>`) and
    /// attaches the given integrations to it.
    pub fn new(
        name: impl Into<String>,
        location: impl Into<PathBuf>,
        integrations: Vec<Arc<dyn Integration>>,
    ) -> Self {
        let name = name.into();
        let location = location.into();
        let root = location
            .parent()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| location.clone());

        let app = Self {
            inner: Arc::new(AppInner {
                name,
                location,
                root,
                builds: RwLock::new(HashMap::new()),
                integrations,
                bus: EventBus::new(),
            }),
        };

        for integration in &app.inner.integrations {
            if let Err(err) = integration.attach_to_app(&app) {
                tracing::error!(
                    app = %app.name(),
                    integration = integration.identifier(),
                    "failed to attach integration: {err}"
                );
            }
        }

        app
    }

    pub(crate) fn from_inner(inner: Arc<AppInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<AppInner> {
        Arc::downgrade(&self.inner)
    }

    /// The app's name; matches its directory under `apps/`.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Filesystem location of the app's configuration.
    pub fn app_location(&self) -> &Path {
        &self.inner.location
    }

    /// The ngbuild directory this app was discovered under.
    pub(crate) fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Applies master-then-app config onto `T`.
    pub fn global_config<T>(&self) -> Result<T, CoreError>
    where
        T: DeserializeOwned,
    {
        config::apply_global(self.root(), Some(self.name()))
    }

    /// Applies the `Integrations.<namespace>` config blocks onto `T`.
    pub fn config<T>(&self, namespace: &str) -> Result<T, CoreError>
    where
        T: DeserializeOwned,
    {
        config::apply_integration(self.root(), Some(self.name()), namespace)
    }

    /// Dispatches a topic on the app's event bus.
    pub async fn send_event(&self, topic: impl Into<String>) {
        self.inner.bus.emit(topic).await;
    }

    /// Subscribes `listener` to every topic matching `pattern`; the returned
    /// handler id cancels the subscription.
    pub fn listen<F>(&self, pattern: &str, listener: F) -> Result<HandlerId, CoreError>
    where
        F: Fn(&HashMap<String, String>) + Send + Sync + 'static,
    {
        self.inner.bus.add_listener(pattern, listener)
    }

    /// Cancels a listener registered with [`listen`](Self::listen).
    pub fn remove_event_handler(&self, handler: HandlerId) {
        self.inner.bus.remove_handler(handler);
    }

    /// Creates and starts a new build under `group`.
    ///
    /// The build-runner defaults to `build.sh` unless the caller set one or
    /// the app config overrides it; the app's integrations are attached to
    /// the config; the token is regenerated until unused within this app.
    /// Returns the token, or the error `start()` reported synchronously.
    pub async fn new_build(&self, group: &str, mut config: BuildConfig) -> Result<String, CoreError> {
        let core: CoreConfig = self.global_config().unwrap_or_default();
        if !core.build_runner.is_empty() {
            config.build_runner = core.build_runner;
        } else if config.build_runner.is_empty() {
            config.build_runner = DEFAULT_BUILD_RUNNER.to_string();
        }

        let token = loop {
            let candidate = crate::token::generate(&[]);
            if self.get_build(&candidate).is_err() {
                break candidate;
            }
        };

        config.integrations = self.inner.integrations.clone();

        let build = Arc::new(Build::new(self.downgrade(), token.clone(), config));
        {
            let mut builds = self.inner.builds.write();
            builds.entry(group.to_string()).or_default().push(build.clone());
        }

        build.start().await?;
        Ok(token)
    }

    /// Finds a build by token; linear scan across every group.
    pub fn get_build(&self, token: &str) -> Result<Arc<Build>, CoreError> {
        let builds = self.inner.builds.read();
        for group in builds.values() {
            for build in group {
                if build.token() == token {
                    return Ok(build.clone());
                }
            }
        }

        Err(CoreError::BuildNotFound {
            token: token.to_string(),
        })
    }

    /// The ordered build list of one group.
    pub fn get_build_history(&self, group: &str) -> Vec<Arc<Build>> {
        self.inner
            .builds
            .read()
            .get(group)
            .cloned()
            .unwrap_or_default()
    }

    /// Stops every still-running build.
    pub async fn shutdown(&self) {
        let running: Vec<Arc<Build>> = {
            let builds = self.inner.builds.read();
            builds
                .values()
                .flatten()
                .filter(|build| !build.has_stopped())
                .cloned()
                .collect()
        };

        for build in running {
            if let Err(err) = build.stop().await {
                tracing::warn!(
                    app = %self.name(),
                    build = build.token(),
                    "couldn't stop build during shutdown: {err}"
                );
            }
        }
    }

    async fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Info => tracing::info!(app = %self.name(), "{message}"),
            LogLevel::Warn => tracing::warn!(app = %self.name(), "{message}"),
            LogLevel::Crit => tracing::error!(app = %self.name(), "{message}"),
        }
        self.send_event(topics::log(self.name(), level, message)).await;
    }

    /// Logs at info severity and broadcasts on the `/log/…` topic.
    pub async fn log_info(&self, message: &str) {
        self.log(LogLevel::Info, message).await;
    }

    /// Logs at warn severity and broadcasts on the `/log/…` topic.
    pub async fn log_warn(&self, message: &str) {
        self.log(LogLevel::Warn, message).await;
    }

    /// Logs at crit severity and broadcasts on the `/log/…` topic.
    pub async fn log_crit(&self, message: &str) {
        self.log(LogLevel::Crit, message).await;
    }
}
