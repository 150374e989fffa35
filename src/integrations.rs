//! # Integration contract and process-wide registry.
//!
//! Integrations plug provider functionality (fetching sources into a
//! workspace) and observer functionality (notifying on lifecycle topics)
//! into the core. The core only ever *consumes* this contract: it asks
//! integrations to provision builds and attaches them to apps; everything
//! else an integration does happens through the app's event bus and the
//! shared HTTP router.
//!
//! The registry is set once at program start and handed to apps during
//! discovery, filtered by each app's `enabledIntegrations` allow-list.

use std::path::Path;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;

use crate::apps::App;
use crate::builds::BuildConfig;
use crate::error::CoreError;

/// Plug-in contract consumed by the core.
///
/// HTTP-facing implementations must parse request bodies before reading
/// form data; the core performs no parsing on their behalf.
#[async_trait]
pub trait Integration: Send + Sync {
    /// Stable identifier, e.g. `"github"` or `"slack"`.
    fn identifier(&self) -> &str;

    /// Whether this integration can fetch the given source string
    /// (URL/scheme) into a workspace.
    fn is_provider(&self, source: &str) -> bool;

    /// Fetches and prepares the workspace for a build, typically a
    /// clone+merge of the head and base repositories.
    async fn provide_for(&self, config: &BuildConfig, directory: &Path) -> Result<(), CoreError>;

    /// Binds the integration to an app: subscribe to topics, register HTTP
    /// routes, expose provider/notifier functionality.
    fn attach_to_app(&self, app: &App) -> Result<(), CoreError>;

    /// Synchronous release of resources at program shutdown.
    fn shutdown(&self);
}

static REGISTRY: OnceLock<Vec<Arc<dyn Integration>>> = OnceLock::new();

/// Installs the process-wide integration set. The first call wins; later
/// calls are ignored.
pub fn set_integrations(list: Vec<Arc<dyn Integration>>) {
    let _ = REGISTRY.set(list);
}

/// Returns the registered integrations minus the given identifiers.
pub fn integrations(disabled: &[&str]) -> Vec<Arc<dyn Integration>> {
    let mut list = REGISTRY.get().cloned().unwrap_or_default();
    list.retain(|integration| !disabled.contains(&integration.identifier()));
    list
}
