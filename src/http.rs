//! # Shared HTTP boundary.
//!
//! One process-wide router serves every integration: each merges its routes
//! into the shared registry during `attach_to_app`, and the core itself
//! registers none. [`serve`] binds the listener on `httpListenPort`;
//! [`server_url`] constructs the base URL integrations embed in
//! redirection targets and status links.

use std::path::Path;
use std::sync::LazyLock;

use axum::Router;
use parking_lot::Mutex;

use crate::config::{self, CoreConfig};
use crate::error::CoreError;

static ROUTES: LazyLock<Mutex<Router>> = LazyLock::new(|| Mutex::new(Router::new()));

/// Merges `router` into the shared route registry.
pub fn register_routes(router: Router) {
    let mut routes = ROUTES.lock();
    let merged = routes.clone().merge(router);
    *routes = merged;
}

/// Binds the shared listener and serves the registered routes until the
/// server errors or the process exits.
pub async fn serve(root: std::path::PathBuf) -> Result<(), CoreError> {
    let core: CoreConfig = config::apply_global(&root, None).unwrap_or_default();
    let port = if core.http_listen_port.is_empty() {
        "80".to_string()
    } else {
        core.http_listen_port
    };

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    tracing::info!("Starting http listen server on :{port}");

    let router = ROUTES.lock().clone();
    axum::serve(listener, router).await?;
    Ok(())
}

/// The base URL the shared listener is reachable under.
pub fn server_url(root: &Path) -> String {
    let core: CoreConfig = config::apply_global(root, None).unwrap_or_default();
    url_for(&core.hostname, &core.http_listen_port)
}

fn url_for(hostname: &str, port: &str) -> String {
    match port {
        "80" => format!("http://{hostname}"),
        "443" => format!("https://{hostname}"),
        _ => format!("http://{hostname}:{port}"),
    }
}
