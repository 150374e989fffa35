//! # Persistent key-value cache.
//!
//! A process-wide string map that integrations use for durable state
//! (issued auth tokens, seen webhook ids). The whole map is JSON-serialised
//! to `<cacheDirectory>/ngbuild.cache` on every store and loaded lazily on
//! first access.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::LazyLock;

use parking_lot::RwLock;

use crate::apps::ngbuild_directory;
use crate::config::{self, CoreConfig};

const CACHE_FILE: &str = "ngbuild.cache";

static CACHE: LazyLock<RwLock<HashMap<String, String>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));
static CACHE_INITED: AtomicBool = AtomicBool::new(false);
static SYNC_IN_FLIGHT: AtomicBool = AtomicBool::new(false);

fn cache_directory() -> Option<PathBuf> {
    let root = ngbuild_directory().ok()?;
    let core: CoreConfig = config::apply_global(&root, None).ok()?;
    if core.cache_directory.is_empty() {
        return None;
    }
    Some(PathBuf::from(core.cache_directory))
}

fn ensure_loaded() {
    if CACHE_INITED.swap(true, AtomicOrdering::SeqCst) {
        return;
    }

    let Some(dir) = cache_directory() else { return };
    let data = match std::fs::read(dir.join(CACHE_FILE)) {
        Ok(data) => data,
        Err(err) => {
            tracing::warn!("unable to read cached data: {err}");
            return;
        }
    };

    match serde_json::from_slice::<HashMap<String, String>>(&data) {
        Ok(stored) => CACHE.write().extend(stored),
        Err(err) => tracing::error!("unable to read cached data: {err}"),
    }
}

fn sync_to_disk() {
    // A sync already in flight will pick the new entry up.
    if SYNC_IN_FLIGHT.swap(true, AtomicOrdering::SeqCst) {
        return;
    }

    let result = write_snapshot();
    SYNC_IN_FLIGHT.store(false, AtomicOrdering::SeqCst);

    if let Err(err) = result {
        tracing::error!("unable to serialize cache to disk: {err}");
    }
}

fn write_snapshot() -> std::io::Result<()> {
    let Some(dir) = cache_directory() else {
        return Ok(());
    };
    std::fs::create_dir_all(&dir)?;

    let snapshot = CACHE.read().clone();
    let data = serde_json::to_vec(&snapshot)?;
    std::fs::write(dir.join(CACHE_FILE), data)
}

/// Stores `data` under `key` and syncs the whole map to disk.
pub fn store(key: impl Into<String>, data: impl Into<String>) {
    ensure_loaded();
    CACHE.write().insert(key.into(), data.into());
    sync_to_disk();
}

/// Retrieves the value stored under `key`; this may block on the first call
/// while the on-disk cache loads.
pub fn get(key: &str) -> Option<String> {
    ensure_loaded();
    CACHE.read().get(key).cloned()
}
