//! # Layered JSON configuration.
//!
//! Configuration lives in two files under the ngbuild directory:
//! `ngbuild.json` (master) and `apps/<name>/config.json` (per-app override).
//! Integration settings nest under an `Integrations.<name>` block in either
//! file. Loading deep-merges master → app (→ integration block) into one
//! JSON value and deserialises it into the caller's target struct, so
//! targets should derive `Deserialize` with `#[serde(default)]` to tolerate
//! absent keys.
//!
//! Parsed files are cached process-wide, keyed by path, loaded lazily and
//! never invalidated.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::CoreError;

static CONFIG_CACHE: LazyLock<RwLock<HashMap<PathBuf, Arc<Value>>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Loads and caches one JSON config file.
fn load_json(path: &Path) -> Result<Arc<Value>, CoreError> {
    if let Some(cached) = CONFIG_CACHE.read().get(path) {
        return Ok(cached.clone());
    }

    let raw = std::fs::read(path)?;
    let parsed: Value = serde_json::from_slice(&raw)?;
    let parsed = Arc::new(parsed);

    CONFIG_CACHE
        .write()
        .insert(path.to_path_buf(), parsed.clone());
    Ok(parsed)
}

fn master_path(root: &Path) -> PathBuf {
    root.join("ngbuild.json")
}

fn app_path(root: &Path, appname: &str) -> PathBuf {
    root.join("apps").join(appname).join("config.json")
}

/// Recursively overlays `overlay` onto `base`; objects merge key-wise,
/// everything else is replaced.
fn merge_value(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(existing) => merge_value(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base_slot, overlay_value) => *base_slot = overlay_value.clone(),
    }
}

/// Extracts the `Integrations.<name>` block from one config value.
fn integration_block<'a>(conf: &'a Value, integration: &str) -> Option<&'a Value> {
    conf.get("Integrations")?.get(integration)
}

/// Applies master config, then the per-app override, onto `T`.
pub fn apply_global<T>(root: &Path, appname: Option<&str>) -> Result<T, CoreError>
where
    T: DeserializeOwned,
{
    let master = load_json(&master_path(root))?;
    let mut merged = (*master).clone();

    if let Some(appname) = appname {
        let app = load_json(&app_path(root, appname))?;
        merge_value(&mut merged, &app);
    }

    Ok(serde_json::from_value(merged)?)
}

/// Applies the `Integrations.<namespace>` blocks of master and per-app
/// config onto `T`, master first.
pub fn apply_integration<T>(
    root: &Path,
    appname: Option<&str>,
    namespace: &str,
) -> Result<T, CoreError>
where
    T: DeserializeOwned,
{
    let mut merged = Value::Object(Map::new());

    let master = load_json(&master_path(root))?;
    if let Some(block) = integration_block(&master, namespace) {
        merge_value(&mut merged, block);
    }

    if let Some(appname) = appname {
        let app = load_json(&app_path(root, appname))?;
        if let Some(block) = integration_block(&app, namespace) {
            merge_value(&mut merged, block);
        }
    }

    Ok(serde_json::from_value(merged)?)
}

/// The master/app-scope keys the core itself recognises.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CoreConfig {
    /// Public hostname used when constructing redirection URLs.
    pub hostname: String,
    /// Port the shared HTTP listener binds to.
    pub http_listen_port: String,
    /// Directory build workspaces are provisioned under.
    pub build_location: String,
    /// Directory the persistent key-value cache is written to.
    pub cache_directory: String,
    /// Directory finished builds get an artifact folder under.
    pub artifacts_location: String,
    /// Per-app override of the build-runner executable name.
    pub build_runner: String,
    /// Allow-list of integration identifiers for an app.
    pub enabled_integrations: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_fixture(root: &Path) {
        std::fs::create_dir_all(root.join("apps/testapp")).expect("mkdir");
        std::fs::write(
            root.join("ngbuild.json"),
            serde_json::json!({
                "foo": "master foo",
                "bar": "something else",
                "buildRunner": "master.sh",
                "Integrations": {
                    "testintegration": { "foo": "master integration foo", "baz": "FooBarBaz" }
                }
            })
            .to_string(),
        )
        .expect("write master");
        std::fs::write(
            root.join("apps/testapp/config.json"),
            serde_json::json!({
                "foo": "a different string",
                "Integrations": {
                    "testintegration": { "foo": "A different bar" }
                }
            })
            .to_string(),
        )
        .expect("write app config");
    }

    #[derive(Debug, Default, PartialEq, serde::Deserialize)]
    #[serde(default)]
    struct Normal {
        foo: String,
        bar: String,
    }

    #[test]
    fn app_config_overrides_master() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_fixture(dir.path());

        let merged: Normal = apply_global(dir.path(), Some("testapp")).expect("apply");
        assert_eq!(
            merged,
            Normal {
                foo: "a different string".into(),
                bar: "something else".into(),
            }
        );

        let master_only: Normal = apply_global(dir.path(), None).expect("apply");
        assert_eq!(master_only.foo, "master foo");
    }

    #[derive(Debug, Default, PartialEq, serde::Deserialize)]
    #[serde(default)]
    struct IntegrationConf {
        foo: String,
        baz: String,
    }

    #[test]
    fn integration_blocks_layer_master_then_app() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_fixture(dir.path());

        let conf: IntegrationConf =
            apply_integration(dir.path(), Some("testapp"), "testintegration").expect("apply");
        assert_eq!(
            conf,
            IntegrationConf {
                foo: "A different bar".into(),
                baz: "FooBarBaz".into(),
            }
        );
    }

    #[test]
    fn core_config_reads_camel_case_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_fixture(dir.path());

        let core: CoreConfig = apply_global(dir.path(), None).expect("apply");
        assert_eq!(core.build_runner, "master.sh");
        assert!(core.hostname.is_empty());
    }

    #[test]
    fn missing_master_config_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result: Result<Normal, _> = apply_global(dir.path(), None);
        assert!(result.is_err());
    }
}
