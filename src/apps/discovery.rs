//! # App and ngbuild-directory discovery.
//!
//! The ngbuild directory is the first probe location that contains both an
//! `ngbuild.json` and an `apps/` directory; every subdirectory of `apps/`
//! is one app, with its integration set filtered by the app's
//! `enabledIntegrations` allow-list.

use std::path::PathBuf;

use crate::apps::App;
use crate::config::{self, CoreConfig};
use crate::integrations;

/// Locates the ngbuild directory.
///
/// Probes, in order: the `NGBUILD_DIRECTORY` environment variable, the
/// current working directory, the user's home directory and `/etc/ngbuild/`.
pub fn ngbuild_directory() -> Result<PathBuf, crate::error::CoreError> {
    let mut probes: Vec<PathBuf> = Vec::new();

    if let Some(dir) = std::env::var_os("NGBUILD_DIRECTORY") {
        probes.push(dir.into());
    }
    if let Ok(cwd) = std::env::current_dir() {
        probes.push(cwd);
    }
    if let Some(home) = std::env::var_os("HOME") {
        probes.push(home.into());
    }
    probes.push(PathBuf::from("/etc/ngbuild/"));

    for probe in probes {
        if probe.join("ngbuild.json").is_file() && probe.join("apps").is_dir() {
            return Ok(probe);
        }
    }

    Err(crate::error::CoreError::ConfigMissing(
        "no ngbuild directory detected",
    ))
}

/// Returns an [`App`] for every app directory found on this machine.
pub fn get_apps() -> Vec<App> {
    let Ok(root) = ngbuild_directory() else {
        return Vec::new();
    };

    let apps_location = root.join("apps");
    let entries = match std::fs::read_dir(&apps_location) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::error!("couldn't read {}: {err}", apps_location.display());
            return Vec::new();
        }
    };

    let mut apps = Vec::new();
    for entry in entries.flatten() {
        let app_dir = entry.path();
        if !app_dir.is_dir() {
            continue;
        }
        let Some(name) = app_dir.file_name().and_then(|n| n.to_str()).map(String::from)
        else {
            tracing::error!("could not determine app name for {}", app_dir.display());
            continue;
        };

        let core: CoreConfig = config::apply_global(&root, Some(&name)).unwrap_or_default();

        let mut set = integrations::integrations(&[]);
        if !core.enabled_integrations.is_empty() {
            set.retain(|integration| {
                core.enabled_integrations
                    .iter()
                    .any(|enabled| enabled == integration.identifier())
            });
        }

        apps.push(App::new(name, app_dir, set));
    }

    apps
}
