//! # Build configuration.
//!
//! [`BuildConfig`] carries everything a build needs: what to fetch (head and
//! base triples), what to run (the build-runner executable, relative to the
//! workspace root), how long it may take, and which group clusters it with
//! related attempts. The metadata map is guarded for concurrent read/write
//! so integrations can annotate a config while the build runs.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoreError;
use crate::integrations::Integration;

/// Concurrency-guarded string map attached to a [`BuildConfig`].
#[derive(Default)]
pub struct Metadata(RwLock<HashMap<String, String>>);

impl Metadata {
    /// Stores one entry.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.0.write().insert(key.into(), value.into());
    }

    /// Retrieves one entry.
    pub fn get(&self, key: &str) -> Option<String> {
        self.0.read().get(key).cloned()
    }
}

impl Clone for Metadata {
    fn clone(&self) -> Self {
        Self(RwLock::new(self.0.read().clone()))
    }
}

impl Serialize for Metadata {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.read().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Metadata {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Self(RwLock::new(HashMap::deserialize(deserializer)?)))
    }
}

/// Inputs to one build.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Human-readable title, e.g. a pull-request title.
    pub title: String,
    /// Canonical URL of the change under test.
    pub url: String,

    /// Repository the change comes from.
    pub head_repo: String,
    pub head_branch: String,
    pub head_hash: String,

    /// Repository the change merges into.
    pub base_repo: String,
    pub base_branch: String,
    pub base_hash: String,

    /// Group key clustering related builds (retries, history).
    pub group: String,

    /// Integrations attached by the app when the build is created.
    #[serde(skip)]
    pub integrations: Vec<Arc<dyn Integration>>,

    /// Executable run from the workspace root; defaulted by the app.
    pub build_runner: String,
    /// Wall-clock budget for the runner; <1ms is normalised to 30 minutes.
    pub deadline: Duration,

    /// Free-form annotations, safe for concurrent read/write.
    pub metadata: Metadata,
}

impl BuildConfig {
    /// Stores one metadata entry.
    pub fn set_metadata(&self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.set(key, value);
    }

    /// Retrieves one metadata entry.
    pub fn metadata(&self, key: &str) -> Option<String> {
        self.metadata.get(key)
    }

    /// Checks the fields that must be non-empty before a build may start.
    pub fn validate(&self) -> Result<(), CoreError> {
        let required: [(&'static str, &str); 8] = [
            ("title", &self.title),
            ("url", &self.url),
            ("head_repo", &self.head_repo),
            ("head_hash", &self.head_hash),
            ("base_repo", &self.base_repo),
            ("base_hash", &self.base_hash),
            ("group", &self.group),
            ("build_runner", &self.build_runner),
        ];
        for (field, value) in required {
            if value.is_empty() {
                return Err(CoreError::InvalidBuildConfig { field });
            }
        }
        Ok(())
    }

    /// Path of the runner executable inside `workspace`.
    pub(crate) fn runner_path(&self, workspace: &std::path::Path) -> PathBuf {
        workspace.join(&self.build_runner)
    }
}

impl std::fmt::Debug for BuildConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildConfig")
            .field("title", &self.title)
            .field("url", &self.url)
            .field("head_repo", &self.head_repo)
            .field("head_hash", &self.head_hash)
            .field("base_repo", &self.base_repo)
            .field("base_hash", &self.base_hash)
            .field("group", &self.group)
            .field("build_runner", &self.build_runner)
            .field("deadline", &self.deadline)
            .field("integrations", &self.integrations.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BuildConfig {
        BuildConfig {
            title: "test pr".into(),
            url: "http://example.com/pr/24".into(),
            head_repo: "git@example.com:head.git".into(),
            head_branch: "feature".into(),
            head_hash: "abc123".into(),
            base_repo: "git@example.com:base.git".into(),
            base_branch: "main".into(),
            base_hash: "def456".into(),
            group: "pulls/24".into(),
            build_runner: "build.sh".into(),
            deadline: Duration::from_secs(60),
            ..BuildConfig::default()
        }
    }

    #[test]
    fn json_round_trip_includes_metadata() {
        let config = sample();
        config.set_metadata("requested-by", "octocat");

        let json = serde_json::to_string(&config).expect("serialize");
        let restored: BuildConfig = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(restored.title, config.title);
        assert_eq!(restored.group, config.group);
        assert_eq!(restored.deadline, config.deadline);
        assert_eq!(
            restored.metadata("requested-by").as_deref(),
            Some("octocat")
        );
        assert!(restored.integrations.is_empty());
    }

    #[test]
    fn validate_reports_the_missing_field() {
        let mut config = sample();
        config.base_hash.clear();

        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidBuildConfig { field: "base_hash" }
        ));
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn metadata_is_clone_isolated() {
        let config = sample();
        config.set_metadata("shared", "original");

        let copy = config.clone();
        copy.set_metadata("shared", "changed");

        assert_eq!(config.metadata("shared").as_deref(), Some("original"));
        assert_eq!(copy.metadata("shared").as_deref(), Some("changed"));
    }
}
