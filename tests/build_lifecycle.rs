//! End-to-end build lifecycle scenarios against a script-writing test
//! integration: happy path, failing runner, deadline kill, missing
//! provider, regex listeners and retry via `Build::new_build`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::timeout;

use ngbuild::{
    App, BuildConfig, CoreError, Integration, EXIT_NO_PROVIDER, EXIT_RUNNER_FAILED, EXIT_SUCCESS,
    SIGNAL_BUILD_COMPLETE,
};

/// Provides `test://` sources by writing the configured script as the
/// build runner.
struct ScriptProvider {
    script: String,
}

impl ScriptProvider {
    fn new(script: &str) -> Arc<Self> {
        Arc::new(Self {
            script: script.to_string(),
        })
    }
}

#[async_trait]
impl Integration for ScriptProvider {
    fn identifier(&self) -> &str {
        "script-provider"
    }

    fn is_provider(&self, source: &str) -> bool {
        source.starts_with("test://")
    }

    async fn provide_for(&self, config: &BuildConfig, directory: &Path) -> Result<(), CoreError> {
        let runner = directory.join(&config.build_runner);
        std::fs::write(&runner, &self.script)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&runner, std::fs::Permissions::from_mode(0o755))?;
        }
        Ok(())
    }

    fn attach_to_app(&self, _app: &App) -> Result<(), CoreError> {
        Ok(())
    }

    fn shutdown(&self) {}
}

struct Fixture {
    // Keeps the ngbuild directory alive for the test's duration.
    _root: tempfile::TempDir,
    app: App,
}

fn fixture(script: &str) -> Fixture {
    let root = tempfile::tempdir().expect("tempdir");
    let app_dir = root.path().join("apps/testapp");
    std::fs::create_dir_all(&app_dir).expect("mkdir");

    std::fs::write(
        root.path().join("ngbuild.json"),
        serde_json::json!({
            "buildLocation": root.path().join("builds"),
            "hostname": "ci.test",
            "httpListenPort": "8080",
            "artifactsLocation": root.path().join("artifacts"),
        })
        .to_string(),
    )
    .expect("write master config");
    std::fs::write(app_dir.join("config.json"), "{}").expect("write app config");

    let provider = ScriptProvider::new(script) as Arc<dyn Integration>;
    let app = App::new("testapp", app_dir, vec![provider]);
    Fixture { _root: root, app }
}

fn sample_config(deadline: Duration) -> BuildConfig {
    BuildConfig {
        title: "test pr".into(),
        url: "http://example.com/pr/24".into(),
        head_repo: "test://head.git".into(),
        head_branch: "feature".into(),
        head_hash: "abc123".into(),
        base_repo: "test://base.git".into(),
        base_branch: "main".into(),
        base_hash: "def456".into(),
        group: "pulls/24".into(),
        deadline,
        ..BuildConfig::default()
    }
}

fn watch(app: &App, pattern: &str) -> mpsc::UnboundedReceiver<HashMap<String, String>> {
    let (tx, rx) = mpsc::unbounded_channel();
    app.listen(pattern, move |captures| {
        let _ = tx.send(captures.clone());
    })
    .expect("listen");
    rx
}

async fn next(
    rx: &mut mpsc::UnboundedReceiver<HashMap<String, String>>,
) -> HashMap<String, String> {
    timeout(Duration::from_secs(20), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

const LIFECYCLE_PATTERN: &str =
    r"/build/app:(?P<app>\w+)/(?P<phase>provisioning|started|complete)/token:(?P<token>\w+)$";

#[tokio::test]
async fn happy_path_emits_lifecycle_in_order_and_exits_zero() {
    let fixture = fixture("#!/bin/sh\necho hello from the build\nexit 0\n");
    let mut lifecycle = watch(&fixture.app, LIFECYCLE_PATTERN);

    let token = fixture
        .app
        .new_build("pulls/24", sample_config(Duration::from_secs(60)))
        .await
        .expect("new_build");

    for expected_phase in ["provisioning", "started", "complete"] {
        let event = next(&mut lifecycle).await;
        assert_eq!(event.get("phase").map(String::as_str), Some(expected_phase));
        assert_eq!(event.get("app").map(String::as_str), Some("testapp"));
        assert_eq!(event.get("token").map(String::as_str), Some(token.as_str()));
    }

    let build = fixture.app.get_build(&token).expect("get_build");
    assert_eq!(build.exit_code().expect("exit_code"), EXIT_SUCCESS);
    assert!(build.build_time() > Duration::ZERO);

    let stdout = build
        .stdout()
        .expect("stdout")
        .read_to_string()
        .await
        .expect("drain stdout");
    assert!(stdout.contains("hello from the build"));

    let stderr = build
        .stderr()
        .expect("stderr")
        .read_to_string()
        .await
        .expect("drain stderr");
    assert!(stderr.is_empty());
}

#[tokio::test]
async fn failing_runner_reports_exit_one_and_keeps_workspace_until_release() {
    let fixture = fixture("#!/bin/sh\necho failing >&2\nexit 1\n");
    let mut complete = watch(&fixture.app, SIGNAL_BUILD_COMPLETE);

    let token = fixture
        .app
        .new_build("pulls/24", sample_config(Duration::from_secs(60)))
        .await
        .expect("new_build");

    let build = fixture.app.get_build(&token).expect("get_build");
    build.retain();

    next(&mut complete).await;
    assert_eq!(build.exit_code().expect("exit_code"), EXIT_RUNNER_FAILED);

    let workspace = build.workspace().expect("workspace recorded");
    assert!(workspace.is_dir());

    build.release();
    assert!(!workspace.exists());
    assert!(build.workspace().is_none());

    let stderr = build
        .stderr()
        .expect("stderr")
        .read_to_string()
        .await
        .expect("drain stderr");
    assert!(stderr.contains("failing"));
}

#[tokio::test]
async fn deadline_kills_the_runner_process_group() {
    let fixture = fixture("#!/bin/sh\nsleep 30\n");
    let mut complete = watch(&fixture.app, SIGNAL_BUILD_COMPLETE);

    let token = fixture
        .app
        .new_build("pulls/24", sample_config(Duration::from_millis(50)))
        .await
        .expect("new_build");

    let event = next(&mut complete).await;
    assert_eq!(event.get("token").map(String::as_str), Some(token.as_str()));

    let build = fixture.app.get_build(&token).expect("get_build");
    assert!(build.has_stopped());
    assert_ne!(build.exit_code().expect("exit_code"), EXIT_SUCCESS);
    assert!(build.build_time() < Duration::from_secs(20));
}

#[tokio::test]
async fn missing_provider_finishes_with_501() {
    let fixture = fixture("#!/bin/sh\nexit 0\n");
    let mut complete = watch(&fixture.app, SIGNAL_BUILD_COMPLETE);

    let mut config = sample_config(Duration::from_secs(60));
    config.head_repo = "unprovided://head.git".into();
    config.base_repo = "unprovided://base.git".into();

    let token = fixture
        .app
        .new_build("pulls/24", config)
        .await
        .expect("new_build");

    next(&mut complete).await;

    let build = fixture.app.get_build(&token).expect("get_build");
    assert_eq!(build.exit_code().expect("exit_code"), EXIT_NO_PROVIDER);

    // The workspace was provisioned before the integrations were asked.
    let workspace = build.workspace().expect("workspace recorded");
    assert!(workspace.is_dir());
    build.release();
    assert!(!workspace.exists());
}

#[tokio::test]
async fn complete_listener_sees_app_and_token_captures() {
    let fixture = fixture("#!/bin/sh\nexit 0\n");
    let mut complete = watch(&fixture.app, SIGNAL_BUILD_COMPLETE);

    let token = fixture
        .app
        .new_build("pulls/24", sample_config(Duration::from_secs(60)))
        .await
        .expect("new_build");

    let event = next(&mut complete).await;
    assert_eq!(event.get("app").map(String::as_str), Some("testapp"));
    assert_eq!(event.get("token").map(String::as_str), Some(token.as_str()));
    assert!(complete.try_recv().is_err(), "listener fired more than once");
}

#[tokio::test]
async fn rebuild_goes_through_the_lifecycle_and_shares_history() {
    let fixture = fixture("#!/bin/sh\nexit 0\n");
    let mut complete = watch(&fixture.app, SIGNAL_BUILD_COMPLETE);

    let first_token = fixture
        .app
        .new_build("pulls/24", sample_config(Duration::from_secs(60)))
        .await
        .expect("new_build");
    next(&mut complete).await;

    let first = fixture.app.get_build(&first_token).expect("get_build");
    let second_token = first.new_build().await.expect("rebuild");
    assert_ne!(first_token, second_token);
    next(&mut complete).await;

    let second = fixture.app.get_build(&second_token).expect("get_build");
    assert_eq!(second.exit_code().expect("exit_code"), EXIT_SUCCESS);

    let tokens: Vec<String> = second
        .history()
        .iter()
        .map(|build| build.token().to_string())
        .collect();
    assert_eq!(tokens, vec![first_token.clone(), second_token]);

    let first_history = first.history();
    assert_eq!(first_history.len(), 1);
    assert_eq!(first_history[0].token(), first_token);
}

#[tokio::test]
async fn starting_a_build_twice_is_rejected() {
    let fixture = fixture("#!/bin/sh\nexit 0\n");
    let mut complete = watch(&fixture.app, SIGNAL_BUILD_COMPLETE);

    let token = fixture
        .app
        .new_build("pulls/24", sample_config(Duration::from_secs(60)))
        .await
        .expect("new_build");
    next(&mut complete).await;

    let build = fixture.app.get_build(&token).expect("get_build");
    let err = build.clone().start().await.unwrap_err();
    assert!(matches!(err, CoreError::ProcessAlreadyStarted));

    let err = build.stop().await.unwrap_err();
    assert!(matches!(err, CoreError::ProcessAlreadyFinished));
}

#[tokio::test]
async fn shutdown_stops_running_builds() {
    let fixture = fixture("#!/bin/sh\nsleep 30\n");
    let mut started = watch(
        &fixture.app,
        r"/build/app:(?P<app>\w+)/started/token:(?P<token>\w+)$",
    );
    let mut complete = watch(&fixture.app, SIGNAL_BUILD_COMPLETE);

    let token = fixture
        .app
        .new_build("pulls/24", sample_config(Duration::from_secs(600)))
        .await
        .expect("new_build");
    next(&mut started).await;

    fixture.app.shutdown().await;
    next(&mut complete).await;

    let build = fixture.app.get_build(&token).expect("get_build");
    assert!(build.has_stopped());
    assert_ne!(build.exit_code().expect("exit_code"), EXIT_SUCCESS);
}
