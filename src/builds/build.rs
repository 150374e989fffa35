//! # Per-build supervisor.
//!
//! One [`Build`] is one execution attempt of a build-runner script in an
//! isolated workspace. `start()` provisions the workspace and hands off to
//! an async supervision loop that launches the child in its own process
//! group, tees its output through a [`StdioStreams`] multiplexer, enforces
//! the deadline and watches for zombied children.
//!
//! ## Event flow
//! ```text
//! start()          → /build/app:A/provisioning/token:T
//! child spawned    → /build/app:A/started/token:T
//! any exit path    → /build/app:A/complete/token:T
//! ```
//!
//! ## Supervision loop
//! ```text
//! loop {
//!   ├─► pipes done      → wait() on the child; 0 on success, 1 otherwise
//!   ├─► deadline        → stop() the process group; failure → exit 500
//!   └─► 5s tick         → child zombied with pipes open → force-close pipes
//! }
//! ```
//!
//! ## Rules
//! - `start()` succeeds at most once; synchronously-seen errors (config
//!   validation, workspace creation) return to the caller and emit no
//!   `/complete/`
//! - every failure after the supervision loop begins still emits
//!   `/complete/` with a normalised exit code
//! - the workspace survives until the reference count drops to zero

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::process::Command;
use tokio::time;

use crate::apps::{App, AppInner};
use crate::builds::state::BuildState;
use crate::builds::{proc, workspace, BuildConfig};
use crate::config::CoreConfig;
use crate::error::CoreError;
use crate::events::topics;
use crate::http;
use crate::pipes::{PipeReader, StdioStreams};

/// Exit code of a successful runner.
pub const EXIT_SUCCESS: i32 = 0;
/// Normalised exit code for a runner that reported failure.
pub const EXIT_RUNNER_FAILED: i32 = 1;
/// Deadline elapsed and the build could not be stopped.
pub const EXIT_STOP_FAILED: i32 = 500;
/// No attached integration could provision the workspace.
pub const EXIT_NO_PROVIDER: i32 = 501;
/// The process handle was lost before the build could be stopped.
pub const EXIT_LOST_PROCESS: i32 = 505;

/// Deadlines below this are treated as unset.
const MIN_DEADLINE: Duration = Duration::from_millis(1);
/// Replacement for unset deadlines.
const DEFAULT_DEADLINE: Duration = Duration::from_secs(30 * 60);
/// How often the supervisor probes for zombied children.
const ZOMBIE_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Fallback location for per-build artifact directories.
const DEFAULT_ARTIFACTS_LOCATION: &str = "/tmp/ngbuildartifacts/";

#[derive(Default)]
struct BuildRuntime {
    pid: Option<i32>,
    workspace: Option<PathBuf>,
    started_at: Option<Instant>,
    ended_at: Option<Instant>,
    exit_code: i32,
}

/// One execution attempt of a build-runner script.
pub struct Build {
    parent: Weak<AppInner>,
    token: String,
    config: BuildConfig,
    state: BuildState,
    refs: AtomicU64,
    runtime: Mutex<BuildRuntime>,
    stdio: OnceLock<Arc<StdioStreams>>,
    artifacts: RwLock<HashMap<String, Vec<PathBuf>>>,
}

impl Build {
    pub(crate) fn new(parent: Weak<AppInner>, token: String, config: BuildConfig) -> Self {
        Self {
            parent,
            token,
            config,
            state: BuildState::new(),
            refs: AtomicU64::new(0),
            runtime: Mutex::new(BuildRuntime::default()),
            stdio: OnceLock::new(),
            artifacts: RwLock::new(HashMap::new()),
        }
    }

    /// The build's unique token within its app.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// The group key this build is clustered under.
    pub fn group(&self) -> &str {
        &self.config.group
    }

    /// The configuration snapshot this build runs with.
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Whether `start()` has ever been accepted.
    pub fn has_started(&self) -> bool {
        self.state.has_started()
    }

    /// Whether the build reached its terminal state.
    pub fn has_stopped(&self) -> bool {
        self.state.has_stopped()
    }

    fn app(&self) -> Result<App, CoreError> {
        self.parent
            .upgrade()
            .map(App::from_inner)
            .ok_or(CoreError::AppGone)
    }

    /// Starts the build.
    ///
    /// Emits the provisioning topic, creates the workspace and spawns the
    /// supervision loop. Errors seen synchronously (invalid config, failed
    /// workspace creation) are returned to the caller and no `/complete/`
    /// is emitted for them; once this returns `Ok`, `/complete/` is
    /// guaranteed to follow eventually.
    pub async fn start(self: Arc<Self>) -> Result<(), CoreError> {
        let app = self.app()?;
        self.config.validate()?;
        self.state.begin_provisioning()?;

        app.send_event(topics::provisioning(app.name(), self.token()))
            .await;

        let mut deadline = self.config.deadline;
        if deadline < MIN_DEADLINE {
            self.log_warn("deadline not set in config, defaulting to 30 minutes")
                .await;
            deadline = DEFAULT_DEADLINE;
        }

        let core: CoreConfig = app.global_config().unwrap_or_default();
        let base = (!core.build_location.is_empty()).then(|| PathBuf::from(core.build_location));
        let workspace = workspace::provision(base.as_deref())?;

        {
            let mut runtime = self.runtime.lock();
            runtime.started_at = Some(Instant::now());
            runtime.workspace = Some(workspace.clone());
        }

        let this = self.clone();
        tokio::spawn(async move {
            if let Err(err) = this.run_build(&app, deadline, &workspace).await {
                this.log_warn(&format!("Build exited with error: {err}")).await;
            }
            this.ensure_artifact_dir(&app).await;
            app.send_event(topics::complete(app.name(), this.token()))
                .await;
        });

        Ok(())
    }

    /// The synchronous part of one supervised run; always finishes the
    /// build before returning so `/complete/` can be emitted right after.
    async fn run_build(
        self: &Arc<Self>,
        app: &App,
        deadline: Duration,
        workspace: &Path,
    ) -> Result<(), CoreError> {
        self.log_info("provisioning").await;

        let runner = self.config.runner_path(workspace);
        let mut cmd = Command::new(&runner);
        cmd.current_dir(workspace)
            .env("TERM", "xterm-256color")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // A fresh process group lets stop() signal every descendant at once.
        #[cfg(unix)]
        cmd.process_group(0);

        if let Err(err) = self.provision_into(workspace).await {
            self.finish(EXIT_NO_PROVIDER);
            return Err(err);
        }

        self.log_info(&format!("running build: {}", runner.display()))
            .await;

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                self.finish(EXIT_RUNNER_FAILED);
                return Err(err.into());
            }
        };

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            self.finish(EXIT_RUNNER_FAILED);
            return Err(CoreError::ProcessNotStarted);
        };
        let stdio = Arc::new(StdioStreams::new(stdout, stderr));
        let _ = self.stdio.set(stdio.clone());

        let pid = child.id();
        if let Some(pid) = pid {
            self.runtime.lock().pid = Some(pid as i32);
        }

        self.state.set_started();
        app.send_event(topics::started(app.name(), self.token()))
            .await;
        self.log_info(&format!("Command started, pid={}", pid.unwrap_or_default()))
            .await;

        let deadline_sleep = time::sleep(deadline);
        tokio::pin!(deadline_sleep);
        let mut deadline_hit = false;
        let mut tick = time::interval_at(
            time::Instant::now() + ZOMBIE_POLL_INTERVAL,
            ZOMBIE_POLL_INTERVAL,
        );

        loop {
            tokio::select! {
                _ = stdio.done() => {
                    self.log_info("Build exited, waiting for the process").await;
                    match child.wait().await {
                        Ok(status) if status.success() => break,
                        Ok(_) => {
                            self.log_warn("Build exited with a non zero status").await;
                            self.finish(EXIT_RUNNER_FAILED);
                            return Ok(());
                        }
                        Err(err) => {
                            self.finish(EXIT_RUNNER_FAILED);
                            return Err(err.into());
                        }
                    }
                }
                _ = &mut deadline_sleep, if !deadline_hit => {
                    deadline_hit = true;
                    self.log_warn("Cancelling build as deadline reached").await;
                    if let Err(err) = self.stop().await {
                        self.log_crit(&format!("Couldn't stop build: {err}")).await;
                        self.finish(EXIT_STOP_FAILED);
                        return Err(err);
                    }
                }
                _ = tick.tick() => {
                    // Catches children that exit without flushing stdio,
                    // leaving the pipes held open by grandchildren.
                    if proc::has_child_exited(&mut child) {
                        self.log_crit(&format!(
                            "Process exited but pipes are still open (zombied): {}",
                            pid.unwrap_or_default()
                        ))
                        .await;
                        stdio.close();
                    }
                }
            }
        }

        self.finish(EXIT_SUCCESS);
        self.log_info("Build finished").await;
        Ok(())
    }

    /// Asks the attached integrations to fetch sources into the workspace;
    /// the first integration accepting both head and base repos wins.
    async fn provision_into(&self, workspace: &Path) -> Result<(), CoreError> {
        for integration in &self.config.integrations {
            if integration.is_provider(&self.config.head_repo)
                && integration.is_provider(&self.config.base_repo)
            {
                match integration.provide_for(&self.config, workspace).await {
                    Ok(()) => return Ok(()),
                    Err(err) => {
                        self.log_crit(&format!(
                            "({}) Error providing for build: {err}",
                            integration.identifier()
                        ))
                        .await;
                    }
                }
            }
        }

        Err(CoreError::NoProvider)
    }

    /// Creates the permanent artifact directory for this build.
    async fn ensure_artifact_dir(&self, app: &App) {
        let core: CoreConfig = app.global_config().unwrap_or_default();
        let base = if core.artifacts_location.is_empty() {
            PathBuf::from(DEFAULT_ARTIFACTS_LOCATION)
        } else {
            PathBuf::from(core.artifacts_location)
        };

        let dir = base.join(self.token());
        if let Err(err) = std::fs::create_dir_all(&dir) {
            self.log_crit(&format!(
                "Couldn't create artifact directory {}: {err}",
                dir.display()
            ))
            .await;
        }
    }

    /// Records the terminal state; runs before `/complete/` is emitted.
    fn finish(&self, code: i32) {
        {
            let mut runtime = self.runtime.lock();
            runtime.ended_at = Some(Instant::now());
            runtime.exit_code = code;
            runtime.pid = None;
        }
        self.state.set_finished();
    }

    /// Stops a running build by signalling its whole process group with
    /// SIGTERM.
    ///
    /// Valid only while the build is in the started state. If the process
    /// handle has been lost the build transitions straight to finished with
    /// exit code 505 and the pipe multiplexer is flushed.
    pub async fn stop(&self) -> Result<(), CoreError> {
        if !self.state.has_started() || self.state.has_stopped() {
            self.log_crit("Stop called on a build that is not running").await;
            return Err(CoreError::ProcessAlreadyFinished);
        }

        let pid = self.runtime.lock().pid;
        match pid {
            Some(pid) => proc::signal_group(pid)?,
            None => {
                self.log_crit("unknown process asked to stop").await;
                self.finish(EXIT_LOST_PROCESS);
                if let Ok(app) = self.app() {
                    app.send_event(topics::complete(app.name(), self.token()))
                        .await;
                }
                if let Some(stdio) = self.stdio.get() {
                    stdio.close();
                }
            }
        }

        self.log_info("Stopped build").await;
        Ok(())
    }

    /// Adds a reference; the workspace is kept on disk while references
    /// remain.
    pub fn retain(&self) {
        self.refs.fetch_add(1, AtomicOrdering::SeqCst);
    }

    /// Drops a reference; the count reaching zero removes the workspace.
    pub fn release(&self) {
        let previous = self
            .refs
            .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |count| {
                Some(count.saturating_sub(1))
            })
            .unwrap_or_default();

        if previous.saturating_sub(1) == 0 {
            let workspace = self.runtime.lock().workspace.take();
            if let Some(dir) = workspace {
                if let Err(err) = workspace::cleanup(&dir) {
                    tracing::error!(
                        build = %self.token,
                        "couldn't remove workspace {}: {err}",
                        dir.display()
                    );
                }
            }
        }
    }

    /// Runs the same configuration again under the same group; the retry
    /// mechanism used by chat commands and web buttons.
    pub async fn new_build(&self) -> Result<String, CoreError> {
        let app = self.app()?;
        app.new_build(self.group(), self.config.clone()).await
    }

    /// Replay cursor over the runner's stdout.
    pub fn stdout(&self) -> Result<PipeReader, CoreError> {
        self.stdio
            .get()
            .map(|stdio| stdio.stdout_reader())
            .ok_or(CoreError::ProcessNotStarted)
    }

    /// Replay cursor over the runner's stderr.
    pub fn stderr(&self) -> Result<PipeReader, CoreError> {
        self.stdio
            .get()
            .map(|stdio| stdio.stderr_reader())
            .ok_or(CoreError::ProcessNotStarted)
    }

    /// The normalised exit code, available once the build finished.
    pub fn exit_code(&self) -> Result<i32, CoreError> {
        if self.state.has_stopped() {
            return Ok(self.runtime.lock().exit_code);
        }
        Err(CoreError::ProcessNotFinished)
    }

    /// Filepaths recorded under the given artifact name.
    pub fn artifact(&self, name: &str) -> Vec<PathBuf> {
        self.artifacts.read().get(name).cloned().unwrap_or_default()
    }

    /// Records one filepath under the given artifact name.
    pub fn add_artifact(&self, name: impl Into<String>, path: PathBuf) {
        self.artifacts.write().entry(name.into()).or_default().push(path);
    }

    /// Wall-clock duration of the run; zero until the build finished.
    pub fn build_time(&self) -> Duration {
        if !self.state.has_stopped() {
            return Duration::ZERO;
        }
        let runtime = self.runtime.lock();
        match (runtime.started_at, runtime.ended_at) {
            (Some(started), Some(ended)) => ended.saturating_duration_since(started),
            _ => Duration::ZERO,
        }
    }

    /// Workspace directory, while it exists.
    pub fn workspace(&self) -> Option<PathBuf> {
        self.runtime.lock().workspace.clone()
    }

    /// Every build in this build's group up to and including this one, in
    /// insertion order.
    pub fn history(&self) -> Vec<Arc<Build>> {
        let Ok(app) = self.app() else {
            return Vec::new();
        };

        let group = app.get_build_history(self.group());
        match group.iter().position(|build| build.token() == self.token()) {
            Some(index) => group[..=index].to_vec(),
            None => Vec::new(),
        }
    }

    /// URL of this build's status page on the web integration.
    pub fn web_status_url(&self) -> String {
        match self.app() {
            Ok(app) => format!(
                "{}/web/{}/{}/",
                http::server_url(app.root()),
                app.name(),
                self.token()
            ),
            Err(_) => String::new(),
        }
    }

    async fn log_info(&self, message: &str) {
        if let Ok(app) = self.app() {
            app.log_info(&format!("({}): {message}", self.token)).await;
        }
    }

    async fn log_warn(&self, message: &str) {
        if let Ok(app) = self.app() {
            app.log_warn(&format!("({}): {message}", self.token)).await;
        }
    }

    async fn log_crit(&self, message: &str) {
        if let Ok(app) = self.app() {
            app.log_crit(&format!("({}): {message}", self.token)).await;
        }
    }
}
