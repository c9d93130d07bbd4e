// ABOUTME: Sandbox orchestrator driving check, launch, provision, deploy, and install
// ABOUTME: Ensures a running instance exists, shares host folders once, then runs the install sequence

use crate::error::{Result, SandboxError};
use crate::providers::{parse_listing, SandboxControl};
use crate::readiness::wait_until_ready;
use crate::settings::HarnessSettings;
use crate::types::{
    FailurePolicy, RemoteCommand, RunReport, RunState, SandboxHandle, SharedResource, StepOutcome,
};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Handle plus how it was obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsuredInstance {
    pub handle: SandboxHandle,
    pub freshly_launched: bool,
}

/// Drives one sandbox test-harness run against a control surface
pub struct SandboxOrchestrator {
    control: Arc<dyn SandboxControl>,
    settings: HarnessSettings,
    cancel: CancellationToken,
    provisioned: Mutex<HashSet<SandboxHandle>>,
}

impl SandboxOrchestrator {
    pub fn new(control: Arc<dyn SandboxControl>, settings: HarnessSettings) -> Self {
        Self {
            control,
            settings,
            cancel: CancellationToken::new(),
            provisioned: Mutex::new(HashSet::new()),
        }
    }

    /// Use `cancel` to abort the readiness wait and any remaining steps
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn settings(&self) -> &HarnessSettings {
        &self.settings
    }

    /// Ask the control surface which instance is running, if any.
    ///
    /// Always re-queries; nothing is cached between calls.
    pub async fn query_running_instance(&self) -> Result<Option<SandboxHandle>> {
        let output = self.control.list_instances().await?;
        parse_listing(&output)
    }

    /// Return a ready instance, launching and provisioning one if none is running
    pub async fn ensure_instance(&self) -> Result<SandboxHandle> {
        let mut states = Vec::new();
        Ok(self.ensure(&mut states).await?.handle)
    }

    /// Copy the release tree into the guest and register the library.
    ///
    /// Runs every run regardless of how the instance was obtained. Each step's
    /// exit status and stderr are captured; the configured [`FailurePolicy`]
    /// decides whether a failed step fails the run.
    pub async fn deploy_and_install(&self, handle: &SandboxHandle) -> Result<Vec<StepOutcome>> {
        let mut states = Vec::new();
        self.deploy(handle, &mut states).await
    }

    /// Full flow: ensure an instance, then deploy and install into it
    pub async fn run(&self) -> Result<RunReport> {
        let started_at = Utc::now();
        let mut states = Vec::new();

        let instance = self.ensure(&mut states).await?;
        let steps = self.deploy(&instance.handle, &mut states).await?;
        self.enter(&mut states, RunState::Done);

        Ok(RunReport {
            handle: instance.handle,
            freshly_launched: instance.freshly_launched,
            steps,
            states,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Deploy and install into an already running instance without launching one
    pub async fn deploy_existing(&self) -> Result<RunReport> {
        let started_at = Utc::now();
        let mut states = Vec::new();

        self.enter(&mut states, RunState::Checking);
        let handle = self
            .query_running_instance()
            .await?
            .ok_or(SandboxError::NotRunning)?;
        self.enter(&mut states, RunState::Ready);

        let steps = self.deploy(&handle, &mut states).await?;
        self.enter(&mut states, RunState::Done);

        Ok(RunReport {
            handle,
            freshly_launched: false,
            steps,
            states,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Host folders exposed to a fresh instance: binaries read-only, logs read-write
    pub fn shared_resources(&self) -> [SharedResource; 2] {
        [
            SharedResource::read_only(&self.settings.bin_dir),
            SharedResource::read_write(&self.settings.log_dir),
        ]
    }

    /// The fixed install sequence: recursive overwrite copy, then silent registration
    pub fn deployment_sequence(&self) -> [RemoteCommand; 2] {
        let settings = &self.settings;
        let installed_library = guest_join(&settings.guest_dest, &settings.library);

        [
            RemoteCommand::new(
                "copy",
                format!(
                    "xcopy {} {} /e /y",
                    quote_if_needed(&settings.guest_source),
                    quote_if_needed(&settings.guest_dest)
                ),
                settings.run_as,
            ),
            RemoteCommand::new(
                "register",
                format!("regsvr32.exe {} /s", quote_if_needed(&installed_library)),
                settings.run_as,
            ),
        ]
    }

    async fn ensure(&self, states: &mut Vec<RunState>) -> Result<EnsuredInstance> {
        self.enter(states, RunState::Checking);
        info!("Checking sandbox status...");

        if let Some(handle) = self.query_running_instance().await? {
            info!("Sandbox is running, id: {}", handle);
            self.enter(states, RunState::Ready);
            return Ok(EnsuredInstance {
                handle,
                freshly_launched: false,
            });
        }

        self.enter(states, RunState::Launching);
        info!("Sandbox not running, starting...");
        self.control.launch().await?;

        self.enter(states, RunState::WaitingReady);
        let handle = wait_until_ready(&self.settings.readiness, &self.cancel, || {
            self.query_running_instance()
        })
        .await?;

        self.enter(states, RunState::Provisioning);
        self.provision(&handle).await?;

        info!("Sandbox is running, id: {}", handle);
        self.enter(states, RunState::Ready);
        Ok(EnsuredInstance {
            handle,
            freshly_launched: true,
        })
    }

    async fn provision(&self, handle: &SandboxHandle) -> Result<()> {
        if self.is_provisioned(handle) {
            debug!("Sandbox {} already provisioned, skipping shares", handle);
            return Ok(());
        }

        if !self.settings.bin_dir.exists() {
            warn!(
                "Binaries directory {} does not exist yet; the guest copy will find nothing to install",
                self.settings.bin_dir.display()
            );
        }
        tokio::fs::create_dir_all(&self.settings.log_dir).await?;

        for resource in self.shared_resources() {
            info!(
                "Sharing {} into sandbox {} ({:?})",
                resource.host_path.display(),
                handle,
                resource.mode
            );
            self.control.share(handle, &resource).await?;
        }

        self.provisioned
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(handle.clone());
        Ok(())
    }

    fn is_provisioned(&self, handle: &SandboxHandle) -> bool {
        self.provisioned
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(handle)
    }

    async fn deploy(
        &self,
        handle: &SandboxHandle,
        states: &mut Vec<RunState>,
    ) -> Result<Vec<StepOutcome>> {
        let policy = self.settings.failure_policy;
        let [copy, register] = self.deployment_sequence();
        let mut outcomes = Vec::with_capacity(2);

        for (state, command) in [(RunState::Deploying, copy), (RunState::Installing, register)] {
            if self.cancel.is_cancelled() {
                return Err(SandboxError::Cancelled(format!(
                    "stopped before '{}' step",
                    command.label
                )));
            }
            self.enter(states, state);

            info!(
                "Running '{}' in sandbox {}: {}",
                command.label, handle, command.command_line
            );
            let result = self.control.exec(handle, &command).await?;
            if !result.stdout.trim().is_empty() {
                debug!("'{}' stdout: {}", command.label, result.stdout.trim());
            }

            let succeeded = result.success();
            if succeeded {
                info!("'{}' completed", command.label);
            } else {
                warn!(
                    "'{}' failed with exit code {:?}: {}",
                    command.label,
                    result.exit_code,
                    result.stderr.trim()
                );
            }

            outcomes.push(StepOutcome {
                label: command.label.clone(),
                exit_code: result.exit_code,
                stderr: result.stderr.clone(),
                succeeded,
            });

            if !succeeded && policy == FailurePolicy::AbortOnFirstFailure {
                return Err(SandboxError::RemoteCommandFailed {
                    label: command.label,
                    exit_code: result.exit_code,
                    stderr: result.stderr,
                });
            }
        }

        if policy == FailurePolicy::ContinueOnFailure
            && outcomes.iter().any(|outcome| !outcome.succeeded)
        {
            return Err(SandboxError::DeployFailed(outcomes));
        }

        Ok(outcomes)
    }

    fn enter(&self, states: &mut Vec<RunState>, state: RunState) {
        debug!(state = %state, "Run state changed");
        states.push(state);
    }
}

/// Join a guest directory and file name with a Windows separator
fn guest_join(dir: &str, file: &str) -> String {
    format!("{}\\{}", dir.trim_end_matches(&['\\', '/'][..]), file)
}

fn quote_if_needed(path: &str) -> String {
    if path.contains(char::is_whitespace) && !path.starts_with('"') {
        format!("\"{}\"", path)
    } else {
        path.to_string()
    }
}
