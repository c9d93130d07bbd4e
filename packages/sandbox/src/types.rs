// ABOUTME: Core types for sandbox orchestration
// ABOUTME: Instance handles, shared folders, remote commands, and run reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Identifier of a running sandbox instance, as reported by the control surface.
///
/// Handles are obtained fresh from every status query and never cached
/// beyond a single run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SandboxHandle(String);

impl SandboxHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SandboxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

/// A host directory exposed into the guest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedResource {
    pub host_path: PathBuf,
    pub mode: AccessMode,
}

impl SharedResource {
    pub fn read_only(host_path: impl Into<PathBuf>) -> Self {
        Self {
            host_path: host_path.into(),
            mode: AccessMode::ReadOnly,
        }
    }

    pub fn read_write(host_path: impl Into<PathBuf>) -> Self {
        Self {
            host_path: host_path.into(),
            mode: AccessMode::ReadWrite,
        }
    }

    pub fn writable(&self) -> bool {
        self.mode == AccessMode::ReadWrite
    }
}

/// Guest user context a remote command runs under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunAs {
    /// The already logged-in guest user
    ExistingLogin,
    /// The guest's system account
    System,
}

impl RunAs {
    pub fn as_arg(&self) -> &'static str {
        match self {
            RunAs::ExistingLogin => "ExistingLogin",
            RunAs::System => "System",
        }
    }
}

impl FromStr for RunAs {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "existinglogin" | "existing-login" | "existing_login" => Ok(RunAs::ExistingLogin),
            "system" => Ok(RunAs::System),
            _ => Err(format!("unknown run-as identity: {}", s)),
        }
    }
}

/// A shell command issued inside the guest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    /// Short name used in logs and reports
    pub label: String,
    pub command_line: String,
    pub run_as: RunAs,
}

impl RemoteCommand {
    pub fn new(label: impl Into<String>, command_line: impl Into<String>, run_as: RunAs) -> Self {
        Self {
            label: label.into(),
            command_line: command_line.into(),
            run_as,
        }
    }
}

/// Captured result of running a command through the control surface
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// What to do when a deploy step reports failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Run every step, then fail the run if any step failed
    #[default]
    ContinueOnFailure,
    /// Stop at the first failed step
    AbortOnFirstFailure,
    /// Log failures and carry on as if they succeeded
    Ignore,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "continue" | "continue-on-failure" => Ok(FailurePolicy::ContinueOnFailure),
            "abort" | "abort-on-first-failure" => Ok(FailurePolicy::AbortOnFirstFailure),
            "ignore" => Ok(FailurePolicy::Ignore),
            _ => Err(format!("unknown failure policy: {}", s)),
        }
    }
}

/// Outcome of a single deploy step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub label: String,
    pub exit_code: Option<i32>,
    pub stderr: String,
    pub succeeded: bool,
}

/// Summary of one orchestrator run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub handle: SandboxHandle,
    pub freshly_launched: bool,
    pub steps: Vec<StepOutcome>,
    /// Phases the run passed through, in order
    pub states: Vec<RunState>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Phases of a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Checking,
    Launching,
    WaitingReady,
    Provisioning,
    Ready,
    Deploying,
    Installing,
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Checking => "checking",
            RunState::Launching => "launching",
            RunState::WaitingReady => "waiting_ready",
            RunState::Provisioning => "provisioning",
            RunState::Ready => "ready",
            RunState::Deploying => "deploying",
            RunState::Installing => "installing",
            RunState::Done => "done",
        };
        f.write_str(name)
    }
}
