// ABOUTME: Error types for sandbox orchestration
// ABOUTME: Separates control-surface failures, remote command failures, and readiness timeouts

use crate::types::StepOutcome;
use thiserror::Error;

/// Main error type for sandbox operations
#[derive(Error, Debug)]
pub enum SandboxError {
    /// The control surface could not be invoked or exited non-zero
    #[error("{tool} failed: {message}")]
    ExternalTool { tool: String, message: String },

    /// The control surface produced output we cannot interpret
    #[error("Malformed output from sandbox control surface: {0}")]
    MalformedOutput(String),

    /// A remote command inside the guest reported failure
    #[error("Remote command '{label}' failed with exit code {exit_code:?}: {stderr}")]
    RemoteCommandFailed {
        label: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// One or more deploy steps failed after the full sequence ran.
    ///
    /// Carries every step outcome, successful ones included.
    #[error("Deployment finished with failed steps: {}", failed_labels(.0))]
    DeployFailed(Vec<StepOutcome>),

    /// The sandbox never reported a running instance
    #[error("Sandbox did not become ready within {seconds} seconds")]
    ReadinessTimeout { seconds: u64 },

    /// The run was cancelled before it finished
    #[error("Run cancelled: {0}")]
    Cancelled(String),

    /// An operation needed a running instance and none exists
    #[error("No sandbox instance is running")]
    NotRunning,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    pub(crate) fn external(tool: impl Into<String>, message: impl Into<String>) -> Self {
        SandboxError::ExternalTool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// True for failures of the control surface itself (spawn failure,
    /// non-zero exit, unparseable output).
    pub fn is_external_tool_failure(&self) -> bool {
        matches!(
            self,
            SandboxError::ExternalTool { .. } | SandboxError::MalformedOutput(_)
        )
    }
}

fn failed_labels(steps: &[StepOutcome]) -> String {
    steps
        .iter()
        .filter(|step| !step.succeeded)
        .map(|step| step.label.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Type alias for Results that return SandboxError
pub type Result<T> = std::result::Result<T, SandboxError>;
