// ABOUTME: Ephemeral sandbox test-harness orchestration
// ABOUTME: Launches Windows Sandbox when needed, shares build output, and installs it inside the guest

pub mod error;
pub mod orchestrator;
pub mod providers;
pub mod readiness;
pub mod settings;
pub mod types;

// Re-export commonly used types
pub use error::{Result, SandboxError};
pub use orchestrator::{EnsuredInstance, SandboxOrchestrator};
pub use providers::{parse_listing, SandboxControl, WsbCli};
pub use readiness::{wait_until_ready, ReadinessPolicy};
pub use settings::{find_workspace_root, locate_workspace_root, ConfigError, HarnessSettings};
pub use types::{
    AccessMode, ExecResult, FailurePolicy, RemoteCommand, RunAs, RunReport, RunState,
    SandboxHandle, SharedResource, StepOutcome,
};

pub use tokio_util::sync::CancellationToken;
