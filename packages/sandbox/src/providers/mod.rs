// ABOUTME: Control-surface trait for the external sandbox system
// ABOUTME: Defines list/launch/share/exec and how listing output maps to an instance handle

use crate::error::{Result, SandboxError};
use crate::types::{ExecResult, RemoteCommand, SandboxHandle, SharedResource};
use async_trait::async_trait;

pub mod wsb;

pub use wsb::WsbCli;

/// Command-line control surface of an isolated-environment system.
///
/// Implementations only translate calls into the external tool's contract;
/// sequencing and policy live in the orchestrator.
#[async_trait]
pub trait SandboxControl: Send + Sync {
    /// List instances and return the raw textual output
    async fn list_instances(&self) -> Result<String>;

    /// Start the sandbox's own process without waiting for it to exit
    async fn launch(&self) -> Result<()>;

    /// Expose a host directory into the given instance
    async fn share(&self, handle: &SandboxHandle, resource: &SharedResource) -> Result<()>;

    /// Run a command inside the given instance and capture its result
    async fn exec(&self, handle: &SandboxHandle, command: &RemoteCommand) -> Result<ExecResult>;
}

/// Interpret listing output: the first line is the instance handle, an empty
/// first line means nothing is running, and no lines at all is malformed.
pub fn parse_listing(output: &str) -> Result<Option<SandboxHandle>> {
    let first_line = output.lines().next().ok_or_else(|| {
        SandboxError::MalformedOutput("instance listing produced no lines".to_string())
    })?;

    let id = first_line.trim();
    if id.is_empty() {
        Ok(None)
    } else {
        Ok(Some(SandboxHandle::new(id)))
    }
}
