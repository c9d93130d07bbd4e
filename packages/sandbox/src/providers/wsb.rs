// ABOUTME: Windows Sandbox control surface backed by wsb.exe
// ABOUTME: Builds wsb.exe argument lists and runs them, capturing exit status and output

use super::SandboxControl;
use crate::error::{Result, SandboxError};
use crate::types::{ExecResult, RemoteCommand, SandboxHandle, SharedResource};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::{debug, info};

pub const DEFAULT_WSB_PATH: &str = "wsb.exe";
// `wsb.exe start` does not bring the sandbox up reliably, so launch the GUI entry point instead.
pub const DEFAULT_LAUNCHER_PATH: &str = "C:/Windows/system32/WindowsSandbox.exe";

#[cfg(windows)]
const DETACHED_PROCESS: u32 = 0x0000_0008;

/// `wsb.exe` wrapper
#[derive(Debug, Clone)]
pub struct WsbCli {
    wsb_path: PathBuf,
    launcher_path: PathBuf,
}

impl WsbCli {
    pub fn new(wsb_path: impl Into<PathBuf>, launcher_path: impl Into<PathBuf>) -> Self {
        Self {
            wsb_path: wsb_path.into(),
            launcher_path: launcher_path.into(),
        }
    }

    pub fn wsb_path(&self) -> &Path {
        &self.wsb_path
    }

    pub fn launcher_path(&self) -> &Path {
        &self.launcher_path
    }

    async fn run_wsb(&self, args: Vec<OsString>) -> Result<Output> {
        let rendered = describe(&self.wsb_path, &args);
        debug!("Running {}", rendered);

        Command::new(&self.wsb_path)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| SandboxError::external(rendered, format!("failed to execute: {}", e)))
    }
}

impl Default for WsbCli {
    fn default() -> Self {
        Self::new(DEFAULT_WSB_PATH, DEFAULT_LAUNCHER_PATH)
    }
}

#[async_trait]
impl SandboxControl for WsbCli {
    async fn list_instances(&self) -> Result<String> {
        let args = list_args();
        let rendered = describe(&self.wsb_path, &args);
        let output = self.run_wsb(args).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SandboxError::external(
                rendered,
                format!(
                    "exit code {:?}: {}",
                    output.status.code(),
                    stderr.trim()
                ),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn launch(&self) -> Result<()> {
        let mut cmd = Command::new(&self.launcher_path);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        #[cfg(windows)]
        cmd.creation_flags(DETACHED_PROCESS);

        // The child is dropped without waiting; readiness is observed through listing.
        let child = cmd.spawn().map_err(|e| {
            SandboxError::external(
                self.launcher_path.display().to_string(),
                format!("failed to launch: {}", e),
            )
        })?;

        info!(
            "Launched {} (pid {:?})",
            self.launcher_path.display(),
            child.id()
        );
        Ok(())
    }

    async fn share(&self, handle: &SandboxHandle, resource: &SharedResource) -> Result<()> {
        let args = share_args(handle, resource);
        let rendered = describe(&self.wsb_path, &args);
        let output = self.run_wsb(args).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SandboxError::external(
                rendered,
                format!(
                    "exit code {:?}: {}",
                    output.status.code(),
                    stderr.trim()
                ),
            ));
        }

        Ok(())
    }

    async fn exec(&self, handle: &SandboxHandle, command: &RemoteCommand) -> Result<ExecResult> {
        let output = self.run_wsb(exec_args(handle, command)).await?;

        Ok(ExecResult {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

pub(crate) fn list_args() -> Vec<OsString> {
    vec!["list".into()]
}

pub(crate) fn share_args(handle: &SandboxHandle, resource: &SharedResource) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "share".into(),
        "--id".into(),
        handle.as_str().into(),
        "-f".into(),
        resource.host_path.clone().into_os_string(),
    ];
    if resource.writable() {
        args.push("-w".into());
    }
    args
}

pub(crate) fn exec_args(handle: &SandboxHandle, command: &RemoteCommand) -> Vec<OsString> {
    vec![
        "exec".into(),
        "--id".into(),
        handle.as_str().into(),
        "-c".into(),
        command.command_line.as_str().into(),
        "--run-as".into(),
        command.run_as.as_arg().into(),
    ]
}

fn describe(program: &Path, args: &[OsString]) -> String {
    let mut rendered = program.display().to_string();
    for arg in args {
        rendered.push(' ');
        rendered.push_str(&arg.to_string_lossy());
    }
    rendered
}
