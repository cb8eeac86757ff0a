//! Isolation runtime abstraction and the Docker-compatible implementation.
//!
//! The executor only talks to [`IsolatedRunner`], so the container CLI can be
//! swapped (docker, podman, ...) or faked in tests.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info};

use super::error::SandboxError;

/// Where the scratch script is mounted inside the container.
pub const SCRIPT_MOUNT_PATH: &str = "/script.ps1";

/// Everything needed to start one isolated run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxInvocation {
    pub container_name: String,
    pub script_path: PathBuf,
    pub image: String,
    pub interpreter: String,
    pub memory_limit: String,
    pub cpu_limit: String,
    /// Bytes kept from each output stream; the rest is read and dropped.
    pub output_limit: usize,
}

impl SandboxInvocation {
    /// Arguments passed to the runtime CLI.
    ///
    /// Always carries: no network, read-only root with a writable `/tmp`,
    /// memory and CPU caps, and a read-only script mount.
    pub fn args(&self) -> Vec<String> {
        vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            self.container_name.clone(),
            "--memory".to_string(),
            self.memory_limit.clone(),
            "--cpus".to_string(),
            self.cpu_limit.clone(),
            "--network".to_string(),
            "none".to_string(),
            "--read-only".to_string(),
            "--tmpfs".to_string(),
            "/tmp".to_string(),
            "-v".to_string(),
            format!("{}:{}:ro", self.script_path.display(), SCRIPT_MOUNT_PATH),
            self.image.clone(),
            self.interpreter.clone(),
            "-File".to_string(),
            SCRIPT_MOUNT_PATH.to_string(),
        ]
    }
}

/// Raw outcome of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

pub trait IsolatedRunner: Send + Sync {
    /// Short name reported as the execution platform.
    fn name(&self) -> &str;

    fn check_available(&self) -> BoxFuture<'_, Result<(), SandboxError>>;

    fn image_present<'a>(&'a self, image: &'a str) -> BoxFuture<'a, Result<bool, SandboxError>>;

    fn pull_image<'a>(&'a self, image: &'a str) -> BoxFuture<'a, Result<(), SandboxError>>;

    /// Run to completion. Dropping the future must stop the runtime process.
    fn run<'a>(&'a self, invocation: &'a SandboxInvocation) -> BoxFuture<'a, io::Result<RunOutput>>;

    /// Force-remove a container left behind by an abandoned run.
    fn terminate<'a>(&'a self, container_name: &'a str) -> BoxFuture<'a, io::Result<()>>;
}

/// Drives a Docker-compatible CLI (`docker`, `podman`).
#[derive(Debug, Clone)]
pub struct DockerRunner {
    binary: String,
}

impl DockerRunner {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command(&self) -> Command {
        let mut c = Command::new(&self.binary);
        c.kill_on_drop(true);
        c.stdin(Stdio::null());
        c
    }
}

impl Default for DockerRunner {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl IsolatedRunner for DockerRunner {
    fn name(&self) -> &str {
        &self.binary
    }

    fn check_available(&self) -> BoxFuture<'_, Result<(), SandboxError>> {
        async move {
            let unavailable = |detail: String| SandboxError::RuntimeUnavailable {
                runtime: self.binary.clone(),
                detail,
            };
            let output = self
                .command()
                .arg("version")
                .output()
                .await
                .map_err(|e| unavailable(e.to_string()))?;
            if !output.status.success() {
                return Err(unavailable(
                    String::from_utf8_lossy(&output.stderr).trim().to_string(),
                ));
            }
            debug!("{} runtime is reachable", self.binary);
            Ok(())
        }
        .boxed()
    }

    fn image_present<'a>(&'a self, image: &'a str) -> BoxFuture<'a, Result<bool, SandboxError>> {
        async move {
            let status = self
                .command()
                .args(["image", "inspect", image])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await?;
            Ok(status.success())
        }
        .boxed()
    }

    fn pull_image<'a>(&'a self, image: &'a str) -> BoxFuture<'a, Result<(), SandboxError>> {
        async move {
            info!("Pulling sandbox image {}", image);
            let output = self.command().args(["pull", image]).output().await?;
            if !output.status.success() {
                return Err(SandboxError::ImagePull {
                    image: image.to_string(),
                    detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                });
            }
            Ok(())
        }
        .boxed()
    }

    fn run<'a>(&'a self, invocation: &'a SandboxInvocation) -> BoxFuture<'a, io::Result<RunOutput>> {
        async move {
            let mut child = self
                .command()
                .args(invocation.args())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()?;
            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| io::Error::other("container stdout was not captured"))?;
            let stderr = child
                .stderr
                .take()
                .ok_or_else(|| io::Error::other("container stderr was not captured"))?;

            let (status, stdout, stderr) = tokio::try_join!(
                child.wait(),
                read_capped(stdout, invocation.output_limit),
                read_capped(stderr, invocation.output_limit),
            )?;
            Ok(RunOutput {
                exit_code: status.code(),
                stdout,
                stderr,
            })
        }
        .boxed()
    }

    fn terminate<'a>(&'a self, container_name: &'a str) -> BoxFuture<'a, io::Result<()>> {
        async move {
            let status = self
                .command()
                .args(["rm", "-f", container_name])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await?;
            if !status.success() {
                return Err(io::Error::other(format!(
                    "{} rm -f {} exited with {}",
                    self.binary, container_name, status
                )));
            }
            Ok(())
        }
        .boxed()
    }
}

/// Drain `reader` to the end, keeping at most `limit` bytes.
///
/// Reading continues past the limit so the writer never blocks on a full pipe.
pub(crate) async fn read_capped<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> io::Result<Vec<u8>> {
    let mut kept = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(kept);
        }
        let room = limit.saturating_sub(kept.len());
        kept.extend_from_slice(&chunk[..n.min(room)]);
    }
}
