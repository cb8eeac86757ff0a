//! Per-call sandbox execution.
//!
//! An executor only exists once its preflight check passed, so `execute` never
//! has to decide whether isolation is available.

use std::future::Future;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::utils::text::capture_output;

use super::error::SandboxError;
use super::runner::{IsolatedRunner, RunOutput, SandboxInvocation};
use super::SandboxConfig;

/// Outcome of a sandboxed run. Always populated, even when the run failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub return_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub execution_time_seconds: f64,
    pub platform: String,
    pub sandbox_used: bool,
}

/// How a run ended, before it is turned into an [`ExecutionResult`].
enum Outcome {
    Finished(io::Result<RunOutput>),
    TimedOut,
    Cancelled,
}

pub struct SandboxExecutor {
    config: SandboxConfig,
    runner: Arc<dyn IsolatedRunner>,
}

impl SandboxExecutor {
    /// Check that the runtime is reachable and the image is available locally,
    /// pulling it if needed. Any failure here makes the executor unusable.
    pub async fn new(
        config: SandboxConfig,
        runner: Arc<dyn IsolatedRunner>,
    ) -> Result<Self, SandboxError> {
        runner.check_available().await?;

        if !runner.image_present(&config.image).await? {
            runner.pull_image(&config.image).await?;
        }

        info!(
            "Sandbox ready: runtime={} image={} memory={} cpus={}",
            runner.name(),
            config.image,
            config.memory_limit,
            config.cpu_limit
        );
        Ok(Self { config, runner })
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn platform(&self) -> &str {
        self.runner.name()
    }

    /// Run `command` in a fresh container, waiting at most `timeout_seconds`.
    pub async fn execute(&self, command: &str, timeout_seconds: u64) -> ExecutionResult {
        self.execute_until(command, timeout_seconds, std::future::pending())
            .await
    }

    /// Like [`Self::execute`], but abandons the run as soon as `cancel`
    /// completes. The container is removed and the result reports the
    /// cancellation.
    pub async fn execute_until(
        &self,
        command: &str,
        timeout_seconds: u64,
        cancel: impl Future<Output = ()>,
    ) -> ExecutionResult {
        let started = Instant::now();

        // Removed on drop, whichever way this function returns
        let script = match self.write_script(command) {
            Ok(script) => script,
            Err(e) => {
                error!("Failed to write sandbox script: {}", e);
                return self.failed(format!("Sandbox execution failed: {}", e), started);
            }
        };

        let invocation = SandboxInvocation {
            container_name: format!("rusty-gate-{}", Uuid::new_v4().simple()),
            script_path: script.path().to_path_buf(),
            image: self.config.image.clone(),
            interpreter: self.config.interpreter.clone(),
            memory_limit: self.config.memory_limit.clone(),
            cpu_limit: self.config.cpu_limit.clone(),
            // One byte over, so the cut is still visible to `capture_output`
            output_limit: self.config.max_output_bytes.saturating_add(1),
        };
        debug!("Starting sandbox {}", invocation.container_name);

        let outcome = tokio::select! {
            output = self.runner.run(&invocation) => Outcome::Finished(output),
            _ = sleep(Duration::from_secs(timeout_seconds)) => Outcome::TimedOut,
            _ = cancel => Outcome::Cancelled,
        };

        let result = match outcome {
            Outcome::Finished(Ok(output)) => {
                let return_code = output.exit_code.unwrap_or(-1);
                ExecutionResult {
                    success: output.exit_code == Some(0),
                    return_code,
                    stdout: capture_output(&output.stdout, self.config.max_output_bytes),
                    stderr: capture_output(&output.stderr, self.config.max_output_bytes),
                    execution_time_seconds: started.elapsed().as_secs_f64(),
                    platform: self.platform().to_string(),
                    sandbox_used: true,
                }
            }
            Outcome::Finished(Err(e)) => {
                error!("Sandbox {} failed: {}", invocation.container_name, e);
                self.failed(format!("Sandbox execution failed: {}", e), started)
            }
            Outcome::Cancelled => {
                warn!("Sandbox {} cancelled", invocation.container_name);
                self.remove_container(&invocation.container_name).await;
                self.failed("Command cancelled".to_string(), started)
            }
            Outcome::TimedOut => {
                warn!(
                    "Sandbox {} timed out after {}s",
                    invocation.container_name, timeout_seconds
                );
                self.remove_container(&invocation.container_name).await;
                ExecutionResult {
                    success: false,
                    return_code: -1,
                    stdout: String::new(),
                    stderr: format!("Command timed out after {} seconds", timeout_seconds),
                    execution_time_seconds: timeout_seconds as f64,
                    platform: self.platform().to_string(),
                    sandbox_used: true,
                }
            }
        };

        if let Err(e) = script.close() {
            warn!("Failed to remove sandbox script: {}", e);
        }
        info!(
            "Sandbox {} finished: success={} code={}",
            invocation.container_name, result.success, result.return_code
        );
        result
    }

    async fn remove_container(&self, container_name: &str) {
        if let Err(e) = self.runner.terminate(container_name).await {
            warn!("Failed to remove abandoned container {}: {}", container_name, e);
        }
    }

    fn write_script(&self, command: &str) -> io::Result<NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("rusty-gate-").suffix(".ps1");
        let mut script = match &self.config.scratch_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        script.write_all(command.as_bytes())?;
        script.flush()?;
        Ok(script)
    }

    fn failed(&self, stderr: String, started: Instant) -> ExecutionResult {
        ExecutionResult {
            success: false,
            return_code: -1,
            stdout: String::new(),
            stderr,
            execution_time_seconds: started.elapsed().as_secs_f64(),
            platform: self.platform().to_string(),
            sandbox_used: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// What the fake saw for one run.
    #[derive(Debug, Clone)]
    struct SeenRun {
        args: Vec<String>,
        script_path: PathBuf,
        script_body: String,
        output_limit: usize,
    }

    struct FakeRunner {
        available: bool,
        has_image: bool,
        pull_ok: bool,
        pulled: AtomicBool,
        delay: Duration,
        output: Result<RunOutput, String>,
        runs: Mutex<Vec<SeenRun>>,
        terminated: Mutex<Vec<String>>,
    }

    impl FakeRunner {
        fn new(output: Result<RunOutput, String>) -> Self {
            Self {
                available: true,
                has_image: true,
                pull_ok: true,
                pulled: AtomicBool::new(false),
                delay: Duration::ZERO,
                output,
                runs: Mutex::new(Vec::new()),
                terminated: Mutex::new(Vec::new()),
            }
        }

        fn exiting(code: i32, stdout: &str, stderr: &str) -> Self {
            Self::new(Ok(RunOutput {
                exit_code: Some(code),
                stdout: stdout.as_bytes().to_vec(),
                stderr: stderr.as_bytes().to_vec(),
            }))
        }
    }

    impl IsolatedRunner for FakeRunner {
        fn name(&self) -> &str {
            "fake"
        }

        fn check_available(&self) -> BoxFuture<'_, Result<(), SandboxError>> {
            let available = self.available;
            async move {
                if available {
                    Ok(())
                } else {
                    Err(SandboxError::RuntimeUnavailable {
                        runtime: "fake".to_string(),
                        detail: "daemon not running".to_string(),
                    })
                }
            }
            .boxed()
        }

        fn image_present<'a>(&'a self, _image: &'a str) -> BoxFuture<'a, Result<bool, SandboxError>> {
            let present = self.has_image || self.pulled.load(Ordering::SeqCst);
            async move { Ok(present) }.boxed()
        }

        fn pull_image<'a>(&'a self, image: &'a str) -> BoxFuture<'a, Result<(), SandboxError>> {
            async move {
                if self.pull_ok {
                    self.pulled.store(true, Ordering::SeqCst);
                    Ok(())
                } else {
                    Err(SandboxError::ImagePull {
                        image: image.to_string(),
                        detail: "not found".to_string(),
                    })
                }
            }
            .boxed()
        }

        fn run<'a>(&'a self, invocation: &'a SandboxInvocation) -> BoxFuture<'a, io::Result<RunOutput>> {
            async move {
                let script_body = std::fs::read_to_string(&invocation.script_path)?;
                self.runs.lock().unwrap().push(SeenRun {
                    args: invocation.args(),
                    script_path: invocation.script_path.clone(),
                    script_body,
                    output_limit: invocation.output_limit,
                });
                tokio::time::sleep(self.delay).await;
                self.output.clone().map_err(io::Error::other)
            }
            .boxed()
        }

        fn terminate<'a>(&'a self, container_name: &'a str) -> BoxFuture<'a, io::Result<()>> {
            async move {
                self.terminated.lock().unwrap().push(container_name.to_string());
                Ok(())
            }
            .boxed()
        }
    }

    async fn executor(runner: Arc<FakeRunner>) -> SandboxExecutor {
        SandboxExecutor::new(SandboxConfig::default(), runner).await.unwrap()
    }

    #[tokio::test]
    async fn test_preflight_fails_without_runtime() {
        let mut runner = FakeRunner::exiting(0, "", "");
        runner.available = false;

        let result = SandboxExecutor::new(SandboxConfig::default(), Arc::new(runner)).await;
        assert!(matches!(result, Err(SandboxError::RuntimeUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_preflight_pulls_missing_image() {
        let mut runner = FakeRunner::exiting(0, "", "");
        runner.has_image = false;
        let runner = Arc::new(runner);

        let _executor = executor(runner.clone()).await;
        assert!(runner.pulled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_preflight_fails_when_pull_fails() {
        let mut runner = FakeRunner::exiting(0, "", "");
        runner.has_image = false;
        runner.pull_ok = false;

        let result = SandboxExecutor::new(SandboxConfig::default(), Arc::new(runner)).await;
        assert!(matches!(result, Err(SandboxError::ImagePull { .. })));
    }

    #[tokio::test]
    async fn test_successful_run() {
        let runner = Arc::new(FakeRunner::exiting(0, "hello\n", ""));
        let executor = executor(runner.clone()).await;

        let result = executor.execute("Write-Output hello", 10).await;

        assert!(result.success);
        assert_eq!(result.return_code, 0);
        assert_eq!(result.stdout, "hello\n");
        assert!(result.sandbox_used);
        assert_eq!(result.platform, "fake");

        let runs = runner.runs.lock().unwrap().clone();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].script_body, "Write-Output hello");
        assert!(!runs[0].script_path.exists());
    }

    #[tokio::test]
    async fn test_every_run_is_isolated() {
        let runner = Arc::new(FakeRunner::exiting(0, "", ""));
        let executor = executor(runner.clone()).await;

        executor.execute("Get-Date", 10).await;

        let args = runner.runs.lock().unwrap()[0].args.clone();
        assert!(args.windows(2).any(|w| w[0] == "--network" && w[1] == "none"));
        assert!(args.contains(&"--read-only".to_string()));
        assert!(args.contains(&"--memory".to_string()));
        assert!(args.contains(&"--cpus".to_string()));
        assert!(args.iter().any(|a| a.ends_with(":ro")));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failure() {
        let runner = Arc::new(FakeRunner::exiting(1, "", "network is unreachable"));
        let executor = executor(runner).await;

        let result = executor.execute("Invoke-WebRequest http://example.com", 10).await;

        assert!(!result.success);
        assert_eq!(result.return_code, 1);
        assert!(result.stderr.contains("unreachable"));
        assert!(result.sandbox_used);
    }

    #[tokio::test]
    async fn test_killed_process_reports_minus_one() {
        let runner = Arc::new(FakeRunner::new(Ok(RunOutput {
            exit_code: None,
            ..RunOutput::default()
        })));
        let executor = executor(runner).await;

        let result = executor.execute("x", 10).await;
        assert!(!result.success);
        assert_eq!(result.return_code, -1);
    }

    #[tokio::test]
    async fn test_timeout_is_deterministic() {
        let mut runner = FakeRunner::exiting(0, "late", "");
        runner.delay = Duration::from_secs(30);
        let runner = Arc::new(runner);
        let executor = executor(runner.clone()).await;

        let result = executor.execute("Start-Sleep 60", 1).await;

        assert!(!result.success);
        assert_eq!(result.return_code, -1);
        assert_eq!(result.execution_time_seconds, 1.0);
        assert_eq!(result.stderr, "Command timed out after 1 seconds");
        assert!(result.sandbox_used);

        let runs = runner.runs.lock().unwrap().clone();
        assert!(!runs[0].script_path.exists());
        let terminated = runner.terminated.lock().unwrap().clone();
        assert_eq!(terminated.len(), 1);
        assert!(runs[0].args.contains(&terminated[0]));
    }

    #[tokio::test]
    async fn test_cancel_removes_container() {
        let mut runner = FakeRunner::exiting(0, "late", "");
        runner.delay = Duration::from_secs(30);
        let runner = Arc::new(runner);
        let executor = executor(runner.clone()).await;

        let result = executor
            .execute_until("Start-Sleep 60", 10, sleep(Duration::from_millis(100)))
            .await;

        assert!(!result.success);
        assert_eq!(result.return_code, -1);
        assert_eq!(result.stderr, "Command cancelled");
        assert!(result.execution_time_seconds < 10.0);

        let runs = runner.runs.lock().unwrap().clone();
        assert!(!runs[0].script_path.exists());
        let terminated = runner.terminated.lock().unwrap().clone();
        assert_eq!(terminated.len(), 1);
        assert!(runs[0].args.contains(&terminated[0]));
    }

    #[tokio::test]
    async fn test_runner_output_limit_follows_config() {
        let runner = Arc::new(FakeRunner::exiting(0, "", ""));
        let config = SandboxConfig {
            max_output_bytes: 100,
            ..SandboxConfig::default()
        };
        let executor = SandboxExecutor::new(config, runner.clone()).await.unwrap();

        executor.execute("Get-Date", 10).await;

        assert_eq!(runner.runs.lock().unwrap()[0].output_limit, 101);
    }

    #[tokio::test]
    async fn test_runtime_fault_is_captured() {
        let runner = Arc::new(FakeRunner::new(Err("daemon crashed".to_string())));
        let executor = executor(runner.clone()).await;

        let result = executor.execute("Get-Date", 10).await;

        assert!(!result.success);
        assert_eq!(result.return_code, -1);
        assert_eq!(result.stderr, "Sandbox execution failed: daemon crashed");
        assert!(result.sandbox_used);
        assert!(!runner.runs.lock().unwrap()[0].script_path.exists());
    }

    #[tokio::test]
    async fn test_script_write_failure_is_captured() {
        let runner = Arc::new(FakeRunner::exiting(0, "", ""));
        let config = SandboxConfig {
            scratch_dir: Some(PathBuf::from("/nonexistent/rusty-gate/scratch")),
            ..SandboxConfig::default()
        };
        let executor = SandboxExecutor::new(config, runner.clone()).await.unwrap();

        let result = executor.execute("Get-Date", 10).await;

        assert!(!result.success);
        assert!(result.stderr.starts_with("Sandbox execution failed:"));
        assert!(runner.runs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_output_is_bounded() {
        let big = "x".repeat(10_000);
        let runner = Arc::new(FakeRunner::exiting(0, &big, ""));
        let config = SandboxConfig {
            max_output_bytes: 100,
            ..SandboxConfig::default()
        };
        let executor = SandboxExecutor::new(config, runner).await.unwrap();

        let result = executor.execute("x", 10).await;
        assert!(result.stdout.len() < 200);
        assert!(result.stdout.contains("(truncated)"));
    }

    #[tokio::test]
    async fn test_concurrent_runs_use_separate_artifacts() {
        let runner = Arc::new(FakeRunner::exiting(0, "", ""));
        let executor = Arc::new(executor(runner.clone()).await);

        let tasks: Vec<_> = (0..4)
            .map(|i| {
                let executor = executor.clone();
                tokio::spawn(async move { executor.execute(&format!("Write-Output {}", i), 10).await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().success);
        }

        let runs = runner.runs.lock().unwrap().clone();
        let mut paths: Vec<_> = runs.iter().map(|r| r.script_path.clone()).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 4);
    }
}
