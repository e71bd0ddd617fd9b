//! One-shot shell command execution with a hard deadline.
//!
//! Each call spawns a fresh shell process, drains stdout and stderr on their
//! own tasks, and races process exit against the deadline. The deadline wins
//! a tie and always ends in SIGKILL.
//!
//! On Unix the shell leads its own process group, so a timeout kills every
//! process the command started, not only the shell.

use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const PIPE_READ_BUFFER: usize = 16384; // 16KB per read

#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    /// Shell program used to run commands.
    pub shell: String,
    /// Arguments placed before the command string.
    pub shell_args: Vec<String>,
    /// How long to keep draining pipes after the shell has exited.
    /// Background grandchildren can hold the pipes open indefinitely.
    pub drain_grace: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            // Login shell so the user's PATH and aliases apply.
            shell: "bash".to_string(),
            shell_args: vec!["-lc".to_string()],
            drain_grace: Duration::from_millis(250),
        }
    }
}

/// Everything the child reported before it went away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// `None` when the process ended without a code, e.g. killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

#[derive(Debug, Error)]
pub enum ExecError {
    /// The shell could not be started at all.
    #[error("failed to launch shell `{shell}`: {source}")]
    Launch {
        shell: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to wait for shell process: {0}")]
    Wait(#[source] std::io::Error),
}

#[derive(Clone, Debug, Default)]
pub struct ProcessExecutor {
    config: ExecutorConfig,
}

impl ProcessExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run `command` in a new shell and wait for it to finish or time out.
    ///
    /// The child inherits this process's environment, gets no stdin, and runs
    /// in `cwd` when given (otherwise in the current directory). Output is
    /// captured in full; callers decide how much of it to keep.
    ///
    /// # Errors
    /// [`ExecError::Launch`] if the shell cannot be spawned, [`ExecError::Wait`]
    /// if the OS fails to report the child's exit. A non-zero exit or a
    /// timeout is not an error.
    pub async fn execute(
        &self,
        command: &str,
        cwd: Option<&Path>,
        timeout: Duration,
    ) -> Result<ExecutionResult, ExecError> {
        let mut cmd = Command::new(&self.config.shell);
        cmd.args(&self.config.shell_args).arg(command);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| ExecError::Launch {
            shell: self.config.shell.clone(),
            source,
        })?;
        debug!(
            command,
            pid = child.id(),
            timeout_ms = timeout.as_millis() as u64,
            "Spawned shell"
        );

        let stdout = OutputDrain::spawn(child.stdout.take());
        let stderr = OutputDrain::spawn(child.stderr.take());

        let exited = tokio::select! {
            biased;
            () = tokio::time::sleep(timeout) => None,
            status = child.wait() => Some(status),
        };

        let (status, timed_out) = match exited {
            Some(status) => (status.map_err(ExecError::Wait)?, false),
            None => {
                warn!(command, timeout_ms = timeout.as_millis() as u64, "Command timed out, killing");
                kill_process_tree(&mut child);
                (child.wait().await.map_err(ExecError::Wait)?, true)
            }
        };

        let grace = self.config.drain_grace;
        let (stdout, stderr) = tokio::join!(stdout.finish(grace), stderr.finish(grace));

        let result = ExecutionResult {
            exit_code: status.code(),
            stdout,
            stderr,
            timed_out,
        };
        debug!(
            exit_code = ?result.exit_code,
            timed_out,
            stdout_len = result.stdout.len(),
            stderr_len = result.stderr.len(),
            "Command finished"
        );
        Ok(result)
    }
}

/// SIGKILL the shell's whole process group, falling back to the shell alone.
fn kill_process_tree(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: killpg only sends a signal. The group id is the shell's pid
        // because it was spawned with process_group(0) and is not yet reaped.
        let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
        if rc == 0 {
            return;
        }
        debug!("killpg({}) failed: {}", pid, std::io::Error::last_os_error());
    }

    if let Err(e) = child.start_kill() {
        // Already gone between the deadline and the kill.
        debug!("start_kill failed: {}", e);
    }
}

/// Background reader that appends one pipe's bytes in arrival order.
struct OutputDrain {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl OutputDrain {
    fn spawn<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = buffer.clone();

        let task = tokio::spawn(async move {
            let Some(mut pipe) = pipe else {
                return;
            };
            let mut chunk = vec![0u8; PIPE_READ_BUFFER];
            loop {
                match pipe.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => match sink.lock() {
                        Ok(mut buf) => buf.extend_from_slice(&chunk[..n]),
                        Err(_) => break,
                    },
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        warn!("Pipe read error: {}", e);
                        break;
                    }
                }
            }
        });

        Self { buffer, task }
    }

    /// Wait up to `grace` for EOF, then return whatever was captured.
    async fn finish(self, grace: Duration) -> String {
        let mut task = self.task;
        match tokio::time::timeout(grace, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Pipe drain task failed: {}", e),
            Err(_) => {
                debug!("Pipe still open after shell exit, abandoning drain");
                task.abort();
            }
        }

        let bytes = match self.buffer.lock() {
            Ok(mut buf) => std::mem::take(&mut *buf),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    const SECOND: Duration = Duration::from_secs(1);

    // Plain `sh -c`, for tests that need stderr free of login-profile noise.
    fn posix() -> ProcessExecutor {
        ProcessExecutor::new(ExecutorConfig {
            shell: "sh".to_string(),
            shell_args: vec!["-c".to_string()],
            ..ExecutorConfig::default()
        })
    }

    /// True while `pid` exists and is not a zombie.
    #[cfg(target_os = "linux")]
    fn is_running(pid: &str) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid.trim())) {
            Ok(stat) => !stat
                .rsplit(')')
                .next()
                .is_some_and(|state| state.trim_start().starts_with('Z')),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    async fn wait_until_gone(pid: &str) -> bool {
        for _ in 0..40 {
            if !is_running(pid) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }

    async fn run(command: &str) -> ExecutionResult {
        ProcessExecutor::default()
            .execute(command, None, 10 * SECOND)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_echo_is_repeatable() {
        for _ in 0..2 {
            let result = run("echo hello").await;
            assert_eq!(result.stdout, "hello\n");
            assert_eq!(result.exit_code, Some(0));
            assert!(!result.timed_out);
        }
    }

    #[tokio::test]
    async fn test_stderr_and_exit_code_pass_through() {
        let result = run("echo oops >&2; exit 3").await;
        assert_eq!(result.stdout, "");
        assert!(result.stderr.ends_with("oops\n"));
        assert_eq!(result.exit_code, Some(3));
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let started = Instant::now();
        let result = ProcessExecutor::default()
            .execute("echo started; sleep 30", None, Duration::from_millis(300))
            .await
            .unwrap();

        assert!(result.timed_out);
        assert_eq!(result.exit_code, None);
        assert_eq!(result.stdout, "started\n");
        assert!(started.elapsed() < 10 * SECOND, "call did not return promptly");
    }

    #[tokio::test]
    async fn test_killed_process_is_gone() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let command = format!("echo $$ > {}; exec sleep 30", pid_file.display());

        let result = ProcessExecutor::default()
            .execute(&command, None, Duration::from_millis(500))
            .await
            .unwrap();
        assert!(result.timed_out);

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        let check = run(&format!("kill -0 {} 2>/dev/null && echo alive || echo gone", pid.trim())).await;
        assert_eq!(check.stdout, "gone\n");
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_kills_grandchildren() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        // The inner shell is a grandchild; the outer one keeps running after it.
        let command = format!(
            "sh -c 'echo $$ > {}; exec sleep 41'; echo after",
            pid_file.display()
        );

        let result = posix()
            .execute(&command, None, Duration::from_millis(500))
            .await
            .unwrap();
        assert!(result.timed_out);
        assert_eq!(result.stdout, "");

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        assert!(wait_until_gone(&pid).await, "grandchild {} survived the timeout", pid.trim());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_kills_background_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let command = format!("sleep 42 & echo $! > {}; wait", pid_file.display());

        let result = posix()
            .execute(&command, None, Duration::from_millis(500))
            .await
            .unwrap();
        assert!(result.timed_out);

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        assert!(wait_until_gone(&pid).await, "background job {} survived the timeout", pid.trim());
    }

    #[tokio::test]
    async fn test_fast_command_not_marked_timed_out() {
        let result = ProcessExecutor::default()
            .execute("true", None, 5 * SECOND)
            .await
            .unwrap();
        assert!(!result.timed_out);
        assert_eq!(result.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let expected = std::fs::canonicalize(dir.path()).unwrap();

        let result = ProcessExecutor::default()
            .execute("pwd -P", Some(dir.path()), 10 * SECOND)
            .await
            .unwrap();
        assert_eq!(result.stdout.trim(), expected.to_string_lossy());
    }

    #[tokio::test]
    async fn test_both_streams_drained_concurrently() {
        // Well past a pipe buffer on each stream.
        let script = "head -c 200000 /dev/zero | tr '\\0' o; head -c 200000 /dev/zero | tr '\\0' e >&2";
        let result = posix().execute(script, None, 10 * SECOND).await.unwrap();
        assert_eq!(result.stdout.len(), 200000);
        assert_eq!(result.stderr.len(), 200000);
        assert!(result.stdout.chars().all(|c| c == 'o'));
        assert!(result.stderr.chars().all(|c| c == 'e'));
    }

    #[tokio::test]
    async fn test_stdin_is_not_connected() {
        let result = run("cat; echo done").await;
        assert_eq!(result.stdout, "done\n");
    }

    #[tokio::test]
    async fn test_environment_is_inherited() {
        let result = run("printf '%s' \"$HOME\"").await;
        assert_eq!(result.stdout, std::env::var("HOME").unwrap_or_default());
    }

    #[tokio::test]
    async fn test_missing_shell_is_launch_error() {
        let executor = ProcessExecutor::new(ExecutorConfig {
            shell: "/nonexistent/bin/shell".to_string(),
            ..ExecutorConfig::default()
        });
        let err = executor.execute("echo hi", None, SECOND).await.unwrap_err();
        assert!(matches!(err, ExecError::Launch { .. }), "got {err:?}");
        assert!(err.to_string().contains("/nonexistent/bin/shell"));
    }

    #[tokio::test]
    async fn test_missing_working_directory_is_launch_error() {
        let err = ProcessExecutor::default()
            .execute("pwd", Some(Path::new("/definitely/not/here")), SECOND)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Launch { .. }));
    }

    #[tokio::test]
    async fn test_background_grandchild_does_not_hold_call_open() {
        let started = Instant::now();
        let result = run("sleep 30 & echo parent").await;
        assert_eq!(result.stdout, "parent\n");
        assert!(started.elapsed() < 10 * SECOND);
    }
}
