//! Shell tool - Execute commands in the workspace with a hard timeout

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::ShellConfig;
use crate::tools::registry::{ErrorCode, Tool};
use crate::tools::truncation::{clip, truncate_chars};
use crate::tools::{parse_params, ToolResult};
use crate::workspace::Workspace;

const READER_JOIN_TIMEOUT_MS: u64 = 500;
const TIMEOUT_KILL_GRACE_MS: u64 = 1_000;

pub struct ShellTool {
    workspace: Arc<Workspace>,
    config: ShellConfig,
}

impl ShellTool {
    pub fn new(workspace: Arc<Workspace>, config: ShellConfig) -> Self {
        Self { workspace, config }
    }

    /// Bytes captured per stream before the rest is discarded
    fn capture_limit(&self) -> u64 {
        (self.config.max_output_chars as u64 + 1) * 4
    }
}

#[derive(Deserialize)]
struct Params {
    command: String,
    #[serde(default)]
    timeout: Option<i64>,
}

fn build_shell_command(command: &str, workspace: &Workspace) -> Command {
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(command);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(command);
        c
    };

    cmd.env("NO_COLOR", "1");
    cmd.current_dir(workspace.root());

    // Own process group so a timeout can take down everything the command spawned
    #[cfg(unix)]
    cmd.process_group(0);

    cmd.kill_on_drop(true);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd
}

/// Read up to `limit` bytes, then drain the rest so the child never blocks on a full pipe
async fn collect_pipe_output<R>(pipe: Option<R>, limit: u64) -> Vec<u8>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let Some(pipe) = pipe else {
        return Vec::new();
    };

    let mut captured = Vec::new();
    let mut limited = pipe.take(limit);
    if let Err(e) = limited.read_to_end(&mut captured).await {
        debug!("Pipe read error: {}", e);
        return captured;
    }

    let mut rest = limited.into_inner();
    let _ = tokio::io::copy(&mut rest, &mut tokio::io::sink()).await;
    captured
}

async fn join_reader_with_timeout(mut handle: tokio::task::JoinHandle<Vec<u8>>) -> Vec<u8> {
    match timeout(Duration::from_millis(READER_JOIN_TIMEOUT_MS), &mut handle).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(_)) => Vec::new(),
        Err(_) => {
            // A grandchild that escaped the group can hold the pipe open
            handle.abort();
            Vec::new()
        }
    }
}

#[cfg(unix)]
async fn terminate_unix_process_tree(pid: u32) {
    let pgid = format!("-{}", pid);

    let group_term_ok = std::process::Command::new("kill")
        .arg("-TERM")
        .arg(&pgid)
        .status()
        .map(|s| s.success())
        .unwrap_or(false);

    if !group_term_ok {
        let _ = std::process::Command::new("kill")
            .arg("-TERM")
            .arg(pid.to_string())
            .status();
    }

    sleep(Duration::from_millis(200)).await;

    // Anything that ignored SIGTERM gets SIGKILL
    let _ = std::process::Command::new("kill")
        .arg("-KILL")
        .arg(&pgid)
        .stderr(Stdio::null())
        .status();
}

async fn terminate_process_tree(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        terminate_unix_process_tree(pid).await;
    }

    if timeout(Duration::from_millis(TIMEOUT_KILL_GRACE_MS), child.wait())
        .await
        .is_err()
    {
        let _ = child.kill().await;
        let _ = child.wait().await;
    }
}

fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return 128 + sig;
        }
    }
    -1
}

/// Stream text capped at the configured length, with a marker when cut
fn bounded_text(bytes: &[u8], max_chars: usize) -> String {
    truncate_chars(&String::from_utf8_lossy(bytes), max_chars).into_marked()
}

fn combine_output(stdout: &str, stderr: &str) -> String {
    let mut combined = String::from(stdout);
    if !stderr.is_empty() {
        if !combined.is_empty() {
            combined.push_str("\n--- stderr ---\n");
        }
        combined.push_str(stderr);
    }
    if combined.is_empty() {
        combined.push_str("(no output)");
    }
    combined
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "execute_shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the workspace directory. \
         Returns stdout and stderr separately in metadata and combined in content. \
         The command is terminated if it exceeds the timeout. \
         A nonzero exit code is reported as a failure."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Shell command to execute"
                },
                "timeout": {
                    "type": "integer",
                    "description": format!(
                        "Timeout in seconds (default {}, range {}-{})",
                        self.config.default_timeout_secs,
                        self.config.min_timeout_secs,
                        self.config.max_timeout_secs
                    ),
                    "minimum": self.config.min_timeout_secs,
                    "maximum": self.config.max_timeout_secs
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let params = match parse_params::<Params>(args) {
            Ok(p) => p,
            Err(e) => return e,
        };

        let command = params.command.trim();
        if command.is_empty() {
            return ToolResult::invalid_parameters("Command must not be empty");
        }

        let timeout_secs = match params.timeout {
            None => self.config.default_timeout_secs,
            Some(t)
                if t >= self.config.min_timeout_secs as i64
                    && t <= self.config.max_timeout_secs as i64 =>
            {
                t as u64
            }
            Some(_) => {
                return ToolResult::invalid_parameters(format!(
                    "Timeout must be between {} and {} seconds",
                    self.config.min_timeout_secs, self.config.max_timeout_secs
                ))
            }
        };

        info!(command = %clip(command, 100), timeout_secs, "Executing shell command");

        let mut cmd = build_shell_command(command, &self.workspace);
        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                return ToolResult::failure_with_code(
                    ErrorCode::CommandFailed,
                    format!("Failed to start command: {}", e),
                )
                .with_metadata("command", command)
            }
        };
        let pid = child.id();

        let limit = self.capture_limit();
        let stdout_handle = tokio::spawn(collect_pipe_output(child.stdout.take(), limit));
        let stderr_handle = tokio::spawn(collect_pipe_output(child.stderr.take(), limit));

        let wait_result = timeout(Duration::from_secs(timeout_secs), child.wait()).await;
        let (exit_code, timed_out) = match wait_result {
            Ok(Ok(status)) => (Some(exit_code_of(status)), false),
            Ok(Err(e)) => {
                warn!("Process wait error: {}", e);
                (Some(-1), false)
            }
            Err(_) => {
                terminate_process_tree(&mut child).await;
                (None, true)
            }
        };

        let stdout = bounded_text(
            &join_reader_with_timeout(stdout_handle).await,
            self.config.max_output_chars,
        );
        let stderr = bounded_text(
            &join_reader_with_timeout(stderr_handle).await,
            self.config.max_output_chars,
        );

        let mut metadata = json!({
            "command": command,
            "exit_code": exit_code,
            "stdout": stdout,
            "stderr": stderr,
            "timed_out": timed_out,
            "pid": pid,
        });

        if timed_out {
            warn!(command = %clip(command, 100), timeout_secs, "Command timed out");
            metadata["timeout"] = json!(timeout_secs);
            return with_all_metadata(
                ToolResult::failure_with_code(
                    ErrorCode::Timeout,
                    format!("Command timed out after {} seconds", timeout_secs),
                ),
                metadata,
            );
        }

        let combined = combine_output(&stdout, &stderr);
        let code = exit_code.unwrap_or(-1);
        if code == 0 {
            debug!(output_len = combined.len(), "Command succeeded");
            with_all_metadata(ToolResult::success(combined), metadata)
        } else {
            warn!(exit_code = code, "Command failed");
            with_all_metadata(
                ToolResult::failure_with_code(
                    ErrorCode::CommandFailed,
                    format!("Command exited with code {}", code),
                )
                .with_content(combined),
                metadata,
            )
        }
    }
}

fn with_all_metadata(mut result: ToolResult, metadata: Value) -> ToolResult {
    if let Value::Object(map) = metadata {
        for (key, value) in map {
            result.insert_metadata(key, value);
        }
    }
    result
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, ShellTool) {
        let dir = TempDir::new().unwrap();
        let ws = Arc::new(Workspace::open(dir.path()).unwrap());
        (dir, ShellTool::new(ws, ShellConfig::default()))
    }

    /// Zombies count as gone; they have no one left to reap them in some sandboxes
    fn process_alive(pid: u32) -> bool {
        let alive = std::process::Command::new("kill")
            .arg("-0")
            .arg(pid.to_string())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false);
        if !alive {
            return false;
        }
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => stat
                .rsplit(')')
                .next()
                .and_then(|rest| rest.split_whitespace().next())
                .is_some_and(|state| state != "Z"),
            Err(_) => true,
        }
    }

    #[tokio::test]
    async fn test_runs_in_workspace_root() {
        let (dir, tool) = setup();
        let result = tool.execute(json!({ "command": "pwd" })).await;
        assert!(result.is_success());
        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(result.content().trim(), expected.display().to_string());
        assert_eq!(result.metadata_value("exit_code"), Some(&json!(0)));
        assert_eq!(result.metadata_value("timed_out"), Some(&json!(false)));
    }

    #[tokio::test]
    async fn test_captures_streams_separately() {
        let (_dir, tool) = setup();
        let result = tool
            .execute(json!({ "command": "echo out; echo err >&2" }))
            .await;
        assert!(result.is_success());
        assert_eq!(result.metadata_value("stdout"), Some(&json!("out\n")));
        assert_eq!(result.metadata_value("stderr"), Some(&json!("err\n")));
        assert_eq!(result.content(), "out\n\n--- stderr ---\nerr\n");
    }

    #[tokio::test]
    async fn test_no_output_placeholder() {
        let (_dir, tool) = setup();
        let result = tool.execute(json!({ "command": "true" })).await;
        assert_eq!(result.content(), "(no output)");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failure_with_output() {
        let (_dir, tool) = setup();
        let result = tool
            .execute(json!({ "command": "echo partial; exit 3" }))
            .await;
        assert!(!result.is_success());
        assert_eq!(result.error(), Some("Command exited with code 3"));
        assert_eq!(result.error_code(), Some(ErrorCode::CommandFailed));
        assert_eq!(result.content(), "partial\n");
        assert_eq!(result.metadata_value("exit_code"), Some(&json!(3)));
    }

    #[tokio::test]
    async fn test_validation() {
        let (_dir, tool) = setup();

        let empty = tool.execute(json!({ "command": "   " })).await;
        assert_eq!(empty.error(), Some("Command must not be empty"));

        for bad in [0, -5, 601] {
            let result = tool
                .execute(json!({ "command": "echo hi", "timeout": bad }))
                .await;
            assert_eq!(result.error_code(), Some(ErrorCode::InvalidParameters));
            assert_eq!(
                result.error(),
                Some("Timeout must be between 1 and 600 seconds")
            );
        }
    }

    #[tokio::test]
    async fn test_output_truncated_per_stream() {
        let dir = TempDir::new().unwrap();
        let ws = Arc::new(Workspace::open(dir.path()).unwrap());
        let config = ShellConfig {
            max_output_chars: 10,
            ..ShellConfig::default()
        };
        let tool = ShellTool::new(ws, config);

        let result = tool
            .execute(json!({ "command": "printf 'abcdefghijklmnop'; printf 'short' >&2" }))
            .await;
        let stdout = result.metadata_value("stdout").and_then(Value::as_str).unwrap();
        assert_eq!(
            stdout,
            "abcdefghij\n\n[Output truncated at 10 characters]"
        );
        assert_eq!(result.metadata_value("stderr"), Some(&json!("short")));
    }

    #[tokio::test]
    async fn test_timeout_kills_process_group() {
        let (dir, tool) = setup();
        let result = tool
            .execute(json!({
                "command": "sleep 30 & echo $! > bg.pid; sleep 30",
                "timeout": 1
            }))
            .await;

        assert!(!result.is_success());
        assert_eq!(result.metadata_value("timed_out"), Some(&json!(true)));
        assert_eq!(result.error_code(), Some(ErrorCode::Timeout));
        assert_eq!(result.error(), Some("Command timed out after 1 seconds"));

        let pid = result.metadata_value("pid").and_then(Value::as_u64).unwrap() as u32;
        assert!(!process_alive(pid));

        let bg: u32 = std::fs::read_to_string(dir.path().join("bg.pid"))
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert!(!process_alive(bg));
    }
}
