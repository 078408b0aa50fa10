//! 外部命令执行
//!
//! 所有注册表工具、PowerShell、批处理调用都经过 [`CommandRunner`]，
//! 统一处理超时和输出捕获。

pub mod models;

#[cfg(test)]
pub mod testing;

use std::process::Stdio;
use std::time::Duration;

pub use models::{CommandOutput, CommandSpec, ExecError};

/// 默认命令超时
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// 运行命令并捕获输出；`timeout` 为空时使用执行器的默认值
    async fn run(
        &self,
        spec: &CommandSpec,
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, ExecError>;
}

/// 基于 tokio 子进程的执行器
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    default_timeout: Duration,
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl ShellExecutor {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }
}

impl CommandRunner for ShellExecutor {
    async fn run(
        &self,
        spec: &CommandSpec,
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, ExecError> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        tracing::debug!("执行命令: {}", spec.display());

        let mut command = tokio::process::Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(windows)]
        {
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            command.creation_flags(CREATE_NO_WINDOW);
        }

        let child = command.spawn().map_err(|e| ExecError::Spawn {
            program: spec.program.clone(),
            reason: e.to_string(),
        })?;

        // 超时后 future 被丢弃，kill_on_drop 负责终止子进程
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ExecError::Spawn {
                    program: spec.program.clone(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                tracing::warn!("命令超时 ({:?}): {}", timeout, spec.display());
                return Err(ExecError::Timeout(timeout));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if output.status.success() {
            Ok(CommandOutput { stdout, stderr })
        } else {
            tracing::debug!(
                "命令退出码 {:?}: {}",
                output.status.code(),
                spec.display()
            );
            Err(ExecError::NonZeroExit {
                code: output.status.code(),
                stdout,
                stderr,
            })
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_of_successful_command() {
        let executor = ShellExecutor::default();
        let spec = CommandSpec::new("sh").args(["-c", "echo hello"]);

        let output = executor.run(&spec, None).await;
        assert_eq!(output.map(|o| o.stdout.trim().to_string()).ok(), Some("hello".to_string()));
    }

    #[tokio::test]
    async fn non_zero_exit_keeps_output() {
        let executor = ShellExecutor::default();
        let spec = CommandSpec::new("sh").args(["-c", "echo 'ERROR: missing' >&2; exit 1"]);

        let err = executor.run(&spec, None).await.err();
        assert!(matches!(err, Some(ExecError::NonZeroExit { code: Some(1), .. })));
        assert!(err.map(|e| e.output_contains("ERROR:")).unwrap_or(false));
    }

    #[tokio::test]
    async fn timeout_is_distinct_from_failure() {
        let executor = ShellExecutor::default();
        let spec = CommandSpec::new("sh").args(["-c", "sleep 5"]);

        let err = executor
            .run(&spec, Some(Duration::from_millis(100)))
            .await
            .err();
        assert!(matches!(err, Some(ExecError::Timeout(_))));
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let executor = ShellExecutor::default();
        let spec = CommandSpec::new("rust-keep-definitely-not-a-program");

        let err = executor.run(&spec, None).await.err();
        assert!(matches!(err, Some(ExecError::Spawn { .. })));
    }
}
