use std::time::Duration;
use thiserror::Error;

/// 待执行的外部命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// PowerShell 脚本命令
    pub fn powershell(script: impl Into<String>) -> Self {
        Self::new("powershell").args([
            "-NoProfile".to_string(),
            "-NonInteractive".to_string(),
            "-Command".to_string(),
            script.into(),
        ])
    }

    /// cmd /C 命令
    pub fn cmd(command: impl Into<String>) -> Self {
        Self::new("cmd").args(["/C".to_string(), command.into()])
    }

    /// 用于日志的完整命令行
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// 命令输出
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// 命令执行错误
///
/// 非零退出码保留了输出，调用方据此区分"目标不存在"和真正的失败。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    #[error("无法启动进程 {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("命令超时 ({0:?})")]
    Timeout(Duration),

    #[error("命令返回非零退出码 {code:?}: {stderr}")]
    NonZeroExit {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
}

impl ExecError {
    /// 输出中是否包含指定文本（stdout 或 stderr）
    pub fn output_contains(&self, needle: &str) -> bool {
        match self {
            ExecError::NonZeroExit { stdout, stderr, .. } => {
                stdout.contains(needle) || stderr.contains(needle)
            }
            _ => false,
        }
    }
}

impl From<ExecError> for crate::modules::common::error::KeepError {
    fn from(error: ExecError) -> Self {
        use crate::modules::common::error::KeepError;
        match error {
            ExecError::Timeout(d) => KeepError::Timeout(format!("命令执行超过 {:?}", d)),
            other => KeepError::Command(other.to_string()),
        }
    }
}
