use std::sync::Mutex;
use std::time::Duration;

use super::{CommandOutput, CommandRunner, CommandSpec, ExecError};

/// 按命令行片段返回预设结果的执行器，记录所有调用
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Vec<(String, Result<CommandOutput, ExecError>)>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_success(mut self, fragment: &str, stdout: &str) -> Self {
        self.rules.push((
            fragment.to_string(),
            Ok(CommandOutput {
                stdout: stdout.to_string(),
                stderr: String::new(),
            }),
        ));
        self
    }

    pub fn on_failure(mut self, fragment: &str, stderr: &str) -> Self {
        self.rules.push((
            fragment.to_string(),
            Err(ExecError::NonZeroExit {
                code: Some(1),
                stdout: String::new(),
                stderr: stderr.to_string(),
            }),
        ));
        self
    }

    pub fn on_timeout(mut self, fragment: &str) -> Self {
        self.rules.push((
            fragment.to_string(),
            Err(ExecError::Timeout(Duration::from_secs(1))),
        ));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl CommandRunner for ScriptedRunner {
    async fn run(
        &self,
        spec: &CommandSpec,
        _timeout: Option<Duration>,
    ) -> Result<CommandOutput, ExecError> {
        let line = spec.display();
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(line.clone());
        }

        self.rules
            .iter()
            .find(|(fragment, _)| line.contains(fragment.as_str()))
            .map(|(_, result)| result.clone())
            .unwrap_or_else(|| {
                Err(ExecError::NonZeroExit {
                    code: Some(1),
                    stdout: String::new(),
                    stderr: format!("no scripted response for: {}", line),
                })
            })
    }
}
