//! 提权执行
//!
//! 非特权进程与提权子进程之间只通过临时目录中的结果文件交换信息：
//! 批处理把成功和失败的条目序号分别追加到两个文件，调用方在子进程
//! 结束并等待一段固定时间后读取，然后删除这些文件。删除和恢复写入
//! 使用同一套机制。

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::filesystem;
use crate::modules::cleaner::models::StepOutcome;
use crate::modules::common::error::KeepError;
use crate::modules::common::utils;
use crate::modules::executor::{CommandRunner, CommandSpec, ExecError};
use crate::modules::registry::{Deletion, RegData, RegistryBackend};

/// 提权子进程的等待上限
pub const ELEVATED_TIMEOUT: Duration = Duration::from_secs(45);

/// 提权操作结束后等待系统应用变更的时间
pub const SETTLE_DELAY: Duration = Duration::from_secs(2);

/// 需要提权执行的单个动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElevatedAction {
    RemoveFolder(PathBuf),
    DeleteRegistryKey(String),
    DeleteRegistryValue { key: String, name: String },
    /// 恢复备份时写回原始值
    WriteRegistryValue { key: String, name: String, data: RegData },
}

impl ElevatedAction {
    pub fn label(&self) -> String {
        match self {
            ElevatedAction::RemoveFolder(path) => path.to_string_lossy().to_string(),
            ElevatedAction::DeleteRegistryKey(key) => key.clone(),
            ElevatedAction::DeleteRegistryValue { key, name }
            | ElevatedAction::WriteRegistryValue { key, name, .. } => format!("{}\\{}", key, name),
        }
    }
}

/// 一次提权请求
#[derive(Debug, Clone)]
pub struct ElevatedTask {
    pub id: String,
    pub actions: Vec<ElevatedAction>,
}

impl ElevatedTask {
    pub fn new(actions: Vec<ElevatedAction>) -> Self {
        Self {
            id: utils::generate_id(),
            actions,
        }
    }
}

/// 提权执行结果，按动作序号给出成功和失败；两者都不包含的动作表示目标不存在
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandoffResult {
    pub deleted: BTreeSet<usize>,
    pub failed: BTreeSet<usize>,
}

impl HandoffResult {
    pub fn outcome(&self, index: usize) -> StepOutcome {
        if self.failed.contains(&index) {
            StepOutcome::Failed("管理员权限执行失败".to_string())
        } else if self.deleted.contains(&index) {
            StepOutcome::Done
        } else {
            StepOutcome::NotFound
        }
    }
}

/// 提权执行接口，可按平台替换具体机制
#[allow(async_fn_in_trait)]
pub trait ElevationBroker {
    async fn execute(&self, task: &ElevatedTask) -> Result<HandoffResult, KeepError>;
}

/// 当前进程是否已经以管理员身份运行
#[cfg(windows)]
pub fn is_elevated() -> bool {
    // SAFETY: IsUserAnAdmin 没有参数，只查询当前进程令牌
    unsafe { windows::Win32::UI::Shell::IsUserAnAdmin().as_bool() }
}

#[cfg(not(windows))]
pub fn is_elevated() -> bool {
    false
}

/// 在当前进程内直接执行，用于已提权、非 Windows 平台和测试
pub struct DirectBroker<'a, R: RegistryBackend> {
    registry: &'a R,
}

impl<'a, R: RegistryBackend> DirectBroker<'a, R> {
    pub fn new(registry: &'a R) -> Self {
        Self { registry }
    }
}

impl<R: RegistryBackend> ElevationBroker for DirectBroker<'_, R> {
    async fn execute(&self, task: &ElevatedTask) -> Result<HandoffResult, KeepError> {
        let mut result = HandoffResult::default();

        for (index, action) in task.actions.iter().enumerate() {
            let outcome = match action {
                ElevatedAction::RemoveFolder(path) => filesystem::delete_folder(path)
                    .map(|r| r.outcome)
                    .unwrap_or_else(|e| StepOutcome::Failed(e.to_string())),
                ElevatedAction::DeleteRegistryKey(key) => deletion_outcome(self.registry.delete_key(key)),
                ElevatedAction::DeleteRegistryValue { key, name } => {
                    deletion_outcome(self.registry.delete_value(key, name))
                }
                ElevatedAction::WriteRegistryValue { key, name, data } => {
                    write_outcome(self.registry, key, name, data)
                }
            };

            match outcome {
                StepOutcome::Done => {
                    result.deleted.insert(index);
                }
                StepOutcome::Failed(reason) => {
                    tracing::warn!("删除失败 {}: {}", action.label(), reason);
                    result.failed.insert(index);
                }
                StepOutcome::NotFound => {}
            }
        }

        Ok(result)
    }
}

fn deletion_outcome(result: Result<Deletion, KeepError>) -> StepOutcome {
    match result {
        Ok(Deletion::Removed) => StepOutcome::Done,
        Ok(Deletion::Absent) => StepOutcome::NotFound,
        Err(e) => StepOutcome::Failed(e.to_string()),
    }
}

/// 写入后读回，与期望值一致才算成功
fn write_outcome<R: RegistryBackend>(registry: &R, key: &str, name: &str, data: &RegData) -> StepOutcome {
    let written = registry
        .write_value(key, name, data)
        .and_then(|_| registry.read_value(key, name));

    match written {
        Ok(Some(actual)) if &actual == data => StepOutcome::Done,
        Ok(_) => StepOutcome::Failed("读回的值不一致".to_string()),
        Err(e) => StepOutcome::Failed(e.to_string()),
    }
}

/// 通过 UAC 提权运行批处理脚本
pub struct UacBatchBroker<'a, C: CommandRunner> {
    runner: &'a C,
    temp_dir: PathBuf,
    timeout: Duration,
    settle: Duration,
}

impl<'a, C: CommandRunner> UacBatchBroker<'a, C> {
    pub fn new(runner: &'a C) -> Self {
        Self {
            runner,
            temp_dir: std::env::temp_dir(),
            timeout: ELEVATED_TIMEOUT,
            settle: SETTLE_DELAY,
        }
    }

    pub fn with_temp_dir(mut self, temp_dir: PathBuf) -> Self {
        self.temp_dir = temp_dir;
        self
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    fn handoff_paths(&self, task: &ElevatedTask) -> HandoffPaths {
        let stem = format!("rust-keep-{}", task.id);
        HandoffPaths {
            script: self.temp_dir.join(format!("{}.bat", stem)),
            deleted: self.temp_dir.join(format!("{}-deleted.txt", stem)),
            failed: self.temp_dir.join(format!("{}-failed.txt", stem)),
        }
    }
}

/// 一次提权请求用到的临时文件
#[derive(Debug, Clone)]
pub struct HandoffPaths {
    pub script: PathBuf,
    pub deleted: PathBuf,
    pub failed: PathBuf,
}

impl HandoffPaths {
    fn remove_all(&self) {
        for path in [&self.script, &self.deleted, &self.failed] {
            let _ = std::fs::remove_file(path);
        }
    }
}

impl<C: CommandRunner> ElevationBroker for UacBatchBroker<'_, C> {
    async fn execute(&self, task: &ElevatedTask) -> Result<HandoffResult, KeepError> {
        let paths = self.handoff_paths(task);

        // 清掉同名的旧结果文件
        let _ = std::fs::remove_file(&paths.deleted);
        let _ = std::fs::remove_file(&paths.failed);

        let script = build_batch_script(task, &paths.deleted, &paths.failed);
        std::fs::write(&paths.script, script)?;
        tracing::info!("请求管理员权限执行 {} 项操作", task.actions.len());

        let launch = format!(
            "Start-Process -FilePath cmd -ArgumentList '/c','\"{}\"' -Verb RunAs -Wait -WindowStyle Hidden",
            utils::ps_quote(&paths.script.to_string_lossy())
        );
        let spec = CommandSpec::powershell(launch);

        match self.runner.run(&spec, Some(self.timeout)).await {
            Ok(_) => {}
            Err(ExecError::Timeout(d)) => {
                paths.remove_all();
                return Err(KeepError::Timeout(format!("等待管理员操作超过 {:?}", d)));
            }
            Err(e) => {
                paths.remove_all();
                // 用户取消 UAC 提示时 Start-Process 报错
                return Err(KeepError::PermissionDenied(format!("提权执行失败: {}", e)));
            }
        }

        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }

        let result = HandoffResult {
            deleted: read_indices(&paths.deleted),
            failed: read_indices(&paths.failed),
        };
        paths.remove_all();

        tracing::info!(
            "管理员操作完成: 成功 {} 项, 失败 {} 项",
            result.deleted.len(),
            result.failed.len()
        );
        Ok(result)
    }
}

/// 批处理中 `%` 需要写成 `%%`
fn batch_escape(value: &str) -> String {
    value.replace('%', "%%")
}

/// reg.exe 参数中的双引号写成 `\"`
fn reg_arg(value: &str) -> String {
    batch_escape(&value.replace('"', "\\\""))
}

/// 读取结果文件中的序号，文件不存在表示没有条目
fn read_indices(path: &Path) -> BTreeSet<usize> {
    std::fs::read_to_string(path)
        .map(|content| {
            content
                .lines()
                .filter_map(|l| l.trim().parse::<usize>().ok())
                .collect()
        })
        .unwrap_or_default()
}

/// 生成提权批处理脚本
///
/// 每个动作先检查目标是否存在，删除后再检查一次，把序号写入对应的结果文件。
pub fn build_batch_script(task: &ElevatedTask, deleted: &Path, failed: &Path) -> String {
    let deleted = batch_escape(&deleted.to_string_lossy());
    let failed = batch_escape(&failed.to_string_lossy());

    let mut script = String::from("@echo off\r\nchcp 65001 >nul\r\n");

    for (index, action) in task.actions.iter().enumerate() {
        let failed_line = format!(">>\"{failed}\" echo {index}");
        let deleted_line = format!(">>\"{deleted}\" echo {index}");

        match action {
            ElevatedAction::RemoveFolder(path) => {
                let path = batch_escape(&path.to_string_lossy());
                script.push_str(&format!("if exist \"{path}\" (\r\n"));
                script.push_str(&format!("    attrib -r -s -h \"{path}\\*.*\" /s /d >nul 2>&1\r\n"));
                script.push_str(&format!("    takeown /F \"{path}\" /R /D Y >nul 2>&1\r\n"));
                script.push_str(&format!(
                    "    icacls \"{path}\" /grant *S-1-5-32-544:F /T /C /Q >nul 2>&1\r\n"
                ));
                script.push_str(&format!("    rd /s /q \"{path}\" >nul 2>&1\r\n"));
                script.push_str(&format!(
                    "    if exist \"{path}\" ({failed_line}) else ({deleted_line})\r\n)\r\n"
                ));
            }
            ElevatedAction::DeleteRegistryKey(key) => {
                let query = format!("reg query \"{}\"", batch_escape(key));
                let delete = format!("reg delete \"{}\" /f", batch_escape(key));
                push_registry_block(&mut script, &query, &delete, &failed_line, &deleted_line);
            }
            ElevatedAction::DeleteRegistryValue { key, name } => {
                let target = format!("\"{}\" /v \"{}\"", batch_escape(key), batch_escape(name));
                let query = format!("reg query {target}");
                let delete = format!("reg delete {target} /f");
                push_registry_block(&mut script, &query, &delete, &failed_line, &deleted_line);
            }
            ElevatedAction::WriteRegistryValue { key, name, data } => {
                script.push_str(&format!(
                    "reg add \"{}\" /v \"{}\" /t {} /d \"{}\" /f >nul 2>&1\r\n",
                    reg_arg(key),
                    reg_arg(name),
                    data.reg_type(),
                    reg_arg(&data.reg_add_data())
                ));
                script.push_str(&format!(
                    "if errorlevel 1 ({failed_line}) else ({deleted_line})\r\n"
                ));
            }
        }
    }

    script.push_str("exit /b 0\r\n");
    script
}

/// 注册表删除块；删除后 reg query 仍成功说明目标还在
fn push_registry_block(
    script: &mut String,
    query: &str,
    delete: &str,
    failed_line: &str,
    deleted_line: &str,
) {
    script.push_str(&format!("{query} >nul 2>&1\r\n"));
    script.push_str("if not errorlevel 1 (\r\n");
    script.push_str(&format!("    {delete} >nul 2>&1\r\n"));
    script.push_str(&format!("    {query} >nul 2>&1\r\n"));
    script.push_str(&format!(
        "    if errorlevel 1 ({deleted_line}) else ({failed_line})\r\n)\r\n"
    ));
}
