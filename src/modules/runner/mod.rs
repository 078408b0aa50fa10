//! 清理流程
//!
//! `Idle → CheckingPresence → (NotNeeded | BackingUp → Mutating → Reporting) → Idle`
//!
//! 每次操作都从头到尾 await 完成，同一时间只有一个破坏性操作。

use std::cell::Cell;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::modules::cleaner::elevation::{ElevatedAction, ElevationBroker};
use crate::modules::cleaner::models::{MutationOutcome, StepRecord};
use crate::modules::cleaner::{self, Mutator, Pending, PROCESS_SETTLE};
use crate::modules::common::error::KeepError;
use crate::modules::common::response::OperationResponse;
use crate::modules::executor::CommandRunner;
use crate::modules::guard::{self, BackupCapture, BackupEntry, BackupStatus};
use crate::modules::profiles::CleanupProfile;
use crate::modules::registry::query;
use crate::modules::registry::RegistryBackend;
use crate::modules::reporter::{self, OperationKind, OperationReport};
use crate::modules::scanner::models::{PresenceReport, TargetKind};
use crate::modules::scanner;

/// 当前所处阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunPhase {
    Idle,
    CheckingPresence,
    NotNeeded,
    BackingUp,
    Mutating,
    Reporting,
}

/// 清理流程所需的目录
#[derive(Debug, Clone)]
pub struct RunnerDirs {
    /// 备份标记文件目录
    pub utilities: PathBuf,
    pub reports: PathBuf,
}

impl RunnerDirs {
    pub fn backup_marker(&self, profile: &str) -> PathBuf {
        self.utilities.join(format!("backup_{}.txt", profile))
    }
}

pub struct CleanupRunner<'a, R, C, B>
where
    R: RegistryBackend,
    C: CommandRunner,
    B: ElevationBroker,
{
    registry: &'a R,
    commands: &'a C,
    broker: &'a B,
    dirs: RunnerDirs,
    settle: Duration,
    phase: Cell<RunPhase>,
}

impl<'a, R, C, B> CleanupRunner<'a, R, C, B>
where
    R: RegistryBackend,
    C: CommandRunner,
    B: ElevationBroker,
{
    pub fn new(registry: &'a R, commands: &'a C, broker: &'a B, dirs: RunnerDirs) -> Self {
        Self {
            registry,
            commands,
            broker,
            dirs,
            settle: PROCESS_SETTLE,
            phase: Cell::new(RunPhase::Idle),
        }
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn phase(&self) -> RunPhase {
        self.phase.get()
    }

    fn enter(&self, phase: RunPhase) {
        tracing::debug!("阶段: {:?} -> {:?}", self.phase.get(), phase);
        self.phase.set(phase);
    }

    /// 只读检查
    pub async fn check(&self, profile: &CleanupProfile) -> PresenceReport {
        self.enter(RunPhase::CheckingPresence);
        let report = scanner::check_presence(profile, self.registry, self.commands).await;
        self.enter(RunPhase::Idle);
        report
    }

    /// 检查、备份、删除并生成报告
    pub async fn clean(
        &self,
        profile: &CleanupProfile,
        confirm: bool,
    ) -> OperationResponse<OperationReport> {
        if !confirm {
            return OperationResponse::failure("需要确认才能执行清理，请加上 --confirm");
        }

        let presence = self.check(profile).await;
        if !presence.needs_cleaning {
            self.enter(RunPhase::NotNeeded);
            tracing::info!("{}: 未发现需要清理的项目", profile.name);
            self.enter(RunPhase::Idle);
            return OperationResponse::failure("未发现需要清理的项目，所有目标都不存在");
        }

        let backup = if profile.backup && !profile.registry_values.is_empty() {
            self.enter(RunPhase::BackingUp);
            Some(self.backup(profile).await)
        } else {
            None
        };

        self.enter(RunPhase::Mutating);
        let mutator = Mutator::new(self.registry, self.commands, self.broker).with_settle(self.settle);
        let outcome = match mutator.mutate(profile, confirm).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.enter(RunPhase::Idle);
                return OperationResponse::failure(e.to_string());
            }
        };

        self.enter(RunPhase::Reporting);
        let mut response = self.report(
            profile,
            OperationKind::Clean,
            outcome,
            presence.found_items,
            backup.clone(),
        );
        if let Some(status) = backup.filter(|b| b.needs_warning()) {
            let note = status.to_string();
            response.warning = Some(match response.warning.take() {
                Some(existing) => format!("{}; {}", existing, note),
                None => note,
            });
        }

        self.enter(RunPhase::Idle);
        response
    }

    /// 把备份的原始值写回注册表
    pub async fn restore(&self, profile: &CleanupProfile) -> OperationResponse<OperationReport> {
        let marker = self.dirs.backup_marker(&profile.name);
        let entries = match guard::read_backup(&marker) {
            Ok(entries) => entries,
            Err(e) => return OperationResponse::failure(e.to_string()),
        };

        if entries.is_empty() {
            return OperationResponse::failure(format!("备份文件中没有可恢复的值: {}", marker.display()));
        }

        self.enter(RunPhase::Mutating);
        let mut steps: Vec<StepRecord> = Vec::new();
        let mut pending: Vec<Pending> = Vec::new();
        for entry in &entries {
            match guard::restore_value(self.registry, entry) {
                Ok(step) => steps.push(step),
                Err(e) => {
                    tracing::info!("权限不足，等待提权恢复 {}: {}", entry.label(), e);
                    pending.push(Pending {
                        step: steps.len(),
                        action: ElevatedAction::WriteRegistryValue {
                            key: entry.key.clone(),
                            name: entry.name.clone(),
                            data: entry.data.clone(),
                        },
                        bytes: 0,
                    });
                    steps.push(StepRecord::failed(TargetKind::RegistryValue, entry.label(), "等待提权"));
                }
            }
        }
        if !pending.is_empty() {
            cleaner::run_elevated(self.broker, &mut steps, pending).await;
        }

        self.enter(RunPhase::Reporting);
        let response = self.report(
            profile,
            OperationKind::Restore,
            MutationOutcome { steps },
            Vec::new(),
            None,
        );
        self.enter(RunPhase::Idle);
        response
    }

    /// 一次性备份；失败不会阻止后续删除
    async fn backup(&self, profile: &CleanupProfile) -> BackupStatus {
        let marker = self.dirs.backup_marker(&profile.name);
        guard::ensure_backup(&marker, || self.fetch_original_values(profile)).await
    }

    /// 逐个读取原始值；单个值失败只跳过该值
    async fn fetch_original_values(&self, profile: &CleanupProfile) -> Result<BackupCapture, KeepError> {
        let mut capture = BackupCapture::default();

        for target in &profile.registry_values {
            for name in scanner::registry::matching_value_names(self.registry, target) {
                match query::query_value(self.commands, &target.key, &name).await {
                    Ok(Some(data)) => capture.entries.push(BackupEntry {
                        key: target.key.clone(),
                        name,
                        data,
                    }),
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!("读取原始值失败，跳过 {}\\{}: {}", target.key, name, e);
                        capture.skipped.push(format!("{}\\{}: {}", target.key, name, e));
                    }
                }
            }
        }

        Ok(capture)
    }

    fn report(
        &self,
        profile: &CleanupProfile,
        operation: OperationKind,
        outcome: MutationOutcome,
        found_items: Vec<String>,
        backup: Option<BackupStatus>,
    ) -> OperationResponse<OperationReport> {
        let summary = reporter::summarize(&outcome);
        tracing::info!(
            "{} {}: {:?}, 删除 {} 项",
            operation,
            profile.name,
            summary.status,
            summary.deleted_count
        );

        let mut report = OperationReport::new(&profile.name, operation, outcome.steps, summary.clone())
            .with_found_items(found_items);
        if let Some(backup) = backup {
            report = report.with_backup(backup);
        }

        if let Err(e) = reporter::save_report(&self.dirs.reports, &report) {
            tracing::warn!("保存报告失败: {}", e);
        }

        summary.into_response(report)
    }
}

/// 该配置是否已有备份
pub fn has_backup(dirs: &RunnerDirs, profile: &str) -> bool {
    dirs.backup_marker(profile).exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::cleaner::elevation::DirectBroker;
    use crate::modules::common::utils;
    use crate::modules::executor::testing::ScriptedRunner;
    use crate::modules::profiles::RegistryValueTarget;
    use crate::modules::registry::{MemoryRegistry, RegData};

    fn dirs(tag: &str) -> (PathBuf, RunnerDirs) {
        let root = std::env::temp_dir().join(format!("rust-keep-runner-{}-{}", tag, utils::generate_id()));
        let dirs = RunnerDirs {
            utilities: root.join("utilities"),
            reports: root.join("reports"),
        };
        (root, dirs)
    }

    fn value_profile() -> CleanupProfile {
        CleanupProfile {
            name: "vendor".into(),
            registry_keys: vec![r"HKCU\Software\Vendor\Cache".into()],
            registry_values: vec![RegistryValueTarget::exact(r"HKCU\Software\Vendor", "InstallId")],
            backup: true,
            ..Default::default()
        }
    }

    fn populated() -> MemoryRegistry {
        MemoryRegistry::new()
            .with_key(r"HKCU\Software\Vendor\Cache\Data")
            .with_value(r"HKCU\Software\Vendor", "InstallId", RegData::String("original".into()))
    }

    const REG_QUERY_OUTPUT: &str =
        "\r\nHKEY_CURRENT_USER\\Software\\Vendor\r\n    InstallId    REG_SZ    original\r\n\r\n";

    #[tokio::test]
    async fn all_absent_is_not_needed_and_touches_nothing() {
        let (root, dirs) = dirs("absent");
        let registry = MemoryRegistry::new();
        let runner = ScriptedRunner::new();
        let broker = DirectBroker::new(&registry);
        let cleanup = CleanupRunner::new(&registry, &runner, &broker, dirs.clone());

        let response = cleanup.clean(&value_profile(), true).await;

        assert!(!response.success);
        assert!(response.error.unwrap_or_default().contains("不存在"));
        assert!(!has_backup(&dirs, "vendor"));
        assert_eq!(cleanup.phase(), RunPhase::Idle);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn backup_is_written_before_values_are_deleted() {
        let (root, dirs) = dirs("backup");
        let registry = populated();
        let runner = ScriptedRunner::new().on_success("reg query", REG_QUERY_OUTPUT);
        let broker = DirectBroker::new(&registry);
        let cleanup = CleanupRunner::new(&registry, &runner, &broker, dirs.clone())
            .with_settle(Duration::ZERO);

        let response = cleanup.clean(&value_profile(), true).await;

        assert!(response.success);
        assert!(response.warning.is_none());
        let report = response.data.unwrap();
        assert_eq!(report.summary.deleted_count, 2);
        assert_eq!(report.backup, Some(BackupStatus::Created(1)));
        assert_eq!(
            guard::read_backup(&dirs.backup_marker("vendor")).unwrap(),
            vec![BackupEntry {
                key: r"HKCU\Software\Vendor".into(),
                name: "InstallId".into(),
                data: RegData::String("original".into()),
            }]
        );
        assert_eq!(
            registry.read_value(r"HKCU\Software\Vendor", "InstallId").unwrap(),
            None
        );
        assert_eq!(reporter::list_reports(&dirs.reports).unwrap().len(), 1);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn failed_backup_fetch_does_not_block_cleanup() {
        let (root, dirs) = dirs("fetch-failed");
        let registry = populated();
        let runner = ScriptedRunner::new().on_timeout("reg query");
        let broker = DirectBroker::new(&registry);
        let cleanup = CleanupRunner::new(&registry, &runner, &broker, dirs.clone())
            .with_settle(Duration::ZERO);

        let response = cleanup.clean(&value_profile(), true).await;

        assert!(response.success);
        assert!(response.warning.unwrap_or_default().contains("读取原始值失败"));
        assert!(!has_backup(&dirs, "vendor"));
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn existing_backup_is_not_overwritten() {
        let (root, dirs) = dirs("existing");
        assert!(std::fs::create_dir_all(&dirs.utilities).is_ok());
        let marker = dirs.backup_marker("vendor");
        assert!(std::fs::write(&marker, "HKCU\\Software\\Vendor\\InstallId=first\n").is_ok());

        let registry = populated();
        let runner = ScriptedRunner::new().on_success("reg query", REG_QUERY_OUTPUT);
        let broker = DirectBroker::new(&registry);
        let cleanup = CleanupRunner::new(&registry, &runner, &broker, dirs.clone())
            .with_settle(Duration::ZERO);

        let response = cleanup.clean(&value_profile(), true).await;

        assert_eq!(response.data.and_then(|r| r.backup), Some(BackupStatus::AlreadyPresent));
        assert!(runner.calls().iter().all(|c| !c.starts_with("reg query")));
        assert_eq!(
            std::fs::read_to_string(&marker).unwrap(),
            "HKCU\\Software\\Vendor\\InstallId=first\n"
        );
        let _ = std::fs::remove_dir_all(&root);
    }

    fn write_backup(dirs: &RunnerDirs, entries: &[BackupEntry]) {
        assert!(std::fs::create_dir_all(&dirs.utilities).is_ok());
        let content: String = entries
            .iter()
            .map(|e| format!("{}\n", e.to_line().unwrap()))
            .collect();
        assert!(std::fs::write(dirs.backup_marker("vendor"), content).is_ok());
    }

    fn backed_up(name: &str, data: RegData) -> BackupEntry {
        BackupEntry {
            key: r"HKCU\Software\Vendor".into(),
            name: name.into(),
            data,
        }
    }

    #[tokio::test]
    async fn restore_reapplies_backed_up_values() {
        let (root, dirs) = dirs("restore");
        write_backup(
            &dirs,
            &[
                backed_up("InstallId", RegData::String("original".into())),
                backed_up("Count", RegData::Dword(10)),
            ],
        );

        let registry = MemoryRegistry::new();
        let runner = ScriptedRunner::new();
        let broker = DirectBroker::new(&registry);
        let cleanup = CleanupRunner::new(&registry, &runner, &broker, dirs.clone());

        let response = cleanup.restore(&value_profile()).await;

        assert!(response.success);
        assert_eq!(
            registry.read_value(r"HKCU\Software\Vendor", "Count").unwrap(),
            Some(RegData::Dword(10))
        );
        let _ = std::fs::remove_dir_all(&root);
    }

    /// 写入总是权限不足的注册表
    struct ReadOnlyRegistry(MemoryRegistry);

    impl RegistryBackend for ReadOnlyRegistry {
        fn key_state(&self, path: &str) -> Result<crate::modules::registry::KeyState, KeepError> {
            self.0.key_state(path)
        }

        fn values_with_prefix(&self, key: &str, prefix: &str) -> Result<Vec<String>, KeepError> {
            self.0.values_with_prefix(key, prefix)
        }

        fn read_value(&self, key: &str, name: &str) -> Result<Option<RegData>, KeepError> {
            self.0.read_value(key, name)
        }

        fn delete_key(&self, path: &str) -> Result<crate::modules::registry::Deletion, KeepError> {
            self.0.delete_key(path)
        }

        fn delete_value(&self, key: &str, name: &str) -> Result<crate::modules::registry::Deletion, KeepError> {
            self.0.delete_value(key, name)
        }

        fn write_value(&self, key: &str, _name: &str, _data: &RegData) -> Result<(), KeepError> {
            Err(KeepError::PermissionDenied(key.to_string()))
        }
    }

    #[tokio::test]
    async fn denied_restore_goes_through_elevation() {
        let (root, dirs) = dirs("restore-elevated");
        write_backup(&dirs, &[backed_up("Blob", RegData::Binary(vec![0x01, 0xab]))]);

        let target = MemoryRegistry::new();
        let registry = ReadOnlyRegistry(target.clone());
        let runner = ScriptedRunner::new();
        let broker = DirectBroker::new(&target);
        let cleanup = CleanupRunner::new(&registry, &runner, &broker, dirs.clone());

        let response = cleanup.restore(&value_profile()).await;

        assert!(response.success);
        assert_eq!(response.data.map(|r| r.summary.deleted_count), Some(1));
        assert_eq!(
            target.read_value(r"HKCU\Software\Vendor", "Blob").unwrap(),
            Some(RegData::Binary(vec![0x01, 0xab]))
        );
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn one_slow_value_does_not_discard_the_rest_of_the_backup() {
        let (root, dirs) = dirs("partial-fetch");
        let registry = MemoryRegistry::new()
            .with_value(r"HKCU\Software\Vendor", "InstallId", RegData::String("original".into()))
            .with_value(r"HKCU\Software\Vendor", "Slow", RegData::Dword(1));
        let runner = ScriptedRunner::new()
            .on_timeout(r"/v Slow")
            .on_success("reg query", REG_QUERY_OUTPUT);
        let broker = DirectBroker::new(&registry);
        let cleanup = CleanupRunner::new(&registry, &runner, &broker, dirs.clone())
            .with_settle(Duration::ZERO);

        let profile = CleanupProfile {
            name: "vendor".into(),
            registry_values: vec![
                RegistryValueTarget::exact(r"HKCU\Software\Vendor", "InstallId"),
                RegistryValueTarget::exact(r"HKCU\Software\Vendor", "Slow"),
            ],
            backup: true,
            ..Default::default()
        };

        let response = cleanup.clean(&profile, true).await;

        assert!(response.success);
        assert!(response.warning.unwrap_or_default().contains("Slow"));
        assert!(matches!(
            response.data.and_then(|r| r.backup),
            Some(BackupStatus::Partial { captured: 1, .. })
        ));
        assert_eq!(
            guard::read_backup(&dirs.backup_marker("vendor")).unwrap(),
            vec![backed_up("InstallId", RegData::String("original".into()))]
        );
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn restore_without_backup_fails() {
        let (root, dirs) = dirs("no-backup");
        let registry = MemoryRegistry::new();
        let runner = ScriptedRunner::new();
        let broker = DirectBroker::new(&registry);
        let cleanup = CleanupRunner::new(&registry, &runner, &broker, dirs);

        let response = cleanup.restore(&value_profile()).await;

        assert!(!response.success);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn unconfirmed_clean_does_nothing() {
        let (root, dirs) = dirs("unconfirmed");
        let registry = populated();
        let runner = ScriptedRunner::new();
        let broker = DirectBroker::new(&registry);
        let cleanup = CleanupRunner::new(&registry, &runner, &broker, dirs);

        let response = cleanup.clean(&value_profile(), false).await;

        assert!(!response.success);
        assert!(registry.read_value(r"HKCU\Software\Vendor", "InstallId").unwrap().is_some());
        let _ = std::fs::remove_dir_all(&root);
    }
}
