pub mod elevation;
pub mod filesystem;
pub mod models;
pub mod process;
pub mod registry;
pub mod safety;

use std::time::Duration;

use crate::modules::common::error::KeepError;
use crate::modules::common::utils;
use crate::modules::executor::CommandRunner;
use crate::modules::profiles::CleanupProfile;
use crate::modules::registry::RegistryBackend;
use crate::modules::scanner;
use crate::modules::scanner::models::TargetKind;
use elevation::{ElevatedAction, ElevatedTask, ElevationBroker};
use models::{MutationOutcome, StepOutcome, StepRecord};

/// 结束进程后等待系统释放句柄的时间
pub const PROCESS_SETTLE: Duration = Duration::from_millis(500);

/// 按配置删除残留
///
/// 每个子目标独立执行，单个失败不影响其它子目标。权限不足的项目收集起来，
/// 最后和标记为需要提权的目录一起交给 [`ElevationBroker`] 执行。
pub struct Mutator<'a, R, C, B>
where
    R: RegistryBackend,
    C: CommandRunner,
    B: ElevationBroker,
{
    registry: &'a R,
    commands: &'a C,
    broker: &'a B,
    settle: Duration,
}

/// 等待提权执行的步骤：步骤序号和动作
pub(crate) struct Pending {
    pub step: usize,
    pub action: ElevatedAction,
    pub bytes: u64,
}

/// 把排队的动作交给提权执行，并按结果更新对应步骤
pub(crate) async fn run_elevated<B: ElevationBroker>(
    broker: &B,
    steps: &mut [StepRecord],
    pending: Vec<Pending>,
) {
    let task = ElevatedTask::new(pending.iter().map(|p| p.action.clone()).collect());

    match broker.execute(&task).await {
        Ok(result) => {
            for (index, item) in pending.iter().enumerate() {
                let outcome = result.outcome(index);
                let step = &mut steps[item.step];
                if outcome == StepOutcome::Done {
                    step.bytes_freed = item.bytes;
                }
                step.outcome = outcome;
            }
        }
        Err(e) => {
            tracing::error!("提权执行失败: {}", e);
            for item in &pending {
                steps[item.step].outcome = StepOutcome::Failed(e.to_string());
            }
        }
    }
}

impl<'a, R, C, B> Mutator<'a, R, C, B>
where
    R: RegistryBackend,
    C: CommandRunner,
    B: ElevationBroker,
{
    pub fn new(registry: &'a R, commands: &'a C, broker: &'a B) -> Self {
        Self {
            registry,
            commands,
            broker,
            settle: PROCESS_SETTLE,
        }
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// 执行清理
    pub async fn mutate(
        &self,
        profile: &CleanupProfile,
        confirm: bool,
    ) -> Result<MutationOutcome, KeepError> {
        if !confirm {
            return Err(KeepError::PermissionDenied(
                "需要确认才能执行清理".to_string(),
            ));
        }

        let mut steps: Vec<StepRecord> = Vec::new();
        let mut pending: Vec<Pending> = Vec::new();

        for image in &profile.processes {
            steps.push(process::kill_process(self.commands, image, self.settle).await);
        }

        for key in &profile.registry_keys {
            let result = registry::delete_registry_key(self.registry, key);
            Self::push_step(
                &mut steps,
                &mut pending,
                result,
                TargetKind::RegistryKey,
                key.clone(),
                ElevatedAction::DeleteRegistryKey(key.clone()),
                0,
            );
        }

        for target in &profile.registry_values {
            let names = scanner::registry::matching_value_names(self.registry, target);
            if names.is_empty() {
                steps.push(StepRecord::not_found(TargetKind::RegistryValue, target.label()));
                continue;
            }

            for name in names {
                let result = registry::delete_registry_value(self.registry, &target.key, &name);
                Self::push_step(
                    &mut steps,
                    &mut pending,
                    result,
                    TargetKind::RegistryValue,
                    format!("{}\\{}", target.key, name),
                    ElevatedAction::DeleteRegistryValue {
                        key: target.key.clone(),
                        name,
                    },
                    0,
                );
            }
        }

        for target in profile.folders.iter().filter(|f| !f.elevated) {
            let paths = target.resolve();
            if paths.is_empty() {
                steps.push(StepRecord::not_found(TargetKind::Folder, target.path.clone()));
                continue;
            }

            for path in paths {
                let bytes = utils::calculate_dir_size(&path).unwrap_or(0);
                let result = filesystem::delete_folder(&path);
                Self::push_step(
                    &mut steps,
                    &mut pending,
                    result,
                    TargetKind::Folder,
                    path.to_string_lossy().to_string(),
                    ElevatedAction::RemoveFolder(path),
                    bytes,
                );
            }
        }

        for target in profile.folders.iter().filter(|f| f.elevated) {
            let paths = target.resolve();
            if paths.is_empty() {
                steps.push(StepRecord::not_found(TargetKind::Folder, target.path.clone()));
                continue;
            }

            for path in paths {
                let label = path.to_string_lossy().to_string();
                if let Err(e) = safety::check_folder_path(&label) {
                    tracing::warn!("跳过关键系统项: {}", e);
                    steps.push(StepRecord::failed(TargetKind::Folder, label, e.to_string()));
                    continue;
                }

                let bytes = utils::calculate_dir_size(&path).unwrap_or(0);
                pending.push(Pending {
                    step: steps.len(),
                    action: ElevatedAction::RemoveFolder(path),
                    bytes,
                });
                steps.push(StepRecord::failed(TargetKind::Folder, label, "等待提权"));
            }
        }

        if !pending.is_empty() {
            run_elevated(self.broker, &mut steps, pending).await;
        }

        Ok(MutationOutcome { steps })
    }

    #[allow(clippy::too_many_arguments)]
    fn push_step(
        steps: &mut Vec<StepRecord>,
        pending: &mut Vec<Pending>,
        result: Result<StepRecord, KeepError>,
        kind: TargetKind,
        label: String,
        action: ElevatedAction,
        bytes: u64,
    ) {
        match result {
            Ok(record) => steps.push(record),
            Err(KeepError::PermissionDenied(_)) => {
                pending.push(Pending {
                    step: steps.len(),
                    action,
                    bytes,
                });
                steps.push(StepRecord::failed(kind, label, "等待提权"));
            }
            Err(e) => steps.push(StepRecord::failed(kind, label, e.to_string())),
        }
    }
}
