use anyhow::Result;
use clap::Subcommand;
use serde::Serialize;

use super::Output;
use crate::modules::cleaner::elevation::{self, DirectBroker, ElevationBroker, UacBatchBroker};
use crate::modules::cleaner::models::StepOutcome;
use crate::modules::common::error::KeepError;
use crate::modules::common::response::OperationResponse;
use crate::modules::common::utils;
use crate::modules::executor::{CommandRunner, ShellExecutor};
use crate::modules::profiles::{self, CleanupProfile};
use crate::modules::registry::{self, RegistryBackend};
use crate::modules::reporter::OperationReport;
use crate::modules::runner::{self, CleanupRunner, RunnerDirs};
use crate::modules::session::Session;

#[derive(Subcommand, Debug)]
pub enum CleanCommand {
    /// 列出所有清理配置
    List,

    /// 创建清理配置模板
    New {
        name: String,
    },

    /// 检查配置中的目标是否存在 (只读)
    Check {
        profile: String,
    },

    /// 执行清理 (不指定 --confirm 则只预览)
    Run {
        profile: String,

        /// 确认删除
        #[arg(long)]
        confirm: bool,

        /// 权限不足时不请求管理员权限
        #[arg(long)]
        no_elevate: bool,
    },

    /// 恢复清理前备份的注册表值
    Restore {
        profile: String,

        /// 权限不足时不请求管理员权限
        #[arg(long)]
        no_elevate: bool,
    },
}

#[derive(Debug, Serialize)]
struct ProfileSummary {
    name: String,
    description: Option<String>,
    targets: usize,
    has_backup: bool,
}

pub async fn execute(cmd: CleanCommand, session: &mut Session, out: Output) -> Result<bool> {
    let profiles_dir = session.paths.profiles.clone();
    let dirs = session.paths.runner_dirs();

    match cmd {
        CleanCommand::List => {
            let response = OperationResponse::from_result(profiles::list_profiles(&profiles_dir).map(|list| {
                list.into_iter()
                    .map(|p| ProfileSummary {
                        has_backup: runner::has_backup(&dirs, &p.name),
                        targets: p.target_count(),
                        name: p.name,
                        description: p.description,
                    })
                    .collect::<Vec<_>>()
            }));
            out.emit(&response, |list| {
                println!("清理配置目录: {}\n", profiles_dir.display());
                if list.is_empty() {
                    println!("暂无清理配置，使用 `clean new <名称>` 创建");
                }
                for p in list {
                    println!(
                        "  {:20} {:3} 个目标{}  {}",
                        p.name,
                        p.targets,
                        if p.has_backup { " [有备份]" } else { "" },
                        p.description.as_deref().unwrap_or_default()
                    );
                }
            })
        }
        CleanCommand::New { name } => {
            let response = OperationResponse::from_result(
                profiles::write_template(&profiles_dir, &name).map(|p| p.to_string_lossy().to_string()),
            );
            out.emit(&response, |path| println!("已创建清理配置: {}", path))
        }
        CleanCommand::Check { profile } => run_profile(&profiles_dir, &profile, dirs, Action::Check, out).await,
        CleanCommand::Run {
            profile,
            confirm,
            no_elevate,
        } => {
            let action = if confirm { Action::Clean { elevate: !no_elevate } } else { Action::Preview };
            run_profile(&profiles_dir, &profile, dirs, action, out).await
        }
        CleanCommand::Restore { profile, no_elevate } => {
            let action = Action::Restore { elevate: !no_elevate };
            run_profile(&profiles_dir, &profile, dirs, action, out).await
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Action {
    Check,
    Preview,
    Clean { elevate: bool },
    Restore { elevate: bool },
}

/// 加载配置，构造当前平台的执行环境并执行
///
/// 已经是管理员或不在 Windows 上时直接在进程内删除，否则通过 UAC 提权。
async fn run_profile(
    profiles_dir: &std::path::Path,
    name: &str,
    dirs: RunnerDirs,
    action: Action,
    out: Output,
) -> Result<bool> {
    let profile = match profiles::load_profile(profiles_dir, name) {
        Ok(profile) => profile,
        Err(e) => return out.emit(&OperationResponse::<()>::failure(e.to_string()), |_| {}),
    };

    let backend = registry::platform_registry();
    let registry: &dyn RegistryBackend = backend.as_ref();
    let executor = ShellExecutor::default();

    let elevate = matches!(
        action,
        Action::Clean { elevate: true } | Action::Restore { elevate: true }
    );
    let broker = if cfg!(windows) && elevate && !elevation::is_elevated() {
        DynBroker::Uac(UacBatchBroker::new(&executor))
    } else {
        DynBroker::Direct(DirectBroker::new(&registry))
    };

    let runner = CleanupRunner::new(&registry, &executor, &broker, dirs);
    match action {
        Action::Check => check(&runner, &profile, out).await,
        Action::Preview => preview(&runner, &profile, out).await,
        Action::Clean { .. } => {
            let response = runner.clean(&profile, true).await;
            out.emit(&response, print_report)
        }
        Action::Restore { .. } => {
            let response = runner.restore(&profile).await;
            out.emit(&response, print_report)
        }
    }
}

/// 运行时选择的提权方式
pub enum DynBroker<'a> {
    Uac(UacBatchBroker<'a, ShellExecutor>),
    Direct(DirectBroker<'a, &'a dyn RegistryBackend>),
}

impl ElevationBroker for DynBroker<'_> {
    async fn execute(
        &self,
        task: &elevation::ElevatedTask,
    ) -> Result<elevation::HandoffResult, KeepError> {
        match self {
            DynBroker::Uac(broker) => broker.execute(task).await,
            DynBroker::Direct(broker) => broker.execute(task).await,
        }
    }
}

async fn check<R, C, B>(
    runner: &CleanupRunner<'_, R, C, B>,
    profile: &CleanupProfile,
    out: Output,
) -> Result<bool>
where
    R: RegistryBackend,
    C: CommandRunner,
    B: ElevationBroker,
{
    let presence = runner.check(profile).await;
    let message = if presence.needs_cleaning {
        format!("发现 {} 项残留", presence.found_items.len())
    } else {
        "未发现需要清理的项目".to_string()
    };
    let response = OperationResponse::ok(presence).with_message(message);

    out.emit(&response, |presence| {
        for item in &presence.found_items {
            println!("  {}", item);
        }
        for process in &presence.running_processes {
            println!("  {} (运行中)", process);
        }
    })
}

async fn preview<R, C, B>(
    runner: &CleanupRunner<'_, R, C, B>,
    profile: &CleanupProfile,
    out: Output,
) -> Result<bool>
where
    R: RegistryBackend,
    C: CommandRunner,
    B: ElevationBroker,
{
    if !out.json {
        println!("=== 预览模式 ===");
        println!("使用 --confirm 确认删除\n");
    }
    check(runner, profile, out).await
}

fn print_report(report: &OperationReport) {
    println!("\n--- {}完成: {} ---", report.operation, report.profile);
    for step in &report.steps {
        let status = match &step.outcome {
            StepOutcome::Done => "成功".to_string(),
            StepOutcome::NotFound => "不存在".to_string(),
            StepOutcome::Failed(reason) => format!("失败: {}", reason),
        };
        println!("  [{}] {} ({})", step.kind, step.label, status);
    }
    println!("  删除: {}", report.summary.deleted_count);
    println!("  释放空间: {}", utils::format_size(report.summary.bytes_freed));
    if let Some(backup) = &report.backup {
        println!("  备份: {}", backup);
    }
}
