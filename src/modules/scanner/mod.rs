//! 存在检查：只读，逐个检查配置中的所有子目标

pub mod filesystem;
pub mod models;
pub mod process;
pub mod registry;

use crate::modules::executor::CommandRunner;
use crate::modules::profiles::CleanupProfile;
use crate::modules::registry::RegistryBackend;
use models::{PresenceReport, TargetKind};

/// 检查配置中哪些子目标存在
///
/// 找到第一个之后仍会检查其余目标，`found_items` 是完整列表。
pub async fn check_presence<R, C>(
    profile: &CleanupProfile,
    registry: &R,
    commands: &C,
) -> PresenceReport
where
    R: RegistryBackend,
    C: CommandRunner,
{
    tracing::info!("开始检查: {}", profile.name);
    let mut report = PresenceReport::default();

    for image in &profile.processes {
        if process::is_process_running(commands, image).await {
            report.record(TargetKind::Process, image);
        }
    }

    registry::check_registry_keys(registry, &profile.registry_keys, &mut report);
    registry::check_registry_values(registry, &profile.registry_values, &mut report);
    filesystem::check_folders(&profile.folders, &mut report);

    tracing::info!(
        "检查完成: {} needs_cleaning={} ({} 项)",
        profile.name,
        report.needs_cleaning,
        report.found_items.len()
    );

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::common::utils;
    use crate::modules::executor::testing::ScriptedRunner;
    use crate::modules::profiles::{FolderTarget, RegistryValueTarget};
    use crate::modules::registry::{MemoryRegistry, RegData};

    fn profile_with(folder: &str) -> CleanupProfile {
        CleanupProfile {
            name: "vendor".to_string(),
            processes: vec!["vendor.exe".to_string()],
            registry_keys: vec![
                r"HKCU\Software\Vendor".to_string(),
                r"HKLM\SOFTWARE\Vendor".to_string(),
            ],
            registry_values: vec![RegistryValueTarget::prefixed(
                r"HKCU\Software\Shared",
                "vendor_session_",
            )],
            folders: vec![FolderTarget::new(folder)],
            backup: false,
            description: None,
        }
    }

    #[tokio::test]
    async fn nothing_present_means_no_cleaning() {
        let missing = std::env::temp_dir().join(format!("rust-keep-absent-{}", utils::generate_id()));
        let profile = profile_with(&missing.to_string_lossy());
        let registry = MemoryRegistry::new().with_key(r"HKCU\Software\Vendor");
        let runner = ScriptedRunner::new();

        let report = check_presence(&profile, &registry, &runner).await;

        assert!(!report.needs_cleaning);
        assert!(report.found_items.is_empty());
    }

    #[tokio::test]
    async fn every_present_target_is_listed() {
        let folder = std::env::temp_dir().join(format!("rust-keep-present-{}", utils::generate_id()));
        assert!(std::fs::create_dir_all(&folder).is_ok());

        let profile = profile_with(&folder.to_string_lossy());
        let registry = MemoryRegistry::new()
            .with_value(r"HKCU\Software\Vendor", "Id", RegData::String("1".into()))
            .with_key(r"HKLM\SOFTWARE\Vendor\Sub")
            .with_value(r"HKCU\Software\Shared", "vendor_session_7", RegData::Dword(7));
        let runner = ScriptedRunner::new()
            .on_success("tasklist", "\"vendor.exe\",\"100\",\"Console\",\"1\",\"1 K\"");

        let report = check_presence(&profile, &registry, &runner).await;

        assert!(report.needs_cleaning);
        assert_eq!(report.found_items.len(), 4);
        assert_eq!(report.running_processes.len(), 1);

        let _ = std::fs::remove_dir_all(&folder);
    }

    #[tokio::test]
    async fn running_process_alone_does_not_need_cleaning() {
        let missing = std::env::temp_dir().join(format!("rust-keep-absent-{}", utils::generate_id()));
        let profile = profile_with(&missing.to_string_lossy());
        let registry = MemoryRegistry::new();
        let runner = ScriptedRunner::new()
            .on_success("tasklist", "\"vendor.exe\",\"100\",\"Console\",\"1\",\"1 K\"");

        let report = check_presence(&profile, &registry, &runner).await;

        assert!(!report.needs_cleaning);
        assert_eq!(report.running_processes, vec!["进程: vendor.exe".to_string()]);
    }
}
