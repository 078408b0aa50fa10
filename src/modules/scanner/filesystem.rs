use super::models::{PresenceReport, TargetKind};
use crate::modules::profiles::FolderTarget;

/// 检查目录，目标展开后至少有一个存在即记录
pub fn check_folders(folders: &[FolderTarget], report: &mut PresenceReport) {
    for folder in folders {
        let resolved = folder.resolve();
        match resolved.len() {
            0 => tracing::debug!("目录 {}: 不存在", folder.path),
            1 => {
                let path = resolved[0].to_string_lossy().to_string();
                tracing::debug!("目录 {}: 存在", path);
                report.record(TargetKind::Folder, &path);
            }
            n => {
                tracing::debug!("目录 {}: 匹配 {} 个", folder.path, n);
                report.record(TargetKind::Folder, &format!("{} ({} 个)", folder.path, n));
            }
        }
    }
}
