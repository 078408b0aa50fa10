use std::path::Path;

use super::models::StepRecord;
use super::safety;
use crate::modules::common::error::KeepError;
use crate::modules::common::utils;
use crate::modules::scanner::models::TargetKind;

/// 删除目录
///
/// 权限不足时返回 `Err(PermissionDenied)`，由调用方决定是否提权重试。
pub fn delete_folder(path: &Path) -> Result<StepRecord, KeepError> {
    let label = path.to_string_lossy().to_string();

    if let Err(e) = safety::check_folder_path(&label) {
        tracing::warn!("跳过关键系统项: {}", e);
        return Ok(StepRecord::failed(TargetKind::Folder, label, e.to_string()));
    }

    // 目标已不存在
    if !path.exists() {
        return Ok(StepRecord::not_found(TargetKind::Folder, label));
    }

    let bytes_freed = utils::calculate_dir_size(path).unwrap_or(0);
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };

    match result {
        Ok(_) => {
            tracing::info!("已删除: {}", label);
            Ok(StepRecord::done(TargetKind::Folder, label).with_bytes(bytes_freed))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Ok(StepRecord::not_found(TargetKind::Folder, label))
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            tracing::warn!("删除需要管理员权限: {}", label);
            Err(KeepError::PermissionDenied(label))
        }
        Err(e) => {
            tracing::error!("删除失败 {}: {}", label, e);
            Ok(StepRecord::failed(TargetKind::Folder, label, e.to_string()))
        }
    }
}
