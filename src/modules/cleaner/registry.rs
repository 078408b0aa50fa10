use super::models::StepRecord;
use super::safety;
use crate::modules::common::error::KeepError;
use crate::modules::registry::{Deletion, RegistryBackend};
use crate::modules::scanner::models::TargetKind;

/// 删除注册表项
///
/// 权限不足时返回 `Err(PermissionDenied)`，由调用方决定是否提权重试；
/// 其它错误都转换为失败记录。
pub fn delete_registry_key<R: RegistryBackend>(
    registry: &R,
    path: &str,
) -> Result<StepRecord, KeepError> {
    if let Err(e) = safety::check_registry_path(path) {
        tracing::warn!("跳过关键系统项: {}", e);
        return Ok(StepRecord::failed(TargetKind::RegistryKey, path, e.to_string()));
    }

    match registry.delete_key(path) {
        Ok(Deletion::Removed) => {
            tracing::info!("已删除注册表项: {}", path);
            Ok(StepRecord::done(TargetKind::RegistryKey, path))
        }
        Ok(Deletion::Absent) => {
            tracing::debug!("注册表项不存在: {}", path);
            Ok(StepRecord::not_found(TargetKind::RegistryKey, path))
        }
        Err(e @ KeepError::PermissionDenied(_)) => Err(e),
        Err(e) => {
            tracing::error!("删除注册表失败 {}: {}", path, e);
            Ok(StepRecord::failed(TargetKind::RegistryKey, path, e.to_string()))
        }
    }
}

/// 删除单个注册表值
pub fn delete_registry_value<R: RegistryBackend>(
    registry: &R,
    key: &str,
    name: &str,
) -> Result<StepRecord, KeepError> {
    let label = format!("{}\\{}", key, name);

    if let Err(e) = safety::check_registry_path(key) {
        tracing::warn!("跳过关键系统项: {}", e);
        return Ok(StepRecord::failed(TargetKind::RegistryValue, label, e.to_string()));
    }

    match registry.delete_value(key, name) {
        Ok(Deletion::Removed) => {
            tracing::info!("已删除注册表值: {}", label);
            Ok(StepRecord::done(TargetKind::RegistryValue, label))
        }
        Ok(Deletion::Absent) => Ok(StepRecord::not_found(TargetKind::RegistryValue, label)),
        Err(e @ KeepError::PermissionDenied(_)) => Err(e),
        Err(e) => {
            tracing::error!("删除注册表值失败 {}: {}", label, e);
            Ok(StepRecord::failed(TargetKind::RegistryValue, label, e.to_string()))
        }
    }
}
