use super::models::{PresenceReport, TargetKind};
use crate::modules::profiles::RegistryValueTarget;
use crate::modules::registry::{KeyState, RegistryBackend};

/// 检查注册表项；空键不算残留，读取出错视为不存在
pub fn check_registry_keys<R: RegistryBackend>(
    registry: &R,
    keys: &[String],
    report: &mut PresenceReport,
) {
    for key in keys {
        match registry.key_state(key) {
            Ok(KeyState::Populated) => {
                tracing::debug!("注册表 {}: 存在", key);
                report.record(TargetKind::RegistryKey, key);
            }
            Ok(KeyState::Empty) => tracing::debug!("注册表 {}: 空", key),
            Ok(KeyState::Absent) => tracing::debug!("注册表 {}: 不存在", key),
            Err(e) => tracing::debug!("检查注册表 {} 失败，视为不存在: {}", key, e),
        }
    }
}

/// 检查注册表值，按名称或前缀匹配
pub fn check_registry_values<R: RegistryBackend>(
    registry: &R,
    targets: &[RegistryValueTarget],
    report: &mut PresenceReport,
) {
    for target in targets {
        if !matching_value_names(registry, target).is_empty() {
            tracing::debug!("注册表值 {}: 存在", target.label());
            report.record(TargetKind::RegistryValue, &target.label());
        }
    }
}

/// 目标当前对应的值名称
pub fn matching_value_names<R: RegistryBackend>(
    registry: &R,
    target: &RegistryValueTarget,
) -> Vec<String> {
    let result = match (&target.name, &target.prefix) {
        (Some(name), _) => registry
            .read_value(&target.key, name)
            .map(|v| v.map(|_| vec![name.clone()]).unwrap_or_default()),
        (None, Some(prefix)) => registry.values_with_prefix(&target.key, prefix),
        (None, None) => Ok(Vec::new()),
    };

    result.unwrap_or_else(|e| {
        tracing::debug!("读取注册表值 {} 失败，视为不存在: {}", target.label(), e);
        Vec::new()
    })
}
