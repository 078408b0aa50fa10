use crate::modules::common::error::KeepError;
use crate::modules::common::utils;
use crate::modules::registry::RegistryPath;

/// 关键系统路径黑名单
const CRITICAL_PATHS: &[&str] = &[
    r"%SystemRoot%",
    r"C:\Windows",
    r"C:\Program Files\Windows",
    r"C:\ProgramData\Microsoft\Windows",
];

/// 关键注册表路径黑名单
const CRITICAL_REGISTRY_PATHS: &[&str] = &[
    r"HKLM\SYSTEM",
    r"HKLM\SOFTWARE\Microsoft\Windows NT\CurrentVersion",
    r"HKLM\SOFTWARE\Microsoft\Cryptography",
    r"HKLM\SOFTWARE\Microsoft\Windows\CurrentVersion\Run",
    r"HKLM\SOFTWARE\Microsoft\Windows\CurrentVersion\RunOnce",
    r"HKLM\SOFTWARE\Microsoft\Windows\CurrentVersion\WindowsUpdate",
    r"HKLM\SOFTWARE\WOW6432Node\Microsoft\Windows\CurrentVersion\Run",
    r"HKCR\*",
    r"HKLM\BOOT",
    r"HKLM\SAM",
    r"HKLM\SECURITY",
];

/// 注册表目标检查：路径必须可解析、不能是根键或一级键、不能落在关键路径下
pub fn check_registry_path(path: &str) -> Result<(), KeepError> {
    let parsed = RegistryPath::parse(path)
        .ok_or_else(|| KeepError::Profile(format!("无效的注册表路径: {}", path)))?;

    if parsed.subkey.split('\\').filter(|s| !s.is_empty()).count() < 2 {
        return Err(KeepError::CriticalSystemItem(format!(
            "注册表路径范围过大: {}",
            parsed
        )));
    }

    let canonical = parsed.to_string().to_uppercase();
    for critical in CRITICAL_REGISTRY_PATHS {
        if canonical.starts_with(&critical.to_uppercase()) {
            return Err(KeepError::CriticalSystemItem(format!(
                "不能删除关键系统注册表项: {}",
                parsed
            )));
        }
    }

    Ok(())
}

/// 目录目标检查：不能是盘符根目录，也不能落在系统目录下
pub fn check_folder_path(path: &str) -> Result<(), KeepError> {
    let expanded = utils::expand_env_vars(path);
    let trimmed = expanded.trim_end_matches(['\\', '/']);

    if trimmed.is_empty() || trimmed.len() <= 2 || trimmed == "/" {
        return Err(KeepError::CriticalSystemItem(format!(
            "不能删除根目录: {}",
            path
        )));
    }

    if is_critical_path(trimmed) {
        return Err(KeepError::CriticalSystemItem(format!(
            "不能删除关键系统目录: {}",
            path
        )));
    }

    if is_home_or_profile_root(trimmed) {
        return Err(KeepError::CriticalSystemItem(format!(
            "不能删除用户目录本身: {}",
            path
        )));
    }

    Ok(())
}

/// 检查是否为关键系统路径
fn is_critical_path(path: &str) -> bool {
    let path_upper = path.replace('/', "\\").to_uppercase();

    CRITICAL_PATHS.iter().any(|critical| {
        let critical = utils::expand_env_vars(critical).to_uppercase();
        path_upper == critical || path_upper.starts_with(&format!("{}\\", critical))
    })
}

/// 用户主目录和几个 AppData 根目录只能删其中的子目录
fn is_home_or_profile_root(path: &str) -> bool {
    let roots = [
        dirs::home_dir(),
        dirs::data_dir(),
        dirs::data_local_dir(),
        dirs::config_dir(),
    ];
    let candidate = std::path::Path::new(path);

    roots.iter().flatten().any(|root| root.as_path() == candidate)
}
