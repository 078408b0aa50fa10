//! 清理配置的加载与校验
//!
//! 配置保存在数据目录的 `profiles/*.json` 中，每个文件一个配置。

pub mod models;

use std::path::{Path, PathBuf};

use crate::modules::cleaner::safety;
use crate::modules::common::error::KeepError;
pub use models::{CleanupProfile, FolderTarget, RegistryValueTarget};

/// 配置文件路径
pub fn profile_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.json", name))
}

/// 校验配置
pub fn validate(profile: &CleanupProfile) -> Result<(), KeepError> {
    let name_ok = !profile.name.is_empty()
        && profile
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !name_ok {
        return Err(KeepError::Profile(format!(
            "配置名只能包含字母、数字、- 和 _: {:?}",
            profile.name
        )));
    }

    if profile.target_count() == 0 {
        return Err(KeepError::Profile(format!("配置 {} 没有任何目标", profile.name)));
    }

    for key in &profile.registry_keys {
        safety::check_registry_path(key)?;
    }

    for value in &profile.registry_values {
        safety::check_registry_path(&value.key)?;
        match (&value.name, &value.prefix) {
            (Some(name), _) if !name.is_empty() => {}
            (None, Some(prefix)) if !prefix.is_empty() => {}
            _ => {
                return Err(KeepError::Profile(format!(
                    "注册表值目标必须指定 name 或 prefix: {}",
                    value.key
                )))
            }
        }
    }

    for folder in &profile.folders {
        safety::check_folder_path(&folder.path)?;
    }

    for process in &profile.processes {
        if process.is_empty() || process.contains(['\\', '/', '"', '&', '|']) {
            return Err(KeepError::Profile(format!("无效的进程名: {:?}", process)));
        }
    }

    Ok(())
}

/// 按名称加载配置
pub fn load_profile(dir: &Path, name: &str) -> Result<CleanupProfile, KeepError> {
    let path = profile_path(dir, name);
    if !path.exists() {
        return Err(KeepError::NotFound(format!("清理配置 {}", name)));
    }

    let content = std::fs::read_to_string(&path)?;
    let profile: CleanupProfile = serde_json::from_str(&content)?;
    validate(&profile)?;

    Ok(profile)
}

/// 列出所有有效配置，无效文件记录警告后跳过
pub fn list_profiles(dir: &Path) -> Result<Vec<CleanupProfile>, KeepError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut profiles = Vec::new();
    for entry in std::fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        if path.extension().map_or(true, |e| e != "json") {
            continue;
        }

        let parsed = std::fs::read_to_string(&path)
            .map_err(KeepError::from)
            .and_then(|content| Ok(serde_json::from_str::<CleanupProfile>(&content)?))
            .and_then(|profile| validate(&profile).map(|_| profile));

        match parsed {
            Ok(profile) => profiles.push(profile),
            Err(e) => tracing::warn!("跳过无效的清理配置 {}: {}", path.display(), e),
        }
    }

    profiles.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(profiles)
}

/// 写入一个新配置模板，已存在时报错
pub fn write_template(dir: &Path, name: &str) -> Result<PathBuf, KeepError> {
    let path = profile_path(dir, name);
    if path.exists() {
        return Err(KeepError::Other(format!("配置已存在: {}", path.display())));
    }

    let template = CleanupProfile {
        name: name.to_string(),
        description: Some("卸载后残留的注册表项和缓存目录".to_string()),
        processes: vec![format!("{}.exe", name)],
        registry_keys: vec![format!(r"HKCU\Software\{}", name)],
        registry_values: Vec::new(),
        folders: vec![FolderTarget::new(&format!(r"%LOCALAPPDATA%\{}", name))],
        backup: false,
    };
    validate(&template)?;

    std::fs::create_dir_all(dir)?;
    std::fs::write(&path, serde_json::to_string_pretty(&template)?)?;
    tracing::info!("已创建清理配置模板: {}", path.display());

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::common::utils;

    fn temp_dir(test_name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "rust-keep-profiles-{}-{}",
            test_name,
            utils::generate_id()
        ));
        let _ = std::fs::create_dir_all(&dir);
        dir
    }

    fn sample() -> CleanupProfile {
        CleanupProfile {
            name: "vendor".to_string(),
            registry_keys: vec![r"HKCU\Software\Vendor".to_string()],
            ..CleanupProfile::default()
        }
    }

    #[test]
    fn validate_rejects_empty_and_badly_named_profiles() {
        let mut profile = sample();
        profile.name = "bad name".to_string();
        assert!(matches!(validate(&profile), Err(KeepError::Profile(_))));

        let empty = CleanupProfile {
            name: "empty".to_string(),
            ..CleanupProfile::default()
        };
        assert!(matches!(validate(&empty), Err(KeepError::Profile(_))));
    }

    #[test]
    fn validate_rejects_value_target_without_name_or_prefix() {
        let mut profile = sample();
        profile.registry_values.push(RegistryValueTarget {
            key: r"HKCU\Software\Vendor".to_string(),
            name: None,
            prefix: None,
        });
        assert!(matches!(validate(&profile), Err(KeepError::Profile(_))));
    }

    #[test]
    fn validate_rejects_critical_targets() {
        let mut profile = sample();
        profile.registry_keys.push(r"HKLM\SYSTEM\CurrentControlSet".to_string());
        assert!(matches!(
            validate(&profile),
            Err(KeepError::CriticalSystemItem(_))
        ));
    }

    #[test]
    fn list_skips_invalid_files_and_sorts() {
        let dir = temp_dir("list");
        let mut other = sample();
        other.name = "another".to_string();

        assert!(std::fs::write(dir.join("vendor.json"), serde_json::to_string(&sample()).unwrap()).is_ok());
        assert!(std::fs::write(dir.join("another.json"), serde_json::to_string(&other).unwrap()).is_ok());
        assert!(std::fs::write(dir.join("broken.json"), "{ not json").is_ok());
        assert!(std::fs::write(dir.join("notes.txt"), "ignored").is_ok());

        let names: Vec<String> = list_profiles(&dir)
            .unwrap_or_default()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["another".to_string(), "vendor".to_string()]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn template_round_trips_through_load() {
        let dir = temp_dir("template");

        assert!(write_template(&dir, "demo").is_ok());
        assert!(write_template(&dir, "demo").is_err());

        let loaded = load_profile(&dir, "demo");
        assert_eq!(loaded.map(|p| p.name).ok(), Some("demo".to_string()));
        assert!(matches!(load_profile(&dir, "missing"), Err(KeepError::NotFound(_))));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
