use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::modules::common::utils;

/// 清理配置：一组可独立删除的子目标
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CleanupProfile {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// 进程映像名，如 `vendor.exe`
    #[serde(default)]
    pub processes: Vec<String>,

    #[serde(default)]
    pub registry_keys: Vec<String>,

    #[serde(default)]
    pub registry_values: Vec<RegistryValueTarget>,

    #[serde(default)]
    pub folders: Vec<FolderTarget>,

    /// 删除注册表值之前是否做一次性备份
    #[serde(default)]
    pub backup: bool,
}

impl CleanupProfile {
    pub fn target_count(&self) -> usize {
        self.processes.len() + self.registry_keys.len() + self.registry_values.len() + self.folders.len()
    }
}

/// 注册表值目标：指定名称或名称前缀
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistryValueTarget {
    pub key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

impl RegistryValueTarget {
    pub fn exact(key: &str, name: &str) -> Self {
        Self {
            key: key.to_string(),
            name: Some(name.to_string()),
            prefix: None,
        }
    }

    pub fn prefixed(key: &str, prefix: &str) -> Self {
        Self {
            key: key.to_string(),
            name: None,
            prefix: Some(prefix.to_string()),
        }
    }

    pub fn label(&self) -> String {
        match (&self.name, &self.prefix) {
            (Some(name), _) => format!("{}\\{}", self.key, name),
            (None, Some(prefix)) => format!("{}\\{}*", self.key, prefix),
            (None, None) => self.key.clone(),
        }
    }
}

/// 目录目标，`elevated` 表示需要管理员权限删除
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FolderTarget {
    pub path: String,

    #[serde(default)]
    pub elevated: bool,
}

impl FolderTarget {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            elevated: false,
        }
    }

    pub fn elevated(path: &str) -> Self {
        Self {
            path: path.to_string(),
            elevated: true,
        }
    }

    /// 展开环境变量和通配符，返回当前存在的目录
    pub fn resolve(&self) -> Vec<PathBuf> {
        let expanded = utils::expand_env_vars(&self.path);
        if utils::has_unexpanded_vars(&expanded) {
            tracing::debug!("路径包含未定义的环境变量: {}", self.path);
            return Vec::new();
        }

        if !expanded.contains(['*', '?', '[']) {
            let path = PathBuf::from(&expanded);
            return if path.exists() { vec![path] } else { Vec::new() };
        }

        match glob::glob(&expanded) {
            Ok(paths) => paths.filter_map(|p| p.ok()).collect(),
            Err(e) => {
                tracing::warn!("无效的通配符路径 {}: {}", self.path, e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_deserializes_with_defaults() {
        let json = r#"{ "name": "vendor", "registry_keys": ["HKCU\\Software\\Vendor"] }"#;
        let profile: CleanupProfile = serde_json::from_str(json).unwrap();

        assert_eq!(profile.name, "vendor");
        assert_eq!(profile.target_count(), 1);
        assert!(!profile.backup);
        assert!(profile.folders.is_empty());
    }

    #[test]
    fn value_target_labels() {
        assert_eq!(
            RegistryValueTarget::exact(r"HKCU\Software\Vendor", "Id").label(),
            r"HKCU\Software\Vendor\Id"
        );
        assert_eq!(
            RegistryValueTarget::prefixed(r"HKCU\Software\Vendor", "session_").label(),
            r"HKCU\Software\Vendor\session_*"
        );
    }

    #[test]
    fn folder_resolve_expands_globs() {
        let root = std::env::temp_dir().join(format!("rust-keep-glob-{}", utils::generate_id()));
        assert!(std::fs::create_dir_all(root.join("cache-a")).is_ok());
        assert!(std::fs::create_dir_all(root.join("cache-b")).is_ok());
        assert!(std::fs::create_dir_all(root.join("keep")).is_ok());

        let pattern = root.join("cache-*").to_string_lossy().to_string();
        let mut found = FolderTarget::new(&pattern).resolve();
        found.sort();
        assert_eq!(found, vec![root.join("cache-a"), root.join("cache-b")]);

        let missing = root.join("nothing").to_string_lossy().to_string();
        assert!(FolderTarget::new(&missing).resolve().is_empty());

        let _ = std::fs::remove_dir_all(&root);
    }
}
