use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use super::models::{Deletion, KeyState, RegData, RegistryPath};
use super::{parse_path, RegistryBackend};
use crate::modules::common::error::KeepError;

#[derive(Debug, Default, Clone)]
struct MemKey {
    /// 小写名称 -> (原始名称, 数据)
    values: BTreeMap<String, (String, RegData)>,
}

/// 内存注册表，用于测试和没有注册表的平台
#[derive(Debug, Clone, Default)]
pub struct MemoryRegistry {
    keys: Arc<Mutex<BTreeMap<String, MemKey>>>,
}

fn canonical(path: &RegistryPath) -> String {
    path.to_string().to_lowercase()
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建键（以及缺失的父键）
    pub fn with_key(self, path: &str) -> Self {
        if let Some(parsed) = RegistryPath::parse(path) {
            if let Ok(mut keys) = self.keys.lock() {
                keys.entry(canonical(&parsed)).or_default();
            }
        }
        self
    }

    pub fn with_value(self, key: &str, name: &str, data: RegData) -> Self {
        let _ = self.write_value(key, name, &data);
        self
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, MemKey>>, KeepError> {
        self.keys
            .lock()
            .map_err(|_| KeepError::Registry("内存注册表锁已损坏".to_string()))
    }
}

fn has_descendants(keys: &BTreeMap<String, MemKey>, canonical_path: &str) -> bool {
    let prefix = format!("{}\\", canonical_path);
    keys.keys().any(|k| k.starts_with(&prefix))
}

impl RegistryBackend for MemoryRegistry {
    fn key_state(&self, path: &str) -> Result<KeyState, KeepError> {
        let path = canonical(&parse_path(path)?);
        let keys = self.lock()?;

        let descendants = has_descendants(&keys, &path);
        match keys.get(&path) {
            None if !descendants => Ok(KeyState::Absent),
            Some(key) if key.values.is_empty() && !descendants => Ok(KeyState::Empty),
            _ => Ok(KeyState::Populated),
        }
    }

    fn values_with_prefix(&self, key: &str, prefix: &str) -> Result<Vec<String>, KeepError> {
        let path = canonical(&parse_path(key)?);
        let prefix = prefix.to_lowercase();
        let keys = self.lock()?;

        Ok(keys
            .get(&path)
            .map(|k| {
                k.values
                    .iter()
                    .filter(|(lower, _)| lower.starts_with(&prefix))
                    .map(|(_, (name, _))| name.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn read_value(&self, key: &str, name: &str) -> Result<Option<RegData>, KeepError> {
        let path = canonical(&parse_path(key)?);
        let keys = self.lock()?;

        Ok(keys
            .get(&path)
            .and_then(|k| k.values.get(&name.to_lowercase()))
            .map(|(_, data)| data.clone()))
    }

    fn delete_key(&self, path: &str) -> Result<Deletion, KeepError> {
        let path = canonical(&parse_path(path)?);
        let prefix = format!("{}\\", path);
        let mut keys = self.lock()?;

        let before = keys.len();
        keys.retain(|k, _| k != &path && !k.starts_with(&prefix));

        if keys.len() == before {
            Ok(Deletion::Absent)
        } else {
            Ok(Deletion::Removed)
        }
    }

    fn delete_value(&self, key: &str, name: &str) -> Result<Deletion, KeepError> {
        let path = canonical(&parse_path(key)?);
        let mut keys = self.lock()?;

        let removed = keys
            .get_mut(&path)
            .and_then(|k| k.values.remove(&name.to_lowercase()));

        Ok(if removed.is_some() {
            Deletion::Removed
        } else {
            Deletion::Absent
        })
    }

    fn write_value(&self, key: &str, name: &str, data: &RegData) -> Result<(), KeepError> {
        let path = canonical(&parse_path(key)?);
        let mut keys = self.lock()?;

        keys.entry(path)
            .or_default()
            .values
            .insert(name.to_lowercase(), (name.to_string(), data.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_state_distinguishes_empty_and_populated() {
        let registry = MemoryRegistry::new()
            .with_key(r"HKCU\Software\Empty")
            .with_value(r"HKCU\Software\Full", "Name", RegData::String("x".into()))
            .with_key(r"HKCU\Software\Parent\Child");

        assert_eq!(registry.key_state(r"HKCU\Software\Empty").ok(), Some(KeyState::Empty));
        assert_eq!(registry.key_state(r"HKCU\Software\Full").ok(), Some(KeyState::Populated));
        assert_eq!(registry.key_state(r"HKCU\Software\Parent").ok(), Some(KeyState::Populated));
        assert_eq!(registry.key_state(r"HKCU\Software\Missing").ok(), Some(KeyState::Absent));
    }

    #[test]
    fn lookups_are_case_insensitive() {
        let registry = MemoryRegistry::new().with_value(
            r"HKEY_CURRENT_USER\SOFTWARE\Vendor",
            "Cached_Uid_1",
            RegData::Dword(1),
        );

        assert_eq!(
            registry.values_with_prefix(r"HKCU\Software\vendor", "cached_uid_").ok(),
            Some(vec!["Cached_Uid_1".to_string()])
        );
        assert_eq!(
            registry.read_value(r"HKCU\Software\Vendor", "CACHED_UID_1").ok().flatten(),
            Some(RegData::Dword(1))
        );
    }

    #[test]
    fn delete_key_removes_subtree_and_reports_absence() {
        let registry = MemoryRegistry::new()
            .with_key(r"HKCU\Software\Vendor\A")
            .with_key(r"HKCU\Software\Vendor\B");

        assert_eq!(registry.delete_key(r"HKCU\Software\Vendor").ok(), Some(Deletion::Removed));
        assert_eq!(registry.key_state(r"HKCU\Software\Vendor\A").ok(), Some(KeyState::Absent));
        assert_eq!(registry.delete_key(r"HKCU\Software\Vendor").ok(), Some(Deletion::Absent));
    }

    #[test]
    fn invalid_path_is_registry_error() {
        let registry = MemoryRegistry::new();
        assert!(matches!(
            registry.key_state(r"C:\not\a\key"),
            Err(KeepError::Registry(_))
        ));
    }
}
