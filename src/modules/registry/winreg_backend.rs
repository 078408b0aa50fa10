use std::io::ErrorKind;

use winreg::enums::*;
use winreg::{RegKey, RegValue};

use super::models::{Deletion, KeyState, RegData, RegistryPath, RegistryRoot};
use super::{parse_path, RegistryBackend};
use crate::modules::common::error::KeepError;

/// 基于 winreg 的 Windows 注册表实现
#[derive(Debug, Clone, Copy, Default)]
pub struct WinRegistry;

fn predef(root: RegistryRoot) -> RegKey {
    let hkey = match root {
        RegistryRoot::LocalMachine => HKEY_LOCAL_MACHINE,
        RegistryRoot::CurrentUser => HKEY_CURRENT_USER,
        RegistryRoot::ClassesRoot => HKEY_CLASSES_ROOT,
        RegistryRoot::Users => HKEY_USERS,
        RegistryRoot::CurrentConfig => HKEY_CURRENT_CONFIG,
    };
    RegKey::predef(hkey)
}

fn map_io(path: &RegistryPath, e: std::io::Error) -> KeepError {
    if e.kind() == ErrorKind::PermissionDenied {
        KeepError::PermissionDenied(path.to_string())
    } else {
        KeepError::Registry(format!("{}: {}", path, e))
    }
}

/// 打开键，不存在时返回 None
fn open(path: &RegistryPath, flags: u32) -> Result<Option<RegKey>, KeepError> {
    match predef(path.root).open_subkey_with_flags(&path.subkey, flags) {
        Ok(key) => Ok(Some(key)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(map_io(path, e)),
    }
}

impl RegistryBackend for WinRegistry {
    fn key_state(&self, path: &str) -> Result<KeyState, KeepError> {
        let path = parse_path(path)?;
        let key = match open(&path, KEY_READ)? {
            Some(key) => key,
            None => return Ok(KeyState::Absent),
        };

        let info = key.query_info().map_err(|e| map_io(&path, e))?;
        if info.sub_keys == 0 && info.values == 0 {
            Ok(KeyState::Empty)
        } else {
            Ok(KeyState::Populated)
        }
    }

    fn values_with_prefix(&self, key: &str, prefix: &str) -> Result<Vec<String>, KeepError> {
        let path = parse_path(key)?;
        let key = match open(&path, KEY_READ)? {
            Some(key) => key,
            None => return Ok(Vec::new()),
        };

        let prefix = prefix.to_lowercase();
        Ok(key
            .enum_values()
            .filter_map(|v| v.ok())
            .map(|(name, _)| name)
            .filter(|name| name.to_lowercase().starts_with(&prefix))
            .collect())
    }

    fn read_value(&self, key: &str, name: &str) -> Result<Option<RegData>, KeepError> {
        let path = parse_path(key)?;
        let key = match open(&path, KEY_READ)? {
            Some(key) => key,
            None => return Ok(None),
        };

        let raw = match key.get_raw_value(name) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(map_io(&path, e)),
        };

        let data = match raw.vtype {
            REG_SZ => key.get_value::<String, _>(name).map(RegData::String),
            REG_EXPAND_SZ => key.get_value::<String, _>(name).map(RegData::ExpandString),
            REG_MULTI_SZ => key.get_value::<Vec<String>, _>(name).map(RegData::MultiString),
            REG_DWORD => key.get_value::<u32, _>(name).map(RegData::Dword),
            REG_QWORD => key.get_value::<u64, _>(name).map(RegData::Qword),
            REG_BINARY => Ok(RegData::Binary(raw.bytes.to_vec())),
            other => {
                return Err(KeepError::Registry(format!(
                    "{}\\{}: 不支持的值类型 {:?}",
                    path, name, other
                )))
            }
        };

        data.map(Some).map_err(|e| map_io(&path, e))
    }

    fn delete_key(&self, path: &str) -> Result<Deletion, KeepError> {
        let path = parse_path(path)?;
        if open(&path, KEY_READ)?.is_none() {
            return Ok(Deletion::Absent);
        }

        match predef(path.root).delete_subkey_all(&path.subkey) {
            Ok(_) => Ok(Deletion::Removed),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Deletion::Absent),
            Err(e) => Err(map_io(&path, e)),
        }
    }

    fn delete_value(&self, key: &str, name: &str) -> Result<Deletion, KeepError> {
        let path = parse_path(key)?;
        let key = match open(&path, KEY_READ | KEY_WRITE)? {
            Some(key) => key,
            None => return Ok(Deletion::Absent),
        };

        match key.delete_value(name) {
            Ok(_) => Ok(Deletion::Removed),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Deletion::Absent),
            Err(e) => Err(map_io(&path, e)),
        }
    }

    fn write_value(&self, key: &str, name: &str, data: &RegData) -> Result<(), KeepError> {
        let path = parse_path(key)?;
        let (key, _) = predef(path.root)
            .create_subkey(&path.subkey)
            .map_err(|e| map_io(&path, e))?;

        let result = match data {
            RegData::String(value) => key.set_value(name, value),
            RegData::Dword(value) => key.set_value(name, value),
            RegData::Qword(value) => key.set_value(name, value),
            RegData::ExpandString(value) => key.set_raw_value(
                name,
                &RegValue {
                    bytes: wide_multi(std::slice::from_ref(value), false).into(),
                    vtype: REG_EXPAND_SZ,
                },
            ),
            RegData::MultiString(values) => key.set_raw_value(
                name,
                &RegValue {
                    bytes: wide_multi(values, true).into(),
                    vtype: REG_MULTI_SZ,
                },
            ),
            RegData::Binary(bytes) => key.set_raw_value(
                name,
                &RegValue {
                    bytes: bytes.clone().into(),
                    vtype: REG_BINARY,
                },
            ),
        };
        result.map_err(|e| map_io(&path, e))
    }
}

/// UTF-16LE 编码，每项以 NUL 结尾；多字符串再追加一个 NUL
fn wide_multi(items: &[String], multi: bool) -> Vec<u8> {
    let mut units: Vec<u16> = Vec::new();
    for item in items {
        units.extend(item.encode_utf16());
        units.push(0);
    }
    if multi {
        units.push(0);
    }
    units.iter().flat_map(|u| u.to_le_bytes()).collect()
}
