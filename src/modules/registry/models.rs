use serde::{Deserialize, Serialize};

use crate::modules::common::utils;

/// 注册表根键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RegistryRoot {
    LocalMachine,
    CurrentUser,
    ClassesRoot,
    Users,
    CurrentConfig,
}

impl RegistryRoot {
    pub fn short_name(&self) -> &'static str {
        match self {
            RegistryRoot::LocalMachine => "HKLM",
            RegistryRoot::CurrentUser => "HKCU",
            RegistryRoot::ClassesRoot => "HKCR",
            RegistryRoot::Users => "HKU",
            RegistryRoot::CurrentConfig => "HKCC",
        }
    }
}

impl std::fmt::Display for RegistryRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.short_name())
    }
}

const ROOT_ALIASES: &[(&str, RegistryRoot)] = &[
    ("HKLM", RegistryRoot::LocalMachine),
    ("HKEY_LOCAL_MACHINE", RegistryRoot::LocalMachine),
    ("HKCU", RegistryRoot::CurrentUser),
    ("HKEY_CURRENT_USER", RegistryRoot::CurrentUser),
    ("HKCR", RegistryRoot::ClassesRoot),
    ("HKEY_CLASSES_ROOT", RegistryRoot::ClassesRoot),
    ("HKU", RegistryRoot::Users),
    ("HKEY_USERS", RegistryRoot::Users),
    ("HKCC", RegistryRoot::CurrentConfig),
    ("HKEY_CURRENT_CONFIG", RegistryRoot::CurrentConfig),
];

/// 解析后的注册表键路径
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegistryPath {
    pub root: RegistryRoot,
    pub subkey: String,
}

impl RegistryPath {
    /// 解析 `HKLM\...` 或 `HKEY_LOCAL_MACHINE\...` 形式的路径
    pub fn parse(path: &str) -> Option<Self> {
        let path = utils::normalize_registry_path(path);
        let (head, rest) = match path.split_once('\\') {
            Some((head, rest)) => (head, rest),
            None => (path.as_str(), ""),
        };

        ROOT_ALIASES
            .iter()
            .find(|(alias, _)| alias.eq_ignore_ascii_case(head))
            .map(|(_, root)| RegistryPath {
                root: *root,
                subkey: rest.to_string(),
            })
    }

    pub fn join(&self, child: &str) -> Self {
        let subkey = if self.subkey.is_empty() {
            child.to_string()
        } else {
            format!("{}\\{}", self.subkey, child)
        };
        Self {
            root: self.root,
            subkey,
        }
    }
}

impl std::fmt::Display for RegistryPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.subkey.is_empty() {
            write!(f, "{}", self.root)
        } else {
            write!(f, "{}\\{}", self.root, self.subkey)
        }
    }
}

/// 键的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyState {
    Absent,
    /// 键存在但没有值也没有子键
    Empty,
    Populated,
}

/// 删除结果，目标不存在不视为错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deletion {
    Removed,
    Absent,
}

/// 注册表值数据，保留原始类型
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RegData {
    String(String),
    ExpandString(String),
    MultiString(Vec<String>),
    Dword(u32),
    Qword(u64),
    Binary(Vec<u8>),
}

impl RegData {
    /// `reg add /t` 使用的类型名
    pub fn reg_type(&self) -> &'static str {
        match self {
            RegData::String(_) => "REG_SZ",
            RegData::ExpandString(_) => "REG_EXPAND_SZ",
            RegData::MultiString(_) => "REG_MULTI_SZ",
            RegData::Dword(_) => "REG_DWORD",
            RegData::Qword(_) => "REG_QWORD",
            RegData::Binary(_) => "REG_BINARY",
        }
    }

    /// `reg add /d` 的参数形式：多字符串用 `\0` 分隔，二进制写成十六进制
    pub fn reg_add_data(&self) -> String {
        match self {
            RegData::String(s) | RegData::ExpandString(s) => s.clone(),
            RegData::MultiString(items) => items.join("\\0"),
            RegData::Dword(v) => v.to_string(),
            RegData::Qword(v) => v.to_string(),
            RegData::Binary(bytes) => bytes.iter().map(|b| format!("{:02X}", b)).collect(),
        }
    }
}
