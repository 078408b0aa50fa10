pub mod memory;
pub mod models;
pub mod query;

#[cfg(windows)]
pub mod winreg_backend;

use crate::modules::common::error::KeepError;
pub use memory::MemoryRegistry;
pub use models::{Deletion, KeyState, RegData, RegistryPath, RegistryRoot};

/// 注册表读写接口
///
/// 路径使用 `HKCU\Software\...` 形式的完整字符串。
pub trait RegistryBackend {
    fn key_state(&self, path: &str) -> Result<KeyState, KeepError>;

    /// 列出键下名称以 `prefix` 开头的值（不区分大小写），键不存在时返回空列表
    fn values_with_prefix(&self, key: &str, prefix: &str) -> Result<Vec<String>, KeepError>;

    fn read_value(&self, key: &str, name: &str) -> Result<Option<RegData>, KeepError>;

    fn delete_key(&self, path: &str) -> Result<Deletion, KeepError>;

    fn delete_value(&self, key: &str, name: &str) -> Result<Deletion, KeepError>;

    fn write_value(&self, key: &str, name: &str, data: &RegData) -> Result<(), KeepError>;
}

impl<T: RegistryBackend + ?Sized> RegistryBackend for &T {
    fn key_state(&self, path: &str) -> Result<KeyState, KeepError> {
        (**self).key_state(path)
    }

    fn values_with_prefix(&self, key: &str, prefix: &str) -> Result<Vec<String>, KeepError> {
        (**self).values_with_prefix(key, prefix)
    }

    fn read_value(&self, key: &str, name: &str) -> Result<Option<RegData>, KeepError> {
        (**self).read_value(key, name)
    }

    fn delete_key(&self, path: &str) -> Result<Deletion, KeepError> {
        (**self).delete_key(path)
    }

    fn delete_value(&self, key: &str, name: &str) -> Result<Deletion, KeepError> {
        (**self).delete_value(key, name)
    }

    fn write_value(&self, key: &str, name: &str, data: &RegData) -> Result<(), KeepError> {
        (**self).write_value(key, name, data)
    }
}

/// 解析路径，失败时返回注册表错误
pub(crate) fn parse_path(path: &str) -> Result<RegistryPath, KeepError> {
    RegistryPath::parse(path)
        .ok_or_else(|| KeepError::Registry(format!("无效的注册表路径格式: {}", path)))
}

/// 当前平台的注册表实现
#[cfg(windows)]
pub fn platform_registry() -> Box<dyn RegistryBackend> {
    Box::new(winreg_backend::WinRegistry)
}

/// 非 Windows 平台没有注册表，所有目标都视为不存在
#[cfg(not(windows))]
pub fn platform_registry() -> Box<dyn RegistryBackend> {
    tracing::debug!("当前平台没有注册表，使用空的内存实现");
    Box::new(MemoryRegistry::new())
}
