use serde::{Deserialize, Serialize};

/// 子目标类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetKind {
    /// 进程
    Process,
    /// 注册表项
    RegistryKey,
    /// 注册表值
    RegistryValue,
    /// 目录
    Folder,
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetKind::Process => write!(f, "进程"),
            TargetKind::RegistryKey => write!(f, "注册表"),
            TargetKind::RegistryValue => write!(f, "注册表值"),
            TargetKind::Folder => write!(f, "目录"),
        }
    }
}

/// 存在检查结果
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresenceReport {
    pub needs_cleaning: bool,
    /// 每个存在的可清理子目标一项，形如 `注册表: HKCU\Software\Vendor`
    pub found_items: Vec<String>,
    /// 正在运行的相关进程，不影响 `needs_cleaning`
    pub running_processes: Vec<String>,
}

impl PresenceReport {
    pub fn record(&mut self, kind: TargetKind, label: &str) {
        let item = format!("{}: {}", kind, label);
        if kind == TargetKind::Process {
            self.running_processes.push(item);
        } else {
            self.needs_cleaning = true;
            self.found_items.push(item);
        }
    }
}
