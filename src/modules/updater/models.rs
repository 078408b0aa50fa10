use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// 更新过程中的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum UpdateEvent {
    Checking,
    Available {
        version: String,
        current: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        release_date: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        size: Option<u64>,
    },
    NotAvailable {
        version: String,
    },
    Downloading(DownloadProgress),
    Downloaded {
        version: String,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub percent: f64,
    pub transferred: u64,
    pub total: u64,
}

impl DownloadProgress {
    pub fn new(transferred: u64, total: u64) -> Self {
        let percent = if total == 0 {
            0.0
        } else {
            transferred as f64 * 100.0 / total as f64
        };
        Self {
            percent,
            transferred,
            total,
        }
    }
}

/// 发布附件 (安装包)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub url: String,
    pub size: u64,
}

/// 发布源返回的最新版本
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    pub version: String,
    pub release_date: Option<String>,
    pub asset: Option<ReleaseAsset>,
}

impl ReleaseInfo {
    pub fn size(&self) -> Option<u64> {
        self.asset.as_ref().map(|a| a.size)
    }
}

/// 更新检查结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCheck {
    pub current_version: String,
    pub latest_version: Option<String>,
    pub update_available: bool,
    /// 有更新时可下载的安装包
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset: Option<ReleaseAsset>,
}

/// 已下载、等待安装的更新，保存在 `updates/pending.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingUpdate {
    pub version: String,
    pub path: PathBuf,
    pub size: u64,
}

/// 由事件累积出的更新状态
///
/// 启动时若存在已下载的更新，由 [`PendingUpdate`] 恢复 `downloaded`。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateState {
    pub check_in_progress: bool,
    pub downloading: bool,
    pub downloaded: bool,
    pub latest_version: Option<String>,
}

impl UpdateState {
    pub fn from_pending(pending: Option<&PendingUpdate>) -> Self {
        match pending {
            Some(pending) => Self {
                downloaded: true,
                latest_version: Some(pending.version.clone()),
                ..Self::default()
            },
            None => Self::default(),
        }
    }

    pub fn apply(&mut self, event: &UpdateEvent) {
        match event {
            UpdateEvent::Checking => self.check_in_progress = true,
            UpdateEvent::Available { version, .. } => {
                self.check_in_progress = false;
                self.latest_version = Some(version.clone());
            }
            UpdateEvent::NotAvailable { .. } => self.check_in_progress = false,
            UpdateEvent::Downloading(_) => self.downloading = true,
            UpdateEvent::Downloaded { version } => {
                self.downloading = false;
                self.downloaded = true;
                self.latest_version = Some(version.clone());
            }
            UpdateEvent::Error { .. } => {
                self.check_in_progress = false;
                self.downloading = false;
            }
        }
    }
}
