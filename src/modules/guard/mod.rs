//! 一次性备份
//!
//! 标记文件存在就说明原始值已经保存过，之后的调用都不会覆盖它。
//! 每行一个 JSON 对象，值的类型显式记录。

use std::future::Future;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::modules::cleaner::models::StepRecord;
use crate::modules::common::error::KeepError;
use crate::modules::registry::{RegData, RegistryBackend};
use crate::modules::scanner::models::TargetKind;

/// 一条备份记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupEntry {
    pub key: String,
    pub name: String,
    pub data: RegData,
}

impl BackupEntry {
    pub fn label(&self) -> String {
        format!("{}\\{}", self.key, self.name)
    }

    pub fn to_line(&self) -> Result<String, KeepError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn parse_line(line: &str) -> Option<Self> {
        serde_json::from_str::<Self>(line)
            .ok()
            .filter(|e| !e.key.is_empty() && !e.name.is_empty())
    }
}

/// 读取到的原始值；单个值读取失败只跳过该值
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupCapture {
    pub entries: Vec<BackupEntry>,
    /// `键\值名: 原因`
    pub skipped: Vec<String>,
}

impl From<Vec<BackupEntry>> for BackupCapture {
    fn from(entries: Vec<BackupEntry>) -> Self {
        Self {
            entries,
            skipped: Vec::new(),
        }
    }
}

/// 备份步骤的结果，任何一种都不阻止后续修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackupStatus {
    AlreadyPresent,
    Created(usize),
    /// 已备份，但部分值读取失败
    Partial { captured: usize, skipped: Vec<String> },
    /// 没有读到任何原始值，不写标记文件
    NothingCaptured,
    FetchFailed(String),
    WriteFailed(String),
}

impl std::fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackupStatus::AlreadyPresent => write!(f, "备份已存在"),
            BackupStatus::Created(n) => write!(f, "已备份 {} 项", n),
            BackupStatus::Partial { captured, skipped } => write!(
                f,
                "已备份 {} 项，以下值读取失败未备份: {}",
                captured,
                skipped.join(", ")
            ),
            BackupStatus::NothingCaptured => write!(f, "没有读取到原始值，未创建备份"),
            BackupStatus::FetchFailed(reason) => write!(f, "读取原始值失败，未创建备份: {}", reason),
            BackupStatus::WriteFailed(reason) => write!(f, "写入备份失败: {}", reason),
        }
    }
}

impl BackupStatus {
    /// 备份记录是否存在（已有或刚创建）
    pub fn is_secured(&self) -> bool {
        matches!(
            self,
            BackupStatus::AlreadyPresent | BackupStatus::Created(_) | BackupStatus::Partial { .. }
        )
    }

    /// 是否需要在结果中提示用户
    pub fn needs_warning(&self) -> bool {
        !matches!(self, BackupStatus::AlreadyPresent | BackupStatus::Created(_))
    }
}

/// 确保备份存在
///
/// 标记文件不存在时调用 `fetch` 读取原始值并写入；读取或写入失败只记录警告。
pub async fn ensure_backup<F, Fut>(marker: &Path, fetch: F) -> BackupStatus
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<BackupCapture, KeepError>>,
{
    if marker.exists() {
        tracing::info!("备份已存在，跳过创建: {}", marker.display());
        return BackupStatus::AlreadyPresent;
    }

    let BackupCapture { entries, skipped } = match fetch().await {
        Ok(capture) => capture,
        Err(e) => {
            tracing::warn!("读取原始值失败，继续执行: {}", e);
            return BackupStatus::FetchFailed(e.to_string());
        }
    };

    if entries.is_empty() {
        if !skipped.is_empty() {
            tracing::warn!("所有原始值读取失败，未创建备份: {}", marker.display());
            return BackupStatus::FetchFailed(skipped.join(", "));
        }
        tracing::warn!("没有读取到任何原始值，未创建备份: {}", marker.display());
        return BackupStatus::NothingCaptured;
    }

    match write_once(marker, &entries) {
        Ok(true) if skipped.is_empty() => {
            tracing::info!("备份已创建 ({} 项): {}", entries.len(), marker.display());
            BackupStatus::Created(entries.len())
        }
        Ok(true) => {
            tracing::warn!(
                "备份已创建 ({} 项)，{} 项读取失败: {}",
                entries.len(),
                skipped.len(),
                marker.display()
            );
            BackupStatus::Partial {
                captured: entries.len(),
                skipped,
            }
        }
        Ok(false) => {
            tracing::info!("备份已由其他调用创建: {}", marker.display());
            BackupStatus::AlreadyPresent
        }
        Err(e) => {
            tracing::warn!("写入备份失败，继续执行: {}", e);
            BackupStatus::WriteFailed(e.to_string())
        }
    }
}

/// 只在文件不存在时创建；返回是否写入
fn write_once(marker: &Path, entries: &[BackupEntry]) -> Result<bool, KeepError> {
    if let Some(parent) = marker.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(marker)
    {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(e.into()),
    };

    for entry in entries {
        writeln!(file, "{}", entry.to_line()?)?;
    }
    file.sync_all()?;

    Ok(true)
}

/// 读取备份文件
pub fn read_backup(marker: &Path) -> Result<Vec<BackupEntry>, KeepError> {
    if !marker.exists() {
        return Err(KeepError::NotFound(format!("备份文件 {}", marker.display())));
    }

    let content = std::fs::read_to_string(marker)?;
    let entries = content
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .filter_map(|line| {
            let entry = BackupEntry::parse_line(line);
            if entry.is_none() {
                tracing::warn!("跳过无法解析的备份行: {}", line);
            }
            entry
        })
        .collect();

    Ok(entries)
}

/// 把一项备份写回注册表并读回校验
///
/// 权限不足以错误返回，由调用方决定是否提权重试；其余失败记为失败步骤。
pub fn restore_value<R: RegistryBackend>(registry: &R, entry: &BackupEntry) -> Result<StepRecord, KeepError> {
    let label = entry.label();
    let written = registry
        .write_value(&entry.key, &entry.name, &entry.data)
        .and_then(|_| registry.read_value(&entry.key, &entry.name));

    match written {
        Ok(Some(data)) if data == entry.data => {
            tracing::info!("已恢复: {}", label);
            Ok(StepRecord::done(TargetKind::RegistryValue, label))
        }
        Ok(_) => {
            tracing::warn!("恢复后读回的值不一致: {}", label);
            Ok(StepRecord::failed(TargetKind::RegistryValue, label, "读回的值不一致"))
        }
        Err(e @ KeepError::PermissionDenied(_)) => Err(e),
        Err(e) => {
            tracing::error!("恢复失败 {}: {}", label, e);
            Ok(StepRecord::failed(TargetKind::RegistryValue, label, e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::common::utils;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn marker_path(test_name: &str) -> std::path::PathBuf {
        std::env::temp_dir()
            .join(format!("rust-keep-guard-{}-{}", test_name, utils::generate_id()))
            .join("backup_vendor.txt")
    }

    fn entry(name: &str, data: RegData) -> BackupEntry {
        BackupEntry {
            key: r"HKCU\Software\Vendor".to_string(),
            name: name.to_string(),
            data,
        }
    }

    #[test]
    fn lines_round_trip_names_and_data_that_look_like_separators() {
        let entries = vec![
            entry("Install=Id", RegData::String("x".into())),
            entry(r"Path\Sub", RegData::String("dword:0000000a".into())),
            entry("Blob", RegData::Binary(vec![0x00, 0x0a, 0xff])),
            entry("List", RegData::MultiString(vec!["a=b".into(), String::new()])),
            entry("Big", RegData::Qword(u64::MAX)),
        ];

        for original in entries {
            let line = original.to_line().unwrap();
            assert!(!line.contains('\n'));
            assert_eq!(BackupEntry::parse_line(&line), Some(original));
        }

        assert_eq!(BackupEntry::parse_line("garbage"), None);
        assert_eq!(BackupEntry::parse_line(r"HKCU\Software\Vendor\Count=dword:00000010"), None);
    }

    #[tokio::test]
    async fn second_call_does_not_write_again() {
        let marker = marker_path("idempotent");
        let fetches = AtomicUsize::new(0);

        let first = ensure_backup(&marker, || async {
            fetches.fetch_add(1, Ordering::SeqCst);
            Ok(vec![entry("Id", RegData::String("original".into()))].into())
        })
        .await;
        let second = ensure_backup(&marker, || async {
            fetches.fetch_add(1, Ordering::SeqCst);
            Ok(vec![entry("Id", RegData::String("randomized".into()))].into())
        })
        .await;

        assert_eq!(first, BackupStatus::Created(1));
        assert_eq!(second, BackupStatus::AlreadyPresent);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert_eq!(
            read_backup(&marker).ok(),
            Some(vec![entry("Id", RegData::String("original".into()))])
        );

        if let Some(parent) = marker.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }

    #[tokio::test]
    async fn fetch_failure_is_survivable_and_leaves_no_marker() {
        let marker = marker_path("fetch-failed");

        let status = ensure_backup(&marker, || async {
            Err(KeepError::Timeout("reg query".to_string()))
        })
        .await;

        assert!(matches!(status, BackupStatus::FetchFailed(_)));
        assert!(!status.is_secured());
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn empty_capture_leaves_no_marker() {
        let marker = marker_path("empty");

        let status = ensure_backup(&marker, || async { Ok(BackupCapture::default()) }).await;

        assert_eq!(status, BackupStatus::NothingCaptured);
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn partial_capture_is_written_and_reported() {
        let marker = marker_path("partial");

        let status = ensure_backup(&marker, || async {
            Ok(BackupCapture {
                entries: vec![entry("Id", RegData::String("original".into()))],
                skipped: vec![r"HKCU\Software\Vendor\Slow: 超时".to_string()],
            })
        })
        .await;

        assert!(matches!(status, BackupStatus::Partial { captured: 1, .. }));
        assert!(status.is_secured());
        assert!(status.needs_warning());
        assert!(status.to_string().contains("Slow"));
        assert_eq!(read_backup(&marker).map(|e| e.len()).ok(), Some(1));

        if let Some(parent) = marker.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }

    #[tokio::test]
    async fn every_value_skipped_counts_as_fetch_failure() {
        let marker = marker_path("all-skipped");

        let status = ensure_backup(&marker, || async {
            Ok(BackupCapture {
                entries: Vec::new(),
                skipped: vec![r"HKCU\Software\Vendor\Slow: 超时".to_string()],
            })
        })
        .await;

        assert!(matches!(status, BackupStatus::FetchFailed(_)));
        assert!(!marker.exists());
    }

    #[test]
    fn restore_writes_back_and_verifies() {
        let registry = crate::modules::registry::MemoryRegistry::new();
        let entries = vec![
            entry("Id", RegData::String("original".into())),
            entry("Count", RegData::Dword(16)),
            entry("Blob", RegData::Binary(vec![0x01, 0x02, 0xab])),
        ];

        for e in &entries {
            let step = restore_value(&registry, e).unwrap();
            assert_eq!(step.outcome, crate::modules::cleaner::models::StepOutcome::Done);
        }
        assert_eq!(
            registry.read_value(r"HKCU\Software\Vendor", "Blob").ok().flatten(),
            Some(RegData::Binary(vec![0x01, 0x02, 0xab]))
        );
    }
}
