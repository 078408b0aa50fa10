use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::modules::cleaner::models::StepRecord;
use crate::modules::guard::BackupStatus;

/// 整体结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SummaryStatus {
    Completed,
    Partial,
    Failed,
}

/// 一次修改的汇总
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub status: SummaryStatus,
    pub deleted_count: usize,
    pub failed_targets: Vec<String>,
    pub bytes_freed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Clean,
    Restore,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Clean => write!(f, "清理"),
            OperationKind::Restore => write!(f, "恢复"),
        }
    }
}

/// 操作报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationReport {
    pub id: String,
    pub profile: String,
    pub operation: OperationKind,
    pub generated_at: DateTime<Utc>,
    /// 操作前发现的残留
    pub found_items: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<BackupStatus>,
    pub steps: Vec<StepRecord>,
    pub summary: Summary,
}

impl OperationReport {
    pub fn new(profile: &str, operation: OperationKind, steps: Vec<StepRecord>, summary: Summary) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            profile: profile.to_string(),
            operation,
            generated_at: Utc::now(),
            found_items: Vec::new(),
            backup: None,
            steps,
            summary,
        }
    }

    pub fn with_found_items(mut self, items: Vec<String>) -> Self {
        self.found_items = items;
        self
    }

    pub fn with_backup(mut self, backup: BackupStatus) -> Self {
        self.backup = Some(backup);
        self
    }

    /// 报告文件名（不含扩展名）
    pub fn file_stem(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.operation_tag(),
            self.profile,
            self.generated_at.format("%Y%m%d_%H%M%S"),
            &self.id[..8.min(self.id.len())]
        )
    }

    fn operation_tag(&self) -> &'static str {
        match self.operation {
            OperationKind::Clean => "clean",
            OperationKind::Restore => "restore",
        }
    }
}

/// 报告列表中的一项
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportEntry {
    pub path: String,
    pub profile: String,
    pub operation: OperationKind,
    pub generated_at: DateTime<Utc>,
    pub status: SummaryStatus,
}
