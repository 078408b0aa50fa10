use serde::{Deserialize, Serialize};

use crate::modules::scanner::models::TargetKind;

/// 单个子目标的执行结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOutcome {
    Done,
    /// 目标不存在，不算错误
    NotFound,
    Failed(String),
}

/// 删除操作结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub kind: TargetKind,
    pub label: String,
    pub outcome: StepOutcome,
    pub bytes_freed: u64,
}

impl StepRecord {
    pub fn new(kind: TargetKind, label: impl Into<String>, outcome: StepOutcome) -> Self {
        Self {
            kind,
            label: label.into(),
            outcome,
            bytes_freed: 0,
        }
    }

    pub fn done(kind: TargetKind, label: impl Into<String>) -> Self {
        Self::new(kind, label, StepOutcome::Done)
    }

    pub fn not_found(kind: TargetKind, label: impl Into<String>) -> Self {
        Self::new(kind, label, StepOutcome::NotFound)
    }

    pub fn failed(kind: TargetKind, label: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(kind, label, StepOutcome::Failed(reason.into()))
    }

    pub fn with_bytes(mut self, bytes: u64) -> Self {
        self.bytes_freed = bytes;
        self
    }

    /// 进程终止只是准备步骤，不计入删除数
    pub fn is_cleanup(&self) -> bool {
        self.kind != TargetKind::Process
    }
}

/// 一次修改的所有步骤
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationOutcome {
    pub steps: Vec<StepRecord>,
}

impl MutationOutcome {
    pub fn deleted_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.is_cleanup() && s.outcome == StepOutcome::Done)
            .count()
    }

    pub fn failed_targets(&self) -> Vec<String> {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, StepOutcome::Failed(_)))
            .map(|s| s.label.clone())
            .collect()
    }

    pub fn bytes_freed(&self) -> u64 {
        self.steps.iter().map(|s| s.bytes_freed).sum()
    }
}
