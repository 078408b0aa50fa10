//! 结果汇总与报告

pub mod html;
pub mod models;

use std::path::{Path, PathBuf};

use crate::modules::cleaner::models::{MutationOutcome, StepOutcome};
use crate::modules::common::error::KeepError;
use crate::modules::common::response::OperationResponse;
pub use models::{OperationKind, OperationReport, ReportEntry, Summary, SummaryStatus};

/// 汇总各步骤结果
///
/// 全部不存在和尝试后失败是两种不同的失败；进程步骤不计入删除数，
/// 但失败会出现在警告里。
pub fn summarize(outcome: &MutationOutcome) -> Summary {
    let deleted_count = outcome.deleted_count();
    let failed_targets = outcome.failed_targets();
    let cleanup_failures = outcome
        .steps
        .iter()
        .filter(|s| s.is_cleanup() && matches!(s.outcome, StepOutcome::Failed(_)))
        .count();

    let mut summary = Summary {
        status: SummaryStatus::Completed,
        deleted_count,
        failed_targets: failed_targets.clone(),
        bytes_freed: outcome.bytes_freed(),
        message: None,
        warning: None,
        error: None,
    };

    if deleted_count == 0 {
        summary.status = SummaryStatus::Failed;
        summary.error = Some(if cleanup_failures == 0 {
            "未发现需要清理的项目，所有目标都不存在".to_string()
        } else {
            format!("删除失败: {}", failed_targets.join(", "))
        });
        if cleanup_failures == 0 && !failed_targets.is_empty() {
            summary.warning = Some(format!("以下项目处理失败: {}", failed_targets.join(", ")));
        }
        return summary;
    }

    summary.message = Some(format!("已删除 {} 项", deleted_count));
    if !failed_targets.is_empty() {
        summary.status = SummaryStatus::Partial;
        summary.warning = Some(format!("以下项目处理失败: {}", failed_targets.join(", ")));
    }

    summary
}

impl Summary {
    /// 转换为统一返回结构
    pub fn into_response<T>(self, data: T) -> OperationResponse<T> {
        match self.status {
            SummaryStatus::Failed => {
                let mut response = OperationResponse::failure(self.error.unwrap_or_default())
                    .with_data(data);
                response.warning = self.warning;
                response
            }
            SummaryStatus::Partial => {
                let response =
                    OperationResponse::partial(data, self.warning.unwrap_or_default());
                match self.message {
                    Some(message) => response.with_message(message),
                    None => response,
                }
            }
            SummaryStatus::Completed => {
                let response = OperationResponse::ok(data);
                match self.message {
                    Some(message) => response.with_message(message),
                    None => response,
                }
            }
        }
    }
}

/// 保存报告：JSON 和 HTML 各一份，返回 JSON 路径
pub fn save_report(dir: &Path, report: &OperationReport) -> Result<PathBuf, KeepError> {
    std::fs::create_dir_all(dir)?;

    let stem = report.file_stem();
    let json_path = dir.join(format!("{}.json", stem));
    std::fs::write(&json_path, serde_json::to_string_pretty(report)?)?;
    std::fs::write(dir.join(format!("{}.html", stem)), html::generate_html_report(report))?;

    tracing::info!("报告已保存: {}", json_path.display());
    Ok(json_path)
}

pub fn load_report(path: &Path) -> Result<OperationReport, KeepError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// 列出报告，最新的在前；无法解析的文件跳过
pub fn list_reports(dir: &Path) -> Result<Vec<ReportEntry>, KeepError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        if path.extension().map(|e| e != "json").unwrap_or(true) {
            continue;
        }

        match load_report(&path) {
            Ok(report) => entries.push(ReportEntry {
                path: path.to_string_lossy().to_string(),
                profile: report.profile,
                operation: report.operation,
                generated_at: report.generated_at,
                status: report.summary.status,
            }),
            Err(e) => tracing::warn!("跳过无法读取的报告 {}: {}", path.display(), e),
        }
    }

    entries.sort_by(|a, b| b.generated_at.cmp(&a.generated_at));
    Ok(entries)
}
