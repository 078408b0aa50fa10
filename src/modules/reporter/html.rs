use super::models::{OperationReport, SummaryStatus};
use crate::modules::cleaner::models::{StepOutcome, StepRecord};
use crate::modules::common::utils;

const STYLE: &str = r#"
        body { font-family: "Segoe UI", "Microsoft YaHei", sans-serif; margin: 24px; color: #222; }
        h1 { font-size: 22px; margin-bottom: 4px; }
        .meta { color: #666; font-size: 13px; }
        .counts { display: flex; gap: 24px; margin: 16px 0; }
        .counts b { display: block; font-size: 24px; }
        .notes { background: #fff3cd; border-left: 4px solid #ffc107; padding: 8px 16px; }
        table { width: 100%; border-collapse: collapse; font-size: 13px; }
        th, td { padding: 6px 10px; text-align: left; border-bottom: 1px solid #eee; }
        td.label { font-family: Consolas, monospace; word-break: break-all; }
        .done { color: #1e7e34; }
        .absent { color: #888; }
        .failed { color: #c0392b; }
"#;

/// 生成 HTML 报告
pub fn generate_html_report(report: &OperationReport) -> String {
    let backup = report
        .backup
        .as_ref()
        .map(|b| format!("<p>备份: {}</p>", escape_html(&b.to_string())))
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html lang="zh-CN">
<head>
    <meta charset="UTF-8">
    <title>{operation}报告 - {profile}</title>
    <style>{style}</style>
</head>
<body>
    <h1>{operation}报告: {profile}</h1>
    <div class="meta">
        <p>结果: {status}</p>
        <p>生成时间: {time}</p>
        <p>报告ID: {id}</p>
        {backup}
    </div>
    <div class="counts">
        <div><b>{found}</b>发现</div>
        <div class="done"><b>{done}</b>成功</div>
        <div class="failed"><b>{failed}</b>失败</div>
        <div><b>{freed}</b>释放空间</div>
    </div>
    {notes}
    {steps}
</body>
</html>"#,
        operation = report.operation,
        profile = escape_html(&report.profile),
        style = STYLE,
        status = status_text(report.summary.status),
        time = report.generated_at.format("%Y-%m-%d %H:%M:%S"),
        id = report.id,
        backup = backup,
        found = report.found_items.len(),
        done = report.summary.deleted_count,
        failed = report.summary.failed_targets.len(),
        freed = utils::format_size(report.summary.bytes_freed),
        notes = generate_notes(report),
        steps = generate_steps_table(&report.steps),
    )
}

fn status_text(status: SummaryStatus) -> &'static str {
    match status {
        SummaryStatus::Completed => "全部完成",
        SummaryStatus::Partial => "部分完成",
        SummaryStatus::Failed => "失败",
    }
}

fn generate_notes(report: &OperationReport) -> String {
    let items: String = [&report.summary.warning, &report.summary.error]
        .into_iter()
        .flatten()
        .map(|n| format!("<li>{}</li>", escape_html(n)))
        .collect();
    if items.is_empty() {
        return String::new();
    }
    format!(r#"<ul class="notes">{}</ul>"#, items)
}

fn generate_steps_table(steps: &[StepRecord]) -> String {
    if steps.is_empty() {
        return "<p>没有执行任何步骤</p>".to_string();
    }

    let mut html = String::from("<table><tr><th>状态</th><th>类型</th><th>目标</th><th>释放空间</th></tr>");
    for step in steps {
        let status = match &step.outcome {
            StepOutcome::Done => r#"<td class="done">成功</td>"#.to_string(),
            StepOutcome::NotFound => r#"<td class="absent">不存在</td>"#.to_string(),
            StepOutcome::Failed(reason) => {
                format!(r#"<td class="failed" title="{}">失败</td>"#, escape_html(reason))
            }
        };
        let size = if step.bytes_freed > 0 {
            utils::format_size(step.bytes_freed)
        } else {
            "-".to_string()
        };

        html.push_str(&format!(
            r#"<tr>{}<td>{}</td><td class="label">{}</td><td>{}</td></tr>"#,
            status,
            step.kind,
            escape_html(&step.label),
            size
        ));
    }
    html.push_str("</table>");
    html
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
