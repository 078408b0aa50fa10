use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};

use super::Output;
use crate::modules::common::response::OperationResponse;
use crate::modules::reporter::{self, html, ReportEntry};
use crate::modules::session::Session;

#[derive(Parser, Debug)]
pub struct ReportCommand {
    /// 报告文件路径或配置名 (不指定则列出所有报告)
    pub identifier: Option<String>,

    /// 输出 HTML 文件
    #[arg(short, long)]
    pub html: Option<PathBuf>,
}

pub async fn execute(cmd: ReportCommand, session: &Session, out: Output) -> Result<bool> {
    let reports_dir = &session.paths.reports;

    let Some(identifier) = cmd.identifier else {
        let response = OperationResponse::from_result(reporter::list_reports(reports_dir));
        return out.emit(&response, |entries| {
            println!("报告目录: {}\n", reports_dir.display());
            if entries.is_empty() {
                println!("暂无报告文件");
            }
            for entry in entries {
                println!(
                    "  {}  {} {} [{:?}]  {}",
                    entry.generated_at.format("%Y-%m-%d %H:%M"),
                    entry.operation,
                    entry.profile,
                    entry.status,
                    entry.path
                );
            }
            println!("\n共 {} 个报告", entries.len());
        });
    };

    let path = match find_report(reports_dir, &identifier)? {
        Some(path) => path,
        None => {
            let response = OperationResponse::<()>::failure(format!("未找到报告: {}", identifier));
            return out.emit(&response, |_| {});
        }
    };

    let report = match reporter::load_report(&path) {
        Ok(report) => report,
        Err(e) => return out.emit(&OperationResponse::<()>::failure(e.to_string()), |_| {}),
    };
    let content = html::generate_html_report(&report);

    match cmd.html {
        Some(target) => {
            std::fs::write(&target, content)?;
            let response = OperationResponse::ok(target.to_string_lossy().to_string());
            out.emit(&response, |path| println!("报告已保存到: {}", path))
        }
        None if out.json => out.emit(&OperationResponse::ok(report), |_| {}),
        None => {
            println!("{}", content);
            Ok(true)
        }
    }
}

/// 先按路径查找，再在报告目录里按配置名匹配最新的一份
fn find_report(reports_dir: &Path, identifier: &str) -> Result<Option<PathBuf>> {
    let direct = PathBuf::from(identifier);
    if direct.is_file() {
        return Ok(Some(direct));
    }

    let needle = identifier.to_lowercase();
    let entries: Vec<ReportEntry> = reporter::list_reports(reports_dir)?;
    let found = entries.into_iter().find(|entry| {
        entry.profile.to_lowercase() == needle
            || Path::new(&entry.path)
                .file_name()
                .map(|name| name.to_string_lossy().to_lowercase().contains(&needle))
                .unwrap_or(false)
    });

    Ok(found.map(|entry| PathBuf::from(entry.path)))
}
