pub mod clean;
pub mod report;
pub mod saves;
pub mod update;

use anyhow::Result;
use clap::Subcommand;
use serde::Serialize;

use crate::modules::common::response::OperationResponse;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 管理存档文件
    #[command(subcommand)]
    Saves(saves::SavesCommand),

    /// 按清理配置检查和清理残留
    #[command(subcommand)]
    Clean(clean::CleanCommand),

    /// 查看操作报告
    Reports(report::ReportCommand),

    /// 检查、下载和安装更新
    #[command(subcommand)]
    Update(update::UpdateCommand),

    /// 显示版本
    Version,
}

/// 输出方式
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
}

impl Output {
    /// 打印返回结构，返回操作是否成功
    ///
    /// `--json` 时原样输出整个结构，否则用 `human` 打印数据，再附上提示、警告和错误。
    pub fn emit<T: Serialize>(
        &self,
        response: &OperationResponse<T>,
        human: impl FnOnce(&T),
    ) -> Result<bool> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(response)?);
            return Ok(response.success);
        }

        if let Some(data) = &response.data {
            human(data);
        }
        if let Some(message) = &response.message {
            println!("{}", message);
        }
        if let Some(warning) = &response.warning {
            println!("警告: {}", warning);
        }
        if let Some(error) = &response.error {
            eprintln!("错误: {}", error);
        }

        Ok(response.success)
    }
}
