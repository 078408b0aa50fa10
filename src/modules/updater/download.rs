//! 下载和安装更新
//!
//! 安装包先写入 `<name>.part`，大小核对无误后改名，再写 `pending.json`。
//! 安装时读取该记录并启动安装包，新进程由此知道有更新待装。

use std::io::Write;
use std::path::Path;

use super::models::{DownloadProgress, PendingUpdate, ReleaseAsset, UpdateEvent};
use super::{is_newer, ReleaseFeed, UpdateSender};
use crate::modules::common::error::KeepError;
use crate::modules::common::response::OperationResponse;
use crate::modules::common::utils;
use crate::modules::executor::{CommandRunner, CommandSpec};

/// 待安装记录
pub const PENDING_FILE: &str = "pending.json";

/// 下载安装包，按整数百分比发出进度事件，完成后发出 `Downloaded`
pub async fn download_update<F: ReleaseFeed>(
    feed: &F,
    version: &str,
    asset: &ReleaseAsset,
    updates_dir: &Path,
    events: &UpdateSender,
) -> OperationResponse<PendingUpdate> {
    tracing::info!("开始下载 {} ({})", asset.name, utils::format_size(asset.size));

    match download(feed, version, asset, updates_dir, events).await {
        Ok(pending) => {
            tracing::info!("更新已下载: {}", pending.path.display());
            events.emit(UpdateEvent::Downloaded {
                version: version.to_string(),
            });
            let message = format!("版本 {} 已下载，运行 update install 安装", version);
            OperationResponse::ok(pending).with_message(message)
        }
        Err(e) => {
            tracing::warn!("下载更新失败: {}", e);
            events.emit(UpdateEvent::Error {
                message: e.to_string(),
            });
            OperationResponse::failure(e.to_string())
        }
    }
}

async fn download<F: ReleaseFeed>(
    feed: &F,
    version: &str,
    asset: &ReleaseAsset,
    updates_dir: &Path,
    events: &UpdateSender,
) -> Result<PendingUpdate, KeepError> {
    if asset.name.is_empty() || asset.name.contains(['/', '\\', ':']) || asset.name.starts_with('.') {
        return Err(KeepError::Update(format!("无效的安装包名称: {}", asset.name)));
    }

    std::fs::create_dir_all(updates_dir)?;
    let target = updates_dir.join(&asset.name);
    let partial = updates_dir.join(format!("{}.part", asset.name));

    let mut file = std::fs::File::create(&partial)?;
    let mut transferred = 0u64;
    let mut last_percent = None;

    let result = feed
        .download_asset(asset, &mut |chunk| {
            file.write_all(chunk)?;
            transferred += chunk.len() as u64;

            let progress = DownloadProgress::new(transferred, asset.size);
            let percent = progress.percent.floor() as u64;
            if last_percent != Some(percent) {
                last_percent = Some(percent);
                events.emit(UpdateEvent::Downloading(progress));
            }
            Ok(())
        })
        .await;
    let result = result.and_then(|()| file.flush().map_err(KeepError::from));
    drop(file);

    let result = result.and_then(|()| {
        if asset.size > 0 && transferred != asset.size {
            return Err(KeepError::Update(format!(
                "下载不完整: {}/{} 字节",
                transferred, asset.size
            )));
        }
        Ok(())
    });
    if let Err(e) = result {
        let _ = std::fs::remove_file(&partial);
        return Err(e);
    }

    std::fs::rename(&partial, &target)?;

    let pending = PendingUpdate {
        version: version.to_string(),
        path: target,
        size: transferred,
    };
    std::fs::write(
        updates_dir.join(PENDING_FILE),
        serde_json::to_string_pretty(&pending)?,
    )?;
    Ok(pending)
}

/// 读取待安装记录；记录损坏时按没有处理
pub fn load_pending(updates_dir: &Path) -> Option<PendingUpdate> {
    let content = std::fs::read_to_string(updates_dir.join(PENDING_FILE)).ok()?;
    match serde_json::from_str(&content) {
        Ok(pending) => Some(pending),
        Err(e) => {
            tracing::warn!("忽略损坏的待安装记录: {}", e);
            None
        }
    }
}

fn clear_pending(updates_dir: &Path) {
    let _ = std::fs::remove_file(updates_dir.join(PENDING_FILE));
}

/// 启动已下载的安装包
///
/// 记录的版本不比当前新时丢弃记录。安装包启动后本进程即可退出。
pub async fn install<R: CommandRunner>(
    runner: &R,
    updates_dir: &Path,
    current: &str,
) -> OperationResponse<PendingUpdate> {
    let Some(pending) = load_pending(updates_dir) else {
        return OperationResponse::failure("还没有下载任何更新");
    };

    if !pending.path.is_file() {
        clear_pending(updates_dir);
        return OperationResponse::failure(format!("安装包不存在: {}", pending.path.display()));
    }

    match is_newer(&pending.version, current) {
        Ok(true) => {}
        Ok(false) => {
            clear_pending(updates_dir);
            return OperationResponse::failure(format!("已是最新版本 {}", current));
        }
        Err(e) => return OperationResponse::failure(e.to_string()),
    }

    let spec = CommandSpec::powershell(format!(
        "Start-Process -FilePath '{}'",
        utils::ps_quote(&pending.path.to_string_lossy())
    ));
    if let Err(e) = runner.run(&spec, None).await {
        tracing::warn!("启动安装程序失败: {}", e);
        return OperationResponse::failure(format!("启动安装程序失败: {}", e));
    }

    clear_pending(updates_dir);
    tracing::info!("已启动安装程序: {}", pending.path.display());
    let message = format!("已启动版本 {} 的安装程序", pending.version);
    OperationResponse::ok(pending).with_message(message)
}
