use anyhow::Result;
use clap::{Args, Subcommand};

use super::Output;
use crate::modules::common::response::OperationResponse;
use crate::modules::executor::ShellExecutor;
use crate::modules::session::Session;
use crate::modules::updater::{
    self, GithubReleaseFeed, PendingUpdate, UpdateCheck, UpdateSender, DEFAULT_RELEASE_REPO,
};

#[derive(Subcommand, Debug)]
pub enum UpdateCommand {
    /// 检查是否有新版本
    Check(FeedArgs),

    /// 下载新版本安装包
    Download(FeedArgs),

    /// 启动已下载的安装包
    Install,
}

#[derive(Args, Debug)]
pub struct FeedArgs {
    /// 发布仓库 (owner/repo)
    #[arg(long, env = "RUST_KEEP_RELEASE_REPO", default_value = DEFAULT_RELEASE_REPO)]
    pub repo: String,
}

pub async fn execute(cmd: UpdateCommand, session: &mut Session, out: Output) -> Result<bool> {
    match cmd {
        UpdateCommand::Check(args) => {
            let feed = match GithubReleaseFeed::from_slug(&args.repo) {
                Ok(feed) => feed,
                Err(e) => return out.emit(&OperationResponse::<()>::failure(e.to_string()), |_| {}),
            };
            let (tx, mut rx) = updater::channel();

            let response = check(&feed, &tx).await;

            updater::drain_events(&mut rx, &mut session.update_state);
            out.emit(&response, print_check)
        }
        UpdateCommand::Download(args) => {
            let feed = match GithubReleaseFeed::from_slug(&args.repo) {
                Ok(feed) => feed,
                Err(e) => return out.emit(&OperationResponse::<()>::failure(e.to_string()), |_| {}),
            };
            let (tx, mut rx) = updater::channel();

            let response = download(&feed, &session.paths.updates, &tx).await;

            let events = updater::drain_events(&mut rx, &mut session.update_state);
            tracing::debug!("处理了 {} 个更新事件", events.len());
            out.emit(&response, print_pending)
        }
        UpdateCommand::Install => {
            let executor = ShellExecutor::default();
            let response =
                updater::install(&executor, &session.paths.updates, updater::CURRENT_VERSION).await;
            out.emit(&response, print_pending)
        }
    }
}

async fn check(feed: &GithubReleaseFeed, tx: &UpdateSender) -> OperationResponse<UpdateCheck> {
    updater::check_for_updates(feed, updater::CURRENT_VERSION, tx).await
}

/// 先检查，有新版本且带安装包时下载
async fn download(
    feed: &GithubReleaseFeed,
    updates_dir: &std::path::Path,
    tx: &UpdateSender,
) -> OperationResponse<PendingUpdate> {
    let checked = check(feed, tx).await;
    if !checked.success {
        return OperationResponse::failure(checked.error.unwrap_or_default());
    }
    let found = match checked.data {
        Some(found) if found.update_available => found,
        _ => return OperationResponse::failure("已是最新版本，无需下载"),
    };

    let Some(version) = found.latest_version else {
        return OperationResponse::failure("发布信息缺少版本号");
    };
    match &found.asset {
        Some(asset) => updater::download_update(feed, &version, asset, updates_dir, tx).await,
        None => OperationResponse::failure(format!("版本 {} 没有可下载的安装包", version)),
    }
}

fn print_check(check: &UpdateCheck) {
    println!("当前版本: {}", check.current_version);
    if let Some(latest) = &check.latest_version {
        println!("最新版本: {}", latest);
    }
}

fn print_pending(pending: &PendingUpdate) {
    println!("版本: {}", pending.version);
    println!("安装包: {}", pending.path.display());
}
