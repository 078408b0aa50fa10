//! 更新检查、下载和安装
//!
//! 所有事件经过同一个通道，接收端只有一个，由它把事件累积进 [`UpdateState`]。

pub mod download;
pub mod github;
pub mod models;

use tokio::sync::mpsc;

use crate::modules::common::error::KeepError;
use crate::modules::common::response::OperationResponse;
pub use download::{download_update, install, load_pending, PENDING_FILE};
pub use github::GithubReleaseFeed;
pub use models::{
    DownloadProgress, PendingUpdate, ReleaseAsset, ReleaseInfo, UpdateCheck, UpdateEvent, UpdateState,
};

/// 当前程序版本
pub const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// 默认发布仓库
pub const DEFAULT_RELEASE_REPO: &str = "rust-keep/rust-keep";

/// 发布源
#[allow(async_fn_in_trait)]
pub trait ReleaseFeed {
    async fn latest_release(&self) -> Result<ReleaseInfo, KeepError>;

    /// 逐块下载附件，每块交给 `on_chunk`
    async fn download_asset(
        &self,
        asset: &ReleaseAsset,
        on_chunk: &mut dyn FnMut(&[u8]) -> Result<(), KeepError>,
    ) -> Result<(), KeepError>;
}

/// 事件发送端，可复制给多个生产者
#[derive(Debug, Clone)]
pub struct UpdateSender {
    tx: mpsc::UnboundedSender<UpdateEvent>,
}

impl UpdateSender {
    pub fn emit(&self, event: UpdateEvent) {
        tracing::debug!("更新事件: {:?}", event);
        // 接收端已关闭时丢弃
        let _ = self.tx.send(event);
    }
}

/// 创建事件通道
pub fn channel() -> (UpdateSender, mpsc::UnboundedReceiver<UpdateEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (UpdateSender { tx }, rx)
}

/// 取出当前已到达的事件并累积到状态中
pub fn drain_events(rx: &mut mpsc::UnboundedReceiver<UpdateEvent>, state: &mut UpdateState) -> Vec<UpdateEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        state.apply(&event);
        events.push(event);
    }
    events
}

/// 解析版本号，允许 `v` 前缀
pub fn parse_version(raw: &str) -> Result<semver::Version, KeepError> {
    let trimmed = raw.trim().trim_start_matches(['v', 'V']);
    semver::Version::parse(trimmed).map_err(|e| KeepError::Update(format!("无效的版本号 {}: {}", raw, e)))
}

/// 最新版本严格大于当前版本时才算有更新
pub fn is_newer(latest: &str, current: &str) -> Result<bool, KeepError> {
    Ok(parse_version(latest)? > parse_version(current)?)
}

/// 检查更新并发出对应事件
pub async fn check_for_updates<F: ReleaseFeed>(
    feed: &F,
    current: &str,
    events: &UpdateSender,
) -> OperationResponse<UpdateCheck> {
    events.emit(UpdateEvent::Checking);
    tracing::info!("检查更新，当前版本 {}", current);

    let result = async {
        let release = feed.latest_release().await?;
        let available = is_newer(&release.version, current)?;
        Ok::<_, KeepError>((release, available))
    }
    .await;

    match result {
        Ok((release, true)) => {
            let version = parse_version(&release.version)
                .map(|v| v.to_string())
                .unwrap_or_else(|_| release.version.clone());
            tracing::info!("发现新版本 {}", version);
            events.emit(UpdateEvent::Available {
                version: version.clone(),
                current: current.to_string(),
                release_date: release.release_date.clone(),
                size: release.size(),
            });
            OperationResponse::ok(UpdateCheck {
                current_version: current.to_string(),
                latest_version: Some(version.clone()),
                update_available: true,
                asset: release.asset,
            })
            .with_message(format!("发现新版本 {}", version))
        }
        Ok((release, false)) => {
            tracing::info!("已是最新版本 {}", current);
            events.emit(UpdateEvent::NotAvailable {
                version: current.to_string(),
            });
            OperationResponse::ok(UpdateCheck {
                current_version: current.to_string(),
                latest_version: Some(release.version),
                update_available: false,
                asset: None,
            })
            .with_message("已是最新版本")
        }
        Err(e) => {
            tracing::warn!("检查更新失败: {}", e);
            events.emit(UpdateEvent::Error {
                message: e.to_string(),
            });
            OperationResponse::failure(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedFeed(Result<ReleaseInfo, String>);

    impl ReleaseFeed for FixedFeed {
        async fn latest_release(&self) -> Result<ReleaseInfo, KeepError> {
            self.0.clone().map_err(KeepError::Update)
        }

        async fn download_asset(
            &self,
            _asset: &ReleaseAsset,
            _on_chunk: &mut dyn FnMut(&[u8]) -> Result<(), KeepError>,
        ) -> Result<(), KeepError> {
            Err(KeepError::Update("offline".into()))
        }
    }

    fn release(version: &str) -> FixedFeed {
        FixedFeed(Ok(ReleaseInfo {
            version: version.to_string(),
            release_date: None,
            asset: Some(ReleaseAsset {
                name: "setup.exe".into(),
                url: "https://example.invalid/setup.exe".into(),
                size: 42,
            }),
        }))
    }

    #[test]
    fn only_strictly_newer_versions_count() {
        assert_eq!(is_newer("v1.2.0", "1.1.9").ok(), Some(true));
        assert_eq!(is_newer("1.2.0", "1.2.0").ok(), Some(false));
        assert_eq!(is_newer("1.1.0", "1.2.0").ok(), Some(false));
        assert_eq!(is_newer("1.10.0", "1.9.0").ok(), Some(true));
        assert!(is_newer("latest", "1.0.0").is_err());
    }

    #[tokio::test]
    async fn newer_release_emits_checking_then_available() {
        let (tx, mut rx) = channel();
        let mut state = UpdateState::default();

        let response = check_for_updates(&release("v2.0.0"), "1.0.0", &tx).await;
        let events = drain_events(&mut rx, &mut state);

        assert!(response.success);
        assert_eq!(response.data.map(|d| d.update_available), Some(true));
        assert_eq!(events.first(), Some(&UpdateEvent::Checking));
        assert!(matches!(
            events.get(1),
            Some(UpdateEvent::Available { version, size: Some(42), .. }) if version == "2.0.0"
        ));
        assert!(!state.check_in_progress);
        assert!(!state.downloading);
        assert_eq!(state.latest_version.as_deref(), Some("2.0.0"));
    }

    #[tokio::test]
    async fn same_version_is_not_available() {
        let (tx, mut rx) = channel();
        let mut state = UpdateState::default();

        let response = check_for_updates(&release("1.0.0"), "1.0.0", &tx).await;
        let events = drain_events(&mut rx, &mut state);

        assert_eq!(response.data.map(|d| d.update_available), Some(false));
        assert_eq!(
            events.last(),
            Some(&UpdateEvent::NotAvailable {
                version: "1.0.0".into()
            })
        );
        assert_eq!(state, UpdateState::default());
    }

    #[tokio::test]
    async fn feed_error_becomes_failure_and_error_event() {
        let (tx, mut rx) = channel();
        let mut state = UpdateState::default();

        let response = check_for_updates(&FixedFeed(Err("offline".into())), "1.0.0", &tx).await;
        let events = drain_events(&mut rx, &mut state);

        assert!(!response.success);
        assert!(matches!(events.last(), Some(UpdateEvent::Error { .. })));
        assert!(!state.check_in_progress);
    }
}
