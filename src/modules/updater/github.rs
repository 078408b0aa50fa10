//! GitHub Releases 发布源

use std::time::Duration;

use reqwest::header::{ACCEPT, USER_AGENT};
use serde::Deserialize;

use super::models::{ReleaseAsset, ReleaseInfo};
use super::ReleaseFeed;
use crate::modules::common::error::KeepError;

const DEFAULT_API_URL: &str = "https://api.github.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);
const USER_AGENT_VALUE: &str = concat!("rust-keep/", env!("CARGO_PKG_VERSION"));

/// 安装包扩展名，按优先级排列
const INSTALLER_EXTENSIONS: [&str; 2] = [".exe", ".msi"];

#[derive(Debug, Deserialize)]
struct GithubRelease {
    tag_name: String,
    #[serde(default)]
    published_at: Option<String>,
    #[serde(default)]
    assets: Vec<GithubAsset>,
}

#[derive(Debug, Deserialize)]
struct GithubAsset {
    name: String,
    browser_download_url: String,
    size: u64,
}

impl From<GithubRelease> for ReleaseInfo {
    fn from(release: GithubRelease) -> Self {
        Self {
            version: release.tag_name,
            release_date: release.published_at,
            asset: pick_installer(release.assets),
        }
    }
}

/// 优先选安装包，没有时取第一个附件
fn pick_installer(assets: Vec<GithubAsset>) -> Option<ReleaseAsset> {
    let position = INSTALLER_EXTENSIONS
        .iter()
        .find_map(|ext| {
            assets
                .iter()
                .position(|a| a.name.to_lowercase().ends_with(ext))
        })
        .unwrap_or(0);

    assets.into_iter().nth(position).map(|a| ReleaseAsset {
        name: a.name,
        url: a.browser_download_url,
        size: a.size,
    })
}

/// 读取仓库最新的正式发布；`/releases/latest` 不返回预发布版本
pub struct GithubReleaseFeed {
    client: reqwest::Client,
    api_url: String,
    owner: String,
    repo: String,
}

impl GithubReleaseFeed {
    pub fn new(owner: &str, repo: &str) -> Result<Self, KeepError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| KeepError::Update(format!("无法创建 HTTP 客户端: {}", e)))?;

        Ok(Self {
            client,
            api_url: DEFAULT_API_URL.to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }

    /// 从 `owner/repo` 形式的字符串创建
    pub fn from_slug(slug: &str) -> Result<Self, KeepError> {
        let (owner, repo) = slug
            .split_once('/')
            .filter(|(o, r)| !o.is_empty() && !r.is_empty() && !r.contains('/'))
            .ok_or_else(|| KeepError::Update(format!("无效的仓库名称: {}", slug)))?;
        Self::new(owner, repo)
    }

    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.trim_end_matches('/').to_string();
        self
    }

    fn latest_url(&self) -> String {
        format!("{}/repos/{}/{}/releases/latest", self.api_url, self.owner, self.repo)
    }
}

impl ReleaseFeed for GithubReleaseFeed {
    async fn latest_release(&self) -> Result<ReleaseInfo, KeepError> {
        let url = self.latest_url();
        tracing::debug!("请求最新发布: {}", url);

        let response = self
            .client
            .get(&url)
            .header(USER_AGENT, USER_AGENT_VALUE)
            .header(ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| KeepError::Update(format!("请求失败: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(KeepError::Update(format!("发布源返回 {}", status)));
        }

        let release: GithubRelease = response
            .json()
            .await
            .map_err(|e| KeepError::Update(format!("无法解析发布信息: {}", e)))?;

        Ok(release.into())
    }

    async fn download_asset(
        &self,
        asset: &ReleaseAsset,
        on_chunk: &mut dyn FnMut(&[u8]) -> Result<(), KeepError>,
    ) -> Result<(), KeepError> {
        tracing::debug!("下载附件: {}", asset.url);

        let mut response = self
            .client
            .get(&asset.url)
            .header(USER_AGENT, USER_AGENT_VALUE)
            .timeout(DOWNLOAD_TIMEOUT)
            .send()
            .await
            .map_err(|e| KeepError::Update(format!("下载失败: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(KeepError::Update(format!("下载 {} 返回 {}", asset.name, status)));
        }

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| KeepError::Update(format!("下载中断: {}", e)))?
        {
            on_chunk(&chunk)?;
        }
        Ok(())
    }
}
