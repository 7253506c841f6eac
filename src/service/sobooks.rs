// src/service/sobooks.rs

use super::Service;
use crate::{
    client::RobustClient,
    config::AppConfig,
    constants::sobooks as consts,
    drive::Driver,
    error::*,
    fetcher::sink::Sink,
    models::{DriveSource, Format, Share},
};
use anyhow::anyhow;
use async_trait::async_trait;
use log::{debug, info, warn};
use regex::Regex;
use reqwest::StatusCode;
use std::{
    collections::HashMap,
    sync::{Arc, LazyLock},
};

static ARTICLE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/books/(\d+)\.html").unwrap());
static ALIYUN_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://www\.aliyundrive\.com/s/[0-9A-Za-z]+").unwrap());
static LANZOU_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://[0-9a-z\-]+\.lanzou[a-z]\.com/[0-9A-Za-z/]+").unwrap()
});
static TELECOM_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://cloud\.189\.cn/[0-9A-Za-z/]+").unwrap());
static PASSCODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:密码|提取码)[:：]\s*([0-9A-Za-z]{3,8})").unwrap());

/// sobooks 站点：按文章编号排布的书籍目录。页面结构简单，
/// 标题和分享链接用正则提取即可，协议复杂度都在网盘驱动一侧。
pub struct SobooksService {
    http: Arc<RobustClient>,
    driver: Arc<dyn Driver>,
    base_url: String,
}

impl SobooksService {
    pub fn new(config: &AppConfig, http: Arc<RobustClient>, driver: Arc<dyn Driver>) -> Self {
        let base_url = config
            .drive_properties
            .get("siteUrl")
            .cloned()
            .unwrap_or_else(|| consts::BASE_URL.to_string());
        Self {
            http,
            driver,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn article_url(&self, id: u32) -> String {
        format!("{}/books/{}.html", self.base_url, id)
    }

    /// 按当前驱动的后端挑出页面里属于它的分享链接。
    fn extract_share_link(&self, page: &str) -> Option<String> {
        let pattern: &Regex = match self.driver.source() {
            DriveSource::Aliyun => &ALIYUN_LINK_RE,
            DriveSource::Lanzou => &LANZOU_LINK_RE,
            DriveSource::Telecom => &TELECOM_LINK_RE,
            // 直链后端：沿用蓝奏匹配之外的任何直下地址没有统一形态，
            // 这里不支持自动发现
            DriveSource::Direct => return None,
        };
        pattern.find(page).map(|m| m.as_str().to_string())
    }

    fn extract_passcode(page: &str) -> String {
        PASSCODE_RE
            .captures(page)
            .map(|caps| caps[1].to_string())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Service for SobooksService {
    fn name(&self) -> &'static str {
        "sobooks"
    }

    async fn size(&self) -> AppResult<u32> {
        let page = self.http.get_text(&self.base_url).await?;
        let max_id = ARTICLE_ID_RE
            .captures_iter(&page)
            .filter_map(|caps| caps[1].parse::<u32>().ok())
            .max()
            .ok_or_else(|| AppError::Other(anyhow!("无法从首页解析目录大小")))?;
        info!("目录大小: {}", max_id);
        Ok(max_id)
    }

    async fn formats(&self, id: u32) -> AppResult<HashMap<Format, Share>> {
        let url = self.article_url(id);
        let res = self.http.client.get(&url).send().await?;
        if res.status() == StatusCode::NOT_FOUND {
            // 目录里的空洞：没有这篇文章，不算错误
            debug!("条目 {} 不存在 (404)，视为无可用格式", id);
            return Ok(HashMap::new());
        }
        let page = res.error_for_status()?.text().await?;

        let Some(share_link) = self.extract_share_link(&page) else {
            debug!("条目 {} 没有 {} 后端的分享链接", id, self.driver.source());
            return Ok(HashMap::new());
        };
        let passcode = Self::extract_passcode(&page);
        debug!("条目 {} 分享链接: {} (提取码: {:?})", id, share_link, passcode);

        let shares = self.driver.resolve(&share_link, &passcode).await?;
        let mut formats = HashMap::new();
        for share in shares {
            let Some(format) = share.format() else {
                warn!("条目 {} 的分享 '{}' 无法识别格式，忽略", id, share.file_name);
                continue;
            };
            // 同一格式取第一个候选
            formats.entry(format).or_insert(share);
        }
        Ok(formats)
    }

    async fn fetch(
        &self,
        id: u32,
        format: Format,
        share: &Share,
        sink: &dyn Sink,
    ) -> AppResult<()> {
        info!("下载条目 {} 的 {} 格式: {}", id, format, share.file_name);
        let (stream, content_length) = self.driver.download(share).await?;
        let total = if content_length > 0 {
            content_length
        } else {
            share.size.unwrap_or(0)
        };
        sink.write(&share.file_name, total, stream).await
    }
}
