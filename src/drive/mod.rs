// src/drive/mod.rs

pub mod aliyun;
pub mod lanzou;
pub mod telecom;

pub use aliyun::AliyunDriver;
pub use lanzou::LanzouDriver;
pub use telecom::TelecomDriver;

use crate::{
    client::RobustClient,
    config::AppConfig,
    error::*,
    models::{DriveSource, Share},
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use log::debug;
use std::{pin::Pin, sync::Arc};

pub type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// 网盘驱动能力：把不透明的分享链接 + 提取码解析为具体可下载文件，
/// 并拉取其字节流。每个后端一个实现。
#[async_trait]
pub trait Driver: Send + Sync {
    fn source(&self) -> DriveSource;

    async fn resolve(&self, share_link: &str, passcode: &str) -> AppResult<Vec<Share>>;

    /// 返回字节流与内容长度（未知时为 0）。
    async fn download(&self, share: &Share) -> AppResult<(ByteStream, u64)>;
}

/// 按驱动属性表构造后端实例。`driver` 键选择后端，其余键是该后端的凭据。
/// 未知后端是启动期配置错误。
pub fn from_properties(
    config: Arc<AppConfig>,
    http: Arc<RobustClient>,
) -> AppResult<Arc<dyn Driver>> {
    let name = config
        .drive_properties
        .get("driver")
        .map(String::as_str)
        .unwrap_or("lanzou");
    let source: DriveSource = name.parse()?;
    debug!("构造网盘驱动: {}", source);
    match source {
        DriveSource::Aliyun => Ok(Arc::new(AliyunDriver::new(config, http))),
        DriveSource::Lanzou => Ok(Arc::new(LanzouDriver::new(config, http)?)),
        DriveSource::Telecom => Ok(Arc::new(TelecomDriver::new())),
        DriveSource::Direct => Ok(Arc::new(DirectDriver::new(http))),
    }
}

/// 直链后端：分享链接本身就是下载地址，无需解析协议。
pub struct DirectDriver {
    http: Arc<RobustClient>,
}

impl DirectDriver {
    pub fn new(http: Arc<RobustClient>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Driver for DirectDriver {
    fn source(&self) -> DriveSource {
        DriveSource::Direct
    }

    async fn resolve(&self, share_link: &str, _passcode: &str) -> AppResult<Vec<Share>> {
        let url = url::Url::parse(share_link)?;
        let file_name = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|s| !s.is_empty())
            .unwrap_or("download")
            .to_string();
        Ok(vec![Share {
            file_name,
            url: share_link.to_string(),
            size: None,
            properties: Default::default(),
        }])
    }

    async fn download(&self, share: &Share) -> AppResult<(ByteStream, u64)> {
        let res = self.http.get(&share.url).await?;
        let total = res.content_length().unwrap_or(0);
        Ok((Box::pin(res.bytes_stream()), total))
    }
}
