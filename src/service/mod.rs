// src/service/mod.rs

pub mod sobooks;

pub use sobooks::SobooksService;

use crate::{error::*, fetcher::sink::Sink, models::{Format, Share}};
use async_trait::async_trait;
use std::collections::HashMap;

/// 来源站点能力：知道目录有多大、某个条目有哪些格式可下、
/// 以及如何把一个格式落到 Sink。站点内部通常持有一个网盘驱动。
#[async_trait]
pub trait Service: Send + Sync {
    fn name(&self) -> &'static str;

    /// 进度台账的文件名，落在配置根目录下。
    fn progress_file_name(&self) -> String {
        format!("{}.progress", self.name())
    }

    /// 目录大小，每次运行只查询一次。
    async fn size(&self) -> AppResult<u32>;

    /// 条目可下载的格式表。条目没有任何可用分享时返回空表，不算错误。
    async fn formats(&self, id: u32) -> AppResult<HashMap<Format, Share>>;

    async fn fetch(
        &self,
        id: u32,
        format: Format,
        share: &Share,
        sink: &dyn Sink,
    ) -> AppResult<()>;
}
