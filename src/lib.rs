// src/lib.rs

pub mod cli;
pub mod client;
pub mod config;
pub mod constants;
pub mod drive;
pub mod error;
pub mod fetcher;
pub mod logging;
pub mod models;
pub mod service;
pub mod symbols;
pub mod ui;
pub mod utils;

use crate::{
    cli::{Cli, Site},
    client::RobustClient,
    config::AppConfig,
    error::AppResult,
    fetcher::{DownloadManager, Fetcher, RateLimiter, sink::FileSink, sink::Sink},
    service::{Service, SobooksService},
};
use log::debug;
use std::sync::{Arc, atomic::AtomicBool};

/// 核心的执行上下文，包含一轮下载所需的全部状态和工具。
#[derive(Clone)]
pub struct FetchContext {
    pub manager: DownloadManager,
    pub config: Arc<AppConfig>,
    pub service: Arc<dyn Service>,
    pub limiter: Arc<RateLimiter>,
    pub sink: Arc<dyn Sink>,
    pub cancellation_token: Arc<AtomicBool>,
}

/// 库的公共入口点，由 `main.rs` 调用。
pub async fn run_from_cli(args: Arc<Cli>, cancellation_token: Arc<AtomicBool>) -> AppResult<()> {
    debug!("CLI 参数: {:?}", args);
    let config = Arc::new(AppConfig::new(&args)?);
    debug!("加载的应用配置: {:?}", config);

    let http = Arc::new(RobustClient::new(config.clone())?);
    let driver = drive::from_properties(config.clone(), http.clone())?;
    let service: Arc<dyn Service> = match args.site {
        Site::Sobooks => Arc::new(SobooksService::new(&config, http.clone(), driver.clone())),
    };
    let limiter = Arc::new(RateLimiter::per_minute(config.rate_per_minute)?);
    let sink = Arc::new(FileSink::new(&config.output_dir)?);

    ui::print_header(&format!("book-dl - {}", service.name()));
    ui::info(&format!(
        "网盘驱动: {} | 格式: {} | 并发: {} | 起始序号: {}",
        driver.source(),
        fetcher::format_list_display(&config.formats),
        config.threads,
        config.start_index
    ));
    ui::info(&format!("文件将保存到目录: \"{}\"", config.output_dir.display()));

    let context = FetchContext {
        manager: DownloadManager::new(),
        config,
        service,
        limiter,
        sink,
        cancellation_token,
    };
    Fetcher::new(context).download().await
}
