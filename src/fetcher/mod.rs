// src/fetcher/mod.rs

pub mod limiter;
pub mod progress;
pub mod sink;

pub use limiter::RateLimiter;
pub use progress::ProgressStore;

use crate::{FetchContext, error::*, models::Format, symbols, ui};
use anyhow::anyhow;
use colored::*;
use log::{debug, error, info, warn};
use std::{
    cmp::min,
    collections::HashMap,
    sync::{Arc, Mutex, atomic::Ordering},
};
use tokio::sync::Mutex as TokioMutex;

#[derive(Clone, Default)]
pub struct DownloadStats {
    pub total_items: usize,
    pub success: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// 跨工作线程共享的统计与报告器。
#[derive(Clone)]
pub struct DownloadManager {
    stats: Arc<Mutex<DownloadStats>>,
    failed_downloads: Arc<Mutex<Vec<(String, String)>>>,
    skipped_downloads: Arc<Mutex<Vec<(String, String)>>>,
}

impl Default for DownloadManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadManager {
    pub fn new() -> Self {
        Self {
            stats: Arc::new(Mutex::new(DownloadStats::default())),
            failed_downloads: Arc::new(Mutex::new(Vec::new())),
            skipped_downloads: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn start_batch(&self, total_items: usize) {
        info!("开始新一批下载任务，待处理条目: {}", total_items);
        let mut stats = self.stats.lock().unwrap();
        *stats = DownloadStats {
            total_items,
            ..Default::default()
        };
        self.failed_downloads.lock().unwrap().clear();
        self.skipped_downloads.lock().unwrap().clear();
    }

    pub fn record_success(&self) {
        self.stats.lock().unwrap().success += 1;
    }

    pub fn record_skip(&self, filename: &str, reason: &str) {
        info!("跳过 '{}'，原因: {}", filename, reason);
        self.stats.lock().unwrap().skipped += 1;
        self.skipped_downloads
            .lock()
            .unwrap()
            .push((filename.to_string(), reason.to_string()));
    }

    pub fn record_failure(&self, filename: &str, reason: &str) {
        error!("'{}' 处理失败: {}", filename, reason);
        self.stats.lock().unwrap().failed += 1;
        self.failed_downloads
            .lock()
            .unwrap()
            .push((filename.to_string(), reason.to_string()));
    }

    pub fn get_stats(&self) -> DownloadStats {
        self.stats.lock().unwrap().clone()
    }

    pub fn print_report(&self) {
        let stats = self.get_stats();
        let skipped = self.skipped_downloads.lock().unwrap();
        let failed = self.failed_downloads.lock().unwrap();
        info!(
            "下载报告: Items={}, Success={}, Skipped={}, Failed={}",
            stats.total_items, stats.success, stats.skipped, stats.failed
        );

        if !skipped.is_empty() || !failed.is_empty() {
            ui::print_sub_header("下载详情报告");
            if !skipped.is_empty() {
                println!("\n{} 跳过的文件 ({}个):", *symbols::INFO, stats.skipped);
                print_grouped_report(&skipped, |s| s.cyan());
            }
            if !failed.is_empty() {
                println!("\n{} 失败的文件 ({}个):", *symbols::ERROR, stats.failed);
                print_grouped_report(&failed, |s| s.red());
            }
        }
        ui::print_sub_header("任务总结");
        let summary = format!(
            "{} | {} | {}",
            format!("成功: {}", stats.success).green(),
            format!("失败: {}", stats.failed).red(),
            format!("跳过: {}", stats.skipped).yellow()
        );
        println!("{}", summary);
    }
}

fn print_grouped_report(items: &[(String, String)], color_fn: fn(ColoredString) -> ColoredString) {
    let mut grouped: HashMap<&String, Vec<&String>> = HashMap::new();
    for (filename, reason) in items {
        grouped.entry(reason).or_default().push(filename);
    }
    let mut sorted_reasons: Vec<_> = grouped.keys().collect();
    sorted_reasons.sort();
    for reason in sorted_reasons {
        println!("  - {}", color_fn(format!("原因: {}", reason).into()));
        let mut filenames = grouped.get(reason).unwrap().clone();
        filenames.sort();
        for filename in filenames {
            println!("    - {}", filename);
        }
    }
}

/// 编排器：一次 `download()` 对应一轮目录遍历。
/// 查一次目录大小 → 打开台账 → 固定数量的工作任务拉满并发 →
/// 汇总第一个错误。出错的条目不标完成，下次运行重新认领。
pub struct Fetcher {
    context: FetchContext,
}

impl Fetcher {
    pub fn new(context: FetchContext) -> Self {
        Self { context }
    }

    pub async fn download(&self) -> AppResult<()> {
        let catalog_size = self.context.service.size().await?;
        if catalog_size == 0 {
            return Err(AppError::Other(anyhow!("目录为空")));
        }

        let progress_path = self
            .context
            .config
            .config_root
            .join(self.context.service.progress_file_name());
        let store = Arc::new(ProgressStore::open(
            self.context.config.start_index,
            catalog_size,
            progress_path,
        )?);

        let remaining = (store.size() - store.completed()) as usize;
        if remaining == 0 {
            ui::info("所有条目均已完成，无事可做。");
            return Ok(());
        }
        self.context.manager.start_batch(remaining);

        let thread_count = min(self.context.config.threads, remaining);
        ui::info(&format!(
            "目录共 {} 条，待处理 {} 条 (并发数: {})...",
            store.size(),
            remaining,
            thread_count
        ));

        let first_error = Arc::new(TokioMutex::new(None::<AppError>));
        let mut handles = Vec::with_capacity(thread_count);
        for worker_id in 0..thread_count {
            let context = self.context.clone();
            let store = store.clone();
            let first_error = first_error.clone();
            handles.push(tokio::spawn(async move {
                run_worker(worker_id, context, store, first_error).await;
            }));
        }
        for handle in handles {
            handle
                .await
                .map_err(|e| AppError::Other(anyhow!("工作任务异常退出: {}", e)))?;
        }

        self.context.manager.print_report();

        if self
            .context
            .cancellation_token
            .load(Ordering::Relaxed)
        {
            return Err(AppError::UserInterrupt);
        }
        if let Some(err) = first_error.lock().await.take() {
            return Err(err);
        }
        info!("本轮下载完成，台账完成度 {}/{}", store.completed(), store.size());
        Ok(())
    }
}

/// 工作任务主循环：认领 → 解析格式 → 逐格式下载 → 标记完成。
/// 除单文件缺失外的任何错误都终止本任务，且不标记当前条目，
/// 其余任务继续运行。
async fn run_worker(
    worker_id: usize,
    context: FetchContext,
    store: Arc<ProgressStore>,
    first_error: Arc<TokioMutex<Option<AppError>>>,
) {
    debug!("工作任务 {} 启动", worker_id);
    loop {
        if context.cancellation_token.load(Ordering::Relaxed) {
            debug!("工作任务 {} 响应中断退出", worker_id);
            return;
        }
        let Some(id) = store.acquire_next() else {
            debug!("工作任务 {} 无剩余条目，正常退出", worker_id);
            return;
        };

        match process_item(&context, id).await {
            Ok(()) => {
                if let Err(e) = store.mark_completed(id) {
                    // 完成状态写不下去等于丢失至多一次完成的保证，必须致命
                    report_first_error(&context, &first_error, id, e).await;
                    return;
                }
            }
            Err(e) => {
                report_first_error(&context, &first_error, id, e).await;
                return;
            }
        }
    }
}

async fn process_item(context: &FetchContext, id: u32) -> AppResult<()> {
    context.limiter.take().await;
    let formats = context.service.formats(id).await?;

    let selected: Vec<_> = formats
        .into_iter()
        .filter(|(format, _)| context.config.formats.contains(format))
        .collect();
    if selected.is_empty() {
        debug!("条目 {} 没有命中允许格式，直接完成", id);
        return Ok(());
    }

    for (format, share) in selected {
        context.limiter.take().await;
        match context
            .service
            .fetch(id, format, &share, context.sink.as_ref())
            .await
        {
            Ok(()) => context.manager.record_success(),
            Err(e) if e.is_per_file() => {
                warn!("条目 {} 的 '{}' 不存在，跳过该文件: {}", id, share.file_name, e);
                context.manager.record_skip(&share.file_name, "文件不存在");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

async fn report_first_error(
    context: &FetchContext,
    first_error: &TokioMutex<Option<AppError>>,
    id: u32,
    err: AppError,
) {
    context
        .manager
        .record_failure(&format!("条目 {}", id), &err.to_string());
    let mut slot = first_error.lock().await;
    if slot.is_none() {
        *slot = Some(err);
    }
}

/// 允许格式的显示串，供启动时回显配置。
pub fn format_list_display(formats: &[Format]) -> String {
    use itertools::Itertools;
    formats.iter().map(Format::as_str).join(", ")
}
