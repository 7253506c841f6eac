// src/main.rs

use book_dl::{cli::Cli, logging, run_from_cli};
use clap::{CommandFactory, FromArgMatches};
use colored::*;
use std::{
    env,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

#[tokio::main]
async fn main() {
    // 为 Windows 终端启用 ANSI 颜色支持。
    #[cfg(windows)]
    {
        colored::control::set_virtual_terminal(true).ok();
    }

    let cancellation_token = Arc::new(AtomicBool::new(false));
    let token_for_signal = cancellation_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.unwrap();
        println!("\n{} 收到中断信号，等待当前条目收尾...", "[!]".yellow());
        token_for_signal.store(true, Ordering::Relaxed);
        // 第二次 Ctrl+C 直接退出
        tokio::signal::ctrl_c().await.unwrap();
        println!("\n{} 用户强制中断程序。", "[!]".yellow());
        tokio::time::sleep(Duration::from_millis(100)).await;
        std::process::exit(130);
    });

    let bin_name = env::var("CARGO_BIN_NAME").unwrap_or_else(|_| "book-dl".to_string());

    let after_help = format!(
        "示例:\n  # 用默认配置抓取整个目录的 epub\n  {bin}\n\n  # 蓝奏云后端，epub+pdf，从第 500 条续跑\n  {bin} --driver lanzou -f epub,pdf --start 500\n\n  # 阿里云盘后端，首次运行会提示扫码登录\n  {bin} --driver aliyun -t 4",
        bin = bin_name
    );

    let cmd = Cli::command().after_help(after_help);
    let args = Arc::new(Cli::from_arg_matches(&cmd.get_matches()).unwrap());

    logging::init_logger(args.log_level);

    if let Err(e) = run_from_cli(args, cancellation_token).await {
        eprintln!("\n{} {}", "[X]".red(), format!("程序执行出错: {}", e).red());
        std::process::exit(1);
    }
}
