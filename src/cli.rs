// src/cli.rs

use crate::constants;
use clap::{Parser, ValueEnum, command, crate_version};
use std::path::PathBuf;

/// 定义日志输出级别
#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// 支持的来源站点
#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum Site {
    #[value(name = "sobooks")]
    Sobooks,
}

#[derive(Parser, Debug, Clone)]
#[command(
    version = crate_version!(),
    about,
    long_about = None,
    disable_help_flag = true,
    disable_version_flag = true,
)]
pub struct Cli {
    // --- 下载范围 (Range) ---
    /// 目标站点
    #[arg(long, value_enum, default_value_t = Site::Sobooks, help_heading = "Range")]
    pub site: Site,
    /// 起始下载序号 (1-based)，之前的条目视为已完成
    #[arg(long, default_value_t = 1, value_name = "N", help_heading = "Range")]
    pub start: u32,
    /// 需要下载的格式，逗号分隔 (例如 'epub,pdf')
    #[arg(short, long, default_value_t = constants::DEFAULT_FORMATS.to_string(), value_name = "LIST", help_heading = "Range")]
    pub formats: String,

    // --- 下载选项 (Options) ---
    /// 并发工作线程数
    #[arg(short, long, default_value_t = constants::DEFAULT_THREADS, help_heading = "Options")]
    pub threads: usize,
    /// 全局出站请求速率上限 (次/分钟)
    #[arg(long, default_value_t = constants::DEFAULT_RATE_PER_MINUTE, value_name = "N", help_heading = "Options")]
    pub rate: u32,
    /// 网盘驱动 (aliyun / lanzou / telecom)，覆盖配置文件中的设置
    #[arg(long, help_heading = "Options")]
    pub driver: Option<String>,
    /// 阿里云盘 Refresh Token，覆盖会话文件中缓存的值
    #[arg(long, value_name = "TOKEN", help_heading = "Options")]
    pub refresh_token: Option<String>,
    /// 设置文件保存目录
    #[arg(short, long, value_name = "DIR", default_value_os_t = PathBuf::from(constants::DEFAULT_SAVE_DIR), help_heading = "Options")]
    pub output: PathBuf,

    // --- 通用选项 (General) ---
    /// 显示此帮助信息并退出
    #[arg(short = 'h', long, action = clap::ArgAction::Help, global = true, help_heading = "General")]
    _help: Option<bool>,
    /// 显示版本信息并退出
    #[arg(short = 'V', long, action = clap::ArgAction::Version, global = true, help_heading = "General")]
    _version: Option<bool>,
    /// (隐藏参数) 设置日志文件的输出级别，用于调试
    #[arg(long, value_enum, default_value_t = LogLevel::Off, global = true, hide = true)]
    pub log_level: LogLevel,
}
