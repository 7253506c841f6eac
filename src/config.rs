// src/config.rs

pub mod session;

use crate::{cli::Cli, constants, error::*, models::Format};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::PathBuf, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NetworkConfig {
    pub connect_timeout_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
}

/// 磁盘上的外部配置 (`~/.book-dl/config.json`)，首次运行时自动创建。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    /// 网盘驱动属性表: `driver` 选择后端，其余键为该后端的凭据
    /// (refreshToken / username / password / passcode)。
    #[serde(default)]
    pub drive: HashMap<String, String>,
}

impl ExternalConfig {
    pub(crate) fn default_app_config() -> Self {
        let network_config = NetworkConfig {
            connect_timeout_secs: Some(10),
            timeout_secs: Some(120),
            max_retries: Some(3),
        };

        Self {
            network: network_config,
            drive: HashMap::from([("driver".into(), "lanzou".into())]),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub threads: usize,
    pub rate_per_minute: u32,
    pub start_index: u32,
    pub formats: Vec<Format>,
    pub output_dir: PathBuf,
    pub config_root: PathBuf,
    pub user_agent: String,
    pub connect_timeout: Duration,
    pub timeout: Duration,
    pub max_retries: u32,
    pub drive_properties: HashMap<String, String>,
}

impl AppConfig {
    pub fn new(args: &Cli) -> AppResult<Self> {
        let config_root = session::config_root()?;
        let external_config = session::load_or_create_external_config(&config_root)?;

        // 格式与起始序号在这里一次性校验，错误属于启动期致命错误
        let formats = Format::parse_list(&args.formats)?;
        if args.start == 0 {
            return Err(AppError::Config("起始序号必须从 1 开始".to_string()));
        }
        if args.threads == 0 {
            return Err(AppError::Config("线程数必须大于 0".to_string()));
        }
        if args.rate == 0 {
            return Err(AppError::Config("速率上限必须大于 0".to_string()));
        }

        let mut drive_properties = external_config.drive;
        if let Some(driver) = &args.driver {
            drive_properties.insert("driver".to_string(), driver.clone());
        }
        if let Some(token) = &args.refresh_token {
            drive_properties.insert("refreshToken".to_string(), token.clone());
        }

        Ok(Self {
            threads: args.threads,
            rate_per_minute: args.rate,
            start_index: args.start,
            formats,
            output_dir: args.output.clone(),
            config_root,
            user_agent: constants::USER_AGENT.into(),
            connect_timeout: Duration::from_secs(
                external_config.network.connect_timeout_secs.unwrap_or(10),
            ),
            timeout: Duration::from_secs(external_config.network.timeout_secs.unwrap_or(120)),
            max_retries: external_config.network.max_retries.unwrap_or(3),
            drive_properties,
        })
    }
}

#[cfg(any(test, feature = "testing"))]
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            threads: 3,
            rate_per_minute: 600,
            start_index: 1,
            formats: vec![Format::Epub],
            output_dir: PathBuf::from("downloads"),
            config_root: std::env::temp_dir().join("book-dl-test"),
            user_agent: "test-agent/1.0".to_string(),
            connect_timeout: Duration::from_secs(5),
            timeout: Duration::from_secs(15),
            max_retries: 0,
            drive_properties: HashMap::new(),
        }
    }
}
