// src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("认证失败 (Refresh Token 无效或已过期)")]
    TokenInvalid,
    #[error("二维码已过期，请重新运行程序生成新的二维码")]
    QrExpired,
    #[error("二维码登录已被取消")]
    QrCanceled,
    #[error("分享不存在或已被删除: {0}")]
    NotFound(String),
    #[error("分享提取码错误: {0}")]
    WrongPasscode(String),
    #[error("无效的分享链接: {0}")]
    InvalidShare(String),
    #[error("文件不存在: {0}")]
    FileNotExist(String),
    #[error("请求过于频繁，已被目标站点限流")]
    TooManyRequests,
    #[error("功能未实现: {0}")]
    NotImplemented(&'static str),
    #[error("配置错误: {0}")]
    Config(String),
    #[error("进度存储错误: {0}")]
    Storage(String),
    #[error("序号 {0} 超出目录范围")]
    OutOfRange(u32),
    #[error("网络请求失败: {0}")]
    Network(#[from] reqwest::Error),
    #[error("网络中间件错误: {0}")]
    NetworkMiddleware(#[from] reqwest_middleware::Error),
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),
    #[error("临时文件持久化失败: {0}")]
    TempFilePersist(#[from] tempfile::PersistError),
    #[error("JSON 解析错误: {0}")]
    Json(#[from] serde_json::Error),
    #[error("无法解析来自 '{url}' 的API响应: {source}")]
    ApiParseFailed {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("URL 解析错误: {0}")]
    Url(#[from] url::ParseError),
    #[error("Base64 解码错误: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("用户中断")]
    UserInterrupt,
    #[error("未知错误: {0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// 单文件级错误：只跳过当前文件，不中止该条目的其余格式。
    pub fn is_per_file(&self) -> bool {
        matches!(self, AppError::FileNotExist(_))
    }
}

pub type AppResult<T> = Result<T, AppError>;
