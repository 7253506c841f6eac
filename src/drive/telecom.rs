// src/drive/telecom.rs

use super::{ByteStream, Driver};
use crate::{
    error::*,
    models::{DriveSource, Share},
};
use async_trait::async_trait;

/// 天翼云盘后端尚未实现。保留驱动声明，所有操作以 `NotImplemented`
/// 错误返回给调用方，让编排器走统一的失败传播路径。
pub struct TelecomDriver;

impl TelecomDriver {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TelecomDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Driver for TelecomDriver {
    fn source(&self) -> DriveSource {
        DriveSource::Telecom
    }

    async fn resolve(&self, _share_link: &str, _passcode: &str) -> AppResult<Vec<Share>> {
        Err(AppError::NotImplemented("telecom 驱动的分享解析"))
    }

    async fn download(&self, _share: &Share) -> AppResult<(ByteStream, u64)> {
        Err(AppError::NotImplemented("telecom 驱动的文件下载"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_telecom_returns_not_implemented() {
        let driver = TelecomDriver::new();
        assert!(matches!(
            driver.resolve("https://cloud.189.cn/t/abc", "").await,
            Err(AppError::NotImplemented(_))
        ));
    }
}
