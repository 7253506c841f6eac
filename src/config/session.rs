// src/config/session.rs

use crate::{
    config::ExternalConfig,
    constants,
    error::{AppError, AppResult},
};
use anyhow::{Context, anyhow};
use log::{debug, info};
use std::{fs, path::Path, path::PathBuf};

pub fn config_root() -> AppResult<PathBuf> {
    let root = dirs::home_dir()
        .ok_or_else(|| AppError::Other(anyhow!("无法获取用户主目录")))?
        .join(constants::CONFIG_DIR_NAME);
    fs::create_dir_all(&root)
        .map_err(|e| AppError::Storage(format!("无法创建配置目录 '{}': {}", root.display(), e)))?;
    Ok(root)
}

pub(crate) fn load_or_create_external_config(config_root: &Path) -> AppResult<ExternalConfig> {
    let config_path = config_root.join(constants::CONFIG_FILE_NAME);
    if config_path.is_file() {
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("读取配置文件 '{}' 失败", config_path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("解析配置文件 '{}' 失败", config_path.display()))
            .map_err(AppError::from)
    } else {
        info!("配置文件 {:?} 不存在，将创建默认配置。", config_path);
        let config = ExternalConfig::default_app_config();

        let json_content = serde_json::to_string_pretty(&config)?;
        fs::write(&config_path, json_content)?;

        Ok(config)
    }
}

/// 读取会话文件中缓存的阿里云盘 Refresh Token。
pub fn load_refresh_token(config_root: &Path) -> Option<String> {
    let path = config_root.join(constants::ALIYUN_SESSION_FILE_NAME);
    match fs::read_to_string(&path) {
        Ok(content) => {
            let token = content.trim().to_string();
            if token.is_empty() {
                None
            } else {
                debug!("从会话文件加载 Refresh Token");
                Some(token)
            }
        }
        Err(_) => None,
    }
}

/// 每次成功刷新后覆写会话文件。写失败视为致命的存储错误，
/// 静默丢失凭据会导致下次运行重新扫码。
pub fn save_refresh_token(config_root: &Path, token: &str) -> AppResult<()> {
    let path = config_root.join(constants::ALIYUN_SESSION_FILE_NAME);
    fs::write(&path, token)
        .map_err(|e| AppError::Storage(format!("写入会话文件 '{}' 失败: {}", path.display(), e)))?;
    debug!("Refresh Token 已写入会话文件");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_token_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_refresh_token(dir.path()), None);

        save_refresh_token(dir.path(), "tok-123").unwrap();
        assert_eq!(load_refresh_token(dir.path()), Some("tok-123".to_string()));

        // 覆写
        save_refresh_token(dir.path(), "tok-456").unwrap();
        assert_eq!(load_refresh_token(dir.path()), Some("tok-456".to_string()));
    }

    #[test]
    fn test_blank_session_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(constants::ALIYUN_SESSION_FILE_NAME), "  \n").unwrap();
        assert_eq!(load_refresh_token(dir.path()), None);
    }
}
