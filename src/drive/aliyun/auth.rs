// src/drive/aliyun/auth.rs

use crate::{
    client::RobustClient,
    config::{AppConfig, session},
    constants::{self, aliyun as consts},
    error::*,
    symbols, ui,
};
use anyhow::anyhow;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use std::{path::PathBuf, sync::Arc};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct AccessToken {
    pub access_token: String,
    pub refresh_token: String,
    pub expire_time: DateTime<Utc>,
}

impl AccessToken {
    /// 距过期不足刷新窗口即视为陈旧，绝不带着陈旧凭据发请求。
    pub fn is_fresh(&self) -> bool {
        Utc::now() + Duration::minutes(constants::TOKEN_REFRESH_SKEW_MINUTES) < self.expire_time
    }
}

enum TokenState {
    Missing,
    Cached(AccessToken),
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expire_time: DateTime<Utc>,
}

/// 阿里云盘认证子系统。凭据状态由一把异步锁守护：
/// 锁内完成过期判定与刷新，并发调用方不会重复触发同一次刷新。
pub struct AliyunAuth {
    http: Arc<RobustClient>,
    config_root: PathBuf,
    auth_base: String,
    passport_base: String,
    /// 构造时由驱动属性表注入的 Refresh Token，优先于会话文件。
    seed_refresh_token: Option<String>,
    state: Mutex<TokenState>,
}

impl AliyunAuth {
    pub fn new(config: &AppConfig, http: Arc<RobustClient>) -> Self {
        Self {
            http,
            config_root: config.config_root.clone(),
            auth_base: consts::AUTH_BASE.to_string(),
            passport_base: consts::PASSPORT_BASE.to_string(),
            seed_refresh_token: config
                .drive_properties
                .get("refreshToken")
                .cloned()
                .filter(|t| !t.is_empty()),
            state: Mutex::new(TokenState::Missing),
        }
    }

    #[cfg(any(test, feature = "testing"))]
    pub fn with_bases(
        config: &AppConfig,
        http: Arc<RobustClient>,
        auth_base: &str,
        passport_base: &str,
    ) -> Self {
        let mut auth = Self::new(config, http);
        auth.auth_base = auth_base.trim_end_matches('/').to_string();
        auth.passport_base = passport_base.trim_end_matches('/').to_string();
        auth
    }

    /// 预置一个缓存凭据，用于测试刷新时机。
    #[cfg(any(test, feature = "testing"))]
    pub async fn prime_token(&self, token: AccessToken) {
        *self.state.lock().await = TokenState::Cached(token);
    }

    /// 唯一的取用入口：返回当前可用的 Access Token，内部按需刷新。
    /// 状态机: Missing → (刷新 | 扫码) → Authorized；陈旧 → 刷新 → Authorized。
    pub async fn current_token(&self) -> AppResult<String> {
        let mut state = self.state.lock().await;

        let stale_refresh_token = match &*state {
            TokenState::Cached(token) if token.is_fresh() => {
                return Ok(token.access_token.clone());
            }
            TokenState::Cached(token) => Some(token.refresh_token.clone()),
            TokenState::Missing => None,
        };

        let token = match stale_refresh_token {
            // 已授权实例的刷新失败是致命错误，不换用同一凭据重试
            Some(refresh_token) => {
                debug!("Access Token 即将过期，主动刷新");
                self.refresh(&refresh_token).await?
            }
            // 首次取用：配置注入或会话文件中的 Refresh Token 优先，失败回退扫码
            None => {
                let seeded = self
                    .seed_refresh_token
                    .clone()
                    .or_else(|| session::load_refresh_token(&self.config_root));
                match seeded {
                    Some(refresh_token) => match self.refresh(&refresh_token).await {
                        Ok(token) => token,
                        Err(AppError::TokenInvalid) => {
                            warn!("缓存的 Refresh Token 已失效，回退到扫码登录");
                            println!("{} 缓存的登录凭据已失效，需要重新扫码。", *symbols::WARN);
                            self.qr_login().await?
                        }
                        Err(e) => return Err(e),
                    },
                    None => self.qr_login().await?,
                }
            }
        };

        let access_token = token.access_token.clone();
        session::save_refresh_token(&self.config_root, &token.refresh_token)?;
        *state = TokenState::Cached(token);
        Ok(access_token)
    }

    /// 用 Refresh Token 换取新的 Access Token。
    async fn refresh(&self, refresh_token: &str) -> AppResult<AccessToken> {
        let url = format!("{}{}", self.auth_base, consts::TOKEN_PATH);
        let res = self
            .http
            .client
            .post(&url)
            .json(&json!({
                "refresh_token": refresh_token,
                "grant_type": "refresh_token",
            }))
            .send()
            .await?;

        if matches!(
            res.status(),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Err(AppError::TokenInvalid);
        }
        let res = res.error_for_status()?;
        let body = res.text().await?;
        let token: TokenResponse =
            serde_json::from_str(&body).map_err(|source| AppError::ApiParseFailed { url, source })?;

        info!("Access Token 已刷新，有效期至 {}", token.expire_time);
        Ok(AccessToken {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expire_time: token.expire_time,
        })
    }

    /// 扫码登录：生成二维码 → 终端渲染 → 1 秒间隔轮询状态 →
    /// CONFIRMED 后从 bizExt 载荷取出一次性 Refresh Token 完成兑换。
    async fn qr_login(&self) -> AppResult<AccessToken> {
        let generate_url = format!("{}{}", self.passport_base, consts::QR_GENERATE_PATH);
        let payload: Value = self.http.get(&generate_url).await?.json().await?;
        let data = &payload["content"]["data"];
        let t = data["t"].as_i64().ok_or_else(|| {
            AppError::Other(anyhow!("二维码接口响应缺少 t 字段"))
        })?;
        let ck = data["ck"].as_str().unwrap_or_default().to_string();
        let code_content = data["codeContent"].as_str().ok_or_else(|| {
            AppError::Other(anyhow!("二维码接口响应缺少 codeContent 字段"))
        })?;

        render_qr(code_content)?;
        ui::info("请使用阿里云盘 App 扫描上方二维码登录。");

        let query_url = format!("{}{}", self.passport_base, consts::QR_QUERY_PATH);
        let mut last_status = String::new();
        // 二维码本身约两分钟过期，轮询只需兜底一个硬上限
        for _ in 0..300 {
            tokio::time::sleep(std::time::Duration::from_secs(
                constants::QR_POLL_INTERVAL_SECS,
            ))
            .await;

            let res: Value = self
                .http
                .client
                .post(&query_url)
                .form(&[
                    ("t", t.to_string()),
                    ("ck", ck.clone()),
                    ("appName", "aliyun_drive".to_string()),
                    ("appEntrance", "web".to_string()),
                    ("isMobile", "false".to_string()),
                ])
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            let status = res["content"]["data"]["qrCodeStatus"]
                .as_str()
                .unwrap_or("NEW")
                .to_string();
            if status != last_status {
                debug!("扫码状态: {} -> {}", last_status, status);
                match status.as_str() {
                    "SCANED" => ui::info("已扫描，请在手机上确认登录。"),
                    "CONFIRMED" => ui::info("登录已确认。"),
                    _ => {}
                }
                last_status = status.clone();
            }

            match status.as_str() {
                "NEW" | "SCANED" => continue,
                "CONFIRMED" => {
                    let biz_ext = res["content"]["data"]["bizExt"]
                        .as_str()
                        .ok_or_else(|| AppError::Other(anyhow!("确认响应缺少 bizExt 载荷")))?;
                    let decoded = BASE64.decode(biz_ext)?;
                    let biz: Value = serde_json::from_slice(&decoded)?;
                    let refresh_token = biz["pds_login_result"]["refreshToken"]
                        .as_str()
                        .ok_or_else(|| {
                            AppError::Other(anyhow!("bizExt 载荷中没有 refreshToken"))
                        })?;
                    return self.refresh(refresh_token).await;
                }
                "EXPIRED" => return Err(AppError::QrExpired),
                "CANCELED" => return Err(AppError::QrCanceled),
                other => {
                    return Err(AppError::Other(anyhow!("未知的扫码状态: {}", other)));
                }
            }
        }
        Err(AppError::QrExpired)
    }
}

fn render_qr(content: &str) -> AppResult<()> {
    let code = qrcode::QrCode::new(content)
        .map_err(|e| AppError::Other(anyhow!("生成二维码失败: {}", e)))?;
    let rendered = code
        .render::<qrcode::render::unicode::Dense1x2>()
        .quiet_zone(true)
        .build();
    println!("\n{}\n", rendered);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_freshness_window() {
        let fresh = AccessToken {
            access_token: "a".into(),
            refresh_token: "r".into(),
            expire_time: Utc::now() + Duration::minutes(15),
        };
        assert!(fresh.is_fresh());

        let stale = AccessToken {
            access_token: "a".into(),
            refresh_token: "r".into(),
            expire_time: Utc::now() + Duration::minutes(5),
        };
        assert!(!stale.is_fresh());
    }
}
