// src/drive/aliyun/mod.rs

pub mod auth;

pub use auth::{AccessToken, AliyunAuth};

use super::{ByteStream, Driver};
use crate::{
    client::RobustClient,
    config::AppConfig,
    constants::aliyun as consts,
    error::*,
    models::{DriveSource, Share},
};
use async_trait::async_trait;
use dashmap::DashMap;
use log::{debug, warn};
use regex::Regex;
use reqwest::header;
use serde_json::{Value, json};
use std::sync::{Arc, LazyLock};

static SHARE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/s/([0-9A-Za-z]+)").unwrap());

const PROP_SHARE_ID: &str = "share_id";
const PROP_FILE_ID: &str = "file_id";
const PROP_PASSCODE: &str = "passcode";

/// 阿里云盘驱动。认证由 `AliyunAuth` 托管；分享令牌按 share_id 缓存，
/// 同一分享下逐文件下载不必重复换取。
pub struct AliyunDriver {
    http: Arc<RobustClient>,
    auth: AliyunAuth,
    api_base: String,
    share_tokens: DashMap<String, String>,
}

impl AliyunDriver {
    pub fn new(config: Arc<AppConfig>, http: Arc<RobustClient>) -> Self {
        let auth = AliyunAuth::new(&config, http.clone());
        Self {
            http,
            auth,
            api_base: consts::API_BASE.to_string(),
            share_tokens: DashMap::new(),
        }
    }

    #[cfg(any(test, feature = "testing"))]
    pub fn with_bases(http: Arc<RobustClient>, api_base: &str, auth: AliyunAuth) -> Self {
        Self {
            http,
            auth,
            api_base: api_base.trim_end_matches('/').to_string(),
            share_tokens: DashMap::new(),
        }
    }

    /// 出站改写钩子：所有带鉴权的 API 调用都经过这里。
    /// 附加 Bearer 凭据；把空体标记头替换为真正置空的 content-type。
    async fn send_authed(&self, builder: reqwest_middleware::RequestBuilder) -> AppResult<Value> {
        let token = self.auth.current_token().await?;
        let mut request = builder.build()?;
        let headers = request.headers_mut();
        headers.insert(
            header::AUTHORIZATION,
            format!("Bearer {}", token)
                .parse()
                .map_err(|_| AppError::TokenInvalid)?,
        );
        if headers.remove(consts::BLANK_BODY_MARKER).is_some() {
            headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static(""));
        }

        let res = self.http.client.execute(request).await?;
        Self::parse_api_response(res).await
    }

    async fn parse_api_response(res: reqwest::Response) -> AppResult<Value> {
        let status = res.status();
        let text = res.text().await.unwrap_or_default();
        let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);

        if status.is_success() {
            return Ok(body);
        }

        let code = body["code"].as_str().unwrap_or_default().to_string();
        let message = body["message"].as_str().unwrap_or(&text).to_string();
        debug!("阿里云盘接口返回错误: {} {} {}", status, code, message);
        Err(match code.as_str() {
            c if c.contains("NotFound") => AppError::NotFound(message),
            "ShareLinkTokenInvalid" | "InvalidPassword" => AppError::WrongPasscode(message),
            "AccessTokenInvalid" | "AccessTokenExpired" => AppError::TokenInvalid,
            "TooManyRequests" => AppError::TooManyRequests,
            _ => AppError::InvalidShare(format!("{} ({})", message, status)),
        })
    }

    fn extract_share_id(share_link: &str) -> AppResult<String> {
        SHARE_ID_RE
            .captures(share_link)
            .map(|caps| caps[1].to_string())
            .ok_or_else(|| AppError::InvalidShare(share_link.to_string()))
    }

    /// 换取（或复用缓存的）分享令牌。换取本身无需登录态。
    async fn share_token(&self, share_id: &str, passcode: &str) -> AppResult<String> {
        if let Some(token) = self.share_tokens.get(share_id) {
            return Ok(token.clone());
        }
        let url = format!("{}{}", self.api_base, consts::SHARE_TOKEN_PATH);
        let res = self
            .http
            .client
            .post(&url)
            .json(&json!({ "share_id": share_id, "share_pwd": passcode }))
            .send()
            .await?;
        let body = Self::parse_api_response(res).await?;
        let token = body["share_token"]
            .as_str()
            .ok_or_else(|| AppError::InvalidShare("分享令牌响应缺少 share_token".to_string()))?
            .to_string();
        self.share_tokens.insert(share_id.to_string(), token.clone());
        Ok(token)
    }

    /// 列出分享下的文件。目录向下递归一层，书籍分享在实践中都是平铺的。
    async fn list_files(
        &self,
        share_id: &str,
        share_token: &str,
        parent_file_id: &str,
        passcode: &str,
        recurse: bool,
    ) -> AppResult<Vec<Share>> {
        let url = format!("{}{}", self.api_base, consts::FILE_LIST_PATH);
        let builder = self
            .http
            .client
            .post(&url)
            .header("x-share-token", share_token)
            .json(&json!({
                "share_id": share_id,
                "parent_file_id": parent_file_id,
                "limit": 100,
                "order_by": "name",
            }));
        let body = self.send_authed(builder).await?;

        let mut shares = Vec::new();
        for item in body["items"].as_array().into_iter().flatten() {
            let file_id = item["file_id"].as_str().unwrap_or_default().to_string();
            let name = item["name"].as_str().unwrap_or_default().to_string();
            match item["type"].as_str() {
                Some("file") => {
                    shares.push(Share {
                        file_name: name,
                        url: String::new(),
                        size: item["size"].as_u64(),
                        properties: [
                            (PROP_SHARE_ID.to_string(), share_id.to_string()),
                            (PROP_FILE_ID.to_string(), file_id),
                            (PROP_PASSCODE.to_string(), passcode.to_string()),
                        ]
                        .into(),
                    });
                }
                Some("folder") if recurse => {
                    let mut children = Box::pin(self.list_files(
                        share_id,
                        share_token,
                        &file_id,
                        passcode,
                        false,
                    ))
                    .await?;
                    shares.append(&mut children);
                }
                _ => warn!("跳过无法识别的分享条目 '{}'", name),
            }
        }
        Ok(shares)
    }
}

#[async_trait]
impl Driver for AliyunDriver {
    fn source(&self) -> DriveSource {
        DriveSource::Aliyun
    }

    async fn resolve(&self, share_link: &str, passcode: &str) -> AppResult<Vec<Share>> {
        let share_id = Self::extract_share_id(share_link)?;
        let share_token = self.share_token(&share_id, passcode).await?;
        self.list_files(&share_id, &share_token, "root", passcode, true)
            .await
    }

    async fn download(&self, share: &Share) -> AppResult<(ByteStream, u64)> {
        let share_id = share.property(PROP_SHARE_ID)?;
        let file_id = share.property(PROP_FILE_ID)?;
        let passcode = share.property(PROP_PASSCODE).unwrap_or_default();
        let share_token = self.share_token(share_id, passcode).await?;

        let url = format!("{}{}", self.api_base, consts::DOWNLOAD_URL_PATH);
        let builder = self
            .http
            .client
            .post(&url)
            .header("x-share-token", share_token)
            .json(&json!({
                "share_id": share_id,
                "file_id": file_id,
                "expire_sec": 600,
            }));
        let body = self.send_authed(builder).await?;
        let download_url = body["download_url"]
            .as_str()
            .or_else(|| body["url"].as_str())
            .ok_or_else(|| AppError::FileNotExist(share.file_name.clone()))?;

        // 直链来自对象存储，不带 Bearer，但必须带 Referer
        let res = self
            .http
            .client
            .get(download_url)
            .header(header::REFERER, "https://www.aliyundrive.com/")
            .send()
            .await?
            .error_for_status()?;
        let total = res.content_length().unwrap_or(0);
        Ok((Box::pin(res.bytes_stream()), total))
    }
}
