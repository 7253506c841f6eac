// src/drive/lanzou/mod.rs

pub mod obfuscate;

use super::{ByteStream, Driver};
use crate::{
    client::RobustClient,
    config::AppConfig,
    constants::lanzou as consts,
    error::*,
    models::{DriveSource, Format, Share},
};
use async_trait::async_trait;
use log::{debug, info, warn};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use regex::Regex;
use reqwest::{StatusCode, header, redirect};
use serde::Deserialize;
use std::{collections::HashMap, sync::Arc};

static AJAX_URL_RE: std::sync::LazyLock<Regex> =
    std::sync::LazyLock::new(|| Regex::new(r"url\s*:\s*'(/ajaxm\.php[^']*)'").unwrap());
static PASSWORD_DATA_RE: std::sync::LazyLock<Regex> =
    std::sync::LazyLock::new(|| Regex::new(r"data\s*:\s*'([^']+)'\s*\+\s*pwd").unwrap());
static IFRAME_RE: std::sync::LazyLock<Regex> =
    std::sync::LazyLock::new(|| Regex::new(r#"<iframe[^>]+src="(/[^"]+)""#).unwrap());
static VAR_RE: std::sync::LazyLock<Regex> =
    std::sync::LazyLock::new(|| Regex::new(r"var\s+([A-Za-z_]\w*)\s*=\s*'([^']*)'\s*;").unwrap());
static DATA_TEMPLATE_RE: std::sync::LazyLock<Regex> =
    std::sync::LazyLock::new(|| Regex::new(r"data\s*:\s*\{([^}]+)\}").unwrap());
static DATA_ENTRY_RE: std::sync::LazyLock<Regex> =
    std::sync::LazyLock::new(|| Regex::new(r"'([^']+)'\s*:\s*(?:'([^']*)'|([A-Za-z_]\w*)|(\d+))").unwrap());
static TITLE_RE: std::sync::LazyLock<Regex> =
    std::sync::LazyLock::new(|| Regex::new(r"<title>([^<]+?)(?:\s*-\s*蓝奏云)?</title>").unwrap());
static FOLDER_PARAM_RE: std::sync::LazyLock<Regex> =
    std::sync::LazyLock::new(|| Regex::new(r"'fid'\s*:\s*(\d+)").unwrap());

#[derive(Debug, Deserialize)]
struct AjaxResponse {
    zt: i64,
    #[serde(default)]
    dom: String,
    #[serde(default)]
    url: serde_json::Value,
    #[serde(default)]
    inf: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct FolderListResponse {
    zt: i64,
    #[serde(default)]
    text: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct FolderEntry {
    id: String,
    name_all: String,
}

/// 蓝奏云解析驱动。分享页没有开放接口，全部流程为对页面脚本的逆向：
/// 反爬 Cookie 计算、密码表单/iframe 两种页面形态、以及最终一跳
/// 不重定向请求取 Location。
pub struct LanzouDriver {
    http: Arc<RobustClient>,
    /// 终点请求禁止自动重定向，Location 头即真实直链。
    bare: reqwest::Client,
    domain: String,
    preferred: Vec<Format>,
}

impl LanzouDriver {
    pub fn new(config: Arc<AppConfig>, http: Arc<RobustClient>) -> AppResult<Self> {
        let domain = config
            .drive_properties
            .get("domain")
            .cloned()
            .unwrap_or_else(|| consts::DEFAULT_DOMAIN.to_string());
        let bare = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(redirect::Policy::none())
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            http,
            bare,
            domain: domain.trim_end_matches('/').to_string(),
            preferred: config.formats.clone(),
        })
    }

    /// 取分享页正文；遇到 JS 挑战则计算 `acw_sc__v2` 后带 Cookie 重试一次。
    async fn fetch_share_page(&self, url: &str) -> AppResult<String> {
        let text = self.http.get_text(url).await?;
        let text = if text.contains(consts::CHALLENGE_MARKER) && text.contains("arg1") {
            debug!("命中反爬挑战页，计算放行 Cookie");
            let cookie = obfuscate::challenge_cookie(&text)?;
            let res = self
                .http
                .client
                .get(url)
                .header(header::COOKIE, format!("acw_sc__v2={}", cookie))
                .send()
                .await?
                .error_for_status()?;
            res.text().await?
        } else {
            text
        };

        if consts::NOT_EXIST_MARKERS.iter().any(|m| text.contains(m)) {
            return Err(AppError::NotFound(url.to_string()));
        }
        Ok(text)
    }

    /// 把任意镜像域名的分享链接归一到配置域名下。
    fn canonical_url(&self, share_link: &str) -> AppResult<String> {
        let url = url::Url::parse(share_link)
            .map_err(|_| AppError::InvalidShare(share_link.to_string()))?;
        Ok(format!("{}{}", self.domain, url.path()))
    }

    fn page_title(page: &str) -> Option<String> {
        TITLE_RE
            .captures(page)
            .map(|caps| caps[1].trim().to_string())
            .filter(|t| !t.is_empty())
    }

    async fn resolve_single(
        &self,
        page: &str,
        passcode: &str,
        referer: &str,
    ) -> AppResult<Share> {
        let (ajax_path, body) = if let Some(caps) = PASSWORD_DATA_RE.captures(page) {
            // 密码表单：data 片段以 "...&p=" 结尾，补上提取码提交
            let fragment = caps[1].to_string();
            let ajax_path = Self::extract_ajax_path(page)?;
            (ajax_path, format!("{}{}", fragment, encode_form_value(passcode)))
        } else if let Some(caps) = IFRAME_RE.captures(page) {
            // 无密码 iframe：进入内嵌页，把脚本变量代回 POST 模板
            let frame_url = format!("{}{}", self.domain, &caps[1]);
            let frame_page = self.http.get_text(&frame_url).await?;
            let vars = parse_inline_vars(&frame_page);
            let ajax_path = Self::extract_ajax_path(&frame_page)?;
            (ajax_path, build_form_body(&frame_page, &vars)?)
        } else {
            return Err(AppError::InvalidShare(format!(
                "无法识别的分享页面形态: {}",
                referer
            )));
        };

        let response: AjaxResponse = self
            .http
            .client
            .post(format!("{}{}", self.domain, ajax_path))
            .header(header::REFERER, referer)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header("X-Requested-With", "XMLHttpRequest")
            .body(body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.zt != 1 {
            let inf = response.inf.as_str().unwrap_or_default().to_string();
            return if inf.contains("密码") {
                Err(AppError::WrongPasscode(referer.to_string()))
            } else {
                Err(AppError::InvalidShare(format!("{}: {}", referer, inf)))
            };
        }

        let code = response
            .url
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AppError::InvalidShare("接口未返回跳转描述".to_string()))?;
        let direct_url = self
            .follow_redirect_descriptor(&response.dom, &code)
            .await?;

        // 密码分支的 inf 字段即文件名；iframe 分支回退到分享页标题
        let file_name = response
            .inf
            .as_str()
            .map(str::to_string)
            .filter(|s| !s.is_empty())
            .or_else(|| Self::page_title(page))
            .unwrap_or_else(|| "download".to_string());

        Ok(Share {
            file_name,
            url: direct_url,
            size: None,
            properties: HashMap::from([("referer".to_string(), referer.to_string())]),
        })
    }

    fn extract_ajax_path(page: &str) -> AppResult<String> {
        AJAX_URL_RE
            .captures(page)
            .map(|caps| caps[1].to_string())
            .ok_or_else(|| AppError::InvalidShare("页面中未找到提交地址".to_string()))
    }

    /// 对 `{dom}/file/{code}` 做一次不重定向 GET，Location 头即真实直链。
    async fn follow_redirect_descriptor(&self, dom: &str, code: &str) -> AppResult<String> {
        let url = format!("{}/file/{}", dom.trim_end_matches('/'), code);
        let res = self
            .bare
            .get(&url)
            .header(header::ACCEPT_LANGUAGE, "zh-CN,zh;q=0.9")
            .send()
            .await?;

        if res.status().is_redirection() {
            let location = res
                .headers()
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| AppError::InvalidShare("重定向缺少 Location 头".to_string()))?;
            return Ok(location.to_string());
        }

        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        if body.contains(consts::RATE_LIMIT_MARKER) {
            return Err(AppError::TooManyRequests);
        }
        Err(AppError::InvalidShare(format!(
            "终点请求未返回重定向 (HTTP {})",
            status
        )))
    }

    /// 目录分享：走列表接口枚举子项，再逐个解析文件分享。
    async fn resolve_folder(&self, page: &str, passcode: &str, referer: &str) -> AppResult<Vec<Share>> {
        let fid = FOLDER_PARAM_RE
            .captures(page)
            .map(|caps| caps[1].to_string())
            .ok_or_else(|| AppError::InvalidShare("目录页面缺少 fid 参数".to_string()))?;
        let vars = parse_inline_vars(page);
        let uid = vars.get("uid").cloned().unwrap_or_default();
        let t = vars.get("t").cloned().unwrap_or_default();
        let k = vars.get("k").cloned().unwrap_or_default();

        let mut entries: Vec<FolderEntry> = Vec::new();
        for pg in 1..=64 {
            let body = format!(
                "lx=2&fid={}&uid={}&pg={}&rep=0&t={}&k={}&up=1&vip=0&webfoldersign=&pwd={}",
                fid,
                uid,
                pg,
                t,
                k,
                encode_form_value(passcode)
            );
            let response: FolderListResponse = self
                .http
                .client
                .post(format!("{}{}", self.domain, consts::FOLDER_AJAX_PATH))
                .header(header::REFERER, referer)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(body)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            if response.zt != 1 {
                break;
            }
            let batch: Vec<FolderEntry> =
                serde_json::from_value(response.text).unwrap_or_default();
            if batch.is_empty() {
                break;
            }
            entries.extend(batch);
        }

        if entries.is_empty() {
            return Err(AppError::NotFound(referer.to_string()));
        }
        info!("目录分享包含 {} 个子项", entries.len());

        // 优先解析命中配置格式的子项，其余照常返回，由上层过滤取舍
        entries.sort_by_key(|entry| {
            match Format::from_file_name(&entry.name_all) {
                Some(format) if self.preferred.contains(&format) => 0,
                Some(_) => 1,
                None => 2,
            }
        });

        let mut shares = Vec::new();
        for entry in entries {
            let child_url = format!("{}/{}", self.domain, entry.id.trim_start_matches('/'));
            match self.resolve(&child_url, "").await {
                Ok(mut child_shares) => shares.append(&mut child_shares),
                Err(e @ (AppError::NotFound(_) | AppError::FileNotExist(_))) => {
                    warn!("目录子项 '{}' 已失效，跳过: {}", entry.name_all, e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(shares)
    }
}

#[async_trait]
impl Driver for LanzouDriver {
    fn source(&self) -> DriveSource {
        DriveSource::Lanzou
    }

    async fn resolve(&self, share_link: &str, passcode: &str) -> AppResult<Vec<Share>> {
        let url = self.canonical_url(share_link)?;
        let page = self.fetch_share_page(&url).await?;

        if page.contains(consts::FOLDER_AJAX_PATH) {
            self.resolve_folder(&page, passcode, &url).await
        } else {
            Ok(vec![self.resolve_single(&page, passcode, &url).await?])
        }
    }

    async fn download(&self, share: &Share) -> AppResult<(ByteStream, u64)> {
        let mut request = self.http.client.get(&share.url);
        if let Ok(referer) = share.property("referer") {
            request = request.header(header::REFERER, referer.to_string());
        }
        let res = request.send().await?;
        if res.status() == StatusCode::NOT_FOUND {
            return Err(AppError::FileNotExist(share.file_name.clone()));
        }
        let res = res.error_for_status()?;
        let total = res.content_length().unwrap_or(0);
        Ok((Box::pin(res.bytes_stream()), total))
    }
}

/// 收集页面脚本里的 `var x = 'y';` 赋值。
fn parse_inline_vars(page: &str) -> HashMap<String, String> {
    VAR_RE
        .captures_iter(page)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        .collect()
}

/// 把脚本中的 POST 模板 `data : { 'k':v, ... }` 重建为表单体。
/// 带引号的值原样保留，裸标识符回查变量表，数字字面量原样透传。
fn build_form_body(page: &str, vars: &HashMap<String, String>) -> AppResult<String> {
    let template = DATA_TEMPLATE_RE
        .captures(page)
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| AppError::InvalidShare("页面中未找到提交模板".to_string()))?;

    let mut pairs = Vec::new();
    for caps in DATA_ENTRY_RE.captures_iter(&template) {
        let key = caps[1].to_string();
        let value = if let Some(literal) = caps.get(2) {
            literal.as_str().to_string()
        } else if let Some(ident) = caps.get(3) {
            vars.get(ident.as_str()).cloned().ok_or_else(|| {
                AppError::InvalidShare(format!("提交模板引用了未定义变量 '{}'", ident.as_str()))
            })?
        } else {
            caps[4].to_string()
        };
        pairs.push((key, value));
    }
    if pairs.is_empty() {
        return Err(AppError::InvalidShare("提交模板为空".to_string()));
    }
    Ok(pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, encode_form_value(v)))
        .collect::<Vec<_>>()
        .join("&"))
}

fn encode_form_value(value: &str) -> String {
    utf8_percent_encode(value, NON_ALPHANUMERIC).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inline_vars() {
        let page = r"<script>var ajaxdata = 'hW92';var wsk_sign = 'abc_1';ajax({});</script>";
        let vars = parse_inline_vars(page);
        assert_eq!(vars.get("ajaxdata").map(String::as_str), Some("hW92"));
        assert_eq!(vars.get("wsk_sign").map(String::as_str), Some("abc_1"));
    }

    #[test]
    fn test_build_form_body_substitutes_vars() {
        let page = r"<script>
            var ajaxdata = 'hW92';
            var wp_sign = 'VmZk_aa';
            $.ajax({
                type : 'post',
                url : '/ajaxm.php?file=123',
                data : { 'action':'downprocess','signs':ajaxdata,'sign':wp_sign,'ves':1 },
            });
        </script>";
        let vars = parse_inline_vars(page);
        let body = build_form_body(page, &vars).unwrap();
        assert_eq!(body, "action=downprocess&signs=hW92&sign=VmZk%5Faa&ves=1");
    }

    #[test]
    fn test_build_form_body_missing_var_is_invalid_share() {
        let page = r"data : { 'action':'downprocess','sign':missing_var }";
        assert!(matches!(
            build_form_body(page, &HashMap::new()),
            Err(AppError::InvalidShare(_))
        ));
    }

    #[test]
    fn test_page_title_strips_site_suffix() {
        let page = "<title>三体.epub - 蓝奏云</title>";
        assert_eq!(LanzouDriver::page_title(page).as_deref(), Some("三体.epub"));
    }
}
