// tests/aliyun_auth_test.rs

use book_dl::{
    client::RobustClient,
    config::AppConfig,
    config::session,
    drive::aliyun::{AccessToken, AliyunAuth},
    error::AppError,
};
use chrono::{Duration, Utc};
use std::sync::Arc;

fn test_config(config_root: &std::path::Path) -> Arc<AppConfig> {
    Arc::new(AppConfig {
        config_root: config_root.to_path_buf(),
        ..AppConfig::default()
    })
}

fn token_expiring_in(minutes: i64) -> AccessToken {
    AccessToken {
        access_token: "cached-access".to_string(),
        refresh_token: "cached-refresh".to_string(),
        expire_time: Utc::now() + Duration::minutes(minutes),
    }
}

/// 刷新时机：距过期 5 分钟（小于 10 分钟窗口）的凭据在下一次
/// 取用前必须先刷新。
#[tokio::test]
async fn test_stale_token_triggers_refresh() {
    // --- 1. Arrange ---
    let mut server = mockito::Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let expire_time = (Utc::now() + Duration::hours(2)).to_rfc3339();
    let refresh_mock = server
        .mock("POST", "/v2/account/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(format!(
            r#"{{"access_token":"fresh-access","refresh_token":"rotated-refresh","expire_time":"{}"}}"#,
            expire_time
        ))
        .expect(1)
        .create_async()
        .await;

    let http = Arc::new(RobustClient::new(config.clone()).unwrap());
    let auth = AliyunAuth::with_bases(&config, http, &server.url(), &server.url());
    auth.prime_token(token_expiring_in(5)).await;

    // --- 2. Act ---
    let token = auth.current_token().await.unwrap();

    // --- 3. Assert ---
    assert_eq!(token, "fresh-access", "陈旧凭据必须先刷新再使用");
    refresh_mock.assert_async().await;
    // 轮换后的 Refresh Token 落盘
    assert_eq!(
        session::load_refresh_token(dir.path()),
        Some("rotated-refresh".to_string())
    );
}

/// 距过期 15 分钟的凭据仍然新鲜，不触发刷新。
#[tokio::test]
async fn test_fresh_token_is_used_without_refresh() {
    let mut server = mockito::Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let refresh_mock = server
        .mock("POST", "/v2/account/token")
        .expect(0)
        .create_async()
        .await;

    let http = Arc::new(RobustClient::new(config.clone()).unwrap());
    let auth = AliyunAuth::with_bases(&config, http, &server.url(), &server.url());
    auth.prime_token(token_expiring_in(15)).await;

    let token = auth.current_token().await.unwrap();

    assert_eq!(token, "cached-access");
    refresh_mock.assert_async().await;
}

/// 已授权实例的刷新失败是致命错误，不得用同一凭据重试。
#[tokio::test]
async fn test_refresh_failure_is_fatal() {
    let mut server = mockito::Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let refresh_mock = server
        .mock("POST", "/v2/account/token")
        .with_status(400)
        .with_header("content-type", "application/json")
        .with_body(r#"{"code":"InvalidParameter.RefreshToken","message":"refresh token invalid"}"#)
        .expect(1)
        .create_async()
        .await;

    let http = Arc::new(RobustClient::new(config.clone()).unwrap());
    let auth = AliyunAuth::with_bases(&config, http, &server.url(), &server.url());
    auth.prime_token(token_expiring_in(5)).await;

    let err = auth.current_token().await.expect_err("刷新失败必须上抛");
    assert!(matches!(err, AppError::TokenInvalid), "错误应为 TokenInvalid: {}", err);
    refresh_mock.assert_async().await;
}

/// 首次取用走会话文件中的 Refresh Token。
#[tokio::test]
async fn test_bootstrap_from_session_file() {
    let mut server = mockito::Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    session::save_refresh_token(dir.path(), "seeded-refresh").unwrap();

    let expire_time = (Utc::now() + Duration::hours(2)).to_rfc3339();
    let refresh_mock = server
        .mock("POST", "/v2/account/token")
        .match_body(mockito::Matcher::PartialJsonString(
            r#"{"refresh_token":"seeded-refresh","grant_type":"refresh_token"}"#.to_string(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(format!(
            r#"{{"access_token":"boot-access","refresh_token":"boot-refresh","expire_time":"{}"}}"#,
            expire_time
        ))
        .expect(1)
        .create_async()
        .await;

    let http = Arc::new(RobustClient::new(config.clone()).unwrap());
    let auth = AliyunAuth::with_bases(&config, http, &server.url(), &server.url());

    let token = auth.current_token().await.unwrap();
    assert_eq!(token, "boot-access");
    refresh_mock.assert_async().await;

    // 同一实例再次取用：凭据仍新鲜，不再发请求
    let token = auth.current_token().await.unwrap();
    assert_eq!(token, "boot-access");
}
