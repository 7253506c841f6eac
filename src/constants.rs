// src/constants.rs

pub const UI_WIDTH: usize = 88;
pub const MAX_FILENAME_BYTES: usize = 200;
pub const CONFIG_DIR_NAME: &str = concat!(".", clap::crate_name!());
pub const CONFIG_FILE_NAME: &str = "config.json";
pub const LOG_FILE_NAME: &str = "book-dl.log";
pub const LOG_FALLBACK_FILE_NAME: &str = "fallback.log";
pub const ALIYUN_SESSION_FILE_NAME: &str = "aliyun.session";
pub const DEFAULT_SAVE_DIR: &str = "downloads";
pub const DEFAULT_FORMATS: &str = "epub";
pub const DEFAULT_THREADS: usize = 3;
pub const DEFAULT_RATE_PER_MINUTE: u32 = 60;
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Access Token 过期前的提前刷新窗口（分钟）。
pub const TOKEN_REFRESH_SKEW_MINUTES: i64 = 10;
/// 扫码状态轮询间隔（秒）。
pub const QR_POLL_INTERVAL_SECS: u64 = 1;

pub mod aliyun {
    pub const AUTH_BASE: &str = "https://auth.aliyundrive.com";
    pub const API_BASE: &str = "https://api.aliyundrive.com";
    pub const PASSPORT_BASE: &str = "https://passport.aliyundrive.com";
    pub const TOKEN_PATH: &str = "/v2/account/token";
    pub const QR_GENERATE_PATH: &str =
        "/newlogin/qrcode/generate.do?appName=aliyun_drive&fromSite=52&appEntrance=web&isMobile=false";
    pub const QR_QUERY_PATH: &str = "/newlogin/qrcode/query.do";
    pub const SHARE_TOKEN_PATH: &str = "/v2/share_link/get_share_token";
    pub const FILE_LIST_PATH: &str = "/adrive/v3/file/list";
    pub const DOWNLOAD_URL_PATH: &str = "/v2/file/get_share_link_download_url";
    /// 空 JSON 体必须以显式置空的 content-type 发送（上游接口的历史包袱），
    /// 构造请求时挂上此标记头，统一在出站钩子处替换。
    pub const BLANK_BODY_MARKER: &str = "x-blank-content-type";
}

pub mod lanzou {
    pub const DEFAULT_DOMAIN: &str = "https://www.lanzoux.com";
    pub const FOLDER_AJAX_PATH: &str = "/filemoreajax.php";
    /// JS 反爬挑战页的特征串。
    pub const CHALLENGE_MARKER: &str = "acw_sc__v2";
    pub const NOT_EXIST_MARKERS: [&str; 2] = ["文件取消分享了", "文件不存在"];
    pub const RATE_LIMIT_MARKER: &str = "网络异常";
}

pub mod sobooks {
    pub const BASE_URL: &str = "https://sobooks.cc";
}
