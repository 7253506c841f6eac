// src/models.rs

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// 可下载的电子书格式，封闭枚举。
/// 配置中出现此枚举之外的扩展名属于启动期致命错误。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Epub,
    Mobi,
    Azw,
    Azw3,
    Pdf,
    Txt,
    Zip,
    Rar,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Epub => "epub",
            Format::Mobi => "mobi",
            Format::Azw => "azw",
            Format::Azw3 => "azw3",
            Format::Pdf => "pdf",
            Format::Txt => "txt",
            Format::Zip => "zip",
            Format::Rar => "rar",
        }
    }

    /// 按文件名的扩展名识别格式，识别不了返回 None。
    pub fn from_file_name(name: &str) -> Option<Format> {
        let ext = Path::new(name).extension()?.to_str()?.to_lowercase();
        ext.parse().ok()
    }

    /// 解析逗号分隔的格式清单（如 "epub,pdf"），重复项去重并保序。
    pub fn parse_list(list: &str) -> AppResult<Vec<Format>> {
        let mut formats = Vec::new();
        for part in list.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()) {
            let format: Format = part.parse()?;
            if !formats.contains(&format) {
                formats.push(format);
            }
        }
        if formats.is_empty() {
            return Err(AppError::Config("格式清单为空".to_string()));
        }
        Ok(formats)
    }
}

impl FromStr for Format {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "epub" => Ok(Format::Epub),
            "mobi" => Ok(Format::Mobi),
            "azw" => Ok(Format::Azw),
            "azw3" => Ok(Format::Azw3),
            "pdf" => Ok(Format::Pdf),
            "txt" => Ok(Format::Txt),
            "zip" => Ok(Format::Zip),
            "rar" => Ok(Format::Rar),
            other => Err(AppError::Config(format!(
                "无效的格式 '{}'，可选: epub, mobi, azw, azw3, pdf, txt, zip, rar",
                other
            ))),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 网盘后端标识。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriveSource {
    Aliyun,
    Lanzou,
    Telecom,
    Direct,
}

impl DriveSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriveSource::Aliyun => "aliyun",
            DriveSource::Lanzou => "lanzou",
            DriveSource::Telecom => "telecom",
            DriveSource::Direct => "direct",
        }
    }
}

impl FromStr for DriveSource {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "aliyun" => Ok(DriveSource::Aliyun),
            "lanzou" => Ok(DriveSource::Lanzou),
            "telecom" => Ok(DriveSource::Telecom),
            "direct" => Ok(DriveSource::Direct),
            other => Err(AppError::Config(format!(
                "无效的网盘驱动 '{}'，可选: aliyun, lanzou, telecom",
                other
            ))),
        }
    }
}

impl fmt::Display for DriveSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一个已解析、可直接下载的文件描述。
/// `properties` 携带后端私有的定位信息（share_id / file_id 等），
/// 只有产生它的驱动才会再读取。
#[derive(Debug, Clone, Default)]
pub struct Share {
    pub file_name: String,
    pub url: String,
    pub size: Option<u64>,
    pub properties: HashMap<String, String>,
}

impl Share {
    pub fn format(&self) -> Option<Format> {
        Format::from_file_name(&self.file_name)
    }

    pub fn property(&self, key: &str) -> AppResult<&str> {
        self.properties
            .get(key)
            .map(|s| s.as_str())
            .ok_or_else(|| AppError::InvalidShare(format!("缺少属性 '{}'", key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parse_list() {
        // 基本解析、去重、保序
        assert_eq!(
            Format::parse_list("epub, pdf,epub").unwrap(),
            vec![Format::Epub, Format::Pdf]
        );

        // 无效格式是配置错误
        assert!(matches!(
            Format::parse_list("epub,doc"),
            Err(AppError::Config(_))
        ));

        // 空清单
        assert!(Format::parse_list(" , ").is_err());
    }

    #[test]
    fn test_format_from_file_name() {
        assert_eq!(Format::from_file_name("三体.EPUB"), Some(Format::Epub));
        assert_eq!(Format::from_file_name("三体.azw3"), Some(Format::Azw3));
        assert_eq!(Format::from_file_name("readme"), None);
        assert_eq!(Format::from_file_name("cover.jpg"), None);
    }

    #[test]
    fn test_drive_source_round_trip() {
        for s in ["aliyun", "lanzou", "telecom", "direct"] {
            assert_eq!(s.parse::<DriveSource>().unwrap().as_str(), s);
        }
        assert!("baidu".parse::<DriveSource>().is_err());
    }
}
