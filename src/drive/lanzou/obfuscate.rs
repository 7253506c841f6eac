// src/drive/lanzou/obfuscate.rs
//
// 目标站点的 JS 反爬挑战：页面内嵌一段混淆脚本，把 40 位十六进制的
// `arg1` 按固定位置表重排，再与固定掩码逐字节异或，结果作为
// `acw_sc__v2` Cookie 放行后续请求。这里是该变换的逆向实现。

use crate::error::*;
use regex::Regex;
use std::sync::LazyLock;

/// 重排位置表（1-based），第 i 个输出字符取自 arg1 的第 TABLE[i] 位。
const POSITION_TABLE: [usize; 40] = [
    15, 35, 29, 24, 33, 16, 1, 38, 10, 9, 19, 31, 40, 27, 22, 23, 25, 13, 6, 11, 39, 18, 20, 8,
    14, 21, 32, 26, 2, 30, 7, 4, 17, 5, 3, 28, 34, 37, 12, 36,
];

/// 异或掩码，40 位十六进制常量。
const XOR_MASK: &str = "3000176000856006061501533003690027800375";

static ARG1_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"arg1\s*=\s*'([0-9A-Fa-f]{40})'").unwrap());

/// 从挑战页面提取 arg1 并计算 `acw_sc__v2` 的值。
pub fn challenge_cookie(page: &str) -> AppResult<String> {
    let arg1 = ARG1_RE
        .captures(page)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| AppError::InvalidShare("挑战页面中未找到 arg1".to_string()))?;
    descramble(arg1)
}

/// 重排 + 异或，输出小写十六进制。
pub fn descramble(arg1: &str) -> AppResult<String> {
    let reordered = unscramble(arg1)?;
    hex_xor(&reordered, XOR_MASK)
}

fn unscramble(arg1: &str) -> AppResult<String> {
    let chars: Vec<char> = arg1.chars().collect();
    if chars.len() < POSITION_TABLE.len() {
        return Err(AppError::InvalidShare(format!(
            "arg1 长度不足: {} < {}",
            chars.len(),
            POSITION_TABLE.len()
        )));
    }
    Ok(POSITION_TABLE.iter().map(|&pos| chars[pos - 1]).collect())
}

fn hex_xor(a: &str, b: &str) -> AppResult<String> {
    let lhs = hex::decode(a)
        .map_err(|e| AppError::InvalidShare(format!("arg1 不是合法十六进制: {}", e)))?;
    let rhs = hex::decode(b)
        .map_err(|e| AppError::InvalidShare(format!("掩码不是合法十六进制: {}", e)))?;
    let xored: Vec<u8> = lhs.iter().zip(rhs.iter()).map(|(x, y)| x ^ y).collect();
    Ok(hex::encode(xored))
}

#[cfg(test)]
mod tests {
    use super::*;

    // 取自一次真实会话抓包的样本，期望值为当时服务端放行的 Cookie。
    const CAPTURED_ARG1: &str = "7DAD0021F4BC06144B6DE07D1344E73F6EF9D92E";
    const CAPTURED_COOKIE: &str = "2fed73194fe68401161e2a825ef0be2d6724eebc";

    #[test]
    fn test_descramble_matches_captured_session() {
        assert_eq!(descramble(CAPTURED_ARG1).unwrap(), CAPTURED_COOKIE);
    }

    #[test]
    fn test_unscramble_reorders_by_table() {
        let reordered = unscramble(CAPTURED_ARG1).unwrap();
        assert_eq!(reordered, "1FED64794F63E407100B2BD16EF3D72D40A4EDC9");
    }

    #[test]
    fn test_challenge_cookie_extracts_arg1_from_page() {
        let page = format!(
            "<html><script>var arg1='{}';document.cookie= ...</script></html>",
            CAPTURED_ARG1
        );
        assert_eq!(challenge_cookie(&page).unwrap(), CAPTURED_COOKIE);
    }

    #[test]
    fn test_second_sample() {
        assert_eq!(
            descramble("0A1B2C3D4E5F60718293A4B5C6D7E8F901234567").unwrap(),
            "42e51665e41a1d4dc0d0636e3a95c13ba5971786"
        );
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(descramble("tooshort").is_err());
        assert!(challenge_cookie("<html>no challenge here</html>").is_err());
    }
}
