//! 参数解析工具

use anyhow::{Context, Result, bail};

/// 解析 CAN ID：`0x123` / `123h` 按十六进制，其余按十进制
pub fn parse_can_id(s: &str) -> Result<u32> {
    let s = s.trim();
    let (digits, radix) = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        (hex, 16)
    } else if let Some(hex) = s.strip_suffix('h') {
        (hex, 16)
    } else {
        (s, 10)
    };
    u32::from_str_radix(digits, radix).with_context(|| format!("无效的 CAN ID '{}'", s))
}

/// 解析十六进制字节串，允许空格 / `:` / `-` 分隔（例如 `01 02 0A` 或 `01:02:0a`）
pub fn parse_hex_bytes(s: &str) -> Result<Vec<u8>> {
    let compact: String = s
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != '-')
        .collect();
    if compact.is_empty() {
        bail!("数据为空");
    }
    hex::decode(&compact).with_context(|| format!("无效的十六进制数据 '{}'", s))
}

/// `01 02 0A` 形式输出
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
