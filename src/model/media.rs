// src/model/media.rs

use serde::{Deserialize, Serialize};
use std::fmt;

/// 广告媒体类型
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Banner,
    Video,
    Native,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Banner => "banner",
            MediaType::Video => "video",
            MediaType::Native => "native",
        }
    }

    /// 宽松解析供应商返回的 mediaType 字符串，未知值返回 None
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "banner" | "display" => Some(MediaType::Banner),
            "video" => Some(MediaType::Video),
            "native" => Some(MediaType::Native),
            _ => None,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 视频播放上下文
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VideoContext {
    Instream,
    Outstream,
    Adpod,
}

/// 广告尺寸，序列化为 `[w, h]`
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(from = "[u32; 2]", into = "[u32; 2]")]
pub struct Size {
    pub w: u32,
    pub h: u32,
}

impl Size {
    pub fn new(w: u32, h: u32) -> Self {
        Self { w, h }
    }

    pub fn area(&self) -> u64 {
        self.w as u64 * self.h as u64
    }
}

impl From<[u32; 2]> for Size {
    fn from(value: [u32; 2]) -> Self {
        Size { w: value[0], h: value[1] }
    }
}

impl From<Size> for [u32; 2] {
    fn from(size: Size) -> Self {
        [size.w, size.h]
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.w, self.h)
    }
}

/// 将尺寸列表转换为 "WxH" 字符串列表
pub fn parse_sizes_input(sizes: &[Size]) -> Vec<String> {
    sizes.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_serializes_as_pair() {
        let size = Size::new(300, 250);
        assert_eq!(serde_json::to_string(&size).unwrap(), "[300,250]");
        let parsed: Size = serde_json::from_str("[728,90]").unwrap();
        assert_eq!(parsed, Size::new(728, 90));
    }

    #[test]
    fn media_type_parse_accepts_display_alias() {
        assert_eq!(MediaType::parse("display"), Some(MediaType::Banner));
        assert_eq!(MediaType::parse("VIDEO"), Some(MediaType::Video));
        assert_eq!(MediaType::parse("audio"), None);
    }

    #[test]
    fn sizes_join_as_wxh() {
        let sizes = [Size::new(300, 250), Size::new(728, 90)];
        assert_eq!(parse_sizes_input(&sizes), vec!["300x250", "728x90"]);
    }
}
