// src/sync/user_sync.rs

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// 宿主声明的同步能力
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncCapabilities {
    #[serde(default)]
    pub iframe_enabled: bool,
    #[serde(default)]
    pub pixel_enabled: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SyncType {
    Iframe,
    Image,
}

/// 供应商下发的 cookie 同步地址
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserSync {
    #[serde(rename = "type")]
    pub sync_type: SyncType,
    pub url: String,
}

impl UserSync {
    pub fn new(sync_type: SyncType, url: &str) -> Self {
        Self {
            sync_type,
            url: url.to_string(),
        }
    }
}

impl SyncCapabilities {
    pub fn permits(&self, sync_type: SyncType) -> bool {
        match sync_type {
            SyncType::Iframe => self.iframe_enabled,
            SyncType::Image => self.pixel_enabled,
        }
    }
}

/// 只保留当前允许类型的同步地址，顺序不变
pub fn filter_sync_urls(capabilities: &SyncCapabilities, urls: &[UserSync]) -> Vec<UserSync> {
    urls.iter()
        .filter(|sync| capabilities.permits(sync.sync_type))
        .cloned()
        .collect()
}

/// 页面级去重：同一地址只同步一次
#[derive(Debug, Default)]
pub struct SyncCache {
    seen: HashSet<String>,
}

impl SyncCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 返回尚未同步过的地址，并记为已同步
    pub fn take_new(&mut self, syncs: Vec<UserSync>) -> Vec<UserSync> {
        syncs
            .into_iter()
            .filter(|sync| self.seen.insert(sync.url.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptors() -> Vec<UserSync> {
        serde_json::from_value(json!([
            {"type": "iframe", "url": "a"},
            {"type": "image", "url": "b"}
        ]))
        .unwrap()
    }

    #[test]
    fn iframe_only() {
        let caps = SyncCapabilities { iframe_enabled: true, pixel_enabled: false };
        let urls: Vec<_> = filter_sync_urls(&caps, &descriptors()).into_iter().map(|s| s.url).collect();
        assert_eq!(urls, vec!["a"]);
    }

    #[test]
    fn pixel_only() {
        let caps = SyncCapabilities { iframe_enabled: false, pixel_enabled: true };
        let urls: Vec<_> = filter_sync_urls(&caps, &descriptors()).into_iter().map(|s| s.url).collect();
        assert_eq!(urls, vec!["b"]);
    }

    #[test]
    fn no_capabilities_no_syncs() {
        assert!(filter_sync_urls(&SyncCapabilities::default(), &descriptors()).is_empty());
    }

    #[test]
    fn both_capabilities_keep_everything() {
        let caps = SyncCapabilities { iframe_enabled: true, pixel_enabled: true };
        assert_eq!(filter_sync_urls(&caps, &descriptors()), descriptors());
    }

    #[test]
    fn cache_skips_seen_urls() {
        let mut cache = SyncCache::new();
        assert_eq!(cache.take_new(descriptors()).len(), 2);
        let again = cache.take_new(vec![UserSync::new(SyncType::Image, "b"), UserSync::new(SyncType::Image, "c")]);
        assert_eq!(again, vec![UserSync::new(SyncType::Image, "c")]);
    }
}
