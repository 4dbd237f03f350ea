// src/config/config_manager.rs

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::model::Size;
use crate::sync::SyncCapabilities;

pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// 单个 bidder 的配置（对应宿主 `config.getConfig(bidderCode)`）
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BidderSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 每个请求体的最大广告位数
    #[serde(default)]
    pub chunk_size: Option<usize>,
    /// 覆盖默认的竞价地址
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub ttl: Option<u32>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub outstream_player_url: Option<String>,
    /// 客户端事件上报地址，未配置时不上报
    #[serde(default)]
    pub event_url: Option<String>,
    /// 宿主对所有出价都设置定向时为 true，此时不再上报 set-targeting 事件
    #[serde(default)]
    pub send_all_bids: bool,
}

impl Default for BidderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            chunk_size: None,
            endpoint: None,
            ttl: None,
            currency: None,
            outstream_player_url: None,
            event_url: None,
            send_all_bids: false,
        }
    }
}

/// 分析 adapter 的启用参数
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsOptions {
    #[serde(default)]
    pub publisher_id: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    /// 上报协议，缺省 https；本地 mock 用 http
    #[serde(default)]
    pub scheme: Option<String>,
    #[serde(default)]
    pub screen: Option<Size>,
    #[serde(default)]
    pub intersection_observer: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigData {
    #[serde(default)]
    pub bidders: HashMap<String, BidderSettings>,
    #[serde(default)]
    pub analytics: Option<AnalyticsOptions>,
    #[serde(default)]
    pub user_sync: SyncCapabilities,
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
}

impl Default for ConfigData {
    fn default() -> Self {
        Self {
            bidders: HashMap::new(),
            analytics: None,
            user_sync: SyncCapabilities::default(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

/// **配置管理器**，运行期可整体替换
#[derive(Debug, Default)]
pub struct ConfigManager {
    data: RwLock<ConfigData>,
}

impl ConfigManager {
    pub fn new(data: ConfigData) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }

    pub fn update(&self, data: ConfigData) {
        let mut guard = self.data.write().unwrap_or_else(|e| e.into_inner());
        *guard = data;
    }

    pub fn snapshot(&self) -> ConfigData {
        self.data.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// 先按完整 bidder code 查找，再按 `_` 之前的基础 code 查找
    pub fn bidder_settings(&self, bidder_code: &str) -> BidderSettings {
        let data = self.data.read().unwrap_or_else(|e| e.into_inner());
        let base = bidder_code.split('_').next().unwrap_or(bidder_code);
        data.bidders
            .get(bidder_code)
            .or_else(|| data.bidders.get(base))
            .cloned()
            .unwrap_or_default()
    }

    pub fn timeout_ms(&self) -> u64 {
        self.data.read().unwrap_or_else(|e| e.into_inner()).timeout_ms
    }

    pub fn user_sync(&self) -> SyncCapabilities {
        self.data.read().unwrap_or_else(|e| e.into_inner()).user_sync
    }

    pub fn analytics(&self) -> Option<AnalyticsOptions> {
        self.data.read().unwrap_or_else(|e| e.into_inner()).analytics.clone()
    }
}
