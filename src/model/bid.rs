// src/model/bid.rs

use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::sync::Arc;

use crate::model::media::{MediaType, VideoContext};
use crate::render::RendererHandle;

pub const DEFAULT_CURRENCY: &str = "USD";
pub const DEFAULT_TTL: u32 = 300;

/// 三位大写字母货币代码
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn parse(code: &str) -> Option<Self> {
        let code = code.trim();
        if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
            Some(Currency(code.to_ascii_uppercase()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Currency {
    fn default() -> Self {
        Currency(DEFAULT_CURRENCY.to_string())
    }
}

impl TryFrom<String> for Currency {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Currency::parse(&value).ok_or_else(|| format!("Invalid currency code: {}", value))
    }
}

impl From<Currency> for String {
    fn from(c: Currency) -> Self {
        c.0
    }
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BidMeta {
    pub advertiser_domains: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_cat_id: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VideoMeta {
    pub context: VideoContext,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u32>,
}

/// **交给宿主拍卖的标准化出价**
///
/// 不变量：`cpm` 有限且非负，`currency` 为三位代码，`ttl > 0`，
/// `request_id` 等于其对应 BidRequest 的关联 ID。交出后不再修改。
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalBid {
    pub request_id: String,
    pub ad_unit_code: String,
    pub cpm: f64,
    pub currency: Currency,
    pub ttl: u32,
    pub media_type: MediaType,
    pub net_revenue: bool,
    pub creative_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ad: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ad_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vast_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vast_xml: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deal_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoMeta>,
    pub meta: BidMeta,
    /// outstream 延迟渲染句柄
    #[serde(skip)]
    pub renderer: Option<Arc<RendererHandle>>,
}

impl CanonicalBid {
    /// 构造出价骨架；价格非有限/为负或 ttl 为 0 时返回 None
    pub fn new(
        request_id: &str,
        ad_unit_code: &str,
        cpm: f64,
        currency: Currency,
        ttl: u32,
        media_type: MediaType,
    ) -> Option<Self> {
        if !cpm.is_finite() || cpm < 0.0 || ttl == 0 {
            return None;
        }
        Some(Self {
            request_id: request_id.to_string(),
            ad_unit_code: ad_unit_code.to_string(),
            cpm,
            currency,
            ttl,
            media_type,
            net_revenue: true,
            creative_id: String::new(),
            width: None,
            height: None,
            ad: None,
            ad_url: None,
            vast_url: None,
            vast_xml: None,
            deal_id: None,
            video: None,
            meta: BidMeta::default(),
            renderer: None,
        })
    }

    /// 是否带有可渲染的创意（markup 或 URL）
    pub fn has_creative(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().map(|s| !s.is_empty()).unwrap_or(false);
        present(&self.ad) || present(&self.ad_url) || present(&self.vast_url) || present(&self.vast_xml)
    }
}
