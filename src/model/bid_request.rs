// src/model/bid_request.rs

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::media::{MediaType, Size, VideoContext};

/// 供应商参数，对管道不透明，只在各 adapter 内部校验
pub type Params = Map<String, Value>;

/// 单个广告位参与竞价的请求，由宿主拍卖创建，adapter 只读
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BidRequest {
    /// 关联 ID，同一轮拍卖内唯一
    #[serde(default)]
    pub bid_id: String,
    pub ad_unit_code: String,
    #[serde(default)]
    pub bidder: String,
    #[serde(default)]
    pub auction_id: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub media_types: MediaTypes,
    #[serde(default)]
    pub sizes: Vec<Size>,
    #[serde(default)]
    pub params: Params,
    /// 宿主底价模块给出的底价
    #[serde(default)]
    pub floor: Option<Floor>,
    /// 宿主测得的广告位几何信息（相对视口）
    #[serde(default)]
    pub geometry: Option<SlotGeometry>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct MediaTypes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banner: Option<BannerParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native: Option<Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct BannerParams {
    #[serde(default)]
    pub sizes: Vec<Size>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VideoParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<VideoContext>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub player_size: Vec<Size>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mimes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipafter: Option<u32>,
    /// 其它视频参数原样透传
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Floor {
    pub floor: f64,
    pub currency: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// 广告位矩形，左上 / 右下坐标
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct SlotGeometry {
    pub top_left: Point,
    pub bottom_right: Point,
}

impl BidRequest {
    /// 声明了 video 即视为视频请求，其次 banner，最后 native
    pub fn primary_media_type(&self) -> MediaType {
        if self.media_types.video.is_some() {
            MediaType::Video
        } else if self.media_types.banner.is_none() && self.media_types.native.is_some() {
            MediaType::Native
        } else {
            MediaType::Banner
        }
    }

    pub fn video_context(&self) -> Option<VideoContext> {
        self.media_types.video.as_ref().and_then(|v| v.context)
    }

    pub fn banner_sizes(&self) -> &[Size] {
        match &self.media_types.banner {
            Some(banner) if !banner.sizes.is_empty() => &banner.sizes,
            _ => &self.sizes,
        }
    }

    pub fn player_sizes(&self) -> &[Size] {
        self.media_types
            .video
            .as_ref()
            .map(|v| v.player_size.as_slice())
            .unwrap_or(&[])
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key).filter(|v| !v.is_null())
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.param(key).and_then(Value::as_str)
    }

    /// JS 语义下的真值判断：null、false、0、"" 都视为缺失
    pub fn param_truthy(&self, key: &str) -> bool {
        match self.param(key) {
            None => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }
}

/// 同意/隐私信号，只做透传，不在核心中解释
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConsentSignals {
    #[serde(default)]
    pub gdpr_applies: Option<bool>,
    #[serde(default)]
    pub gdpr_consent: Option<String>,
    #[serde(default)]
    pub usp_consent: Option<String>,
    #[serde(default)]
    pub gpp_string: Option<String>,
    #[serde(default)]
    pub gpp_sid: Option<Vec<u32>>,
}

/// 一轮拍卖中某个 bidder 的上下文（对应宿主的 bidderRequest）
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuctionContext {
    #[serde(default)]
    pub bidder_code: String,
    #[serde(default)]
    pub bidder_request_id: String,
    #[serde(default)]
    pub auction_id: String,
    /// 拍卖超时（毫秒）
    #[serde(default)]
    pub timeout: u64,
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default)]
    pub consent: ConsentSignals,
    /// 首方 ortb2 数据，原样透传
    #[serde(default)]
    pub ortb2: Value,
    /// 宿主测得的视口尺寸
    #[serde(default)]
    pub viewport: Option<Size>,
}

impl AuctionContext {
    /// 按 `a.b.c` 路径读取 ortb2 中的字段
    pub fn ortb2_path(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .try_fold(&self.ortb2, |node, key| node.get(key))
            .filter(|v| !v.is_null())
    }
}
