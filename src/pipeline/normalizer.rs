// src/pipeline/normalizer.rs

use serde_json::Value;

use crate::model::{BidRequest, CanonicalBid, MediaType, VideoContext, VideoMeta};
use crate::render::OutstreamSupport;

/// **响应标准化器**
///
/// 把单条供应商出价记录和与之匹配的请求转换成 [`CanonicalBid`]。
/// 必须是纯函数：相同输入总是得到相同输出。无效记录返回 None，不报错。
pub trait ResponseNormalizer: Send + Sync {
    /// 单个响应对象中记录列表所在的键；None 表示响应本身就是记录数组
    fn records_key(&self) -> Option<&str>;

    /// 记录声明的关联 ID
    fn correlation_id(&self, record: &Value) -> Option<String>;

    fn normalize(&self, record: &Value, request: &BidRequest) -> Option<CanonicalBid>;

    /// 服务端拍卖配置（如 paapi），原样透传给宿主
    fn auction_configs(&self, _payload: &Value) -> Vec<Value> {
        Vec::new()
    }
}

/// 核心价格契约：有限且大于 0
pub fn is_biddable_price(cpm: f64) -> bool {
    cpm.is_finite() && cpm > 0.0
}

/// 对供应商 JSON 记录的宽松读取
#[derive(Debug, Clone, Copy)]
pub struct FieldReader<'a>(pub &'a Value);

impl<'a> FieldReader<'a> {
    pub fn raw(&self, key: &str) -> Option<&'a Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    /// 字符串字段；数字会被转换成字符串
    pub fn string(&self, key: &str) -> Option<String> {
        match self.raw(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// 数字字段，同时接受数字字符串（parseFloat 语义）
    pub fn f64(&self, key: &str) -> Option<f64> {
        match self.raw(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn u32(&self, key: &str) -> Option<u32> {
        self.f64(key)
            .filter(|v| *v >= 0.0 && *v <= u32::MAX as f64)
            .map(|v| v as u32)
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        match self.raw(key)? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_f64().map(|f| f != 0.0),
            Value::String(s) => match s.as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn string_list(&self, key: &str) -> Vec<String> {
        match self.raw(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// 视频出价的公共收尾：填充播放上下文，outstream 时挂载渲染句柄。
/// outstream 请求但没有播放器支持时无法投放，返回 None。
pub fn finish_video(
    mut bid: CanonicalBid,
    request: &BidRequest,
    outstream: Option<&OutstreamSupport>,
    renderer_config: Value,
    duration_seconds: Option<u32>,
) -> Option<CanonicalBid> {
    if bid.media_type != MediaType::Video {
        return Some(bid);
    }
    let context = request.video_context().unwrap_or(VideoContext::Instream);
    bid.video = Some(VideoMeta {
        context,
        duration_seconds,
    });
    if context == VideoContext::Outstream {
        let support = outstream?;
        bid.renderer = Some(support.handle(&request.bid_id, renderer_config));
    }
    Some(bid)
}
