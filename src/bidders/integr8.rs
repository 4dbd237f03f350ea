// src/bidders/integr8.rs

use serde_json::{json, Value};
use std::sync::Arc;

use crate::bidders::BidderAdapter;
use crate::config::BidderSettings;
use crate::model::{AuctionContext, BidRequest, CanonicalBid, Currency, MediaType, Size, DEFAULT_TTL};
use crate::pipeline::{finish_video, is_biddable_price, FieldReader, ResponseNormalizer, TagBuilder};
use crate::render::{OutstreamSupport, PlayerQueue};

pub const BIDDER_CODE: &str = "integr8";
pub const DEFAULT_ENDPOINT_URL: &str = "https://central.sea.integr8.digital/bid";
const DIMENSION_SEPARATOR: &str = "x";
const SIZE_SEPARATOR: &str = ";";
/// 只接受以 EUR 计价的底价
const FLOOR_CURRENCY: &str = "EUR";

const SUPPORTED_MEDIA_TYPES: [MediaType; 2] = [MediaType::Banner, MediaType::Video];

pub struct Integr8Adapter {
    settings: BidderSettings,
    normalizer: Arc<Integr8Normalizer>,
}

impl Integr8Adapter {
    /// integr8 没有自己的 outstream 播放器，只有配置了播放器地址才接受 outstream 出价
    pub fn new(settings: BidderSettings, queue: Arc<dyn PlayerQueue>) -> Self {
        let outstream = settings
            .outstream_player_url
            .as_deref()
            .map(|url| OutstreamSupport::new(url, queue));
        let normalizer = Integr8Normalizer {
            default_ttl: settings.ttl.filter(|t| *t > 0).unwrap_or(DEFAULT_TTL),
            default_currency: settings.currency.as_deref().and_then(Currency::parse).unwrap_or_default(),
            outstream,
        };
        Self {
            settings,
            normalizer: Arc::new(normalizer),
        }
    }
}

fn generate_size_param(sizes: &[Size]) -> String {
    sizes
        .iter()
        .map(|s| format!("{}{}{}", s.w, DIMENSION_SEPARATOR, s.h))
        .collect::<Vec<_>>()
        .join(SIZE_SEPARATOR)
}

fn bid_floor(request: &BidRequest) -> Value {
    match &request.floor {
        Some(floor) if floor.currency == FLOOR_CURRENCY && floor.floor.is_finite() => json!(floor.floor),
        _ => Value::Null,
    }
}

/// 所有请求中第一个满足条件的参数
fn first_param<'a>(requests: &[&'a BidRequest], key: &str, accept: impl Fn(&Value) -> bool) -> Option<&'a Value> {
    requests
        .iter()
        .filter_map(|r| r.param(key))
        .find(|v| accept(v))
}

impl TagBuilder for Integr8Adapter {
    fn placement(&self, request: &BidRequest, _ctx: &AuctionContext) -> Value {
        let skip_time = request
            .media_types
            .video
            .as_ref()
            .and_then(|v| v.skipafter)
            .map(|s| json!(s))
            .or_else(|| request.param("skipTime").cloned())
            .unwrap_or(Value::Null);
        json!({
            "sizes": generate_size_param(request.banner_sizes()),
            "adUnitId": request.ad_unit_code,
            "placementId": request.param("placementId"),
            "bidid": request.bid_id,
            "count": request.param("count"),
            "skipTime": skip_time,
            "floor": bid_floor(request),
        })
    }

    fn envelope(&self, requests: &[&BidRequest], placements: Vec<Value>, ctx: &AuctionContext) -> Value {
        let property_id = first_param(requests, "propertyId", |v| !v.is_null()).cloned().unwrap_or(json!(""));
        let page_view_guid = first_param(requests, "pageViewGuid", |v| !v.is_null())
            .cloned()
            .unwrap_or(json!(""));
        let contents = first_param(requests, "contents", |v| v.as_array().map(|a| !a.is_empty()).unwrap_or(false))
            .cloned()
            .unwrap_or(json!([]));
        let data = first_param(requests, "data", |v| v.as_object().map(|o| !o.is_empty()).unwrap_or(false))
            .cloned()
            .unwrap_or(json!({}));

        json!({
            "propertyId": property_id,
            "pageViewGuid": page_view_guid,
            "storageId": "",
            "biskoId": "",
            "segments": [],
            "url": ctx.page.clone().unwrap_or_default(),
            "requestid": ctx.bidder_request_id,
            "placements": placements,
            "contents": contents,
            "data": data,
        })
    }
}

impl BidderAdapter for Integr8Adapter {
    fn code(&self) -> &str {
        BIDDER_CODE
    }

    fn supported_media_types(&self) -> &[MediaType] {
        &SUPPORTED_MEDIA_TYPES
    }

    fn is_bid_request_valid(&self, request: &BidRequest) -> bool {
        request.param_truthy("propertyId") && request.param_truthy("placementId")
    }

    fn tag_builder(&self) -> &dyn TagBuilder {
        self
    }

    /// 配置地址 > 请求参数 deliveryUrl > 默认地址
    fn endpoint(&self, requests: &[&BidRequest], _ctx: &AuctionContext) -> String {
        if let Some(endpoint) = &self.settings.endpoint {
            return endpoint.clone();
        }
        first_param(requests, "deliveryUrl", Value::is_string)
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_ENDPOINT_URL)
            .to_string()
    }

    fn normalizer(&self) -> Arc<dyn ResponseNormalizer> {
        self.normalizer.clone()
    }
}

/// 响应本身就是记录数组：`[{BidId, CPM, Ad, ...}]`
pub struct Integr8Normalizer {
    default_ttl: u32,
    default_currency: Currency,
    outstream: Option<OutstreamSupport>,
}

impl ResponseNormalizer for Integr8Normalizer {
    fn records_key(&self) -> Option<&str> {
        None
    }

    fn correlation_id(&self, record: &Value) -> Option<String> {
        FieldReader(record).string("BidId")
    }

    fn normalize(&self, record: &Value, request: &BidRequest) -> Option<CanonicalBid> {
        let r = FieldReader(record);
        let cpm = r.f64("CPM")?;
        if !is_biddable_price(cpm) {
            return None;
        }
        let currency = match r.string("Currency") {
            Some(code) => Currency::parse(&code)?,
            None => self.default_currency.clone(),
        };
        let ttl = r.u32("TTL").filter(|t| *t > 0).unwrap_or(self.default_ttl);
        let media_type = r
            .string("MediaType")
            .and_then(|m| MediaType::parse(&m))
            .unwrap_or_else(|| request.primary_media_type());

        let mut bid = CanonicalBid::new(&request.bid_id, &request.ad_unit_code, cpm, currency, ttl, media_type)?;
        bid.width = r.u32("Width");
        bid.height = r.u32("Height");
        bid.creative_id = r.string("CreativeId").unwrap_or_default();
        bid.net_revenue = r.bool("NetRevenue").unwrap_or(true);
        bid.meta.advertiser_domains = r.string_list("ADomain");

        match media_type {
            MediaType::Banner => {
                bid.ad = r.string("Ad");
                bid.has_creative().then_some(bid)
            }
            MediaType::Video => {
                bid.vast_url = r.string("VastUrl");
                if !bid.has_creative() {
                    return None;
                }
                finish_video(bid, request, self.outstream.as_ref(), json!({}), None)
            }
            MediaType::Native => None,
        }
    }
}
