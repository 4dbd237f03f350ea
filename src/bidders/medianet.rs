// src/bidders/medianet.rs

use reqwest::Url;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::error;

use crate::bidders::viewability::{classify, SlotVisibility};
use crate::bidders::BidderAdapter;
use crate::config::BidderSettings;
use crate::error::TransportError;
use crate::model::{AuctionContext, BidRequest, CanonicalBid, Currency, MediaType, DEFAULT_TTL};
use crate::pipeline::{finish_video, is_biddable_price, FieldReader, ResponseNormalizer, TagBuilder};
use crate::render::{OutstreamSupport, PlayerQueue};
use crate::sync::{filter_sync_urls, SyncCapabilities, UserSync};
use crate::telemetry::{Beacon, BeaconSink};

pub const BIDDER_CODE: &str = "medianet";
pub const TRUSTEDSTACK_CODE: &str = "trustedstack";
const BID_URL: &str = "https://prebid.media.net/rtb/prebid";
const TRUSTEDSTACK_URL: &str = "https://prebid.trustedstack.com/rtb/trustedstack";
pub const PLAYER_URL: &str = "https://prebid.media.net/video/bundle.js";

pub const TIMEOUT_EVENT_NAME: &str = "client_timeout";
pub const BID_WON_EVENT_NAME: &str = "client_bid_won";
pub const SET_TARGETING: &str = "client_set_targeting";
pub const BIDDER_ERROR: &str = "client_bidder_error";

/// 渲染器从出价记录中读取的播放器参数
const RENDERER_FIELDS: [&str; 6] = ["vto", "mavtr", "avp", "ap", "pl", "mt"];

const SUPPORTED_MEDIA_TYPES: [MediaType; 3] = [MediaType::Banner, MediaType::Native, MediaType::Video];

/// **media.net / trustedstack**
pub struct MedianetAdapter {
    code: String,
    settings: BidderSettings,
    normalizer: Arc<MedianetNormalizer>,
    beacons: Option<Arc<dyn BeaconSink>>,
    /// 最近一次通过校验的 cid，所有事件上报都带上它
    customer_id: Mutex<Option<String>>,
}

impl MedianetAdapter {
    pub fn new(code: &str, settings: BidderSettings, queue: Arc<dyn PlayerQueue>) -> Self {
        let player_url = settings.outstream_player_url.clone().unwrap_or_else(|| PLAYER_URL.to_string());
        let normalizer = MedianetNormalizer {
            default_ttl: settings.ttl.filter(|t| *t > 0).unwrap_or(DEFAULT_TTL),
            default_currency: settings.currency.as_deref().and_then(Currency::parse).unwrap_or_default(),
            outstream: OutstreamSupport::new(&player_url, queue),
        };
        Self {
            code: code.to_string(),
            settings,
            normalizer: Arc::new(normalizer),
            beacons: None,
            customer_id: Mutex::new(None),
        }
    }

    /// 启用客户端事件上报（还需要配置 eventUrl）
    pub fn with_beacons(mut self, sink: Arc<dyn BeaconSink>) -> Self {
        self.beacons = Some(sink);
        self
    }

    fn customer_id<'a>(requests: &[&'a BidRequest]) -> Option<&'a str> {
        requests.iter().find_map(|r| r.param_str("cid"))
    }

    /// 事件上报，任何失败都在这里吞掉
    fn log_event(&self, name: &str, value: Option<Value>, related_data: Option<String>, bids: Vec<Value>) {
        let (Some(sink), Some(event_url)) = (&self.beacons, &self.settings.event_url) else {
            return;
        };
        let cid = self
            .customer_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_default();
        let mut query = vec![("logid", "kfk".to_string()), ("evtid", "projectevents".to_string()), ("name", name.to_string()), ("cid", cid)];
        if let Some(value) = &value {
            query.push(("value", value.to_string()));
        }
        if let Some(related) = related_data {
            query.push(("relatedData", related));
        }
        let Ok(url) = Url::parse_with_params(event_url, &query) else {
            return;
        };
        let data: Vec<EventBidData> = bids.iter().map(EventBidData::from_value).collect();
        if let Ok(body) = serde_json::to_string(&data) {
            sink.fire(Beacon::text(url.to_string(), body));
        }
    }
}

/// 上报里每个出价/请求的摘要
#[derive(Serialize, Debug)]
struct EventBidData {
    acid: String,
    crid: String,
    ext: String,
    rawobj: String,
}

impl EventBidData {
    fn from_value(bid: &Value) -> Self {
        let crid = bid
            .pointer("/params/crid")
            .and_then(Value::as_str)
            .or_else(|| bid.get("adUnitCode").and_then(Value::as_str))
            .unwrap_or_default();
        let mut raw = bid.clone();
        if let Some(obj) = raw.as_object_mut() {
            obj.remove("ad");
            obj.remove("vastXml");
        }
        Self {
            acid: bid.get("auctionId").and_then(Value::as_str).unwrap_or_default().to_string(),
            crid: crid.to_string(),
            ext: bid.get("ext").map(Value::to_string).unwrap_or_default(),
            rawobj: raw.to_string(),
        }
    }
}

impl TagBuilder for MedianetAdapter {
    fn placement(&self, request: &BidRequest, ctx: &AuctionContext) -> Value {
        let mut ext = Map::new();
        ext.insert("dfp_id".into(), json!(request.ad_unit_code));
        ext.insert("adUnitCode".into(), json!(request.ad_unit_code));

        let mut imp = Map::new();
        imp.insert("id".into(), json!(request.bid_id));
        if let Some(tid) = &request.transaction_id {
            imp.insert("transactionId".into(), json!(tid));
        }
        imp.insert("all".into(), Value::Object(request.params.clone()));

        let banner_sizes = request.media_types.banner.as_ref().map(|b| b.sizes.as_slice()).unwrap_or(&[]);
        if !banner_sizes.is_empty() {
            let banner: Vec<Value> = banner_sizes.iter().map(|s| json!({"w": s.w, "h": s.h})).collect();
            imp.insert("banner".into(), Value::Array(banner));
        }

        // 参数里的 video 与 mediaTypes.video 合并，后者优先
        let mut video = request.param("video").and_then(Value::as_object).cloned().unwrap_or_default();
        if let Some(Value::Object(declared)) = request.media_types.video.as_ref().map(|v| json!(v)) {
            video.extend(declared);
        }
        if !video.is_empty() {
            imp.insert("video".into(), Value::Object(video));
        }
        if let Some(native) = &request.media_types.native {
            imp.insert("native".into(), json!(native.to_string()));
        }
        if let Some(crid) = request.param("crid") {
            let crid = crid.as_str().map(str::to_string).unwrap_or_else(|| crid.to_string());
            imp.insert("tagid".into(), json!(crid));
        }

        let bid_floor = ["bidfloor", "bidFloor"]
            .iter()
            .filter_map(|key| request.param(key))
            .find_map(|v| match v {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            })
            .filter(|f| *f != 0.0 && f.is_finite());
        if let Some(floor) = bid_floor {
            imp.insert("bidfloor".into(), json!(floor));
        }
        if let Some(floor) = &request.floor {
            imp.insert(
                "bidfloors".into(),
                json!([{ "floor": floor.floor, "currency": floor.currency, "mediaType": request.primary_media_type() }]),
            );
        }

        let visibility = if banner_sizes.is_empty() {
            SlotVisibility::NotDetermined
        } else {
            let (class, ratio) = classify(request.geometry.as_ref(), banner_sizes, ctx.viewport);
            if let (Some(ratio), Some(geometry)) = (ratio, &request.geometry) {
                ext.insert("viewability".into(), json!(ratio));
                ext.insert("coordinates".into(), json!(geometry));
            }
            class
        };
        ext.insert("visibility".into(), json!(visibility));
        imp.insert("ext".into(), Value::Object(ext));
        Value::Object(imp)
    }

    fn envelope(&self, requests: &[&BidRequest], placements: Vec<Value>, ctx: &AuctionContext) -> Value {
        let first = requests.first();

        let mut site = first
            .and_then(|r| r.param("site"))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        if let Some(page) = &ctx.page {
            site.entry("page").or_insert_with(|| json!(page));
        }

        let gdpr_applies = ctx.consent.gdpr_applies.unwrap_or(false);
        let usp_applies = ctx.consent.usp_consent.is_some();
        let coppa_applies = ctx.ortb2_path("regs.coppa").and_then(Value::as_i64) == Some(1);
        let mut ext = Map::new();
        ext.insert("customer_id".into(), json!(Self::customer_id(requests)));
        ext.insert("prebid_version".into(), json!(format!("v{}", env!("CARGO_PKG_VERSION"))));
        ext.insert("gdpr_applies".into(), json!(gdpr_applies));
        if gdpr_applies {
            ext.insert(
                "gdpr_consent_string".into(),
                json!(ctx.consent.gdpr_consent.clone().unwrap_or_default()),
            );
        }
        ext.insert("usp_applies".into(), json!(usp_applies));
        if let Some(usp) = &ctx.consent.usp_consent {
            ext.insert("usp_consent_string".into(), json!(usp));
        }
        ext.insert("coppa_applies".into(), json!(coppa_applies));
        if let Some(viewport) = ctx.viewport {
            ext.insert("screen".into(), json!({"w": viewport.w, "h": viewport.h}));
        }
        if let Some(schain) = ctx.ortb2_path("source.ext.schain") {
            ext.insert("schain".into(), schain.clone());
        }

        let auction_id = first
            .and_then(|r| r.auction_id.clone())
            .unwrap_or_else(|| ctx.auction_id.clone());
        json!({
            "site": site,
            "ext": ext,
            "id": auction_id,
            "imp": placements,
            "ortb2": ctx.ortb2,
            "tmax": ctx.timeout,
        })
    }
}

impl BidderAdapter for MedianetAdapter {
    fn code(&self) -> &str {
        &self.code
    }

    fn supported_media_types(&self) -> &[MediaType] {
        &SUPPORTED_MEDIA_TYPES
    }

    fn is_bid_request_valid(&self, request: &BidRequest) -> bool {
        if request.params.is_empty() {
            error!("{} : Missing bid parameters", self.code);
            return false;
        }
        match request.param_str("cid") {
            Some(cid) if !cid.trim().is_empty() => {
                *self.customer_id.lock().unwrap_or_else(PoisonError::into_inner) = Some(cid.to_string());
                true
            }
            _ => {
                error!("{} : cid should be a string", self.code);
                false
            }
        }
    }

    fn tag_builder(&self) -> &dyn TagBuilder {
        self
    }

    fn endpoint(&self, requests: &[&BidRequest], _ctx: &AuctionContext) -> String {
        let base = match &self.settings.endpoint {
            Some(endpoint) => endpoint.as_str(),
            None if self.code == TRUSTEDSTACK_CODE => TRUSTEDSTACK_URL,
            None => BID_URL,
        };
        let cid = Self::customer_id(requests).unwrap_or_default();
        match Url::parse_with_params(base, &[("cid", cid)]) {
            Ok(url) => url.to_string(),
            Err(_) => format!("{}?cid={}", base, cid),
        }
    }

    fn normalizer(&self) -> Arc<dyn ResponseNormalizer> {
        self.normalizer.clone()
    }

    /// 同步地址取自第一个响应的 `ext.csUrl`
    fn user_syncs(&self, capabilities: &SyncCapabilities, responses: &[Value]) -> Vec<UserSync> {
        let urls: Vec<UserSync> = responses
            .first()
            .and_then(|body| body.pointer("/ext/csUrl"))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value(item.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();
        filter_sync_urls(capabilities, &urls)
    }

    fn on_timeout(&self, timed_out: &[BidRequest], timeout_ms: u64) {
        let data = timed_out.iter().filter_map(|r| serde_json::to_value(r).ok()).collect();
        self.log_event(
            TIMEOUT_EVENT_NAME,
            Some(json!(timed_out.len())),
            Some(timeout_ms.to_string()),
            data,
        );
    }

    fn on_bid_won(&self, bid: &CanonicalBid) {
        let data = serde_json::to_value(bid).into_iter().collect();
        self.log_event(BID_WON_EVENT_NAME, Some(json!(bid.cpm)), None, data);
    }

    fn on_set_targeting(&self, bid: &CanonicalBid) {
        if self.settings.send_all_bids {
            return;
        }
        let data = serde_json::to_value(bid).into_iter().collect();
        self.log_event(SET_TARGETING, Some(json!(bid.cpm)), None, data);
    }

    fn on_bidder_error(&self, error: &TransportError, requests: &[BidRequest]) {
        let (timed_out, status) = match error {
            TransportError::Timeout { .. } => (true, 0),
            TransportError::Status { status, .. } => (false, *status),
            _ => (false, 0),
        };
        let related = format!("timedOut:{}|status:{}|message:{}", timed_out, status, error);
        let data = requests.iter().filter_map(|r| serde_json::to_value(r).ok()).collect();
        self.log_event(BIDDER_ERROR, None, Some(related), data);
    }
}

/// 响应格式：`{bidList: [...], ext: {csUrl, paApiAuctionConfigs, igi}}`
pub struct MedianetNormalizer {
    default_ttl: u32,
    default_currency: Currency,
    outstream: OutstreamSupport,
}

impl ResponseNormalizer for MedianetNormalizer {
    fn records_key(&self) -> Option<&str> {
        Some("bidList")
    }

    fn correlation_id(&self, record: &Value) -> Option<String> {
        FieldReader(record).string("requestId")
    }

    fn normalize(&self, record: &Value, request: &BidRequest) -> Option<CanonicalBid> {
        let r = FieldReader(record);
        if r.bool("no_bid") != Some(false) {
            return None;
        }
        let cpm = r.f64("cpm")?;
        if !is_biddable_price(cpm) {
            return None;
        }
        let currency = match r.string("currency") {
            Some(code) => Currency::parse(&code)?,
            None => self.default_currency.clone(),
        };
        let ttl = r.u32("ttl").filter(|t| *t > 0).unwrap_or(self.default_ttl);
        let media_type = r
            .string("mediaType")
            .and_then(|m| MediaType::parse(&m))
            .unwrap_or_else(|| request.primary_media_type());

        let mut bid = CanonicalBid::new(&request.bid_id, &request.ad_unit_code, cpm, currency, ttl, media_type)?;
        bid.width = r.u32("width");
        bid.height = r.u32("height");
        bid.creative_id = r.string("creativeId").unwrap_or_default();
        bid.net_revenue = r.bool("netRevenue").unwrap_or(true);
        bid.deal_id = r.string("dealId");
        bid.ad = r.string("ad");
        bid.ad_url = r.string("adUrl");
        bid.vast_url = r.string("vastUrl");
        bid.vast_xml = r.string("vastXml");
        bid.meta.advertiser_domains = match record.pointer("/meta/advertiserDomains") {
            Some(Value::Array(_)) => FieldReader(&record["meta"]).string_list("advertiserDomains"),
            _ => r.string_list("adomain"),
        };
        if !bid.has_creative() {
            return None;
        }

        let mut config = Map::new();
        for field in RENDERER_FIELDS {
            if let Some(value) = r.raw(field) {
                config.insert(field.to_string(), value.clone());
            }
        }
        let mut bid = finish_video(bid, request, Some(&self.outstream), Value::Object(config), None)?;
        // 响应没给 vto 时不挂播放器，交给宿主自己渲染
        if !has_vast_timeout(record) {
            bid.renderer = None;
        }
        Some(bid)
    }

    /// `ext.paApiAuctionConfigs` 加上 `ext.igi[].igs` 展平
    fn auction_configs(&self, payload: &Value) -> Vec<Value> {
        let mut configs: Vec<Value> = payload
            .pointer("/ext/paApiAuctionConfigs")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if let Some(igi) = payload.pointer("/ext/igi").and_then(Value::as_array) {
            for entry in igi {
                if let Some(igs) = entry.get("igs").and_then(Value::as_array) {
                    configs.extend(igs.iter().cloned());
                }
            }
        }
        configs
    }
}

fn has_vast_timeout(record: &Value) -> bool {
    match record.get("vto") {
        Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Bool(b)) => *b,
        _ => false,
    }
}
