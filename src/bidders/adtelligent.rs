// src/bidders/adtelligent.rs

use once_cell::sync::Lazy;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::bidders::BidderAdapter;
use crate::config::BidderSettings;
use crate::model::{
    parse_sizes_input, AuctionContext, BidRequest, CanonicalBid, Currency, MediaType, VideoContext,
    DEFAULT_TTL,
};
use crate::pipeline::{finish_video, is_biddable_price, FieldReader, ResponseNormalizer, TagBuilder, DEFAULT_CHUNK_SIZE};
use crate::render::{OutstreamSupport, PlayerQueue};
use crate::sync::{filter_sync_urls, SyncCapabilities, SyncType, UserSync};

pub const BIDDER_CODE: &str = "adtelligent";
pub const OUTSTREAM_SRC: &str = "https://player.adtelligent.com/outstream-unit/2.01/outstream.min.js";
const AUCTION_PATH: &str = "/v2/auction/";
const SUBDOMAIN_SUFFIXES: [&str; 3] = ["", "1", "2"];

pub const ALIASES: [&str; 7] = [
    "streamkey",
    "janet",
    "selectmedia",
    "ocm",
    "9dotsmedia",
    "indicue",
    "stellormedia",
];

/// 白标别名各自的竞价域名，未列出的走默认轮询域名
static ALIAS_HOSTS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("streamkey", "ghb.hb.streamkey.net"),
        ("janet", "ghb.bidder.jmgads.com"),
        ("ocm", "ghb.cenarius.orangeclickmedia.com"),
        ("9dotsmedia", "ghb.platform.audiodots.com"),
        ("indicue", "ghb.console.indicue.com"),
        ("stellormedia", "ghb.ads.stellormedia.com"),
    ])
});

const SUPPORTED_MEDIA_TYPES: [MediaType; 2] = [MediaType::Banner, MediaType::Video];

/// **adtelligent 及其白标别名**
pub struct AdtelligentAdapter {
    code: String,
    settings: BidderSettings,
    normalizer: Arc<AdtelligentNormalizer>,
    host_counter: AtomicUsize,
}

impl AdtelligentAdapter {
    pub fn new(code: &str, settings: BidderSettings, queue: Arc<dyn PlayerQueue>) -> Self {
        let player_url = settings
            .outstream_player_url
            .clone()
            .unwrap_or_else(|| OUTSTREAM_SRC.to_string());
        let default_currency = settings
            .currency
            .as_deref()
            .and_then(Currency::parse)
            .unwrap_or_default();
        let normalizer = AdtelligentNormalizer {
            ttl: settings.ttl.filter(|t| *t > 0).unwrap_or(DEFAULT_TTL),
            default_currency,
            outstream: OutstreamSupport::new(&player_url, queue),
        };
        Self {
            code: code.to_string(),
            settings,
            normalizer: Arc::new(normalizer),
            host_counter: AtomicUsize::new(0),
        }
    }

    /// 别名取 `_` 之前的部分查表，默认域名在 ghb / ghb1 / ghb2 之间轮询
    fn host(&self) -> String {
        let base = self.code.split('_').next().unwrap_or(&self.code);
        match ALIAS_HOSTS.get(base) {
            Some(host) => host.to_string(),
            None => {
                let n = self.host_counter.fetch_add(1, Ordering::Relaxed);
                format!("ghb{}.adtelligent.com", SUBDOMAIN_SUFFIXES[n % SUBDOMAIN_SUFFIXES.len()])
            }
        }
    }
}

impl TagBuilder for AdtelligentAdapter {
    fn placement(&self, request: &BidRequest, _ctx: &AuctionContext) -> Value {
        let is_video = request.media_types.video.is_some();
        let sizes = if is_video {
            request.player_sizes()
        } else {
            request.banner_sizes()
        };

        let mut params = Map::new();
        params.insert("CallbackId".into(), json!(request.bid_id));
        params.insert("Aid".into(), request.param("aid").cloned().unwrap_or(Value::Null));
        params.insert("AdType".into(), json!(if is_video { "video" } else { "display" }));
        params.insert("Sizes".into(), json!(parse_sizes_input(sizes).join(",")));

        let placement_id = request
            .param("vpb_placement_id")
            .filter(|_| request.param_truthy("vpb_placement_id"))
            .cloned()
            .unwrap_or_else(|| json!(request.ad_unit_code));
        params.insert("PlacementId".into(), placement_id);

        if request.param_truthy("iframe") {
            params.insert("AdmType".into(), json!("iframe"));
        }
        if request.video_context() == Some(VideoContext::Adpod) {
            if let Some(video) = &request.media_types.video {
                params.insert("Adpod".into(), json!(video));
            }
        }
        Value::Object(params)
    }

    fn envelope(&self, _requests: &[&BidRequest], placements: Vec<Value>, ctx: &AuctionContext) -> Value {
        let mut tag = Map::new();
        if let Some(page) = &ctx.page {
            tag.insert("Domain".into(), json!(page));
        }
        if ctx.timeout > 0 {
            tag.insert("Timeout".into(), json!(ctx.timeout));
        }
        if let Some(applies) = ctx.consent.gdpr_applies {
            tag.insert("GDPR".into(), json!(u8::from(applies)));
            if let Some(consent) = &ctx.consent.gdpr_consent {
                tag.insert("GDPRConsent".into(), json!(consent));
            }
        }
        if let Some(usp) = &ctx.consent.usp_consent {
            tag.insert("USP".into(), json!(usp));
        }

        // 优先使用 CMP 给出的 GPP，其次 ortb2.regs
        if let Some(gpp) = &ctx.consent.gpp_string {
            tag.insert("GPP".into(), json!(gpp));
            if let Some(sid) = &ctx.consent.gpp_sid {
                let joined: Vec<String> = sid.iter().map(u32::to_string).collect();
                tag.insert("GPPSid".into(), json!(joined.join(",")));
            }
        } else if let Some(gpp) = ctx.ortb2_path("regs.gpp") {
            tag.insert("GPP".into(), gpp.clone());
            if let Some(sid) = ctx.ortb2_path("regs.gpp_sid") {
                tag.insert("GPPSid".into(), sid.clone());
            }
        }
        if let Some(age) = ctx.ortb2_path("regs.ext.age_verification") {
            tag.insert("AgeVerification".into(), age.clone());
        }

        tag.insert("BidRequests".into(), Value::Array(placements));
        Value::Object(tag)
    }
}

impl BidderAdapter for AdtelligentAdapter {
    fn code(&self) -> &str {
        &self.code
    }

    fn supported_media_types(&self) -> &[MediaType] {
        &SUPPORTED_MEDIA_TYPES
    }

    fn is_bid_request_valid(&self, request: &BidRequest) -> bool {
        request.param_truthy("aid")
    }

    fn chunk_size(&self) -> Option<usize> {
        Some(self.settings.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE))
    }

    fn tag_builder(&self) -> &dyn TagBuilder {
        self
    }

    fn endpoint(&self, _requests: &[&BidRequest], _ctx: &AuctionContext) -> String {
        match &self.settings.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!("https://{}{}", self.host(), AUCTION_PATH),
        }
    }

    fn normalizer(&self) -> Arc<dyn ResponseNormalizer> {
        self.normalizer.clone()
    }

    /// 每个响应体（分块时为其中每个元素）的 `cookieURLs` / `cookieURLSTypes`
    fn user_syncs(&self, capabilities: &SyncCapabilities, responses: &[Value]) -> Vec<UserSync> {
        if !capabilities.iframe_enabled && !capabilities.pixel_enabled {
            return Vec::new();
        }
        let mut urls = Vec::new();
        for body in responses {
            match body {
                Value::Array(items) => items.iter().for_each(|item| collect_cookie_urls(item, &mut urls)),
                other => collect_cookie_urls(other, &mut urls),
            }
        }
        filter_sync_urls(capabilities, &urls)
    }
}

/// 类型缺省或无法识别时按 image 处理
fn collect_cookie_urls(body: &Value, out: &mut Vec<UserSync>) {
    let Some(urls) = body.get("cookieURLs").and_then(Value::as_array) else {
        return;
    };
    let types = body.get("cookieURLSTypes").and_then(Value::as_array);
    for (i, url) in urls.iter().enumerate() {
        let Some(url) = url.as_str() else {
            continue;
        };
        let sync_type = match types.and_then(|t| t.get(i)).and_then(Value::as_str) {
            Some("iframe") => SyncType::Iframe,
            _ => SyncType::Image,
        };
        out.push(UserSync::new(sync_type, url));
    }
}

/// 响应格式：`{bids: [{requestId, cpm, cur, ad | adUrl | vastUrl, ...}]}`，或其数组
pub struct AdtelligentNormalizer {
    ttl: u32,
    default_currency: Currency,
    outstream: OutstreamSupport,
}

impl ResponseNormalizer for AdtelligentNormalizer {
    fn records_key(&self) -> Option<&str> {
        Some("bids")
    }

    fn correlation_id(&self, record: &Value) -> Option<String> {
        FieldReader(record).string("requestId")
    }

    fn normalize(&self, record: &Value, request: &BidRequest) -> Option<CanonicalBid> {
        let r = FieldReader(record);
        let cpm = r.f64("cpm")?;
        if !is_biddable_price(cpm) {
            return None;
        }
        let currency = match r.string("cur") {
            Some(code) => Currency::parse(&code)?,
            None => self.default_currency.clone(),
        };
        let media_type = if request.media_types.video.is_some() {
            MediaType::Video
        } else {
            MediaType::Banner
        };

        let mut bid = CanonicalBid::new(
            &request.bid_id,
            &request.ad_unit_code,
            cpm,
            currency,
            self.ttl,
            media_type,
        )?;
        bid.creative_id = r.string("cmpId").unwrap_or_default();
        bid.width = r.u32("width");
        bid.height = r.u32("height");
        bid.meta.advertiser_domains = r.string_list("adomain");

        if media_type == MediaType::Banner {
            bid.ad = r.string("ad");
            bid.ad_url = r.string("adUrl");
            return bid.has_creative().then_some(bid);
        }

        bid.vast_url = r.string("vastUrl");
        if !bid.has_creative() {
            return None;
        }
        let duration = if request.video_context() == Some(VideoContext::Adpod) {
            bid.meta.primary_cat_id = r.string("primaryCatId");
            r.u32("durationSeconds")
        } else {
            None
        };
        let config = request.param("outstream").cloned().unwrap_or_else(|| json!({}));
        finish_video(bid, request, Some(&self.outstream), config, duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bidders::prepare_round;
    use crate::model::{BannerParams, ConsentSignals, MediaTypes, Size, VideoParams};
    use crate::render::{ChannelPlayerQueue, PlayerInstruction};

    fn adapter(settings: BidderSettings) -> AdtelligentAdapter {
        let (queue, _rx) = ChannelPlayerQueue::new();
        AdtelligentAdapter::new(BIDDER_CODE, settings, queue)
    }

    fn banner(id: &str) -> BidRequest {
        let mut params = Map::new();
        params.insert("aid".into(), json!(331133));
        BidRequest {
            bid_id: id.into(),
            ad_unit_code: format!("div-{}", id),
            bidder: BIDDER_CODE.into(),
            media_types: MediaTypes {
                banner: Some(BannerParams { sizes: vec![Size::new(300, 250), Size::new(300, 600)] }),
                ..Default::default()
            },
            params,
            ..Default::default()
        }
    }

    fn video(id: &str, context: VideoContext) -> BidRequest {
        let mut request = banner(id);
        request.media_types = MediaTypes {
            video: Some(VideoParams {
                context: Some(context),
                player_size: vec![Size::new(640, 480)],
                ..Default::default()
            }),
            ..Default::default()
        };
        request
            .params
            .insert("outstream".into(), json!({"default_volume": 50}));
        request
    }

    #[test]
    fn requires_aid() {
        let adapter = adapter(BidderSettings::default());
        assert!(adapter.is_bid_request_valid(&banner("a")));
        let mut missing = banner("b");
        missing.params.clear();
        assert!(!adapter.is_bid_request_valid(&missing));
    }

    #[test]
    fn builds_chunked_requests_with_rotating_hosts() {
        let adapter = adapter(BidderSettings { chunk_size: Some(2), ..Default::default() });
        let requests: Vec<_> = (0..5).map(|i| banner(&format!("b{}", i))).collect();
        let ctx = AuctionContext {
            page: Some("https://publisher.example/article".into()),
            consent: ConsentSignals {
                gpp_string: Some("DBABMA~".into()),
                gpp_sid: Some(vec![7, 8]),
                ..Default::default()
            },
            ..Default::default()
        };
        let round = prepare_round(&adapter, &requests, &ctx);
        assert_eq!(round.requests.len(), 3);
        assert_eq!(round.requests[0].url, "https://ghb.adtelligent.com/v2/auction/");
        assert_eq!(round.requests[1].url, "https://ghb1.adtelligent.com/v2/auction/");
        assert_eq!(round.requests[2].url, "https://ghb2.adtelligent.com/v2/auction/");

        let body = &round.requests[0].body;
        assert_eq!(body["GPP"], "DBABMA~");
        assert_eq!(body["GPPSid"], "7,8");
        assert_eq!(body["BidRequests"][0]["CallbackId"], "b0");
        assert_eq!(body["BidRequests"][0]["AdType"], "display");
        assert_eq!(body["BidRequests"][0]["Sizes"], "300x250,300x600");
        assert_eq!(body["BidRequests"][0]["PlacementId"], "div-b0");
        assert_eq!(round.requests[2].request_ids, vec!["b4"]);
    }

    #[test]
    fn alias_uses_its_own_host() {
        let (queue, _rx) = ChannelPlayerQueue::new();
        let adapter = AdtelligentAdapter::new("streamkey", BidderSettings::default(), queue);
        assert_eq!(adapter.endpoint(&[], &AuctionContext::default()), "https://ghb.hb.streamkey.net/v2/auction/");
    }

    #[test]
    fn placement_overrides() {
        let adapter = adapter(BidderSettings::default());
        let mut request = video("v1", VideoContext::Adpod);
        request.params.insert("vpb_placement_id".into(), json!("vpb-9"));
        request.params.insert("iframe".into(), json!(true));
        let placement = adapter.placement(&request, &AuctionContext::default());
        assert_eq!(placement["AdType"], "video");
        assert_eq!(placement["Sizes"], "640x480");
        assert_eq!(placement["PlacementId"], "vpb-9");
        assert_eq!(placement["AdmType"], "iframe");
        assert_eq!(placement["Adpod"]["context"], "adpod");
    }

    #[test]
    fn reconciles_banner_and_drops_zero_cpm() {
        let adapter = adapter(BidderSettings::default());
        let mut round = prepare_round(&adapter, &[banner("a"), banner("b")], &AuctionContext::default());
        let outcome = round.engine.reconcile(&json!({
            "bids": [
                {"requestId": "a", "cpm": 0, "ad": "<div/>"},
                {"requestId": "b", "cpm": 1.2, "cur": "eur", "ad": "<div>b</div>", "width": 300, "height": 250, "cmpId": 77, "adomain": ["brand.example"]}
            ]
        }));
        assert_eq!(outcome.bids.len(), 1);
        let bid = &outcome.bids[0];
        assert_eq!(bid.request_id, "b");
        assert_eq!(bid.currency.as_str(), "EUR");
        assert_eq!(bid.ttl, 300);
        assert_eq!(bid.creative_id, "77");
        assert_eq!(bid.width, Some(300));
        assert_eq!(bid.meta.advertiser_domains, vec!["brand.example"]);
    }

    #[test]
    fn banner_without_creative_is_invalid() {
        let adapter = adapter(BidderSettings::default());
        let mut round = prepare_round(&adapter, &[banner("a")], &AuctionContext::default());
        let outcome = round.engine.reconcile(&json!({"bids": [{"requestId": "a", "cpm": 2.0}]}));
        assert!(outcome.bids.is_empty());
    }

    #[tokio::test]
    async fn outstream_bid_carries_renderer() {
        let (queue, mut rx) = ChannelPlayerQueue::new();
        let adapter = AdtelligentAdapter::new(BIDDER_CODE, BidderSettings::default(), queue);
        let mut round = prepare_round(&adapter, &[video("v1", VideoContext::Outstream)], &AuctionContext::default());
        let outcome = round.engine.reconcile(&json!([
            {"bids": [{"requestId": "v1", "cpm": 4.0, "vastUrl": "https://vast.example/v1.xml", "width": 640, "height": 480}]}
        ]));
        let bid = &outcome.bids[0];
        assert_eq!(bid.video.as_ref().unwrap().context, VideoContext::Outstream);
        let renderer = bid.renderer.as_ref().unwrap();
        assert_eq!(renderer.url(), OUTSTREAM_SRC);
        assert_eq!(renderer.config(), &json!({"default_volume": 50}));

        assert!(renderer.render(bid, None));
        let PlayerInstruction::BuildPlayer { element_id, vast_url, .. } = rx.recv().await.unwrap();
        assert_eq!(element_id, "div-v1");
        assert_eq!(vast_url.as_deref(), Some("https://vast.example/v1.xml"));
    }

    #[test]
    fn cookie_urls_from_every_chunk() {
        let adapter = adapter(BidderSettings::default());
        let responses = vec![json!([
            {"bids": [], "cookieURLs": ["https://sync.example/px", "https://sync.example/frame"], "cookieURLSTypes": ["image", "iframe"]},
            {"bids": [], "cookieURLs": ["https://sync.example/untyped"]}
        ])];
        let both = SyncCapabilities { iframe_enabled: true, pixel_enabled: true };
        let syncs = adapter.user_syncs(&both, &responses);
        assert_eq!(
            syncs,
            vec![
                UserSync::new(SyncType::Image, "https://sync.example/px"),
                UserSync::new(SyncType::Iframe, "https://sync.example/frame"),
                UserSync::new(SyncType::Image, "https://sync.example/untyped"),
            ]
        );

        let pixels = SyncCapabilities { iframe_enabled: false, pixel_enabled: true };
        assert_eq!(adapter.user_syncs(&pixels, &responses).len(), 2);
        assert!(adapter.user_syncs(&SyncCapabilities::default(), &responses).is_empty());
    }

    #[test]
    fn single_body_cookie_urls() {
        let adapter = adapter(BidderSettings::default());
        let responses = vec![json!({"bids": [], "cookieURLs": ["https://sync.example/px"], "cookieURLSTypes": ["image"]})];
        let both = SyncCapabilities { iframe_enabled: true, pixel_enabled: true };
        let syncs = adapter.user_syncs(&both, &responses);
        assert_eq!(syncs.len(), 1);
        assert_eq!(syncs[0].url, "https://sync.example/px");
    }

    #[test]
    fn adpod_bid_carries_duration() {
        let adapter = adapter(BidderSettings::default());
        let mut round = prepare_round(&adapter, &[video("p1", VideoContext::Adpod)], &AuctionContext::default());
        let outcome = round.engine.reconcile(&json!({
            "bids": [{"requestId": "p1", "cpm": 8.0, "vastUrl": "https://vast.example/p1.xml", "durationSeconds": 30, "primaryCatId": "IAB1"}]
        }));
        let bid = &outcome.bids[0];
        assert_eq!(bid.video.as_ref().unwrap().duration_seconds, Some(30));
        assert_eq!(bid.meta.primary_cat_id.as_deref(), Some("IAB1"));
        assert!(bid.renderer.is_none());
    }
}
