// src/analytics/adxcg.rs

use reqwest::Url;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error};

use crate::analytics::events::{
    timed_out_bidders, AuctionEvents, AuctionInitLog, BidRequestedLog, BidResponseLog,
};
use crate::analytics::{AnalyticsAdapter, AnalyticsEvent};
use crate::config::AnalyticsOptions;
use crate::telemetry::{Beacon, BeaconSink};

pub const ANALYTICS_CODE: &str = "adxcg";
pub const DEFAULT_HOST: &str = "hbarxs.adxcg.net";
const ANALYTICS_VERSION: &str = "v2.01";
const BEACON_PATH: &str = "/pbrx/v2";

/// 启用后的上报上下文
#[derive(Debug)]
struct AnalyticsContext {
    publisher_id: String,
    host: String,
    options: AnalyticsOptions,
    auction_id: Option<String>,
    auction_timestamp: Option<i64>,
    events: AuctionEvents,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BidWonPayload {
    bid_wons: Vec<BidResponseLog>,
}

/// **adxcg 分析 adapter**
///
/// 一轮拍卖的请求/响应/超时事件先累积，AuctionEnd 时整体发送；
/// BidWon 立即单独发送。未启用时所有事件都被忽略。
pub struct AdxcgAnalytics {
    sink: Arc<dyn BeaconSink>,
    context: Mutex<Option<AnalyticsContext>>,
}

impl AdxcgAnalytics {
    pub fn new(sink: Arc<dyn BeaconSink>) -> Self {
        Self {
            sink,
            context: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<AnalyticsContext>> {
        self.context.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 缺少 publisherId 时记录错误并保持未启用
    pub fn enable(&self, options: AnalyticsOptions) -> bool {
        let Some(publisher_id) = options.publisher_id.clone().filter(|p| !p.is_empty()) else {
            error!("PublisherId option is not defined. Analytics won't work");
            return false;
        };
        let host = options
            .host
            .clone()
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        *self.lock() = Some(AnalyticsContext {
            publisher_id,
            host,
            options,
            auction_id: None,
            auction_timestamp: None,
            events: AuctionEvents::default(),
        });
        true
    }

    pub fn is_enabled(&self) -> bool {
        self.lock().is_some()
    }

    fn beacon_url(ctx: &AnalyticsContext) -> Option<String> {
        let screen = ctx
            .options
            .screen
            .map(|s| s.to_string())
            .unwrap_or_default();
        let params = [
            ("pid", ctx.publisher_id.clone()),
            ("aid", ctx.auction_id.clone().unwrap_or_default()),
            ("ats", ctx.auction_timestamp.map(|t| t.to_string()).unwrap_or_default()),
            ("aav", ANALYTICS_VERSION.to_string()),
            ("iob", if ctx.options.intersection_observer { "1" } else { "0" }.to_string()),
            ("pbv", env!("CARGO_PKG_VERSION").to_string()),
            ("sz", screen),
        ];
        let scheme = ctx.options.scheme.as_deref().filter(|s| !s.is_empty()).unwrap_or("https");
        match Url::parse_with_params(&format!("{}://{}{}", scheme, ctx.host, BEACON_PATH), &params) {
            Ok(url) => Some(url.to_string()),
            Err(e) => {
                error!(host = %ctx.host, "invalid analytics host: {}", e);
                None
            }
        }
    }

    fn send<T: Serialize>(&self, ctx: &AnalyticsContext, data: &T) {
        let Some(url) = Self::beacon_url(ctx) else {
            return;
        };
        match serde_json::to_string(data) {
            Ok(body) => self.sink.fire(Beacon::text(url, body)),
            Err(e) => debug!("analytics payload not serialisable: {}", e),
        }
    }
}

impl AnalyticsAdapter for AdxcgAnalytics {
    fn code(&self) -> &str {
        ANALYTICS_CODE
    }

    fn track(&self, event: &AnalyticsEvent) {
        let mut guard = self.lock();
        let Some(ctx) = guard.as_mut() else {
            return;
        };
        match event {
            AnalyticsEvent::AuctionInit { auction_id, timestamp, timeout } => {
                ctx.events = AuctionEvents {
                    auction_init: Some(AuctionInitLog { timeout: *timeout }),
                    ..Default::default()
                };
                ctx.auction_id = Some(auction_id.clone());
                ctx.auction_timestamp = Some(*timestamp);
            }
            AnalyticsEvent::BidRequested { bidder_code, auction_id, start, bids } => {
                ctx.auction_id = Some(auction_id.clone());
                ctx.events.bid_requests.push(BidRequestedLog::new(bidder_code, *start, bids));
            }
            AnalyticsEvent::BidResponse { bidder_code, bid, transaction_id, time_to_respond } => {
                ctx.events.bid_responses.push(BidResponseLog::new(
                    bidder_code,
                    bid,
                    transaction_id.clone(),
                    *time_to_respond,
                ));
            }
            AnalyticsEvent::BidTimeout(bids) => {
                ctx.events.bid_timeout = Some(timed_out_bidders(bids));
            }
            AnalyticsEvent::BidWon { bidder_code, bid, time_to_respond } => {
                let payload = BidWonPayload {
                    bid_wons: vec![BidResponseLog::new(bidder_code, bid, None, *time_to_respond)],
                };
                self.send(&*ctx, &payload);
            }
            AnalyticsEvent::AuctionEnd { .. } => {
                self.send(&*ctx, &ctx.events);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::TimedOutBid;
    use crate::model::{BidRequest, CanonicalBid, Currency, MediaType, Size};
    use serde_json::Value;

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<Beacon>>);

    impl BeaconSink for RecordingSink {
        fn fire(&self, beacon: Beacon) {
            self.0.lock().unwrap().push(beacon);
        }
    }

    fn enabled(host: Option<&str>) -> (AdxcgAnalytics, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let analytics = AdxcgAnalytics::new(sink.clone());
        assert!(analytics.enable(AnalyticsOptions {
            publisher_id: Some("42".into()),
            host: host.map(str::to_string),
            screen: Some(Size::new(1920, 1080)),
            intersection_observer: true,
            ..Default::default()
        }));
        (analytics, sink)
    }

    fn bid(id: &str) -> CanonicalBid {
        CanonicalBid::new(id, "top", 1.0, Currency::default(), 300, MediaType::Banner).unwrap()
    }

    #[test]
    fn missing_publisher_id_keeps_adapter_disabled() {
        let sink = Arc::new(RecordingSink::default());
        let analytics = AdxcgAnalytics::new(sink.clone());
        assert!(!analytics.enable(AnalyticsOptions::default()));
        assert!(!analytics.is_enabled());
        analytics.track(&AnalyticsEvent::AuctionEnd { auction_id: "a".into() });
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[test]
    fn auction_end_sends_accumulated_events() {
        let (analytics, sink) = enabled(None);
        analytics.track(&AnalyticsEvent::AuctionInit { auction_id: "auc-1".into(), timestamp: 1700000000000, timeout: 1000 });
        analytics.track(&AnalyticsEvent::BidRequested {
            bidder_code: "adtelligent".into(),
            auction_id: "auc-1".into(),
            start: 1700000000010,
            bids: vec![BidRequest { bid_id: "r1".into(), ad_unit_code: "top".into(), ..Default::default() }],
        });
        analytics.track(&AnalyticsEvent::BidResponse {
            bidder_code: "adtelligent".into(),
            bid: bid("r1"),
            transaction_id: Some("t1".into()),
            time_to_respond: 85,
        });
        analytics.track(&AnalyticsEvent::BidTimeout(vec![TimedOutBid {
            bidder: "integr8".into(),
            bid_id: "r2".into(),
            ad_unit_code: "side".into(),
        }]));
        analytics.track(&AnalyticsEvent::AuctionEnd { auction_id: "auc-1".into() });

        let fired = sink.0.lock().unwrap();
        assert_eq!(fired.len(), 1);
        let beacon = &fired[0];
        assert!(beacon.url.starts_with("https://hbarxs.adxcg.net/pbrx/v2?pid=42&aid=auc-1&ats=1700000000000&aav=v2.01&iob=1"));
        assert!(beacon.url.ends_with("sz=1920x1080"));
        assert_eq!(beacon.content_type, "text/plain");
        let body: Value = serde_json::from_str(&beacon.body).unwrap();
        assert_eq!(body["auctionInit"]["timeout"], 1000);
        assert_eq!(body["bidRequests"][0]["bids"][0]["bidId"], "r1");
        assert_eq!(body["bidResponses"][0]["timeToRespond"], 85);
        assert_eq!(body["bidTimeout"][0], "integr8");
    }

    #[test]
    fn bid_won_is_sent_immediately_to_custom_host() {
        let (analytics, sink) = enabled(Some("stats.example"));
        analytics.track(&AnalyticsEvent::BidWon { bidder_code: "medianet".into(), bid: bid("w1"), time_to_respond: 40 });
        let fired = sink.0.lock().unwrap();
        assert_eq!(fired.len(), 1);
        assert!(fired[0].url.starts_with("https://stats.example/pbrx/v2"));
        let body: Value = serde_json::from_str(&fired[0].body).unwrap();
        assert_eq!(body["bidWons"][0]["bidId"], "w1");
        assert_eq!(body["bidWons"][0]["bidderCode"], "medianet");
    }

    #[test]
    fn plain_http_scheme_for_local_collector() {
        let sink = Arc::new(RecordingSink::default());
        let analytics = AdxcgAnalytics::new(sink.clone());
        assert!(analytics.enable(AnalyticsOptions {
            publisher_id: Some("42".into()),
            host: Some("127.0.0.1:9001".into()),
            scheme: Some("http".into()),
            ..Default::default()
        }));
        analytics.track(&AnalyticsEvent::BidWon { bidder_code: "medianet".into(), bid: bid("w1"), time_to_respond: 40 });
        let fired = sink.0.lock().unwrap();
        assert_eq!(fired.len(), 1);
        assert!(fired[0].url.starts_with("http://127.0.0.1:9001/pbrx/v2?pid=42"));
    }

    #[test]
    fn auction_init_starts_a_fresh_round() {
        let (analytics, sink) = enabled(None);
        analytics.track(&AnalyticsEvent::AuctionInit { auction_id: "a1".into(), timestamp: 1, timeout: 500 });
        analytics.track(&AnalyticsEvent::BidResponse { bidder_code: "x".into(), bid: bid("r1"), transaction_id: None, time_to_respond: 1 });
        analytics.track(&AnalyticsEvent::AuctionInit { auction_id: "a2".into(), timestamp: 2, timeout: 500 });
        analytics.track(&AnalyticsEvent::AuctionEnd { auction_id: "a2".into() });
        let body: Value = serde_json::from_str(&sink.0.lock().unwrap()[0].body).unwrap();
        assert_eq!(body["bidResponses"], Value::Array(vec![]));
    }
}
