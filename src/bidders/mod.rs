//! 各供应商的 bidder adapter

pub mod adtelligent;
pub mod integr8;
pub mod medianet;
pub mod viewability;

use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

use crate::config::BidderSettings;
use crate::error::TransportError;
use crate::model::{AuctionContext, BidRequest, CanonicalBid, MediaType, ServerRequest};
use crate::pipeline::{ReconciliationEngine, RequestTagger, ResponseNormalizer, TagBuilder};
use crate::render::PlayerQueue;
use crate::sync::{SyncCapabilities, UserSync};
use crate::telemetry::BeaconSink;

pub use adtelligent::AdtelligentAdapter;
pub use integr8::Integr8Adapter;
pub use medianet::MedianetAdapter;

/// **供应商 adapter**：把通用拍卖生命周期映射到某个供应商的请求/响应格式
pub trait BidderAdapter: Send + Sync {
    fn code(&self) -> &str;

    fn supported_media_types(&self) -> &[MediaType];

    /// 供应商参数校验，失败即表示本 adapter 不参与该广告位
    fn is_bid_request_valid(&self, request: &BidRequest) -> bool;

    /// 批量接口的分块大小，None 表示一次请求发送全部广告位
    fn chunk_size(&self) -> Option<usize> {
        None
    }

    fn tag_builder(&self) -> &dyn TagBuilder;

    fn endpoint(&self, requests: &[&BidRequest], ctx: &AuctionContext) -> String;

    fn normalizer(&self) -> Arc<dyn ResponseNormalizer>;

    fn user_syncs(&self, _capabilities: &SyncCapabilities, _responses: &[Value]) -> Vec<UserSync> {
        Vec::new()
    }

    fn on_timeout(&self, _timed_out: &[BidRequest], _timeout_ms: u64) {}

    fn on_bid_won(&self, _bid: &CanonicalBid) {}

    fn on_set_targeting(&self, _bid: &CanonicalBid) {}

    fn on_bidder_error(&self, _error: &TransportError, _requests: &[BidRequest]) {}
}

/// 按 bidder code（含别名，及 `code_N` 形式的多实例）创建 adapter，未知 code 返回 None
pub fn build_adapter(
    code: &str,
    settings: BidderSettings,
    queue: Arc<dyn PlayerQueue>,
    beacons: Option<Arc<dyn BeaconSink>>,
) -> Option<Arc<dyn BidderAdapter>> {
    let base = code.split('_').next().unwrap_or(code);
    if base == adtelligent::BIDDER_CODE || adtelligent::ALIASES.contains(&base) {
        return Some(Arc::new(AdtelligentAdapter::new(code, settings, queue)));
    }
    if base == integr8::BIDDER_CODE {
        return Some(Arc::new(Integr8Adapter::new(settings, queue)));
    }
    if base == medianet::BIDDER_CODE || base == medianet::TRUSTEDSTACK_CODE {
        let adapter = MedianetAdapter::new(code, settings, queue);
        return Some(Arc::new(match beacons {
            Some(sink) => adapter.with_beacons(sink),
            None => adapter,
        }));
    }
    None
}

/// 一轮拍卖中某个 bidder 准备好的请求与对账引擎
pub struct PreparedRound {
    pub requests: Vec<ServerRequest>,
    pub engine: ReconciliationEngine,
    /// 参数校验未通过被跳过的请求数
    pub rejected: usize,
}

/// 过滤无效请求，打标并生成传输请求
pub fn prepare_round(adapter: &dyn BidderAdapter, requests: &[BidRequest], ctx: &AuctionContext) -> PreparedRound {
    let valid: Vec<BidRequest> = requests
        .iter()
        .filter(|request| {
            let supported = adapter
                .supported_media_types()
                .contains(&request.primary_media_type());
            let ok = supported && adapter.is_bid_request_valid(request);
            if !ok {
                warn!(
                    bidder = adapter.code(),
                    ad_unit = %request.ad_unit_code,
                    "bid request rejected by adapter"
                );
            }
            ok
        })
        .cloned()
        .collect();
    let rejected = requests.len() - valid.len();

    let tagger = match adapter.chunk_size() {
        Some(size) => RequestTagger::new(size),
        None => RequestTagger::unchunked(),
    };
    let round = tagger.tag(&valid, ctx, adapter.tag_builder());

    let server_requests = round
        .tags
        .into_iter()
        .map(|tag| {
            let chunk: Vec<&BidRequest> = tag
                .request_ids
                .iter()
                .filter_map(|id| round.pending.get(id))
                .collect();
            let url = adapter.endpoint(&chunk, ctx);
            ServerRequest::post(url, tag.body, tag.request_ids)
        })
        .collect();

    PreparedRound {
        requests: server_requests,
        engine: ReconciliationEngine::new(adapter.code(), round.pending, adapter.normalizer()),
        rejected,
    }
}
