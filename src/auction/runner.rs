// src/auction/runner.rs

use chrono::Utc;
use futures::future::join_all;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tracing::{info, warn};
use uuid::Uuid;

use crate::analytics::{AnalyticsAdapter, AnalyticsEvent, TimedOutBid};
use crate::bidders::{prepare_round, BidderAdapter};
use crate::config::DEFAULT_TIMEOUT_MS;
use crate::logging::{RoundLog, RoundStatus};
use crate::model::{AuctionContext, BidRequest, CanonicalBid};
use crate::sync::{SyncCache, SyncCapabilities, UserSync};
use crate::transport::Transport;

/// 带来源信息的出价
#[derive(Debug, Clone)]
pub struct ReceivedBid {
    pub bidder: String,
    pub transaction_id: Option<String>,
    pub time_to_respond: u64,
    pub bid: CanonicalBid,
}

/// 一次拍卖的汇总结果，不做排序与决胜
#[derive(Debug, Default)]
pub struct AuctionResult {
    pub auction_id: String,
    pub bids: Vec<ReceivedBid>,
    pub auction_configs: Vec<Value>,
    /// 本页面尚未同步过的地址
    pub user_syncs: Vec<UserSync>,
    /// 超时的 bidder
    pub timed_out: Vec<String>,
    pub rounds: Vec<RoundLog>,
}

/// 单个 bidder 一轮的结果
struct BidderRound {
    bids: Vec<ReceivedBid>,
    auction_configs: Vec<Value>,
    user_syncs: Vec<UserSync>,
    timed_out: bool,
    log: RoundLog,
}

impl BidderRound {
    fn empty(log: RoundLog) -> Self {
        Self {
            bids: Vec::new(),
            auction_configs: Vec::new(),
            user_syncs: Vec::new(),
            timed_out: false,
            log,
        }
    }
}

/// **拍卖驱动器**
///
/// 每个 bidder 并发执行：准备请求 → 并发发送所有分块 → 超时控制 → 对账。
/// 超时的 bidder 不会进入对账，只触发 `on_timeout`。
pub struct AuctionRunner {
    transport: Arc<dyn Transport>,
    bidders: Vec<Arc<dyn BidderAdapter>>,
    analytics: Vec<Arc<dyn AnalyticsAdapter>>,
    sync_capabilities: SyncCapabilities,
    sync_cache: Mutex<SyncCache>,
}

impl AuctionRunner {
    pub fn new(transport: Arc<dyn Transport>, sync_capabilities: SyncCapabilities) -> Self {
        Self {
            transport,
            bidders: Vec::new(),
            analytics: Vec::new(),
            sync_capabilities,
            sync_cache: Mutex::new(SyncCache::new()),
        }
    }

    pub fn with_bidder(mut self, bidder: Arc<dyn BidderAdapter>) -> Self {
        self.bidders.push(bidder);
        self
    }

    pub fn with_analytics(mut self, adapter: Arc<dyn AnalyticsAdapter>) -> Self {
        self.analytics.push(adapter);
        self
    }

    pub fn bidder_codes(&self) -> Vec<&str> {
        self.bidders.iter().map(|b| b.code()).collect()
    }

    fn track(&self, event: AnalyticsEvent) {
        for adapter in &self.analytics {
            adapter.track(&event);
        }
    }

    fn bidder(&self, code: &str) -> Option<&Arc<dyn BidderAdapter>> {
        self.bidders.iter().find(|b| b.code() == code)
    }

    /// 执行一次拍卖。`requests` 中每个请求的 `bidder` 决定由哪个 adapter 处理。
    pub async fn run(&self, requests: &[BidRequest], ctx: &AuctionContext) -> AuctionResult {
        let auction_id = if ctx.auction_id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            ctx.auction_id.clone()
        };
        let timeout_ms = if ctx.timeout == 0 { DEFAULT_TIMEOUT_MS } else { ctx.timeout };
        let ctx = AuctionContext {
            auction_id: auction_id.clone(),
            timeout: timeout_ms,
            ..ctx.clone()
        };

        self.track(AnalyticsEvent::AuctionInit {
            auction_id: auction_id.clone(),
            timestamp: Utc::now().timestamp_millis(),
            timeout: timeout_ms,
        });

        let rounds = join_all(self.bidders.iter().map(|adapter| {
            let mine: Vec<BidRequest> = requests
                .iter()
                .filter(|r| r.bidder == adapter.code())
                .cloned()
                .collect();
            self.run_bidder(adapter.clone(), mine, &ctx)
        }))
        .await;

        let mut result = AuctionResult {
            auction_id: auction_id.clone(),
            ..Default::default()
        };
        let mut syncs = Vec::new();
        for round in rounds {
            round.log.emit();
            if round.timed_out {
                result.timed_out.push(round.log.bidder.clone());
            }
            result.bids.extend(round.bids);
            result.auction_configs.extend(round.auction_configs);
            syncs.extend(round.user_syncs);
            result.rounds.push(round.log);
        }
        result.user_syncs = self
            .sync_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take_new(syncs);

        self.track(AnalyticsEvent::AuctionEnd {
            auction_id: auction_id.clone(),
        });
        info!(
            auction_id = %auction_id,
            bids = result.bids.len(),
            timed_out = result.timed_out.len(),
            "auction finished"
        );
        result
    }

    async fn run_bidder(&self, adapter: Arc<dyn BidderAdapter>, requests: Vec<BidRequest>, ctx: &AuctionContext) -> BidderRound {
        let code = adapter.code().to_string();
        let mut log = RoundLog::new(&code, &ctx.auction_id);
        log.requests = requests.len();
        if requests.is_empty() {
            return BidderRound::empty(log);
        }

        let bidder_ctx = AuctionContext {
            bidder_code: code.clone(),
            bidder_request_id: Uuid::new_v4().to_string(),
            ..ctx.clone()
        };
        let prepared = prepare_round(adapter.as_ref(), &requests, &bidder_ctx);
        let mut engine = prepared.engine;
        log.rejected = prepared.rejected;
        log.server_calls = prepared.requests.len();
        if prepared.requests.is_empty() {
            return BidderRound::empty(log);
        }

        let pending: Vec<BidRequest> = engine.pending().requests().cloned().collect();
        let start_ms = Utc::now().timestamp_millis();
        self.track(AnalyticsEvent::BidRequested {
            bidder_code: code.clone(),
            auction_id: ctx.auction_id.clone(),
            start: start_ms,
            bids: pending.clone(),
        });

        let start = Instant::now();
        let sends = prepared.requests.into_iter().map(|request| self.transport.send(request));
        let results = match timeout(Duration::from_millis(ctx.timeout), join_all(sends)).await {
            Ok(results) => results,
            Err(_) => {
                warn!(bidder = %code, timeout_ms = ctx.timeout, "bidder timed out");
                adapter.on_timeout(&pending, ctx.timeout);
                self.track(AnalyticsEvent::BidTimeout(
                    pending
                        .iter()
                        .map(|r| TimedOutBid {
                            bidder: code.clone(),
                            bid_id: r.bid_id.clone(),
                            ad_unit_code: r.ad_unit_code.clone(),
                        })
                        .collect(),
                ));
                log.fail(RoundStatus::Timeout, start.elapsed().as_millis() as u64);
                let mut round = BidderRound::empty(log);
                round.timed_out = true;
                return round;
            }
        };
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let mut bodies = Vec::new();
        for result in results {
            match result {
                Ok(body) => bodies.push(body),
                Err(e) => {
                    warn!(bidder = %code, "bidder request failed: {}", e);
                    adapter.on_bidder_error(&e, &pending);
                }
            }
        }
        if bodies.is_empty() {
            log.fail(RoundStatus::Error, elapsed_ms);
            return BidderRound::empty(log);
        }

        let user_syncs = adapter.user_syncs(&self.sync_capabilities, &bodies);
        let body = if bodies.len() == 1 {
            bodies.remove(0)
        } else {
            Value::Array(bodies)
        };
        let outcome = engine.reconcile(&body);

        let bids: Vec<ReceivedBid> = outcome
            .bids
            .into_iter()
            .map(|bid| {
                let transaction_id = engine
                    .pending()
                    .get(&bid.request_id)
                    .and_then(|r| r.transaction_id.clone());
                ReceivedBid {
                    bidder: code.clone(),
                    transaction_id,
                    time_to_respond: elapsed_ms,
                    bid,
                }
            })
            .collect();
        for received in &bids {
            self.track(AnalyticsEvent::BidResponse {
                bidder_code: code.clone(),
                bid: received.bid.clone(),
                transaction_id: received.transaction_id.clone(),
                time_to_respond: elapsed_ms,
            });
        }

        log.finish(bids.len(), outcome.dropped, elapsed_ms);
        BidderRound {
            bids,
            auction_configs: outcome.auction_configs,
            user_syncs,
            timed_out: false,
            log,
        }
    }

    /// 宿主选定胜出出价后调用
    pub fn bid_won(&self, received: &ReceivedBid) {
        if let Some(adapter) = self.bidder(&received.bidder) {
            adapter.on_bid_won(&received.bid);
        }
        self.track(AnalyticsEvent::BidWon {
            bidder_code: received.bidder.clone(),
            bid: received.bid.clone(),
            time_to_respond: received.time_to_respond,
        });
    }

    /// 宿主为出价设置 targeting 后调用
    pub fn set_targeting(&self, received: &ReceivedBid) {
        if let Some(adapter) = self.bidder(&received.bidder) {
            adapter.on_set_targeting(&received.bid);
        }
    }
}
