// src/analytics/events.rs

use serde::Serialize;
use serde_json::Value;

use crate::model::{parse_sizes_input, BidRequest, CanonicalBid, MediaType};

/// **拍卖生命周期事件**，由宿主（或 AuctionRunner）按顺序发出
#[derive(Debug, Clone)]
pub enum AnalyticsEvent {
    AuctionInit {
        auction_id: String,
        /// 拍卖开始时间（毫秒时间戳）
        timestamp: i64,
        timeout: u64,
    },
    BidRequested {
        bidder_code: String,
        auction_id: String,
        start: i64,
        bids: Vec<BidRequest>,
    },
    BidResponse {
        bidder_code: String,
        bid: CanonicalBid,
        transaction_id: Option<String>,
        time_to_respond: u64,
    },
    BidTimeout(Vec<TimedOutBid>),
    BidWon {
        bidder_code: String,
        bid: CanonicalBid,
        time_to_respond: u64,
    },
    AuctionEnd {
        auction_id: String,
    },
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimedOutBid {
    pub bidder: String,
    pub bid_id: String,
    pub ad_unit_code: String,
}

/// **一轮拍卖累计的事件**，在 AuctionEnd 时整体上报
#[derive(Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct AuctionEvents {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auction_init: Option<AuctionInitLog>,
    pub bid_requests: Vec<BidRequestedLog>,
    pub bid_responses: Vec<BidResponseLog>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bid_timeout: Option<Vec<String>>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AuctionInitLog {
    pub timeout: u64,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BidRequestedLog {
    pub bidder_code: String,
    pub time: i64,
    pub bids: Vec<RequestedBidLog>,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RequestedBidLog {
    pub transaction_id: Option<String>,
    pub ad_unit_code: String,
    pub bid_id: String,
    pub start: i64,
    /// `300x250,728x90`
    pub sizes: String,
    pub params: Value,
}

impl BidRequestedLog {
    pub fn new(bidder_code: &str, start: i64, bids: &[BidRequest]) -> Self {
        Self {
            bidder_code: bidder_code.to_string(),
            time: start,
            bids: bids
                .iter()
                .map(|bid| RequestedBidLog {
                    transaction_id: bid.transaction_id.clone(),
                    ad_unit_code: bid.ad_unit_code.clone(),
                    bid_id: bid.bid_id.clone(),
                    start,
                    sizes: parse_sizes_input(bid.banner_sizes()).join(","),
                    params: Value::Object(bid.params.clone()),
                })
                .collect(),
        }
    }
}

/// 出价响应与胜出出价共用的摘要
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BidResponseLog {
    pub bidder_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    pub ad_unit_code: String,
    pub media_type: MediaType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rendered_size: Option<String>,
    pub cpm: f64,
    pub currency: String,
    pub net_revenue: bool,
    pub time_to_respond: u64,
    pub bid_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deal_id: Option<String>,
    pub creative_id: String,
}

impl BidResponseLog {
    pub fn new(bidder_code: &str, bid: &CanonicalBid, transaction_id: Option<String>, time_to_respond: u64) -> Self {
        let rendered_size = match (bid.width, bid.height) {
            (Some(w), Some(h)) => Some(format!("{}x{}", w, h)),
            _ => None,
        };
        Self {
            bidder_code: bidder_code.to_string(),
            transaction_id,
            ad_unit_code: bid.ad_unit_code.clone(),
            media_type: bid.media_type,
            rendered_size,
            cpm: bid.cpm,
            currency: bid.currency.as_str().to_string(),
            net_revenue: bid.net_revenue,
            time_to_respond,
            bid_id: bid.request_id.clone(),
            deal_id: bid.deal_id.clone(),
            creative_id: bid.creative_id.clone(),
        }
    }
}

/// 超时的 bidder 列表，去重并保持首次出现的顺序
pub fn timed_out_bidders(bids: &[TimedOutBid]) -> Vec<String> {
    let mut bidders: Vec<String> = Vec::new();
    for bid in bids {
        if !bidders.contains(&bid.bidder) {
            bidders.push(bid.bidder.clone());
        }
    }
    bidders
}
