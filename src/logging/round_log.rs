// src/logging/round_log.rs

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::pipeline::DropStats;

/// 一轮结束时的状态
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    /// 有有效出价
    Filled,
    NoBid,
    Timeout,
    Error,
    /// 没有通过校验的请求，未发送
    Skipped,
}

/// **单个 bidder 一轮拍卖的汇总日志**
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RoundLog {
    pub timestamp: String,
    pub log_type: String,
    pub bidder: String,
    pub auction_id: String,
    pub requests: usize,   // 参与的广告位数
    pub rejected: usize,   // 校验未通过
    pub server_calls: usize,
    pub bids: usize,
    pub dropped: DropStats,
    pub status: RoundStatus,
    pub elapsed_ms: u64,
}

impl RoundLog {
    pub fn new(bidder: &str, auction_id: &str) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            log_type: "hb_bid_round".to_string(),
            bidder: bidder.to_string(),
            auction_id: auction_id.to_string(),
            requests: 0,
            rejected: 0,
            server_calls: 0,
            bids: 0,
            dropped: DropStats::default(),
            status: RoundStatus::Skipped,
            elapsed_ms: 0,
        }
    }

    /// 根据出价数与是否超时/出错确定状态
    pub fn finish(&mut self, bids: usize, dropped: DropStats, elapsed_ms: u64) {
        self.bids = bids;
        self.dropped = dropped;
        self.elapsed_ms = elapsed_ms;
        self.status = if bids > 0 { RoundStatus::Filled } else { RoundStatus::NoBid };
    }

    pub fn fail(&mut self, status: RoundStatus, elapsed_ms: u64) {
        self.status = status;
        self.elapsed_ms = elapsed_ms;
    }

    /// 以 JSON 写入日志
    pub fn emit(&self) {
        match serde_json::to_string(self) {
            Ok(json) => info!(target: "hb_round", "{}", json),
            Err(e) => warn!("Failed to serialize round log: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_sets_status_from_bids() {
        let mut log = RoundLog::new("adtelligent", "auc-1");
        assert_eq!(log.status, RoundStatus::Skipped);
        log.finish(0, DropStats { unmatched: 1, ..Default::default() }, 12);
        assert_eq!(log.status, RoundStatus::NoBid);
        log.finish(2, DropStats::default(), 15);
        assert_eq!(log.status, RoundStatus::Filled);

        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json["status"], "filled");
        assert_eq!(json["log_type"], "hb_bid_round");
        assert_eq!(json["elapsed_ms"], 15);
    }

    #[test]
    fn failures_keep_counts() {
        let mut log = RoundLog::new("integr8", "auc-2");
        log.server_calls = 1;
        log.fail(RoundStatus::Timeout, 1000);
        assert_eq!(log.status, RoundStatus::Timeout);
        assert_eq!(log.server_calls, 1);
    }
}
