// src/pipeline/engine.rs

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::model::CanonicalBid;
use crate::pipeline::normalizer::{is_biddable_price, ResponseNormalizer};
use crate::pipeline::pending::{PendingIndex, RoundState};

/// 丢弃计数，只用于日志
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DropStats {
    pub unmatched: usize,
    pub invalid: usize,
    pub malformed: usize,
}

/// 一轮对账的结果
#[derive(Debug, Default)]
pub struct ReconciliationOutcome {
    /// 按响应顺序排列的有效出价，不去重
    pub bids: Vec<CanonicalBid>,
    /// 服务端拍卖配置，透传给宿主
    pub auction_configs: Vec<Value>,
    pub dropped: DropStats,
}

/// **对账引擎**
///
/// 每轮拍卖一个实例：`AwaitingResponse → Reconciling → Done`。
/// 独占本轮的 PendingIndex，进入 Done 之后不再处理任何响应。
pub struct ReconciliationEngine {
    bidder: String,
    pending: PendingIndex,
    normalizer: Arc<dyn ResponseNormalizer>,
    state: RoundState,
}

impl ReconciliationEngine {
    pub fn new(bidder: &str, pending: PendingIndex, normalizer: Arc<dyn ResponseNormalizer>) -> Self {
        Self {
            bidder: bidder.to_string(),
            pending,
            normalizer,
            state: RoundState::AwaitingResponse,
        }
    }

    pub fn state(&self) -> RoundState {
        self.state
    }

    pub fn pending(&self) -> &PendingIndex {
        &self.pending
    }

    /// 处理传输层返回的响应体。响应可以是单个对象、按分块排列的对象数组，
    /// 或嵌套的记录数组；结构异常时返回空结果而不是报错。
    pub fn reconcile(&mut self, body: &Value) -> ReconciliationOutcome {
        if self.state == RoundState::Done {
            warn!(bidder = %self.bidder, "round already reconciled, response ignored");
            return ReconciliationOutcome::default();
        }
        self.state = RoundState::Reconciling;

        let mut outcome = ReconciliationOutcome::default();
        let mut records = Vec::new();
        self.flatten(body, &mut records, &mut outcome);

        for record in records {
            let Some(id) = self.normalizer.correlation_id(record) else {
                outcome.dropped.invalid += 1;
                continue;
            };
            let Some(request) = self.pending.get(&id) else {
                trace!(bidder = %self.bidder, request_id = %id, "no pending request for record");
                outcome.dropped.unmatched += 1;
                continue;
            };
            match self.normalizer.normalize(record, request) {
                Some(bid) if bid.request_id == request.bid_id && is_biddable_price(bid.cpm) => {
                    outcome.bids.push(bid);
                }
                _ => {
                    trace!(bidder = %self.bidder, request_id = %id, "record rejected by normalizer");
                    outcome.dropped.invalid += 1;
                }
            }
        }

        self.state = RoundState::Done;
        debug!(
            bidder = %self.bidder,
            bids = outcome.bids.len(),
            unmatched = outcome.dropped.unmatched,
            invalid = outcome.dropped.invalid,
            malformed = outcome.dropped.malformed,
            "reconciliation done"
        );
        outcome
    }

    /// 深度优先展开响应，保持原有顺序
    fn flatten<'a>(&self, node: &'a Value, records: &mut Vec<&'a Value>, outcome: &mut ReconciliationOutcome) {
        match node {
            Value::Array(items) => {
                for item in items {
                    self.flatten(item, records, outcome);
                }
            }
            Value::Object(_) => match self.normalizer.records_key() {
                None => records.push(node),
                Some(key) => {
                    match node.get(key) {
                        Some(Value::Array(items)) => records.extend(items.iter()),
                        _ => outcome.dropped.malformed += 1,
                    }
                    outcome.auction_configs.extend(self.normalizer.auction_configs(node));
                }
            },
            _ => outcome.dropped.malformed += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BidRequest, Currency, MediaType};
    use crate::pipeline::normalizer::FieldReader;
    use serde_json::json;

    /// 最简单的记录格式：`{id, price, ad}`
    struct PlainNormalizer {
        key: Option<&'static str>,
    }

    impl ResponseNormalizer for PlainNormalizer {
        fn records_key(&self) -> Option<&str> {
            self.key
        }

        fn correlation_id(&self, record: &Value) -> Option<String> {
            FieldReader(record).string("id")
        }

        fn normalize(&self, record: &Value, request: &BidRequest) -> Option<CanonicalBid> {
            let r = FieldReader(record);
            let cpm = r.f64("price")?;
            if cpm <= 0.0 {
                return None;
            }
            let mut bid = CanonicalBid::new(
                &request.bid_id,
                &request.ad_unit_code,
                cpm,
                Currency::default(),
                300,
                MediaType::Banner,
            )?;
            bid.ad = Some(r.string("ad").unwrap_or_else(|| "<div/>".into()));
            Some(bid)
        }

        fn auction_configs(&self, payload: &Value) -> Vec<Value> {
            payload
                .get("configs")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
        }
    }

    fn pending(ids: &[&str]) -> PendingIndex {
        let mut index = PendingIndex::new();
        for id in ids {
            index.insert(BidRequest {
                bid_id: id.to_string(),
                ad_unit_code: format!("slot-{}", id),
                ..Default::default()
            });
        }
        index
    }

    fn engine(ids: &[&str], key: Option<&'static str>) -> ReconciliationEngine {
        ReconciliationEngine::new("test", pending(ids), Arc::new(PlainNormalizer { key }))
    }

    #[test]
    fn zero_price_dropped_positive_kept() {
        let mut engine = engine(&["r1", "r2"], None);
        let outcome = engine.reconcile(&json!([{"id": "r1", "price": 0}, {"id": "r2", "price": 1.5}]));
        assert_eq!(outcome.bids.len(), 1);
        assert_eq!(outcome.bids[0].request_id, "r2");
        assert_eq!(outcome.bids[0].cpm, 1.5);
        assert_eq!(outcome.dropped.invalid, 1);
    }

    #[test]
    fn nested_sub_batches_flatten_like_combined_array() {
        let split = engine(&["r1", "r2"], None)
            .reconcile(&json!([[{"id": "r1", "price": 1.0}], [{"id": "r2", "price": 2.0}]]));
        let combined = engine(&["r1", "r2"], None)
            .reconcile(&json!([{"id": "r1", "price": 1.0}, {"id": "r2", "price": 2.0}]));
        let ids = |o: &ReconciliationOutcome| o.bids.iter().map(|b| b.request_id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&split), vec!["r1", "r2"]);
        assert_eq!(ids(&split), ids(&combined));
    }

    #[test]
    fn keyed_payloads_single_and_chunked() {
        let single = engine(&["a", "b"], Some("bids"))
            .reconcile(&json!({"bids": [{"id": "b", "price": 1.0}, {"id": "a", "price": 2.0}]}));
        assert_eq!(single.bids.iter().map(|b| b.request_id.as_str()).collect::<Vec<_>>(), vec!["b", "a"]);

        let chunked = engine(&["a", "b"], Some("bids")).reconcile(&json!([
            {"bids": [{"id": "a", "price": 1.0}], "configs": [{"seller": "x"}]},
            {"bids": [{"id": "b", "price": 1.0}]}
        ]));
        assert_eq!(chunked.bids.len(), 2);
        assert_eq!(chunked.auction_configs, vec![json!({"seller": "x"})]);
    }

    #[test]
    fn malformed_bodies_yield_nothing() {
        for body in [json!(null), json!({}), json!("garbage"), json!(42), json!({"bids": "nope"})] {
            let outcome = engine(&["r1"], Some("bids")).reconcile(&body);
            assert!(outcome.bids.is_empty(), "body {} produced bids", body);
        }
        assert!(engine(&["r1"], None).reconcile(&json!(null)).bids.is_empty());
    }

    #[test]
    fn unmatched_records_are_dropped() {
        let outcome = engine(&["r1"], None).reconcile(&json!([
            {"id": "ghost", "price": 9.0},
            {"price": 1.0},
            {"id": "r1", "price": 1.0}
        ]));
        assert_eq!(outcome.bids.len(), 1);
        assert_eq!(outcome.dropped.unmatched, 1);
        assert_eq!(outcome.dropped.invalid, 1);
    }

    #[test]
    fn duplicates_for_same_request_are_kept() {
        let outcome = engine(&["r1"], None)
            .reconcile(&json!([{"id": "r1", "price": 1.0}, {"id": "r1", "price": 3.0}]));
        assert_eq!(outcome.bids.len(), 2);
        assert_eq!(outcome.bids[1].cpm, 3.0);
    }

    #[test]
    fn state_machine_closes_after_first_response() {
        let mut engine = engine(&["r1"], None);
        assert_eq!(engine.state(), RoundState::AwaitingResponse);
        let first = engine.reconcile(&json!([{"id": "r1", "price": 1.0}]));
        assert_eq!(first.bids.len(), 1);
        assert_eq!(engine.state(), RoundState::Done);
        let second = engine.reconcile(&json!([{"id": "r1", "price": 1.0}]));
        assert!(second.bids.is_empty());
        assert_eq!(engine.pending().len(), 1);
    }
}
