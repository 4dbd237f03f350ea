// src/pipeline/pending.rs

use std::collections::HashMap;

use crate::model::BidRequest;

/// 一轮拍卖的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundState {
    AwaitingResponse,
    Reconciling,
    Done,
}

/// **待响应请求索引**：关联 ID → BidRequest，仅在一轮拍卖内有效。
/// 保留插入顺序，便于按原始顺序分块。
#[derive(Debug, Clone, Default)]
pub struct PendingIndex {
    entries: HashMap<String, BidRequest>,
    order: Vec<String>,
}

impl PendingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入请求，ID 已存在时拒绝并返回 false
    pub(crate) fn insert(&mut self, request: BidRequest) -> bool {
        if self.entries.contains_key(&request.bid_id) {
            return false;
        }
        self.order.push(request.bid_id.clone());
        self.entries.insert(request.bid_id.clone(), request);
        true
    }

    pub fn get(&self, id: &str) -> Option<&BidRequest> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// 按插入顺序返回关联 ID
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// 按插入顺序返回请求
    pub fn requests(&self) -> impl Iterator<Item = &BidRequest> {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }
}
