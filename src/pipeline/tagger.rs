// src/pipeline/tagger.rs

use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::model::{AuctionContext, BidRequest};
use crate::pipeline::pending::PendingIndex;

/// adtelligent 等批量接口的默认分块大小
pub const DEFAULT_CHUNK_SIZE: usize = 10;

/// 供应商请求体构造：单个广告位映射 + 外层信封
pub trait TagBuilder {
    fn placement(&self, request: &BidRequest, ctx: &AuctionContext) -> Value;

    fn envelope(&self, requests: &[&BidRequest], placements: Vec<Value>, ctx: &AuctionContext) -> Value;
}

/// 一次 HTTP 调用的供应商请求体
#[derive(Debug, Clone)]
pub struct OutgoingTag {
    pub request_ids: Vec<String>,
    pub body: Value,
}

#[derive(Debug, Default)]
pub struct TaggedRound {
    pub pending: PendingIndex,
    pub tags: Vec<OutgoingTag>,
}

/// **请求打标器**
#[derive(Debug, Clone, Copy)]
pub struct RequestTagger {
    chunk_size: Option<usize>,
}

impl RequestTagger {
    /// 每个请求体最多包含 `chunk_size` 个广告位，0 视为不分块
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: (chunk_size > 0).then_some(chunk_size),
        }
    }

    pub fn unchunked() -> Self {
        Self { chunk_size: None }
    }

    pub fn chunk_size(&self) -> Option<usize> {
        self.chunk_size
    }

    /// 为请求分配/读取关联 ID，建立索引并生成请求体
    pub fn tag(&self, requests: &[BidRequest], ctx: &AuctionContext, builder: &dyn TagBuilder) -> TaggedRound {
        let mut pending = PendingIndex::new();
        for request in requests {
            let mut request = request.clone();
            if request.bid_id.is_empty() || pending.contains(&request.bid_id) {
                let fresh = Uuid::new_v4().to_string();
                debug!(
                    ad_unit = %request.ad_unit_code,
                    previous = %request.bid_id,
                    assigned = %fresh,
                    "assigning correlation id"
                );
                request.bid_id = fresh;
            }
            pending.insert(request);
        }

        if pending.is_empty() {
            return TaggedRound::default();
        }

        let ordered: Vec<&BidRequest> = pending.requests().collect();
        let chunk_size = self.chunk_size.unwrap_or(ordered.len());
        let tags = ordered
            .chunks(chunk_size)
            .map(|chunk| {
                let placements = chunk.iter().map(|r| builder.placement(r, ctx)).collect();
                OutgoingTag {
                    request_ids: chunk.iter().map(|r| r.bid_id.clone()).collect(),
                    body: builder.envelope(chunk, placements, ctx),
                }
            })
            .collect();

        TaggedRound { pending, tags }
    }
}
