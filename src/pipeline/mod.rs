//! 出价对账管道：打标 → 发送 → 对账 → 标准化出价

pub mod engine;
pub mod normalizer;
pub mod pending;
pub mod tagger;

pub use engine::{DropStats, ReconciliationEngine, ReconciliationOutcome};
pub use normalizer::{finish_video, is_biddable_price, FieldReader, ResponseNormalizer};
pub use pending::{PendingIndex, RoundState};
pub use tagger::{OutgoingTag, RequestTagger, TagBuilder, TaggedRound, DEFAULT_CHUNK_SIZE};
