//! 拍卖分析上报

pub mod adxcg;
pub mod events;

pub use adxcg::AdxcgAnalytics;
pub use events::{AnalyticsEvent, TimedOutBid};

/// 分析 adapter：订阅拍卖生命周期事件，自行决定何时上报
pub trait AnalyticsAdapter: Send + Sync {
    fn code(&self) -> &str;

    fn track(&self, event: &AnalyticsEvent);
}
