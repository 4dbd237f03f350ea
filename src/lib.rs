//! Header-bidding bidder adapters：请求打标、响应对账、出价标准化，
//! 以及围绕它们的传输、配置、日志与分析上报。

pub mod analytics;
pub mod auction;
pub mod bidders;
pub mod config;
pub mod error;
pub mod logging;
pub mod mock_vendor;
pub mod model;
pub mod pipeline;
pub mod render;
pub mod sync;
pub mod telemetry;
pub mod transport;
