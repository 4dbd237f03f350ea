//! 宿主拍卖的最小替身：驱动各 bidder 完成一轮请求与对账

pub mod runner;

pub use runner::{AuctionResult, AuctionRunner, ReceivedBid};
