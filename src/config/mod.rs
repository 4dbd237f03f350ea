pub mod adapters;
pub mod config_manager;

pub use adapters::{ConfigAdapter, FileConfigAdapter};
pub use config_manager::{AnalyticsOptions, BidderSettings, ConfigData, ConfigManager, DEFAULT_TIMEOUT_MS};
