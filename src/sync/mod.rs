pub mod user_sync;

pub use user_sync::{filter_sync_urls, SyncCache, SyncCapabilities, SyncType, UserSync};
