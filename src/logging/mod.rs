pub mod init;
pub mod round_log;

pub use init::init_tracing;
pub use round_log::{RoundLog, RoundStatus};
