pub mod env;
pub mod log;
pub mod sync_config;

pub use sync_config::SyncConfig;
