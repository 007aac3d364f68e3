pub mod analysis;
pub mod execution;
pub mod model;
pub mod store;
pub mod sync;
pub mod trading_core;

pub use trading_core::TradingCore;
