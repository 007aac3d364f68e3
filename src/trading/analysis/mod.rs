//! 基于账户状态快照的盈亏与风险计算

pub mod pnl_calculator;
pub mod portfolio_metrics;

pub use portfolio_metrics::PortfolioMetrics;
