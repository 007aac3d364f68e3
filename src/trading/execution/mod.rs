pub mod coordinator;
pub mod execution_state;
pub mod reconcile;
pub mod validation;

use std::time::Duration;

pub use coordinator::TradeExecutionCoordinator;
pub use execution_state::{ExecutionConfirmation, ExecutionState};

/// 交易执行配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionConfig {
    /// 提交后等待账户状态反映结果的最长时间
    pub confirmation_timeout: Duration,
    /// 按品种/方向/手数对账时，开仓时间允许早于提交时间的范围（券商时钟偏差）
    pub reconciliation_window: Duration,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout: Duration::from_secs(30),
            reconciliation_window: Duration::from_secs(5),
        }
    }
}
