use crate::trading::model::{DealRecord, HistoryOrderRecord};

/// 同步过程中对外广播的事件
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    SynchronizationStarted { synchronization_id: String },
    Synchronized { synchronization_id: String },
    /// 历史成交，核心不保存
    Deals(Vec<DealRecord>),
    HistoryOrders(Vec<HistoryOrderRecord>),
}
