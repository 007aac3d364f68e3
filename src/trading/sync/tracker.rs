use std::collections::HashMap;

use tracing::debug;

/// 同步握手进度
///
/// 每次发出 `synchronize` 都带一个新的 synchronizationId，只有收到同一 id、同一账户的
/// `synchronized` 事件后才认为账户已同步。连接断开时所有未完成的同步作废。
#[derive(Debug, Default)]
pub struct SyncTracker {
    // synchronizationId -> accountId
    outstanding: HashMap<String, String>,
    current: Option<String>,
    synchronized: bool,
}

impl SyncTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次新发出的同步请求；之前未完成的请求作废
    pub fn begin(&mut self, synchronization_id: &str, account_id: &str) {
        self.outstanding.clear();
        self.outstanding
            .insert(synchronization_id.to_string(), account_id.to_string());
        self.current = Some(synchronization_id.to_string());
        self.synchronized = false;
    }

    /// 全量数据是否属于当前同步；不带 id 的推送按当前同步处理
    pub fn accepts(&self, synchronization_id: Option<&str>) -> bool {
        match synchronization_id {
            Some(id) => self.current.as_deref() == Some(id),
            None => true,
        }
    }

    /// 收到 synchronizationStarted；只认当前同步
    pub fn on_started(&self, synchronization_id: &str, account_id: &str) -> bool {
        let matched = self.matches(synchronization_id, account_id);
        if !matched {
            debug!("忽略过期的synchronizationStarted: {}", synchronization_id);
        }
        matched
    }

    /// 收到 synchronized；返回本次是否完成了当前同步
    pub fn on_synchronized(&mut self, synchronization_id: &str, account_id: &str) -> bool {
        if !self.matches(synchronization_id, account_id) {
            debug!("忽略不匹配的synchronized: {}", synchronization_id);
            return false;
        }
        self.outstanding.remove(synchronization_id);
        self.synchronized = true;
        true
    }

    pub fn is_synchronized(&self) -> bool {
        self.synchronized
    }

    /// 连接断开，之前的同步全部失效
    pub fn reset(&mut self) {
        self.outstanding.clear();
        self.current = None;
        self.synchronized = false;
    }

    fn matches(&self, synchronization_id: &str, account_id: &str) -> bool {
        self.outstanding
            .get(synchronization_id)
            .map(|expected| expected == account_id)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synchronized_requires_matching_id_and_account() {
        let mut tracker = SyncTracker::new();
        tracker.begin("s1", "acct-1");
        assert!(!tracker.is_synchronized());

        assert!(!tracker.on_synchronized("s0", "acct-1"));
        assert!(!tracker.on_synchronized("s1", "acct-2"));
        assert!(!tracker.is_synchronized());

        assert!(tracker.on_started("s1", "acct-1"));
        assert!(tracker.on_synchronized("s1", "acct-1"));
        assert!(tracker.is_synchronized());
    }

    #[test]
    fn test_new_synchronization_invalidates_previous() {
        let mut tracker = SyncTracker::new();
        tracker.begin("s1", "acct-1");
        tracker.begin("s2", "acct-1");
        assert!(!tracker.on_synchronized("s1", "acct-1"));
        assert!(!tracker.accepts(Some("s1")));
        assert!(tracker.accepts(Some("s2")));
        assert!(tracker.on_synchronized("s2", "acct-1"));

        tracker.reset();
        assert!(!tracker.is_synchronized());
        assert!(!tracker.accepts(Some("s2")));
    }
}
