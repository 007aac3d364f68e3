//! 显式的观察者注册
//!
//! 每个订阅者拿到一个独立的无界通道，按发布顺序接收完整的事件负载。
//! 发布方从不等待订阅者，已关闭的接收端在下一次发布时被清理。

use std::sync::Mutex;

use tokio::sync::mpsc;

pub struct Observers<T: Clone> {
    senders: Mutex<Vec<mpsc::UnboundedSender<T>>>,
}

impl<T: Clone> Default for Observers<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Observers<T> {
    pub fn new() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
        }
    }

    /// 注册一个新的订阅者
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(tx);
        rx
    }

    /// 向所有存活的订阅者广播
    pub fn publish(&self, event: &T) {
        self.lock().retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::UnboundedSender<T>>> {
        self.senders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
