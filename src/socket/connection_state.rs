use serde::Serialize;
use std::fmt;

/// 连接通道的生命周期状态
///
/// 只有一个通道实例持有该状态，状态变化按顺序推送给所有监听者。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
    Reconnecting { attempt: u32 },
    Failed { reason: String },
}

impl ConnectionState {
    /// 正在连接或已连接，此时重复调用 connect 不会产生新的连接
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting
                | ConnectionState::Connected
                | ConnectionState::Reconnecting { .. }
        )
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Disconnected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Disconnecting => write!(f, "disconnecting"),
            ConnectionState::Reconnecting { attempt } => write!(f, "reconnecting({})", attempt),
            ConnectionState::Failed { reason } => write!(f, "failed({})", reason),
        }
    }
}
