use thiserror::Error;

/// 应用错误
#[derive(Error, Debug)]
pub enum AppError {
    /// 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// 连接层错误
    #[error("连接错误: {0}")]
    TransportError(#[from] TransportError),

    /// 协议解析错误
    #[error("协议错误: {0}")]
    ProtocolError(#[from] ProtocolError),

    /// 交易执行错误
    #[error("交易执行错误: {0}")]
    ExecutionError(#[from] ExecutionError),
}

pub type AppResult<T> = Result<T, AppError>;

/// 传输层错误：只会驱动连接状态变化，不会同步抛给 `send` 的调用方
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("websocket连接失败: {0}")]
    Connect(String),

    #[error("websocket读写失败: {0}")]
    Io(String),

    #[error("连接已关闭")]
    Closed,

    #[error("消息编码失败: {0}")]
    Encode(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed,
            other => TransportError::Io(other.to_string()),
        }
    }
}

/// 协议错误：记录日志后丢弃该条消息，不影响连接
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("消息格式错误: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("缺少type字段")]
    MissingType,
}

/// 交易请求字段校验错误，发生在任何网络请求之前
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol不能为空")]
    InvalidSymbol,

    #[error("volume必须大于0, 当前: {0}")]
    InvalidVolume(String),

    #[error("止损价{stop_loss}与止盈价{take_profit}的顺序不符合{side}方向")]
    InvalidStopLoss {
        side: String,
        stop_loss: String,
        take_profit: String,
    },
}

impl ValidationError {
    /// 校验失败的字段名
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::InvalidSymbol => "symbol",
            ValidationError::InvalidVolume(_) => "volume",
            ValidationError::InvalidStopLoss { .. } => "stopLoss",
        }
    }
}

/// 交易执行错误，执行器在上报后总会回到 Idle
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("请求校验失败: {0}")]
    Validation(#[from] ValidationError),

    #[error("账户未连接或尚未完成同步")]
    NotConnected,

    #[error("已有交易在执行中")]
    Busy,

    #[error("等待成交确认超时")]
    Timeout,

    #[error("持仓不存在: {0}")]
    PositionNotFound(String),

    #[error("网关拒绝: code={code}, message={message}")]
    Gateway { code: String, message: String },
}
