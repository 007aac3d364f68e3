//! 连接通道：带生命周期状态和自动重连的双工消息传输

pub mod backoff;
pub mod connection_state;
pub mod transport;
pub mod websocket_channel;

pub use backoff::ReconnectConfig;
pub use connection_state::ConnectionState;
pub use transport::{Connector, FrameSink, FrameStream, Transport, WsConnector};
pub use websocket_channel::WebsocketChannel;
