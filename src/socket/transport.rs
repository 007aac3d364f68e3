use std::pin::Pin;

use async_trait::async_trait;
use futures::future;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::debug;

use crate::error::TransportError;

pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// 一次建立成功的双工会话：写端发送文本帧，读端按到达顺序产出文本帧
pub struct Transport {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Transport {
    pub fn new(sink: FrameSink, stream: FrameStream) -> Self {
        Self { sink, stream }
    }
}

/// 建立底层会话的能力抽象，通道每次（重）连都会调用一次
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<Transport, TransportError>;
}

/// 基于 tokio-tungstenite 的 websocket 连接器
#[derive(Debug, Default, Clone)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, endpoint: &str) -> Result<Transport, TransportError> {
        let (ws_stream, response) = connect_async(endpoint)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        debug!(
            "WebSocket handshake has been successfully completed, status={}",
            response.status()
        );

        let (write, read) = ws_stream.split();

        let sink = write
            .sink_map_err(TransportError::from)
            .with(|text: String| future::ready(Ok::<Message, TransportError>(Message::Text(text))));

        let stream = read.filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => Some(Ok(text)),
                    Err(e) => {
                        debug!("丢弃非UTF-8二进制帧: {}", e);
                        None
                    }
                },
                Ok(Message::Close(frame)) => {
                    debug!("websocket收到关闭帧: {:?}", frame);
                    Some(Err(TransportError::Closed))
                }
                // ping/pong 由 tungstenite 自动应答
                Ok(_) => None,
                Err(e) => Some(Err(TransportError::from(e))),
            })
        });

        Ok(Transport::new(Box::pin(sink), Box::pin(stream)))
    }
}
