//! Socket abstraction underneath the realtime client.

use super::errors::{ChannelError, ChannelResult};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        Message,
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};

/// Close code of an intentional, clean close
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code reported when the peer vanished without a close frame
pub const CLOSE_ABNORMAL: u16 = 1006;
/// Close code reported when a close frame carried no code
pub const CLOSE_NO_STATUS: u16 = 1005;

/// What the socket produced next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Closed { code: u16 },
    /// Control or binary frame with no meaning to the channel
    Ignored,
}

/// One open socket.
///
/// `next_frame` must be cancel safe: the client polls it inside `select!`.
#[async_trait]
pub trait Connection: Send {
    async fn send_text(&mut self, text: String) -> ChannelResult<()>;

    async fn next_frame(&mut self) -> Frame;

    async fn close(&mut self, code: u16) -> ChannelResult<()>;
}

/// Opens connections to a URL
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> ChannelResult<Box<dyn Connection>>;
}

/// WebSocket connector over `tokio-tungstenite`
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> ChannelResult<Box<dyn Connection>> {
        let (stream, _) = connect_async(url).await?;
        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connection for WsConnection {
    async fn send_text(&mut self, text: String) -> ChannelResult<()> {
        self.stream.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn next_frame(&mut self) -> Frame {
        match self.stream.next().await {
            Some(Ok(Message::Text(text))) => Frame::Text(text.to_string()),
            Some(Ok(Message::Close(frame))) => Frame::Closed {
                code: frame.map_or(CLOSE_NO_STATUS, |frame| u16::from(frame.code)),
            },
            Some(Ok(_)) => Frame::Ignored,
            Some(Err(err)) => {
                log::warn!("WebSocket error: {}", err);
                Frame::Closed {
                    code: CLOSE_ABNORMAL,
                }
            }
            None => Frame::Closed {
                code: CLOSE_ABNORMAL,
            },
        }
    }

    async fn close(&mut self, code: u16) -> ChannelResult<()> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: String::new().into(),
        };
        match self.stream.close(Some(frame)).await {
            Ok(()) => Ok(()),
            Err(tokio_tungstenite::tungstenite::Error::ConnectionClosed) => Err(ChannelError::Closed),
            Err(err) => Err(err.into()),
        }
    }
}
