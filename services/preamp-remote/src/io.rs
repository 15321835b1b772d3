//! I/O traits and implementations for the preamp WebSocket
//!
//! These traits split a connection into a frame reader and a frame writer
//! and abstract how connections are opened, so the sync client can be
//! driven by scripted connections in tests.
//!
//! The default implementation uses tokio-tungstenite.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::error::{RemoteError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection pair containing a reader and writer
pub struct ConnectionPair {
    pub reader: Box<dyn FrameReader>,
    pub writer: Box<dyn FrameWriter>,
}

// ============================================================================
// FrameReader
// ============================================================================

/// Reads inbound text frames
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait FrameReader: Send {
    /// Returns `Ok(Some(frame))` for a text frame, `Ok(None)` once the
    /// connection is closed, or an error if the transport failed.
    async fn next_frame(&mut self) -> Result<Option<String>>;
}

/// WebSocket implementation of FrameReader
pub struct WsFrameReader {
    stream: SplitStream<WsStream>,
}

impl WsFrameReader {
    pub fn new(stream: SplitStream<WsStream>) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl FrameReader for WsFrameReader {
    async fn next_frame(&mut self) -> Result<Option<String>> {
        while let Some(message) = self.stream.next().await {
            match message? {
                Message::Text(text) => return Ok(Some(text.as_str().to_owned())),
                Message::Binary(data) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => return Ok(Some(text)),
                    Err(_) => debug!("Ignoring non-UTF-8 binary frame ({} bytes)", data.len()),
                },
                Message::Close(frame) => {
                    debug!("Close frame received: {:?}", frame);
                    return Ok(None);
                }
                // ping/pong replies are handled by tungstenite
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
        Ok(None)
    }
}

// ============================================================================
// FrameWriter
// ============================================================================

/// Writes outbound text frames
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait FrameWriter: Send {
    /// Send one text frame
    async fn send_frame(&mut self, frame: &str) -> Result<()>;

    /// Close the connection
    async fn close(&mut self) -> Result<()>;
}

/// WebSocket implementation of FrameWriter
pub struct WsFrameWriter {
    sink: SplitSink<WsStream, Message>,
}

impl WsFrameWriter {
    pub fn new(sink: SplitSink<WsStream, Message>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl FrameWriter for WsFrameWriter {
    async fn send_frame(&mut self, frame: &str) -> Result<()> {
        self.sink
            .send(Message::text(frame.to_owned()))
            .await
            .map_err(|e| RemoteError::SendError(e.to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        self.sink.close().await.map_err(RemoteError::WebSocket)
    }
}

// ============================================================================
// ConnectionFactory
// ============================================================================

/// Opens connections to the preamp
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait ConnectionFactory: Send + Sync {
    /// Connect to `url`, giving up after `timeout`
    async fn connect(&self, url: &str, timeout: Duration) -> Result<ConnectionPair>;
}

/// tokio-tungstenite implementation of ConnectionFactory
#[derive(Default, Clone)]
pub struct WsConnectionFactory;

impl WsConnectionFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ConnectionFactory for WsConnectionFactory {
    async fn connect(&self, url: &str, timeout: Duration) -> Result<ConnectionPair> {
        debug!("Connecting to {} with timeout {:?}", url, timeout);

        let (stream, response) =
            tokio::time::timeout(timeout, tokio_tungstenite::connect_async(url))
                .await
                .map_err(|_| RemoteError::Timeout(format!("Connection to {} timed out", url)))?
                .map_err(|e| {
                    RemoteError::ConnectionFailed(format!("Failed to connect to {}: {}", url, e))
                })?;

        debug!("WebSocket handshake completed: {}", response.status());

        let (sink, stream) = stream.split();
        Ok(ConnectionPair {
            reader: Box::new(WsFrameReader::new(stream)),
            writer: Box::new(WsFrameWriter::new(sink)),
        })
    }
}
