//! Connection lifecycle for the sync client
//!
//! Each connection attempt runs in its own task. The task reports the
//! outcome of the handshake, every inbound frame, and the final close back
//! into the client's event queue. Events carry the generation of the
//! connection that produced them so the client can ignore a superseded one.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::command::FixedCommand;
use crate::io::{ConnectionFactory, FrameReader, FrameWriter};

/// State of the single logical connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    Connecting,
    Open,
    #[default]
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Open => write!(f, "Open"),
            ConnectionState::Closed => write!(f, "Closed"),
        }
    }
}

/// Everything the client's event loop reacts to
pub(crate) enum LoopEvent {
    Opened {
        generation: u64,
        writer: Box<dyn FrameWriter>,
    },
    Frame {
        generation: u64,
        payload: String,
    },
    Closed {
        generation: u64,
        reason: String,
    },
    ReconnectDue,
    Adjust {
        control_id: String,
        value: String,
    },
    Fixed(FixedCommand),
}

/// Settings for one connection attempt
#[derive(Clone)]
pub(crate) struct ConnectionConfig {
    pub url: String,
    pub timeout: Duration,
}

/// Open a connection and pump its frames until it closes
pub(crate) fn spawn_connection_task(
    factory: Arc<dyn ConnectionFactory>,
    config: ConnectionConfig,
    generation: u64,
    events: UnboundedSender<LoopEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let pair = match factory.connect(&config.url, config.timeout).await {
            Ok(pair) => pair,
            Err(e) => {
                debug!("Connection attempt {} failed: {}", generation, e);
                let _ = events.send(LoopEvent::Closed {
                    generation,
                    reason: e.to_string(),
                });
                return;
            }
        };

        if events
            .send(LoopEvent::Opened {
                generation,
                writer: pair.writer,
            })
            .is_err()
        {
            return;
        }

        read_frames(pair.reader, generation, events).await;
    })
}

async fn read_frames(
    mut reader: Box<dyn FrameReader>,
    generation: u64,
    events: UnboundedSender<LoopEvent>,
) {
    let reason = loop {
        match reader.next_frame().await {
            Ok(Some(payload)) => {
                if events.send(LoopEvent::Frame { generation, payload }).is_err() {
                    return;
                }
            }
            Ok(None) => break "Connection closed by remote".to_string(),
            Err(e) => break format!("Read error: {}", e),
        }
    };

    debug!("Connection {} ended: {}", generation, reason);
    let _ = events.send(LoopEvent::Closed { generation, reason });
}

/// One-shot timer that asks the client to connect again
pub(crate) fn spawn_reconnect_timer(
    interval: Duration,
    events: UnboundedSender<LoopEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(interval).await;
        let _ = events.send(LoopEvent::ReconnectDue);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use crate::io::{ConnectionPair, MockConnectionFactory, MockFrameReader, MockFrameWriter};
    use tokio::sync::mpsc;

    fn config() -> ConnectionConfig {
        ConnectionConfig {
            url: "ws://localhost/ws".to_string(),
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn connection_state_defaults_to_closed() {
        assert_eq!(ConnectionState::default(), ConnectionState::Closed);
        assert_eq!(ConnectionState::Open.to_string(), "Open");
    }

    #[tokio::test]
    async fn failed_connect_reports_close() {
        let mut factory = MockConnectionFactory::new();
        factory
            .expect_connect()
            .times(1)
            .returning(|_, _| {
                Box::pin(async { Err(RemoteError::ConnectionFailed("refused".to_string())) })
            });

        let (tx, mut rx) = mpsc::unbounded_channel();
        spawn_connection_task(Arc::new(factory), config(), 3, tx)
            .await
            .unwrap();

        match rx.recv().await {
            Some(LoopEvent::Closed { generation, reason }) => {
                assert_eq!(generation, 3);
                assert!(reason.contains("refused"));
            }
            _ => panic!("Expected Closed event"),
        }
    }

    #[tokio::test]
    async fn frames_follow_open_and_precede_close() {
        let mut factory = MockConnectionFactory::new();
        factory.expect_connect().times(1).returning(|_, _| {
            let mut reader = MockFrameReader::new();
            let mut frames = vec![Ok(None), Ok(Some(r#"{"Power":"On"}"#.to_string()))];
            reader.expect_next_frame().times(2).returning(move || {
                let next = frames.pop().unwrap();
                Box::pin(async move { next })
            });
            let pair = ConnectionPair {
                reader: Box::new(reader),
                writer: Box::new(MockFrameWriter::new()),
            };
            Box::pin(async move { Ok(pair) })
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        spawn_connection_task(Arc::new(factory), config(), 1, tx)
            .await
            .unwrap();

        assert!(matches!(rx.recv().await, Some(LoopEvent::Opened { generation: 1, .. })));
        match rx.recv().await {
            Some(LoopEvent::Frame { payload, .. }) => assert_eq!(payload, r#"{"Power":"On"}"#),
            _ => panic!("Expected Frame event"),
        }
        assert!(matches!(rx.recv().await, Some(LoopEvent::Closed { generation: 1, .. })));
    }

    #[tokio::test]
    async fn reconnect_timer_fires_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        spawn_reconnect_timer(Duration::from_millis(10), tx)
            .await
            .unwrap();
        assert!(matches!(rx.recv().await, Some(LoopEvent::ReconnectDue)));
        assert!(rx.recv().await.is_none());
    }
}
