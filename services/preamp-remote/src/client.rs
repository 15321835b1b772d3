//! Live state sync client
//!
//! [`SyncClient`] owns the connection, the control panel and the field
//! table. Its [`run`](SyncClient::run) loop handles one event at a time:
//! connection lifecycle, inbound state messages, and user input arriving
//! through a [`ClientHandle`]. No two handlers ever run concurrently.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::{AdjustSeparator, Command, FixedCommand};
use crate::config::Config;
use crate::connection::{
    spawn_connection_task, spawn_reconnect_timer, ConnectionConfig, ConnectionState, LoopEvent,
};
use crate::error::{RemoteError, Result};
use crate::events::SyncEvent;
use crate::fields::FieldTable;
use crate::io::{ConnectionFactory, FrameWriter, WsConnectionFactory};
use crate::panel::ControlPanel;
use crate::snapshot::StateSnapshot;

/// Cloneable handle used by UI bindings to drive a running [`SyncClient`]
#[derive(Clone)]
pub struct ClientHandle {
    events: mpsc::UnboundedSender<LoopEvent>,
    notifications: broadcast::Sender<SyncEvent>,
    state: Arc<RwLock<ConnectionState>>,
    cancel: CancellationToken,
}

impl ClientHandle {
    /// A control was moved to `value`
    pub fn adjust(&self, control_id: impl Into<String>, value: impl Into<String>) -> Result<()> {
        self.dispatch(LoopEvent::Adjust {
            control_id: control_id.into(),
            value: value.into(),
        })
    }

    /// A parameterless control was pressed
    pub fn send_fixed(&self, command: FixedCommand) -> Result<()> {
        self.dispatch(LoopEvent::Fixed(command))
    }

    /// Subscribe to client notifications
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.notifications.subscribe()
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Stop the client; `run` closes the connection and returns
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    fn dispatch(&self, event: LoopEvent) -> Result<()> {
        self.events
            .send(event)
            .map_err(|_| RemoteError::SendError("sync client has stopped".to_string()))
    }
}

/// Keeps a control panel in sync with the preamp over a WebSocket
pub struct SyncClient<P: ControlPanel> {
    connection: ConnectionConfig,
    reconnect_interval: Duration,
    separator: AdjustSeparator,
    fields: FieldTable,
    panel: P,
    factory: Arc<dyn ConnectionFactory>,
    handle: ClientHandle,
    events: mpsc::UnboundedReceiver<LoopEvent>,
    writer: Option<Box<dyn FrameWriter>>,
    generation: u64,
    connection_task: Option<JoinHandle<()>>,
    reconnect_timer: Option<JoinHandle<()>>,
}

impl<P: ControlPanel> SyncClient<P> {
    /// Create a client that connects with tokio-tungstenite
    pub fn new(config: &Config, panel: P) -> Result<Self> {
        Self::with_connection_factory(config, panel, Arc::new(WsConnectionFactory::new()))
    }

    /// Create a client with a custom connection factory
    pub fn with_connection_factory(
        config: &Config,
        panel: P,
        factory: Arc<dyn ConnectionFactory>,
    ) -> Result<Self> {
        let url = config.gateway.url()?;
        let reconnect_interval = config.reconnect.interval()?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (notifications, _) = broadcast::channel(100);

        Ok(Self {
            connection: ConnectionConfig {
                url: url.to_string(),
                timeout: Duration::from_secs(config.gateway.connection_timeout_seconds),
            },
            reconnect_interval,
            separator: config.commands.separator,
            fields: FieldTable::with_overrides(&config.fields),
            panel,
            factory,
            handle: ClientHandle {
                events: events_tx,
                notifications,
                state: Arc::new(RwLock::new(ConnectionState::Closed)),
                cancel: CancellationToken::new(),
            },
            events: events_rx,
            writer: None,
            generation: 0,
            connection_task: None,
            reconnect_timer: None,
        })
    }

    pub fn handle(&self) -> ClientHandle {
        self.handle.clone()
    }

    pub fn url(&self) -> &str {
        &self.connection.url
    }

    pub fn panel(&self) -> &P {
        &self.panel
    }

    /// Run until [`ClientHandle::shutdown`] is called, then hand the panel back
    pub async fn run(mut self) -> P {
        self.initialize().await;

        let cancel = self.handle.cancel.clone();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
            }
        }

        self.teardown().await;
        self.panel
    }

    async fn initialize(&mut self) {
        info!("Starting live state sync with {}", self.connection.url);
        self.connect().await;
    }

    async fn handle_event(&mut self, event: LoopEvent) {
        match event {
            LoopEvent::Opened { generation, writer } => {
                self.on_connection_open(generation, writer).await
            }
            LoopEvent::Frame {
                generation,
                payload,
            } => {
                if generation == self.generation {
                    self.on_state_message(&payload);
                } else {
                    debug!("Ignoring frame from superseded connection {}", generation);
                }
            }
            LoopEvent::Closed { generation, reason } => {
                self.on_connection_closed(generation, reason).await
            }
            LoopEvent::ReconnectDue => {
                self.reconnect_timer = None;
                self.connect().await;
            }
            LoopEvent::Adjust { control_id, value } => {
                self.on_user_adjust(&control_id, &value).await
            }
            LoopEvent::Fixed(command) => self.on_fixed_command(command).await,
        }
    }

    /// Start a new connection attempt, replacing the previous connection
    async fn connect(&mut self) {
        self.generation += 1;
        if let Some(task) = self.connection_task.take() {
            task.abort();
        }
        self.set_state(ConnectionState::Connecting).await;

        info!(
            "Trying to open a WebSocket connection to {} (attempt {})",
            self.connection.url, self.generation
        );
        self.notify(SyncEvent::Connecting {
            attempt: self.generation,
        });

        self.connection_task = Some(spawn_connection_task(
            Arc::clone(&self.factory),
            self.connection.clone(),
            self.generation,
            self.handle.events.clone(),
        ));
    }

    async fn on_connection_open(&mut self, generation: u64, mut writer: Box<dyn FrameWriter>) {
        if generation != self.generation {
            debug!("Discarding superseded connection {}", generation);
            let _ = writer.close().await;
            return;
        }

        info!("Connection opened");
        self.writer = Some(writer);
        self.set_state(ConnectionState::Open).await;
        self.notify(SyncEvent::Connected);

        if let Err(e) = self.send(Command::GetValues).await {
            warn!("Failed to request current state: {}", e);
        }
    }

    async fn on_connection_closed(&mut self, generation: u64, reason: String) {
        if generation != self.generation {
            debug!("Ignoring close of superseded connection {}", generation);
            return;
        }
        if self.reconnect_timer.is_some() {
            debug!("Reconnect already scheduled");
            return;
        }

        if let Some(mut writer) = self.writer.take() {
            let _ = writer.close().await;
        }
        self.set_state(ConnectionState::Closed).await;

        info!(
            "Connection closed: {}; reconnecting in {:?}",
            reason, self.reconnect_interval
        );
        self.notify(SyncEvent::Disconnected { reason });

        self.reconnect_timer = Some(spawn_reconnect_timer(
            self.reconnect_interval,
            self.handle.events.clone(),
        ));
    }

    fn on_state_message(&mut self, payload: &str) {
        debug!("Recv: {}", payload);

        let snapshot = match StateSnapshot::parse(payload) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Dropping malformed state message: {}", e);
                self.notify(SyncEvent::PayloadRejected {
                    reason: e.to_string(),
                });
                return;
            }
        };

        let report = self.fields.apply(&mut self.panel, &snapshot);
        self.notify(SyncEvent::StateApplied { snapshot, report });
    }

    async fn on_user_adjust(&mut self, control_id: &str, value: &str) {
        // local echo, independent of the device's reply
        let echo = self
            .panel
            .set_value(control_id, value)
            .and_then(|()| self.panel.set_text(control_id, value));
        if let Err(e) = echo {
            warn!("Cannot echo adjustment locally: {}", e);
        }

        if let Err(e) = self.send(Command::adjust(control_id, value)).await {
            warn!("Dropping adjustment of '{}': {}", control_id, e);
        }
    }

    async fn on_fixed_command(&mut self, command: FixedCommand) {
        if let Err(e) = self.send(command.into()).await {
            warn!("Dropping '{}': {}", command, e);
        }
    }

    async fn send(&mut self, command: Command) -> Result<()> {
        let frame = command.encode(self.separator);
        let writer = self.writer.as_mut().ok_or(RemoteError::NotConnected)?;

        debug!("Sent: {}", frame);
        writer.send_frame(&frame).await?;
        self.notify(SyncEvent::CommandSent { frame });
        Ok(())
    }

    async fn teardown(&mut self) {
        debug!("Stopping live state sync");
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
        if let Some(task) = self.connection_task.take() {
            task.abort();
        }
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.close().await;
        }
        self.set_state(ConnectionState::Closed).await;
    }

    async fn set_state(&mut self, state: ConnectionState) {
        let mut guard = self.handle.state.write().await;
        if *guard != state {
            debug!("Connection state: {} -> {}", *guard, state);
            *guard = state;
        }
    }

    fn notify(&self, event: SyncEvent) {
        let _ = self.handle.notifications.send(event);
    }
}
