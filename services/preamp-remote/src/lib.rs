//! Preamp Remote
//!
//! Live state sync client for the VxD preamp's web remote. The preamp serves
//! a WebSocket at `ws://<host>/ws`; on connect the client requests the full
//! state with `getValues`, writes every state message it receives into a
//! [`ControlPanel`], and forwards user input back as short text commands.
//! A lost connection is retried after a fixed delay for as long as the
//! client runs.

pub mod client;
pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod fields;
pub mod io;
pub mod panel;
pub mod snapshot;

pub use client::{ClientHandle, SyncClient};
pub use command::{AdjustSeparator, Command, FixedCommand};
pub use config::{
    load_config, CommandConfig, Config, GatewayConfig, PanelConfig, ReconnectConfig,
};
pub use connection::ConnectionState;
pub use error::{RemoteError, Result};
pub use events::SyncEvent;
pub use fields::{ApplyReport, FieldRule, FieldTable};
pub use io::{ConnectionFactory, ConnectionPair, FrameReader, FrameWriter, WsConnectionFactory};
pub use panel::{ControlPanel, Element, MemoryPanel};
pub use snapshot::{FieldValue, StateSnapshot};
