//! Notifications broadcast by the sync client

use crate::fields::ApplyReport;
use crate::snapshot::StateSnapshot;

/// Observable progress of the sync client
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A connection attempt started
    Connecting { attempt: u64 },

    /// The connection is open; `getValues` follows immediately
    Connected,

    /// The connection closed or could not be opened
    Disconnected { reason: String },

    /// A frame was handed to the transport
    CommandSent { frame: String },

    /// A state message was written into the panel
    StateApplied {
        snapshot: StateSnapshot,
        report: ApplyReport,
    },

    /// A state message could not be parsed and was dropped
    PayloadRejected { reason: String },
}
