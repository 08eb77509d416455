//! Session signaling records.
//!
//! The signaling collaborator parses management frames and hands this core
//! plain records. Nothing here touches the wire.

use std::time::Duration;

use crate::buffer::SeqNum;
use crate::core::{PeerId, Tid};

/// A session-setup request, locally initiated or parsed from a peer's
/// request frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionRequest {
    /// Traffic class the session covers.
    pub tid: Tid,
    /// The peer on the other end.
    pub peer: PeerId,
    /// Starting sequence number: the first frame the window expects.
    pub ssn: SeqNum,
    /// Requested reorder window size, clamped during setup.
    pub window_size: u16,
    /// Requested inactivity timeout. Zero disables inactivity teardown;
    /// anything else is clamped during setup.
    pub timeout: Duration,
}

/// One signaling event from the session collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSignal {
    /// Start a session (local or peer-initiated request).
    Setup(SessionRequest),
    /// The peer answered our setup request.
    SetupAck {
        /// Traffic class of the session.
        tid: Tid,
        /// The answering peer.
        peer: PeerId,
        /// Whether the peer accepted.
        ack: bool,
    },
    /// Tear the session down.
    Teardown {
        /// Traffic class of the session.
        tid: Tid,
        /// The requesting peer.
        peer: PeerId,
    },
}

impl SessionSignal {
    /// Traffic class this signal concerns.
    pub fn tid(&self) -> Tid {
        match self {
            SessionSignal::Setup(req) => req.tid,
            SessionSignal::SetupAck { tid, .. } => *tid,
            SessionSignal::Teardown { tid, .. } => *tid,
        }
    }

    /// Peer this signal concerns.
    pub fn peer(&self) -> PeerId {
        match self {
            SessionSignal::Setup(req) => req.peer,
            SessionSignal::SetupAck { peer, .. } => *peer,
            SessionSignal::Teardown { peer, .. } => *peer,
        }
    }
}
