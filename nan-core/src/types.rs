//! Identifiers and reason codes shared by clients, sessions and the hardware boundary.
//! All identifiers are process-local; none are persisted.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident($inner:ty)) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub $inner);

        impl $name {
            pub fn value(self) -> $inner {
                self.0
            }
        }

        impl From<$inner> for $name {
            fn from(v: $inner) -> Self {
                $name(v)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Client handle; unique while the client is connected.
    ClientId(u32)
);
id_type!(
    /// Discovery session handle, scoped to its owning client.
    SessionId(u32)
);
id_type!(
    /// Correlates one outstanding hardware request with its asynchronous response.
    TransactionId(u16)
);
id_type!(
    /// Hardware-assigned id of a live publish or subscribe. Zero means "none" on the wire.
    PubSubId(u32)
);
id_type!(
    /// Requestor instance id: transient id the hardware assigns to a discovered peer.
    PeerId(u32)
);

/// Link-layer address of a peer. Never handed to application callbacks.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Default, Serialize, Deserialize)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl fmt::Debug for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddress({})", self)
    }
}

/// Why a publish, subscribe or message transmission failed.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum FailReason {
    NoResources,
    InvalidArgs,
    /// Session has no live discovery id, or the peer is not in its cache.
    NoMatchSession,
    SessionTerminated,
    Other,
}

/// Why a live publish or subscribe ended.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum TerminateReason {
    /// Ran to completion (count or ttl exhausted).
    Done,
    Fail,
}

/// Raw reason code carried by hardware failure and down events.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct StatusCode(pub i32);

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the device's cluster membership changed.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ClusterChange {
    Started,
    Joined,
}
