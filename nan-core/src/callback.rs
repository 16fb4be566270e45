//! Application-facing notification targets and the event masks that gate them.
//! A callback is only invoked for events its mask selects.

use std::ops::{BitOr, BitOrAssign};

use crate::config::ConfigRequest;
use crate::types::{FailReason, PeerId, SessionId, StatusCode, TerminateReason};

macro_rules! event_mask {
    ($(#[$meta:meta])* $name:ident { $($(#[$fmeta:meta])* $flag:ident = $bit:expr,)+ }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Default)]
        pub struct $name(u32);

        impl $name {
            $($(#[$fmeta])* pub const $flag: Self = Self(1 << $bit);)+
            pub const NONE: Self = Self(0);
            pub const ALL: Self = Self(0 $(| (1 << $bit))+);

            pub fn from_bits(bits: u32) -> Self {
                Self(bits & Self::ALL.0)
            }

            pub fn bits(self) -> u32 {
                self.0
            }

            pub fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            pub fn without(self, other: Self) -> Self {
                Self(self.0 & !other.0)
            }
        }

        impl BitOr for $name {
            type Output = Self;
            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }
    };
}

event_mask!(
    /// Device-wide events a client listens for.
    ClientEvents {
        CONFIG_COMPLETED = 0,
        CONFIG_FAILED = 1,
        /// Interface address or cluster changed.
        IDENTITY_CHANGED = 2,
        NAN_DOWN = 3,
    }
);

event_mask!(
    /// Session-scoped events a session callback listens for.
    SessionEvents {
        PUBLISH_FAIL = 0,
        PUBLISH_TERMINATED = 1,
        SUBSCRIBE_FAIL = 2,
        SUBSCRIBE_TERMINATED = 3,
        MATCH = 4,
        MESSAGE_SEND_SUCCESS = 5,
        MESSAGE_SEND_FAIL = 6,
        MESSAGE_RECEIVED = 7,
        /// First successful publish or subscribe; updates are not reported.
        SESSION_STARTED = 8,
    }
);

/// Client-level notifications. Invoked on the coordinator's worker thread.
pub trait EventCallback: Send + Sync {
    fn on_config_completed(&self, config: &ConfigRequest);
    fn on_config_failed(&self, config: &ConfigRequest, reason: FailReason);
    fn on_nan_down(&self, reason: StatusCode);
    /// The discovery interface address changed. The address itself is withheld.
    fn on_identity_changed(&self);
}

/// Session-level notifications. Peer link-layer addresses are never passed here;
/// peers are named only by their [`PeerId`].
pub trait SessionCallback: Send + Sync {
    fn on_session_started(&self, session_id: SessionId);
    fn on_publish_fail(&self, reason: FailReason);
    fn on_publish_terminated(&self, reason: TerminateReason);
    fn on_subscribe_fail(&self, reason: FailReason);
    fn on_subscribe_terminated(&self, reason: TerminateReason);
    fn on_match(&self, peer: PeerId, service_specific_info: &[u8], match_filter: &[u8]);
    fn on_message_send_success(&self, message_id: u32);
    fn on_message_send_fail(&self, message_id: u32, reason: FailReason);
    fn on_message_received(&self, peer: PeerId, message: &[u8]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_combine_and_test() {
        let m = SessionEvents::MATCH | SessionEvents::MESSAGE_RECEIVED;
        assert!(m.contains(SessionEvents::MATCH));
        assert!(!m.contains(SessionEvents::PUBLISH_FAIL));
        assert!(SessionEvents::ALL.contains(m));
        assert!(!SessionEvents::ALL
            .without(SessionEvents::PUBLISH_FAIL)
            .contains(SessionEvents::PUBLISH_FAIL));
    }

    #[test]
    fn from_bits_drops_unknown_flags() {
        let m = ClientEvents::from_bits(0xFFFF_FFFF);
        assert_eq!(m, ClientEvents::ALL);
        assert_eq!(ClientEvents::ALL.bits(), 0b1111);
        assert!(SessionEvents::ALL.contains(SessionEvents::SESSION_STARTED));
    }
}
