//! One publish or subscribe discovery instance.
//!
//! A session commits to a mode on its first start call and keeps it for life. It
//! holds the hardware-assigned discovery id while that id is valid, and a bounded
//! cache of the link-layer addresses of peers it has heard from.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tracing::{debug, warn};

use crate::callback::{SessionCallback, SessionEvents};
use crate::discovery::{PublishConfig, SubscribeConfig};
use crate::error::NanError;
use crate::hal::NanHal;
use crate::transaction::{TransactionRecord, TransactionTable};
use crate::types::{
    ClientId, FailReason, MacAddress, PeerId, PubSubId, SessionId, TerminateReason, TransactionId,
};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum SessionMode {
    Uninitialized,
    Publishing,
    Subscribing,
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionMode::Uninitialized => "uninitialized",
            SessionMode::Publishing => "publishing",
            SessionMode::Subscribing => "subscribing",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("session already {committed}, cannot switch to {requested}")]
    ModeMismatch {
        committed: SessionMode,
        requested: SessionMode,
    },
}

pub struct Session {
    client_id: ClientId,
    session_id: SessionId,
    callback: Arc<dyn SessionCallback>,
    events: SessionEvents,
    mode: SessionMode,
    /// Some only while the discovery id is valid.
    pub_sub_id: Option<PubSubId>,
    peers: LruCache<PeerId, MacAddress>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("client_id", &self.client_id)
            .field("session_id", &self.session_id)
            .field("events", &self.events)
            .field("mode", &self.mode)
            .field("pub_sub_id", &self.pub_sub_id)
            .field("peers", &self.peers.len())
            .finish()
    }
}

impl Session {
    pub fn new(
        client_id: ClientId,
        session_id: SessionId,
        callback: Arc<dyn SessionCallback>,
        events: SessionEvents,
        peer_cache_capacity: NonZeroUsize,
    ) -> Self {
        Self {
            client_id,
            session_id,
            callback,
            events,
            mode: SessionMode::Uninitialized,
            pub_sub_id: None,
            peers: LruCache::new(peer_cache_capacity),
        }
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// The discovery id, if currently valid.
    pub fn pub_sub_id(&self) -> Option<PubSubId> {
        self.pub_sub_id
    }

    pub fn is_id_valid(&self) -> bool {
        self.pub_sub_id.is_some()
    }

    /// Cached address of `peer`, without refreshing its recency.
    pub fn peer_address(&self, peer: PeerId) -> Option<MacAddress> {
        self.peers.peek(&peer).copied()
    }

    pub fn cached_peers(&self) -> usize {
        self.peers.len()
    }

    fn commit(&mut self, requested: SessionMode) -> Result<(), SessionError> {
        match self.mode {
            SessionMode::Uninitialized => Ok(()),
            committed if committed == requested => Ok(()),
            committed => Err(SessionError::ModeMismatch {
                committed,
                requested,
            }),
        }
    }

    fn record(&self) -> TransactionRecord {
        TransactionRecord::Session {
            client_id: self.client_id,
            session_id: self.session_id,
        }
    }

    /// Start or update a publish. A live discovery id is passed through so the
    /// hardware updates in place.
    pub fn publish(
        &mut self,
        hal: &mut dyn NanHal,
        transactions: &mut TransactionTable,
        config: &PublishConfig,
    ) -> Result<TransactionId, NanError> {
        self.commit(SessionMode::Publishing)?;
        let transaction_id = transactions.register(self.record())?;
        self.mode = SessionMode::Publishing;
        debug!(
            client_id = %self.client_id,
            session_id = %self.session_id,
            transaction_id = %transaction_id,
            service = %config.service_name,
            "publish"
        );
        hal.publish(transaction_id, self.pub_sub_id, config);
        Ok(transaction_id)
    }

    pub fn subscribe(
        &mut self,
        hal: &mut dyn NanHal,
        transactions: &mut TransactionTable,
        config: &SubscribeConfig,
    ) -> Result<TransactionId, NanError> {
        self.commit(SessionMode::Subscribing)?;
        let transaction_id = transactions.register(self.record())?;
        self.mode = SessionMode::Subscribing;
        debug!(
            client_id = %self.client_id,
            session_id = %self.session_id,
            transaction_id = %transaction_id,
            service = %config.service_name,
            "subscribe"
        );
        hal.subscribe(transaction_id, self.pub_sub_id, config);
        Ok(transaction_id)
    }

    /// Send `payload` to a peer this session has heard from. Without a valid
    /// discovery id or a cached address the send fails at once with
    /// [`FailReason::NoMatchSession`] and nothing reaches the hardware.
    pub fn send_message(
        &mut self,
        hal: &mut dyn NanHal,
        transactions: &mut TransactionTable,
        peer: PeerId,
        message_id: u32,
        payload: &[u8],
    ) -> Result<Option<TransactionId>, NanError> {
        let target = self
            .pub_sub_id
            .zip(self.peers.peek(&peer).copied());
        let Some((pub_sub_id, peer_mac)) = target else {
            warn!(
                client_id = %self.client_id,
                session_id = %self.session_id,
                peer = %peer,
                id_valid = self.is_id_valid(),
                "send_message: no valid discovery id or unknown peer"
            );
            self.on_message_send_fail(message_id, FailReason::NoMatchSession);
            return Ok(None);
        };

        let transaction_id = transactions.register(TransactionRecord::Message {
            client_id: self.client_id,
            session_id: self.session_id,
            message_id,
        })?;
        debug!(
            session_id = %self.session_id,
            transaction_id = %transaction_id,
            peer = %peer,
            len = payload.len(),
            "send_message"
        );
        hal.send_message(transaction_id, pub_sub_id, peer, peer_mac, payload);
        Ok(Some(transaction_id))
    }

    /// Stop the live publish or subscribe. The discovery id stays valid until the
    /// hardware reports termination.
    pub fn stop(
        &mut self,
        hal: &mut dyn NanHal,
        transactions: &mut TransactionTable,
    ) -> Result<Option<TransactionId>, NanError> {
        let Some(pub_sub_id) = self.pub_sub_id else {
            warn!(
                client_id = %self.client_id,
                session_id = %self.session_id,
                "stop: discovery id not valid"
            );
            return Ok(None);
        };
        let transaction_id = transactions.register(self.record())?;
        self.issue_stop(hal, transaction_id, pub_sub_id);
        Ok(Some(transaction_id))
    }

    fn issue_stop(&self, hal: &mut dyn NanHal, transaction_id: TransactionId, id: PubSubId) {
        match self.mode {
            SessionMode::Publishing => hal.stop_publish(transaction_id, id),
            SessionMode::Subscribing => hal.stop_subscribe(transaction_id, id),
            SessionMode::Uninitialized => {}
        }
    }

    /// Tear down: best-effort stop when live, then forget peers. Returns the
    /// discovery id that was released so its index entry can be removed.
    pub fn destroy(
        mut self,
        hal: &mut dyn NanHal,
        transactions: &mut TransactionTable,
    ) -> Option<PubSubId> {
        let released = self.pub_sub_id.take();
        if let Some(id) = released {
            match transactions.register(TransactionRecord::Untyped) {
                Ok(transaction_id) => self.issue_stop(hal, transaction_id, id),
                Err(e) => warn!(
                    session_id = %self.session_id,
                    error = %e,
                    "destroy: stop skipped"
                ),
            }
        }
        self.peers.clear();
        released
    }

    /// Drop the discovery id without notifying; used when another session has
    /// been handed the same id.
    pub fn invalidate(&mut self) -> Option<PubSubId> {
        self.pub_sub_id.take()
    }

    /// Install `id` after a successful publish. Returns the previous id, if any.
    /// The application hears about the first success only; an in-place update
    /// is silent.
    pub fn on_publish_success(&mut self, id: PubSubId) -> Result<Option<PubSubId>, SessionError> {
        self.on_start_success(SessionMode::Publishing, id)
    }

    pub fn on_subscribe_success(&mut self, id: PubSubId) -> Result<Option<PubSubId>, SessionError> {
        self.on_start_success(SessionMode::Subscribing, id)
    }

    fn on_start_success(
        &mut self,
        requested: SessionMode,
        id: PubSubId,
    ) -> Result<Option<PubSubId>, SessionError> {
        if self.mode != requested {
            return Err(SessionError::ModeMismatch {
                committed: self.mode,
                requested,
            });
        }
        let previous = self.pub_sub_id.replace(id);
        if previous.is_none() && self.events.contains(SessionEvents::SESSION_STARTED) {
            self.callback.on_session_started(self.session_id);
        }
        Ok(previous)
    }

    /// Returns the id that was invalidated.
    pub fn on_publish_fail(&mut self, reason: FailReason) -> Option<PubSubId> {
        let released = self.pub_sub_id.take();
        if self.events.contains(SessionEvents::PUBLISH_FAIL) {
            self.callback.on_publish_fail(reason);
        }
        released
    }

    pub fn on_subscribe_fail(&mut self, reason: FailReason) -> Option<PubSubId> {
        let released = self.pub_sub_id.take();
        if self.events.contains(SessionEvents::SUBSCRIBE_FAIL) {
            self.callback.on_subscribe_fail(reason);
        }
        released
    }

    pub fn on_terminated(&mut self, reason: TerminateReason) -> Option<PubSubId> {
        let released = self.pub_sub_id.take();
        match self.mode {
            SessionMode::Publishing => {
                if self.events.contains(SessionEvents::PUBLISH_TERMINATED) {
                    self.callback.on_publish_terminated(reason);
                }
            }
            SessionMode::Subscribing => {
                if self.events.contains(SessionEvents::SUBSCRIBE_TERMINATED) {
                    self.callback.on_subscribe_terminated(reason);
                }
            }
            SessionMode::Uninitialized => {}
        }
        released
    }

    pub fn on_match(
        &mut self,
        peer: PeerId,
        peer_mac: MacAddress,
        service_specific_info: &[u8],
        match_filter: &[u8],
    ) {
        self.peers.put(peer, peer_mac);
        if self.events.contains(SessionEvents::MATCH) {
            self.callback
                .on_match(peer, service_specific_info, match_filter);
        }
    }

    pub fn on_message_received(&mut self, peer: PeerId, peer_mac: MacAddress, message: &[u8]) {
        self.peers.put(peer, peer_mac);
        if self.events.contains(SessionEvents::MESSAGE_RECEIVED) {
            self.callback.on_message_received(peer, message);
        }
    }

    pub fn on_message_send_success(&self, message_id: u32) {
        if self.events.contains(SessionEvents::MESSAGE_SEND_SUCCESS) {
            self.callback.on_message_send_success(message_id);
        }
    }

    pub fn on_message_send_fail(&self, message_id: u32, reason: FailReason) {
        if self.events.contains(SessionEvents::MESSAGE_SEND_FAIL) {
            self.callback.on_message_send_fail(message_id, reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{HalCall, RecordingHal, RecordingSessionCallback, SessionNotification};

    const MAC_A: MacAddress = MacAddress([0, 1, 2, 3, 4, 5]);
    const MAC_B: MacAddress = MacAddress([6, 7, 8, 9, 10, 11]);

    fn session(events: SessionEvents, capacity: usize) -> (Session, Arc<RecordingSessionCallback>) {
        let cb = RecordingSessionCallback::new();
        let s = Session::new(
            ClientId(1),
            SessionId(2),
            cb.clone(),
            events,
            NonZeroUsize::new(capacity).unwrap(),
        );
        (s, cb)
    }

    fn published(id: u32) -> (Session, Arc<RecordingSessionCallback>, RecordingHal, TransactionTable) {
        let (mut s, cb) = session(SessionEvents::ALL, 4);
        let mut hal = RecordingHal::new();
        let mut txns = TransactionTable::new();
        s.publish(&mut hal, &mut txns, &PublishConfig::new("svc")).unwrap();
        s.on_publish_success(PubSubId(id)).unwrap();
        hal.take();
        cb.take();
        (s, cb, hal, txns)
    }

    #[test]
    fn first_publish_commits_mode_and_passes_no_id() {
        let (mut s, _) = session(SessionEvents::ALL, 4);
        let mut hal = RecordingHal::new();
        let mut txns = TransactionTable::new();
        let tid = s.publish(&mut hal, &mut txns, &PublishConfig::new("svc")).unwrap();
        assert_eq!(s.mode(), SessionMode::Publishing);
        assert!(!s.is_id_valid());
        assert!(txns.contains(tid));
        match hal.calls().as_slice() {
            [HalCall::Publish { transaction_id, existing, .. }] => {
                assert_eq!(*transaction_id, tid);
                assert_eq!(*existing, None);
            }
            other => panic!("expected one publish, got {:?}", other),
        }
    }

    #[test]
    fn republish_passes_existing_id() {
        let (mut s, _, mut hal, mut txns) = published(9);
        s.publish(&mut hal, &mut txns, &PublishConfig::new("svc")).unwrap();
        assert!(matches!(
            hal.calls().as_slice(),
            [HalCall::Publish { existing: Some(PubSubId(9)), .. }]
        ));
    }

    #[test]
    fn subscribe_after_publish_rejected_without_side_effects() {
        let (mut s, cb, mut hal, mut txns) = published(9);
        let pending = txns.len();
        let err = s
            .subscribe(&mut hal, &mut txns, &SubscribeConfig::new("svc"))
            .unwrap_err();
        assert!(matches!(
            err,
            NanError::Session(SessionError::ModeMismatch {
                committed: SessionMode::Publishing,
                requested: SessionMode::Subscribing,
            })
        ));
        assert_eq!(s.mode(), SessionMode::Publishing);
        assert_eq!(s.pub_sub_id(), Some(PubSubId(9)));
        assert_eq!(txns.len(), pending);
        assert!(hal.calls().is_empty());
        assert!(cb.notifications().is_empty());
    }

    #[test]
    fn success_for_other_mode_is_mismatch() {
        let (mut s, _, _, _) = published(9);
        assert!(s.on_subscribe_success(PubSubId(3)).is_err());
        assert_eq!(s.pub_sub_id(), Some(PubSubId(9)));
    }

    #[test]
    fn fail_invalidates_and_notifies() {
        let (mut s, cb, _, _) = published(9);
        assert_eq!(s.on_publish_fail(FailReason::NoResources), Some(PubSubId(9)));
        assert!(!s.is_id_valid());
        assert_eq!(
            cb.notifications(),
            vec![SessionNotification::PublishFail(FailReason::NoResources)]
        );
    }

    #[test]
    fn masked_events_are_not_delivered() {
        let (mut s, cb) = session(SessionEvents::ALL.without(SessionEvents::PUBLISH_FAIL), 4);
        let mut hal = RecordingHal::new();
        let mut txns = TransactionTable::new();
        s.publish(&mut hal, &mut txns, &PublishConfig::new("svc")).unwrap();
        s.on_publish_fail(FailReason::Other);
        assert!(cb.notifications().is_empty());
    }

    #[test]
    fn terminated_uses_mode_callback() {
        let (mut s, cb) = session(SessionEvents::ALL, 4);
        let mut hal = RecordingHal::new();
        let mut txns = TransactionTable::new();
        s.subscribe(&mut hal, &mut txns, &SubscribeConfig::new("svc")).unwrap();
        s.on_subscribe_success(PubSubId(4)).unwrap();
        assert_eq!(s.on_terminated(TerminateReason::Done), Some(PubSubId(4)));
        assert_eq!(
            cb.notifications(),
            vec![
                SessionNotification::Started(SessionId(2)),
                SessionNotification::SubscribeTerminated(TerminateReason::Done),
            ]
        );
    }

    #[test]
    fn first_success_reports_started() {
        let (mut s, cb) = session(SessionEvents::ALL, 4);
        let mut hal = RecordingHal::new();
        let mut txns = TransactionTable::new();
        s.publish(&mut hal, &mut txns, &PublishConfig::new("svc")).unwrap();
        assert_eq!(s.on_publish_success(PubSubId(9)).unwrap(), None);
        assert_eq!(cb.notifications(), vec![SessionNotification::Started(SessionId(2))]);
    }

    #[test]
    fn update_success_is_silent() {
        let (mut s, cb, mut hal, mut txns) = published(9);
        s.publish(&mut hal, &mut txns, &PublishConfig::new("svc")).unwrap();
        assert_eq!(s.on_publish_success(PubSubId(9)).unwrap(), Some(PubSubId(9)));
        assert_eq!(s.on_publish_success(PubSubId(10)).unwrap(), Some(PubSubId(9)));
        assert!(cb.notifications().is_empty());
    }

    #[test]
    fn success_after_fail_reports_started_again() {
        let (mut s, cb, mut hal, mut txns) = published(9);
        s.on_publish_fail(FailReason::Other);
        s.publish(&mut hal, &mut txns, &PublishConfig::new("svc")).unwrap();
        s.on_publish_success(PubSubId(11)).unwrap();
        assert_eq!(
            cb.notifications(),
            vec![
                SessionNotification::PublishFail(FailReason::Other),
                SessionNotification::Started(SessionId(2)),
            ]
        );
    }

    #[test]
    fn started_is_mask_gated() {
        let (mut s, cb) = session(SessionEvents::ALL.without(SessionEvents::SESSION_STARTED), 4);
        let mut hal = RecordingHal::new();
        let mut txns = TransactionTable::new();
        s.subscribe(&mut hal, &mut txns, &SubscribeConfig::new("svc")).unwrap();
        s.on_subscribe_success(PubSubId(4)).unwrap();
        assert!(cb.notifications().is_empty());
        assert!(s.is_id_valid());
    }

    #[test]
    fn send_without_valid_id_fails_fast() {
        let (mut s, cb) = session(SessionEvents::ALL, 4);
        let mut hal = RecordingHal::new();
        let mut txns = TransactionTable::new();
        s.on_match(PeerId(3), MAC_A, b"", b"");
        cb.take();

        let r = s.send_message(&mut hal, &mut txns, PeerId(3), 77, b"hi").unwrap();
        assert_eq!(r, None);
        assert!(hal.calls().is_empty());
        assert!(txns.is_empty());
        assert_eq!(
            cb.notifications(),
            vec![SessionNotification::MessageSendFail(77, FailReason::NoMatchSession)]
        );
    }

    #[test]
    fn send_to_unknown_peer_fails_fast() {
        let (mut s, cb, mut hal, mut txns) = published(9);
        let pending = txns.len();
        let r = s.send_message(&mut hal, &mut txns, PeerId(3), 1, b"hi").unwrap();
        assert_eq!(r, None);
        assert!(hal.calls().is_empty());
        assert_eq!(txns.len(), pending);
        assert_eq!(
            cb.notifications(),
            vec![SessionNotification::MessageSendFail(1, FailReason::NoMatchSession)]
        );
    }

    #[test]
    fn send_uses_latest_cached_address() {
        let (mut s, cb, mut hal, mut txns) = published(9);
        s.on_match(PeerId(3), MAC_A, b"ssi", b"filter");
        s.on_message_received(PeerId(3), MAC_B, b"hello");
        assert_eq!(s.peer_address(PeerId(3)), Some(MAC_B));

        let tid = s
            .send_message(&mut hal, &mut txns, PeerId(3), 5, b"reply")
            .unwrap()
            .unwrap();
        assert_eq!(
            txns.get(tid),
            Some(&TransactionRecord::Message {
                client_id: ClientId(1),
                session_id: SessionId(2),
                message_id: 5,
            })
        );
        match hal.calls().as_slice() {
            [HalCall::SendMessage { id, peer, peer_mac, payload, .. }] => {
                assert_eq!(*id, PubSubId(9));
                assert_eq!(*peer, PeerId(3));
                assert_eq!(*peer_mac, MAC_B);
                assert_eq!(payload.as_slice(), b"reply");
            }
            other => panic!("expected one send, got {:?}", other),
        }
        assert_eq!(
            cb.notifications(),
            vec![
                SessionNotification::Match {
                    peer: PeerId(3),
                    service_specific_info: b"ssi".to_vec(),
                    match_filter: b"filter".to_vec(),
                },
                SessionNotification::MessageReceived {
                    peer: PeerId(3),
                    message: b"hello".to_vec(),
                },
            ]
        );
    }

    #[test]
    fn peer_cache_evicts_least_recently_refreshed() {
        let (mut s, _) = session(SessionEvents::NONE, 2);
        s.on_match(PeerId(1), MAC_A, b"", b"");
        s.on_match(PeerId(2), MAC_A, b"", b"");
        s.on_match(PeerId(1), MAC_B, b"", b"");
        s.on_match(PeerId(3), MAC_A, b"", b"");
        assert_eq!(s.cached_peers(), 2);
        assert_eq!(s.peer_address(PeerId(2)), None);
        assert_eq!(s.peer_address(PeerId(1)), Some(MAC_B));
    }

    #[test]
    fn stop_without_valid_id_is_noop() {
        let (mut s, _) = session(SessionEvents::ALL, 4);
        let mut hal = RecordingHal::new();
        let mut txns = TransactionTable::new();
        assert_eq!(s.stop(&mut hal, &mut txns).unwrap(), None);
        assert!(hal.calls().is_empty());
        assert!(txns.is_empty());
    }

    #[test]
    fn stop_keeps_id_until_terminated() {
        let (mut s, _, mut hal, mut txns) = published(9);
        let tid = s.stop(&mut hal, &mut txns).unwrap().unwrap();
        assert_eq!(
            hal.calls(),
            vec![HalCall::StopPublish { transaction_id: tid, id: PubSubId(9) }]
        );
        assert!(s.is_id_valid());
    }

    #[test]
    fn destroy_stops_live_session_and_releases_id() {
        let (mut s, _, mut hal, mut txns) = published(9);
        s.on_match(PeerId(1), MAC_A, b"", b"");
        let released = s.destroy(&mut hal, &mut txns);
        assert_eq!(released, Some(PubSubId(9)));
        match hal.calls().as_slice() {
            [HalCall::StopPublish { transaction_id, id }] => {
                assert_eq!(*id, PubSubId(9));
                assert_eq!(txns.get(*transaction_id), Some(&TransactionRecord::Untyped));
            }
            other => panic!("expected stop, got {:?}", other),
        }
    }

    #[test]
    fn destroy_idle_session_issues_nothing() {
        let (s, _) = session(SessionEvents::ALL, 4);
        let mut hal = RecordingHal::new();
        let mut txns = TransactionTable::new();
        assert_eq!(s.destroy(&mut hal, &mut txns), None);
        assert!(hal.calls().is_empty());
    }
}
