//! Recording doubles for the hardware boundary and the application callbacks.
//! Each keeps its log behind an `Arc<Mutex<_>>` so a clone handed to a worker
//! thread can still be inspected from the test.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::callback::{EventCallback, SessionCallback};
use crate::config::ConfigRequest;
use crate::discovery::{PublishConfig, SubscribeConfig};
use crate::hal::NanHal;
use crate::types::{
    FailReason, MacAddress, PeerId, PubSubId, SessionId, StatusCode, TerminateReason,
    TransactionId,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One outbound hardware call.
#[derive(Debug, Clone, PartialEq)]
pub enum HalCall {
    EnableAndConfigure {
        transaction_id: TransactionId,
        config: ConfigRequest,
    },
    Disable {
        transaction_id: TransactionId,
    },
    Publish {
        transaction_id: TransactionId,
        existing: Option<PubSubId>,
        config: PublishConfig,
    },
    Subscribe {
        transaction_id: TransactionId,
        existing: Option<PubSubId>,
        config: SubscribeConfig,
    },
    StopPublish {
        transaction_id: TransactionId,
        id: PubSubId,
    },
    StopSubscribe {
        transaction_id: TransactionId,
        id: PubSubId,
    },
    SendMessage {
        transaction_id: TransactionId,
        id: PubSubId,
        peer: PeerId,
        peer_mac: MacAddress,
        payload: Vec<u8>,
    },
}

impl HalCall {
    pub fn transaction_id(&self) -> TransactionId {
        match self {
            HalCall::EnableAndConfigure { transaction_id, .. }
            | HalCall::Disable { transaction_id }
            | HalCall::Publish { transaction_id, .. }
            | HalCall::Subscribe { transaction_id, .. }
            | HalCall::StopPublish { transaction_id, .. }
            | HalCall::StopSubscribe { transaction_id, .. }
            | HalCall::SendMessage { transaction_id, .. } => *transaction_id,
        }
    }
}

/// [`NanHal`] that performs nothing and records every call.
#[derive(Debug, Clone, Default)]
pub struct RecordingHal {
    calls: Arc<Mutex<Vec<HalCall>>>,
}

impl RecordingHal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<HalCall> {
        lock(&self.calls).clone()
    }

    /// Return and clear the recorded calls.
    pub fn take(&self) -> Vec<HalCall> {
        std::mem::take(&mut *lock(&self.calls))
    }

    pub fn last_transaction(&self) -> Option<TransactionId> {
        lock(&self.calls).last().map(HalCall::transaction_id)
    }

    fn push(&self, call: HalCall) {
        lock(&self.calls).push(call);
    }
}

impl NanHal for RecordingHal {
    fn enable_and_configure(&mut self, transaction_id: TransactionId, config: &ConfigRequest) {
        self.push(HalCall::EnableAndConfigure {
            transaction_id,
            config: *config,
        });
    }

    fn disable(&mut self, transaction_id: TransactionId) {
        self.push(HalCall::Disable { transaction_id });
    }

    fn publish(
        &mut self,
        transaction_id: TransactionId,
        existing: Option<PubSubId>,
        config: &PublishConfig,
    ) {
        self.push(HalCall::Publish {
            transaction_id,
            existing,
            config: config.clone(),
        });
    }

    fn subscribe(
        &mut self,
        transaction_id: TransactionId,
        existing: Option<PubSubId>,
        config: &SubscribeConfig,
    ) {
        self.push(HalCall::Subscribe {
            transaction_id,
            existing,
            config: config.clone(),
        });
    }

    fn stop_publish(&mut self, transaction_id: TransactionId, id: PubSubId) {
        self.push(HalCall::StopPublish { transaction_id, id });
    }

    fn stop_subscribe(&mut self, transaction_id: TransactionId, id: PubSubId) {
        self.push(HalCall::StopSubscribe { transaction_id, id });
    }

    fn send_message(
        &mut self,
        transaction_id: TransactionId,
        id: PubSubId,
        peer: PeerId,
        peer_mac: MacAddress,
        payload: &[u8],
    ) {
        self.push(HalCall::SendMessage {
            transaction_id,
            id,
            peer,
            peer_mac,
            payload: payload.to_vec(),
        });
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientNotification {
    ConfigCompleted(ConfigRequest),
    ConfigFailed(ConfigRequest, FailReason),
    NanDown(StatusCode),
    IdentityChanged,
}

#[derive(Debug, Default)]
pub struct RecordingEventCallback {
    log: Mutex<Vec<ClientNotification>>,
}

impl RecordingEventCallback {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn notifications(&self) -> Vec<ClientNotification> {
        lock(&self.log).clone()
    }

    pub fn take(&self) -> Vec<ClientNotification> {
        std::mem::take(&mut *lock(&self.log))
    }
}

impl EventCallback for RecordingEventCallback {
    fn on_config_completed(&self, config: &ConfigRequest) {
        lock(&self.log).push(ClientNotification::ConfigCompleted(*config));
    }

    fn on_config_failed(&self, config: &ConfigRequest, reason: FailReason) {
        lock(&self.log).push(ClientNotification::ConfigFailed(*config, reason));
    }

    fn on_nan_down(&self, reason: StatusCode) {
        lock(&self.log).push(ClientNotification::NanDown(reason));
    }

    fn on_identity_changed(&self) {
        lock(&self.log).push(ClientNotification::IdentityChanged);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotification {
    Started(SessionId),
    PublishFail(FailReason),
    PublishTerminated(TerminateReason),
    SubscribeFail(FailReason),
    SubscribeTerminated(TerminateReason),
    Match {
        peer: PeerId,
        service_specific_info: Vec<u8>,
        match_filter: Vec<u8>,
    },
    MessageSendSuccess(u32),
    MessageSendFail(u32, FailReason),
    MessageReceived {
        peer: PeerId,
        message: Vec<u8>,
    },
}

#[derive(Debug, Default)]
pub struct RecordingSessionCallback {
    log: Mutex<Vec<SessionNotification>>,
}

impl RecordingSessionCallback {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn notifications(&self) -> Vec<SessionNotification> {
        lock(&self.log).clone()
    }

    pub fn take(&self) -> Vec<SessionNotification> {
        std::mem::take(&mut *lock(&self.log))
    }
}

impl SessionCallback for RecordingSessionCallback {
    fn on_session_started(&self, session_id: SessionId) {
        lock(&self.log).push(SessionNotification::Started(session_id));
    }

    fn on_publish_fail(&self, reason: FailReason) {
        lock(&self.log).push(SessionNotification::PublishFail(reason));
    }

    fn on_publish_terminated(&self, reason: TerminateReason) {
        lock(&self.log).push(SessionNotification::PublishTerminated(reason));
    }

    fn on_subscribe_fail(&self, reason: FailReason) {
        lock(&self.log).push(SessionNotification::SubscribeFail(reason));
    }

    fn on_subscribe_terminated(&self, reason: TerminateReason) {
        lock(&self.log).push(SessionNotification::SubscribeTerminated(reason));
    }

    fn on_match(&self, peer: PeerId, service_specific_info: &[u8], match_filter: &[u8]) {
        lock(&self.log).push(SessionNotification::Match {
            peer,
            service_specific_info: service_specific_info.to_vec(),
            match_filter: match_filter.to_vec(),
        });
    }

    fn on_message_send_success(&self, message_id: u32) {
        lock(&self.log).push(SessionNotification::MessageSendSuccess(message_id));
    }

    fn on_message_send_fail(&self, message_id: u32, reason: FailReason) {
        lock(&self.log).push(SessionNotification::MessageSendFail(message_id, reason));
    }

    fn on_message_received(&self, peer: PeerId, message: &[u8]) {
        lock(&self.log).push(SessionNotification::MessageReceived {
            peer,
            message: message.to_vec(),
        });
    }
}
