//! Hardware adapter boundary: calls the coordinator makes outward, and the events
//! hardware reports back inward.

use serde::{Deserialize, Serialize};

use crate::config::ConfigRequest;
use crate::discovery::{PublishConfig, SubscribeConfig};
use crate::types::{
    ClusterChange, FailReason, MacAddress, PeerId, PubSubId, StatusCode, TerminateReason,
    TransactionId,
};

/// Outbound radio operations. Every call is fire-and-forget: completion arrives later
/// as a [`HalEvent`] carrying the same transaction id.
pub trait NanHal: Send {
    fn enable_and_configure(&mut self, transaction_id: TransactionId, config: &ConfigRequest);
    fn disable(&mut self, transaction_id: TransactionId);
    /// `existing` is the live publish id when updating, `None` to start a new one.
    fn publish(
        &mut self,
        transaction_id: TransactionId,
        existing: Option<PubSubId>,
        config: &PublishConfig,
    );
    fn subscribe(
        &mut self,
        transaction_id: TransactionId,
        existing: Option<PubSubId>,
        config: &SubscribeConfig,
    );
    fn stop_publish(&mut self, transaction_id: TransactionId, id: PubSubId);
    fn stop_subscribe(&mut self, transaction_id: TransactionId, id: PubSubId);
    fn send_message(
        &mut self,
        transaction_id: TransactionId,
        id: PubSubId,
        peer: PeerId,
        peer_mac: MacAddress,
        payload: &[u8],
    );
}

/// Limits reported by the hardware.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default, Serialize, Deserialize)]
pub struct Capabilities {
    pub max_concurrent_clusters: u32,
    pub max_publishes: u32,
    pub max_subscribes: u32,
    pub max_service_name_len: u32,
    pub max_match_filter_len: u32,
    pub max_service_specific_info_len: u32,
    pub max_message_len: u32,
}

/// Everything the hardware can report. Request/response events carry the
/// transaction id of the request; session events with no pending request carry
/// the discovery id instead.
#[derive(Debug, Clone, PartialEq)]
pub enum HalEvent {
    ConfigCompleted {
        transaction_id: TransactionId,
    },
    ConfigFailed {
        transaction_id: TransactionId,
        reason: FailReason,
    },
    PublishSuccess {
        transaction_id: TransactionId,
        publish_id: PubSubId,
    },
    PublishFail {
        transaction_id: TransactionId,
        reason: FailReason,
    },
    PublishTerminated {
        publish_id: PubSubId,
        reason: TerminateReason,
    },
    SubscribeSuccess {
        transaction_id: TransactionId,
        subscribe_id: PubSubId,
    },
    SubscribeFail {
        transaction_id: TransactionId,
        reason: FailReason,
    },
    SubscribeTerminated {
        subscribe_id: PubSubId,
        reason: TerminateReason,
    },
    MessageSendSuccess {
        transaction_id: TransactionId,
    },
    MessageSendFail {
        transaction_id: TransactionId,
        reason: FailReason,
    },
    Match {
        pub_sub_id: PubSubId,
        peer: PeerId,
        peer_mac: MacAddress,
        service_specific_info: Vec<u8>,
        match_filter: Vec<u8>,
    },
    MessageReceived {
        pub_sub_id: PubSubId,
        peer: PeerId,
        peer_mac: MacAddress,
        message: Vec<u8>,
    },
    InterfaceAddressChange {
        mac: MacAddress,
    },
    ClusterChange {
        change: ClusterChange,
        cluster_id: MacAddress,
    },
    NanDown {
        reason: StatusCode,
    },
    CapabilitiesUpdated {
        transaction_id: TransactionId,
        capabilities: Capabilities,
    },
    /// Response of a kind the coordinator has no dedicated handling for (stop and
    /// disable acknowledgements among them).
    UnknownTransaction {
        response_type: u16,
        transaction_id: TransactionId,
        status: StatusCode,
    },
}

impl HalEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            HalEvent::ConfigCompleted { .. } => "config_completed",
            HalEvent::ConfigFailed { .. } => "config_failed",
            HalEvent::PublishSuccess { .. } => "publish_success",
            HalEvent::PublishFail { .. } => "publish_fail",
            HalEvent::PublishTerminated { .. } => "publish_terminated",
            HalEvent::SubscribeSuccess { .. } => "subscribe_success",
            HalEvent::SubscribeFail { .. } => "subscribe_fail",
            HalEvent::SubscribeTerminated { .. } => "subscribe_terminated",
            HalEvent::MessageSendSuccess { .. } => "message_send_success",
            HalEvent::MessageSendFail { .. } => "message_send_fail",
            HalEvent::Match { .. } => "match",
            HalEvent::MessageReceived { .. } => "message_received",
            HalEvent::InterfaceAddressChange { .. } => "interface_address_change",
            HalEvent::ClusterChange { .. } => "cluster_change",
            HalEvent::NanDown { .. } => "nan_down",
            HalEvent::CapabilitiesUpdated { .. } => "capabilities_updated",
            HalEvent::UnknownTransaction { .. } => "unknown_transaction",
        }
    }
}
