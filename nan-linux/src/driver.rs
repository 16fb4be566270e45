//! Loopback driver: a simulated radio that acknowledges every request and matches
//! local publishers with local subscribers of the same service name.

use std::collections::HashMap;

use nan_core::{
    Capabilities, ConfigRequest, EventSink, FailReason, HalEvent, MacAddress, NanHal, PeerId,
    PubSubId, PublishConfig, PublishType, StatusCode, SubscribeConfig, TerminateReason,
    TransactionId,
};
use tracing::{debug, warn};

/// Response types reported through `UnknownTransaction` acknowledgements.
const RESPONSE_DISABLE: u16 = 1;
const RESPONSE_STOP_PUBLISH: u16 = 2;
const RESPONSE_STOP_SUBSCRIBE: u16 = 3;

/// Capability reports are unsolicited; id 0 is never handed out by the coordinator.
const CAPABILITIES_TRANSACTION: TransactionId = TransactionId(0);

/// Locally administered address used as the interface address.
const LOOPBACK_MAC: MacAddress = MacAddress([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);

#[derive(Debug, Clone)]
enum Live {
    Publish(PublishConfig),
    Subscribe(SubscribeConfig),
}

impl Live {
    fn service_name(&self) -> &str {
        match self {
            Live::Publish(c) => &c.service_name,
            Live::Subscribe(c) => &c.service_name,
        }
    }
}

pub struct LoopbackDriver {
    sink: EventSink,
    next_id: u32,
    enabled: bool,
    live: HashMap<PubSubId, Live>,
}

impl LoopbackDriver {
    pub fn new(sink: EventSink) -> Self {
        Self {
            sink,
            next_id: 1,
            enabled: false,
            live: HashMap::new(),
        }
    }

    fn post(&self, event: HalEvent) {
        if let Err(e) = self.sink.post(event) {
            warn!(error = %e, "loopback event dropped");
        }
    }

    fn allocate(&mut self) -> PubSubId {
        let id = PubSubId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1).max(1);
        id
    }

    /// Pub/sub ids double as peer instance ids between local sessions.
    fn peer_of(id: PubSubId) -> PeerId {
        PeerId(id.value())
    }

    /// Post matches between `id` and every live counterpart with the same name.
    fn synthesize_matches(&self, id: PubSubId) {
        let Some(started) = self.live.get(&id) else {
            return;
        };
        for (&other_id, other) in &self.live {
            if other_id == id || other.service_name() != started.service_name() {
                continue;
            }
            let pair = match (started, other) {
                (Live::Publish(p), Live::Subscribe(s)) => Some((id, p, other_id, s)),
                (Live::Subscribe(s), Live::Publish(p)) => Some((other_id, p, id, s)),
                _ => None,
            };
            let Some((pub_id, publish, sub_id, subscribe)) = pair else {
                continue;
            };
            self.post(HalEvent::Match {
                pub_sub_id: sub_id,
                peer: Self::peer_of(pub_id),
                peer_mac: LOOPBACK_MAC,
                service_specific_info: publish.service_specific_info.clone(),
                match_filter: publish.match_filter.clone(),
            });
            if publish.publish_type != PublishType::Unsolicited {
                self.post(HalEvent::Match {
                    pub_sub_id: pub_id,
                    peer: Self::peer_of(sub_id),
                    peer_mac: LOOPBACK_MAC,
                    service_specific_info: subscribe.service_specific_info.clone(),
                    match_filter: subscribe.match_filter.clone(),
                });
            }
        }
    }
}

impl NanHal for LoopbackDriver {
    fn enable_and_configure(&mut self, transaction_id: TransactionId, config: &ConfigRequest) {
        debug!(transaction_id = %transaction_id, ?config, "loopback configure");
        self.post(HalEvent::ConfigCompleted { transaction_id });
        if !self.enabled {
            self.enabled = true;
            self.post(HalEvent::CapabilitiesUpdated {
                transaction_id: CAPABILITIES_TRANSACTION,
                capabilities: loopback_capabilities(),
            });
            self.post(HalEvent::InterfaceAddressChange { mac: LOOPBACK_MAC });
        }
    }

    fn disable(&mut self, transaction_id: TransactionId) {
        self.enabled = false;
        self.live.clear();
        self.post(HalEvent::UnknownTransaction {
            response_type: RESPONSE_DISABLE,
            transaction_id,
            status: StatusCode(0),
        });
    }

    fn publish(
        &mut self,
        transaction_id: TransactionId,
        existing: Option<PubSubId>,
        config: &PublishConfig,
    ) {
        let id = existing.unwrap_or_else(|| self.allocate());
        self.live.insert(id, Live::Publish(config.clone()));
        self.post(HalEvent::PublishSuccess {
            transaction_id,
            publish_id: id,
        });
        if existing.is_none() {
            self.synthesize_matches(id);
        }
    }

    fn subscribe(
        &mut self,
        transaction_id: TransactionId,
        existing: Option<PubSubId>,
        config: &SubscribeConfig,
    ) {
        let id = existing.unwrap_or_else(|| self.allocate());
        self.live.insert(id, Live::Subscribe(config.clone()));
        self.post(HalEvent::SubscribeSuccess {
            transaction_id,
            subscribe_id: id,
        });
        if existing.is_none() {
            self.synthesize_matches(id);
        }
    }

    fn stop_publish(&mut self, transaction_id: TransactionId, id: PubSubId) {
        self.live.remove(&id);
        self.post(HalEvent::UnknownTransaction {
            response_type: RESPONSE_STOP_PUBLISH,
            transaction_id,
            status: StatusCode(0),
        });
        self.post(HalEvent::PublishTerminated {
            publish_id: id,
            reason: TerminateReason::Done,
        });
    }

    fn stop_subscribe(&mut self, transaction_id: TransactionId, id: PubSubId) {
        self.live.remove(&id);
        self.post(HalEvent::UnknownTransaction {
            response_type: RESPONSE_STOP_SUBSCRIBE,
            transaction_id,
            status: StatusCode(0),
        });
        self.post(HalEvent::SubscribeTerminated {
            subscribe_id: id,
            reason: TerminateReason::Done,
        });
    }

    fn send_message(
        &mut self,
        transaction_id: TransactionId,
        id: PubSubId,
        peer: PeerId,
        _peer_mac: MacAddress,
        payload: &[u8],
    ) {
        let target = PubSubId(peer.value());
        if !self.live.contains_key(&target) {
            self.post(HalEvent::MessageSendFail {
                transaction_id,
                reason: FailReason::NoMatchSession,
            });
            return;
        }
        self.post(HalEvent::MessageSendSuccess { transaction_id });
        self.post(HalEvent::MessageReceived {
            pub_sub_id: target,
            peer: Self::peer_of(id),
            peer_mac: LOOPBACK_MAC,
            message: payload.to_vec(),
        });
    }
}

/// What the loopback radio reports about itself.
fn loopback_capabilities() -> Capabilities {
    Capabilities {
        max_concurrent_clusters: 1,
        max_publishes: 8,
        max_subscribes: 8,
        max_service_name_len: 255,
        max_match_filter_len: 255,
        max_service_specific_info_len: 255,
        max_message_len: 1024,
    }
}
