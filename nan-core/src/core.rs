//! Coordinator: owns every client, session and pending transaction. Commands and
//! hardware events are handed in one at a time; nothing here blocks or does I/O.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::callback::{ClientEvents, EventCallback, SessionCallback, SessionEvents};
use crate::client::Client;
use crate::config::{merge_config_requests, ConfigRequest, CoreSettings};
use crate::discovery::{PublishConfig, SubscribeConfig};
use crate::error::NanError;
use crate::hal::{Capabilities, HalEvent, NanHal};
use crate::session::{Session, SessionError};
use crate::transaction::{TransactionRecord, TransactionTable};
use crate::types::{
    ClientId, FailReason, MacAddress, PeerId, PubSubId, SessionId, TerminateReason,
    TransactionId,
};

/// Application request, as queued for the coordinator.
pub enum Command {
    Connect {
        client_id: ClientId,
        callback: Arc<dyn EventCallback>,
        events: ClientEvents,
        config: Option<ConfigRequest>,
    },
    Disconnect {
        client_id: ClientId,
    },
    RequestConfig {
        client_id: ClientId,
        config: ConfigRequest,
    },
    CreateSession {
        client_id: ClientId,
        session_id: SessionId,
        callback: Arc<dyn SessionCallback>,
        events: SessionEvents,
    },
    DestroySession {
        client_id: ClientId,
        session_id: SessionId,
    },
    Publish {
        client_id: ClientId,
        session_id: SessionId,
        config: PublishConfig,
    },
    Subscribe {
        client_id: ClientId,
        session_id: SessionId,
        config: SubscribeConfig,
    },
    SendMessage {
        client_id: ClientId,
        session_id: SessionId,
        peer: PeerId,
        message_id: u32,
        payload: Vec<u8>,
    },
    StopSession {
        client_id: ClientId,
        session_id: SessionId,
    },
}

impl Command {
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Connect { .. } => "connect",
            Command::Disconnect { .. } => "disconnect",
            Command::RequestConfig { .. } => "request_config",
            Command::CreateSession { .. } => "create_session",
            Command::DestroySession { .. } => "destroy_session",
            Command::Publish { .. } => "publish",
            Command::Subscribe { .. } => "subscribe",
            Command::SendMessage { .. } => "send_message",
            Command::StopSession { .. } => "stop_session",
        }
    }
}

/// Whether any client is connected.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DeviceState {
    Idle,
    Active,
}

fn session_mut(
    clients: &mut HashMap<ClientId, Client>,
    client_id: ClientId,
    session_id: SessionId,
) -> Result<&mut Session, NanError> {
    clients
        .get_mut(&client_id)
        .ok_or(NanError::UnknownClient(client_id))?
        .session_mut(session_id)
        .ok_or(NanError::UnknownSession {
            client: client_id,
            session: session_id,
        })
}

/// Main coordinator. The host feeds commands and hardware events in arrival order.
pub struct NanCore<H> {
    hal: H,
    settings: CoreSettings,
    clients: HashMap<ClientId, Client>,
    transactions: TransactionTable,
    /// Live discovery id -> owning session.
    discovery_index: HashMap<PubSubId, (ClientId, SessionId)>,
    state: DeviceState,
    capabilities: Option<Capabilities>,
}

impl<H: NanHal> NanCore<H> {
    pub fn new(hal: H) -> Self {
        Self::with_settings(hal, CoreSettings::default())
    }

    pub fn with_settings(hal: H, settings: CoreSettings) -> Self {
        Self {
            hal,
            settings,
            clients: HashMap::new(),
            transactions: TransactionTable::new(),
            discovery_index: HashMap::new(),
            state: DeviceState::Idle,
            capabilities: None,
        }
    }

    pub fn handle_command(&mut self, command: Command) -> Result<(), NanError> {
        match command {
            Command::Connect {
                client_id,
                callback,
                events,
                config,
            } => self.connect(client_id, callback, events, config),
            Command::Disconnect { client_id } => self.disconnect(client_id),
            Command::RequestConfig { client_id, config } => {
                self.request_config(client_id, config)
            }
            Command::CreateSession {
                client_id,
                session_id,
                callback,
                events,
            } => self.create_session(client_id, session_id, callback, events),
            Command::DestroySession {
                client_id,
                session_id,
            } => self.destroy_session(client_id, session_id),
            Command::Publish {
                client_id,
                session_id,
                config,
            } => self.publish(client_id, session_id, &config),
            Command::Subscribe {
                client_id,
                session_id,
                config,
            } => self.subscribe(client_id, session_id, &config),
            Command::SendMessage {
                client_id,
                session_id,
                peer,
                message_id,
                payload,
            } => self.send_message(client_id, session_id, peer, message_id, &payload),
            Command::StopSession {
                client_id,
                session_id,
            } => self.stop_session(client_id, session_id),
        }
    }

    pub fn connect(
        &mut self,
        client_id: ClientId,
        callback: Arc<dyn EventCallback>,
        events: ClientEvents,
        config: Option<ConfigRequest>,
    ) -> Result<(), NanError> {
        if self.clients.contains_key(&client_id) {
            return Err(NanError::DuplicateClient(client_id));
        }
        if let Some(cfg) = &config {
            cfg.validate()?;
        }
        info!(client_id = %client_id, with_config = config.is_some(), "client connected");
        self.clients
            .insert(client_id, Client::new(client_id, callback, events, config));
        self.state = DeviceState::Active;
        if config.is_some() {
            self.push_merged_config()?;
        }
        Ok(())
    }

    pub fn disconnect(&mut self, client_id: ClientId) -> Result<(), NanError> {
        let client = self
            .clients
            .remove(&client_id)
            .ok_or(NanError::UnknownClient(client_id))?;
        let purged = self.transactions.purge_client(client_id);
        for session in client.into_sessions() {
            self.teardown(session);
        }
        info!(client_id = %client_id, purged, remaining = self.clients.len(), "client disconnected");

        if self.clients.is_empty() {
            self.state = DeviceState::Idle;
            let transaction_id = self.transactions.register(TransactionRecord::Untyped)?;
            self.hal.disable(transaction_id);
            Ok(())
        } else {
            self.push_merged_config()
        }
    }

    pub fn request_config(
        &mut self,
        client_id: ClientId,
        config: ConfigRequest,
    ) -> Result<(), NanError> {
        config.validate()?;
        self.clients
            .get_mut(&client_id)
            .ok_or(NanError::UnknownClient(client_id))?
            .set_config(config);
        self.push_merged_config()
    }

    fn push_merged_config(&mut self) -> Result<(), NanError> {
        let merged = merge_config_requests(self.clients.values().filter_map(Client::config));
        let transaction_id = self
            .transactions
            .register(TransactionRecord::Config(merged))?;
        debug!(transaction_id = %transaction_id, config = ?merged, "enable and configure");
        self.hal.enable_and_configure(transaction_id, &merged);
        Ok(())
    }

    pub fn create_session(
        &mut self,
        client_id: ClientId,
        session_id: SessionId,
        callback: Arc<dyn SessionCallback>,
        events: SessionEvents,
    ) -> Result<(), NanError> {
        let client = self
            .clients
            .get_mut(&client_id)
            .ok_or(NanError::UnknownClient(client_id))?;
        let session = Session::new(
            client_id,
            session_id,
            callback,
            events,
            self.settings.peer_cache_capacity,
        );
        if let Some(old) = client.insert_session(session) {
            warn!(client_id = %client_id, session_id = %session_id, "session id reused; replacing");
            self.transactions.purge_session(client_id, session_id);
            self.teardown(old);
        }
        Ok(())
    }

    pub fn destroy_session(
        &mut self,
        client_id: ClientId,
        session_id: SessionId,
    ) -> Result<(), NanError> {
        let session = self
            .clients
            .get_mut(&client_id)
            .ok_or(NanError::UnknownClient(client_id))?
            .remove_session(session_id)
            .ok_or(NanError::UnknownSession {
                client: client_id,
                session: session_id,
            })?;
        self.transactions.purge_session(client_id, session_id);
        self.teardown(session);
        Ok(())
    }

    fn teardown(&mut self, session: Session) {
        let owner = (session.client_id(), session.session_id());
        if let Some(id) = session.destroy(&mut self.hal, &mut self.transactions) {
            self.unindex(id, owner);
        }
    }

    /// Remove the index entry for `id` only if `owner` still holds it.
    fn unindex(&mut self, id: PubSubId, owner: (ClientId, SessionId)) {
        if self.discovery_index.get(&id) == Some(&owner) {
            self.discovery_index.remove(&id);
        }
    }

    pub fn publish(
        &mut self,
        client_id: ClientId,
        session_id: SessionId,
        config: &PublishConfig,
    ) -> Result<(), NanError> {
        config.validate()?;
        let session = session_mut(&mut self.clients, client_id, session_id)?;
        session.publish(&mut self.hal, &mut self.transactions, config)?;
        Ok(())
    }

    pub fn subscribe(
        &mut self,
        client_id: ClientId,
        session_id: SessionId,
        config: &SubscribeConfig,
    ) -> Result<(), NanError> {
        config.validate()?;
        let session = session_mut(&mut self.clients, client_id, session_id)?;
        session.subscribe(&mut self.hal, &mut self.transactions, config)?;
        Ok(())
    }

    pub fn send_message(
        &mut self,
        client_id: ClientId,
        session_id: SessionId,
        peer: PeerId,
        message_id: u32,
        payload: &[u8],
    ) -> Result<(), NanError> {
        let session = session_mut(&mut self.clients, client_id, session_id)?;
        session.send_message(
            &mut self.hal,
            &mut self.transactions,
            peer,
            message_id,
            payload,
        )?;
        Ok(())
    }

    pub fn stop_session(
        &mut self,
        client_id: ClientId,
        session_id: SessionId,
    ) -> Result<(), NanError> {
        let session = session_mut(&mut self.clients, client_id, session_id)?;
        session.stop(&mut self.hal, &mut self.transactions)?;
        Ok(())
    }

    /// Process one hardware event. Stale correlations are logged and dropped.
    pub fn handle_event(&mut self, event: HalEvent) {
        match event {
            HalEvent::ConfigCompleted { transaction_id } => {
                if let Some(config) = self.resolve_config(transaction_id, "config_completed") {
                    let n = self.broadcast(ClientEvents::CONFIG_COMPLETED, |cb| {
                        cb.on_config_completed(&config)
                    });
                    debug!(transaction_id = %transaction_id, notified = n, "config completed");
                }
            }
            HalEvent::ConfigFailed {
                transaction_id,
                reason,
            } => {
                if let Some(config) = self.resolve_config(transaction_id, "config_failed") {
                    warn!(transaction_id = %transaction_id, ?reason, "config failed");
                    self.broadcast(ClientEvents::CONFIG_FAILED, |cb| {
                        cb.on_config_failed(&config, reason)
                    });
                }
            }
            HalEvent::PublishSuccess {
                transaction_id,
                publish_id,
            } => self.on_start_success(transaction_id, publish_id, Session::on_publish_success),
            HalEvent::SubscribeSuccess {
                transaction_id,
                subscribe_id,
            } => self.on_start_success(
                transaction_id,
                subscribe_id,
                Session::on_subscribe_success,
            ),
            HalEvent::PublishFail {
                transaction_id,
                reason,
            } => self.on_start_fail(transaction_id, reason, Session::on_publish_fail),
            HalEvent::SubscribeFail {
                transaction_id,
                reason,
            } => self.on_start_fail(transaction_id, reason, Session::on_subscribe_fail),
            HalEvent::PublishTerminated { publish_id, reason } => {
                self.on_terminated(publish_id, reason)
            }
            HalEvent::SubscribeTerminated {
                subscribe_id,
                reason,
            } => self.on_terminated(subscribe_id, reason),
            HalEvent::MessageSendSuccess { transaction_id } => {
                self.on_message_send_result(transaction_id, None)
            }
            HalEvent::MessageSendFail {
                transaction_id,
                reason,
            } => self.on_message_send_result(transaction_id, Some(reason)),
            HalEvent::Match {
                pub_sub_id,
                peer,
                peer_mac,
                service_specific_info,
                match_filter,
            } => {
                if let Some(session) = self.route(pub_sub_id, "match") {
                    session.on_match(peer, peer_mac, &service_specific_info, &match_filter);
                }
            }
            HalEvent::MessageReceived {
                pub_sub_id,
                peer,
                peer_mac,
                message,
            } => {
                if let Some(session) = self.route(pub_sub_id, "message_received") {
                    session.on_message_received(peer, peer_mac, &message);
                }
            }
            HalEvent::InterfaceAddressChange { mac } => self.on_identity_changed("interface", mac),
            HalEvent::ClusterChange { change, cluster_id } => {
                debug!(?change, "cluster change");
                self.on_identity_changed("cluster", cluster_id)
            }
            HalEvent::NanDown { reason } => {
                warn!(reason = %reason, "nan down");
                let n = self.broadcast(ClientEvents::NAN_DOWN, |cb| cb.on_nan_down(reason));
                if n == 0 {
                    error!(reason = %reason, "nan down: no client listening");
                }
            }
            // Not a response to anything the coordinator registered; the
            // transaction table is left alone.
            HalEvent::CapabilitiesUpdated {
                transaction_id,
                capabilities,
            } => {
                info!(transaction_id = %transaction_id, ?capabilities, "capabilities updated");
                self.capabilities = Some(capabilities);
            }
            HalEvent::UnknownTransaction {
                response_type,
                transaction_id,
                status,
            } => match self.transactions.resolve(transaction_id) {
                Some(record) => debug!(
                    response_type,
                    transaction_id = %transaction_id,
                    status = %status,
                    ?record,
                    "transaction resolved"
                ),
                None => error!(
                    response_type,
                    transaction_id = %transaction_id,
                    status = %status,
                    "response for unknown transaction"
                ),
            },
        }
    }

    fn resolve_config(&mut self, transaction_id: TransactionId, kind: &str) -> Option<ConfigRequest> {
        match self.transactions.resolve(transaction_id) {
            Some(TransactionRecord::Config(config)) => Some(config),
            Some(record) => {
                error!(transaction_id = %transaction_id, kind, ?record, "record is not a config request");
                None
            }
            None => {
                error!(transaction_id = %transaction_id, kind, "unknown transaction");
                None
            }
        }
    }

    /// Resolve a session-bound record and find its session, if both still exist.
    fn resolve_session(
        &mut self,
        transaction_id: TransactionId,
        kind: &str,
    ) -> Option<(ClientId, SessionId)> {
        match self.transactions.resolve(transaction_id) {
            Some(TransactionRecord::Session {
                client_id,
                session_id,
            }) => Some((client_id, session_id)),
            Some(record) => {
                error!(transaction_id = %transaction_id, kind, ?record, "record is not session-bound");
                None
            }
            None => {
                error!(transaction_id = %transaction_id, kind, "unknown transaction");
                None
            }
        }
    }

    fn on_start_success(
        &mut self,
        transaction_id: TransactionId,
        id: PubSubId,
        install: fn(&mut Session, PubSubId) -> Result<Option<PubSubId>, SessionError>,
    ) {
        let Some(owner) = self.resolve_session(transaction_id, "start_success") else {
            return;
        };
        let session = match session_mut(&mut self.clients, owner.0, owner.1) {
            Ok(s) => s,
            Err(e) => {
                warn!(transaction_id = %transaction_id, error = %e, "start success for gone session");
                return;
            }
        };
        let previous = match install(session, id) {
            Ok(previous) => previous,
            Err(e) => {
                error!(transaction_id = %transaction_id, error = %e, "start success dropped");
                return;
            }
        };

        if let Some(prev) = previous.filter(|prev| *prev != id) {
            self.unindex(prev, owner);
        }
        if let Some(other) = self.discovery_index.insert(id, owner) {
            if other != owner {
                warn!(pub_sub_id = %id, client_id = %other.0, session_id = %other.1, "discovery id reassigned; invalidating previous owner");
                if let Ok(s) = session_mut(&mut self.clients, other.0, other.1) {
                    s.invalidate();
                }
            }
        }
        debug!(client_id = %owner.0, session_id = %owner.1, pub_sub_id = %id, "discovery id installed");
    }

    fn on_start_fail(
        &mut self,
        transaction_id: TransactionId,
        reason: FailReason,
        fail: fn(&mut Session, FailReason) -> Option<PubSubId>,
    ) {
        let Some(owner) = self.resolve_session(transaction_id, "start_fail") else {
            return;
        };
        let released = match session_mut(&mut self.clients, owner.0, owner.1) {
            Ok(session) => fail(session, reason),
            Err(e) => {
                warn!(transaction_id = %transaction_id, error = %e, "start fail for gone session");
                return;
            }
        };
        if let Some(id) = released {
            self.unindex(id, owner);
        }
    }

    /// Look up the session that owns `id`. A stale index entry is dropped.
    fn route(&mut self, id: PubSubId, kind: &str) -> Option<&mut Session> {
        let Some(&(client_id, session_id)) = self.discovery_index.get(&id) else {
            error!(pub_sub_id = %id, kind, "unknown discovery id");
            return None;
        };
        match session_mut(&mut self.clients, client_id, session_id) {
            Ok(session) => Some(session),
            Err(e) => {
                error!(pub_sub_id = %id, kind, error = %e, "discovery id owner is gone");
                self.discovery_index.remove(&id);
                None
            }
        }
    }

    fn on_terminated(&mut self, id: PubSubId, reason: TerminateReason) {
        if let Some(session) = self.route(id, "terminated") {
            session.on_terminated(reason);
            self.discovery_index.remove(&id);
        }
    }

    fn on_message_send_result(&mut self, transaction_id: TransactionId, failure: Option<FailReason>) {
        let (client_id, session_id, message_id) = match self.transactions.resolve(transaction_id) {
            Some(TransactionRecord::Message {
                client_id,
                session_id,
                message_id,
            }) => (client_id, session_id, message_id),
            Some(record) => {
                error!(transaction_id = %transaction_id, ?record, "record is not a message");
                return;
            }
            None => {
                error!(transaction_id = %transaction_id, "message result for unknown transaction");
                return;
            }
        };
        let Ok(session) = session_mut(&mut self.clients, client_id, session_id) else {
            warn!(transaction_id = %transaction_id, "message result for gone session");
            return;
        };
        match failure {
            None => session.on_message_send_success(message_id),
            Some(reason) => session.on_message_send_fail(message_id, reason),
        }
    }

    fn on_identity_changed(&self, source: &str, address: MacAddress) {
        debug!(source, %address, "identity changed");
        let n = self.broadcast(ClientEvents::IDENTITY_CHANGED, |cb| cb.on_identity_changed());
        if n == 0 {
            error!(source, "identity changed: no client listening");
        }
    }

    /// Deliver to every client listening for `event`. Returns how many were notified.
    fn broadcast(&self, event: ClientEvents, f: impl Fn(&dyn EventCallback)) -> usize {
        let mut notified = 0;
        for cb in self.clients.values().filter_map(|c| c.listener(event)) {
            f(cb);
            notified += 1;
        }
        notified
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn capabilities(&self) -> Option<&Capabilities> {
        self.capabilities.as_ref()
    }

    pub fn client(&self, client_id: ClientId) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    pub fn client_ids(&self) -> Vec<ClientId> {
        let mut ids: Vec<ClientId> = self.clients.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn session(&self, client_id: ClientId, session_id: SessionId) -> Option<&Session> {
        self.clients.get(&client_id)?.session(session_id)
    }

    /// Session currently holding `id`, if any.
    pub fn discovery_owner(&self, id: PubSubId) -> Option<(ClientId, SessionId)> {
        self.discovery_index.get(&id).copied()
    }

    pub fn transactions(&self) -> &TransactionTable {
        &self.transactions
    }

    pub fn hal(&self) -> &H {
        &self.hal
    }

    pub fn hal_mut(&mut self) -> &mut H {
        &mut self.hal
    }
}
