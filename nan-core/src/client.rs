//! A connected client: its notification target, event interest, requested
//! configuration, and the sessions it owns.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::callback::{ClientEvents, EventCallback};
use crate::config::ConfigRequest;
use crate::session::Session;
use crate::types::{ClientId, SessionId};

pub struct Client {
    id: ClientId,
    callback: Arc<dyn EventCallback>,
    events: ClientEvents,
    config: Option<ConfigRequest>,
    sessions: HashMap<SessionId, Session>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("events", &self.events)
            .field("config", &self.config)
            .field("sessions", &self.sessions)
            .finish()
    }
}

impl Client {
    pub fn new(
        id: ClientId,
        callback: Arc<dyn EventCallback>,
        events: ClientEvents,
        config: Option<ConfigRequest>,
    ) -> Self {
        Self {
            id,
            callback,
            events,
            config,
            sessions: HashMap::new(),
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn events(&self) -> ClientEvents {
        self.events
    }

    pub fn config(&self) -> Option<&ConfigRequest> {
        self.config.as_ref()
    }

    pub fn set_config(&mut self, config: ConfigRequest) {
        self.config = Some(config);
    }

    /// The callback, if this client listens for `event`.
    pub fn listener(&self, event: ClientEvents) -> Option<&dyn EventCallback> {
        self.events
            .contains(event)
            .then(|| self.callback.as_ref())
    }

    /// Insert `session`, returning the one it replaced under the same id.
    pub fn insert_session(&mut self, session: Session) -> Option<Session> {
        self.sessions.insert(session.session_id(), session)
    }

    pub fn remove_session(&mut self, session_id: SessionId) -> Option<Session> {
        self.sessions.remove(&session_id)
    }

    pub fn session(&self, session_id: SessionId) -> Option<&Session> {
        self.sessions.get(&session_id)
    }

    pub fn session_mut(&mut self, session_id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&session_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Remove all sessions, consuming the client.
    pub fn into_sessions(self) -> impl Iterator<Item = Session> {
        self.sessions.into_values()
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use super::*;
    use crate::callback::SessionEvents;
    use crate::testing::{RecordingEventCallback, RecordingSessionCallback};

    fn session(id: u32) -> Session {
        Session::new(
            ClientId(1),
            SessionId(id),
            RecordingSessionCallback::new(),
            SessionEvents::ALL,
            NonZeroUsize::new(4).unwrap(),
        )
    }

    #[test]
    fn listener_respects_mask() {
        let cb = RecordingEventCallback::new();
        let client = Client::new(ClientId(1), cb, ClientEvents::NAN_DOWN, None);
        assert!(client.listener(ClientEvents::NAN_DOWN).is_some());
        assert!(client.listener(ClientEvents::CONFIG_COMPLETED).is_none());
    }

    #[test]
    fn insert_replaces_same_id() {
        let mut client = Client::new(
            ClientId(1),
            RecordingEventCallback::new(),
            ClientEvents::ALL,
            None,
        );
        assert!(client.insert_session(session(5)).is_none());
        assert!(client.insert_session(session(6)).is_none());
        let replaced = client.insert_session(session(5));
        assert_eq!(replaced.map(|s| s.session_id()), Some(SessionId(5)));
        assert_eq!(client.session_count(), 2);
        assert_eq!(client.into_sessions().count(), 2);
    }

    #[test]
    fn set_config_replaces_previous() {
        let mut client = Client::new(
            ClientId(1),
            RecordingEventCallback::new(),
            ClientEvents::ALL,
            Some(ConfigRequest::default()),
        );
        let cfg = ConfigRequest::builder().master_preference(10).build().unwrap();
        client.set_config(cfg);
        assert_eq!(client.config(), Some(&cfg));
    }
}
