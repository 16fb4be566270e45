//! Pending hardware requests keyed by transaction id.

use std::collections::HashMap;

use crate::config::ConfigRequest;
use crate::types::{ClientId, SessionId, TransactionId};

/// What a pending transaction was issued for.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionRecord {
    /// enable/configure carrying the merged configuration that was sent.
    Config(ConfigRequest),
    /// publish, subscribe or stop on a session.
    Session {
        client_id: ClientId,
        session_id: SessionId,
    },
    /// Follow-up message on a session.
    Message {
        client_id: ClientId,
        session_id: SessionId,
        message_id: u32,
    },
    /// Fire-and-forget (disable, stop on teardown).
    Untyped,
}

impl TransactionRecord {
    pub fn client_id(&self) -> Option<ClientId> {
        match self {
            TransactionRecord::Session { client_id, .. }
            | TransactionRecord::Message { client_id, .. } => Some(*client_id),
            TransactionRecord::Config(_) | TransactionRecord::Untyped => None,
        }
    }

    pub fn session(&self) -> Option<(ClientId, SessionId)> {
        match self {
            TransactionRecord::Session {
                client_id,
                session_id,
            }
            | TransactionRecord::Message {
                client_id,
                session_id,
                ..
            } => Some((*client_id, *session_id)),
            TransactionRecord::Config(_) | TransactionRecord::Untyped => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum TransactionError {
    #[error("all transaction ids are pending")]
    Exhausted,
}

/// Wrapping id allocator plus the pending table. Ids start at 1 and never take 0;
/// an id still pending is never handed out again.
#[derive(Debug)]
pub struct TransactionTable {
    next: u16,
    pending: HashMap<TransactionId, TransactionRecord>,
}

impl Default for TransactionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionTable {
    pub fn new() -> Self {
        Self {
            next: 1,
            pending: HashMap::new(),
        }
    }

    /// Allocate an id and store `record` under it. The record is in the table
    /// before the caller issues the hardware call.
    pub fn register(&mut self, record: TransactionRecord) -> Result<TransactionId, TransactionError> {
        let id = self.allocate()?;
        self.pending.insert(id, record);
        Ok(id)
    }

    fn allocate(&mut self) -> Result<TransactionId, TransactionError> {
        for _ in 0..u16::MAX {
            let candidate = TransactionId(self.next);
            self.next = match self.next.wrapping_add(1) {
                0 => 1,
                n => n,
            };
            if !self.pending.contains_key(&candidate) {
                return Ok(candidate);
            }
        }
        Err(TransactionError::Exhausted)
    }

    /// Remove and return the record for `id`, if still pending.
    pub fn resolve(&mut self, id: TransactionId) -> Option<TransactionRecord> {
        self.pending.remove(&id)
    }

    /// Drop a record whose hardware call was never issued.
    pub fn cancel(&mut self, id: TransactionId) {
        self.pending.remove(&id);
    }

    /// Remove every record owned by `client_id`. Returns how many were dropped.
    pub fn purge_client(&mut self, client_id: ClientId) -> usize {
        let before = self.pending.len();
        self.pending
            .retain(|_, record| record.client_id() != Some(client_id));
        before - self.pending.len()
    }

    /// Remove every record scoped to one session of one client.
    pub fn purge_session(&mut self, client_id: ClientId, session_id: SessionId) -> usize {
        let before = self.pending.len();
        self.pending
            .retain(|_, record| record.session() != Some((client_id, session_id)));
        before - self.pending.len()
    }

    pub fn get(&self, id: TransactionId) -> Option<&TransactionRecord> {
        self.pending.get(&id)
    }

    pub fn contains(&self, id: TransactionId) -> bool {
        self.pending.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
