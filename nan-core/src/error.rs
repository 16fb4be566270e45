use crate::config::ConfigError;
use crate::session::SessionError;
use crate::transaction::TransactionError;
use crate::types::{ClientId, SessionId};

/// Error returned by coordinator commands and the service handle.
#[derive(Debug, thiserror::Error)]
pub enum NanError {
    #[error("unknown client {0}")]
    UnknownClient(ClientId),
    #[error("client {0} is already connected")]
    DuplicateClient(ClientId),
    #[error("unknown session {session} on client {client}")]
    UnknownSession { client: ClientId, session: SessionId },
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
    #[error("coordinator queue closed")]
    QueueClosed,
    #[error("failed to start coordinator thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),
    #[error("coordinator thread panicked")]
    WorkerPanicked,
}
