//! Neighbor Awareness Networking session coordinator.
//! Host-driven: no I/O; the host feeds commands and hardware events and supplies
//! the hardware adapter the coordinator calls out to.

pub mod callback;
pub mod client;
pub mod config;
pub mod core;
pub mod discovery;
pub mod error;
pub mod hal;
pub mod service;
pub mod session;
pub mod transaction;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use callback::{ClientEvents, EventCallback, SessionCallback, SessionEvents};
pub use config::{merge_config_requests, ConfigError, ConfigRequest, CoreSettings, CLUSTER_ID_MAX};
pub use self::core::{Command, DeviceState, NanCore};
pub use discovery::{MatchStyle, PublishConfig, PublishType, SubscribeConfig, SubscribeType};
pub use error::NanError;
pub use hal::{Capabilities, HalEvent, NanHal};
pub use service::{EventSink, NanService};
pub use session::{SessionError, SessionMode};
pub use transaction::{TransactionError, TransactionRecord};
pub use types::{
    ClientId, ClusterChange, FailReason, MacAddress, PeerId, PubSubId, SessionId, StatusCode,
    TerminateReason, TransactionId,
};
