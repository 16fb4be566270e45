//! Threaded handle around [`NanCore`].
//!
//! Application requests and hardware events share one ordered queue drained by a
//! single worker thread, so the coordinator state is never touched concurrently.
//! Every public call only enqueues and returns.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::callback::{ClientEvents, EventCallback, SessionCallback, SessionEvents};
use crate::config::{ConfigRequest, CoreSettings};
use crate::core::{Command, NanCore};
use crate::discovery::{PublishConfig, SubscribeConfig};
use crate::error::NanError;
use crate::hal::{HalEvent, NanHal};
use crate::types::{ClientId, PeerId, SessionId};

const WORKER_NAME: &str = "nan-state";

enum Envelope {
    Command(Command),
    Event(HalEvent),
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// Inbound injector for hardware events. Cheap to clone; hand one to the driver.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl EventSink {
    pub fn post(&self, event: HalEvent) -> Result<(), NanError> {
        self.tx
            .send(Envelope::Event(event))
            .map_err(|_| NanError::QueueClosed)
    }
}

pub struct NanService {
    tx: mpsc::UnboundedSender<Envelope>,
    worker: Option<JoinHandle<()>>,
    next_client_id: AtomicU32,
    next_session_id: AtomicU32,
}

impl NanService {
    /// Start the worker. `make_hal` receives the event sink the driver should post to.
    pub fn spawn<H, F>(settings: CoreSettings, make_hal: F) -> Result<Self, NanError>
    where
        H: NanHal + 'static,
        F: FnOnce(EventSink) -> H,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let hal = make_hal(EventSink { tx: tx.clone() });
        let core = NanCore::with_settings(hal, settings);
        let worker = thread::Builder::new()
            .name(WORKER_NAME.into())
            .spawn(move || run(core, rx))
            .map_err(NanError::WorkerSpawn)?;
        Ok(Self {
            tx,
            worker: Some(worker),
            next_client_id: AtomicU32::new(1),
            next_session_id: AtomicU32::new(1),
        })
    }

    pub fn event_sink(&self) -> EventSink {
        EventSink {
            tx: self.tx.clone(),
        }
    }

    fn send(&self, command: Command) -> Result<(), NanError> {
        self.tx
            .send(Envelope::Command(command))
            .map_err(|_| NanError::QueueClosed)
    }

    pub fn connect(
        &self,
        callback: Arc<dyn EventCallback>,
        events: ClientEvents,
        config: Option<ConfigRequest>,
    ) -> Result<ClientId, NanError> {
        let client_id = ClientId(self.next_client_id.fetch_add(1, Ordering::Relaxed));
        self.send(Command::Connect {
            client_id,
            callback,
            events,
            config,
        })?;
        Ok(client_id)
    }

    pub fn disconnect(&self, client_id: ClientId) -> Result<(), NanError> {
        self.send(Command::Disconnect { client_id })
    }

    pub fn request_config(&self, client_id: ClientId, config: ConfigRequest) -> Result<(), NanError> {
        self.send(Command::RequestConfig { client_id, config })
    }

    pub fn create_session(
        &self,
        client_id: ClientId,
        callback: Arc<dyn SessionCallback>,
        events: SessionEvents,
    ) -> Result<SessionId, NanError> {
        let session_id = SessionId(self.next_session_id.fetch_add(1, Ordering::Relaxed));
        self.send(Command::CreateSession {
            client_id,
            session_id,
            callback,
            events,
        })?;
        Ok(session_id)
    }

    pub fn destroy_session(&self, client_id: ClientId, session_id: SessionId) -> Result<(), NanError> {
        self.send(Command::DestroySession {
            client_id,
            session_id,
        })
    }

    pub fn publish(
        &self,
        client_id: ClientId,
        session_id: SessionId,
        config: PublishConfig,
    ) -> Result<(), NanError> {
        self.send(Command::Publish {
            client_id,
            session_id,
            config,
        })
    }

    pub fn subscribe(
        &self,
        client_id: ClientId,
        session_id: SessionId,
        config: SubscribeConfig,
    ) -> Result<(), NanError> {
        self.send(Command::Subscribe {
            client_id,
            session_id,
            config,
        })
    }

    pub fn send_message(
        &self,
        client_id: ClientId,
        session_id: SessionId,
        peer: PeerId,
        message_id: u32,
        payload: Vec<u8>,
    ) -> Result<(), NanError> {
        self.send(Command::SendMessage {
            client_id,
            session_id,
            peer,
            message_id,
            payload,
        })
    }

    pub fn stop_session(&self, client_id: ClientId, session_id: SessionId) -> Result<(), NanError> {
        self.send(Command::StopSession {
            client_id,
            session_id,
        })
    }

    /// Block until everything enqueued before this call has been processed.
    /// Must not be called from inside an async task.
    pub fn flush(&self) -> Result<(), NanError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(Envelope::Flush(done_tx))
            .map_err(|_| NanError::QueueClosed)?;
        done_rx.blocking_recv().map_err(|_| NanError::QueueClosed)
    }

    /// Process everything already queued, then stop the worker and join it.
    pub fn shutdown(mut self) -> Result<(), NanError> {
        self.stop_worker()
    }

    fn stop_worker(&mut self) -> Result<(), NanError> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        // A closed queue means the worker already exited; join regardless.
        let _ = self.tx.send(Envelope::Shutdown);
        worker.join().map_err(|_| NanError::WorkerPanicked)
    }
}

impl Drop for NanService {
    fn drop(&mut self) {
        if let Err(e) = self.stop_worker() {
            warn!(error = %e, "coordinator worker did not stop cleanly");
        }
    }
}

fn run<H: NanHal>(mut core: NanCore<H>, mut rx: mpsc::UnboundedReceiver<Envelope>) {
    info!("coordinator started");
    while let Some(envelope) = rx.blocking_recv() {
        match envelope {
            Envelope::Command(command) => {
                let kind = command.kind();
                if let Err(e) = core.handle_command(command) {
                    warn!(command = kind, error = %e, "command rejected");
                }
            }
            Envelope::Event(event) => {
                debug!(event = event.kind(), "hal event");
                core.handle_event(event);
            }
            Envelope::Flush(done) => {
                let _ = done.send(());
            }
            Envelope::Shutdown => break,
        }
    }
    info!(clients = core.client_ids().len(), "coordinator stopped");
}
