// NAN Linux: session coordinator daemon on a loopback driver.

mod config;
mod driver;

use std::sync::Arc;

use anyhow::{Context, Result};
use nan_core::{
    ClientEvents, ConfigRequest, EventCallback, FailReason, NanService, PeerId, PublishConfig,
    SessionCallback, SessionEvents, SessionId, StatusCode, SubscribeConfig, TerminateReason,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Role;
use crate::driver::LoopbackDriver;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Client-level notifications go to the log.
struct LogEvents;

impl EventCallback for LogEvents {
    fn on_config_completed(&self, config: &ConfigRequest) {
        info!(?config, "configuration applied");
    }

    fn on_config_failed(&self, config: &ConfigRequest, reason: FailReason) {
        warn!(?config, ?reason, "configuration failed");
    }

    fn on_nan_down(&self, reason: StatusCode) {
        warn!(reason = %reason, "nan down");
    }

    fn on_identity_changed(&self) {
        info!("identity changed");
    }
}

/// Session notifications for one configured service.
struct LogSession {
    service: String,
}

impl SessionCallback for LogSession {
    fn on_session_started(&self, session_id: SessionId) {
        info!(service = %self.service, session_id = %session_id, "session started");
    }

    fn on_publish_fail(&self, reason: FailReason) {
        warn!(service = %self.service, ?reason, "publish failed");
    }

    fn on_publish_terminated(&self, reason: TerminateReason) {
        info!(service = %self.service, ?reason, "publish terminated");
    }

    fn on_subscribe_fail(&self, reason: FailReason) {
        warn!(service = %self.service, ?reason, "subscribe failed");
    }

    fn on_subscribe_terminated(&self, reason: TerminateReason) {
        info!(service = %self.service, ?reason, "subscribe terminated");
    }

    fn on_match(&self, peer: PeerId, service_specific_info: &[u8], _match_filter: &[u8]) {
        info!(
            service = %self.service,
            peer = %peer,
            info = %String::from_utf8_lossy(service_specific_info),
            "match"
        );
    }

    fn on_message_send_success(&self, message_id: u32) {
        info!(service = %self.service, message_id, "message sent");
    }

    fn on_message_send_fail(&self, message_id: u32, reason: FailReason) {
        warn!(service = %self.service, message_id, ?reason, "message send failed");
    }

    fn on_message_received(&self, peer: PeerId, message: &[u8]) {
        info!(service = %self.service, peer = %peer, len = message.len(), "message received");
    }
}

fn init_tracing(filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    for arg in std::env::args().skip(1) {
        if arg == "--version" || arg == "-V" {
            println!("nan-linux {}", VERSION);
            return Ok(());
        }
    }

    let cfg = config::load();
    init_tracing(&cfg.log_filter)?;
    let request = cfg
        .device
        .to_request()
        .context("invalid [device] configuration")?;

    let service = NanService::spawn(cfg.core_settings(), LoopbackDriver::new)
        .context("starting coordinator")?;
    let client = service.connect(Arc::new(LogEvents), ClientEvents::ALL, Some(request))?;
    info!(version = VERSION, client_id = %client, services = cfg.services.len(), "nan-linux started");

    for svc in &cfg.services {
        let callback = Arc::new(LogSession {
            service: svc.name.clone(),
        });
        let session = service.create_session(client, callback, SessionEvents::ALL)?;
        let info = svc.service_info.as_bytes().to_vec();
        match svc.role {
            Role::Publish => service.publish(
                client,
                session,
                PublishConfig::new(svc.name.as_str()).with_service_specific_info(info),
            )?,
            Role::Subscribe => service.subscribe(
                client,
                session,
                SubscribeConfig::new(svc.name.as_str()).with_service_specific_info(info),
            )?,
        }
    }

    let rt = tokio::runtime::Runtime::new().context("creating runtime")?;
    rt.block_on(shutdown_signal())?;

    info!("shutting down");
    service.disconnect(client)?;
    service.shutdown()?;
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
