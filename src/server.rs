//! The NoopSMTP service: an SMTP listener plus a control listener that can
//! shut both down remotely.

use std::net::SocketAddr;
use std::sync::{Arc, Weak};

use tokio::sync::{mpsc, watch, Mutex};
use tracing::{error, info};

use crate::codec::Charset;
use crate::control::{ControlHandler, ShutdownRequester};
use crate::error::{Error, Result};
use crate::listener::{LineHandler, LineListener, ListenerConfig};
use crate::session::SmtpHandler;
use crate::tls::TlsContext;

pub const DEFAULT_SMTP_SERVER_PORT: u16 = 9025;
pub const DEFAULT_CONTROL_SERVER_PORT: u16 = 9026;

/// Where one endpoint listens. A missing host means all interfaces.
#[derive(Clone, Debug)]
pub struct Endpoint {
    pub host: Option<String>,
    pub port: u16,
    pub tls: Option<TlsContext>,
}

impl Endpoint {
    pub fn new(host: Option<String>, port: u16) -> Self {
        Self {
            host,
            port,
            tls: None,
        }
    }

    pub fn with_tls(mut self, tls: Option<TlsContext>) -> Self {
        self.tls = tls;
        self
    }

    fn listener_config(self, charset: Charset) -> ListenerConfig {
        ListenerConfig::new(self.host, self.port, charset).with_tls(self.tls)
    }
}

pub struct NoopSmtp {
    smtp: LineListener<SmtpHandler>,
    control: LineListener<ControlHandler>,
    started: Mutex<bool>,
    stop_requests: Mutex<Option<mpsc::UnboundedReceiver<()>>>,
    running: watch::Sender<bool>,
}

impl NoopSmtp {
    pub fn new(smtp: Endpoint, control: Endpoint) -> Arc<Self> {
        Self::with_handler(smtp, control, SmtpHandler::default())
    }

    pub fn with_handler(smtp: Endpoint, control: Endpoint, handler: SmtpHandler) -> Arc<Self> {
        let (requester, stop_requests) = ShutdownRequester::channel();

        Arc::new(Self {
            smtp: LineListener::new("smtp", smtp.listener_config(Charset::Ascii), handler),
            control: LineListener::new(
                "control",
                control.listener_config(Charset::Utf8),
                ControlHandler::new(Arc::new(requester)),
            ),
            started: Mutex::new(false),
            stop_requests: Mutex::new(Some(stop_requests)),
            running: watch::Sender::new(false),
        })
    }

    /// Starts the control listener, then the SMTP listener.
    ///
    /// If either fails to bind, whatever was bound is released before the
    /// error is returned. Starting a started service does nothing.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let mut started = self.started.lock().await;
        if *started {
            return Ok(());
        }

        if let Err(e) = self.start_listeners().await {
            error!(error = %e, "start failed, releasing bound listeners");
            self.smtp.stop().await;
            self.control.stop().await;
            return Err(e);
        }

        *started = true;
        self.running.send_replace(true);
        self.spawn_supervisor().await;
        info!("NoopSMTP Server started");
        Ok(())
    }

    async fn start_listeners(&self) -> Result<()> {
        bind(&self.control).await?;
        bind(&self.smtp).await?;
        Ok(())
    }

    /// Stops both listeners. A no-op when the service is not started.
    pub async fn stop(&self) {
        let mut started = self.started.lock().await;
        if !*started {
            return;
        }

        self.smtp.stop().await;
        self.control.stop().await;

        *started = false;
        self.running.send_replace(false);
        info!("NoopSMTP Server stopped");
    }

    pub async fn is_started(&self) -> bool {
        *self.started.lock().await
    }

    /// Resolves once the service is not running, immediately if it was never
    /// started.
    pub async fn stopped(&self) {
        let mut running = self.running.subscribe();
        let _ = running.wait_for(|running| !*running).await;
    }

    pub async fn smtp_addr(&self) -> Option<SocketAddr> {
        self.smtp.local_addr().await
    }

    pub async fn control_addr(&self) -> Option<SocketAddr> {
        self.control.local_addr().await
    }

    /// Serves shutdown requests from the control channel on a task of its
    /// own, so a listener is never stopped from one of its connections.
    async fn spawn_supervisor(self: &Arc<Self>) {
        let Some(mut requests) = self.stop_requests.lock().await.take() else {
            return;
        };
        let service: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            while requests.recv().await.is_some() {
                let Some(service) = service.upgrade() else {
                    break;
                };
                service.stop().await;
            }
        });
    }
}

async fn bind<H: LineHandler>(listener: &LineListener<H>) -> Result<SocketAddr> {
    let config = listener.config();
    listener.start().await.map_err(|source| Error::Bind {
        endpoint: listener.name(),
        address: format!("{}:{}", config.host(), config.port),
        source,
    })
}
