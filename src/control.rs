use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::listener::{LineHandler, Outbox};

pub const REPLY_STOPPING: &str = "Stopping NoopSMTP Server";

/// Stops the whole service. Must not fail when the service is not running.
pub trait Stoppable: Send + Sync {
    fn stop(&self);
}

/// Queues a shutdown request for the supervisor that owns the listeners.
///
/// Never blocks, so it is safe to call from a connection event.
#[derive(Clone)]
pub struct ShutdownRequester {
    tx: mpsc::UnboundedSender<()>,
}

impl ShutdownRequester {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Stoppable for ShutdownRequester {
    fn stop(&self) {
        if self.tx.send(()).is_err() {
            warn!("shutdown supervisor is gone, request dropped");
        }
    }
}

/// Handler installed on the control listener: any line stops the service.
pub struct ControlHandler {
    stoppable: Arc<dyn Stoppable>,
}

impl ControlHandler {
    pub fn new(stoppable: Arc<dyn Stoppable>) -> Self {
        Self { stoppable }
    }
}

impl LineHandler for ControlHandler {
    type Session = ();

    fn connected(&self, _peer: SocketAddr, _out: &mut Outbox) {}

    fn line_received(&self, _session: &mut (), _line: &str, out: &mut Outbox) {
        info!("shutdown requested over control channel");
        out.write(REPLY_STOPPING);
        out.close();
        self.stoppable.stop();
    }
}
