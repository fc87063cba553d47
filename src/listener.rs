//! Generic line based TCP listener.
//!
//! A [`LineListener`] binds one address, optionally wraps every accepted
//! stream in TLS, splits the stream into CRLF terminated lines and hands
//! the decoded lines to a [`LineHandler`]. Each connection owns its own
//! handler session value; nothing is shared between connections.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, trace, warn};

use crate::codec::{Charset, Frame, LineReader, DEFAULT_MAX_LINE_LENGTH};
use crate::tls::TlsContext;
use crate::utils::safe_log_string;

/// Address used when no bind host is configured.
const ALL_INTERFACES: &str = "0.0.0.0";

/// Callbacks invoked by a [`LineListener`] for every connection.
///
/// Events of one connection are delivered in order and each call returns
/// before the next line of that connection is read. Replies are queued on
/// the [`Outbox`] and written by the listener once the call returns.
pub trait LineHandler: Send + Sync + 'static {
    /// Per connection state, created on accept and dropped on close.
    type Session: Send + 'static;

    fn connected(&self, peer: SocketAddr, out: &mut Outbox) -> Self::Session;

    fn line_received(&self, session: &mut Self::Session, line: &str, out: &mut Outbox);

    fn disconnected(&self, _session: Self::Session, _peer: SocketAddr) {}
}

/// Lines waiting to be written to one connection, plus its close request.
#[derive(Debug, Default)]
pub struct Outbox {
    lines: Vec<String>,
    closing: bool,
}

impl Outbox {
    /// Queues a line; the terminator is added on write. Ignored once the
    /// connection is closing.
    pub fn write(&mut self, line: impl Into<String>) {
        if !self.closing {
            self.lines.push(line.into());
        }
    }

    /// Closes the connection after the queued lines are written.
    pub fn close(&mut self) {
        self.closing = true;
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_closing(&self) -> bool {
        self.closing
    }
}

#[derive(Clone)]
pub struct ListenerConfig {
    pub host: Option<String>,
    pub port: u16,
    pub tls: Option<TlsContext>,
    pub charset: Charset,
    pub max_line_length: usize,
}

impl ListenerConfig {
    pub fn new(host: Option<String>, port: u16, charset: Charset) -> Self {
        Self {
            host,
            port,
            tls: None,
            charset,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }

    pub fn with_tls(mut self, tls: Option<TlsContext>) -> Self {
        self.tls = tls;
        self
    }

    pub fn with_max_line_length(mut self, max_line_length: usize) -> Self {
        self.max_line_length = max_line_length;
        self
    }

    pub fn host(&self) -> &str {
        self.host.as_deref().unwrap_or(ALL_INTERFACES)
    }
}

struct Shared<H> {
    name: &'static str,
    handler: Arc<H>,
    tls: Option<TlsAcceptor>,
    charset: Charset,
    max_line_length: usize,
}

struct Bound {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    acceptor: JoinHandle<()>,
}

pub struct LineListener<H: LineHandler> {
    name: &'static str,
    config: ListenerConfig,
    handler: Arc<H>,
    bound: Mutex<Option<Bound>>,
}

impl<H: LineHandler> LineListener<H> {
    pub fn new(name: &'static str, config: ListenerConfig, handler: H) -> Self {
        Self {
            name,
            config,
            handler: Arc::new(handler),
            bound: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    /// Binds the configured address and starts accepting connections.
    ///
    /// Returns the bound address. Calling `start` on a bound listener
    /// returns the current address without binding again.
    pub async fn start(&self) -> io::Result<SocketAddr> {
        let mut bound = self.bound.lock().await;
        if let Some(bound) = bound.as_ref() {
            return Ok(bound.local_addr);
        }

        let listener = TcpListener::bind((self.config.host(), self.config.port)).await?;
        let local_addr = listener.local_addr()?;
        info!(
            listener = self.name,
            address = %local_addr,
            tls = self.config.tls.is_some(),
            "listening"
        );

        let shared = Arc::new(Shared {
            name: self.name,
            handler: Arc::clone(&self.handler),
            tls: self.config.tls.as_ref().map(TlsContext::acceptor),
            charset: self.config.charset,
            max_line_length: self.config.max_line_length,
        });
        let (shutdown, signal) = watch::channel(false);
        let acceptor = tokio::spawn(accept_loop(listener, shared, signal));

        *bound = Some(Bound {
            local_addr,
            shutdown,
            acceptor,
        });
        Ok(local_addr)
    }

    /// Unbinds the listener and closes its connections. A no-op when the
    /// listener is not bound.
    ///
    /// Connections are closed at their next read, so a reply already
    /// produced by the handler is still written.
    pub async fn stop(&self) {
        let mut bound = self.bound.lock().await;
        let Some(Bound {
            local_addr,
            shutdown,
            acceptor,
        }) = bound.take()
        else {
            return;
        };

        let _ = shutdown.send(true);
        if let Err(e) = acceptor.await {
            warn!(listener = self.name, error = %e, "accept loop ended abnormally");
        }
        info!(listener = self.name, address = %local_addr, "unbound");
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.bound.lock().await.as_ref().map(|b| b.local_addr)
    }

    pub async fn is_active(&self) -> bool {
        self.bound.lock().await.is_some()
    }
}

async fn accept_loop<H: LineHandler>(
    listener: TcpListener,
    shared: Arc<Shared<H>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut connections = JoinSet::new();
    let connection_signal = shutdown.clone();

    loop {
        tokio::select! {
            _ = stopping(&mut shutdown) => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(listener = shared.name, %peer, "connection accepted");
                    connections.spawn(handle_connection(
                        stream,
                        peer,
                        Arc::clone(&shared),
                        connection_signal.clone(),
                    ));
                }
                Err(e) => {
                    warn!(listener = shared.name, error = %e, "accept failed");
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    drop(listener);
    while connections.join_next().await.is_some() {}
}

async fn handle_connection<H: LineHandler>(
    stream: TcpStream,
    peer: SocketAddr,
    shared: Arc<Shared<H>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let result = match &shared.tls {
        Some(acceptor) => {
            let handshake = tokio::select! {
                handshake = acceptor.accept(stream) => handshake,
                _ = stopping(&mut shutdown) => return,
            };
            match handshake {
                Ok(stream) => {
                    debug!(listener = shared.name, %peer, "TLS session established");
                    serve(stream, peer, &shared, &mut shutdown).await
                }
                Err(e) => {
                    warn!(listener = shared.name, %peer, error = %e, "TLS handshake failed");
                    return;
                }
            }
        }
        None => serve(stream, peer, &shared, &mut shutdown).await,
    };

    match result {
        Ok(()) => debug!(listener = shared.name, %peer, "connection closed"),
        Err(e) => warn!(listener = shared.name, %peer, error = %e, "connection closed on error"),
    }
}

async fn serve<H, S>(
    stream: S,
    peer: SocketAddr,
    shared: &Shared<H>,
    shutdown: &mut watch::Receiver<bool>,
) -> io::Result<()>
where
    H: LineHandler,
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut lines = LineReader::new(BufReader::new(reader), shared.max_line_length);
    let mut out = Outbox::default();
    let mut session = shared.handler.connected(peer, &mut out);

    let result: io::Result<()> = async {
        if !write_replies(&mut writer, &mut out, shared, peer, shutdown).await? {
            return Ok(());
        }

        loop {
            let frame = tokio::select! {
                frame = lines.next_frame() => frame?,
                _ = stopping(shutdown) => {
                    debug!(listener = shared.name, %peer, "closing on shutdown");
                    return Ok(());
                }
            };

            let bytes = match frame {
                Some(Frame::Line(bytes)) => bytes,
                Some(Frame::Overlong) => {
                    warn!(
                        listener = shared.name,
                        %peer,
                        limit = shared.max_line_length,
                        "discarded overlong line"
                    );
                    continue;
                }
                None => return Ok(()),
            };

            let line = shared
                .charset
                .decode(bytes)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            trace!(listener = shared.name, %peer, ">> {}", safe_log_string(&line));

            shared.handler.line_received(&mut session, &line, &mut out);
            if !write_replies(&mut writer, &mut out, shared, peer, shutdown).await? {
                return Ok(());
            }
        }
    }
    .await;

    tokio::select! {
        biased;
        _ = writer.shutdown() => {}
        _ = stopping(shutdown) => {}
    }
    shared.handler.disconnected(session, peer);
    result
}

/// Resolves once the listener is stopping.
async fn stopping(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Writes the queued replies unless the listener stops first. A peer that
/// never reads must not hold up `stop()`; replies that fit the socket
/// buffer are still written since the flush is polled first.
async fn write_replies<H, W>(
    writer: &mut W,
    out: &mut Outbox,
    shared: &Shared<H>,
    peer: SocketAddr,
    shutdown: &mut watch::Receiver<bool>,
) -> io::Result<bool>
where
    H: LineHandler,
    W: AsyncWrite + Unpin,
{
    tokio::select! {
        biased;
        open = flush_outbox(writer, out, shared.charset, shared.name, peer) => open,
        _ = stopping(shutdown) => {
            debug!(listener = shared.name, %peer, "dropping unsent replies on shutdown");
            Ok(false)
        }
    }
}

/// Writes the queued lines. Returns `false` once the connection should close.
async fn flush_outbox<W: AsyncWrite + Unpin>(
    writer: &mut W,
    out: &mut Outbox,
    charset: Charset,
    listener: &str,
    peer: SocketAddr,
) -> io::Result<bool> {
    if out.lines.is_empty() && !out.closing {
        return Ok(true);
    }

    for line in out.lines.drain(..) {
        let bytes = charset
            .encode_line(&line)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        writer.write_all(&bytes).await?;
        trace!(listener, %peer, "<< {}", safe_log_string(&line));
    }
    writer.flush().await?;

    Ok(!out.closing)
}
