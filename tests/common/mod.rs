//! Shared helpers for the integration tests: a service bound to ephemeral
//! localhost ports and a minimal line client.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use noop_smtp::{Endpoint, NoopSmtp, SmtpHandler};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

pub const TIMEOUT: Duration = Duration::from_secs(5);
pub const VERSION: &str = "9.9.9-test";

pub fn localhost() -> Endpoint {
    Endpoint::new(Some("127.0.0.1".to_string()), 0)
}

/// Starts a service on ephemeral ports and returns it with its SMTP and
/// control addresses.
pub async fn start_service(smtp: Endpoint, control: Endpoint) -> (Arc<NoopSmtp>, SocketAddr, SocketAddr) {
    let service = NoopSmtp::with_handler(smtp, control, SmtpHandler::new(VERSION));
    service.start().await.expect("service starts");
    let smtp = service.smtp_addr().await.expect("smtp bound");
    let control = service.control_addr().await.expect("control bound");
    (service, smtp, control)
}

pub struct LineClient<S> {
    reader: BufReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
}

impl LineClient<TcpStream> {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = timeout(TIMEOUT, TcpStream::connect(addr))
            .await
            .expect("connect in time")
            .expect("connect");
        Self::new(stream)
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> LineClient<S> {
    pub fn new(stream: S) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    pub async fn send(&mut self, line: &str) {
        self.send_raw(format!("{}\r\n", line).as_bytes()).await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.expect("write");
        self.writer.flush().await.expect("flush");
    }

    /// Reads one raw line including its terminator, `None` on end of stream.
    pub async fn read_raw(&mut self) -> Option<String> {
        let mut line = String::new();
        let read = timeout(TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("reply in time");
        match read {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line),
        }
    }

    pub async fn read(&mut self) -> Option<String> {
        self.read_raw()
            .await
            .map(|line| line.trim_end_matches("\r\n").to_string())
    }

    pub async fn command(&mut self, line: &str) -> String {
        self.send(line).await;
        self.read().await.expect("reply")
    }

    pub async fn is_closed(&mut self) -> bool {
        self.read_raw().await.is_none()
    }
}
