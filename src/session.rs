//! SMTP session handling.
//!
//! No command ordering is enforced and no message content is kept: every
//! recognised command gets its fixed reply, `DATA` switches to data capture
//! until a line consisting of exactly `.` arrives.

use std::net::SocketAddr;

use tracing::debug;

use crate::listener::{LineHandler, Outbox};

pub const REPLY_READY: &str = "220 Service ready";
pub const REPLY_OK: &str = "250 OK";
pub const REPLY_START_MAIL_INPUT: &str = "354 Start mail input; end with <CRLF>.<CRLF>";
pub const REPLY_UNKNOWN_LIST: &str = "550 Unknown mailing list";
pub const REPLY_CANNOT_VRFY: &str =
    "252 Cannot VRFY user, but will accept message and attempt delivery";
pub const REPLY_CLOSING: &str = "221 Service closing transmission channel";
pub const REPLY_UNKNOWN_COMMAND: &str = "500 Unknown command";

/// Terminates data capture. Compared exactly.
pub const DATA_TERMINATOR: &str = ".";

/// Command verbs, classified by prefix and without looking at arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Data,
    /// `EHLO`, `HELO`, `MAIL FROM:`, `RCPT TO:`, `NOOP` and `RSET`.
    Accepted,
    Expn,
    Help,
    Vrfy,
    Quit,
    Unknown,
}

impl Command {
    pub fn classify(line: &str) -> Self {
        let command = line.to_ascii_uppercase();
        let command = command.as_str();

        if command == "DATA" {
            Command::Data
        } else if command.starts_with("EHLO ")
            || command.starts_with("HELO ")
            || command.starts_with("MAIL FROM:")
            || command == "NOOP"
            || command.starts_with("NOOP ")
            || command.starts_with("RCPT TO:")
            || command == "RSET"
        {
            Command::Accepted
        } else if command.starts_with("EXPN ") {
            Command::Expn
        } else if command == "HELP" || command.starts_with("HELP ") {
            Command::Help
        } else if command.starts_with("VRFY ") {
            Command::Vrfy
        } else if command == "QUIT" {
            Command::Quit
        } else {
            Command::Unknown
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    Greeting,
    Command,
    DataCapture,
}

impl ProtocolState {
    /// Consumes one client line and returns the next state.
    ///
    /// `Greeting` ignores its input: it only writes the banner.
    pub fn handle(self, line: &str, version: &str, out: &mut Outbox) -> Self {
        match self {
            ProtocolState::Greeting => {
                out.write(REPLY_READY);
                ProtocolState::Command
            }
            ProtocolState::Command => match Command::classify(line) {
                Command::Data => {
                    out.write(REPLY_START_MAIL_INPUT);
                    ProtocolState::DataCapture
                }
                Command::Accepted => {
                    out.write(REPLY_OK);
                    self
                }
                Command::Expn => {
                    out.write(REPLY_UNKNOWN_LIST);
                    self
                }
                Command::Help => {
                    out.write(help_reply(version));
                    self
                }
                Command::Vrfy => {
                    out.write(REPLY_CANNOT_VRFY);
                    self
                }
                Command::Quit => {
                    out.write(REPLY_CLOSING);
                    out.close();
                    self
                }
                Command::Unknown => {
                    out.write(REPLY_UNKNOWN_COMMAND);
                    self
                }
            },
            ProtocolState::DataCapture => {
                if line == DATA_TERMINATOR {
                    out.write(REPLY_OK);
                    ProtocolState::Command
                } else {
                    self
                }
            }
        }
    }
}

pub fn help_reply(version: &str) -> String {
    format!("221 Service provided by NoopSMTP Server {}", version)
}

pub struct SmtpSession {
    pub client_addr: SocketAddr,
    pub state: ProtocolState,
}

impl SmtpSession {
    pub fn new(client_addr: SocketAddr) -> Self {
        Self {
            client_addr,
            state: ProtocolState::Greeting,
        }
    }
}

/// Handler installed on the SMTP listener.
pub struct SmtpHandler {
    version: String,
}

impl SmtpHandler {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

impl Default for SmtpHandler {
    fn default() -> Self {
        Self::new(option_env!("CARGO_PKG_VERSION").unwrap_or(""))
    }
}

impl LineHandler for SmtpHandler {
    type Session = SmtpSession;

    fn connected(&self, peer: SocketAddr, out: &mut Outbox) -> SmtpSession {
        let mut session = SmtpSession::new(peer);
        session.state = session.state.handle("", &self.version, out);
        session
    }

    fn line_received(&self, session: &mut SmtpSession, line: &str, out: &mut Outbox) {
        let next = session.state.handle(line, &self.version, out);
        if next != session.state {
            debug!(peer = %session.client_addr, from = ?session.state, to = ?next, "state change");
            session.state = next;
        }
    }
}
