//! NoopSMTP: an SMTP server that accepts everything and delivers nothing.
//!
//! Every recognised SMTP command gets a protocol correct reply, message
//! content is discarded, and a second control endpoint stops the whole
//! service when it receives any line.

pub mod codec;
pub mod control;
pub mod error;
pub mod listener;
pub mod server;
pub mod session;
pub mod tls;
pub mod utils;

pub use codec::Charset;
pub use control::{ControlHandler, ShutdownRequester, Stoppable};
pub use error::{CharsetError, Error, Result, TlsError};
pub use listener::{LineHandler, LineListener, ListenerConfig, Outbox};
pub use server::{Endpoint, NoopSmtp, DEFAULT_CONTROL_SERVER_PORT, DEFAULT_SMTP_SERVER_PORT};
pub use session::{ProtocolState, SmtpHandler};
pub use tls::{Provider, StoreDescriptor, TlsContext, TlsContextBuilder};
