use std::path::PathBuf;

use anyhow::{Context, Result};
use structopt::StructOpt;
use tracing::info;

use noop_smtp::utils::init_logging;
use noop_smtp::{
    Endpoint, NoopSmtp, StoreDescriptor, TlsContext, TlsContextBuilder,
    DEFAULT_CONTROL_SERVER_PORT, DEFAULT_SMTP_SERVER_PORT,
};

/// Protocol used when a key store is given without `--tls-protocol`.
const IMPLICIT_PROTOCOL: &str = "TLS";

#[derive(Debug, StructOpt, Clone)]
#[structopt(
    name = "noop-smtp",
    about = "SMTP server answering every command without delivering anything"
)]
pub struct Opt {
    /// Hostname or IP to bind the SMTP server to (default: all interfaces)
    #[structopt(short = "a", long = "address")]
    pub address: Option<String>,

    /// Port to bind the SMTP server to
    #[structopt(short = "p", long = "port", default_value = "9025")]
    pub port: u16,

    /// Enable TLS for the SMTP server
    #[structopt(short = "s", long = "ssl")]
    pub ssl: bool,

    #[structopt(flatten)]
    pub tls: TlsOpt,

    /// Hostname or IP to bind the control server to (default: all interfaces)
    #[structopt(long = "control-address")]
    pub control_address: Option<String>,

    /// Port to bind the control server to
    #[structopt(long = "control-port", default_value = "9026")]
    pub control_port: u16,

    /// Enable TLS for the control server
    #[structopt(long = "control-ssl")]
    pub control_ssl: bool,

    #[structopt(flatten)]
    pub control_tls: ControlTlsOpt,

    /// Log file path (default: stderr)
    #[structopt(long = "logs", parse(from_os_str))]
    pub log_file: Option<PathBuf>,

    /// Verbose mode - log every connection
    #[structopt(short = "v", long = "verbose")]
    pub verbose: bool,
}

#[derive(Debug, StructOpt, Clone)]
pub struct TlsOpt {
    /// TLS protocol for the SMTP server (TLS, TLSv1.2, TLSv1.3)
    #[structopt(long = "tls-protocol")]
    pub protocol: Option<String>,

    /// Key store file for the SMTP server
    #[structopt(long = "keystore", parse(from_os_str))]
    pub keystore: Option<PathBuf>,

    /// Key store password for the SMTP server
    #[structopt(long = "keystore-password")]
    pub keystore_password: Option<String>,

    /// Key store type for the SMTP server (PKCS12, PEM)
    #[structopt(long = "keystore-type")]
    pub keystore_type: Option<String>,

    /// Trust store file for the SMTP server (default: the key store)
    #[structopt(long = "truststore", parse(from_os_str))]
    pub truststore: Option<PathBuf>,

    /// Trust store password for the SMTP server
    #[structopt(long = "truststore-password")]
    pub truststore_password: Option<String>,

    /// Trust store type for the SMTP server (PKCS12, PEM)
    #[structopt(long = "truststore-type")]
    pub truststore_type: Option<String>,
}

#[derive(Debug, StructOpt, Clone)]
pub struct ControlTlsOpt {
    /// TLS protocol for the control server (TLS, TLSv1.2, TLSv1.3)
    #[structopt(name = "control-tls-protocol", long = "control-tls-protocol")]
    pub protocol: Option<String>,

    /// Key store file for the control server
    #[structopt(name = "control-keystore", long = "control-keystore", parse(from_os_str))]
    pub keystore: Option<PathBuf>,

    /// Key store password for the control server
    #[structopt(name = "control-keystore-password", long = "control-keystore-password")]
    pub keystore_password: Option<String>,

    /// Key store type for the control server (PKCS12, PEM)
    #[structopt(name = "control-keystore-type", long = "control-keystore-type")]
    pub keystore_type: Option<String>,

    /// Trust store file for the control server (default: the key store)
    #[structopt(name = "control-truststore", long = "control-truststore", parse(from_os_str))]
    pub truststore: Option<PathBuf>,

    /// Trust store password for the control server
    #[structopt(name = "control-truststore-password", long = "control-truststore-password")]
    pub truststore_password: Option<String>,

    /// Trust store type for the control server (PKCS12, PEM)
    #[structopt(name = "control-truststore-type", long = "control-truststore-type")]
    pub truststore_type: Option<String>,
}

impl From<ControlTlsOpt> for TlsOpt {
    fn from(opt: ControlTlsOpt) -> Self {
        Self {
            protocol: opt.protocol,
            keystore: opt.keystore,
            keystore_password: opt.keystore_password,
            keystore_type: opt.keystore_type,
            truststore: opt.truststore,
            truststore_password: opt.truststore_password,
            truststore_type: opt.truststore_type,
        }
    }
}

impl TlsOpt {
    fn builder(self) -> TlsContextBuilder {
        let mut builder = TlsContextBuilder::new();

        let protocol = match (self.protocol, &self.keystore) {
            (Some(protocol), _) => Some(protocol),
            (None, Some(_)) => Some(IMPLICIT_PROTOCOL.to_string()),
            (None, None) => None,
        };
        if let Some(protocol) = protocol {
            builder = builder.protocol(protocol);
        }

        if let Some(keystore) = self.keystore {
            let (truststore, truststore_password, truststore_type) = match self.truststore {
                Some(path) => (path, self.truststore_password, self.truststore_type),
                None => (
                    keystore.clone(),
                    self.keystore_password.clone(),
                    self.keystore_type.clone(),
                ),
            };

            builder = builder
                .key_store(store(keystore, self.keystore_password, self.keystore_type))
                .trust_store(store(truststore, truststore_password, truststore_type));
        } else if let Some(truststore) = self.truststore {
            builder = builder.trust_store(store(
                truststore,
                self.truststore_password,
                self.truststore_type,
            ));
        }

        builder
    }
}

fn store(path: PathBuf, password: Option<String>, store_type: Option<String>) -> StoreDescriptor {
    let store = StoreDescriptor::file(path, password);
    match store_type {
        Some(store_type) => store.store_type(store_type),
        None => store,
    }
}

fn tls_context(enabled: bool, opt: TlsOpt, endpoint: &str) -> Result<Option<TlsContext>> {
    if !enabled {
        return Ok(None);
    }

    let context = opt
        .builder()
        .build()
        .with_context(|| format!("Failed to build TLS context for the {} server", endpoint))?;
    if context.is_platform_default() {
        info!(endpoint, "TLS enabled without key material, handshakes will fail");
    }
    Ok(Some(context))
}

#[tokio::main]
async fn main() -> Result<()> {
    let opt = Opt::from_args();

    init_logging(opt.log_file.as_deref(), opt.verbose)?;

    let smtp_tls = tls_context(opt.ssl, opt.tls.clone(), "SMTP")?;
    let control_tls = tls_context(opt.control_ssl, opt.control_tls.clone().into(), "control")?;

    info!("NoopSMTP Server v{}", env!("CARGO_PKG_VERSION"));
    info!("PID: {}", std::process::id());

    let server = NoopSmtp::new(
        Endpoint::new(opt.address.clone(), opt.port).with_tls(smtp_tls),
        Endpoint::new(opt.control_address.clone(), opt.control_port).with_tls(control_tls),
    );

    if let Err(e) = server.start().await {
        eprintln!("[ERROR] Failed to start NoopSMTP Server: {}", e);
        std::process::exit(1);
    }

    if let (Some(smtp), Some(control)) = (server.smtp_addr().await, server.control_addr().await) {
        info!(%smtp, %control, "waiting for connections");
    }
    info!(
        "Defaults are ports {} (SMTP) and {} (control); send any line to the control port or press Ctrl+C to stop",
        DEFAULT_SMTP_SERVER_PORT, DEFAULT_CONTROL_SERVER_PORT
    );

    tokio::select! {
        _ = server.stopped() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl+C")?;
            info!("interrupted");
            server.stop().await;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Opt {
        let mut argv = vec!["noop-smtp"];
        argv.extend_from_slice(args);
        Opt::from_iter_safe(argv).unwrap()
    }

    #[test]
    fn defaults_match_well_known_ports() {
        let opt = parse(&[]);
        assert_eq!(opt.port, DEFAULT_SMTP_SERVER_PORT);
        assert_eq!(opt.control_port, DEFAULT_CONTROL_SERVER_PORT);
        assert!(opt.address.is_none());
        assert!(!opt.ssl && !opt.control_ssl);
    }

    #[test]
    fn parses_both_endpoints() {
        let opt = parse(&[
            "-a",
            "127.0.0.1",
            "-p",
            "2525",
            "-s",
            "--keystore",
            "server.p12",
            "--control-port",
            "2526",
            "--control-ssl",
        ]);
        assert_eq!(opt.address.as_deref(), Some("127.0.0.1"));
        assert_eq!(opt.port, 2525);
        assert!(opt.ssl);
        assert_eq!(opt.tls.keystore, Some(PathBuf::from("server.p12")));
        assert_eq!(opt.control_port, 2526);
        assert!(opt.control_ssl);
    }

    #[test]
    fn keystore_implies_protocol_and_trust_store() {
        let opt = parse(&["--keystore", "server.p12", "--keystore-password", "pw"]);
        let builder = opt.tls.builder();
        assert!(builder.has_protocol());
        assert!(builder.has_key_store());
        assert!(builder.has_trust_store());
    }

    #[test]
    fn no_material_means_platform_default() {
        let opt = parse(&["-s"]);
        let context = tls_context(opt.ssl, opt.tls, "SMTP").unwrap().unwrap();
        assert!(context.is_platform_default());
    }

    #[test]
    fn rejects_bad_port() {
        assert!(Opt::from_iter_safe(["noop-smtp", "-p", "smtp"]).is_err());
    }
}
