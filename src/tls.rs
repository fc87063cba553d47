//! TLS context construction.
//!
//! [`TlsContextBuilder`] is a plain value describing the wanted context.
//! [`TlsContextBuilder::resolve`] turns it into the effective settings
//! without touching the filesystem, and [`TlsContextBuilder::build`] loads
//! the key and trust material and produces a [`TlsContext`].

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use openssl::pkcs12::Pkcs12;
use rustls::server::{
    AllowAnyAnonymousOrAuthenticatedClient, AllowAnyAuthenticatedClient, ClientCertVerifier,
    ClientHello, ResolvesServerCert,
};
use rustls::sign::CertifiedKey;
use rustls::{
    Certificate, PrivateKey, RootCertStore, ServerConfig, SupportedCipherSuite, SupportedKxGroup,
    SupportedProtocolVersion,
};
use rustls_pemfile::Item;
use tokio_rustls::TlsAcceptor;
use tracing::debug;

use crate::error::TlsError;

pub const DEFAULT_PROVIDER: &str = "ring";
pub const DEFAULT_KEY_MANAGER_ALGORITHM: &str = "X509";
pub const DEFAULT_TRUST_MANAGER_ALGORITHM: &str = "PKIX";
pub const DEFAULT_STORE_TYPE: &str = "PKCS12";
pub const DEFAULT_SECURE_RANDOM_ALGORITHM: &str = "SYSTEM";

/// A ready to use server side TLS configuration.
#[derive(Clone)]
pub struct TlsContext {
    config: Arc<ServerConfig>,
    platform_default: bool,
}

impl TlsContext {
    /// Safe defaults without any server certificate, so every handshake
    /// against it fails until key material is configured.
    pub fn platform_default() -> Self {
        let config = ServerConfig::builder()
            .with_safe_defaults()
            .with_no_client_auth()
            .with_cert_resolver(Arc::new(NoCertificate));

        Self {
            config: Arc::new(config),
            platform_default: true,
        }
    }

    pub fn is_platform_default(&self) -> bool {
        self.platform_default
    }

    pub fn server_config(&self) -> Arc<ServerConfig> {
        Arc::clone(&self.config)
    }

    pub fn acceptor(&self) -> TlsAcceptor {
        TlsAcceptor::from(self.server_config())
    }
}

impl fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsContext")
            .field("platform_default", &self.platform_default)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct NoCertificate;

impl ResolvesServerCert for NoCertificate {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        None
    }
}

/// A named set of cipher suites and key exchange groups.
#[derive(Clone, Debug)]
pub struct Provider {
    name: String,
    cipher_suites: Vec<SupportedCipherSuite>,
    kx_groups: Vec<&'static SupportedKxGroup>,
}

impl Provider {
    pub fn new(
        name: impl Into<String>,
        cipher_suites: Vec<SupportedCipherSuite>,
        kx_groups: Vec<&'static SupportedKxGroup>,
    ) -> Self {
        Self {
            name: name.into(),
            cipher_suites,
            kx_groups,
        }
    }

    /// The built in ring backed provider with rustls' default suites.
    pub fn ring() -> Self {
        Self::new(
            DEFAULT_PROVIDER,
            rustls::DEFAULT_CIPHER_SUITES.to_vec(),
            rustls::ALL_KX_GROUPS.to_vec(),
        )
    }

    pub fn by_name(name: &str) -> Result<Self, TlsError> {
        if name.eq_ignore_ascii_case(DEFAULT_PROVIDER) {
            Ok(Self::ring())
        } else {
            Err(TlsError::UnknownProvider(name.to_string()))
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// How a provider is chosen: an explicit instance wins over a name, and a
/// name wins over the platform default.
#[derive(Clone, Debug, Default)]
pub enum ProviderSelection {
    #[default]
    Default,
    Instance(Provider),
    Named(String),
}

impl ProviderSelection {
    pub fn is_set(&self) -> bool {
        !matches!(self, ProviderSelection::Default)
    }

    pub fn resolve(&self) -> Result<Provider, TlsError> {
        match self {
            ProviderSelection::Default => Ok(Provider::ring()),
            ProviderSelection::Instance(provider) => Ok(provider.clone()),
            ProviderSelection::Named(name) => Provider::by_name(name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreRole {
    Key,
    Trust,
}

impl fmt::Display for StoreRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreRole::Key => f.write_str("key store"),
            StoreRole::Trust => f.write_str("trust store"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreType {
    /// PKCS#12 archive, unlocked with the store password.
    Pkcs12,
    /// PEM file with certificates and an unencrypted private key.
    Pem,
}

impl StoreType {
    fn from_name(name: &str) -> Result<Self, TlsError> {
        if name.eq_ignore_ascii_case("PKCS12") {
            Ok(StoreType::Pkcs12)
        } else if name.eq_ignore_ascii_case("PEM") {
            Ok(StoreType::Pem)
        } else {
            Err(TlsError::UnsupportedStoreType(name.to_string()))
        }
    }
}

/// Algorithm of the manager built from a store.
pub trait ManagerAlgorithm: Sized + Copy {
    const KIND: &'static str;
    const DEFAULT: &'static str;

    fn from_name(name: &str) -> Option<Self>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyManagerAlgorithm {
    /// One certificate chain with its private key.
    X509,
}

impl ManagerAlgorithm for KeyManagerAlgorithm {
    const KIND: &'static str = "key manager";
    const DEFAULT: &'static str = DEFAULT_KEY_MANAGER_ALGORITHM;

    fn from_name(name: &str) -> Option<Self> {
        name.eq_ignore_ascii_case("X509")
            .then_some(KeyManagerAlgorithm::X509)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustManagerAlgorithm {
    /// Client certificates are optional, verified when presented.
    Pkix,
    /// Client certificates are mandatory.
    PkixRequired,
}

impl ManagerAlgorithm for TrustManagerAlgorithm {
    const KIND: &'static str = "trust manager";
    const DEFAULT: &'static str = DEFAULT_TRUST_MANAGER_ALGORITHM;

    fn from_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("PKIX") {
            Some(TrustManagerAlgorithm::Pkix)
        } else if name.eq_ignore_ascii_case("PKIX-REQUIRED") {
            Some(TrustManagerAlgorithm::PkixRequired)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecureRandom {
    /// Operating system randomness, drawn through the provider.
    System,
}

impl SecureRandom {
    fn from_name(name: &str) -> Result<Self, TlsError> {
        if name.eq_ignore_ascii_case(DEFAULT_SECURE_RANDOM_ALGORITHM) {
            Ok(SecureRandom::System)
        } else {
            Err(TlsError::UnsupportedAlgorithm {
                kind: "secure random",
                name: name.to_string(),
            })
        }
    }
}

/// Key store or trust store settings. Every field is optional.
#[derive(Clone, Default)]
pub struct StoreDescriptor {
    pub algorithm: Option<String>,
    pub provider: ProviderSelection,
    pub store_type: Option<String>,
    pub path: Option<PathBuf>,
    pub password: Option<String>,
}

impl StoreDescriptor {
    pub fn file(path: impl Into<PathBuf>, password: Option<String>) -> Self {
        Self {
            path: Some(path.into()),
            password,
            ..Self::default()
        }
    }

    pub fn algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.algorithm = Some(algorithm.into());
        self
    }

    pub fn provider(mut self, provider: Provider) -> Self {
        self.provider = ProviderSelection::Instance(provider);
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.provider = ProviderSelection::Named(name.into());
        self
    }

    pub fn store_type(mut self, store_type: impl Into<String>) -> Self {
        self.store_type = Some(store_type.into());
        self
    }
}

impl fmt::Debug for StoreDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreDescriptor")
            .field("algorithm", &self.algorithm)
            .field("provider", &self.provider)
            .field("store_type", &self.store_type)
            .field("path", &self.path)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// A store with every default filled in.
#[derive(Debug, Clone)]
pub struct ResolvedStore<A> {
    pub role: StoreRole,
    pub algorithm: A,
    /// Checked to exist, but not otherwise used. rustls 0.21 has no
    /// per-store provider hook; the context-wide suites apply.
    pub provider: Provider,
    pub store_type: StoreType,
    pub path: PathBuf,
    pub password: Option<String>,
}

/// An explicit TLS configuration after defaults and names are resolved.
///
/// Only `versions`, `provider` and the two stores shape the rustls config.
/// rustls 0.21 takes its randomness from the ring backend and offers no way
/// to plug in another source, so `secure_random` and
/// `secure_random_provider` are validated for availability and logged, but
/// have no further effect.
#[derive(Debug, Clone)]
pub struct ResolvedTls {
    pub versions: Vec<&'static SupportedProtocolVersion>,
    pub provider: Provider,
    pub key_managers: ResolvedStore<KeyManagerAlgorithm>,
    pub trust_managers: ResolvedStore<TrustManagerAlgorithm>,
    pub secure_random: SecureRandom,
    pub secure_random_provider: Provider,
}

#[derive(Debug, Clone)]
pub enum Resolution {
    PlatformDefault,
    Explicit(ResolvedTls),
}

#[derive(Clone, Debug, Default)]
pub struct TlsContextBuilder {
    protocol: Option<String>,
    provider: ProviderSelection,
    key_store: StoreDescriptor,
    trust_store: StoreDescriptor,
    secure_random_algorithm: Option<String>,
    secure_random_provider: ProviderSelection,
}

impl TlsContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    pub fn provider(mut self, provider: Provider) -> Self {
        self.provider = ProviderSelection::Instance(provider);
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.provider = ProviderSelection::Named(name.into());
        self
    }

    pub fn key_store(mut self, store: StoreDescriptor) -> Self {
        self.key_store = store;
        self
    }

    pub fn trust_store(mut self, store: StoreDescriptor) -> Self {
        self.trust_store = store;
        self
    }

    pub fn secure_random_algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.secure_random_algorithm = Some(algorithm.into());
        self
    }

    pub fn secure_random_provider(mut self, provider: Provider) -> Self {
        self.secure_random_provider = ProviderSelection::Instance(provider);
        self
    }

    pub fn secure_random_provider_name(mut self, name: impl Into<String>) -> Self {
        self.secure_random_provider = ProviderSelection::Named(name.into());
        self
    }

    pub fn has_protocol(&self) -> bool {
        self.protocol.is_some()
    }

    pub fn has_key_store(&self) -> bool {
        self.key_store.path.is_some()
    }

    pub fn has_trust_store(&self) -> bool {
        self.trust_store.path.is_some()
    }

    /// Computes the effective settings. Reads no files.
    pub fn resolve(&self) -> Result<Resolution, TlsError> {
        let Some(protocol) = &self.protocol else {
            if self.provider.is_set() {
                return Err(TlsError::ProviderRequiresProtocol);
            }
            return Ok(Resolution::PlatformDefault);
        };

        Ok(Resolution::Explicit(ResolvedTls {
            versions: protocol_versions(protocol)?,
            provider: self.provider.resolve()?,
            key_managers: resolve_store(StoreRole::Key, &self.key_store)?,
            trust_managers: resolve_store(StoreRole::Trust, &self.trust_store)?,
            secure_random: SecureRandom::from_name(
                self.secure_random_algorithm
                    .as_deref()
                    .unwrap_or(DEFAULT_SECURE_RANDOM_ALGORITHM),
            )?,
            secure_random_provider: self.secure_random_provider.resolve()?,
        }))
    }

    pub fn build(&self) -> Result<TlsContext, TlsError> {
        match self.resolve()? {
            Resolution::PlatformDefault => Ok(TlsContext::platform_default()),
            Resolution::Explicit(resolved) => resolved.into_context(),
        }
    }
}

impl ResolvedTls {
    pub fn into_context(self) -> Result<TlsContext, TlsError> {
        let (chain, key) = key_managers(&self.key_managers)?;
        let verifier = trust_managers(&self.trust_managers)?;

        debug!(
            provider = self.provider.name(),
            secure_random = ?self.secure_random,
            secure_random_provider = self.secure_random_provider.name(),
            key_store = %self.key_managers.path.display(),
            trust_store = %self.trust_managers.path.display(),
            "building TLS context"
        );

        let config = ServerConfig::builder()
            .with_cipher_suites(&self.provider.cipher_suites)
            .with_kx_groups(&self.provider.kx_groups)
            .with_protocol_versions(&self.versions)?
            .with_client_cert_verifier(verifier)
            .with_single_cert(chain, key)?;

        Ok(TlsContext {
            config: Arc::new(config),
            platform_default: false,
        })
    }
}

fn protocol_versions(name: &str) -> Result<Vec<&'static SupportedProtocolVersion>, TlsError> {
    if name.eq_ignore_ascii_case("TLS") {
        Ok(vec![&rustls::version::TLS13, &rustls::version::TLS12])
    } else if name.eq_ignore_ascii_case("TLSv1.2") {
        Ok(vec![&rustls::version::TLS12])
    } else if name.eq_ignore_ascii_case("TLSv1.3") {
        Ok(vec![&rustls::version::TLS13])
    } else {
        Err(TlsError::UnsupportedProtocol(name.to_string()))
    }
}

/// Shared by the key and trust side: algorithm, then manager provider,
/// then store type and location.
fn resolve_store<A: ManagerAlgorithm>(
    role: StoreRole,
    descriptor: &StoreDescriptor,
) -> Result<ResolvedStore<A>, TlsError> {
    let algorithm_name = descriptor.algorithm.as_deref().unwrap_or(A::DEFAULT);
    let algorithm = A::from_name(algorithm_name).ok_or_else(|| TlsError::UnsupportedAlgorithm {
        kind: A::KIND,
        name: algorithm_name.to_string(),
    })?;
    let provider = descriptor.provider.resolve()?;
    let store_type =
        StoreType::from_name(descriptor.store_type.as_deref().unwrap_or(DEFAULT_STORE_TYPE))?;
    let path = descriptor
        .path
        .clone()
        .ok_or(TlsError::MissingStore(role))?;

    Ok(ResolvedStore {
        role,
        algorithm,
        provider,
        store_type,
        path,
        password: descriptor.password.clone(),
    })
}

/// Certificates and the first private key found in a store.
struct LoadedStore {
    certificates: Vec<Certificate>,
    private_key: Option<PrivateKey>,
}

fn load_store<A>(store: &ResolvedStore<A>) -> Result<LoadedStore, TlsError> {
    match store.store_type {
        StoreType::Pkcs12 => read_pkcs12(store.role, &store.path, store.password.as_deref()),
        StoreType::Pem => read_pem(store.role, &store.path),
    }
}

fn key_managers(
    store: &ResolvedStore<KeyManagerAlgorithm>,
) -> Result<(Vec<Certificate>, PrivateKey), TlsError> {
    let loaded = load_store(store)?;
    match store.algorithm {
        KeyManagerAlgorithm::X509 => {
            let key = loaded
                .private_key
                .ok_or_else(|| store_error(store.role, &store.path, "no private key found"))?;
            if loaded.certificates.is_empty() {
                return Err(store_error(store.role, &store.path, "no certificate found"));
            }
            Ok((loaded.certificates, key))
        }
    }
}

fn trust_managers(
    store: &ResolvedStore<TrustManagerAlgorithm>,
) -> Result<Arc<dyn ClientCertVerifier>, TlsError> {
    let loaded = load_store(store)?;
    let ders: Vec<Vec<u8>> = loaded.certificates.into_iter().map(|c| c.0).collect();

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(&ders);
    if added == 0 {
        return Err(store_error(
            store.role,
            &store.path,
            "no trusted certificate found",
        ));
    }
    debug!(added, ignored, "loaded trust anchors");

    Ok(match store.algorithm {
        TrustManagerAlgorithm::Pkix => AllowAnyAnonymousOrAuthenticatedClient::new(roots).boxed(),
        TrustManagerAlgorithm::PkixRequired => AllowAnyAuthenticatedClient::new(roots).boxed(),
    })
}

fn read_pkcs12(
    role: StoreRole,
    path: &Path,
    password: Option<&str>,
) -> Result<LoadedStore, TlsError> {
    let der = std::fs::read(path).map_err(|source| TlsError::Io {
        role,
        path: path.to_path_buf(),
        source,
    })?;

    let parsed = Pkcs12::from_der(&der)
        .and_then(|archive| archive.parse2(password.unwrap_or("")))
        .map_err(|e| store_error(role, path, e))?;

    let mut certificates = Vec::new();
    if let Some(cert) = parsed.cert {
        certificates.push(Certificate(cert.to_der().map_err(|e| store_error(role, path, e))?));
    }
    if let Some(chain) = parsed.ca {
        for cert in chain.iter() {
            certificates.push(Certificate(cert.to_der().map_err(|e| store_error(role, path, e))?));
        }
    }

    let private_key = match parsed.pkey {
        Some(pkey) => Some(PrivateKey(
            pkey.private_key_to_pkcs8()
                .map_err(|e| store_error(role, path, e))?,
        )),
        None => None,
    };

    Ok(LoadedStore {
        certificates,
        private_key,
    })
}

fn read_pem(role: StoreRole, path: &Path) -> Result<LoadedStore, TlsError> {
    let io_error = |source| TlsError::Io {
        role,
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_error)?;
    let items = rustls_pemfile::read_all(&mut BufReader::new(file)).map_err(io_error)?;

    let mut certificates = Vec::new();
    let mut private_key = None;
    for item in items {
        match item {
            Item::X509Certificate(der) => certificates.push(Certificate(der)),
            Item::PKCS8Key(der) | Item::RSAKey(der) | Item::ECKey(der) => {
                if private_key.is_none() {
                    private_key = Some(PrivateKey(der));
                }
            }
            _ => {}
        }
    }

    Ok(LoadedStore {
        certificates,
        private_key,
    })
}

fn store_error(role: StoreRole, path: &Path, reason: impl fmt::Display) -> TlsError {
    TlsError::Store {
        role,
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("noop-smtp-tls-{}-{}", std::process::id(), name))
    }

    fn write_pem_store(name: &str) -> PathBuf {
        let generated = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let path = temp_path(name);
        let pem = format!(
            "{}{}",
            generated.cert.pem(),
            generated.key_pair.serialize_pem()
        );
        std::fs::write(&path, pem).unwrap();
        path
    }

    fn write_pkcs12_store(name: &str, password: &str) -> PathBuf {
        let generated = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let cert = openssl::x509::X509::from_pem(generated.cert.pem().as_bytes()).unwrap();
        let pkey =
            openssl::pkey::PKey::private_key_from_pem(generated.key_pair.serialize_pem().as_bytes())
                .unwrap();
        let archive = Pkcs12::builder()
            .name("noop-smtp")
            .pkey(&pkey)
            .cert(&cert)
            .build2(password)
            .unwrap();

        let path = temp_path(name);
        std::fs::write(&path, archive.to_der().unwrap()).unwrap();
        path
    }

    #[test]
    fn no_protocol_returns_platform_default_without_reading_stores() {
        let builder = TlsContextBuilder::new()
            .key_store(StoreDescriptor::file("/nonexistent/keystore.p12", None))
            .trust_store(StoreDescriptor::file("/nonexistent/truststore.p12", None));

        let context = builder.build().unwrap();
        assert!(context.is_platform_default());
    }

    #[test]
    fn provider_without_protocol_is_rejected() {
        let err = TlsContextBuilder::new()
            .provider(Provider::ring())
            .build()
            .unwrap_err();
        assert!(matches!(err, TlsError::ProviderRequiresProtocol));

        let err = TlsContextBuilder::new()
            .provider_name("ring")
            .resolve()
            .unwrap_err();
        assert!(matches!(err, TlsError::ProviderRequiresProtocol));
    }

    #[test]
    fn provider_last_writer_wins() {
        let builder = TlsContextBuilder::new()
            .provider(Provider::ring())
            .provider_name("does-not-exist")
            .protocol("TLS")
            .key_store(StoreDescriptor::file("k", None))
            .trust_store(StoreDescriptor::file("t", None));
        assert!(matches!(
            builder.resolve(),
            Err(TlsError::UnknownProvider(name)) if name == "does-not-exist"
        ));

        let builder = builder.provider(Provider::new("custom", Vec::new(), Vec::new()));
        let Resolution::Explicit(resolved) = builder.resolve().unwrap() else {
            panic!("expected explicit resolution");
        };
        assert_eq!(resolved.provider.name(), "custom");
    }

    #[test]
    fn resolution_applies_defaults() {
        let builder = TlsContextBuilder::new()
            .protocol("tlsv1.2")
            .key_store(StoreDescriptor::file("server.p12", Some("secret".into())))
            .trust_store(StoreDescriptor::file("trust.pem", None).store_type("pem"));

        let Resolution::Explicit(resolved) = builder.resolve().unwrap() else {
            panic!("expected explicit resolution");
        };
        assert_eq!(resolved.versions.len(), 1);
        assert_eq!(resolved.provider.name(), DEFAULT_PROVIDER);
        assert_eq!(resolved.key_managers.algorithm, KeyManagerAlgorithm::X509);
        assert_eq!(resolved.key_managers.store_type, StoreType::Pkcs12);
        assert_eq!(resolved.key_managers.password.as_deref(), Some("secret"));
        assert_eq!(resolved.trust_managers.algorithm, TrustManagerAlgorithm::Pkix);
        assert_eq!(resolved.trust_managers.store_type, StoreType::Pem);
        assert_eq!(resolved.secure_random, SecureRandom::System);
    }

    #[test]
    fn unsupported_settings_are_configuration_errors() {
        let base = TlsContextBuilder::new()
            .protocol("TLS")
            .key_store(StoreDescriptor::file("k", None))
            .trust_store(StoreDescriptor::file("t", None));

        assert!(matches!(
            base.clone().protocol("SSLv3").resolve(),
            Err(TlsError::UnsupportedProtocol(_))
        ));
        assert!(matches!(
            base.clone()
                .key_store(StoreDescriptor::file("k", None).store_type("JKS"))
                .resolve(),
            Err(TlsError::UnsupportedStoreType(_))
        ));
        assert!(matches!(
            base.clone()
                .trust_store(StoreDescriptor::file("t", None).algorithm("SunX509"))
                .resolve(),
            Err(TlsError::UnsupportedAlgorithm { kind: "trust manager", .. })
        ));
        assert!(matches!(
            base.clone().secure_random_algorithm("NativePRNG").resolve(),
            Err(TlsError::UnsupportedAlgorithm { kind: "secure random", .. })
        ));
        assert!(matches!(
            base.key_store(StoreDescriptor::default()).resolve(),
            Err(TlsError::MissingStore(StoreRole::Key))
        ));
    }

    #[test]
    fn missing_store_file_is_reported() {
        let err = TlsContextBuilder::new()
            .protocol("TLS")
            .key_store(StoreDescriptor::file(temp_path("absent.p12"), None))
            .trust_store(StoreDescriptor::file(temp_path("absent.p12"), None))
            .build()
            .unwrap_err();
        assert!(matches!(err, TlsError::Io { role: StoreRole::Key, .. }));
    }

    #[test]
    fn builds_from_pem_store() {
        let path = write_pem_store("server.pem");
        let store = StoreDescriptor::file(&path, None).store_type("PEM");

        let context = TlsContextBuilder::new()
            .protocol("TLS")
            .key_store(store.clone())
            .trust_store(store)
            .build()
            .unwrap();
        assert!(!context.is_platform_default());

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn builds_from_pkcs12_store_and_rejects_bad_password() {
        let path = write_pkcs12_store("server.p12", "changeit");
        let good = StoreDescriptor::file(&path, Some("changeit".into()));

        let builder = TlsContextBuilder::new()
            .protocol("TLSv1.3")
            .key_store(good.clone())
            .trust_store(good);
        assert!(builder.build().is_ok());

        let err = builder
            .key_store(StoreDescriptor::file(&path, Some("wrong".into())))
            .build()
            .unwrap_err();
        assert!(matches!(err, TlsError::Store { role: StoreRole::Key, .. }));

        std::fs::remove_file(path).unwrap();
    }
}
