//! DNS-over-TLS (RFC 7858) client side.
//!
//! A rule's TLS upstreams share one `ClientConfig`, so rustls session
//! resumption works across them. Rules without custom certificate files use
//! a process-wide config trusting the webpki roots.

use super::tcp;
use ferrous_forward_domain::{DomainError, TlsFiles};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

static SHARED_TLS_CONFIG: LazyLock<Arc<ClientConfig>> = LazyLock::new(|| {
    let config = ClientConfig::builder()
        .with_root_certificates(webpki_root_store())
        .with_no_client_auth();
    Arc::new(config)
});

fn webpki_root_store() -> RootCertStore {
    let mut root_store = RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    root_store
}

/// Client config and server name used to dial one TLS upstream.
#[derive(Clone)]
pub struct TlsSettings {
    config: Arc<ClientConfig>,
    server_name: ServerName<'static>,
    name: Arc<str>,
}

impl TlsSettings {
    pub fn new(config: Arc<ClientConfig>, server_name: &str) -> Result<Self, DomainError> {
        let parsed = ServerName::try_from(server_name.to_string()).map_err(|e| {
            DomainError::TlsError(format!("Invalid TLS server name '{}': {}", server_name, e))
        })?;
        Ok(Self {
            config,
            server_name: parsed,
            name: Arc::from(server_name),
        })
    }

    pub fn server_name(&self) -> &str {
        &self.name
    }

    /// Build the client config for a rule. Without files, the shared webpki config is returned.
    pub fn client_config(files: Option<&TlsFiles>) -> Result<Arc<ClientConfig>, DomainError> {
        let Some(files) = files else {
            return Ok(Arc::clone(&SHARED_TLS_CONFIG));
        };
        if files.cert.is_none() && files.ca.is_none() {
            return Ok(Arc::clone(&SHARED_TLS_CONFIG));
        }

        let mut root_store = webpki_root_store();
        if let Some(ca) = &files.ca {
            for cert in load_certs(ca)? {
                root_store
                    .add(cert)
                    .map_err(|e| DomainError::TlsError(format!("Bad CA in '{}': {}", ca, e)))?;
            }
        }

        let builder = ClientConfig::builder().with_root_certificates(root_store);
        let config = match (&files.cert, &files.key) {
            (Some(cert), Some(key)) => builder
                .with_client_auth_cert(load_certs(cert)?, load_private_key(key)?)
                .map_err(|e| {
                    DomainError::TlsError(format!("Bad client certificate '{}': {}", cert, e))
                })?,
            _ => builder.with_no_client_auth(),
        };

        Ok(Arc::new(config))
    }
}

impl std::fmt::Debug for TlsSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsSettings")
            .field("server_name", &self.name)
            .finish()
    }
}

fn open_pem(path: &str) -> Result<BufReader<File>, DomainError> {
    let file = File::open(path)
        .map_err(|e| DomainError::TlsError(format!("Cannot open '{}': {}", path, e)))?;
    Ok(BufReader::new(file))
}

fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>, DomainError> {
    let mut reader = open_pem(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| DomainError::TlsError(format!("Cannot read certificates from '{}': {}", path, e)))?;
    if certs.is_empty() {
        return Err(DomainError::TlsError(format!(
            "No certificates found in '{}'",
            path
        )));
    }
    Ok(certs)
}

fn load_private_key(path: &str) -> Result<PrivateKeyDer<'static>, DomainError> {
    let mut reader = open_pem(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| DomainError::TlsError(format!("Cannot read key from '{}': {}", path, e)))?
        .ok_or_else(|| DomainError::TlsError(format!("No private key found in '{}'", path)))
}

/// TCP connect plus TLS handshake, each bounded by `timeout`.
pub async fn connect(
    server: SocketAddr,
    settings: &TlsSettings,
    timeout: Duration,
) -> Result<TlsStream<TcpStream>, DomainError> {
    let tcp_stream = tcp::connect(server, timeout).await?;
    let connector = TlsConnector::from(Arc::clone(&settings.config));

    let tls_stream = tokio::time::timeout(
        timeout,
        connector.connect(settings.server_name.clone(), tcp_stream),
    )
    .await
    .map_err(|_| DomainError::TransportTimeout {
        server: server.to_string(),
    })?
    .map_err(|e| {
        DomainError::TlsError(format!("TLS handshake with {} failed: {}", server, e))
    })?;

    debug!(server = %server, server_name = %settings.name, "TLS connection established");
    Ok(tls_stream)
}
