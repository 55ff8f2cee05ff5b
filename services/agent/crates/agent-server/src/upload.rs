//! Upload transport: a raw TLS byte stream to the upload service.

use std::fs::File;
use std::future::Future;
use std::io::{self, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use tokio::io::AsyncWrite;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use serverspy_common::AgentConfig;

/// Opens the byte stream a `push` task writes into.
pub trait UploadConnector: Send + Sync {
    type Stream: AsyncWrite + Unpin + Send;

    /// Connect to the upload service.
    ///
    /// # Errors
    ///
    /// Returns the connect, handshake or timeout error.
    fn connect(&self) -> impl Future<Output = io::Result<Self::Stream>> + Send;

    /// `host:port` for logs.
    fn target(&self) -> String;
}

/// Production connector: TCP + rustls, bounded by a connect timeout that
/// covers both the TCP connect and the TLS handshake.
#[derive(Clone)]
pub struct TlsUploadConnector {
    connector: TlsConnector,
    host: String,
    port: u16,
    connect_timeout: Duration,
}

impl std::fmt::Debug for TlsUploadConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsUploadConnector")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

impl TlsUploadConnector {
    /// # Errors
    ///
    /// Returns an error if the ring provider rejects the default protocol
    /// versions.
    pub fn new(
        roots: RootCertStore,
        host: impl Into<String>,
        port: u16,
        connect_timeout: Duration,
    ) -> Result<Self, rustls::Error> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let tls_config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_root_certificates(roots)
            .with_no_client_auth();
        Ok(Self {
            connector: TlsConnector::from(Arc::new(tls_config)),
            host: host.into(),
            port,
            connect_timeout,
        })
    }

    /// Build the connector from configuration, loading trusted roots from
    /// the configured PEM bundle.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundle cannot be read or holds no usable
    /// certificate.
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        let roots = load_root_store(&config.ca_bundle)?;
        Self::new(
            roots,
            config.upload_host.clone(),
            config.upload_port,
            Duration::from_secs(config.upload_connect_timeout_secs),
        )
        .context("failed to build upload TLS config")
    }
}

impl UploadConnector for TlsUploadConnector {
    type Stream = TlsStream<TcpStream>;

    async fn connect(&self) -> io::Result<Self::Stream> {
        let server_name = ServerName::try_from(self.host.clone())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let attempt = async {
            let tcp = TcpStream::connect((self.host.as_str(), self.port)).await?;
            tcp.set_nodelay(true)?;
            self.connector.connect(server_name, tcp).await
        };

        tokio::time::timeout(self.connect_timeout, attempt)
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!(
                        "connect to {} timed out after {}s",
                        self.target(),
                        self.connect_timeout.as_secs()
                    ),
                )
            })?
    }

    fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Load every parsable certificate from a PEM bundle into a root store.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or parsed, or yields no
/// certificate rustls accepts.
pub fn load_root_store(path: &Path) -> Result<RootCertStore> {
    let file = File::open(path)
        .with_context(|| format!("failed to open CA bundle: {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("failed to parse CA bundle: {}", path.display()))?;

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs);
    anyhow::ensure!(
        added > 0,
        "no usable certificates in CA bundle {}",
        path.display()
    );
    if ignored > 0 {
        tracing::warn!(bundle = %path.display(), ignored, "skipped unparsable CA certificates");
    }
    Ok(roots)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_bundle_is_an_error() {
        let err = load_root_store(Path::new("/nonexistent/ca.pem")).unwrap_err();
        assert!(err.to_string().contains("failed to open CA bundle"));
    }

    #[test]
    fn bundle_without_certificates_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("empty.pem");
        std::fs::write(&path, "not a certificate\n").unwrap();
        let err = load_root_store(&path).unwrap_err();
        assert!(err.to_string().contains("no usable certificates"));
    }

    #[tokio::test]
    async fn connect_refused_surfaces_os_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let connector = TlsUploadConnector::new(
            RootCertStore::empty(),
            "localhost",
            port,
            Duration::from_secs(5),
        )
        .unwrap();
        let err = connector.connect().await.unwrap_err();
        assert!(err.raw_os_error().is_some() || err.kind() == io::ErrorKind::ConnectionRefused);
    }

    #[test]
    fn target_formats_host_and_port() {
        let connector = TlsUploadConnector::new(
            RootCertStore::empty(),
            "upload.serverspy.io",
            443,
            Duration::from_secs(90),
        )
        .unwrap();
        assert_eq!(connector.target(), "upload.serverspy.io:443");
    }
}
