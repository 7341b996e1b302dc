//! Resilient lumberjack client
//!
//! One client per writer task. Connection state machine:
//!
//! ```text
//! Connecting ──ok──→ Streaming ──send error──→ Backoff
//!     ↑                                           │
//!     └────────────── reconnectwait ──────────────┘
//! ```
//!
//! [`LumberjackClient::send`] retries until the batch is acknowledged;
//! the only way out is success or the segment's shutdown token, which fires
//! when the input queue closes. [`LumberjackClient::send_no_retry`] is the
//! terminal best-effort flush and never dials a new connection.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::rustls::{
    ClientConfig, DigitallySignedStruct, Error as TlsError, RootCertStore, SignatureScheme,
};
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;

use super::protocol;
use super::LumberjackMetrics;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport security for one server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TlsMode {
    /// Plain TCP.
    Off,
    /// TLS with certificate verification.
    Verify,
    /// TLS without certificate verification (lab/self-signed endpoints).
    NoVerify,
}

/// Outcome of a retried send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SendOutcome {
    Sent,
    /// Shutdown fired before the batch went out.
    Cancelled,
}

trait Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send + Sync> Stream for T {}

pub(crate) struct LumberjackClient {
    /// `host:port` dial target (IPv6 hosts bracketed).
    authority: String,
    /// Bare hostname or IP literal, for TLS server-name verification.
    host: String,
    tls: TlsMode,
    compression: u32,
    reconnect_wait: Duration,
    shutdown: CancellationToken,
    metrics: Arc<LumberjackMetrics>,
    stream: Option<Box<dyn Stream>>,
}

impl LumberjackClient {
    pub(crate) fn new(
        authority: String,
        host: String,
        tls: TlsMode,
        compression: u32,
        reconnect_wait: Duration,
        shutdown: CancellationToken,
        metrics: Arc<LumberjackMetrics>,
    ) -> Self {
        Self {
            authority,
            host,
            tls,
            compression,
            reconnect_wait,
            shutdown,
            metrics,
            stream: None,
        }
    }

    /// Send one batch, retrying until it is acknowledged or shutdown fires.
    pub(crate) async fn send(&mut self, payloads: &[Vec<u8>]) -> SendOutcome {
        if payloads.is_empty() {
            return SendOutcome::Sent;
        }
        loop {
            if !self.ensure_connected().await {
                return SendOutcome::Cancelled;
            }
            match self.write_batch(payloads).await {
                Ok(()) => return SendOutcome::Sent,
                Err(e) => {
                    self.metrics.record_send_error();
                    tracing::warn!(
                        segment = "lumberjack",
                        server = %self.authority,
                        error = %e,
                        "batch send failed, reconnecting"
                    );
                    self.stream = None;
                    if !self.backoff().await {
                        return SendOutcome::Cancelled;
                    }
                }
            }
        }
    }

    /// Terminal flush: one attempt on the existing connection, no dialing,
    /// no retries. Failures are logged and the batch is abandoned.
    pub(crate) async fn send_no_retry(&mut self, payloads: &[Vec<u8>]) {
        if payloads.is_empty() {
            return;
        }
        if self.stream.is_none() {
            tracing::debug!(
                segment = "lumberjack",
                server = %self.authority,
                count = payloads.len(),
                "no connection for final batch"
            );
            return;
        }
        if let Err(e) = self.write_batch(payloads).await {
            self.metrics.record_send_error();
            tracing::error!(
                segment = "lumberjack",
                server = %self.authority,
                error = %e,
                "failed to send final batch"
            );
        }
    }

    /// Dial until connected. `false` means shutdown fired first.
    async fn ensure_connected(&mut self) -> bool {
        while self.stream.is_none() {
            if self.shutdown.is_cancelled() {
                return false;
            }
            match self.connect().await {
                Ok(stream) => {
                    self.metrics.record_reconnect();
                    tracing::info!(
                        segment = "lumberjack",
                        server = %self.authority,
                        tls = ?self.tls,
                        compression = self.compression,
                        "connected"
                    );
                    self.stream = Some(stream);
                }
                Err(e) => {
                    tracing::warn!(
                        segment = "lumberjack",
                        server = %self.authority,
                        error = %e,
                        "connect failed"
                    );
                    if !self.backoff().await {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Sleep `reconnectwait`; `false` means shutdown fired first.
    async fn backoff(&self) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.reconnect_wait) => true,
            _ = self.shutdown.cancelled() => false,
        }
    }

    async fn connect(&self) -> io::Result<Box<dyn Stream>> {
        let tcp = timeout(CONNECT_TIMEOUT, TcpStream::connect(self.authority.as_str()))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??;
        let _ = tcp.set_nodelay(true);

        match self.tls {
            TlsMode::Off => Ok(Box::new(tcp)),
            TlsMode::Verify | TlsMode::NoVerify => {
                let connector = tls_connector(self.tls == TlsMode::NoVerify);
                let server_name = ServerName::try_from(self.host.clone())
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
                let stream = timeout(CONNECT_TIMEOUT, connector.connect(server_name, tcp))
                    .await
                    .map_err(|_| {
                        io::Error::new(io::ErrorKind::TimedOut, "TLS handshake timed out")
                    })??;
                Ok(Box::new(stream))
            }
        }
    }

    async fn write_batch(&mut self, payloads: &[Vec<u8>]) -> io::Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no connection"))?;
        let buf = protocol::encode_batch(payloads, self.compression)?;

        let result = timeout(IO_TIMEOUT, async {
            stream.write_all(&buf).await?;
            stream.flush().await?;
            protocol::read_acks(stream.as_mut(), payloads.len() as u32).await
        })
        .await;

        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "send timed out")),
        }
    }
}

fn tls_connector(no_verify: bool) -> TlsConnector {
    let config = if no_verify {
        ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerification))
            .with_no_client_auth()
    } else {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth()
    };
    TlsConnector::from(Arc::new(config))
}

/// Accepts any certificate chain; only for `tlsnoverify://` endpoints.
#[derive(Debug)]
struct NoVerification;

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}
