//! Minimal HTTP/1.1 exchange over a fresh TCP or TLS connection.
//!
//! Used by the SEMP adapter and by the daemon's control-plane adapter.
//! `http://` and `https://` URLs are supported; `https://` verifies the
//! server against the Mozilla root store unless a [`TlsConfig`] is given.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use http::uri::Authority;
use http::{Method, Request, Uri, header};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::TlsConnector;
use tracing::debug;

use qscale_state::{CollaboratorError, CollaboratorResult};

/// A completed response: status code and full body.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

// ── TlsConfig ────────────────────────────────────────────────────────

/// Client-side TLS settings for `https://` endpoints.
#[derive(Clone)]
pub struct TlsConfig {
    client_config: Arc<rustls::ClientConfig>,
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig").finish_non_exhaustive()
    }
}

impl TlsConfig {
    /// Verify servers against the Mozilla root certificate store.
    pub fn with_webpki_roots() -> CollaboratorResult<Self> {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = rustls::ClientConfig::builder_with_provider(
            rustls::crypto::ring::default_provider().into(),
        )
        .with_safe_default_protocol_versions()
        .map_err(|e| CollaboratorError::Transport(format!("tls protocol version error: {e}")))?
        .with_root_certificates(root_store)
        .with_no_client_auth();

        Ok(Self {
            client_config: Arc::new(config),
        })
    }

    /// Accept any server certificate. Tests only.
    #[cfg(test)]
    pub(crate) fn dangerous_no_verify() -> Self {
        let config = rustls::ClientConfig::builder_with_provider(
            rustls::crypto::ring::default_provider().into(),
        )
        .with_safe_default_protocol_versions()
        .expect("safe default protocol versions")
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(danger::NoVerifier))
        .with_no_client_auth();

        Self {
            client_config: Arc::new(config),
        }
    }
}

impl From<Arc<rustls::ClientConfig>> for TlsConfig {
    fn from(client_config: Arc<rustls::ClientConfig>) -> Self {
        Self { client_config }
    }
}

/// Process-wide default, built once on first `https://` request.
fn default_tls() -> CollaboratorResult<TlsConfig> {
    static DEFAULT: OnceLock<Result<TlsConfig, String>> = OnceLock::new();
    DEFAULT
        .get_or_init(|| TlsConfig::with_webpki_roots().map_err(|e| e.to_string()))
        .clone()
        .map_err(CollaboratorError::Transport)
}

// ── exchange ─────────────────────────────────────────────────────────

/// Send one request and read the whole response, bounded by `timeout`.
///
/// `authorization` is sent verbatim as the `Authorization` header. A JSON
/// `body` sets `content-type: application/json`.
pub async fn exchange(
    method: Method,
    url: &str,
    authorization: Option<&str>,
    body: Option<Vec<u8>>,
    timeout: Duration,
) -> CollaboratorResult<HttpResponse> {
    exchange_with_tls(None, method, url, authorization, body, timeout).await
}

/// [`exchange`] with explicit TLS settings for `https://` URLs.
pub async fn exchange_with_tls(
    tls: Option<&TlsConfig>,
    method: Method,
    url: &str,
    authorization: Option<&str>,
    body: Option<Vec<u8>>,
    timeout: Duration,
) -> CollaboratorResult<HttpResponse> {
    let uri: Uri = url
        .parse()
        .map_err(|e| CollaboratorError::InvalidEndpoint(format!("{url}: {e}")))?;
    let secure = match uri.scheme_str() {
        Some("http") => false,
        Some("https") => true,
        _ => {
            return Err(CollaboratorError::InvalidEndpoint(format!(
                "{url}: only http:// and https:// endpoints are supported"
            )));
        }
    };
    let authority = uri
        .authority()
        .ok_or_else(|| CollaboratorError::InvalidEndpoint(format!("{url}: missing host")))?
        .clone();
    let host = authority
        .host()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_string();
    let port = authority
        .port_u16()
        .unwrap_or(if secure { 443 } else { 80 });
    let path = uri
        .path_and_query()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let connector = if secure {
        let config = match tls {
            Some(tls) => tls.clone(),
            None => default_tls()?,
        };
        let server_name = ServerName::try_from(host.clone())
            .map_err(|e| CollaboratorError::InvalidEndpoint(format!("{url}: {e}")))?;
        Some((TlsConnector::from(config.client_config), server_name))
    } else {
        None
    };

    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header(header::HOST, authority.as_str())
        .header(header::USER_AGENT, "qscale/0.1")
        .header(header::ACCEPT, "application/json");
    if let Some(auth) = authorization {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    if body.is_some() {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
    }
    let req = builder
        .body(Full::new(Bytes::from(body.unwrap_or_default())))
        .map_err(|e| CollaboratorError::InvalidEndpoint(format!("{url}: {e}")))?;

    let result = tokio::time::timeout(timeout, async {
        let stream = tokio::net::TcpStream::connect((host.as_str(), port))
            .await
            .map_err(|e| CollaboratorError::Transport(format!("connect {authority}: {e}")))?;

        match connector {
            None => send(stream, req, &authority).await,
            Some((connector, server_name)) => {
                let stream = connector.connect(server_name, stream).await.map_err(|e| {
                    CollaboratorError::Transport(format!("tls handshake {authority}: {e}"))
                })?;
                send(stream, req, &authority).await
            }
        }
    })
    .await;

    match result {
        Ok(resp) => resp,
        Err(_) => {
            debug!(%url, "http request timed out");
            Err(CollaboratorError::Timeout(timeout))
        }
    }
}

async fn send<S>(
    stream: S,
    req: Request<Full<Bytes>>,
    authority: &Authority,
) -> CollaboratorResult<HttpResponse>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| CollaboratorError::Transport(format!("handshake {authority}: {e}")))?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        let _ = conn.await;
    });

    let resp = sender
        .send_request(req)
        .await
        .map_err(|e| CollaboratorError::Transport(e.to_string()))?;
    let status = resp.status().as_u16();
    let body = resp
        .into_body()
        .collect()
        .await
        .map_err(|e| CollaboratorError::Transport(format!("read body: {e}")))?
        .to_bytes();

    Ok(HttpResponse { status, body })
}

/// Percent-encode one URL path segment. Queue names and cluster ARNs
/// routinely contain `/` and `:`.
pub fn encode_path_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for b in segment.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod danger {
    use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
    use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use rustls::{DigitallySignedStruct, Error, SignatureScheme};

    #[derive(Debug)]
    pub struct NoVerifier;

    impl ServerCertVerifier for NoVerifier {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> Result<ServerCertVerified, Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn verify_tls13_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            rustls::crypto::ring::default_provider()
                .signature_verification_algorithms
                .supported_schemes()
        }
    }
}
