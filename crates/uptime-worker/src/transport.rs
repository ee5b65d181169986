//! Minimal HTTP/1.1 client used by probes and notifiers.
//!
//! One connection per request: TCP connect, optional TLS (rustls with the
//! Mozilla root set), hyper handshake, a single request, and only the
//! response status is kept. Time limits are the caller's concern.

use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, Request, StatusCode, Uri, header};
use http_body_util::Full;
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

use uptime_core::{Method, Protocol};

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("uptime-worker/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("tls configuration error: {0}")]
    TlsConfig(#[from] rustls::Error),

    #[error("connection failed: {0}")]
    Connect(#[source] std::io::Error),

    #[error("tls handshake failed: {0}")]
    Tls(#[source] std::io::Error),

    #[error("http handshake failed: {0}")]
    Handshake(#[source] hyper::Error),

    #[error("request failed: {0}")]
    Request(#[source] hyper::Error),

    #[error("connection closed before a response arrived")]
    ConnectionClosed,

    #[error("invalid request: {0}")]
    Build(#[from] http::Error),
}

/// Where a request goes, parsed from a check's protocol and url.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub protocol: Protocol,
    /// Host to connect to (IPv6 brackets stripped).
    pub host: String,
    pub port: u16,
    /// Value of the `host` header.
    pub host_header: String,
    /// Origin-form request target, query string included.
    pub path_and_query: String,
}

impl Target {
    pub fn parse(protocol: Protocol, url: &str) -> Result<Self, TransportError> {
        let invalid = |reason: String| TransportError::InvalidUrl {
            url: url.to_string(),
            reason,
        };

        let uri: Uri = format!("{protocol}://{url}")
            .parse()
            .map_err(|e: http::uri::InvalidUri| invalid(e.to_string()))?;
        let authority = uri
            .authority()
            .ok_or_else(|| invalid("missing host".to_string()))?;

        let host = authority
            .host()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        if host.is_empty() {
            return Err(invalid("missing host".to_string()));
        }

        let host_header = match authority.port_u16() {
            Some(port) => format!("{}:{port}", authority.host()),
            None => authority.host().to_string(),
        };
        let path_and_query = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .filter(|pq| !pq.is_empty())
            .unwrap_or("/")
            .to_string();

        Ok(Self {
            protocol,
            port: authority.port_u16().unwrap_or(protocol.default_port()),
            host,
            host_header,
            path_and_query,
        })
    }
}

/// Map a check method onto its HTTP method.
pub fn http_method(method: Method) -> http::Method {
    match method {
        Method::Get => http::Method::GET,
        Method::Post => http::Method::POST,
        Method::Put => http::Method::PUT,
        Method::Delete => http::Method::DELETE,
    }
}

/// Shared client; cheap to clone.
#[derive(Clone)]
pub struct HttpClient {
    tls: TlsConnector,
}

impl HttpClient {
    /// Create a client trusting the Mozilla root certificate store.
    pub fn new() -> Result<Self, TransportError> {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = rustls::ClientConfig::builder_with_provider(
            rustls::crypto::ring::default_provider().into(),
        )
        .with_safe_default_protocol_versions()?
        .with_root_certificates(root_store)
        .with_no_client_auth();

        Ok(Self::with_tls_config(Arc::new(config)))
    }

    /// Create a client from a pre-configured `rustls::ClientConfig`.
    pub fn with_tls_config(config: Arc<rustls::ClientConfig>) -> Self {
        Self {
            tls: TlsConnector::from(config),
        }
    }

    /// Send one request and return the response status.
    pub async fn send(
        &self,
        target: &Target,
        method: http::Method,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<StatusCode, TransportError> {
        let mut req = Request::builder()
            .method(method)
            .uri(target.path_and_query.as_str())
            .header(header::HOST, target.host_header.as_str())
            .header(header::USER_AGENT, USER_AGENT)
            .body(Full::new(body))?;
        req.headers_mut().extend(headers);

        let stream = TcpStream::connect((target.host.as_str(), target.port))
            .await
            .map_err(TransportError::Connect)?;

        match target.protocol {
            Protocol::Http => exchange(stream, req).await,
            Protocol::Https => {
                let server_name = ServerName::try_from(target.host.clone()).map_err(|e| {
                    TransportError::InvalidUrl {
                        url: target.host.clone(),
                        reason: e.to_string(),
                    }
                })?;
                let stream = self
                    .tls
                    .connect(server_name, stream)
                    .await
                    .map_err(TransportError::Tls)?;
                exchange(stream, req).await
            }
        }
    }
}

/// Run the HTTP/1.1 handshake over `io` and issue `req`.
///
/// The connection is driven in the same task as the request, so dropping
/// this future tears the whole exchange down. A server that answers and then
/// closes finishes `conn` in the same poll that hands the response over, so
/// a clean close still resolves through the pinned response future.
async fn exchange<T>(io: T, req: Request<Full<Bytes>>) -> Result<StatusCode, TransportError>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(io))
        .await
        .map_err(TransportError::Handshake)?;
    tokio::pin!(conn);

    let response = sender.send_request(req);
    tokio::pin!(response);

    tokio::select! {
        biased;
        response = &mut response => {
            let response = response.map_err(TransportError::Request)?;
            Ok(response.status())
        }
        closed = &mut conn => {
            if let Err(e) = closed {
                debug!(error = %e, "connection failed before the response");
                return Err(TransportError::Request(e));
            }
            match response.await {
                Ok(response) => Ok(response.status()),
                Err(e) => {
                    debug!(error = %e, "connection closed before the response");
                    Err(TransportError::ConnectionClosed)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answer each connection's first request with `response`, then either
    /// close the socket or keep it open.
    async fn serve(response: &'static str, close: bool) -> Target {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response.as_bytes()).await;
                if close {
                    let _ = socket.shutdown().await;
                    drop(socket);
                } else {
                    held.push(socket);
                }
            }
        });
        Target::parse(Protocol::Http, &format!("{addr}/health")).unwrap()
    }

    async fn get(target: &Target) -> Result<StatusCode, TransportError> {
        HttpClient::new()
            .unwrap()
            .send(target, http::Method::GET, HeaderMap::new(), Bytes::new())
            .await
    }

    #[test]
    fn target_defaults_port_and_path() {
        let target = Target::parse(Protocol::Https, "example.com").unwrap();
        assert_eq!(target.host, "example.com");
        assert_eq!(target.port, 443);
        assert_eq!(target.host_header, "example.com");
        assert_eq!(target.path_and_query, "/");

        let target = Target::parse(Protocol::Http, "example.com").unwrap();
        assert_eq!(target.port, 80);
    }

    #[test]
    fn target_keeps_port_path_and_query() {
        let target = Target::parse(Protocol::Http, "127.0.0.1:8080/status?verbose=1").unwrap();
        assert_eq!(target.host, "127.0.0.1");
        assert_eq!(target.port, 8080);
        assert_eq!(target.host_header, "127.0.0.1:8080");
        assert_eq!(target.path_and_query, "/status?verbose=1");
    }

    #[test]
    fn target_strips_ipv6_brackets() {
        let target = Target::parse(Protocol::Http, "[::1]:9000/").unwrap();
        assert_eq!(target.host, "::1");
        assert_eq!(target.host_header, "[::1]:9000");
    }

    #[test]
    fn target_rejects_garbage() {
        assert!(matches!(
            Target::parse(Protocol::Http, "exa mple.com/"),
            Err(TransportError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn method_mapping() {
        assert_eq!(http_method(Method::Get), http::Method::GET);
        assert_eq!(http_method(Method::Delete), http::Method::DELETE);
    }

    #[test]
    fn client_builds_with_webpki_roots() {
        assert!(HttpClient::new().is_ok());
    }

    #[tokio::test]
    async fn closed_port_is_a_connect_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HttpClient::new().unwrap();
        let target = Target::parse(Protocol::Http, &addr.to_string()).unwrap();
        let err = client
            .send(&target, http::Method::GET, HeaderMap::new(), Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Connect(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn response_then_close_returns_status() {
        let target = serve(
            "HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
            true,
        )
        .await;
        for _ in 0..50 {
            assert_eq!(get(&target).await.unwrap(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn response_with_body_then_close_returns_status() {
        let target = serve(
            "HTTP/1.1 503 Service Unavailable\r\ncontent-length: 4\r\nconnection: close\r\n\r\ndown",
            true,
        )
        .await;
        assert_eq!(get(&target).await.unwrap(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn keep_alive_response_returns_status() {
        let target = serve("HTTP/1.1 204 No Content\r\n\r\n", false).await;
        let status = tokio::time::timeout(std::time::Duration::from_secs(2), get(&target))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn close_without_response_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                drop(socket);
            }
        });
        let target = Target::parse(Protocol::Http, &addr.to_string()).unwrap();
        assert!(get(&target).await.is_err());
    }
}
