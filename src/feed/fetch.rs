//! HTTP fetch primitive used by remote package sources

#[cfg(test)]
use mockall::automock;

use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::config::FETCH_TIMEOUT_MS;
use crate::feed::error::FeedError;

const USER_AGENT: &str = concat!("nuget-feed/", env!("CARGO_PKG_VERSION"));

/// Trait for fetching raw bytes from a URL
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches the body at `url`
    ///
    /// # Returns
    /// * `Ok(bytes)` - Body of a 2xx response
    /// * `Err(FeedError::NotFound)` - Server answered 404
    /// * `Err(_)` - Timeout, transport failure, or any other non-2xx status
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FeedError>;
}

/// Per-client HTTP settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    pub user_name: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
    /// Skip TLS certificate validation for this client only
    ///
    /// Some private feeds serve certificates the platform trust store does not
    /// know about; those feeds are unreachable unless validation is skipped.
    pub accept_all_certificates: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            user_name: None,
            password: None,
            timeout: Duration::from_millis(FETCH_TIMEOUT_MS),
            accept_all_certificates: true,
        }
    }
}

/// Fetcher backed by a reqwest client
pub struct HttpFetcher {
    client: Client,
    options: FetchOptions,
}

impl HttpFetcher {
    pub fn new(options: FetchOptions) -> Result<Self, FeedError> {
        if options.accept_all_certificates {
            debug!("TLS certificate validation disabled for this client");
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(options.timeout)
            .danger_accept_invalid_certs(options.accept_all_certificates)
            .build()?;

        Ok(Self { client, options })
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FeedError> {
        debug!("Fetching {}", url);

        let mut request = self.client.get(url);
        if let Some(user_name) = self.options.user_name.as_deref().filter(|u| !u.is_empty()) {
            request = request.basic_auth(user_name, self.options.password.as_deref());
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(FeedError::NotFound(url.to_string()));
        }

        if !status.is_success() {
            warn!("Feed returned status {}: {}", status, url);
            return Err(FeedError::UnexpectedStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use mockito::Server;
    use rcgen::CertifiedKey;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio_rustls::TlsAcceptor;
    use tokio_rustls::rustls::ServerConfig;
    use tokio_rustls::rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};

    fn fetcher(options: FetchOptions) -> HttpFetcher {
        HttpFetcher::new(options).unwrap()
    }

    /// Serve one HTTPS request with a freshly generated self-signed certificate
    async fn self_signed_server() -> u16 {
        let CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));
        let provider = Arc::new(tokio_rustls::rustls::crypto::aws_lc_rs::default_provider());
        let config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_no_client_auth()
            .with_single_cert(vec![cert.der().clone()], key)
            .unwrap();
        let acceptor = TlsAcceptor::from(Arc::new(config));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            // A client that rejects the certificate aborts the handshake
            let Ok(mut tls) = acceptor.accept(stream).await else {
                return;
            };
            let mut request = Vec::new();
            let mut chunk = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match tls.read(&mut chunk).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => request.extend_from_slice(&chunk[..n]),
                }
            }
            tls.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok")
                .await
                .unwrap();
            let _ = tls.shutdown().await;
        });

        port
    }

    #[tokio::test]
    async fn fetch_accepts_self_signed_certificate_by_default() {
        let port = self_signed_server().await;

        let body = fetcher(FetchOptions::default())
            .fetch(&format!("https://127.0.0.1:{}/index.json", port))
            .await
            .unwrap();

        assert_eq!(body, b"ok".to_vec());
    }

    #[tokio::test]
    async fn fetch_rejects_self_signed_certificate_when_validation_enabled() {
        let port = self_signed_server().await;
        let options = FetchOptions {
            accept_all_certificates: false,
            ..FetchOptions::default()
        };

        let result = fetcher(options)
            .fetch(&format!("https://127.0.0.1:{}/index.json", port))
            .await;

        assert!(matches!(result, Err(FeedError::Network(_))));
    }

    #[test]
    fn default_options_accept_all_certificates_with_short_timeout() {
        let options = FetchOptions::default();
        assert!(options.accept_all_certificates);
        assert_eq!(options.timeout, Duration::from_millis(5000));
        assert!(fetcher(options).options().accept_all_certificates);
    }

    #[tokio::test]
    async fn fetch_returns_body_on_success() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/index.json")
            .with_status(200)
            .with_body(r#"{"data": []}"#)
            .create_async()
            .await;

        let body = fetcher(FetchOptions::default())
            .fetch(&format!("{}/index.json", server.url()))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(body, br#"{"data": []}"#.to_vec());
    }

    #[tokio::test]
    async fn fetch_sends_basic_credentials() {
        let mut server = Server::new_async().await;
        // base64("user:secret")
        let mock = server
            .mock("GET", "/private")
            .match_header("authorization", "Basic dXNlcjpzZWNyZXQ=")
            .with_status(200)
            .with_body("ok")
            .create_async()
            .await;

        let options = FetchOptions {
            user_name: Some("user".to_string()),
            password: Some("secret".to_string()),
            ..FetchOptions::default()
        };
        let body = fetcher(options)
            .fetch(&format!("{}/private", server.url()))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(body, b"ok".to_vec());
    }

    #[tokio::test]
    async fn fetch_maps_404_to_not_found() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/missing")
            .with_status(404)
            .create_async()
            .await;

        let result = fetcher(FetchOptions::default())
            .fetch(&format!("{}/missing", server.url()))
            .await;

        mock.assert_async().await;
        assert!(matches!(result, Err(FeedError::NotFound(_))));
    }

    #[tokio::test]
    async fn fetch_reports_unexpected_status() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/broken")
            .with_status(500)
            .create_async()
            .await;

        let result = fetcher(FetchOptions::default())
            .fetch(&format!("{}/broken", server.url()))
            .await;

        mock.assert_async().await;
        assert!(matches!(
            result,
            Err(FeedError::UnexpectedStatus { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn fetch_handles_network_error() {
        let result = fetcher(FetchOptions::default())
            .fetch("http://invalid.localhost.test:99999/index.json")
            .await;

        assert!(matches!(result, Err(FeedError::Network(_))));
    }
}
