//! Origin client

use async_trait::async_trait;
use http::header::{self, HeaderMap};
use reqwest::Client;
use tracing::{debug, info};
use url::Url;

use crate::error::ProxyError;
use crate::request::{FetchRequest, FetchResponse, ResponseType, is_hop_by_hop};

/// Network fetch capability
///
/// The offline cache manager only ever talks to the network through this
/// trait, so tests can substitute a scripted fetcher.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Issue a request. An `Err` means no response could be obtained at all
    /// (DNS, connection refused, ...); HTTP error statuses are `Ok`.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, ProxyError>;
}

/// Origin client configuration
#[derive(Clone, Debug)]
pub struct OriginClientConfig {
    /// Origin serving the application, e.g. `http://localhost:8080/`
    pub origin: Url,
    /// Username for HTTP basic authentication
    pub username: Option<String>,
    /// Password for HTTP basic authentication
    pub password: Option<String>,
    /// Skip TLS certificate verification
    pub skip_tls_verify: bool,
}

/// HTTP client fetching from the application origin
pub struct OriginClient {
    config: OriginClientConfig,
    client: Client,
}

impl OriginClient {
    /// Create a new origin client
    pub fn new(config: OriginClientConfig) -> Result<Self, ProxyError> {
        if !matches!(config.origin.scheme(), "http" | "https") {
            return Err(ProxyError::UnsupportedScheme(config.origin.to_string()));
        }

        let mut builder = Client::builder();

        if config.skip_tls_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build()?;

        info!("Created origin client for {}", config.origin);

        Ok(Self { config, client })
    }

    /// Same-origin responses are basic, everything else is cors
    fn classify(&self, url: &Url) -> ResponseType {
        if url.origin() == self.config.origin.origin() {
            ResponseType::Basic
        } else {
            ResponseType::Cors
        }
    }

    /// Basic-auth credentials for `url`; only the configured origin gets them
    fn credentials_for(&self, url: &Url) -> Option<(&str, Option<&str>)> {
        if url.origin() != self.config.origin.origin() {
            return None;
        }
        let username = self.config.username.as_deref()?;
        Some((username, self.config.password.as_deref()))
    }

    /// Request headers worth forwarding to the origin
    fn forwarded_headers(request: &FetchRequest) -> HeaderMap {
        request
            .headers
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name) && **name != header::HOST)
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}

#[async_trait]
impl Fetcher for OriginClient {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, ProxyError> {
        if !request.is_network_scheme() {
            return Err(ProxyError::UnsupportedScheme(request.url.to_string()));
        }

        debug!("Fetching {} {}", request.method, request.url);

        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(Self::forwarded_headers(request));

        if let Some((username, password)) = self.credentials_for(&request.url) {
            builder = builder.basic_auth(username, password);
        }

        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify_error(&request.url, e))?;

        let final_url = response.url().clone();
        let redirected = final_url.as_str() != request.url.as_str();
        let kind = self.classify(&final_url);
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        debug!(
            "Fetched {} -> {} ({}, {} bytes{})",
            request.url,
            status,
            kind.as_str(),
            body.len(),
            if redirected { ", redirected" } else { "" }
        );

        Ok(FetchResponse {
            status,
            headers,
            body,
            kind,
            redirected,
        })
    }
}

/// Connection failures and timeouts mean the origin could not be reached
fn classify_error(url: &Url, error: reqwest::Error) -> ProxyError {
    if error.is_connect() || error.is_timeout() {
        ProxyError::Unreachable(format!("{}: {}", url, error))
    } else {
        ProxyError::Http(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn client(origin: &str) -> OriginClient {
        OriginClient::new(OriginClientConfig {
            origin: Url::parse(origin).unwrap(),
            username: None,
            password: None,
            skip_tls_verify: false,
        })
        .unwrap()
    }

    #[test]
    fn test_classify() {
        let client = client("http://localhost:8080/");
        assert_eq!(
            client.classify(&Url::parse("http://localhost:8080/index.html").unwrap()),
            ResponseType::Basic
        );
        assert_eq!(
            client.classify(&Url::parse("http://localhost:9090/index.html").unwrap()),
            ResponseType::Cors
        );
        assert_eq!(
            client.classify(&Url::parse("https://fonts.example.org/a.woff2").unwrap()),
            ResponseType::Cors
        );
    }

    #[test]
    fn test_rejects_non_http_origin() {
        let result = OriginClient::new(OriginClientConfig {
            origin: Url::parse("file:///srv/app/").unwrap(),
            username: None,
            password: None,
            skip_tls_verify: false,
        });
        assert!(matches!(result, Err(ProxyError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_forwarded_headers_strip_connection_scope() {
        let mut request = FetchRequest::get(Url::parse("http://localhost:8080/").unwrap());
        request.headers.insert(header::HOST, HeaderValue::from_static("localhost:3000"));
        request.headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        request.headers.insert(header::ACCEPT, HeaderValue::from_static("text/html"));

        let forwarded = OriginClient::forwarded_headers(&request);
        assert_eq!(forwarded.len(), 1);
        assert_eq!(forwarded.get(header::ACCEPT).unwrap(), "text/html");
    }

    #[test]
    fn test_credentials_only_for_origin() {
        let authed = OriginClient::new(OriginClientConfig {
            origin: Url::parse("http://localhost:8080/minuteur/").unwrap(),
            username: Some("chef".to_string()),
            password: Some("secret".to_string()),
            skip_tls_verify: false,
        })
        .unwrap();

        assert_eq!(
            authed.credentials_for(&Url::parse("http://localhost:8080/index.html").unwrap()),
            Some(("chef", Some("secret")))
        );
        assert_eq!(
            authed.credentials_for(&Url::parse("http://evil.example.com/steal").unwrap()),
            None
        );
        assert_eq!(
            authed.credentials_for(&Url::parse("https://localhost:8080/").unwrap()),
            None
        );
        assert_eq!(
            client("http://localhost:8080/")
                .credentials_for(&Url::parse("http://localhost:8080/").unwrap()),
            None
        );
    }

    #[tokio::test]
    async fn test_refused_connection_is_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let origin = format!("http://127.0.0.1:{}/", port);
        let client = client(&origin);
        let request = FetchRequest::get(Url::parse(&origin).unwrap());
        assert!(matches!(
            client.fetch(&request).await,
            Err(ProxyError::Unreachable(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_rejects_non_network_scheme() {
        let client = client("http://localhost:8080/");
        let request = FetchRequest::get(Url::parse("data:text/plain,hello").unwrap());
        assert!(matches!(
            client.fetch(&request).await,
            Err(ProxyError::UnsupportedScheme(_))
        ));
    }
}
