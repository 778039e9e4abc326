use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;

/// Boxed stream of body chunks.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

/// Response head plus a streaming body.
///
/// Non-2xx responses are returned as-is; the caller classifies `status`.
pub struct HttpResponse<E> {
    pub status:         u16,
    /// Raw `Content-Range` header, if any.
    pub content_range:  Option<String>,
    pub content_length: Option<u64>,
    pub body:           BoxStream<'static, std::result::Result<Bytes, E>>,
}

impl<E> std::fmt::Debug for HttpResponse<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("content_range", &self.content_range)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Asynchronous HTTP GET abstraction.
///
/// Implementations follow redirects and enforce their own timeouts; the
/// downloader adds no deadline on top.
///
/// # Implementations
///
/// - [`ReqwestClient`]: production implementation on `reqwest`
/// - scripted in-memory clients in tests
pub trait HttpClient: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Sends a GET for `url` with the extra `headers`.
    ///
    /// # Errors
    ///
    /// Only transport failures (DNS, connect, TLS, timeout). An HTTP error
    /// status is a successful [`HttpResponse`].
    fn stream(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> impl Future<Output = std::result::Result<HttpResponse<Self::Error>, Self::Error>> + Send;
}

#[cfg(feature = "reqwest")]
mod reqwest_impl {
    use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, HeaderName};

    use super::*;
    use crate::data::ClientConfig;
    use crate::error::{FetchError, Result};

    /// Production [`HttpClient`] backed by a shared `reqwest::Client`.
    #[derive(Debug, Clone)]
    pub struct ReqwestClient {
        client: reqwest::Client,
    }

    impl ReqwestClient {
        pub fn new(config: ClientConfig) -> Result<Self> {
            let mut builder = reqwest::Client::builder()
                .connect_timeout(config.timeouts.connect)
                .read_timeout(config.timeouts.read);

            for url in &config.proxies {
                let proxy = if url.starts_with("https://") {
                    reqwest::Proxy::https(url)
                } else {
                    reqwest::Proxy::http(url)
                };
                builder = builder.proxy(proxy.map_err(|e| FetchError::Client(e.to_string()))?);
            }

            if let Some(agent) = &config.user_agent {
                builder = builder.user_agent(agent);
            }

            let client = builder.build().map_err(|e| FetchError::Client(e.to_string()))?;
            Ok(Self { client })
        }
    }

    impl HttpClient for ReqwestClient {
        type Error = reqwest::Error;

        async fn stream(
            &self,
            url: &str,
            headers: &[(String, String)],
        ) -> std::result::Result<HttpResponse<Self::Error>, Self::Error> {
            let mut request = self.client.get(url);
            for (key, value) in headers {
                request = request.header(key, value);
            }

            let response = request.send().await?;
            let header = |name: HeaderName| {
                response.headers().get(name).and_then(|v| v.to_str().ok()).map(str::to_owned)
            };
            let content_range = header(CONTENT_RANGE);
            let content_length = header(CONTENT_LENGTH).and_then(|s| s.trim().parse::<u64>().ok());

            Ok(HttpResponse {
                status: response.status().as_u16(),
                content_range,
                content_length,
                body: Box::pin(response.bytes_stream()),
            })
        }
    }
}

#[cfg(feature = "reqwest")]
pub use reqwest_impl::ReqwestClient;
