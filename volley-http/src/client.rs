use bytes::Bytes;
use http_body_util::{BodyExt as _, Full};
use hyper::Request;
use hyper::body::Incoming;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::util::{has_header, host_header_value};
use super::{Error, HttpRequest, HttpResponse, Result};

#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
}

impl Default for HttpClient {
    fn default() -> Self {
        // The OS-level TCP connect timeout can be tens of seconds, which makes a stop request
        // against an unreachable host look hung. Fail connects promptly instead.
        Self::new(Some(Duration::from_secs(3)))
    }
}

impl HttpClient {
    #[must_use]
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false);
        http_connector.set_connect_timeout(connect_timeout);

        let https_connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let inner = Client::builder(TokioExecutor::new()).build(https_connector);

        Self { inner }
    }

    /// Execute `req`, aborting as soon as `cancel` fires.
    ///
    /// An aborted call returns [`Error::Cancelled`] and drops the connection future, so a
    /// partially read body is never handed back to the caller.
    pub async fn request_cancellable(
        &self,
        req: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::trace!("in-flight http request cancelled");
                Err(Error::Cancelled)
            }
            res = self.request(req) => res,
        }
    }

    pub async fn request(&self, req: HttpRequest) -> Result<HttpResponse> {
        let timeout = req.timeout;
        let parsed = url::Url::parse(&req.url).map_err(|_| Error::InvalidUrl(req.url.clone()))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(Error::UnsupportedScheme(req.url));
        }

        let uri: hyper::Uri = req
            .url
            .parse()
            .map_err(|_| Error::InvalidUrl(req.url.to_string()))?;

        let mut builder = Request::builder().method(req.method).uri(uri);

        if !has_header(&req.headers, "host")
            && let Some(host) = host_header_value(&parsed)
        {
            builder = builder.header(http::header::HOST, host);
        }
        if !req.body.is_empty() && !has_header(&req.headers, "content-length") {
            builder = builder.header(http::header::CONTENT_LENGTH, req.body.len());
        }

        for (k, v) in req.headers {
            let name = http::header::HeaderName::from_bytes(k.as_bytes())?;
            let value = http::header::HeaderValue::from_str(&v)?;
            builder = builder.header(name, value);
        }

        let req: Request<Full<Bytes>> = builder.body(Full::new(req.body))?;

        let exchange = async {
            let res: hyper::Response<Incoming> = self.inner.request(req).await?;
            let (parts, body) = res.into_parts();
            let body = body.collect().await?.to_bytes();
            Ok::<_, Error>((parts, body))
        };

        let (parts, body) = match timeout {
            Some(timeout) => match tokio::time::timeout(timeout, exchange).await {
                Ok(res) => res?,
                Err(_) => return Err(Error::Timeout(timeout)),
            },
            None => exchange.await?,
        };

        // Normalize headers to lowercase keys for assertions and scripts.
        // If there are multiple values for a header, join them with ", ".
        let mut merged: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in parts.headers.iter() {
            let key = name.as_str().to_ascii_lowercase();
            let v = String::from_utf8_lossy(value.as_bytes()).to_string();
            merged
                .entry(key)
                .and_modify(|cur| {
                    if !cur.is_empty() {
                        cur.push_str(", ");
                    }
                    cur.push_str(&v);
                })
                .or_insert(v);
        }

        Ok(HttpResponse {
            status: parts.status.as_u16(),
            body,
            headers: merged.into_iter().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn unreachable_host_fails_fast_with_connect_timeout() {
        let client = HttpClient::new(Some(Duration::from_millis(200)));
        let req = HttpRequest::get("http://192.0.2.1:81/");

        let started = Instant::now();
        let _err = client.request(req).await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(
            elapsed < Duration::from_secs(2),
            "expected fast failure, elapsed={elapsed:?}"
        );
    }

    #[tokio::test]
    async fn rejects_non_http_schemes() {
        let client = HttpClient::default();
        let err = client
            .request(HttpRequest::get("ftp://example.com/file"))
            .await
            .unwrap_err();
        assert_eq!(
            err.transport_error_kind(),
            crate::HttpTransportErrorKind::UnsupportedScheme
        );
    }

    #[tokio::test]
    async fn already_cancelled_token_short_circuits() {
        let client = HttpClient::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = client
            .request_cancellable(HttpRequest::get("http://192.0.2.1:81/"), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
