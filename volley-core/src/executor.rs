use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use volley_http::{HttpClient, HttpRequest, HttpResponse};

/// Performs one HTTP call. Implementations return [`volley_http::Error::Cancelled`] when `cancel`
/// fires while the call is in flight.
#[async_trait]
pub trait HttpExecutor: Send + Sync {
    async fn execute(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> volley_http::Result<HttpResponse>;
}

#[async_trait]
impl HttpExecutor for HttpClient {
    async fn execute(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> volley_http::Result<HttpResponse> {
        self.request_cancellable(request, cancel).await
    }
}
