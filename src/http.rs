//! Shared HTTP client with retry of transient failures.

use reqwest::{Client, Method, Response};
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    policy: RetryPolicy,
}

impl HttpClient {
    pub fn new(timeout: Duration, policy: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, policy })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// GET `url`, retrying timeouts, connection errors and retryable statuses.
    ///
    /// Any other non-success status fails immediately.
    pub async fn get(&self, url: &str) -> Result<Response> {
        self.request(Method::GET, url).await
    }

    /// HEAD `url` with the same retry behaviour as [`HttpClient::get`].
    pub async fn head(&self, url: &str) -> Result<Response> {
        self.request(Method::HEAD, url).await
    }

    async fn request(&self, method: Method, url: &str) -> Result<Response> {
        self.policy
            .retry(url, || {
                let request = self.client.request(method.clone(), url);
                async move {
                    let response = request.send().await.map_err(|source| Error::Request {
                        url: url.to_string(),
                        source,
                    })?;
                    let status = response.status();
                    debug!(url, status = status.as_u16(), "HTTP response");
                    if status.is_success() {
                        Ok(response)
                    } else {
                        Err(Error::Http {
                            url: url.to_string(),
                            status: status.as_u16(),
                        })
                    }
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> HttpClient {
        HttpClient::new(Duration::from_secs(5), RetryPolicy::immediate(3)).unwrap()
    }

    #[tokio::test]
    async fn test_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let response = client()
            .get(&format!("{}/flaky", server.uri()))
            .await
            .unwrap();
        assert_eq!(response.text().await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_exhausted_budget_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let err = client()
            .get(&format!("{}/broken", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Http { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let err = client()
            .get(&format!("{}/missing", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Http { status: 404, .. }));
    }
}
