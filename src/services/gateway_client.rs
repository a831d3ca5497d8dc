use crate::errors::ServiceError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Transport to the payment gateway.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Posts `form` url-encoded to `url` and returns the raw response body.
    async fn execute(&self, url: &str, form: &[(String, String)]) -> Result<String, ServiceError>;
}

#[derive(Clone)]
pub struct HttpGatewayClient {
    client: reqwest::Client,
}

impl HttpGatewayClient {
    pub fn new(timeout: Duration) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl GatewayClient for HttpGatewayClient {
    #[instrument(skip(self, form), fields(fields = form.len()))]
    async fn execute(&self, url: &str, form: &[(String, String)]) -> Result<String, ServiceError> {
        let response = self.client.post(url).form(form).send().await.map_err(|e| {
            warn!(error = %e, "gateway request failed");
            ServiceError::GatewayUnavailable(if e.is_timeout() {
                "gateway timed out".to_string()
            } else {
                "gateway unreachable".to_string()
            })
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            warn!(error = %e, "failed to read gateway response");
            ServiceError::GatewayUnavailable("gateway response unreadable".to_string())
        })?;

        if !status.is_success() {
            warn!(%status, "gateway returned non-success status");
            debug!(body = %body, "gateway error body");
            return Err(ServiceError::GatewayUnavailable(format!(
                "gateway returned {}",
                status
            )));
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn form() -> Vec<(String, String)> {
        vec![
            ("appid".to_string(), "201906120001".to_string()),
            ("total_fee".to_string(), "5.00".to_string()),
            ("hash".to_string(), "abc".to_string()),
        ]
    }

    #[tokio::test]
    async fn posts_form_and_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payment/do.html"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string_contains("total_fee=5.00"))
            .and(body_string_contains("hash=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok":1}"#))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpGatewayClient::new(Duration::from_secs(5)).unwrap();
        let body = client
            .execute(&format!("{}/payment/do.html", server.uri()), &form())
            .await
            .unwrap();
        assert_eq!(body, r#"{"ok":1}"#);
    }

    #[tokio::test]
    async fn non_success_status_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let client = HttpGatewayClient::new(Duration::from_secs(5)).unwrap();
        let result = client.execute(&server.uri(), &form()).await;
        assert_matches!(result, Err(ServiceError::GatewayUnavailable(msg)) if !msg.contains("bad gateway"));
    }

    #[tokio::test]
    async fn slow_gateway_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let client = HttpGatewayClient::new(Duration::from_millis(50)).unwrap();
        let result = client.execute(&server.uri(), &form()).await;
        assert_matches!(result, Err(ServiceError::GatewayUnavailable(_)));
    }

    #[tokio::test]
    async fn unreachable_gateway_is_unavailable() {
        let client = HttpGatewayClient::new(Duration::from_secs(1)).unwrap();
        let result = client.execute("http://127.0.0.1:9/pay", &form()).await;
        assert_matches!(result, Err(ServiceError::GatewayUnavailable(_)));
    }
}
