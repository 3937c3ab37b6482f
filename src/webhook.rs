//! Outbound automation webhooks.
//!
//! The automation service takes one JSON body `{ "webhookType": ..., ...payload }`.
//! Responses are never read back into board state: the call either succeeded or
//! it did not.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::WebhookConfig;
use crate::error::WebhookError;

/// Webhook body: a type tag plus free-form fields flattened beside it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookPayload {
    #[serde(rename = "webhookType")]
    pub webhook_type: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl WebhookPayload {
    pub fn new(webhook_type: impl Into<String>) -> Self {
        WebhookPayload { webhook_type: webhook_type.into(), fields: Map::new() }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }
}

/// Client for the automation endpoint.
#[derive(Clone)]
pub struct WebhookClient {
    url: String,
    client: Client,
}

impl WebhookClient {
    /// `None` when no endpoint is configured.
    pub fn from_config(config: &WebhookConfig) -> Result<Option<Self>, WebhookError> {
        let Some(url) = config.url.clone() else { return Ok(None) };
        let client = Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;
        Ok(Some(WebhookClient { url, client }))
    }

    /// Send and report opaque success or failure.
    pub async fn send(&self, payload: &WebhookPayload) -> Result<(), WebhookError> {
        let response = self.client.post(&self.url).json(payload).send().await?;
        if !response.status().is_success() {
            return Err(WebhookError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }

    /// Fire and forget on the current runtime; the outcome is only logged.
    pub fn fire(&self, payload: WebhookPayload) {
        let this = self.clone();
        tokio::spawn(async move {
            match this.send(&payload).await {
                Ok(()) => tracing::info!(webhook = %payload.webhook_type, "webhook delivered"),
                Err(e) => tracing::warn!(webhook = %payload.webhook_type, error = %e, "webhook failed"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> WebhookClient {
        let cfg = WebhookConfig { url: Some(format!("{}/hooks/console", server.uri())), timeout_secs: 5 };
        WebhookClient::from_config(&cfg).unwrap().unwrap()
    }

    #[test]
    fn payload_flattens_beside_type_tag() {
        let p = WebhookPayload::new("prospectConverted").with("prospectId", 4).with("name", "Acme");
        assert_eq!(
            serde_json::to_value(&p).unwrap(),
            json!({"webhookType": "prospectConverted", "prospectId": 4, "name": "Acme"})
        );
    }

    #[test]
    fn unconfigured_endpoint_yields_no_client() {
        assert!(WebhookClient::from_config(&WebhookConfig::default()).unwrap().is_none());
    }

    #[tokio::test]
    async fn send_reports_success_and_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hooks/console"))
            .and(body_json(json!({"webhookType": "ping"})))
            .respond_with(ResponseTemplate::new(200).set_body_string("Accepted"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/hooks/console"))
            .and(body_json(json!({"webhookType": "broken"})))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let c = client(&server);
        assert!(c.send(&WebhookPayload::new("ping")).await.is_ok());
        assert!(matches!(c.send(&WebhookPayload::new("broken")).await, Err(WebhookError::Rejected(500))));
    }
}
