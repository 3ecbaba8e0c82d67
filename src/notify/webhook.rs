//! Generic JSON webhook notifier.

use super::{result_text, sla_summary, NotifyBase, NotifyError, NotifySettings, Notifier};
use crate::probe::SharedProber;
use crate::result::ProbeResult;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// JSON body posted to the webhook.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload<'a> {
    pub title: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<&'a ProbeResult>,
}

/// POSTs results and SLA reports as JSON to a URL.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookNotifier {
    #[serde(flatten)]
    pub base: NotifyBase,
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(skip)]
    client: Option<reqwest::Client>,
}

impl WebhookNotifier {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            base: NotifyBase::new(name),
            url: url.to_string(),
            ..Default::default()
        }
    }

    async fn post(&self, payload: &WebhookPayload<'_>) -> Result<(), NotifyError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| NotifyError::Config("webhook client not configured".into()))?;

        let mut request = client.post(&self.url).json(payload);
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotifyError::Send(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "No body".to_string());
            return Err(NotifyError::Status {
                code: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

pub fn result_payload(result: &ProbeResult) -> WebhookPayload<'_> {
    WebhookPayload {
        title: result.title(),
        text: result_text(result),
        result: Some(result),
    }
}

pub fn sla_payload(summary: String) -> WebhookPayload<'static> {
    WebhookPayload {
        title: "SLA report".to_string(),
        text: summary,
        result: None,
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn kind(&self) -> &str {
        self.base.kind()
    }

    fn name(&self) -> &str {
        &self.base.name
    }

    fn channels(&self) -> Vec<String> {
        self.base.channels()
    }

    fn config(&mut self, settings: &NotifySettings) -> Result<(), NotifyError> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(NotifyError::Config(format!(
                "webhook '{}' needs an http(s) url, got '{}'",
                self.base.name, self.url
            )));
        }
        self.base.configure("webhook", settings)?;
        let client = reqwest::Client::builder()
            .timeout(self.base.timeout())
            .build()
            .map_err(|e| NotifyError::Config(e.to_string()))?;
        self.client = Some(client);
        Ok(())
    }

    async fn notify(&self, result: &ProbeResult) {
        let payload = result_payload(result);
        let what = format!("notification for {}", result.name);
        self.base.send_with_retry(&what, || self.post(&payload)).await;
    }

    async fn notify_stat(&self, probers: &[SharedProber]) {
        let payload = sla_payload(sla_summary(probers).await);
        self.base
            .send_with_retry("SLA report", || self.post(&payload))
            .await;
    }

    async fn dry_notify(&self, result: &ProbeResult) {
        let body = serde_json::to_string(&result_payload(result)).unwrap_or_default();
        tracing::info!(notifier = %self.base.name, url = %self.url, "[dry] POST {}", body);
    }

    async fn dry_notify_stat(&self, probers: &[SharedProber]) {
        let payload = sla_payload(sla_summary(probers).await);
        let body = serde_json::to_string(&payload).unwrap_or_default();
        tracing::info!(notifier = %self.base.name, url = %self.url, "[dry] POST {}", body);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::Retry;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_config_requires_http_url() {
        let mut notifier = WebhookNotifier::new("hook", "ftp://nope");
        assert!(notifier.config(&NotifySettings::default()).is_err());

        let mut notifier = WebhookNotifier::new("hook", "http://127.0.0.1:9/hook");
        notifier.config(&NotifySettings::default()).unwrap();
        assert_eq!(notifier.kind(), "webhook");
    }

    #[test]
    fn test_result_payload_shape() {
        let result = ProbeResult::new("api", "http://api");
        let value = serde_json::to_value(result_payload(&result)).unwrap();
        assert_eq!(value["result"]["name"], "api");
        assert!(value["title"].as_str().unwrap().starts_with("api (http://api)"));

        let value = serde_json::to_value(sla_payload("x".into())).unwrap();
        assert!(value.get("result").is_none());
    }

    #[tokio::test]
    async fn test_notify_posts_json() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 16 * 1024];
            let mut received = String::new();
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                received.push_str(&String::from_utf8_lossy(&buf[..n]));
                if received.contains("\"title\"") && received.trim_end().ends_with('}') {
                    break;
                }
            }
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                .await
                .unwrap();
            received
        });

        let mut notifier = WebhookNotifier::new("hook", &format!("http://{}/alert", addr));
        notifier.base.retry = Some(Retry {
            times: 1,
            interval: Duration::from_millis(10),
        });
        notifier.config(&NotifySettings::default()).unwrap();

        let mut result = ProbeResult::new("api", "http://api");
        result.message = "HTTP status code is 500".into();
        notifier.notify(&result).await;

        let received = server.await.unwrap();
        assert!(received.starts_with("POST /alert"));
        assert!(received.contains("HTTP status code is 500"));
    }
}
