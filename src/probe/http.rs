//! HTTP probe implementation.

use super::{ProbeBase, ProbeError, ProbeSettings, Prober, TextChecker};
use crate::result::ProbeResult;

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Probes a URL and checks the response code and body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpProber {
    #[serde(flatten)]
    pub base: ProbeBase,
    pub url: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: String,
    /// Inclusive ranges of acceptable status codes. Defaults to 200-399.
    #[serde(default)]
    pub success_codes: Vec<(u16, u16)>,
    #[serde(flatten)]
    pub text: TextChecker,
    #[serde(skip)]
    client: Option<reqwest::Client>,
}

impl HttpProber {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            base: ProbeBase::new(name),
            url: url.to_string(),
            ..Default::default()
        }
    }

    fn normalized_url(&self) -> String {
        if self.url.starts_with("http://") || self.url.starts_with("https://") {
            self.url.clone()
        } else {
            format!("http://{}", self.url)
        }
    }

    fn method(&self) -> Result<Method, ProbeError> {
        if self.method.is_empty() {
            return Ok(Method::GET);
        }
        Method::from_bytes(self.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| ProbeError::Config(format!("invalid HTTP method: {}", self.method)))
    }

    fn is_success(&self, code: u16) -> bool {
        self.success_codes
            .iter()
            .any(|(low, high)| (*low..=*high).contains(&code))
    }

    async fn check(&self) -> Result<String, ProbeError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| ProbeError::Config("HTTP client not configured".into()))?;
        let method = self.method()?;

        let mut request = client.request(method, &self.base.result().endpoint);
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }
        if !self.body.is_empty() {
            request = request.body(self.body.clone());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout(self.base.timeout())
            } else {
                ProbeError::Network(e.to_string())
            }
        })?;

        let code = response.status().as_u16();
        // Read the full body to measure complete transfer time
        let body = response
            .text()
            .await
            .map_err(|e| ProbeError::Network(e.to_string()))?;

        if !self.is_success(code) {
            return Err(ProbeError::Check(format!("HTTP status code is {}", code)));
        }
        self.text.check(&body)?;

        Ok(format!("HTTP status code is {}", code))
    }
}

#[async_trait]
impl Prober for HttpProber {
    fn kind(&self) -> &str {
        self.base.kind()
    }

    fn name(&self) -> &str {
        &self.base.name
    }

    fn channels(&self) -> Vec<String> {
        self.base.channels()
    }

    fn config(&mut self, settings: &ProbeSettings) -> Result<(), ProbeError> {
        if self.url.trim().is_empty() {
            return Err(ProbeError::Config(format!("HTTP prober '{}' has no url", self.base.name)));
        }
        self.method()?;
        self.text.config()?;
        if self.success_codes.is_empty() {
            self.success_codes = vec![(200, 399)];
        }

        let url = self.normalized_url();
        self.base.configure("http", &url, settings)?;

        let client = reqwest::Client::builder()
            .timeout(self.base.timeout())
            .connect_timeout(self.base.timeout().min(Duration::from_secs(10)))
            .build()
            .map_err(|e| ProbeError::Config(e.to_string()))?;
        self.client = Some(client);
        Ok(())
    }

    async fn probe(&mut self) -> ProbeResult {
        let observation = self.base.observe(self.check()).await;
        self.base.record(observation)
    }

    fn interval(&self) -> Duration {
        self.base.interval()
    }

    fn result(&self) -> &ProbeResult {
        self.base.result()
    }

    fn result_mut(&mut self) -> &mut ProbeResult {
        self.base.result_mut()
    }
}
