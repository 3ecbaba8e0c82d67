//! TCP connect probe.

use super::{ProbeBase, ProbeError, ProbeSettings, Prober};
use crate::result::ProbeResult;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::net::TcpStream;

/// Succeeds when a TCP connection to `host` can be established.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TcpProber {
    #[serde(flatten)]
    pub base: ProbeBase,
    /// `host:port`
    pub host: String,
}

impl TcpProber {
    pub fn new(name: &str, host: &str) -> Self {
        Self {
            base: ProbeBase::new(name),
            host: host.to_string(),
        }
    }

    async fn check(&self) -> Result<String, ProbeError> {
        let stream = TcpStream::connect(&self.host)
            .await
            .map_err(|e| ProbeError::Network(format!("connect {} failed: {}", self.host, e)))?;
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| self.host.clone());
        Ok(format!("TCP connection to {} established", peer))
    }
}

#[async_trait]
impl Prober for TcpProber {
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
        if !self.host.contains(':') {
            return Err(ProbeError::Config(format!(
                "TCP prober '{}' needs host:port, got '{}'",
                self.base.name, self.host
            )));
        }
        let endpoint = format!("tcp://{}", self.host);
        self.base.configure("tcp", &endpoint, settings)
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
