//! HTTP client for the sentiment classifier service

use super::{build_request, parse_response, AnalysisGateway, SentimentResult};
use crate::error::ClassifierError;
use crate::window::AnalysisWindow;
use async_trait::async_trait;
use chatguard_common::MonitorConfig;
use std::time::Duration;
use tracing::{debug, info};

const ANALYZE_PATH: &str = "/analyze_chats";
const USER_AGENT: &str = concat!("chatguard/", env!("CARGO_PKG_VERSION"));

/// Classifier client speaking JSON over HTTP
pub struct HttpAnalysisGateway {
    http_client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpAnalysisGateway {
    pub fn new(server_url: &str, timeout: Duration) -> Result<Self, ClassifierError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ClassifierError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: format!("{}{}", server_url.trim_end_matches('/'), ANALYZE_PATH),
            timeout,
        })
    }

    pub fn from_config(config: &MonitorConfig) -> Result<Self, ClassifierError> {
        Self::new(&config.server_url, config.request_timeout)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn map_send_error(&self, e: reqwest::Error) -> ClassifierError {
        if e.is_timeout() {
            ClassifierError::Timeout(self.timeout)
        } else {
            ClassifierError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl AnalysisGateway for HttpAnalysisGateway {
    async fn submit(
        &self,
        username: &str,
        window: &AnalysisWindow,
    ) -> Result<SentimentResult, ClassifierError> {
        let request = build_request(username, window);

        debug!(
            url = %self.endpoint,
            username = %username,
            chats = request.chats.len(),
            range = %window.range(),
            "Submitting window to classifier"
        );

        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.map_send_error(e))?;

        if !status.is_success() {
            return Err(ClassifierError::UpstreamRejected {
                status: status.as_u16(),
                body,
            });
        }

        let result = parse_response(&body)?;

        info!(
            username = %username,
            range = %window.range(),
            sentiment = %result.sentiment,
            alert_needed = result.alert_needed,
            "Classifier verdict received"
        );

        Ok(result)
    }
}
