//! Shared fixtures for controller and bridge integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chatguard_common::MonitorConfig;
use chatguard_monitor::analysis::AnalysisGateway;
use chatguard_monitor::window::AnalysisWindow;
use chatguard_monitor::{
    ClassifierError, MonitoringController, PollReport, Sentiment, SentimentResult,
};

/// One recorded classifier call
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub username: String,
    pub range: String,
    pub texts: Vec<String>,
}

/// Classifier double that replays scripted outcomes in order
///
/// Once the script runs out every call answers `fallback`.
pub struct ScriptedGateway {
    script: Mutex<VecDeque<Result<SentimentResult, ClassifierError>>>,
    fallback: SentimentResult,
    delay: Duration,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedGateway {
    pub fn new(fallback: SentimentResult) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn positive() -> Self {
        Self::new(verdict(Sentiment::Positive, false, "friendly chat"))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn then(self, outcome: Result<SentimentResult, ClassifierError>) -> Self {
        self.script.lock().unwrap().push_back(outcome);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnalysisGateway for ScriptedGateway {
    async fn submit(
        &self,
        username: &str,
        window: &AnalysisWindow,
    ) -> Result<SentimentResult, ClassifierError> {
        self.calls.lock().unwrap().push(RecordedCall {
            username: username.to_string(),
            range: window.range().to_string(),
            texts: window.messages().iter().map(|m| m.text.clone()).collect(),
        });

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

pub fn verdict(sentiment: Sentiment, alert_needed: bool, explanation: &str) -> SentimentResult {
    SentimentResult {
        sentiment,
        alert_needed,
        explanation: explanation.to_string(),
    }
}

/// Config rooted in a temp directory with short timings
pub fn test_config(root: &Path) -> MonitorConfig {
    MonitorConfig {
        logs_dir: root.join("monitoring_logs"),
        export_dir: root.join("exports"),
        request_timeout: Duration::from_secs(2),
        poll_interval: Duration::from_millis(10),
        shutdown_grace: Duration::from_millis(200),
        ..MonitorConfig::default()
    }
}

/// Poll until no analysis is outstanding, collecting everything applied
pub fn settle(controller: &mut MonitoringController) -> PollReport {
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut total = PollReport::default();
    loop {
        let report = controller.poll_completions();
        total.alerts.extend(report.alerts);
        total.failures.extend(report.failures);
        total.persistence_errors.extend(report.persistence_errors);
        total.discarded += report.discarded;
        total.dropped += report.dropped;

        if controller.outstanding().is_none() || Instant::now() >= deadline {
            return total;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

pub fn shared(gateway: ScriptedGateway) -> Arc<ScriptedGateway> {
    Arc::new(gateway)
}
