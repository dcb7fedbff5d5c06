//! Analysis gateway
//!
//! Adapts an [`AnalysisWindow`] into the classifier's wire request and parses
//! the response into a [`SentimentResult`]. The gateway is stateless and does
//! not retry; a failed call simply yields no alert for that window.
//!
//! Wire contract:
//! - request: `{"username": str, "chats": [{"sender": str, "message": str}]}`
//! - response: `{"sentiment": "NEGATIVE"|"CAUTIONARY"|"POSITIVE",
//!   "alert_needed": bool, "explanation": str}`
//!
//! Any other response shape is a `MalformedResponse`; values are never
//! coerced.

pub mod http_gateway;

pub use http_gateway::HttpAnalysisGateway;

use crate::error::ClassifierError;
use crate::window::AnalysisWindow;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Classifier verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sentiment {
    Negative,
    Cautionary,
    Positive,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Negative => "NEGATIVE",
            Sentiment::Cautionary => "CAUTIONARY",
            Sentiment::Positive => "POSITIVE",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sentiment {
    type Err = String;

    /// Exact match only
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEGATIVE" => Ok(Sentiment::Negative),
            "CAUTIONARY" => Ok(Sentiment::Cautionary),
            "POSITIVE" => Ok(Sentiment::Positive),
            other => Err(format!("unknown sentiment: {:?}", other)),
        }
    }
}

/// Parsed classifier response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentResult {
    pub sentiment: Sentiment,
    pub alert_needed: bool,
    /// Free text; may enumerate concern categories
    pub explanation: String,
}

/// One chat line in the wire request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub sender: String,
    pub message: String,
}

/// Wire request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub username: String,
    pub chats: Vec<ChatEntry>,
}

/// Serialize a window into the wire request
pub fn build_request(username: &str, window: &AnalysisWindow) -> AnalysisRequest {
    AnalysisRequest {
        username: username.to_string(),
        chats: window
            .messages()
            .iter()
            .map(|m| ChatEntry {
                sender: m.sender.clone(),
                message: m.text.clone(),
            })
            .collect(),
    }
}

/// Parse a response body
///
/// Missing fields, wrong types and unknown sentiment values all map to
/// `MalformedResponse`.
pub fn parse_response(body: &str) -> Result<SentimentResult, ClassifierError> {
    serde_json::from_str::<SentimentResult>(body)
        .map_err(|e| ClassifierError::MalformedResponse(e.to_string()))
}

/// Submits analysis windows to the remote classifier
#[async_trait]
pub trait AnalysisGateway: Send + Sync {
    /// Classify one window on behalf of `username`
    async fn submit(
        &self,
        username: &str,
        window: &AnalysisWindow,
    ) -> Result<SentimentResult, ClassifierError>;
}
