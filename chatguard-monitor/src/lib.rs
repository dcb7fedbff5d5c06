//! chatguard-monitor library interface
//!
//! Conversation monitoring pipeline: messages are appended to a session log,
//! sliding windows are sent to a remote sentiment classifier off the owner's
//! thread, and verdicts become alerts that are shown to the viewer and
//! persisted to date-partitioned JSON files.

pub mod alert_store;
pub mod analysis;
pub mod bridge;
pub mod controller;
pub mod conversation;
pub mod error;
pub mod status;
pub mod window;

pub use crate::alert_store::{parse_report, render_report, AlertStore, MonitoringAlert};
pub use crate::analysis::{AnalysisGateway, HttpAnalysisGateway, Sentiment, SentimentResult};
pub use crate::bridge::{AnalysisBridge, AnalysisCompletion, DispatchHandle};
pub use crate::controller::{
    CompletionOutcome, MonitoringController, MonitoringState, PollReport, SessionPhase,
    ViewerSnapshot,
};
pub use crate::error::{ClassifierError, MonitorError, PersistenceError, Result};
