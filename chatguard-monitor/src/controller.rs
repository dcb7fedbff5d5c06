//! Monitoring controller
//!
//! Owns all session state (conversation log, counters, alert store, status
//! board, display feed) and is the only code that mutates it. Everything runs
//! on the caller's thread; classifier calls go through the [`AnalysisBridge`]
//! and their results are applied when the owner calls `poll_completions`.
//!
//! Session lifecycle: `Initializing -> Active <-> Paused -> Stopped`.
//!
//! Pausing only gates what the viewer sees. Analyses keep running while
//! paused and their alerts are still persisted, but they are neither added
//! to the display feed nor applied to the status board.
//!
//! At most one analysis is outstanding at a time. While it is in flight the
//! message counter keeps counting but no new trigger fires; counters advance
//! only when a successful result is applied. A failed analysis leaves them
//! as they were, so the next message re-evaluates the trigger.

use crate::alert_store::{AlertStore, MonitoringAlert};
use crate::analysis::{AnalysisGateway, HttpAnalysisGateway};
use crate::bridge::{AnalysisBridge, AnalysisCompletion, BridgeSettings, DispatchHandle};
use crate::conversation::ConversationLog;
use crate::error::{ClassifierError, MonitorError, PersistenceError, Result};
use crate::status::{PartyStatus, StatusBoard};
use crate::window;
use chatguard_common::time::{Clock, SystemClock};
use chatguard_common::MonitorConfig;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    Initializing,
    Active,
    Paused,
    Stopped,
}

/// Per-session analysis counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitoringState {
    /// Monitoring shown to the viewer (false while paused)
    pub active: bool,
    /// Last message index covered by the most recent applied analysis
    pub last_analyzed_index: Option<usize>,
    /// Messages appended since that analysis
    pub pending_since_last: usize,
}

impl Default for MonitoringState {
    fn default() -> Self {
        Self {
            active: true,
            last_analyzed_index: None,
            pending_since_last: 0,
        }
    }
}

/// What happened to an appended message
#[derive(Debug, Clone)]
pub struct MessageReceipt {
    pub sequence_index: usize,
    /// Set when this message triggered an analysis
    pub dispatched: Option<DispatchHandle>,
}

/// What happened to a delivered completion
#[derive(Debug)]
pub enum CompletionOutcome {
    /// Result applied; `persisted` reports the durability outcome
    Alerted {
        alert: MonitoringAlert,
        displayed: bool,
        persisted: std::result::Result<(), PersistenceError>,
    },
    /// Classifier call failed; no state changed
    Failed(ClassifierError),
    /// Result from before a reset or after stop; ignored
    Discarded,
}

/// Summary of one `poll_completions` pass
#[derive(Debug, Default)]
pub struct PollReport {
    pub alerts: Vec<MonitoringAlert>,
    pub failures: Vec<ClassifierError>,
    pub persistence_errors: Vec<PersistenceError>,
    pub discarded: usize,
    /// Outstanding analyses whose result was lost on a full completion queue
    pub dropped: usize,
}

impl PollReport {
    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
            && self.failures.is_empty()
            && self.discarded == 0
            && self.dropped == 0
    }
}

/// Everything a viewer reads when it polls
#[derive(Debug, Clone, Serialize)]
pub struct ViewerSnapshot {
    pub session_id: Uuid,
    pub phase: SessionPhase,
    pub active: bool,
    pub message_count: usize,
    pub statuses: BTreeMap<String, PartyStatus>,
    /// All alerts held in memory, oldest first
    pub alerts: Vec<MonitoringAlert>,
    /// Alerts shown to the viewer, newest first
    pub feed: Vec<MonitoringAlert>,
}

pub struct MonitoringController {
    session_id: Uuid,
    config: MonitorConfig,
    phase: SessionPhase,
    log: ConversationLog,
    state: MonitoringState,
    store: AlertStore,
    board: StatusBoard,
    feed: Vec<MonitoringAlert>,
    bridge: AnalysisBridge,
    outstanding: Option<DispatchHandle>,
}

impl MonitoringController {
    /// Start a session against the HTTP classifier named in the config
    pub fn start_http(config: MonitorConfig) -> Result<Self> {
        config.validate()?;
        let gateway = HttpAnalysisGateway::from_config(&config)
            .map_err(|e| MonitorError::Runtime(e.to_string()))?;
        Self::start(config, Arc::new(gateway))
    }

    pub fn start(config: MonitorConfig, gateway: Arc<dyn AnalysisGateway>) -> Result<Self> {
        Self::start_with_clock(config, gateway, Arc::new(SystemClock))
    }

    /// Validate config, replay today's alerts and start the bridge
    ///
    /// Invalid configuration is fatal. An unreadable partition is not: the
    /// session starts with an empty history and logs the failure.
    ///
    /// The controller is meant to live on a plain thread. Stopping or dropping
    /// it inside a tokio runtime does not block, but in-flight analyses are
    /// abandoned without the shutdown grace period.
    pub fn start_with_clock(
        config: MonitorConfig,
        gateway: Arc<dyn AnalysisGateway>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let session_id = Uuid::new_v4();
        info!(
            session_id = %session_id,
            window_size = config.window_size,
            logs_dir = %config.logs_dir.display(),
            "Initializing monitoring session"
        );

        let bridge = AnalysisBridge::start(gateway, BridgeSettings::from(&config))?;

        let mut controller = Self {
            session_id,
            store: AlertStore::new(config.logs_dir.clone(), clock),
            board: StatusBoard::new(config.parties.iter().cloned()),
            config,
            phase: SessionPhase::Initializing,
            log: ConversationLog::new(),
            state: MonitoringState::default(),
            feed: Vec::new(),
            bridge,
            outstanding: None,
        };

        controller.replay_today();
        controller.phase = SessionPhase::Active;
        info!(
            session_id = %session_id,
            replayed = controller.store.alerts().len(),
            "Monitoring active"
        );
        Ok(controller)
    }

    /// Load today's partition into the store, feed and status board
    fn replay_today(&mut self) {
        debug_assert_eq!(self.phase, SessionPhase::Initializing);
        match self.store.load_today() {
            Ok(history) => {
                for alert in &history {
                    self.board.apply(alert);
                    self.feed.insert(0, alert.clone());
                }
                self.store.restore(history);
            }
            Err(e) => warn!(
                session_id = %self.session_id,
                "Could not replay today's alerts: {}",
                e
            ),
        }
    }

    /// Append a message and dispatch an analysis if the window policy fires
    pub fn on_new_message(&mut self, sender: &str, text: &str) -> Result<MessageReceipt> {
        if self.phase == SessionPhase::Stopped {
            return Err(MonitorError::SessionStopped);
        }

        let message = self.log.append(sender, text)?;
        self.board.register(&message.sender);
        self.state.pending_since_last += 1;

        let mut receipt = MessageReceipt {
            sequence_index: message.sequence_index,
            dispatched: None,
        };

        if let Some(outstanding) = &self.outstanding {
            debug!(
                session_id = %self.session_id,
                dispatch_id = outstanding.id,
                pending = self.state.pending_since_last,
                "Analysis in flight, trigger deferred"
            );
            return Ok(receipt);
        }

        let decision = window::decide(
            self.log.messages(),
            self.config.window_size,
            self.state.last_analyzed_index,
            self.state.pending_since_last,
        );
        debug!(
            session_id = %self.session_id,
            total = self.log.len(),
            pending = self.state.pending_since_last,
            trigger = decision.trigger,
            "Window evaluated"
        );

        if decision.trigger {
            match self.bridge.dispatch(&message.sender, decision.window) {
                Ok(handle) => {
                    info!(
                        session_id = %self.session_id,
                        dispatch_id = handle.id,
                        party = %handle.party,
                        range = %handle.range,
                        "Analysis triggered"
                    );
                    self.outstanding = Some(handle.clone());
                    receipt.dispatched = Some(handle);
                }
                Err(e) => warn!(session_id = %self.session_id, "Analysis not dispatched: {}", e),
            }
        }

        Ok(receipt)
    }

    /// Apply one delivered completion
    pub fn on_analysis_complete(&mut self, completion: AnalysisCompletion) -> CompletionOutcome {
        if self.phase == SessionPhase::Stopped {
            return CompletionOutcome::Discarded;
        }

        match &self.outstanding {
            Some(handle) if handle.id == completion.id => {
                self.outstanding = None;
            }
            _ => {
                debug!(
                    session_id = %self.session_id,
                    dispatch_id = completion.id,
                    "Ignoring completion that is no longer outstanding"
                );
                return CompletionOutcome::Discarded;
            }
        }

        let result = match completion.result {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    session_id = %self.session_id,
                    dispatch_id = completion.id,
                    party = %completion.party,
                    range = %completion.range,
                    "Analysis failed, no alert this cycle: {}",
                    e
                );
                return CompletionOutcome::Failed(e);
            }
        };

        let alert = MonitoringAlert::from_result(
            self.store.timestamp_now(),
            &completion.party,
            completion.range,
            &result,
        );

        self.state.pending_since_last = 0;
        self.state.last_analyzed_index = completion.range.last_index();

        let persisted = self.store.append(alert.clone());

        let displayed = self.state.active;
        if displayed {
            self.feed.insert(0, alert.clone());
            self.board.apply(&alert);
        }

        info!(
            session_id = %self.session_id,
            party = %alert.party,
            range = %alert.message_range,
            sentiment = %alert.sentiment,
            alert_needed = alert.alert_needed,
            displayed,
            "Analysis applied"
        );

        CompletionOutcome::Alerted {
            alert,
            displayed,
            persisted,
        }
    }

    /// Drain and apply every completion that is ready; never blocks
    pub fn poll_completions(&mut self) -> PollReport {
        let mut report = PollReport::default();
        for completion in self.bridge.poll_completions() {
            match self.on_analysis_complete(completion) {
                CompletionOutcome::Alerted {
                    alert, persisted, ..
                } => {
                    if let Err(e) = persisted {
                        report.persistence_errors.push(e);
                    }
                    report.alerts.push(alert);
                }
                CompletionOutcome::Failed(e) => report.failures.push(e),
                CompletionOutcome::Discarded => report.discarded += 1,
            }
        }

        for id in self.bridge.take_dropped() {
            if self.outstanding.as_ref().is_some_and(|h| h.id == id) {
                self.outstanding = None;
                report.dropped += 1;
                warn!(
                    session_id = %self.session_id,
                    dispatch_id = id,
                    pending = self.state.pending_since_last,
                    "Analysis result lost on a full completion queue, no alert this cycle"
                );
            }
        }
        report
    }

    pub fn pause(&mut self) -> Result<()> {
        self.set_active(false)
    }

    pub fn resume(&mut self) -> Result<()> {
        self.set_active(true)
    }

    /// Flip between Active and Paused; returns the new `active` flag
    pub fn toggle_monitoring(&mut self) -> Result<bool> {
        let next = !self.state.active;
        self.set_active(next)?;
        Ok(next)
    }

    fn set_active(&mut self, active: bool) -> Result<()> {
        if self.phase == SessionPhase::Stopped {
            return Err(MonitorError::SessionStopped);
        }
        self.state.active = active;
        self.phase = if active {
            SessionPhase::Active
        } else {
            SessionPhase::Paused
        };
        info!(
            session_id = %self.session_id,
            "Monitoring {}",
            if active { "resumed" } else { "paused" }
        );
        Ok(())
    }

    /// Clear the conversation, counters, today's partition and live view
    ///
    /// Completions already queued are dropped unapplied, and the outstanding
    /// analysis (if any) is forgotten so its late result is ignored. A
    /// failure to clear the partition is returned after the in-memory reset
    /// has completed.
    pub fn reset(&mut self) -> Result<()> {
        if self.phase == SessionPhase::Stopped {
            return Err(MonitorError::SessionStopped);
        }

        self.log.clear();
        self.state = MonitoringState::default();
        self.phase = SessionPhase::Active;
        self.outstanding = None;
        let discarded = self.bridge.discard_pending();

        self.store.clear_memory();
        self.feed.clear();
        self.board.reset();

        info!(session_id = %self.session_id, discarded, "Monitoring session reset");

        self.store.clear_today()?;
        Ok(())
    }

    /// Write the in-memory alerts to a report
    ///
    /// With no destination, a timestamped file is created in the configured
    /// export directory.
    pub fn export(&self, destination: Option<&Path>) -> Result<(PathBuf, usize)> {
        let exported = match destination {
            Some(path) => (path.to_path_buf(), self.store.export(path)?),
            None => self.store.export_to_dir(&self.config.export_dir)?,
        };
        Ok(exported)
    }

    /// End the session; irreversible
    pub fn stop(&mut self) {
        if self.phase == SessionPhase::Stopped {
            return;
        }
        self.bridge.stop();
        self.outstanding = None;
        self.log.clear();
        self.phase = SessionPhase::Stopped;
        info!(session_id = %self.session_id, "Monitoring session stopped");
    }

    pub fn snapshot(&self) -> ViewerSnapshot {
        ViewerSnapshot {
            session_id: self.session_id,
            phase: self.phase,
            active: self.state.active,
            message_count: self.log.len(),
            statuses: self.board.snapshot(),
            alerts: self.store.alerts().to_vec(),
            feed: self.feed.clone(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn state(&self) -> MonitoringState {
        self.state
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn conversation(&self) -> &ConversationLog {
        &self.log
    }

    pub fn alerts(&self) -> &[MonitoringAlert] {
        self.store.alerts()
    }

    /// Alerts shown to the viewer, newest first
    pub fn feed(&self) -> &[MonitoringAlert] {
        &self.feed
    }

    pub fn status(&self, party: &str) -> Option<&PartyStatus> {
        self.board.get(party)
    }

    /// Analysis dispatched and not yet applied
    pub fn outstanding(&self) -> Option<&DispatchHandle> {
        self.outstanding.as_ref()
    }
}

impl Drop for MonitoringController {
    fn drop(&mut self) {
        self.stop();
    }
}
