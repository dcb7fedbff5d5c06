//! Window selector
//!
//! Decides, after each appended message, whether the conversation should be
//! submitted for analysis and which messages make up the window.
//!
//! Trigger policy:
//! - the conversation first reaches `window_size` messages and nothing has
//!   been analyzed yet, or
//! - at least `window_size` messages have arrived since the last completed
//!   analysis.
//!
//! The window is the last `window_size` messages (or all of them when the
//! conversation is shorter). This bounds classifier traffic to roughly one
//! call per `window_size` messages while always analyzing the first full
//! window.

use crate::conversation::Message;
use std::fmt;
use std::sync::Arc;

/// Inclusive 1-based message range covered by a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowRange {
    pub start: usize,
    pub end: usize,
}

impl WindowRange {
    /// Range of the last `window_size` of `total_messages` messages
    pub fn for_total(total_messages: usize, window_size: usize) -> Self {
        let start = (total_messages + 1).saturating_sub(window_size).max(1);
        Self {
            start,
            end: total_messages,
        }
    }

    /// Human-readable description stored with alerts (`messages 4-6`)
    pub fn describe(&self) -> String {
        format!("messages {}", self)
    }

    /// 0-based index of the last message in the range
    pub fn last_index(&self) -> Option<usize> {
        self.end.checked_sub(1)
    }
}

impl fmt::Display for WindowRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Read-only snapshot of the most recent messages
#[derive(Debug, Clone)]
pub struct AnalysisWindow {
    messages: Vec<Arc<Message>>,
    range: WindowRange,
}

impl AnalysisWindow {
    pub fn messages(&self) -> &[Arc<Message>] {
        &self.messages
    }

    pub fn range(&self) -> WindowRange {
        self.range
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Outcome of evaluating the trigger policy
#[derive(Debug, Clone)]
pub struct WindowDecision {
    pub trigger: bool,
    pub window: AnalysisWindow,
}

/// Whether the trigger policy fires for the given counters
pub fn should_trigger(
    total_messages: usize,
    window_size: usize,
    last_analyzed_index: Option<usize>,
    pending_since_last: usize,
) -> bool {
    if total_messages == window_size && last_analyzed_index.is_none() {
        return true;
    }
    pending_since_last >= window_size
}

/// Extract the window for the current conversation
pub fn extract_window(messages: &[Arc<Message>], window_size: usize) -> AnalysisWindow {
    let total = messages.len();
    let skip = total.saturating_sub(window_size);
    AnalysisWindow {
        messages: messages[skip..].to_vec(),
        range: WindowRange::for_total(total, window_size),
    }
}

/// Evaluate the trigger policy and extract the window
///
/// Total over its domain; `window_size >= 1` is guaranteed by configuration
/// validation.
pub fn decide(
    messages: &[Arc<Message>],
    window_size: usize,
    last_analyzed_index: Option<usize>,
    pending_since_last: usize,
) -> WindowDecision {
    WindowDecision {
        trigger: should_trigger(
            messages.len(),
            window_size,
            last_analyzed_index,
            pending_since_last,
        ),
        window: extract_window(messages, window_size),
    }
}
