//! Live per-party sentiment status

use crate::alert_store::MonitoringAlert;
use crate::analysis::Sentiment;
use serde::Serialize;
use std::collections::BTreeMap;

/// Severity used by viewers to pick a colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StatusLevel {
    Safe,
    Warning,
    Alert,
}

impl StatusLevel {
    pub fn classify(sentiment: Sentiment, alert_needed: bool) -> Self {
        if alert_needed {
            StatusLevel::Alert
        } else if sentiment == Sentiment::Cautionary {
            StatusLevel::Warning
        } else {
            StatusLevel::Safe
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartyStatus {
    pub sentiment: Sentiment,
    pub alert_needed: bool,
    pub level: StatusLevel,
    /// Timestamp of the alert that last changed this status
    pub updated_at: Option<String>,
}

impl Default for PartyStatus {
    fn default() -> Self {
        Self {
            sentiment: Sentiment::Positive,
            alert_needed: false,
            level: StatusLevel::Safe,
            updated_at: None,
        }
    }
}

/// Mapping from party id to current status
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    parties: BTreeMap<String, PartyStatus>,
}

impl StatusBoard {
    pub fn new<I, S>(parties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            parties: parties
                .into_iter()
                .map(|p| (p.into(), PartyStatus::default()))
                .collect(),
        }
    }

    /// Make sure a party appears on the board
    pub fn register(&mut self, party: &str) {
        self.parties.entry(party.to_string()).or_default();
    }

    pub fn apply(&mut self, alert: &MonitoringAlert) {
        let status = self.parties.entry(alert.party.clone()).or_default();
        status.sentiment = alert.sentiment;
        status.alert_needed = alert.alert_needed;
        status.level = StatusLevel::classify(alert.sentiment, alert.alert_needed);
        status.updated_at = Some(alert.timestamp.clone());
    }

    pub fn get(&self, party: &str) -> Option<&PartyStatus> {
        self.parties.get(party)
    }

    /// Put every known party back to POSITIVE / no alert
    pub fn reset(&mut self) {
        for status in self.parties.values_mut() {
            *status = PartyStatus::default();
        }
    }

    pub fn snapshot(&self) -> BTreeMap<String, PartyStatus> {
        self.parties.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(party: &str, sentiment: Sentiment, alert_needed: bool) -> MonitoringAlert {
        MonitoringAlert {
            timestamp: "2024-03-01 10:00:00".into(),
            party: party.into(),
            sentiment,
            explanation: String::new(),
            alert_needed,
            message_range: "messages 1-3".into(),
        }
    }

    #[test]
    fn test_level_classification() {
        assert_eq!(StatusLevel::classify(Sentiment::Negative, true), StatusLevel::Alert);
        assert_eq!(StatusLevel::classify(Sentiment::Cautionary, true), StatusLevel::Alert);
        assert_eq!(StatusLevel::classify(Sentiment::Cautionary, false), StatusLevel::Warning);
        assert_eq!(StatusLevel::classify(Sentiment::Negative, false), StatusLevel::Safe);
        assert_eq!(StatusLevel::classify(Sentiment::Positive, false), StatusLevel::Safe);
    }

    #[test]
    fn test_seeded_parties_start_positive() {
        let board = StatusBoard::new(["Alice", "Bob"]);
        let alice = board.get("Alice").unwrap();
        assert_eq!(alice.sentiment, Sentiment::Positive);
        assert_eq!(alice.level, StatusLevel::Safe);
        assert!(board.get("Carol").is_none());
    }

    #[test]
    fn test_apply_updates_only_that_party() {
        let mut board = StatusBoard::new(["Alice", "Bob"]);
        board.apply(&alert("Bob", Sentiment::Negative, true));
        assert_eq!(board.get("Bob").unwrap().level, StatusLevel::Alert);
        assert_eq!(board.get("Alice").unwrap().level, StatusLevel::Safe);
    }

    #[test]
    fn test_apply_registers_unknown_party() {
        let mut board = StatusBoard::new(Vec::<String>::new());
        board.apply(&alert("Carol", Sentiment::Cautionary, false));
        assert_eq!(board.get("Carol").unwrap().level, StatusLevel::Warning);
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut board = StatusBoard::new(["Alice"]);
        board.apply(&alert("Alice", Sentiment::Negative, true));
        board.reset();
        assert_eq!(board.get("Alice").unwrap(), &PartyStatus::default());
    }
}
