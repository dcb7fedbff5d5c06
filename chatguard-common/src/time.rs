//! Timestamp utilities
//!
//! Alerts carry second-precision local timestamps and are partitioned by the
//! local calendar date. The clock is injectable so partition rollover can be
//! exercised without waiting for midnight.

use chrono::{DateTime, Local, NaiveDate};
use std::sync::Mutex;

/// Display format for alert timestamps
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Source of wall-clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;

    /// Local calendar date used as the partition key
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Wall clock in the process's local zone
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Manually driven clock for tests and replay tooling
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Local>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Local>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Move the clock to a new instant
    pub fn set(&self, now: DateTime<Local>) {
        *self.now.lock().unwrap_or_else(|p| p.into_inner()) = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Format a timestamp with second precision (`2024-03-01 14:05:09`)
pub fn format_timestamp(at: &DateTime<Local>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Partition key for a calendar date (`20240301`)
pub fn partition_key(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Stamp used in export file names (`20240301_140509`)
pub fn export_stamp(at: &DateTime<Local>) -> String {
    at.format("%Y%m%d_%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(y, m, d, h, min, s)
            .single()
            .unwrap()
    }

    #[test]
    fn test_format_timestamp_second_precision() {
        let ts = at(2024, 3, 1, 14, 5, 9);
        assert_eq!(format_timestamp(&ts), "2024-03-01 14:05:09");
    }

    #[test]
    fn test_partition_key_is_compact_date() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(partition_key(date), "20240301");
    }

    #[test]
    fn test_export_stamp() {
        let ts = at(2024, 12, 31, 23, 59, 58);
        assert_eq!(export_stamp(&ts), "20241231_235958");
    }

    #[test]
    fn test_fixed_clock_can_advance() {
        let clock = FixedClock::new(at(2024, 3, 1, 23, 59, 0));
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());

        clock.set(at(2024, 3, 2, 0, 1, 0));
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
    }

    #[test]
    fn test_system_clock_is_recent() {
        // After 2000-01-01 and before 2100-01-01
        let ts = SystemClock.now().timestamp();
        assert!(ts > 946_684_800);
        assert!(ts < 4_102_444_800);
    }
}
