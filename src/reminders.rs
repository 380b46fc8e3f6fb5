//! Daily "time to record" reminders.
//!
//! A polling loop compares each user's `reminder_time` with the local clock
//! and sends at most one reminder per user per day.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use thiserror::Error;
use tokio::time;
use tracing::{debug, info, warn};

use crate::adapters::TelegramClient;
use crate::core::UserConfigStore;

pub const REMINDER_TEXT: &str =
    "📝 Time to record your daily diary entry! Send me a voice note when you're ready.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid reminder time '{0}', expected HH:MM in 24-hour format")]
pub struct InvalidReminderTime(pub String);

/// Parse `H:MM` or `HH:MM` (24h)
pub fn parse_reminder_time(input: &str) -> Result<NaiveTime, InvalidReminderTime> {
    let invalid = || InvalidReminderTime(input.to_string());
    let (hour, minute) = input.trim().split_once(':').ok_or_else(invalid)?;

    let field = |s: &str| -> Option<u32> {
        if s.is_empty() || s.len() > 2 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        s.parse().ok()
    };

    let (hour, minute) = field(hour).zip(field(minute)).ok_or_else(invalid)?;
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(invalid)
}

/// Validate and zero-pad a user-supplied time, e.g. `7:05` → `07:05`
pub fn normalize_reminder_time(input: &str) -> Result<String, InvalidReminderTime> {
    parse_reminder_time(input).map(|t| t.format("%H:%M").to_string())
}

/// Remembers who was already reminded today
#[derive(Debug, Default)]
pub struct ReminderTracker {
    last_sent: HashMap<i64, NaiveDate>,
}

impl ReminderTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Users whose reminder matches `now` to the minute and who have not
    /// been reminded on `now`'s date. Marks them as reminded.
    pub fn due(&mut self, reminders: &[(i64, String)], now: NaiveDateTime) -> Vec<i64> {
        let today = now.date();
        let mut due = Vec::new();

        for (user_id, raw) in reminders {
            let at = match parse_reminder_time(raw) {
                Ok(at) => at,
                Err(e) => {
                    warn!(user_id, error = %e, "Skipping unparseable reminder");
                    continue;
                }
            };

            if at.hour() != now.hour() || at.minute() != now.minute() {
                continue;
            }
            if self.last_sent.get(user_id) == Some(&today) {
                continue;
            }

            self.last_sent.insert(*user_id, today);
            due.push(*user_id);
        }

        due
    }
}

/// Delivery channel for reminders
#[async_trait]
pub trait ReminderSink: Send + Sync {
    async fn send_reminder(&self, chat_id: i64, text: &str) -> Result<()>;
}

#[async_trait]
impl ReminderSink for TelegramClient {
    async fn send_reminder(&self, chat_id: i64, text: &str) -> Result<()> {
        self.send_message(chat_id, text, None).await.map(|_| ())
    }
}

/// Polls the user store and sends due reminders
pub struct ReminderScheduler {
    users: Arc<UserConfigStore>,
    sink: Arc<dyn ReminderSink>,
    poll: Duration,
    tracker: ReminderTracker,
}

impl ReminderScheduler {
    pub fn new(users: Arc<UserConfigStore>, sink: Arc<dyn ReminderSink>, poll: Duration) -> Self {
        Self {
            users,
            sink,
            poll,
            tracker: ReminderTracker::new(),
        }
    }

    /// Run forever
    pub async fn run(mut self) -> Result<()> {
        let mut interval = time::interval(self.poll);
        info!(poll_secs = self.poll.as_secs(), "Reminder scheduler started");

        loop {
            interval.tick().await;
            self.tick(Local::now().naive_local()).await;
        }
    }

    /// One poll at `now`. Returns the number of reminders sent.
    pub async fn tick(&mut self, now: NaiveDateTime) -> usize {
        let reminders = match self.users.users_with_reminders() {
            Ok(reminders) => reminders,
            Err(e) => {
                warn!(error = %e, "Reminder query failed");
                return 0;
            }
        };

        let mut sent = 0;
        for user_id in self.tracker.due(&reminders, now) {
            match self.sink.send_reminder(user_id, REMINDER_TEXT).await {
                Ok(()) => {
                    debug!(user_id, "Reminder sent");
                    sent += 1;
                }
                Err(e) => warn!(user_id, error = %format!("{:#}", e), "Failed to send reminder"),
            }
        }
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn at(date: (i32, u32, u32), h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(date.0, date.1, date.2)
            .unwrap()
            .and_hms_opt(h, m, 17)
            .unwrap()
    }

    #[test]
    fn test_parse_valid_times() {
        assert_eq!(normalize_reminder_time("07:30").unwrap(), "07:30");
        assert_eq!(normalize_reminder_time("7:05").unwrap(), "07:05");
        assert_eq!(normalize_reminder_time("23:59").unwrap(), "23:59");
        assert_eq!(normalize_reminder_time(" 0:0 ").unwrap(), "00:00");
    }

    #[test]
    fn test_parse_invalid_times() {
        for bad in ["24:00", "12:60", "1230", "ab:cd", "12:", ":30", "-1:30", "123:00", "12:30:00"] {
            assert!(parse_reminder_time(bad).is_err(), "{} should be rejected", bad);
        }
    }

    #[test]
    fn test_due_once_per_day() {
        let mut tracker = ReminderTracker::new();
        let reminders = vec![(1, "07:30".to_string()), (2, "08:00".to_string())];

        assert_eq!(tracker.due(&reminders, at((2025, 6, 1), 7, 29)), Vec::<i64>::new());
        assert_eq!(tracker.due(&reminders, at((2025, 6, 1), 7, 30)), vec![1]);
        assert_eq!(tracker.due(&reminders, at((2025, 6, 1), 7, 30)), Vec::<i64>::new());
        assert_eq!(tracker.due(&reminders, at((2025, 6, 1), 8, 0)), vec![2]);
        assert_eq!(tracker.due(&reminders, at((2025, 6, 2), 7, 30)), vec![1]);
    }

    #[test]
    fn test_unparseable_reminder_is_skipped() {
        let mut tracker = ReminderTracker::new();
        let reminders = vec![(1, "soon".to_string()), (2, "9:15".to_string())];
        assert_eq!(tracker.due(&reminders, at((2025, 6, 1), 9, 15)), vec![2]);
    }

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<(i64, String)>>);

    #[async_trait]
    impl ReminderSink for RecordingSink {
        async fn send_reminder(&self, chat_id: i64, text: &str) -> Result<()> {
            self.0.lock().unwrap().push((chat_id, text.to_string()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_tick_sends_to_due_users() {
        let temp = TempDir::new().unwrap();
        let users = Arc::new(UserConfigStore::new(temp.path().join("user_config.json")));
        users.set_reminder(42, Some("21:00".to_string())).unwrap();
        users.set_reminder(43, Some("22:00".to_string())).unwrap();

        let sink = Arc::new(RecordingSink::default());
        let mut scheduler = ReminderScheduler::new(users, sink.clone(), Duration::from_secs(30));

        assert_eq!(scheduler.tick(at((2025, 6, 1), 21, 0)).await, 1);
        assert_eq!(scheduler.tick(at((2025, 6, 1), 21, 0)).await, 0);

        let sent = sink.0.lock().unwrap().clone();
        assert_eq!(sent, vec![(42, REMINDER_TEXT.to_string())]);
    }
}
