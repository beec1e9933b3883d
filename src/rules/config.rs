//! Rule definitions

use serde::{Deserialize, Serialize};

/// A rule matched against each record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Unique rule ID
    #[serde(default)]
    pub id: String,
    /// Human-readable name
    #[serde(default)]
    pub name: String,
    /// Regular expression searched for in `field`
    pub content: String,
    /// Record field the pattern is applied to
    #[serde(default = "default_field")]
    pub field: String,
    /// Severity; higher levels are evaluated first
    #[serde(default)]
    pub level: i32,
    /// A record matched by a mutex rule is not offered to later rules
    #[serde(default)]
    pub mutex: bool,
    /// Active window as seconds of the UTC day. `start == end` means always
    #[serde(default)]
    pub start: i64,
    #[serde(default)]
    pub end: i64,
    /// Attempt-count qualifier: with `times > 0`, a match only becomes an
    /// event once `times` matches fall within `duration` seconds
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub times: usize,
}

fn default_field() -> String {
    "message".to_string()
}

impl Rule {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            content: content.into(),
            field: default_field(),
            level: 0,
            mutex: false,
            start: 0,
            end: 0,
            duration: 0,
            times: 0,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }

    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    pub fn with_mutex(mut self, mutex: bool) -> Self {
        self.mutex = mutex;
        self
    }

    /// Restrict the rule to `[start, end)` seconds of the UTC day; the
    /// range may wrap past midnight.
    pub fn with_active_hours(mut self, start: i64, end: i64) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    pub fn with_attempts(mut self, times: usize, duration_secs: i64) -> Self {
        self.times = times;
        self.duration = duration_secs;
        self
    }

    /// Whether the rule applies at `time_ms`
    pub fn is_active_at(&self, time_ms: i64) -> bool {
        if self.start == self.end {
            return true;
        }
        let second_of_day = (time_ms / 1000).rem_euclid(86_400);
        if self.start < self.end {
            self.start <= second_of_day && second_of_day < self.end
        } else {
            second_of_day >= self.start || second_of_day < self.end
        }
    }
}
