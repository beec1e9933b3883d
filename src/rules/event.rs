use crate::data::Record;

/// A record that matched a rule
#[derive(Debug, Clone)]
pub struct Event {
    pub rule_id: String,
    pub rule_name: String,
    pub level: i32,
    /// Event time in epoch milliseconds (0 when `valid` is false)
    pub time: i64,
    /// False when no configured time key could be read from the record
    pub valid: bool,
    pub record: Record,
}

impl Event {
    pub fn value_string(&self, path: &str) -> Option<String> {
        self.record.get_string(path)
    }
}
