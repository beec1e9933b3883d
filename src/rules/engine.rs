//! Rule evaluation
//!
//! [`RuleEngine`] turns fetched records into events. [`PatternEngine`] is the
//! built-in implementation: a regex per rule, evaluated in level order.

use regex::Regex;

use super::config::Rule;
use super::event::Event;
use crate::data::Record;

/// Draws events from records; must be pure for a fixed rule set
pub trait RuleEngine: Send + Sync {
    fn draw(&self, records: &[Record], rules: &[Rule]) -> Result<Vec<Event>, EngineError>;
}

/// Regex rule engine
#[derive(Debug, Clone)]
pub struct PatternEngine {
    /// Candidate paths for the event time; the first readable one wins
    time_keys: Vec<String>,
}

impl PatternEngine {
    pub fn new(time_keys: Vec<String>) -> Self {
        Self { time_keys }
    }

    fn event_time(&self, record: &Record) -> Option<i64> {
        self.time_keys
            .iter()
            .find_map(|key| record.time_millis(key).ok())
    }
}

impl RuleEngine for PatternEngine {
    fn draw(&self, records: &[Record], rules: &[Rule]) -> Result<Vec<Event>, EngineError> {
        let compiled = compile(rules)?;
        let mut events = Vec::new();

        for record in records {
            let time = self.event_time(record);

            for (rule, pattern) in &compiled {
                let active = match time {
                    Some(t) => rule.is_active_at(t),
                    None => rule.start == rule.end,
                };
                if !active {
                    continue;
                }

                let matched = record
                    .get_string(&rule.field)
                    .map(|text| pattern.is_match(&text))
                    .unwrap_or(false);
                if !matched {
                    continue;
                }

                events.push(Event {
                    rule_id: rule.id.clone(),
                    rule_name: rule.name.clone(),
                    level: rule.level,
                    time: time.unwrap_or(0),
                    valid: time.is_some(),
                    record: record.clone(),
                });

                if rule.mutex {
                    break;
                }
            }
        }

        let mut events = apply_attempt_counts(events, rules);
        events.sort_by_key(|e| e.time);
        Ok(events)
    }
}

/// Check every pattern compiles
pub fn validate_rules(rules: &[Rule]) -> Result<(), EngineError> {
    compile(rules).map(|_| ())
}

/// Rules with their patterns, highest level first, then by ID
fn compile(rules: &[Rule]) -> Result<Vec<(&Rule, Regex)>, EngineError> {
    let mut compiled = rules
        .iter()
        .map(|rule| {
            Regex::new(&rule.content)
                .map(|pattern| (rule, pattern))
                .map_err(|source| EngineError::InvalidPattern {
                    rule: rule.id.clone(),
                    source,
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    compiled.sort_by(|(a, _), (b, _)| b.level.cmp(&a.level).then_with(|| a.id.cmp(&b.id)));
    Ok(compiled)
}

/// Drop matches of rules with `times > 0` that are not preceded by enough
/// matches of the same rule within its `duration`.
fn apply_attempt_counts(events: Vec<Event>, rules: &[Rule]) -> Vec<Event> {
    let mut keep = vec![true; events.len()];

    for rule in rules.iter().filter(|r| r.times > 0) {
        let window_ms = rule.duration.max(0).saturating_mul(1000);
        let mut matches: Vec<usize> = Vec::new();

        for (idx, event) in events.iter().enumerate() {
            if event.rule_id != rule.id {
                continue;
            }
            if event.valid {
                matches.push(idx);
            } else {
                keep[idx] = false;
            }
        }
        matches.sort_by_key(|&idx| events[idx].time);

        let mut lo = 0;
        for hi in 0..matches.len() {
            let t = events[matches[hi]].time;
            while events[matches[lo]].time < t.saturating_sub(window_ms) {
                lo += 1;
            }
            keep[matches[hi]] = hi - lo + 1 >= rule.times;
        }
    }

    events
        .into_iter()
        .zip(keep)
        .filter_map(|(event, keep)| keep.then_some(event))
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Rule '{rule}' has an invalid pattern: {source}")]
    InvalidPattern {
        rule: String,
        #[source]
        source: regex::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(ts: i64, message: &str) -> Record {
        Record::new(json!({ "ts": ts, "message": message }))
    }

    fn engine() -> PatternEngine {
        PatternEngine::new(vec!["ts".to_string()])
    }

    #[test]
    fn test_draw_matches_pattern() {
        let records = vec![
            record(1000, "GET /health 200"),
            record(2000, "ERROR db timeout"),
            record(3000, "ERROR disk full"),
        ];
        let rules = vec![Rule::new("err", "ERROR")];

        let events = engine().draw(&records, &rules).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].time, 2000);
        assert!(events.iter().all(|e| e.valid && e.rule_id == "err"));
    }

    #[test]
    fn test_mutex_stops_lower_rules() {
        let records = vec![record(1000, "fatal ERROR")];
        let rules = vec![
            Rule::new("error", "ERROR").with_level(1),
            Rule::new("fatal", "fatal").with_level(5).with_mutex(true),
        ];

        let events = engine().draw(&records, &rules).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].rule_id, "fatal");

        let rules = vec![
            Rule::new("error", "ERROR").with_level(1),
            Rule::new("fatal", "fatal").with_level(5),
        ];
        let events = engine().draw(&records, &rules).unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_missing_time_is_invalid_event() {
        let records = vec![Record::new(json!({ "message": "ERROR no clock" }))];
        let rules = vec![Rule::new("err", "ERROR")];

        let events = engine().draw(&records, &rules).unwrap();
        assert_eq!(events.len(), 1);
        assert!(!events[0].valid);
        assert_eq!(events[0].time, 0);
    }

    #[test]
    fn test_time_key_fallback() {
        let engine = PatternEngine::new(vec!["@timestamp".to_string(), "ts".to_string()]);
        let records = vec![record(4000, "ERROR")];
        let events = engine.draw(&records, &[Rule::new("err", "ERROR")]).unwrap();
        assert_eq!(events[0].time, 4000);
    }

    #[test]
    fn test_active_hours_filter() {
        let rules = vec![Rule::new("night", "ERROR").with_active_hours(0, 3600)];
        let records = vec![record(1000, "ERROR early"), record(7200 * 1000, "ERROR late")];

        let events = engine().draw(&records, &rules).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].time, 1000);
    }

    #[test]
    fn test_attempt_count_qualifier() {
        // three matches within 10s are needed
        let rules = vec![Rule::new("retry", "retry").with_attempts(3, 10)];
        let records = vec![
            record(0, "retry 1"),
            record(5_000, "retry 2"),
            record(9_000, "retry 3"),
            record(60_000, "retry 4"),
        ];

        let events = engine().draw(&records, &rules).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].time, 9_000);
    }

    #[test]
    fn test_attempt_window_saturates() {
        let rules = vec![Rule::new("retry", "retry").with_attempts(2, i64::MAX)];
        let records = vec![record(0, "retry 1"), record(i64::MAX / 2, "retry 2")];

        let events = engine().draw(&records, &rules).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].time, i64::MAX / 2);
    }

    #[test]
    fn test_invalid_pattern() {
        let rules = vec![Rule::new("broken", "(unclosed")];
        let err = engine().draw(&[], &rules).unwrap_err();
        assert!(matches!(err, EngineError::InvalidPattern { ref rule, .. } if rule == "broken"));
        assert!(validate_rules(&rules).is_err());
    }
}
