//! Grouped change detection
//!
//! Events are clustered by a composite key built from configured field
//! lists. Each cycle's per-group latest event time is compared with the
//! previous cycle's to decide whether anything new is worth reporting.

use std::collections::HashMap;
use std::fmt;

use crate::rules::Event;

/// Composite group key, one component per grouping dimension
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey(Vec<String>);

impl GroupKey {
    pub fn new(components: Vec<String>) -> Self {
        Self(components)
    }

    pub fn components(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(" "))
    }
}

/// Latest event time per group
pub type GroupSnapshot = HashMap<GroupKey, i64>;

/// Events of one cycle clustered by key
#[derive(Debug, Default)]
pub struct Grouping<'e> {
    pub snapshot: GroupSnapshot,
    pub members: HashMap<GroupKey, Vec<&'e Event>>,
}

impl Grouping<'_> {
    pub fn len(&self) -> usize {
        self.snapshot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }
}

/// Key of `event` for the given dimensions.
///
/// Each dimension is an ordered list of candidate paths; the first one
/// present on the event supplies the component, otherwise it reads
/// `unknown <first candidate>`.
pub fn group_key(event: &Event, group_keys: &[Vec<String>]) -> GroupKey {
    let components = group_keys
        .iter()
        .map(|candidates| {
            candidates
                .iter()
                .find_map(|path| event.value_string(path))
                .unwrap_or_else(|| match candidates.first() {
                    Some(first) => format!("unknown {}", first),
                    None => "unknown".to_string(),
                })
        })
        .collect();
    GroupKey(components)
}

/// Cluster the valid events; invalid ones are left out entirely.
pub fn group_events<'e>(events: &'e [Event], group_keys: &[Vec<String>]) -> Grouping<'e> {
    let mut grouping = Grouping::default();

    for event in events.iter().filter(|e| e.valid) {
        let key = group_key(event, group_keys);

        let latest = grouping.snapshot.entry(key.clone()).or_insert(event.time);
        if *latest < event.time {
            *latest = event.time;
        }
        grouping.members.entry(key).or_default().push(event);
    }

    grouping
}

/// Whether `current` holds a group that is new or has a different latest
/// time than in `previous`.
pub fn has_changed(previous: &GroupSnapshot, current: &GroupSnapshot) -> bool {
    if current.len() > previous.len() {
        return true;
    }
    current
        .iter()
        .any(|(key, time)| previous.get(key) != Some(time))
}

/// Remembers the previous cycle's snapshot
#[derive(Debug, Default)]
pub struct ChangeDetector {
    last: GroupSnapshot,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> &GroupSnapshot {
        &self.last
    }

    /// Compare `current` with the stored snapshot, then store `current`
    /// whatever the outcome.
    pub fn check_and_replace(&mut self, current: GroupSnapshot) -> bool {
        let changed = has_changed(&self.last, &current);
        self.last = current;
        changed
    }
}

/// Render groups oldest-changed first.
///
/// Each group shows its key, member count and the `show_keys` of its most
/// recent event, with `-` for absent fields.
pub fn render_report(grouping: &Grouping<'_>, show_keys: &[String]) -> String {
    let mut order: Vec<(&GroupKey, i64)> = grouping
        .snapshot
        .iter()
        .map(|(key, time)| (key, *time))
        .collect();
    order.sort_by(|(ka, ta), (kb, tb)| ta.cmp(tb).then_with(|| ka.cmp(kb)));

    let mut report = String::new();
    for (idx, (key, _)) in order.into_iter().enumerate() {
        let members = grouping.members.get(key).map(Vec::as_slice).unwrap_or(&[]);
        if idx > 0 {
            report.push('\n');
        }
        report.push_str(&format!("{} errors {}\n", key, members.len()));

        let latest = members.iter().rev().max_by_key(|e| e.time);
        for show_key in show_keys {
            match latest.and_then(|e| e.value_string(show_key)) {
                Some(value) => report.push_str(&format!("{}: {}\n", show_key, value.trim())),
                None => report.push_str(&format!("{} -\n", show_key)),
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Record;
    use serde_json::json;

    fn event(time: i64, doc: serde_json::Value) -> Event {
        Event {
            rule_id: "r".to_string(),
            rule_name: "r".to_string(),
            level: 0,
            time,
            valid: true,
            record: Record::new(doc),
        }
    }

    fn keys(dims: &[&[&str]]) -> Vec<Vec<String>> {
        dims.iter()
            .map(|d| d.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    fn snapshot(entries: &[(&[&str], i64)]) -> GroupSnapshot {
        entries
            .iter()
            .map(|(k, t)| (GroupKey::new(k.iter().map(|s| s.to_string()).collect()), *t))
            .collect()
    }

    #[test]
    fn test_group_key_fallback() {
        let dims = keys(&[&["app", "service"], &["level"]]);

        let e = event(1, json!({ "app": "api", "service": "ignored", "level": "error" }));
        assert_eq!(group_key(&e, &dims).components(), &["api", "error"]);

        let e = event(1, json!({ "service": "billing" }));
        assert_eq!(group_key(&e, &dims).components(), &["billing", "unknown level"]);

        let e = event(1, json!({}));
        assert_eq!(group_key(&e, &dims).components(), &["unknown app", "unknown level"]);
    }

    #[test]
    fn test_group_key_display() {
        let key = GroupKey::new(vec!["api".to_string(), "error".to_string()]);
        assert_eq!(key.to_string(), "[api error]");
    }

    #[test]
    fn test_group_events_tracks_latest_time() {
        let dims = keys(&[&["app"]]);
        let mut invalid = event(99, json!({ "app": "ghost" }));
        invalid.valid = false;
        let events = vec![
            event(30, json!({ "app": "api" })),
            event(10, json!({ "app": "api" })),
            event(20, json!({ "app": "worker" })),
            invalid,
        ];

        let grouping = group_events(&events, &dims);
        assert_eq!(grouping.len(), 2);
        assert_eq!(grouping.snapshot, snapshot(&[(&["api"], 30), (&["worker"], 20)]));
        assert_eq!(grouping.members[&GroupKey::new(vec!["api".to_string()])].len(), 2);
    }

    #[test]
    fn test_has_changed() {
        let previous = snapshot(&[(&["a"], 10), (&["b"], 20)]);

        assert!(!has_changed(&previous, &snapshot(&[(&["a"], 10), (&["b"], 20)])));
        assert!(!has_changed(&previous, &snapshot(&[(&["a"], 10)])));
        assert!(has_changed(&previous, &snapshot(&[(&["a"], 10), (&["b"], 21)])));
        assert!(has_changed(&previous, &snapshot(&[(&["a"], 10), (&["c"], 20)])));
        assert!(has_changed(
            &previous,
            &snapshot(&[(&["a"], 10), (&["b"], 20), (&["c"], 5)])
        ));
        assert!(has_changed(&GroupSnapshot::new(), &snapshot(&[(&["a"], 1)])));
    }

    #[test]
    fn test_detector_always_stores_latest() {
        let mut detector = ChangeDetector::new();
        let first = snapshot(&[(&["a"], 10)]);
        assert!(detector.check_and_replace(first.clone()));
        assert_eq!(detector.snapshot(), &first);

        assert!(!detector.check_and_replace(first.clone()));
        assert_eq!(detector.snapshot(), &first);

        let shrunk = GroupSnapshot::new();
        assert!(!detector.check_and_replace(shrunk.clone()));
        assert_eq!(detector.snapshot(), &shrunk);
    }

    #[test]
    fn test_render_report() {
        let dims = keys(&[&["app"], &["level"]]);
        let events = vec![
            event(50, json!({ "app": "api", "level": "error", "message": " old " })),
            event(60, json!({ "app": "api", "level": "error", "message": " boom \n" })),
            event(40, json!({ "app": "worker", "level": "fatal" })),
        ];
        let grouping = group_events(&events, &dims);
        let show = vec!["message".to_string(), "host".to_string()];

        let report = render_report(&grouping, &show);
        assert_eq!(
            report,
            "[worker fatal] errors 1\nmessage -\nhost -\n\n[api error] errors 2\nmessage: boom\nhost -\n"
        );
    }
}
