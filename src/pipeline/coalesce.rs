use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::models::Event;

const KEY_MAX_CHARS: usize = 80;

/// Lower-cased, whitespace-collapsed, truncated identifying label. Events with
/// nothing to identify them have no key and are never merged.
pub fn normalization_key(event: &Event) -> Option<String> {
    let label = event.identifying_label()?;
    let collapsed = label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    Some(collapsed.chars().take(KEY_MAX_CHARS).collect())
}

/// Collapse bursts of `input`/`change` events on the same field.
///
/// An edit whose key matches an earlier output entry, and which lands within
/// `window_ms` of the event that opened that entry, replaces the entry in
/// place and bumps `merged_count`. Everything else is emitted as-is.
pub fn coalesce_inputs(events: &[Event], window_ms: u64) -> Vec<Event> {
    let mut output: Vec<Event> = Vec::with_capacity(events.len());
    // key -> (index in output, timestamp of the event that opened the entry)
    let mut latest: HashMap<String, (usize, DateTime<Utc>)> = HashMap::new();

    for event in events {
        if !event.detail.is_field_edit() {
            output.push(event.clone());
            continue;
        }

        let Some(key) = normalization_key(event) else {
            output.push(event.clone());
            continue;
        };

        match latest.get(&key) {
            Some(&(index, opened_at)) if within_window(opened_at, event.timestamp, window_ms) => {
                let prior = &output[index];
                let mut merged = event.clone();
                merged.merged_count = prior.merged_count.saturating_add(1);
                if !merged.screenshot.has_image() && prior.screenshot.has_image() {
                    merged.screenshot = prior.screenshot.clone();
                }
                output[index] = merged;
            }
            _ => {
                latest.insert(key, (output.len(), event.timestamp));
                output.push(event.clone());
            }
        }
    }

    output
}

fn within_window(opened_at: DateTime<Utc>, at: DateTime<Utc>, window_ms: u64) -> bool {
    (at - opened_at).num_milliseconds().unsigned_abs() <= window_ms
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventDetail, RawEvent, Screenshot};
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn edit(label: &str, value: &str, offset_ms: i64) -> Event {
        let raw = RawEvent {
            label: Some(label.into()),
            timestamp: Some(base_time() + Duration::milliseconds(offset_ms)),
            ..RawEvent::new(EventDetail::Input {
                value: Some(value.into()),
            })
        };
        raw.into_event("s1".into(), Screenshot::default(), base_time())
    }

    fn click(label: &str, offset_ms: i64) -> Event {
        let raw = RawEvent {
            label: Some(label.into()),
            timestamp: Some(base_time() + Duration::milliseconds(offset_ms)),
            ..RawEvent::new(EventDetail::Click { action: None })
        };
        raw.into_event("s1".into(), Screenshot::default(), base_time())
    }

    #[test]
    fn key_is_normalized_and_truncated() {
        let event = edit("  Email \n  Address ", "x", 0);
        assert_eq!(normalization_key(&event).as_deref(), Some("email address"));

        let long = edit(&"A".repeat(200), "x", 0);
        assert_eq!(normalization_key(&long).unwrap().len(), KEY_MAX_CHARS);
    }

    #[test]
    fn burst_within_window_collapses() {
        let events = vec![
            edit("Email", "j", 0),
            edit("email", "ja", 300),
            edit("EMAIL ", "jane", 900),
            edit("Email", "jane@", 2000),
        ];

        let out = coalesce_inputs(&events, 1200);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].merged_count, 3);
        assert_eq!(
            out[0].detail,
            EventDetail::Input {
                value: Some("jane".into())
            }
        );
        assert_eq!(out[1].merged_count, 1);
    }

    #[test]
    fn other_kinds_pass_through_without_breaking_runs() {
        let events = vec![
            edit("Name", "a", 0),
            click("Next", 100),
            edit("Name", "ab", 200),
        ];

        let out = coalesce_inputs(&events, 1200);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].merged_count, 2);
        assert_eq!(out[1].detail.kind(), "click");
    }

    #[test]
    fn different_fields_stay_separate() {
        let events = vec![edit("Name", "a", 0), edit("City", "b", 10), edit("Name", "ab", 20)];

        let out = coalesce_inputs(&events, 1200);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].merged_count, 2);
        assert_eq!(out[1].label.as_deref(), Some("City"));
    }

    #[test]
    fn unlabeled_edits_are_never_merged() {
        let mut first = edit("x", "a", 0);
        first.label = None;
        let mut second = edit("x", "b", 10);
        second.label = None;

        let out = coalesce_inputs(&[first, second], 1200);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn merged_entry_keeps_earlier_image() {
        let mut first = edit("Name", "a", 0);
        first.screenshot = Screenshot::captured(Arc::new(vec![7]), "h".into());
        let second = edit("Name", "ab", 50);

        let out = coalesce_inputs(&[first, second], 1200);
        assert_eq!(out.len(), 1);
        assert!(out[0].screenshot.has_image());
    }
}
