use chrono::Utc;
use uuid::Uuid;

use crate::models::{Event, Report, ReportHistory};
use crate::settings::Settings;

use super::coalesce::coalesce_inputs;

/// Snapshot the live buffer into a report. Returns `None` for an empty
/// buffer. `live_events` is not modified.
pub fn freeze(live_events: &[Event], session_id: &str, settings: &Settings) -> Option<Report> {
    if live_events.is_empty() {
        return None;
    }

    let events = if settings.prune_inputs {
        coalesce_inputs(live_events, settings.prune_window_ms)
    } else {
        live_events.to_vec()
    };

    Some(Report {
        id: Uuid::new_v4().to_string(),
        created_at: Utc::now(),
        session_id: session_id.to_string(),
        settings_at_capture: settings.clone(),
        events,
    })
}

/// Freeze and prepend into `history`. Returns whether a report was produced.
pub fn freeze_into(
    history: &mut ReportHistory,
    live_events: &[Event],
    session_id: &str,
    settings: &Settings,
) -> bool {
    match freeze(live_events, session_id, settings) {
        Some(report) => {
            history.push(report);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventDetail, RawEvent, Screenshot, REPORT_HISTORY_CAPACITY};

    fn input(label: &str) -> Event {
        let raw = RawEvent {
            label: Some(label.into()),
            ..RawEvent::new(EventDetail::Input { value: None })
        };
        raw.into_event("s1".into(), Screenshot::default(), Utc::now())
    }

    #[test]
    fn empty_buffer_yields_nothing() {
        let mut history = ReportHistory::default();
        assert!(freeze(&[], "s1", &Settings::default()).is_none());
        assert!(!freeze_into(&mut history, &[], "s1", &Settings::default()));
        assert!(history.is_empty());
    }

    #[test]
    fn freeze_coalesces_a_copy() {
        let live = vec![input("Name"), input("Name"), input("Name")];
        let report = freeze(&live, "s1", &Settings::default()).unwrap();

        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].merged_count, 3);
        assert_eq!(live.len(), 3);
        assert_eq!(report.session_id, "s1");
    }

    #[test]
    fn pruning_can_be_disabled() {
        let settings = Settings {
            prune_inputs: false,
            ..Settings::default()
        };
        let live = vec![input("Name"), input("Name")];
        let report = freeze(&live, "s1", &settings).unwrap();
        assert_eq!(report.events.len(), 2);
        assert!(!report.settings_at_capture.prune_inputs);
    }

    #[test]
    fn history_keeps_three_most_recent_first() {
        let mut history = ReportHistory::default();
        for index in 0..5 {
            let session_id = format!("s{index}");
            assert!(freeze_into(
                &mut history,
                &[input("Name")],
                &session_id,
                &Settings::default()
            ));
        }

        assert_eq!(history.len(), REPORT_HISTORY_CAPACITY);
        let order: Vec<_> = history.iter().map(|r| r.session_id.as_str()).collect();
        assert_eq!(order, vec!["s4", "s3", "s2"]);
    }
}
