use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::db::PersistedRecord;
use crate::models::{Event, RawEvent, RecordingState, ReportHistory, Session, TargetRef};
use crate::pipeline::{compact, freeze_into, CompactionOutcome, CompactionPolicy};
use crate::redaction::Redactor;
use crate::settings::{CaptureMode, Settings};

/// Why an inbound event or note was not buffered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    Ignored,
    NoActiveTarget,
    NonActiveTarget,
    StateChanged,
    InvalidEvent,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum IdleState {
    Active,
    Idle,
    Locked,
}

/// A record to persist, tagged with the context revision it was taken at.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub revision: u64,
    pub record: PersistedRecord,
}

/// All mutable recorder state. Every component operation goes through this
/// value; nothing reads ambient state.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub session: Session,
    pub live_events: Vec<Event>,
    pub settings: Settings,
    pub reports: ReportHistory,
    /// Designated capture surface for the current session.
    pub active_target: Option<TargetRef>,
    /// Set when the session was paused by the idle signal rather than the user.
    pub auto_paused: bool,
    pub compaction: CompactionPolicy,
    redactor: Redactor,
    revision: u64,
}

impl PipelineContext {
    pub fn new(settings: Settings) -> Self {
        Self {
            session: Session::default(),
            live_events: Vec::new(),
            redactor: Redactor::new(&settings.redact_rules),
            settings,
            reports: ReportHistory::default(),
            active_target: None,
            auto_paused: false,
            compaction: CompactionPolicy::default(),
            revision: 0,
        }
    }

    /// Rebuild the context from a persisted record, repairing anything that
    /// would break the session invariants.
    pub fn from_record(record: PersistedRecord) -> Self {
        let PersistedRecord {
            recording,
            paused,
            mut live_events,
            settings,
            mut reports,
            session_id,
        } = record;

        let mut context = Self::new(settings);

        let session = match (recording, session_id) {
            (true, Some(id)) => Session {
                id: Some(id),
                state: if paused {
                    RecordingState::Paused
                } else {
                    RecordingState::Recording
                },
            },
            (true, None) => {
                warn!("persisted record is recording without a session id; resetting to idle");
                Session::default()
            }
            (false, _) => Session::default(),
        };

        match session.id.as_deref() {
            Some(id) => live_events.retain(|event| event.session_id == id),
            None => live_events.clear(),
        }
        reports.enforce_capacity();

        context.session = session;
        context.live_events = live_events;
        context.reports = reports;
        context
    }

    pub fn to_record(&self) -> PersistedRecord {
        PersistedRecord {
            recording: self.session.is_active(),
            paused: self.session.is_paused(),
            live_events: self.live_events.clone(),
            settings: self.settings.clone(),
            reports: self.reports.clone(),
            session_id: self.session.id.clone(),
        }
    }

    pub fn snapshot(&mut self) -> Snapshot {
        self.revision += 1;
        Snapshot {
            revision: self.revision,
            record: self.to_record(),
        }
    }

    pub fn begin_session(&mut self, session_id: String, target: Option<TargetRef>) {
        self.live_events.clear();
        self.session = Session {
            id: Some(session_id),
            state: RecordingState::Recording,
        };
        self.active_target = target;
        self.auto_paused = false;
    }

    /// Freeze a report from the live buffer (if any), then return to idle.
    /// Returns whether a report was saved.
    pub fn end_session(&mut self) -> bool {
        let saved = match self.session.id.as_deref() {
            Some(session_id) => freeze_into(
                &mut self.reports,
                &self.live_events,
                session_id,
                &self.settings,
            ),
            None => false,
        };

        self.live_events.clear();
        self.session = Session::default();
        self.active_target = None;
        self.auto_paused = false;
        saved
    }

    pub fn pause(&mut self) -> bool {
        if !self.session.is_recording() {
            return false;
        }
        self.session.state = RecordingState::Paused;
        true
    }

    pub fn resume(&mut self) -> bool {
        if !self.session.is_paused() {
            return false;
        }
        self.session.state = RecordingState::Recording;
        self.auto_paused = false;
        true
    }

    pub fn apply_settings(&mut self, settings: Settings) {
        self.redactor = Redactor::new(&settings.redact_rules);
        debug!(
            "redaction rules active: {}",
            self.redactor.rule_names().collect::<Vec<_>>().join(", ")
        );
        self.settings = settings;
    }

    /// Checks that do not depend on the screenshot: session state, payload
    /// shape, capture mode and target restriction.
    pub fn admit(&self, raw: &RawEvent) -> Result<(), RejectReason> {
        if !self.session.is_recording() {
            return Err(RejectReason::Ignored);
        }
        if raw.validate().is_err() {
            return Err(RejectReason::InvalidEvent);
        }
        if self.settings.capture_mode == CaptureMode::Clicks && raw.detail.is_field_edit() {
            return Err(RejectReason::Ignored);
        }
        if self.settings.active_tab_only
            && (self.active_target.is_none() || raw.target != self.active_target)
        {
            return Err(RejectReason::NonActiveTarget);
        }
        Ok(())
    }

    pub fn sanitize(&self, raw: RawEvent) -> RawEvent {
        if self.settings.redact_enabled {
            raw.redacted(&self.redactor)
        } else {
            raw
        }
    }

    pub fn capture_target_for(&self, raw: &RawEvent) -> Option<TargetRef> {
        if self.settings.active_tab_only {
            self.active_target.clone()
        } else {
            raw.target.clone().or_else(|| self.active_target.clone())
        }
    }

    /// Hash of the most recent buffered event that still carries its image.
    pub fn last_screenshot_hash(&self) -> Option<&str> {
        self.live_events
            .iter()
            .rev()
            .find(|event| event.screenshot.has_image())
            .and_then(|event| event.screenshot.hash.as_deref())
    }

    pub fn append(&mut self, event: Event) -> CompactionOutcome {
        self.live_events.push(event);
        let outcome = compact(&mut self.live_events, &self.compaction);
        if outcome.stripped > 0 {
            info!(
                "compacted live buffer: stripped {} screenshots, {} remain across {} events",
                outcome.stripped,
                outcome.screenshots_remaining,
                self.live_events.len()
            );
        }
        outcome
    }
}

impl Default for PipelineContext {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}
