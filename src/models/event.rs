//! Event data model.
//!
//! An `Event` is a tagged union keyed by `kind` with a shared base shape.
//! `RawEvent` is the unvalidated inbound form; it becomes an `Event` once it
//! has been sanitized, screenshotted and stamped with the owning session id.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::redaction::Redactor;

pub type ImageBytes = Arc<Vec<u8>>;

/// Identity of the surface (tab) and window an event originated from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRef {
    pub tab_id: i64,
    pub window_id: i64,
}

impl TargetRef {
    pub fn new(tab_id: i64, window_id: i64) -> Self {
        Self { tab_id, window_id }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    CaptureFailed,
    NoActiveTarget,
    Unchanged,
    CompactedMemory,
    /// The session ended while the capture was pending.
    Cancelled,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Screenshot {
    #[serde(default, with = "image_base64")]
    pub image: Option<ImageBytes>,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub skipped: bool,
    #[serde(default)]
    pub skip_reason: Option<SkipReason>,
}

impl Screenshot {
    pub fn captured(image: ImageBytes, hash: String) -> Self {
        Self {
            image: Some(image),
            hash: Some(hash),
            skipped: false,
            skip_reason: None,
        }
    }

    pub fn skipped(hash: Option<String>, reason: SkipReason) -> Self {
        Self {
            image: None,
            hash,
            skipped: true,
            skip_reason: Some(reason),
        }
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }

    /// Drop the image payload. The hash is kept so later events can still be
    /// compared against it.
    pub fn strip(&mut self, reason: SkipReason) {
        self.image = None;
        self.skipped = true;
        self.skip_reason = Some(reason);
    }
}

/// Kind-specific part of an event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum EventDetail {
    Click {
        /// Semantic tag supplied by instrumentation, e.g. `login`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        action: Option<String>,
    },
    Input {
        #[serde(default)]
        value: Option<String>,
    },
    Change {
        #[serde(default)]
        value: Option<String>,
    },
    Submit,
    Nav {
        #[serde(default)]
        url: Option<String>,
    },
    Note,
    Outcome {
        outcome: String,
    },
    UiChange,
}

impl EventDetail {
    pub fn kind(&self) -> &'static str {
        match self {
            EventDetail::Click { .. } => "click",
            EventDetail::Input { .. } => "input",
            EventDetail::Change { .. } => "change",
            EventDetail::Submit => "submit",
            EventDetail::Nav { .. } => "nav",
            EventDetail::Note => "note",
            EventDetail::Outcome { .. } => "outcome",
            EventDetail::UiChange => "ui-change",
        }
    }

    /// Field edits: subject to `captureMode=clicks` filtering and coalescing.
    pub fn is_field_edit(&self) -> bool {
        matches!(self, EventDetail::Input { .. } | EventDetail::Change { .. })
    }

    /// Events whose screenshots are never discarded by compaction.
    pub fn is_priority(&self) -> bool {
        match self {
            EventDetail::Submit
            | EventDetail::Nav { .. }
            | EventDetail::Outcome { .. }
            | EventDetail::Note => true,
            EventDetail::Click { action } => action
                .as_deref()
                .is_some_and(|tag| tag.eq_ignore_ascii_case("login")),
            _ => false,
        }
    }

    fn redact(self, redactor: &Redactor) -> Self {
        match self {
            EventDetail::Input { value } => EventDetail::Input {
                value: redactor.redact_opt(value),
            },
            EventDetail::Change { value } => EventDetail::Change {
                value: redactor.redact_opt(value),
            },
            EventDetail::Nav { url } => EventDetail::Nav {
                url: redactor.redact_opt(url),
            },
            EventDetail::Outcome { outcome } => EventDetail::Outcome {
                outcome: redactor.redact(&outcome),
            },
            other => other,
        }
    }
}

/// Inbound event payload before it joins the live buffer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    #[serde(flatten)]
    pub detail: EventDetail,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub human_label: Option<String>,
    #[serde(default)]
    pub target: Option<TargetRef>,
    /// Always take a fresh screenshot and never diff-skip it.
    #[serde(default)]
    pub force_screenshot: bool,
}

impl RawEvent {
    pub fn new(detail: EventDetail) -> Self {
        Self {
            detail,
            timestamp: None,
            text: None,
            label: None,
            human_label: None,
            target: None,
            force_screenshot: false,
        }
    }

    pub fn note(text: String, target: TargetRef) -> Self {
        Self {
            text: Some(text),
            target: Some(target),
            force_screenshot: true,
            ..Self::new(EventDetail::Note)
        }
    }

    /// Reject payloads whose kind needs content they do not carry.
    pub fn validate(&self) -> Result<(), String> {
        match &self.detail {
            EventDetail::Note if self.text.as_deref().map_or(true, str::is_empty) => {
                Err("note events require text".into())
            }
            EventDetail::Outcome { outcome } if outcome.trim().is_empty() => {
                Err("outcome events require an outcome".into())
            }
            _ => Ok(()),
        }
    }

    pub fn redacted(self, redactor: &Redactor) -> Self {
        Self {
            detail: self.detail.redact(redactor),
            text: redactor.redact_opt(self.text),
            label: redactor.redact_opt(self.label),
            human_label: redactor.redact_opt(self.human_label),
            ..self
        }
    }

    pub fn wants_fresh_screenshot(&self) -> bool {
        self.force_screenshot || matches!(self.detail, EventDetail::Note)
    }

    pub fn into_event(
        self,
        session_id: String,
        screenshot: Screenshot,
        received_at: DateTime<Utc>,
    ) -> Event {
        Event {
            detail: self.detail,
            timestamp: self.timestamp.unwrap_or(received_at),
            text: self.text,
            label: self.label,
            human_label: self.human_label,
            session_id,
            target: self.target,
            screenshot,
            merged_count: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(flatten)]
    pub detail: EventDetail,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub human_label: Option<String>,
    pub session_id: String,
    #[serde(default)]
    pub target: Option<TargetRef>,
    #[serde(default)]
    pub screenshot: Screenshot,
    pub merged_count: u32,
}

impl Event {
    /// Best human-facing identification of the element the event refers to.
    pub fn identifying_label(&self) -> Option<&str> {
        [&self.human_label, &self.label, &self.text]
            .into_iter()
            .filter_map(|field| field.as_deref())
            .find(|value| !value.trim().is_empty())
    }
}

mod image_base64 {
    use std::sync::Arc;

    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    use super::ImageBytes;

    pub fn serialize<S>(image: &Option<ImageBytes>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match image {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes.as_slice())),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<ImageBytes>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|value| {
                STANDARD
                    .decode(value.as_bytes())
                    .map(Arc::new)
                    .map_err(serde::de::Error::custom)
            })
            .transpose()
    }
}
