//! JSON message surface of the recorder. Every request is an object with a
//! `type` tag; an optional `id` is echoed back on the response.

use log::warn;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    models::{RawEvent, TargetRef},
    settings::SettingsPatch,
};

use super::{EventOutcome, IdleState, Recorder, RejectReason, ToggleOutcome};

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    GetState,
    UpdateSettings {
        #[serde(default)]
        settings: SettingsPatch,
    },
    StartRecording {
        #[serde(default = "unknown_source")]
        source: String,
    },
    StopRecording {
        #[serde(default = "unknown_source")]
        source: String,
    },
    PauseRecording,
    ResumeRecording,
    AddNote {
        text: String,
    },
    RecordEvent {
        event: Value,
    },
    IdleStateChanged {
        state: IdleState,
    },
    TargetActivated {
        target: TargetRef,
    },
    GetReports,
}

const KNOWN_TYPES: &[&str] = &[
    "GetState",
    "UpdateSettings",
    "StartRecording",
    "StopRecording",
    "PauseRecording",
    "ResumeRecording",
    "AddNote",
    "RecordEvent",
    "IdleStateChanged",
    "TargetActivated",
    "GetReports",
];

fn unknown_source() -> String {
    "unknown".into()
}

/// Handle one inbound message and build its response.
pub async fn handle_message(recorder: &Recorder, message: Value) -> Value {
    let id = message.get("id").cloned();
    let mut response = dispatch(recorder, message).await;

    if let (Some(id), Value::Object(fields)) = (id, &mut response) {
        fields.insert("id".into(), id);
    }
    response
}

async fn dispatch(recorder: &Recorder, message: Value) -> Value {
    let known = message
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|kind| KNOWN_TYPES.contains(&kind));
    if !known {
        return json!({ "ok": false, "reason": "unknown-message" });
    }

    let request: Request = match serde_json::from_value(message) {
        Ok(request) => request,
        Err(err) => {
            warn!("malformed message: {err}");
            return json!({ "ok": false, "reason": "invalid-message", "error": err.to_string() });
        }
    };

    match request {
        Request::GetState => to_response(recorder.status().await),
        Request::UpdateSettings { settings } => match recorder.update_settings(settings).await {
            Ok(update) => json!({
                "ok": true,
                "settings": update.settings,
                "persisted": update.persisted,
            }),
            Err(err) => json!({ "ok": false, "error": format!("{err:#}") }),
        },
        Request::StartRecording { source } => {
            let started = recorder.start_recording(&source).await;
            json!({
                "ok": true,
                "sessionId": started.session_id,
                "persisted": started.persisted,
            })
        }
        Request::StopRecording { source } => {
            let stopped = recorder.stop_recording(&source).await;
            json!({ "ok": true, "saved": stopped.saved, "persisted": stopped.persisted })
        }
        Request::PauseRecording => toggle_response(recorder.pause_recording().await),
        Request::ResumeRecording => toggle_response(recorder.resume_recording().await),
        Request::AddNote { text } => event_response(recorder.add_note(text).await),
        Request::RecordEvent { event } => match serde_json::from_value::<RawEvent>(event) {
            Ok(raw) => event_response(recorder.record_event(raw).await),
            Err(err) => json!({
                "ok": false,
                "reason": RejectReason::InvalidEvent,
                "error": err.to_string(),
            }),
        },
        Request::IdleStateChanged { state } => {
            toggle_response(recorder.on_idle_state_changed(state).await)
        }
        Request::TargetActivated { target } => {
            toggle_response(recorder.on_target_activated(target).await)
        }
        Request::GetReports => json!({ "ok": true, "reports": recorder.reports().await }),
    }
}

fn event_response(outcome: EventOutcome) -> Value {
    match outcome {
        EventOutcome::Accepted { persisted } => json!({ "ok": true, "persisted": persisted }),
        EventOutcome::Rejected(reason) => json!({ "ok": false, "reason": reason }),
    }
}

fn toggle_response(outcome: ToggleOutcome) -> Value {
    json!({ "ok": true, "changed": outcome.changed, "persisted": outcome.persisted })
}

fn to_response<T: serde::Serialize>(value: T) -> Value {
    serde_json::to_value(value)
        .unwrap_or_else(|err| json!({ "ok": false, "error": err.to_string() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::PipelineContext;
    use crate::settings::Settings;
    use crate::test_support::{tab, FixedTarget, FlakyStore, StaticCapture};

    fn recorder() -> Recorder {
        let settings = Settings {
            screenshot_debounce_ms: 0,
            screenshot_min_interval_ms: 0,
            ..Settings::default()
        };
        Recorder::new(
            PipelineContext::new(settings),
            StaticCapture::new(b"frame"),
            FixedTarget::new(Some(tab(1))),
            FlakyStore::new(),
        )
    }

    #[tokio::test]
    async fn unknown_or_untyped_messages_are_reported() {
        let recorder = recorder();

        for message in [json!({ "type": "Explode" }), json!({ "hello": 1 }), json!(42)] {
            let response = handle_message(&recorder, message).await;
            assert_eq!(response, json!({ "ok": false, "reason": "unknown-message" }));
        }
    }

    #[tokio::test]
    async fn malformed_known_message_is_invalid() {
        let recorder = recorder();

        let response = handle_message(&recorder, json!({ "type": "AddNote" })).await;
        assert_eq!(response["ok"], json!(false));
        assert_eq!(response["reason"], json!("invalid-message"));
        assert!(response["error"].is_string());
    }

    #[tokio::test]
    async fn request_id_is_echoed() {
        let recorder = recorder();

        let response = handle_message(&recorder, json!({ "type": "GetState", "id": 7 })).await;
        assert_eq!(response["id"], json!(7));
        assert_eq!(response["recording"], json!(false));
        assert_eq!(response["liveEventCount"], json!(0));
        assert_eq!(response["settings"]["screenshotDebounceMs"], json!(0));
        assert_eq!(response["settings"]["idleThresholdSec"], json!(60));
    }

    #[tokio::test]
    async fn recording_flow_over_messages() {
        let recorder = recorder();

        let started = handle_message(
            &recorder,
            json!({ "type": "StartRecording", "source": "popup" }),
        )
        .await;
        assert_eq!(started["ok"], json!(true));
        assert_eq!(started["persisted"], json!(true));

        let recorded = handle_message(
            &recorder,
            json!({
                "type": "RecordEvent",
                "event": {
                    "kind": "click",
                    "label": "Sign in",
                    "target": { "tabId": 1, "windowId": 1 },
                },
            }),
        )
        .await;
        assert_eq!(recorded, json!({ "ok": true, "persisted": true }));

        let elsewhere = handle_message(
            &recorder,
            json!({
                "type": "RecordEvent",
                "event": { "kind": "click", "target": { "tabId": 5, "windowId": 1 } },
            }),
        )
        .await;
        assert_eq!(elsewhere, json!({ "ok": false, "reason": "non-active-target" }));

        let stopped = handle_message(
            &recorder,
            json!({ "type": "StopRecording", "source": "popup" }),
        )
        .await;
        assert_eq!(stopped, json!({ "ok": true, "saved": true, "persisted": true }));

        let reports = handle_message(&recorder, json!({ "type": "GetReports" })).await;
        assert_eq!(reports["reports"].as_array().map(Vec::len), Some(1));
        assert_eq!(reports["reports"][0]["events"][0]["kind"], json!("click"));
    }

    #[tokio::test]
    async fn malformed_raw_event_is_invalid_event() {
        let recorder = recorder();
        handle_message(&recorder, json!({ "type": "StartRecording" })).await;

        let response = handle_message(
            &recorder,
            json!({ "type": "RecordEvent", "event": { "kind": "teleport" } }),
        )
        .await;
        assert_eq!(response["ok"], json!(false));
        assert_eq!(response["reason"], json!("invalid-event"));
    }

    #[tokio::test]
    async fn rejected_settings_report_error() {
        let recorder = recorder();

        let response = handle_message(
            &recorder,
            json!({
                "type": "UpdateSettings",
                "settings": {
                    "redactRules": [{ "name": "bad", "matchPattern": "[", "replacement": "" }],
                },
            }),
        )
        .await;
        assert_eq!(response["ok"], json!(false));
        assert!(response["error"].as_str().unwrap().contains("bad"));

        let response = handle_message(
            &recorder,
            json!({
                "type": "UpdateSettings",
                "settings": { "idleThresholdSec": 3, "bogus": true },
            }),
        )
        .await;
        assert_eq!(response["ok"], json!(true));
        assert_eq!(response["settings"]["idleThresholdSec"], json!(15));
    }

    #[tokio::test]
    async fn note_while_idle_is_ignored() {
        let recorder = recorder();

        let response = handle_message(&recorder, json!({ "type": "AddNote", "text": "hi" })).await;
        assert_eq!(response, json!({ "ok": false, "reason": "ignored" }));
    }

    #[tokio::test]
    async fn pause_resume_and_idle_messages() {
        let recorder = recorder();
        handle_message(&recorder, json!({ "type": "StartRecording" })).await;

        let paused = handle_message(&recorder, json!({ "type": "PauseRecording" })).await;
        assert_eq!(paused, json!({ "ok": true, "changed": true, "persisted": true }));

        let again = handle_message(&recorder, json!({ "type": "PauseRecording" })).await;
        assert_eq!(again["changed"], json!(false));

        let resumed = handle_message(&recorder, json!({ "type": "ResumeRecording" })).await;
        assert_eq!(resumed["changed"], json!(true));

        let idle = handle_message(
            &recorder,
            json!({ "type": "IdleStateChanged", "state": "locked" }),
        )
        .await;
        assert_eq!(idle["changed"], json!(false));

        let bad = handle_message(
            &recorder,
            json!({ "type": "IdleStateChanged", "state": "asleep" }),
        )
        .await;
        assert_eq!(bad["reason"], json!("invalid-message"));
    }
}
