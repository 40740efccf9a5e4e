use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum RecordingState {
    #[default]
    Idle,
    Recording,
    Paused,
}

/// The single live recording session. `id` is `Some` exactly when the state
/// is not `Idle`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Option<String>,
    pub state: RecordingState,
}

impl Session {
    pub fn is_recording(&self) -> bool {
        self.state == RecordingState::Recording
    }

    pub fn is_paused(&self) -> bool {
        self.state == RecordingState::Paused
    }

    pub fn is_active(&self) -> bool {
        self.state != RecordingState::Idle
    }

    /// True when an event stamped with `session_id` may join the buffer.
    pub fn accepts(&self, session_id: &str) -> bool {
        self.is_recording() && self.id.as_deref() == Some(session_id)
    }
}
