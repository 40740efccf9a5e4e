pub mod commands;
pub mod controller;
pub mod state;

pub use commands::{handle_message, Request};
pub use controller::{
    EventOutcome, Recorder, RecorderStatus, SettingsUpdate, StartOutcome, StopOutcome,
    ToggleOutcome,
};
pub use state::{IdleState, PipelineContext, RejectReason, Snapshot};
