pub mod event;
pub mod report;
pub mod session;

pub use event::{EventDetail, Event, ImageBytes, RawEvent, Screenshot, SkipReason, TargetRef};
pub use report::{Report, ReportHistory, REPORT_HISTORY_CAPACITY};
pub use session::{RecordingState, Session};
