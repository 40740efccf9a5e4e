//! Buffer-level transforms: compaction of the live buffer and coalescing +
//! freezing into reports.

pub mod coalesce;
pub mod compact;
pub mod report;

pub use coalesce::{coalesce_inputs, normalization_key};
pub use compact::{compact, screenshot_count, CompactionOutcome, CompactionPolicy};
pub use report::{freeze, freeze_into};
