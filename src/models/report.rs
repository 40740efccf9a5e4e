//! Frozen session snapshots and their bounded history.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Event;
use crate::settings::Settings;

pub const REPORT_HISTORY_CAPACITY: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub session_id: String,
    pub settings_at_capture: Settings,
    pub events: Vec<Event>,
}

/// Most-recent-first list of reports, never longer than
/// [`REPORT_HISTORY_CAPACITY`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ReportHistory(VecDeque<Report>);

impl ReportHistory {
    pub fn push(&mut self, report: Report) {
        self.0.push_front(report);
        self.0.truncate(REPORT_HISTORY_CAPACITY);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn latest(&self) -> Option<&Report> {
        self.0.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Report> {
        self.0.iter()
    }

    /// Drops anything beyond capacity, e.g. after loading an older record.
    pub fn enforce_capacity(&mut self) {
        self.0.truncate(REPORT_HISTORY_CAPACITY);
    }
}
