use crate::models::{Event, SkipReason};

/// Thresholds for the live-buffer compactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionPolicy {
    /// Compact once the buffer holds this many events.
    pub event_trigger: usize,
    /// Compact once this many events carry an image.
    pub screenshot_trigger: usize,
    /// Target number of image-bearing events after a compaction pass.
    pub keep_screenshots: usize,
}

impl Default for CompactionPolicy {
    fn default() -> Self {
        Self {
            event_trigger: 600,
            screenshot_trigger: 200,
            keep_screenshots: 160,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionOutcome {
    pub stripped: usize,
    pub screenshots_remaining: usize,
}

pub fn screenshot_count(events: &[Event]) -> usize {
    events.iter().filter(|event| event.screenshot.has_image()).count()
}

/// Strip images from the oldest non-priority events until the buffer is back
/// at `keep_screenshots`. Priority events keep their images even when that
/// leaves the count above target. Stripped images are gone for good.
pub fn compact(events: &mut [Event], policy: &CompactionPolicy) -> CompactionOutcome {
    let mut remaining = screenshot_count(events);

    if events.len() < policy.event_trigger && remaining < policy.screenshot_trigger {
        return CompactionOutcome {
            stripped: 0,
            screenshots_remaining: remaining,
        };
    }

    let mut stripped = 0;
    for event in events.iter_mut() {
        if remaining <= policy.keep_screenshots {
            break;
        }
        if !event.screenshot.has_image() || event.detail.is_priority() {
            continue;
        }
        event.screenshot.strip(SkipReason::CompactedMemory);
        stripped += 1;
        remaining -= 1;
    }

    CompactionOutcome {
        stripped,
        screenshots_remaining: remaining,
    }
}
