//! Screenshot capture coordinator.
//!
//! Guarantees at most one capture in flight per target: callers arriving while
//! a capture of the same target is scheduled attach to it as waiters and all
//! receive the same outcome. A recent capture of the same target is reused
//! instead of re-captured. A session reset cancels every pending capture and
//! releases its waiters immediately.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::models::{ImageBytes, Screenshot, SkipReason, TargetRef};
use crate::settings::Settings;

use super::hash::content_hash;
use super::provider::SurfaceCapture;

// Set to false to silence this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureTiming {
    pub debounce: Duration,
    pub min_interval: Duration,
}

impl CaptureTiming {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            debounce: Duration::from_millis(settings.screenshot_debounce_ms),
            min_interval: Duration::from_millis(settings.screenshot_min_interval_ms),
        }
    }
}

/// Result handed to every caller of [`ScreenshotCoordinator::request`].
#[derive(Debug, Clone, PartialEq)]
pub struct ShotOutcome {
    pub image: Option<ImageBytes>,
    pub hash: Option<String>,
    pub reused: bool,
    pub skip_reason: Option<SkipReason>,
}

impl ShotOutcome {
    fn fresh(image: ImageBytes, hash: String) -> Self {
        Self {
            image: Some(image),
            hash: Some(hash),
            reused: false,
            skip_reason: None,
        }
    }

    fn reused(entry: &ScreenshotCacheEntry) -> Self {
        Self {
            image: Some(Arc::clone(&entry.image)),
            hash: Some(entry.content_hash.clone()),
            reused: true,
            skip_reason: None,
        }
    }

    pub fn failed(reason: SkipReason) -> Self {
        Self {
            image: None,
            hash: None,
            reused: false,
            skip_reason: Some(reason),
        }
    }

    /// Turn the outcome into the screenshot attached to an event.
    ///
    /// `previous_hash` is the hash of the most recent image-bearing event in
    /// the live buffer. When `skip_unchanged` is set and the hashes match, the
    /// image is not materialized again.
    pub fn into_screenshot(self, previous_hash: Option<&str>, skip_unchanged: bool) -> Screenshot {
        match (self.image, self.hash) {
            (Some(image), Some(hash)) => {
                if skip_unchanged && previous_hash == Some(hash.as_str()) {
                    Screenshot::skipped(Some(hash), SkipReason::Unchanged)
                } else {
                    Screenshot::captured(image, hash)
                }
            }
            (_, hash) => Screenshot::skipped(
                hash,
                self.skip_reason.unwrap_or(SkipReason::CaptureFailed),
            ),
        }
    }
}

/// The most recent successful capture.
#[derive(Debug, Clone)]
pub struct ScreenshotCacheEntry {
    pub target: TargetRef,
    pub captured_at: Instant,
    pub captured_wall: DateTime<Utc>,
    pub content_hash: String,
    pub image: ImageBytes,
}

struct PendingCapture {
    generation: u64,
    target: Option<TargetRef>,
    waiters: Vec<oneshot::Sender<ShotOutcome>>,
    cancel: CancellationToken,
}

#[derive(Default)]
struct CoordinatorState {
    cache: Option<ScreenshotCacheEntry>,
    pending: Vec<PendingCapture>,
    generation: u64,
}

#[derive(Clone)]
pub struct ScreenshotCoordinator {
    state: Arc<Mutex<CoordinatorState>>,
    provider: Arc<dyn SurfaceCapture>,
}

impl ScreenshotCoordinator {
    pub fn new(provider: Arc<dyn SurfaceCapture>) -> Self {
        Self {
            state: Arc::new(Mutex::new(CoordinatorState::default())),
            provider,
        }
    }

    /// Request a still image of `target`.
    ///
    /// Unless `forced`, a capture of the same target younger than
    /// `timing.min_interval` is reused. Otherwise the caller joins the pending
    /// capture of that target, or schedules one after `timing.debounce`. The
    /// pending check and the waiter registration happen
    /// under one lock acquisition with no suspension in between.
    pub async fn request(
        &self,
        forced: bool,
        target: Option<TargetRef>,
        timing: CaptureTiming,
    ) -> ShotOutcome {
        let receiver = {
            let mut state = self.lock();

            if !forced {
                if let Some(entry) = state
                    .cache
                    .as_ref()
                    .filter(|entry| target.as_ref() == Some(&entry.target))
                    .filter(|entry| entry.captured_at.elapsed() < timing.min_interval)
                {
                    log_debug!("reusing screenshot captured at {}", entry.captured_wall);
                    return ShotOutcome::reused(entry);
                }
            }

            let (reply_tx, reply_rx) = oneshot::channel();
            match state.pending.iter_mut().find(|pending| pending.target == target) {
                Some(pending) => {
                    pending.waiters.push(reply_tx);
                    log_debug!(
                        "joined pending capture #{} ({} waiters)",
                        pending.generation,
                        pending.waiters.len()
                    );
                }
                None => {
                    state.generation += 1;
                    let generation = state.generation;
                    let cancel = CancellationToken::new();
                    state.pending.push(PendingCapture {
                        generation,
                        target: target.clone(),
                        waiters: vec![reply_tx],
                        cancel: cancel.clone(),
                    });
                    tokio::spawn(self.clone().run_capture(
                        generation,
                        cancel,
                        target,
                        timing.debounce,
                    ));
                }
            }
            reply_rx
        };

        receiver
            .await
            .unwrap_or_else(|_| ShotOutcome::failed(SkipReason::Cancelled))
    }

    /// Cancel every pending capture, resolve its waiters with a `cancelled`
    /// outcome and forget the cached image. Runs synchronously.
    pub fn reset(&self) {
        let pending = {
            let mut state = self.lock();
            state.cache = None;
            std::mem::take(&mut state.pending)
        };

        for pending in pending {
            pending.cancel.cancel();
            let released = pending.waiters.len();
            for waiter in pending.waiters {
                let _ = waiter.send(ShotOutcome::failed(SkipReason::Cancelled));
            }
            log_info!(
                "cancelled pending capture #{} and released {} waiters",
                pending.generation,
                released
            );
        }
    }

    pub fn is_pending(&self) -> bool {
        !self.lock().pending.is_empty()
    }

    pub fn cached(&self) -> Option<ScreenshotCacheEntry> {
        self.lock().cache.clone()
    }

    async fn run_capture(
        self,
        generation: u64,
        cancel: CancellationToken,
        target: Option<TargetRef>,
        debounce: Duration,
    ) {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = time::sleep(debounce) => {}
        }

        let outcome = tokio::select! {
            _ = cancel.cancelled() => return,
            outcome = self.capture(target) => outcome,
        };

        self.resolve(generation, outcome);
    }

    async fn capture(&self, target: Option<TargetRef>) -> ShotOutcome {
        let Some(target) = target else {
            log_debug!("no capture target designated");
            return ShotOutcome::failed(SkipReason::NoActiveTarget);
        };

        let tab_id = target.tab_id;
        let provider = Arc::clone(&self.provider);
        let started = Instant::now();

        let result = tokio::task::spawn_blocking(move || {
            provider.capture_still(&target).map(|bytes| {
                let hash = content_hash(&bytes);
                (bytes, hash)
            })
        })
        .await;

        match result {
            Ok(Ok((bytes, hash))) => {
                log_debug!(
                    "captured {} bytes from tab {} in {}ms",
                    bytes.len(),
                    tab_id,
                    started.elapsed().as_millis()
                );
                ShotOutcome::fresh(Arc::new(bytes), hash)
            }
            Ok(Err(err)) => {
                log_warn!("screenshot capture failed for tab {}: {err:#}", tab_id);
                ShotOutcome::failed(SkipReason::CaptureFailed)
            }
            Err(join_err) => {
                log_warn!("screenshot capture worker failed to join: {join_err}");
                ShotOutcome::failed(SkipReason::CaptureFailed)
            }
        }
    }

    fn resolve(&self, generation: u64, outcome: ShotOutcome) {
        let waiters = {
            let mut state = self.lock();
            let Some(index) = state
                .pending
                .iter()
                .position(|pending| pending.generation == generation)
            else {
                // superseded by a reset
                return;
            };
            let pending = state.pending.swap_remove(index);

            if let (Some(target), Some(image), Some(hash)) =
                (pending.target, &outcome.image, &outcome.hash)
            {
                state.cache = Some(ScreenshotCacheEntry {
                    target,
                    captured_at: Instant::now(),
                    captured_wall: Utc::now(),
                    content_hash: hash.clone(),
                    image: Arc::clone(image),
                });
            }
            pending.waiters
        };

        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }

    fn lock(&self) -> MutexGuard<'_, CoordinatorState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{tab, StaticCapture, TabCapture};

    fn timing(debounce_ms: u64, min_interval_ms: u64) -> CaptureTiming {
        CaptureTiming {
            debounce: Duration::from_millis(debounce_ms),
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_capture() {
        let capture = StaticCapture::new(b"frame-a");
        let coordinator = ScreenshotCoordinator::new(capture.clone());

        let mut handles = Vec::new();
        for _ in 0..5 {
            let coordinator = coordinator.clone();
            handles.push(tokio::spawn(async move {
                coordinator.request(false, Some(tab(1)), timing(30, 0)).await
            }));
        }

        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.unwrap());
        }

        assert_eq!(capture.calls(), 1);
        assert!(outcomes[0].image.is_some());
        assert!(outcomes
            .iter()
            .all(|o| o.hash == outcomes[0].hash && o.image == outcomes[0].image));
        assert!(!coordinator.is_pending());
    }

    #[tokio::test]
    async fn recent_capture_is_reused() {
        let capture = StaticCapture::new(b"frame-a");
        let coordinator = ScreenshotCoordinator::new(capture.clone());

        let first = coordinator.request(false, Some(tab(1)), timing(0, 10_000)).await;
        let second = coordinator.request(false, Some(tab(1)), timing(0, 10_000)).await;

        assert!(!first.reused);
        assert!(second.reused);
        assert_eq!(second.hash, first.hash);
        assert_eq!(capture.calls(), 1);
    }

    #[tokio::test]
    async fn recent_capture_of_another_target_is_not_reused() {
        let capture = TabCapture::new();
        let coordinator = ScreenshotCoordinator::new(capture.clone());

        let first = coordinator.request(false, Some(tab(1)), timing(0, 60_000)).await;
        let other = coordinator.request(false, Some(tab(7)), timing(0, 60_000)).await;

        assert!(!other.reused);
        assert_eq!(other.image.as_deref(), Some(&b"tab-7".to_vec()));
        assert_ne!(other.hash, first.hash);
        assert_eq!(capture.calls(), 2);
        assert_eq!(coordinator.cached().map(|entry| entry.target), Some(tab(7)));
    }

    #[tokio::test]
    async fn pending_captures_are_shared_per_target() {
        let capture = TabCapture::new();
        let coordinator = ScreenshotCoordinator::new(capture.clone());

        let mut handles = Vec::new();
        for tab_id in [1, 7, 1, 7] {
            let coordinator = coordinator.clone();
            handles.push(tokio::spawn(async move {
                coordinator.request(false, Some(tab(tab_id)), timing(30, 0)).await
            }));
        }

        let mut images = Vec::new();
        for handle in handles {
            images.push(handle.await.unwrap().image);
        }

        assert_eq!(capture.calls(), 2);
        assert_eq!(images[0].as_deref(), Some(&b"tab-1".to_vec()));
        assert_eq!(images[1].as_deref(), Some(&b"tab-7".to_vec()));
        assert_eq!(images[0], images[2]);
        assert_eq!(images[1], images[3]);
        assert!(!coordinator.is_pending());
    }

    #[tokio::test]
    async fn forced_request_bypasses_reuse() {
        let capture = StaticCapture::new(b"frame-a");
        let coordinator = ScreenshotCoordinator::new(capture.clone());

        coordinator.request(false, Some(tab(1)), timing(0, 10_000)).await;
        let forced = coordinator.request(true, Some(tab(1)), timing(0, 10_000)).await;

        assert!(!forced.reused);
        assert_eq!(capture.calls(), 2);
    }

    #[tokio::test]
    async fn missing_target_fails_without_capturing() {
        let capture = StaticCapture::new(b"frame-a");
        let coordinator = ScreenshotCoordinator::new(capture.clone());

        let outcome = coordinator.request(false, None, timing(0, 0)).await;

        assert_eq!(outcome.skip_reason, Some(SkipReason::NoActiveTarget));
        assert!(outcome.image.is_none());
        assert_eq!(capture.calls(), 0);
    }

    #[tokio::test]
    async fn provider_failure_is_reported_and_not_cached() {
        let capture = StaticCapture::new(b"frame-a");
        capture.set_failing(true);
        let coordinator = ScreenshotCoordinator::new(capture.clone());

        let outcome = coordinator.request(false, Some(tab(1)), timing(0, 10_000)).await;
        assert_eq!(outcome.skip_reason, Some(SkipReason::CaptureFailed));
        assert!(coordinator.cached().is_none());

        capture.set_failing(false);
        let retry = coordinator.request(false, Some(tab(1)), timing(0, 10_000)).await;
        assert!(!retry.reused);
        assert!(retry.image.is_some());
    }

    #[tokio::test]
    async fn reset_releases_waiters_and_skips_capture() {
        let capture = StaticCapture::new(b"frame-a");
        let coordinator = ScreenshotCoordinator::new(capture.clone());

        let waiting = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator.request(false, Some(tab(1)), timing(5_000, 0)).await
            })
        };
        time::sleep(Duration::from_millis(20)).await;
        assert!(coordinator.is_pending());

        coordinator.reset();
        let outcome = waiting.await.unwrap();

        assert_eq!(outcome.skip_reason, Some(SkipReason::Cancelled));
        assert!(outcome.image.is_none());
        assert!(!coordinator.is_pending());
        assert_eq!(capture.calls(), 0);
    }

    #[test]
    fn unchanged_hash_is_not_materialized_twice() {
        let outcome = ShotOutcome::fresh(Arc::new(vec![1]), "abc".into());

        let skipped = outcome.clone().into_screenshot(Some("abc"), true);
        assert!(skipped.skipped);
        assert_eq!(skipped.skip_reason, Some(SkipReason::Unchanged));
        assert_eq!(skipped.hash.as_deref(), Some("abc"));
        assert!(skipped.image.is_none());

        let forced = outcome.clone().into_screenshot(Some("abc"), false);
        assert!(forced.has_image());

        let changed = outcome.into_screenshot(Some("def"), true);
        assert!(changed.has_image());
    }

    #[test]
    fn failure_maps_to_skipped_screenshot() {
        let screenshot =
            ShotOutcome::failed(SkipReason::NoActiveTarget).into_screenshot(None, true);
        assert!(screenshot.skipped);
        assert_eq!(screenshot.skip_reason, Some(SkipReason::NoActiveTarget));
    }
}
