use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    capture::{CaptureTiming, ScreenshotCoordinator, SurfaceCapture, TargetResolver},
    db::PersistenceStore,
    models::{RawEvent, Report, TargetRef},
    settings::{Settings, SettingsPatch},
};

use super::{IdleState, PipelineContext, RejectReason, Snapshot};

// Set to false to silence this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// What `GetState` reports.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecorderStatus {
    pub recording: bool,
    pub paused: bool,
    pub session_id: Option<String>,
    pub settings: Settings,
    pub live_event_count: usize,
    pub report_count: usize,
    pub active_target: Option<TargetRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOutcome {
    pub session_id: String,
    pub persisted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopOutcome {
    pub saved: bool,
    pub persisted: bool,
}

/// Result of pause, resume and the host signals that may toggle them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleOutcome {
    pub changed: bool,
    pub persisted: bool,
}

impl ToggleOutcome {
    fn unchanged() -> Self {
        Self {
            changed: false,
            persisted: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SettingsUpdate {
    pub settings: Settings,
    pub persisted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Accepted { persisted: bool },
    Rejected(RejectReason),
}

/// Owns the pipeline context and sequences every recorder operation.
///
/// The context lock is never held across a screenshot capture or a
/// persistence write. Anything that resumes after such a suspension checks
/// the session id it started with before touching the buffer.
#[derive(Clone)]
pub struct Recorder {
    context: Arc<Mutex<PipelineContext>>,
    coordinator: ScreenshotCoordinator,
    resolver: Arc<dyn TargetResolver>,
    store: Arc<dyn PersistenceStore>,
    // revision of the last snapshot written, so an older snapshot that
    // reaches the store late never overwrites a newer one
    last_written: Arc<Mutex<u64>>,
}

impl Recorder {
    pub fn new(
        context: PipelineContext,
        capture: Arc<dyn SurfaceCapture>,
        resolver: Arc<dyn TargetResolver>,
        store: Arc<dyn PersistenceStore>,
    ) -> Self {
        Self {
            context: Arc::new(Mutex::new(context)),
            coordinator: ScreenshotCoordinator::new(capture),
            resolver,
            store,
            last_written: Arc::new(Mutex::new(0)),
        }
    }

    /// Build a recorder from whatever the store holds. A record that cannot
    /// be read is logged and replaced by defaults.
    pub async fn restore(
        capture: Arc<dyn SurfaceCapture>,
        resolver: Arc<dyn TargetResolver>,
        store: Arc<dyn PersistenceStore>,
    ) -> Self {
        let mut context = match store.load().await {
            Ok(Some(record)) => PipelineContext::from_record(record),
            Ok(None) => PipelineContext::default(),
            Err(err) => {
                log_error!("failed to load recorder state, starting fresh: {err:#}");
                PipelineContext::default()
            }
        };

        if context.session.is_active() {
            context.active_target = resolver.resolve_active_target();
            log_info!(
                "restored {:?} session {} with {} buffered events",
                context.session.state,
                context.session.id.as_deref().unwrap_or_default(),
                context.live_events.len()
            );
        }

        Self::new(context, capture, resolver, store)
    }

    pub async fn status(&self) -> RecorderStatus {
        let ctx = self.context.lock().await;
        RecorderStatus {
            recording: ctx.session.is_active(),
            paused: ctx.session.is_paused(),
            session_id: ctx.session.id.clone(),
            settings: ctx.settings.clone(),
            live_event_count: ctx.live_events.len(),
            report_count: ctx.reports.len(),
            active_target: ctx.active_target.clone(),
        }
    }

    /// Frozen reports, newest first.
    pub async fn reports(&self) -> Vec<Report> {
        self.context.lock().await.reports.iter().cloned().collect()
    }

    pub async fn update_settings(&self, patch: SettingsPatch) -> Result<SettingsUpdate> {
        let (settings, snapshot) = {
            let mut ctx = self.context.lock().await;
            let next = ctx.settings.merged(patch)?;
            ctx.apply_settings(next.clone());
            (next, ctx.snapshot())
        };

        Ok(SettingsUpdate {
            settings,
            persisted: self.persist(snapshot).await,
        })
    }

    /// Begin a fresh session. Any buffered events are discarded and any
    /// pending screenshot is cancelled.
    pub async fn start_recording(&self, source: &str) -> StartOutcome {
        let session_id = Uuid::new_v4().to_string();

        let snapshot = {
            let mut ctx = self.context.lock().await;
            if ctx.session.is_active() && !ctx.live_events.is_empty() {
                log_warn!(
                    "restarting over session {} drops {} buffered events",
                    ctx.session.id.as_deref().unwrap_or_default(),
                    ctx.live_events.len()
                );
            }
            let target = self.resolver.resolve_active_target();
            ctx.begin_session(session_id.clone(), target);
            self.coordinator.reset();
            ctx.snapshot()
        };

        log_info!("recording session {session_id} started ({source})");

        StartOutcome {
            session_id,
            persisted: self.persist(snapshot).await,
        }
    }

    /// Freeze the live buffer into a report and return to idle. Stopping
    /// while idle is a no-op that writes nothing.
    pub async fn stop_recording(&self, source: &str) -> StopOutcome {
        let (saved, snapshot) = {
            let mut ctx = self.context.lock().await;
            if !ctx.session.is_active() {
                log_debug!("stop requested while idle ({source})");
                return StopOutcome {
                    saved: false,
                    persisted: true,
                };
            }

            let session_id = ctx.session.id.clone().unwrap_or_default();
            let saved = ctx.end_session();
            self.coordinator.reset();
            log_info!("recording session {session_id} stopped ({source}), report saved: {saved}");
            (saved, ctx.snapshot())
        };

        StopOutcome {
            saved,
            persisted: self.persist(snapshot).await,
        }
    }

    pub async fn pause_recording(&self) -> ToggleOutcome {
        let snapshot = {
            let mut ctx = self.context.lock().await;
            if !ctx.pause() {
                return ToggleOutcome::unchanged();
            }
            ctx.auto_paused = false;
            ctx.snapshot()
        };
        self.toggled(snapshot).await
    }

    pub async fn resume_recording(&self) -> ToggleOutcome {
        let snapshot = {
            let mut ctx = self.context.lock().await;
            if !ctx.resume() {
                return ToggleOutcome::unchanged();
            }
            ctx.snapshot()
        };
        self.toggled(snapshot).await
    }

    /// Idle detector signal. Only pauses sessions when `autoPauseOnIdle` is
    /// set, and only resumes sessions it paused itself.
    pub async fn on_idle_state_changed(&self, state: IdleState) -> ToggleOutcome {
        let snapshot = {
            let mut ctx = self.context.lock().await;
            let changed = match state {
                IdleState::Idle | IdleState::Locked if ctx.settings.auto_pause_on_idle => {
                    let paused = ctx.pause();
                    if paused {
                        ctx.auto_paused = true;
                        log_info!("auto-paused recording ({state:?})");
                    }
                    paused
                }
                IdleState::Active if ctx.auto_paused && ctx.settings.resume_on_focus => {
                    log_info!("resuming auto-paused recording");
                    ctx.resume()
                }
                _ => false,
            };
            if !changed {
                return ToggleOutcome::unchanged();
            }
            ctx.snapshot()
        };
        self.toggled(snapshot).await
    }

    /// Focus moved to `target`.
    pub async fn on_target_activated(&self, target: TargetRef) -> ToggleOutcome {
        let snapshot = {
            let mut ctx = self.context.lock().await;
            if ctx.session.is_active()
                && (!ctx.settings.active_tab_only || ctx.active_target.is_none())
            {
                ctx.active_target = Some(target.clone());
            }

            let resumes = ctx.auto_paused
                && ctx.settings.resume_on_focus
                && ctx.active_target.as_ref() == Some(&target);
            if !(resumes && ctx.resume()) {
                return ToggleOutcome::unchanged();
            }
            log_info!("resuming auto-paused recording on focus of tab {}", target.tab_id);
            ctx.snapshot()
        };
        self.toggled(snapshot).await
    }

    /// Add a user note bound to the currently active surface.
    pub async fn add_note(&self, text: String) -> EventOutcome {
        let target = {
            let mut ctx = self.context.lock().await;
            if !ctx.session.is_recording() {
                return EventOutcome::Rejected(RejectReason::Ignored);
            }
            let Some(current) = self.resolver.resolve_active_target() else {
                return EventOutcome::Rejected(RejectReason::NoActiveTarget);
            };
            match ctx.active_target.clone() {
                Some(designated) if ctx.settings.active_tab_only && designated != current => {
                    return EventOutcome::Rejected(RejectReason::NonActiveTarget);
                }
                Some(_) => {}
                None => ctx.active_target = Some(current.clone()),
            }
            current
        };

        self.ingest(RawEvent::note(text, target)).await
    }

    pub async fn record_event(&self, raw: RawEvent) -> EventOutcome {
        self.ingest(raw).await
    }

    async fn ingest(&self, raw: RawEvent) -> EventOutcome {
        let kind = raw.detail.kind();

        let (session_id, raw, capture_target, timing, forced) = {
            let ctx = self.context.lock().await;
            if let Err(reason) = ctx.admit(&raw) {
                log_debug!("rejected {kind} event: {reason:?}");
                return EventOutcome::Rejected(reason);
            }
            let Some(session_id) = ctx.session.id.clone() else {
                return EventOutcome::Rejected(RejectReason::Ignored);
            };
            let forced = raw.wants_fresh_screenshot();
            let capture_target = ctx.capture_target_for(&raw);
            (
                session_id,
                ctx.sanitize(raw),
                capture_target,
                CaptureTiming::from_settings(&ctx.settings),
                forced,
            )
        };

        let shot = self.coordinator.request(forced, capture_target, timing).await;

        let snapshot = {
            let mut ctx = self.context.lock().await;
            if !ctx.session.accepts(&session_id) {
                log_info!("dropping {kind} event: session changed while capturing");
                return EventOutcome::Rejected(RejectReason::StateChanged);
            }

            let skip_unchanged = ctx.settings.diff_enabled && !forced;
            let screenshot = shot.into_screenshot(ctx.last_screenshot_hash(), skip_unchanged);
            ctx.append(raw.into_event(session_id, screenshot, Utc::now()));
            ctx.snapshot()
        };

        EventOutcome::Accepted {
            persisted: self.persist(snapshot).await,
        }
    }

    async fn toggled(&self, snapshot: Snapshot) -> ToggleOutcome {
        ToggleOutcome {
            changed: true,
            persisted: self.persist(snapshot).await,
        }
    }

    /// Write a snapshot. Failures are logged and reported, never raised; the
    /// in-memory state stays authoritative.
    async fn persist(&self, snapshot: Snapshot) -> bool {
        let mut last_written = self.last_written.lock().await;
        if snapshot.revision <= *last_written {
            return true;
        }

        match self.store.save(&snapshot.record).await {
            Ok(()) => {
                *last_written = snapshot.revision;
                true
            }
            Err(err) => {
                log_error!("failed to persist recorder state: {err:#}");
                false
            }
        }
    }
}
