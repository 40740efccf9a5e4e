//! Fakes shared by the unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::capture::{SurfaceCapture, TargetResolver};
use crate::db::{MemoryStore, PersistedRecord, PersistenceStore};
use crate::models::TargetRef;

pub fn tab(tab_id: i64) -> TargetRef {
    TargetRef::new(tab_id, 1)
}

/// Returns a configurable frame and counts how often it was asked to.
pub struct StaticCapture {
    frame: Mutex<Vec<u8>>,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl StaticCapture {
    pub fn new(frame: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            frame: Mutex::new(frame.to_vec()),
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        })
    }

    pub fn set_frame(&self, frame: &[u8]) {
        *self.frame.lock().unwrap() = frame.to_vec();
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SurfaceCapture for StaticCapture {
    fn capture_still(&self, _target: &TargetRef) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            bail!("surface unavailable");
        }
        Ok(self.frame.lock().unwrap().clone())
    }
}

/// Returns `tab-<id>` for whichever tab it is asked to capture.
#[derive(Default)]
pub struct TabCapture {
    calls: AtomicUsize,
}

impl TabCapture {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SurfaceCapture for TabCapture {
    fn capture_still(&self, target: &TargetRef) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("tab-{}", target.tab_id).into_bytes())
    }
}

/// Resolver whose answer the test controls.
#[derive(Default)]
pub struct FixedTarget {
    target: Mutex<Option<TargetRef>>,
}

impl FixedTarget {
    pub fn new(target: Option<TargetRef>) -> Arc<Self> {
        Arc::new(Self {
            target: Mutex::new(target),
        })
    }

    pub fn set(&self, target: Option<TargetRef>) {
        *self.target.lock().unwrap() = target;
    }
}

impl TargetResolver for FixedTarget {
    fn resolve_active_target(&self) -> Option<TargetRef> {
        self.target.lock().unwrap().clone()
    }
}

/// Memory store whose writes can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing: AtomicBool,
    saves: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub async fn stored(&self) -> Option<PersistedRecord> {
        self.inner.load().await.unwrap()
    }
}

#[async_trait]
impl PersistenceStore for FlakyStore {
    async fn load(&self) -> Result<Option<PersistedRecord>> {
        self.inner.load().await
    }

    async fn save(&self, record: &PersistedRecord) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("disk full");
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(record).await
    }
}
