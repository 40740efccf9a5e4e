//! Collaborators the recorder consumes: where still images come from and which
//! surface is currently active.

use std::process::Command;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, bail, Context, Result};

use crate::models::TargetRef;

/// Produces a still image of a surface. Called from a blocking worker thread.
pub trait SurfaceCapture: Send + Sync + 'static {
    fn capture_still(&self, target: &TargetRef) -> Result<Vec<u8>>;
}

/// Reports the currently active surface, if any.
pub trait TargetResolver: Send + Sync + 'static {
    fn resolve_active_target(&self) -> Option<TargetRef>;
}

/// Resolver fed by focus notifications from the host.
#[derive(Debug, Default)]
pub struct FocusTracker {
    current: Mutex<Option<TargetRef>>,
}

impl FocusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn focus(&self, target: Option<TargetRef>) {
        *self.lock() = target;
    }

    fn lock(&self) -> MutexGuard<'_, Option<TargetRef>> {
        match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl TargetResolver for FocusTracker {
    fn resolve_active_target(&self) -> Option<TargetRef> {
        self.lock().clone()
    }
}

/// Runs an external program as `<program> [args..] <tabId> <windowId>` and
/// takes its stdout as the image.
#[derive(Debug, Clone)]
pub struct CommandCapture {
    program: String,
    args: Vec<String>,
}

impl CommandCapture {
    /// Parse a whitespace-separated command line, e.g. `grab-tab --png`.
    pub fn from_command_line(command_line: &str) -> Result<Self> {
        let mut parts = command_line.split_whitespace().map(String::from);
        let program = parts
            .next()
            .ok_or_else(|| anyhow!("capture command is empty"))?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }
}

impl SurfaceCapture for CommandCapture {
    fn capture_still(&self, target: &TargetRef) -> Result<Vec<u8>> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(target.tab_id.to_string())
            .arg(target.window_id.to_string())
            .output()
            .with_context(|| format!("failed to spawn capture command {}", self.program))?;

        if !output.status.success() {
            bail!(
                "capture command exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        if output.stdout.is_empty() {
            bail!("capture command produced no image bytes");
        }
        Ok(output.stdout)
    }
}

/// Used when no capture backend is configured; every capture fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCapture;

impl SurfaceCapture for NoCapture {
    fn capture_still(&self, _target: &TargetRef) -> Result<Vec<u8>> {
        bail!("no capture backend configured")
    }
}
