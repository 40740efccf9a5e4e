//! Still-image capture: collaborator traits, content hashing and the
//! debounce/coalesce/reuse coordinator.

pub mod coordinator;
pub mod hash;
pub mod provider;

pub use coordinator::{CaptureTiming, ScreenshotCacheEntry, ScreenshotCoordinator, ShotOutcome};
pub use hash::content_hash;
pub use provider::{CommandCapture, FocusTracker, NoCapture, SurfaceCapture, TargetResolver};
