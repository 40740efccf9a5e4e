pub mod capture;
pub mod config;
pub mod db;
pub mod host;
pub mod models;
pub mod pipeline;
pub mod recorder;
pub mod redaction;
pub mod settings;
pub mod utils;

#[cfg(test)]
mod test_support;

use anyhow::Context;

pub use capture::{SurfaceCapture, TargetResolver};
pub use config::HostConfig;
pub use db::{PersistedRecord, PersistenceStore};
pub use models::{Event, RawEvent, Report, TargetRef};
pub use recorder::{handle_message, PipelineContext, Recorder};
pub use settings::{Settings, SettingsPatch};

/// Entry point of the `flowtrace` binary.
pub fn run() -> anyhow::Result<()> {
    let config = HostConfig::from_env()?;
    utils::logging::init_logging(config.debug);

    log::info!("flowtrace starting up...");

    // requests interleave only at await points
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(host::serve_stdio(config))?;

    log::info!("stdin closed, shutting down");
    Ok(())
}
