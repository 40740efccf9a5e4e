use std::path::PathBuf;

use anyhow::{anyhow, Result};

pub const DATABASE_FILE: &str = "flowtrace.sqlite3";

/// Process-level configuration read from the environment at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    pub data_dir: PathBuf,
    /// Keep the record in memory only.
    pub ephemeral: bool,
    /// Command line used to capture a surface, e.g. `grab-tab --png`.
    pub capture_command: Option<String>,
    pub debug: bool,
}

impl HostConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let data_dir = match lookup("FLOWTRACE_DATA_DIR").filter(|dir| !dir.trim().is_empty()) {
            Some(dir) => PathBuf::from(dir),
            None => lookup("HOME")
                .map(|home| PathBuf::from(home).join(".flowtrace"))
                .ok_or_else(|| anyhow!("neither FLOWTRACE_DATA_DIR nor HOME is set"))?,
        };

        Ok(Self {
            data_dir,
            ephemeral: flag(lookup("FLOWTRACE_EPHEMERAL")),
            capture_command: lookup("FLOWTRACE_CAPTURE_CMD")
                .map(|cmd| cmd.trim().to_string())
                .filter(|cmd| !cmd.is_empty()),
            debug: flag(lookup("FLOWTRACE_DEBUG")),
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }
}

fn flag(value: Option<String>) -> bool {
    value
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
