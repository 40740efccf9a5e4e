use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::redaction::{compile_rule, default_rules};

/// Lower bound accepted for `idleThresholdSec`; idle detectors do not report
/// anything finer than this.
pub const MIN_IDLE_THRESHOLD_SECS: u64 = 15;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum CaptureMode {
    #[default]
    All,
    /// `input`/`change` events are dropped before redaction.
    Clicks,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RedactionRule {
    pub name: String,
    pub match_pattern: String,
    pub replacement: String,
}

impl RedactionRule {
    pub fn new(name: &str, match_pattern: &str, replacement: &str) -> Self {
        Self {
            name: name.into(),
            match_pattern: match_pattern.into(),
            replacement: replacement.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub screenshot_debounce_ms: u64,
    pub screenshot_min_interval_ms: u64,
    pub diff_enabled: bool,
    pub redact_enabled: bool,
    pub redact_rules: Vec<RedactionRule>,
    pub capture_mode: CaptureMode,
    pub active_tab_only: bool,
    pub auto_pause_on_idle: bool,
    /// Read by the external idle detector through `GetState`; the recorder
    /// itself only reacts to `IdleStateChanged`.
    pub idle_threshold_sec: u64,
    pub resume_on_focus: bool,
    pub prune_inputs: bool,
    pub prune_window_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            screenshot_debounce_ms: 250,
            screenshot_min_interval_ms: 800,
            diff_enabled: true,
            redact_enabled: true,
            redact_rules: default_rules(),
            capture_mode: CaptureMode::All,
            active_tab_only: true,
            auto_pause_on_idle: false,
            idle_threshold_sec: 60,
            resume_on_focus: true,
            prune_inputs: true,
            prune_window_ms: 1200,
        }
    }
}

/// Partial settings as received from `UpdateSettings`. Unknown keys are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsPatch {
    pub screenshot_debounce_ms: Option<u64>,
    pub screenshot_min_interval_ms: Option<u64>,
    pub diff_enabled: Option<bool>,
    pub redact_enabled: Option<bool>,
    pub redact_rules: Option<Vec<RedactionRule>>,
    pub capture_mode: Option<CaptureMode>,
    pub active_tab_only: Option<bool>,
    pub auto_pause_on_idle: Option<bool>,
    pub idle_threshold_sec: Option<u64>,
    pub resume_on_focus: Option<bool>,
    pub prune_inputs: Option<bool>,
    pub prune_window_ms: Option<u64>,
}

impl Settings {
    /// Returns a copy of `self` with `patch` merged in, or an error if the
    /// merged settings are invalid. `self` is never modified.
    pub fn merged(&self, patch: SettingsPatch) -> Result<Settings> {
        let mut next = self.clone();

        macro_rules! take {
            ($($field:ident),* $(,)?) => {
                $(
                    if let Some(value) = patch.$field {
                        next.$field = value;
                    }
                )*
            };
        }

        take!(
            screenshot_debounce_ms,
            screenshot_min_interval_ms,
            diff_enabled,
            redact_enabled,
            redact_rules,
            capture_mode,
            active_tab_only,
            auto_pause_on_idle,
            idle_threshold_sec,
            resume_on_focus,
            prune_inputs,
            prune_window_ms,
        );

        next.idle_threshold_sec = next.idle_threshold_sec.max(MIN_IDLE_THRESHOLD_SECS);
        next.validate()?;
        Ok(next)
    }

    /// Every redaction rule must compile.
    pub fn validate(&self) -> Result<()> {
        for rule in &self.redact_rules {
            compile_rule(rule)
                .with_context(|| format!("redaction rule '{}' is invalid", rule.name))?;
        }
        Ok(())
    }
}
