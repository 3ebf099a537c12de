//! Configuration types for the assistant session and automation bridge.

use crate::bridge::runner::InferenceTarget;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GhostwireConfig {
    /// Session state machine settings.
    pub session: SessionConfig,
    /// Inference process settings.
    pub runner: RunnerConfig,
    /// Automation loop settings.
    pub automation: AutomationConfig,
    /// Backend state file settings.
    pub state_file: StateFileConfig,
}

/// How a typed intent is answered.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextMode {
    /// Run the local script once and show its full output.
    #[default]
    Single,
    /// Run the local script and show its stdout as it arrives.
    Streaming,
    /// Drive the multi-turn automation loop.
    Automation,
}

/// Session state machine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Whether waking the assistant starts in `listening` rather than `idle`.
    pub voice_enabled: bool,
    /// Response strategy for typed intents.
    pub text_mode: TextMode,
    /// Delay before `complete` decays back to `hidden`, in milliseconds.
    pub complete_decay_ms: u64,
    /// Minimum time a single-shot run stays `working`, in milliseconds.
    ///
    /// Keeps the working animation visible when the backend answers instantly.
    pub minimum_working_ms: u64,
    /// Reply appended for the "status" voice phrase.
    pub status_message: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            voice_enabled: false,
            text_mode: TextMode::default(),
            complete_decay_ms: 600,
            minimum_working_ms: 0,
            status_message: "All systems look good.".to_owned(),
        }
    }
}

impl SessionConfig {
    /// Decay delay as a [`Duration`].
    #[must_use]
    pub fn complete_decay(&self) -> Duration {
        Duration::from_millis(self.complete_decay_ms)
    }

    /// Minimum working display time as a [`Duration`].
    #[must_use]
    pub fn minimum_working(&self) -> Duration {
        Duration::from_millis(self.minimum_working_ms)
    }
}

/// Inference process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Bundled script (without `.py`) answering typed intents and automation turns.
    pub local_script: String,
    /// Directory searched for bundled scripts (None = next to the executable).
    pub scripts_dir: Option<PathBuf>,
    /// Explicit interpreter; skips all other resolution when set.
    pub interpreter: Option<PathBuf>,
    /// Install location of the bridge (None = directory of the running executable).
    pub install_dir: Option<PathBuf>,
    /// Shared interpreter environment (None = `<data_dir>/.venv`).
    pub user_env_dir: Option<PathBuf>,
    /// Remote CLI answering voice intents.
    pub remote_program: String,
    /// Arguments placed before the intent text.
    pub remote_args: Vec<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            local_script: "template_backend".to_owned(),
            scripts_dir: None,
            interpreter: None,
            install_dir: None,
            user_env_dir: None,
            remote_program: "gemini".to_owned(),
            remote_args: vec!["-p".to_owned()],
        }
    }
}

impl RunnerConfig {
    /// Target used for typed intents and automation turns.
    #[must_use]
    pub fn local_target(&self) -> InferenceTarget {
        InferenceTarget::Script {
            name: self.local_script.clone(),
        }
    }

    /// Target used for voice intents.
    #[must_use]
    pub fn remote_target(&self) -> InferenceTarget {
        InferenceTarget::Command {
            program: self.remote_program.clone(),
            args: self.remote_args.clone(),
        }
    }
}

/// Automation loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    /// Hard cap on inference turns per run.
    pub max_turns: usize,
    /// Consecutive ENTER-only turns treated as "message sent". `0` disables the guard.
    pub enter_guard_turns: usize,
    /// Pause after a turn's actions so the target UI can settle, in milliseconds.
    pub settle_delay_ms: u64,
    /// Pause between actions of one turn, in milliseconds.
    pub action_delay_ms: u64,
    /// Gap between the focus pulse and the real click, in milliseconds.
    pub click_pulse_gap_ms: u64,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            max_turns: 10,
            enter_guard_turns: 2,
            settle_delay_ms: 1000,
            action_delay_ms: 500,
            click_pulse_gap_ms: 80,
        }
    }
}

impl AutomationConfig {
    /// Settle delay as a [`Duration`].
    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Inter-action delay as a [`Duration`].
    #[must_use]
    pub fn action_delay(&self) -> Duration {
        Duration::from_millis(self.action_delay_ms)
    }

    /// Click pulse gap as a [`Duration`].
    #[must_use]
    pub fn click_pulse_gap(&self) -> Duration {
        Duration::from_millis(self.click_pulse_gap_ms)
    }
}

/// Backend state file configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateFileConfig {
    /// Whether the state file is watched at all.
    pub enabled: bool,
    /// Watched path (None = `<data_dir>/state.json`).
    pub path: Option<PathBuf>,
}

impl Default for StateFileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

impl StateFileConfig {
    /// Effective state file path.
    #[must_use]
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(crate::app_dirs::state_file)
    }
}

impl GhostwireConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::GhostwireError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::GhostwireError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> PathBuf {
        crate::app_dirs::config_file()
    }

    /// Load from `path` when it exists, otherwise return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load_or_default(path: &std::path::Path) -> crate::error::Result<Self> {
        if path.is_file() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }
}
