//! Session data model shared by the controller, the watcher and the host.

use serde::{Deserialize, Serialize};

/// Lifecycle state of one assistant interaction.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssistantState {
    /// Avatar tucked away; the rest state.
    #[default]
    Hidden,
    /// Peeked, waiting for typed input.
    Idle,
    /// Peeked, waiting for speech.
    Listening,
    /// An inference or automation run is in flight.
    Working,
    /// Finished successfully; decays to `Hidden`.
    Complete,
}

impl AssistantState {
    /// Wire name of the state.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hidden => "hidden",
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Working => "working",
            Self::Complete => "complete",
        }
    }

    /// Whether a new submission must be rejected in this state.
    #[must_use]
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Working | Self::Complete)
    }
}

impl std::fmt::Display for AssistantState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the output log, in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum OutputItem {
    /// Finalized assistant text.
    Text(String),
    /// Paragraph still receiving streamed text.
    StreamingText(String),
    /// Named image resource.
    Image(String),
    /// Echo of what the user asked.
    UserMessage(String),
}

impl OutputItem {
    /// Returns `true` for an open streaming bubble.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::StreamingText(_))
    }
}

/// Snapshot decoded from the backend state file.
///
/// Absent fields are not applied.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendStateUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<AssistantState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<i64>,
}

impl BackendStateUpdate {
    /// Progress fields carried by this update, if any.
    #[must_use]
    pub fn progress(&self) -> Option<BackendProgress> {
        if self.message.is_none() && self.step.is_none() && self.total_steps.is_none() {
            return None;
        }
        Some(BackendProgress {
            message: self.message.clone(),
            step: self.step,
            total_steps: self.total_steps,
        })
    }

    /// Non-empty intent text, trimmed.
    #[must_use]
    pub fn intent_text(&self) -> Option<&str> {
        self.intent
            .as_deref()
            .map(str::trim)
            .filter(|intent| !intent.is_empty())
    }
}

/// Backend-reported progress shown alongside the avatar.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendProgress {
    pub message: Option<String>,
    pub step: Option<i64>,
    pub total_steps: Option<i64>,
}

/// Everything a renderer needs, published after each mutation.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub state: AssistantState,
    pub is_peeked: bool,
    pub voice_enabled: bool,
    pub output: Vec<OutputItem>,
    pub progress: Option<BackendProgress>,
    pub generation: u64,
}

/// Result of handing a command to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum IntentAck {
    /// The command was applied.
    Accepted,
    /// The command was dropped without mutating the session.
    Rejected(RejectReason),
}

impl IntentAck {
    #[must_use]
    pub fn is_accepted(self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Why a command was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Empty or whitespace-only text.
    EmptyInput,
    /// A run is in flight or the session is completing.
    Busy,
    /// The command has nothing to do in the current state.
    NoOp,
}
