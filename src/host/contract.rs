//! Versioned command/response/event envelopes exchanged with the native shell.

use serde::{Deserialize, Serialize};

/// Contract version for host command/event envelopes.
pub const EVENT_VERSION: u32 = 1;

/// Command set understood by the session host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandName {
    #[serde(rename = "host.ping")]
    HostPing,
    #[serde(rename = "host.version")]
    HostVersion,
    #[serde(rename = "runtime.stop")]
    RuntimeStop,
    #[serde(rename = "session.wake")]
    SessionWake,
    #[serde(rename = "session.toggle")]
    SessionToggle,
    #[serde(rename = "session.retreat")]
    SessionRetreat,
    #[serde(rename = "session.focus_lost")]
    SessionFocusLost,
    #[serde(rename = "session.voice_enabled.set")]
    SessionVoiceEnabledSet,
    #[serde(rename = "session.submit_intent")]
    SessionSubmitIntent,
    #[serde(rename = "session.submit_text")]
    SessionSubmitText,
    #[serde(rename = "session.voice_phrase")]
    SessionVoicePhrase,
    #[serde(rename = "session.show_message")]
    SessionShowMessage,
    #[serde(rename = "session.clear_output")]
    SessionClearOutput,
    #[serde(rename = "session.snapshot")]
    SessionSnapshot,
}

impl CommandName {
    /// Every command, in wire order.
    pub const ALL: [Self; 14] = [
        Self::HostPing,
        Self::HostVersion,
        Self::RuntimeStop,
        Self::SessionWake,
        Self::SessionToggle,
        Self::SessionRetreat,
        Self::SessionFocusLost,
        Self::SessionVoiceEnabledSet,
        Self::SessionSubmitIntent,
        Self::SessionSubmitText,
        Self::SessionVoicePhrase,
        Self::SessionShowMessage,
        Self::SessionClearOutput,
        Self::SessionSnapshot,
    ];

    /// Render command name to wire format.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HostPing => "host.ping",
            Self::HostVersion => "host.version",
            Self::RuntimeStop => "runtime.stop",
            Self::SessionWake => "session.wake",
            Self::SessionToggle => "session.toggle",
            Self::SessionRetreat => "session.retreat",
            Self::SessionFocusLost => "session.focus_lost",
            Self::SessionVoiceEnabledSet => "session.voice_enabled.set",
            Self::SessionSubmitIntent => "session.submit_intent",
            Self::SessionSubmitText => "session.submit_text",
            Self::SessionVoicePhrase => "session.voice_phrase",
            Self::SessionShowMessage => "session.show_message",
            Self::SessionClearOutput => "session.clear_output",
            Self::SessionSnapshot => "session.snapshot",
        }
    }

    /// Parse a command name from wire format.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|name| name.as_str() == raw)
    }
}

/// Event carrying a full [`SessionSnapshot`](crate::session::SessionSnapshot).
pub const SNAPSHOT_EVENT: &str = "session.snapshot";

/// A versioned response envelope from backend host -> frontend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub v: u32,
    pub request_id: String,
    pub ok: bool,
    pub payload: serde_json::Value,
    pub error: Option<String>,
}

impl ResponseEnvelope {
    /// Build a successful response envelope.
    #[must_use]
    pub fn ok(request_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            ok: true,
            payload,
            error: None,
        }
    }

    /// Build an error response envelope.
    #[must_use]
    pub fn error(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            ok: false,
            payload: serde_json::Value::Null,
            error: Some(message.into()),
        }
    }
}

/// A versioned command envelope from frontend -> backend host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub v: u32,
    pub request_id: String,
    pub command: CommandName,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl CommandEnvelope {
    /// Build a v1 command envelope.
    #[must_use]
    pub fn new(
        request_id: impl Into<String>,
        command: CommandName,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            command,
            payload,
        }
    }

    /// Required string field of the payload.
    ///
    /// # Errors
    ///
    /// Returns [`ContractErrorKind::InvalidPayload`] when the field is absent
    /// or not a string.
    pub fn payload_str(&self, field: &str) -> Result<&str, ContractError> {
        self.payload
            .get(field)
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| self.missing_field(field, "string"))
    }

    /// Required boolean field of the payload.
    ///
    /// # Errors
    ///
    /// Returns [`ContractErrorKind::InvalidPayload`] when the field is absent
    /// or not a boolean.
    pub fn payload_bool(&self, field: &str) -> Result<bool, ContractError> {
        self.payload
            .get(field)
            .and_then(serde_json::Value::as_bool)
            .ok_or_else(|| self.missing_field(field, "boolean"))
    }

    fn missing_field(&self, field: &str, kind: &str) -> ContractError {
        ContractError::new(
            ContractErrorKind::InvalidPayload,
            format!("{} requires {kind} field `{field}`", self.command.as_str()),
        )
    }

    /// Validate envelope version and required identifiers.
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.v != EVENT_VERSION {
            return Err(ContractError::new(
                ContractErrorKind::UnsupportedVersion,
                format!(
                    "unsupported contract version {}; expected {}",
                    self.v, EVENT_VERSION
                ),
            ));
        }
        if self.request_id.trim().is_empty() {
            return Err(ContractError::new(
                ContractErrorKind::InvalidEnvelope,
                "request_id cannot be empty".to_owned(),
            ));
        }
        Ok(())
    }
}

/// A versioned event envelope from backend host -> frontend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub v: u32,
    pub event_id: String,
    pub event: String,
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Build a v1 event envelope.
    #[must_use]
    pub fn new(
        event_id: impl Into<String>,
        event: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            v: EVENT_VERSION,
            event_id: event_id.into(),
            event: event.into(),
            payload,
        }
    }
}

/// Contract validation error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractErrorKind {
    UnsupportedVersion,
    InvalidEnvelope,
    InvalidPayload,
}

/// Contract validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractError {
    pub kind: ContractErrorKind,
    pub message: String,
}

impl ContractError {
    #[must_use]
    pub fn new(kind: ContractErrorKind, message: String) -> Self {
        Self { kind, message }
    }
}

impl std::fmt::Display for ContractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ContractError {}
