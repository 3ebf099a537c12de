//! Routes host command envelopes to the session controller.

use crate::error::{GhostwireError, Result};
use crate::host::contract::{CommandEnvelope, CommandName, EVENT_VERSION, ResponseEnvelope};
use crate::session::controller::{SessionCommand, SessionHandle};
use crate::session::state::IntentAck;

/// Stateless translator from envelopes to [`SessionCommand`]s.
#[derive(Clone)]
pub struct HostRouter {
    session: SessionHandle,
}

impl HostRouter {
    #[must_use]
    pub fn new(session: SessionHandle) -> Self {
        Self { session }
    }

    /// The session this router drives.
    #[must_use]
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Route one envelope and build its response.
    ///
    /// Payload and version problems become error responses; only a stopped
    /// controller is reported as `Err`.
    ///
    /// # Errors
    ///
    /// Returns an error if the session controller is no longer running.
    pub async fn route(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        if let Err(e) = envelope.validate() {
            return Ok(ResponseEnvelope::error(envelope.request_id.clone(), e.to_string()));
        }
        let request_id = envelope.request_id.clone();

        let command = match envelope.command {
            CommandName::HostPing => {
                return Ok(ResponseEnvelope::ok(
                    request_id,
                    serde_json::json!({"pong": true}),
                ));
            }
            CommandName::HostVersion => {
                return Ok(ResponseEnvelope::ok(
                    request_id,
                    serde_json::json!({
                        "contract_version": EVENT_VERSION,
                        "package_version": env!("CARGO_PKG_VERSION"),
                    }),
                ));
            }
            CommandName::RuntimeStop => {
                return Ok(ResponseEnvelope::ok(
                    request_id,
                    serde_json::json!({"stopping": true}),
                ));
            }
            CommandName::SessionSnapshot => {
                let snapshot = serde_json::to_value(self.session.snapshot())
                    .map_err(|e| GhostwireError::Host(format!("snapshot serialization: {e}")))?;
                return Ok(ResponseEnvelope::ok(request_id, snapshot));
            }
            CommandName::SessionWake => SessionCommand::Wake,
            CommandName::SessionToggle => SessionCommand::Toggle,
            CommandName::SessionRetreat => SessionCommand::Retreat,
            CommandName::SessionFocusLost => SessionCommand::FocusLost,
            CommandName::SessionClearOutput => SessionCommand::ClearOutput,
            CommandName::SessionVoiceEnabledSet => match envelope.payload_bool("enabled") {
                Ok(enabled) => SessionCommand::SetVoiceEnabled(enabled),
                Err(e) => return Ok(ResponseEnvelope::error(request_id, e.to_string())),
            },
            CommandName::SessionSubmitIntent
            | CommandName::SessionSubmitText
            | CommandName::SessionVoicePhrase
            | CommandName::SessionShowMessage => {
                let text = match envelope.payload_str("text") {
                    Ok(text) => text.to_owned(),
                    Err(e) => return Ok(ResponseEnvelope::error(request_id, e.to_string())),
                };
                match envelope.command {
                    CommandName::SessionSubmitIntent => SessionCommand::SubmitIntent(text),
                    CommandName::SessionSubmitText => SessionCommand::SubmitText(text),
                    CommandName::SessionVoicePhrase => SessionCommand::VoicePhrase(text),
                    _ => SessionCommand::ShowMessage(text),
                }
            }
        };

        let ack = self.session.send(command).await?;
        Ok(ResponseEnvelope::ok(request_id, ack_payload(ack)))
    }
}

fn ack_payload(ack: IntentAck) -> serde_json::Value {
    match ack {
        IntentAck::Accepted => serde_json::json!({"accepted": true}),
        IntentAck::Rejected(reason) => serde_json::json!({
            "accepted": false,
            "reason": reason,
        }),
    }
}
