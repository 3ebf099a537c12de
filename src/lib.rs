//! Ghostwire: assistant session controller and automation bridge.
//!
//! The crate drives one desktop assistant interaction at a time:
//! intent → inference process → displayed output or on-screen actions.
//!
//! # Architecture
//!
//! - **Session**: a single-writer actor owning the assistant state machine
//!   and the output log ([`session`])
//! - **Bridge**: launching and streaming external inference processes and
//!   watching the backend state file ([`bridge`])
//! - **Automation**: parsing model output into UI directives and running the
//!   bounded multi-turn loop ([`automation`])
//! - **Platform**: input injection and avatar window collaborators
//!   ([`platform`])
//! - **Host**: the newline-delimited JSON protocol spoken with the native
//!   shell ([`host`])

pub mod app_dirs;
pub mod automation;
pub mod bridge;
pub mod config;
pub mod error;
pub mod host;
pub mod platform;
pub mod session;
pub mod voice_command;

pub use config::GhostwireConfig;
pub use error::{ActionError, GhostwireError, Result, RunError};
pub use session::{
    AssistantState, IntentAck, OutputItem, SessionController, SessionHandle, SessionServices,
    SessionSnapshot, session_channel,
};
pub use session::controller::SessionCommand;
