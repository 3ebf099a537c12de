//! Bridge to the external inference backend: process launching and the
//! backend state file.

pub mod resolve;
pub mod runner;
pub mod watcher;

pub use runner::{InferenceBackend, InferenceTarget, ProcessRunner, StreamEvent};
pub use watcher::StateFileWatcher;
