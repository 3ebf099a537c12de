//! The assistant session: state machine, output log and stream segmentation.

pub mod controller;
pub mod output;
pub mod segmenter;
pub mod state;

pub use controller::{SessionController, SessionHandle, SessionServices, session_channel};
pub use output::{OutputLog, parse_response_items};
pub use segmenter::StreamingChunkSegmenter;
pub use state::{
    AssistantState, BackendProgress, BackendStateUpdate, IntentAck, OutputItem, RejectReason,
    SessionSnapshot,
};
