//! Autonomous UI automation: directive parsing, execution and the turn loop.

pub mod agent_loop;
pub mod directive;
pub mod executor;

pub use agent_loop::{AutomationLoop, AutomationOutcome};
pub use directive::{ActionDirective, ActionKind, NormalizedPoint, ParsedTurn, parse_turn};
pub use executor::{ActionExecutor, GHOST_ZONE, GhostZone};
