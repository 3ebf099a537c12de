//! Native collaborators the automation core drives.
//!
//! [`InputDriver`] performs physical input events and [`AvatarSurface`]
//! controls whether the avatar window intercepts the mouse. Hosts with native
//! injection supply their own implementations; everywhere else the logging
//! stubs from [`stub`] are used.

use crate::automation::directive::NormalizedPoint;
use std::sync::Arc;

pub mod stub;

/// Low-level input injection.
///
/// Points are normalized to the main display; mapping to pixels is the
/// driver's concern.
pub trait InputDriver: Send + Sync {
    /// One mouse-down/mouse-up pulse at `point`.
    fn click(&self, point: NormalizedPoint) -> anyhow::Result<()>;

    /// Type `text` into the focused element.
    fn type_text(&self, text: &str) -> anyhow::Result<()>;

    /// Press the confirm (Return) key once.
    fn press_confirm(&self) -> anyhow::Result<()>;
}

/// The avatar window, as far as automation is concerned.
pub trait AvatarSurface: Send + Sync {
    /// Let mouse events pass through the avatar (`true`) or capture them again.
    fn set_ignores_mouse_events(&self, ignores: bool);
}

/// Create the input driver for this platform.
pub fn create_input_driver() -> Arc<dyn InputDriver> {
    Arc::new(stub::LoggingInputDriver)
}

/// Create the avatar surface for this platform.
pub fn create_surface() -> Arc<dyn AvatarSurface> {
    Arc::new(stub::NoopSurface)
}
