//! Logging collaborators for hosts without native input injection.

use super::{AvatarSurface, InputDriver};
use crate::automation::directive::NormalizedPoint;
use tracing::{debug, info};

/// Input driver that only logs what it would do.
///
/// Used on platforms (and in headless hosts) where synthetic input events are
/// not available. Every action succeeds.
pub struct LoggingInputDriver;

impl InputDriver for LoggingInputDriver {
    fn click(&self, point: NormalizedPoint) -> anyhow::Result<()> {
        info!(x = point.x, y = point.y, "click");
        Ok(())
    }

    fn type_text(&self, text: &str) -> anyhow::Result<()> {
        info!(chars = text.chars().count(), "type text");
        Ok(())
    }

    fn press_confirm(&self) -> anyhow::Result<()> {
        info!("press confirm");
        Ok(())
    }
}

/// Surface with no window behind it.
pub struct NoopSurface;

impl AvatarSurface for NoopSurface {
    fn set_ignores_mouse_events(&self, ignores: bool) {
        debug!(ignores, "avatar hit-testing toggled");
    }
}
