//! Dispatch of parsed directives to the native input driver.

use crate::automation::directive::{ActionDirective, ActionKind, NormalizedPoint};
use crate::error::ActionError;
use crate::platform::InputDriver;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Normalized rectangle covered by the avatar. Inclusive on every edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GhostZone {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl GhostZone {
    #[must_use]
    pub fn contains(&self, point: NormalizedPoint) -> bool {
        (self.min_x..=self.max_x).contains(&point.x) && (self.min_y..=self.max_y).contains(&point.y)
    }
}

/// The avatar's footprint: top-centre of the screen.
pub const GHOST_ZONE: GhostZone = GhostZone {
    min_x: 0.3,
    max_x: 0.7,
    min_y: 0.0,
    max_y: 0.4,
};

/// Executes one directive at a time through an [`InputDriver`].
#[derive(Clone)]
pub struct ActionExecutor {
    driver: Arc<dyn InputDriver>,
    click_pulse_gap: Duration,
}

impl ActionExecutor {
    pub fn new(driver: Arc<dyn InputDriver>, click_pulse_gap: Duration) -> Self {
        Self {
            driver,
            click_pulse_gap,
        }
    }

    /// Perform `directive` and return a one-line summary of what happened.
    ///
    /// # Errors
    ///
    /// Every [`ActionError`] is non-fatal to the automation run.
    pub async fn execute(&self, directive: &ActionDirective) -> Result<String, ActionError> {
        let summary = directive.summary();
        match &directive.action {
            ActionKind::Click => {
                let point = directive
                    .position
                    .ok_or_else(|| ActionError::MissingPosition(summary.clone()))?;
                if GHOST_ZONE.contains(point) {
                    info!(%point, "refusing click inside assistant area");
                    return Err(ActionError::Refused(summary));
                }
                // Two pulses: the first focuses the target window, the second clicks.
                self.driver.click(point).map_err(driver_error)?;
                tokio::time::sleep(self.click_pulse_gap).await;
                self.driver.click(point).map_err(driver_error)?;
                debug!(%point, "clicked");
                Ok(summary)
            }
            ActionKind::Input => {
                let value = directive
                    .value
                    .as_deref()
                    .ok_or_else(|| ActionError::MissingValue(summary.clone()))?;
                let mut outcome = summary.clone();
                match directive.position {
                    Some(point) if GHOST_ZONE.contains(point) => {
                        info!(%point, "skipping focus click inside assistant area");
                        outcome.push_str(" (focus click skipped)");
                    }
                    Some(point) => self.driver.click(point).map_err(driver_error)?,
                    None => {}
                }
                self.driver.type_text(value).map_err(driver_error)?;
                Ok(outcome)
            }
            ActionKind::Enter => {
                self.driver.press_confirm().map_err(driver_error)?;
                Ok(summary)
            }
            ActionKind::Other(name) => Err(ActionError::Unsupported(name.clone())),
        }
    }
}

fn driver_error(e: anyhow::Error) -> ActionError {
    ActionError::Driver(e.to_string())
}
