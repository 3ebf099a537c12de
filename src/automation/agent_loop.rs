//! Bounded multi-turn automation loop.
//!
//! Each turn asks the backend for the next step given the task and the
//! history of what has been done so far, then executes the returned
//! directives. The loop stops on a hide request, an explicit completion, the
//! ENTER guard, an inference failure, the turn cap, or cancellation.

use crate::automation::directive::{ActionDirective, parse_turn};
use crate::automation::executor::ActionExecutor;
use crate::bridge::runner::{InferenceBackend, InferenceTarget};
use crate::config::AutomationConfig;
use crate::error::RunError;
use crate::platform::AvatarSurface;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How an automation run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutomationOutcome {
    /// The model reported completion or the ENTER guard fired.
    Completed,
    /// The model asked the assistant to hide.
    Hidden,
    /// The turn cap was reached without completion.
    TurnLimit,
    /// The run was cancelled by a retreat.
    Cancelled,
    /// An inference call failed.
    Failed(RunError),
}

/// Drives one task to completion. Create one per run.
pub struct AutomationLoop {
    backend: Arc<dyn InferenceBackend>,
    target: InferenceTarget,
    executor: ActionExecutor,
    surface: Arc<dyn AvatarSurface>,
    config: AutomationConfig,
}

impl AutomationLoop {
    pub fn new(
        backend: Arc<dyn InferenceBackend>,
        target: InferenceTarget,
        executor: ActionExecutor,
        surface: Arc<dyn AvatarSurface>,
        config: AutomationConfig,
    ) -> Self {
        Self {
            backend,
            target,
            executor,
            surface,
            config,
        }
    }

    /// Run `task` until a terminal condition.
    ///
    /// `on_reply` receives chat text from turns that produced no directives.
    pub async fn run<F>(&self, task: &str, cancel: &CancellationToken, mut on_reply: F) -> AutomationOutcome
    where
        F: FnMut(String) + Send,
    {
        let mut history: Vec<String> = Vec::new();
        let mut enter_streak = 0usize;
        info!(max_turns = self.config.max_turns, "automation run started");

        for turn in 1..=self.config.max_turns {
            let prompt = build_prompt(task, &history);
            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return AutomationOutcome::Cancelled,
                response = self.backend.complete(&self.target, &prompt) => response,
            };
            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    warn!(turn, error = %e, "automation turn failed");
                    return AutomationOutcome::Failed(e);
                }
            };

            let parsed = parse_turn(&response);
            if let Some(thought) = &parsed.thought {
                debug!(turn, thought = %thought, "model thought");
            }
            if parsed.hide_requested {
                info!(turn, "model requested hide");
                return AutomationOutcome::Hidden;
            }

            if parsed.directives.is_empty() {
                enter_streak = 0;
                if !parsed.reply.is_empty() {
                    on_reply(parsed.reply);
                }
                if parsed.task_completed {
                    info!(turn, "task completed");
                    return AutomationOutcome::Completed;
                }
                continue;
            }

            if parsed.is_enter_only() {
                enter_streak += 1;
            } else {
                enter_streak = 0;
            }

            if !self
                .execute_batch(turn, &parsed.directives, &mut history, cancel)
                .await
            {
                return AutomationOutcome::Cancelled;
            }

            if parsed.task_completed {
                info!(turn, "task completed");
                return AutomationOutcome::Completed;
            }
            let guard = self.config.enter_guard_turns;
            if guard > 0 && enter_streak >= guard {
                info!(turn, enter_streak, "repeated ENTER treated as message sent");
                return AutomationOutcome::Completed;
            }
            if turn < self.config.max_turns
                && !sleep_or_cancel(self.config.settle_delay(), cancel).await
            {
                return AutomationOutcome::Cancelled;
            }
        }

        info!(max_turns = self.config.max_turns, "automation turn limit reached");
        AutomationOutcome::TurnLimit
    }

    /// Execute one turn's directives in order. Returns `false` if cancelled.
    async fn execute_batch(
        &self,
        turn: usize,
        directives: &[ActionDirective],
        history: &mut Vec<String>,
        cancel: &CancellationToken,
    ) -> bool {
        let _guard = HitTestGuard::suspend(self.surface.as_ref());

        for (i, directive) in directives.iter().enumerate() {
            if cancel.is_cancelled() {
                return false;
            }
            if i > 0 && !sleep_or_cancel(self.config.action_delay(), cancel).await {
                return false;
            }
            let entry = match self.executor.execute(directive).await {
                Ok(summary) => summary,
                Err(e) => {
                    debug!(turn, error = %e, "directive not executed");
                    e.to_string()
                }
            };
            history.push(format!("Turn {turn}: {entry}"));
        }
        true
    }
}

/// Task text followed by the action history, when there is any.
#[must_use]
pub fn build_prompt(task: &str, history: &[String]) -> String {
    if history.is_empty() {
        return task.to_owned();
    }
    let mut prompt = format!("{task}\n\nACTION HISTORY:");
    for entry in history {
        prompt.push_str("\n- ");
        prompt.push_str(entry);
    }
    prompt
}

/// Returns `false` when `cancel` fired first.
async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

/// Lets clicks pass through the avatar while alive.
struct HitTestGuard<'a> {
    surface: &'a dyn AvatarSurface,
}

impl<'a> HitTestGuard<'a> {
    fn suspend(surface: &'a dyn AvatarSurface) -> Self {
        surface.set_ignores_mouse_events(true);
        Self { surface }
    }
}

impl Drop for HitTestGuard<'_> {
    fn drop(&mut self) {
        self.surface.set_ignores_mouse_events(false);
    }
}
