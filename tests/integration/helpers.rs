//! Shared doubles and helpers for integration tests.

use async_trait::async_trait;
use ghostwire::automation::directive::NormalizedPoint;
use ghostwire::bridge::runner::{InferenceBackend, InferenceTarget, StreamEvent};
use ghostwire::config::{GhostwireConfig, TextMode};
use ghostwire::platform::{AvatarSurface, InputDriver};
use ghostwire::{AssistantState, RunError, SessionServices, SessionSnapshot};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// How long any single wait in a test may take before it is a failure.
pub(crate) const WAIT_LIMIT: Duration = Duration::from_secs(5);

/// Backend double replaying scripted responses.
///
/// Each `complete` call pops the next scripted response; once the script is
/// exhausted the fallback is returned. Streaming sends the configured chunks
/// followed by the fallback's outcome.
pub(crate) struct ScriptedBackend {
    script: Mutex<VecDeque<Result<String, RunError>>>,
    fallback: Result<String, RunError>,
    prompts: Mutex<Vec<String>>,
    targets: Mutex<Vec<InferenceTarget>>,
    chunks: Vec<String>,
    delay: Duration,
    panics: bool,
}

impl ScriptedBackend {
    pub(crate) fn replying(reply: &str) -> Self {
        Self::new(Vec::new(), Ok(reply.to_owned()))
    }

    pub(crate) fn failing(error: RunError) -> Self {
        Self::new(Vec::new(), Err(error))
    }

    pub(crate) fn sequence(script: Vec<&str>, fallback: &str) -> Self {
        Self::new(
            script.into_iter().map(|s| Ok(s.to_owned())).collect(),
            Ok(fallback.to_owned()),
        )
    }

    fn new(script: Vec<Result<String, RunError>>, fallback: Result<String, RunError>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            prompts: Mutex::new(Vec::new()),
            targets: Mutex::new(Vec::new()),
            chunks: Vec::new(),
            delay: Duration::ZERO,
            panics: false,
        }
    }

    /// Delay every call by `delay` before answering.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Chunks emitted by `stream`.
    pub(crate) fn with_chunks(mut self, chunks: &[&str]) -> Self {
        self.chunks = chunks.iter().map(|c| (*c).to_owned()).collect();
        self
    }

    /// Panic inside every call.
    pub(crate) fn panicking(mut self) -> Self {
        self.panics = true;
        self
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("lock prompts").clone()
    }

    pub(crate) fn targets(&self) -> Vec<InferenceTarget> {
        self.targets.lock().expect("lock targets").clone()
    }

    pub(crate) fn calls(&self) -> usize {
        self.prompts().len()
    }

    fn record(&self, target: &InferenceTarget, input: &str) {
        self.prompts
            .lock()
            .expect("lock prompts")
            .push(input.to_owned());
        self.targets
            .lock()
            .expect("lock targets")
            .push(target.clone());
    }
}

#[async_trait]
impl InferenceBackend for ScriptedBackend {
    async fn complete(&self, target: &InferenceTarget, input: &str) -> Result<String, RunError> {
        self.record(target, input);
        tokio::time::sleep(self.delay).await;
        assert!(!self.panics, "scripted backend panic");
        let next = self.script.lock().expect("lock script").pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }

    async fn stream(
        &self,
        target: &InferenceTarget,
        input: &str,
        events: mpsc::Sender<StreamEvent>,
    ) {
        self.record(target, input);
        assert!(!self.panics, "scripted backend panic");
        for chunk in &self.chunks {
            tokio::time::sleep(self.delay).await;
            let _ = events.send(StreamEvent::Chunk(chunk.clone())).await;
        }
        let result = self.fallback.clone().map(|_| ());
        let _ = events.send(StreamEvent::Finished(result)).await;
    }
}

/// Input driver recording every call as a readable line.
#[derive(Default)]
pub(crate) struct RecordingDriver {
    calls: Mutex<Vec<String>>,
}

impl RecordingDriver {
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("lock driver calls").clone()
    }

    fn record(&self, call: String) -> anyhow::Result<()> {
        self.calls.lock().expect("lock driver calls").push(call);
        Ok(())
    }
}

impl InputDriver for RecordingDriver {
    fn click(&self, point: NormalizedPoint) -> anyhow::Result<()> {
        self.record(format!("click {point}"))
    }

    fn type_text(&self, text: &str) -> anyhow::Result<()> {
        self.record(format!("type {text}"))
    }

    fn press_confirm(&self) -> anyhow::Result<()> {
        self.record("confirm".to_owned())
    }
}

/// Avatar surface recording every hit-testing toggle.
#[derive(Default)]
pub(crate) struct RecordingSurface {
    toggles: Mutex<Vec<bool>>,
}

impl RecordingSurface {
    pub(crate) fn toggles(&self) -> Vec<bool> {
        self.toggles.lock().expect("lock surface toggles").clone()
    }
}

impl AvatarSurface for RecordingSurface {
    fn set_ignores_mouse_events(&self, ignores: bool) {
        self.toggles
            .lock()
            .expect("lock surface toggles")
            .push(ignores);
    }
}

/// Recording collaborators wired into [`SessionServices`].
pub(crate) struct Doubles {
    pub(crate) backend: Arc<ScriptedBackend>,
    pub(crate) driver: Arc<RecordingDriver>,
    pub(crate) surface: Arc<RecordingSurface>,
}

impl Doubles {
    pub(crate) fn new(backend: ScriptedBackend) -> Self {
        Self {
            backend: Arc::new(backend),
            driver: Arc::new(RecordingDriver::default()),
            surface: Arc::new(RecordingSurface::default()),
        }
    }

    pub(crate) fn services(&self) -> SessionServices {
        SessionServices {
            backend: self.backend.clone(),
            driver: self.driver.clone(),
            surface: self.surface.clone(),
        }
    }
}

/// Config with every delay shortened for tests.
pub(crate) fn fast_config(text_mode: TextMode) -> GhostwireConfig {
    let mut config = GhostwireConfig::default();
    config.session.text_mode = text_mode;
    config.session.complete_decay_ms = 200;
    config.automation.settle_delay_ms = 0;
    config.automation.action_delay_ms = 0;
    config.automation.click_pulse_gap_ms = 0;
    config.state_file.enabled = false;
    config
}

/// Wait until the published snapshot is in `state`, returning it.
pub(crate) async fn wait_for_state(
    rx: &mut watch::Receiver<SessionSnapshot>,
    state: AssistantState,
) -> SessionSnapshot {
    let snapshot = tokio::time::timeout(WAIT_LIMIT, rx.wait_for(|s| s.state == state))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {state}"))
        .expect("session controller stopped");
    snapshot.clone()
}
