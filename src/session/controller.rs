//! Session controller actor.
//!
//! A single task owns the [`AssistantState`] machine and the output log.
//! Collaborators talk to it through a cloneable [`SessionHandle`]; inference
//! and automation run in spawned workers whose results come back as internal
//! messages tagged with the session generation, so superseded results are
//! dropped instead of applied.

use crate::automation::agent_loop::{AutomationLoop, AutomationOutcome};
use crate::automation::executor::ActionExecutor;
use crate::bridge::runner::{InferenceBackend, InferenceTarget, StreamEvent};
use crate::config::{GhostwireConfig, TextMode};
use crate::error::{GhostwireError, Result, RunError};
use crate::platform::{AvatarSurface, InputDriver};
use crate::session::output::{OutputLog, parse_response_items};
use crate::session::segmenter::StreamingChunkSegmenter;
use crate::session::state::{
    AssistantState, BackendProgress, BackendStateUpdate, IntentAck, OutputItem, RejectReason,
    SessionSnapshot,
};
use crate::voice_command::{SpeechCommand, parse_phrase};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Capacity of the public command queue.
const REQUEST_CAPACITY: usize = 64;
/// Capacity of the per-run stream event queue.
const STREAM_CAPACITY: usize = 64;

/// Commands accepted by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Peek the avatar (hotkey, wake word, menu).
    Wake,
    /// Retreat when peeked, otherwise wake.
    Toggle,
    /// Hide immediately, cancelling any run.
    Retreat,
    /// The assistant window resigned focus.
    FocusLost,
    /// Switch between voice and typed input.
    SetVoiceEnabled(bool),
    /// Voice intent answered by the remote target.
    SubmitIntent(String),
    /// Typed intent answered per the configured text mode.
    SubmitText(String),
    /// Raw recognised speech, routed through the phrase table.
    VoicePhrase(String),
    /// Append an informational text bubble.
    ShowMessage(String),
    /// Empty the output log.
    ClearOutput,
    /// Merge a decoded backend state file.
    BackendState(BackendStateUpdate),
}

impl SessionCommand {
    fn name(&self) -> &'static str {
        match self {
            Self::Wake => "wake",
            Self::Toggle => "toggle",
            Self::Retreat => "retreat",
            Self::FocusLost => "focus_lost",
            Self::SetVoiceEnabled(_) => "set_voice_enabled",
            Self::SubmitIntent(_) => "submit_intent",
            Self::SubmitText(_) => "submit_text",
            Self::VoicePhrase(_) => "voice_phrase",
            Self::ShowMessage(_) => "show_message",
            Self::ClearOutput => "clear_output",
            Self::BackendState(_) => "backend_state",
        }
    }
}

/// External collaborators the controller drives.
#[derive(Clone)]
pub struct SessionServices {
    pub backend: Arc<dyn InferenceBackend>,
    pub driver: Arc<dyn InputDriver>,
    pub surface: Arc<dyn AvatarSurface>,
}

struct SessionRequest {
    command: SessionCommand,
    ack: oneshot::Sender<IntentAck>,
}

/// Cloneable client side of the controller.
#[derive(Clone)]
pub struct SessionHandle {
    request_tx: mpsc::Sender<SessionRequest>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    /// Send `command` and wait for the controller's verdict.
    ///
    /// # Errors
    ///
    /// Returns [`GhostwireError::Session`] if the controller has stopped.
    pub async fn send(&self, command: SessionCommand) -> Result<IntentAck> {
        let (ack, ack_rx) = oneshot::channel();
        self.request_tx
            .send(SessionRequest { command, ack })
            .await
            .map_err(|_| GhostwireError::Session("session controller stopped".to_owned()))?;
        ack_rx
            .await
            .map_err(|e| GhostwireError::Channel(format!("session ack dropped: {e}")))
    }

    pub async fn wake(&self) -> Result<IntentAck> {
        self.send(SessionCommand::Wake).await
    }

    pub async fn toggle(&self) -> Result<IntentAck> {
        self.send(SessionCommand::Toggle).await
    }

    pub async fn retreat(&self) -> Result<IntentAck> {
        self.send(SessionCommand::Retreat).await
    }

    pub async fn submit_intent(&self, text: impl Into<String>) -> Result<IntentAck> {
        self.send(SessionCommand::SubmitIntent(text.into())).await
    }

    pub async fn submit_text(&self, text: impl Into<String>) -> Result<IntentAck> {
        self.send(SessionCommand::SubmitText(text.into())).await
    }

    /// Queue a backend state update without waiting.
    ///
    /// Safe to call from synchronous callbacks.
    ///
    /// # Errors
    ///
    /// Returns [`GhostwireError::Channel`] when the queue is full or closed.
    pub fn post_backend_state(&self, update: BackendStateUpdate) -> Result<()> {
        let (ack, _) = oneshot::channel();
        self.request_tx
            .try_send(SessionRequest {
                command: SessionCommand::BackendState(update),
                ack,
            })
            .map_err(|e| GhostwireError::Channel(format!("backend state dropped: {e}")))
    }

    /// Receiver notified after every mutation.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_rx.clone()
    }

    /// The latest published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }
}

/// Worker results and timers, tagged so stale ones can be dropped.
enum Internal {
    InferenceFinished {
        generation: u64,
        remote: bool,
        result: std::result::Result<String, RunError>,
    },
    StreamChunk {
        generation: u64,
        text: String,
    },
    StreamFinished {
        generation: u64,
        result: std::result::Result<(), RunError>,
    },
    LoopReply {
        generation: u64,
        text: String,
    },
    LoopFinished {
        generation: u64,
        outcome: AutomationOutcome,
    },
    WorkerFailed {
        generation: u64,
        message: String,
    },
    DecayElapsed {
        epoch: u64,
    },
}

impl Internal {
    fn generation(&self) -> Option<u64> {
        match self {
            Self::InferenceFinished { generation, .. }
            | Self::StreamChunk { generation, .. }
            | Self::StreamFinished { generation, .. }
            | Self::LoopReply { generation, .. }
            | Self::LoopFinished { generation, .. }
            | Self::WorkerFailed { generation, .. } => Some(*generation),
            Self::DecayElapsed { .. } => None,
        }
    }

    fn ends_run(&self) -> bool {
        matches!(
            self,
            Self::InferenceFinished { .. }
                | Self::StreamFinished { .. }
                | Self::LoopFinished { .. }
                | Self::WorkerFailed { .. }
        )
    }
}

/// The actor owning the session. Drive it with [`run`](Self::run).
pub struct SessionController {
    config: GhostwireConfig,
    services: SessionServices,
    request_rx: mpsc::Receiver<SessionRequest>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    state: AssistantState,
    voice_enabled: bool,
    output: OutputLog,
    segmenter: StreamingChunkSegmenter,
    progress: Option<BackendProgress>,
    generation: u64,
    decay_epoch: u64,
    decay_cancel: Option<CancellationToken>,
    /// Present while a run of the current generation is in flight.
    run_cancel: Option<CancellationToken>,
    /// Held by an automation worker for its whole run.
    input_lease: Arc<Mutex<()>>,
}

/// Create a connected handle and controller.
#[must_use]
pub fn session_channel(
    config: GhostwireConfig,
    services: SessionServices,
) -> (SessionHandle, SessionController) {
    let (request_tx, request_rx) = mpsc::channel(REQUEST_CAPACITY);
    let (internal_tx, internal_rx) = mpsc::unbounded_channel();
    let voice_enabled = config.session.voice_enabled;
    let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot {
        voice_enabled,
        ..Default::default()
    });

    (
        SessionHandle {
            request_tx,
            snapshot_rx,
        },
        SessionController {
            config,
            services,
            request_rx,
            internal_tx,
            internal_rx,
            snapshot_tx,
            state: AssistantState::Hidden,
            voice_enabled,
            output: OutputLog::new(),
            segmenter: StreamingChunkSegmenter::new(),
            progress: None,
            generation: 0,
            decay_epoch: 0,
            decay_cancel: None,
            run_cancel: None,
            input_lease: Arc::new(Mutex::new(())),
        },
    )
}

impl SessionController {
    /// Process commands until every [`SessionHandle`] is dropped.
    pub async fn run(mut self) {
        info!(
            text_mode = ?self.config.session.text_mode,
            voice_enabled = self.voice_enabled,
            "session controller started"
        );
        loop {
            tokio::select! {
                request = self.request_rx.recv() => {
                    let Some(request) = request else { break };
                    let ack = self.handle_command(request.command);
                    // Publish first so the caller observes the new state once acked.
                    self.publish();
                    let _ = request.ack.send(ack);
                }
                Some(message) = self.internal_rx.recv() => {
                    self.handle_internal(message);
                    self.publish();
                }
            }
        }
        self.cancel_decay();
        self.cancel_run();
        info!("session controller stopped");
    }

    fn handle_command(&mut self, command: SessionCommand) -> IntentAck {
        let name = command.name();
        let ack = match command {
            SessionCommand::Wake => self.wake(),
            SessionCommand::Toggle => {
                if self.state == AssistantState::Hidden {
                    self.wake()
                } else {
                    self.retreat("toggle")
                }
            }
            SessionCommand::Retreat => self.retreat("retreat"),
            SessionCommand::FocusLost => {
                if self.state == AssistantState::Working {
                    IntentAck::Rejected(RejectReason::Busy)
                } else {
                    self.retreat("focus lost")
                }
            }
            SessionCommand::SetVoiceEnabled(enabled) => self.set_voice_enabled(enabled),
            SessionCommand::SubmitIntent(text) => self.submit_intent(&text),
            SessionCommand::SubmitText(text) => self.submit_text(&text),
            SessionCommand::VoicePhrase(text) => self.voice_phrase(&text),
            SessionCommand::ShowMessage(text) => self.show_message(&text),
            SessionCommand::ClearOutput => {
                self.output.clear();
                self.segmenter.reset();
                IntentAck::Accepted
            }
            SessionCommand::BackendState(update) => self.apply_backend_state(update),
        };
        if let IntentAck::Rejected(reason) = ack {
            debug!(command = name, ?reason, state = %self.state, "command rejected");
        }
        ack
    }

    fn wake(&mut self) -> IntentAck {
        match self.state {
            AssistantState::Hidden | AssistantState::Complete => {
                let target = self.resting_state();
                info!(from = %self.state, to = %target, "waking");
                self.set_state(target);
                IntentAck::Accepted
            }
            _ => IntentAck::Rejected(RejectReason::NoOp),
        }
    }

    fn retreat(&mut self, reason: &str) -> IntentAck {
        if self.state == AssistantState::Hidden {
            return IntentAck::Rejected(RejectReason::NoOp);
        }
        info!(reason, from = %self.state, "retreating");
        self.generation += 1;
        self.cancel_run();
        self.segmenter.seal(&mut self.output);
        self.progress = None;
        self.set_state(AssistantState::Hidden);
        IntentAck::Accepted
    }

    fn set_voice_enabled(&mut self, enabled: bool) -> IntentAck {
        self.voice_enabled = enabled;
        match (self.state, enabled) {
            (AssistantState::Listening, false) => self.set_state(AssistantState::Idle),
            (AssistantState::Idle, true) => self.set_state(AssistantState::Listening),
            _ => {}
        }
        IntentAck::Accepted
    }

    fn show_message(&mut self, text: &str) -> IntentAck {
        let text = text.trim();
        if text.is_empty() {
            return IntentAck::Rejected(RejectReason::EmptyInput);
        }
        self.segmenter.seal(&mut self.output);
        self.output.push(OutputItem::Text(text.to_owned()));
        IntentAck::Accepted
    }

    fn voice_phrase(&mut self, text: &str) -> IntentAck {
        match parse_phrase(text) {
            SpeechCommand::Wake => self.handle_command(SessionCommand::Toggle),
            SpeechCommand::Retreat => self.retreat("voice"),
            SpeechCommand::Status => {
                let message = self.config.session.status_message.clone();
                self.show_message(&message)
            }
            SpeechCommand::Intent(intent) => self.submit_intent(&intent),
            SpeechCommand::Empty => IntentAck::Rejected(RejectReason::EmptyInput),
        }
    }

    /// Shared guards and bookkeeping for both intent kinds.
    ///
    /// Returns the trimmed text and the new run's cancellation token.
    fn begin_run(
        &mut self,
        text: &str,
    ) -> std::result::Result<(String, CancellationToken), RejectReason> {
        let text = text.trim();
        if text.is_empty() {
            return Err(RejectReason::EmptyInput);
        }
        if self.state.is_busy() {
            return Err(RejectReason::Busy);
        }
        self.cancel_run();
        self.generation += 1;
        let cancel = CancellationToken::new();
        self.run_cancel = Some(cancel.clone());
        self.progress = None;
        self.segmenter.seal(&mut self.output);
        self.set_state(AssistantState::Working);
        self.output.push(OutputItem::UserMessage(text.to_owned()));
        Ok((text.to_owned(), cancel))
    }

    fn cancel_run(&mut self) {
        if let Some(token) = self.run_cancel.take() {
            token.cancel();
        }
    }

    /// End the in-flight run, if any, so none of its results are applied.
    fn abandon_run(&mut self, reason: &str) {
        if self.run_cancel.is_none() {
            return;
        }
        info!(reason, generation = self.generation, "abandoning run");
        self.cancel_run();
        self.generation += 1;
        self.segmenter.seal(&mut self.output);
    }

    fn submit_intent(&mut self, text: &str) -> IntentAck {
        let (intent, _) = match self.begin_run(text) {
            Ok(run) => run,
            Err(reason) => return IntentAck::Rejected(reason),
        };
        info!(generation = self.generation, "voice intent accepted");
        let target = self.config.runner.remote_target();
        self.spawn_single_shot(target, intent, true);
        IntentAck::Accepted
    }

    fn submit_text(&mut self, text: &str) -> IntentAck {
        let (input, cancel) = match self.begin_run(text) {
            Ok(run) => run,
            Err(reason) => return IntentAck::Rejected(reason),
        };
        let mode = self.config.session.text_mode;
        info!(generation = self.generation, ?mode, "text intent accepted");
        let target = self.config.runner.local_target();
        match mode {
            TextMode::Single => self.spawn_single_shot(target, input, false),
            TextMode::Streaming => self.spawn_streaming(target, input),
            TextMode::Automation => self.spawn_automation(target, input, cancel),
        }
        IntentAck::Accepted
    }

    fn apply_backend_state(&mut self, update: BackendStateUpdate) -> IntentAck {
        if let Some(progress) = update.progress() {
            self.progress = Some(progress);
        }
        match update.state {
            Some(AssistantState::Hidden) => {
                self.retreat("backend state");
            }
            Some(AssistantState::Complete) => {
                self.abandon_run("backend reported completion");
                self.enter_complete();
            }
            Some(state) if self.run_cancel.is_some() => {
                debug!(%state, "ignoring backend state while a run is in flight");
            }
            Some(state) => self.set_state(state),
            None => {}
        }
        if update.completed == Some(true) && self.state != AssistantState::Complete {
            self.abandon_run("backend reported completion");
            self.enter_complete();
        }
        if let Some(intent) = update.intent_text() {
            let ack = self.submit_intent(intent);
            if !ack.is_accepted() {
                debug!(?ack, "backend intent not submitted");
            }
        }
        IntentAck::Accepted
    }

    fn handle_internal(&mut self, message: Internal) {
        if let Some(generation) = message.generation()
            && generation != self.generation
        {
            debug!(generation, current = self.generation, "dropping stale worker result");
            return;
        }

        if message.ends_run() {
            self.run_cancel = None;
        }

        match message {
            Internal::InferenceFinished { remote, result, .. } => match result {
                Ok(response) => {
                    self.output.extend(parse_response_items(&response));
                    if remote {
                        self.enter_complete();
                    } else {
                        self.set_state(AssistantState::Idle);
                    }
                }
                Err(e) => self.fail_run(&e),
            },
            Internal::StreamChunk { text, .. } => self.segmenter.push(&mut self.output, &text),
            Internal::StreamFinished { result, .. } => {
                let result = result.map_err(|e| {
                    warn!(error = %e, "streaming run failed");
                    e.user_message()
                });
                self.segmenter.finish(&mut self.output, result);
                self.set_state(AssistantState::Idle);
            }
            Internal::LoopReply { text, .. } => {
                self.segmenter.seal(&mut self.output);
                self.output.push(OutputItem::Text(text));
            }
            Internal::LoopFinished { outcome, .. } => {
                info!(?outcome, "automation run finished");
                match outcome {
                    AutomationOutcome::Completed => self.enter_complete(),
                    AutomationOutcome::Hidden => {
                        self.retreat("hide requested");
                    }
                    AutomationOutcome::TurnLimit => self.set_state(AssistantState::Idle),
                    AutomationOutcome::Cancelled => {}
                    AutomationOutcome::Failed(e) => self.fail_run(&e),
                }
            }
            Internal::WorkerFailed { message, .. } => {
                warn!(%message, "worker failed");
                self.segmenter.seal(&mut self.output);
                self.output.push(OutputItem::Text(message));
                self.set_state(AssistantState::Idle);
            }
            Internal::DecayElapsed { epoch } => {
                if epoch == self.decay_epoch && self.state == AssistantState::Complete {
                    self.retreat("complete decay");
                }
            }
        }
    }

    fn fail_run(&mut self, error: &RunError) {
        warn!(error = %error, "inference failed");
        self.segmenter.seal(&mut self.output);
        self.output.push(OutputItem::Text(error.user_message()));
        self.set_state(AssistantState::Idle);
    }

    fn resting_state(&self) -> AssistantState {
        if self.voice_enabled {
            AssistantState::Listening
        } else {
            AssistantState::Idle
        }
    }

    /// Every state change goes through here; leaving `complete` cancels the decay.
    fn set_state(&mut self, state: AssistantState) {
        if state != AssistantState::Complete {
            self.cancel_decay();
        }
        if self.state != state {
            debug!(from = %self.state, to = %state, "state transition");
            self.state = state;
        }
    }

    fn enter_complete(&mut self) {
        self.set_state(AssistantState::Complete);
        self.cancel_decay();
        self.decay_epoch += 1;
        let epoch = self.decay_epoch;
        let token = CancellationToken::new();
        self.decay_cancel = Some(token.clone());

        let delay = self.config.session.complete_decay();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(Internal::DecayElapsed { epoch });
                }
            }
        });
    }

    fn cancel_decay(&mut self) {
        if let Some(token) = self.decay_cancel.take() {
            token.cancel();
        }
    }

    fn spawn_single_shot(&mut self, target: InferenceTarget, input: String, remote: bool) {
        let backend = Arc::clone(&self.services.backend);
        let minimum = self.config.session.minimum_working();
        let generation = self.generation;
        let tx = self.internal_tx.clone();
        self.spawn_worker(async move {
            let started = Instant::now();
            let result = backend.complete(&target, &input).await;
            let remaining = minimum.saturating_sub(started.elapsed());
            if !remaining.is_zero() {
                tokio::time::sleep(remaining).await;
            }
            let _ = tx.send(Internal::InferenceFinished {
                generation,
                remote,
                result,
            });
        });
    }

    fn spawn_streaming(&mut self, target: InferenceTarget, input: String) {
        self.segmenter.begin(&mut self.output);
        let backend = Arc::clone(&self.services.backend);
        let generation = self.generation;
        let tx = self.internal_tx.clone();
        self.spawn_worker(async move {
            let (events_tx, mut events_rx) = mpsc::channel(STREAM_CAPACITY);
            let forward = async {
                while let Some(event) = events_rx.recv().await {
                    match event {
                        StreamEvent::Chunk(text) => {
                            let _ = tx.send(Internal::StreamChunk { generation, text });
                        }
                        StreamEvent::Finished(result) => {
                            let _ = tx.send(Internal::StreamFinished { generation, result });
                            return;
                        }
                    }
                }
                let _ = tx.send(Internal::StreamFinished {
                    generation,
                    result: Err(RunError::LaunchFailed(
                        "stream ended without a result".to_owned(),
                    )),
                });
            };
            tokio::join!(backend.stream(&target, &input, events_tx), forward);
        });
    }

    fn spawn_automation(
        &mut self,
        target: InferenceTarget,
        task: String,
        cancel: CancellationToken,
    ) {
        let automation = AutomationLoop::new(
            Arc::clone(&self.services.backend),
            target,
            ActionExecutor::new(
                Arc::clone(&self.services.driver),
                self.config.automation.click_pulse_gap(),
            ),
            Arc::clone(&self.services.surface),
            self.config.automation.clone(),
        );
        let lease = Arc::clone(&self.input_lease);
        let generation = self.generation;
        let tx = self.internal_tx.clone();
        self.spawn_worker(async move {
            let reply_tx = tx.clone();
            // A superseded loop may still be finishing an action; wait for it.
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => AutomationOutcome::Cancelled,
                _lease = lease.lock_owned() => {
                    automation
                        .run(&task, &cancel, move |text| {
                            let _ = reply_tx.send(Internal::LoopReply { generation, text });
                        })
                        .await
                }
            };
            let _ = tx.send(Internal::LoopFinished {
                generation,
                outcome,
            });
        });
    }

    /// Spawn `work`, reporting a panic as a failed run of the current generation.
    fn spawn_worker<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let generation = self.generation;
        let tx = self.internal_tx.clone();
        let handle = tokio::spawn(work);
        tokio::spawn(async move {
            if let Err(e) = handle.await {
                let _ = tx.send(Internal::WorkerFailed {
                    generation,
                    message: format!("The assistant hit an internal error: {e}"),
                });
            }
        });
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            is_peeked: self.state != AssistantState::Hidden,
            voice_enabled: self.voice_enabled,
            output: self.output.items().to_vec(),
            progress: self.progress.clone(),
            generation: self.generation,
        }
    }

    fn publish(&self) {
        let next = self.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}
