//! External inference process launching, blocking and streaming.
//!
//! Every invocation passes the input text as a single positional argument:
//! `interpreter <script> <input>` for bundled scripts and
//! `program args… <input>` for remote CLIs.

use crate::bridge::resolve::{self, InterpreterSearch};
use crate::config::RunnerConfig;
use crate::error::RunError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Size of each raw stdout read in streaming mode.
const READ_CHUNK_BYTES: usize = 4096;

/// What to launch for one inference call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InferenceTarget {
    /// Bundled `<name>.py`, run through the resolved interpreter.
    Script { name: String },
    /// CLI resolved on `PATH`, with leading arguments.
    Command { program: String, args: Vec<String> },
}

impl InferenceTarget {
    /// Short label for logs.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Script { name } => name,
            Self::Command { program, .. } => program,
        }
    }
}

/// Fully resolved argv, minus the input argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// Events produced by a streaming run, in stdout write order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Next batch of decoded stdout text.
    Chunk(String),
    /// Terminal signal, sent exactly once.
    Finished(Result<(), RunError>),
}

/// Asynchronous inference seam used by the controller and automation loop.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Run to completion and return the trimmed stdout.
    async fn complete(&self, target: &InferenceTarget, input: &str) -> Result<String, RunError>;

    /// Run and forward stdout chunks followed by one [`StreamEvent::Finished`].
    async fn stream(
        &self,
        target: &InferenceTarget,
        input: &str,
        events: mpsc::Sender<StreamEvent>,
    );
}

/// Launches inference subprocesses with `tokio::process`.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    scripts_dir: Option<PathBuf>,
    interpreter: Option<PathBuf>,
    install_dir: Option<PathBuf>,
    user_env_dir: PathBuf,
}

impl ProcessRunner {
    /// Build a runner from the `[runner]` config section.
    ///
    /// Unset directories default to the executable's directory and the
    /// per-user data directory.
    #[must_use]
    pub fn from_config(config: &RunnerConfig) -> Self {
        Self {
            scripts_dir: config.scripts_dir.clone().or_else(resolve::executable_dir),
            interpreter: config.interpreter.clone(),
            install_dir: config.install_dir.clone().or_else(resolve::executable_dir),
            user_env_dir: config
                .user_env_dir
                .clone()
                .unwrap_or_else(crate::app_dirs::user_env_dir),
        }
    }

    /// Resolve `target` to a concrete program and leading arguments.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::LaunchFailed`] when the script, interpreter or
    /// program cannot be found.
    pub fn resolve(&self, target: &InferenceTarget) -> Result<LaunchSpec, RunError> {
        match target {
            InferenceTarget::Script { name } => {
                let scripts_dir = self.scripts_dir.as_deref().ok_or_else(|| {
                    RunError::LaunchFailed("no scripts directory configured".to_owned())
                })?;
                let script = resolve::find_script(scripts_dir, name).ok_or_else(|| {
                    RunError::LaunchFailed(format!(
                        "script {name}.py not found under {}",
                        scripts_dir.display()
                    ))
                })?;
                let interpreter = InterpreterSearch {
                    explicit: self.interpreter.as_deref(),
                    install_dir: self.install_dir.as_deref(),
                    script_dir: script.parent(),
                    user_env_dir: Some(&self.user_env_dir),
                }
                .resolve()
                .ok_or_else(|| {
                    RunError::LaunchFailed(format!(
                        "no {} interpreter found",
                        resolve::INTERPRETER_NAME
                    ))
                })?;
                debug!(
                    script = %script.display(),
                    interpreter = %interpreter.path.display(),
                    source = ?interpreter.source,
                    "resolved bundled script"
                );
                Ok(LaunchSpec {
                    program: interpreter.path,
                    args: vec![script.to_string_lossy().into_owned()],
                })
            }
            InferenceTarget::Command { program, args } => {
                let program = which::which(program).map_err(|e| {
                    RunError::LaunchFailed(format!("{program} not found on PATH: {e}"))
                })?;
                Ok(LaunchSpec {
                    program,
                    args: args.clone(),
                })
            }
        }
    }

    /// Run `target` to completion.
    ///
    /// # Errors
    ///
    /// Returns [`RunError`] when the process cannot be launched or exits
    /// with a non-zero status.
    pub async fn run(&self, target: &InferenceTarget, input: &str) -> Result<String, RunError> {
        let spec = self.resolve(target)?;
        info!(target = target.label(), "running inference process");

        let output = command(&spec, input)
            .output()
            .await
            .map_err(|e| launch_failed(&spec, &e))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
        } else {
            Err(RunError::NonZeroExit {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            })
        }
    }

    /// Run `target`, forwarding stdout as it is produced.
    ///
    /// Always sends exactly one [`StreamEvent::Finished`], including when the
    /// process cannot be launched. A dropped receiver does not stop the child.
    pub async fn run_streaming(
        &self,
        target: &InferenceTarget,
        input: &str,
        events: mpsc::Sender<StreamEvent>,
    ) {
        let result = self.stream_inner(target, input, &events).await;
        if let Err(ref e) = result {
            warn!(target = target.label(), error = %e, "streaming inference failed");
        }
        let _ = events.send(StreamEvent::Finished(result)).await;
    }

    async fn stream_inner(
        &self,
        target: &InferenceTarget,
        input: &str,
        events: &mpsc::Sender<StreamEvent>,
    ) -> Result<(), RunError> {
        let spec = self.resolve(target)?;
        info!(target = target.label(), "streaming inference process");

        let mut child = command(&spec, input)
            .spawn()
            .map_err(|e| launch_failed(&spec, &e))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| RunError::LaunchFailed("stdout was not captured".to_owned()))?;
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf).await;
                String::from_utf8_lossy(&buf).trim().to_owned()
            })
        });

        let mut carry = Utf8Carry::default();
        let mut buf = [0u8; READ_CHUNK_BYTES];
        loop {
            let n = match stdout.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    warn!(error = %e, "stdout read failed");
                    break;
                }
            };
            let text = carry.decode(&buf[..n]);
            if !text.is_empty() {
                let _ = events.send(StreamEvent::Chunk(text)).await;
            }
        }
        let tail = carry.finish();
        if !tail.is_empty() {
            let _ = events.send(StreamEvent::Chunk(tail)).await;
        }

        let status = child
            .wait()
            .await
            .map_err(|e| RunError::LaunchFailed(format!("failed to wait for process: {e}")))?;
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if status.success() {
            Ok(())
        } else {
            Err(RunError::NonZeroExit {
                code: status.code().unwrap_or(-1),
                stderr,
            })
        }
    }
}

#[async_trait]
impl InferenceBackend for ProcessRunner {
    async fn complete(&self, target: &InferenceTarget, input: &str) -> Result<String, RunError> {
        self.run(target, input).await
    }

    async fn stream(
        &self,
        target: &InferenceTarget,
        input: &str,
        events: mpsc::Sender<StreamEvent>,
    ) {
        self.run_streaming(target, input, events).await;
    }
}

fn command(spec: &LaunchSpec, input: &str) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(&spec.program);
    cmd.args(&spec.args)
        .arg(input)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd
}

fn launch_failed(spec: &LaunchSpec, e: &std::io::Error) -> RunError {
    RunError::LaunchFailed(format!("{}: {e}", spec.program.display()))
}

/// Incremental UTF-8 decoder that holds back split multi-byte sequences.
#[derive(Debug, Default)]
struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    /// Decode `bytes` after any carried prefix. Invalid bytes become U+FFFD;
    /// an incomplete trailing sequence is kept for the next call.
    fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::with_capacity(self.pending.len());
        let mut rest: &[u8] = &self.pending;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }
        let tail = rest.to_vec();
        self.pending = tail;
        out
    }

    /// Flush whatever is left at end of stream.
    fn finish(&mut self) -> String {
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }
}
