//! End-to-end behaviour of the session controller with scripted collaborators.

use crate::helpers::{Doubles, ScriptedBackend, fast_config, wait_for_state};
use ghostwire::bridge::runner::InferenceTarget;
use ghostwire::config::{GhostwireConfig, TextMode};
use ghostwire::session::state::{BackendStateUpdate, RejectReason};
use ghostwire::{
    AssistantState, IntentAck, OutputItem, RunError, SessionCommand, SessionHandle,
    session_channel,
};
use std::time::Duration;
use tokio::task::JoinHandle;

fn start(config: GhostwireConfig, doubles: &Doubles) -> (SessionHandle, JoinHandle<()>) {
    let (handle, controller) = session_channel(config, doubles.services());
    (handle, tokio::spawn(controller.run()))
}

fn user(text: &str) -> OutputItem {
    OutputItem::UserMessage(text.to_owned())
}

fn text(value: &str) -> OutputItem {
    OutputItem::Text(value.to_owned())
}

#[tokio::test]
async fn wake_and_retreat_toggle_peek() {
    let doubles = Doubles::new(ScriptedBackend::replying("unused"));
    let (session, _task) = start(fast_config(TextMode::Single), &doubles);

    assert_eq!(session.snapshot().state, AssistantState::Hidden);
    assert!(!session.snapshot().is_peeked);

    assert_eq!(session.wake().await.unwrap(), IntentAck::Accepted);
    let snapshot = session.snapshot();
    assert_eq!(snapshot.state, AssistantState::Idle);
    assert!(snapshot.is_peeked);

    assert_eq!(
        session.wake().await.unwrap(),
        IntentAck::Rejected(RejectReason::NoOp)
    );

    assert_eq!(session.retreat().await.unwrap(), IntentAck::Accepted);
    let snapshot = session.snapshot();
    assert_eq!(snapshot.state, AssistantState::Hidden);
    assert!(!snapshot.is_peeked);

    assert_eq!(
        session.retreat().await.unwrap(),
        IntentAck::Rejected(RejectReason::NoOp)
    );
}

#[tokio::test]
async fn toggle_alternates_between_hidden_and_peeked() {
    let doubles = Doubles::new(ScriptedBackend::replying("unused"));
    let (session, _task) = start(fast_config(TextMode::Single), &doubles);

    session.toggle().await.unwrap();
    assert_eq!(session.snapshot().state, AssistantState::Idle);
    session.toggle().await.unwrap();
    assert_eq!(session.snapshot().state, AssistantState::Hidden);
}

#[tokio::test]
async fn voice_enabled_wakes_into_listening() {
    let doubles = Doubles::new(ScriptedBackend::replying("unused"));
    let mut config = fast_config(TextMode::Single);
    config.session.voice_enabled = true;
    let (session, _task) = start(config, &doubles);

    session.wake().await.unwrap();
    assert_eq!(session.snapshot().state, AssistantState::Listening);

    session
        .send(SessionCommand::SetVoiceEnabled(false))
        .await
        .unwrap();
    let snapshot = session.snapshot();
    assert_eq!(snapshot.state, AssistantState::Idle);
    assert!(!snapshot.voice_enabled);

    session
        .send(SessionCommand::SetVoiceEnabled(true))
        .await
        .unwrap();
    assert_eq!(session.snapshot().state, AssistantState::Listening);
}

#[tokio::test]
async fn blank_submission_is_rejected_without_mutation() {
    let doubles = Doubles::new(ScriptedBackend::replying("unused"));
    let (session, _task) = start(fast_config(TextMode::Single), &doubles);
    session.wake().await.unwrap();
    let before = session.snapshot();

    assert_eq!(
        session.submit_text("   \n").await.unwrap(),
        IntentAck::Rejected(RejectReason::EmptyInput)
    );
    assert_eq!(
        session.submit_intent("").await.unwrap(),
        IntentAck::Rejected(RejectReason::EmptyInput)
    );

    assert_eq!(session.snapshot(), before);
    assert_eq!(doubles.backend.calls(), 0);
}

#[tokio::test]
async fn typed_single_shot_lands_in_idle_with_parsed_items() {
    let doubles = Doubles::new(ScriptedBackend::replying(
        "Template response for: hi\n\n[[image:skibidi.png]]",
    ));
    let (session, _task) = start(fast_config(TextMode::Single), &doubles);
    let mut rx = session.subscribe();
    session.wake().await.unwrap();

    assert_eq!(session.submit_text("  hi ").await.unwrap(), IntentAck::Accepted);

    let snapshot = wait_for_state(&mut rx, AssistantState::Idle).await;
    assert_eq!(
        snapshot.output,
        vec![
            user("hi"),
            text("Template response for: hi"),
            OutputItem::Image("skibidi.png".to_owned()),
        ]
    );
    assert_eq!(doubles.backend.prompts(), vec!["hi"]);
    assert_eq!(
        doubles.backend.targets(),
        vec![InferenceTarget::Script {
            name: "template_backend".to_owned()
        }]
    );
}

#[tokio::test]
async fn second_submission_while_working_is_rejected() {
    let doubles = Doubles::new(
        ScriptedBackend::replying("done").with_delay(Duration::from_millis(200)),
    );
    let (session, _task) = start(fast_config(TextMode::Single), &doubles);
    let mut rx = session.subscribe();
    session.wake().await.unwrap();

    assert!(session.submit_text("first").await.unwrap().is_accepted());
    let snapshot = session.snapshot();
    assert_eq!(snapshot.state, AssistantState::Working);
    assert_eq!(snapshot.output, vec![user("first")]);
    assert_eq!(
        session.submit_text("second").await.unwrap(),
        IntentAck::Rejected(RejectReason::Busy)
    );
    assert_eq!(
        session.send(SessionCommand::FocusLost).await.unwrap(),
        IntentAck::Rejected(RejectReason::Busy)
    );

    let snapshot = wait_for_state(&mut rx, AssistantState::Idle).await;
    assert_eq!(snapshot.output, vec![user("first"), text("done")]);
    assert_eq!(doubles.backend.calls(), 1);
}

#[tokio::test]
async fn voice_intent_completes_then_decays_to_hidden() {
    let doubles = Doubles::new(ScriptedBackend::replying("It is sunny."));
    let (session, _task) = start(fast_config(TextMode::Single), &doubles);
    let mut rx = session.subscribe();
    session.wake().await.unwrap();

    session.submit_intent("what's the weather").await.unwrap();
    let snapshot = wait_for_state(&mut rx, AssistantState::Complete).await;
    assert_eq!(
        snapshot.output,
        vec![user("what's the weather"), text("It is sunny.")]
    );
    assert_eq!(
        doubles.backend.targets(),
        vec![InferenceTarget::Command {
            program: "gemini".to_owned(),
            args: vec!["-p".to_owned()],
        }]
    );

    let snapshot = wait_for_state(&mut rx, AssistantState::Hidden).await;
    assert!(!snapshot.is_peeked);
    // The log survives the retreat.
    assert_eq!(snapshot.output.len(), 2);
}

#[tokio::test]
async fn submission_during_complete_is_rejected() {
    let doubles = Doubles::new(ScriptedBackend::replying("ok"));
    let mut config = fast_config(TextMode::Single);
    config.session.complete_decay_ms = 60_000;
    let (session, _task) = start(config, &doubles);
    let mut rx = session.subscribe();
    session.wake().await.unwrap();

    session.submit_intent("ping").await.unwrap();
    wait_for_state(&mut rx, AssistantState::Complete).await;
    assert_eq!(
        session.submit_text("again").await.unwrap(),
        IntentAck::Rejected(RejectReason::Busy)
    );
}

#[tokio::test]
async fn wake_during_complete_cancels_the_decay() {
    let doubles = Doubles::new(ScriptedBackend::replying("ok"));
    let mut config = fast_config(TextMode::Single);
    config.session.complete_decay_ms = 100;
    let (session, _task) = start(config, &doubles);
    let mut rx = session.subscribe();
    session.wake().await.unwrap();

    session.submit_intent("ping").await.unwrap();
    wait_for_state(&mut rx, AssistantState::Complete).await;
    assert_eq!(session.wake().await.unwrap(), IntentAck::Accepted);
    assert_eq!(session.snapshot().state, AssistantState::Idle);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(session.snapshot().state, AssistantState::Idle);
}

#[tokio::test]
async fn failed_inference_shows_error_bubble_and_returns_to_idle() {
    let doubles = Doubles::new(ScriptedBackend::failing(RunError::NonZeroExit {
        code: 1,
        stderr: "model not loaded".to_owned(),
    }));
    let (session, _task) = start(fast_config(TextMode::Single), &doubles);
    let mut rx = session.subscribe();
    session.wake().await.unwrap();

    session.submit_intent("hello").await.unwrap();
    let snapshot = wait_for_state(&mut rx, AssistantState::Idle).await;
    assert_eq!(snapshot.output, vec![user("hello"), text("model not loaded")]);
}

#[tokio::test]
async fn streaming_output_is_segmented_into_paragraphs() {
    let doubles = Doubles::new(
        ScriptedBackend::replying("")
            .with_chunks(&["Bro actually said", "\n\nTHIS", "\n"])
            .with_delay(Duration::from_millis(10)),
    );
    let (session, _task) = start(fast_config(TextMode::Streaming), &doubles);
    let mut rx = session.subscribe();
    session.wake().await.unwrap();

    session.submit_text("say it").await.unwrap();
    let snapshot = wait_for_state(&mut rx, AssistantState::Idle).await;
    assert_eq!(
        snapshot.output,
        vec![user("say it"), text("Bro actually said"), text("THIS")]
    );
    assert!(snapshot.output.iter().all(|item| !item.is_streaming()));
}

#[tokio::test]
async fn streaming_failure_appends_error_after_partial_output() {
    let doubles = Doubles::new(
        ScriptedBackend::failing(RunError::NonZeroExit {
            code: 2,
            stderr: "stream broke".to_owned(),
        })
        .with_chunks(&["partial"]),
    );
    let (session, _task) = start(fast_config(TextMode::Streaming), &doubles);
    let mut rx = session.subscribe();
    session.wake().await.unwrap();

    session.submit_text("go").await.unwrap();
    let snapshot = wait_for_state(&mut rx, AssistantState::Idle).await;
    assert_eq!(
        snapshot.output,
        vec![user("go"), text("partial"), text("stream broke")]
    );
}

#[tokio::test]
async fn retreat_discards_the_superseded_result() {
    let doubles = Doubles::new(
        ScriptedBackend::replying("late answer").with_delay(Duration::from_millis(150)),
    );
    let (session, _task) = start(fast_config(TextMode::Single), &doubles);
    session.wake().await.unwrap();

    session.submit_text("slow question").await.unwrap();
    let generation = session.snapshot().generation;
    session.retreat().await.unwrap();
    assert!(session.snapshot().generation > generation);

    tokio::time::sleep(Duration::from_millis(400)).await;
    let snapshot = session.snapshot();
    assert_eq!(snapshot.state, AssistantState::Hidden);
    assert_eq!(snapshot.output, vec![user("slow question")]);
}

#[tokio::test]
async fn panicking_worker_reports_an_internal_error() {
    let doubles = Doubles::new(ScriptedBackend::replying("never").panicking());
    let (session, _task) = start(fast_config(TextMode::Single), &doubles);
    let mut rx = session.subscribe();
    session.wake().await.unwrap();

    session.submit_text("boom").await.unwrap();
    let snapshot = wait_for_state(&mut rx, AssistantState::Idle).await;
    assert_eq!(snapshot.output.len(), 2);
    assert!(matches!(
        &snapshot.output[1],
        OutputItem::Text(message) if message.contains("internal error")
    ));
}

#[tokio::test]
async fn focus_loss_retreats_when_not_working() {
    let doubles = Doubles::new(ScriptedBackend::replying("unused"));
    let (session, _task) = start(fast_config(TextMode::Single), &doubles);
    session.wake().await.unwrap();

    assert_eq!(
        session.send(SessionCommand::FocusLost).await.unwrap(),
        IntentAck::Accepted
    );
    assert_eq!(session.snapshot().state, AssistantState::Hidden);
}

#[tokio::test]
async fn voice_phrases_route_to_commands() {
    let doubles = Doubles::new(ScriptedBackend::replying("answer"));
    let (session, _task) = start(fast_config(TextMode::Single), &doubles);
    let mut rx = session.subscribe();

    session
        .send(SessionCommand::VoicePhrase("Hey Ghost!".to_owned()))
        .await
        .unwrap();
    assert_eq!(session.snapshot().state, AssistantState::Idle);

    session
        .send(SessionCommand::VoicePhrase("Ghost, status?".to_owned()))
        .await
        .unwrap();
    assert_eq!(
        session.snapshot().output,
        vec![text("All systems look good.")]
    );

    session
        .send(SessionCommand::VoicePhrase("open my email".to_owned()))
        .await
        .unwrap();
    wait_for_state(&mut rx, AssistantState::Complete).await;
    assert_eq!(doubles.backend.prompts(), vec!["open my email"]);
}

#[tokio::test]
async fn show_message_and_clear_output() {
    let doubles = Doubles::new(ScriptedBackend::replying("unused"));
    let (session, _task) = start(fast_config(TextMode::Single), &doubles);

    session
        .send(SessionCommand::ShowMessage("Microphone access denied".to_owned()))
        .await
        .unwrap();
    let snapshot = session.snapshot();
    assert_eq!(snapshot.state, AssistantState::Hidden);
    assert_eq!(snapshot.output, vec![text("Microphone access denied")]);

    session.send(SessionCommand::ClearOutput).await.unwrap();
    assert!(session.snapshot().output.is_empty());
}

#[tokio::test]
async fn backend_completion_enters_complete_then_hides() {
    let doubles = Doubles::new(ScriptedBackend::replying("unused"));
    let (session, _task) = start(fast_config(TextMode::Single), &doubles);
    let mut rx = session.subscribe();
    session.wake().await.unwrap();

    let update: BackendStateUpdate =
        serde_json::from_str(r#"{"state":"complete","completed":true}"#).unwrap();
    session.post_backend_state(update).unwrap();

    wait_for_state(&mut rx, AssistantState::Complete).await;
    wait_for_state(&mut rx, AssistantState::Hidden).await;
}

#[tokio::test]
async fn backend_progress_is_published() {
    let doubles = Doubles::new(ScriptedBackend::replying("unused"));
    let (session, _task) = start(fast_config(TextMode::Single), &doubles);
    let mut rx = session.subscribe();

    let update: BackendStateUpdate = serde_json::from_str(
        r#"{"state":"working","message":"Planning steps...","step":1,"total_steps":3}"#,
    )
    .unwrap();
    session.post_backend_state(update).unwrap();

    let snapshot = wait_for_state(&mut rx, AssistantState::Working).await;
    let progress = snapshot.progress.expect("progress published");
    assert_eq!(progress.message.as_deref(), Some("Planning steps..."));
    assert_eq!(progress.step, Some(1));
    assert_eq!(progress.total_steps, Some(3));
}

#[tokio::test]
async fn backend_intent_is_submitted_as_voice_intent() {
    let doubles = Doubles::new(ScriptedBackend::replying("Opened."));
    let (session, _task) = start(fast_config(TextMode::Single), &doubles);
    let mut rx = session.subscribe();
    session.wake().await.unwrap();

    session
        .post_backend_state(BackendStateUpdate {
            intent: Some("open notes".to_owned()),
            ..Default::default()
        })
        .unwrap();

    let snapshot = wait_for_state(&mut rx, AssistantState::Complete).await;
    assert_eq!(snapshot.output, vec![user("open notes"), text("Opened.")]);
}

#[tokio::test]
async fn automation_enter_guard_completes_the_run() {
    let doubles = Doubles::new(ScriptedBackend::replying(
        r#"{"action": "ENTER", "position": null, "value": null}"#,
    ));
    let (session, _task) = start(fast_config(TextMode::Automation), &doubles);
    let mut rx = session.subscribe();
    session.wake().await.unwrap();

    session.submit_text("send the message").await.unwrap();
    wait_for_state(&mut rx, AssistantState::Complete).await;

    assert_eq!(doubles.backend.calls(), 2);
    assert_eq!(doubles.driver.calls(), vec!["confirm", "confirm"]);
    assert_eq!(doubles.surface.toggles(), vec![true, false, true, false]);
}

#[tokio::test]
async fn automation_chat_replies_until_turn_limit() {
    let doubles = Doubles::new(ScriptedBackend::replying("Still thinking about it."));
    let (session, _task) = start(fast_config(TextMode::Automation), &doubles);
    let mut rx = session.subscribe();
    session.wake().await.unwrap();

    session.submit_text("do something vague").await.unwrap();
    let snapshot = wait_for_state(&mut rx, AssistantState::Idle).await;

    assert_eq!(doubles.backend.calls(), 10);
    assert_eq!(snapshot.output.len(), 11);
    assert_eq!(snapshot.output[10], text("Still thinking about it."));
    assert!(doubles.driver.calls().is_empty());
}

#[tokio::test]
async fn automation_hide_request_retreats() {
    let doubles = Doubles::new(ScriptedBackend::replying("Sure.\nCOMMAND_HIDE_GHOSTY"));
    let (session, _task) = start(fast_config(TextMode::Automation), &doubles);
    let mut rx = session.subscribe();
    session.wake().await.unwrap();

    session.submit_text("go away").await.unwrap();
    wait_for_state(&mut rx, AssistantState::Hidden).await;
    assert!(doubles.driver.calls().is_empty());
}

#[tokio::test]
async fn automation_failure_returns_to_idle_with_error() {
    let doubles = Doubles::new(ScriptedBackend::failing(RunError::LaunchFailed(
        "python3 missing".to_owned(),
    )));
    let (session, _task) = start(fast_config(TextMode::Automation), &doubles);
    let mut rx = session.subscribe();
    session.wake().await.unwrap();

    session.submit_text("click things").await.unwrap();
    let snapshot = wait_for_state(&mut rx, AssistantState::Idle).await;
    assert!(matches!(
        snapshot.output.last(),
        Some(OutputItem::Text(message)) if message.contains("python3 missing")
    ));
}

const FAR_CLICK: &str = r#"{"action": "CLICK", "position": [0.9, 0.9], "value": null}"#;

fn idle_update() -> BackendStateUpdate {
    BackendStateUpdate {
        state: Some(AssistantState::Idle),
        ..Default::default()
    }
}

fn turns_for(doubles: &Doubles, task: &str) -> usize {
    doubles
        .backend
        .prompts()
        .iter()
        .filter(|prompt| prompt.starts_with(task))
        .count()
}

#[tokio::test]
async fn backend_idle_does_not_release_a_running_automation() {
    let doubles = Doubles::new(
        ScriptedBackend::replying(FAR_CLICK).with_delay(Duration::from_millis(50)),
    );
    let (session, _task) = start(fast_config(TextMode::Automation), &doubles);
    session.wake().await.unwrap();

    assert_eq!(session.submit_text("task-A").await.unwrap(), IntentAck::Accepted);
    session.post_backend_state(idle_update()).unwrap();
    let second = session.submit_text("task-B").await.unwrap();

    assert_eq!(second, IntentAck::Rejected(RejectReason::Busy));
    assert_eq!(session.snapshot().state, AssistantState::Working);
    assert_eq!(turns_for(&doubles, "task-B"), 0);
    session.retreat().await.unwrap();
}

#[tokio::test]
async fn backend_completion_stops_the_running_automation() {
    let doubles = Doubles::new(
        ScriptedBackend::replying(FAR_CLICK).with_delay(Duration::from_millis(50)),
    );
    let (session, _task) = start(fast_config(TextMode::Automation), &doubles);
    let mut rx = session.subscribe();
    session.wake().await.unwrap();

    session.submit_text("task-A").await.unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;
    session
        .send(SessionCommand::BackendState(BackendStateUpdate {
            completed: Some(true),
            ..Default::default()
        }))
        .await
        .unwrap();
    assert_eq!(session.snapshot().state, AssistantState::Complete);
    let task_a_turns = turns_for(&doubles, "task-A");
    assert!(task_a_turns > 0);

    assert_eq!(session.wake().await.unwrap(), IntentAck::Accepted);
    assert_eq!(session.submit_text("task-B").await.unwrap(), IntentAck::Accepted);
    let snapshot = wait_for_state(&mut rx, AssistantState::Idle).await;

    assert_eq!(turns_for(&doubles, "task-A"), task_a_turns);
    assert_eq!(turns_for(&doubles, "task-B"), 10);
    assert!(snapshot.output.contains(&user("task-B")));
    let toggles = doubles.surface.toggles();
    assert!(toggles.chunks(2).all(|pair| pair == [true, false]), "{toggles:?}");
}

#[tokio::test]
async fn peeked_flag_tracks_state_across_mixed_commands() {
    let doubles = Doubles::new(ScriptedBackend::replying("Done."));
    let (session, task) = start(fast_config(TextMode::Single), &doubles);
    let mut rx = session.subscribe();
    let observer = tokio::spawn(async move {
        let mut seen = 0usize;
        while rx.changed().await.is_ok() {
            let snapshot = rx.borrow_and_update().clone();
            assert_eq!(
                snapshot.is_peeked,
                snapshot.state != AssistantState::Hidden,
                "{snapshot:?}"
            );
            seen += 1;
        }
        seen
    });

    let backend = |json: &str| {
        SessionCommand::BackendState(serde_json::from_str(json).expect("state update"))
    };
    let commands = vec![
        SessionCommand::Wake,
        SessionCommand::Toggle,
        SessionCommand::Toggle,
        SessionCommand::SetVoiceEnabled(true),
        SessionCommand::SetVoiceEnabled(false),
        SessionCommand::SubmitText("hi".to_owned()),
        SessionCommand::FocusLost,
        backend(r#"{"state":"idle"}"#),
        SessionCommand::SubmitIntent("ask".to_owned()),
        backend(r#"{"completed":true}"#),
        SessionCommand::Wake,
        SessionCommand::FocusLost,
        SessionCommand::Retreat,
        backend(r#"{"state":"listening"}"#),
        SessionCommand::Retreat,
        backend(r#"{"state":"working"}"#),
        backend(r#"{"state":"hidden"}"#),
        SessionCommand::Toggle,
        SessionCommand::SubmitText("again".to_owned()),
        SessionCommand::Retreat,
    ];
    for command in commands {
        session.send(command).await.unwrap();
        let snapshot = session.snapshot();
        assert_eq!(snapshot.is_peeked, snapshot.state != AssistantState::Hidden);
    }

    drop(session);
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("controller exits")
        .expect("controller task joins");
    let seen = observer.await.expect("observer joins");
    assert!(seen > 0);
}

#[tokio::test]
async fn dropping_every_handle_stops_the_controller() {
    let doubles = Doubles::new(ScriptedBackend::replying("unused"));
    let (session, task) = start(fast_config(TextMode::Single), &doubles);
    drop(session);
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("controller exits")
        .expect("controller task joins");
}
