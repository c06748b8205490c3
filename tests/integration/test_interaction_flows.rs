//! Interaction Flow Integration Tests
//!
//! Runs commands through the runner with a live detector attached and
//! checks what the human arbiter would be told.

#[path = "../test_utils/mod.rs"]
mod test_utils;

use shellsentry::{
    CommandResult, CommandRunner, DetectorConfig, DetectorEvent, InteractionResponse,
    InteractionSubscription, InteractionType, LineCollector,
};
use test_utils::*;

/// Wait for the first event with this wire name, keeping everything seen
async fn wait_for(
    events: &mut InteractionSubscription,
    seen: &mut Vec<DetectorEvent>,
    name: &str,
) -> DetectorEvent {
    loop {
        let event = events.recv().await.expect("event bus closed");
        seen.push(event.clone());
        if event.name() == name {
            return event;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_password_prompt_answered() {
    let ctx = context("sudo apt-get update", 30_000);
    let command_id = ctx.command_id.clone();
    let (detector, mut events) = detector_for(&ctx);
    let (mut session, transport) = MockSession::new()
        .text("START\r\n[sudo] password for dev: ")
        .spawn();
    let mut hooks = LineCollector::default();
    let mut seen = Vec::new();

    let runner = CommandRunner::default();

    let (result, answer) = tokio::join!(
        runner.run(&mut session, ctx, &mut hooks, Some(&detector)),
        async {
            let event = wait_for(&mut events, &mut seen, "interaction-needed").await;
            let DetectorEvent::InteractionNeeded(request) = event else {
                unreachable!()
            };
            assert_eq!(request.interaction_type, InteractionType::Password);
            assert!(request.prompt_hint.contains("password for dev"));

            let response = InteractionResponse::new(command_id.clone(), "s3cret", true);
            let bytes = detector.take_response_bytes(&response);
            assert_eq!(
                detector.take_response_bytes(&response),
                None,
                "a request accepts one response"
            );
            transport.send("\r\nHit:1 http://archive.ubuntu.com jammy InRelease\r\nEND:0\r\n");
            bytes
        }
    );

    assert_eq!(answer, Some(b"s3cret\n".to_vec()));
    assert_eq!(result, CommandResult::completed(0));
    assert!(hooks
        .texts()
        .contains(&"Hit:1 http://archive.ubuntu.com jammy InRelease".to_string()));

    seen.extend(events.drain());
    assert_eq!(
        event_names(&seen),
        vec!["interaction-needed", "command-completed"]
    );
    assert!(detector.is_released());
}

#[tokio::test(start_paused = true)]
async fn test_confirm_prompt_carries_values() {
    let ctx = context("apt-get install htop", 30_000);
    let (detector, mut events) = detector_for(&ctx);
    let (mut session, transport) = MockSession::new()
        .text("START\r\nAfter this operation, 400 kB will be used.\r\n")
        .text("Do you want to continue? [Y/n] ")
        .spawn();
    let mut hooks = LineCollector::default();
    let mut seen = Vec::new();

    let runner = CommandRunner::default();

    let (result, _) = tokio::join!(
        runner.run(&mut session, ctx, &mut hooks, Some(&detector)),
        async {
            let event = wait_for(&mut events, &mut seen, "interaction-needed").await;
            let DetectorEvent::InteractionNeeded(request) = event else {
                unreachable!()
            };
            assert_eq!(request.interaction_type, InteractionType::Confirm);
            assert_eq!(
                request.confirm_values,
                Some(vec!["y".to_string(), "n".to_string()])
            );
            transport.send("y\r\nEND:0\r\n");
        }
    );

    assert!(result.succeeded());
}

#[tokio::test(start_paused = true)]
async fn test_select_prompt_lists_menu() {
    let ctx = context("./pick.sh", 30_000);
    let (detector, mut events) = detector_for(&ctx);
    let (mut session, transport) = MockSession::new()
        .text("START\n1) staging\n2) production\n#? ")
        .spawn();
    let mut hooks = LineCollector::default();
    let mut seen = Vec::new();

    let runner = CommandRunner::default();

    let (result, _) = tokio::join!(
        runner.run(&mut session, ctx, &mut hooks, Some(&detector)),
        async {
            let event = wait_for(&mut events, &mut seen, "interaction-needed").await;
            let DetectorEvent::InteractionNeeded(request) = event else {
                unreachable!()
            };
            assert_eq!(request.interaction_type, InteractionType::Select);
            assert_eq!(
                request.options,
                Some(vec!["staging".to_string(), "production".to_string()])
            );
            assert_eq!(
                request.option_values,
                Some(vec!["1".to_string(), "2".to_string()])
            );
            transport.send("1\nEND:0\n");
        }
    );

    assert!(result.succeeded());
}

#[tokio::test(start_paused = true)]
async fn test_editor_goes_quiet_and_is_cancelled() {
    let ctx = context("vim notes.txt", 60_000);
    let (detector, mut events) = detector_for(&ctx);
    let (mut session, transport) = MockSession::new()
        .text("START\n\x1b[?1049h\x1b[H~\r\n~\r\n")
        .spawn();
    let mut hooks = LineCollector::default();
    let mut seen = Vec::new();

    let runner = CommandRunner::default();

    let (result, cancel) = tokio::join!(
        runner.run(&mut session, ctx, &mut hooks, Some(&detector)),
        async {
            let event = wait_for(&mut events, &mut seen, "tui-detected").await;
            let DetectorEvent::TuiDetected { message, .. } = event else {
                unreachable!()
            };
            assert!(message.contains("3000ms"));
            let cancel = detector.cancel_bytes();
            transport.send("\x1b[?1049l");
            transport.send("END:130\n");
            cancel
        }
    );

    assert_eq!(cancel, vec![0x03]);
    assert_eq!(result, CommandResult::completed(130));

    seen.extend(events.drain());
    assert_eq!(
        event_names(&seen),
        vec!["alternate-screen-entered", "tui-detected", "command-completed"]
    );
    assert_eq!(
        seen[0],
        DetectorEvent::AlternateScreenEntered {
            command_id: seen[0].command_id().to_string(),
            task_id: None,
            auto_cancel: true,
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_batch_top_is_never_cancelled() {
    let ctx = context("top -n 1", 60_000);
    let (detector, mut events) = detector_for(&ctx);
    let (mut session, _transport) = MockSession::new()
        .text("START\n\x1b[?1049h\x1b[Htop - 10:00:00 up 1 day,  2 users\r\n")
        .text_after(20_000, "\x1b[?1049l")
        .text("END:0\n")
        .spawn();
    let mut hooks = LineCollector::default();

    let result = CommandRunner::default()
        .run(&mut session, ctx, &mut hooks, Some(&detector))
        .await;

    assert!(result.succeeded());
    let seen = events.drain();
    assert_eq!(
        event_names(&seen),
        vec!["alternate-screen-entered", "command-completed"]
    );
    assert!(matches!(
        seen[0],
        DetectorEvent::AlternateScreenEntered { auto_cancel: false, .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_man_page_raises_pager_request() {
    let ctx = context("man ls", 60_000);
    let (detector, mut events) = detector_for(&ctx);
    let (mut session, transport) = MockSession::new()
        .text("START\n\x1b[?1049h\x1b[HLS(1)    User Commands    LS(1)\r\n")
        .text_after(100, "\x1b[24;1H\x1b[7m(END)\x1b[27m")
        .spawn();
    let mut hooks = LineCollector::default();
    let mut seen = Vec::new();

    let runner = CommandRunner::default();

    let (result, cancel) = tokio::join!(
        runner.run(&mut session, ctx, &mut hooks, Some(&detector)),
        async {
            let event = wait_for(&mut events, &mut seen, "interaction-needed").await;
            let DetectorEvent::InteractionNeeded(request) = event else {
                unreachable!()
            };
            assert_eq!(request.interaction_type, InteractionType::Pager);
            assert_eq!(request.exit_key.as_deref(), Some("q"));
            assert_eq!(request.exit_append_newline, Some(false));

            // Well past the silence window; pagers are never auto-cancelled.
            tokio::time::sleep(std::time::Duration::from_secs(20)).await;
            let cancel = detector.cancel_bytes();
            transport.send("\x1b[?1049l");
            transport.send("END:0\n");
            cancel
        }
    );

    assert_eq!(cancel, b"q".to_vec());
    assert!(result.succeeded());
    seen.extend(events.drain());
    assert_eq!(
        event_names(&seen),
        vec!["interaction-needed", "command-completed"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_suppression_is_sticky_but_tui_still_reported() {
    let ctx = context("vim secrets.txt", 60_000);
    let (detector, mut events) = detector_for(&ctx);
    detector.suppress();
    detector.suppress();
    let (mut session, _transport) = MockSession::new()
        .text("START\nEnter passphrase: ")
        .text_after(100, "\n\x1b[?1049h")
        .text_after(5_000, "\x1b[?1049l")
        .text_after(100, "Enter passphrase again: ")
        .text_after(100, "\nEND:1\n")
        .spawn();
    let mut hooks = LineCollector::default();

    let result = CommandRunner::default()
        .run(&mut session, ctx, &mut hooks, Some(&detector))
        .await;

    assert_eq!(result, CommandResult::completed(1));
    assert_eq!(
        event_names(&events.drain()),
        vec![
            "interaction-suppressed",
            "alternate-screen-entered",
            "tui-detected",
            "command-completed"
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_reentering_full_screen_restarts_timers() {
    let ctx = context("vim notes.txt", 60_000);
    let (detector, mut events) = detector_for(&ctx);
    let (mut session, _transport) = MockSession::new()
        .text("START\n\x1b[?1049h")
        .text_after(2_000, "\x1b[?1049l")
        .text_after(2_000, "\x1b[?1049h")
        .text_after(4_000, "\x1b[?1049l")
        .text("END:0\n")
        .spawn();
    let mut hooks = LineCollector::default();

    CommandRunner::default()
        .run(&mut session, ctx, &mut hooks, Some(&detector))
        .await;

    assert_eq!(
        event_names(&events.drain()),
        vec![
            "alternate-screen-entered",
            "alternate-screen-entered",
            "tui-detected",
            "command-completed"
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_busy_full_screen_hits_hard_timeout() {
    let ctx = context("htop", 60_000);
    let config = DetectorConfig {
        tui_hard_timeout_ms: 5_000,
        ..DetectorConfig::default()
    };
    let (detector, mut events) = detector_with(&ctx, config);
    let mut script = MockSession::new().text("START\n\x1b[?1049h");
    // Redraws every second keep the silence timer from firing.
    for _ in 0..8 {
        script = script.text_after(1_000, "\x1b[H CPU 12%");
    }
    let (mut session, _transport) = script.text("\x1b[?1049l").text("END:0\n").spawn();
    let mut hooks = LineCollector::default();

    CommandRunner::default()
        .run(&mut session, ctx, &mut hooks, Some(&detector))
        .await;

    let seen = events.drain();
    assert_eq!(
        event_names(&seen),
        vec!["alternate-screen-entered", "tui-detected", "command-completed"]
    );
    let DetectorEvent::TuiDetected { message, .. } = &seen[1] else {
        panic!("expected tui-detected, got {:?}", seen[1]);
    };
    assert!(message.contains("5000ms"), "{}", message);
}

#[tokio::test(start_paused = true)]
async fn test_prompt_and_end_marker_in_one_chunk() {
    let ctx = context("apt-get install -y foo", 30_000);
    let (detector, mut events) = detector_for(&ctx);
    let (mut session, _transport) = MockSession::new()
        .text("START\nDo you want to continue? [Y/n] END:0\n")
        .spawn();
    let mut hooks = LineCollector::default();

    let result = CommandRunner::default()
        .run(&mut session, ctx, &mut hooks, Some(&detector))
        .await;

    assert!(result.succeeded());
    assert_eq!(event_names(&events.drain()), vec!["command-completed"]);
    assert!(detector.pending_request().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_timeout_releases_detector() {
    let ctx = context("vim notes.txt", 1_000);
    let (detector, mut events) = detector_for(&ctx);
    let (mut session, _transport) = MockSession::new().text("START\n\x1b[?1049h").spawn();
    let mut hooks = LineCollector::default();

    let result = CommandRunner::default()
        .run(&mut session, ctx, &mut hooks, Some(&detector))
        .await;
    assert!(result.timed_out);
    assert!(detector.is_released());

    tokio::time::sleep(std::time::Duration::from_secs(10)).await;
    assert_eq!(
        event_names(&events.drain()),
        vec!["alternate-screen-entered"]
    );
}
