//! Property-based tests for chunking independence
//!
//! The same session bytes must produce the same lines, exit code and
//! detector events however the transport happens to split them.

use proptest::prelude::*;
use shellsentry::terminal::{strip_ansi, StreamCursor, StreamEvent};
use shellsentry::{
    CommandResult, CommandRunner, DetectorConfig, DetectorEvent, ExecutionContext,
    InteractionDetector, InteractionEventBus, LineCollector, MarkerPair, SessionStream, Taxonomy,
};
use std::time::Duration;
use tokio::time::Instant;

fn markers() -> MarkerPair {
    MarkerPair::new("START", "END").unwrap()
}

fn transcript(lines: &[String], exit_code: i32, colored: bool) -> String {
    let mut out = String::from("$ echo START; run; echo END:$?\r\n\x1b[0mSTART\r\n");
    for line in lines {
        if colored {
            out.push_str(&format!("\x1b[32m{}\x1b[0m\r\n", line));
        } else {
            out.push_str(&format!("{}\r\n", line));
        }
    }
    out.push_str(&format!("END:{}\r\n$ ", exit_code));
    out
}

/// Split at the given offsets, wrapped into range
fn split_bytes(bytes: &[u8], cuts: &[usize]) -> Vec<Vec<u8>> {
    let mut points: Vec<usize> = cuts.iter().map(|c| c % (bytes.len() + 1)).collect();
    points.sort_unstable();
    points.dedup();

    let mut chunks = Vec::new();
    let mut last = 0;
    for point in points {
        chunks.push(bytes[last..point].to_vec());
        last = point;
    }
    chunks.push(bytes[last..].to_vec());
    chunks
}

/// Split at the given offsets, moved back to character boundaries
fn split_text(text: &str, cuts: &[usize]) -> Vec<String> {
    let mut points: Vec<usize> = cuts
        .iter()
        .map(|c| {
            let mut point = c % (text.len() + 1);
            while !text.is_char_boundary(point) {
                point -= 1;
            }
            point
        })
        .collect();
    points.sort_unstable();
    points.dedup();

    let mut chunks = Vec::new();
    let mut last = 0;
    for point in points {
        chunks.push(text[last..point].to_string());
        last = point;
    }
    chunks.push(text[last..].to_string());
    chunks
}

fn cursor_events(chunks: &[Vec<u8>], max_line_len: usize) -> Vec<StreamEvent> {
    let mut cursor = StreamCursor::new(markers(), max_line_len);
    chunks.iter().flat_map(|chunk| cursor.feed(chunk).1).collect()
}

fn detector_events(command: &str, chunks: &[String]) -> Vec<DetectorEvent> {
    let bus = InteractionEventBus::new(256);
    let mut events = bus.subscribe();
    let mut detector = InteractionDetector::new(
        "cmd",
        None,
        command,
        Taxonomy::shared(),
        DetectorConfig::default(),
        bus,
    );
    let now = Instant::now();
    for chunk in chunks {
        detector.process_output(chunk, now);
    }
    events.drain()
}

fn run_through_runner(chunks: Vec<Vec<u8>>) -> (CommandResult, Vec<String>) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap();

    runtime.block_on(async move {
        let (mut session, peer) = SessionStream::pair();
        for chunk in chunks {
            peer.send_output(chunk);
        }
        let context = ExecutionContext::new(
            "run",
            markers(),
            Duration::from_secs(30),
            Some(Duration::from_millis(500)),
        )
        .unwrap();

        let mut hooks = LineCollector::default();
        let result = CommandRunner::default()
            .run(&mut session, context, &mut hooks, None)
            .await;
        (result, hooks.texts())
    })
}

fn line_texts(events: &[StreamEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Line(line) => Some(line.clone()),
            _ => None,
        })
        .collect()
}

fn output_line() -> impl Strategy<Value = String> {
    "[a-z0-9 .,é]{0,30}"
}

proptest! {
    #[test]
    fn test_cursor_ignores_chunk_boundaries(
        lines in prop::collection::vec(output_line(), 0..12),
        exit_code in -5i32..300,
        colored in any::<bool>(),
        cuts in prop::collection::vec(any::<usize>(), 0..16),
    ) {
        let bytes = transcript(&lines, exit_code, colored).into_bytes();
        let whole = cursor_events(&[bytes.clone()], 1024);
        let split = cursor_events(&split_bytes(&bytes, &cuts), 1024);

        prop_assert_eq!(&whole, &split);
        prop_assert_eq!(whole.last(), Some(&StreamEvent::Finished(exit_code)));

        let texts: Vec<String> = whole
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Line(raw) => Some(strip_ansi(raw)),
                _ => None,
            })
            .collect();
        prop_assert_eq!(texts, lines);
    }

    #[test]
    fn test_line_cap_ignores_chunk_boundaries(
        lines in prop::collection::vec(output_line(), 0..10),
        exit_code in 0i32..256,
        cuts in prop::collection::vec(any::<usize>(), 0..16),
    ) {
        let bytes = transcript(&lines, exit_code, false).into_bytes();
        let whole = cursor_events(&[bytes.clone()], 8);
        let split = cursor_events(&split_bytes(&bytes, &cuts), 8);

        prop_assert_eq!(&whole, &split);
        prop_assert_eq!(whole.last(), Some(&StreamEvent::Finished(exit_code)));

        let pieces = line_texts(&whole);
        prop_assert!(pieces.iter().all(|piece| piece.len() <= 8), "{:?}", pieces);
        prop_assert_eq!(pieces.concat(), lines.concat());
    }

    #[test]
    fn test_end_marker_without_start_never_finishes(
        lines in prop::collection::vec(output_line(), 0..6),
        cuts in prop::collection::vec(any::<usize>(), 0..8),
    ) {
        let mut text = String::from("echo END:$?\r\nEND:0\r\n");
        for line in &lines {
            text.push_str(line);
            text.push_str("\r\nEND:1\r\n");
        }
        let events = cursor_events(&split_bytes(text.as_bytes(), &cuts), 1024);
        prop_assert!(events.is_empty());
    }

    #[test]
    fn test_detector_ignores_chunk_boundaries(
        lines in prop::collection::vec(output_line(), 0..8),
        prompt in prop::sample::select(vec![
            "[sudo] password for dev: ",
            "Do you want to continue? [Y/n] ",
            "Press RETURN",
            "#? ",
        ]),
        colored in any::<bool>(),
        cuts in prop::collection::vec(any::<usize>(), 0..16),
    ) {
        let mut text = String::from("START\r\n");
        for line in &lines {
            if colored {
                text.push_str(&format!("\x1b[1m{}\x1b[0m\r\n", line));
            } else {
                text.push_str(&format!("{}\r\n", line));
            }
        }
        text.push_str(prompt);

        let whole = detector_events("sudo apt upgrade", &[text.clone()]);
        let split = detector_events("sudo apt upgrade", &split_text(&text, &cuts));

        prop_assert_eq!(whole.len(), 1);
        prop_assert_eq!(whole, split);
    }

    #[test]
    fn test_full_screen_entry_ignores_chunk_boundaries(
        redraws in prop::collection::vec(output_line(), 0..6),
        cuts in prop::collection::vec(any::<usize>(), 0..16),
    ) {
        let mut text = String::from("START\r\n\x1b[?1049h");
        for redraw in &redraws {
            text.push_str(&format!("\x1b[H{}", redraw));
        }
        text.push_str("\x1b[?1049l\x1b[?1049h");

        let whole = detector_events("vim notes.txt", &[text.clone()]);
        let split = detector_events("vim notes.txt", &split_text(&text, &cuts));

        prop_assert_eq!(whole.len(), 2);
        prop_assert_eq!(whole, split);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_runner_ignores_chunk_boundaries(
        lines in prop::collection::vec(output_line(), 0..8),
        exit_code in 0i32..256,
        cuts in prop::collection::vec(any::<usize>(), 0..12),
    ) {
        let bytes = transcript(&lines, exit_code, true).into_bytes();
        let (whole_result, whole_lines) = run_through_runner(vec![bytes.clone()]);
        let (split_result, split_lines) = run_through_runner(split_bytes(&bytes, &cuts));

        prop_assert_eq!(whole_result, CommandResult::completed(exit_code));
        prop_assert_eq!(split_result, whole_result);
        prop_assert_eq!(&split_lines, &whole_lines);
        prop_assert_eq!(whole_lines, lines);
    }
}
