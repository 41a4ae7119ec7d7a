//! Integration tests for trace reconstruction and recordings
//!
//! These tests use the fixtures in `tests/fixtures/` to verify
//! the end-to-end flow from recorded frames to the rendered transcript.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use runscope_core::replay::{read_recording, render_transcript, replay_into, Recorder, ReplaySummary};
use runscope_core::{dispatch, IgnoreReason, LaneMark, Outcome, ViewerState};

/// Get the path to a fixture file
fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn replayed_state() -> (ViewerState, ReplaySummary) {
    runscope_core::logging::init_test();
    let records = read_recording(&fixture_path("recording.jsonl")).expect("fixture should load");
    let mut state = ViewerState::new(Duration::from_millis(100));
    let summary = replay_into(&mut state, &records, None).expect("fixture names a run");
    (state, summary)
}

// ============================================
// Replay Tests
// ============================================

#[test]
fn test_replay_counts_frames() {
    let (_, summary) = replayed_state();

    // 17 lines, one unreadable; the frame for run 4 is stale.
    assert_eq!(
        summary,
        ReplaySummary {
            applied: 15,
            ignored: 1
        }
    );
}

#[test]
fn test_replay_reconstructs_messages() {
    let (state, _) = replayed_state();
    let session = state.session().expect("run 3 is selected");
    assert_eq!(session.run_id, 3);

    let ids: Vec<i64> = session.trace.messages().map(|m| m.id).collect();
    assert_eq!(ids, vec![0, 1, 2]);

    let streamed = session.trace.get(1).unwrap();
    assert_eq!(streamed.content, "Let me look around.");
    assert_eq!(streamed.tokens_query, Some(812));
    assert_eq!(streamed.role.as_deref(), Some("assistant"));

    let call = streamed.tool_call("call_0").unwrap();
    assert_eq!(call.state, "success");
    assert_eq!(call.duration, Some(0.42));
    assert_eq!(call.result_text, "total 8\ndrwxr-xr-x lowpriv\n");

    // The stale fragment for run 4 must not have touched message 2.
    assert_eq!(session.trace.get(2).unwrap().content, "Found a user directory.");
}

#[test]
fn test_replay_lays_out_sections() {
    let (state, _) = replayed_state();
    let session = state.session().unwrap();

    assert_eq!(session.layout.column_count(), 2);
    assert_eq!(session.layout.placement(0).unwrap().column, 0);
    assert_eq!(session.layout.placement(1).unwrap().column, 1);
    assert_eq!(session.section(0).unwrap().to_message, Some(3));

    let marks = |id| -> Vec<LaneMark> { session.lanes(id).iter().map(|l| l.mark).collect() };
    assert_eq!(marks(0), vec![LaneMark::Start, LaneMark::Empty]);
    assert_eq!(marks(1), vec![LaneMark::Inside, LaneMark::Only]);
    assert_eq!(marks(2), vec![LaneMark::End, LaneMark::Empty]);
}

#[test]
fn test_replay_keeps_latest_run_snapshot() {
    let (state, _) = replayed_state();
    let run = state.registry().current_run().unwrap();

    assert_eq!(run.state, "done");
    assert!(run.is_stopped());
    assert!(run.configuration_display().contains("\"max_turns\": 10"));
}

#[test]
fn test_transcript_mentions_everything() {
    let (state, _) = replayed_state();
    let transcript = render_transcript(&state);

    assert!(transcript.starts_with("Run 3 [done] gpt-4o-mini\n"));
    assert!(transcript.contains("tag: htb-lab"));
    assert!(transcript.contains("started: 2024-05-01 10:00:00  stopped: 2024-05-01 10:05:00"));
    assert!(transcript.contains("  [0] round 1 messages 0..3 (3.750 s)"));
    assert!(transcript.contains("  [1] analysis messages 1..2 (1.250 s)"));
    assert!(transcript.contains("│[ #1 assistant 2.500 s 812 → 37 tok"));
    assert!(transcript.contains("    -> exec_command [success] 0.420 s"));
    assert!(transcript.contains("       | drwxr-xr-x lowpriv"));
    assert!(!transcript.contains("belongs elsewhere"));
}

#[test]
fn test_recorded_session_replays_to_same_tree() {
    runscope_core::logging::init_test();
    let dir = tempfile::tempdir().unwrap();
    let recorder = Recorder::new(dir.path());
    let now = Instant::now();

    let frames = [
        r#"{"type":"Run","data":{"id":5,"model":"m","tag":"","started_at":"2024-05-01 10:00:00","state":"in progress","configuration":"not json"}}"#,
        r#"{"type":"MessageStreamPart","data":{"run_id":5,"message_id":42,"action":"append","content":"par"}}"#,
        r#"{"type":"MessageStreamPart","data":{"run_id":5,"message_id":42,"action":"append","content":"tial"}}"#,
        r#"{"type":"Message","data":{"id":42,"run_id":5,"role":"assistant","content":"","duration":0.5,"tokens_query":1,"tokens_response":2}}"#,
    ];

    let mut live = ViewerState::new(Duration::from_millis(100));
    live.select_now(5);
    for frame in frames {
        let outcome = dispatch(&mut live, frame, now);
        recorder.record_outcome(&outcome, frame);
    }

    let records = read_recording(&recorder.path_for(5)).unwrap();
    assert_eq!(records.len(), frames.len());

    let mut replayed = ViewerState::new(Duration::from_millis(100));
    replay_into(&mut replayed, &records, Some(5)).unwrap();

    assert_eq!(render_transcript(&replayed), render_transcript(&live));
    let node = replayed.session().unwrap().trace.get(42).unwrap();
    assert_eq!(node.content, "partial");
    assert_eq!(node.role.as_deref(), Some("assistant"));
    assert_eq!(
        replayed.registry().configuration_display(5).as_deref(),
        Some("not json")
    );
}

#[test]
fn test_replay_reads_unix_second_timestamps() {
    runscope_core::logging::init_test();
    let records =
        read_recording(&fixture_path("float_timestamps.jsonl")).expect("fixture should load");
    assert_eq!(records.len(), 4);
    assert_eq!(records[0].at.timestamp_millis(), 1_714_557_600_250);
    assert_eq!(records[2].at.timestamp_millis(), 1_714_557_602_000);

    let mut state = ViewerState::new(Duration::from_millis(100));
    let summary = replay_into(&mut state, &records, None).expect("fixture names a run");
    assert_eq!(
        summary,
        ReplaySummary {
            applied: 4,
            ignored: 0
        }
    );

    let session = state.session().expect("run 8 is selected");
    assert_eq!(session.run_id, 8);
    assert_eq!(session.trace.get(1).unwrap().content, "Scanning ports.");

    let transcript = render_transcript(&state);
    assert!(transcript.starts_with("Run 8 [in progress] gpt-4o"), "{transcript}");
    assert!(transcript.contains("started: 2024-05-01 10:00:00"), "{transcript}");
}

// ============================================
// Selection Tests
// ============================================

#[test]
fn test_follow_mode_switches_and_drops_old_events() {
    let debounce = Duration::from_millis(100);
    let start = Instant::now();
    let mut state = ViewerState::new(debounce);

    let run = |id: i64| {
        format!(
            r#"{{"type":"Run","data":{{"id":{id},"model":"m","tag":"","started_at":"2024-05-01 10:00:00","state":"in progress","configuration":"{{}}"}}}}"#
        )
    };

    dispatch(&mut state, &run(3), start);
    let first = state.select_now(3).unwrap();
    state.set_follow(true);

    dispatch(&mut state, &run(7), start);
    assert_eq!(state.tick(start + Duration::from_millis(50)), None);
    let switched = state.tick(start + debounce).unwrap();
    assert_eq!(switched.run_id, 7);
    assert_eq!(switched.epoch, first.epoch + 1);

    // A late event tagged with the old epoch must not land in run 7.
    let late = format!(
        r#"{{"type":"Message","epoch":{},"data":{{"id":1,"run_id":7,"content":"late"}}}}"#,
        first.epoch
    );
    assert_eq!(
        dispatch(&mut state, &late, start + debounce),
        Outcome::Ignored(IgnoreReason::StaleEpoch)
    );
    assert!(state.session().unwrap().trace.is_empty());
}
