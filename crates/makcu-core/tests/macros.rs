//! Macro engine tests: recording, files and paced replay

mod common;

use common::{connected_session, wait_until};
use makcu_core::macros::{
    Action, ActionKind, Macro, MacroConfig, MacroError, MacroFormatError, MacroRecorder,
};
use makcu_core::protocol::{KeyCode, MouseButton};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

fn every_kind() -> Vec<Action> {
    vec![
        Action::new(ms(0), ActionKind::KeyDown(KeyCode::LeftShift)),
        Action::new(ms(5), ActionKind::KeyUp(KeyCode::LeftShift)),
        Action::new(
            ms(5),
            ActionKind::KeyPress {
                key: KeyCode::A,
                duration_ms: 30,
            },
        ),
        Action::new(
            ms(40),
            ActionKind::MultiKeyPress {
                keys: vec![KeyCode::LeftCtrl, KeyCode::LeftAlt, KeyCode::Tab],
                duration_ms: 0,
            },
        ),
        Action::new(ms(41), ActionKind::TypeString("a,b \\ c\nd".into())),
        Action::new(ms(90), ActionKind::MouseDown(MouseButton::Side4)),
        Action::new(ms(95), ActionKind::MouseUp(MouseButton::Side4)),
        Action::new(
            ms(120),
            ActionKind::MouseClick {
                button: MouseButton::Middle,
                count: 3,
            },
        ),
        Action::new(ms(121), ActionKind::MouseMove { dx: -7, dy: 12 }),
        Action::new(ms(150), ActionKind::MouseMoveTo { x: 800, y: 600 }),
        Action::new(ms(151), ActionKind::MouseWheel(-2)),
        Action::new(ms(160), ActionKind::Delay(75)),
    ]
}

#[test]
fn test_text_round_trip_all_kinds() {
    let original = Macro::new(every_kind(), MacroConfig::default());
    let text = original.to_text();
    let parsed = Macro::parse(&text).unwrap();

    assert_eq!(parsed.actions, original.actions);
    assert_eq!(parsed.to_text(), text);
}

#[test]
fn test_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("combo.mcm");

    let recorder = MacroRecorder::new();
    recorder.add_key_press(KeyCode::E, 0).unwrap();
    recorder.add_mouse_click(MouseButton::Left, 2).unwrap();
    recorder.add_type_string("gg").unwrap();
    recorder.save_to_file(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("MAKCU_MACRO_V1\n3\n"));

    let loaded = MacroRecorder::new();
    loaded.load_from_file(&path).unwrap();
    assert_eq!(loaded.actions(), recorder.actions());
}

#[test]
fn test_failed_load_keeps_previous_actions() {
    let dir = TempDir::new().unwrap();
    let recorder = MacroRecorder::new();
    recorder.add_mouse_wheel(1).unwrap();
    recorder.add_delay(10).unwrap();
    let before = recorder.actions();

    let truncated = dir.path().join("truncated.mcm");
    std::fs::write(&truncated, "MAKCU_MACRO_V1\n4\n0,10,1\n0,11,5\n").unwrap();
    assert!(matches!(
        recorder.load_from_file(&truncated),
        Err(MacroError::Format(MacroFormatError::Truncated {
            expected: 4,
            found: 2
        }))
    ));
    assert_eq!(recorder.actions(), before);

    let bad_header = dir.path().join("header.mcm");
    std::fs::write(&bad_header, "MACRO\n1\n0,10,1\n").unwrap();
    assert!(matches!(
        recorder.load_from_file(&bad_header),
        Err(MacroError::Format(MacroFormatError::InvalidHeader(_)))
    ));
    assert_eq!(recorder.actions(), before);

    assert!(matches!(
        recorder.load_from_file(dir.path().join("missing.mcm")),
        Err(MacroError::Io(_))
    ));
    assert_eq!(recorder.actions(), before);
}

#[test]
fn test_record_scenario_total_duration() {
    let recorder = MacroRecorder::new();
    recorder.start_recording().unwrap();
    recorder.add_key_press(KeyCode::A, 0).unwrap();
    recorder.add_mouse_click(MouseButton::Left, 1).unwrap();
    recorder.add_delay(500).unwrap();
    recorder.stop_recording().unwrap();

    assert_eq!(recorder.action_count(), 3);
    let last = recorder.actions().last().unwrap().timestamp;
    assert!(recorder.total_duration() >= last + ms(500));
}

#[test]
fn test_playback_pacing_coalesces_short_gaps() {
    let (session, mock) = connected_session();
    let recorder = MacroRecorder::new();
    recorder.set_minimum_delay(100);
    recorder
        .load_macro(Macro::new(
            vec![
                Action::new(ms(0), ActionKind::MouseMove { dx: 1, dy: 0 }),
                Action::new(ms(200), ActionKind::MouseMove { dx: 2, dy: 0 }),
                Action::new(ms(250), ActionKind::MouseMove { dx: 3, dy: 0 }),
            ],
            MacroConfig::default(),
        ))
        .unwrap();

    recorder.playback(&session, 1).unwrap();

    let moves = mock.writes_starting_with("km.move(");
    assert_eq!(
        moves.iter().map(|(_, line)| line.as_str()).collect::<Vec<_>>(),
        vec!["km.move(1,0)\r", "km.move(2,0)\r", "km.move(3,0)\r"]
    );
    let first_gap = moves[1].0 - moves[0].0;
    let second_gap = moves[2].0 - moves[1].0;
    assert!(first_gap >= ms(190), "first gap {:?}", first_gap);
    assert!(second_gap < ms(40), "second gap {:?}", second_gap);
}

#[test]
fn test_playback_without_timestamps_runs_back_to_back() {
    let (session, mock) = connected_session();
    let recorder = MacroRecorder::new();
    recorder.set_timestamp_mode(false);
    recorder
        .load_macro(Macro::new(
            vec![
                Action::new(ms(0), ActionKind::MouseWheel(1)),
                Action::new(ms(400), ActionKind::MouseWheel(2)),
            ],
            MacroConfig::default(),
        ))
        .unwrap();

    recorder.playback(&session, 2).unwrap();

    let wheels = mock.writes_starting_with("km.wheel(");
    assert_eq!(wheels.len(), 4);
    assert!(wheels[3].0 - wheels[0].0 < ms(200));
}

#[test]
fn test_playback_rules() {
    let (session, _mock) = connected_session();
    let recorder = MacroRecorder::new();
    assert!(matches!(
        recorder.playback(&session, 1),
        Err(MacroError::Empty)
    ));

    recorder.start_recording().unwrap();
    recorder.add_mouse_wheel(1).unwrap();
    assert!(matches!(
        recorder.playback(&session, 1),
        Err(MacroError::Recording)
    ));
}

#[test]
fn test_async_playback_stops_promptly() {
    let (session, mock) = connected_session();
    let session = Arc::new(session);
    let recorder = MacroRecorder::new();
    let actions = (0..40)
        .map(|i| Action::new(ms(i * 25), ActionKind::MouseMove { dx: 1, dy: 1 }))
        .collect();
    recorder
        .load_macro(Macro::new(actions, MacroConfig::default()))
        .unwrap();

    recorder.playback_async(Arc::clone(&session), 1).unwrap();
    assert!(recorder.is_playing());
    assert!(matches!(
        recorder.playback_async(Arc::clone(&session), 1),
        Err(MacroError::AlreadyPlaying)
    ));
    assert!(matches!(recorder.clear(), Err(MacroError::AlreadyPlaying)));

    assert!(wait_until(Duration::from_secs(2), || {
        mock.writes_starting_with("km.move(").len() >= 3
    }));
    recorder.stop_playback();
    assert!(!recorder.is_playing());

    let sent = mock.writes_starting_with("km.move(").len();
    thread::sleep(ms(100));
    assert_eq!(mock.writes_starting_with("km.move(").len(), sent);
    assert!(sent < 40);

    // the player can be reused after a stop
    recorder.playback(&session, 1).unwrap();
}

#[test]
fn test_button_events_recorded_once_per_change() {
    let (session, mock) = connected_session();
    let recorder = Arc::new(MacroRecorder::new());
    recorder.attach_button_recording(&session);
    recorder.start_recording().unwrap();

    mock.push_rx(&[0x01, 0x03, 0x02, 0x00]);
    assert!(wait_until(Duration::from_secs(2), || recorder.action_count() == 4));
    recorder.stop_recording().unwrap();

    let kinds: Vec<ActionKind> = recorder.actions().into_iter().map(|a| a.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ActionKind::MouseDown(MouseButton::Left),
            ActionKind::MouseDown(MouseButton::Right),
            ActionKind::MouseUp(MouseButton::Left),
            ActionKind::MouseUp(MouseButton::Right),
        ]
    );
}

#[test]
fn test_recorded_macro_replays_on_device() {
    let (session, mock) = connected_session();
    let recorder = MacroRecorder::new();
    recorder.add_key_press(KeyCode::A, 0).unwrap();
    recorder.add_mouse_click(MouseButton::Left, 1).unwrap();
    recorder.add_delay(20).unwrap();
    recorder.add_mouse_move(5, 5, false).unwrap();

    recorder.playback(&session, 1).unwrap();

    assert_eq!(
        mock.written_lines(),
        vec!["km.press(4)\r", "km.click(0,1)\r", "km.move(5,5)\r"]
    );
}
