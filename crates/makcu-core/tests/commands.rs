//! Command surface tests: what each session call puts on the wire

mod common;

use common::connected_session;
use makcu_core::protocol::{KeyCode, MouseButton, ProtocolError};
use pretty_assertions::assert_eq;

#[test]
fn test_keyboard_lines() {
    let (session, mock) = connected_session();

    session.key_down(KeyCode::A).unwrap();
    session.key_up(KeyCode::A).unwrap();
    session.key_press(KeyCode::Enter, 0).unwrap();
    session.key_press(KeyCode::Space, 40).unwrap();
    session
        .multi_key_down(&[KeyCode::LeftCtrl, KeyCode::LeftShift])
        .unwrap();
    session
        .multi_key_up(&[KeyCode::LeftCtrl, KeyCode::LeftShift])
        .unwrap();
    session
        .multi_key_press(&[KeyCode::LeftCtrl, KeyCode::C], 25)
        .unwrap();
    session.type_string("hello world").unwrap();

    assert_eq!(
        mock.written_lines(),
        vec![
            "km.down(4)\r",
            "km.up(4)\r",
            "km.press(40)\r",
            "km.press(44,40)\r",
            "km.multidown(224,225)\r",
            "km.multiup(224,225)\r",
            "km.multipress(224,6,25)\r",
            "km.string(\"hello world\")\r",
        ]
    );
}

#[test]
fn test_mouse_lines() {
    let (session, mock) = connected_session();

    session.mouse_down(MouseButton::Left).unwrap();
    session.mouse_up(MouseButton::Left).unwrap();
    session.mouse_down(MouseButton::Side5).unwrap();
    session.mouse_click(MouseButton::Right, 2).unwrap();
    session.mouse_move(-15, 30).unwrap();
    session.mouse_move_to(960, 540).unwrap();
    session.mouse_wheel(-3).unwrap();
    session.mouse_calibrate().unwrap();
    session.mouse_set_screen_bounds(1920, 1080).unwrap();

    assert_eq!(
        mock.written_lines(),
        vec![
            "km.left(1)\r",
            "km.left(0)\r",
            "km.side2(1)\r",
            "km.click(1,2)\r",
            "km.move(-15,30)\r",
            "km.moveto(960,540)\r",
            "km.wheel(-3)\r",
            "km.zero()\r",
            "km.screen(1920,1080)\r",
        ]
    );
}

#[test]
fn test_device_lines() {
    let (session, mock) = connected_session();

    session.enable_button_monitoring(false).unwrap();
    session.delay(250).unwrap();
    session.reset().unwrap();
    session.send_raw_command("km.custom()\r").unwrap();

    assert_eq!(
        mock.written_lines(),
        vec![
            "km.buttons(0)\r",
            "km.delay(250)\r",
            "km.init()\r",
            "km.custom()\r",
        ]
    );
}

#[test]
fn test_invalid_arguments_write_nothing() {
    let (session, mock) = connected_session();

    assert!(matches!(
        session.multi_key_press(&[], 0),
        Err(ProtocolError::InvalidArgument(_))
    ));
    assert!(matches!(
        session.type_string("say \"hi\""),
        Err(ProtocolError::InvalidArgument(_))
    ));
    assert!(matches!(
        session.type_string(""),
        Err(ProtocolError::InvalidArgument(_))
    ));
    assert_eq!(mock.write_count(), 0);
}

#[test]
fn test_write_failure_reports_command() {
    let (session, mock) = connected_session();
    mock.fail_writes_starting_with(b"km.move");

    match session.mouse_move(1, 2) {
        Err(ProtocolError::WriteFailed { command, .. }) => assert_eq!(command, "km.move(1,2)"),
        other => panic!("unexpected result: {:?}", other),
    }
    // a failed command does not end the session
    assert!(session.is_connected());
    session.mouse_wheel(1).unwrap();
}

#[test]
fn test_version_and_serial_queries() {
    let (session, mock) = connected_session();
    mock.reply_to("km.version()\r", b"km.version()\r\n>>> km.MAKCU v3.2\r\n");
    mock.reply_to("km.mac()\r", b"km.mac()\r\n>>> 00:1A:2B:3C:4D:5E\r\n");

    assert_eq!(session.version().unwrap(), "km.MAKCU v3.2");
    assert_eq!(session.serial_number().unwrap(), "00:1A:2B:3C:4D:5E");
}

#[test]
fn test_is_key_down_ignores_echo_digits() {
    let (session, mock) = connected_session();

    // the echoed key code contains a 3; the reply says up
    mock.reply_to("km.isdown(30)\r", b"km.isdown(30)\r\n0\r\n");
    assert!(!session.is_key_down(KeyCode::Num1).unwrap());

    mock.reply_to("km.isdown(4)\r", b"km.isdown(4)\r\n>>> 1\r\n");
    assert!(session.is_key_down(KeyCode::A).unwrap());
}

#[test]
fn test_set_baud_rate_requires_connection() {
    let (session, mock) = connected_session();
    session.set_baud_rate(115_200).unwrap();
    assert_eq!(mock.state().baud_rate, 115_200);

    session.disconnect();
    assert!(matches!(
        session.set_baud_rate(4_000_000),
        Err(ProtocolError::NotConnected)
    ));
}
