use super::*;

#[test]
fn terminal_connect_deserializes_with_defaults() {
    let json = r#"{"type":"terminal:connect","session_id":"S1","project_id":"P1"}"#;
    let msg: ViewerMessage = serde_json::from_str(json).unwrap();
    match msg {
        ViewerMessage::TerminalConnect { session_id, project_id, cols, rows } => {
            assert_eq!(session_id, "S1");
            assert_eq!(project_id, "P1");
            assert_eq!(cols, 80);
            assert_eq!(rows, 24);
        }
        other => panic!("unexpected variant: {other:?}"),
    }
}

#[test]
fn terminal_input_round_trips() {
    let msg = ViewerMessage::TerminalInput {
        session_id: "S1".to_owned(),
        data: "ls -la\n".to_owned(),
    };
    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("\"type\":\"terminal:input\""));
    let back: ViewerMessage = serde_json::from_str(&json).unwrap();
    match back {
        ViewerMessage::TerminalInput { session_id, data } => {
            assert_eq!(session_id, "S1");
            assert_eq!(data, "ls -la\n");
        }
        other => panic!("unexpected variant: {other:?}"),
    }
}

#[test]
fn server_message_output_serializes_tag() {
    let msg = ServerMessage::output("S1", "hello");
    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("\"type\":\"terminal:output\""));
    assert!(json.contains("\"data\":\"hello\""));
}

#[test]
fn server_message_connected_omits_absent_optionals() {
    let msg = ServerMessage::connected("S1", "local", None);
    let json = serde_json::to_string(&msg).unwrap();
    assert!(!json.contains("agent_id"));
    assert!(json.contains("\"connection_type\":\"local\""));
}

#[test]
fn server_message_error_round_trips_status_enum() {
    let msg = ServerMessage::error("S1", "Agent timed out");
    let json = serde_json::to_string(&msg).unwrap();
    let back: ServerMessage = serde_json::from_str(&json).unwrap();
    match back {
        ServerMessage::TerminalError { error, .. } => assert_eq!(error, "Agent timed out"),
        other => panic!("unexpected variant: {other:?}"),
    }
}
