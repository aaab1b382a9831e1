use super::*;
use crate::location::{ConnectionType, LocationStatus};

fn location(tmux_session_name: Option<&str>, tmux_window_name: Option<&str>) -> SessionLocation {
    SessionLocation {
        session_id: "S1".to_owned(),
        project_id: "P1".to_owned(),
        connection_type: ConnectionType::Local,
        ssh_host: None,
        ssh_port: None,
        ssh_username: None,
        docker_container_id: None,
        tmux_session_name: tmux_session_name.map(str::to_owned),
        tmux_window_name: tmux_window_name.map(str::to_owned),
        reverse_agent_id: None,
        reverse_agent_secret: None,
        status: LocationStatus::Connecting,
        last_heartbeat_at: None,
        last_verified_at: None,
        created_at: 0,
        updated_at: 0,
    }
}

#[test]
fn target_combines_session_and_window() {
    let loc = location(Some("ccc-DJ"), Some("w1"));
    assert_eq!(target_for(&loc).unwrap(), "ccc-DJ:w1");
}

#[test]
fn target_falls_back_to_session_only() {
    let loc = location(Some("ccc-DJ"), None);
    assert_eq!(target_for(&loc).unwrap(), "ccc-DJ");
}

#[test]
fn target_requires_session_name() {
    let loc = location(None, None);
    assert!(target_for(&loc).is_err());
}
