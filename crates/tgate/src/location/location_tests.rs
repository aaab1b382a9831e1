use super::*;

fn local_params(session_id: &str) -> CreateParams {
    CreateParams {
        session_id: session_id.to_owned(),
        project_id: "P1".to_owned(),
        connection_type: ConnectionType::Local,
        tmux_session_name: Some("ccc-DJ".to_owned()),
        tmux_window_name: Some("w1".to_owned()),
        ..Default::default()
    }
}

#[tokio::test]
async fn create_then_get_round_trips() {
    let registry = LocationRegistry::new();
    let created = registry.create(local_params("S1")).await;
    assert_eq!(created.status, LocationStatus::Connecting);

    let fetched = registry.get("S1").await.expect("row present");
    assert_eq!(fetched.session_id, "S1");
    assert_eq!(fetched.tmux_session_name.as_deref(), Some("ccc-DJ"));
}

#[tokio::test]
async fn get_unknown_id_returns_none() {
    let registry = LocationRegistry::new();
    assert!(registry.get("missing").await.is_none());
}

#[tokio::test]
async fn update_refreshes_updated_at_and_status() {
    let registry = LocationRegistry::new();
    let created = registry.create(local_params("S1")).await;

    let patched = registry
        .update(
            "S1",
            LocationPatch { status: Some(LocationStatus::Active), ..Default::default() },
        )
        .await
        .expect("row present");

    assert_eq!(patched.status, LocationStatus::Active);
    assert!(patched.updated_at >= created.updated_at);
}

#[tokio::test]
async fn update_unknown_id_returns_none() {
    let registry = LocationRegistry::new();
    assert!(registry.update("missing", LocationPatch::default()).await.is_none());
}

#[tokio::test]
async fn delete_removes_row() {
    let registry = LocationRegistry::new();
    registry.create(local_params("S1")).await;
    assert!(registry.delete("S1").await);
    assert!(!registry.delete("S1").await);
    assert!(registry.get("S1").await.is_none());
}

#[tokio::test]
async fn list_filters_by_connection_type_and_status() {
    let registry = LocationRegistry::new();
    registry.create(local_params("S1")).await;
    registry
        .create(CreateParams {
            session_id: "S2".to_owned(),
            project_id: "P2".to_owned(),
            connection_type: ConnectionType::Reverse,
            reverse_agent_id: Some("A1".to_owned()),
            status: Some(LocationStatus::Active),
            ..Default::default()
        })
        .await;

    let reverse_only = registry
        .list(ListFilter { connection_type: Some(ConnectionType::Reverse), status: None })
        .await;
    assert_eq!(reverse_only.len(), 1);
    assert_eq!(reverse_only[0].session_id, "S2");

    let active_only =
        registry.list(ListFilter { connection_type: None, status: Some(LocationStatus::Active) }).await;
    assert_eq!(active_only.len(), 1);
    assert_eq!(active_only[0].session_id, "S2");
}

#[tokio::test]
async fn touch_heartbeat_only_touches_matching_agent_rows() {
    let registry = LocationRegistry::new();
    registry
        .create(CreateParams {
            session_id: "S1".to_owned(),
            project_id: "P1".to_owned(),
            connection_type: ConnectionType::Reverse,
            reverse_agent_id: Some("A1".to_owned()),
            ..Default::default()
        })
        .await;
    registry
        .create(CreateParams {
            session_id: "S2".to_owned(),
            project_id: "P1".to_owned(),
            connection_type: ConnectionType::Reverse,
            reverse_agent_id: Some("A2".to_owned()),
            ..Default::default()
        })
        .await;

    registry.touch_heartbeat("A1").await;

    assert!(registry.get("S1").await.unwrap().last_heartbeat_at.is_some());
    assert!(registry.get("S2").await.unwrap().last_heartbeat_at.is_none());
}

#[tokio::test]
async fn list_stale_reverse_active_catches_missing_and_old_heartbeats() {
    let registry = LocationRegistry::new();
    registry
        .create(CreateParams {
            session_id: "S1".to_owned(),
            project_id: "P1".to_owned(),
            connection_type: ConnectionType::Reverse,
            reverse_agent_id: Some("A1".to_owned()),
            status: Some(LocationStatus::Active),
            ..Default::default()
        })
        .await;

    // Never heartbeated: always stale relative to any cutoff.
    let stale = registry.list_stale_reverse_active(u64::MAX).await;
    assert_eq!(stale.len(), 1);

    registry
        .update(
            "S1",
            LocationPatch { last_heartbeat_at: Some(u64::MAX), ..Default::default() },
        )
        .await;
    let fresh = registry.list_stale_reverse_active(0).await;
    assert!(fresh.is_empty());
}
