use super::*;

#[test]
fn try_send_under_hwm_succeeds() {
    let (handle, mut rx) = ViewerHandle::new(1024);
    assert!(handle.try_send(Arc::from("hello")));
    assert!(rx.try_recv().is_ok());
}

#[test]
fn try_send_over_hwm_is_rejected() {
    let (handle, _rx) = ViewerHandle::new(4);
    assert!(!handle.try_send(Arc::from("way too long for four bytes")));
}

#[test]
fn try_send_over_hwm_cancels_the_viewer() {
    let (handle, _rx) = ViewerHandle::new(4);
    let cancel = handle.cancellation();
    assert!(!cancel.is_cancelled());
    assert!(!handle.try_send(Arc::from("way too long for four bytes")));
    assert!(cancel.is_cancelled());
}

#[test]
fn release_frees_budget_for_subsequent_sends() {
    let (handle, _rx) = ViewerHandle::new(10);
    assert!(handle.try_send(Arc::from("12345")));
    assert!(!handle.try_send(Arc::from("123456")));
    handle.release(5);
    assert!(handle.try_send(Arc::from("123456")));
}

#[test]
fn handles_with_different_ids_are_not_equal() {
    let (a, _) = ViewerHandle::new(10);
    let (b, _) = ViewerHandle::new(10);
    assert_ne!(a, b);
}
