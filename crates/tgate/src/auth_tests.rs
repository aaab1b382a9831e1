use super::*;
use std::sync::Mutex;

// std::env is process-global; serialize tests that mutate it so they don't
// observe each other's AGENT_SECRETS value under parallel test execution.
static ENV_LOCK: Mutex<()> = Mutex::new(());

#[test]
fn normalize_agent_id_uppercases_and_replaces_separators() {
    assert_eq!(normalize_agent_id("worker-1.local"), "WORKER_1_LOCAL");
}

#[test]
fn per_agent_secret_takes_precedence_over_global_list() {
    let _guard = ENV_LOCK.lock().unwrap();
    std::env::set_var("AGENT_SECRET_WORKER_PRECEDENCE", "specific");
    std::env::set_var("AGENT_SECRETS", "global-only");

    assert!(validate_agent_secret("worker-precedence", "specific"));
    assert!(!validate_agent_secret("worker-precedence", "global-only"));

    std::env::remove_var("AGENT_SECRET_WORKER_PRECEDENCE");
    std::env::remove_var("AGENT_SECRETS");
}

#[test]
fn global_list_accepts_any_listed_secret() {
    let _guard = ENV_LOCK.lock().unwrap();
    std::env::remove_var("AGENT_SECRET_WORKER_GLOBAL");
    std::env::set_var("AGENT_SECRETS", "good, also-good");

    assert!(validate_agent_secret("worker-global", "good"));
    assert!(validate_agent_secret("worker-global", "also-good"));
    assert!(!validate_agent_secret("worker-global", "bad"));

    std::env::remove_var("AGENT_SECRETS");
}

#[test]
fn unconfigured_secret_admits_with_warning() {
    let _guard = ENV_LOCK.lock().unwrap();
    std::env::remove_var("AGENT_SECRET_WORKER_OPEN");
    std::env::remove_var("AGENT_SECRETS");

    assert!(validate_agent_secret("worker-open", "anything"));
}
