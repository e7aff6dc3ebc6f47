//! Tests for the Credential Bridge remote contract

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use keychain_bridge::bridge::{Options, Promise, Settlement};
use keychain_bridge::store::MemoryStore;
use keychain_bridge::CredentialBridge;
use serde_json::{Value, json};

fn bridge() -> CredentialBridge<MemoryStore> {
    CredentialBridge::new(MemoryStore::new(), "org.keychain-bridge.test")
}

fn opts() -> Options {
    Options::default()
}

async fn get(bridge: &CredentialBridge<MemoryStore>) -> Settlement {
    let (promise, rx) = Promise::channel();
    bridge.get_generic_password_for_options(&opts(), promise).await;
    rx.await.unwrap()
}

async fn set(bridge: &CredentialBridge<MemoryStore>, user: &str, pass: &str) -> Settlement {
    let (promise, rx) = Promise::channel();
    bridge
        .set_generic_password_for_options(&opts(), user, pass, Some("SECURITY_LEVEL_ANY"), promise)
        .await;
    rx.await.unwrap()
}

async fn reset(bridge: &CredentialBridge<MemoryStore>) -> Settlement {
    let (promise, rx) = Promise::channel();
    bridge.reset_generic_password_for_options(&opts(), promise).await;
    rx.await.unwrap()
}

async fn set_username(bridge: &CredentialBridge<MemoryStore>, user: &str) -> Settlement {
    let (promise, rx) = Promise::channel();
    bridge.set_username(user, promise);
    rx.await.unwrap()
}

fn password_of(settlement: &Settlement) -> Option<&str> {
    match settlement {
        Settlement::Resolved(args) => args.first()?.get("password")?.as_str(),
        Settlement::Rejected(_) => None,
    }
}

// ============================================================================
// Round trips
// ============================================================================

#[tokio::test]
async fn stored_secret_reads_back_unchanged() {
    let bridge = bridge();
    let secret = "p@ss wörd 🔑";

    assert_eq!(set(&bridge, "alice", secret).await, Settlement::Resolved(vec![json!(true)]));
    let read = get(&bridge).await;

    assert_eq!(password_of(&read), Some(secret));
}

#[tokio::test]
async fn set_credential_overwrites_previous_secret() {
    let bridge = bridge();
    set(&bridge, "alice", "first").await;
    set(&bridge, "alice", "second").await;

    assert_eq!(password_of(&get(&bridge).await), Some("second"));
}

#[tokio::test]
async fn set_username_selects_the_read_key() {
    let bridge = bridge();
    set(&bridge, "alice", "alice-secret").await;
    set(&bridge, "bob", "bob-secret").await;

    assert_eq!(
        set_username(&bridge, "alice").await,
        Settlement::Resolved(vec![json!(true)])
    );
    assert_eq!(password_of(&get(&bridge).await), Some("alice-secret"));
}

#[tokio::test]
async fn set_username_survives_unrelated_calls() {
    let bridge = bridge();
    set(&bridge, "alice", "alice-secret").await;
    set_username(&bridge, "alice").await;

    // Reads do not move the tracked account.
    get(&bridge).await;
    get(&bridge).await;

    assert_eq!(bridge.account(), "alice");
    assert_eq!(password_of(&get(&bridge).await), Some("alice-secret"));
}

// ============================================================================
// Reset
// ============================================================================

#[tokio::test]
async fn reset_then_get_is_soft_failure() {
    let bridge = bridge();
    set(&bridge, "alice", "secret").await;

    assert_eq!(reset(&bridge).await, Settlement::Resolved(vec![]));
    assert_eq!(get(&bridge).await, Settlement::Resolved(vec![Value::Bool(false)]));
}

#[tokio::test]
async fn reset_removes_secret_even_if_account_is_set_again() {
    let bridge = bridge();
    set(&bridge, "alice", "secret").await;
    reset(&bridge).await;
    set_username(&bridge, "alice").await;

    assert_eq!(get(&bridge).await, Settlement::Resolved(vec![Value::Bool(false)]));
    assert!(bridge.store().is_empty("org.keychain-bridge.test"));
}

#[tokio::test]
async fn reset_on_empty_store_resolves() {
    let bridge = bridge();
    assert_eq!(reset(&bridge).await, Settlement::Resolved(vec![]));
}

// ============================================================================
// Read/write asymmetry
// ============================================================================

#[tokio::test]
async fn read_failure_resolves_false_instead_of_rejecting() {
    let bridge = bridge();
    assert_eq!(get(&bridge).await, Settlement::Resolved(vec![Value::Bool(false)]));
}

#[tokio::test]
async fn read_from_unavailable_store_still_resolves_false() {
    let bridge = bridge();
    set(&bridge, "alice", "secret").await;
    bridge.store().set_available(false);

    assert_eq!(get(&bridge).await, Settlement::Resolved(vec![Value::Bool(false)]));
}

#[tokio::test]
async fn write_to_unavailable_store_rejects() {
    let bridge = bridge();
    bridge.store().set_available(false);

    assert_eq!(set(&bridge, "alice", "secret").await, Settlement::Rejected(vec![]));
}

#[tokio::test]
async fn reset_on_unavailable_store_rejects() {
    let bridge = bridge();
    bridge.store().set_available(false);

    assert_eq!(reset(&bridge).await, Settlement::Rejected(vec![]));
}

#[tokio::test]
async fn set_username_never_touches_store() {
    let bridge = bridge();
    bridge.store().set_available(false);

    assert_eq!(
        set_username(&bridge, "alice").await,
        Settlement::Resolved(vec![json!(true)])
    );
}

#[tokio::test]
async fn has_password_reports_presence_without_rejecting() {
    let bridge = bridge();

    let (promise, rx) = Promise::channel();
    bridge.has_generic_password_for_options(&opts(), promise).await;
    assert_eq!(rx.await.unwrap(), Settlement::Resolved(vec![json!(false)]));

    set(&bridge, "alice", "secret").await;
    let (promise, rx) = Promise::channel();
    bridge.has_generic_password_for_options(&opts(), promise).await;
    assert_eq!(rx.await.unwrap(), Settlement::Resolved(vec![json!(true)]));

    bridge.store().set_available(false);
    let (promise, rx) = Promise::channel();
    bridge.has_generic_password_for_options(&opts(), promise).await;
    assert_eq!(rx.await.unwrap(), Settlement::Resolved(vec![json!(false)]));
}

// ============================================================================
// Exactly-once settlement
// ============================================================================

#[derive(Default)]
struct Counts {
    resolved: AtomicUsize,
    rejected: AtomicUsize,
}

fn counted(counts: &Arc<Counts>) -> Promise {
    let (r, j) = (Arc::clone(counts), Arc::clone(counts));
    Promise::new(
        move |_| {
            r.resolved.fetch_add(1, Ordering::SeqCst);
        },
        move |_| {
            j.rejected.fetch_add(1, Ordering::SeqCst);
        },
    )
}

async fn run_every_operation(bridge: &CredentialBridge<MemoryStore>, counts: &Arc<Counts>) {
    bridge
        .set_generic_password_for_options(&opts(), "alice", "pw", None, counted(counts))
        .await;
    bridge.get_generic_password_for_options(&opts(), counted(counts)).await;
    bridge.has_generic_password_for_options(&opts(), counted(counts)).await;
    bridge.reset_generic_password_for_options(&opts(), counted(counts)).await;
    bridge.set_username("alice", counted(counts));
}

#[tokio::test]
async fn every_operation_settles_exactly_once_on_success() {
    let bridge = bridge();
    let counts = Arc::new(Counts::default());

    run_every_operation(&bridge, &counts).await;

    let resolved = counts.resolved.load(Ordering::SeqCst);
    let rejected = counts.rejected.load(Ordering::SeqCst);
    assert_eq!(resolved + rejected, 5);
    assert_eq!(rejected, 0);
}

#[tokio::test]
async fn every_operation_settles_exactly_once_on_failure() {
    let bridge = bridge();
    bridge.store().set_available(false);
    let counts = Arc::new(Counts::default());

    run_every_operation(&bridge, &counts).await;

    // set and reset reject; get, has and setUsername resolve.
    assert_eq!(counts.resolved.load(Ordering::SeqCst), 3);
    assert_eq!(counts.rejected.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn shared_bridge_serves_concurrent_tasks() {
    let bridge = Arc::new(bridge());
    set(&bridge, "alice", "secret").await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let bridge = Arc::clone(&bridge);
        handles.push(tokio::spawn(async move {
            bridge.get_credential(&Options::default()).await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().as_deref(), Some("secret"));
    }
}
