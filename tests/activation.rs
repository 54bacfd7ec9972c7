//! Admin gating for the activate/deactivate command surface, exercised
//! against a real on-disk config store.

use channel_mux::bot::handlers::{activate, deactivate, ActivateOutcome, DeactivateOutcome};
use channel_mux::config::{ConfigStore, SourceChat};
use tempfile::TempDir;

async fn store_with_admin(dir: &TempDir) -> ConfigStore {
    let store = ConfigStore::load(dir.path().join("config.yml"))
        .await
        .expect("load config");
    store
        .set_admins(vec!["admin".to_string()])
        .await
        .expect("set admins");
    store
        .set_sources(vec![SourceChat::new(-100)])
        .await
        .expect("set sources");
    store
}

#[tokio::test]
async fn admin_registers_issuing_chat() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_with_admin(&dir).await;

    let outcome = activate(&store, Some("admin"), -200, None, "News")
        .await
        .expect("activate");

    assert_eq!(outcome, ActivateOutcome::Registered);
    let targets = store.snapshot().await.target_chats;
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].chat_id, -200);
    assert_eq!(targets[0].title, "News");
}

#[tokio::test]
async fn admin_match_ignores_case() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_with_admin(&dir).await;

    let outcome = activate(&store, Some("ADMIN"), -200, Some(7), "")
        .await
        .expect("activate");

    assert_eq!(outcome, ActivateOutcome::Registered);
}

#[tokio::test]
async fn non_admin_is_rejected_without_mutation() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_with_admin(&dir).await;

    let outcome = activate(&store, Some("other"), -200, None, "")
        .await
        .expect("activate");

    assert_eq!(outcome, ActivateOutcome::Denied);
    assert!(store.snapshot().await.target_chats.is_empty());
}

#[tokio::test]
async fn missing_username_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_with_admin(&dir).await;

    let outcome = activate(&store, None, -200, None, "")
        .await
        .expect("activate");

    assert_eq!(outcome, ActivateOutcome::Denied);
    assert!(store.snapshot().await.target_chats.is_empty());
}

#[tokio::test]
async fn repeated_activation_is_acknowledged_once() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_with_admin(&dir).await;

    let first = activate(&store, Some("admin"), -200, Some(5), "")
        .await
        .expect("activate");
    let second = activate(&store, Some("admin"), -200, Some(5), "")
        .await
        .expect("activate");

    assert_eq!(first, ActivateOutcome::Registered);
    assert_eq!(second, ActivateOutcome::AlreadyRegistered);
    assert_eq!(store.snapshot().await.target_chats.len(), 1);
}

#[tokio::test]
async fn admin_deactivates_registered_chat() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_with_admin(&dir).await;
    activate(&store, Some("admin"), -200, None, "")
        .await
        .expect("activate");

    let outcome = deactivate(&store, Some("admin"), -200, None)
        .await
        .expect("deactivate");

    assert_eq!(outcome, DeactivateOutcome::Removed);
    assert!(store.snapshot().await.target_chats.is_empty());
}

#[tokio::test]
async fn deactivating_unregistered_chat_reports_not_registered() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_with_admin(&dir).await;

    let outcome = deactivate(&store, Some("admin"), -900, None)
        .await
        .expect("deactivate");

    assert_eq!(outcome, DeactivateOutcome::NotRegistered);
}

#[tokio::test]
async fn non_admin_cannot_deactivate() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_with_admin(&dir).await;
    activate(&store, Some("admin"), -200, None, "")
        .await
        .expect("activate");

    let outcome = deactivate(&store, Some("other"), -200, None)
        .await
        .expect("deactivate");

    assert_eq!(outcome, DeactivateOutcome::Denied);
    assert_eq!(store.snapshot().await.target_chats.len(), 1);
}
