//! Integration tests for session reuse, fresh login, and persistence.

mod common;

use std::fs;

use harvest_core::testing::{FakeContexts, FakePage, PageCall};
use harvest_core::{ArtifactStore, LogLevel, SessionError, SessionManager};
use harvest_types::{OriginStorage, SessionArtifact, StorageItem, StoredCookie};

use common::{config_in, login_page, memory_log};

fn stored_artifact() -> SessionArtifact {
    SessionArtifact {
        cookies: vec![StoredCookie {
            name: "session".to_string(),
            value: "stored-token".to_string(),
            domain: "shop.example.com".to_string(),
            path: "/".to_string(),
            expires: -1.0,
            http_only: true,
            secure: true,
            same_site: None,
        }],
        origins: vec![OriginStorage {
            origin: "https://shop.example.com".to_string(),
            local_storage: vec![StorageItem {
                name: "cart".to_string(),
                value: "[]".to_string(),
            }],
        }],
        session_storage: Default::default(),
    }
}

#[tokio::test]
async fn valid_artifact_is_reused_without_login() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    ArtifactStore::new(&config.session_file)
        .save(&stored_artifact())
        .unwrap();

    let page = FakePage::new();
    let contexts = FakeContexts::with_pages([page.clone()]);
    let manager = SessionManager::from_config(contexts, &config, memory_log()).unwrap();

    let (_, artifact) = manager.acquire_session(false).await.unwrap();

    assert_eq!(artifact, stored_artifact());
    assert!(page.fills().is_empty());
    assert!(page.clicks().is_empty());
    assert!(!page
        .calls()
        .contains(&PageCall::Goto("https://shop.example.com/login".to_string())));
    assert_eq!(page.cookie_jar()[0].value, "stored-token");
    assert_eq!(page.local_storage("https://shop.example.com")["cart"], "[]");
    assert_eq!(
        page.calls().last(),
        Some(&PageCall::Goto("https://shop.example.com/app".to_string()))
    );
}

#[tokio::test]
async fn corrupt_artifact_falls_back_to_one_login() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    fs::create_dir_all(config.session_file.parent().unwrap()).unwrap();
    fs::write(&config.session_file, "{\"cookies\": [{\"name\": ").unwrap();

    let page = login_page();
    let contexts = FakeContexts::with_pages([page.clone()]);
    let log = memory_log();
    let manager = SessionManager::from_config(contexts, &config, log.clone()).unwrap();

    let (_, artifact) = manager.acquire_session(false).await.unwrap();

    let logins = page
        .calls()
        .iter()
        .filter(|c| **c == PageCall::Goto("https://shop.example.com/login".to_string()))
        .count();
    assert_eq!(logins, 1);
    assert_eq!(page.fills().len(), 2);
    assert_eq!(log.count_matching(LogLevel::Warn, "unreadable"), 1);

    let written = ArtifactStore::new(&config.session_file).load().unwrap().unwrap();
    assert_eq!(written, artifact);
    assert_eq!(written.cookies[0].value, "fresh-token");
}

#[tokio::test]
async fn empty_artifact_file_is_treated_as_missing() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    fs::create_dir_all(config.session_file.parent().unwrap()).unwrap();
    fs::write(&config.session_file, "").unwrap();

    let page = login_page();
    let manager =
        SessionManager::from_config(FakeContexts::with_pages([page.clone()]), &config, memory_log())
            .unwrap();

    manager.acquire_session(false).await.unwrap();
    assert_eq!(page.fills().len(), 2);
}

#[tokio::test]
async fn first_login_creates_artifact_and_parent_dirs() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    assert!(!config.session_file.parent().unwrap().exists());

    let contexts = FakeContexts::with_pages([login_page()]);
    let manager = SessionManager::from_config(contexts, &config, memory_log()).unwrap();
    manager.acquire_session(false).await.unwrap();

    let text = fs::read_to_string(&config.session_file).unwrap();
    let artifact = SessionArtifact::from_json(&text).unwrap();
    assert_eq!(artifact.cookies[0].name, "session");
}

#[tokio::test]
async fn forced_login_overwrites_previous_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let store = ArtifactStore::new(&config.session_file);
    store.save(&stored_artifact()).unwrap();

    let page = login_page();
    let contexts = FakeContexts::with_pages([page.clone()]);
    let manager = SessionManager::from_config(contexts, &config, memory_log()).unwrap();
    manager.acquire_session(true).await.unwrap();

    let written = store.load().unwrap().unwrap();
    assert_eq!(written.cookies.len(), 1);
    assert_eq!(written.cookies[0].value, "fresh-token");
    assert!(written.origins.is_empty());
    assert_eq!(page.fills().len(), 2);
}

#[tokio::test]
async fn failed_login_keeps_previous_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let store = ArtifactStore::new(&config.session_file);
    store.save(&stored_artifact()).unwrap();

    let page = FakePage::new();
    page.show(["#user", "#pass", "#submit"]);
    let manager =
        SessionManager::from_config(FakeContexts::with_pages([page]), &config, memory_log())
            .unwrap();

    let err = manager.acquire_session(true).await.unwrap_err();

    assert!(matches!(err, SessionError::LoginFailed { .. }));
    assert_eq!(store.load().unwrap(), Some(stored_artifact()));
    assert!(config.diagnostics_dir.read_dir().unwrap().next().is_some());
}

#[tokio::test]
async fn login_page_error_still_writes_diagnostics() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());

    let page = login_page();
    page.fail_action("#submit", "Execution context was destroyed");
    let manager =
        SessionManager::from_config(FakeContexts::with_pages([page]), &config, memory_log())
            .unwrap();

    let err = manager.acquire_session(false).await.unwrap_err();

    match err {
        SessionError::LoginFailed { step, capture, .. } => {
            assert_eq!(step, "submit");
            assert!(capture.is_some());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(config.diagnostics_dir.read_dir().unwrap().next().is_some());
    assert!(ArtifactStore::new(&config.session_file).load().unwrap().is_none());
}

#[tokio::test]
async fn flaky_interstitial_does_not_block_login() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());

    let page = login_page();
    page.show(["#whats-new"]);
    page.fail_wait("#whats-new", "Execution context was destroyed");
    let log = memory_log();
    let manager =
        SessionManager::from_config(FakeContexts::with_pages([page]), &config, log.clone())
            .unwrap();

    let (_, artifact) = manager.acquire_session(false).await.unwrap();

    assert_eq!(artifact.cookies[0].value, "fresh-token");
    assert_eq!(log.count_matching(LogLevel::Warn, "skipped after error"), 1);
}
