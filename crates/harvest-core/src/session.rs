//! Session acquisition: reuse a stored artifact or log in fresh.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use harvest_browser::storage::{normalize_origin, redact_cookie};
use harvest_browser::{BrowserError, StorageType};
use harvest_types::{HarvestConfig, OriginStorage, SessionArtifact, StorageItem};

use crate::artifact_store::{cookie_from_stored, stored_from_cookie, ArtifactError, ArtifactStore};
use crate::diagnostics;
use crate::log::RunLog;
use crate::login::{LoginError, LoginStateMachine};
use crate::page::{ContextFactory, Page};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("login failed at step '{step}'{}", capture_note(.capture))]
    LoginFailed {
        step: String,
        selector: String,
        #[source]
        source: LoginError,
        /// Diagnostic snapshot, if one could be written.
        capture: Option<PathBuf>,
    },

    #[error("failed to persist session: {0}")]
    Persist(#[source] ArtifactError),

    #[error(transparent)]
    Config(#[from] harvest_types::ConfigError),

    #[error(transparent)]
    Browser(#[from] BrowserError),
}

fn capture_note(capture: &Option<PathBuf>) -> String {
    match capture {
        Some(path) => format!(" (snapshot: {})", path.display()),
        None => String::new(),
    }
}

/// Hands out authenticated pages.
pub struct SessionManager<F: ContextFactory> {
    contexts: F,
    store: ArtifactStore,
    login: LoginStateMachine,
    landing_url: String,
    diagnostics_dir: PathBuf,
    log: Arc<dyn RunLog>,
}

impl<F: ContextFactory> SessionManager<F> {
    pub fn new(
        contexts: F,
        store: ArtifactStore,
        login: LoginStateMachine,
        landing_url: impl Into<String>,
        diagnostics_dir: impl Into<PathBuf>,
        log: Arc<dyn RunLog>,
    ) -> Self {
        Self {
            contexts,
            store,
            login,
            landing_url: landing_url.into(),
            diagnostics_dir: diagnostics_dir.into(),
            log,
        }
    }

    pub fn from_config(contexts: F, config: &HarvestConfig, log: Arc<dyn RunLog>) -> Result<Self, SessionError> {
        let login = LoginStateMachine::from_config(config, log.clone())?;
        Ok(Self::new(
            contexts,
            ArtifactStore::new(&config.session_file),
            login,
            config.landing_url()?.as_str(),
            &config.diagnostics_dir,
            log,
        ))
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Return an authenticated page and the artifact that describes its
    /// session.
    ///
    /// Unless `force_login` is set, a parseable stored artifact is restored
    /// without running any login step. A missing or unreadable artifact
    /// falls back to a fresh login, whose result replaces the stored file.
    pub async fn acquire_session(&self, force_login: bool) -> Result<(F::Page, SessionArtifact), SessionError> {
        if force_login {
            self.log.info("fresh login requested");
        } else {
            match self.store.load() {
                Ok(Some(artifact)) => {
                    self.log.info(&format!(
                        "reusing stored session from {}",
                        self.store.path().display()
                    ));
                    let page = self.contexts.new_context().await?;
                    self.restore(&page, &artifact).await?;
                    return Ok((page, artifact));
                }
                Ok(None) => self.log.info("no stored session, logging in"),
                Err(e) => self.log.warn(&format!("{e}; logging in again")),
            }
        }

        let page = self.contexts.new_context().await?;
        if let Err(source) = self.login.run(&page).await {
            let capture =
                diagnostics::capture(&page, &self.diagnostics_dir, "login-failure", self.log.as_ref()).await;
            return Err(SessionError::LoginFailed {
                step: source.step().to_string(),
                selector: source.selector().to_string(),
                source,
                capture,
            });
        }

        let artifact = capture_artifact(&page).await?;
        self.store.save(&artifact).map_err(SessionError::Persist)?;
        self.log.info(&format!(
            "session saved to {} ({} cookies)",
            self.store.path().display(),
            artifact.cookies.len()
        ));
        self.log.debug(&format!("session cookies: {}", cookie_summary(&artifact)));
        Ok((page, artifact))
    }

    /// Load `artifact` into a fresh context and land on the app.
    async fn restore(&self, page: &F::Page, artifact: &SessionArtifact) -> Result<(), BrowserError> {
        let cookies: Vec<_> = artifact.cookies.iter().map(cookie_from_stored).collect();
        page.set_cookies(&cookies).await?;

        // Local storage is per origin and only writable from a document on it.
        for origin in &artifact.origins {
            if origin.local_storage.is_empty() {
                continue;
            }
            let url = match normalize_origin(&origin.origin) {
                Ok(url) => url,
                Err(e) => {
                    self.log.warn(&format!("skipping stored local storage: {e}"));
                    continue;
                }
            };
            page.goto(&url).await?;
            let entries: BTreeMap<String, String> = origin
                .local_storage
                .iter()
                .map(|item| (item.name.clone(), item.value.clone()))
                .collect();
            page.write_storage(StorageType::LocalStorage, &entries).await?;
        }

        page.goto(&self.landing_url).await?;
        if !artifact.session_storage.is_empty() {
            page.write_storage(StorageType::SessionStorage, &artifact.session_storage)
                .await?;
            page.reload().await?;
        }
        self.log.debug(&format!(
            "restored {} cookies and {} origins",
            artifact.cookies.len(),
            artifact.origins.len()
        ));
        Ok(())
    }
}

/// `name=value` pairs with values redacted, safe to log.
fn cookie_summary(artifact: &SessionArtifact) -> String {
    artifact
        .cookies
        .iter()
        .map(|c| redact_cookie(&cookie_from_stored(c)))
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Snapshot cookies plus the local and session storage of the page's
/// current origin.
///
/// Storage of other origins the login passed through (an identity provider
/// on another host, say) is not visible from here and is not captured;
/// cookies for every domain are.
pub async fn capture_artifact<P: Page + ?Sized>(page: &P) -> Result<SessionArtifact, BrowserError> {
    let cookies = page.cookies().await?;
    let mut artifact = SessionArtifact {
        cookies: cookies.iter().map(stored_from_cookie).collect(),
        ..SessionArtifact::default()
    };

    let Ok(origin) = normalize_origin(&page.origin().await?) else {
        return Ok(artifact);
    };
    let local = page.read_storage(StorageType::LocalStorage).await?;
    if !local.is_empty() {
        artifact.origins.push(OriginStorage {
            origin,
            local_storage: local
                .into_iter()
                .map(|(name, value)| StorageItem { name, value })
                .collect(),
        });
    }
    artifact.session_storage = page.read_storage(StorageType::SessionStorage).await?;
    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::MemoryRunLog;
    use crate::testing::{FakeContexts, FakePage, PageCall};
    use harvest_browser::CookieInfo;

    const CONFIG: &str = r##"
base_url = "https://app.example.com/inventory"
login_path = "/login"

[credentials]
username = "alice"
password = "hunter2"

[selectors.login]
username = "#user"
password = "#pass"
submit = "#submit"
success_indicator = "#dashboard"
"##;

    fn manager(dir: &std::path::Path, contexts: FakeContexts) -> SessionManager<FakeContexts> {
        let mut config = HarvestConfig::from_toml(CONFIG).unwrap();
        config.session_file = dir.join("session.json");
        config.diagnostics_dir = dir.join("diag");
        SessionManager::from_config(contexts, &config, Arc::new(MemoryRunLog::new())).unwrap()
    }

    fn logged_in_page() -> FakePage {
        let page = FakePage::new();
        page.show(["#user", "#pass", "#submit", "#dashboard"]);
        page.on_goto_set_cookie(CookieInfo {
            name: "sid".to_string(),
            value: "abc".to_string(),
            domain: "app.example.com".to_string(),
            path: "/".to_string(),
            expires: None,
            http_only: true,
            secure: true,
            same_site: None,
        });
        page
    }

    #[tokio::test]
    async fn test_fresh_login_saves_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let page = logged_in_page();
        let contexts = FakeContexts::with_pages([page.clone()]);
        let manager = manager(dir.path(), contexts);

        let (_, artifact) = manager.acquire_session(false).await.unwrap();

        assert_eq!(artifact.cookies[0].name, "sid");
        assert_eq!(manager.store().load().unwrap(), Some(artifact));
        assert_eq!(page.fills().len(), 2);
    }

    #[test]
    fn test_cookie_summary_hides_values() {
        let artifact = SessionArtifact::from_json(
            r#"{"cookies": [
                {"name": "sid", "value": "abcdef", "domain": "x.test"},
                {"name": "theme", "value": "darkmode", "domain": "x.test"}
            ], "origins": []}"#,
        )
        .unwrap();
        assert_eq!(cookie_summary(&artifact), "sid=***, theme=dark***");
    }

    #[tokio::test]
    async fn test_restore_order() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = SessionArtifact::from_json(
            r#"{
                "cookies": [{"name": "sid", "value": "abc", "domain": "app.example.com"}],
                "origins": [{"origin": "https://app.example.com", "localStorage": [{"name": "k", "value": "v"}]}],
                "sessionStorage": {"tab": "inventory"}
            }"#,
        )
        .unwrap();
        ArtifactStore::new(dir.path().join("session.json")).save(&artifact).unwrap();

        let page = FakePage::new();
        let manager = manager(dir.path(), FakeContexts::with_pages([page.clone()]));
        manager.acquire_session(false).await.unwrap();

        assert_eq!(
            page.calls(),
            [
                PageCall::SetCookies(1),
                PageCall::Goto("https://app.example.com".to_string()),
                PageCall::WriteStorage(StorageType::LocalStorage, 1),
                PageCall::Goto("https://app.example.com/inventory".to_string()),
                PageCall::WriteStorage(StorageType::SessionStorage, 1),
                PageCall::Reload,
            ]
        );
    }

    #[tokio::test]
    async fn test_force_login_ignores_stored_artifact() {
        let dir = tempfile::tempdir().unwrap();
        ArtifactStore::new(dir.path().join("session.json"))
            .save(&SessionArtifact::default())
            .unwrap();
        let page = logged_in_page();
        let manager = manager(dir.path(), FakeContexts::with_pages([page.clone()]));

        let (_, artifact) = manager.acquire_session(true).await.unwrap();

        assert_eq!(page.fills().len(), 2);
        assert_eq!(artifact.cookies.len(), 1);
    }

    #[tokio::test]
    async fn test_login_failure_captures_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let page = FakePage::new();
        page.show(["#user", "#pass", "#submit"]);
        let manager = manager(dir.path(), FakeContexts::with_pages([page]));

        let Err(err) = manager.acquire_session(false).await else {
            panic!("login should have failed");
        };

        match err {
            SessionError::LoginFailed { step, capture, .. } => {
                assert_eq!(step, "success indicator");
                assert!(capture.unwrap().starts_with(dir.path().join("diag")));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(manager.store().load().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_login_step_error_captures_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let page = FakePage::new();
        page.show(["#user", "#pass", "#submit", "#dashboard"]);
        page.fail_action("#submit", "Execution context was destroyed");
        let manager = manager(dir.path(), FakeContexts::with_pages([page]));

        let Err(err) = manager.acquire_session(false).await else {
            panic!("login should have failed");
        };

        match err {
            SessionError::LoginFailed {
                step,
                selector,
                source,
                capture,
            } => {
                assert_eq!(step, "submit");
                assert_eq!(selector, "#submit");
                assert!(matches!(source, LoginError::StepFailed { .. }));
                assert!(capture.unwrap().starts_with(dir.path().join("diag")));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_capture_artifact_reads_current_origin_only() {
        let page = FakePage::new();
        page.goto("https://sso.example.com/login").await.unwrap();
        page.write_storage(
            StorageType::LocalStorage,
            &BTreeMap::from([("idp".to_string(), "1".to_string())]),
        )
        .await
        .unwrap();
        page.goto("https://app.example.com/inventory").await.unwrap();
        page.write_storage(
            StorageType::LocalStorage,
            &BTreeMap::from([("cart".to_string(), "[]".to_string())]),
        )
        .await
        .unwrap();

        let artifact = capture_artifact(&page).await.unwrap();

        assert_eq!(artifact.origins.len(), 1);
        assert_eq!(artifact.origins[0].origin, "https://app.example.com");
        assert_eq!(
            artifact.local_storage_for("https://app.example.com").unwrap().local_storage.len(),
            1
        );
        assert!(artifact.local_storage_for("https://sso.example.com").is_none());
    }
}
