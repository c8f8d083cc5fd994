//! Login state machine.
//!
//! After navigating to the login entry point, the machine runs an ordered
//! list of [`LoginStep`]s on one page:
//!
//! 1. fill username, fill password, click submit (required)
//! 2. each configured interstitial (optional)
//! 3. the continue control, when configured (required)
//! 4. wait for the success indicator (required)
//!
//! Each step first waits a bounded time for its selector. A required
//! step whose selector never appears, or whose wait or action errors, fails
//! the login. An optional step is skipped on absence or on any error.

use std::sync::Arc;
use std::time::Duration;

use harvest_browser::BrowserError;
use harvest_types::{HarvestConfig, Secret};

use crate::log::RunLog;
use crate::page::Page;

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("login step '{step}' did not complete: '{selector}' not found")]
    StepMissing { step: String, selector: String },

    #[error("login step '{step}' failed on '{selector}': {source}")]
    StepFailed {
        step: String,
        selector: String,
        #[source]
        source: BrowserError,
    },
}

impl LoginError {
    pub fn step(&self) -> &str {
        match self {
            LoginError::StepMissing { step, .. } | LoginError::StepFailed { step, .. } => step,
        }
    }

    pub fn selector(&self) -> &str {
        match self {
            LoginError::StepMissing { selector, .. } | LoginError::StepFailed { selector, .. } => selector,
        }
    }
}

/// Step name reported when the login page itself cannot be opened.
pub const OPEN_LOGIN_PAGE: &str = "open login page";

#[derive(Debug, Clone, PartialEq)]
pub enum StepAction {
    Fill(Secret),
    Click,
    /// Only wait for the element to appear.
    Await,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoginStep {
    /// Name used in logs and errors.
    pub name: String,
    pub selector: String,
    pub action: StepAction,
    pub required: bool,
    pub timeout: Duration,
}

impl LoginStep {
    fn required(name: impl Into<String>, selector: &str, action: StepAction, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            selector: selector.to_string(),
            action,
            required: true,
            timeout,
        }
    }

    fn optional(name: impl Into<String>, selector: &str, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            selector: selector.to_string(),
            action: StepAction::Click,
            required: false,
            timeout,
        }
    }
}

pub struct LoginStateMachine {
    login_url: String,
    steps: Vec<LoginStep>,
    log: Arc<dyn RunLog>,
}

impl LoginStateMachine {
    pub fn new(login_url: impl Into<String>, steps: Vec<LoginStep>, log: Arc<dyn RunLog>) -> Self {
        Self {
            login_url: login_url.into(),
            steps,
            log,
        }
    }

    /// Build the step list from a validated config.
    pub fn from_config(config: &HarvestConfig, log: Arc<dyn RunLog>) -> Result<Self, harvest_types::ConfigError> {
        let login_url = config.login_url()?;
        Ok(Self::new(login_url.as_str(), build_steps(config), log))
    }

    pub fn login_url(&self) -> &str {
        &self.login_url
    }

    pub fn steps(&self) -> &[LoginStep] {
        &self.steps
    }

    /// Drive the whole sequence on `page`.
    pub async fn run<P: Page + ?Sized>(&self, page: &P) -> Result<(), LoginError> {
        self.log.info(&format!("logging in at {}", self.login_url));
        page.goto(&self.login_url)
            .await
            .map_err(|source| LoginError::StepFailed {
                step: OPEN_LOGIN_PAGE.to_string(),
                selector: self.login_url.clone(),
                source,
            })?;

        for step in &self.steps {
            let outcome = match page.probe(&step.selector, step.timeout).await {
                Ok(true) => self.perform(page, step).await.map(Some),
                Ok(false) => Ok(None),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(Some(())) if step.required => {
                    self.log.debug(&format!("login step '{}' done", step.name));
                }
                Ok(Some(())) => self.log.info(&format!("login step '{}' taken", step.name)),
                Ok(None) if step.required => {
                    return Err(LoginError::StepMissing {
                        step: step.name.clone(),
                        selector: step.selector.clone(),
                    })
                }
                Ok(None) => self.log.info(&format!(
                    "login step '{}' skipped: not shown within {:?}",
                    step.name, step.timeout
                )),
                Err(source) if step.required => {
                    return Err(LoginError::StepFailed {
                        step: step.name.clone(),
                        selector: step.selector.clone(),
                        source,
                    })
                }
                Err(e) => self.log.warn(&format!(
                    "login step '{}' skipped after error: {e}",
                    step.name
                )),
            }
        }

        self.log.info("login successful");
        Ok(())
    }

    async fn perform<P: Page + ?Sized>(&self, page: &P, step: &LoginStep) -> Result<(), BrowserError> {
        match &step.action {
            StepAction::Fill(value) => page.fill(&step.selector, value.expose()).await,
            StepAction::Click => page.click(&step.selector).await,
            StepAction::Await => Ok(()),
        }
    }
}

/// The step sequence for a config, in execution order.
pub fn build_steps(config: &HarvestConfig) -> Vec<LoginStep> {
    let selectors = &config.selectors.login;
    let timing = &config.timing;
    let required = timing.required_step_timeout();

    let mut steps = vec![
        LoginStep::required(
            "username",
            &selectors.username,
            StepAction::Fill(Secret::new(config.credentials.username.clone())),
            required,
        ),
        LoginStep::required(
            "password",
            &selectors.password,
            StepAction::Fill(config.credentials.password.clone()),
            required,
        ),
        LoginStep::required("submit", &selectors.submit, StepAction::Click, required),
    ];
    for (i, selector) in selectors.interstitials.iter().enumerate() {
        steps.push(LoginStep::optional(
            format!("interstitial {}", i + 1),
            selector,
            timing.optional_step_timeout(),
        ));
    }
    if let Some(selector) = &selectors.continue_button {
        steps.push(LoginStep::required("continue", selector, StepAction::Click, required));
    }
    steps.push(LoginStep::required(
        "success indicator",
        &selectors.success_indicator,
        StepAction::Await,
        timing.success_timeout(),
    ));
    steps
}
