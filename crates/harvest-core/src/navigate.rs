//! Walk from the landing page to the listing.

use std::sync::Arc;
use std::time::Duration;

use harvest_browser::BrowserError;
use harvest_types::HarvestConfig;

use crate::log::RunLog;
use crate::page::Page;

#[derive(Debug, thiserror::Error)]
pub enum NavigateError {
    #[error("navigation step {step} did not appear: '{selector}'")]
    StepMissing { step: usize, selector: String },

    #[error("listing container did not appear: '{selector}'")]
    ListingMissing { selector: String },

    #[error(transparent)]
    Browser(#[from] BrowserError),
}

/// Ordered clicks that reveal the listing, followed by a wait for the
/// listing container. Every step is required.
pub struct NavigationWalk {
    steps: Vec<String>,
    container: Option<String>,
    timeout: Duration,
    log: Arc<dyn RunLog>,
}

impl NavigationWalk {
    pub fn new(steps: Vec<String>, container: Option<String>, timeout: Duration, log: Arc<dyn RunLog>) -> Self {
        Self {
            steps,
            container,
            timeout,
            log,
        }
    }

    pub fn from_config(config: &HarvestConfig, log: Arc<dyn RunLog>) -> Self {
        Self::new(
            config.selectors.navigation.clone(),
            config.selectors.listing.container.clone(),
            config.timing.required_step_timeout(),
            log,
        )
    }

    pub async fn run<P: Page + ?Sized>(&self, page: &P) -> Result<(), NavigateError> {
        for (i, selector) in self.steps.iter().enumerate() {
            let step = i + 1;
            if !page.probe(selector, self.timeout).await? {
                return Err(NavigateError::StepMissing {
                    step,
                    selector: selector.clone(),
                });
            }
            page.click(selector).await?;
            self.log.info(&format!("navigation step {step}: clicked '{selector}'"));
        }

        if let Some(selector) = &self.container {
            if !page.probe(selector, self.timeout).await? {
                return Err(NavigateError::ListingMissing {
                    selector: selector.clone(),
                });
            }
            self.log.info("listing is visible");
        }
        Ok(())
    }
}
