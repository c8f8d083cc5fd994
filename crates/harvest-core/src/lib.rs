//! Session acquisition and incremental extraction.
//!
//! - **`session`**: [`SessionManager`] reuses a stored [`SessionArtifact`]
//!   or runs the [`LoginStateMachine`] and persists the result.
//! - **`collector`**: [`IncrementalCollector`] scrolls a listing, extracting
//!   and deduplicating cards until the announced total is reached or the
//!   listing stops growing.
//! - **`extract`**: maps one card's raw texts to an [`ExtractionRecord`].
//! - **`navigate`**: clicks through to the listing.
//! - **`page`**: the [`Page`] / [`ContextFactory`] seam; **`chrome`**
//!   implements it over CDP.
//!
//! [`SessionArtifact`]: harvest_types::SessionArtifact
//! [`ExtractionRecord`]: harvest_types::ExtractionRecord

pub mod artifact_store;
pub mod chrome;
pub mod collector;
pub mod diagnostics;
pub mod extract;
pub mod log;
pub mod login;
pub mod navigate;
pub mod page;
pub mod session;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use artifact_store::{write_atomic, ArtifactError, ArtifactStore};
pub use chrome::{ChromeContexts, DriverPage};
pub use collector::{
    parse_total, CollectError, CollectOutcome, CollectStatus, CollectorSettings,
    IncrementalCollector, PartialReason, TotalTarget,
};
pub use extract::{extract, CardSnapshot, DetailText};
pub use log::{LogLevel, MemoryRunLog, RunLog, TracingRunLog};
pub use login::{LoginError, LoginStateMachine, LoginStep, StepAction};
pub use navigate::{NavigateError, NavigationWalk};
pub use page::{ContextFactory, Page};
pub use session::{capture_artifact, SessionError, SessionManager};
