use std::time::Duration;

use thiserror::Error;

use crate::discovery::BrowserDiscoveryError;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("could not open DevTools socket {url}: {reason}")]
    Connect { url: String, reason: String },

    /// Chrome answered the command with an error object.
    #[error("{method} rejected by Chrome ({code}): {message}")]
    Command {
        method: String,
        code: i64,
        message: String,
    },

    #[error("{method} got no reply within {after:?}")]
    CommandTimeout { method: String, after: Duration },

    /// Malformed frames, a dropped socket, or a reply missing a field we need.
    #[error("DevTools protocol: {detail}")]
    Protocol { detail: String },

    #[error("no element matches {selector}")]
    ElementNotFound { selector: String },

    #[error("element cannot be clicked: {reason}")]
    NotClickable { reason: String },

    #[error("navigation to {url} failed: {reason}")]
    NavigationFailed { url: String, reason: String },

    #[error("page script threw: {message}")]
    JsException { message: String },

    #[error("page did not finish loading within {after:?}")]
    LoadTimeout { after: Duration },

    #[error(transparent)]
    Discovery(#[from] BrowserDiscoveryError),

    /// Chrome could not be spawned, or never published its DevTools endpoint.
    #[error("failed to launch Chrome: {reason}")]
    LaunchFailed { reason: String },
}
