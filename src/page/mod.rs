//! Page client adapter
//!
//! The extraction state machine drives an abstract browsing session through the
//! [`PageClient`] trait: load a record page, wait for elements, trigger the
//! export control and read the text of the view it opens. Every failure is
//! classified into a [`FailureKind`] so callers can decide between retrying,
//! waiting for connectivity, or rebuilding the session.

mod http;

#[cfg(test)]
pub(crate) mod fake;

pub use http::HttpPageClient;

use std::time::Duration;
use thiserror::Error;
use url::Url;

/// How a page failure should be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Worth retrying with the same session
    Transient,
    /// The network went away under the request
    ConnectivityLoss,
    /// The session itself is unusable and must be recreated
    SessionFatal,
}

/// Errors reported by a page client
#[derive(Debug, Error)]
pub enum PageError {
    #[error("Navigation to {url} failed: {message}")]
    Navigation {
        url: String,
        kind: FailureKind,
        message: String,
    },

    #[error("Timed out after {timeout:?} waiting for '{selector}'")]
    Timeout { selector: String, timeout: Duration },

    #[error("Action on '{selector}' failed: {message}")]
    Action {
        selector: String,
        kind: FailureKind,
        message: String,
    },

    #[error("No new view was opened")]
    NoNewView,

    #[error("No view is open")]
    NoView,

    #[error("Session unusable: {0}")]
    Session(String),
}

impl PageError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Navigation { kind, .. } | Self::Action { kind, .. } => *kind,
            Self::Timeout { .. } | Self::NoNewView => FailureKind::Transient,
            Self::NoView | Self::Session(_) => FailureKind::SessionFatal,
        }
    }
}

/// An abstract browsing session
///
/// A session has an ordered set of views (documents); one of them is current.
/// `open` replaces all views with the loaded document, `invoke` may add a view.
///
/// The returned futures carry no `Send` bound. A worker drives its session
/// from the one task that owns it and never spawns these futures.
#[allow(async_fn_in_trait)]
pub trait PageClient {
    /// Loads `url` into the session, replacing every open view
    async fn open(&mut self, url: &Url) -> Result<(), PageError>;

    /// Waits until `selector` matches in the current view
    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<(), PageError>;

    /// Activates the first element matching `selector`
    async fn invoke(&mut self, selector: &str) -> Result<(), PageError>;

    /// Makes the most recently opened view current
    fn switch_to_newest_view(&mut self) -> Result<(), PageError>;

    /// Final location of the current view, after redirects
    fn location(&self) -> Option<&Url>;

    /// Human-visible text of the current view
    fn read_visible_text(&self) -> Result<String, PageError>;

    /// Closes the current view and returns to the original one
    fn close_current_view(&mut self) -> Result<(), PageError>;

    /// Discards session state (cookies, storage) but keeps the session
    fn reset(&mut self) -> Result<(), PageError>;

    /// Tears the session down and builds a fresh one
    fn recreate(&mut self) -> Result<(), PageError>;
}
