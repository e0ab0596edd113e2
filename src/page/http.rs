//! HTTP-backed page client
//!
//! Views are fetched documents held in memory. The export control is resolved
//! to the URL it points at (`data-href`, `href`, `formaction` or
//! `data-export-url`) and that URL is fetched into a new view.

use crate::config::PageConfig;
use crate::page::{FailureKind, PageClient, PageError};
use reqwest::{redirect::Policy, Client, StatusCode};
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

/// Pause between re-fetches while waiting for a selector
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Attributes that may carry the export target, in lookup order
const TARGET_ATTRIBUTES: [&str; 4] = ["data-href", "href", "formaction", "data-export-url"];

/// Elements never rendered as text
const HIDDEN_ELEMENTS: [&str; 6] = ["script", "style", "noscript", "template", "head", "title"];

/// Elements that start a new line of text
const BLOCK_ELEMENTS: [&str; 22] = [
    "address", "article", "aside", "blockquote", "dd", "div", "dl", "dt", "footer", "form", "h1",
    "h2", "h3", "h4", "h5", "h6", "header", "li", "p", "pre", "section", "tr",
];

#[derive(Debug, Clone)]
struct View {
    url: Url,
    body: String,
    plain_text: bool,
}

/// Cookie-carrying HTTP session
pub struct HttpPageClient {
    client: Option<Client>,
    config: PageConfig,
    views: Vec<View>,
    current: usize,
}

impl HttpPageClient {
    /// Builds a session with an empty cookie store
    pub fn new(config: &PageConfig) -> Result<Self, PageError> {
        Ok(Self {
            client: Some(build_client(config)?),
            config: config.clone(),
            views: Vec::new(),
            current: 0,
        })
    }

    fn current_view(&self) -> Result<&View, PageError> {
        self.views.get(self.current).ok_or(PageError::NoView)
    }

    async fn fetch(&self, url: &Url) -> Result<View, PageError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| PageError::Session("session has been torn down".to_string()))?;

        let response = client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| navigation_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PageError::Navigation {
                url: url.to_string(),
                kind: FailureKind::Transient,
                message: describe_status(status),
            });
        }

        let final_url = response.url().clone();
        let plain_text = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map_or(false, |ct| ct.starts_with("text/plain"));

        let body = response
            .text()
            .await
            .map_err(|e| navigation_error(url, e))?;

        tracing::trace!("Fetched {} ({} bytes)", final_url, body.len());

        Ok(View {
            url: final_url,
            body,
            plain_text,
        })
    }
}

impl PageClient for HttpPageClient {
    async fn open(&mut self, url: &Url) -> Result<(), PageError> {
        let view = self.fetch(url).await?;
        self.views = vec![view];
        self.current = 0;
        Ok(())
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<(), PageError> {
        let parsed = parse_selector(selector)?;
        let deadline = Instant::now() + timeout;

        loop {
            let view = self.current_view()?;
            if matches_selector(view, &parsed) {
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(PageError::Timeout {
                    selector: selector.to_string(),
                    timeout,
                });
            }

            let url = view.url.clone();
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;

            let refreshed = self.fetch(&url).await?;
            if let Some(slot) = self.views.get_mut(self.current) {
                *slot = refreshed;
            }
        }
    }

    async fn invoke(&mut self, selector: &str) -> Result<(), PageError> {
        let parsed = parse_selector(selector)?;
        let target = action_target(self.current_view()?, selector, &parsed)?;

        let view = self.fetch(&target).await?;
        self.views.push(view);
        Ok(())
    }

    fn switch_to_newest_view(&mut self) -> Result<(), PageError> {
        if self.views.len() < 2 {
            return Err(PageError::NoNewView);
        }
        self.current = self.views.len() - 1;
        Ok(())
    }

    fn location(&self) -> Option<&Url> {
        self.views.get(self.current).map(|v| &v.url)
    }

    fn read_visible_text(&self) -> Result<String, PageError> {
        let view = self.current_view()?;
        if view.plain_text {
            return Ok(view.body.clone());
        }
        Ok(visible_text(&Html::parse_document(&view.body)))
    }

    fn close_current_view(&mut self) -> Result<(), PageError> {
        if self.current >= self.views.len() {
            return Err(PageError::NoView);
        }
        self.views.remove(self.current);
        self.current = 0;
        Ok(())
    }

    fn reset(&mut self) -> Result<(), PageError> {
        // reqwest cannot clear its cookie jar, so a fresh client stands in
        self.client = Some(build_client(&self.config)?);
        Ok(())
    }

    fn recreate(&mut self) -> Result<(), PageError> {
        self.client = None;
        self.views.clear();
        self.current = 0;
        self.client = Some(build_client(&self.config)?);
        Ok(())
    }
}

/// Builds the HTTP client backing a session
///
/// # Arguments
///
/// * `config` - Page timeouts and user agent
///
/// # Returns
///
/// * `Ok(Client)` - Client with an empty cookie store
/// * `Err(PageError::Session)` - Client could not be built
fn build_client(config: &PageConfig) -> Result<Client, PageError> {
    let timeout = config.page_load_timeout();

    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(Policy::limited(10))
        .cookie_store(true)
        .gzip(true)
        .brotli(true)
        .build()
        .map_err(|e| PageError::Session(format!("failed to build HTTP client: {}", e)))
}

fn navigation_error(url: &Url, e: reqwest::Error) -> PageError {
    let kind = if e.is_connect() {
        FailureKind::ConnectivityLoss
    } else {
        FailureKind::Transient
    };

    let message = if e.is_timeout() {
        "request timed out".to_string()
    } else {
        e.to_string()
    };

    PageError::Navigation {
        url: url.to_string(),
        kind,
        message,
    }
}

fn describe_status(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("HTTP {} {}", status.as_u16(), reason),
        None => format!("HTTP {}", status.as_u16()),
    }
}

fn parse_selector(selector: &str) -> Result<Selector, PageError> {
    Selector::parse(selector).map_err(|e| PageError::Action {
        selector: selector.to_string(),
        kind: FailureKind::SessionFatal,
        message: format!("invalid selector: {:?}", e),
    })
}

fn matches_selector(view: &View, selector: &Selector) -> bool {
    Html::parse_document(&view.body)
        .select(selector)
        .next()
        .is_some()
}

/// Resolves the URL the first element matching `selector` points at
fn action_target(view: &View, raw: &str, selector: &Selector) -> Result<Url, PageError> {
    let document = Html::parse_document(&view.body);
    let action_error = |message: String| PageError::Action {
        selector: raw.to_string(),
        kind: FailureKind::Transient,
        message,
    };

    let element = document
        .select(selector)
        .next()
        .ok_or_else(|| action_error("no matching element".to_string()))?;

    let target = TARGET_ATTRIBUTES
        .iter()
        .find_map(|attr| element.value().attr(attr))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| action_error("control has no target".to_string()))?;

    view.url
        .join(target)
        .map_err(|e| action_error(format!("bad target '{}': {}", target, e)))
}

/// Visible text of a document, one line per block element
fn visible_text(document: &Html) -> String {
    let mut raw = String::new();
    append_text(document.root_element(), &mut raw);

    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn append_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                let name = el.name();
                if HIDDEN_ELEMENTS.contains(&name) {
                    continue;
                }
                if name == "br" {
                    out.push('\n');
                    continue;
                }
                if let Some(child_element) = ElementRef::wrap(child) {
                    let block = BLOCK_ELEMENTS.contains(&name);
                    if block {
                        out.push('\n');
                    }
                    append_text(child_element, out);
                    if block {
                        out.push('\n');
                    }
                }
            }
            _ => {}
        }
    }
}
