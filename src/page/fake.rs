//! Scripted in-memory page client for unit tests

use crate::page::{FailureKind, PageClient, PageError};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use url::Url;

pub(crate) const FAKE_BASE: &str = "https://fleets.example.com";

#[derive(Debug, Clone)]
pub(crate) enum FakeDoc {
    /// Record page whose export view shows `text`
    Record(String),
    /// Record page without an export control
    NoExport,
}

/// Page client answering from a fixed table of documents
///
/// Identifiers without a document redirect to the home location, the way the
/// remote source treats private records.
#[derive(Debug)]
pub(crate) struct FakePage {
    home: Url,
    docs: HashMap<String, FakeDoc>,
    open_failures: VecDeque<PageError>,
    targeted_open_failures: HashMap<String, VecDeque<PageError>>,
    invoke_failures: VecDeque<PageError>,
    recreate_failures: VecDeque<PageError>,
    fail_close: bool,
    location: Option<Url>,
    doc: Option<FakeDoc>,
    pending_view: Option<String>,
    export_view: Option<String>,
    pub opened: Vec<Url>,
    pub resets: u32,
    pub recreates: u32,
}

impl FakePage {
    pub fn new() -> Self {
        Self {
            home: Url::parse(&format!("{}/", FAKE_BASE)).unwrap(),
            docs: HashMap::new(),
            open_failures: VecDeque::new(),
            targeted_open_failures: HashMap::new(),
            invoke_failures: VecDeque::new(),
            recreate_failures: VecDeque::new(),
            fail_close: false,
            location: None,
            doc: None,
            pending_view: None,
            export_view: None,
            opened: Vec::new(),
            resets: 0,
            recreates: 0,
        }
    }

    fn key(identifier: i64) -> String {
        format!("/fleet/{}/", identifier)
    }

    pub fn with_record(mut self, identifier: i64, text: &str) -> Self {
        self.docs
            .insert(Self::key(identifier), FakeDoc::Record(text.to_string()));
        self
    }

    pub fn with_fleet(self, identifier: i64, faction: &str, points: i64) -> Self {
        let text = format!(
            "Name: Fleet {}\nFaction: {}\nCommander: Thrawn\nTotal Points: {}\n",
            identifier, faction, points
        );
        self.with_record(identifier, &text)
    }

    pub fn with_no_export(mut self, identifier: i64) -> Self {
        self.docs.insert(Self::key(identifier), FakeDoc::NoExport);
        self
    }

    pub fn fail_next_open(mut self, error: PageError) -> Self {
        self.open_failures.push_back(error);
        self
    }

    /// Fails the next open of one identifier's page
    pub fn fail_open(mut self, identifier: i64, error: PageError) -> Self {
        self.targeted_open_failures
            .entry(Self::key(identifier))
            .or_default()
            .push_back(error);
        self
    }

    pub fn fail_next_invoke(mut self, error: PageError) -> Self {
        self.invoke_failures.push_back(error);
        self
    }

    pub fn fail_next_recreate(mut self, error: PageError) -> Self {
        self.recreate_failures.push_back(error);
        self
    }

    pub fn fail_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn opened_identifiers(&self) -> Vec<i64> {
        self.opened
            .iter()
            .filter_map(|url| {
                url.path_segments()?
                    .filter(|s| !s.is_empty())
                    .last()?
                    .parse()
                    .ok()
            })
            .collect()
    }

    pub fn connectivity_loss(url: &str) -> PageError {
        PageError::Navigation {
            url: url.to_string(),
            kind: FailureKind::ConnectivityLoss,
            message: "connection refused".to_string(),
        }
    }
}

impl PageClient for FakePage {
    async fn open(&mut self, url: &Url) -> Result<(), PageError> {
        self.opened.push(url.clone());
        self.pending_view = None;
        self.export_view = None;

        if let Some(error) = self.open_failures.pop_front() {
            return Err(error);
        }
        if let Some(error) = self
            .targeted_open_failures
            .get_mut(url.path())
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }

        match self.docs.get(url.path()) {
            Some(doc) => {
                self.location = Some(url.clone());
                self.doc = Some(doc.clone());
            }
            None => {
                self.location = Some(self.home.clone());
                self.doc = None;
            }
        }
        Ok(())
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<(), PageError> {
        if self.location.is_none() {
            return Err(PageError::NoView);
        }
        if self.export_view.is_some() || selector == "body" {
            return Ok(());
        }
        match self.doc {
            Some(FakeDoc::Record(_)) => Ok(()),
            _ => Err(PageError::Timeout {
                selector: selector.to_string(),
                timeout,
            }),
        }
    }

    async fn invoke(&mut self, selector: &str) -> Result<(), PageError> {
        if let Some(error) = self.invoke_failures.pop_front() {
            return Err(error);
        }
        match &self.doc {
            Some(FakeDoc::Record(text)) => {
                self.pending_view = Some(text.clone());
                Ok(())
            }
            _ => Err(PageError::Action {
                selector: selector.to_string(),
                kind: FailureKind::Transient,
                message: "no matching element".to_string(),
            }),
        }
    }

    fn switch_to_newest_view(&mut self) -> Result<(), PageError> {
        self.export_view = Some(self.pending_view.take().ok_or(PageError::NoNewView)?);
        Ok(())
    }

    fn location(&self) -> Option<&Url> {
        self.location.as_ref()
    }

    fn read_visible_text(&self) -> Result<String, PageError> {
        match (&self.export_view, &self.location) {
            (Some(text), _) => Ok(text.clone()),
            (None, Some(_)) => Ok(String::new()),
            (None, None) => Err(PageError::NoView),
        }
    }

    fn close_current_view(&mut self) -> Result<(), PageError> {
        if self.fail_close {
            return Err(PageError::Session("window already closed".to_string()));
        }
        self.export_view = None;
        Ok(())
    }

    fn reset(&mut self) -> Result<(), PageError> {
        self.resets += 1;
        Ok(())
    }

    fn recreate(&mut self) -> Result<(), PageError> {
        self.recreates += 1;
        self.location = None;
        self.doc = None;
        self.pending_view = None;
        self.export_view = None;
        match self.recreate_failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
