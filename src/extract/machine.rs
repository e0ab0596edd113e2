use crate::config::{Config, SourceConfig};
use crate::connectivity::ConnectivityMonitor;
use crate::extract::parser::parse_export;
use crate::extract::state::{Outcome, SkipReason, State};
use crate::page::{FailureKind, PageClient, PageError};
use crate::storage::{Origin, Record};
use chrono::Utc;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

/// Pause between checks for a newly opened view
const VIEW_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// How an attempt ended
enum Step {
    Finished(Outcome),
    /// Start over from `Navigate`; the reason is reported if no attempt is left
    Retry(SkipReason),
}

enum Transition {
    Next(State),
    Finish(Step),
}

/// Runs the extraction state machine for single identifiers
#[derive(Debug, Clone)]
pub struct Extractor {
    source: SourceConfig,
    home: Url,
    points_threshold: i64,
    max_step_retries: u32,
    element_timeout: Duration,
    export_timeout: Duration,
    monitor: ConnectivityMonitor,
}

impl Extractor {
    pub fn new(config: &Config, monitor: ConnectivityMonitor) -> crate::Result<Self> {
        Ok(Self {
            source: config.source.clone(),
            home: config.source.home_url()?,
            points_threshold: config.pipeline.points_threshold,
            max_step_retries: config.pipeline.max_step_retries.max(1),
            element_timeout: config.page.element_timeout(),
            export_timeout: config.page.export_timeout(),
            monitor,
        })
    }

    /// Extracts one identifier
    ///
    /// Never persists anything; the caller decides what to do with the
    /// outcome. Page failures are absorbed into the outcome, so an `Err` only
    /// means the identifier could not be turned into a URL.
    ///
    /// # Arguments
    ///
    /// * `page` - The worker's page session
    /// * `identifier` - Record identifier to extract
    ///
    /// # Returns
    ///
    /// * `Outcome::Record` - Record at or above the points threshold
    /// * `Outcome::Skipped` - Nothing to persist, with the reason
    /// * `Outcome::ResetRequired` - Session must be recreated and the identifier retried
    pub async fn extract<P: PageClient>(
        &self,
        page: &mut P,
        identifier: i64,
    ) -> crate::Result<Outcome> {
        let url = self.source.record_url(identifier)?;
        let mut attempt = 0;

        loop {
            attempt += 1;

            if attempt > 1 {
                if let Err(e) = page.reset() {
                    tracing::warn!(identifier, "Could not clear session state: {}", e);
                    return Ok(Outcome::ResetRequired);
                }
            }

            match self.attempt(page, identifier, &url).await {
                Step::Finished(outcome) => return Ok(outcome),
                Step::Retry(reason) if attempt >= self.max_step_retries => {
                    tracing::debug!(
                        identifier,
                        "Giving up after {} attempts ({})",
                        attempt,
                        reason.as_str()
                    );
                    return Ok(Outcome::Skipped(reason));
                }
                Step::Retry(reason) => {
                    tracing::debug!(
                        identifier,
                        "Attempt {} failed ({}), retrying",
                        attempt,
                        reason.as_str()
                    );
                }
            }
        }
    }

    async fn attempt<P: PageClient>(&self, page: &mut P, identifier: i64, url: &Url) -> Step {
        let mut state = State::Navigate;
        let mut export_open = false;

        let step = loop {
            tracing::trace!(identifier, state = state.as_str(), "Entering state");

            match self.advance(page, identifier, url, &state, &mut export_open).await {
                Ok(Transition::Next(next)) => state = next,
                Ok(Transition::Finish(step)) => break step,
                Err(e) => {
                    tracing::debug!(
                        identifier,
                        state = state.as_str(),
                        "Page step failed: {}",
                        e
                    );
                    break self.on_failure(&state, &e).await;
                }
            }
        };

        if export_open {
            if let Err(e) = page.close_current_view() {
                tracing::warn!(identifier, "Could not close export view: {}", e);
                return Step::Finished(Outcome::ResetRequired);
            }
        }

        step
    }

    async fn advance<P: PageClient>(
        &self,
        page: &mut P,
        identifier: i64,
        url: &Url,
        state: &State,
        export_open: &mut bool,
    ) -> Result<Transition, PageError> {
        let next = match state {
            State::Navigate => {
                page.open(url).await?;
                State::WaitBody
            }
            State::WaitBody => {
                page.wait_for(&self.source.body_selector, self.element_timeout)
                    .await?;
                State::CheckRedirect
            }
            State::CheckRedirect => {
                let location = page.location().ok_or(PageError::NoView)?;
                if is_same_location(location, &self.home) {
                    tracing::debug!(identifier, "Redirected home, record is private");
                    return Ok(Transition::Finish(Step::Finished(Outcome::Skipped(
                        SkipReason::Private,
                    ))));
                }
                State::ClickExport
            }
            State::ClickExport => {
                page.wait_for(&self.source.export_selector, self.export_timeout)
                    .await?;
                page.invoke(&self.source.export_selector).await?;
                State::WaitNewView
            }
            State::WaitNewView => {
                self.switch_to_new_view(page).await?;
                *export_open = true;
                page.wait_for(&self.source.body_selector, self.export_timeout)
                    .await?;
                State::ReadText
            }
            State::ReadText => {
                let text = page.read_visible_text()?;

                // Closing is its own failure mode, distinct from a failed read
                *export_open = false;
                if let Err(e) = page.close_current_view() {
                    tracing::warn!(identifier, "Could not close export view: {}", e);
                    return Ok(Transition::Finish(Step::Finished(Outcome::ResetRequired)));
                }

                if text.trim().is_empty() {
                    return Ok(Transition::Finish(Step::Retry(SkipReason::EmptyText)));
                }
                State::Parse { text }
            }
            State::Parse { text } => {
                let fields = parse_export(text);

                if fields.points < self.points_threshold {
                    tracing::debug!(
                        identifier,
                        "Below threshold with {} points",
                        fields.points
                    );
                    return Ok(Transition::Finish(Step::Finished(Outcome::Skipped(
                        SkipReason::LowPoints {
                            points: fields.points,
                        },
                    ))));
                }

                return Ok(Transition::Finish(Step::Finished(Outcome::Record(Record {
                    identifier,
                    raw_payload: text.clone(),
                    faction: fields.faction,
                    name: fields.name,
                    commander: fields.commander,
                    points: fields.points,
                    origin: Origin::Shared,
                    captured_at: Utc::now(),
                }))));
            }
        };

        Ok(Transition::Next(next))
    }

    async fn switch_to_new_view<P: PageClient>(&self, page: &mut P) -> Result<(), PageError> {
        let deadline = Instant::now() + self.export_timeout;
        loop {
            match page.switch_to_newest_view() {
                Err(PageError::NoNewView) if Instant::now() < deadline => {
                    let remaining = deadline - Instant::now();
                    tokio::time::sleep(VIEW_POLL_INTERVAL.min(remaining)).await;
                }
                result => return result,
            }
        }
    }

    /// Maps a failed step to the next move
    ///
    /// Network-shaped failures always go through the connectivity monitor
    /// first. Only a failed navigation may be retried after an outage; any
    /// later step leaves view state that cannot be trusted.
    async fn on_failure(&self, state: &State, error: &PageError) -> Step {
        match error.kind() {
            FailureKind::SessionFatal => Step::Finished(Outcome::ResetRequired),
            FailureKind::ConnectivityLoss => self.after_outage(state).await,
            FailureKind::Transient => {
                if self.monitor.probe().await {
                    Step::Retry(SkipReason::RetriesExhausted)
                } else {
                    self.after_outage(state).await
                }
            }
        }
    }

    async fn after_outage(&self, state: &State) -> Step {
        let restored = self.monitor.wait_for_recovery().await;
        if restored && matches!(state, State::Navigate) {
            Step::Retry(SkipReason::RetriesExhausted)
        } else {
            Step::Finished(Outcome::ResetRequired)
        }
    }
}

fn is_same_location(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
        && a.path().trim_end_matches('/') == b.path().trim_end_matches('/')
}
