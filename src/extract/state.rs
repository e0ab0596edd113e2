use crate::storage::Record;

/// Step of a single extraction attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    Navigate,
    WaitBody,
    CheckRedirect,
    ClickExport,
    WaitNewView,
    ReadText,
    Parse { text: String },
}

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Navigate => "navigate",
            Self::WaitBody => "wait_body",
            Self::CheckRedirect => "check_redirect",
            Self::ClickExport => "click_export",
            Self::WaitNewView => "wait_new_view",
            Self::ReadText => "read_text",
            Self::Parse { .. } => "parse",
        }
    }
}

/// Result of extracting one identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A record at or above the points threshold
    Record(Record),

    /// Nothing to persist for this identifier
    Skipped(SkipReason),

    /// The session must be recreated before this identifier is tried again
    ResetRequired,
}

/// Why no record was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The source redirected to its home location
    Private,
    /// The record exists but is below the points threshold
    LowPoints { points: i64 },
    /// Transient step failures used up every attempt
    RetriesExhausted,
    /// The export view stayed empty on every attempt
    EmptyText,
}

impl SkipReason {
    /// True when the source gave a definite answer for the identifier
    pub fn is_productive(&self) -> bool {
        matches!(self, Self::Private | Self::LowPoints { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::LowPoints { .. } => "low_points",
            Self::RetriesExhausted => "retries_exhausted",
            Self::EmptyText => "empty_text",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definite_answers_are_productive() {
        assert!(SkipReason::Private.is_productive());
        assert!(SkipReason::LowPoints { points: 120 }.is_productive());
        assert!(!SkipReason::RetriesExhausted.is_productive());
        assert!(!SkipReason::EmptyText.is_productive());
    }
}
