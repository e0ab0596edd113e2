//! Extraction state machine
//!
//! Turns one identifier into an [`Outcome`] by driving a [`crate::page::PageClient`]
//! through `Navigate → WaitBody → CheckRedirect → ClickExport → WaitNewView →
//! ReadText → Parse`. Transient step failures restart the attempt from
//! `Navigate` a bounded number of times; failures that leave the session in an
//! unknown state end in [`Outcome::ResetRequired`].

mod machine;
mod parser;
mod state;

pub use machine::Extractor;
pub use parser::{parse_export, ExportFields};
pub use state::{Outcome, SkipReason, State};
