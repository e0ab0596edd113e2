//! Field extraction from export text

use regex::Regex;
use std::sync::LazyLock;

static NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*Name:[ \t]*(.*?)[ \t]*$").expect("Invalid name regex")
});

static FACTION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*Faction:[ \t]*(.*?)[ \t]*$").expect("Invalid faction regex")
});

static COMMANDER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*Commander:[ \t]*(.*?)[ \t]*$").expect("Invalid commander regex")
});

static POINTS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Total Points:[ \t]*(\d+)").expect("Invalid points regex")
});

/// Labeled fields of an export view
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportFields {
    pub name: String,
    pub faction: String,
    pub commander: String,
    pub points: i64,
}

/// Extracts the labeled fields from export text
///
/// Missing text fields come back empty and missing or unparseable points come
/// back as 0; parsing never fails.
pub fn parse_export(text: &str) -> ExportFields {
    ExportFields {
        name: capture(&NAME_REGEX, text),
        faction: capture(&FACTION_REGEX, text),
        commander: capture(&COMMANDER_REGEX, text),
        points: POINTS_REGEX
            .captures(text)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0),
    }
}

fn capture(regex: &Regex, text: &str) -> String {
    regex
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}
