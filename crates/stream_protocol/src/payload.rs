use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub const DEEPTHINK_TAG: &str = "[deepthink]";
pub const WEB_SEARCH_TAG: &str = "[web]";

/// Body of the single request that opens a generation stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRequest {
    pub query: String,
}

impl StartRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
        }
    }

    /// Build a request whose query carries the in-line tags for `flags`.
    pub fn with_modes(query: &str, flags: ModeFlags) -> Self {
        Self::new(flags.apply(query))
    }

    pub fn modes(&self) -> ModeFlags {
        ModeFlags::parse(&self.query)
    }
}

/// Producer-side switches expressed as opaque tags appended to the query text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModeFlags {
    pub deepthink: bool,
    pub web_search: bool,
}

impl ModeFlags {
    /// Append each enabled tag unless the query already contains it (case-insensitive).
    pub fn apply(&self, query: &str) -> String {
        let mut tagged = query.trim().to_owned();
        let lowered = tagged.to_lowercase();
        if self.deepthink && !lowered.contains(DEEPTHINK_TAG) {
            tagged.push(' ');
            tagged.push_str(DEEPTHINK_TAG);
        }
        if self.web_search && !lowered.contains(WEB_SEARCH_TAG) {
            tagged.push(' ');
            tagged.push_str(WEB_SEARCH_TAG);
        }
        tagged
    }

    pub fn parse(query: &str) -> Self {
        let lowered = query.to_lowercase();
        Self {
            deepthink: lowered.contains(DEEPTHINK_TAG),
            web_search: lowered.contains(WEB_SEARCH_TAG),
        }
    }

    /// Remove every mode tag and collapse the whitespace they leave behind.
    pub fn strip(query: &str) -> String {
        let stripped = mode_tag_pattern().replace_all(query, " ");
        stripped.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

fn mode_tag_pattern() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"(?i)\[(?:deepthink|web)\]").expect("mode tag regex must compile")
    })
}
