use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Rating token appended for safe-only searches.
pub const SAFE_RATING: &str = "rating:safe";

/// Rating token appended for explicit-only searches.
pub const EXPLICIT_RATING: &str = "rating:explicit";

/// Content rating restriction attached to a search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentFilter {
    #[default]
    All,
    SfwOnly,
    NsfwOnly,
}

impl ContentFilter {
    /// The rating token this filter adds to a query, if any.
    pub fn rating_tag(self) -> Option<&'static str> {
        match self {
            ContentFilter::All => None,
            ContentFilter::SfwOnly => Some(SAFE_RATING),
            ContentFilter::NsfwOnly => Some(EXPLICIT_RATING),
        }
    }

    /// Pick the filter for a request: an explicit restriction wins, `All`
    /// defers to the user's default.
    pub fn or_default(self, user_default: ContentFilter) -> ContentFilter {
        match self {
            ContentFilter::All => user_default,
            explicit => explicit,
        }
    }

    /// Append this filter's rating constraint to a tag query.
    pub fn apply(self, query: &str) -> String {
        let query = query.trim();
        match self.rating_tag() {
            None => query.to_string(),
            Some(rating) if query.is_empty() => rating.to_string(),
            Some(rating) => format!("{} {}", query, rating),
        }
    }

    /// Short label used in captions and prompts.
    pub fn label(self) -> &'static str {
        match self {
            ContentFilter::All => "all",
            ContentFilter::SfwOnly => "SFW",
            ContentFilter::NsfwOnly => "NSFW",
        }
    }
}

impl fmt::Display for ContentFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ContentFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" => Ok(ContentFilter::All),
            // "swf" is a common typo and has always been accepted.
            "sfw" | "swf" | "safe" => Ok(ContentFilter::SfwOnly),
            "nsfw" | "explicit" => Ok(ContentFilter::NsfwOnly),
            other => Err(format!("unknown content filter '{}'", other)),
        }
    }
}
