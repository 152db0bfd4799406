//! Tag query parsing.
//!
//! Turns free-form tag text such as `"cat -dog  solo"` into an include/exclude
//! split and back into the query syntax the imageboard expects, with every
//! include tag ahead of the excluded ones.

use std::fmt;

/// Prefix marking a tag as excluded from the search.
const EXCLUDE_PREFIX: char = '-';

/// A parsed tag query with separate include and exclude lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagQuery {
    include_tags: Vec<String>,
    exclude_tags: Vec<String>,
}

impl TagQuery {
    /// Parse raw tag text.
    ///
    /// Tokens are split on whitespace. A token that starts with `-` and has
    /// more than one character is an exclusion; everything else, including a
    /// lone `-`, is an inclusion. A tag can only live in one of the two lists,
    /// so a later occurrence reclassifies an earlier one.
    pub fn parse(input: &str) -> Self {
        let mut query = TagQuery::default();

        for token in input.split_whitespace() {
            match token.strip_prefix(EXCLUDE_PREFIX) {
                Some(tag) if !tag.is_empty() => query.push_exclude(tag),
                _ => query.push_include(token),
            }
        }

        query
    }

    fn push_include(&mut self, tag: &str) {
        self.forget(tag);
        self.include_tags.push(tag.to_string());
    }

    fn push_exclude(&mut self, tag: &str) {
        self.forget(tag);
        self.exclude_tags.push(tag.to_string());
    }

    fn forget(&mut self, tag: &str) {
        self.include_tags.retain(|t| t != tag);
        self.exclude_tags.retain(|t| t != tag);
    }

    pub fn include_tags(&self) -> &[String] {
        &self.include_tags
    }

    pub fn exclude_tags(&self) -> &[String] {
        &self.exclude_tags
    }

    pub fn is_empty(&self) -> bool {
        self.include_tags.is_empty() && self.exclude_tags.is_empty()
    }
}

impl fmt::Display for TagQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for tag in &self.include_tags {
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(tag)?;
            first = false;
        }
        for tag in &self.exclude_tags {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{}{}", EXCLUDE_PREFIX, tag)?;
            first = false;
        }
        Ok(())
    }
}

/// Normalize raw tag text into `"<includes> -<excludes>"` form.
pub fn normalize_tags(input: &str) -> String {
    TagQuery::parse(input).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excludes_follow_includes() {
        assert_eq!(normalize_tags("-dog cat -bird solo"), "cat solo -dog -bird");
    }

    #[test]
    fn test_whitespace_is_collapsed() {
        assert_eq!(normalize_tags("  cat \t  dog\n"), "cat dog");
        assert_eq!(normalize_tags(""), "");
        assert_eq!(normalize_tags("   "), "");
    }

    #[test]
    fn test_lone_dash_is_an_include() {
        let query = TagQuery::parse("- cat");
        assert_eq!(query.include_tags(), ["-", "cat"]);
        assert!(query.exclude_tags().is_empty());
    }

    #[test]
    fn test_exclude_only_query() {
        assert_eq!(normalize_tags("-nsfw -gore"), "-nsfw -gore");
    }

    #[test]
    fn test_last_classification_wins() {
        let query = TagQuery::parse("cat -cat dog");
        assert_eq!(query.include_tags(), ["dog"]);
        assert_eq!(query.exclude_tags(), ["cat"]);

        let query = TagQuery::parse("-cat cat");
        assert_eq!(query.include_tags(), ["cat"]);
        assert!(query.exclude_tags().is_empty());
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let inputs = [
            "zzz -nsfw",
            "-a b -c d",
            "--double -single plain",
            "- lone",
            "rating:safe -rating:explicit",
            "a a -a b",
        ];

        for input in inputs {
            let once = normalize_tags(input);
            assert_eq!(normalize_tags(&once), once, "input: {input:?}");
        }
    }

    #[test]
    fn test_exclusions_keep_a_single_prefix() {
        let normalized = normalize_tags("--weird -plain");
        assert_eq!(normalized, "--weird -plain");

        let query = TagQuery::parse(&normalized);
        assert_eq!(query.exclude_tags(), ["-weird", "plain"]);
    }
}
