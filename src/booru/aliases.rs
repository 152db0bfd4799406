use std::collections::HashMap;

use once_cell::sync::Lazy;

/// Built-in shorthand table, keyed by lowercase alias.
static GLOBAL_ALIASES: Lazy<AliasTable> = Lazy::new(|| {
    AliasTable::from_pairs(&[
        // Games
        ("zzz", "zenless_zone_zero"),
        ("genshin", "genshin_impact"),
        ("hsr", "honkai:_star_rail"),
        ("hi3", "honkai_impact_3rd"),
        ("fgo", "fate/grand_order"),
        ("azur", "azur_lane"),
        ("arknights", "arknights"),
        ("ba", "blue_archive"),
        ("nikke", "goddess_of_victory:_nikke"),
        ("ff14", "final_fantasy_xiv"),
        ("lol", "league_of_legends"),
        ("ow", "overwatch"),
        ("valorant", "valorant"),
        // Anime and manga
        ("jjk", "jujutsu_kaisen"),
        ("aot", "shingeki_no_kyojin"),
        ("mha", "boku_no_hero_academia"),
        ("ds", "kimetsu_no_yaiba"),
        ("op", "one_piece"),
        ("naruto", "naruto_(series)"),
        ("bleach", "bleach_(series)"),
        ("dbz", "dragon_ball_z"),
        ("eva", "neon_genesis_evangelion"),
        ("fma", "fullmetal_alchemist"),
        // Characters
        ("miku", "hatsune_miku"),
        ("rem", "rem_(re:zero)"),
        ("zero_two", "zero_two_(darling_in_the_franxx)"),
        ("asuka", "souryuu_asuka_langley"),
        ("rei", "ayanami_rei"),
        // General
        ("waifu", "1girl"),
        ("husbando", "1boy"),
        ("kawaii", "cute"),
        // Styles
        ("pixel", "pixel_art"),
    ])
});

/// A case-insensitive alias lookup table.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    entries: HashMap<String, String>,
}

impl AliasTable {
    /// The shared built-in table.
    pub fn global() -> &'static AliasTable {
        &GLOBAL_ALIASES
    }

    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        let entries = pairs
            .iter()
            .map(|(alias, tag)| (alias.to_lowercase(), tag.to_string()))
            .collect();
        Self { entries }
    }

    pub fn get(&self, alias: &str) -> Option<&str> {
        self.entries.get(&alias.to_lowercase()).map(String::as_str)
    }

    /// All entries sorted by alias, for display.
    pub fn sorted_entries(&self) -> Vec<(&str, &str)> {
        let mut entries: Vec<(&str, &str)> = self
            .entries
            .iter()
            .map(|(alias, tag)| (alias.as_str(), tag.as_str()))
            .collect();
        entries.sort_unstable();
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A single token that was rewritten during expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    pub from: String,
    pub to: String,
    pub from_user_alias: bool,
}

/// Result of expanding a tag string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expansion {
    pub tags: String,
    pub rewrites: Vec<Rewrite>,
}

/// Expand shorthand tokens in `tags`.
///
/// Each whitespace separated token is looked up case-insensitively, first in
/// `user_aliases` and then in `table`. Tokens with no alias are kept verbatim.
pub fn expand_aliases(
    tags: &str,
    user_aliases: Option<&HashMap<String, String>>,
    table: &AliasTable,
) -> Expansion {
    let mut expanded = Vec::new();
    let mut rewrites = Vec::new();

    for token in tags.split_whitespace() {
        let lower = token.to_lowercase();

        let user_hit = user_aliases.and_then(|aliases| lookup_user_alias(aliases, &lower));
        let (replacement, from_user_alias) = match user_hit {
            Some(tag) => (Some(tag), true),
            None => (table.get(&lower), false),
        };

        match replacement {
            Some(tag) => {
                rewrites.push(Rewrite {
                    from: token.to_string(),
                    to: tag.to_string(),
                    from_user_alias,
                });
                expanded.push(tag.to_string());
            }
            None => expanded.push(token.to_string()),
        }
    }

    Expansion {
        tags: expanded.join(" "),
        rewrites,
    }
}

fn lookup_user_alias<'a>(aliases: &'a HashMap<String, String>, lower: &str) -> Option<&'a str> {
    if let Some(tag) = aliases.get(lower) {
        return Some(tag.as_str());
    }

    // Keys written by hand into the settings file may not be lowercase.
    aliases
        .iter()
        .find(|(alias, _)| alias.to_lowercase() == lower)
        .map(|(_, tag)| tag.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_global_aliases_expand() {
        let expansion = expand_aliases("zzz -nsfw", None, AliasTable::global());
        assert_eq!(expansion.tags, "zenless_zone_zero -nsfw");
        assert_eq!(expansion.rewrites.len(), 1);
        assert_eq!(expansion.rewrites[0].from, "zzz");
        assert!(!expansion.rewrites[0].from_user_alias);
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let expansion = expand_aliases("MIKU Genshin", None, AliasTable::global());
        assert_eq!(expansion.tags, "hatsune_miku genshin_impact");
    }

    #[test]
    fn test_unknown_tokens_are_kept_verbatim() {
        let expansion = expand_aliases("Some_Tag other", None, AliasTable::global());
        assert_eq!(expansion.tags, "Some_Tag other");
        assert!(expansion.rewrites.is_empty());
    }

    #[test]
    fn test_user_alias_takes_precedence() {
        let aliases = user_map(&[("zzz", "my_own_tag"), ("cat", "cat_ears")]);
        let expansion = expand_aliases("ZZZ cat miku", Some(&aliases), AliasTable::global());

        assert_eq!(expansion.tags, "my_own_tag cat_ears hatsune_miku");
        assert!(expansion.rewrites[0].from_user_alias);
        assert!(expansion.rewrites[1].from_user_alias);
        assert!(!expansion.rewrites[2].from_user_alias);
    }

    #[test]
    fn test_user_alias_keys_are_case_insensitive() {
        let aliases = user_map(&[("MixedCase", "resolved")]);
        let expansion = expand_aliases("mixedcase", Some(&aliases), &AliasTable::default());
        assert_eq!(expansion.tags, "resolved");
    }

    #[test]
    fn test_empty_input() {
        let expansion = expand_aliases("", None, AliasTable::global());
        assert_eq!(expansion, Expansion::default());
    }

    #[test]
    fn test_sorted_entries() {
        let table = AliasTable::from_pairs(&[("b", "two"), ("A", "one")]);
        assert_eq!(table.sorted_entries(), vec![("a", "one"), ("b", "two")]);
        assert_eq!(table.len(), 2);
    }
}
