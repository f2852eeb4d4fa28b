//! Location name extraction from free text
//!
//! Pattern-based and stateless: the compiled patterns hold no match cursor,
//! so the same input always yields the same set. No-match input yields an
//! empty set rather than an error.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

// =============================================================================
// PATTERNS
// =============================================================================

/// Movement verb, optional article, then a capitalised phrase ending in a place noun.
static ARRIVAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:in|at|near|towards|reach(?:es)?|arrives? (?:at|in)|visit(?:ing)?|enter(?:ing)?|discovered|found|approaching|leaving)\s+(?:the\s+)?([A-Z][a-zA-Z ']{1,30}?(?:City|Town|Village|Forest|Mountains?|Castle|Tavern|Inn|Cave|Tower|Ruins|Temple|Bridge|River|Lake|Valley|Plains?|Desert|Island|Harbor|Keep|Dungeon|Grove|Cemetery|Shrine|Fort|Outpost|Camp|Meadow))\b",
    )
    .unwrap()
});

/// Single capitalised word carrying a toponym suffix.
static TOPONYM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:the\s+)?([A-Z][a-z]+(?:wood|dale|burg|heim|port|haven|gate|ford|crest|fall|peak|shore|keep|hall|crypt|grove|moor|wich|bury|stead|ton))\b",
    )
    .unwrap()
});

// =============================================================================
// EXTRACTOR
// =============================================================================

/// Extracts candidate location names from message or lore text.
#[derive(Debug, Clone)]
pub struct LocationExtractor {
    patterns: Vec<&'static Regex>,
}

impl Default for LocationExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationExtractor {
    pub fn new() -> Self {
        Self {
            patterns: vec![&*ARRIVAL_RE, &*TOPONYM_RE],
        }
    }

    /// Collect every capture across all patterns, trimmed and de-duplicated
    /// by exact string.
    pub fn extract(&self, text: &str) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        for pattern in &self.patterns {
            for caps in pattern.captures_iter(text) {
                if let Some(m) = caps.get(1) {
                    let name = m.as_str().trim();
                    if !name.is_empty() {
                        found.insert(name.to_string());
                    }
                }
            }
        }
        found
    }
}

/// Convenience wrapper over the default extractor.
pub fn extract_locations(text: &str) -> BTreeSet<String> {
    LocationExtractor::new().extract(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn names(text: &str) -> Vec<String> {
        extract_locations(text).into_iter().collect()
    }

    #[test]
    fn test_arrival_phrase() {
        assert_eq!(
            names("At dusk the party arrives at the Silver Lake and rests."),
            vec!["Silver Lake".to_string()]
        );
    }

    #[test]
    fn test_shortest_phrase_wins() {
        let found = names("They camped near Whispering Forest and Silver Lake");
        assert!(found.contains(&"Whispering Forest".to_string()));
        assert!(!found.iter().any(|n| n.contains(" and ")));
    }

    #[test]
    fn test_toponym_suffix() {
        let found = names("Word spread from Ravenwood to Stormhaven overnight.");
        assert_eq!(found, vec!["Ravenwood".to_string(), "Stormhaven".to_string()]);
    }

    #[test]
    fn test_both_patterns_merge() {
        let found = names("We are leaving Ironforge Keep for Ravenwood.");
        assert!(found.contains(&"Ironforge Keep".to_string()));
        assert!(found.contains(&"Ravenwood".to_string()));
    }

    #[test]
    fn test_lowercase_is_ignored() {
        assert!(names("we walked into the forest and found a lake").is_empty());
    }

    #[test]
    fn test_empty_input() {
        assert!(names("").is_empty());
    }

    #[test]
    fn test_names_stay_on_one_line() {
        assert!(names("They reach the Old\nStone Bridge at noon.").is_empty());
        assert_eq!(
            names("At last they enter\nthe Stone Bridge."),
            vec!["Stone Bridge".to_string()]
        );
    }

    #[test]
    fn test_duplicates_collapse() {
        let found = names("Ravenwood, then Ravenwood again, then ravenwood.");
        assert_eq!(found, vec!["Ravenwood".to_string()]);
    }

    proptest! {
        #[test]
        fn extraction_is_idempotent(text in "\\PC{0,200}") {
            let extractor = LocationExtractor::new();
            prop_assert_eq!(extractor.extract(&text), extractor.extract(&text));
        }

        #[test]
        fn extraction_never_yields_blank_names(text in "[A-Za-z ,.']{0,120}") {
            for name in extract_locations(&text) {
                prop_assert!(!name.trim().is_empty());
                prop_assert_eq!(name.trim(), name.as_str());
            }
        }
    }
}
