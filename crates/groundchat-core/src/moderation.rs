//! Keyword-based moderation filter.
//!
//! Flags text containing any disallowed term as a whole word, ignoring case.
//! Input is lowercased before matching; patterns match lowercase text only,
//! so no Unicode case folding applies.
//! Purely syntactic: obfuscated spellings pass through. It keeps obviously
//! abusive input away from retrieval and generation and nothing more.

use regex::Regex;

use crate::error::{RagError, Result};

/// Built-in pattern groups.
pub const DEFAULT_PATTERNS: [&str; 2] = [
    r"\b(fuck|shit|damn|asshole|bitch|bastard)\b",
    r"\b(hell|crap|piss)\b",
];

/// Compiled set of disallowed-term patterns.
#[derive(Debug, Clone)]
pub struct ModerationFilter {
    patterns: Vec<Regex>,
}

impl Default for ModerationFilter {
    fn default() -> Self {
        Self::with_extra_terms(&[]).expect("built-in moderation patterns compile")
    }
}

impl ModerationFilter {
    /// Built-in groups plus one extra group made of `extra_terms`.
    ///
    /// Extra terms are matched literally (regex metacharacters are escaped).
    pub fn with_extra_terms(extra_terms: &[String]) -> Result<Self> {
        let mut sources: Vec<String> = DEFAULT_PATTERNS.iter().map(|p| p.to_string()).collect();

        let escaped: Vec<String> = extra_terms
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .map(|t| regex::escape(&t))
            .collect();
        if !escaped.is_empty() {
            sources.push(format!(r"\b({})\b", escaped.join("|")));
        }

        let patterns = sources
            .iter()
            .map(|src| {
                Regex::new(src)
                    .map_err(|e| RagError::Config(format!("invalid moderation pattern: {}", e)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { patterns })
    }

    /// Returns `true` when `text` contains a disallowed term.
    pub fn is_disallowed(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.patterns.iter().any(|p| p.is_match(&text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_listed_terms_any_case() {
        let filter = ModerationFilter::default();
        assert!(filter.is_disallowed("damn"));
        assert!(filter.is_disallowed("This is shit, fix it"));
        assert!(filter.is_disallowed("What the HELL is this?"));
        assert!(filter.is_disallowed("Crap."));
    }

    #[test]
    fn test_respects_word_boundaries() {
        let filter = ModerationFilter::default();
        assert!(!filter.is_disallowed("Say hello to the shell"));
        assert!(!filter.is_disallowed("Scrappy classes in Damnation Alley? no: damnation"));
        assert!(!filter.is_disallowed("What is the refund policy?"));
    }

    #[test]
    fn test_extra_terms_are_literal() {
        let filter =
            ModerationFilter::with_extra_terms(&["heck".to_string(), "a.b".to_string()]).unwrap();
        assert!(filter.is_disallowed("oh HECK"));
        assert!(filter.is_disallowed("a.b"));
        assert!(!filter.is_disallowed("axb"));
    }

    #[test]
    fn test_no_case_folding_beyond_lowercase() {
        let filter = ModerationFilter::default();
        assert!(filter.is_disallowed("SHIT"));
        assert!(!filter.is_disallowed("\u{17f}hit"));
        assert!(!filter.is_disallowed("\u{17f}HIT"));
    }

    #[test]
    fn test_blank_extra_terms_ignored() {
        let filter = ModerationFilter::with_extra_terms(&["  ".to_string()]).unwrap();
        assert!(!filter.is_disallowed("anything at all"));
    }
}
