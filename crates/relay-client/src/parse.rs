//! Parsing of model output
//!
//! Models asked for JSON often wrap it in Markdown fences, and dual notes come
//! back in a small marker format. Both are handled here so callers only see
//! typed values or a [`ParseError`].

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::warn;

const PREMIUM_MARKER: &str = "<<<PREMIUM>>>";
const SUMMARY_MARKER: &str = "<<<SUMMARY>>>";

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Malformed structured output: {source} (near: {snippet})")]
    Json {
        #[source]
        source: serde_json::Error,
        snippet: String,
    },
}

/// Strip Markdown code fences (```json and ```) and surrounding whitespace
pub fn clean_json(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_string()
}

/// Parse model output as JSON after fence cleanup. Empty output parses as
/// an empty array, as models commonly return nothing for "no items".
pub fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, ParseError> {
    let cleaned = clean_json(text);
    let input = if cleaned.is_empty() { "[]" } else { cleaned.as_str() };
    serde_json::from_str(input).map_err(|source| ParseError::Json {
        source,
        snippet: input.chars().take(80).collect(),
    })
}

/// [`parse_json`], falling back to `default` on malformed output
pub fn parse_json_or<T: DeserializeOwned>(text: &str, default: T) -> T {
    match parse_json(text) {
        Ok(value) => value,
        Err(e) => {
            warn!("Using default after parse failure: {}", e);
            default
        }
    }
}

/// The two sections of a dual generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DualSections {
    pub primary: String,
    pub summary: Option<String>,
}

/// Split `<<<PREMIUM>>> primary <<<SUMMARY>>> summary`.
///
/// Without the premium marker the whole text is the primary section. An empty
/// summary section counts as absent.
pub fn split_dual_sections(text: &str) -> DualSections {
    let Some((_, rest)) = text.split_once(PREMIUM_MARKER) else {
        return DualSections {
            primary: text.to_string(),
            summary: None,
        };
    };

    match rest.split_once(SUMMARY_MARKER) {
        Some((primary, summary)) => {
            let summary = summary.trim();
            DualSections {
                primary: primary.trim().to_string(),
                summary: (!summary.is_empty()).then(|| summary.to_string()),
            }
        }
        None => DualSections {
            primary: rest.trim().to_string(),
            summary: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        title: String,
    }

    #[test]
    fn test_clean_json_strips_fences() {
        assert_eq!(clean_json("```json\n[1, 2]\n```"), "[1, 2]");
        assert_eq!(clean_json("  ```\n{}\n```  "), "{}");
        assert_eq!(clean_json("[3]"), "[3]");
    }

    #[test]
    fn test_parse_json_typed() {
        let items: Vec<Item> = parse_json("```json\n[{\"title\": \"Optics\"}]\n```").unwrap();
        assert_eq!(items, vec![Item { title: "Optics".into() }]);

        let empty: Vec<Item> = parse_json("  ").unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_parse_json_error_has_snippet() {
        let err = parse_json::<Vec<Item>>("Sure! Here are your chapters").unwrap_err();
        assert!(err.to_string().contains("Sure! Here are"));
    }

    #[test]
    fn test_parse_json_or_default() {
        let items: Vec<Item> = parse_json_or("not json", vec![Item { title: "fallback".into() }]);
        assert_eq!(items[0].title, "fallback");
    }

    #[test]
    fn test_split_dual_sections() {
        let s = split_dual_sections("intro <<<PREMIUM>>>\n Deep notes \n<<<SUMMARY>>> Short ");
        assert_eq!(s.primary, "Deep notes");
        assert_eq!(s.summary.as_deref(), Some("Short"));
    }

    #[test]
    fn test_split_without_markers_keeps_whole_text() {
        let s = split_dual_sections("just notes");
        assert_eq!(s.primary, "just notes");
        assert!(s.summary.is_none());

        let s = split_dual_sections("<<<PREMIUM>>> only premium");
        assert_eq!(s.primary, "only premium");
        assert!(s.summary.is_none());

        let s = split_dual_sections("<<<PREMIUM>>> p <<<SUMMARY>>>   ");
        assert!(s.summary.is_none());
    }
}
