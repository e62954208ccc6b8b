//! Reply Parsing Module
//!
//! Turns free-form oracle replies into structured data. Every reply is
//! untrusted: parsing attempts a strict shape check and on failure resolves
//! to a well-defined "unchanged" variant, so a malformed reply can never be
//! partially applied to the store.

use crate::models::{Confidence, PatternCategory, PatternRule};
use crate::oracle::client::OracleError;
use serde::Deserialize;
use std::collections::BTreeMap;

/// A test case as the oracle reports it, before normalization.
///
/// Everything beyond the identity fields is optional; missing fields are
/// filled with documented defaults by the manager.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTestCase {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub steps: Option<Vec<String>>,
    #[serde(default)]
    pub expected_result: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub changes: Option<String>,
}

/// Outcome of parsing a synchronization reply
#[derive(Debug)]
pub enum SyncReply {
    /// A well-formed list of case objects
    Cases(Vec<RawTestCase>),
    /// The reply was unusable; the caller re-emits the prior state
    Unchanged { reason: String },
}

/// Extract the JSON payload from a reply that may wrap it in prose or
/// markdown code fences
fn extract_json(reply: &str) -> &str {
    // Look for JSON in a ```json code block
    if let Some(start) = reply.find("```json") {
        let json_start = start + 7;
        if let Some(end) = reply[json_start..].find("```") {
            return reply[json_start..json_start + end].trim();
        }
    }

    // Look for a generic code block
    if let Some(start) = reply.find("```") {
        let code_start = start + 3;
        // Skip language identifier if present
        let json_start = if let Some(newline) = reply[code_start..].find('\n') {
            code_start + newline + 1
        } else {
            code_start
        };
        if let Some(end) = reply[json_start..].find("```") {
            return reply[json_start..json_start + end].trim();
        }
    }

    // Find a bare array or object, whichever starts first
    let array_start = reply.find('[');
    let object_start = reply.find('{');
    match (array_start, object_start) {
        (Some(a), o) if o.map_or(true, |o| a < o) => {
            if let Some(end) = reply.rfind(']') {
                if end > a {
                    return &reply[a..=end];
                }
            }
        }
        (_, Some(o)) => {
            if let Some(end) = reply.rfind('}') {
                if end > o {
                    return &reply[o..=end];
                }
            }
        }
        _ => {}
    }

    reply.trim()
}

/// Parse a synchronization reply into test cases, or the unchanged fallback.
///
/// A usable reply is a JSON array of objects where every element carries at
/// least an id or a title; anything else resolves to `Unchanged`.
pub fn parse_sync_reply(reply: &str) -> SyncReply {
    let json_str = extract_json(reply);

    let cases: Vec<RawTestCase> = match serde_json::from_str(json_str) {
        Ok(cases) => cases,
        Err(e) => {
            return SyncReply::Unchanged {
                reason: format!("not a well-formed case list: {}", e),
            }
        }
    };

    if cases.is_empty() {
        return SyncReply::Unchanged {
            reason: "empty case list".to_string(),
        };
    }

    let unidentifiable = cases.iter().any(|c| {
        c.id.as_deref().map_or(true, |s| s.trim().is_empty())
            && c.title.as_deref().map_or(true, |s| s.trim().is_empty())
    });
    if unidentifiable {
        return SyncReply::Unchanged {
            reason: "case without id or title".to_string(),
        };
    }

    SyncReply::Cases(cases)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPatternRule {
    name: String,
    #[serde(default)]
    match_tokens: Vec<String>,
    regex: String,
    #[serde(default)]
    confidence: Option<String>,
    #[serde(default)]
    context: String,
}

fn confidence_from_str(s: &str) -> Confidence {
    match s.to_lowercase().as_str() {
        "high" => Confidence::High,
        "low" => Confidence::Low,
        _ => Confidence::Medium,
    }
}

/// Parse a pattern-learning reply into rules per category.
///
/// Unknown category keys are ignored; rules within a known category must at
/// least carry a name and a regex string. Regex compilation is deferred to
/// match time, where an invalid rule is skipped rather than fatal.
pub fn parse_pattern_reply(
    reply: &str,
) -> Result<BTreeMap<PatternCategory, Vec<PatternRule>>, OracleError> {
    let json_str = extract_json(reply);

    let raw: BTreeMap<String, Vec<RawPatternRule>> =
        serde_json::from_str(json_str).map_err(|e| {
            // Char-based preview; a byte slice could split a multibyte char
            let preview: String = json_str.chars().take(200).collect();
            OracleError::InvalidReply(format!(
                "Failed to parse pattern reply: {}. JSON: {}",
                e, preview
            ))
        })?;

    let mut categories: BTreeMap<PatternCategory, Vec<PatternRule>> = BTreeMap::new();
    for (key, rules) in raw {
        // Category keys arrive in their JSON form, e.g. "domainRule"
        let Ok(category) =
            serde_json::from_value::<PatternCategory>(serde_json::Value::String(key.clone()))
        else {
            tracing::debug!(category = %key, "ignoring unknown pattern category");
            continue;
        };
        let converted: Vec<PatternRule> = rules
            .into_iter()
            .filter(|r| !r.name.trim().is_empty() && !r.regex.trim().is_empty())
            .map(|r| PatternRule {
                name: r.name,
                match_tokens: r.match_tokens,
                regex: r.regex,
                confidence: r
                    .confidence
                    .as_deref()
                    .map(confidence_from_str)
                    .unwrap_or(Confidence::Medium),
                context: r.context,
            })
            .collect();
        if !converted.is_empty() {
            categories.insert(category, converted);
        }
    }

    if categories.is_empty() {
        return Err(OracleError::InvalidReply(
            "pattern reply contained no usable rules".to_string(),
        ));
    }

    Ok(categories)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_from_markdown() {
        let reply = r#"Here is the updated suite:

```json
[{"id": "DASH-001", "title": "Recent trades visible"}]
```

Let me know if you need anything else."#;

        let json = extract_json(reply);
        assert!(json.starts_with('['));
        assert!(json.ends_with(']'));
    }

    #[test]
    fn test_extract_bare_array() {
        let reply = r#"Sure: [{"id": "DASH-001", "title": "T"}] done."#;
        let json = extract_json(reply);
        assert!(json.starts_with('['));
        assert!(json.ends_with(']'));
    }

    #[test]
    fn test_parse_sync_reply_well_formed() {
        let reply = r#"[
            {"id": "DASH-001", "title": "Recent trades visible", "status": "new",
             "steps": ["Navigate to dashboard", "Check trades list"],
             "expectedResult": "List is visible and populated"}
        ]"#;

        match parse_sync_reply(reply) {
            SyncReply::Cases(cases) => {
                assert_eq!(cases.len(), 1);
                assert_eq!(cases[0].id.as_deref(), Some("DASH-001"));
                assert_eq!(
                    cases[0].expected_result.as_deref(),
                    Some("List is visible and populated")
                );
            }
            SyncReply::Unchanged { reason } => panic!("unexpected fallback: {}", reason),
        }
    }

    #[test]
    fn test_parse_sync_reply_non_list_falls_back() {
        let reply = r#"{"id": "DASH-001", "title": "Not a list"}"#;
        assert!(matches!(
            parse_sync_reply(reply),
            SyncReply::Unchanged { .. }
        ));
    }

    #[test]
    fn test_parse_sync_reply_truncated_falls_back() {
        let reply = r#"[{"id": "DASH-001", "title": "Recent trades visi"#;
        assert!(matches!(
            parse_sync_reply(reply),
            SyncReply::Unchanged { .. }
        ));
    }

    #[test]
    fn test_parse_sync_reply_unidentifiable_case_falls_back() {
        let reply = r#"[{"description": "no id, no title"}]"#;
        assert!(matches!(
            parse_sync_reply(reply),
            SyncReply::Unchanged { .. }
        ));
    }

    #[test]
    fn test_parse_pattern_reply() {
        let reply = r#"```json
{
  "calculation": [
    {"name": "total-computation", "matchTokens": ["calc", "total"],
     "regex": "calc\\w*Total", "confidence": "high",
     "context": "Functions that compute order totals"}
  ],
  "validation": [
    {"name": "input-check", "regex": "validate\\w+"}
  ],
  "somethingElse": [
    {"name": "ignored", "regex": "x"}
  ]
}
```"#;

        let categories = parse_pattern_reply(reply).unwrap();
        assert_eq!(categories.len(), 2);
        let calc = &categories[&PatternCategory::Calculation];
        assert_eq!(calc[0].name, "total-computation");
        assert_eq!(calc[0].confidence, Confidence::High);
        let validation = &categories[&PatternCategory::Validation];
        assert_eq!(validation[0].confidence, Confidence::Medium);
    }

    #[test]
    fn test_parse_pattern_reply_garbage_is_error() {
        assert!(parse_pattern_reply("no json at all").is_err());
        assert!(parse_pattern_reply(r#"{"calculation": []}"#).is_err());
    }

    #[test]
    fn test_parse_pattern_reply_long_multibyte_garbage_is_error() {
        // An unparseable reply longer than the error preview, with a
        // one-byte lead so byte offset 200 falls inside a two-byte char
        let reply = format!("x{}", "é".repeat(300));
        assert!(parse_pattern_reply(&reply).is_err());
    }
}
