// 🧹 Output Normalization - Free-text generator output → one keyed entry
//
// Steps: strip code fences, look for an explicit manual flag, locate the
// first `<key>: { ... }` block, force the inner `id` to match the key.

use serde::{Deserialize, Serialize};

use crate::scanner::{find_matching_brace, string_value_after_colon, Lexer, Token};

// ============================================================================
// REVIEW REASONS
// ============================================================================

/// Why a record landed in the manual review list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewReason {
    EmptyOutput,
    FlaggedByModel,
    /// Model set `manual: true` and explained why
    Flagged(String),
    FormatMissingKey,
    FormatUnbalancedBrace,
    GenerationError,
    RateLimited,
}

impl ReviewReason {
    /// Reason string persisted in the review list
    pub fn as_str(&self) -> &str {
        match self {
            ReviewReason::EmptyOutput => "empty_output",
            ReviewReason::FlaggedByModel => "flagged_by_model",
            ReviewReason::Flagged(reason) => reason,
            ReviewReason::FormatMissingKey => "format_missing_key",
            ReviewReason::FormatUnbalancedBrace => "format_unbalanced_brace",
            ReviewReason::GenerationError => "generation_error",
            ReviewReason::RateLimited => "rate_limited",
        }
    }
}

impl std::fmt::Display for ReviewReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// NORMALIZED ENTRY
// ============================================================================

/// One keyed entry: `key: { ... }` with `value` the brace block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyedEntry {
    pub key: String,
    pub value: String,
}

/// Result of normalizing one generator response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    /// Extracted entry, if the text had the expected shape
    pub entry: Option<KeyedEntry>,

    /// Set when the record must go to manual review
    pub review: Option<ReviewReason>,
}

impl Normalized {
    pub fn needs_review(&self) -> bool {
        self.review.is_some()
    }
}

// ============================================================================
// STEPS
// ============================================================================

/// Content of the first fenced block, or the trimmed text if unfenced
pub fn strip_code_fence(text: &str) -> &str {
    let Some(open) = text.find("```") else {
        return text.trim();
    };
    let after = &text[open + 3..];
    // Language tag runs to the end of the opening fence line
    let body = match after.find('\n') {
        Some(nl) if after[..nl].chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') => {
            &after[nl + 1..]
        }
        _ => after,
    };
    let body = match body.find("```") {
        Some(close) => &body[..close],
        None => body,
    };
    body.trim()
}

/// Top-level-agnostic search for `key: <literal>` outside strings
fn find_field(text: &str, field: &str) -> Option<(usize, usize)> {
    Lexer::new(text).find_map(|token| match token {
        Token::Key { start, end, .. } if &text[start..end] == field => Some((start, end)),
        _ => None,
    })
}

/// `manual: true` anywhere in the text routes to review
pub fn detect_manual_flag(text: &str) -> Option<ReviewReason> {
    if text.trim().is_empty() {
        return Some(ReviewReason::EmptyOutput);
    }

    let (_, end) = find_field(text, "manual")?;
    let rest = text[end..].trim_start().strip_prefix(':')?.trim_start();
    let is_true = rest.strip_prefix("true").map_or(false, |tail| {
        !tail.starts_with(|c: char| c.is_alphanumeric() || c == '_')
    });
    if !is_true {
        return None;
    }

    let reason = find_field(text, "manualReason")
        .and_then(|(_, end)| string_value_after_colon(text, end))
        .filter(|r| !r.is_empty());
    Some(match reason {
        Some(reason) => ReviewReason::Flagged(reason),
        None => ReviewReason::FlaggedByModel,
    })
}

/// Remove one wrapping `{ ... }` when it spans the whole text
fn unwrap_outer_braces(raw: &str) -> &str {
    let trimmed = raw.trim();
    if !trimmed.starts_with('{') {
        return trimmed;
    }
    match find_matching_brace(trimmed, 0) {
        Some(end) if end == trimmed.len() - 1 => {
            let inner = trimmed[1..end].trim();
            // A bare object (`{ id: ..., name: ... }`) is not a wrapper
            if inner_starts_with_keyed_block(inner) {
                inner
            } else {
                trimmed
            }
        }
        _ => trimmed,
    }
}

fn inner_starts_with_keyed_block(text: &str) -> bool {
    match Lexer::new(text).next() {
        Some(Token::Key { end, depth: 0, .. }) => text[end..]
            .trim_start()
            .strip_prefix(':')
            .map_or(false, |rest| rest.trim_start().starts_with('{')),
        _ => false,
    }
}

fn is_entry_key(key: &str) -> bool {
    key.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Rewrite the first `id: "..."` inside `value` to `id: "<key>"`
pub fn align_inner_id(value: &str, key: &str) -> String {
    let id_field = Lexer::new(value).find_map(|token| match token {
        Token::Key { start, end, depth: 1 } if &value[start..end] == "id" => Some((start, end)),
        _ => None,
    });
    let Some((_, end)) = id_field else {
        return value.to_string();
    };
    if string_value_after_colon(value, end).as_deref() == Some(key) {
        return value.to_string();
    }

    // Locate the literal span: colon, optional space, quote ... quote
    let Some(colon) = value[end..].find(':').map(|i| end + i) else {
        return value.to_string();
    };
    let after_colon = &value[colon + 1..];
    let lit_start = colon + 1 + (after_colon.len() - after_colon.trim_start().len());
    let Some(quote) = value[lit_start..].chars().next().filter(|c| *c == '"' || *c == '\'')
    else {
        return value.to_string();
    };

    let mut lit_end = None;
    let mut escaped = false;
    for (i, ch) in value[lit_start + 1..].char_indices() {
        if escaped {
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == quote {
            lit_end = Some(lit_start + 1 + i + 1);
            break;
        }
    }
    let Some(lit_end) = lit_end else {
        return value.to_string();
    };

    format!("{}\"{}\"{}", &value[..lit_start], key, &value[lit_end..])
}

/// Extract the first `<key>: { ... }` entry and force its inner id to the key
pub fn normalize_entry(text: &str) -> Normalized {
    let raw = unwrap_outer_braces(strip_code_fence(text));

    let keyed = Lexer::new(raw).find_map(|token| match token {
        Token::Key { start, end, depth: 0 } if is_entry_key(&raw[start..end]) => {
            let after = raw[end..].trim_start().strip_prefix(':')?;
            let brace = end + (raw[end..].len() - after.len()) + (after.len() - after.trim_start().len());
            raw[brace..].starts_with('{').then(|| (raw[start..end].to_string(), brace))
        }
        _ => None,
    });

    let Some((key, brace)) = keyed else {
        return bare_object_entry(raw);
    };

    match find_matching_brace(raw, brace) {
        Some(close) => {
            let value = align_inner_id(raw[brace..=close].trim(), &key);
            Normalized {
                entry: Some(KeyedEntry { key, value }),
                review: None,
            }
        }
        None => Normalized {
            entry: None,
            review: Some(ReviewReason::FormatUnbalancedBrace),
        },
    }
}

/// `{ id: "x", ... }` with no key: the inner id becomes the key
fn bare_object_entry(raw: &str) -> Normalized {
    let missing = Normalized {
        entry: None,
        review: Some(ReviewReason::FormatMissingKey),
    };
    if !raw.starts_with('{') {
        return missing;
    }
    let Some(close) = find_matching_brace(raw, 0) else {
        return Normalized {
            entry: None,
            review: Some(ReviewReason::FormatUnbalancedBrace),
        };
    };
    let value = &raw[..=close];
    let id = Lexer::new(value).find_map(|token| match token {
        Token::Key { start, end, depth: 1 } if &value[start..end] == "id" => {
            string_value_after_colon(value, end)
        }
        _ => None,
    });
    match id {
        Some(key) if !key.is_empty() => Normalized {
            entry: Some(KeyedEntry {
                key,
                value: value.to_string(),
            }),
            review: None,
        },
        _ => missing,
    }
}

/// Add `"contact"` to the entry's own `tags` list, creating the list if absent
pub fn ensure_contact_tag(value: &str) -> String {
    let tags = Lexer::new(value).find_map(|token| match token {
        Token::Key { start, end, depth: 1 } if &value[start..end] == "tags" => Some(end),
        _ => None,
    });

    let Some(end) = tags else {
        let Some(body) = value.trim_end().strip_suffix('}') else {
            return value.to_string();
        };
        let body = body.trim_end();
        let sep = if body.ends_with(',') || body.ends_with('{') { " " } else { ", " };
        return format!("{}{}tags: [\"contact\"] }}", body, sep);
    };

    let Some(open) = value[end..].find('[').map(|i| end + i) else {
        return value.to_string();
    };
    let Some(close) = value[open..].find(']').map(|i| open + i) else {
        return value.to_string();
    };
    let items = value[open + 1..close].trim();
    if items.contains("\"contact\"") || items.contains("'contact'") {
        return value.to_string();
    }
    let list = if items.is_empty() {
        "\"contact\"".to_string()
    } else {
        format!("{}, \"contact\"", items.trim_end_matches(',').trim_end())
    };
    format!("{}[{}]{}", &value[..open], list, &value[close + 1..])
}

/// Full classification: a manual flag wins even when extraction succeeds
pub fn classify(text: &str) -> Normalized {
    let flag = detect_manual_flag(text);
    let mut normalized = normalize_entry(text);
    if let Some(reason) = flag {
        normalized.review = Some(reason);
    }
    normalized
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fence_variants() {
        assert_eq!(strip_code_fence("```javascript\nember: {}\n```"), "ember: {}");
        assert_eq!(strip_code_fence("```\nember: {}\n```\ntrailing"), "ember: {}");
        assert_eq!(strip_code_fence("  ember: {}  "), "ember: {}");
        assert_eq!(strip_code_fence("here:\n```js\nember: {}\n```"), "ember: {}");
    }

    #[test]
    fn test_normalize_keyed_entry() {
        let text = r#"```javascript
flamethrower: { id: "flamethrower", name: "かえんほうしゃ", type: "fire", effects: [{ type: "damage", power: 90 }] }
```"#;

        let normalized = normalize_entry(text);
        let entry = normalized.entry.unwrap();

        assert!(normalized.review.is_none());
        assert_eq!(entry.key, "flamethrower");
        assert!(entry.value.starts_with('{'));
        assert!(entry.value.ends_with('}'));
        assert!(entry.value.contains("power: 90"));

        println!("✅ Keyed entry test passed: {}", entry.key);
    }

    #[test]
    fn test_inner_id_is_rewritten_to_key() {
        let text = r#"bullet_seed: { id: "seed_gun", name: "タネマシンガン", effects: [{ type: "repeat", id: "inner" }] }"#;

        let entry = normalize_entry(text).entry.unwrap();

        assert_eq!(entry.key, "bullet_seed");
        assert!(entry.value.starts_with(r#"{ id: "bullet_seed", name"#));
        // Nested ids are not touched
        assert!(entry.value.contains(r#"id: "inner""#));
    }

    #[test]
    fn test_wrapped_entry_is_unwrapped() {
        let text = r#"{ surf: { id: "surf", name: "なみのり" } }"#;
        let entry = normalize_entry(text).entry.unwrap();

        assert_eq!(entry.key, "surf");
        assert_eq!(entry.value, r#"{ id: "surf", name: "なみのり" }"#);
    }

    #[test]
    fn test_bare_object_uses_inner_id() {
        let text = r#"{ id: "protect", name: "まもる", effects: [{ type: "protect" }] }"#;
        let entry = normalize_entry(text).entry.unwrap();

        assert_eq!(entry.key, "protect");
        assert_eq!(entry.value, text);
    }

    #[test]
    fn test_format_failures() {
        let missing = normalize_entry("この技はDSLで表現できません");
        assert_eq!(missing.review, Some(ReviewReason::FormatMissingKey));

        let unbalanced = normalize_entry(r#"ember: { id: "ember", effects: [ { type: "damage" ]"#);
        assert_eq!(unbalanced.review, Some(ReviewReason::FormatUnbalancedBrace));
        assert!(unbalanced.entry.is_none());
    }

    #[test]
    fn test_manual_flag_overrides_successful_extraction() {
        let text = r#"transform: { id: "transform", name: "へんしん", manual: true, manualReason: "copies target", effects: [] }"#;

        let normalized = classify(text);

        assert!(normalized.entry.is_some());
        assert_eq!(normalized.review, Some(ReviewReason::Flagged("copies target".to_string())));
        assert_eq!(normalized.review.unwrap().as_str(), "copies target");
    }

    #[test]
    fn test_contact_tag_is_added_once() {
        assert_eq!(
            ensure_contact_tag(r#"{ id: "tackle", effects: [] }"#),
            r#"{ id: "tackle", effects: [], tags: ["contact"] }"#
        );
        assert_eq!(
            ensure_contact_tag(r#"{ id: "tackle", tags: ["punch"], effects: [] }"#),
            r#"{ id: "tackle", tags: ["punch", "contact"], effects: [] }"#
        );
        assert_eq!(
            ensure_contact_tag(r#"{ id: "tackle", tags: [], effects: [] }"#),
            r#"{ id: "tackle", tags: ["contact"], effects: [] }"#
        );

        let tagged = r#"{ id: "tackle", tags: ["contact"] }"#;
        assert_eq!(ensure_contact_tag(tagged), tagged);

        // A nested `tags` field belongs to an effect, not the entry
        let nested = ensure_contact_tag(r#"{ id: "x", effects: [{ type: "log", tags: [] }] }"#);
        assert!(nested.ends_with(r#"tags: ["contact"] }"#));
        assert!(nested.contains(r#"type: "log", tags: [] }"#));
    }

    #[test]
    fn test_manual_flag_variants() {
        assert_eq!(detect_manual_flag("   "), Some(ReviewReason::EmptyOutput));
        assert_eq!(
            detect_manual_flag("x: { manual: true }"),
            Some(ReviewReason::FlaggedByModel)
        );
        assert_eq!(detect_manual_flag("x: { manual: false }"), None);
        assert_eq!(detect_manual_flag("x: { manual: trueish }"), None);
        assert_eq!(detect_manual_flag(r#"x: { note: "manual: true" }"#), None);
    }
}
