// 🔎 Structural Scanner - Keys and names of a keyed-object literal
// Recognizes only what alignment needs: top-level `<ident>:` keys, `name:`
// string values, and where a `{` block closes. Not a parser for the host syntax.
//
// One state machine drives both the whole-container scan and the
// single-entry brace match used by the generation pipeline.

use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("could not locate container marker `{0}`")]
    MarkerNotFound(String),

    #[error("no opening brace after container marker `{0}`")]
    MissingOpenBrace(String),

    #[error("unbalanced braces: block opened at byte {0} never closes")]
    Unbalanced(usize),

    #[error("failed to align keys and names: {keys} keys vs {names} declared names")]
    CountMismatch { keys: usize, names: usize },
}

// ============================================================================
// LEXER STATE MACHINE
// ============================================================================

/// Lexer state: outside or inside a string literal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexState {
    Normal,
    InString(char),
}

/// Structural token reported by [`Lexer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// `{` at `offset`; `depth` is the depth after entering
    Open { offset: usize, depth: i32 },

    /// `}` at `offset`; `depth` is the depth after leaving
    Close { offset: usize, depth: i32 },

    /// Identifier followed by `:` (after optional whitespace), outside strings
    Key { start: usize, end: usize, depth: i32 },
}

/// Two states {normal, in-string} plus one brace-depth counter.
///
/// Yields byte offsets only; callers decide what to extract.
pub struct Lexer<'a> {
    text: &'a str,
    pos: usize,
    depth: i32,
    state: LexState,
}

impl<'a> Lexer<'a> {
    pub fn new(text: &'a str) -> Self {
        Self::starting_at(text, 0)
    }

    /// Start scanning at byte offset `pos` (must be a char boundary)
    pub fn starting_at(text: &'a str, pos: usize) -> Self {
        Lexer {
            text,
            pos,
            depth: 0,
            state: LexState::Normal,
        }
    }

    pub fn depth(&self) -> i32 {
        self.depth
    }

    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    /// Skip an identifier starting at `self.pos`, return its end offset
    fn identifier_end(&self) -> usize {
        let mut end = self.pos;
        for ch in self.text[self.pos..].chars() {
            if ch.is_alphanumeric() || ch == '_' {
                end += ch.len_utf8();
            } else {
                break;
            }
        }
        end
    }

    fn colon_follows(&self, from: usize) -> bool {
        self.text[from..]
            .chars()
            .find(|c| !c.is_whitespace())
            .map_or(false, |c| c == ':')
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        while let Some(ch) = self.peek() {
            let offset = self.pos;
            match self.state {
                LexState::InString(quote) => {
                    self.pos += ch.len_utf8();
                    if ch == '\\' {
                        // Escaped char is consumed without a state change
                        if let Some(next) = self.peek() {
                            self.pos += next.len_utf8();
                        }
                    } else if ch == quote {
                        self.state = LexState::Normal;
                    }
                }
                LexState::Normal => match ch {
                    '"' | '\'' | '`' => {
                        self.state = LexState::InString(ch);
                        self.pos += 1;
                    }
                    '{' => {
                        self.depth += 1;
                        self.pos += 1;
                        return Some(Token::Open { offset, depth: self.depth });
                    }
                    '}' => {
                        self.depth -= 1;
                        self.pos += 1;
                        return Some(Token::Close { offset, depth: self.depth });
                    }
                    c if c.is_alphabetic() || c == '_' => {
                        let end = self.identifier_end();
                        self.pos = end;
                        if self.colon_follows(end) {
                            return Some(Token::Key { start: offset, end, depth: self.depth });
                        }
                    }
                    c if c.is_alphanumeric() => {
                        // Digits cannot start a key; swallow the whole run
                        self.pos = self.identifier_end();
                    }
                    _ => self.pos += ch.len_utf8(),
                },
            }
        }
        None
    }
}

// ============================================================================
// PUBLIC OPERATIONS
// ============================================================================

/// Ordered keys and declared names of a container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerIndex {
    pub keys: Vec<String>,
    pub names: Vec<String>,
}

impl ContainerIndex {
    /// Pairs `(key, name)` in declaration order
    pub fn entries(&self) -> Vec<(String, String)> {
        self.keys
            .iter()
            .cloned()
            .zip(self.names.iter().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Offset of the `}` that closes the `{` at `open`
pub fn find_matching_brace(text: &str, open: usize) -> Option<usize> {
    if text[open..].chars().next() != Some('{') {
        return None;
    }
    for token in Lexer::starting_at(text, open) {
        if let Token::Close { offset, depth: 0 } = token {
            return Some(offset);
        }
    }
    None
}

/// Top-level keys of the block that follows `marker` (e.g. `const moves`)
pub fn top_level_keys(text: &str, marker: &str) -> Result<Vec<String>, ScanError> {
    let start = text
        .find(marker)
        .ok_or_else(|| ScanError::MarkerNotFound(marker.to_string()))?;
    let open = text[start..]
        .find('{')
        .map(|i| start + i)
        .ok_or_else(|| ScanError::MissingOpenBrace(marker.to_string()))?;

    let mut keys = Vec::new();
    let mut closed = false;
    for token in Lexer::starting_at(text, open) {
        match token {
            Token::Key { start, end, depth: 1 } => keys.push(text[start..end].to_string()),
            Token::Close { depth: 0, .. } => {
                closed = true;
                break;
            }
            _ => {}
        }
    }

    if !closed {
        return Err(ScanError::Unbalanced(open));
    }
    Ok(keys)
}

/// Top-level `(key, "{...}")` pairs of the container; non-block values are skipped
pub fn top_level_blocks(text: &str, marker: &str) -> Result<Vec<(String, String)>, ScanError> {
    let start = text
        .find(marker)
        .ok_or_else(|| ScanError::MarkerNotFound(marker.to_string()))?;
    let open = text[start..]
        .find('{')
        .map(|i| start + i)
        .ok_or_else(|| ScanError::MissingOpenBrace(marker.to_string()))?;
    let close = find_matching_brace(text, open).ok_or(ScanError::Unbalanced(open))?;

    let mut blocks = Vec::new();
    for token in Lexer::starting_at(&text[..close], open) {
        let Token::Key { start, end, depth: 1 } = token else {
            continue;
        };
        let after = text[end..].trim_start();
        let Some(value) = after.strip_prefix(':').map(str::trim_start) else {
            continue;
        };
        if !value.starts_with('{') {
            continue;
        }
        let brace = text.len() - value.len();
        let block_end = find_matching_brace(text, brace).ok_or(ScanError::Unbalanced(brace))?;
        blocks.push((text[start..end].to_string(), text[brace..=block_end].to_string()));
    }
    Ok(blocks)
}

/// Every `name: "..."` string value in the text, in order of appearance
pub fn declared_names(text: &str) -> Vec<String> {
    let mut names = Vec::new();
    for token in Lexer::new(text) {
        let Token::Key { start, end, .. } = token else {
            continue;
        };
        if &text[start..end] != "name" {
            continue;
        }
        if let Some(value) = string_value_after_colon(text, end) {
            names.push(value);
        }
    }
    names
}

/// Read the quoted string literal right after `<key>:` ending at `key_end`
pub fn string_value_after_colon(text: &str, key_end: usize) -> Option<String> {
    let rest = text[key_end..].trim_start();
    let rest = rest.strip_prefix(':')?.trim_start();
    let mut chars = rest.chars();
    let quote = chars.next().filter(|c| *c == '"' || *c == '\'')?;

    let mut value = String::new();
    let mut escaped = false;
    for ch in chars {
        if escaped {
            value.push(ch);
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == quote {
            return Some(value);
        } else {
            value.push(ch);
        }
    }
    None
}

/// String values of `field:` keys at exactly `depth`, in order
///
/// Depth counts from the start of `text`; inside a `{ ... }` entry value its own
/// fields sit at depth 1.
pub fn field_values(text: &str, field: &str, depth: i32) -> Vec<String> {
    Lexer::new(text)
        .filter_map(|token| match token {
            Token::Key { start, end, depth: d } if d == depth && &text[start..end] == field => {
                string_value_after_colon(text, end)
            }
            _ => None,
        })
        .collect()
}

/// Declared `name` of a single `{ ... }` entry value
pub fn entry_name(value: &str) -> Option<String> {
    field_values(value, "name", 1).into_iter().next()
}

/// Keys and names of a container; fails unless both sequences have equal length
///
/// Names are collected across the whole text, independently of the key walk.
pub fn scan_container(text: &str, marker: &str) -> Result<ContainerIndex, ScanError> {
    let keys = top_level_keys(text, marker)?;
    let names = declared_names(text);

    if keys.len() != names.len() {
        return Err(ScanError::CountMismatch {
            keys: keys.len(),
            names: names.len(),
        });
    }

    Ok(ContainerIndex { keys, names })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const CONTAINER: &str = r#"// Auto-generated
const moves = {
  tackle: { id: "tackle", name: "たいあたり", effects: [{ type: "damage", power: 40 }] },
  ember: {
    id: "ember",
    name: "ひのこ",
    effects: [{ type: "chance", p: 0.1, then: [{ type: "apply_status", statusId: "burn" }] }],
  },
  protect: { id: "protect", name: "まもる", note: "blocks {every} move: yes", effects: [{ type: "protect" }] },
};

module.exports = { moves };
"#;

    #[test]
    fn test_scan_container_keys_and_names() {
        let index = scan_container(CONTAINER, "const moves").unwrap();

        assert_eq!(index.keys, vec!["tackle", "ember", "protect"]);
        assert_eq!(index.names, vec!["たいあたり", "ひのこ", "まもる"]);
        assert_eq!(index.len(), 3);

        println!("✅ Container scan test passed: {:?}", index.entries());
    }

    #[test]
    fn test_nested_keys_are_not_top_level() {
        let keys = top_level_keys(CONTAINER, "const moves").unwrap();

        assert!(!keys.contains(&"id".to_string()));
        assert!(!keys.contains(&"type".to_string()));
        assert!(!keys.contains(&"statusId".to_string()));
    }

    #[test]
    fn test_braces_inside_strings_are_ignored() {
        let text = r#"const moves = { a: { id: "a", name: "}{\"}" }, b: { id: "b", name: 'x' } };"#;
        let index = scan_container(text, "const moves").unwrap();

        assert_eq!(index.keys, vec!["a", "b"]);
        assert_eq!(index.names, vec!["}{\"}", "x"]);
    }

    #[test]
    fn test_missing_marker_is_fatal() {
        let err = scan_container("const learnsets = {};", "const moves").unwrap_err();
        assert_eq!(err, ScanError::MarkerNotFound("const moves".to_string()));
    }

    #[test]
    fn test_unbalanced_container_is_fatal() {
        let err = top_level_keys("const moves = { a: { name: \"x\" }", "const moves").unwrap_err();
        assert!(matches!(err, ScanError::Unbalanced(_)));
    }

    #[test]
    fn test_key_name_count_mismatch_is_fatal() {
        let text = r#"const moves = { a: { id: "a", name: "x" }, b: { id: "b" } };"#;
        let err = scan_container(text, "const moves").unwrap_err();

        assert_eq!(err, ScanError::CountMismatch { keys: 2, names: 1 });
    }

    #[test]
    fn test_find_matching_brace() {
        let text = r#"x: { a: { b: "}" }, c: 1 } tail"#;
        let open = text.find('{').unwrap();
        let close = find_matching_brace(text, open).unwrap();

        assert_eq!(&text[close..], "} tail");
        assert_eq!(find_matching_brace("x: { a: 1", 3), None);
        assert_eq!(find_matching_brace("abc", 0), None);
    }

    #[test]
    fn test_top_level_blocks() {
        let blocks = top_level_blocks(CONTAINER, "const moves").unwrap();

        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].0, "tackle");
        assert!(blocks[0].1.starts_with("{ id: \"tackle\""));
        assert!(blocks[1].1.ends_with("}"));
        assert!(blocks[2].1.contains("blocks {every} move: yes"));
    }

    #[test]
    fn test_names_before_marker_are_counted() {
        // A stray declaration outside the container breaks the key/name pairing
        let text = r#"const meta = { name: "header" };
const moves = { a: { id: "a", name: "x" } };"#;

        let err = scan_container(text, "const moves").unwrap_err();
        assert_eq!(err, ScanError::CountMismatch { keys: 1, names: 2 });
    }

    #[test]
    fn test_entry_name_ignores_nested_fields() {
        let value = r#"{ id: "ember", effects: [{ type: "apply_status", name: "burn" }], name: "ひのこ" }"#;

        assert_eq!(entry_name(value), Some("ひのこ".to_string()));
        assert_eq!(field_values(value, "type", 2), vec!["apply_status"]);
        assert_eq!(entry_name("{ id: \"x\" }"), None);
    }

    #[test]
    fn test_declared_names_in_order() {
        let text = r#"{ name: "one", inner: { name: 'two' }, nickname: "no", name : "three" }"#;
        assert_eq!(declared_names(text), vec!["one", "two", "three"]);
    }
}
