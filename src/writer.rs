// 💾 Artifact Writers - Move container, review list, learnset table
// Writers overwrite their target. Callers only reach them after every fatal
// check has passed, so a failed run never leaves a partial artifact.

use anyhow::{anyhow, Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use crate::aggregation::Learnsets;
use crate::generation::ReviewRecord;
use crate::normalize::KeyedEntry;
use crate::scanner::{self, Lexer, Token};

pub const MOVES_MARKER: &str = "const moves";
pub const LEARNSETS_MARKER: &str = "const learnsets";

/// Where an artifact came from, for its header comment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Provenance {
    pub source_name: String,
    pub source_digest: Option<String>,
}

impl Provenance {
    pub fn new(source_name: &str, source_digest: Option<String>) -> Self {
        Provenance {
            source_name: source_name.to_string(),
            source_digest,
        }
    }

    fn header(&self, count_line: String) -> String {
        let mut header = format!("// Auto-generated from {}\n// {}\n", self.source_name, count_line);
        if let Some(digest) = &self.source_digest {
            header.push_str(&format!("// source sha256: {}\n", digest));
        }
        header
    }
}

// ============================================================================
// MOVE CONTAINER (Output 1)
// ============================================================================

pub fn render_move_container(entries: &[KeyedEntry], provenance: &Provenance) -> String {
    let mut out = provenance.header(format!("{} moves generated", entries.len()));
    out.push_str("\nconst moves = {\n");
    for entry in entries {
        out.push_str(&format!("  {}: {},\n", entry.key, entry.value));
    }
    out.push_str("};\n\nmodule.exports = { moves };\n");
    out
}

/// Existing container entries in declaration order
pub fn parse_move_container(text: &str) -> Result<Vec<KeyedEntry>> {
    let blocks = scanner::top_level_blocks(text, MOVES_MARKER)?;
    Ok(blocks
        .into_iter()
        .map(|(key, value)| KeyedEntry { key, value })
        .collect())
}

pub fn write_move_container(path: &Path, entries: &[KeyedEntry], provenance: &Provenance) -> Result<()> {
    write_text(path, &render_move_container(entries, provenance))
}

// ============================================================================
// REVIEW LIST (Output 2)
// ============================================================================

/// Review list from a previous run; a missing file means an empty list
pub fn read_review_list(path: &Path) -> Result<Vec<ReviewRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse review list {}", path.display()))
}

pub fn write_review_list(path: &Path, records: &[ReviewRecord]) -> Result<()> {
    let json = serde_json::to_string_pretty(records).context("Failed to serialize review list")?;
    write_text(path, &json)
}

// ============================================================================
// LEARNSET TABLE (Output 3)
// ============================================================================

pub fn render_learnset_table(learnsets: &Learnsets, provenance: &Provenance) -> String {
    let mut out = provenance.header(format!("{} species", learnsets.len()));
    out.push_str("const learnsets = {\n");
    for (species_id, moves) in learnsets {
        let list: Vec<String> = moves.iter().map(|m| format!("\"{}\"", m)).collect();
        out.push_str(&format!("  {}: [{}],\n", species_id, list.join(", ")));
    }
    out.push_str("};\n\nmodule.exports = { learnsets };\n");
    out
}

pub fn write_learnset_table(path: &Path, learnsets: &Learnsets, provenance: &Provenance) -> Result<()> {
    write_text(path, &render_learnset_table(learnsets, provenance))
}

/// Read a `[ "a", "b" ]` list starting at `open`
fn parse_string_list(text: &str, open: usize) -> Result<BTreeSet<String>> {
    let mut items = BTreeSet::new();
    let mut chars = text[open + 1..].chars();

    while let Some(ch) = chars.next() {
        match ch {
            ']' => return Ok(items),
            '"' | '\'' => {
                let mut item = String::new();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    if c == '\\' {
                        if let Some(escaped) = chars.next() {
                            item.push(escaped);
                        }
                    } else if c == ch {
                        closed = true;
                        break;
                    } else {
                        item.push(c);
                    }
                }
                if !closed {
                    return Err(anyhow!("unterminated string in list at byte {}", open));
                }
                items.insert(item);
            }
            c if c == ',' || c.is_whitespace() => {}
            other => return Err(anyhow!("unexpected `{}` in list at byte {}", other, open)),
        }
    }
    Err(anyhow!("unterminated list at byte {}", open))
}

/// Re-parse a learnset table into species → move sets
pub fn parse_learnset_table(text: &str) -> Result<Learnsets> {
    let start = text
        .find(LEARNSETS_MARKER)
        .ok_or_else(|| anyhow!("could not locate `{}`", LEARNSETS_MARKER))?;
    let open = text[start..]
        .find('{')
        .map(|i| start + i)
        .ok_or_else(|| anyhow!("no opening brace after `{}`", LEARNSETS_MARKER))?;

    let mut learnsets = Learnsets::new();
    for token in Lexer::starting_at(text, open) {
        match token {
            Token::Key { start, end, depth: 1 } => {
                let list_open = text[end..]
                    .find('[')
                    .map(|i| end + i)
                    .ok_or_else(|| anyhow!("no list for `{}`", &text[start..end]))?;
                let moves = parse_string_list(text, list_open)?;
                learnsets.insert(text[start..end].to_string(), moves);
            }
            Token::Close { depth: 0, .. } => return Ok(learnsets),
            _ => {}
        }
    }
    Err(anyhow!("unbalanced learnset table"))
}

fn write_text(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::scan_container;

    fn entry(key: &str, name: &str) -> KeyedEntry {
        KeyedEntry {
            key: key.to_string(),
            value: format!(r#"{{ id: "{}", name: "{}", effects: [] }}"#, key, name),
        }
    }

    #[test]
    fn test_move_container_is_scannable() {
        let entries = vec![entry("tackle", "たいあたり"), entry("ember", "ひのこ")];
        let provenance = Provenance::new("move_data.csv", Some("abc123".to_string()));

        let text = render_move_container(&entries, &provenance);

        assert!(text.starts_with("// Auto-generated from move_data.csv\n// 2 moves generated\n"));
        assert!(text.contains("// source sha256: abc123"));
        assert!(text.trim_end().ends_with("module.exports = { moves };"));

        let index = scan_container(&text, MOVES_MARKER).unwrap();
        assert_eq!(index.keys, vec!["tackle", "ember"]);
        assert_eq!(index.names, vec!["たいあたり", "ひのこ"]);

        assert_eq!(parse_move_container(&text).unwrap(), entries);

        println!("✅ Move container render test passed");
    }

    #[test]
    fn test_learnset_table_reparses_to_same_sets() {
        let mut learnsets = Learnsets::new();
        learnsets.insert(
            "reosan".to_string(),
            ["surf", "flamethrower", "tackle"].iter().map(|s| s.to_string()).collect(),
        );
        learnsets.insert("haruta".to_string(), BTreeSet::new());
        learnsets.insert("aoi".to_string(), ["tackle".to_string()].into_iter().collect());

        let text = render_learnset_table(&learnsets, &Provenance::new("技制限.csv", None));

        assert!(text.contains(r#"  reosan: ["flamethrower", "surf", "tackle"],"#));
        assert!(text.contains("  haruta: [],"));
        assert!(text.trim_end().ends_with("module.exports = { learnsets };"));

        let reparsed = parse_learnset_table(&text).unwrap();
        assert_eq!(reparsed, learnsets);

        println!("✅ Learnset round-trip test passed");
    }

    #[test]
    fn test_parse_learnset_rejects_garbage() {
        assert!(parse_learnset_table("const moves = {};").is_err());
        assert!(parse_learnset_table("const learnsets = { a: [\"x\", oops] };").is_err());
    }

    #[test]
    fn test_write_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let review_path = dir.path().join("data/moves/manual_review.json");
        let records = vec![ReviewRecord {
            name: "へんしん".to_string(),
            reason: "generation_error".to_string(),
            effect: "相手に変身する".to_string(),
        }];

        write_review_list(&review_path, &records).unwrap();

        let written = fs::read_to_string(&review_path).unwrap();
        assert!(written.contains("へんしん"));
        let back: Vec<ReviewRecord> = serde_json::from_str(&written).unwrap();
        assert_eq!(back, records);

        assert_eq!(read_review_list(&review_path).unwrap(), records);
        assert!(read_review_list(&dir.path().join("absent.json")).unwrap().is_empty());
    }
}
