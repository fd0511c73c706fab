// 📂 Source Readers - Spreadsheet exports and the species roster
// Row order is the only correlation key, so readers never sort or dedupe.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::Path;

use crate::alignment::NameIdentifierMap;

// ============================================================================
// MOVE SOURCE (Input B)
// ============================================================================

/// One row of the move spreadsheet, in its native vocabulary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    #[serde(rename = "わざ")]
    pub name: String,

    #[serde(rename = "タイプ", default)]
    pub move_type: String,

    #[serde(rename = "いりょく", default)]
    pub power: String,

    #[serde(rename = "めいちゅう", default)]
    pub accuracy: String,

    #[serde(rename = "PP", default)]
    pub pp: String,

    #[serde(rename = "ぶんるい", default)]
    pub category: String,

    #[serde(rename = "接触/非接触", default)]
    pub contact: String,

    /// Free-text effect description
    #[serde(rename = "効果", default)]
    pub effect: String,
}

impl MoveRecord {
    pub fn new(name: &str, effect: &str) -> Self {
        MoveRecord {
            name: name.to_string(),
            effect: effect.to_string(),
            ..Default::default()
        }
    }

    /// Trimmed display name
    pub fn display_name(&self) -> &str {
        self.name.trim()
    }

    /// Contact column says 接触 (as opposed to 非接触)
    pub fn is_contact(&self) -> bool {
        self.contact.trim() == "接触"
    }
}

// ============================================================================
// LEARNSET SOURCE (Input A)
// ============================================================================

/// One distribution row: a move and who receives it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionRecord {
    #[serde(rename = "わざ")]
    pub move_name: String,

    /// Recipients separated by `、`, possibly `全員`
    #[serde(rename = "配布対象", default)]
    pub recipients: String,
}

impl DistributionRecord {
    pub fn new(move_name: &str, recipients: &str) -> Self {
        DistributionRecord {
            move_name: move_name.to_string(),
            recipients: recipients.to_string(),
        }
    }
}

// ============================================================================
// SPECIES ROSTER (Input D)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub name: String,
}

// ============================================================================
// LOADERS
// ============================================================================

fn read_rows<T, R>(reader: R) -> Result<Vec<T>>
where
    T: for<'de> Deserialize<'de>,
    R: Read,
{
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let mut rows = Vec::new();
    for (line, result) in rdr.deserialize().enumerate() {
        let row: T = result.with_context(|| format!("Failed to deserialize row {}", line + 1))?;
        rows.push(row);
    }
    Ok(rows)
}

/// Move rows from any CSV reader, in row order
pub fn read_move_records<R: Read>(reader: R) -> Result<Vec<MoveRecord>> {
    read_rows(reader)
}

/// Distribution rows from any CSV reader, in row order
pub fn read_distribution_records<R: Read>(reader: R) -> Result<Vec<DistributionRecord>> {
    read_rows(reader)
}

pub fn load_move_records(csv_path: &Path) -> Result<Vec<MoveRecord>> {
    let file = fs::File::open(csv_path)
        .with_context(|| format!("Missing move data: {}", csv_path.display()))?;
    read_move_records(file)
}

pub fn load_distribution_records(csv_path: &Path) -> Result<Vec<DistributionRecord>> {
    let file = fs::File::open(csv_path)
        .with_context(|| format!("Missing CSV: {}", csv_path.display()))?;
    read_distribution_records(file)
}

/// Roster JSON (`[{ "id": ..., "name": ... }]`) as a name → id map
///
/// Entries with a blank name or id are ignored.
pub fn parse_roster(json: &str) -> Result<NameIdentifierMap> {
    let entries: Vec<RosterEntry> =
        serde_json::from_str(json).context("Failed to parse species roster")?;
    Ok(entries.into_iter().map(|e| (e.name, e.id)).collect())
}

pub fn load_roster(path: &Path) -> Result<NameIdentifierMap> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Missing species roster: {}", path.display()))?;
    parse_roster(&json)
}

/// SHA-256 of a source file, lowercase hex
pub fn file_digest(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(digest_bytes(&bytes))
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_move_records_keeps_row_order() {
        let csv = "わざ,タイプ,いりょく,めいちゅう,PP,ぶんるい,接触/非接触,効果\n\
                   たいあたり,ノーマル,40,100,35,物理,接触,通常攻撃。\n\
                   ひのこ,ほのお,40,100,25,特殊,非接触,10%の確率でやけど。\n";

        let rows = read_move_records(csv.as_bytes()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "たいあたり");
        assert_eq!(rows[1].move_type, "ほのお");
        assert_eq!(rows[1].effect, "10%の確率でやけど。");
        assert!(rows[0].is_contact());
        assert!(!rows[1].is_contact());

        println!("✅ Move CSV test passed: {} rows", rows.len());
    }

    #[test]
    fn test_read_distribution_records_with_multiline_cell() {
        let csv = "わざ,配布対象\nかえんほうしゃ,\"れお、\n全員\"\n";

        let rows = read_distribution_records(csv.as_bytes()).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].move_name, "かえんほうしゃ");
        assert_eq!(rows[0].recipients, "れお、\n全員");
    }

    #[test]
    fn test_parse_roster_ignores_blank_entries() {
        let json = r#"[
            { "id": "reosan", "name": "レオ" },
            { "id": "haruta", "name": "" },
            { "id": "", "name": "だれか" }
        ]"#;

        let roster = parse_roster(json).unwrap();

        assert_eq!(roster.len(), 1);
        assert_eq!(roster.get("レオ"), Some("reosan"));
    }

    #[test]
    fn test_digest_is_stable() {
        assert_eq!(
            digest_bytes(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
