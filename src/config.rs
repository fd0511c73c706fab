// 🔧 Configuration - Maintainer override tables
//
// overrides.toml:
//   [moves]       name -> identifier forced when alignment is ambiguous
//   [species]     name -> identifier merged over the roster (aliases, blanks)
//   [duplicates]  name -> how many move-container declarations are real
//
// Values are passed explicitly into the engines; nothing reads them globally.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use crate::alignment::{AlignmentConfig, NameIdentifierMap};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Read {path} failed: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse {path} failed: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overrides {
    #[serde(default)]
    pub moves: HashMap<String, String>,

    #[serde(default)]
    pub species: HashMap<String, String>,

    #[serde(default)]
    pub duplicates: HashMap<String, usize>,
}

impl Overrides {
    pub fn from_toml_str(content: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })
    }

    /// Missing file means no overrides
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "No override file, using empty tables");
            return Ok(Overrides::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    /// Configuration for aligning the move container with the move sheet
    pub fn move_alignment(&self) -> AlignmentConfig {
        AlignmentConfig::new(self.duplicates.clone(), self.moves.clone())
    }

    /// Roster with species overrides applied on top
    pub fn apply_species(&self, roster: &NameIdentifierMap) -> NameIdentifierMap {
        let mut merged = roster.clone();
        merged.extend(self.species.iter().map(|(n, id)| (n.clone(), id.clone())));
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_overrides() {
        let content = r#"
[moves]
"タネマシンガン" = "bullet_seed"

[species]
"はるた" = "haruta"
"れお" = "reosan"

[duplicates]
"タネマシンガン" = 1
"#;

        let overrides = Overrides::from_toml_str(content, "overrides.toml").unwrap();

        assert_eq!(overrides.moves["タネマシンガン"], "bullet_seed");
        assert_eq!(overrides.species.len(), 2);

        let alignment = overrides.move_alignment();
        assert_eq!(alignment.duplicate_allowance["タネマシンガン"], 1);
        assert_eq!(alignment.overrides["タネマシンガン"], "bullet_seed");
    }

    #[test]
    fn test_species_overrides_merge_over_roster() {
        let roster: NameIdentifierMap = [("レオ", "reosan"), ("アオイ", "aoi")].into_iter().collect();
        let overrides = Overrides::from_toml_str("[species]\n\"れお\" = \"reosan\"\n", "inline").unwrap();

        let merged = overrides.apply_species(&roster);

        assert_eq!(merged.len(), 3);
        assert_eq!(merged.get("れお"), Some("reosan"));
        assert_eq!(merged.identifiers().len(), 2);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let overrides = Overrides::load(Path::new("/nonexistent/overrides.toml")).unwrap();
        assert_eq!(overrides, Overrides::default());
    }

    #[test]
    fn test_bad_toml_is_reported() {
        let err = Overrides::from_toml_str("[moves\n", "broken.toml").unwrap_err();
        assert!(err.to_string().starts_with("Parse broken.toml failed"));
    }
}
