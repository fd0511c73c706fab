// 🧭 Alignment Engine - Display name → identifier by positional correspondence
//
// The generated move container and the source spreadsheet share no ID
// column. Both were produced by walking the same list in the same order, so
// after dropping known duplicate declarations the i-th container entry and the
// i-th spreadsheet row describe the same move.
//
// Any reordering upstream breaks this silently. Callers must keep row order.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;

// ============================================================================
// REPORTS & ERRORS
// ============================================================================

/// Name → sorted candidate identifiers that no override resolved
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmbiguityReport {
    pub names: BTreeMap<String, Vec<String>>,
}

impl AmbiguityReport {
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// One `- name: id1, id2` line per ambiguous name
    pub fn listing(&self) -> String {
        self.names
            .iter()
            .map(|(name, ids)| format!("- {}: {}", name, ids.join(", ")))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AlignmentError {
    #[error(
        "source rows ({rows}) and filtered container entries ({entries}) differ; cannot align"
    )]
    LengthMismatch { entries: usize, rows: usize },

    #[error("ambiguous names (add overrides):\n{}", .0.listing())]
    Ambiguous(AmbiguityReport),
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Immutable maintainer configuration for one alignment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignmentConfig {
    /// Name → how many container occurrences count as distinct entities
    #[serde(default)]
    pub duplicate_allowance: HashMap<String, usize>,

    /// Name → identifier forced when the name has several candidates
    #[serde(default)]
    pub overrides: HashMap<String, String>,
}

impl AlignmentConfig {
    pub fn new(
        duplicate_allowance: HashMap<String, usize>,
        overrides: HashMap<String, String>,
    ) -> Self {
        AlignmentConfig {
            duplicate_allowance,
            overrides,
        }
    }
}

// ============================================================================
// NAME → IDENTIFIER MAP
// ============================================================================

/// Every name maps to exactly one identifier
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameIdentifierMap {
    entries: HashMap<String, String>,
}

impl NameIdentifierMap {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct identifiers, sorted
    pub fn identifiers(&self) -> BTreeSet<String> {
        self.entries.values().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Later pairs win; empty names or identifiers are ignored
    pub fn extend<I, K, V>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, id) in pairs {
            let name = name.into().trim().to_string();
            let id = id.into();
            if !name.is_empty() && !id.is_empty() {
                self.entries.insert(name, id);
            }
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for NameIdentifierMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = NameIdentifierMap::default();
        map.extend(iter);
        map
    }
}

// ============================================================================
// ALIGNMENT ENGINE
// ============================================================================

pub struct AlignmentEngine {
    config: AlignmentConfig,
}

impl AlignmentEngine {
    pub fn new(config: AlignmentConfig) -> Self {
        AlignmentEngine { config }
    }

    pub fn config(&self) -> &AlignmentConfig {
        &self.config
    }

    /// Drop occurrences of a name beyond its configured allowance
    ///
    /// Names without an allowance are never dropped.
    pub fn filter_duplicates<'a>(&self, entries: &'a [(String, String)]) -> Vec<&'a (String, String)> {
        let mut seen: HashMap<&str, usize> = HashMap::new();
        let mut effective = Vec::with_capacity(entries.len());

        for entry in entries {
            let count = seen.entry(entry.1.as_str()).or_insert(0);
            *count += 1;
            if let Some(allowed) = self.config.duplicate_allowance.get(&entry.1) {
                if *count > *allowed {
                    continue; // known extra declaration
                }
            }
            effective.push(entry);
        }

        effective
    }

    /// Align container entries `(key, declared name)` with source row names
    ///
    /// Both sequences must describe the same entities in the same order.
    /// Blank row names take part in the zip but produce no mapping.
    pub fn align<S: AsRef<str>>(
        &self,
        entries: &[(String, String)],
        row_names: &[S],
    ) -> Result<NameIdentifierMap, AlignmentError> {
        let effective = self.filter_duplicates(entries);
        if effective.len() != row_names.len() {
            return Err(AlignmentError::LengthMismatch {
                entries: effective.len(),
                rows: row_names.len(),
            });
        }

        let mut candidates: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for ((key, _), row_name) in effective.into_iter().zip(row_names) {
            let name = row_name.as_ref().trim();
            if name.is_empty() {
                continue;
            }
            candidates
                .entry(name.to_string())
                .or_default()
                .insert(key.clone());
        }

        self.resolve(candidates)
    }

    /// Accept single candidates; settle multiples through the override table
    fn resolve(
        &self,
        candidates: BTreeMap<String, BTreeSet<String>>,
    ) -> Result<NameIdentifierMap, AlignmentError> {
        let mut resolved = NameIdentifierMap::default();
        let mut ambiguous = AmbiguityReport::default();

        for (name, ids) in candidates {
            if ids.len() == 1 {
                resolved.extend(ids.into_iter().map(|id| (name.clone(), id)));
                continue;
            }
            match self.config.overrides.get(&name) {
                Some(forced) if ids.contains(forced) => {
                    resolved.extend([(name, forced.clone())]);
                }
                _ => {
                    ambiguous.names.insert(name, ids.into_iter().collect());
                }
            }
        }

        if !ambiguous.is_empty() {
            return Err(AlignmentError::Ambiguous(ambiguous));
        }
        Ok(resolved)
    }
}

impl Default for AlignmentEngine {
    fn default() -> Self {
        Self::new(AlignmentConfig::default())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, n)| (k.to_string(), n.to_string()))
            .collect()
    }

    #[test]
    fn test_align_bijection() {
        let engine = AlignmentEngine::default();
        let a = entries(&[("tackle", "たいあたり"), ("ember", "ひのこ"), ("surf", "なみのり")]);
        let b = ["たいあたり", "ひのこ", "なみのり"];

        let map = engine.align(&a, &b).unwrap();

        assert_eq!(map.len(), 3);
        assert_eq!(map.get("たいあたり"), Some("tackle"));
        assert_eq!(map.get("ひのこ"), Some("ember"));
        assert_eq!(map.get("なみのり"), Some("surf"));

        println!("✅ Alignment bijection test passed");
    }

    #[test]
    fn test_duplicate_allowance_filters_extra_declaration() {
        let mut allowance = HashMap::new();
        allowance.insert("タネマシンガン".to_string(), 1);
        let engine = AlignmentEngine::new(AlignmentConfig::new(allowance, HashMap::new()));

        let a = entries(&[
            ("tackle", "たいあたり"),
            ("bullet_seed", "タネマシンガン"),
            ("bullet_seed_2", "タネマシンガン"),
            ("ember", "ひのこ"),
        ]);
        let b = ["たいあたり", "タネマシンガン", "ひのこ"];

        let map = engine.align(&a, &b).unwrap();
        assert_eq!(map.get("タネマシンガン"), Some("bullet_seed"));
        assert_eq!(map.get("ひのこ"), Some("ember"));

        // Same inputs without the allowance: the correlation assumption breaks
        let strict = AlignmentEngine::default();
        let err = strict.align(&a, &b).unwrap_err();
        assert_eq!(err, AlignmentError::LengthMismatch { entries: 4, rows: 3 });

        println!("✅ Duplicate allowance test passed");
    }

    #[test]
    fn test_ambiguous_name_without_override_is_fatal() {
        let engine = AlignmentEngine::default();
        let a = entries(&[("swift_b", "x"), ("swift_a", "x"), ("ember", "ひのこ")]);
        let b = ["スピードスター", "スピードスター", "ひのこ"];

        let err = engine.align(&a, &b).unwrap_err();
        let AlignmentError::Ambiguous(report) = err else {
            panic!("expected ambiguity, got {:?}", err);
        };

        assert_eq!(report.len(), 1);
        assert_eq!(
            report.names.get("スピードスター"),
            Some(&vec!["swift_a".to_string(), "swift_b".to_string()])
        );
        assert_eq!(report.listing(), "- スピードスター: swift_a, swift_b");
    }

    #[test]
    fn test_override_resolves_ambiguity() {
        let mut overrides = HashMap::new();
        overrides.insert("スピードスター".to_string(), "swift_b".to_string());
        let engine = AlignmentEngine::new(AlignmentConfig::new(HashMap::new(), overrides));

        let a = entries(&[("swift_a", "x"), ("swift_b", "y")]);
        let b = ["スピードスター", "スピードスター"];

        let map = engine.align(&a, &b).unwrap();
        assert_eq!(map.get("スピードスター"), Some("swift_b"));
    }

    #[test]
    fn test_override_outside_candidates_stays_ambiguous() {
        let mut overrides = HashMap::new();
        overrides.insert("スピードスター".to_string(), "not_a_candidate".to_string());
        let engine = AlignmentEngine::new(AlignmentConfig::new(HashMap::new(), overrides));

        let a = entries(&[("swift_a", "x"), ("swift_b", "y")]);
        let b = ["スピードスター", "スピードスター"];

        assert!(matches!(engine.align(&a, &b), Err(AlignmentError::Ambiguous(_))));
    }

    #[test]
    fn test_blank_row_names_are_skipped() {
        let engine = AlignmentEngine::default();
        let a = entries(&[("tackle", "たいあたり"), ("unknown", "")]);
        let b = ["たいあたり", "  "];

        let map = engine.align(&a, &b).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.identifiers().len(), 1);
    }
}
