// 📚 Aggregation Engine - Distribution rows → per-species learnsets
//
// Unknown moves are dropped and summarized (the move database may lag the
// distribution sheet). Unknown recipients are fatal: dropping one would
// silently lose content for that species.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::alignment::NameIdentifierMap;
use crate::sources::DistributionRecord;

/// Full-width list separator used in the recipient column
pub const RECIPIENT_SEPARATOR: char = '、';

/// Recipient token meaning "every species"
pub const WILDCARD_RECIPIENT: &str = "全員";

// ============================================================================
// RESULTS & ERRORS
// ============================================================================

/// Species identifier → move identifiers (sorted, no duplicates)
pub type Learnsets = BTreeMap<String, BTreeSet<String>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationResult {
    pub learnsets: Learnsets,

    /// Move names with no identifier, sorted and unique
    pub missing_moves: Vec<String>,
}

impl AggregationResult {
    pub fn species_count(&self) -> usize {
        self.learnsets.len()
    }

    pub fn moves_for(&self, species_id: &str) -> Option<&BTreeSet<String>> {
        self.learnsets.get(species_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregationError {
    #[error("species names not resolved (add species overrides):\n{}", listing(.0))]
    UnresolvedRecipients(BTreeMap<String, BTreeSet<String>>),
}

fn listing(missing: &BTreeMap<String, BTreeSet<String>>) -> String {
    missing
        .iter()
        .map(|(name, moves)| {
            let moves: Vec<&str> = moves.iter().map(String::as_str).collect();
            format!("- {}: {}", name, moves.join(", "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// RECIPIENT PARSING
// ============================================================================

/// Split a recipient cell on `、`, dropping line breaks and blank tokens
pub fn parse_recipients(raw: &str) -> Vec<String> {
    let cleaned: String = raw.chars().filter(|c| *c != '\n' && *c != '\r').collect();
    cleaned
        .split(RECIPIENT_SEPARATOR)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

// ============================================================================
// AGGREGATION ENGINE
// ============================================================================

pub struct AggregationEngine<'a> {
    moves: &'a NameIdentifierMap,
    species: &'a NameIdentifierMap,
    universe: BTreeSet<String>,
}

impl<'a> AggregationEngine<'a> {
    /// Universe = every identifier the species map can produce
    pub fn new(moves: &'a NameIdentifierMap, species: &'a NameIdentifierMap) -> Self {
        let universe = species.identifiers();
        Self::with_universe(moves, species, universe)
    }

    pub fn with_universe(
        moves: &'a NameIdentifierMap,
        species: &'a NameIdentifierMap,
        universe: BTreeSet<String>,
    ) -> Self {
        AggregationEngine {
            moves,
            species,
            universe,
        }
    }

    pub fn universe(&self) -> &BTreeSet<String> {
        &self.universe
    }

    /// Build species → moves; every species in the universe gets an entry
    pub fn aggregate(
        &self,
        records: &[DistributionRecord],
    ) -> Result<AggregationResult, AggregationError> {
        let mut learnsets: Learnsets = self
            .universe
            .iter()
            .map(|id| (id.clone(), BTreeSet::new()))
            .collect();
        let mut missing_moves = BTreeSet::new();
        let mut missing_species: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for record in records {
            let move_name = record.move_name.trim();
            if move_name.is_empty() {
                continue;
            }
            let Some(move_id) = self.moves.get(move_name) else {
                missing_moves.insert(move_name.to_string());
                continue;
            };

            let mut targets: BTreeSet<&str> = BTreeSet::new();
            for recipient in parse_recipients(&record.recipients) {
                if recipient == WILDCARD_RECIPIENT {
                    targets.extend(self.universe.iter().map(String::as_str));
                    continue;
                }
                match self.species.get(&recipient) {
                    Some(species_id) => {
                        targets.insert(species_id);
                    }
                    None => {
                        missing_species
                            .entry(recipient)
                            .or_default()
                            .insert(move_name.to_string());
                    }
                }
            }

            for species_id in targets {
                learnsets
                    .entry(species_id.to_string())
                    .or_default()
                    .insert(move_id.to_string());
            }
        }

        if !missing_species.is_empty() {
            return Err(AggregationError::UnresolvedRecipients(missing_species));
        }

        Ok(AggregationResult {
            learnsets,
            missing_moves: missing_moves.into_iter().collect(),
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
