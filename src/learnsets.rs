// 🔗 Learnset Build - Scanner → Alignment → Aggregation
// Pure over already-read inputs; the CLI does the file I/O around it.

use thiserror::Error;

use crate::aggregation::{AggregationEngine, AggregationError, AggregationResult};
use crate::alignment::{AlignmentEngine, AlignmentError, NameIdentifierMap};
use crate::config::Overrides;
use crate::scanner::{scan_container, ScanError};
use crate::sources::{DistributionRecord, MoveRecord};
use crate::writer::MOVES_MARKER;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LearnsetError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Alignment(#[from] AlignmentError),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),
}

/// Move display name → move id, by aligning the container with the move sheet
pub fn move_name_map(
    container_text: &str,
    move_rows: &[MoveRecord],
    overrides: &Overrides,
) -> Result<NameIdentifierMap, LearnsetError> {
    let index = scan_container(container_text, MOVES_MARKER)?;
    let row_names: Vec<&str> = move_rows.iter().map(|r| r.display_name()).collect();

    let engine = AlignmentEngine::new(overrides.move_alignment());
    let map = engine.align(&index.entries(), &row_names)?;

    tracing::info!(
        container_entries = index.len(),
        rows = row_names.len(),
        names = map.len(),
        "Aligned move names"
    );
    Ok(map)
}

/// Full learnset computation; any fatal condition aborts before output exists
pub fn build_learnsets(
    container_text: &str,
    move_rows: &[MoveRecord],
    distribution: &[DistributionRecord],
    roster: &NameIdentifierMap,
    overrides: &Overrides,
) -> Result<AggregationResult, LearnsetError> {
    let moves = move_name_map(container_text, move_rows, overrides)?;
    let species = overrides.apply_species(roster);

    let engine = AggregationEngine::new(&moves, &species);
    let result = engine.aggregate(distribution)?;

    if !result.missing_moves.is_empty() {
        tracing::warn!(
            count = result.missing_moves.len(),
            moves = %result.missing_moves.join(", "),
            "Skipped moves not present in the move container"
        );
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const CONTAINER: &str = r#"// Auto-generated from move_data.csv
const moves = {
  flamethrower: { id: "flamethrower", name: "かえんほうしゃ", effects: [{ type: "damage", power: 90 }] },
  surf: { id: "surf", name: "なみのり", effects: [{ type: "damage", power: 90 }] },
};

module.exports = { moves };
"#;

    fn overrides() -> Overrides {
        let mut species = HashMap::new();
        species.insert("れお".to_string(), "b".to_string());
        Overrides {
            species,
            ..Default::default()
        }
    }

    fn roster() -> NameIdentifierMap {
        [("エー", "a"), ("ビー", "b"), ("シー", "c")].into_iter().collect()
    }

    #[test]
    fn test_end_to_end_wildcard_and_alias() {
        let move_rows = vec![MoveRecord::new("かえんほうしゃ", ""), MoveRecord::new("なみのり", "")];
        let distribution = vec![DistributionRecord::new("かえんほうしゃ", "れお、全員")];

        let result =
            build_learnsets(CONTAINER, &move_rows, &distribution, &roster(), &overrides()).unwrap();

        for id in ["a", "b", "c"] {
            assert!(result.moves_for(id).unwrap().contains("flamethrower"));
        }
        assert_eq!(result.species_count(), 3);

        println!("✅ End-to-end learnset test passed");
    }

    #[test]
    fn test_row_count_mismatch_aborts() {
        let move_rows = vec![MoveRecord::new("かえんほうしゃ", "")];

        let err = build_learnsets(CONTAINER, &move_rows, &[], &roster(), &overrides()).unwrap_err();

        assert_eq!(
            err,
            LearnsetError::Alignment(AlignmentError::LengthMismatch { entries: 2, rows: 1 })
        );
    }

    #[test]
    fn test_unknown_recipient_aborts() {
        let move_rows = vec![MoveRecord::new("かえんほうしゃ", ""), MoveRecord::new("なみのり", "")];
        let distribution = vec![DistributionRecord::new("なみのり", "だれか")];

        let err =
            build_learnsets(CONTAINER, &move_rows, &distribution, &roster(), &overrides()).unwrap_err();

        assert!(matches!(err, LearnsetError::Aggregation(_)));
        assert!(err.to_string().contains("だれか"));
    }

    #[test]
    fn test_missing_container_marker_aborts() {
        let err = move_name_map("module.exports = {};", &[], &Overrides::default()).unwrap_err();
        assert!(matches!(err, LearnsetError::Scan(ScanError::MarkerNotFound(_))));
    }
}
