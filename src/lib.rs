// Movedex Builder - Core Library
// Builds the move database and per-species learnsets from spreadsheet exports
// and generated move entries. Exposes all engines for the CLI and tests.

pub mod scanner;      // Structural Scanner - keys/names of a keyed-object literal
pub mod alignment;    // Alignment Engine - positional name → id mapping
pub mod aggregation;  // Aggregation Engine - distribution rows → learnsets
pub mod normalize;    // Generated text → one keyed entry
pub mod prompt;       // Generation requests
pub mod gemini;       // Text generator seam + HTTP client
pub mod generation;   // Generation Pipeline - concurrent fan-out
pub mod learnsets;    // Scanner → Alignment → Aggregation
pub mod sources;      // CSV / roster readers
pub mod writer;       // Output artifacts
pub mod config;       // Maintainer overrides

// Re-export commonly used types
pub use scanner::{
    scan_container, top_level_keys, top_level_blocks, declared_names, entry_name, field_values,
    find_matching_brace, ContainerIndex, Lexer, ScanError, Token,
};
pub use alignment::{
    AlignmentConfig, AlignmentEngine, AlignmentError, AmbiguityReport, NameIdentifierMap,
};
pub use aggregation::{
    parse_recipients, AggregationEngine, AggregationError, AggregationResult, Learnsets,
    RECIPIENT_SEPARATOR, WILDCARD_RECIPIENT,
};
pub use normalize::{
    classify, ensure_contact_tag, normalize_entry, KeyedEntry, Normalized, ReviewReason,
};
pub use prompt::{build_move_prompt, find_similar_moves, MAX_EXAMPLES};
pub use gemini::{GeminiClient, GenerateError, TextGenerator};
pub use generation::{
    carry_forward_reviews, container_names, merge_entries, select_records, GenerationPipeline,
    GenerationReport, GenerationSettings, RecordOutcome, ReviewRecord, Selection,
};
pub use learnsets::{build_learnsets, move_name_map, LearnsetError};
pub use sources::{
    file_digest, load_distribution_records, load_move_records, load_roster,
    DistributionRecord, MoveRecord,
};
pub use writer::{
    parse_learnset_table, parse_move_container, read_review_list, write_learnset_table,
    write_move_container, write_review_list, Provenance, LEARNSETS_MARKER, MOVES_MARKER,
};
pub use config::{ConfigError, Overrides};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
