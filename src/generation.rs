// ⚙️ Generation Pipeline - Concurrent fan-out to the text generator
//
// Every source row yields exactly one outcome: an accepted keyed entry, a
// review record, or both (model-flagged entries keep their text). Failures
// stay per-record; the batch always runs to completion.
//
// Completion order is arbitrary. Each outcome carries its row index and lands
// in its own slot, so output order always matches source order.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use crate::gemini::{GenerateError, TextGenerator};
use crate::normalize::{classify, ensure_contact_tag, KeyedEntry, ReviewReason};
use crate::prompt::build_move_prompt;
use crate::scanner::entry_name;
use crate::sources::MoveRecord;

// ============================================================================
// SETTINGS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    /// In-flight requests (default: 10)
    pub concurrency: usize,

    /// Attempts per record when rate-limited (default: 5)
    pub max_attempts: usize,

    /// Fixed wait after a rate-limit signal (default: 10s)
    pub cooldown: Duration,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        GenerationSettings {
            concurrency: 10,
            max_attempts: 5,
            cooldown: Duration::from_secs(10),
        }
    }
}

// ============================================================================
// OUTCOMES
// ============================================================================

/// Manual review entry, persisted as-is
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub name: String,
    pub reason: String,

    /// Original effect description, for hand reconstruction
    pub effect: String,
}

/// Result of one row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOutcome {
    /// Position in the submitted batch
    pub index: usize,
    pub name: String,
    pub effect: String,
    pub entry: Option<KeyedEntry>,
    pub review: Option<ReviewReason>,
}

impl RecordOutcome {
    fn failed(index: usize, record: &MoveRecord, reason: ReviewReason) -> Self {
        RecordOutcome {
            index,
            name: record.display_name().to_string(),
            effect: record.effect.clone(),
            entry: None,
            review: Some(reason),
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.entry.is_some()
    }

    pub fn review_record(&self) -> Option<ReviewRecord> {
        self.review.as_ref().map(|reason| ReviewRecord {
            name: self.name.clone(),
            reason: reason.as_str().to_string(),
            effect: self.effect.clone(),
        })
    }
}

/// All outcomes of one batch, in source row order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationReport {
    pub outcomes: Vec<RecordOutcome>,
}

impl GenerationReport {
    /// Entries to merge into the container, in row order
    pub fn accepted_entries(&self) -> Vec<KeyedEntry> {
        self.outcomes
            .iter()
            .filter_map(|o| o.entry.clone())
            .collect()
    }

    /// `(row name, entry)` for every accepted row, in row order
    pub fn accepted_by_name(&self) -> Vec<(String, KeyedEntry)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.entry.clone().map(|e| (o.name.clone(), e)))
            .collect()
    }

    /// Every flagged row, in row order
    pub fn review_list(&self) -> Vec<ReviewRecord> {
        self.outcomes
            .iter()
            .filter_map(RecordOutcome::review_record)
            .collect()
    }

    pub fn accepted_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_accepted()).count()
    }

    pub fn review_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.review.is_some()).count()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} records: {} accepted, {} for manual review",
            self.outcomes.len(),
            self.accepted_count(),
            self.review_count()
        )
    }
}

// ============================================================================
// RECORD SELECTION
// ============================================================================

/// Which rows to send to the generator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Selection {
    /// Only rows whose name is not already in the container
    #[default]
    Missing,
    /// Every row
    All,
    /// Rows with exactly this display name
    Single(String),
}

pub fn select_records(
    records: &[MoveRecord],
    existing_names: &HashSet<String>,
    selection: &Selection,
) -> Vec<MoveRecord> {
    records
        .iter()
        .filter(|r| !r.display_name().is_empty())
        .filter(|r| match selection {
            Selection::Missing => !existing_names.contains(r.display_name()),
            Selection::All => true,
            Selection::Single(name) => r.display_name() == name.trim(),
        })
        .cloned()
        .collect()
}

// ============================================================================
// MERGE
// ============================================================================

/// Names declared by existing container entries
pub fn container_names(entries: &[KeyedEntry]) -> HashSet<String> {
    entries
        .iter()
        .filter_map(|e| entry_name(&e.value))
        .map(|n| n.trim().to_string())
        .collect()
}

fn queue_by_name<I>(pairs: I) -> HashMap<String, VecDeque<KeyedEntry>>
where
    I: IntoIterator<Item = (String, KeyedEntry)>,
{
    let mut queues: HashMap<String, VecDeque<KeyedEntry>> = HashMap::new();
    for (name, entry) in pairs {
        queues.entry(name.trim().to_string()).or_default().push_back(entry);
    }
    queues
}

/// Rebuild the container in source row order
///
/// Each row takes the entry accepted this run, else its previous entry. A row
/// regenerated under a new key drops its old entry. Rows with neither are left
/// out; previous entries matching no row are dropped with a warning.
pub fn merge_entries(
    records: &[MoveRecord],
    existing: Vec<KeyedEntry>,
    accepted: Vec<(String, KeyedEntry)>,
) -> Vec<KeyedEntry> {
    let mut unnamed = Vec::new();
    let mut previous = queue_by_name(existing.into_iter().filter_map(|entry| {
        match entry_name(&entry.value) {
            Some(name) => Some((name, entry)),
            None => {
                unnamed.push(entry.key);
                None
            }
        }
    }));
    let mut fresh = queue_by_name(accepted);

    let mut merged = Vec::with_capacity(records.len());
    for record in records {
        let name = record.display_name();
        if name.is_empty() {
            continue;
        }
        let old = previous.get_mut(name).and_then(VecDeque::pop_front);
        let new = fresh.get_mut(name).and_then(VecDeque::pop_front);
        if let Some(entry) = new.or(old) {
            merged.push(entry);
        }
    }

    let mut dropped: Vec<String> = previous
        .into_values()
        .flatten()
        .map(|e| e.key)
        .chain(unnamed)
        .collect();
    if !dropped.is_empty() {
        dropped.sort();
        tracing::warn!(
            count = dropped.len(),
            keys = %dropped.join(", "),
            "Dropped container entries with no matching source row"
        );
    }
    merged
}

/// Review list for this run, with earlier entries carried forward
///
/// Rows processed this run get their fresh verdict. Every other row keeps its
/// previous review entry until a maintainer removes it from the list, so
/// flagged records are never lost between incremental runs.
pub fn carry_forward_reviews(
    records: &[MoveRecord],
    previous: Vec<ReviewRecord>,
    report: &GenerationReport,
) -> Vec<ReviewRecord> {
    let processed: HashSet<&str> = report.outcomes.iter().map(|o| o.name.as_str()).collect();

    let mut earlier: HashMap<String, VecDeque<ReviewRecord>> = HashMap::new();
    let mut order = Vec::new();
    for record in previous {
        if processed.contains(record.name.as_str()) {
            continue; // superseded by this run
        }
        if !earlier.contains_key(&record.name) {
            order.push(record.name.clone());
        }
        earlier.entry(record.name.clone()).or_default().push_back(record);
    }
    let mut current: HashMap<String, VecDeque<ReviewRecord>> = HashMap::new();
    for record in report.review_list() {
        current.entry(record.name.clone()).or_default().push_back(record);
    }

    let mut list = Vec::new();
    for row in records {
        let name = row.display_name();
        let source = if processed.contains(name) { &mut current } else { &mut earlier };
        if let Some(record) = source.get_mut(name).and_then(VecDeque::pop_front) {
            list.push(record);
        }
    }
    // Entries whose row left the sheet stay listed at the end
    for name in order {
        if let Some(rest) = earlier.remove(&name) {
            list.extend(rest);
        }
    }
    list
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct GenerationPipeline<G: TextGenerator> {
    generator: Arc<G>,
    settings: GenerationSettings,

    /// Current container entries, mined for few-shot examples
    examples: Vec<KeyedEntry>,
}

impl<G: TextGenerator> GenerationPipeline<G> {
    pub fn new(generator: Arc<G>, settings: GenerationSettings) -> Self {
        GenerationPipeline {
            generator,
            settings,
            examples: Vec::new(),
        }
    }

    pub fn with_examples(mut self, examples: Vec<KeyedEntry>) -> Self {
        self.examples = examples;
        self
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    /// Call the generator, waiting out rate limits up to `max_attempts`
    async fn generate_with_retry(&self, index: usize, name: &str, prompt: &str) -> Result<String, GenerateError> {
        let attempts = self.settings.max_attempts.max(1);
        for attempt in 1..=attempts {
            match self.generator.generate(prompt).await {
                Err(GenerateError::RateLimited) if attempt < attempts => {
                    tracing::warn!(
                        index,
                        move_name = name,
                        attempt,
                        cooldown = ?self.settings.cooldown,
                        "Rate limit hit, waiting"
                    );
                    tokio::time::sleep(self.settings.cooldown).await;
                }
                result => return result,
            }
        }
        Err(GenerateError::RateLimited)
    }

    /// One row: request, call, normalize, classify
    async fn process(&self, index: usize, record: &MoveRecord) -> RecordOutcome {
        let name = record.display_name();
        tracing::info!(index, move_name = name, "Generating DSL");

        let prompt = build_move_prompt(record, &self.examples);
        let text = match self.generate_with_retry(index, name, &prompt).await {
            Ok(text) => text,
            Err(e) => {
                let reason = if e.is_rate_limit() {
                    ReviewReason::RateLimited
                } else {
                    ReviewReason::GenerationError
                };
                tracing::error!(index, move_name = name, error = %e, reason = %reason, "Generation failed");
                return RecordOutcome::failed(index, record, reason);
            }
        };

        let normalized = classify(&text);
        if let Some(reason) = &normalized.review {
            tracing::warn!(index, move_name = name, reason = %reason, "Routed to manual review");
        }

        let entry = normalized.entry.map(|mut entry| {
            if record.is_contact() {
                entry.value = ensure_contact_tag(&entry.value);
            }
            entry
        });

        RecordOutcome {
            index,
            name: name.to_string(),
            effect: record.effect.clone(),
            entry,
            review: normalized.review,
        }
    }

    /// Run every record; outcomes come back in input order
    pub async fn run(&self, records: &[MoveRecord]) -> GenerationReport {
        let total = records.len();
        let mut slots: Vec<Option<RecordOutcome>> = (0..total).map(|_| None).collect();

        let completed: Vec<RecordOutcome> = stream::iter(records.iter().enumerate())
            .map(|(index, record)| self.process(index, record))
            .buffer_unordered(self.settings.concurrency.max(1))
            .collect()
            .await;

        for outcome in completed {
            let index = outcome.index;
            debug_assert!(slots[index].is_none(), "slot {} written twice", index);
            slots[index] = Some(outcome);
        }

        let report = GenerationReport {
            outcomes: slots.into_iter().flatten().collect(),
        };
        tracing::info!(total, accepted = report.accepted_count(), review = report.review_count(), "Generation batch finished");
        report
    }
}

// ============================================================================
// TESTS
// ============================================================================
