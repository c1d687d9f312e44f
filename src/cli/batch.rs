//! JSONL batch processing for the `batch` and `evaluate` commands
use crate::classifier::{Classifier, Tier};
use crate::error::{CaseIndexError, Result};
use crate::model::{CaseCategory, QueryResult};
use crate::query::QueryEngine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use tracing::{info, warn};

/// One input line
#[derive(Debug, Clone, Deserialize)]
pub struct BatchRecord {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    pub narrative: String,
    /// Fact-extraction output for the narrative
    pub facts: String,
    /// Reference label, only read by `evaluate`
    #[serde(default)]
    pub expected: Option<String>,
}

/// One output line; failures keep the batch going
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    Ok {
        id: Option<serde_json::Value>,
        category: CaseCategory,
        tier: Tier,
        neighbors: Vec<QueryResult>,
    },
    Failed {
        id: Option<serde_json::Value>,
        error: String,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
}

/// Classify every record, then retrieve `k` neighbors from its category
pub fn run_batch<R: BufRead, W: Write>(
    reader: R,
    mut writer: W,
    classifier: &Classifier,
    engine: &QueryEngine,
    k: usize,
) -> Result<BatchSummary> {
    let mut summary = BatchSummary::default();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| CaseIndexError::Io {
            source: e,
            context: format!("Failed to read batch input line {}", line_no + 1),
        })?;
        if line.trim().is_empty() {
            continue;
        }

        let outcome = match serde_json::from_str::<BatchRecord>(&line) {
            Ok(record) => process_record(&record, classifier, engine, k),
            Err(e) => BatchOutcome::Failed {
                id: None,
                error: format!("line {}: {}", line_no + 1, e),
            },
        };

        match &outcome {
            BatchOutcome::Ok { .. } => summary.succeeded += 1,
            BatchOutcome::Failed { error, .. } => {
                warn!("Batch record failed: {}", error);
                summary.failed += 1;
            }
        }

        let encoded = serde_json::to_string(&outcome).map_err(|e| CaseIndexError::Json {
            source: e,
            context: "Failed to serialize batch outcome".to_string(),
        })?;
        writeln!(writer, "{}", encoded).map_err(|e| CaseIndexError::Io {
            source: e,
            context: "Failed to write batch output".to_string(),
        })?;
    }

    info!(
        "Batch complete: {} succeeded, {} failed",
        summary.succeeded, summary.failed
    );
    Ok(summary)
}

fn process_record(
    record: &BatchRecord,
    classifier: &Classifier,
    engine: &QueryEngine,
    k: usize,
) -> BatchOutcome {
    let result = classifier
        .classify_detailed_with_facts(&record.narrative, &record.facts)
        .and_then(|classification| {
            let neighbors =
                engine.query_by_category(&record.narrative, classification.category, k)?;
            Ok((classification, neighbors))
        });

    match result {
        Ok((classification, neighbors)) => BatchOutcome::Ok {
            id: record.id.clone(),
            category: classification.category,
            tier: classification.tier,
            neighbors,
        },
        Err(e) => BatchOutcome::Failed {
            id: record.id.clone(),
            error: e.to_string(),
        },
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryTally {
    pub expected: usize,
    pub correct: usize,
}

/// Accuracy over labelled records
#[derive(Debug, Clone, Default, Serialize)]
pub struct EvaluationReport {
    /// Records carrying an expected label
    pub total: usize,
    pub correct: usize,
    /// Records whose classification returned an error
    pub failed: usize,
    pub accuracy: f64,
    pub per_category: BTreeMap<CaseCategory, CategoryTally>,
}

pub fn evaluate<R: BufRead>(reader: R, classifier: &Classifier) -> Result<EvaluationReport> {
    let mut report = EvaluationReport::default();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| CaseIndexError::Io {
            source: e,
            context: format!("Failed to read evaluation input line {}", line_no + 1),
        })?;
        if line.trim().is_empty() {
            continue;
        }

        let record: BatchRecord = match serde_json::from_str(&line) {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping unreadable line {}: {}", line_no + 1, e);
                continue;
            }
        };
        let Some(expected) = record.expected.as_deref() else {
            warn!("Skipping line {} without an expected label", line_no + 1);
            continue;
        };
        let expected = CaseCategory::parse_label(expected);

        report.total += 1;
        let tally = report.per_category.entry(expected).or_default();
        tally.expected += 1;

        match classifier.classify_with_facts(&record.narrative, &record.facts) {
            Ok(category) if category == expected => {
                report.correct += 1;
                tally.correct += 1;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Classification failed on line {}: {}", line_no + 1, e);
                report.failed += 1;
            }
        }
    }

    if report.total > 0 {
        report.accuracy = report.correct as f64 / report.total as f64;
    }
    Ok(report)
}
