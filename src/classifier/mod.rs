//! Case-type classification
//!
//! Tier 1 applies the special-case rules to the extracted facts and never
//! touches an index. Tier 2 resolves the party shape, either by a vote over
//! the global index or by counting parties.

mod facts;
mod voting;

pub use facts::{ExtractedFacts, FactParser};
pub use voting::{tally, winner};

use crate::config::ClassifierStrategy;
use crate::error::Result;
use crate::model::CaseCategory;
use crate::query::QueryEngine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Reduces a raw narrative to the line-oriented extraction text
pub trait FactExtractor: Send + Sync {
    fn extract(&self, narrative: &str) -> Result<String>;
}

/// Extractor returning text produced ahead of time
pub struct StaticFacts {
    text: String,
}

impl StaticFacts {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl FactExtractor for StaticFacts {
    fn extract(&self, _narrative: &str) -> Result<String> {
        Ok(self.text.clone())
    }
}

/// Which step decided the category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Rule,
    Voting,
    PartyCount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub category: CaseCategory,
    pub tier: Tier,
    /// Vote totals; empty unless the vote decided
    pub scores: BTreeMap<CaseCategory, f32>,
}

pub struct Classifier {
    engine: Arc<QueryEngine>,
    extractor: Arc<dyn FactExtractor>,
    parser: FactParser,
    strategy: ClassifierStrategy,
    vote_k: usize,
    ceiling: f32,
}

impl Classifier {
    pub fn new(
        engine: Arc<QueryEngine>,
        extractor: Arc<dyn FactExtractor>,
        strategy: ClassifierStrategy,
        vote_k: usize,
        ceiling: f32,
    ) -> Result<Self> {
        Ok(Self {
            engine,
            extractor,
            parser: FactParser::new()?,
            strategy,
            vote_k: vote_k.max(1),
            ceiling,
        })
    }

    pub fn strategy(&self) -> ClassifierStrategy {
        self.strategy
    }

    /// Extract facts from the narrative, then classify
    pub fn classify(&self, narrative: &str) -> Result<CaseCategory> {
        Ok(self.classify_detailed(narrative)?.category)
    }

    /// Classify with extraction text supplied by the caller
    pub fn classify_with_facts(&self, narrative: &str, extraction: &str) -> Result<CaseCategory> {
        Ok(self
            .classify_detailed_with_facts(narrative, extraction)?
            .category)
    }

    pub fn classify_detailed(&self, narrative: &str) -> Result<Classification> {
        let extraction = self.extractor.extract(narrative)?;
        self.classify_detailed_with_facts(narrative, &extraction)
    }

    pub fn classify_detailed_with_facts(
        &self,
        narrative: &str,
        extraction: &str,
    ) -> Result<Classification> {
        let facts = self.parser.parse(extraction)?;

        if let Some(special) = facts.special_case() {
            debug!("Rule tier matched {}", special.label());
            return Ok(Classification {
                category: CaseCategory::Special(special),
                tier: Tier::Rule,
                scores: BTreeMap::new(),
            });
        }

        if self.strategy == ClassifierStrategy::Voting {
            let scores = self.vote(narrative)?;
            if let Some(category) = winner(&scores) {
                return Ok(Classification {
                    category,
                    tier: Tier::Voting,
                    scores,
                });
            }
            debug!("No neighbor contributed a vote, counting parties");
        }

        Ok(Classification {
            category: CaseCategory::Party(facts.party_shape()),
            tier: Tier::PartyCount,
            scores: BTreeMap::new(),
        })
    }

    /// Category scores from the nearest global neighbors
    pub fn vote(&self, narrative: &str) -> Result<BTreeMap<CaseCategory, f32>> {
        let neighbors = self.engine.query_global(narrative, self.vote_k)?;

        let mut labelled = Vec::with_capacity(neighbors.len());
        for neighbor in neighbors {
            match self.engine.store().lookup_category(neighbor.case_id)? {
                Some(category) => labelled.push((category, neighbor.distance)),
                None => debug!("Neighbor {} missing from case store", neighbor.case_id),
            }
        }

        Ok(tally(&labelled, self.ceiling))
    }
}
