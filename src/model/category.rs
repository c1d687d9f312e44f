//! Closed case-category enumeration
//!
//! Upstream tooling labels cases with free-form strings. Inside the engine a
//! label is always one of these variants; anything else is `Unclassified`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between a party shape and a special-case tag in a label
pub const LABEL_SEPARATOR: char = '+';

/// Party-count bucket of a case
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PartyShape {
    /// One plaintiff, one defendant
    SinglePair,
    /// Several plaintiffs, one defendant
    MultiplePlaintiffs,
    /// One plaintiff, several defendants
    MultipleDefendants,
    /// Several of both
    MultipleBoth,
}

impl PartyShape {
    pub const ALL: [PartyShape; 4] = [
        PartyShape::SinglePair,
        PartyShape::MultiplePlaintiffs,
        PartyShape::MultipleDefendants,
        PartyShape::MultipleBoth,
    ];

    /// Bucket from party counts. Callers treat an unlisted party as one.
    pub fn from_counts(plaintiffs: usize, defendants: usize) -> Self {
        match (plaintiffs > 1, defendants > 1) {
            (false, false) => PartyShape::SinglePair,
            (true, false) => PartyShape::MultiplePlaintiffs,
            (false, true) => PartyShape::MultipleDefendants,
            (true, true) => PartyShape::MultipleBoth,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PartyShape::SinglePair => "單純原被告各一",
            PartyShape::MultiplePlaintiffs => "數名原告",
            PartyShape::MultipleDefendants => "數名被告",
            PartyShape::MultipleBoth => "原被告皆數名",
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            PartyShape::SinglePair => "single-pair",
            PartyShape::MultiplePlaintiffs => "multiple-plaintiffs",
            PartyShape::MultipleDefendants => "multiple-defendants",
            PartyShape::MultipleBoth => "multiple-both",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|shape| shape.label() == token || shape.slug() == token)
    }
}

/// Liability doctrine that overrides party counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SpecialCase {
    /// Civil Code §187: defendant is a minor
    MinorDefendant,
    /// Civil Code §188: defendant is an employee acting in scope
    EmployerLiability,
    /// Civil Code §190: accident caused by an animal
    AnimalCaused,
}

impl SpecialCase {
    /// Rule priority order. The first one that applies wins.
    pub const ALL: [SpecialCase; 3] = [
        SpecialCase::MinorDefendant,
        SpecialCase::EmployerLiability,
        SpecialCase::AnimalCaused,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SpecialCase::MinorDefendant => "§187未成年案型",
            SpecialCase::EmployerLiability => "§188僱用人案型",
            SpecialCase::AnimalCaused => "§190動物案型",
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            SpecialCase::MinorDefendant => "minor-defendant",
            SpecialCase::EmployerLiability => "employer-liability",
            SpecialCase::AnimalCaused => "animal-caused",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|special| special.label() == token || special.slug() == token)
    }
}

/// Procedural category of a case
///
/// The derived ordering is the fixed enumeration order used for stable
/// tie-breaking: party shapes, special cases, compounds, then unclassified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum CaseCategory {
    Party(PartyShape),
    Special(SpecialCase),
    /// Party shape carrying a special-case suffix, e.g. `數名被告+§188僱用人案型`
    Compound(PartyShape, SpecialCase),
    Unclassified,
}

impl CaseCategory {
    /// The seven base categories, in enumeration order
    pub fn base_categories() -> Vec<CaseCategory> {
        PartyShape::ALL
            .into_iter()
            .map(CaseCategory::Party)
            .chain(SpecialCase::ALL.into_iter().map(CaseCategory::Special))
            .collect()
    }

    /// Parse an upstream label. Unknown labels map to `Unclassified`.
    ///
    /// Accepts both the display labels and the ASCII slugs.
    pub fn parse_label(label: &str) -> Self {
        let label = label.trim();
        if label.is_empty() {
            return CaseCategory::Unclassified;
        }

        match label.split_once(LABEL_SEPARATOR) {
            None => PartyShape::from_token(label)
                .map(CaseCategory::Party)
                .or_else(|| SpecialCase::from_token(label).map(CaseCategory::Special))
                .unwrap_or(CaseCategory::Unclassified),
            Some((left, right)) => {
                let (left, right) = (left.trim(), right.trim());
                let pair = PartyShape::from_token(left)
                    .zip(SpecialCase::from_token(right))
                    .or_else(|| PartyShape::from_token(right).zip(SpecialCase::from_token(left)));
                match pair {
                    Some((shape, special)) => CaseCategory::Compound(shape, special),
                    None => CaseCategory::Unclassified,
                }
            }
        }
    }

    pub fn label(&self) -> String {
        match self {
            CaseCategory::Party(shape) => shape.label().to_string(),
            CaseCategory::Special(special) => special.label().to_string(),
            CaseCategory::Compound(shape, special) => {
                format!("{}{}{}", shape.label(), LABEL_SEPARATOR, special.label())
            }
            CaseCategory::Unclassified => "未分類".to_string(),
        }
    }

    /// Filesystem-safe key
    pub fn slug(&self) -> String {
        match self {
            CaseCategory::Party(shape) => shape.slug().to_string(),
            CaseCategory::Special(special) => special.slug().to_string(),
            CaseCategory::Compound(shape, special) => {
                format!("{}{}{}", shape.slug(), LABEL_SEPARATOR, special.slug())
            }
            CaseCategory::Unclassified => "unclassified".to_string(),
        }
    }

    /// Special-case tag, if any
    pub fn special(&self) -> Option<SpecialCase> {
        match self {
            CaseCategory::Special(special) | CaseCategory::Compound(_, special) => Some(*special),
            _ => None,
        }
    }

    pub fn is_unclassified(&self) -> bool {
        matches!(self, CaseCategory::Unclassified)
    }
}

impl fmt::Display for CaseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl From<CaseCategory> for String {
    fn from(category: CaseCategory) -> Self {
        category.label()
    }
}

impl From<String> for CaseCategory {
    fn from(label: String) -> Self {
        CaseCategory::parse_label(&label)
    }
}

impl std::str::FromStr for CaseCategory {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(CaseCategory::parse_label(s))
    }
}

/// Key of a persisted or cached partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PartitionKey {
    /// Bootstrap index over every embedded case, used for voting
    Global,
    Category(CaseCategory),
}

impl PartitionKey {
    pub fn slug(&self) -> String {
        match self {
            PartitionKey::Global => "global".to_string(),
            PartitionKey::Category(category) => category.slug(),
        }
    }

    /// Inverse of [`PartitionKey::slug`]
    pub fn from_slug(slug: &str) -> Option<Self> {
        if slug == "global" {
            return Some(PartitionKey::Global);
        }
        match CaseCategory::parse_label(slug) {
            CaseCategory::Unclassified if slug != "unclassified" => None,
            category => Some(PartitionKey::Category(category)),
        }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionKey::Global => f.write_str("global"),
            PartitionKey::Category(category) => write!(f, "{}", category),
        }
    }
}

impl From<CaseCategory> for PartitionKey {
    fn from(category: CaseCategory) -> Self {
        PartitionKey::Category(category)
    }
}
