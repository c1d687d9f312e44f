/// Parsing of the fact-extraction output
use crate::error::{CaseIndexError, Result};
use crate::model::{PartyShape, SpecialCase};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// `key: value` with either colon width and an optional list bullet
const LINE_PATTERN: &str = r"^\s*(?:[-*•]\s*)?(?P<key>[^:：]+?)\s*[:：]\s*(?P<value>.*?)\s*$";
/// List punctuation, or a conjunction standing alone between names.
/// A bare 及/和/與 is part of a name (張和平, 和泰).
const PARTY_SEPARATORS: &str = r"\s*[、，,;；]\s*|\s+[及和與]\s+";

/// Entries that mean the extraction could not name the party
const UNLISTED: &[&str] = &["未知", "未提及", "無", "不詳"];

const MINOR_MARKERS: &[&str] = &["未成年"];
const EMPLOYEE_MARKERS: &[&str] = &["僱用人", "受僱人", "受雇人", "雇用人"];
const ANIMAL_MARKERS: &[&str] = &["動物"];

/// Structured attributes of one accident narrative
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFacts {
    pub plaintiffs: Vec<String>,
    pub defendants: Vec<String>,
    pub defendant_is_minor: bool,
    pub defendant_is_employee_acting_in_scope: bool,
    pub accident_caused_by_animal: bool,
}

impl ExtractedFacts {
    /// Party shape from the listed counts; an unlisted side counts as one
    pub fn party_shape(&self) -> PartyShape {
        PartyShape::from_counts(self.plaintiffs.len().max(1), self.defendants.len().max(1))
    }

    /// First special case that applies, checked minor, employee, then animal
    pub fn special_case(&self) -> Option<SpecialCase> {
        SpecialCase::ALL.into_iter().find(|case| self.flag(*case))
    }

    pub fn flag(&self, case: SpecialCase) -> bool {
        match case {
            SpecialCase::MinorDefendant => self.defendant_is_minor,
            SpecialCase::EmployerLiability => self.defendant_is_employee_acting_in_scope,
            SpecialCase::AnimalCaused => self.accident_caused_by_animal,
        }
    }
}

/// Line-oriented parser for extraction text
pub struct FactParser {
    line: Regex,
    party_separator: Regex,
}

impl FactParser {
    pub fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| {
                CaseIndexError::Other(anyhow::anyhow!("Invalid pattern '{}': {}", pattern, e))
            })
        };

        Ok(Self {
            line: compile(LINE_PATTERN)?,
            party_separator: compile(PARTY_SEPARATORS)?,
        })
    }

    /// Parse extraction output
    ///
    /// All three yes/no questions must be answered; party lines are optional.
    pub fn parse(&self, text: &str) -> Result<ExtractedFacts> {
        let mut facts = ExtractedFacts::default();
        let mut minor = None;
        let mut employee = None;
        let mut animal = None;

        for line in text.lines() {
            let Some(captures) = self.line.captures(line) else {
                continue;
            };
            let key = &captures["key"];
            let value = &captures["value"];

            if contains_any(key, MINOR_MARKERS) {
                minor = Some(is_yes(value));
            } else if contains_any(key, EMPLOYEE_MARKERS) {
                employee = Some(is_yes(value));
            } else if contains_any(key, ANIMAL_MARKERS) {
                animal = Some(is_yes(value));
            } else if key == "原告" {
                facts.plaintiffs = self.split_parties(value);
            } else if key == "被告" {
                facts.defendants = self.split_parties(value);
            }
        }

        match (minor, employee, animal) {
            (Some(minor), Some(employee), Some(animal)) => {
                facts.defendant_is_minor = minor;
                facts.defendant_is_employee_acting_in_scope = employee;
                facts.accident_caused_by_animal = animal;
                Ok(facts)
            }
            _ => Err(CaseIndexError::MalformedExtraction {
                input: text.to_string(),
            }),
        }
    }

    fn split_parties(&self, value: &str) -> Vec<String> {
        if UNLISTED.contains(&value.trim()) {
            return Vec::new();
        }
        self.party_separator
            .split(value)
            .map(str::trim)
            .filter(|name| !name.is_empty() && !UNLISTED.contains(name))
            .map(str::to_string)
            .collect()
    }
}

fn contains_any(key: &str, markers: &[&str]) -> bool {
    markers.iter().any(|marker| key.contains(marker))
}

fn is_yes(answer: &str) -> bool {
    answer.trim_start().starts_with('是')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<ExtractedFacts> {
        FactParser::new().unwrap().parse(text)
    }

    #[test]
    fn test_parse_full_extraction() {
        let facts = parse(
            "原告: 甲○○、乙○○\n被告：丙○○\n被告是否為未成年人: 否\n被告是否為受僱人：是，執行職務中\n車禍是否由動物造成: 否",
        )
        .unwrap();

        assert_eq!(facts.plaintiffs, vec!["甲○○", "乙○○"]);
        assert_eq!(facts.defendants, vec!["丙○○"]);
        assert!(!facts.defendant_is_minor);
        assert!(facts.defendant_is_employee_acting_in_scope);
        assert!(!facts.accident_caused_by_animal);
        assert_eq!(facts.party_shape(), PartyShape::MultiplePlaintiffs);
        assert_eq!(facts.special_case(), Some(SpecialCase::EmployerLiability));
    }

    #[test]
    fn test_unlisted_party_counts_as_one() {
        let facts = parse(
            "原告: 未提及\n被告: 王1、王2\n被告是否為未成年: 否\n被告是否為僱用人: 否\n車禍是否為動物造成: 否",
        )
        .unwrap();

        assert!(facts.plaintiffs.is_empty());
        assert_eq!(facts.defendants.len(), 2);
        assert_eq!(facts.party_shape(), PartyShape::MultipleDefendants);
        assert_eq!(facts.special_case(), None);
    }

    #[test]
    fn test_conjunction_inside_name_kept_whole() {
        let facts = parse(
            "原告: 李和興\n被告: 張和平\n被告是否為未成年: 否\n被告是否為僱用人: 否\n車禍是否為動物造成: 否",
        )
        .unwrap();

        assert_eq!(facts.plaintiffs, vec!["李和興"]);
        assert_eq!(facts.defendants, vec!["張和平"]);
        assert_eq!(facts.party_shape(), PartyShape::SinglePair);
    }

    #[test]
    fn test_spaced_conjunction_separates() {
        let facts = parse(
            "原告: 陳與真\n被告: 和泰汽車股份有限公司 及 王大明，林小華\n被告是否為未成年: 否\n被告是否為僱用人: 否\n車禍是否為動物造成: 否",
        )
        .unwrap();

        assert_eq!(facts.plaintiffs, vec!["陳與真"]);
        assert_eq!(
            facts.defendants,
            vec!["和泰汽車股份有限公司", "王大明", "林小華"]
        );
        assert_eq!(facts.party_shape(), PartyShape::MultipleDefendants);
    }

    #[test]
    fn test_minor_outranks_employee() {
        let facts = parse(
            "- 被告是否為未成年: 是\n- 被告是否為僱用人: 是\n- 車禍是否為動物造成: 是",
        )
        .unwrap();
        assert_eq!(facts.special_case(), Some(SpecialCase::MinorDefendant));
        assert_eq!(facts.party_shape(), PartyShape::SinglePair);
    }

    #[test]
    fn test_missing_marker_is_malformed() {
        let text = "原告: 甲\n被告: 乙\n被告是否為未成年: 否";
        match parse(text) {
            Err(CaseIndexError::MalformedExtraction { input }) => assert_eq!(input, text),
            other => panic!("expected MalformedExtraction, got {:?}", other),
        }

        assert!(parse("").is_err());
    }

    #[test]
    fn test_answer_must_start_with_yes() {
        let facts = parse(
            "被告是否為未成年: 不是\n被告是否為僱用人:   是\n車禍是否為動物造成: 否，是行人",
        )
        .unwrap();
        assert!(!facts.defendant_is_minor);
        assert!(facts.defendant_is_employee_acting_in_scope);
        assert!(!facts.accident_caused_by_animal);
    }
}
