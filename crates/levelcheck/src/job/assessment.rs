//! Proficiency assessment produced by the scoring stage.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// CEFR proficiency level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProficiencyLevel {
    A1,
    A2,
    B1,
    B2,
    C1,
    C2,
}

impl ProficiencyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProficiencyLevel::A1 => "A1",
            ProficiencyLevel::A2 => "A2",
            ProficiencyLevel::B1 => "B1",
            ProficiencyLevel::B2 => "B2",
            ProficiencyLevel::C1 => "C1",
            ProficiencyLevel::C2 => "C2",
        }
    }
}

impl FromStr for ProficiencyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A1" => Ok(ProficiencyLevel::A1),
            "A2" => Ok(ProficiencyLevel::A2),
            "B1" => Ok(ProficiencyLevel::B1),
            "B2" => Ok(ProficiencyLevel::B2),
            "C1" => Ok(ProficiencyLevel::C1),
            "C2" => Ok(ProficiencyLevel::C2),
            _ => Err(format!("Invalid proficiency level: {}", s)),
        }
    }
}

impl fmt::Display for ProficiencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the nine labeled assessment dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Grammar,
    LexicalRange,
    AdditionalComments,
    Pragmatics,
    Style,
    VocabularyDiversity,
    SentenceComplexity,
    Engagement,
    Tone,
}

impl Dimension {
    pub const ALL: [Dimension; 9] = [
        Dimension::Grammar,
        Dimension::LexicalRange,
        Dimension::AdditionalComments,
        Dimension::Pragmatics,
        Dimension::Style,
        Dimension::VocabularyDiversity,
        Dimension::SentenceComplexity,
        Dimension::Engagement,
        Dimension::Tone,
    ];

    /// Key used both in the scoring response and as the column prefix.
    pub fn key(&self) -> &'static str {
        match self {
            Dimension::Grammar => "grammar",
            Dimension::LexicalRange => "lexical_range",
            Dimension::AdditionalComments => "additional_comments",
            Dimension::Pragmatics => "pragmatics",
            Dimension::Style => "style",
            Dimension::VocabularyDiversity => "vocabulary_diversity",
            Dimension::SentenceComplexity => "sentence_complexity",
            Dimension::Engagement => "engagement",
            Dimension::Tone => "tone",
        }
    }

    /// What the scoring engine is asked to comment on.
    pub fn description(&self) -> &'static str {
        match self {
            Dimension::Grammar => "grammatical errors and exceptions",
            Dimension::LexicalRange => "lexical weaknesses and range",
            Dimension::AdditionalComments => "any further remarks",
            Dimension::Pragmatics => "pragmatic fit to the question context",
            Dimension::Style => "stylistic appropriateness",
            Dimension::VocabularyDiversity => "vocabulary diversity",
            Dimension::SentenceComplexity => "sentence complexity",
            Dimension::Engagement => "engagement with the question",
            Dimension::Tone => "tone and sentiment",
        }
    }
}

/// Explanation and 0–100 score for a single dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    pub explanation: String,
    pub score: f64,
}

/// Full assessment: level, all nine dimensions, and the overall score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub level: ProficiencyLevel,
    pub dimensions: BTreeMap<Dimension, DimensionScore>,
    pub overall_score: f64,
}

impl Assessment {
    /// Builds an assessment, checking that every dimension is present and every
    /// score lies in 0–100. When `overall_score` is `None` it is the mean of the
    /// dimension scores.
    pub fn new(
        level: ProficiencyLevel,
        dimensions: BTreeMap<Dimension, DimensionScore>,
        overall_score: Option<f64>,
    ) -> Result<Self, String> {
        for dimension in Dimension::ALL {
            let entry = dimensions
                .get(&dimension)
                .ok_or_else(|| format!("missing dimension '{}'", dimension.key()))?;
            if !is_valid_score(entry.score) {
                return Err(format!(
                    "score for '{}' out of range: {}",
                    dimension.key(),
                    entry.score
                ));
            }
        }

        let overall_score = match overall_score {
            Some(score) => score,
            None => {
                dimensions.values().map(|d| d.score).sum::<f64>() / dimensions.len() as f64
            }
        };
        if !is_valid_score(overall_score) {
            return Err(format!("overall score out of range: {}", overall_score));
        }

        Ok(Self {
            level,
            dimensions,
            overall_score,
        })
    }

    pub fn dimension(&self, dimension: Dimension) -> Option<&DimensionScore> {
        self.dimensions.get(&dimension)
    }
}

fn is_valid_score(score: f64) -> bool {
    score.is_finite() && (0.0..=100.0).contains(&score)
}
