//! Complexity classifier - heuristic tiering of a conversation.
//!
//! Pure and deterministic: the same messages always produce the same tier.
//! System messages only contribute the "specialized context" signal; every
//! other signal is computed over user and assistant content.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::types::{ComplexityTier, Message, MessageRole};

const MEDICAL_KEYWORDS: &[&str] = &[
    "symptom",
    "diagnos",
    "medication",
    "dosage",
    "prescription",
    "blood pressure",
    "heart rate",
    "cholesterol",
    "diabetes",
    "insulin",
    "glucose",
    "chronic",
    "treatment",
    "side effect",
    "inflammation",
    "deficiency",
    "hormone",
    "metabolic",
    "allergy",
];

const ANALYTICAL_KEYWORDS: &[&str] = &[
    "analyze",
    "analyse",
    "analysis",
    "compare",
    "correlation",
    "trend",
    "statistic",
    "regression",
    "variance",
    "average",
    "evaluate",
    "assess",
    "pattern",
    "percentage",
    "distribution",
    "over time",
];

const SPECIALIZED_ROLES: &[&str] = &[
    "nutritionist",
    "dietitian",
    "physician",
    "doctor",
    "clinical",
    "medical",
    "specialist",
    "expert",
    "coach",
];

const KEYWORD_CAP: u32 = 3;
const CLAUSE_THRESHOLD: usize = 4;

static CLAUSE_SPLIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[,;]|\s+(?:and|but|or|then)\s+").expect("clause pattern"));

/// Score breakdown behind a tier decision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ComplexityScore {
    pub length: u32,
    pub questions: u32,
    pub clauses: u32,
    pub medical: u32,
    pub analytical: u32,
    pub specialized_context: u32,
}

impl ComplexityScore {
    pub fn total(&self) -> u32 {
        self.length
            + self.questions
            + self.clauses
            + self.medical
            + self.analytical
            + self.specialized_context
    }

    pub fn tier(&self) -> ComplexityTier {
        ComplexityTier::from_score(self.total())
    }
}

/// Classify a conversation.
pub fn classify(messages: &[Message]) -> ComplexityTier {
    classify_with_score(messages).tier()
}

pub fn classify_with_score(messages: &[Message]) -> ComplexityScore {
    let body = messages
        .iter()
        .filter(|m| m.role != MessageRole::System)
        .map(|m| m.content.trim())
        .collect::<Vec<_>>()
        .join("\n");
    let lower = body.to_lowercase();

    let chars = body.chars().count();
    let length = match chars {
        c if c > 800 => 3,
        c if c > 300 => 2,
        c if c > 120 => 1,
        _ => 0,
    };

    let questions = match body.matches('?').count() {
        n if n >= 3 => 2,
        2 => 1,
        _ => 0,
    };

    let clause_count = CLAUSE_SPLIT
        .split(&body)
        .filter(|part| !part.trim().is_empty())
        .count();
    let clauses = u32::from(clause_count >= CLAUSE_THRESHOLD);

    let specialized_context = u32::from(messages.iter().any(|m| {
        m.is_system() && {
            let sys = m.content.to_lowercase();
            SPECIALIZED_ROLES.iter().any(|k| sys.contains(k))
        }
    }));

    ComplexityScore {
        length,
        questions,
        clauses,
        medical: keyword_points(&lower, MEDICAL_KEYWORDS),
        analytical: keyword_points(&lower, ANALYTICAL_KEYWORDS),
        specialized_context,
    }
}

fn keyword_points(text: &str, keywords: &[&str]) -> u32 {
    let distinct = keywords.iter().filter(|k| text.contains(*k)).count() as u32;
    distinct.min(KEYWORD_CAP)
}
