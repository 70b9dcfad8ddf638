//! Core data model types for readcheck.
//!
//! Field names serialize in camelCase to match the JSON contract of the
//! question and grading services.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Number of questions in every assessment.
pub const QUESTION_COUNT: usize = 3;

/// Maximum score a single answer can earn.
pub const MAX_SCORE_PER_QUESTION: u32 = 10;

/// A reading passage. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    pub id: String,
    pub title: String,
    pub content: String,
}

impl Passage {
    /// Split the passage into reading sections of two sentences each.
    pub fn sections(&self) -> Vec<String> {
        let sentences = split_sentences(&self.content);
        sentences
            .chunks(2)
            .map(|pair| pair.join(" ").trim().to_string())
            .collect()
    }
}

/// Split on `.`, `!` or `?` followed by whitespace, keeping the terminator.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        if let Some(&(next_i, next_c)) = chars.peek() {
            if next_c.is_whitespace() {
                let sentence = text[start..next_i].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence);
                }
                start = next_i;
            }
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// Difficulty tier of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionTier {
    #[serde(alias = "easy")]
    Recall,
    #[serde(alias = "medium")]
    Inference,
    #[serde(alias = "challenge")]
    Analysis,
}

impl QuestionTier {
    /// Tier assigned to the question at `index` (0-based) when the service
    /// omits one.
    pub fn for_position(index: usize) -> Self {
        match index {
            0 => QuestionTier::Recall,
            1 => QuestionTier::Inference,
            _ => QuestionTier::Analysis,
        }
    }

    /// Label shown next to the question.
    pub fn label(&self) -> &'static str {
        match self {
            QuestionTier::Recall => "Recall",
            QuestionTier::Inference => "Think Deeper",
            QuestionTier::Analysis => "Critical Thinking",
        }
    }
}

impl fmt::Display for QuestionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionTier::Recall => write!(f, "recall"),
            QuestionTier::Inference => write!(f, "inference"),
            QuestionTier::Analysis => write!(f, "analysis"),
        }
    }
}

impl FromStr for QuestionTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "recall" | "easy" => Ok(QuestionTier::Recall),
            "inference" | "medium" => Ok(QuestionTier::Inference),
            "analysis" | "challenge" => Ok(QuestionTier::Analysis),
            other => Err(format!("unknown question tier: {other}")),
        }
    }
}

/// A comprehension question produced by the question service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// 1-based position within the assessment.
    pub id: u32,
    #[serde(rename = "type")]
    pub tier: QuestionTier,
    #[serde(rename = "question")]
    pub prompt: String,
    #[serde(default)]
    pub ideal_answer: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// A student's answer to one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub question_number: u32,
    /// The question prompt, copied for display.
    pub question: String,
    pub answer: String,
}

/// The graded outcome of one answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub question_number: u32,
    /// Always within `0..=MAX_SCORE_PER_QUESTION`.
    pub score: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub what_was_bad: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub how_to_improve: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_found: Option<bool>,
}

impl Grade {
    /// A zero-score grade with no feedback.
    pub fn zero(question_number: u32) -> Self {
        Self {
            question_number,
            score: 0,
            feedback: None,
            what_was_bad: None,
            how_to_improve: None,
            evidence_found: None,
        }
    }

    pub fn has_feedback(&self) -> bool {
        self.feedback.is_some() || self.what_was_bad.is_some() || self.how_to_improve.is_some()
    }
}

/// Clamp a raw service score into `0..=10` and round to the nearest integer.
///
/// Non-finite values count as zero.
pub fn normalize_score(raw: f64) -> u32 {
    if !raw.is_finite() {
        return 0;
    }
    raw.round().clamp(0.0, MAX_SCORE_PER_QUESTION as f64) as u32
}

/// `round(total / max * 100)`, clamped to `0..=100`. Zero when `max` is zero.
pub fn percentage(total: u32, max: u32) -> u32 {
    if max == 0 {
        return 0;
    }
    let pct = (total as f64 / max as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as u32
}

/// The final result of one assessment. Computed once, read-only thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentResult {
    pub session_id: Uuid,
    pub completed_at: DateTime<Utc>,
    pub passage_id: String,
    pub passage_title: String,
    pub total_score: u32,
    pub max_possible_score: u32,
    pub percentage: u32,
    pub total_questions: usize,
    pub detailed_grades: Vec<Grade>,
    pub answers: Vec<Answer>,
}

impl AssessmentResult {
    /// Look up the grade for a question number.
    pub fn grade_for(&self, question_number: u32) -> Option<&Grade> {
        self.detailed_grades
            .iter()
            .find(|g| g.question_number == question_number)
    }

    pub fn band(&self) -> PerformanceBand {
        PerformanceBand::from_percentage(self.percentage)
    }

    /// Save the result as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize result")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write result to {}", path.display()))?;
        Ok(())
    }

    /// Load a result from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read result from {}", path.display()))?;
        serde_json::from_str(&content).context("failed to parse result JSON")
    }
}

/// Coarse classification of a final percentage for the results view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceBand {
    Excellent,
    Strong,
    Good,
    Developing,
    KeepPracticing,
}

impl PerformanceBand {
    pub fn from_percentage(pct: u32) -> Self {
        match pct {
            90.. => PerformanceBand::Excellent,
            80..=89 => PerformanceBand::Strong,
            70..=79 => PerformanceBand::Good,
            60..=69 => PerformanceBand::Developing,
            _ => PerformanceBand::KeepPracticing,
        }
    }

    pub fn headline(&self) -> &'static str {
        match self {
            PerformanceBand::Excellent => "You really understand this!",
            PerformanceBand::Strong => "Strong understanding!",
            PerformanceBand::Good => "Good effort!",
            PerformanceBand::Developing => "You're learning!",
            PerformanceBand::KeepPracticing => "Keep practicing!",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            PerformanceBand::Excellent => {
                "Excellent comprehension - you captured the key details and deeper meaning!"
            }
            PerformanceBand::Strong => "You demonstrated solid comprehension of the passage.",
            PerformanceBand::Good => {
                "You understood the main ideas. Review the feedback to deepen your skills."
            }
            PerformanceBand::Developing => {
                "You got some key points. Use the feedback to improve next time."
            }
            PerformanceBand::KeepPracticing => {
                "Every practice builds your comprehension skills. Check the feedback to see what to focus on."
            }
        }
    }
}
