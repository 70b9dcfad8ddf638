//! Question generation adapter.
//!
//! Turns a passage into exactly [`QUESTION_COUNT`] structured questions via
//! one language-model call. All-or-nothing: any failure yields a
//! [`GenerationError`] and no questions.

use std::sync::Arc;

use serde::Deserialize;
use tracing::instrument;

use crate::error::GenerationError;
use crate::model::{Question, QuestionTier, QUESTION_COUNT};
use crate::retry::{complete_with_retry, RetryPolicy};
use crate::traits::{extract_json_from_markdown, CompletionRequest, LlmProvider};

const SYSTEM_PROMPT: &str = r#"You are an expert educator creating reading comprehension questions for school students. Generate exactly 3 questions based on the provided passage, in increasing difficulty:
1. an "easy" recall question about an explicit detail,
2. a "medium" inference question that requires reading between the lines,
3. a "challenge" analysis question about purpose, theme, or the author's choices.
Return ONLY a JSON object of the form:
{"questions": [{"id": 1, "type": "easy", "question": "...", "idealAnswer": "...", "keyPoints": ["...", "..."], "hint": "..."}]}
Every question must be answerable from the passage alone."#;

/// Settings for the question generation call.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub retry: RetryPolicy,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: 1024,
            retry: RetryPolicy::default(),
        }
    }
}

/// Generates the question set for a passage.
pub struct QuestionGenerator {
    provider: Arc<dyn LlmProvider>,
    config: GenerationConfig,
}

impl QuestionGenerator {
    pub fn new(provider: Arc<dyn LlmProvider>, config: GenerationConfig) -> Self {
        Self { provider, config }
    }

    /// Generate exactly [`QUESTION_COUNT`] questions for `passage`.
    #[instrument(skip(self, passage), fields(provider = self.provider.name(), model = %self.config.model))]
    pub async fn generate(&self, passage: &str) -> Result<Vec<Question>, GenerationError> {
        let passage = passage.trim();
        if passage.is_empty() {
            return Err(GenerationError::EmptyPassage);
        }

        let request = CompletionRequest {
            model: self.config.model.clone(),
            system_prompt: SYSTEM_PROMPT.to_string(),
            prompt: format!(
                "Generate {QUESTION_COUNT} reading comprehension questions for this passage:\n\n{passage}"
            ),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            json_mode: true,
        };

        let response = complete_with_retry(self.provider.as_ref(), &request, &self.config.retry)
            .await
            .map_err(|e| GenerationError::Remote(format!("{e:#}")))?;

        let questions = parse_questions(&response.content)?;
        tracing::info!(count = questions.len(), "generated questions");
        Ok(questions)
    }
}

#[derive(Debug, Deserialize)]
struct RawQuestionSet {
    questions: Option<Vec<RawQuestion>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawQuestion {
    Text(String),
    Structured(RawStructuredQuestion),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStructuredQuestion {
    #[serde(rename = "type", default)]
    tier: Option<String>,
    question: String,
    #[serde(default)]
    ideal_answer: Option<String>,
    #[serde(default)]
    key_points: Vec<String>,
    #[serde(default)]
    hint: Option<String>,
}

/// Parse the question service's reply into a complete question set.
///
/// Ids are always positional (1..K). A missing or unrecognized `type` falls
/// back to the positional tier.
pub fn parse_questions(content: &str) -> Result<Vec<Question>, GenerationError> {
    let json = extract_json_from_markdown(content);
    let parsed: RawQuestionSet =
        serde_json::from_str(&json).map_err(|e| GenerationError::Malformed(e.to_string()))?;

    let raw = parsed
        .questions
        .ok_or_else(|| GenerationError::Malformed("missing questions array".into()))?;

    if raw.len() != QUESTION_COUNT {
        return Err(GenerationError::WrongCount {
            expected: QUESTION_COUNT,
            actual: raw.len(),
        });
    }

    raw.into_iter()
        .enumerate()
        .map(|(index, entry)| to_question(index, entry))
        .collect()
}

fn to_question(index: usize, entry: RawQuestion) -> Result<Question, GenerationError> {
    let positional = QuestionTier::for_position(index);
    let id = index as u32 + 1;

    let question = match entry {
        RawQuestion::Text(prompt) => Question {
            id,
            tier: positional,
            prompt,
            ideal_answer: String::new(),
            key_points: Vec::new(),
            hint: None,
        },
        RawQuestion::Structured(q) => {
            let tier = match q.tier.as_deref().map(str::parse::<QuestionTier>) {
                Some(Ok(tier)) => tier,
                Some(Err(e)) => {
                    tracing::debug!("question {id}: {e}, using {positional}");
                    positional
                }
                None => positional,
            };
            Question {
                id,
                tier,
                prompt: q.question,
                ideal_answer: q.ideal_answer.unwrap_or_default(),
                key_points: q.key_points,
                hint: q.hint.filter(|h| !h.trim().is_empty()),
            }
        }
    };

    if question.prompt.trim().is_empty() {
        return Err(GenerationError::Malformed(format!(
            "question {id} has no text"
        )));
    }
    Ok(question)
}
