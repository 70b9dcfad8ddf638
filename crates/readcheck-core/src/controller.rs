//! Drives the state machine against the real adapters.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::aggregator::{GradingAggregator, GradingReporter, NoopReporter};
use crate::error::SubmitError;
use crate::generation::QuestionGenerator;
use crate::model::AssessmentResult;
use crate::passages::PassageSource;
use crate::session::{transition, AssessmentState, Effect, Event, Phase};

/// Owns one assessment at a time and executes the effects its transitions
/// request.
///
/// Fatal failures (no passage, no questions, grading unreachable) do not
/// surface as errors here. They leave the machine in a recoverable phase
/// with [`AssessmentState::last_error`] set.
pub struct AssessmentController {
    state: AssessmentState,
    source: Arc<dyn PassageSource>,
    generator: QuestionGenerator,
    aggregator: GradingAggregator,
    reporter: Arc<dyn GradingReporter>,
    session_id: Uuid,
    result: Option<AssessmentResult>,
}

impl AssessmentController {
    pub fn new(
        source: Arc<dyn PassageSource>,
        generator: QuestionGenerator,
        aggregator: GradingAggregator,
    ) -> Self {
        Self {
            state: AssessmentState::default(),
            source,
            generator,
            aggregator,
            reporter: Arc::new(NoopReporter),
            session_id: Uuid::new_v4(),
            result: None,
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn GradingReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn state(&self) -> &AssessmentState {
        &self.state
    }

    /// The final result, once the machine reaches [`Phase::Results`].
    pub fn result(&self) -> Option<&AssessmentResult> {
        self.result.as_ref()
    }

    /// Load a passage and its questions. Also used to retry a failed load.
    pub async fn start(&mut self) -> Result<(), SubmitError> {
        self.dispatch(Event::Reset).await
    }

    /// Discard the current session and begin a new one.
    pub async fn reset(&mut self) -> Result<(), SubmitError> {
        self.dispatch(Event::Reset).await
    }

    /// Submit text for the active question. The final answer triggers
    /// grading and returns once grading has settled.
    pub async fn submit_answer(&mut self, text: &str) -> Result<(), SubmitError> {
        self.dispatch(Event::AnswerSubmitted {
            text: text.to_string(),
        })
        .await
    }

    /// Grade the retained answers again after a batch-level failure.
    pub async fn retry_grading(&mut self) -> Result<(), SubmitError> {
        self.dispatch(Event::RetryGrading).await
    }

    async fn dispatch(&mut self, event: Event) -> Result<(), SubmitError> {
        let mut pending = Some(event);
        while let Some(event) = pending.take() {
            let (state, effect) = transition(&self.state, event)?;
            self.state = state;
            pending = self.run(effect).await;
        }

        if self.state.phase() == Phase::Results && self.result.is_none() {
            self.result = self.build_result();
            if let Some(result) = &self.result {
                tracing::info!(
                    session = %result.session_id,
                    score = result.total_score,
                    percentage = result.percentage,
                    "assessment complete"
                );
            }
        }
        Ok(())
    }

    async fn run(&mut self, effect: Effect) -> Option<Event> {
        match effect {
            Effect::None => None,

            Effect::LoadSession { token } => {
                self.session_id = Uuid::new_v4();
                self.result = None;

                let passage = match self.source.fetch().await {
                    Ok(passage) => passage,
                    Err(e) => {
                        tracing::error!("failed to load passage: {e}");
                        return Some(Event::LoadFailed {
                            token,
                            error: e.to_string(),
                        });
                    }
                };
                tracing::info!(passage = %passage.id, "loaded passage");

                match self.generator.generate(&passage.content).await {
                    Ok(questions) => Some(Event::Loaded {
                        token,
                        passage,
                        questions,
                    }),
                    Err(e) => {
                        tracing::error!("failed to generate questions: {e}");
                        Some(Event::LoadFailed {
                            token,
                            error: e.to_string(),
                        })
                    }
                }
            }

            Effect::GradeAnswers {
                token,
                passage,
                questions,
                answers,
            } => {
                match self
                    .aggregator
                    .grade_all(&passage.content, &questions, &answers, self.reporter.as_ref())
                    .await
                {
                    Ok(summary) => Some(Event::GradingCompleted { token, summary }),
                    Err(e) => {
                        tracing::error!("grading failed: {e}");
                        Some(Event::GradingFailed {
                            token,
                            error: e.to_string(),
                        })
                    }
                }
            }
        }
    }

    fn build_result(&self) -> Option<AssessmentResult> {
        let summary = self.state.summary()?;
        let passage = self.state.passage()?;
        Some(AssessmentResult {
            session_id: self.session_id,
            completed_at: Utc::now(),
            passage_id: passage.id.clone(),
            passage_title: passage.title.clone(),
            total_score: summary.total_score,
            max_possible_score: summary.max_possible_score,
            percentage: summary.percentage,
            total_questions: self.state.questions().len(),
            detailed_grades: summary.grades.clone(),
            answers: self.state.answers().to_vec(),
        })
    }
}
