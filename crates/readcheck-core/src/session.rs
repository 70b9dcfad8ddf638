//! Assessment state machine.
//!
//! Transitions are a pure function of `(state, event)`. Anything that talks
//! to the outside world is returned as an [`Effect`] for the
//! [`AssessmentController`](crate::controller::AssessmentController) to run;
//! its outcome comes back as another [`Event`].
//!
//! Every session carries a token. Reset bumps it, and completion events
//! carrying an older token are dropped, so a late reply from an abandoned
//! session can never leak into the current one.

use std::fmt;

use serde::Serialize;

use crate::aggregator::ScoreSummary;
use crate::error::SubmitError;
use crate::model::{percentage, Answer, Passage, Question, QuestionTier, QUESTION_COUNT};

/// Identifies one session of the state machine.
pub type SessionToken = u64;

/// Where the assessment currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Loading,
    AwaitingAnswer,
    Grading,
    Results,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Loading => write!(f, "loading"),
            Phase::AwaitingAnswer => write!(f, "awaiting answer"),
            Phase::Grading => write!(f, "grading"),
            Phase::Results => write!(f, "results"),
        }
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone)]
pub enum Event {
    /// The passage and question set for session `token` are ready.
    Loaded {
        token: SessionToken,
        passage: Passage,
        questions: Vec<Question>,
    },
    /// Obtaining the passage or its questions failed.
    LoadFailed { token: SessionToken, error: String },
    /// The student submitted text for the active question.
    AnswerSubmitted { text: String },
    /// Re-run grading for a retained answer set.
    RetryGrading,
    GradingCompleted {
        token: SessionToken,
        summary: ScoreSummary,
    },
    GradingFailed { token: SessionToken, error: String },
    /// Discard everything and begin a new session.
    Reset,
}

/// Side effects requested by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    None,
    /// Fetch a passage and generate its questions.
    LoadSession { token: SessionToken },
    /// Grade the complete answer set.
    GradeAnswers {
        token: SessionToken,
        passage: Passage,
        questions: Vec<Question>,
        answers: Vec<Answer>,
    },
}

/// Display view of the question awaiting an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveQuestion<'a> {
    /// 1-based.
    pub number: u32,
    pub total: usize,
    pub prompt: &'a str,
    pub tier: QuestionTier,
    pub hint: Option<&'a str>,
}

/// Complete state of one assessment.
#[derive(Debug, Clone, Default)]
pub struct AssessmentState {
    token: SessionToken,
    phase: Phase,
    passage: Option<Passage>,
    questions: Vec<Question>,
    answers: Vec<Answer>,
    active: usize,
    summary: Option<ScoreSummary>,
    last_error: Option<String>,
}

impl AssessmentState {
    pub fn token(&self) -> SessionToken {
        self.token
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn passage(&self) -> Option<&Passage> {
        self.passage.as_ref()
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    /// Answers collected so far, in question order.
    pub fn answers(&self) -> &[Answer] {
        &self.answers
    }

    pub fn summary(&self) -> Option<&ScoreSummary> {
        self.summary.as_ref()
    }

    /// The most recent fatal error, cleared by the next successful step.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// The question awaiting an answer, if any.
    pub fn active_question(&self) -> Option<ActiveQuestion<'_>> {
        if self.phase != Phase::AwaitingAnswer {
            return None;
        }
        self.questions.get(self.active).map(|q| ActiveQuestion {
            number: q.id,
            total: self.questions.len(),
            prompt: &q.prompt,
            tier: q.tier,
            hint: q.hint.as_deref(),
        })
    }

    /// True when every question has an answer but grading has not produced
    /// a result, i.e. after a batch-level grading failure.
    pub fn awaiting_regrade(&self) -> bool {
        self.phase == Phase::AwaitingAnswer
            && !self.questions.is_empty()
            && self.answers.len() == self.questions.len()
    }

    /// Display-only completion percentage.
    pub fn progress_percent(&self) -> u32 {
        match self.phase {
            Phase::Loading => 0,
            Phase::AwaitingAnswer => percentage(self.active as u32 + 1, self.questions.len() as u32),
            Phase::Grading | Phase::Results => 100,
        }
    }

    fn grade_effect(&self) -> Effect {
        match &self.passage {
            Some(passage) => Effect::GradeAnswers {
                token: self.token,
                passage: passage.clone(),
                questions: self.questions.clone(),
                answers: self.answers.clone(),
            },
            None => Effect::None,
        }
    }
}

/// Compute the next state for `event`.
///
/// Events that do not apply to the current phase or session are ignored and
/// leave the state untouched. Student input that cannot be accepted is
/// rejected with a [`SubmitError`] before any transition.
pub fn transition(
    state: &AssessmentState,
    event: Event,
) -> Result<(AssessmentState, Effect), SubmitError> {
    let unchanged = || Ok((state.clone(), Effect::None));

    match event {
        Event::Reset => {
            let token = state.token.wrapping_add(1);
            tracing::debug!(token, "reset to loading");
            Ok((
                AssessmentState {
                    token,
                    ..Default::default()
                },
                Effect::LoadSession { token },
            ))
        }

        Event::Loaded {
            token,
            passage,
            questions,
        } => {
            if token != state.token || state.phase != Phase::Loading {
                tracing::debug!(token, current = state.token, "ignoring stale load");
                return unchanged();
            }
            let mut next = state.clone();
            if questions.len() != QUESTION_COUNT {
                next.last_error = Some(format!(
                    "expected {QUESTION_COUNT} questions, got {}",
                    questions.len()
                ));
                return Ok((next, Effect::None));
            }
            tracing::debug!(passage = %passage.id, "questions ready");
            next.phase = Phase::AwaitingAnswer;
            next.passage = Some(passage);
            next.questions = questions;
            next.answers.clear();
            next.active = 0;
            next.last_error = None;
            Ok((next, Effect::None))
        }

        Event::LoadFailed { token, error } => {
            if token != state.token || state.phase != Phase::Loading {
                return unchanged();
            }
            let mut next = state.clone();
            next.last_error = Some(error);
            Ok((next, Effect::None))
        }

        Event::AnswerSubmitted { text } => {
            match state.phase {
                Phase::AwaitingAnswer => {}
                Phase::Loading => return Err(SubmitError::NoActiveSession),
                other => return Err(SubmitError::NotAwaitingAnswer(other.to_string())),
            }
            let text = text.trim();
            if text.is_empty() {
                return Err(SubmitError::EmptyAnswer);
            }

            let mut next = state.clone();
            if state.awaiting_regrade() {
                tracing::debug!("answers retained, grading again");
            } else {
                let question = &state.questions[state.active];
                next.answers.push(Answer {
                    question_number: question.id,
                    question: question.prompt.clone(),
                    answer: text.to_string(),
                });
                if next.answers.len() < next.questions.len() {
                    next.active += 1;
                    return Ok((next, Effect::None));
                }
            }
            next.phase = Phase::Grading;
            next.last_error = None;
            let effect = next.grade_effect();
            Ok((next, effect))
        }

        Event::RetryGrading => {
            if !state.awaiting_regrade() {
                return Err(SubmitError::NotAwaitingAnswer(state.phase.to_string()));
            }
            let mut next = state.clone();
            next.phase = Phase::Grading;
            next.last_error = None;
            let effect = next.grade_effect();
            Ok((next, effect))
        }

        Event::GradingCompleted { token, summary } => {
            if token != state.token || state.phase != Phase::Grading {
                tracing::debug!(token, current = state.token, "ignoring stale grading result");
                return unchanged();
            }
            let mut next = state.clone();
            next.phase = Phase::Results;
            next.summary = Some(summary);
            Ok((next, Effect::None))
        }

        Event::GradingFailed { token, error } => {
            if token != state.token || state.phase != Phase::Grading {
                return unchanged();
            }
            let mut next = state.clone();
            next.phase = Phase::AwaitingAnswer;
            next.active = next.questions.len().saturating_sub(1);
            next.last_error = Some(error);
            Ok((next, Effect::None))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::summarize;
    use crate::model::Grade;

    fn passage() -> Passage {
        Passage {
            id: "p1".into(),
            title: "Bees".into(),
            content: "Bees dance. The dance points to food.".into(),
        }
    }

    fn questions(n: u32) -> Vec<Question> {
        (1..=n)
            .map(|id| Question {
                id,
                tier: QuestionTier::for_position(id as usize - 1),
                prompt: format!("Q{id}?"),
                ideal_answer: String::new(),
                key_points: vec![],
                hint: (id == 1).then(|| "Read the first line.".to_string()),
            })
            .collect()
    }

    fn step(state: &AssessmentState, event: Event) -> (AssessmentState, Effect) {
        transition(state, event).unwrap()
    }

    fn loaded() -> AssessmentState {
        let (state, effect) = step(&AssessmentState::default(), Event::Reset);
        assert_eq!(effect, Effect::LoadSession { token: 1 });
        let (state, _) = step(
            &state,
            Event::Loaded {
                token: 1,
                passage: passage(),
                questions: questions(3),
            },
        );
        state
    }

    fn answer(state: &AssessmentState, text: &str) -> (AssessmentState, Effect) {
        step(
            state,
            Event::AnswerSubmitted {
                text: text.to_string(),
            },
        )
    }

    fn all_answered() -> (AssessmentState, Effect) {
        let (s, _) = answer(&loaded(), "one");
        let (s, _) = answer(&s, "two");
        answer(&s, "three")
    }

    fn summary() -> ScoreSummary {
        summarize(vec![Grade::zero(1), Grade::zero(2), Grade::zero(3)])
    }

    #[test]
    fn load_moves_to_first_question() {
        let state = loaded();
        assert_eq!(state.phase(), Phase::AwaitingAnswer);
        let active = state.active_question().unwrap();
        assert_eq!(active.number, 1);
        assert_eq!(active.total, 3);
        assert_eq!(active.tier, QuestionTier::Recall);
        assert_eq!(active.hint, Some("Read the first line."));
        assert_eq!(state.progress_percent(), 33);
    }

    #[test]
    fn wrong_question_count_stays_loading() {
        for n in [0, 1, 2, 4] {
            let (state, _) = step(&AssessmentState::default(), Event::Reset);
            let (state, effect) = step(
                &state,
                Event::Loaded {
                    token: state.token(),
                    passage: passage(),
                    questions: questions(n),
                },
            );
            assert_eq!(state.phase(), Phase::Loading, "count {n}");
            assert_eq!(effect, Effect::None);
            assert!(state.questions().is_empty());
            assert!(state.last_error().unwrap().contains("expected 3"));
        }
    }

    #[test]
    fn load_failure_is_reported_in_loading() {
        let (state, _) = step(&AssessmentState::default(), Event::Reset);
        let (state, _) = step(
            &state,
            Event::LoadFailed {
                token: 1,
                error: "question service failed".into(),
            },
        );
        assert_eq!(state.phase(), Phase::Loading);
        assert_eq!(state.last_error(), Some("question service failed"));
    }

    #[test]
    fn answers_append_in_order_and_advance() {
        let (s, effect) = answer(&loaded(), "  first answer ");
        assert_eq!(effect, Effect::None);
        assert_eq!(s.answers().len(), 1);
        assert_eq!(s.answers()[0].answer, "first answer");
        assert_eq!(s.answers()[0].question, "Q1?");
        assert_eq!(s.active_question().unwrap().number, 2);
        assert_eq!(s.progress_percent(), 67);
    }

    #[test]
    fn empty_answer_is_rejected_without_transition() {
        let state = loaded();
        for text in ["", "   ", "\n\t"] {
            let err = transition(
                &state,
                Event::AnswerSubmitted {
                    text: text.to_string(),
                },
            )
            .unwrap_err();
            assert_eq!(err, SubmitError::EmptyAnswer);
        }
        assert!(state.answers().is_empty());
        assert_eq!(state.active_question().unwrap().number, 1);
    }

    #[test]
    fn final_answer_requests_grading() {
        let (state, effect) = all_answered();
        assert_eq!(state.phase(), Phase::Grading);
        assert!(state.active_question().is_none());
        match effect {
            Effect::GradeAnswers {
                token, answers, questions, ..
            } => {
                assert_eq!(token, 1);
                assert_eq!(questions.len(), 3);
                let numbers: Vec<u32> = answers.iter().map(|a| a.question_number).collect();
                assert_eq!(numbers, vec![1, 2, 3]);
            }
            other => panic!("expected GradeAnswers, got {other:?}"),
        }
    }

    #[test]
    fn submit_outside_awaiting_answer_is_rejected() {
        assert_eq!(
            transition(
                &AssessmentState::default(),
                Event::AnswerSubmitted { text: "x".into() }
            )
            .unwrap_err(),
            SubmitError::NoActiveSession
        );
        let (grading, _) = all_answered();
        assert!(matches!(
            transition(&grading, Event::AnswerSubmitted { text: "x".into() }),
            Err(SubmitError::NotAwaitingAnswer(_))
        ));
    }

    #[test]
    fn grading_completion_shows_results() {
        let (state, _) = all_answered();
        let (state, _) = step(
            &state,
            Event::GradingCompleted {
                token: 1,
                summary: summary(),
            },
        );
        assert_eq!(state.phase(), Phase::Results);
        assert_eq!(state.summary().unwrap().max_possible_score, 30);
        assert_eq!(state.progress_percent(), 100);
    }

    #[test]
    fn grading_failure_retains_answers_and_regrades() {
        let (state, _) = all_answered();
        let (state, _) = step(
            &state,
            Event::GradingFailed {
                token: 1,
                error: "grading service unreachable".into(),
            },
        );
        assert_eq!(state.phase(), Phase::AwaitingAnswer);
        assert_eq!(state.answers().len(), 3);
        assert_eq!(state.active_question().unwrap().number, 3);
        assert!(state.awaiting_regrade());
        assert!(state.last_error().is_some());

        // Resubmitting re-invokes grading without appending.
        let (resubmitted, effect) = answer(&state, "ignored");
        assert_eq!(resubmitted.phase(), Phase::Grading);
        assert_eq!(resubmitted.answers().len(), 3);
        assert_eq!(resubmitted.answers()[2].answer, "three");
        assert!(matches!(effect, Effect::GradeAnswers { .. }));

        let (retried, effect) = step(&state, Event::RetryGrading);
        assert_eq!(retried.phase(), Phase::Grading);
        assert!(retried.last_error().is_none());
        assert!(matches!(effect, Effect::GradeAnswers { .. }));
    }

    #[test]
    fn retry_grading_needs_full_answer_set() {
        assert!(matches!(
            transition(&loaded(), Event::RetryGrading),
            Err(SubmitError::NotAwaitingAnswer(_))
        ));
    }

    #[test]
    fn reset_discards_previous_session() {
        let (state, _) = all_answered();
        let (state, _) = step(
            &state,
            Event::GradingCompleted {
                token: 1,
                summary: summary(),
            },
        );
        let (state, effect) = step(&state, Event::Reset);
        assert_eq!(effect, Effect::LoadSession { token: 2 });
        assert_eq!(state.phase(), Phase::Loading);
        assert!(state.passage().is_none());
        assert!(state.questions().is_empty());
        assert!(state.answers().is_empty());
        assert!(state.summary().is_none());
    }

    #[test]
    fn stale_events_are_ignored() {
        let (grading, _) = all_answered();
        let (fresh, _) = step(&grading, Event::Reset);

        let (after, _) = step(
            &fresh,
            Event::GradingCompleted {
                token: 1,
                summary: summary(),
            },
        );
        assert_eq!(after.phase(), Phase::Loading);
        assert!(after.summary().is_none());

        let (after, _) = step(
            &fresh,
            Event::Loaded {
                token: 1,
                passage: passage(),
                questions: questions(3),
            },
        );
        assert_eq!(after.phase(), Phase::Loading);
        assert!(after.passage().is_none());

        let (after, _) = step(
            &fresh,
            Event::LoadFailed {
                token: 1,
                error: "old".into(),
            },
        );
        assert!(after.last_error().is_none());
    }
}
