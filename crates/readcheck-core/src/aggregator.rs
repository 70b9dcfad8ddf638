//! Grading aggregator.
//!
//! Fans out one grading call per answer, waits for every call to settle, and
//! reduces the grades to a total score and percentage. Grades come back in
//! answer order regardless of completion order.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::GradingError;
use crate::grading::{AnswerGrader, FailureKind, GradeOutcome, GradeStatus};
use crate::model::{percentage, Answer, Grade, Question, MAX_SCORE_PER_QUESTION};

/// Progress reporting for a grading batch.
pub trait GradingReporter: Send + Sync {
    fn on_grading_start(&self, total: usize);
    /// Called in completion order.
    fn on_grade_complete(&self, outcome: &GradeOutcome);
    fn on_grading_complete(&self, summary: &ScoreSummary, elapsed: Duration);
}

/// No-op progress reporter.
pub struct NoopReporter;

impl GradingReporter for NoopReporter {
    fn on_grading_start(&self, _: usize) {}
    fn on_grade_complete(&self, _: &GradeOutcome) {}
    fn on_grading_complete(&self, _: &ScoreSummary, _: Duration) {}
}

/// Reduced scores of a grading batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSummary {
    pub total_score: u32,
    pub max_possible_score: u32,
    pub percentage: u32,
    /// Ordered by question number.
    pub grades: Vec<Grade>,
    /// Grades substituted because the evaluator failed.
    pub failed_evaluations: usize,
}

/// Reduce grades to totals. Scores above the per-question maximum are
/// clamped before summation.
pub fn summarize(mut grades: Vec<Grade>) -> ScoreSummary {
    grades.sort_by_key(|g| g.question_number);
    for grade in &mut grades {
        grade.score = grade.score.min(MAX_SCORE_PER_QUESTION);
    }
    let total_score: u32 = grades.iter().map(|g| g.score).sum();
    let max_possible_score = grades.len() as u32 * MAX_SCORE_PER_QUESTION;

    ScoreSummary {
        total_score,
        max_possible_score,
        percentage: percentage(total_score, max_possible_score),
        grades,
        failed_evaluations: 0,
    }
}

/// Runs the grading fan-out for a complete answer set.
pub struct GradingAggregator {
    grader: AnswerGrader,
}

impl GradingAggregator {
    pub fn new(grader: AnswerGrader) -> Self {
        Self { grader }
    }

    /// Grade every answer concurrently and reduce the results.
    ///
    /// Individual failures become zero-score grades. The batch fails only
    /// when the inputs are inconsistent or every evaluation found the
    /// service unreachable.
    pub async fn grade_all(
        &self,
        passage: &str,
        questions: &[Question],
        answers: &[Answer],
        reporter: &dyn GradingReporter,
    ) -> Result<ScoreSummary, GradingError> {
        if answers.len() != questions.len() || answers.is_empty() {
            return Err(GradingError::AnswerCountMismatch {
                expected: questions.len(),
                actual: answers.len(),
            });
        }

        let by_number: HashMap<u32, &Question> = questions.iter().map(|q| (q.id, q)).collect();
        let mut answered = HashSet::with_capacity(answers.len());
        let mut pairs = Vec::with_capacity(answers.len());
        for answer in answers {
            let question = by_number
                .get(&answer.question_number)
                .copied()
                .ok_or(GradingError::UnknownQuestion(answer.question_number))?;
            if !answered.insert(answer.question_number) {
                return Err(GradingError::DuplicateAnswer(answer.question_number));
            }
            pairs.push((question, answer));
        }

        let start = Instant::now();
        reporter.on_grading_start(pairs.len());

        let mut futures = FuturesUnordered::new();
        for (index, (question, answer)) in pairs.into_iter().enumerate() {
            let grader = &self.grader;
            futures.push(async move { (index, grader.grade(passage, question, answer).await) });
        }

        let mut settled = Vec::with_capacity(answers.len());
        while let Some((index, outcome)) = futures.next().await {
            reporter.on_grade_complete(&outcome);
            settled.push((index, outcome));
        }
        settled.sort_by_key(|(index, _)| *index);
        let outcomes: Vec<GradeOutcome> = settled.into_iter().map(|(_, o)| o).collect();

        if outcomes
            .iter()
            .all(|o| o.failure_kind() == Some(FailureKind::Unreachable))
        {
            let reason = outcomes
                .iter()
                .find_map(|o| match &o.status {
                    GradeStatus::EvaluatorFailed { reason, .. } => Some(reason.clone()),
                    GradeStatus::Scored => None,
                })
                .unwrap_or_default();
            tracing::error!("every grading call failed to reach the service: {reason}");
            return Err(GradingError::ServiceUnreachable(reason));
        }

        let failed_evaluations = outcomes.iter().filter(|o| o.is_failure()).count();
        if failed_evaluations > 0 {
            tracing::warn!(
                failed = failed_evaluations,
                total = outcomes.len(),
                "substituted zero scores for failed evaluations"
            );
        }

        let mut summary = summarize(outcomes.into_iter().map(|o| o.grade).collect());
        summary.failed_evaluations = failed_evaluations;

        reporter.on_grading_complete(&summary, start.elapsed());
        tracing::info!(
            total = summary.total_score,
            max = summary.max_possible_score,
            percentage = summary.percentage,
            "grading complete"
        );
        Ok(summary)
    }
}
