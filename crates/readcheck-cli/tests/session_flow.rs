//! Full assessment flow against the bundled library with a mock provider.

use std::sync::Arc;

use readcheck_core::aggregator::GradingAggregator;
use readcheck_core::controller::AssessmentController;
use readcheck_core::error::SubmitError;
use readcheck_core::generation::{GenerationConfig, QuestionGenerator};
use readcheck_core::grading::{AnswerGrader, GradingConfig};
use readcheck_core::model::{AssessmentResult, QuestionTier};
use readcheck_core::passages::PassageLibrary;
use readcheck_core::retry::RetryPolicy;
use readcheck_core::session::Phase;
use readcheck_providers::{MockFailure, MockProvider};

const QUESTIONS: &str = r#"```json
{"questions": [
  {"type": "easy", "question": "What do bees perform to share directions?", "idealAnswer": "A waggle dance."},
  {"type": "medium", "question": "Why does the angle of the dance matter?", "idealAnswer": "It points relative to the sun."},
  {"type": "challenge", "question": "What would happen if the sun were hidden?", "idealAnswer": "Bees use polarized light."}
]}
```"#;

fn controller(provider: MockProvider) -> (AssessmentController, Arc<MockProvider>) {
    let provider = Arc::new(provider);
    let library = PassageLibrary::bundled().unwrap();
    let controller = AssessmentController::new(
        Arc::new(library),
        QuestionGenerator::new(
            provider.clone(),
            GenerationConfig {
                retry: RetryPolicy::none(),
                ..Default::default()
            },
        ),
        GradingAggregator::new(AnswerGrader::new(
            provider.clone(),
            GradingConfig {
                retry: RetryPolicy::none(),
                ..Default::default()
            },
        )),
    );
    (controller, provider)
}

async fn answer_all(controller: &mut AssessmentController) {
    for answer in ["A waggle dance", "It shows the direction", "They would get lost"] {
        controller.submit_answer(answer).await.unwrap();
    }
}

#[tokio::test]
async fn full_assessment_reaches_results() {
    let provider = MockProvider::default()
        .on_prompt("Generate", QUESTIONS)
        .on_prompt(
            "What do bees perform",
            r#"{"score": 9, "feedback": "Exactly right.", "evidenceFound": true}"#,
        )
        .on_prompt("Why does the angle", r#"{"score": 6.6}"#)
        .on_prompt("sun were hidden", r#"{"score": 3}"#);
    let (mut controller, _) = controller(provider);

    controller.start().await.unwrap();
    let state = controller.state();
    assert_eq!(state.phase(), Phase::AwaitingAnswer);
    assert_eq!(state.passage().unwrap().id, "honeybee-dance");
    let active = state.active_question().unwrap();
    assert_eq!((active.number, active.total), (1, 3));
    assert_eq!(active.tier, QuestionTier::Recall);

    answer_all(&mut controller).await;

    let state = controller.state();
    assert_eq!(state.phase(), Phase::Results);
    assert_eq!(state.progress_percent(), 100);

    let result = controller.result().unwrap();
    assert_eq!(result.total_score, 19);
    assert_eq!(result.max_possible_score, 30);
    assert_eq!(result.percentage, 63);
    let scores: Vec<u32> = result.detailed_grades.iter().map(|g| g.score).collect();
    assert_eq!(scores, vec![9, 7, 3]);
    assert_eq!(result.answers[2].answer, "They would get lost");
}

#[tokio::test]
async fn one_failed_evaluation_scores_zero() {
    let provider = MockProvider::default()
        .on_prompt("Generate", QUESTIONS)
        .fail_on("Why does the angle", MockFailure::Status(500))
        .on_prompt("Question", r#"{"score": 10}"#);
    let (mut controller, _) = controller(provider);

    controller.start().await.unwrap();
    answer_all(&mut controller).await;

    let result = controller.result().unwrap();
    assert_eq!(result.total_score, 20);
    assert_eq!(result.percentage, 67);
    assert_eq!(result.detailed_grades[1].score, 0);
}

#[tokio::test]
async fn empty_answer_is_rejected_without_advancing() {
    let provider = MockProvider::default().on_prompt("Generate", QUESTIONS);
    let (mut controller, provider) = controller(provider);

    controller.start().await.unwrap();
    let calls = provider.call_count();

    let err = controller.submit_answer("   ").await.unwrap_err();
    assert!(matches!(err, SubmitError::EmptyAnswer));
    assert_eq!(controller.state().active_question().unwrap().number, 1);
    assert_eq!(provider.call_count(), calls);
}

#[tokio::test]
async fn unreachable_grading_keeps_answers_for_retry() {
    let provider = MockProvider::default()
        .on_prompt("Generate", QUESTIONS)
        .fail_by_default(MockFailure::Network);
    let (mut controller, _) = controller(provider);

    controller.start().await.unwrap();
    answer_all(&mut controller).await;

    let state = controller.state();
    assert_eq!(state.phase(), Phase::AwaitingAnswer);
    assert!(state.awaiting_regrade());
    assert_eq!(state.answers().len(), 3);
    assert!(state.last_error().is_some());
    assert!(controller.result().is_none());
}

#[tokio::test]
async fn reset_moves_to_the_next_passage() {
    let provider = MockProvider::default()
        .on_prompt("Generate", QUESTIONS)
        .on_prompt("Question", r#"{"score": 5}"#);
    let (mut controller, _) = controller(provider);

    controller.start().await.unwrap();
    answer_all(&mut controller).await;
    let first: AssessmentResult = controller.result().unwrap().clone();

    controller.reset().await.unwrap();
    let state = controller.state();
    assert_eq!(state.phase(), Phase::AwaitingAnswer);
    assert!(state.answers().is_empty());
    assert_ne!(state.passage().unwrap().id, first.passage_id);
    assert!(controller.result().is_none());
}

#[tokio::test]
async fn malformed_questions_stay_loading() {
    let provider = MockProvider::with_fixed_response("not json at all");
    let (mut controller, _) = controller(provider);

    controller.start().await.unwrap();
    let state = controller.state();
    assert_eq!(state.phase(), Phase::Loading);
    assert!(state.last_error().is_some());
    assert!(matches!(
        controller.submit_answer("anything").await,
        Err(SubmitError::NoActiveSession)
    ));
}
