//! The `readcheck take` command.

use std::fmt::Display;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use readcheck_core::aggregator::{GradingAggregator, GradingReporter, ScoreSummary};
use readcheck_core::controller::AssessmentController;
use readcheck_core::generation::QuestionGenerator;
use readcheck_core::grading::{AnswerGrader, GradeOutcome, GradeStatus};
use readcheck_core::model::{AssessmentResult, Question, MAX_SCORE_PER_QUESTION};
use readcheck_core::passages::{
    custom_passage, load_library, PassageLibrary, PassageSource, StaticPassage,
};
use readcheck_core::session::Phase;
use readcheck_providers::config::{load_config_from, ReadcheckConfig};
use readcheck_report::html::write_html_report;

const FORMATS: [&str; 2] = ["json", "html"];

/// Console progress reporter.
struct ConsoleReporter;

impl GradingReporter for ConsoleReporter {
    fn on_grading_start(&self, total: usize) {
        eprintln!("  Grading {total} answers...");
    }

    fn on_grade_complete(&self, outcome: &GradeOutcome) {
        let number = outcome.grade.question_number;
        match &outcome.status {
            GradeStatus::Scored => eprintln!(
                "  Done: question {number} ({}/{MAX_SCORE_PER_QUESTION})",
                outcome.grade.score
            ),
            GradeStatus::EvaluatorFailed { kind, reason } => {
                eprintln!("  ERROR: question {number} ({kind}): {reason}")
            }
        }
    }

    fn on_grading_complete(&self, summary: &ScoreSummary, elapsed: Duration) {
        eprintln!(
            "\nComplete: {}/{} points ({:.1}s)",
            summary.total_score,
            summary.max_possible_score,
            elapsed.as_secs_f64()
        );
    }
}

/// Line-oriented terminal I/O.
pub(crate) struct Console<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub(crate) fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn say(&mut self, text: impl Display) -> Result<()> {
        writeln!(self.output, "{text}")?;
        Ok(())
    }

    /// Prompt and read one line. `None` when input is closed.
    fn ask(&mut self, prompt: &str) -> Result<Option<String>> {
        write!(self.output, "{prompt}")?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    fn confirm(&mut self, prompt: &str, default: bool) -> Result<bool> {
        let suffix = if default { "[Y/n]" } else { "[y/N]" };
        let reply = self.ask(&format!("{prompt} {suffix} "))?;
        Ok(match reply.as_deref().map(|r| r.trim().to_lowercase()) {
            Some(r) if r == "y" || r == "yes" => true,
            Some(r) if r == "n" || r == "no" => false,
            Some(_) => default,
            None => false,
        })
    }
}

/// Where and how to save finished results.
pub(crate) struct SaveOptions {
    pub output: Option<PathBuf>,
    pub formats: Vec<String>,
}

#[allow(clippy::too_many_arguments)]
pub async fn execute(
    passage_id: Option<String>,
    passage_file: Option<PathBuf>,
    library: Option<PathBuf>,
    provider: Option<String>,
    model: Option<String>,
    output: Option<PathBuf>,
    save: bool,
    format: String,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let formats = parse_formats(&format)?;
    let config = load_config_from(config_path.as_deref())?;
    let output = output.or_else(|| save.then(|| config.output_dir.clone()));

    let source = passage_source(&config, passage_id, passage_file, library)?;
    let llm = config.provider(provider.as_deref())?;
    tracing::info!(provider = llm.name(), "starting reading check");
    let generator = QuestionGenerator::new(llm.clone(), config.generation_config(model.as_deref()));
    let aggregator = GradingAggregator::new(AnswerGrader::new(
        llm,
        config.grading_config(model.as_deref()),
    ));
    let mut controller = AssessmentController::new(source, generator, aggregator)
        .with_reporter(Arc::new(ConsoleReporter));

    let stdin = std::io::stdin();
    let mut console = Console::new(stdin.lock(), std::io::stdout());
    let save = SaveOptions { output, formats };

    run_sessions(&mut controller, &mut console, &save).await?;
    Ok(())
}

fn parse_formats(format: &str) -> Result<Vec<String>> {
    let formats: Vec<String> = if format == "all" {
        FORMATS.iter().map(|f| f.to_string()).collect()
    } else {
        format.split(',').map(|f| f.trim().to_lowercase()).collect()
    };
    for fmt in &formats {
        anyhow::ensure!(
            FORMATS.contains(&fmt.as_str()),
            "unknown format '{fmt}' (expected json, html or all)"
        );
    }
    Ok(formats)
}

fn passage_source(
    config: &ReadcheckConfig,
    passage_id: Option<String>,
    passage_file: Option<PathBuf>,
    library: Option<PathBuf>,
) -> Result<Arc<dyn PassageSource>> {
    if let Some(path) = passage_file {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read passage: {}", path.display()))?;
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().replace(['-', '_'], " "))
            .unwrap_or_else(|| "Custom passage".to_string());
        let passage = custom_passage(&title, &text)
            .with_context(|| format!("unusable passage: {}", path.display()))?;
        return Ok(Arc::new(StaticPassage(passage)));
    }

    let library = match library.or_else(|| config.passages.clone()) {
        Some(path) => load_library(&path)?,
        None => PassageLibrary::bundled()?,
    };
    anyhow::ensure!(!library.is_empty(), "passage library is empty");
    let library = match passage_id {
        Some(id) => library.start_at(&id)?,
        None => library,
    };
    Ok(Arc::new(library))
}

/// Run assessments until the student stops. Returns the finished results.
pub(crate) async fn run_sessions<R: BufRead, W: Write>(
    controller: &mut AssessmentController,
    console: &mut Console<R, W>,
    save: &SaveOptions,
) -> Result<Vec<AssessmentResult>> {
    let mut finished = Vec::new();

    console.say("Loading passage and questions...")?;
    controller.start().await?;

    loop {
        if !wait_for_questions(controller, console).await? {
            break;
        }
        show_passage(controller, console)?;

        let Some(result) = answer_questions(controller, console).await? else {
            break;
        };

        print_results(console, &result, controller.state().questions())?;
        if let Some(dir) = &save.output {
            for path in save_result(&result, dir, &save.formats)? {
                console.say(format!("Saved: {}", path.display()))?;
            }
        }
        finished.push(result);

        if !console.confirm("\nRead another passage?", false)? {
            break;
        }
        console.say("Loading passage and questions...")?;
        controller.reset().await?;
    }

    Ok(finished)
}

/// Retry loading until questions arrive. `false` when the student gives up.
async fn wait_for_questions<R: BufRead, W: Write>(
    controller: &mut AssessmentController,
    console: &mut Console<R, W>,
) -> Result<bool> {
    while controller.state().phase() == Phase::Loading {
        let error = controller
            .state()
            .last_error()
            .unwrap_or("no questions were generated")
            .to_string();
        console.say(format!("Could not prepare this reading check: {error}"))?;
        if !console.confirm("Try again?", true)? {
            anyhow::bail!("could not load an assessment: {error}");
        }
        controller.start().await?;
    }
    Ok(controller.state().phase() == Phase::AwaitingAnswer)
}

fn show_passage<R: BufRead, W: Write>(
    controller: &AssessmentController,
    console: &mut Console<R, W>,
) -> Result<()> {
    let Some(passage) = controller.state().passage() else {
        return Ok(());
    };
    let sections = passage.sections();
    console.say(format!("\n=== {} ===", passage.title))?;
    for (i, section) in sections.iter().enumerate() {
        console.say(format!("\n[{}/{}]\n{section}", i + 1, sections.len()))?;
        let prompt = if i + 1 < sections.len() {
            "\nPress Enter to keep reading..."
        } else {
            "\nPress Enter when you're ready for the questions..."
        };
        if console.ask(prompt)?.is_none() {
            break;
        }
    }
    Ok(())
}

/// Collect answers until grading produces a result. `None` when input
/// closes or the student abandons a failed grading.
async fn answer_questions<R: BufRead, W: Write>(
    controller: &mut AssessmentController,
    console: &mut Console<R, W>,
) -> Result<Option<AssessmentResult>> {
    loop {
        match controller.state().phase() {
            Phase::Results => return Ok(controller.result().cloned()),
            Phase::AwaitingAnswer if controller.state().awaiting_regrade() => {
                let error = controller
                    .state()
                    .last_error()
                    .unwrap_or("grading failed")
                    .to_string();
                console.say(format!("\nCould not grade your answers: {error}"))?;
                console.say("Your answers are saved.")?;
                if !console.confirm("Try grading again?", true)? {
                    return Ok(None);
                }
                console.say("Grading your answers...")?;
                controller.retry_grading().await?;
            }
            Phase::AwaitingAnswer => {
                let Some(text) = ask_active_question(controller, console)? else {
                    return Ok(None);
                };
                let last = controller
                    .state()
                    .active_question()
                    .is_some_and(|q| q.number as usize == q.total);
                if last {
                    console.say("Grading your answers...")?;
                }
                controller.submit_answer(&text).await?;
            }
            Phase::Loading | Phase::Grading => return Ok(None),
        }
    }
}

/// Prompt until a non-empty answer is given. Handles `hint` requests.
fn ask_active_question<R: BufRead, W: Write>(
    controller: &AssessmentController,
    console: &mut Console<R, W>,
) -> Result<Option<String>> {
    let state = controller.state();
    let Some(question) = state.active_question() else {
        return Ok(None);
    };

    console.say(format!(
        "\nQuestion {} of {} [{}] ({}% complete)",
        question.number,
        question.total,
        question.tier.label(),
        state.progress_percent()
    ))?;
    console.say(question.prompt)?;
    if question.hint.is_some() {
        console.say("(type 'hint' for a hint)")?;
    }

    loop {
        let Some(line) = console.ask("> ")? else {
            return Ok(None);
        };
        let text = line.trim();
        if text.eq_ignore_ascii_case("hint") {
            match question.hint {
                Some(hint) => console.say(format!("Hint: {hint}"))?,
                None => console.say("No hint for this question.")?,
            }
            continue;
        }
        if text.is_empty() {
            console.say("Please write an answer before continuing.")?;
            continue;
        }
        return Ok(Some(text.to_string()));
    }
}

fn print_results<R: BufRead, W: Write>(
    console: &mut Console<R, W>,
    result: &AssessmentResult,
    questions: &[Question],
) -> Result<()> {
    use comfy_table::{Cell, Table};

    let band = result.band();
    console.say(format!(
        "\n{} {}% ({} / {} points)",
        band.headline(),
        result.percentage,
        result.total_score,
        result.max_possible_score
    ))?;
    console.say(band.message())?;

    let mut table = Table::new();
    table.set_header(vec!["#", "Type", "Score", "Evidence"]);
    for answer in &result.answers {
        let number = answer.question_number;
        let tier = questions
            .iter()
            .find(|q| q.id == number)
            .map(|q| q.tier.label())
            .unwrap_or("-");
        let grade = result.grade_for(number);
        let score = grade.map(|g| g.score).unwrap_or(0);
        let evidence = match grade.and_then(|g| g.evidence_found) {
            Some(true) => "yes",
            Some(false) => "no",
            None => "-",
        };
        table.add_row(vec![
            Cell::new(number),
            Cell::new(tier),
            Cell::new(format!("{score}/{MAX_SCORE_PER_QUESTION}")),
            Cell::new(evidence),
        ]);
    }
    console.say(format!("\n{table}"))?;

    for answer in &result.answers {
        console.say(format!(
            "\nQuestion {}: {}",
            answer.question_number, answer.question
        ))?;
        console.say(format!("  Your answer: {}", answer.answer))?;
        match result.grade_for(answer.question_number) {
            Some(grade) if grade.has_feedback() => {
                if let Some(text) = &grade.feedback {
                    console.say(format!("  Went well: {text}"))?;
                }
                if let Some(text) = &grade.what_was_bad {
                    console.say(format!("  Missed: {text}"))?;
                }
                if let Some(text) = &grade.how_to_improve {
                    console.say(format!("  Try next time: {text}"))?;
                }
            }
            _ => console.say("  No feedback available.")?,
        }
    }
    Ok(())
}

fn save_result(result: &AssessmentResult, dir: &Path, formats: &[String]) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output directory: {}", dir.display()))?;
    let timestamp = result.completed_at.format("%Y-%m-%dT%H%M%S");

    let mut saved = Vec::new();
    for fmt in formats {
        let path = dir.join(format!("result-{}-{timestamp}.{fmt}", result.passage_id));
        match fmt.as_str() {
            "json" => result.save_json(&path)?,
            "html" => write_html_report(result, &path)?,
            _ => continue,
        }
        tracing::debug!(path = %path.display(), "saved result");
        saved.push(path);
    }
    Ok(saved)
}
