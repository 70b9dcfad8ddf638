//! HTML result card generator.
//!
//! Produces a self-contained HTML file with all CSS inlined.

use anyhow::{Context, Result};
use std::path::Path;

use readcheck_core::model::{
    AssessmentResult, Grade, PerformanceBand, QuestionTier, MAX_SCORE_PER_QUESTION,
};

/// Escape a string for safe HTML insertion.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

fn band_color(band: PerformanceBand) -> &'static str {
    match band {
        PerformanceBand::Excellent | PerformanceBand::Strong => "#22c55e",
        PerformanceBand::Good | PerformanceBand::Developing => "#eab308",
        PerformanceBand::KeepPracticing => "#ef4444",
    }
}

fn score_color(score: u32) -> &'static str {
    match score {
        8.. => "#22c55e",
        5..=7 => "#eab308",
        _ => "#ef4444",
    }
}

/// Generate an HTML result card for one assessment.
pub fn generate_html(result: &AssessmentResult) -> String {
    let mut html = String::new();
    let band = result.band();

    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    html.push_str(&format!(
        "<title>readcheck results: {}</title>\n",
        html_escape(&result.passage_title)
    ));
    html.push_str("<style>\n");
    html.push_str(CSS);
    html.push_str("</style>\n");
    html.push_str("</head>\n<body>\n");

    // Header
    html.push_str("<header>\n");
    html.push_str("<h1>Reading check results</h1>\n");
    html.push_str(&format!(
        "<p class=\"meta\">Passage: <strong>{}</strong> | {} questions | {}</p>\n",
        html_escape(&result.passage_title),
        result.total_questions,
        result.completed_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    html.push_str("</header>\n");

    // Overall score
    html.push_str("<section class=\"overall\">\n");
    html.push_str(&score_ring(result.percentage, band_color(band)));
    html.push_str(&format!(
        "<div><h2>{}</h2>\n<p class=\"total\">{} / {} points</p>\n<p>{}</p></div>\n",
        band.headline(),
        result.total_score,
        result.max_possible_score,
        band.message()
    ));
    html.push_str("</section>\n");

    // Per-question breakdown
    html.push_str("<section class=\"questions\">\n");
    html.push_str("<h2>Question by question</h2>\n");
    for answer in &result.answers {
        let number = answer.question_number;
        let tier = QuestionTier::for_position(number.saturating_sub(1) as usize);
        let grade = result
            .grade_for(number)
            .cloned()
            .unwrap_or_else(|| Grade::zero(number));

        html.push_str("<article class=\"card\">\n");
        html.push_str(&format!(
            "<h3><span class=\"tier\">{}</span> Question {}</h3>\n",
            tier.label(),
            number
        ));
        html.push_str(&format!(
            "<p class=\"prompt\">{}</p>\n",
            html_escape(&answer.question)
        ));
        html.push_str(&format!(
            "<blockquote>{}</blockquote>\n",
            html_escape(&answer.answer)
        ));
        html.push_str(&score_bar(grade.score));
        html.push_str(&feedback_list(&grade));
        html.push_str("</article>\n");
    }
    html.push_str("</section>\n");

    // Raw JSON
    html.push_str("<section class=\"raw-data\">\n");
    html.push_str("<details>\n<summary>Raw JSON Data</summary>\n");
    html.push_str("<pre><code>");
    html.push_str(&html_escape(
        &serde_json::to_string_pretty(result).unwrap_or_default(),
    ));
    html.push_str("</code></pre>\n");
    html.push_str("</details>\n</section>\n");

    html.push_str("</body>\n</html>");
    html
}

/// Write an HTML result card to a file.
pub fn write_html_report(result: &AssessmentResult, path: &Path) -> Result<()> {
    let html = generate_html(result);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, html)
        .with_context(|| format!("failed to write HTML report to {}", path.display()))?;
    Ok(())
}

fn score_ring(percentage: u32, color: &str) -> String {
    let radius = 54.0_f64;
    let circumference = 2.0 * std::f64::consts::PI * radius;
    let filled = circumference * percentage.min(100) as f64 / 100.0;

    format!(
        "<svg width=\"140\" height=\"140\" viewBox=\"0 0 140 140\" xmlns=\"http://www.w3.org/2000/svg\">\n\
  <circle cx=\"70\" cy=\"70\" r=\"{radius}\" fill=\"none\" stroke=\"var(--border)\" stroke-width=\"12\"/>\n\
  <circle cx=\"70\" cy=\"70\" r=\"{radius}\" fill=\"none\" stroke=\"{color}\" stroke-width=\"12\" \
stroke-dasharray=\"{filled:.1} {circumference:.1}\" transform=\"rotate(-90 70 70)\" stroke-linecap=\"round\"/>\n\
  <text x=\"70\" y=\"70\" font-size=\"28\" font-weight=\"bold\" fill=\"currentColor\" text-anchor=\"middle\" dominant-baseline=\"middle\">{percentage}%</text>\n\
</svg>\n"
    )
}

fn score_bar(score: u32) -> String {
    let width = score.min(MAX_SCORE_PER_QUESTION) * 100 / MAX_SCORE_PER_QUESTION;
    format!(
        "<div class=\"bar\"><div style=\"width: {width}%; background: {}\"></div></div>\n\
<p class=\"score\">{score} / {MAX_SCORE_PER_QUESTION}</p>\n",
        score_color(score)
    )
}

fn feedback_list(grade: &Grade) -> String {
    if !grade.has_feedback() && grade.evidence_found.is_none() {
        return "<p class=\"muted\">No feedback available for this answer.</p>\n".to_string();
    }

    let mut out = String::from("<dl>\n");
    let entries = [
        ("What went well", &grade.feedback),
        ("What was missed", &grade.what_was_bad),
        ("How to improve", &grade.how_to_improve),
    ];
    for (label, text) in entries {
        if let Some(text) = text {
            out.push_str(&format!(
                "<dt>{label}</dt><dd>{}</dd>\n",
                html_escape(text)
            ));
        }
    }
    if let Some(evidence) = grade.evidence_found {
        let (class, text) = if evidence {
            ("pass", "Used evidence from the passage")
        } else {
            ("fail", "No evidence from the passage")
        };
        out.push_str(&format!(
            "<dt>Evidence</dt><dd><span class=\"badge {class}\">{text}</span></dd>\n"
        ));
    }
    out.push_str("</dl>\n");
    out
}

const CSS: &str = r#"
:root { --bg: #fff; --fg: #1a1a1a; --border: #e5e7eb; --pass: #dcfce7; --fail: #fde2e2; }
@media (prefers-color-scheme: dark) {
  :root { --bg: #111827; --fg: #f9fafb; --border: #374151; --pass: #064e3b; --fail: #7f1d1d; }
}
body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif; margin: 0 auto; max-width: 48rem; padding: 2rem; background: var(--bg); color: var(--fg); }
h1, h2 { margin-top: 2rem; }
.meta, .muted { color: #6b7280; }
.overall { display: flex; align-items: center; gap: 2rem; }
.total { font-size: 1.25rem; font-weight: bold; }
.card { border: 1px solid var(--border); border-radius: 8px; padding: 1rem 1.5rem; margin: 1rem 0; }
.tier { font-size: 0.8rem; text-transform: uppercase; letter-spacing: 0.05em; color: #6b7280; margin-right: 0.5rem; }
.prompt { font-weight: 600; }
blockquote { margin: 0.5rem 0; padding-left: 1rem; border-left: 4px solid var(--border); }
.bar { height: 10px; background: var(--border); border-radius: 5px; overflow: hidden; margin-top: 1rem; }
.bar > div { height: 100%; }
.score { font-weight: bold; margin: 0.25rem 0 1rem; }
dt { font-weight: bold; margin-top: 0.5rem; }
dd { margin-left: 0; }
.badge { padding: 0.1rem 0.5rem; border-radius: 4px; }
.pass { background: var(--pass); }
.fail { background: var(--fail); }
pre { overflow-x: auto; padding: 1rem; background: var(--border); border-radius: 8px; }
code { font-family: 'JetBrains Mono', 'Fira Code', monospace; font-size: 0.85rem; }
details { margin: 1rem 0; }
summary { cursor: pointer; font-weight: bold; }
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use readcheck_core::model::Answer;

    fn make_test_result() -> AssessmentResult {
        AssessmentResult {
            session_id: uuid::Uuid::nil(),
            completed_at: chrono::Utc::now(),
            passage_id: "honeybee-dance".into(),
            passage_title: "The Honeybee's Dance".into(),
            total_score: 18,
            max_possible_score: 30,
            percentage: 60,
            total_questions: 3,
            detailed_grades: vec![
                Grade {
                    question_number: 1,
                    score: 8,
                    feedback: Some("You found the detail.".into()),
                    what_was_bad: None,
                    how_to_improve: Some("Quote the passage.".into()),
                    evidence_found: Some(true),
                },
                Grade::zero(2),
                Grade {
                    evidence_found: Some(false),
                    ..Grade::zero(3)
                },
            ],
            answers: (1..=3)
                .map(|n| Answer {
                    question_number: n,
                    question: format!("Question <{n}>?"),
                    answer: format!("answer {n} & more"),
                })
                .collect(),
        }
    }

    #[test]
    fn html_report_contains_required_elements() {
        let html = generate_html(&make_test_result());

        assert!(html.contains("<html"));
        assert!(html.contains("</html>"));
        assert!(html.contains("The Honeybee&#x27;s Dance"));
        assert!(html.contains("18 / 30 points"));
        assert!(html.contains("60%"));
        assert!(html.contains(PerformanceBand::Developing.headline()));
        assert!(html.contains("Think Deeper"));
        assert!(html.contains("You found the detail."));
        assert!(html.contains("No feedback available"));
        assert!(html.contains("No evidence from the passage"));
    }

    #[test]
    fn user_text_is_escaped() {
        let html = generate_html(&make_test_result());
        assert!(html.contains("Question &lt;1&gt;?"));
        assert!(html.contains("answer 1 &amp; more"));
        assert!(!html.contains("Question <1>?"));
    }

    #[test]
    fn html_report_write_to_file() {
        let result = make_test_result();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("result.html");

        write_html_report(&result, &path).unwrap();
        assert!(path.exists());

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("<html"));
    }
}
