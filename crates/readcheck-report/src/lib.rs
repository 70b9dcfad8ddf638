//! readcheck-report: Result card rendering.
//!
//! Turns a finished `AssessmentResult` into a self-contained HTML page.
//! JSON output lives on the result type itself (`AssessmentResult::save_json`).

pub mod html;

pub use html::{generate_html, write_html_report};
