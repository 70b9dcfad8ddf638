//! The `readcheck validate` command.

use std::path::PathBuf;

use anyhow::Result;

use readcheck_core::passages::{load_passage_directory, load_passage_file, validate_passage_library};

pub fn execute(passages_path: PathBuf) -> Result<()> {
    let passages = if passages_path.is_dir() {
        load_passage_directory(&passages_path)?
    } else {
        load_passage_file(&passages_path)?
    };

    println!(
        "Library: {} ({} passages)",
        passages_path.display(),
        passages.len()
    );
    for passage in &passages {
        println!(
            "  {} — {} ({} sections)",
            passage.id,
            passage.title,
            passage.sections().len()
        );
    }

    let warnings = validate_passage_library(&passages);
    for w in &warnings {
        let prefix = w
            .passage_id
            .as_ref()
            .map(|id| format!("  [{id}]"))
            .unwrap_or_else(|| "  ".to_string());
        println!("{prefix} WARNING: {}", w.message);
    }

    if warnings.is_empty() {
        println!("All passages valid.");
    } else {
        println!("\n{} warning(s) found.", warnings.len());
    }

    Ok(())
}
