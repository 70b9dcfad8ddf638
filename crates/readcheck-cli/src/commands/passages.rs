//! The `readcheck passages` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use readcheck_core::passages::{load_library, PassageLibrary};
use readcheck_providers::config::load_config_from;

pub fn execute(library: Option<PathBuf>, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;

    let (label, library) = match library.or(config.passages) {
        Some(path) => (path.display().to_string(), load_library(&path)?),
        None => ("bundled".to_string(), PassageLibrary::bundled()?),
    };

    if library.is_empty() {
        println!("No passages found in {label} library.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Title", "Sections", "Characters"]);
    for passage in library.passages() {
        table.add_row(vec![
            Cell::new(&passage.id),
            Cell::new(&passage.title),
            Cell::new(passage.sections().len()),
            Cell::new(passage.content.chars().count()),
        ]);
    }

    println!("Passages ({label} library, {} total):", library.len());
    println!("{table}");
    Ok(())
}
