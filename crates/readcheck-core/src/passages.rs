//! Passage library loading and the passage source seam.
//!
//! Loads passages from JSON or TOML files and directories, and validates them.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::error::PassageError;
use crate::model::Passage;

/// Minimum length of a user-supplied passage, in characters after trimming.
pub const MIN_PASSAGE_CHARS: usize = 100;

/// The passages bundled with readcheck.
pub const DEFAULT_LIBRARY_JSON: &str = include_str!("../data/passages.json");

/// Where the state machine obtains its passage.
#[async_trait]
pub trait PassageSource: Send + Sync {
    async fn fetch(&self) -> Result<Passage, PassageError>;
}

/// A source that always returns the same passage.
pub struct StaticPassage(pub Passage);

#[async_trait]
impl PassageSource for StaticPassage {
    async fn fetch(&self) -> Result<Passage, PassageError> {
        Ok(self.0.clone())
    }
}

/// An in-memory collection of passages.
///
/// As a [`PassageSource`] it rotates through its passages, so consecutive
/// sessions see different texts.
pub struct PassageLibrary {
    passages: Vec<Passage>,
    cursor: AtomicUsize,
}

impl PassageLibrary {
    pub fn new(passages: Vec<Passage>) -> Self {
        Self {
            passages,
            cursor: AtomicUsize::new(0),
        }
    }

    /// The library bundled with the binary.
    pub fn bundled() -> Result<Self> {
        let passages = parse_passages_json(DEFAULT_LIBRARY_JSON)
            .context("failed to parse bundled passage library")?;
        Ok(Self::new(passages))
    }

    pub fn passages(&self) -> &[Passage] {
        &self.passages
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    /// Start rotation at the passage with `id`.
    pub fn start_at(self, id: &str) -> Result<Self, PassageError> {
        let index = self
            .passages
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| PassageError::NotFound(id.to_string()))?;
        self.cursor.store(index, Ordering::Relaxed);
        Ok(self)
    }
}

#[async_trait]
impl PassageSource for PassageLibrary {
    async fn fetch(&self) -> Result<Passage, PassageError> {
        if self.passages.is_empty() {
            return Err(PassageError::EmptyLibrary);
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.passages.len();
        Ok(self.passages[index].clone())
    }
}

/// Build a passage from user-supplied text.
pub fn custom_passage(title: &str, text: &str) -> Result<Passage, PassageError> {
    let content = text.trim();
    let actual = content.chars().count();
    if actual < MIN_PASSAGE_CHARS {
        return Err(PassageError::TooShort {
            min: MIN_PASSAGE_CHARS,
            actual,
        });
    }
    Ok(Passage {
        id: "custom".to_string(),
        title: title.to_string(),
        content: content.to_string(),
    })
}

// ---------------------------------------------------------------------------
// File formats
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawPassage {
    #[serde(default)]
    id: Option<String>,
    title: String,
    content: String,
}

/// The JSON shapes a passage file may take.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonPassageFile {
    List(Vec<RawPassage>),
    Wrapped { passages: Vec<RawPassage> },
    Single { passage: RawPassage },
    Bare(RawPassage),
}

#[derive(Debug, Deserialize)]
struct TomlPassageFile {
    #[serde(default)]
    passages: Vec<RawPassage>,
}

fn into_passages(raw: Vec<RawPassage>) -> Vec<Passage> {
    raw.into_iter()
        .enumerate()
        .map(|(i, p)| Passage {
            id: p.id.unwrap_or_else(|| format!("passage-{}", i + 1)),
            title: p.title,
            content: p.content,
        })
        .collect()
}

/// Parse a JSON passage file (array, `{passages}`, `{passage}` or bare object).
pub fn parse_passages_json(content: &str) -> Result<Vec<Passage>> {
    let parsed: JsonPassageFile =
        serde_json::from_str(content).context("failed to parse passage JSON")?;
    let raw = match parsed {
        JsonPassageFile::List(list) => list,
        JsonPassageFile::Wrapped { passages } => passages,
        JsonPassageFile::Single { passage } => vec![passage],
        JsonPassageFile::Bare(passage) => vec![passage],
    };
    Ok(into_passages(raw))
}

/// Parse a TOML passage file made of `[[passages]]` tables.
pub fn parse_passages_toml(content: &str) -> Result<Vec<Passage>> {
    let parsed: TomlPassageFile = toml::from_str(content).context("failed to parse passage TOML")?;
    Ok(into_passages(parsed.passages))
}

/// Load a passage file, choosing the format by extension.
pub fn load_passage_file(path: &Path) -> Result<Vec<Passage>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read passage file: {}", path.display()))?;

    let parsed = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => parse_passages_toml(&content),
        Some("json") => parse_passages_json(&content),
        _ => anyhow::bail!("unsupported passage file: {}", path.display()),
    };
    parsed.with_context(|| format!("in {}", path.display()))
}

/// Recursively load all `.json` and `.toml` passage files from a directory.
pub fn load_passage_directory(dir: &Path) -> Result<Vec<Passage>> {
    let mut passages = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.path());

    for entry in entries {
        let path = entry.path();

        if path.is_dir() {
            passages.extend(load_passage_directory(&path)?);
        } else if path
            .extension()
            .is_some_and(|ext| ext == "json" || ext == "toml")
        {
            match load_passage_file(&path) {
                Ok(found) => passages.extend(found),
                Err(e) => {
                    tracing::warn!("skipping {}: {e:#}", path.display());
                }
            }
        }
    }

    Ok(passages)
}

/// Load a library from a file or directory path.
pub fn load_library(path: &Path) -> Result<PassageLibrary> {
    let passages = if path.is_dir() {
        load_passage_directory(path)?
    } else {
        load_passage_file(path)?
    };
    Ok(PassageLibrary::new(passages))
}

/// A warning from passage library validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The passage ID (if applicable).
    pub passage_id: Option<String>,
    /// Warning message.
    pub message: String,
}

/// Validate a set of passages for common issues.
pub fn validate_passage_library(passages: &[Passage]) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    if passages.is_empty() {
        warnings.push(ValidationWarning {
            passage_id: None,
            message: "library contains no passages".into(),
        });
    }

    let mut seen_ids = HashSet::new();
    for passage in passages {
        if !seen_ids.insert(&passage.id) {
            warnings.push(ValidationWarning {
                passage_id: Some(passage.id.clone()),
                message: format!("duplicate passage ID: {}", passage.id),
            });
        }
        if passage.title.trim().is_empty() {
            warnings.push(ValidationWarning {
                passage_id: Some(passage.id.clone()),
                message: "title is empty".into(),
            });
        }
        let len = passage.content.trim().chars().count();
        if len < MIN_PASSAGE_CHARS {
            warnings.push(ValidationWarning {
                passage_id: Some(passage.id.clone()),
                message: format!(
                    "content is {len} characters, shorter than the {MIN_PASSAGE_CHARS} minimum"
                ),
            });
        }
    }

    warnings
}
