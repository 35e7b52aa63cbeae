//! Clarifications document model, parser, serializer and evaluator.
//!
//! The same Markdown grammar is used for the clarifications and decisions
//! artifacts. Humans edit these files between pipeline runs, so parsing
//! is lossless and serialization only rewrites what callers changed.

pub mod model;
pub mod parser;
pub mod render;
pub mod sufficiency;

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::{AppError, Result};

pub use model::{Choice, ClarificationsDocument, Question, Section, SectionBlock};
pub use parser::parse;
pub use render::render;
pub use sufficiency::{auto_fill, SufficiencyEvaluator, SufficiencyReport, Verdict};

impl ClarificationsDocument {
    /// Read and parse a document from disk.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the file cannot be read.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|err| AppError::Io(format!("failed to read {}: {err}", path.display())))?;
        Ok(parse(&raw))
    }

    /// Read and parse a document if it exists.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the file exists but cannot be read.
    pub fn load_if_exists(path: &Path) -> Result<Option<Self>> {
        if path.is_file() {
            Self::load(path).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Serialize the document back to text.
    #[must_use]
    pub fn to_text(&self) -> String {
        render(self)
    }

    /// Write the document atomically: a temp file in the same directory is
    /// persisted over `path`, so readers never observe a partial write.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` on directory creation, write, or rename failure.
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| AppError::Io(format!("{} has no parent directory", path.display())))?;
        std::fs::create_dir_all(parent).map_err(|err| {
            AppError::Io(format!(
                "failed to create parent directories for {}: {err}",
                path.display()
            ))
        })?;

        let mut tmp = NamedTempFile::new_in(parent)
            .map_err(|err| AppError::Io(format!("failed to create temporary file: {err}")))?;
        tmp.write_all(self.to_text().as_bytes())
            .map_err(|err| AppError::Io(format!("failed to write temporary file: {err}")))?;
        tmp.persist(path).map_err(|err| {
            AppError::Io(format!("failed to persist {}: {err}", path.display()))
        })?;

        Ok(())
    }
}
