//! Interactive editing through the user's editor.

use std::io::Write;
use std::process::Command;

use tracing::debug;

use crate::error::{EditorError, Result};

/// Lets a human edit a document.
pub trait Editor {
    /// Return the edited text, trimmed.
    ///
    /// # Errors
    ///
    /// `EditorError::NoEditor` when no editor is configured,
    /// `EditorError::Empty` when the result is blank, and
    /// `EditorError::Unchanged` when it equals `content`.
    fn edit(&self, content: &str) -> Result<String>;
}

/// Runs `$VISUAL` or `$EDITOR` on a temporary file.
#[derive(Debug, Clone)]
pub struct SystemEditor {
    command: Option<String>,
}

impl SystemEditor {
    pub fn new(command: Option<String>) -> Self {
        Self {
            command: command.filter(|c| !c.trim().is_empty()),
        }
    }

    pub fn from_env() -> Self {
        let command = std::env::var("VISUAL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| std::env::var("EDITOR").ok());
        Self::new(command)
    }
}

impl Editor for SystemEditor {
    fn edit(&self, content: &str) -> Result<String> {
        let command = self.command.as_deref().ok_or(EditorError::NoEditor)?;
        let mut parts = command.split_whitespace();
        let program = parts.next().ok_or(EditorError::NoEditor)?;
        let program_path =
            which::which(program).map_err(|_| EditorError::NotFound(program.to_string()))?;

        let mut file = tempfile::Builder::new()
            .prefix("strongbox-")
            .suffix(".json")
            .tempfile()?;
        file.write_all(content.as_bytes())?;
        file.flush()?;

        debug!(editor = %program_path.display(), path = %file.path().display(), "launching editor");
        let status = Command::new(&program_path)
            .args(parts)
            .arg(file.path())
            .status()?;
        if !status.success() {
            return Err(EditorError::Failed(status).into());
        }

        let edited = std::fs::read_to_string(file.path())?;
        let edited = edited.trim();
        if edited.is_empty() {
            return Err(EditorError::Empty.into());
        }
        if edited == content.trim() {
            return Err(EditorError::Unchanged.into());
        }
        Ok(edited.to_string())
    }
}
