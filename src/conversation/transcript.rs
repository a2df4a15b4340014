//! Plain-text transcript export.

use crate::conversation::state::ConversationTurn;
use crate::error::Result;
use std::io::Write;
use std::path::Path;

/// Turn texts joined by single spaces.
pub fn transcript_text(turns: &[ConversationTurn]) -> String {
    turns
        .iter()
        .map(|t| t.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Write the transcript as UTF-8 text to `path`.
pub fn write_transcript(path: &Path, turns: &[ConversationTurn]) -> Result<()> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(transcript_text(turns).as_bytes())?;
    tracing::info!(path = %path.display(), turns = turns.len(), "transcript saved");
    Ok(())
}
