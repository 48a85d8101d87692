use std::fs;
use std::path::Path;

/// Used when the prompt file is missing, unreadable, or blank.
pub const FALLBACK_SYSTEM_PROMPT: &str =
    "You are a CLI Command Agent that helps execute system commands and answer questions.";

/// Read the system prompt handed to the model program.
pub fn load_system_prompt(path: &Path) -> String {
    match fs::read_to_string(path) {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => {
            log::warn!("system prompt {} is empty; using the built-in prompt", path.display());
            FALLBACK_SYSTEM_PROMPT.to_string()
        }
        Err(e) => {
            log::debug!("no system prompt at {}: {e}", path.display());
            FALLBACK_SYSTEM_PROMPT.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("SYSTEM-PROMPT.md");
        fs::write(&path, "\nAnswer tersely.\n").unwrap();
        assert_eq!(load_system_prompt(&path), "Answer tersely.");
    }

    #[test]
    fn missing_or_blank_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("SYSTEM-PROMPT.md");
        assert_eq!(load_system_prompt(&path), FALLBACK_SYSTEM_PROMPT);
        fs::write(&path, "  \n").unwrap();
        assert_eq!(load_system_prompt(&path), FALLBACK_SYSTEM_PROMPT);
    }
}
