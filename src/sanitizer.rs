use crate::error::{ImageError, Result};

pub const DEFAULT_MAX_PROMPT_CHARS: usize = 32_000;

/// Validates prompts before they leave the process.
///
/// Normalization is limited to trimming and line-ending cleanup so the text
/// that reaches the API is what the caller wrote.
#[derive(Debug, Clone)]
pub struct PromptSanitizer {
    max_chars: usize,
    blocked_terms: Vec<String>,
}

impl Default for PromptSanitizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PROMPT_CHARS, Vec::new())
    }
}

impl PromptSanitizer {
    pub fn new(max_chars: usize, blocked_terms: Vec<String>) -> Self {
        let blocked_terms = blocked_terms
            .into_iter()
            .map(|term| term.trim().to_lowercase())
            .filter(|term| !term.is_empty())
            .collect();
        Self {
            max_chars,
            blocked_terms,
        }
    }

    pub fn sanitize(&self, text: &str) -> Result<String> {
        let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
        let trimmed = normalized.trim();
        if trimmed.is_empty() {
            return Err(ImageError::InvalidPrompt("prompt must not be empty".to_string()));
        }
        let length = trimmed.chars().count();
        if length > self.max_chars {
            return Err(ImageError::InvalidPrompt(format!(
                "prompt is {length} characters, maximum is {}",
                self.max_chars
            )));
        }
        if trimmed
            .chars()
            .any(|c| c.is_control() && c != '\n' && c != '\t')
        {
            return Err(ImageError::InvalidPrompt(
                "prompt contains control characters".to_string(),
            ));
        }
        let lowered = trimmed.to_lowercase();
        if let Some(term) = self.blocked_terms.iter().find(|term| lowered.contains(term.as_str())) {
            return Err(ImageError::InvalidPrompt(format!(
                "prompt contains blocked term '{term}'"
            )));
        }
        Ok(trimmed.to_string())
    }
}
