use std::path::PathBuf;

pub const API_KEY_VAR: &str = "OPENAI_API_KEY";
pub const BASE_URL_VAR: &str = "OPENAI_BASE_URL";
pub const LOG_FILE_VAR: &str = "CLINICAL_CHAT_LOG";

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const CHAT_MODEL: &str = "gpt-3.5-turbo";

pub const SYSTEM_PROMPT: &str = "You are a helpful and knowledgeable Clinical Assistant. \
Provide clear, accurate medical information, help interpret symptoms, and suggest next steps. \
Always remind users to consult a licensed doctor for diagnosis or treatment.";

/// Process-wide settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub system_prompt: String,
    pub log_file: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        Self {
            api_key: non_empty(API_KEY_VAR),
            base_url: non_empty(BASE_URL_VAR)
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: CHAT_MODEL.to_string(),
            system_prompt: SYSTEM_PROMPT.to_string(),
            log_file: non_empty(LOG_FILE_VAR).map(PathBuf::from),
        }
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }
}
