// Defaults loaded from the environment (or a .env file picked up by dotenvy in main).
// CLI flags override these when building a RequesterConfig.

use std::env;

lazy_static::lazy_static! {
    pub static ref API_URL: String = env::var("BOOKBOT_API_URL").unwrap_or_else(|_| "https://api.anthropic.com".to_string());
    pub static ref API_KEY: String = env::var("ANTHROPIC_API_KEY").unwrap_or_default();
    pub static ref ANTHROPIC_VERSION: String = env::var("BOOKBOT_ANTHROPIC_VERSION").unwrap_or_else(|_| "2023-06-01".to_string());
    pub static ref MODEL: String = env::var("BOOKBOT_MODEL").unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string());
    pub static ref MAX_TOKENS: u32 = parse_env("BOOKBOT_MAX_TOKENS", 1000);
    // Only the first N records go into the prompt to stay inside the token budget.
    pub static ref RECORD_LIMIT: usize = parse_env("BOOKBOT_RECORD_LIMIT", 50);
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

pub const GREETING: &str = "Hi! I'm your personal book recommendation assistant. Upload your reading list CSV file, and I'll give you personalized book suggestions based on your reading history and ratings. What kind of book are you in the mood for today?";

pub const UPLOAD_FAILED: &str =
    "I had trouble reading your file. Please make sure it's a CSV export from Google Sheets.";

pub const NO_DATA_LOADED: &str =
    "Please upload your book data first so I can give you personalized recommendations!";

pub const REQUEST_FALLBACK: &str = "I'm having trouble connecting right now. Try looking for books similar to your highest-rated ones!";

pub fn upload_succeeded(book_count: usize) -> String {
    format!(
        "Great! I've loaded {} books from your reading list. Now I'm ready to give you personalized recommendations! What kind of book are you looking for?",
        book_count
    )
}
