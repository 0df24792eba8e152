//! tally-ingest: payment screenshot extraction through a vision model.

pub mod gemini;
pub mod parse;

pub use gemini::{GeminiConfig, GeminiExtractor};
pub use parse::{extract_json, parse_transactions};
