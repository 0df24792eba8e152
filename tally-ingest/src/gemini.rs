//! Gemini-backed screenshot extraction.
//!
//! The image is sent inline (base64) with the extraction prompt to
//! `models/{model}:generateContent`; the reply text is parsed by
//! [`crate::parse`].

use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use tally_core::{ExtractionGateway, ImageRef, TransactionRecord};
use tracing::{debug, info};

use crate::parse::parse_transactions;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature: 0.1,
        }
    }
}

pub struct GeminiExtractor {
    config: GeminiConfig,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Prompt sent alongside the screenshot
pub fn extraction_prompt(year: i32) -> String {
    format!(
        "This is a screenshot of payments. Payment merchant name and amount is mentioned.\n\
Return an array of objects in the form:\n\
{{ \"merchantName\": \"\", \"amount\": 0, \"date\": \"\", \"type\": \"\" }}\n\
- \"amount\" should be a number.\n\
- \"date\" should be a string in YYYY-MM-DD format (e.g., \"{year}-06-09\"). Assume the year to be the current year {year}.\n\
- \"type\" is either \"debit\" or \"credit\". If an amount is in green color and marked with '+', it is \"credit\", otherwise \"debit\".\n\
- Keep the order in which transactions appear on the screenshot.\n\
- Ignore failed transactions. Do not count them."
    )
}

impl GeminiExtractor {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    async fn load_image(&self, image: &ImageRef) -> Result<(Vec<u8>, String)> {
        let loc = image.as_str();
        if loc.starts_with("http://") || loc.starts_with("https://") {
            // image URLs can carry credentials; keep them out of errors
            let resp = self
                .client
                .get(loc)
                .send()
                .await
                .map_err(|e| anyhow!("fetch image: {}", e.without_url()))?;
            let status = resp.status();
            if !status.is_success() {
                bail!("failed to fetch image: {status}");
            }
            let mime = resp
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .filter(|v| v.starts_with("image/"))
                .map(str::to_string)
                .unwrap_or_else(|| mime_from_path(loc).to_string());
            let bytes = resp
                .bytes()
                .await
                .map_err(|e| anyhow!("read image body: {}", e.without_url()))?;
            Ok((bytes.to_vec(), mime))
        } else {
            let bytes = tokio::fs::read(loc)
                .await
                .with_context(|| format!("read {loc}"))?;
            Ok((bytes, mime_from_path(loc).to_string()))
        }
    }

    async fn generate(&self, bytes: &[u8], mime_type: String) -> Result<String> {
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type,
                            data: STANDARD.encode(bytes),
                        },
                    },
                    Part::Text {
                        text: extraction_prompt(chrono::Local::now().year()),
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                response_mime_type: "application/json".to_string(),
            },
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        );

        let resp = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .context("gemini request")?;

        let status = resp.status();
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            bail!("gemini error: {status} {txt}");
        }

        let out: GenerateResponse = resp.json().await.context("parse gemini response")?;
        response_text(out)
    }
}

fn response_text(resp: GenerateResponse) -> Result<String> {
    let candidate = resp
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("gemini returned no candidates"))?;
    let text: String = candidate
        .content
        .map(|c| c.parts)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|p| p.text)
        .collect();
    if text.trim().is_empty() {
        bail!("gemini returned an empty answer");
    }
    Ok(text)
}

fn mime_from_path(path: &str) -> &'static str {
    let ext = Path::new(path.split('?').next().unwrap_or(path))
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        _ => "image/jpeg",
    }
}

#[async_trait]
impl ExtractionGateway for GeminiExtractor {
    async fn extract(&self, image: &ImageRef) -> Result<Vec<TransactionRecord>> {
        let (bytes, mime) = self.load_image(image).await?;
        debug!(bytes = bytes.len(), mime = %mime, "image loaded");

        let text = self.generate(&bytes, mime).await?;
        let records = parse_transactions(&text)?;
        info!(count = records.len(), model = %self.config.model, "transactions extracted");
        Ok(records)
    }
}
