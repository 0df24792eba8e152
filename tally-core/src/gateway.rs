//! Seams to the outside world: extraction, ledger and chat replies.

use async_trait::async_trait;

use crate::session::Prompt;
use crate::transaction::TransactionRecord;

/// Reference to an uploaded image (download URL or local path)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef(pub String);

impl ImageRef {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Turns a payment screenshot into transaction records.
#[async_trait]
pub trait ExtractionGateway: Send + Sync {
    /// Records in the order they appear on the screenshot, uncategorized.
    async fn extract(&self, image: &ImageRef) -> anyhow::Result<Vec<TransactionRecord>>;
}

/// Ledger acknowledgement for an append
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerAck {
    pub status: u16,
    pub status_text: String,
    pub rows: usize,
}

impl std::fmt::Display for LedgerAck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} ({} rows)", self.status, self.status_text, self.rows)
    }
}

/// Spreadsheet-like store of categorized rows.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Append one row per record, in the order given.
    async fn append(&self, records: &[TransactionRecord]) -> anyhow::Result<LedgerAck>;

    /// Allowed category labels; empty when the ledger has none configured.
    async fn list_categories(&self) -> anyhow::Result<Vec<String>>;
}

/// Something the engine wants the user to see
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text(String),
    /// Text already escaped for MarkdownV2
    Markdown(String),
    Prompt(Prompt),
}

/// Delivers replies to one conversation, in order.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn send(&self, reply: Reply) -> anyhow::Result<()>;
}
