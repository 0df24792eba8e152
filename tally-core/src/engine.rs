//! Categorization engine: drives a session from screenshot to ledger.
//!
//! Flow per chat:
//! - image → extract → `begin_batch` → prompt for `pending[0]`
//! - choice → `record_choice` → prompt for the next record
//! - exhausted → one ledger append of the reversed `categorized` list
//!
//! Every public operation locks the chat's session for its whole duration,
//! including gateway calls, so events for one chat never interleave.
//! Session errors are turned into chat replies here; only `Responder`
//! failures are returned to the caller, and never once the session has
//! moved past the point the failed reply was reporting on. Progress notices
//! ("Found N", "Sending to sheet...") are logged on failure and skipped.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, error, info, warn};

use crate::error::SessionError;
use crate::gateway::{ExtractionGateway, ImageRef, LedgerAck, LedgerGateway, Reply, Responder};
use crate::registry;
use crate::session::{Phase, Prompt, PromptTag, Session};
use crate::store::{ChatKey, SessionStore};
use crate::transaction::TransactionRecord;

#[derive(Clone)]
pub struct Engine {
    store: SessionStore,
    extractor: Arc<dyn ExtractionGateway>,
    ledger: Arc<dyn LedgerGateway>,
}

impl Engine {
    pub fn new(extractor: Arc<dyn ExtractionGateway>, ledger: Arc<dyn LedgerGateway>) -> Self {
        Self {
            store: SessionStore::new(),
            extractor,
            ledger,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// `/set_categories a, b, c`
    pub async fn set_categories(&self, chat: ChatKey, raw: &str, out: &dyn Responder) -> Result<()> {
        let session = self.store.session(chat);
        let mut session = session.lock().await;

        match session.set_categories(raw) {
            Ok(labels) => {
                info!(chat = %chat, count = labels.len(), "categories set");
                let text = format!("✅ Categories saved:\n\n{}", registry::display_list(labels));
                out.send(Reply::Markdown(text)).await?;
                reprompt(&session, out).await
            }
            Err(e) => {
                debug!(chat = %chat, error = %e, "rejected category input");
                out.send(Reply::Text(e.user_message())).await
            }
        }
    }

    /// `/get_categories`: read the allowed labels from the ledger
    pub async fn load_categories(&self, chat: ChatKey, out: &dyn Responder) -> Result<()> {
        let session = self.store.session(chat);
        let mut session = session.lock().await;

        let detected = match self.ledger.list_categories().await {
            Ok(labels) => labels,
            Err(e) => {
                warn!(chat = %chat, error = %e, "ledger category lookup failed");
                Vec::new()
            }
        };

        match session.replace_categories(detected) {
            Ok(labels) => {
                info!(chat = %chat, count = labels.len(), "categories loaded from ledger");
                let text = format!("✅ Categories loaded from sheet:\n\n{}", labels.join(", "));
                out.send(Reply::Text(text)).await?;
                reprompt(&session, out).await
            }
            Err(e) => out.send(Reply::Text(e.user_message())).await,
        }
    }

    /// New screenshot: extract, replace the batch, prompt for the first record.
    pub async fn handle_image(&self, chat: ChatKey, image: &ImageRef, out: &dyn Responder) -> Result<()> {
        let session = self.store.session(chat);
        let mut session = session.lock().await;

        if session.categories().is_empty() {
            return out
                .send(Reply::Text(SessionError::CategoriesNotConfigured.user_message()))
                .await;
        }

        notify(chat, out, "Detecting transactions from image!".to_string()).await;

        let records = match self.extractor.extract(image).await {
            Ok(records) => records,
            Err(e) => {
                let err = SessionError::ExtractionFailed(format!("{e:#}"));
                warn!(chat = %chat, error = %err, "extraction failed");
                return out.send(Reply::Text(err.user_message())).await;
            }
        };

        self.start_batch(chat, &mut session, records, out).await
    }

    /// Start a batch from records that are already extracted.
    pub async fn begin_batch(
        &self,
        chat: ChatKey,
        records: Vec<TransactionRecord>,
        out: &dyn Responder,
    ) -> Result<()> {
        let session = self.store.session(chat);
        let mut session = session.lock().await;
        self.start_batch(chat, &mut session, records, out).await
    }

    /// Inline button press: `label` chosen on the prompt tagged `tag`.
    pub async fn record_choice(
        &self,
        chat: ChatKey,
        tag: PromptTag,
        label: &str,
        out: &dyn Responder,
    ) -> Result<()> {
        let session = self.store.session(chat);
        let mut session = session.lock().await;

        if let Err(e) = session.record_choice_for(tag, label) {
            debug!(chat = %chat, label, ?tag, current = ?session.prompt_tag(), "ignoring stale choice");
            return out.send(Reply::Text(e.user_message())).await;
        }
        debug!(chat = %chat, label, "choice recorded");
        self.advance(chat, &mut session, out).await
    }

    pub async fn current_prompt(&self, chat: ChatKey) -> Option<Prompt> {
        let session = self.store.get(chat)?;
        let session = session.lock().await;
        session.current_prompt()
    }

    pub async fn phase(&self, chat: ChatKey) -> Phase {
        match self.store.get(chat) {
            Some(session) => session.lock().await.phase(),
            None => Phase::Idle,
        }
    }

    /// Flush the chat's batch if it is exhausted and has not been sent yet.
    ///
    /// Returns `None` when nothing is due, including after a failed flush;
    /// use [`Engine::retry_flush`] for those.
    pub async fn flush_if_complete(
        &self,
        chat: ChatKey,
        out: &dyn Responder,
    ) -> Result<Option<std::result::Result<LedgerAck, SessionError>>> {
        let session = self.store.session(chat);
        let mut session = session.lock().await;
        if session.phase() != (Phase::Flushing { failed: false }) {
            return Ok(None);
        }
        self.flush(chat, &mut session, out).await
    }

    /// `/retry`: resubmit a batch whose flush failed
    pub async fn retry_flush(&self, chat: ChatKey, out: &dyn Responder) -> Result<()> {
        let session = self.store.session(chat);
        let mut session = session.lock().await;
        if session.phase() != (Phase::Flushing { failed: true }) {
            return out
                .send(Reply::Text("Nothing to retry.".to_string()))
                .await;
        }
        info!(chat = %chat, "retrying ledger flush");
        self.flush(chat, &mut session, out).await.map(|_| ())
    }

    /// `/status`: one-line summary of the derived phase, followed by the
    /// waiting prompt again if there is one
    pub async fn status(&self, chat: ChatKey, out: &dyn Responder) -> Result<()> {
        let session = self.store.session(chat);
        let session = session.lock().await;
        let phase = match session.phase() {
            Phase::Idle | Phase::AwaitingCategories => {
                "No categories yet. Use /set_categories or /get_categories.".to_string()
            }
            Phase::Ready => "Ready. Send a screenshot of your payments.".to_string(),
            Phase::Prompting { index, total } => {
                format!("Categorizing transaction {} of {}.", index + 1, total)
            }
            Phase::Flushing { failed: true } => {
                "Sending to sheet failed. Send /retry to try again.".to_string()
            }
            Phase::Flushing { failed: false } => "Sending to sheet...".to_string(),
            Phase::Done => "All transactions saved.".to_string(),
        };
        let text = if session.categories().is_empty() {
            phase
        } else {
            format!("{phase}\n\nCategories: {}", session.categories().join(", "))
        };
        out.send(Reply::Text(text)).await?;
        reprompt(&session, out).await
    }

    async fn start_batch(
        &self,
        chat: ChatKey,
        session: &mut Session,
        records: Vec<TransactionRecord>,
        out: &dyn Responder,
    ) -> Result<()> {
        let count = records.len();
        if let Err(e) = session.begin_batch(records) {
            return out.send(Reply::Text(e.user_message())).await;
        }
        info!(chat = %chat, count, "batch started");
        notify(
            chat,
            out,
            format!("Found {count} transactions. Let's categorize them."),
        )
        .await;
        self.advance(chat, session, out).await
    }

    // Prompt for the current record, or flush once the queue is exhausted.
    async fn advance(&self, chat: ChatKey, session: &mut Session, out: &dyn Responder) -> Result<()> {
        if let Some(prompt) = session.current_prompt() {
            return out.send(Reply::Prompt(prompt)).await;
        }
        match session.phase() {
            Phase::Flushing { failed: false } => self.flush(chat, session, out).await.map(|_| ()),
            Phase::Idle | Phase::AwaitingCategories => {
                out.send(Reply::Text(SessionError::CategoriesNotConfigured.user_message()))
                    .await
            }
            _ => Ok(()),
        }
    }

    async fn flush(
        &self,
        chat: ChatKey,
        session: &mut Session,
        out: &dyn Responder,
    ) -> Result<Option<std::result::Result<LedgerAck, SessionError>>> {
        let Some(rows) = session.flush_rows() else {
            return Ok(None);
        };

        notify(
            chat,
            out,
            "✅ All transactions categorized! Sending to sheet...".to_string(),
        )
        .await;

        match self.ledger.append(&rows).await {
            Ok(ack) => {
                session.mark_flushed();
                info!(chat = %chat, %ack, "batch flushed to ledger");
                out.send(Reply::Text("📄 Data added to sheet successfully!".to_string()))
                    .await?;
                Ok(Some(Ok(ack)))
            }
            Err(e) => {
                let err = SessionError::LedgerWriteFailed(format!("{e:#}"));
                error!(chat = %chat, rows = rows.len(), error = %err, "ledger append failed");
                session.mark_flush_failed(err.to_string());
                out.send(Reply::Text(err.user_message())).await?;
                Ok(Some(Err(err)))
            }
        }
    }
}

// Progress notice; the operation goes on whether or not it arrives.
async fn notify(chat: ChatKey, out: &dyn Responder, text: String) {
    if let Err(e) = out.send(Reply::Text(text)).await {
        warn!(chat = %chat, error = %format!("{e:#}"), "progress notice not delivered");
    }
}

// Buttons sent before a relabel carry an older tag; offer fresh ones.
async fn reprompt(session: &Session, out: &dyn Responder) -> Result<()> {
    match session.current_prompt() {
        Some(prompt) => out.send(Reply::Prompt(prompt)).await,
        None => Ok(()),
    }
}
