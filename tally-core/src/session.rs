//! Per-conversation categorization state.
//!
//! A `Session` owns the category labels and at most one active `Batch`.
//! The batch is a pending queue plus a cursor: every choice tags
//! `pending[cursor]`, appends it to `categorized` and moves the cursor by one.
//! `cursor == pending.len()` means exhausted, at which point the batch is due
//! for its single ledger flush.
//!
//! The user-facing phase is never stored; `Session::phase` derives it from
//! (categories, batch) on every call.
//!
//! Every prompt carries a `PromptTag`: the session epoch plus the cursor it
//! asks about. The epoch moves whenever a batch starts or the labels change,
//! so a choice made on an older prompt no longer matches and is stale.

use crate::error::{Result, SessionError};
use crate::registry;
use crate::transaction::TransactionRecord;

#[derive(Debug, Clone, Default)]
pub struct Session {
    categories: Vec<String>,
    batch: Option<Batch>,
    epoch: u64,
}

/// One screenshot's worth of transactions
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pending: Vec<TransactionRecord>,
    cursor: usize,
    categorized: Vec<TransactionRecord>,
    flush: FlushState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FlushState {
    #[default]
    Unflushed,
    Failed(String),
    Flushed,
}

/// Derived view of where a session stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    /// No categories and nothing queued
    Idle,
    /// A batch exists but categories are missing
    AwaitingCategories,
    /// Categories set, no batch yet
    Ready,
    /// `pending[index]` is waiting for a label
    Prompting { index: usize, total: usize },
    /// Exhausted, flush not yet acknowledged by the ledger
    Flushing { failed: bool },
    /// Exhausted and flushed
    Done,
}

/// Which prompt a choice answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PromptTag {
    pub epoch: u64,
    pub index: usize,
}

/// "Which category for this transaction?"
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub record: TransactionRecord,
    /// Current labels in stored order
    pub choices: Vec<String>,
    pub index: usize,
    pub total: usize,
    pub epoch: u64,
}

impl Prompt {
    pub fn tag(&self) -> PromptTag {
        PromptTag {
            epoch: self.epoch,
            index: self.index,
        }
    }
}

impl Batch {
    fn new(records: Vec<TransactionRecord>) -> Self {
        let pending = records
            .into_iter()
            .map(|mut r| {
                r.category = None;
                r
            })
            .collect();
        Self {
            pending,
            ..Default::default()
        }
    }

    pub fn pending(&self) -> &[TransactionRecord] {
        &self.pending
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn categorized(&self) -> &[TransactionRecord] {
        &self.categorized
    }

    pub fn flush_state(&self) -> &FlushState {
        &self.flush
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.pending.len()
    }

    /// Records in ledger append order.
    ///
    /// Extraction lists the newest payment first; the ledger wants them
    /// chronologically, so the accumulated order is reversed.
    pub fn ledger_rows_order(&self) -> Vec<TransactionRecord> {
        self.categorized.iter().rev().cloned().collect()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn batch(&self) -> Option<&Batch> {
        self.batch.as_ref()
    }

    /// Parse and store a comma-separated label list, replacing the old one.
    ///
    /// On error the existing labels are left alone.
    pub fn set_categories(&mut self, raw: &str) -> Result<&[String]> {
        self.categories = registry::parse_categories(raw)?;
        self.epoch += 1;
        Ok(&self.categories)
    }

    /// Store labels detected from the ledger, replacing the old ones
    pub fn replace_categories(&mut self, detected: Vec<String>) -> Result<&[String]> {
        self.categories = registry::accept_detected(detected)?;
        self.epoch += 1;
        Ok(&self.categories)
    }

    /// Start a new batch, discarding any batch in progress.
    pub fn begin_batch(&mut self, records: Vec<TransactionRecord>) -> Result<()> {
        if self.categories.is_empty() {
            return Err(SessionError::CategoriesNotConfigured);
        }
        self.batch = Some(Batch::new(records));
        self.epoch += 1;
        Ok(())
    }

    /// Tag of the prompt currently waiting for a label
    pub fn prompt_tag(&self) -> Option<PromptTag> {
        let batch = self.batch.as_ref()?;
        if batch.is_exhausted() {
            return None;
        }
        Some(PromptTag {
            epoch: self.epoch,
            index: batch.cursor,
        })
    }

    /// `record_choice` for a specific prompt.
    ///
    /// Stale unless `tag` is the prompt currently waiting and `category` is
    /// one of the current labels.
    pub fn record_choice_for(&mut self, tag: PromptTag, category: &str) -> Result<()> {
        if self.prompt_tag() != Some(tag) || !self.categories.iter().any(|c| c == category) {
            return Err(SessionError::StaleChoice);
        }
        self.record_choice(category)
    }

    /// Tag the current pending record and advance the cursor by one.
    pub fn record_choice(&mut self, category: &str) -> Result<()> {
        let batch = self.batch.as_mut().ok_or(SessionError::StaleChoice)?;
        let Some(current) = batch.pending.get(batch.cursor) else {
            return Err(SessionError::StaleChoice);
        };
        let tagged = current.with_category(category);
        batch.categorized.push(tagged);
        batch.cursor += 1;
        Ok(())
    }

    /// The record waiting for a label, offered against the current labels.
    ///
    /// `None` when no labels are configured or nothing is pending.
    pub fn current_prompt(&self) -> Option<Prompt> {
        if self.categories.is_empty() {
            return None;
        }
        let batch = self.batch.as_ref()?;
        let record = batch.pending.get(batch.cursor)?;
        Some(Prompt {
            record: record.clone(),
            choices: self.categories.clone(),
            index: batch.cursor,
            total: batch.pending.len(),
            epoch: self.epoch,
        })
    }

    /// Rows to append when the batch is exhausted and not yet flushed
    pub fn flush_rows(&self) -> Option<Vec<TransactionRecord>> {
        let batch = self.batch.as_ref()?;
        if !batch.is_exhausted() || batch.flush == FlushState::Flushed {
            return None;
        }
        Some(batch.ledger_rows_order())
    }

    pub fn mark_flushed(&mut self) {
        if let Some(batch) = self.batch.as_mut() {
            batch.flush = FlushState::Flushed;
        }
    }

    pub fn mark_flush_failed(&mut self, reason: impl Into<String>) {
        if let Some(batch) = self.batch.as_mut() {
            batch.flush = FlushState::Failed(reason.into());
        }
    }

    pub fn phase(&self) -> Phase {
        match (&self.batch, self.categories.is_empty()) {
            (None, true) => Phase::Idle,
            (Some(_), true) => Phase::AwaitingCategories,
            (None, false) => Phase::Ready,
            (Some(b), false) if !b.is_exhausted() => Phase::Prompting {
                index: b.cursor,
                total: b.pending.len(),
            },
            (Some(b), false) => match b.flush {
                FlushState::Flushed => Phase::Done,
                FlushState::Failed(_) => Phase::Flushing { failed: true },
                FlushState::Unflushed => Phase::Flushing { failed: false },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TxnType;
    use chrono::NaiveDate;

    fn tx(merchant: &str, amount: f64, day: u32, kind: TxnType) -> TransactionRecord {
        TransactionRecord::new(
            merchant,
            amount,
            NaiveDate::from_ymd_opt(2025, 6, day).unwrap(),
            kind,
        )
    }

    fn ready_session() -> Session {
        let mut s = Session::new();
        s.set_categories("Food, Travel").unwrap();
        s
    }

    #[test]
    fn test_begin_requires_categories() {
        let mut s = Session::new();
        let err = s.begin_batch(vec![tx("A", 1.0, 1, TxnType::Debit)]).unwrap_err();
        assert_eq!(err, SessionError::CategoriesNotConfigured);
        assert!(s.batch().is_none());
        assert_eq!(s.phase(), Phase::Idle);
    }

    #[test]
    fn test_walk_through_batch() {
        let mut s = ready_session();
        let records = vec![
            tx("A", 10.0, 1, TxnType::Debit),
            tx("B", 20.0, 2, TxnType::Credit),
            tx("C", 30.0, 3, TxnType::Debit),
        ];
        s.begin_batch(records).unwrap();

        for (i, label) in ["Food", "Travel", "Food"].iter().enumerate() {
            assert_eq!(s.phase(), Phase::Prompting { index: i, total: 3 });
            s.record_choice(label).unwrap();
            let b = s.batch().unwrap();
            assert_eq!(b.cursor(), i + 1);
            assert_eq!(b.categorized().len(), i + 1);
            assert_eq!(b.pending().len(), 3);
        }

        let b = s.batch().unwrap();
        let labels: Vec<_> = b
            .categorized()
            .iter()
            .map(|r| r.category.clone().unwrap())
            .collect();
        assert_eq!(labels, vec!["Food", "Travel", "Food"]);
        assert_eq!(s.phase(), Phase::Flushing { failed: false });
    }

    #[test]
    fn test_choice_after_exhaustion_is_stale() {
        let mut s = ready_session();
        s.begin_batch(vec![tx("A", 10.0, 1, TxnType::Debit)]).unwrap();
        s.record_choice("Food").unwrap();
        assert_eq!(s.record_choice("Travel"), Err(SessionError::StaleChoice));
        assert_eq!(s.batch().unwrap().cursor(), 1);
        assert_eq!(s.batch().unwrap().categorized().len(), 1);
    }

    #[test]
    fn test_choice_without_batch_is_stale() {
        let mut s = ready_session();
        assert_eq!(s.record_choice("Food"), Err(SessionError::StaleChoice));
    }

    #[test]
    fn test_prompt_follows_current_categories() {
        let mut s = ready_session();
        s.begin_batch(vec![
            tx("A", 10.0, 1, TxnType::Debit),
            tx("B", 20.0, 2, TxnType::Debit),
        ])
        .unwrap();
        s.record_choice("Travel").unwrap();
        s.set_categories("Bills, Fun").unwrap();

        let p = s.current_prompt().unwrap();
        assert_eq!(p.record.merchant_name, "B");
        assert_eq!(p.choices, vec!["Bills", "Fun"]);
        assert_eq!(
            s.batch().unwrap().categorized()[0].category.as_deref(),
            Some("Travel")
        );
    }

    #[test]
    fn test_pending_records_are_stripped_of_category() {
        let mut s = ready_session();
        s.begin_batch(vec![tx("A", 10.0, 1, TxnType::Debit).with_category("Stale")])
            .unwrap();
        assert!(s.batch().unwrap().pending()[0].category.is_none());
    }

    #[test]
    fn test_new_batch_replaces_old() {
        let mut s = ready_session();
        s.begin_batch(vec![
            tx("A", 10.0, 1, TxnType::Debit),
            tx("B", 20.0, 2, TxnType::Debit),
        ])
        .unwrap();
        s.record_choice("Food").unwrap();

        s.begin_batch(vec![tx("Z", 5.0, 9, TxnType::Debit)]).unwrap();
        let b = s.batch().unwrap();
        assert_eq!(b.cursor(), 0);
        assert!(b.categorized().is_empty());
        assert_eq!(b.pending().len(), 1);
        assert_eq!(s.current_prompt().unwrap().record.merchant_name, "Z");
    }

    #[test]
    fn test_flush_rows_reversed_and_once() {
        let mut s = ready_session();
        s.begin_batch(vec![
            tx("A", 10.0, 1, TxnType::Debit),
            tx("B", 20.0, 2, TxnType::Credit),
        ])
        .unwrap();
        assert!(s.flush_rows().is_none());
        s.record_choice("Travel").unwrap();
        s.record_choice("Food").unwrap();

        let rows = s.flush_rows().unwrap();
        assert_eq!(rows[0].merchant_name, "B");
        assert_eq!(rows[0].category.as_deref(), Some("Food"));
        assert_eq!(rows[1].merchant_name, "A");

        s.mark_flushed();
        assert!(s.flush_rows().is_none());
        assert_eq!(s.phase(), Phase::Done);
    }

    #[test]
    fn test_failed_flush_keeps_rows() {
        let mut s = ready_session();
        s.begin_batch(vec![tx("A", 10.0, 1, TxnType::Debit)]).unwrap();
        s.record_choice("Food").unwrap();
        s.mark_flush_failed("timeout");
        assert_eq!(s.phase(), Phase::Flushing { failed: true });
        assert_eq!(s.flush_rows().unwrap().len(), 1);
    }

    #[test]
    fn test_empty_batch_is_immediately_exhausted() {
        let mut s = ready_session();
        s.begin_batch(vec![]).unwrap();
        assert!(s.current_prompt().is_none());
        assert_eq!(s.flush_rows(), Some(vec![]));
    }

    #[test]
    fn test_choice_for_older_prompt_is_stale() {
        let mut s = ready_session();
        s.begin_batch(vec![
            tx("A", 10.0, 1, TxnType::Debit),
            tx("B", 20.0, 2, TxnType::Debit),
        ])
        .unwrap();
        let first = s.current_prompt().unwrap().tag();
        s.record_choice_for(first, "Food").unwrap();

        // second press on the first prompt's keyboard
        assert_eq!(s.record_choice_for(first, "Travel"), Err(SessionError::StaleChoice));
        assert_eq!(s.batch().unwrap().cursor(), 1);

        let second = s.current_prompt().unwrap().tag();
        assert_eq!(second.index, 1);
        assert_eq!(s.record_choice_for(second, "Rent"), Err(SessionError::StaleChoice));
        s.record_choice_for(second, "Travel").unwrap();
        assert!(s.prompt_tag().is_none());
    }

    #[test]
    fn test_new_batch_and_new_labels_invalidate_prompts() {
        let mut s = ready_session();
        s.begin_batch(vec![tx("A", 10.0, 1, TxnType::Debit)]).unwrap();
        let old = s.current_prompt().unwrap().tag();

        s.begin_batch(vec![tx("Z", 5.0, 9, TxnType::Debit)]).unwrap();
        assert_eq!(s.prompt_tag().unwrap().index, old.index);
        assert_eq!(s.record_choice_for(old, "Food"), Err(SessionError::StaleChoice));

        let before_relabel = s.current_prompt().unwrap().tag();
        s.set_categories("Food, Bills").unwrap();
        assert_eq!(
            s.record_choice_for(before_relabel, "Food"),
            Err(SessionError::StaleChoice)
        );
        assert!(s.batch().unwrap().categorized().is_empty());

        let fresh = s.current_prompt().unwrap().tag();
        s.record_choice_for(fresh, "Bills").unwrap();
        assert_eq!(s.batch().unwrap().categorized()[0].category.as_deref(), Some("Bills"));
    }

    #[test]
    fn test_failed_set_keeps_old_categories() {
        let mut s = ready_session();
        assert!(s.set_categories("  ").is_err());
        assert_eq!(s.categories(), ["Food", "Travel"]);
    }
}
