//! Local CSV ledger for development and offline use.
//!
//! Same columns as the spreadsheet. A header row is written when the file
//! is created; later appends only add data rows.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tally_core::{LedgerAck, LedgerGateway, TransactionRecord};
use tracing::debug;

use crate::rows::{HEADER, to_text_row};

pub struct CsvLedger {
    path: PathBuf,
    categories: Vec<String>,
}

impl CsvLedger {
    /// `categories` is what `/get_categories` reports for this ledger
    pub fn new(path: impl Into<PathBuf>, categories: Vec<String>) -> Self {
        Self {
            path: path.into(),
            categories,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn append_rows(path: &Path, rows: Vec<[String; 4]>) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }
    let is_new = !path.exists();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {}", path.display()))?;

    let mut w = csv::Writer::from_writer(file);
    if is_new {
        w.write_record(HEADER)?;
    }
    for row in rows {
        w.write_record(&row)?;
    }
    w.flush().with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

#[async_trait]
impl LedgerGateway for CsvLedger {
    async fn append(&self, records: &[TransactionRecord]) -> Result<LedgerAck> {
        let rows: Vec<[String; 4]> = records.iter().map(to_text_row).collect();
        let count = rows.len();
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || append_rows(&path, rows))
            .await
            .context("csv writer task")??;

        debug!(rows = count, path = %self.path.display(), "appended to csv ledger");
        Ok(LedgerAck {
            status: 200,
            status_text: "OK".to_string(),
            rows: count,
        })
    }

    async fn list_categories(&self) -> Result<Vec<String>> {
        Ok(self.categories.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tally_core::TxnType;

    fn rec(merchant: &str, category: &str) -> TransactionRecord {
        TransactionRecord::new(
            merchant,
            99.0,
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            TxnType::Debit,
        )
        .with_category(category)
    }

    fn read_rows(path: &Path) -> Vec<Vec<String>> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)
            .unwrap();
        rdr.records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect()
    }

    #[tokio::test]
    async fn test_header_once_then_rows_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger").join("expenses.csv");
        let ledger = CsvLedger::new(&path, vec![]);

        let ack = ledger
            .append(&[rec("B", "Food"), rec("A", "Travel")])
            .await
            .unwrap();
        assert_eq!(ack.rows, 2);
        ledger.append(&[rec("C, Ltd", "Bills")]).await.unwrap();

        let rows = read_rows(&path);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0], HEADER);
        assert_eq!(rows[1], ["2025-06-01", "99", "Food", "B"]);
        assert_eq!(rows[2][3], "A");
        assert_eq!(rows[3][3], "C, Ltd");
    }

    #[tokio::test]
    async fn test_empty_append_still_acknowledged() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = CsvLedger::new(dir.path().join("e.csv"), vec![]);
        let ack = ledger.append(&[]).await.unwrap();
        assert_eq!(ack.rows, 0);
    }

    #[tokio::test]
    async fn test_categories_from_config() {
        let ledger = CsvLedger::new("unused.csv", vec!["Food".into(), "Rent".into()]);
        assert_eq!(ledger.list_categories().await.unwrap(), vec!["Food", "Rent"]);
    }
}
