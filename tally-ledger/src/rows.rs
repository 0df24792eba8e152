//! Ledger row layout: `date | amount | category | merchant`.

use serde_json::{Value, json};
use tally_core::TransactionRecord;

pub const HEADER: [&str; 4] = ["Date", "Amount", "Category", "Merchant"];

/// One sheet row for a categorized record
pub fn to_row(record: &TransactionRecord) -> Vec<Value> {
    vec![
        json!(record.date.format("%Y-%m-%d").to_string()),
        json!(record.amount),
        json!(record.category.clone().unwrap_or_default()),
        json!(record.merchant_name),
    ]
}

/// Rows in the order given
pub fn to_rows(records: &[TransactionRecord]) -> Vec<Vec<Value>> {
    records.iter().map(to_row).collect()
}

/// `<sheet>!<cells>` in A1 notation, quoting the sheet name unless it is a
/// plain identifier. Embedded quotes are doubled.
pub fn a1_range(sheet: &str, cells: &str) -> String {
    let plain = !sheet.is_empty()
        && !sheet.starts_with(|c: char| c.is_ascii_digit())
        && sheet.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        format!("{sheet}!{cells}")
    } else {
        format!("'{}'!{cells}", sheet.replace('\'', "''"))
    }
}

/// Plain-text cells, for file backends
pub fn to_text_row(record: &TransactionRecord) -> [String; 4] {
    [
        record.date.format("%Y-%m-%d").to_string(),
        record.amount.to_string(),
        record.category.clone().unwrap_or_default(),
        record.merchant_name.clone(),
    ]
}
