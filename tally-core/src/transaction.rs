//! Transaction record types flowing from extraction to the ledger

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

/// A single payment read off a screenshot.
///
/// `category` stays `None` while the record waits in a session's pending
/// queue and is set exactly once when the user picks a label for it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub merchant_name: String,
    /// Amount as reported by extraction; sign carries no category meaning
    #[serde(deserialize_with = "number_or_numeric_string")]
    pub amount: f64,
    /// Calendar date (YYYY-MM-DD)
    pub date: NaiveDate,
    #[serde(rename = "type")]
    pub kind: TxnType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Direction of money movement
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TxnType {
    #[serde(rename = "debit")]
    Debit,
    #[serde(rename = "credit")]
    Credit,
}

impl TxnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxnType::Debit => "debit",
            TxnType::Credit => "credit",
        }
    }
}

impl TransactionRecord {
    /// Create an uncategorized record
    pub fn new(
        merchant_name: impl Into<String>,
        amount: f64,
        date: NaiveDate,
        kind: TxnType,
    ) -> Self {
        Self {
            merchant_name: merchant_name.into(),
            amount,
            date,
            kind,
            category: None,
        }
    }

    /// Copy of this record carrying the chosen label
    pub fn with_category(&self, category: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
            ..self.clone()
        }
    }

    pub fn is_categorized(&self) -> bool {
        self.category.is_some()
    }

    pub fn is_credit(&self) -> bool {
        self.kind == TxnType::Credit
    }
}

// Vision models are inconsistent about quoting numbers.
fn number_or_numeric_string<'de, D>(de: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(f64),
        Text(String),
    }

    match Raw::deserialize(de)? {
        Raw::Num(n) => Ok(n),
        Raw::Text(s) => parse_amount_text(&s).map_err(serde::de::Error::custom),
    }
}

// "-₹1,200", "+$5", "₹ 99.50": sign, then symbol, then digits.
fn parse_amount_text(s: &str) -> Result<f64, std::num::ParseFloatError> {
    let s = s.trim();
    let (negative, rest) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let digits: String = rest
        .trim_start_matches(['₹', '$', ' '])
        .chars()
        .filter(|c| *c != ',')
        .collect();
    let value: f64 = digits.parse()?;
    Ok(if negative { -value } else { value })
}
