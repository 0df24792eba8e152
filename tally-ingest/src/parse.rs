//! Model response parsing.
//!
//! The model is asked for a bare JSON array but frequently wraps it in a
//! ```json fence or adds a sentence around it. Accepted shapes, in order:
//! 1. fenced block
//! 2. first `[` .. last `]`

use anyhow::{Context, Result, bail};
use regex::Regex;
use tally_core::TransactionRecord;
use tracing::warn;

/// Pull the JSON array out of a model reply
pub fn extract_json(response: &str) -> Result<&str> {
    let fence = Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```")?;
    if let Some(caps) = fence.captures(response) {
        if let Some(body) = caps.get(1) {
            return Ok(body.as_str());
        }
    }

    if let (Some(start), Some(end)) = (response.find('['), response.rfind(']')) {
        if end > start {
            return Ok(&response[start..=end]);
        }
    }

    bail!("no JSON array in model response")
}

/// Parse the model reply into uncategorized records.
///
/// Rows with a blank merchant are dropped; any other malformed row fails
/// the whole reply.
pub fn parse_transactions(response: &str) -> Result<Vec<TransactionRecord>> {
    let json = extract_json(response)?;
    let rows: Vec<TransactionRecord> =
        serde_json::from_str(json).context("parse transactions JSON")?;

    let mut out = Vec::with_capacity(rows.len());
    for mut row in rows {
        row.merchant_name = row.merchant_name.trim().to_string();
        if row.merchant_name.is_empty() {
            warn!(amount = row.amount, date = %row.date, "dropping row without merchant");
            continue;
        }
        row.category = None;
        out.push(row);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::TxnType;

    #[test]
    fn test_fenced_reply() {
        let reply = "```json\n[{\"merchantName\":\"Swiggy\",\"amount\":320,\"date\":\"2025-06-09\",\"type\":\"debit\"}]\n```";
        let txns = parse_transactions(reply).unwrap();
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].merchant_name, "Swiggy");
        assert_eq!(txns[0].amount, 320.0);
        assert_eq!(txns[0].kind, TxnType::Debit);
    }

    #[test]
    fn test_bare_array_with_chatter() {
        let reply = "Here you go: [{\"merchantName\":\"Salary\",\"amount\":\"50000\",\"date\":\"2025-06-01\",\"type\":\"credit\"}] Hope that helps.";
        let txns = parse_transactions(reply).unwrap();
        assert_eq!(txns[0].kind, TxnType::Credit);
        assert_eq!(txns[0].amount, 50000.0);
    }

    #[test]
    fn test_order_preserved() {
        let reply = r#"[
            {"merchantName":"Newest","amount":1,"date":"2025-06-09","type":"debit"},
            {"merchantName":"Oldest","amount":2,"date":"2025-06-01","type":"debit"}
        ]"#;
        let names: Vec<_> = parse_transactions(reply)
            .unwrap()
            .into_iter()
            .map(|t| t.merchant_name)
            .collect();
        assert_eq!(names, vec!["Newest", "Oldest"]);
    }

    #[test]
    fn test_blank_merchant_dropped() {
        let reply = r#"[
            {"merchantName":"  ","amount":1,"date":"2025-06-09","type":"debit"},
            {"merchantName":"Uber","amount":2,"date":"2025-06-08","type":"debit"}
        ]"#;
        let txns = parse_transactions(reply).unwrap();
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].merchant_name, "Uber");
    }

    #[test]
    fn test_empty_array_is_ok() {
        assert!(parse_transactions("```json\n[]\n```").unwrap().is_empty());
    }

    #[test]
    fn test_garbage_fails() {
        assert!(parse_transactions("I could not read this image.").is_err());
        assert!(parse_transactions("[{\"merchantName\":\"X\"}]").is_err());
    }
}
