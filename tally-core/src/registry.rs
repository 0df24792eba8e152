//! Category registry parsing and validation.
//!
//! Labels keep the order the user (or the ledger) gave them; that order is
//! the button order of every prompt. Duplicates are dropped, first one wins.

use crate::error::{Result, SessionError};

/// Characters MarkdownV2 requires escaped outside of entities
const MARKDOWN_V2_SPECIAL: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

/// Parse a comma-separated category list.
///
/// Elements are trimmed and empty ones dropped. Fails with
/// [`SessionError::EmptyInput`] when nothing remains.
pub fn parse_categories(raw: &str) -> Result<Vec<String>> {
    let labels = normalize(raw.split(','));
    if labels.is_empty() {
        return Err(SessionError::EmptyInput);
    }
    Ok(labels)
}

/// Accept a category list read from the ledger.
///
/// The list must be non-empty and every label must carry text.
pub fn accept_detected(labels: Vec<String>) -> Result<Vec<String>> {
    if labels.is_empty() || labels.iter().any(|l| l.trim().is_empty()) {
        return Err(SessionError::CategoryDetectionFailed);
    }
    Ok(normalize(labels.iter().map(String::as_str)))
}

fn normalize<'a>(parts: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for label in parts.map(str::trim).filter(|l| !l.is_empty()) {
        if !out.iter().any(|seen| seen == label) {
            out.push(label.to_string());
        }
    }
    out
}

/// Escape text for a Telegram MarkdownV2 message
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '\\' || MARKDOWN_V2_SPECIAL.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Confirmation list for display: escaped labels joined by ", "
pub fn display_list(labels: &[String]) -> String {
    labels
        .iter()
        .map(|l| escape_markdown(l))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trims_and_drops_empty_segments() {
        let labels = parse_categories("Food, Travel,, Shopping ,").unwrap();
        assert_eq!(labels, vec!["Food", "Travel", "Shopping"]);
    }

    #[test]
    fn test_blank_input_is_empty_input() {
        assert_eq!(parse_categories(""), Err(SessionError::EmptyInput));
        assert_eq!(parse_categories("   "), Err(SessionError::EmptyInput));
        assert_eq!(parse_categories(" , ,"), Err(SessionError::EmptyInput));
    }

    #[test]
    fn test_duplicates_keep_first_position() {
        let labels = parse_categories("Food, Travel, Food").unwrap();
        assert_eq!(labels, vec!["Food", "Travel"]);
    }

    #[test]
    fn test_detected_must_be_non_empty() {
        assert_eq!(accept_detected(vec![]), Err(SessionError::CategoryDetectionFailed));
        assert_eq!(
            accept_detected(vec!["Food".into(), "  ".into()]),
            Err(SessionError::CategoryDetectionFailed)
        );
        assert_eq!(
            accept_detected(vec!["Food".into(), "Bills ".into()]).unwrap(),
            vec!["Food", "Bills"]
        );
    }

    #[test]
    fn test_escape_markdown() {
        assert_eq!(escape_markdown("Eating-out (fun)!"), "Eating\\-out \\(fun\\)\\!");
        assert_eq!(escape_markdown("Food"), "Food");
        assert_eq!(display_list(&["A.B".into(), "C".into()]), "A\\.B, C");
    }
}
