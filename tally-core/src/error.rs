//! Session error types.

use thiserror::Error;

/// Failures surfaced by the categorization flow.
///
/// None of these are fatal: every variant maps to a message the user sees in
/// chat, and the session stays usable afterwards.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Categorization attempted before any category labels exist
    #[error("categories not configured")]
    CategoriesNotConfigured,

    /// Category text had no usable labels after trimming
    #[error("no categories in input")]
    EmptyInput,

    /// Ledger returned nothing usable for the category lookup
    #[error("category detection failed")]
    CategoryDetectionFailed,

    /// Extraction gateway failed or returned garbage
    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    /// Ledger append failed; the batch is kept for a manual retry
    #[error("ledger write failed: {0}")]
    LedgerWriteFailed(String),

    /// A category choice arrived with no outstanding prompt
    #[error("no transaction awaiting a category")]
    StaleChoice,
}

impl SessionError {
    /// Text shown to the user in chat
    pub fn user_message(&self) -> String {
        match self {
            SessionError::CategoriesNotConfigured => "Please set categories first!".to_string(),
            SessionError::EmptyInput => "❗ Please provide categories separated by commas.\n\n\
Example:\n/set_categories Food, Travel, Shopping"
                .to_string(),
            SessionError::CategoryDetectionFailed => {
                "❌ Failed to detect categories from sheet. Please set them manually by sending:\n\n\
/set_categories Food, Travel, Shopping\n\n(Comma-separated list)"
                    .to_string()
            }
            SessionError::ExtractionFailed(_) => {
                "Failed to detect transactions! Please try again later.".to_string()
            }
            SessionError::LedgerWriteFailed(_) => {
                "❌ Could not write to the sheet. Your categorized transactions are kept; \
send /retry to try again."
                    .to_string()
            }
            SessionError::StaleChoice => {
                "Nothing is waiting for a category. Send a screenshot to start.".to_string()
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_cause() {
        let e = SessionError::LedgerWriteFailed("403 Forbidden".to_string());
        assert_eq!(e.to_string(), "ledger write failed: 403 Forbidden");
    }

    #[test]
    fn test_user_message_hides_cause() {
        let e = SessionError::ExtractionFailed("gemini error: 500".to_string());
        assert!(!e.user_message().contains("500"));
    }

    #[test]
    fn test_manual_path_offered_after_detection_failure() {
        assert!(SessionError::CategoryDetectionFailed
            .user_message()
            .contains("/set_categories"));
    }
}
