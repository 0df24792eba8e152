//! tally-ledger: where categorized transactions end up.
//!
//! - `CsvLedger`: local file, always available
//! - `SheetsLedger`: Google Sheets (feature `sheets`)

pub mod csv_ledger;
pub mod rows;
#[cfg(feature = "sheets")]
pub mod sheets;
pub mod validation;

pub use csv_ledger::CsvLedger;
#[cfg(feature = "sheets")]
pub use sheets::{SheetsConfig, SheetsLedger};
pub use validation::{ValidationRule, categories_from_rule};
