//! Google Sheets ledger (feature: `sheets`).
//!
//! Rows are appended to `<sheet>!A1:D` as `USER_ENTERED`, so dates and
//! numbers are interpreted by Sheets the way typed input would be.
//! Categories come from the dropdown validation on `<sheet>!C2`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use google_sheets4::api::{BooleanCondition, Spreadsheet, ValueRange};
use google_sheets4::{Sheets, oauth2};
use hyper::client::HttpConnector;
use hyper_rustls::HttpsConnector;
use std::path::Path;
use tally_core::{LedgerAck, LedgerGateway, TransactionRecord};
use tracing::{debug, info};

use crate::rows::{a1_range, to_rows};
use crate::validation::{ValidationRule, categories_from_rule};

const SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

#[derive(Debug, Clone)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    pub sheet_name: String,
}

impl SheetsConfig {
    pub fn append_range(&self) -> String {
        a1_range(&self.sheet_name, "A1:D")
    }

    pub fn category_cell(&self) -> String {
        a1_range(&self.sheet_name, "C2")
    }
}

pub struct SheetsLedger {
    hub: Sheets<HttpsConnector<HttpConnector>>,
    config: SheetsConfig,
}

impl SheetsLedger {
    /// Authenticate with a service-account key file and build the client.
    pub async fn connect(config: SheetsConfig, service_account_key: &Path) -> Result<Self> {
        let key = oauth2::read_service_account_key(service_account_key)
            .await
            .with_context(|| format!("read {}", service_account_key.display()))?;
        let auth = oauth2::ServiceAccountAuthenticator::builder(key)
            .build()
            .await
            .context("building service account authenticator")?;

        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .https_or_http()
            .enable_http1()
            .build();
        let hub = Sheets::new(hyper::Client::builder().build(connector), auth);

        info!(spreadsheet = %config.spreadsheet_id, sheet = %config.sheet_name, "sheets ledger ready");
        Ok(Self { hub, config })
    }
}

fn rule_of(condition: BooleanCondition) -> ValidationRule {
    ValidationRule {
        kind: condition.type_,
        values: condition
            .values
            .unwrap_or_default()
            .into_iter()
            .map(|v| v.user_entered_value)
            .collect(),
    }
}

fn first_cell_rule(sheet: Spreadsheet) -> Option<ValidationRule> {
    let condition = sheet
        .sheets?
        .into_iter()
        .next()?
        .data?
        .into_iter()
        .next()?
        .row_data?
        .into_iter()
        .next()?
        .values?
        .into_iter()
        .next()?
        .data_validation?
        .condition?;
    Some(rule_of(condition))
}

#[async_trait]
impl LedgerGateway for SheetsLedger {
    async fn append(&self, records: &[TransactionRecord]) -> Result<LedgerAck> {
        let req = ValueRange {
            major_dimension: Some("ROWS".to_string()),
            range: None,
            values: Some(to_rows(records)),
        };

        let (resp, _) = self
            .hub
            .spreadsheets()
            .values_append(req, &self.config.spreadsheet_id, &self.config.append_range())
            .value_input_option("USER_ENTERED")
            .add_scope(SCOPE)
            .doit()
            .await
            .with_context(|| format!("append {} rows", records.len()))?;

        let status = resp.status();
        Ok(LedgerAck {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            rows: records.len(),
        })
    }

    async fn list_categories(&self) -> Result<Vec<String>> {
        let (_, sheet) = self
            .hub
            .spreadsheets()
            .get(&self.config.spreadsheet_id)
            .add_ranges(&self.config.category_cell())
            .include_grid_data(true)
            .add_scope(SCOPE)
            .param(
                "fields",
                "sheets(data/rowData/values/dataValidation,properties(sheetId,title))",
            )
            .doit()
            .await
            .context("read category validation")?;

        let rule = first_cell_rule(sheet);
        debug!(?rule, "category validation rule");
        Ok(categories_from_rule(rule.as_ref()))
    }
}
