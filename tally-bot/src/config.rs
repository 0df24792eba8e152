use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::state::ensure_tally_home;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub extraction: ExtractionSection,
    pub ledger: LedgerSection,
    pub chat: ChatSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSection {
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    Sheets,
    Csv,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSection {
    pub backend: LedgerBackend,
    pub spreadsheet_id: Option<String>,
    pub sheet_name: String,
    /// Service-account JSON key for the sheets backend
    pub service_account_key: Option<PathBuf>,
    pub csv_path: Option<PathBuf>,
    /// What `/get_categories` answers with on the csv backend
    pub csv_categories: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSection {
    pub currency_symbol: String,
    /// Category buttons per keyboard row
    pub keyboard_columns: usize,
}

impl Default for ExtractionSection {
    fn default() -> Self {
        Self {
            model: tally_ingest::gemini::DEFAULT_MODEL.to_string(),
            base_url: tally_ingest::gemini::DEFAULT_BASE_URL.to_string(),
            temperature: 0.1,
        }
    }
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::Csv,
            spreadsheet_id: None,
            sheet_name: "Sheet1".to_string(),
            service_account_key: None,
            csv_path: None,
            csv_categories: Vec::new(),
        }
    }
}

impl Default for ChatSection {
    fn default() -> Self {
        Self {
            currency_symbol: "₹".to_string(),
            keyboard_columns: 2,
        }
    }
}

/// Credentials that only ever come from the environment.
#[derive(Clone, Default)]
pub struct Secrets {
    pub bot_token: Option<String>,
    pub gemini_key: Option<String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("bot_token", &redact(self.bot_token.as_deref()))
            .field("gemini_key", &redact(self.gemini_key.as_deref()))
            .finish()
    }
}

impl Secrets {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());
        Self {
            bot_token: get("BOT_TOKEN"),
            gemini_key: get("GEMINI_KEY"),
        }
    }
}

pub fn redact(secret: Option<&str>) -> &'static str {
    match secret {
        Some(_) => "<set>",
        None => "<missing>",
    }
}

/// Overlay `SPREADSHEET_ID`, `SHEET_NAME` and `GOOGLE_APPLICATION_CREDENTIALS`.
/// A spreadsheet id from the environment also selects the sheets backend.
pub fn apply_env(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let get = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());
    if let Some(id) = get("SPREADSHEET_ID") {
        cfg.ledger.spreadsheet_id = Some(id);
        cfg.ledger.backend = LedgerBackend::Sheets;
    }
    if let Some(name) = get("SHEET_NAME") {
        cfg.ledger.sheet_name = name;
    }
    if let Some(key) = get("GOOGLE_APPLICATION_CREDENTIALS") {
        cfg.ledger.service_account_key = Some(PathBuf::from(key));
    }
}

pub fn config_path() -> Result<PathBuf> {
    Ok(ensure_tally_home()?.join("config.toml"))
}

pub fn default_csv_path() -> Result<PathBuf> {
    Ok(ensure_tally_home()?.join("ledger.csv"))
}

impl Config {
    /// Read `path`; a missing file means all defaults.
    pub fn read(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(s) => toml::from_str(&s).with_context(|| format!("parse {}", path.display())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let s = toml::to_string_pretty(self).context("serialize config")?;
        fs::write(path, s).with_context(|| format!("write {}", path.display()))
    }
}

/// File config from `~/.tally/config.toml` with environment overrides applied
pub fn load_config() -> Result<Config> {
    let mut cfg = Config::read(&config_path()?)?;
    apply_env(&mut cfg, |k| std::env::var(k).ok());
    Ok(cfg)
}

/// Write a default config at `path` unless one is there. Returns whether
/// a file was written.
pub fn init_config_at(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    Config::default().write(path)?;
    Ok(true)
}

/// Effective configuration as TOML, followed by which secrets are present.
pub fn render_config(cfg: &Config, secrets: &Secrets) -> Result<String> {
    let body = toml::to_string_pretty(cfg).context("serialize config")?;
    Ok(format!(
        "{body}\n# environment\n# BOT_TOKEN = {}\n# GEMINI_KEY = {}\n",
        redact(secrets.bot_token.as_deref()),
        redact(secrets.gemini_key.as_deref()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [ledger]
            backend = "sheets"
            spreadsheet_id = "abc"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.ledger.backend, LedgerBackend::Sheets);
        assert_eq!(cfg.ledger.sheet_name, "Sheet1");
        assert_eq!(cfg.chat.keyboard_columns, 2);
        assert_eq!(cfg.extraction.model, tally_ingest::gemini::DEFAULT_MODEL);
    }

    #[test]
    fn test_env_overrides_ledger() {
        let mut cfg = Config::default();
        apply_env(
            &mut cfg,
            env(&[
                ("SPREADSHEET_ID", "sheet-123"),
                ("SHEET_NAME", "June"),
                ("GOOGLE_APPLICATION_CREDENTIALS", "/keys/sa.json"),
            ]),
        );
        assert_eq!(cfg.ledger.backend, LedgerBackend::Sheets);
        assert_eq!(cfg.ledger.spreadsheet_id.as_deref(), Some("sheet-123"));
        assert_eq!(cfg.ledger.sheet_name, "June");
        assert_eq!(
            cfg.ledger.service_account_key,
            Some(PathBuf::from("/keys/sa.json"))
        );
    }

    #[test]
    fn test_blank_env_ignored() {
        let mut cfg = Config::default();
        apply_env(&mut cfg, env(&[("SPREADSHEET_ID", "  ")]));
        assert_eq!(cfg.ledger.backend, LedgerBackend::Csv);
        assert!(cfg.ledger.spreadsheet_id.is_none());
    }

    #[test]
    fn test_secrets_never_rendered() {
        let secrets = Secrets::from_lookup(env(&[("BOT_TOKEN", "123:abc"), ("GEMINI_KEY", "")]));
        assert_eq!(secrets.bot_token.as_deref(), Some("123:abc"));
        assert!(secrets.gemini_key.is_none());

        let shown = render_config(&Config::default(), &secrets).unwrap();
        assert!(!shown.contains("123:abc"));
        assert!(shown.contains("BOT_TOKEN = <set>"));
        assert!(shown.contains("GEMINI_KEY = <missing>"));
        assert!(!format!("{secrets:?}").contains("123:abc"));
    }

    #[test]
    fn test_init_writes_once_and_keeps_edits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        assert_eq!(Config::read(&path).unwrap().chat.keyboard_columns, 2);
        assert!(init_config_at(&path).unwrap());

        let mut cfg = Config::read(&path).unwrap();
        cfg.chat.keyboard_columns = 3;
        cfg.write(&path).unwrap();

        assert!(!init_config_at(&path).unwrap());
        assert_eq!(Config::read(&path).unwrap().chat.keyboard_columns, 3);
    }

    #[test]
    fn test_bad_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[chat]\nkeyboard_columns = \"two\"\n").unwrap();
        let err = Config::read(&path).unwrap_err();
        assert!(format!("{err:#}").contains("config.toml"));
    }

    #[test]
    fn test_default_round_trips_through_toml() {
        let s = toml::to_string_pretty(&Config::default()).unwrap();
        let back: Config = toml::from_str(&s).unwrap();
        assert_eq!(back.chat.currency_symbol, "₹");
        assert_eq!(back.ledger.backend, LedgerBackend::Csv);
    }
}
