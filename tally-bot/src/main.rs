use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tally_core::{Engine, ExtractionGateway, ImageRef, LedgerGateway};
use tally_ingest::{GeminiConfig, GeminiExtractor};
use tally_ledger::CsvLedger;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod render;
mod state;
mod telegram;

use config::{Config, LedgerBackend, Secrets};

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("TALLY_BUILD_SHA"), ")");

#[derive(Parser, Debug)]
#[command(name = "tally", version = VERSION, about = "Categorize payment screenshots into a spending sheet")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the Telegram bot (needs BOT_TOKEN and GEMINI_KEY)
    Serve,

    /// Extract transactions from one screenshot and print them as JSON
    Extract {
        /// Local file or http(s) URL
        image: String,
    },

    /// Configuration file helpers
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write ~/.tally/config.toml with defaults if it does not exist
    Init,

    /// Print the effective configuration (secrets omitted)
    Show,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("warn,tally=info,tally_core=info,tally_ingest=info,tally_ledger=info")
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve => serve().await?,

        Command::Extract { image } => {
            let cfg = config::load_config()?;
            let extractor = extractor(&cfg, &Secrets::from_env())?;
            let records = extractor.extract(&ImageRef::new(image)).await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }

        Command::Config { command } => match command {
            ConfigCommand::Init => {
                let path = config::config_path()?;
                if config::init_config_at(&path)? {
                    println!("Wrote {}", path.display());
                } else {
                    println!("Config already exists: {}", path.display());
                }
            }
            ConfigCommand::Show => {
                let cfg = config::load_config()?;
                print!("{}", config::render_config(&cfg, &Secrets::from_env())?);
            }
        },
    }

    Ok(())
}

async fn serve() -> Result<()> {
    let cfg = config::load_config()?;
    let secrets = Secrets::from_env();
    let Some(token) = secrets.bot_token.clone() else {
        bail!("BOT_TOKEN is not set");
    };

    let extractor = Arc::new(extractor(&cfg, &secrets)?);
    let ledger = ledger(&cfg).await?;
    let engine = Engine::new(extractor, ledger);

    info!(
        version = VERSION,
        backend = ?cfg.ledger.backend,
        model = %cfg.extraction.model,
        "starting tally"
    );
    telegram::run(token, engine, cfg.chat).await
}

fn extractor(cfg: &Config, secrets: &Secrets) -> Result<GeminiExtractor> {
    let Some(key) = secrets.gemini_key.clone() else {
        bail!("GEMINI_KEY is not set");
    };
    let mut gemini = GeminiConfig::new(key);
    gemini.model = cfg.extraction.model.clone();
    gemini.base_url = cfg.extraction.base_url.clone();
    gemini.temperature = cfg.extraction.temperature;
    Ok(GeminiExtractor::new(gemini))
}

async fn ledger(cfg: &Config) -> Result<Arc<dyn LedgerGateway>> {
    match cfg.ledger.backend {
        LedgerBackend::Csv => {
            let path = match &cfg.ledger.csv_path {
                Some(p) => p.clone(),
                None => config::default_csv_path()?,
            };
            info!(path = %path.display(), "using csv ledger");
            Ok(Arc::new(CsvLedger::new(
                path,
                cfg.ledger.csv_categories.clone(),
            )))
        }
        LedgerBackend::Sheets => sheets_ledger(cfg).await,
    }
}

#[cfg(feature = "sheets")]
async fn sheets_ledger(cfg: &Config) -> Result<Arc<dyn LedgerGateway>> {
    use anyhow::Context;
    use tally_ledger::{SheetsConfig, SheetsLedger};

    let spreadsheet_id = cfg
        .ledger
        .spreadsheet_id
        .clone()
        .context("ledger.spreadsheet_id (or SPREADSHEET_ID) is required for the sheets backend")?;
    let key = cfg.ledger.service_account_key.as_deref().context(
        "ledger.service_account_key (or GOOGLE_APPLICATION_CREDENTIALS) is required for the sheets backend",
    )?;
    let sheets = SheetsConfig {
        spreadsheet_id,
        sheet_name: cfg.ledger.sheet_name.clone(),
    };
    Ok(Arc::new(SheetsLedger::connect(sheets, key).await?))
}

#[cfg(not(feature = "sheets"))]
async fn sheets_ledger(_cfg: &Config) -> Result<Arc<dyn LedgerGateway>> {
    bail!("this build has no Google Sheets support; rebuild with `--features sheets` or set ledger.backend = \"csv\"")
}
