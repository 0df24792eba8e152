//! tally-core: transaction records, per-chat categorization sessions and the
//! engine that walks a screenshot's transactions into the ledger.

pub mod engine;
pub mod error;
pub mod gateway;
pub mod registry;
pub mod session;
pub mod store;
pub mod transaction;

pub use engine::Engine;
pub use error::SessionError;
pub use gateway::{ExtractionGateway, ImageRef, LedgerAck, LedgerGateway, Reply, Responder};
pub use registry::{escape_markdown, parse_categories};
pub use session::{Batch, FlushState, Phase, Prompt, PromptTag, Session};
pub use store::{ChatKey, SessionStore};
pub use transaction::{TransactionRecord, TxnType};
