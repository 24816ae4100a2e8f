//! Payout batch ingestion.
//!
//! ```text
//! payouts.csv → parser → PayoutRow[] → create_batch → draft batch + planned items
//! ```

pub mod batch;
pub mod parser;

// Re-export key types
pub use batch::{create_batch, IngestError, SourceDefaults};
pub use parser::{is_valid_address, parse_payout_csv, parse_token_amount, ParsedCsv, PayoutRow, RowError};
