//! Application layer - Use cases and port interfaces
//!
//! Contains the core business operations and trait definitions
//! for external system interactions.

pub mod admission;
pub mod aggregator;
pub mod context;
pub mod formatting;
pub mod ledger;
pub mod ports;
pub mod progress;
pub mod settlement;
pub mod worker;

// Re-export use cases
pub use admission::AdmissionService;
pub use aggregator::{BatchAggregator, BatchDispatch};
pub use context::ServiceContext;
pub use formatting::{FormatBackendKind, FormatOptions, FormattingChain};
pub use ledger::{BalanceLedger, LedgerError};
pub use progress::ProgressNotifier;
pub use settlement::{SettleOutcome, SettlementError, SettlementService};
pub use worker::JobWorker;
