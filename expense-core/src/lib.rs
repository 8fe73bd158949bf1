//! FairShare Expense Core
//!
//! Persisted domain model and storage layer for the shared-expense ledger.
//!
//! # Architecture
//!
//! - **Typed records**: expenses, participant shares, groups, canonical debt
//!   summaries, append-only settlements and audit records
//! - **RocksDB storage**: one column family per record kind, prefix-encoded
//!   keys for scope scans
//! - **Atomic batches**: every logical operation commits through a single
//!   [`storage::WriteOps`] batch, never exposing partial state
//!
//! # Invariants
//!
//! - Debt summary rows carry a strictly positive `amount_owed`
//! - Settlement records are written once and never modified
//! - Summary rows are mutated only by the reconciliation engine

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod config;
pub mod error;
pub mod storage;
pub mod types;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use storage::{Storage, WriteOps};
pub use types::{
    Activity, ActivityId, ActivityKind, Currency, DebtSummary, Expense, ExpenseId, Group, GroupId,
    ParticipantShare, Settlement, SettlementId, UserId,
};
