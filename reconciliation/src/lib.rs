//! FairShare Reconciliation Engine
//!
//! Converts a growing, mutable set of pairwise expense obligations into a
//! minimal, canonical set of net debt rows, and keeps that canonical set
//! consistent as expenses are created, edited, deleted or settled.
//!
//! # Architecture
//!
//! 1. **Split**: expand an expense into per-participant obligations
//! 2. **Netting**: reduce obligations to minimal-total-volume transfers
//! 3. **Reconcile**: full-group rebuild or single-expense incremental merge
//! 4. **Settle**: apply payments against canonical rows
//!
//! Both reconcilers feed the same netting function; they differ only in how
//! the obligation set is built (full rescan vs. single-expense delta).
//!
//! # Invariants
//!
//! - Conservation: per-user net balances always sum to exactly zero
//! - Minimality: netted volume equals `Σ max(balance, 0)`
//! - Atomicity: one reconciliation pass is one write batch
//! - A group is flagged settled exactly when it has no live debt rows
//!
//! # Example
//!
//! ```no_run
//! use reconciliation::{Config, ReconcileEngine};
//!
//! fn main() -> reconciliation::Result<()> {
//!     let config = Config::default();
//!     let engine = ReconcileEngine::new(config)?;
//!
//!     // let receipt = engine.create_expense(&draft)?;
//!     // let remaining = engine.apply_settlement(group, debtor, creditor, amount, actor)?;
//!
//!     engine.shutdown()?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod netting;
pub mod reconciler;
pub mod settle;
pub mod split;
pub mod types;

// Re-exports
pub use config::Config;
pub use engine::ReconcileEngine;
pub use error::{Error, Result};
pub use types::{
    DebtDelta, ExpenseDraft, ExpenseReceipt, NetTransfer, Obligation, ReconcileOutcome,
    SettleRequest, SplitKind, SplitMode,
};
