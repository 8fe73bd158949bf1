//! Core types for the reconciliation engine

use expense_core::{Currency, GroupId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One weighted directed debt edge: `debtor` owes `creditor` `amount`
///
/// Derived from a single expense-participant pair or a historical
/// settlement adjustment, never persisted directly. `debtor == creditor`
/// is tolerated and cancels out during netting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Obligation {
    /// User who owes
    pub debtor: UserId,

    /// User who is owed
    pub creditor: UserId,

    /// Non-negative amount owed
    pub amount: Decimal,
}

impl Obligation {
    /// Create a new obligation
    pub fn new(debtor: UserId, creditor: UserId, amount: Decimal) -> Self {
        Self {
            debtor,
            creditor,
            amount,
        }
    }
}

/// Net transfer after netting: `debtor` pays `creditor` `amount`
///
/// Amount is strictly positive by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetTransfer {
    /// User who pays
    pub debtor: UserId,

    /// User who receives
    pub creditor: UserId,

    /// Net amount to transfer, strictly positive
    pub amount: Decimal,
}

/// One merge applied to the canonical debt rows by the incremental reconciler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebtDelta {
    /// Debtor of the merged transfer
    pub debtor: UserId,

    /// Creditor of the merged transfer
    pub creditor: UserId,

    /// Amount merged
    pub amount: Decimal,
}

/// How an expense is split among its participants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SplitKind {
    /// Every participant owes an equal share of the total
    Equal,
    /// Per-participant amounts or weights
    Custom {
        /// Interpretation of the split values
        mode: SplitMode,
        /// Split value per participant; missing participants owe zero
        splits: HashMap<UserId, Decimal>,
    },
}

/// Interpretation of custom split values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitMode {
    /// Values are absolute amounts
    Amount,
    /// Values are relative weights of the total
    Share,
}

/// Input for creating or updating an expense
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseDraft {
    /// User performing the action (for the audit trail)
    pub acted_by: UserId,

    /// Total amount paid
    pub amount: Decimal,

    /// Free-form description
    pub description: String,

    /// Currency (metadata only)
    pub currency: Currency,

    /// User who paid the full amount
    pub payer: UserId,

    /// Group scope, or `None` for an ungrouped expense
    pub group_id: Option<GroupId>,

    /// Participants sharing the expense
    pub participants: Vec<UserId>,

    /// Split configuration
    pub split: SplitKind,
}

/// Request to settle part or all of one canonical debt row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettleRequest {
    /// User performing the action (for the audit trail)
    pub acted_by: UserId,

    /// Scope of the debt row
    pub group_id: Option<GroupId>,

    /// Debtor of the row, as chosen by netting
    pub debtor: UserId,

    /// Creditor of the row, as chosen by netting
    pub creditor: UserId,

    /// Amount paid; must be positive and at most the outstanding amount
    pub amount: Decimal,
}

/// Result of one reconciliation pass
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// Full recompute replaced the scope's canonical rows
    Replaced(Vec<expense_core::DebtSummary>),

    /// Incremental merge applied these deltas to the scope's rows
    Merged(Vec<DebtDelta>),
}

/// Receipt for an expense create/update/delete
#[derive(Debug, Clone, PartialEq)]
pub struct ExpenseReceipt {
    /// The expense acted on
    pub expense_id: expense_core::ExpenseId,

    /// What the reconciliation pass did to the canonical rows
    pub outcome: ReconcileOutcome,
}
