//! Core types for the expense ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Exact arithmetic (Decimal for money)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// User identifier
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct UserId(Uuid);

impl UserId {
    /// Create new random user ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Get underlying UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Key bytes for storage
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Group identifier
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct GroupId(Uuid);

impl GroupId {
    /// Create new random group ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Get underlying UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Key bytes for storage
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for GroupId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Expense identifier (UUIDv7 for time-ordering)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ExpenseId(Uuid);

impl ExpenseId {
    /// Create new time-ordered expense ID
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Get underlying UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Key bytes for storage
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for ExpenseId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExpenseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Settlement identifier (UUIDv7 for time-ordering)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SettlementId(Uuid);

impl SettlementId {
    /// Create new time-ordered settlement ID
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get underlying UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Key bytes for storage
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for SettlementId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SettlementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Activity identifier (UUIDv7 for time-ordering)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ActivityId(Uuid);

impl ActivityId {
    /// Create new time-ordered activity ID
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get underlying UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Key bytes for storage
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for ActivityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ISO 4217 currency code
///
/// Carried as expense metadata only; reconciliation never converts or
/// mixes currencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Currency {
    /// US Dollar
    USD,
    /// Euro
    EUR,
    /// British Pound
    GBP,
    /// UAE Dirham
    AED,
    /// Indian Rupee
    INR,
}

impl Currency {
    /// ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::AED => "AED",
            Currency::INR => "INR",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "USD" => Some(Currency::USD),
            "EUR" => Some(Currency::EUR),
            "GBP" => Some(Currency::GBP),
            "AED" => Some(Currency::AED),
            "INR" => Some(Currency::INR),
            _ => None,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A shared expense
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    /// Expense ID
    pub expense_id: ExpenseId,

    /// Total amount paid
    pub amount: Decimal,

    /// Free-form description
    pub description: String,

    /// Currency (metadata only)
    pub currency: Currency,

    /// User who paid the full amount
    pub paid_by: UserId,

    /// Group scope, or `None` for an ungrouped expense
    pub group_id: Option<GroupId>,

    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

/// One participant's share of an expense
///
/// The live expense-participant links from which obligations are derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantShare {
    /// Expense this share belongs to
    pub expense_id: ExpenseId,

    /// Participant
    pub user_id: UserId,

    /// Amount this participant owes the payer
    pub amount_owed: Decimal,
}

/// An expense-sharing group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    /// Group ID
    pub group_id: GroupId,

    /// Display name
    pub name: String,

    /// Optional description
    pub description: Option<String>,

    /// Member user IDs
    pub members: Vec<UserId>,

    /// True exactly when no live debt summary rows remain for the group.
    /// Recomputed after every reconciliation pass that touches the group.
    pub settled: bool,
}

impl Group {
    /// Create a new unsettled group
    pub fn new(name: impl Into<String>, members: Vec<UserId>) -> Self {
        Self {
            group_id: GroupId::new(),
            name: name.into(),
            description: None,
            members,
            settled: false,
        }
    }
}

/// Canonical net-debt row: debtor owes creditor `amount_owed` within a scope
///
/// Rows are created, updated and deleted exclusively by the reconcilers;
/// `amount_owed` is strictly positive, a row that reaches zero is deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebtSummary {
    /// Group scope, or `None` for the ungrouped scope
    pub group_id: Option<GroupId>,

    /// User who owes
    pub debtor: UserId,

    /// User who is owed
    pub creditor: UserId,

    /// Outstanding amount, strictly positive
    pub amount_owed: Decimal,

    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

/// Immutable record of a payment that reduced a debt summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    /// Settlement ID
    pub settlement_id: SettlementId,

    /// User who was owed (received the payment)
    pub creditor: UserId,

    /// User who owed (made the payment)
    pub debtor: UserId,

    /// Amount paid
    pub amount: Decimal,

    /// Group scope, or `None` for the ungrouped scope
    pub group_id: Option<GroupId>,

    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

/// Kind of audit event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ActivityKind {
    /// Expense created
    ExpenseCreated = 1,
    /// Expense updated
    ExpenseUpdated = 2,
    /// Expense deleted
    ExpenseDeleted = 3,
    /// Debt settled
    DebtSettled = 4,
    /// Group created
    GroupCreated = 5,
    /// Group updated
    GroupUpdated = 6,
}

/// Audit record describing one ledger action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Activity ID
    pub activity_id: ActivityId,

    /// Kind of action
    pub kind: ActivityKind,

    /// Human-readable message
    pub message: String,

    /// Acting user
    pub user_id: UserId,

    /// Expense involved, if any
    pub expense_id: Option<ExpenseId>,

    /// Group involved, if any
    pub group_id: Option<GroupId>,

    /// Event timestamp
    pub timestamp: DateTime<Utc>,
}

impl Activity {
    /// Create a new activity record stamped now
    pub fn new(kind: ActivityKind, message: impl Into<String>, user_id: UserId) -> Self {
        Self {
            activity_id: ActivityId::new(),
            kind,
            message: message.into(),
            user_id,
            expense_id: None,
            group_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach an expense reference
    pub fn with_expense(mut self, expense_id: ExpenseId) -> Self {
        self.expense_id = Some(expense_id);
        self
    }

    /// Attach a group reference
    pub fn with_group(mut self, group_id: Option<GroupId>) -> Self {
        self.group_id = group_id;
        self
    }
}
