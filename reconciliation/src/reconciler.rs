//! Full-group and incremental reconcilers
//!
//! Two obligation-set builders feed the one canonical netting function:
//!
//! - **Full rebuild** rescans every live expense of a group, folds in
//!   settlement adjustments, nets the lot and transactionally replaces the
//!   scope's canonical rows. The previous row set is discarded, not diffed,
//!   so the result is independent of operation history.
//! - **Incremental merge** ([`ScopeView`]) folds the netted transfers of a
//!   single expense into the existing rows without rescanning the scope.
//!   Removal merges the reversed transfers, so creating and then removing
//!   an expense restores the prior rows exactly.
//!
//! Both paths leave identical per-user net balances for the same live
//! obligation set; the row sets themselves may differ once three or more
//! users interact (the incremental path nets pairwise, the full path nets
//! multilaterally). [`verify_scope_consistency`] audits at the balance
//! level for exactly that reason.

use crate::{
    netting,
    types::{DebtDelta, NetTransfer, Obligation},
    Error, Result,
};
use chrono::Utc;
use expense_core::{storage::WriteOps, DebtSummary, ExpenseId, GroupId, Storage, UserId};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Collect the live obligations of a scope from its expenses and shares
///
/// `exclude` drops one expense from the scan (its replacement obligations,
/// if any, are supplied by the caller via `extra`), which lets a pass
/// reconcile around an expense that is being rewritten in the same batch.
pub fn scope_obligations(
    storage: &Storage,
    scope: Option<GroupId>,
    exclude: Option<ExpenseId>,
) -> Result<Vec<Obligation>> {
    let mut obligations = Vec::new();

    for expense in storage.list_scope_expenses(scope)? {
        if Some(expense.expense_id) == exclude {
            continue;
        }
        for share in storage.get_expense_shares(expense.expense_id)? {
            obligations.push(Obligation::new(
                share.user_id,
                expense.paid_by,
                share.amount_owed,
            ));
        }
    }

    Ok(obligations)
}

/// Recompute and transactionally replace a group's canonical debt rows
///
/// Nets every live obligation of the group (minus `exclude`, plus `extra`)
/// together with the settlement `adjustments`, stages the delete+insert of
/// the full row set into `ops`, and stages the recomputed settled flag.
/// Nothing is visible until the caller commits the batch.
pub fn rebuild_group(
    storage: &Storage,
    ops: &mut WriteOps<'_>,
    group_id: GroupId,
    exclude: Option<ExpenseId>,
    extra: &[Obligation],
    adjustments: &[Obligation],
) -> Result<Vec<DebtSummary>> {
    let mut obligations = scope_obligations(storage, Some(group_id), exclude)?;
    obligations.extend_from_slice(extra);
    obligations.extend_from_slice(adjustments);

    let gross: Decimal = obligations.iter().map(|o| o.amount).sum();
    let transfers = netting::compute_net_transfers(&obligations)?;
    let net: Decimal = transfers.iter().map(|t| t.amount).sum();

    tracing::debug!(
        group_id = %group_id,
        %gross,
        %net,
        rows = transfers.len(),
        "Group rebuild netted"
    );

    let now = Utc::now();
    let rows: Vec<DebtSummary> = transfers
        .into_iter()
        .map(|t| DebtSummary {
            group_id: Some(group_id),
            debtor: t.debtor,
            creditor: t.creditor,
            amount_owed: t.amount,
            created_at: now,
        })
        .collect();

    ops.replace_scope_summaries(Some(group_id), &rows)?;
    stage_settled_flag(storage, ops, group_id, rows.is_empty())?;

    Ok(rows)
}

/// Stage the group settled flag: true exactly when no live rows remain
pub fn stage_settled_flag(
    storage: &Storage,
    ops: &mut WriteOps<'_>,
    group_id: GroupId,
    settled: bool,
) -> Result<()> {
    let mut group = storage.get_group(group_id)?;
    if group.settled != settled {
        group.settled = settled;
        ops.put_group(&group)?;
    }
    Ok(())
}

/// In-memory view of one scope's canonical rows for incremental merging
///
/// Loaded once under the scope lock, mutated in memory, then staged back
/// as a diff so the whole merge commits atomically with the rest of the
/// operation.
#[derive(Debug)]
pub struct ScopeView {
    scope: Option<GroupId>,
    rows: BTreeMap<(UserId, UserId), DebtSummary>,
    baseline: Vec<(UserId, UserId)>,
}

impl ScopeView {
    /// Load the scope's current rows
    pub fn load(storage: &Storage, scope: Option<GroupId>) -> Result<Self> {
        let mut rows = BTreeMap::new();
        for summary in storage.list_scope_summaries(scope)? {
            rows.insert((summary.debtor, summary.creditor), summary);
        }
        let baseline = rows.keys().copied().collect();

        Ok(Self {
            scope,
            rows,
            baseline,
        })
    }

    /// Merge the netted transfers of one new or changed expense
    pub fn apply(&mut self, transfers: &[NetTransfer]) -> Vec<DebtDelta> {
        transfers
            .iter()
            .map(|t| self.merge(t.debtor, t.creditor, t.amount))
            .collect()
    }

    /// Merge the reversal of one removed expense's netted transfers
    pub fn remove(&mut self, transfers: &[NetTransfer]) -> Vec<DebtDelta> {
        transfers
            .iter()
            .map(|t| self.merge(t.creditor, t.debtor, t.amount))
            .collect()
    }

    /// Merge a single transfer into the row set
    ///
    /// Forward row exists: add in place. Reverse row exists: subtract,
    /// deleting it at zero and flipping any positive remainder into a new
    /// forward row. Otherwise insert a fresh forward row.
    fn merge(&mut self, debtor: UserId, creditor: UserId, amount: Decimal) -> DebtDelta {
        if let Some(row) = self.rows.get_mut(&(debtor, creditor)) {
            row.amount_owed += amount;
        } else if let Some(reverse) = self.rows.get_mut(&(creditor, debtor)) {
            if reverse.amount_owed > amount {
                reverse.amount_owed -= amount;
            } else {
                let remainder = amount - reverse.amount_owed;
                self.rows.remove(&(creditor, debtor));
                if remainder > Decimal::ZERO {
                    self.insert(debtor, creditor, remainder);
                }
            }
        } else {
            self.insert(debtor, creditor, amount);
        }

        DebtDelta {
            debtor,
            creditor,
            amount,
        }
    }

    fn insert(&mut self, debtor: UserId, creditor: UserId, amount: Decimal) {
        self.rows.insert(
            (debtor, creditor),
            DebtSummary {
                group_id: self.scope,
                debtor,
                creditor,
                amount_owed: amount,
                created_at: Utc::now(),
            },
        );
    }

    /// Number of live rows the scope will hold after staging
    pub fn live_rows(&self) -> usize {
        self.rows.len()
    }

    /// Per-user net balances implied by the current rows
    pub fn balances(&self) -> BTreeMap<UserId, Decimal> {
        summary_balances(self.rows.values())
    }

    /// Stage the accumulated diff into a write batch
    pub fn stage(&self, ops: &mut WriteOps<'_>) -> Result<()> {
        for key in &self.baseline {
            if !self.rows.contains_key(key) {
                ops.delete_summary(self.scope, key.0, key.1)?;
            }
        }
        for row in self.rows.values() {
            ops.put_summary(row)?;
        }
        Ok(())
    }
}

/// Per-user net balances implied by a set of canonical rows
pub fn summary_balances<'a>(
    rows: impl IntoIterator<Item = &'a DebtSummary>,
) -> BTreeMap<UserId, Decimal> {
    let mut balances = BTreeMap::new();
    for row in rows {
        *balances.entry(row.debtor).or_insert(Decimal::ZERO) -= row.amount_owed;
        *balances.entry(row.creditor).or_insert(Decimal::ZERO) += row.amount_owed;
    }
    balances
}

/// Audit a scope's stored rows against its live obligations
///
/// Compares the per-user net balances implied by the stored canonical rows
/// with a fresh netting of the scope's live obligations plus the given
/// settlement `adjustments`. A mismatch means the canonical ledger has
/// drifted and is reported as [`Error::ReconciliationInconsistency`].
pub fn verify_scope_consistency(
    storage: &Storage,
    scope: Option<GroupId>,
    adjustments: &[Obligation],
) -> Result<()> {
    let mut obligations = scope_obligations(storage, scope, None)?;
    obligations.extend_from_slice(adjustments);

    let expected = netting::net_balances(&obligations);
    let actual = summary_balances(storage.list_scope_summaries(scope)?.iter());

    let users: std::collections::BTreeSet<UserId> =
        expected.keys().chain(actual.keys()).copied().collect();

    for user in users {
        let want = expected.get(&user).copied().unwrap_or(Decimal::ZERO);
        let got = actual.get(&user).copied().unwrap_or(Decimal::ZERO);
        if want != got {
            return Err(Error::ReconciliationInconsistency(format!(
                "user {} holds stored balance {} but live obligations imply {}",
                user, got, want
            )));
        }
    }

    Ok(())
}
