//! Settlement application
//!
//! Reduces or clears one canonical debt row when a payment occurs, records
//! the immutable settlement, recomputes the group settled flag and emits
//! exactly one audit event. Everything commits in a single batch.

use crate::{types::SettleRequest, Error, Result};
use chrono::Utc;
use expense_core::{Activity, ActivityKind, Settlement, SettlementId, Storage};
use rust_decimal::Decimal;

/// Apply a settlement against the matching canonical debt row
///
/// The lookup uses the exact `(scope, debtor, creditor)` direction chosen
/// by netting; the reversed pair is deliberately not searched. Fails with
/// [`Error::NotFound`] when no such row exists and [`Error::Validation`]
/// when the amount is non-positive or exceeds the outstanding amount.
/// Returns the amount still owed after the payment.
pub fn apply_settlement(storage: &Storage, request: &SettleRequest) -> Result<Decimal> {
    let mut row = storage
        .get_summary(request.group_id, request.debtor, request.creditor)?
        .ok_or_else(|| {
            Error::NotFound(format!(
                "no debt row where {} owes {}",
                request.debtor, request.creditor
            ))
        })?;

    if request.amount <= Decimal::ZERO || request.amount > row.amount_owed {
        return Err(Error::Validation(format!(
            "settlement amount {} must be positive and at most the outstanding {}",
            request.amount, row.amount_owed
        )));
    }

    let remaining = row.amount_owed - request.amount;

    let mut ops = storage.batch();

    if remaining > Decimal::ZERO {
        row.amount_owed = remaining;
        ops.put_summary(&row)?;
    } else {
        ops.delete_summary(request.group_id, request.debtor, request.creditor)?;
    }

    ops.put_settlement(&Settlement {
        settlement_id: SettlementId::new(),
        creditor: request.creditor,
        debtor: request.debtor,
        amount: request.amount,
        group_id: request.group_id,
        created_at: Utc::now(),
    })?;

    // Settled flag: true exactly when this pass leaves no live rows
    if let Some(group_id) = request.group_id {
        let rows = storage.list_scope_summaries(Some(group_id))?;
        let live = rows.len() - usize::from(remaining <= Decimal::ZERO);
        crate::reconciler::stage_settled_flag(storage, &mut ops, group_id, live == 0)?;
    }

    ops.put_activity(
        &Activity::new(
            ActivityKind::DebtSettled,
            format!(
                "{} settled between {} and {}",
                request.amount, request.debtor, request.creditor
            ),
            request.acted_by,
        )
        .with_group(request.group_id),
    )?;

    ops.commit()?;

    tracing::info!(
        debtor = %request.debtor,
        creditor = %request.creditor,
        amount = %request.amount,
        %remaining,
        "Debt settled"
    );

    Ok(remaining)
}
