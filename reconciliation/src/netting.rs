//! Debt netting algorithm
//!
//! Reduces a multiset of pairwise obligations to a minimal-total-volume set
//! of net transfers.
//!
//! # Algorithm
//!
//! 1. Sum obligations into per-user net balances
//! 2. Split users into net payers and net receivers
//! 3. Greedy matching of largest payer against largest receiver
//!
//! The total transferred amount always equals `Σ max(balance, 0)`, the
//! provable minimum. The algorithm does **not** minimize the number of
//! transfer edges; when more than two users carry a non-zero balance,
//! several equally valid transfer plans exist and callers must not assume
//! edge-count minimality.
//!
//! # Example
//!
//! ```text
//! Obligations:
//!   B owes A: 10
//!   C owes A: 10
//!   A owes C: 5
//!
//! Net balances:
//!   A: +15 (net receiver)
//!   B: -10 (net payer)
//!   C:  -5 (net payer)
//!
//! Net transfers:
//!   B pays A: 10
//!   C pays A: 5
//! ```

use crate::{
    types::{NetTransfer, Obligation},
    Error, Result,
};
use expense_core::UserId;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Sum obligations into signed per-user net balances
///
/// Positive means net creditor, negative means net debtor. The balances of
/// a self-obligation (`debtor == creditor`) cancel in place.
pub fn net_balances(obligations: &[Obligation]) -> BTreeMap<UserId, Decimal> {
    let mut balances = BTreeMap::new();

    for obligation in obligations {
        *balances.entry(obligation.debtor).or_insert(Decimal::ZERO) -= obligation.amount;
        *balances.entry(obligation.creditor).or_insert(Decimal::ZERO) += obligation.amount;
    }

    balances
}

/// Minimal total volume any feasible transfer plan must move
pub fn minimum_transfer_volume(balances: &BTreeMap<UserId, Decimal>) -> Decimal {
    balances
        .values()
        .filter(|balance| **balance > Decimal::ZERO)
        .sum()
}

/// Net a set of obligations into transfers that zero every balance
///
/// Deterministic: equal balances are matched in user-ID order. Returns
/// [`Error::ReconciliationInconsistency`] if the balances do not conserve
/// or the emitted transfers fail to cancel them exactly; both are internal
/// invariant violations and the pass must be aborted.
pub fn compute_net_transfers(obligations: &[Obligation]) -> Result<Vec<NetTransfer>> {
    let balances = net_balances(obligations);

    // Conservation: signed balances must cancel exactly
    let total: Decimal = balances.values().sum();
    if !total.is_zero() {
        return Err(Error::ReconciliationInconsistency(format!(
            "net balances sum to {} instead of zero",
            total
        )));
    }

    // Separate net payers and net receivers, largest first. BTreeMap
    // iteration plus stable sort keeps ties in user-ID order.
    let mut payers: Vec<(UserId, Decimal)> = balances
        .iter()
        .filter(|(_, balance)| **balance < Decimal::ZERO)
        .map(|(user, balance)| (*user, -*balance))
        .collect();
    let mut receivers: Vec<(UserId, Decimal)> = balances
        .iter()
        .filter(|(_, balance)| **balance > Decimal::ZERO)
        .map(|(user, balance)| (*user, *balance))
        .collect();

    payers.sort_by(|a, b| b.1.cmp(&a.1));
    receivers.sort_by(|a, b| b.1.cmp(&a.1));

    // Greedy matching: largest payer against largest receiver
    let mut transfers = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < payers.len() && j < receivers.len() {
        let amount = payers[i].1.min(receivers[j].1);

        transfers.push(NetTransfer {
            debtor: payers[i].0,
            creditor: receivers[j].0,
            amount,
        });

        payers[i].1 -= amount;
        receivers[j].1 -= amount;

        if payers[i].1.is_zero() {
            i += 1;
        }
        if receivers[j].1.is_zero() {
            j += 1;
        }
    }

    // The emitted transfers must drive every balance back to zero
    let mut residual = balances;
    for transfer in &transfers {
        *residual.entry(transfer.debtor).or_insert(Decimal::ZERO) += transfer.amount;
        *residual.entry(transfer.creditor).or_insert(Decimal::ZERO) -= transfer.amount;
    }
    if let Some((user, balance)) = residual.iter().find(|(_, balance)| !balance.is_zero()) {
        return Err(Error::ReconciliationInconsistency(format!(
            "transfer plan leaves user {} with residual balance {}",
            user, balance
        )));
    }

    Ok(transfers)
}
