//! End-to-end reconciliation scenarios over a real store

use expense_core::{Currency, Group, GroupId, UserId};
use reconciliation::{
    Config, Error, ExpenseDraft, ReconcileEngine, ReconcileOutcome, SplitKind, SplitMode,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tempfile::TempDir;

fn test_engine() -> (ReconcileEngine, TempDir) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let temp_dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.store.data_dir = temp_dir.path().to_path_buf();
    config.verify_reconciliation = true;
    (ReconcileEngine::new(config).unwrap(), temp_dir)
}

fn dec(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

fn seed_group(engine: &ReconcileEngine, members: Vec<UserId>) -> GroupId {
    let group = Group::new("Flat 7B", members);
    let mut ops = engine.storage().batch();
    ops.put_group(&group).unwrap();
    ops.commit().unwrap();
    group.group_id
}

fn paid_for(
    engine: &ReconcileEngine,
    payer: UserId,
    debtor: UserId,
    group_id: Option<GroupId>,
    cents: i64,
) -> reconciliation::ExpenseReceipt {
    let mut splits = HashMap::new();
    splits.insert(debtor, dec(cents));
    engine
        .create_expense(&ExpenseDraft {
            acted_by: payer,
            amount: dec(cents),
            description: "Covered".to_string(),
            currency: Currency::INR,
            payer,
            group_id,
            participants: vec![debtor],
            split: SplitKind::Custom {
                mode: SplitMode::Amount,
                splits,
            },
        })
        .unwrap()
}

#[test]
fn scenario_single_pair_passthrough() {
    // One obligation nets to exactly one canonical row
    let (engine, _temp) = test_engine();
    let (a, b) = (UserId::new(), UserId::new());
    let group = seed_group(&engine, vec![a, b]);

    paid_for(&engine, a, b, Some(group), 3000);

    let rows = engine.storage().list_scope_summaries(Some(group)).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!((rows[0].debtor, rows[0].creditor), (b, a));
    assert_eq!(rows[0].amount_owed, dec(3000));
}

#[test]
fn scenario_fan_in_with_counter_obligation() {
    // B owes A 10, C owes A 10, A owes C 5: transfers sum to A's +15
    let (engine, _temp) = test_engine();
    let (a, b, c) = (UserId::new(), UserId::new(), UserId::new());
    let group = seed_group(&engine, vec![a, b, c]);

    paid_for(&engine, a, b, Some(group), 1000);
    paid_for(&engine, a, c, Some(group), 1000);
    paid_for(&engine, c, a, Some(group), 500);

    let rows = engine.storage().list_scope_summaries(Some(group)).unwrap();
    let total: Decimal = rows.iter().map(|r| r.amount_owed).sum();
    assert_eq!(total, dec(1500));
    assert!(rows.iter().all(|r| r.creditor == a));
}

#[test]
fn scenario_partial_then_full_settlement() {
    let (engine, _temp) = test_engine();
    let (a, b) = (UserId::new(), UserId::new());
    let group = seed_group(&engine, vec![a, b]);

    paid_for(&engine, a, b, Some(group), 3000);

    // Settle 10 of 30: row shrinks, settlement recorded, group unsettled
    let remaining = engine
        .apply_settlement(Some(group), b, a, dec(1000), b)
        .unwrap();
    assert_eq!(remaining, dec(2000));

    let row = engine
        .storage()
        .get_summary(Some(group), b, a)
        .unwrap()
        .unwrap();
    assert_eq!(row.amount_owed, dec(2000));
    assert_eq!(
        engine
            .storage()
            .list_scope_settlements(Some(group))
            .unwrap()
            .len(),
        1
    );
    assert!(!engine.storage().get_group(group).unwrap().settled);

    // Settle the remaining 20: row deleted, group settled
    let remaining = engine
        .apply_settlement(Some(group), b, a, dec(2000), b)
        .unwrap();
    assert_eq!(remaining, Decimal::ZERO);
    assert!(engine
        .storage()
        .get_summary(Some(group), b, a)
        .unwrap()
        .is_none());
    assert!(engine.storage().get_group(group).unwrap().settled);
}

#[test]
fn scenario_three_cycle_nets_to_nothing() {
    // A owes B 5, B owes C 5, C owes A 5: every balance zero
    let (engine, _temp) = test_engine();
    let (a, b, c) = (UserId::new(), UserId::new(), UserId::new());
    let group = seed_group(&engine, vec![a, b, c]);

    paid_for(&engine, b, a, Some(group), 500);
    paid_for(&engine, c, b, Some(group), 500);
    paid_for(&engine, a, c, Some(group), 500);

    assert!(engine
        .storage()
        .list_scope_summaries(Some(group))
        .unwrap()
        .is_empty());
    assert!(engine.storage().get_group(group).unwrap().settled);
}

#[test]
fn scenario_settlement_survives_full_rebuild() {
    // A paid 30 for B, B settled 10, then the group is rebuilt: the
    // remaining debt must be 20, not the full 30
    let (engine, _temp) = test_engine();
    let (a, b) = (UserId::new(), UserId::new());
    let group = seed_group(&engine, vec![a, b]);

    paid_for(&engine, a, b, Some(group), 3000);
    engine
        .apply_settlement(Some(group), b, a, dec(1000), b)
        .unwrap();

    let adjustments = engine
        .settlement_adjustments(Some(group), a, &[b])
        .unwrap();
    let rows = engine.reconcile_group(group, &adjustments).unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].amount_owed, dec(2000));
}

#[test]
fn scenario_ungrouped_lifecycle() {
    let (engine, _temp) = test_engine();
    let (a, b) = (UserId::new(), UserId::new());

    let receipt = paid_for(&engine, a, b, None, 3000);
    assert!(matches!(receipt.outcome, ReconcileOutcome::Merged(_)));

    // Counter-expense shrinks the existing row instead of adding a second
    paid_for(&engine, b, a, None, 1000);
    let rows = engine.storage().list_scope_summaries(None).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!((rows[0].debtor, rows[0].creditor), (b, a));
    assert_eq!(rows[0].amount_owed, dec(2000));

    // Deleting the first expense flips the remainder
    engine.delete_expense(receipt.expense_id, a).unwrap();
    let rows = engine.storage().list_scope_summaries(None).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!((rows[0].debtor, rows[0].creditor), (a, b));
    assert_eq!(rows[0].amount_owed, dec(1000));
}

#[test]
fn scenario_settling_unknown_row_is_rejected() {
    let (engine, _temp) = test_engine();
    let (a, b) = (UserId::new(), UserId::new());
    let group = seed_group(&engine, vec![a, b]);

    paid_for(&engine, a, b, Some(group), 3000);

    // Direction must match the one netting chose
    let result = engine.apply_settlement(Some(group), a, b, dec(1000), a);
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[test]
fn scenario_group_reopens_after_new_expense() {
    let (engine, _temp) = test_engine();
    let (a, b) = (UserId::new(), UserId::new());
    let group = seed_group(&engine, vec![a, b]);

    paid_for(&engine, a, b, Some(group), 1000);
    engine
        .apply_settlement(Some(group), b, a, dec(1000), b)
        .unwrap();
    assert!(engine.storage().get_group(group).unwrap().settled);

    paid_for(&engine, a, b, Some(group), 500);
    assert!(!engine.storage().get_group(group).unwrap().settled);
}
