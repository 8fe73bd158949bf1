//! Expense split calculation
//!
//! Expands an [`ExpenseDraft`] into one obligation per participant toward
//! the payer. Validation happens here, before any state mutation.

use crate::{
    types::{ExpenseDraft, Obligation, SplitKind, SplitMode},
    Error, Result,
};
use rust_decimal::Decimal;

/// Validate a draft before any state is touched
///
/// Rejects non-positive amounts, empty participant lists and invalid split
/// configurations.
pub fn validate(draft: &ExpenseDraft) -> Result<()> {
    if draft.amount <= Decimal::ZERO {
        return Err(Error::Validation(
            "expense amount must be greater than zero".to_string(),
        ));
    }

    if draft.participants.is_empty() {
        return Err(Error::Validation(
            "at least one participant is required".to_string(),
        ));
    }

    if let SplitKind::Custom { mode, splits } = &draft.split {
        if splits.values().any(|v| *v < Decimal::ZERO) {
            return Err(Error::Validation(
                "split values must not be negative".to_string(),
            ));
        }

        if *mode == SplitMode::Share {
            let total: Decimal = draft
                .participants
                .iter()
                .filter_map(|p| splits.get(p))
                .sum();
            if total <= Decimal::ZERO {
                return Err(Error::Validation(
                    "share split requires a positive total weight".to_string(),
                ));
            }
        }
    }

    Ok(())
}

/// Expand a draft into per-participant obligations toward the payer
///
/// Participants absent from a custom split owe zero. The payer may appear
/// among the participants; the resulting self-obligation cancels during
/// netting.
pub fn expand(draft: &ExpenseDraft) -> Result<Vec<Obligation>> {
    validate(draft)?;

    let obligations = match &draft.split {
        SplitKind::Equal => {
            let share = draft.amount / Decimal::from(draft.participants.len() as u64);
            draft
                .participants
                .iter()
                .map(|participant| Obligation::new(*participant, draft.payer, share))
                .collect()
        }
        SplitKind::Custom { mode, splits } => match mode {
            SplitMode::Amount => draft
                .participants
                .iter()
                .map(|participant| {
                    let owed = splits.get(participant).copied().unwrap_or(Decimal::ZERO);
                    Obligation::new(*participant, draft.payer, owed)
                })
                .collect(),
            SplitMode::Share => {
                let total: Decimal = draft
                    .participants
                    .iter()
                    .filter_map(|p| splits.get(p))
                    .sum();
                draft
                    .participants
                    .iter()
                    .map(|participant| {
                        let weight = splits.get(participant).copied().unwrap_or(Decimal::ZERO);
                        let owed = weight / total * draft.amount;
                        Obligation::new(*participant, draft.payer, owed)
                    })
                    .collect()
            }
        },
    };

    Ok(obligations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use expense_core::{Currency, UserId};
    use std::collections::HashMap;

    fn dec(cents: i64) -> Decimal {
        Decimal::new(cents, 2)
    }

    fn draft(payer: UserId, participants: Vec<UserId>, split: SplitKind) -> ExpenseDraft {
        ExpenseDraft {
            acted_by: payer,
            amount: dec(9000),
            description: "Groceries".to_string(),
            currency: Currency::INR,
            payer,
            group_id: None,
            participants,
            split,
        }
    }

    #[test]
    fn test_equal_split() {
        let payer = UserId::new();
        let (a, b, c) = (UserId::new(), UserId::new(), UserId::new());

        let obligations = expand(&draft(payer, vec![a, b, c], SplitKind::Equal)).unwrap();

        assert_eq!(obligations.len(), 3);
        assert!(obligations.iter().all(|o| o.creditor == payer));
        assert!(obligations.iter().all(|o| o.amount == dec(3000)));
    }

    #[test]
    fn test_custom_amount_split() {
        let payer = UserId::new();
        let (a, b) = (UserId::new(), UserId::new());

        let mut splits = HashMap::new();
        splits.insert(a, dec(6000));

        let obligations = expand(&draft(
            payer,
            vec![a, b],
            SplitKind::Custom {
                mode: SplitMode::Amount,
                splits,
            },
        ))
        .unwrap();

        assert_eq!(obligations[0].amount, dec(6000));
        // Participants absent from the split owe zero
        assert_eq!(obligations[1].amount, Decimal::ZERO);
    }

    #[test]
    fn test_custom_share_split() {
        let payer = UserId::new();
        let (a, b) = (UserId::new(), UserId::new());

        let mut splits = HashMap::new();
        splits.insert(a, Decimal::from(2));
        splits.insert(b, Decimal::from(1));

        let obligations = expand(&draft(
            payer,
            vec![a, b],
            SplitKind::Custom {
                mode: SplitMode::Share,
                splits,
            },
        ))
        .unwrap();

        assert_eq!(obligations[0].amount, dec(6000));
        assert_eq!(obligations[1].amount, dec(3000));
    }

    #[test]
    fn test_rejects_non_positive_amount() {
        let payer = UserId::new();
        let mut d = draft(payer, vec![UserId::new()], SplitKind::Equal);
        d.amount = Decimal::ZERO;

        assert!(matches!(validate(&d), Err(Error::Validation(_))));
    }

    #[test]
    fn test_rejects_empty_participants() {
        let payer = UserId::new();
        let d = draft(payer, vec![], SplitKind::Equal);

        assert!(matches!(validate(&d), Err(Error::Validation(_))));
    }

    #[test]
    fn test_rejects_zero_total_share() {
        let payer = UserId::new();
        let a = UserId::new();

        let d = draft(
            payer,
            vec![a],
            SplitKind::Custom {
                mode: SplitMode::Share,
                splits: HashMap::new(),
            },
        );

        assert!(matches!(validate(&d), Err(Error::Validation(_))));
    }

    #[test]
    fn test_rejects_negative_split_value() {
        let payer = UserId::new();
        let a = UserId::new();

        let mut splits = HashMap::new();
        splits.insert(a, dec(-100));

        let d = draft(
            payer,
            vec![a],
            SplitKind::Custom {
                mode: SplitMode::Amount,
                splits,
            },
        );

        assert!(matches!(validate(&d), Err(Error::Validation(_))));
    }
}
