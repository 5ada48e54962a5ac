//! Mutations on the group aggregate.
//!
//! Every operation validates against the current group before touching it, so a
//! rejected call leaves the group exactly as it was.

use std::collections::HashSet;

use uuid::Uuid;

use crate::balance::EPSILON;
use crate::error::LedgerError;
use crate::models::{Expense, Group, Member, MemberId, Participant, Settlement};

/// Splits `amount` into equal cent-rounded shares. Leftover cents go to the
/// leading members, so the shares always add back up to the amount.
pub fn split_equally(amount: f64, members: &[MemberId]) -> Vec<Participant> {
    if members.is_empty() {
        return Vec::new();
    }

    let cents = (amount * 100.0).round() as i64;
    let count = members.len() as i64;
    let base = cents.div_euclid(count);
    let remainder = cents.rem_euclid(count);

    members
        .iter()
        .enumerate()
        .map(|(index, member_id)| {
            let extra = i64::from((index as i64) < remainder);
            Participant {
                member_id: *member_id,
                amount: (base + extra) as f64 / 100.0,
            }
        })
        .collect()
}

/// Largest magnitude a `NUMERIC(12,2)` column holds, exclusive.
pub const MAX_AMOUNT: f64 = 1e10;

/// Whole cents below [`MAX_AMOUNT`], i.e. exactly what the store can persist.
fn check_money(amount: f64) -> Result<(), LedgerError> {
    // A cent value survives rounding to cents and back unchanged.
    let whole_cents = (amount * 100.0).round() / 100.0 == amount;
    if amount.abs() >= MAX_AMOUNT || !whole_cents {
        return Err(LedgerError::InvalidPrecision(amount));
    }
    Ok(())
}

fn check_amount(amount: f64) -> Result<(), LedgerError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(LedgerError::InvalidAmount(amount));
    }
    check_money(amount)
}

impl Group {
    fn require_member(&self, id: MemberId) -> Result<(), LedgerError> {
        if self.is_member(id) {
            Ok(())
        } else {
            Err(LedgerError::UnknownMember(id))
        }
    }

    pub fn add_member(&mut self, name: &str) -> Result<&Member, LedgerError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::InvalidName);
        }
        if self
            .members
            .iter()
            .any(|m| m.name.to_lowercase() == name.to_lowercase())
        {
            return Err(LedgerError::DuplicateMember(name.to_string()));
        }

        self.members.push(Member {
            id: Uuid::new_v4(),
            name: name.to_string(),
        });
        Ok(&self.members[self.members.len() - 1])
    }

    /// Removes a member nobody's expenses or settlements point at.
    pub fn remove_member(&mut self, id: MemberId) -> Result<Member, LedgerError> {
        let position = self
            .members
            .iter()
            .position(|m| m.id == id)
            .ok_or(LedgerError::UnknownMember(id))?;

        let referenced = self.expenses.iter().any(|e| e.involves(id))
            || self.settlements.iter().any(|s| s.involves(id));
        if referenced {
            return Err(LedgerError::MemberInUse(id));
        }

        Ok(self.members.remove(position))
    }

    pub fn validate_expense(&self, expense: &Expense) -> Result<(), LedgerError> {
        check_amount(expense.amount)?;
        self.require_member(expense.paid_by)?;
        if expense.participants.is_empty() {
            return Err(LedgerError::NoParticipants);
        }

        let mut seen = HashSet::with_capacity(expense.participants.len());
        for participant in &expense.participants {
            self.require_member(participant.member_id)?;
            if !seen.insert(participant.member_id) {
                return Err(LedgerError::DuplicateParticipant(participant.member_id));
            }
            if !participant.amount.is_finite() || participant.amount < 0.0 {
                return Err(LedgerError::InvalidShare {
                    member: participant.member_id,
                    amount: participant.amount,
                });
            }
            check_money(participant.amount)?;
        }

        let actual = expense.share_total();
        if (actual - expense.amount).abs() > EPSILON {
            return Err(LedgerError::SplitMismatch {
                expected: expense.amount,
                actual,
            });
        }
        Ok(())
    }

    pub fn add_expense(&mut self, expense: Expense) -> Result<(), LedgerError> {
        self.validate_expense(&expense)?;
        self.expenses.push(expense);
        Ok(())
    }

    /// Swaps the stored expense with the same id for `expense` as a whole record.
    pub fn replace_expense(&mut self, expense: Expense) -> Result<(), LedgerError> {
        let position = self
            .expenses
            .iter()
            .position(|e| e.id == expense.id)
            .ok_or(LedgerError::ExpenseNotFound(expense.id))?;
        self.validate_expense(&expense)?;
        self.expenses[position] = expense;
        Ok(())
    }

    pub fn remove_expense(&mut self, id: Uuid) -> Result<Expense, LedgerError> {
        let position = self
            .expenses
            .iter()
            .position(|e| e.id == id)
            .ok_or(LedgerError::ExpenseNotFound(id))?;
        Ok(self.expenses.remove(position))
    }

    pub fn validate_settlement(&self, settlement: &Settlement) -> Result<(), LedgerError> {
        check_amount(settlement.amount)?;
        self.require_member(settlement.paid_by)?;
        self.require_member(settlement.paid_to)?;
        if settlement.paid_by == settlement.paid_to {
            return Err(LedgerError::SelfSettlement(settlement.paid_by));
        }
        Ok(())
    }

    pub fn add_settlement(&mut self, settlement: Settlement) -> Result<(), LedgerError> {
        self.validate_settlement(&settlement)?;
        self.settlements.push(settlement);
        Ok(())
    }

    pub fn remove_settlement(&mut self, id: Uuid) -> Result<Settlement, LedgerError> {
        let position = self
            .settlements
            .iter()
            .position(|s| s.id == id)
            .ok_or(LedgerError::SettlementNotFound(id))?;
        Ok(self.settlements.remove(position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SplitType;
    use chrono::NaiveDate;
    use rstest::rstest;

    fn trip() -> (Group, MemberId, MemberId, MemberId) {
        let mut group = Group::new("Lisbon", "EUR");
        let a = group.add_member("Ana").unwrap().id;
        let b = group.add_member("Bruno").unwrap().id;
        let c = group.add_member("Carla").unwrap().id;
        (group, a, b, c)
    }

    fn expense(paid_by: MemberId, amount: f64, shares: &[(MemberId, f64)]) -> Expense {
        Expense {
            id: Uuid::new_v4(),
            title: "Dinner".to_string(),
            amount,
            currency: "EUR".to_string(),
            paid_by,
            date: NaiveDate::from_ymd_opt(2024, 4, 12).unwrap(),
            participants: shares
                .iter()
                .map(|&(member_id, amount)| Participant { member_id, amount })
                .collect(),
            split_type: SplitType::Custom,
            notes: None,
        }
    }

    fn settlement(paid_by: MemberId, paid_to: MemberId, amount: f64) -> Settlement {
        Settlement {
            id: Uuid::new_v4(),
            paid_by,
            paid_to,
            amount,
            date: NaiveDate::from_ymd_opt(2024, 4, 13).unwrap(),
            notes: None,
        }
    }

    #[test]
    fn split_equally_hands_leftover_cents_to_leading_members() {
        let ids = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        let amounts: Vec<f64> = split_equally(100.0, &ids).iter().map(|p| p.amount).collect();
        assert_eq!(amounts, vec![33.34, 33.33, 33.33]);
    }

    #[test]
    fn split_equally_with_nobody_is_empty() {
        assert!(split_equally(50.0, &[]).is_empty());
    }

    #[test]
    fn duplicate_member_names_are_rejected() {
        let (mut group, ..) = trip();
        assert_eq!(
            group.add_member(" ana ").unwrap_err(),
            LedgerError::DuplicateMember("ana".to_string())
        );
        assert_eq!(group.add_member("   ").unwrap_err(), LedgerError::InvalidName);
        assert_eq!(group.members.len(), 3);
    }

    #[test]
    fn removing_a_payer_is_rejected_and_group_is_unchanged() {
        let (mut group, a, b, _) = trip();
        group
            .add_expense(expense(a, 40.0, &[(a, 20.0), (b, 20.0)]))
            .unwrap();
        let before = group.clone();

        assert_eq!(group.remove_member(a), Err(LedgerError::MemberInUse(a)));
        assert_eq!(group, before);
    }

    #[test]
    fn removing_a_participant_is_rejected() {
        let (mut group, a, b, _) = trip();
        group.add_expense(expense(a, 15.0, &[(b, 15.0)])).unwrap();
        assert_eq!(group.remove_member(b), Err(LedgerError::MemberInUse(b)));
    }

    #[test]
    fn removing_a_settlement_party_is_rejected() {
        let (mut group, a, _, c) = trip();
        group.add_settlement(settlement(c, a, 5.0)).unwrap();
        assert_eq!(group.remove_member(c), Err(LedgerError::MemberInUse(c)));
    }

    #[test]
    fn removing_an_unreferenced_member_succeeds() {
        let (mut group, a, b, c) = trip();
        group.add_expense(expense(a, 10.0, &[(b, 10.0)])).unwrap();

        let removed = group.remove_member(c).unwrap();

        assert_eq!(removed.name, "Carla");
        assert!(!group.is_member(c));
        assert_eq!(group.remove_member(c), Err(LedgerError::UnknownMember(c)));
    }

    #[rstest]
    #[case::exact(100.0, [33.34, 33.33, 33.33], true)]
    #[case::short_by_a_dollar(100.0, [33.0, 33.0, 33.0], false)]
    #[case::over_by_two_cents(90.0, [30.01, 30.01, 30.0], false)]
    fn custom_split_must_match_total(
        #[case] total: f64,
        #[case] shares: [f64; 3],
        #[case] accepted: bool,
    ) {
        let (mut group, a, b, c) = trip();
        let candidate = expense(a, total, &[(a, shares[0]), (b, shares[1]), (c, shares[2])]);

        let result = group.add_expense(candidate);

        assert_eq!(result.is_ok(), accepted);
        if !accepted {
            assert!(matches!(result, Err(LedgerError::SplitMismatch { .. })));
            assert!(group.expenses.is_empty());
        }
    }

    #[rstest]
    #[case::sub_cent_settlement_size(0.004)]
    #[case::half_cent(1.005)]
    #[case::beyond_the_column(1e12)]
    fn amounts_the_store_cannot_hold_are_rejected(#[case] amount: f64) {
        let (mut group, a, b, _) = trip();

        assert_eq!(
            group.add_settlement(settlement(a, b, amount)),
            Err(LedgerError::InvalidPrecision(amount))
        );
        assert_eq!(
            group.add_expense(expense(a, amount, &[(b, amount)])),
            Err(LedgerError::InvalidPrecision(amount))
        );
        assert!(group.expenses.is_empty());
        assert!(group.settlements.is_empty());
    }

    #[test]
    fn sub_cent_shares_are_rejected_even_when_they_add_up() {
        let (mut group, a, b, c) = trip();
        let candidate = expense(a, 10.0, &[(a, 3.335), (b, 3.335), (c, 3.33)]);

        assert_eq!(
            group.add_expense(candidate),
            Err(LedgerError::InvalidPrecision(3.335))
        );
        assert!(group.expenses.is_empty());
    }

    #[test]
    fn largest_storable_amount_is_accepted() {
        let (mut group, a, b, _) = trip();
        assert!(group.add_settlement(settlement(a, b, 9_999_999_999.99)).is_ok());
    }

    #[rstest]
    #[case::zero(0.0)]
    #[case::negative(-12.0)]
    #[case::not_a_number(f64::NAN)]
    fn non_positive_amounts_are_rejected(#[case] amount: f64) {
        let (mut group, a, b, _) = trip();
        let result = group.add_expense(expense(a, amount, &[(b, amount)]));
        assert!(matches!(result, Err(LedgerError::InvalidAmount(_))));
    }

    #[test]
    fn expense_with_stranger_fails_fast() {
        let (mut group, a, _, _) = trip();
        let stranger = Uuid::new_v4();
        assert_eq!(
            group.add_expense(expense(a, 10.0, &[(stranger, 10.0)])),
            Err(LedgerError::UnknownMember(stranger))
        );
    }

    #[test]
    fn repeated_participant_is_rejected() {
        let (mut group, a, b, _) = trip();
        assert_eq!(
            group.add_expense(expense(a, 10.0, &[(b, 5.0), (b, 5.0)])),
            Err(LedgerError::DuplicateParticipant(b))
        );
    }

    #[test]
    fn replace_expense_swaps_whole_record() {
        let (mut group, a, b, c) = trip();
        let original = expense(a, 10.0, &[(b, 10.0)]);
        let id = original.id;
        group.add_expense(original).unwrap();

        let mut updated = expense(c, 60.0, &[(a, 30.0), (b, 30.0)]);
        updated.id = id;
        group.replace_expense(updated.clone()).unwrap();

        assert_eq!(group.expenses, vec![updated]);
    }

    #[test]
    fn replace_and_remove_unknown_expense_report_not_found() {
        let (mut group, a, b, _) = trip();
        let missing = expense(a, 10.0, &[(b, 10.0)]);
        let id = missing.id;
        assert_eq!(
            group.replace_expense(missing),
            Err(LedgerError::ExpenseNotFound(id))
        );
        assert_eq!(group.remove_expense(id), Err(LedgerError::ExpenseNotFound(id)));
    }

    #[test]
    fn settlement_to_oneself_is_rejected() {
        let (mut group, a, _, _) = trip();
        assert_eq!(
            group.add_settlement(settlement(a, a, 10.0)),
            Err(LedgerError::SelfSettlement(a))
        );
    }

    #[test]
    fn removed_settlement_is_returned() {
        let (mut group, a, b, _) = trip();
        let payment = settlement(b, a, 12.5);
        let id = payment.id;
        group.add_settlement(payment.clone()).unwrap();

        assert_eq!(group.remove_settlement(id), Ok(payment));
        assert_eq!(
            group.remove_settlement(id),
            Err(LedgerError::SettlementNotFound(id))
        );
    }
}
