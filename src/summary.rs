use serde::Serialize;
use thiserror::Error;

use crate::balance::compute_balances;
use crate::currency::{ConversionError, convert_checked};
use crate::error::LedgerError;
use crate::models::{Group, MemberId};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SummaryError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

/// A balance expressed in the display currency. Member names are resolved by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConvertedBalance {
    pub from: MemberId,
    pub to: MemberId,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub currency: String,
    pub total_group_expense: f64,
    pub user_paid: f64,
    pub user_owes: f64,
    pub user_is_owed: f64,
    pub net_balance: f64,
    pub balances: Vec<ConvertedBalance>,
}

/// Totals for one group as seen by `viewer`, in `display_currency`.
///
/// Expense amounts are converted from the group's base currency, not from the
/// expense's own `currency` field: stored amounts are already in base currency.
/// The viewer's owed/owing figures add up every balance they take part in.
pub fn summarize<F>(
    group: &Group,
    viewer: MemberId,
    convert: F,
    display_currency: &str,
) -> Result<GroupSummary, SummaryError>
where
    F: Fn(f64, &str, &str) -> Result<f64, ConversionError>,
{
    if !group.is_member(viewer) {
        return Err(LedgerError::UnknownMember(viewer).into());
    }
    let to_display =
        |amount: f64| convert_checked(&convert, amount, &group.base_currency, display_currency);

    let mut total_group_expense = 0.0;
    let mut user_paid = 0.0;
    for expense in &group.expenses {
        let amount = to_display(expense.amount)?;
        total_group_expense += amount;
        if expense.paid_by == viewer {
            user_paid += amount;
        }
    }

    let mut user_owes = 0.0;
    let mut user_is_owed = 0.0;
    let mut balances = Vec::new();
    for balance in compute_balances(group)? {
        let amount = to_display(balance.amount)?;
        if balance.from == viewer {
            user_owes += amount;
        } else if balance.to == viewer {
            user_is_owed += amount;
        }
        balances.push(ConvertedBalance {
            from: balance.from,
            to: balance.to,
            amount,
        });
    }

    Ok(GroupSummary {
        currency: display_currency.to_string(),
        total_group_expense,
        user_paid,
        user_owes,
        user_is_owed,
        net_balance: user_is_owed - user_owes,
        balances,
    })
}
