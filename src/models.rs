use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::ledger::split_equally;

pub type MemberId = Uuid;

// Database row types
#[derive(Debug, Clone, FromRow)]
pub struct GroupRow {
    pub id: Uuid,
    pub name: String,
    pub base_currency: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct MemberRow {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct ExpenseRow {
    pub id: Uuid,
    pub title: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub paid_by: Uuid,
    pub expense_date: NaiveDate,
    pub split_type: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ParticipantRow {
    pub expense_id: Uuid,
    pub member_id: Uuid,
    pub amount: BigDecimal,
}

#[derive(Debug, Clone, FromRow)]
pub struct SettlementRow {
    pub id: Uuid,
    pub paid_by: Uuid,
    pub paid_to: Uuid,
    pub amount: BigDecimal,
    pub settled_on: NaiveDate,
    pub notes: Option<String>,
}

// Domain types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitType {
    Equal,
    Custom,
}

impl SplitType {
    pub fn as_str(self) -> &'static str {
        match self {
            SplitType::Equal => "equal",
            SplitType::Custom => "custom",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "equal" => Some(SplitType::Equal),
            "custom" => Some(SplitType::Custom),
            _ => None,
        }
    }
}

/// One member's share of an expense, in the group's base currency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub member_id: MemberId,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: Uuid,
    pub title: String,
    pub amount: f64,
    pub currency: String,
    pub paid_by: MemberId,
    pub date: NaiveDate,
    pub participants: Vec<Participant>,
    pub split_type: SplitType,
    pub notes: Option<String>,
}

impl Expense {
    /// True when the member paid for this expense or holds a share of it.
    pub fn involves(&self, member: MemberId) -> bool {
        self.paid_by == member || self.participants.iter().any(|p| p.member_id == member)
    }

    pub fn share_total(&self) -> f64 {
        self.participants.iter().map(|p| p.amount).sum()
    }
}

/// A direct payment that reduces what `paid_by` owes `paid_to`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub id: Uuid,
    pub paid_by: MemberId,
    pub paid_to: MemberId,
    pub amount: f64,
    pub date: NaiveDate,
    pub notes: Option<String>,
}

impl Settlement {
    pub fn involves(&self, member: MemberId) -> bool {
        self.paid_by == member || self.paid_to == member
    }
}

/// The aggregate root. Every balance is computed from exactly one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub base_currency: String,
    pub members: Vec<Member>,
    pub expenses: Vec<Expense>,
    pub settlements: Vec<Settlement>,
}

impl Group {
    pub fn new(name: impl Into<String>, base_currency: impl Into<String>) -> Self {
        Group {
            id: Uuid::new_v4(),
            name: name.into(),
            base_currency: base_currency.into(),
            members: Vec::new(),
            expenses: Vec::new(),
            settlements: Vec::new(),
        }
    }

    pub fn member(&self, id: MemberId) -> Option<&Member> {
        self.members.iter().find(|m| m.id == id)
    }

    pub fn is_member(&self, id: MemberId) -> bool {
        self.member(id).is_some()
    }
}

/// `from` owes `to` exactly `amount` in the group's base currency.
/// Derived on every request and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub from: MemberId,
    pub to: MemberId,
    pub amount: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemberPosition {
    pub member_id: MemberId,
    pub net: f64, // positive = is owed money, negative = owes money
}

// Request DTOs
fn default_base_currency() -> String {
    "USD".to_string()
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default = "default_base_currency")]
    pub base_currency: String,
    pub member_names: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "split_type", rename_all = "snake_case")]
pub enum SplitRequest {
    Equal { split_between: Vec<MemberId> },
    Custom { participants: Vec<Participant> },
}

#[derive(Debug, Deserialize)]
pub struct ExpenseRequest {
    pub title: String,
    pub amount: f64,
    pub currency: Option<String>,
    pub paid_by: MemberId,
    pub date: Option<NaiveDate>,
    #[serde(flatten)]
    pub split: SplitRequest,
    pub notes: Option<String>,
}

impl ExpenseRequest {
    /// Builds the stored expense. Equal splits are expanded into cent-rounded shares here,
    /// so the ledger only ever sees explicit participant amounts.
    pub fn into_expense(self, id: Uuid, base_currency: &str, today: NaiveDate) -> Expense {
        let (split_type, participants) = match self.split {
            SplitRequest::Equal { split_between } => {
                (SplitType::Equal, split_equally(self.amount, &split_between))
            }
            SplitRequest::Custom { participants } => (SplitType::Custom, participants),
        };

        Expense {
            id,
            title: self.title,
            amount: self.amount,
            currency: self.currency.unwrap_or_else(|| base_currency.to_string()),
            paid_by: self.paid_by,
            date: self.date.unwrap_or(today),
            participants,
            split_type,
            notes: self.notes,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SettlementRequest {
    pub paid_by: MemberId,
    pub paid_to: MemberId,
    pub amount: f64,
    pub date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl SettlementRequest {
    pub fn into_settlement(self, id: Uuid, today: NaiveDate) -> Settlement {
        Settlement {
            id,
            paid_by: self.paid_by,
            paid_to: self.paid_to,
            amount: self.amount,
            date: self.date.unwrap_or(today),
            notes: self.notes,
        }
    }
}

// Response DTOs
#[derive(Debug, Serialize)]
pub struct GroupCreatedResponse {
    pub group: Group,
    pub token: String,
}

// Conversion helpers
impl From<MemberRow> for Member {
    fn from(row: MemberRow) -> Self {
        Member {
            id: row.id,
            name: row.name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn equal_split_request_expands_into_shares() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let request: ExpenseRequest = serde_json::from_value(serde_json::json!({
            "title": "Taxi",
            "amount": 25.0,
            "paid_by": a,
            "split_type": "equal",
            "split_between": [a, b],
        }))
        .unwrap();

        let expense = request.into_expense(Uuid::new_v4(), "EUR", date(2024, 6, 1));

        assert_eq!(expense.split_type, SplitType::Equal);
        assert_eq!(expense.currency, "EUR");
        assert_eq!(expense.date, date(2024, 6, 1));
        assert_eq!(
            expense.participants,
            vec![
                Participant { member_id: a, amount: 12.5 },
                Participant { member_id: b, amount: 12.5 },
            ]
        );
    }

    #[test]
    fn custom_split_request_keeps_shares() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let request: ExpenseRequest = serde_json::from_value(serde_json::json!({
            "title": "Hotel",
            "amount": 300.0,
            "currency": "JPY",
            "paid_by": b,
            "date": "2024-05-02",
            "split_type": "custom",
            "participants": [
                { "member_id": a, "amount": 200.0 },
                { "member_id": b, "amount": 100.0 }
            ],
        }))
        .unwrap();

        let expense = request.into_expense(Uuid::new_v4(), "USD", date(2024, 6, 1));

        assert_eq!(expense.split_type, SplitType::Custom);
        assert_eq!(expense.currency, "JPY");
        assert_eq!(expense.date, date(2024, 5, 2));
        assert_eq!(expense.share_total(), 300.0);
        assert!(expense.involves(a));
    }

    #[test]
    fn split_type_round_trips_through_storage_names() {
        for split in [SplitType::Equal, SplitType::Custom] {
            assert_eq!(SplitType::parse(split.as_str()), Some(split));
        }
        assert_eq!(SplitType::parse("percentage"), None);
    }
}
