use std::collections::HashMap;

use bigdecimal::{BigDecimal, RoundingMode, ToPrimitive};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::ledger::MAX_AMOUNT;
use crate::models::{
    Expense, ExpenseRow, Group, GroupRow, Member, MemberId, MemberRow, Participant,
    ParticipantRow, Settlement, SettlementRow, SplitType,
};

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("amount {0} cannot be stored or read as money")]
    Amount(String),
    #[error("stored split type {0:?} is not recognised")]
    SplitType(String),
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("could not connect for migrations: {0}")]
    Connect(#[from] tokio_postgres::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] refinery::Error),
}

pub async fn connect(config: &AppConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
}

pub async fn run_migrations(database_url: &str) -> Result<(), MigrationError> {
    let (mut client, connection) = tokio_postgres::connect(database_url, tokio_postgres::NoTls).await?;

    // Spawn the connection handler
    tokio::spawn(async move {
        if let Err(error) = connection.await {
            tracing::error!(%error, "migration connection closed with an error");
        }
    });

    let report = embedded::migrations::runner().run_async(&mut client).await?;
    for migration in report.applied_migrations() {
        tracing::info!(%migration, "applied migration");
    }

    Ok(())
}

// Columns are NUMERIC(12,2): anything outside that range is refused here
// instead of overflowing in Postgres.
fn to_decimal(amount: f64) -> Result<BigDecimal, StoreError> {
    if !amount.is_finite() || amount.abs() >= MAX_AMOUNT {
        return Err(StoreError::Amount(amount.to_string()));
    }
    let value = BigDecimal::try_from(amount).map_err(|_| StoreError::Amount(amount.to_string()))?;
    Ok(value.with_scale_round(2, RoundingMode::HalfEven))
}

fn to_amount(value: &BigDecimal) -> Result<f64, StoreError> {
    value
        .to_f64()
        .filter(|amount| amount.is_finite())
        .ok_or_else(|| StoreError::Amount(value.to_string()))
}

/// Reads and writes whole group documents. Every write is scoped by group id,
/// so a token for one group can never touch another's rows.
#[derive(Clone)]
pub struct GroupStore {
    pool: PgPool,
}

impl GroupStore {
    pub fn new(pool: PgPool) -> Self {
        GroupStore { pool }
    }

    pub async fn insert_group(&self, group: &Group) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO groups (id, name, base_currency) VALUES ($1, $2, $3)")
            .bind(group.id)
            .bind(&group.name)
            .bind(&group.base_currency)
            .execute(&mut *tx)
            .await?;

        for member in &group.members {
            insert_member(&mut tx, group.id, member).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn load_group(&self, group_id: Uuid) -> Result<Option<Group>, StoreError> {
        let Some(group_row) = sqlx::query_as::<_, GroupRow>(
            "SELECT id, name, base_currency FROM groups WHERE id = $1",
        )
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let member_rows: Vec<MemberRow> =
            sqlx::query_as("SELECT id, name FROM members WHERE group_id = $1 ORDER BY seq")
                .bind(group_id)
                .fetch_all(&self.pool)
                .await?;

        let expense_rows: Vec<ExpenseRow> = sqlx::query_as(
            "SELECT id, title, amount, currency, paid_by, expense_date, split_type, notes
             FROM expenses WHERE group_id = $1 ORDER BY seq",
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;

        let participant_rows: Vec<ParticipantRow> = sqlx::query_as(
            "SELECT p.expense_id, p.member_id, p.amount
             FROM expense_participants p JOIN expenses e ON e.id = p.expense_id
             WHERE e.group_id = $1 ORDER BY p.expense_id, p.position",
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;

        let settlement_rows: Vec<SettlementRow> = sqlx::query_as(
            "SELECT id, paid_by, paid_to, amount, settled_on, notes
             FROM settlements WHERE group_id = $1 ORDER BY seq",
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;

        let mut shares: HashMap<Uuid, Vec<Participant>> = HashMap::new();
        for row in participant_rows {
            shares.entry(row.expense_id).or_default().push(Participant {
                member_id: row.member_id,
                amount: to_amount(&row.amount)?,
            });
        }

        let expenses = expense_rows
            .into_iter()
            .map(|row| {
                let split_type =
                    SplitType::parse(&row.split_type).ok_or_else(|| StoreError::SplitType(row.split_type.clone()))?;
                Ok(Expense {
                    id: row.id,
                    title: row.title,
                    amount: to_amount(&row.amount)?,
                    currency: row.currency,
                    paid_by: row.paid_by,
                    date: row.expense_date,
                    participants: shares.remove(&row.id).unwrap_or_default(),
                    split_type,
                    notes: row.notes,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        let settlements = settlement_rows
            .into_iter()
            .map(|row| {
                Ok(Settlement {
                    id: row.id,
                    paid_by: row.paid_by,
                    paid_to: row.paid_to,
                    amount: to_amount(&row.amount)?,
                    date: row.settled_on,
                    notes: row.notes,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        Ok(Some(Group {
            id: group_row.id,
            name: group_row.name,
            base_currency: group_row.base_currency,
            members: member_rows.into_iter().map(Member::from).collect(),
            expenses,
            settlements,
        }))
    }

    pub async fn insert_member(&self, group_id: Uuid, member: &Member) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        insert_member(&mut tx, group_id, member).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn delete_member(&self, group_id: Uuid, member_id: MemberId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM members WHERE id = $1 AND group_id = $2")
            .bind(member_id)
            .bind(group_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_expense(&self, group_id: Uuid, expense: &Expense) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO expenses (id, group_id, title, amount, currency, paid_by, expense_date, split_type, notes)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(expense.id)
        .bind(group_id)
        .bind(&expense.title)
        .bind(to_decimal(expense.amount)?)
        .bind(&expense.currency)
        .bind(expense.paid_by)
        .bind(expense.date)
        .bind(expense.split_type.as_str())
        .bind(&expense.notes)
        .execute(&mut *tx)
        .await?;

        insert_participants(&mut tx, expense).await?;

        tx.commit().await?;
        Ok(())
    }

    /// Overwrites the stored expense and its shares. Last write wins.
    pub async fn update_expense(&self, group_id: Uuid, expense: &Expense) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE expenses SET title = $1, amount = $2, currency = $3, paid_by = $4,
                 expense_date = $5, split_type = $6, notes = $7
             WHERE id = $8 AND group_id = $9",
        )
        .bind(&expense.title)
        .bind(to_decimal(expense.amount)?)
        .bind(&expense.currency)
        .bind(expense.paid_by)
        .bind(expense.date)
        .bind(expense.split_type.as_str())
        .bind(&expense.notes)
        .bind(expense.id)
        .bind(group_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM expense_participants WHERE expense_id = $1")
            .bind(expense.id)
            .execute(&mut *tx)
            .await?;

        insert_participants(&mut tx, expense).await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn delete_expense(&self, group_id: Uuid, expense_id: Uuid) -> Result<(), StoreError> {
        // Shares go with it through ON DELETE CASCADE.
        sqlx::query("DELETE FROM expenses WHERE id = $1 AND group_id = $2")
            .bind(expense_id)
            .bind(group_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_settlement(&self, group_id: Uuid, settlement: &Settlement) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO settlements (id, group_id, paid_by, paid_to, amount, settled_on, notes)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(settlement.id)
        .bind(group_id)
        .bind(settlement.paid_by)
        .bind(settlement.paid_to)
        .bind(to_decimal(settlement.amount)?)
        .bind(settlement.date)
        .bind(&settlement.notes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_settlement(&self, group_id: Uuid, settlement_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM settlements WHERE id = $1 AND group_id = $2")
            .bind(settlement_id)
            .bind(group_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

async fn insert_member(
    tx: &mut Transaction<'_, Postgres>,
    group_id: Uuid,
    member: &Member,
) -> Result<(), StoreError> {
    sqlx::query("INSERT INTO members (id, group_id, name) VALUES ($1, $2, $3)")
        .bind(member.id)
        .bind(group_id)
        .bind(&member.name)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn insert_participants(
    tx: &mut Transaction<'_, Postgres>,
    expense: &Expense,
) -> Result<(), StoreError> {
    for (position, participant) in expense.participants.iter().enumerate() {
        sqlx::query(
            "INSERT INTO expense_participants (expense_id, member_id, amount, position)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(expense.id)
        .bind(participant.member_id)
        .bind(to_decimal(participant.amount)?)
        .bind(position as i32)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}
