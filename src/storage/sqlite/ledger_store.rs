//! SQLite LedgerStore implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_query::{Expr, OnConflict, Order, Query, SqliteQueryBuilder};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::info;
use uuid::Uuid;

use crate::model::{Account, Transaction, TransactionType};
use crate::storage::helpers::{format_timestamp, parse_optional_uuid, parse_timestamp, parse_uuid};
use crate::storage::schema::{
    Accounts, Transactions, CREATE_ACCOUNTS_TABLE, CREATE_TRANSACTIONS_TABLE,
};
use crate::storage::{CommitOutcome, LedgerEntry, LedgerStore, Result, StorageError};

/// SQLite implementation of LedgerStore.
pub struct SqliteLedgerStore {
    pool: SqlitePool,
}

impl SqliteLedgerStore {
    /// Create a new SQLite ledger store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the accounts and transactions tables if missing.
    pub async fn init(&self) -> Result<()> {
        sqlx::raw_sql(CREATE_ACCOUNTS_TABLE)
            .execute(&self.pool)
            .await?;
        sqlx::raw_sql(CREATE_TRANSACTIONS_TABLE)
            .execute(&self.pool)
            .await?;
        info!("Ledger tables initialized (SQLite)");
        Ok(())
    }

    fn transaction_columns() -> [Transactions; 8] {
        [
            Transactions::Id,
            Transactions::AccountId,
            Transactions::Type,
            Transactions::Amount,
            Transactions::OrderId,
            Transactions::DeliveryId,
            Transactions::Reason,
            Transactions::CreatedDate,
        ]
    }

    fn account_from_row(row: &SqliteRow) -> Result<Account> {
        Ok(Account {
            id: parse_uuid(&row.try_get::<String, _>("id")?)?,
            current_balance: row.try_get("current_balance")?,
            as_of_date: parse_timestamp(&row.try_get::<String, _>("as_of_date")?)?,
        })
    }

    fn transaction_from_row(row: &SqliteRow) -> Result<Transaction> {
        let tx_type: String = row.try_get("type")?;
        Ok(Transaction {
            id: parse_uuid(&row.try_get::<String, _>("id")?)?,
            account_id: parse_uuid(&row.try_get::<String, _>("account_id")?)?,
            transaction_type: tx_type
                .parse::<TransactionType>()
                .map_err(StorageError::UnknownEnum)?,
            amount: row.try_get("amount")?,
            order_id: parse_uuid(&row.try_get::<String, _>("order_id")?)?,
            delivery_id: parse_optional_uuid(row.try_get("delivery_id")?)?,
            reason: row.try_get("reason")?,
            created_date: parse_timestamp(&row.try_get::<String, _>("created_date")?)?,
        })
    }

    /// Insert the account with a zero balance unless it already exists.
    async fn ensure_account(
        conn: &mut SqliteConnection,
        id: Uuid,
        now: &DateTime<Utc>,
    ) -> Result<()> {
        let query = Query::insert()
            .into_table(Accounts::Table)
            .columns([Accounts::Id, Accounts::CurrentBalance, Accounts::AsOfDate])
            .values_panic([id.to_string().into(), 0.0f64.into(), format_timestamp(now).into()])
            .on_conflict(OnConflict::column(Accounts::Id).do_nothing().to_owned())
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&mut *conn).await?;
        Ok(())
    }

    async fn load_account(conn: &mut SqliteConnection, id: Uuid) -> Result<Account> {
        let query = Query::select()
            .columns([Accounts::Id, Accounts::CurrentBalance, Accounts::AsOfDate])
            .from(Accounts::Table)
            .and_where(Expr::col(Accounts::Id).eq(id.to_string()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_one(&mut *conn).await?;
        Self::account_from_row(&row)
    }

    async fn find_by_dedup_key(conn: &mut SqliteConnection, key: &str) -> Result<Option<Transaction>> {
        let query = Query::select()
            .columns(Self::transaction_columns())
            .from(Transactions::Table)
            .and_where(Expr::col(Transactions::DedupKey).eq(key))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&mut *conn).await?;
        row.as_ref().map(Self::transaction_from_row).transpose()
    }

    /// Body of `commit`, run inside an open transaction.
    async fn apply_entry(conn: &mut SqliteConnection, entry: LedgerEntry) -> Result<CommitOutcome> {
        if let Some(key) = entry.dedup_key.as_deref() {
            if let Some(existing) = Self::find_by_dedup_key(conn, key).await? {
                return Ok(CommitOutcome::Duplicate(existing));
            }
        }

        let tx = entry.transaction;
        Self::ensure_account(conn, tx.account_id, &tx.created_date).await?;

        let update = Query::update()
            .table(Accounts::Table)
            .value(
                Accounts::CurrentBalance,
                Expr::col(Accounts::CurrentBalance).add(tx.signed_amount()),
            )
            .value(Accounts::AsOfDate, format_timestamp(&tx.created_date))
            .and_where(Expr::col(Accounts::Id).eq(tx.account_id.to_string()))
            .to_string(SqliteQueryBuilder);

        sqlx::query(&update).execute(&mut *conn).await?;

        let insert = Query::insert()
            .into_table(Transactions::Table)
            .columns([
                Transactions::Id,
                Transactions::AccountId,
                Transactions::Type,
                Transactions::Amount,
                Transactions::OrderId,
                Transactions::DeliveryId,
                Transactions::Reason,
                Transactions::CreatedDate,
                Transactions::DedupKey,
            ])
            .values_panic([
                tx.id.to_string().into(),
                tx.account_id.to_string().into(),
                tx.transaction_type.as_str().into(),
                tx.amount.into(),
                tx.order_id.to_string().into(),
                tx.delivery_id.map(|id| id.to_string()).into(),
                tx.reason.clone().into(),
                format_timestamp(&tx.created_date).into(),
                entry.dedup_key.clone().into(),
            ])
            .to_string(SqliteQueryBuilder);

        sqlx::query(&insert).execute(&mut *conn).await?;

        let account = Self::load_account(conn, tx.account_id).await?;
        Ok(CommitOutcome::Applied {
            account,
            transaction: tx,
        })
    }
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn get_or_create_account(&self, id: Uuid, now: DateTime<Utc>) -> Result<Account> {
        let mut conn = self.pool.acquire().await?;
        Self::ensure_account(&mut conn, id, &now).await?;
        Self::load_account(&mut conn, id).await
    }

    async fn commit(&self, entry: LedgerEntry) -> Result<CommitOutcome> {
        // BEGIN IMMEDIATE takes the write lock up front so the balance update
        // and the append land together or not at all.
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        match Self::apply_entry(&mut conn, entry).await {
            Ok(outcome) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(outcome)
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(e)
            }
        }
    }

    async fn write_offs_since(&self, account_id: Uuid, since: DateTime<Utc>) -> Result<f64> {
        let query = Query::select()
            .expr(Expr::col(Transactions::Amount).sum())
            .from(Transactions::Table)
            .and_where(Expr::col(Transactions::AccountId).eq(account_id.to_string()))
            .and_where(Expr::col(Transactions::Type).eq(TransactionType::WriteOff.as_str()))
            .and_where(Expr::col(Transactions::CreatedDate).gte(format_timestamp(&since)))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_one(&self.pool).await?;
        let total: Option<f64> = row.try_get(0)?;
        Ok(total.unwrap_or(0.0))
    }

    async fn transactions(&self, account_id: Uuid) -> Result<Vec<Transaction>> {
        let query = Query::select()
            .columns(Self::transaction_columns())
            .from(Transactions::Table)
            .and_where(Expr::col(Transactions::AccountId).eq(account_id.to_string()))
            .order_by(Transactions::Seq, Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(Self::transaction_from_row).collect()
    }
}
