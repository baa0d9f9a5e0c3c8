//! SQLite DeliveryStore implementation.

use async_trait::async_trait;
use sea_query::{Expr, Order, Query, SqliteQueryBuilder};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::info;
use uuid::Uuid;

use crate::model::{Delivery, DeliveryStatus};
use crate::storage::helpers::{
    format_timestamp, parse_optional_timestamp, parse_optional_uuid, parse_timestamp, parse_uuid,
};
use crate::storage::schema::{Deliveries, CREATE_DELIVERIES_TABLE};
use crate::storage::{DeliveryStore, Result, StorageError};

/// SQLite implementation of DeliveryStore.
pub struct SqliteDeliveryStore {
    pool: SqlitePool,
}

impl SqliteDeliveryStore {
    /// Create a new SQLite delivery store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the deliveries table if missing.
    pub async fn init(&self) -> Result<()> {
        sqlx::raw_sql(CREATE_DELIVERIES_TABLE)
            .execute(&self.pool)
            .await?;
        info!("Deliveries table initialized (SQLite)");
        Ok(())
    }

    fn columns() -> [Deliveries; 11] {
        [
            Deliveries::Id,
            Deliveries::OrderId,
            Deliveries::Status,
            Deliveries::AddressFrom,
            Deliveries::AddressTo,
            Deliveries::RecipientName,
            Deliveries::RecipientPhone,
            Deliveries::CourierId,
            Deliveries::CreatedDate,
            Deliveries::AssignedDate,
            Deliveries::DeliveredDate,
        ]
    }

    fn from_row(row: &SqliteRow) -> Result<Delivery> {
        let status: String = row.try_get("status")?;
        Ok(Delivery {
            id: parse_uuid(&row.try_get::<String, _>("id")?)?,
            order_id: parse_uuid(&row.try_get::<String, _>("order_id")?)?,
            status: status
                .parse::<DeliveryStatus>()
                .map_err(StorageError::UnknownEnum)?,
            address_from: row.try_get("address_from")?,
            address_to: row.try_get("address_to")?,
            recipient_name: row.try_get("recipient_name")?,
            recipient_phone: row.try_get("recipient_phone")?,
            courier_id: parse_optional_uuid(row.try_get("courier_id")?)?,
            created_date: parse_timestamp(&row.try_get::<String, _>("created_date")?)?,
            assigned_date: parse_optional_timestamp(row.try_get("assigned_date")?)?,
            delivered_date: parse_optional_timestamp(row.try_get("delivered_date")?)?,
        })
    }
}

#[async_trait]
impl DeliveryStore for SqliteDeliveryStore {
    async fn insert(&self, delivery: &Delivery) -> Result<()> {
        let query = Query::insert()
            .into_table(Deliveries::Table)
            .columns(Self::columns())
            .values_panic([
                delivery.id.to_string().into(),
                delivery.order_id.to_string().into(),
                delivery.status.as_str().into(),
                delivery.address_from.clone().into(),
                delivery.address_to.clone().into(),
                delivery.recipient_name.clone().into(),
                delivery.recipient_phone.clone().into(),
                delivery.courier_id.map(|id| id.to_string()).into(),
                format_timestamp(&delivery.created_date).into(),
                delivery.assigned_date.as_ref().map(format_timestamp).into(),
                delivery.delivered_date.as_ref().map(format_timestamp).into(),
            ])
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }

    async fn update(&self, delivery: &Delivery) -> Result<()> {
        let query = Query::update()
            .table(Deliveries::Table)
            .value(Deliveries::Status, delivery.status.as_str())
            .value(
                Deliveries::CourierId,
                delivery.courier_id.map(|id| id.to_string()),
            )
            .value(
                Deliveries::AssignedDate,
                delivery.assigned_date.as_ref().map(format_timestamp),
            )
            .value(
                Deliveries::DeliveredDate,
                delivery.delivered_date.as_ref().map(format_timestamp),
            )
            .and_where(Expr::col(Deliveries::Id).eq(delivery.id.to_string()))
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Delivery>> {
        let query = Query::select()
            .columns(Self::columns())
            .from(Deliveries::Table)
            .and_where(Expr::col(Deliveries::Id).eq(id.to_string()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        row.as_ref().map(Self::from_row).transpose()
    }

    async fn list(&self) -> Result<Vec<Delivery>> {
        let query = Query::select()
            .columns(Self::columns())
            .from(Deliveries::Table)
            .order_by(Deliveries::CreatedDate, Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(Self::from_row).collect()
    }
}
