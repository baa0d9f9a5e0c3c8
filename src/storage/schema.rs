//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.

use sea_query::Iden;

/// Deliveries table schema.
#[derive(Iden)]
pub enum Deliveries {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "order_id"]
    OrderId,
    #[iden = "status"]
    Status,
    #[iden = "address_from"]
    AddressFrom,
    #[iden = "address_to"]
    AddressTo,
    #[iden = "recipient_name"]
    RecipientName,
    #[iden = "recipient_phone"]
    RecipientPhone,
    #[iden = "courier_id"]
    CourierId,
    #[iden = "created_date"]
    CreatedDate,
    #[iden = "assigned_date"]
    AssignedDate,
    #[iden = "delivered_date"]
    DeliveredDate,
}

/// Accounts table schema.
#[derive(Iden)]
pub enum Accounts {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "current_balance"]
    CurrentBalance,
    #[iden = "as_of_date"]
    AsOfDate,
}

/// Transactions table schema.
#[derive(Iden)]
pub enum Transactions {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "account_id"]
    AccountId,
    #[iden = "type"]
    Type,
    #[iden = "amount"]
    Amount,
    #[iden = "order_id"]
    OrderId,
    #[iden = "delivery_id"]
    DeliveryId,
    #[iden = "reason"]
    Reason,
    #[iden = "created_date"]
    CreatedDate,
    #[iden = "dedup_key"]
    DedupKey,
    #[iden = "seq"]
    Seq,
}

/// SQL for creating the deliveries table.
pub const CREATE_DELIVERIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS deliveries (
    id TEXT PRIMARY KEY,
    order_id TEXT NOT NULL,
    status TEXT NOT NULL,
    address_from TEXT NOT NULL,
    address_to TEXT NOT NULL,
    recipient_name TEXT NOT NULL,
    recipient_phone TEXT NOT NULL,
    courier_id TEXT,
    created_date TEXT NOT NULL,
    assigned_date TEXT,
    delivered_date TEXT
);
"#;

/// SQL for creating the accounts table.
pub const CREATE_ACCOUNTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id TEXT PRIMARY KEY,
    current_balance REAL NOT NULL DEFAULT 0,
    as_of_date TEXT NOT NULL
);
"#;

/// SQL for creating the transactions table.
pub const CREATE_TRANSACTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS transactions (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    account_id TEXT NOT NULL,
    type TEXT NOT NULL,
    amount REAL NOT NULL,
    order_id TEXT NOT NULL,
    delivery_id TEXT,
    reason TEXT NOT NULL,
    created_date TEXT NOT NULL,
    dedup_key TEXT UNIQUE
);

CREATE INDEX IF NOT EXISTS idx_transactions_account ON transactions(account_id, created_date);
"#;
