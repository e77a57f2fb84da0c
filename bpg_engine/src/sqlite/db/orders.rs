use bpg_common::Sats;
use chrono::{DateTime, Utc};
use log::debug;
use sqlx::{FromRow, QueryBuilder, SqliteConnection};

use crate::{
    db_types::{CallbackResponse, Order, OrderStatus, Transaction},
    traits::OrderInsert,
};

/// An `orders` row as it comes off the wire. Transactions live in their own table and are attached by the
/// caller, so the row type exists to keep `FromRow` off the public [`Order`] struct.
#[derive(Debug, Clone, FromRow)]
pub struct OrderRow {
    pub id: i64,
    pub gateway_id: i64,
    pub keychain_index: i64,
    pub address: String,
    pub amount: Sats,
    pub amount_paid: Sats,
    pub status: OrderStatus,
    pub reused_count: i64,
    pub callback_url: Option<String>,
    pub callback_data: Option<String>,
    pub callback_response_code: Option<i64>,
    pub callback_response_body: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OrderRow {
    pub fn into_order(self, transactions: Vec<Transaction>) -> Order {
        let callback_response = match (self.callback_response_code, self.callback_response_body) {
            (None, None) => None,
            (code, body) => Some(CallbackResponse {
                code: code.and_then(|c| u16::try_from(c).ok()),
                body: body.unwrap_or_default(),
            }),
        };
        Order {
            id: self.id,
            gateway_id: self.gateway_id,
            keychain_index: self.keychain_index,
            address: self.address,
            amount: self.amount,
            amount_paid: self.amount_paid,
            status: self.status,
            reused_count: self.reused_count,
            callback_url: self.callback_url,
            callback_data: self.callback_data,
            callback_response,
            created_at: self.created_at,
            transactions,
        }
    }
}

pub async fn insert_order(order: OrderInsert, conn: &mut SqliteConnection) -> Result<Order, sqlx::Error> {
    let row: OrderRow = sqlx::query_as(
        r#"
            INSERT INTO orders (
                gateway_id,
                keychain_index,
                address,
                amount,
                reused_count,
                callback_url,
                callback_data
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(order.gateway_id)
    .bind(order.keychain_index)
    .bind(order.address)
    .bind(order.amount)
    .bind(order.reused_count)
    .bind(order.callback_url)
    .bind(order.callback_data)
    .fetch_one(conn)
    .await?;
    debug!("📝️ Order #{} inserted for gateway #{}", row.id, row.gateway_id);
    Ok(row.into_order(Vec::new()))
}

pub async fn fetch_order(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let row: Option<OrderRow> =
        sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(&mut *conn).await?;
    match row {
        Some(row) => {
            let txs = fetch_transactions(id, conn).await?;
            Ok(Some(row.into_order(txs)))
        },
        None => Ok(None),
    }
}

/// One page of a gateway's order history, ordered by `keychain_index DESC, reused_count DESC` so the
/// newest keychain slots come first and the most-recycled record for each slot leads its group.
pub async fn orders_page(
    gateway_id: i64,
    limit: usize,
    offset: usize,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    let rows: Vec<OrderRow> = sqlx::query_as(
        r#"
            SELECT * FROM orders
            WHERE gateway_id = $1
            ORDER BY keychain_index DESC, reused_count DESC
            LIMIT $2 OFFSET $3
        "#,
    )
    .bind(gateway_id)
    .bind(limit as i64)
    .bind(offset as i64)
    .fetch_all(&mut *conn)
    .await?;
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let mut builder = QueryBuilder::new("SELECT * FROM order_transactions WHERE order_id IN (");
    let mut ids = builder.separated(", ");
    for row in &rows {
        ids.push_bind(row.id);
    }
    builder.push(")");
    let txs: Vec<(i64, Transaction)> = builder
        .build_query_as::<TransactionRow>()
        .fetch_all(conn)
        .await?
        .into_iter()
        .map(|row| (row.order_id, row.into_transaction()))
        .collect();
    let orders = rows
        .into_iter()
        .map(|row| {
            let order_txs = txs.iter().filter(|(oid, _)| *oid == row.id).map(|(_, tx)| tx.clone()).collect();
            row.into_order(order_txs)
        })
        .collect();
    Ok(orders)
}

pub async fn update_status(
    order_id: i64,
    status: OrderStatus,
    amount_paid: Sats,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE orders SET status = $1, amount_paid = $2 WHERE id = $3")
        .bind(status)
        .bind(amount_paid)
        .bind(order_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn update_callback_response(
    order_id: i64,
    response: &CallbackResponse,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE orders SET callback_response_code = $1, callback_response_body = $2 WHERE id = $3")
        .bind(response.code.map(i64::from))
        .bind(response.body.as_str())
        .bind(order_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn upsert_transaction(
    order_id: i64,
    tx: &Transaction,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            INSERT INTO order_transactions (order_id, txid, amount, confirmations, block_height)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (order_id, txid) DO UPDATE
            SET amount = excluded.amount,
                confirmations = excluded.confirmations,
                block_height = excluded.block_height
        "#,
    )
    .bind(order_id)
    .bind(tx.txid.as_str())
    .bind(tx.amount)
    .bind(tx.confirmations)
    .bind(tx.block_height)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn fetch_transactions(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<Transaction>, sqlx::Error> {
    let rows: Vec<TransactionRow> =
        sqlx::query_as("SELECT * FROM order_transactions WHERE order_id = $1 ORDER BY id")
            .bind(order_id)
            .fetch_all(conn)
            .await?;
    Ok(rows.into_iter().map(TransactionRow::into_transaction).collect())
}

#[derive(Debug, Clone, FromRow)]
struct TransactionRow {
    order_id: i64,
    txid: String,
    amount: Sats,
    confirmations: i64,
    block_height: Option<i64>,
}

impl TransactionRow {
    fn into_transaction(self) -> Transaction {
        Transaction {
            txid: self.txid,
            amount: self.amount,
            confirmations: self.confirmations,
            block_height: self.block_height,
        }
    }
}
