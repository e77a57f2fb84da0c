use log::debug;
use sqlx::{FromRow, SqliteConnection};

/// A `gateways` row. The `secret` field holds the *encrypted* record; decryption is the job of the
/// caller, which owns the vault.
#[derive(Debug, Clone, FromRow)]
pub struct GatewayRow {
    pub id: i64,
    pub secret: String,
    pub active: bool,
    pub test_mode: bool,
    pub last_keychain_index: i64,
    pub test_last_keychain_index: i64,
    pub callback_url: Option<String>,
    pub reuse_threshold: i64,
    pub after_payment_redirect_to: Option<String>,
    pub auto_redirect: bool,
}

pub async fn fetch_gateway(id: i64, conn: &mut SqliteConnection) -> Result<Option<GatewayRow>, sqlx::Error> {
    let row = sqlx::query_as("SELECT * FROM gateways WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(row)
}

/// The highest gateway id currently in the table, or 0 for an empty table. Feeds the IV derivation when
/// a new gateway's secret is encrypted.
pub async fn max_gateway_id(conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let (max,): (i64,) = sqlx::query_as("SELECT COALESCE(MAX(id), 0) FROM gateways").fetch_one(conn).await?;
    Ok(max)
}

pub async fn insert_gateway(
    encrypted_secret: &str,
    callback_url: Option<&str>,
    reuse_threshold: i64,
    conn: &mut SqliteConnection,
) -> Result<GatewayRow, sqlx::Error> {
    let row: GatewayRow = sqlx::query_as(
        r#"
            INSERT INTO gateways (secret, callback_url, reuse_threshold)
            VALUES ($1, $2, $3)
            RETURNING *;
        "#,
    )
    .bind(encrypted_secret)
    .bind(callback_url)
    .bind(reuse_threshold)
    .fetch_one(conn)
    .await?;
    debug!("📝️ Gateway #{} inserted", row.id);
    Ok(row)
}

/// Persist the runtime-mutable gateway fields. The secret is immutable through this path; rotating a
/// secret means writing a freshly encrypted record explicitly.
pub async fn save_gateway(
    id: i64,
    active: bool,
    test_mode: bool,
    last_keychain_index: i64,
    test_last_keychain_index: i64,
    callback_url: Option<&str>,
    reuse_threshold: i64,
    after_payment_redirect_to: Option<&str>,
    auto_redirect: bool,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
            UPDATE gateways
            SET active = $1,
                test_mode = $2,
                last_keychain_index = $3,
                test_last_keychain_index = $4,
                callback_url = $5,
                reuse_threshold = $6,
                after_payment_redirect_to = $7,
                auto_redirect = $8
            WHERE id = $9
        "#,
    )
    .bind(active)
    .bind(test_mode)
    .bind(last_keychain_index)
    .bind(test_last_keychain_index)
    .bind(callback_url)
    .bind(reuse_threshold)
    .bind(after_payment_redirect_to)
    .bind(auto_redirect)
    .bind(id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}
