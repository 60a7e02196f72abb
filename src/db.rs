//! Storage contract and the PostgreSQL backend.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use tracing::{debug, info};

use crate::errors::StoreError;
use crate::models::{Category, NewOrder, Order, Profile};

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable record of profiles and orders.
///
/// Implementations own their concurrency control. The one-order-per-creator
/// rule and the complaint increment must be atomic inside the store.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert or overwrite the profile keyed by `profile.user_id`
    async fn upsert_profile(&self, profile: &Profile) -> StoreResult<()>;

    async fn get_profile(&self, user_id: i64) -> StoreResult<Profile>;

    async fn delete_profile(&self, user_id: i64) -> StoreResult<()>;

    /// Create an order and return its id.
    /// Fails with [`StoreError::OrderConflict`] if the creator already has one.
    async fn create_order(&self, order: NewOrder) -> StoreResult<i64>;

    async fn get_order_by_creator(&self, user_id: i64) -> StoreResult<Order>;

    async fn get_order_by_id(&self, id: i64) -> StoreResult<Order>;

    async fn delete_order_by_id(&self, id: i64) -> StoreResult<()>;

    /// Overwrite category, text and photo of an existing order
    async fn update_order(&self, order: &Order) -> StoreResult<()>;

    /// Add one complaint and return the new count
    async fn increment_complaint(&self, order_id: i64) -> StoreResult<u32>;

    async fn list_orders_by_category(&self, category: Category) -> StoreResult<Vec<Order>>;
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// PostgreSQL-backed store
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

#[derive(Debug, FromRow)]
struct OrderRow {
    id: i64,
    creator_id: i64,
    category: String,
    text: String,
    photo_file_id: Option<String>,
    complaints: i32,
    created_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let category = row
            .category
            .parse::<Category>()
            .map_err(|e| StoreError::Corrupt(format!("order {}: {e}", row.id)))?;
        Ok(Order {
            id: row.id,
            creator_id: row.creator_id,
            category,
            text: row.text,
            photo_file_id: row.photo_file_id,
            complaints: complaint_count(row.id, row.complaints)?,
            created_at: row.created_at,
        })
    }
}

fn complaint_count(order_id: i64, raw: i32) -> StoreResult<u32> {
    u32::try_from(raw)
        .map_err(|_| StoreError::Corrupt(format!("order {order_id}: negative complaint count {raw}")))
}

#[derive(Debug, FromRow)]
struct ProfileRow {
    user_id: i64,
    username: Option<String>,
    description: String,
    photo_file_id: Option<String>,
}

impl From<ProfileRow> for Profile {
    fn from(row: ProfileRow) -> Self {
        Profile {
            user_id: row.user_id,
            username: row.username.unwrap_or_default(),
            description: row.description,
            photo_file_id: row.photo_file_id,
        }
    }
}

const ORDER_COLUMNS: &str = "id, creator_id, category, text, photo_file_id, complaints, created_at";

impl PgStore {
    /// Connect to `database_url` and make sure the schema exists
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .acquire_timeout(CONNECT_TIMEOUT)
            .connect(database_url)
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> StoreResult<()> {
        info!("Initializing database schema...");

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS profiles (
                user_id BIGINT PRIMARY KEY,
                username TEXT,
                description TEXT NOT NULL,
                photo_file_id TEXT,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS orders (
                id BIGSERIAL PRIMARY KEY,
                creator_id BIGINT NOT NULL,
                category TEXT NOT NULL,
                text TEXT NOT NULL,
                photo_file_id TEXT,
                complaints INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS orders_creator_id_key ON orders (creator_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS orders_category_idx ON orders (category)")
            .execute(&self.pool)
            .await?;

        info!("Database schema initialized successfully");
        Ok(())
    }

    async fn fetch_order(&self, column: &str, value: i64) -> StoreResult<Order> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE {column} = $1");
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;
        Order::try_from(row)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn upsert_profile(&self, profile: &Profile) -> StoreResult<()> {
        debug!(user_id = profile.user_id, "Upserting profile");
        sqlx::query(
            "INSERT INTO profiles (user_id, username, description, photo_file_id, updated_at)
             VALUES ($1, $2, $3, $4, NOW())
             ON CONFLICT (user_id) DO UPDATE SET
                username = EXCLUDED.username,
                description = EXCLUDED.description,
                photo_file_id = EXCLUDED.photo_file_id,
                updated_at = EXCLUDED.updated_at",
        )
        .bind(profile.user_id)
        .bind(&profile.username)
        .bind(&profile.description)
        .bind(&profile.photo_file_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_profile(&self, user_id: i64) -> StoreResult<Profile> {
        sqlx::query_as::<_, ProfileRow>(
            "SELECT user_id, username, description, photo_file_id FROM profiles WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .map(Profile::from)
        .ok_or(StoreError::NotFound)
    }

    async fn delete_profile(&self, user_id: i64) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM profiles WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn create_order(&self, order: NewOrder) -> StoreResult<i64> {
        // The unique index on creator_id makes the conflict check atomic
        let id: Option<i64> = sqlx::query_scalar(
            "INSERT INTO orders (creator_id, category, text, photo_file_id)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (creator_id) DO NOTHING
             RETURNING id",
        )
        .bind(order.creator_id)
        .bind(order.category.as_str())
        .bind(&order.text)
        .bind(&order.photo_file_id)
        .fetch_optional(&self.pool)
        .await?;

        match id {
            Some(id) => {
                info!(order_id = id, creator_id = order.creator_id, "Order created");
                Ok(id)
            }
            None => Err(StoreError::OrderConflict {
                creator_id: order.creator_id,
            }),
        }
    }

    async fn get_order_by_creator(&self, user_id: i64) -> StoreResult<Order> {
        self.fetch_order("creator_id", user_id).await
    }

    async fn get_order_by_id(&self, id: i64) -> StoreResult<Order> {
        self.fetch_order("id", id).await
    }

    async fn delete_order_by_id(&self, id: i64) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        info!(order_id = id, "Order deleted");
        Ok(())
    }

    async fn update_order(&self, order: &Order) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE orders SET category = $1, text = $2, photo_file_id = $3 WHERE id = $4",
        )
        .bind(order.category.as_str())
        .bind(&order.text)
        .bind(&order.photo_file_id)
        .bind(order.id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn increment_complaint(&self, order_id: i64) -> StoreResult<u32> {
        let count: Option<i32> = sqlx::query_scalar(
            "UPDATE orders SET complaints = complaints + 1 WHERE id = $1 RETURNING complaints",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        let count = count.ok_or(StoreError::NotFound)?;
        complaint_count(order_id, count)
    }

    async fn list_orders_by_category(&self, category: Category) -> StoreResult<Vec<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE category = $1 ORDER BY id");
        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(category.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Order::try_from).collect()
    }
}
