//! Order persistence.
//!
//! Orders are stored as a `customer_order` header plus `order_line` rows.
//! [`OrderStore::save`] writes both in one transaction and only succeeds when
//! the caller presents the version it loaded.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use koi_farm_core::{FishId, OrderId, PaymentStatus, Price, UserId};

use super::RepositoryError;
use crate::models::{NewOrder, Order, OrderLine};

/// Storage for the order aggregate.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Load an order with its lines.
    async fn get_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// All orders placed by `customer_id`, newest first.
    async fn list_by_customer(&self, customer_id: UserId) -> Result<Vec<Order>, RepositoryError>;

    /// Every order, newest first.
    async fn list_all(&self) -> Result<Vec<Order>, RepositoryError>;

    /// Insert a new pending order at version 1.
    async fn create(&self, order: NewOrder) -> Result<Order, RepositoryError>;

    /// Persist `order`, replacing its lines.
    ///
    /// Succeeds only if the stored version equals `order.version`; the returned
    /// order carries the bumped version. A stale version yields
    /// `RepositoryError::Conflict`, a missing order `RepositoryError::NotFound`.
    async fn save(&self, order: &Order) -> Result<Order, RepositoryError>;
}

#[derive(FromRow)]
struct OrderRow {
    id: OrderId,
    customer_id: UserId,
    status: PaymentStatus,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
}

#[derive(FromRow)]
struct OrderLineRow {
    order_id: OrderId,
    fish_id: FishId,
    quantity: i32,
    unit_price: Price,
}

impl TryFrom<OrderLineRow> for OrderLine {
    type Error = RepositoryError;

    fn try_from(row: OrderLineRow) -> Result<Self, Self::Error> {
        let quantity = u32::try_from(row.quantity)
            .ok()
            .filter(|q| *q > 0)
            .ok_or_else(|| {
                RepositoryError::DataCorruption(format!(
                    "invalid quantity {} on order {} fish {}",
                    row.quantity, row.order_id, row.fish_id
                ))
            })?;
        Ok(Self {
            fish_id: row.fish_id,
            quantity,
            unit_price: row.unit_price,
        })
    }
}

impl OrderRow {
    fn into_order(self, lines: Vec<OrderLine>) -> Order {
        Order {
            id: self.id,
            customer_id: self.customer_id,
            lines,
            status: self.status,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
            paid_at: self.paid_at,
        }
    }
}

const ORDER_COLUMNS: &str = "id, customer_id, status, version, created_at, updated_at, paid_at";

/// `PostgreSQL` implementation of [`OrderStore`].
#[derive(Clone)]
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_lines(&self, order_ids: &[i32]) -> Result<Vec<OrderLineRow>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderLineRow>(
            r"
            SELECT order_id, fish_id, quantity, unit_price
            FROM koi.order_line
            WHERE order_id = ANY($1)
            ORDER BY order_id, fish_id
            ",
        )
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn attach_lines(&self, headers: Vec<OrderRow>) -> Result<Vec<Order>, RepositoryError> {
        let ids: Vec<i32> = headers.iter().map(|h| h.id.as_i32()).collect();
        let mut line_rows = self.load_lines(&ids).await?;

        let mut orders = Vec::with_capacity(headers.len());
        for header in headers {
            let (mine, rest): (Vec<_>, Vec<_>) =
                line_rows.into_iter().partition(|l| l.order_id == header.id);
            line_rows = rest;
            let lines = mine
                .into_iter()
                .map(OrderLine::try_from)
                .collect::<Result<Vec<_>, _>>()?;
            orders.push(header.into_order(lines));
        }
        Ok(orders)
    }
}

async fn replace_lines(
    tx: &mut Transaction<'_, Postgres>,
    order_id: OrderId,
    lines: &[OrderLine],
) -> Result<(), RepositoryError> {
    sqlx::query("DELETE FROM koi.order_line WHERE order_id = $1")
        .bind(order_id)
        .execute(&mut **tx)
        .await?;

    if lines.is_empty() {
        return Ok(());
    }

    let fish_ids: Vec<i32> = lines.iter().map(|l| l.fish_id.as_i32()).collect();
    let quantities = lines
        .iter()
        .map(|l| {
            i32::try_from(l.quantity).map_err(|_| {
                RepositoryError::DataCorruption(format!("quantity {} out of range", l.quantity))
            })
        })
        .collect::<Result<Vec<i32>, _>>()?;
    let prices: Vec<rust_decimal::Decimal> = lines.iter().map(|l| l.unit_price.amount()).collect();

    sqlx::query(
        r"
        INSERT INTO koi.order_line (order_id, fish_id, quantity, unit_price)
        SELECT $1, * FROM UNNEST($2::int4[], $3::int4[], $4::numeric[])
        ",
    )
    .bind(order_id)
    .bind(&fish_ids)
    .bind(&quantities)
    .bind(&prices)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

#[async_trait]
impl OrderStore for PgOrderRepository {
    async fn get_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let header = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM koi.customer_order WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match header {
            Some(h) => Ok(self.attach_lines(vec![h]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_by_customer(&self, customer_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let headers = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM koi.customer_order
             WHERE customer_id = $1
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        self.attach_lines(headers).await
    }

    async fn list_all(&self) -> Result<Vec<Order>, RepositoryError> {
        let headers = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM koi.customer_order ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        self.attach_lines(headers).await
    }

    async fn create(&self, order: NewOrder) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let header = sqlx::query_as::<_, OrderRow>(&format!(
            "INSERT INTO koi.customer_order (customer_id) VALUES ($1) RETURNING {ORDER_COLUMNS}"
        ))
        .bind(order.customer_id)
        .fetch_one(&mut *tx)
        .await?;

        let mut lines = order.lines;
        lines.sort_by_key(|l| l.fish_id);
        replace_lines(&mut tx, header.id, &lines).await?;
        tx.commit().await?;

        Ok(header.into_order(lines))
    }

    async fn save(&self, order: &Order) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query_as::<_, OrderRow>(&format!(
            "UPDATE koi.customer_order
             SET status = $3, paid_at = $4, version = version + 1, updated_at = now()
             WHERE id = $1 AND version = $2
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(order.id)
        .bind(order.version)
        .bind(order.status)
        .bind(order.paid_at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(header) = updated else {
            let exists: Option<i32> =
                sqlx::query_scalar("SELECT version FROM koi.customer_order WHERE id = $1")
                    .bind(order.id)
                    .fetch_optional(&mut *tx)
                    .await?;
            tx.rollback().await?;
            return match exists {
                Some(current) => Err(RepositoryError::Conflict(format!(
                    "order {} is at version {current}, not {}",
                    order.id, order.version
                ))),
                None => Err(RepositoryError::NotFound),
            };
        };

        let mut lines = order.lines.clone();
        lines.sort_by_key(|l| l.fish_id);
        replace_lines(&mut tx, header.id, &lines).await?;
        tx.commit().await?;

        Ok(header.into_order(lines))
    }
}
