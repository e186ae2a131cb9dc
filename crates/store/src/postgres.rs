use async_trait::async_trait;
use common::{Cid, Money, OrderId, ProductId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AddressRecord, CartLine, OrderDocument, OrderQuery, ProductRecord, Result, StockUpdate,
    StoreError, UserRecord, Version,
    store::{AddressBook, CartStore, IdentityStore, OrderStore, ProductStore},
};

const PRODUCT_COLUMNS: &str = "id, name, price_cents, unit, stock_quantity, seller_cid, image";
const ORDER_COLUMNS: &str =
    "id, buyer_cid, seller_cid, transporter_cid, status, version, created_at, payload";
const USER_COLUMNS: &str = "cid, name, phone_number, location, dzongkhag, role";
const ADDRESS_COLUMNS: &str = "id, owner_cid, title, place, dzongkhag, is_default";

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresMarketStore {
    pool: PgPool,
}

impl PostgresMarketStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool to `url`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    fn row_to_product(row: PgRow) -> Result<ProductRecord> {
        Ok(ProductRecord {
            id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
            name: row.try_get("name")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            unit: row.try_get("unit")?,
            stock_quantity: to_stock(row.try_get("stock_quantity")?)?,
            seller: to_cid(row.try_get("seller_cid")?)?,
            image: row.try_get("image")?,
        })
    }

    fn row_to_order(row: PgRow) -> Result<OrderDocument> {
        let transporter: Option<String> = row.try_get("transporter_cid")?;
        Ok(OrderDocument {
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            buyer: to_cid(row.try_get("buyer_cid")?)?,
            seller: to_cid(row.try_get("seller_cid")?)?,
            transporter: transporter.map(to_cid).transpose()?,
            status: row.try_get("status")?,
            version: Version::new(row.try_get("version")?),
            created_at: row.try_get("created_at")?,
            payload: row.try_get("payload")?,
        })
    }

    fn row_to_user(row: PgRow) -> Result<UserRecord> {
        Ok(UserRecord {
            cid: to_cid(row.try_get("cid")?)?,
            name: row.try_get("name")?,
            phone_number: row.try_get("phone_number")?,
            location: row.try_get("location")?,
            dzongkhag: row.try_get("dzongkhag")?,
            role: row.try_get("role")?,
        })
    }

    fn row_to_address(row: PgRow) -> Result<AddressRecord> {
        Ok(AddressRecord {
            id: row.try_get("id")?,
            owner: to_cid(row.try_get("owner_cid")?)?,
            title: row.try_get("title")?,
            place: row.try_get("place")?,
            dzongkhag: row.try_get("dzongkhag")?,
            is_default: row.try_get("is_default")?,
        })
    }
}

fn to_cid(value: String) -> Result<Cid> {
    Cid::parse(&value).map_err(|e| StoreError::InvalidRecord(e.to_string()))
}

fn to_stock(value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::InvalidRecord(format!("stock out of range: {value}")))
}

#[async_trait]
impl ProductStore for PostgresMarketStore {
    async fn get_product(&self, id: ProductId) -> Result<Option<ProductRecord>> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_product).transpose()
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<ProductRecord>> {
        let uuids: Vec<Uuid> = ids.iter().map(ProductId::as_uuid).collect();
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)"
        ))
        .bind(uuids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_product).collect()
    }

    async fn put_product(&self, product: ProductRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, price_cents, unit, stock_quantity, seller_cid, image)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                price_cents = EXCLUDED.price_cents,
                unit = EXCLUDED.unit,
                stock_quantity = EXCLUDED.stock_quantity,
                seller_cid = EXCLUDED.seller_cid,
                image = EXCLUDED.image
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(&product.unit)
        .bind(i64::from(product.stock_quantity))
        .bind(product.seller.as_str())
        .bind(&product.image)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn decrement_stock(&self, id: ProductId, quantity: u32) -> Result<StockUpdate> {
        let quantity = i64::from(quantity);

        // The WHERE clause is the guard: Postgres re-checks it under the row
        // lock, so concurrent decrements serialize on the row.
        let remaining: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET stock_quantity = stock_quantity - $2
            WHERE id = $1 AND stock_quantity >= $2
            RETURNING stock_quantity
            "#,
        )
        .bind(id.as_uuid())
        .bind(quantity)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(remaining) = remaining {
            return Ok(StockUpdate::Applied {
                remaining: to_stock(remaining)?,
            });
        }

        let available: Option<i64> =
            sqlx::query_scalar("SELECT stock_quantity FROM products WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        match available {
            Some(available) => Ok(StockUpdate::Insufficient {
                available: to_stock(available)?,
            }),
            None => Ok(StockUpdate::Missing),
        }
    }

    async fn increment_stock(&self, id: ProductId, quantity: u32) -> Result<u32> {
        let stock: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET stock_quantity = stock_quantity + $2
            WHERE id = $1
            RETURNING stock_quantity
            "#,
        )
        .bind(id.as_uuid())
        .bind(i64::from(quantity))
        .fetch_optional(&self.pool)
        .await?;

        to_stock(stock.ok_or(StoreError::ProductNotFound(id))?)
    }
}

#[async_trait]
impl OrderStore for PostgresMarketStore {
    async fn insert_orders(&self, orders: Vec<OrderDocument>) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for order in &orders {
            sqlx::query(
                r#"
                INSERT INTO orders (id, buyer_cid, seller_cid, transporter_cid, status, version, created_at, payload)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(order.order_id.as_uuid())
            .bind(order.buyer.as_str())
            .bind(order.seller.as_str())
            .bind(order.transporter.as_ref().map(Cid::as_str))
            .bind(&order.status)
            .bind(Version::first().as_i64())
            .bind(order.created_at)
            .bind(&order.payload)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("orders_pkey")
                {
                    return StoreError::DuplicateOrder(order.order_id);
                }
                StoreError::Database(e)
            })?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<OrderDocument>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn update_order(&self, order: OrderDocument, expected: Version) -> Result<Version> {
        let order_id = order.order_id;

        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE orders
            SET transporter_cid = $2, status = $3, payload = $4, version = version + 1
            WHERE id = $1 AND version = $5
            RETURNING version
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(order.transporter.as_ref().map(Cid::as_str))
        .bind(&order.status)
        .bind(&order.payload)
        .bind(expected.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(version) = updated {
            return Ok(Version::new(version));
        }

        let actual: Option<i64> = sqlx::query_scalar("SELECT version FROM orders WHERE id = $1")
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        match actual {
            Some(actual) => Err(StoreError::ConcurrencyConflict {
                order_id,
                expected,
                actual: Version::new(actual),
            }),
            None => Err(StoreError::OrderNotFound(order_id)),
        }
    }

    async fn query_orders(&self, query: OrderQuery) -> Result<Vec<OrderDocument>> {
        let mut sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE 1=1");
        let mut param_count = 0;

        // Build dynamic query
        if query.buyer.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND buyer_cid = ${param_count}"));
        }
        if query.seller.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND seller_cid = ${param_count}"));
        }
        if query.transporter.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND transporter_cid = ${param_count}"));
        }
        if query.statuses.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND status = ANY(${param_count})"));
        }
        if query.unassigned_only {
            sql.push_str(" AND transporter_cid IS NULL");
        }

        sql.push_str(" ORDER BY created_at DESC, seq DESC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(ref buyer) = query.buyer {
            sqlx_query = sqlx_query.bind(buyer.as_str());
        }
        if let Some(ref seller) = query.seller {
            sqlx_query = sqlx_query.bind(seller.as_str());
        }
        if let Some(ref transporter) = query.transporter {
            sqlx_query = sqlx_query.bind(transporter.as_str());
        }
        if let Some(statuses) = query.statuses {
            sqlx_query = sqlx_query.bind(statuses);
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_order).collect()
    }
}

#[async_trait]
impl IdentityStore for PostgresMarketStore {
    async fn get_user(&self, cid: &Cid) -> Result<Option<UserRecord>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE cid = $1"))
            .bind(cid.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_user).transpose()
    }

    async fn get_users(&self, cids: &[Cid]) -> Result<Vec<UserRecord>> {
        let raw: Vec<String> = cids.iter().map(|c| c.as_str().to_string()).collect();
        let rows = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE cid = ANY($1)"))
            .bind(raw)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_user).collect()
    }

    async fn put_user(&self, user: UserRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (cid, name, phone_number, location, dzongkhag, role)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (cid) DO UPDATE SET
                name = EXCLUDED.name,
                phone_number = EXCLUDED.phone_number,
                location = EXCLUDED.location,
                dzongkhag = EXCLUDED.dzongkhag,
                role = EXCLUDED.role
            "#,
        )
        .bind(user.cid.as_str())
        .bind(&user.name)
        .bind(&user.phone_number)
        .bind(&user.location)
        .bind(&user.dzongkhag)
        .bind(&user.role)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl CartStore for PostgresMarketStore {
    async fn get_cart(&self, owner: &Cid) -> Result<Vec<CartLine>> {
        let rows = sqlx::query(
            "SELECT product_id, quantity FROM cart_items WHERE owner_cid = $1 ORDER BY position ASC",
        )
        .bind(owner.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(CartLine {
                    product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
                    quantity: to_stock(row.try_get("quantity")?)?,
                })
            })
            .collect()
    }

    async fn put_cart(&self, owner: &Cid, lines: Vec<CartLine>) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM cart_items WHERE owner_cid = $1")
            .bind(owner.as_str())
            .execute(&mut *tx)
            .await?;

        for (position, line) in lines.iter().enumerate() {
            sqlx::query(
                "INSERT INTO cart_items (owner_cid, position, product_id, quantity) VALUES ($1, $2, $3, $4)",
            )
            .bind(owner.as_str())
            .bind(position as i32)
            .bind(line.product_id.as_uuid())
            .bind(i64::from(line.quantity))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn clear_cart(&self, owner: &Cid) -> Result<()> {
        sqlx::query("DELETE FROM cart_items WHERE owner_cid = $1")
            .bind(owner.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AddressBook for PostgresMarketStore {
    async fn get_address(&self, owner: &Cid, id: Uuid) -> Result<Option<AddressRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {ADDRESS_COLUMNS} FROM addresses WHERE owner_cid = $1 AND id = $2"
        ))
        .bind(owner.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_address).transpose()
    }

    async fn default_address(&self, owner: &Cid) -> Result<Option<AddressRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {ADDRESS_COLUMNS} FROM addresses WHERE owner_cid = $1 AND is_default"
        ))
        .bind(owner.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_address).transpose()
    }

    async fn put_address(&self, address: AddressRecord) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        if address.is_default {
            sqlx::query("UPDATE addresses SET is_default = FALSE WHERE owner_cid = $1 AND id <> $2")
                .bind(address.owner.as_str())
                .bind(address.id)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO addresses (id, owner_cid, title, place, dzongkhag, is_default)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                owner_cid = EXCLUDED.owner_cid,
                title = EXCLUDED.title,
                place = EXCLUDED.place,
                dzongkhag = EXCLUDED.dzongkhag,
                is_default = EXCLUDED.is_default
            "#,
        )
        .bind(address.id)
        .bind(address.owner.as_str())
        .bind(&address.title)
        .bind(&address.place)
        .bind(&address.dzongkhag)
        .bind(address.is_default)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
