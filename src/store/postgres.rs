//! Postgres store.
//!
//! Money columns are NUMERIC, line items and address snapshots are JSONB.
//! Stock changes are always conditional `UPDATE`s so concurrent checkouts can
//! never drive stock below zero.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use uuid::Uuid;

use super::*;
use crate::domain::aggregates::{
    AddressType, AppliedCoupon, CartLine, OrderLine, Role, ShippingAddress,
};
use crate::domain::pricing::CartTotals;
use crate::domain::value_objects::{ImageRef, Percentage};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connects and runs the embedded migrations.
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self { Self { pool } }
}

fn conflict_on_unique(err: sqlx::Error, conflict: impl FnOnce() -> StoreError) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => conflict(),
        _ => StoreError::Database(err),
    }
}

fn to_u32(v: i32, column: &str) -> StoreResult<u32> {
    u32::try_from(v).map_err(|_| StoreError::Corrupt(format!("{column} is negative: {v}")))
}

fn to_i32(v: u32) -> StoreResult<i32> {
    i32::try_from(v).map_err(|_| StoreError::Corrupt(format!("{v} does not fit an INTEGER column")))
}

fn to_i64(v: u64) -> i64 { i64::try_from(v).unwrap_or(i64::MAX) }

fn parse<T: std::str::FromStr>(raw: &str, column: &str) -> StoreResult<T> {
    raw.parse().map_err(|_| StoreError::Corrupt(format!("unknown {column}: {raw}")))
}

fn address_type(raw: &str) -> StoreResult<AddressType> {
    match raw {
        "Home" => Ok(AddressType::Home),
        "Work" => Ok(AddressType::Work),
        "Other" => Ok(AddressType::Other),
        other => Err(StoreError::Corrupt(format!("unknown address_type: {other}"))),
    }
}

fn role(raw: &str) -> StoreResult<Role> {
    match raw {
        "user" => Ok(Role::User),
        "admin" => Ok(Role::Admin),
        other => Err(StoreError::Corrupt(format!("unknown role: {other}"))),
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: Uuid, name: String, description: Option<String>, image: Option<Json<ImageRef>>,
    is_deleted: bool, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl From<CategoryRow> for Category {
    fn from(r: CategoryRow) -> Self {
        Category {
            id: r.id, name: r.name, description: r.description, image: r.image.map(|j| j.0),
            is_deleted: r.is_deleted, created_at: r.created_at, updated_at: r.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CategorySummaryRow { id: Uuid, name: String, is_deleted: bool, total_products: i64 }

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid, name: String, description: String, cost: Decimal, price: Decimal,
    discount_percentage: Decimal, discounted_price: Decimal, stock: i32, total_quantity: i32, defected: i32,
    images: Json<Vec<ImageRef>>, category_id: Uuid, is_featured: bool, is_deleted: bool,
    created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;
    fn try_from(r: ProductRow) -> StoreResult<Self> {
        Ok(Product {
            id: r.id, name: r.name, description: r.description, cost: r.cost, price: r.price,
            discount_percentage: Percentage::new(r.discount_percentage).map_err(|e| StoreError::Corrupt(e.to_string()))?,
            discounted_price: r.discounted_price, stock: to_u32(r.stock, "stock")?,
            total_quantity: to_u32(r.total_quantity, "total_quantity")?, defected: to_u32(r.defected, "defected")?,
            images: r.images.0, category_id: r.category_id, is_featured: r.is_featured, is_deleted: r.is_deleted,
            created_at: r.created_at, updated_at: r.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ListingRow {
    #[sqlx(flatten)]
    product: ProductRow,
    category_name: Option<String>,
}

#[derive(sqlx::FromRow)]
struct DefectRow { id: Uuid, product_id: Uuid, quantity: i32, reason: String, created_at: DateTime<Utc> }

#[derive(sqlx::FromRow)]
struct CouponRow {
    id: Uuid, code: String, discount: Decimal, max_limit: i32, min_order_amount: Decimal,
    start_date: DateTime<Utc>, expiry: DateTime<Utc>, used_count: i32, is_active: bool,
    applicable_categories: Vec<Uuid>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl TryFrom<CouponRow> for Coupon {
    type Error = StoreError;
    fn try_from(r: CouponRow) -> StoreResult<Self> {
        Ok(Coupon {
            id: r.id,
            code: CouponCode::new(&r.code).map_err(|e| StoreError::Corrupt(e.to_string()))?,
            discount: Percentage::new(r.discount).map_err(|e| StoreError::Corrupt(e.to_string()))?,
            max_limit: to_u32(r.max_limit, "max_limit")?, min_order_amount: r.min_order_amount,
            start_date: r.start_date, expiry: r.expiry, used_count: to_u32(r.used_count, "used_count")?,
            is_active: r.is_active, applicable_categories: r.applicable_categories,
            created_at: r.created_at, updated_at: r.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CartRow {
    id: Uuid, user_id: Uuid, items: Json<Vec<CartLine>>, applied_coupon: Option<Json<AppliedCoupon>>,
    discount_amount: Decimal, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl From<CartRow> for Cart {
    fn from(r: CartRow) -> Self {
        Cart::from_parts(r.id, r.user_id, r.items.0, r.applied_coupon.map(|j| j.0), r.discount_amount, r.created_at, r.updated_at)
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid, user_id: Uuid, products: Json<Vec<OrderLine>>,
    total_amount: Decimal, discount_amount: Decimal, shipping_charge: Decimal, shipping_discount: Decimal,
    tax_amount: Decimal, final_amount: Decimal, coupon: Option<Json<AppliedCoupon>>, address: Json<ShippingAddress>,
    payment_method: String, payment_status: String, order_status: String, is_paid: bool,
    created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;
    fn try_from(r: OrderRow) -> StoreResult<Self> {
        let totals = CartTotals {
            total_amount: r.total_amount, discount_amount: r.discount_amount, shipping_charge: r.shipping_charge,
            shipping_discount: r.shipping_discount, tax_amount: r.tax_amount, final_amount: r.final_amount,
        };
        Ok(Order::from_parts(
            r.id, r.user_id, r.products.0, totals, r.coupon.map(|j| j.0), r.address.0,
            parse(&r.payment_method, "payment_method")?, parse(&r.payment_status, "payment_status")?,
            parse(&r.order_status, "order_status")?, r.is_paid, r.created_at, r.updated_at,
        ))
    }
}

#[derive(sqlx::FromRow)]
struct AddressRow {
    id: Uuid, user_id: Uuid, full_name: String, phone_number: String, alternate_phone_number: Option<String>,
    street_address: String, city: String, state: String, postal_code: String, country: String,
    address_type: String, is_default: bool, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl TryFrom<AddressRow> for Address {
    type Error = StoreError;
    fn try_from(r: AddressRow) -> StoreResult<Self> {
        Ok(Address {
            id: r.id, user_id: r.user_id, full_name: r.full_name, phone_number: r.phone_number,
            alternate_phone_number: r.alternate_phone_number, street_address: r.street_address, city: r.city,
            state: r.state, postal_code: r.postal_code, country: r.country, address_type: address_type(&r.address_type)?,
            is_default: r.is_default, created_at: r.created_at, updated_at: r.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OfferRow {
    id: Uuid, title: String, description: String, start_date: DateTime<Utc>, end_date: DateTime<Utc>,
    coupon_ids: Vec<Uuid>, images: Json<Vec<ImageRef>>, is_active: bool,
    created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl From<OfferRow> for Offer {
    fn from(r: OfferRow) -> Self {
        Offer {
            id: r.id, title: r.title, description: r.description, start_date: r.start_date, end_date: r.end_date,
            coupon_ids: r.coupon_ids, images: r.images.0, is_active: r.is_active,
            created_at: r.created_at, updated_at: r.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid, name: String, email: String, avatar: Option<Json<ImageRef>>, phone: String,
    role: String, status: String, wishlist: Vec<Uuid>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;
    fn try_from(r: UserRow) -> StoreResult<Self> {
        Ok(User {
            id: r.id, name: r.name, email: r.email, avatar: r.avatar.map(|j| j.0), phone: r.phone,
            role: role(&r.role)?, status: parse(&r.status, "status")?, wishlist: r.wishlist,
            created_at: r.created_at, updated_at: r.updated_at,
        })
    }
}

fn collect<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

const PRODUCT_FILTER: &str = "WHERE p.is_deleted = $1 \
    AND ($2::uuid IS NULL OR p.category_id = $2) \
    AND ($3::text IS NULL OR POSITION(LOWER($3) IN LOWER(p.name)) > 0) \
    AND ($4::text IS NULL \
         OR ($4 = 'inStock' AND p.stock > 0) \
         OR ($4 = 'outOfStock' AND p.stock = 0) \
         OR ($4 = 'lowStock' AND p.stock < $5))";

fn stock_filter_tag(filter: Option<StockFilter>) -> Option<&'static str> {
    filter.map(|f| match f {
        StockFilter::InStock => "inStock",
        StockFilter::OutOfStock => "outOfStock",
        StockFilter::LowStock => "lowStock",
    })
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn insert_category(&self, c: &Category) -> StoreResult<()> {
        sqlx::query("INSERT INTO categories (id, name, description, image, is_deleted, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7)")
            .bind(c.id).bind(&c.name).bind(&c.description).bind(c.image.as_ref().map(Json)).bind(c.is_deleted).bind(c.created_at).bind(c.updated_at)
            .execute(&self.pool).await
            .map_err(|e| conflict_on_unique(e, || duplicate_category(&c.name)))?;
        Ok(())
    }

    async fn category(&self, id: Uuid) -> StoreResult<Option<Category>> {
        let row = sqlx::query_as::<_, CategoryRow>("SELECT * FROM categories WHERE id = $1").bind(id).fetch_optional(&self.pool).await?;
        Ok(row.map(Category::from))
    }

    async fn list_categories(&self) -> StoreResult<Vec<CategorySummary>> {
        let rows = sqlx::query_as::<_, CategorySummaryRow>(
            "SELECT c.id, c.name, c.is_deleted, COUNT(p.id) AS total_products FROM categories c \
             LEFT JOIN products p ON p.category_id = c.id GROUP BY c.id ORDER BY LOWER(c.name)")
            .fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|r| CategorySummary {
            id: r.id, name: r.name, is_deleted: r.is_deleted, total_products: u64::try_from(r.total_products).unwrap_or(0),
        }).collect())
    }

    async fn set_category_deleted(&self, id: Uuid, deleted: bool) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;
        let found = sqlx::query("UPDATE categories SET is_deleted = $2, updated_at = NOW() WHERE id = $1")
            .bind(id).bind(deleted).execute(&mut *tx).await?.rows_affected();
        if found == 0 { return Err(StoreError::NotFound("Category")); }
        let touched = sqlx::query("UPDATE products SET is_deleted = $2, updated_at = NOW() WHERE category_id = $1")
            .bind(id).bind(deleted).execute(&mut *tx).await?.rows_affected();
        tx.commit().await?;
        Ok(touched)
    }

    async fn insert_product(&self, p: &Product) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO products (id, name, description, cost, price, discount_percentage, discounted_price, stock, \
             total_quantity, defected, images, category_id, is_featured, is_deleted, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)")
            .bind(p.id).bind(&p.name).bind(&p.description).bind(p.cost).bind(p.price).bind(p.discount_percentage.value())
            .bind(p.discounted_price).bind(to_i32(p.stock)?).bind(to_i32(p.total_quantity)?).bind(to_i32(p.defected)?)
            .bind(Json(&p.images)).bind(p.category_id).bind(p.is_featured).bind(p.is_deleted).bind(p.created_at).bind(p.updated_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn product(&self, id: Uuid) -> StoreResult<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1").bind(id).fetch_optional(&self.pool).await?;
        row.map(Product::try_from).transpose()
    }

    async fn products_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = ANY($1)").bind(ids).fetch_all(&self.pool).await?;
        collect(rows)
    }

    async fn list_products(&self, q: &ProductQuery) -> StoreResult<Page<ProductListing>> {
        let low = crate::domain::aggregates::product::LOW_STOCK_THRESHOLD as i32;
        let stock = stock_filter_tag(q.stock);
        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM products p {PRODUCT_FILTER}"))
            .bind(q.show_deleted).bind(q.category_id).bind(q.search.as_deref()).bind(stock).bind(low)
            .fetch_one(&self.pool).await?;
        let rows = sqlx::query_as::<_, ListingRow>(&format!(
            "SELECT p.*, c.name AS category_name FROM products p LEFT JOIN categories c ON c.id = p.category_id \
             {PRODUCT_FILTER} ORDER BY p.created_at DESC, p.id DESC LIMIT $6 OFFSET $7"))
            .bind(q.show_deleted).bind(q.category_id).bind(q.search.as_deref()).bind(stock).bind(low)
            .bind(i64::from(q.page.limit)).bind(to_i64(q.page.offset()))
            .fetch_all(&self.pool).await?;
        let items = rows.into_iter()
            .map(|r| Ok(ProductListing { product: Product::try_from(r.product)?, category_name: r.category_name }))
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(Page { items, total: u64::try_from(total).unwrap_or(0) })
    }

    async fn update_product(&self, p: &Product) -> StoreResult<()> {
        let found = sqlx::query(
            "UPDATE products SET name = $2, description = $3, cost = $4, price = $5, discount_percentage = $6, \
             discounted_price = $7, images = $8, category_id = $9, is_featured = $10, is_deleted = $11, updated_at = $12 \
             WHERE id = $1")
            .bind(p.id).bind(&p.name).bind(&p.description).bind(p.cost).bind(p.price).bind(p.discount_percentage.value())
            .bind(p.discounted_price).bind(Json(&p.images)).bind(p.category_id).bind(p.is_featured).bind(p.is_deleted).bind(p.updated_at)
            .execute(&self.pool).await?.rows_affected();
        if found == 0 { return Err(StoreError::NotFound("Product")); }
        Ok(())
    }

    async fn adjust_stock(&self, id: Uuid, action: StockAction, quantity: u32, reason: Option<&str>) -> StoreResult<Product> {
        let qty = to_i32(quantity)?;
        let sql = match action {
            StockAction::Add => "UPDATE products SET stock = stock + $2, total_quantity = total_quantity + $2, updated_at = NOW() WHERE id = $1 RETURNING *",
            StockAction::Remove => "UPDATE products SET stock = stock - $2, updated_at = NOW() WHERE id = $1 AND stock >= $2 RETURNING *",
            StockAction::Defective => "UPDATE products SET stock = stock - $2, defected = defected + $2, updated_at = NOW() WHERE id = $1 AND stock >= $2 RETURNING *",
        };
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, ProductRow>(sql).bind(id).bind(qty).fetch_optional(&mut *tx).await?;
        let Some(row) = row else {
            let name: Option<String> = sqlx::query_scalar("SELECT name FROM products WHERE id = $1").bind(id).fetch_optional(&mut *tx).await?;
            return Err(name.map_or(StoreError::NotFound("Product"), |n| StoreError::InsufficientStock(vec![n])));
        };
        if action == StockAction::Defective {
            sqlx::query("INSERT INTO defective_products (id, product_id, quantity, reason, created_at) VALUES ($1, $2, $3, $4, NOW())")
                .bind(Uuid::now_v7()).bind(id).bind(qty).bind(reason.unwrap_or_default())
                .execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Product::try_from(row)
    }

    async fn defective_records(&self, product_id: Uuid) -> StoreResult<Vec<DefectiveProduct>> {
        let rows = sqlx::query_as::<_, DefectRow>("SELECT * FROM defective_products WHERE product_id = $1 ORDER BY created_at DESC")
            .bind(product_id).fetch_all(&self.pool).await?;
        rows.into_iter().map(|r| Ok(DefectiveProduct {
            id: r.id, product_id: r.product_id, quantity: to_u32(r.quantity, "quantity")?, reason: r.reason, created_at: r.created_at,
        })).collect()
    }
}

// ---------------------------------------------------------------------------
// Coupons
// ---------------------------------------------------------------------------

#[async_trait]
impl CouponStore for PgStore {
    async fn insert_coupon(&self, c: &Coupon) -> StoreResult<()> {
        insert_coupon(&self.pool, c).await
    }

    async fn coupon(&self, id: Uuid) -> StoreResult<Option<Coupon>> {
        let row = sqlx::query_as::<_, CouponRow>("SELECT * FROM coupons WHERE id = $1").bind(id).fetch_optional(&self.pool).await?;
        row.map(Coupon::try_from).transpose()
    }

    async fn coupon_by_code(&self, code: &CouponCode) -> StoreResult<Option<Coupon>> {
        let row = sqlx::query_as::<_, CouponRow>("SELECT * FROM coupons WHERE code = $1").bind(code.as_str()).fetch_optional(&self.pool).await?;
        row.map(Coupon::try_from).transpose()
    }

    async fn coupons_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Coupon>> {
        let rows = sqlx::query_as::<_, CouponRow>("SELECT * FROM coupons WHERE id = ANY($1)").bind(ids).fetch_all(&self.pool).await?;
        collect(rows)
    }

    async fn list_coupons(&self) -> StoreResult<Vec<Coupon>> {
        let rows = sqlx::query_as::<_, CouponRow>("SELECT * FROM coupons ORDER BY created_at DESC").fetch_all(&self.pool).await?;
        collect(rows)
    }

    async fn update_coupon(&self, c: &Coupon) -> StoreResult<()> {
        let found = sqlx::query(
            "UPDATE coupons SET code = $2, discount = $3, max_limit = $4, min_order_amount = $5, start_date = $6, expiry = $7, \
             is_active = $8, applicable_categories = $9, updated_at = $10 WHERE id = $1")
            .bind(c.id).bind(c.code.as_str()).bind(c.discount.value()).bind(to_i32(c.max_limit)?).bind(c.min_order_amount)
            .bind(c.start_date).bind(c.expiry).bind(c.is_active).bind(&c.applicable_categories).bind(c.updated_at)
            .execute(&self.pool).await
            .map_err(|e| conflict_on_unique(e, || duplicate_code(&c.code)))?
            .rows_affected();
        if found == 0 { return Err(StoreError::NotFound("Coupon")); }
        Ok(())
    }

    async fn delete_coupon(&self, id: Uuid) -> StoreResult<bool> {
        let gone = sqlx::query("DELETE FROM coupons WHERE id = $1").bind(id).execute(&self.pool).await?.rows_affected();
        Ok(gone > 0)
    }
}

async fn insert_coupon<'e, E>(executor: E, c: &Coupon) -> StoreResult<()>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        "INSERT INTO coupons (id, code, discount, max_limit, min_order_amount, start_date, expiry, used_count, is_active, \
         applicable_categories, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)")
        .bind(c.id).bind(c.code.as_str()).bind(c.discount.value()).bind(to_i32(c.max_limit)?).bind(c.min_order_amount)
        .bind(c.start_date).bind(c.expiry).bind(to_i32(c.used_count)?).bind(c.is_active).bind(&c.applicable_categories)
        .bind(c.created_at).bind(c.updated_at)
        .execute(executor).await
        .map_err(|e| conflict_on_unique(e, || duplicate_code(&c.code)))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Carts
// ---------------------------------------------------------------------------

#[async_trait]
impl CartStore for PgStore {
    async fn cart_for_user(&self, user_id: Uuid) -> StoreResult<Option<Cart>> {
        let row = sqlx::query_as::<_, CartRow>("SELECT * FROM carts WHERE user_id = $1").bind(user_id).fetch_optional(&self.pool).await?;
        Ok(row.map(Cart::from))
    }

    async fn save_cart(&self, cart: &Cart) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO carts (id, user_id, items, applied_coupon, discount_amount, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (user_id) DO UPDATE SET items = EXCLUDED.items, applied_coupon = EXCLUDED.applied_coupon, \
             discount_amount = EXCLUDED.discount_amount, updated_at = EXCLUDED.updated_at")
            .bind(cart.id()).bind(cart.user_id()).bind(Json(cart.items())).bind(cart.applied_coupon().map(Json))
            .bind(cart.totals().discount_amount).bind(cart.created_at()).bind(cart.updated_at())
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn delete_cart_for_user(&self, user_id: Uuid) -> StoreResult<bool> {
        let gone = sqlx::query("DELETE FROM carts WHERE user_id = $1").bind(user_id).execute(&self.pool).await?.rows_affected();
        Ok(gone > 0)
    }

    async fn purge_carts_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        Ok(sqlx::query("DELETE FROM carts WHERE updated_at < $1").bind(cutoff).execute(&self.pool).await?.rows_affected())
    }
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

const ORDER_FILTER: &str = "WHERE ($1::uuid IS NULL OR user_id = $1) \
    AND ($2::text IS NULL OR order_status = $2) \
    AND ($3::text IS NULL OR payment_status = $3) \
    AND ($4::text IS NULL OR payment_method = $4) \
    AND ($5::timestamptz IS NULL OR created_at >= $5) \
    AND ($6::timestamptz IS NULL OR created_at <= $6) \
    AND ($7::text IS NULL OR STARTS_WITH(id::text, $7) OR STARTS_WITH(user_id::text, $7))";

macro_rules! bind_order_filter {
    ($query:expr, $q:expr) => {
        $query
            .bind($q.user_id)
            .bind($q.status.map(|s| s.as_str()))
            .bind($q.payment_status.map(|s| s.as_str()))
            .bind($q.payment_method.map(|m| m.as_str()))
            .bind($q.from)
            .bind($q.until)
            .bind($q.search.as_deref().map(str::to_lowercase))
    };
}

#[async_trait]
impl OrderStore for PgStore {
    async fn place_order(&self, checkout: &Checkout) -> StoreResult<()> {
        let order = &checkout.order;
        let mut tx = self.pool.begin().await?;

        let mut short = Vec::new();
        for line in order.products() {
            let taken = sqlx::query("UPDATE products SET stock = stock - $2, updated_at = NOW() WHERE id = $1 AND stock >= $2")
                .bind(line.product_id).bind(to_i32(line.quantity)?)
                .execute(&mut *tx).await?.rows_affected();
            if taken == 0 { short.push(line.name.clone()); }
        }
        if !short.is_empty() {
            tx.rollback().await?;
            return Err(StoreError::InsufficientStock(short));
        }

        if let Some(coupon_id) = checkout.coupon_id {
            let bumped = sqlx::query("UPDATE coupons SET used_count = used_count + 1, updated_at = NOW() WHERE id = $1 AND used_count < max_limit")
                .bind(coupon_id).execute(&mut *tx).await?.rows_affected();
            if bumped == 0 {
                tx.rollback().await?;
                let code = order.coupon().map(|c| c.code.to_string()).unwrap_or_else(|| coupon_id.to_string());
                return Err(StoreError::CouponExhausted(code));
            }
        }

        let t = order.totals();
        sqlx::query(
            "INSERT INTO orders (id, user_id, products, total_amount, discount_amount, shipping_charge, shipping_discount, \
             tax_amount, final_amount, coupon, address, payment_method, payment_status, order_status, is_paid, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)")
            .bind(order.id()).bind(order.user_id()).bind(Json(order.products()))
            .bind(t.total_amount).bind(t.discount_amount).bind(t.shipping_charge).bind(t.shipping_discount)
            .bind(t.tax_amount).bind(t.final_amount).bind(order.coupon().map(Json)).bind(Json(order.address()))
            .bind(order.payment_method().as_str()).bind(order.payment_status().as_str()).bind(order.status().as_str())
            .bind(order.is_paid()).bind(order.created_at()).bind(order.updated_at())
            .execute(&mut *tx).await?;

        sqlx::query("DELETE FROM carts WHERE id = $1").bind(checkout.cart_id).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(&self.pool).await?;
        row.map(Order::try_from).transpose()
    }

    async fn list_orders(&self, q: &OrderQuery) -> StoreResult<Page<Order>> {
        let count_sql = format!("SELECT COUNT(*) FROM orders {ORDER_FILTER}");
        let total: i64 = bind_order_filter!(sqlx::query_scalar(&count_sql), q).fetch_one(&self.pool).await?;
        let page_sql = format!("SELECT * FROM orders {ORDER_FILTER} ORDER BY created_at DESC, id DESC LIMIT $8 OFFSET $9");
        let rows = bind_order_filter!(sqlx::query_as::<_, OrderRow>(&page_sql), q)
            .bind(i64::from(q.page.limit)).bind(to_i64(q.page.offset()))
            .fetch_all(&self.pool).await?;
        Ok(Page { items: collect(rows)?, total: u64::try_from(total).unwrap_or(0) })
    }

    async fn orders_for_users(&self, user_ids: &[Uuid]) -> StoreResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE user_id = ANY($1) ORDER BY created_at DESC, id DESC")
            .bind(user_ids).fetch_all(&self.pool).await?;
        collect(rows)
    }

    async fn change_status(&self, change: &StatusChange) -> StoreResult<()> {
        let order = &change.order;
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            "UPDATE orders SET order_status = $2, payment_status = $3, is_paid = $4, updated_at = $5 \
             WHERE id = $1 AND order_status = $6")
            .bind(order.id()).bind(order.status().as_str()).bind(order.payment_status().as_str()).bind(order.is_paid())
            .bind(order.updated_at()).bind(change.expected.as_str())
            .execute(&mut *tx).await?.rows_affected();
        if updated == 0 {
            let exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM orders WHERE id = $1").bind(order.id()).fetch_optional(&mut *tx).await?;
            return Err(match exists {
                Some(_) => StoreError::StaleStatus { expected: change.expected },
                None => StoreError::NotFound("Order"),
            });
        }
        if change.restock {
            for (product_id, qty) in order.restock_lines() {
                sqlx::query("UPDATE products SET stock = LEAST(stock + $2, total_quantity), updated_at = NOW() WHERE id = $1")
                    .bind(product_id).bind(to_i32(qty)?)
                    .execute(&mut *tx).await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Addresses, offers, users
// ---------------------------------------------------------------------------

#[async_trait]
impl AddressStore for PgStore {
    async fn save_address(&self, a: &Address) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        if a.is_default {
            sqlx::query("UPDATE addresses SET is_default = FALSE WHERE user_id = $1 AND id <> $2")
                .bind(a.user_id).bind(a.id).execute(&mut *tx).await?;
        }
        sqlx::query(
            "INSERT INTO addresses (id, user_id, full_name, phone_number, alternate_phone_number, street_address, city, state, \
             postal_code, country, address_type, is_default, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             ON CONFLICT (id) DO UPDATE SET full_name = EXCLUDED.full_name, phone_number = EXCLUDED.phone_number, \
             alternate_phone_number = EXCLUDED.alternate_phone_number, street_address = EXCLUDED.street_address, \
             city = EXCLUDED.city, state = EXCLUDED.state, postal_code = EXCLUDED.postal_code, country = EXCLUDED.country, \
             address_type = EXCLUDED.address_type, is_default = EXCLUDED.is_default, updated_at = EXCLUDED.updated_at")
            .bind(a.id).bind(a.user_id).bind(&a.full_name).bind(&a.phone_number).bind(&a.alternate_phone_number)
            .bind(&a.street_address).bind(&a.city).bind(&a.state).bind(&a.postal_code).bind(&a.country)
            .bind(a.address_type.as_str()).bind(a.is_default).bind(a.created_at).bind(a.updated_at)
            .execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn address(&self, id: Uuid) -> StoreResult<Option<Address>> {
        let row = sqlx::query_as::<_, AddressRow>("SELECT * FROM addresses WHERE id = $1").bind(id).fetch_optional(&self.pool).await?;
        row.map(Address::try_from).transpose()
    }

    async fn addresses_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Address>> {
        let rows = sqlx::query_as::<_, AddressRow>("SELECT * FROM addresses WHERE user_id = $1 ORDER BY is_default DESC, created_at DESC")
            .bind(user_id).fetch_all(&self.pool).await?;
        collect(rows)
    }

    async fn delete_address(&self, user_id: Uuid, id: Uuid) -> StoreResult<bool> {
        let gone = sqlx::query("DELETE FROM addresses WHERE id = $1 AND user_id = $2").bind(id).bind(user_id).execute(&self.pool).await?.rows_affected();
        Ok(gone > 0)
    }
}

#[async_trait]
impl OfferStore for PgStore {
    async fn insert_offer(&self, o: &Offer, coupons: &[Coupon]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for coupon in coupons {
            insert_coupon(&mut *tx, coupon).await?;
        }
        sqlx::query(
            "INSERT INTO offers (id, title, description, start_date, end_date, coupon_ids, images, is_active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)")
            .bind(o.id).bind(&o.title).bind(&o.description).bind(o.start_date).bind(o.end_date).bind(&o.coupon_ids)
            .bind(Json(&o.images)).bind(o.is_active).bind(o.created_at).bind(o.updated_at)
            .execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn offer(&self, id: Uuid) -> StoreResult<Option<Offer>> {
        let row = sqlx::query_as::<_, OfferRow>("SELECT * FROM offers WHERE id = $1").bind(id).fetch_optional(&self.pool).await?;
        Ok(row.map(Offer::from))
    }

    async fn list_offers(&self) -> StoreResult<Vec<Offer>> {
        let rows = sqlx::query_as::<_, OfferRow>("SELECT * FROM offers ORDER BY end_date ASC").fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Offer::from).collect())
    }

    async fn update_offer(&self, o: &Offer) -> StoreResult<()> {
        let found = sqlx::query(
            "UPDATE offers SET title = $2, description = $3, start_date = $4, end_date = $5, coupon_ids = $6, images = $7, \
             is_active = $8, updated_at = $9 WHERE id = $1")
            .bind(o.id).bind(&o.title).bind(&o.description).bind(o.start_date).bind(o.end_date).bind(&o.coupon_ids)
            .bind(Json(&o.images)).bind(o.is_active).bind(o.updated_at)
            .execute(&self.pool).await?.rows_affected();
        if found == 0 { return Err(StoreError::NotFound("Offer")); }
        Ok(())
    }

    async fn delete_offer(&self, id: Uuid) -> StoreResult<bool> {
        let gone = sqlx::query("DELETE FROM offers WHERE id = $1").bind(id).execute(&self.pool).await?.rows_affected();
        Ok(gone > 0)
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn upsert_by_email(&self, u: &User) -> StoreResult<User> {
        sqlx::query(
            "INSERT INTO users (id, name, email, avatar, phone, role, status, wishlist, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) ON CONFLICT (email) DO NOTHING")
            .bind(u.id).bind(&u.name).bind(&u.email).bind(u.avatar.as_ref().map(Json)).bind(&u.phone)
            .bind(u.role.as_str()).bind(u.status.as_str()).bind(&u.wishlist).bind(u.created_at).bind(u.updated_at)
            .execute(&self.pool).await?;
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE email = $1").bind(&u.email).fetch_one(&self.pool).await?;
        User::try_from(row)
    }

    async fn user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1").bind(id).fetch_optional(&self.pool).await?;
        row.map(User::try_from).transpose()
    }

    async fn set_user_status(&self, id: Uuid, status: UserStatus) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>("UPDATE users SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *")
            .bind(id).bind(status.as_str()).fetch_optional(&self.pool).await?;
        row.map(User::try_from).transpose()
    }

    async fn update_user(&self, u: &User) -> StoreResult<()> {
        let found = sqlx::query(
            "UPDATE users SET name = $2, email = $3, avatar = $4, phone = $5, wishlist = $6, updated_at = $7 WHERE id = $1")
            .bind(u.id).bind(&u.name).bind(&u.email).bind(u.avatar.as_ref().map(Json)).bind(&u.phone)
            .bind(&u.wishlist).bind(u.updated_at)
            .execute(&self.pool).await
            .map_err(|e| conflict_on_unique(e, || duplicate_email(&u.email)))?
            .rows_affected();
        if found == 0 { return Err(StoreError::NotFound("User")); }
        Ok(())
    }

    async fn list_users(&self, q: &UserQuery) -> StoreResult<Page<User>> {
        const FILTER: &str = "WHERE ($1::text IS NULL OR POSITION(LOWER($1) IN LOWER(name)) > 0 OR POSITION(LOWER($1) IN email) > 0)";
        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM users {FILTER}"))
            .bind(q.search.as_deref()).fetch_one(&self.pool).await?;
        let rows = sqlx::query_as::<_, UserRow>(&format!("SELECT * FROM users {FILTER} ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"))
            .bind(q.search.as_deref()).bind(i64::from(q.page.limit)).bind(to_i64(q.page.offset()))
            .fetch_all(&self.pool).await?;
        Ok(Page { items: collect(rows)?, total: u64::try_from(total).unwrap_or(0) })
    }
}

impl Store for PgStore {
    fn backend(&self) -> &'static str { "postgres" }
}
