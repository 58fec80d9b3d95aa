use axum::{extract::State, routing::{get, post}, Router};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::api::{ApiResponse, ApiResult, AppState, PageParams, PathId, QueryParams, ValidJson};
use crate::auth::{AdminSession, UserSession};
use crate::domain::aggregates::{Order, OrderStatus, PaymentMethod};
use crate::domain::value_objects::{Page, PageRequest};
use crate::error::Result;
use crate::store::OrderQuery;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/order", post(place_order).get(list_orders))
        .route("/order/user-order", get(user_orders))
        .route("/order/:id", get(get_order).put(cancel_order))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    pub cart_id: Uuid,
    pub address_id: Uuid,
    #[validate(length(min = 1))]
    pub payment_method: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFilters {
    pub status: Option<String>,
    pub payment_status: Option<String>,
    pub payment_method: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl OrderFilters {
    fn into_query(self) -> Result<OrderQuery> {
        let nonblank = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        Ok(OrderQuery {
            user_id: None,
            status: nonblank(self.status).map(|s| s.parse()).transpose()?,
            payment_status: nonblank(self.payment_status).map(|s| s.parse()).transpose()?,
            payment_method: nonblank(self.payment_method).map(|s| s.parse::<PaymentMethod>()).transpose()?,
            from: self.start_date.map(start_of_day),
            until: self.end_date.map(end_of_day),
            search: nonblank(self.search),
            page: PageRequest::new(self.page, self.limit, 10),
        })
    }
}

fn start_of_day(day: NaiveDate) -> DateTime<Utc> { day.and_time(NaiveTime::MIN).and_utc() }

fn end_of_day(day: NaiveDate) -> DateTime<Utc> {
    day.and_hms_milli_opt(23, 59, 59, 999).map_or_else(|| start_of_day(day), |t| t.and_utc())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPage<T> {
    pub orders: Vec<T>,
    pub total_orders: u64,
    pub current_page: u32,
    pub total_pages: u64,
    pub next_page: Option<u32>,
    pub prev_page: Option<u32>,
}

impl<T> OrderPage<T> {
    fn new(page: Page<T>, req: PageRequest) -> Self {
        let total_pages = req.total_pages(page.total);
        Self {
            total_orders: page.total,
            current_page: req.page,
            total_pages,
            next_page: (u64::from(req.page) < total_pages).then(|| req.page + 1),
            prev_page: (req.page > 1).then(|| req.page - 1),
            orders: page.items,
        }
    }
}

/// What the customer's order history shows per order.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub id: Uuid,
    pub order_status: OrderStatus,
    pub final_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub items: Vec<SummaryLine>,
}

#[derive(Debug, Serialize)]
pub struct SummaryLine {
    pub name: String,
    pub quantity: u32,
    pub image: Option<String>,
}

impl From<Order> for OrderSummary {
    fn from(o: Order) -> Self {
        Self {
            id: o.id(),
            order_status: o.status(),
            final_amount: o.totals().final_amount,
            created_at: o.created_at(),
            items: o
                .products()
                .iter()
                .map(|l| SummaryLine { name: l.name.clone(), quantity: l.quantity, image: l.images.first().cloned() })
                .collect(),
        }
    }
}

async fn place_order(UserSession(user): UserSession, State(s): State<AppState>, ValidJson(r): ValidJson<PlaceOrderRequest>) -> ApiResult<Order> {
    let method: PaymentMethod = r.payment_method.trim().parse()?;
    let order = s.services.orders.place(user.id, r.cart_id, r.address_id, method).await?;
    Ok(ApiResponse::created("Order placed successfully", order))
}

async fn user_orders(UserSession(user): UserSession, State(s): State<AppState>, QueryParams(p): QueryParams<PageParams>) -> ApiResult<OrderPage<OrderSummary>> {
    let req = p.request();
    let page = s.services.orders.orders_for_user(user.id, req).await?;
    let page = Page { items: page.items.into_iter().map(OrderSummary::from).collect(), total: page.total };
    Ok(ApiResponse::ok("Orders fetched successfully", OrderPage::new(page, req)))
}

async fn get_order(UserSession(user): UserSession, State(s): State<AppState>, PathId(id): PathId) -> ApiResult<Order> {
    Ok(ApiResponse::ok("Order fetched successfully", s.services.orders.order_for(user.id, id).await?))
}

async fn cancel_order(UserSession(user): UserSession, State(s): State<AppState>, PathId(id): PathId) -> ApiResult<Order> {
    Ok(ApiResponse::ok("Order cancelled successfully", s.services.orders.cancel(user.id, id).await?))
}

async fn list_orders(_: AdminSession, State(s): State<AppState>, QueryParams(f): QueryParams<OrderFilters>) -> ApiResult<OrderPage<Order>> {
    let query = f.into_query()?;
    let page = s.services.orders.list(&query).await?;
    Ok(ApiResponse::ok("Orders fetched successfully", OrderPage::new(page, query.page)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_bounds_cover_whole_days() {
        let f = OrderFilters {
            start_date: NaiveDate::from_ymd_opt(2025, 3, 1),
            end_date: NaiveDate::from_ymd_opt(2025, 3, 1),
            status: Some("Shipped".into()),
            ..Default::default()
        };
        let q = f.into_query().unwrap();
        assert_eq!(q.from.unwrap().to_rfc3339(), "2025-03-01T00:00:00+00:00");
        assert_eq!(q.until.unwrap().to_rfc3339(), "2025-03-01T23:59:59.999+00:00");
        assert_eq!(q.status, Some(OrderStatus::Shipped));
    }

    #[test]
    fn bad_status_is_rejected() {
        let f = OrderFilters { status: Some("Lost".into()), ..Default::default() };
        assert_eq!(f.into_query().unwrap_err().response_message(), "Invalid order status: Lost");
    }

    #[test]
    fn page_links() {
        let page = OrderPage::new(Page { items: vec![1, 2], total: 25 }, PageRequest::new(Some(2), Some(10), 10));
        assert_eq!((page.prev_page, page.next_page, page.total_pages), (Some(1), Some(3), 3));
    }
}
