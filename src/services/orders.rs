//! Checkout, customer cancellation and admin status changes.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::aggregates::{CartError, Order, OrderStatus, PaymentMethod, User};
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::{Page, PageRequest};
use crate::error::{Result, StorefrontError};
use crate::messaging::{templates, Email};
use crate::services::Outbox;
use crate::store::{Checkout, OrderQuery, StatusChange, Store};

/// An admin status change and whether its email went out.
#[derive(Debug)]
pub struct StatusUpdate {
    pub order: Order,
    pub notified: bool,
}

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn Store>,
    outbox: Outbox,
    storefront_url: String,
}

fn cart_missing() -> StorefrontError { StorefrontError::BadRequest("Cart is empty or not found".into()) }

impl OrderService {
    pub fn new(store: Arc<dyn Store>, outbox: Outbox, storefront_url: String) -> Self { Self { store, outbox, storefront_url } }

    /// Converts the user's cart into an order.
    ///
    /// Stock decrements, the coupon usage bump, the order insert and the cart
    /// delete commit together; a shortfall on any line aborts all of it.
    #[instrument(skip(self, payment_method))]
    pub async fn place(&self, user_id: Uuid, cart_id: Uuid, address_id: Uuid, payment_method: PaymentMethod) -> Result<Order> {
        payment_method.ensure_accepted()?;
        let cart = self
            .store
            .cart_for_user(user_id)
            .await?
            .filter(|c| c.id() == cart_id && !c.is_empty())
            .ok_or_else(cart_missing)?;
        let address = self
            .store
            .address(address_id)
            .await?
            .filter(|a| a.user_id == user_id)
            .ok_or_else(|| StorefrontError::not_found("Address"))?;

        let products = self.store.products_by_ids(&cart.product_ids()).await?;
        if let Some(gone) = products.iter().find(|p| !p.is_available()) {
            return Err(CartError::ProductUnavailable(gone.name.clone()).into());
        }
        let order = Order::from_cart(&cart, &products, &address, payment_method)?;
        let checkout = Checkout { order, cart_id: cart.id(), coupon_id: cart.applied_coupon().map(|c| c.id) };
        self.store.place_order(&checkout).await?;
        let order = checkout.order;

        info!(order_id = %order.id(), final_amount = %order.totals().final_amount, "order placed");
        self.outbox
            .emit(DomainEvent::Order(OrderEvent::Placed {
                order_id: order.id(),
                user_id,
                final_amount: order.totals().final_amount,
                coupon_code: order.coupon().map(|c| c.code.to_string()),
                at: order.created_at(),
            }))
            .await;
        self.notify(&order, templates::order_placed).await;
        Ok(order)
    }

    pub async fn orders_for_user(&self, user_id: Uuid, page: PageRequest) -> Result<Page<Order>> {
        Ok(self.store.list_orders(&OrderQuery { user_id: Some(user_id), page, ..Default::default() }).await?)
    }

    /// A single order, visible to its owner only.
    pub async fn order_for(&self, user_id: Uuid, order_id: Uuid) -> Result<Order> {
        let order = self.store.order(order_id).await?.ok_or_else(|| StorefrontError::not_found("Order"))?;
        if !order.is_owned_by(user_id) {
            return Err(StorefrontError::Forbidden("Unauthorized: You do not have access to this order".into()));
        }
        Ok(order)
    }

    /// Customer cancellation of a pending order; stock goes back in the same write.
    #[instrument(skip(self))]
    pub async fn cancel(&self, user_id: Uuid, order_id: Uuid) -> Result<Order> {
        let mut order = self
            .store
            .order(order_id)
            .await?
            .filter(|o| o.is_owned_by(user_id))
            .ok_or_else(|| StorefrontError::not_found("Order"))?;
        let expected = order.status();
        order.cancel_by_customer()?;
        let change = StatusChange { order, expected, restock: true };
        self.store.change_status(&change).await?;
        let order = change.order;

        info!(order_id = %order.id(), "order cancelled by customer");
        self.outbox
            .emit(DomainEvent::Order(OrderEvent::Cancelled { order_id: order.id(), user_id, at: order.updated_at() }))
            .await;
        Ok(order)
    }

    pub async fn list(&self, query: &OrderQuery) -> Result<Page<Order>> { Ok(self.store.list_orders(query).await?) }

    /// Admin transition. Cancelling restocks; the customer is emailed, and a
    /// failed email leaves the status change in place.
    #[instrument(skip(self))]
    pub async fn change_status(&self, order_id: Uuid, next: OrderStatus) -> Result<StatusUpdate> {
        let mut order = self.store.order(order_id).await?.ok_or_else(|| StorefrontError::not_found("Order"))?;
        let from = order.transition_to(next)?;
        let change = StatusChange { order, expected: from, restock: next == OrderStatus::Cancelled };
        self.store.change_status(&change).await?;
        let order = change.order;

        info!(order_id = %order.id(), %from, to = %next, "order status changed");
        self.outbox
            .emit(DomainEvent::Order(OrderEvent::StatusChanged { order_id: order.id(), from, to: next, at: Utc::now() }))
            .await;
        let notified = self.notify(&order, templates::status_update).await;
        Ok(StatusUpdate { order, notified })
    }

    /// Emails the order's owner. Never fails the caller.
    async fn notify(&self, order: &Order, render: fn(&Order, &User, &str) -> Email) -> bool {
        let customer = match self.store.user(order.user_id()).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                warn!(order_id = %order.id(), "order owner not found; email not sent");
                return false;
            }
            Err(err) => {
                warn!(order_id = %order.id(), error = %err, "could not load order owner; email not sent");
                return false;
            }
        };
        let email = render(order, &customer, &self.storefront_url);
        match self.outbox.notifier.send(&email).await {
            Ok(()) => true,
            Err(err) => {
                warn!(order_id = %order.id(), error = %err, "order email not sent");
                false
            }
        }
    }
}
