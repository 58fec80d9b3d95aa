//! Users and the admin session.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::auth::SessionKeys;
use crate::domain::aggregates::{Order, OrderStatus, Product, ProfilePatch, User, UserStatus};
use crate::domain::value_objects::{ImageRef, Page, PageRequest};
use crate::error::{Result, StorefrontError};
use crate::store::{Store, UserQuery};

/// A user record together with a freshly minted session token.
#[derive(Debug)]
pub struct SignedIn {
    pub user: User,
    pub token: String,
}

/// The session user plus the number of units sitting in their cart.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(flatten)]
    pub user: User,
    pub total_cart_quantity: u32,
}

/// Result of flipping a product in or out of the wishlist.
#[derive(Debug)]
pub struct WishlistToggle {
    pub added: bool,
    pub wishlist: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBrief {
    pub order_id: Uuid,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

/// A user as the admin sees them: account fields and order history.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerRecord {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub total_orders: u64,
    pub total_spent: Decimal,
    pub order_history: Vec<OrderBrief>,
}

impl CustomerRecord {
    fn new(user: User, orders: &[Order]) -> Self {
        let order_history: Vec<OrderBrief> = orders.iter().map(|o| OrderBrief {
            order_id: o.id(), total_amount: o.totals().total_amount, status: o.status(), created_at: o.created_at(),
        }).collect();
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            status: user.status,
            created_at: user.created_at,
            total_orders: order_history.len() as u64,
            total_spent: order_history.iter().map(|o| o.total_amount).sum(),
            order_history,
        }
    }
}

#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn Store>,
    keys: SessionKeys,
    admin_password: String,
}

impl AccountService {
    pub fn new(store: Arc<dyn Store>, keys: SessionKeys, admin_password: String) -> Self {
        Self { store, keys, admin_password }
    }

    /// Checks the shared admin password (`ADMIN_PASSWORD`) and returns an admin token.
    pub fn admin_login(&self, pass: &str) -> Result<String> {
        if pass.is_empty() || !constant_time_eq(pass.as_bytes(), self.admin_password.as_bytes()) {
            warn!("admin login rejected");
            return Err(StorefrontError::BadRequest("Invalid Credentials".into()));
        }
        info!("admin signed in");
        self.keys.issue_admin()
    }

    pub async fn user(&self, id: Uuid) -> Result<User> {
        self.store.user(id).await?.ok_or_else(|| StorefrontError::not_found("User"))
    }

    /// Creates the user on first sign-in (or loads the existing record by
    /// email) and mints a customer token. Called once the identity provider
    /// has vouched for the email.
    #[instrument(skip(self, name, avatar))]
    pub async fn register(&self, name: &str, email: &str, avatar: Option<ImageRef>) -> Result<SignedIn> {
        let user = self.store.upsert_by_email(&User::register(name, email, avatar)?).await?;
        let token = self.keys.issue_user(user.id)?;
        Ok(SignedIn { user, token })
    }

    #[instrument(skip(self))]
    pub async fn set_user_status(&self, id: Uuid, status: UserStatus) -> Result<User> {
        let user = self.store.set_user_status(id, status).await?.ok_or_else(|| StorefrontError::not_found("User"))?;
        info!(status = status.as_str(), "user status changed");
        Ok(user)
    }

    pub async fn profile(&self, user_id: Uuid) -> Result<Profile> {
        let user = self.user(user_id).await?;
        let total_cart_quantity = self.store.cart_for_user(user_id).await?
            .map_or(0, |cart| cart.items().iter().map(|line| line.quantity).sum());
        Ok(Profile { user, total_cart_quantity })
    }

    #[instrument(skip(self, patch))]
    pub async fn update_profile(&self, user_id: Uuid, patch: ProfilePatch) -> Result<User> {
        let mut user = self.user(user_id).await?;
        user.update_profile(patch)?;
        self.store.update_user(&user).await?;
        Ok(user)
    }

    /// Adding requires a live product; removing works even after the product is gone.
    #[instrument(skip(self))]
    pub async fn toggle_wishlist(&self, user_id: Uuid, product_id: Uuid) -> Result<WishlistToggle> {
        let mut user = self.user(user_id).await?;
        if !user.wishlist.contains(&product_id) {
            let live = self.store.product(product_id).await?.is_some_and(|p| !p.is_deleted);
            if !live { return Err(StorefrontError::not_found("Product")); }
        }
        let added = user.toggle_wishlist(product_id);
        self.store.update_user(&user).await?;
        Ok(WishlistToggle { added, wishlist: user.wishlist })
    }

    /// One page of wishlist products, most recently saved first. The total
    /// counts saved ids, including products removed since.
    pub async fn wishlist(&self, user_id: Uuid, page: PageRequest) -> Result<Page<Product>> {
        let user = self.user(user_id).await?;
        if user.wishlist.is_empty() {
            return Err(StorefrontError::NotFound("No products found in wishlist".into()));
        }
        let ids: Vec<Uuid> = user.wishlist.iter().rev()
            .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
            .take(page.limit as usize)
            .copied()
            .collect();
        let mut items = self.store.products_by_ids(&ids).await?;
        items.sort_by_key(|p| ids.iter().position(|id| *id == p.id));
        Ok(Page { items, total: user.wishlist.len() as u64 })
    }

    pub async fn customer(&self, id: Uuid) -> Result<CustomerRecord> {
        let user = self.user(id).await?;
        let orders = self.store.orders_for_users(&[id]).await?;
        Ok(CustomerRecord::new(user, &orders))
    }

    pub async fn customers(&self, query: &UserQuery) -> Result<Page<CustomerRecord>> {
        let users = self.store.list_users(query).await?;
        let ids: Vec<Uuid> = users.items.iter().map(|u| u.id).collect();
        let mut by_user: HashMap<Uuid, Vec<Order>> = HashMap::new();
        for order in self.store.orders_for_users(&ids).await? {
            by_user.entry(order.user_id()).or_default().push(order);
        }
        let items = users.items.into_iter()
            .map(|u| {
                let orders = by_user.remove(&u.id).unwrap_or_default();
                CustomerRecord::new(u, &orders)
            })
            .collect();
        Ok(Page { items, total: users.total })
    }
}

/// Compares without short-circuiting on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() { return false; }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::address::tests::draft as address_draft;
    use crate::domain::aggregates::product::tests::product;
    use crate::domain::aggregates::{Address, PaymentMethod, Role};
    use crate::services::tests::harness;
    use crate::store::{AddressStore, CatalogStore};
    use rust_decimal_macros::dec;

    #[test]
    fn admin_login_checks_the_password() {
        let h = harness();
        let token = h.services.accounts.admin_login("letmein").unwrap();
        assert!(!token.is_empty());
        let err = h.services.accounts.admin_login("guess").unwrap_err();
        assert_eq!(err.response_message(), "Invalid Credentials");
        assert!(h.services.accounts.admin_login("").is_err());
        assert!(h.services.accounts.admin_login("letmei").is_err());
        assert!(h.services.accounts.admin_login("letmeiN").is_err());
    }

    #[test]
    fn password_comparison() {
        assert!(constant_time_eq(b"letmein", b"letmein"));
        assert!(!constant_time_eq(b"letmein", b"letmeiN"));
        assert!(!constant_time_eq(b"letmein", b"letme"));
    }

    #[tokio::test]
    async fn register_is_idempotent_per_email() {
        let h = harness();
        let first = h.services.accounts.register("Asha", "Asha@Example.com ", None).await.unwrap();
        let again = h.services.accounts.register("Asha R", "asha@example.com", None).await.unwrap();
        assert_eq!(first.user.id, again.user.id);
        assert_eq!(again.user.role, Role::User);
        assert_eq!(h.services.accounts.user(first.user.id).await.unwrap().email, "asha@example.com");
    }

    #[tokio::test]
    async fn status_changes_are_stored() {
        let h = harness();
        let signed = h.services.accounts.register("Ravi", "ravi@example.com", None).await.unwrap();
        let user = h.services.accounts.set_user_status(signed.user.id, UserStatus::Suspended).await.unwrap();
        assert!(!user.is_active());
        assert!(h.services.accounts.set_user_status(Uuid::now_v7(), UserStatus::Active).await.is_err());
    }

    #[tokio::test]
    async fn profile_counts_cart_units_and_edits_keep_emails_unique() {
        let h = harness();
        let asha = h.services.accounts.register("Asha", "asha@example.com", None).await.unwrap().user;
        h.services.accounts.register("Ravi", "ravi@example.com", None).await.unwrap();
        assert_eq!(h.services.accounts.profile(asha.id).await.unwrap().total_cart_quantity, 0);

        let lamp = product("Lamp", Uuid::now_v7(), dec!(500), 5);
        let mug = product("Mug", Uuid::now_v7(), dec!(200), 5);
        h.store.insert_product(&lamp).await.unwrap();
        h.store.insert_product(&mug).await.unwrap();
        h.services.carts.add_item(asha.id, lamp.id, 2).await.unwrap();
        h.services.carts.add_item(asha.id, mug.id, 1).await.unwrap();
        assert_eq!(h.services.accounts.profile(asha.id).await.unwrap().total_cart_quantity, 3);

        let patch = ProfilePatch { phone: Some("9800000000".into()), ..Default::default() };
        assert_eq!(h.services.accounts.update_profile(asha.id, patch).await.unwrap().phone, "9800000000");
        let taken = ProfilePatch { email: Some("Ravi@example.com".into()), ..Default::default() };
        let err = h.services.accounts.update_profile(asha.id, taken).await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::CONFLICT);
        assert_eq!(h.services.accounts.user(asha.id).await.unwrap().email, "asha@example.com");
    }

    #[tokio::test]
    async fn wishlist_toggles_and_pages() {
        let h = harness();
        let user = h.services.accounts.register("Asha", "asha@example.com", None).await.unwrap().user;
        let err = h.services.accounts.wishlist(user.id, PageRequest::default()).await.unwrap_err();
        assert_eq!(err.response_message(), "No products found in wishlist");
        assert!(h.services.accounts.toggle_wishlist(user.id, Uuid::now_v7()).await.is_err());

        let lamp = product("Lamp", Uuid::now_v7(), dec!(500), 5);
        let mug = product("Mug", Uuid::now_v7(), dec!(200), 5);
        h.store.insert_product(&lamp).await.unwrap();
        h.store.insert_product(&mug).await.unwrap();
        assert!(h.services.accounts.toggle_wishlist(user.id, lamp.id).await.unwrap().added);
        let toggled = h.services.accounts.toggle_wishlist(user.id, mug.id).await.unwrap();
        assert_eq!(toggled.wishlist, vec![lamp.id, mug.id]);

        let page = h.services.accounts.wishlist(user.id, PageRequest::new(Some(1), Some(1), 10)).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items[0].id, mug.id);

        let removed = h.services.accounts.toggle_wishlist(user.id, lamp.id).await.unwrap();
        assert!(!removed.added);
        assert_eq!(removed.wishlist, vec![mug.id]);
    }

    #[tokio::test]
    async fn customer_records_carry_order_history() {
        let h = harness();
        let asha = h.services.accounts.register("Asha", "asha@example.com", None).await.unwrap().user;
        let ravi = h.services.accounts.register("Ravi", "ravi@example.com", None).await.unwrap().user;
        let address = Address::create(asha.id, address_draft()).unwrap();
        h.store.save_address(&address).await.unwrap();
        let lamp = product("Lamp", Uuid::now_v7(), dec!(500), 5);
        h.store.insert_product(&lamp).await.unwrap();
        let cart = h.services.carts.add_item(asha.id, lamp.id, 2).await.unwrap();
        let order = h.services.orders.place(asha.id, cart.id(), address.id, PaymentMethod::Cod).await.unwrap();

        let record = h.services.accounts.customer(asha.id).await.unwrap();
        assert_eq!(record.total_orders, 1);
        assert_eq!(record.total_spent, dec!(1000));
        assert_eq!(record.order_history[0].order_id, order.id());
        assert_eq!(record.order_history[0].status, OrderStatus::Pending);
        assert!(h.services.accounts.customer(Uuid::now_v7()).await.is_err());

        let page = h.services.accounts.customers(&UserQuery::default()).await.unwrap();
        assert_eq!(page.total, 2);
        let quiet = page.items.iter().find(|c| c.id == ravi.id).unwrap();
        assert_eq!((quiet.total_orders, quiet.total_spent), (0, Decimal::ZERO));
        let found = h.services.accounts.customers(&UserQuery { search: Some("ASHA".into()), ..Default::default() }).await.unwrap();
        assert_eq!(found.items.len(), 1);
    }
}
