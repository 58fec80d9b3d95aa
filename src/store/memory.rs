//! In-process store used when no database is configured, and by tests.
//!
//! All tables sit behind one `RwLock`, so every trait method (including the
//! multi-record ones) runs under a single write guard and is atomic.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::*;
use crate::domain::aggregates::ProductError;

#[derive(Default)]
struct Tables {
    categories: HashMap<Uuid, Category>,
    products: HashMap<Uuid, Product>,
    defects: Vec<DefectiveProduct>,
    coupons: HashMap<Uuid, Coupon>,
    /// Keyed by user id: one cart per user.
    carts: HashMap<Uuid, Cart>,
    orders: HashMap<Uuid, Order>,
    addresses: HashMap<Uuid, Address>,
    offers: HashMap<Uuid, Offer>,
    users: HashMap<Uuid, User>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

fn paginate<T>(mut items: Vec<T>, page: PageRequest) -> Page<T> {
    let total = items.len() as u64;
    let start = usize::try_from(page.offset()).unwrap_or(usize::MAX).min(items.len());
    let end = start.saturating_add(page.limit as usize).min(items.len());
    let items = items.drain(start..end).collect();
    Page { items, total }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn insert_category(&self, category: &Category) -> StoreResult<()> {
        let mut guard = self.tables.write().await;
        let key = category.name_key();
        if guard.categories.values().any(|c| c.name_key() == key) {
            return Err(duplicate_category(&category.name));
        }
        guard.categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn category(&self, id: Uuid) -> StoreResult<Option<Category>> {
        Ok(self.tables.read().await.categories.get(&id).cloned())
    }

    async fn list_categories(&self) -> StoreResult<Vec<CategorySummary>> {
        let guard = self.tables.read().await;
        let mut out: Vec<CategorySummary> = guard.categories.values().map(|c| CategorySummary {
            id: c.id, name: c.name.clone(), is_deleted: c.is_deleted,
            total_products: guard.products.values().filter(|p| p.category_id == c.id).count() as u64,
        }).collect();
        out.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(out)
    }

    async fn set_category_deleted(&self, id: Uuid, deleted: bool) -> StoreResult<u64> {
        let mut guard = self.tables.write().await;
        let t = &mut *guard;
        let category = t.categories.get_mut(&id).ok_or(StoreError::NotFound("Category"))?;
        category.is_deleted = deleted;
        category.updated_at = Utc::now();
        let mut touched = 0;
        for product in t.products.values_mut().filter(|p| p.category_id == id) {
            product.set_deleted(deleted);
            touched += 1;
        }
        Ok(touched)
    }

    async fn insert_product(&self, product: &Product) -> StoreResult<()> {
        self.tables.write().await.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn product(&self, id: Uuid) -> StoreResult<Option<Product>> {
        Ok(self.tables.read().await.products.get(&id).cloned())
    }

    async fn products_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Product>> {
        let guard = self.tables.read().await;
        Ok(ids.iter().filter_map(|id| guard.products.get(id).cloned()).collect())
    }

    async fn list_products(&self, query: &ProductQuery) -> StoreResult<Page<ProductListing>> {
        let guard = self.tables.read().await;
        let mut matched: Vec<&Product> = guard.products.values().filter(|p| query.matches(p)).collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let listings = matched.into_iter().map(|p| ProductListing {
            product: p.clone(),
            category_name: guard.categories.get(&p.category_id).map(|c| c.name.clone()),
        }).collect();
        Ok(paginate(listings, query.page))
    }

    async fn update_product(&self, product: &Product) -> StoreResult<()> {
        let mut guard = self.tables.write().await;
        let slot = guard.products.get_mut(&product.id).ok_or(StoreError::NotFound("Product"))?;
        // Stock is owned by the atomic stock paths; keep the stored counters.
        let (stock, total, defected) = (slot.stock, slot.total_quantity, slot.defected);
        *slot = product.clone();
        slot.stock = stock;
        slot.total_quantity = total;
        slot.defected = defected;
        Ok(())
    }

    async fn adjust_stock(&self, id: Uuid, action: StockAction, quantity: u32, reason: Option<&str>) -> StoreResult<Product> {
        let mut guard = self.tables.write().await;
        let t = &mut *guard;
        let product = t.products.get_mut(&id).ok_or(StoreError::NotFound("Product"))?;
        product.adjust_stock(action, quantity).map_err(|e| match e {
            ProductError::InsufficientStock { name, .. } => StoreError::InsufficientStock(vec![name]),
            other => StoreError::Conflict(other.to_string()),
        })?;
        if action == StockAction::Defective {
            t.defects.push(DefectiveProduct {
                id: Uuid::now_v7(), product_id: id, quantity,
                reason: reason.unwrap_or_default().to_string(), created_at: Utc::now(),
            });
        }
        Ok(product.clone())
    }

    async fn defective_records(&self, product_id: Uuid) -> StoreResult<Vec<DefectiveProduct>> {
        let guard = self.tables.read().await;
        Ok(guard.defects.iter().filter(|d| d.product_id == product_id).cloned().collect())
    }
}

#[async_trait]
impl CouponStore for MemoryStore {
    async fn insert_coupon(&self, coupon: &Coupon) -> StoreResult<()> {
        let mut guard = self.tables.write().await;
        if guard.coupons.values().any(|c| c.code == coupon.code) {
            return Err(duplicate_code(&coupon.code));
        }
        guard.coupons.insert(coupon.id, coupon.clone());
        Ok(())
    }

    async fn coupon(&self, id: Uuid) -> StoreResult<Option<Coupon>> {
        Ok(self.tables.read().await.coupons.get(&id).cloned())
    }

    async fn coupon_by_code(&self, code: &CouponCode) -> StoreResult<Option<Coupon>> {
        Ok(self.tables.read().await.coupons.values().find(|c| &c.code == code).cloned())
    }

    async fn coupons_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Coupon>> {
        let guard = self.tables.read().await;
        Ok(ids.iter().filter_map(|id| guard.coupons.get(id).cloned()).collect())
    }

    async fn list_coupons(&self) -> StoreResult<Vec<Coupon>> {
        let mut all: Vec<Coupon> = self.tables.read().await.coupons.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn update_coupon(&self, coupon: &Coupon) -> StoreResult<()> {
        let mut guard = self.tables.write().await;
        if guard.coupons.values().any(|c| c.code == coupon.code && c.id != coupon.id) {
            return Err(duplicate_code(&coupon.code));
        }
        let slot = guard.coupons.get_mut(&coupon.id).ok_or(StoreError::NotFound("Coupon"))?;
        *slot = coupon.clone();
        Ok(())
    }

    async fn delete_coupon(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.tables.write().await.coupons.remove(&id).is_some())
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn cart_for_user(&self, user_id: Uuid) -> StoreResult<Option<Cart>> {
        Ok(self.tables.read().await.carts.get(&user_id).cloned())
    }

    async fn save_cart(&self, cart: &Cart) -> StoreResult<()> {
        self.tables.write().await.carts.insert(cart.user_id(), cart.clone());
        Ok(())
    }

    async fn delete_cart_for_user(&self, user_id: Uuid) -> StoreResult<bool> {
        Ok(self.tables.write().await.carts.remove(&user_id).is_some())
    }

    async fn purge_carts_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut guard = self.tables.write().await;
        let before = guard.carts.len();
        guard.carts.retain(|_, c| c.updated_at() >= cutoff);
        Ok((before - guard.carts.len()) as u64)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn place_order(&self, checkout: &Checkout) -> StoreResult<()> {
        let mut guard = self.tables.write().await;
        let t = &mut *guard;
        let order = &checkout.order;

        let mut wanted: BTreeMap<Uuid, u32> = BTreeMap::new();
        for line in order.products() {
            *wanted.entry(line.product_id).or_default() += line.quantity;
        }
        let short: Vec<String> = order.products().iter()
            .filter(|line| t.products.get(&line.product_id).map_or(true, |p| p.stock < wanted[&line.product_id]))
            .map(|line| line.name.clone())
            .collect();
        if !short.is_empty() { return Err(StoreError::InsufficientStock(short)); }

        if let Some(coupon_id) = checkout.coupon_id {
            let coupon = t.coupons.get(&coupon_id).ok_or(StoreError::NotFound("Coupon"))?;
            if coupon.is_exhausted() { return Err(StoreError::CouponExhausted(coupon.code.to_string())); }
        }

        // Every check passed; nothing below can fail.
        for (id, qty) in wanted {
            if let Some(p) = t.products.get_mut(&id) {
                p.stock -= qty;
                p.updated_at = Utc::now();
            }
        }
        if let Some(coupon) = checkout.coupon_id.and_then(|id| t.coupons.get_mut(&id)) {
            coupon.used_count += 1;
        }
        t.orders.insert(order.id(), order.clone());
        t.carts.retain(|_, c| c.id() != checkout.cart_id);
        Ok(())
    }

    async fn order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.tables.read().await.orders.get(&id).cloned())
    }

    async fn list_orders(&self, query: &OrderQuery) -> StoreResult<Page<Order>> {
        let guard = self.tables.read().await;
        let mut matched: Vec<Order> = guard.orders.values().filter(|o| query.matches(o)).cloned().collect();
        matched.sort_by(|a, b| b.created_at().cmp(&a.created_at()).then(b.id().cmp(&a.id())));
        Ok(paginate(matched, query.page))
    }

    async fn orders_for_users(&self, user_ids: &[Uuid]) -> StoreResult<Vec<Order>> {
        let guard = self.tables.read().await;
        let mut matched: Vec<Order> = guard.orders.values().filter(|o| user_ids.contains(&o.user_id())).cloned().collect();
        matched.sort_by(|a, b| b.created_at().cmp(&a.created_at()).then(b.id().cmp(&a.id())));
        Ok(matched)
    }

    async fn change_status(&self, change: &StatusChange) -> StoreResult<()> {
        let mut guard = self.tables.write().await;
        let t = &mut *guard;
        let id = change.order.id();
        let current = t.orders.get(&id).map(|o| o.status()).ok_or(StoreError::NotFound("Order"))?;
        if current != change.expected { return Err(StoreError::StaleStatus { expected: change.expected }); }
        if change.restock {
            for (product_id, qty) in change.order.restock_lines() {
                if let Some(p) = t.products.get_mut(&product_id) { p.restock(qty); }
            }
        }
        t.orders.insert(id, change.order.clone());
        Ok(())
    }
}

#[async_trait]
impl AddressStore for MemoryStore {
    async fn save_address(&self, address: &Address) -> StoreResult<()> {
        let mut guard = self.tables.write().await;
        if address.is_default {
            for other in guard.addresses.values_mut().filter(|a| a.user_id == address.user_id) {
                other.is_default = false;
            }
        }
        guard.addresses.insert(address.id, address.clone());
        Ok(())
    }

    async fn address(&self, id: Uuid) -> StoreResult<Option<Address>> {
        Ok(self.tables.read().await.addresses.get(&id).cloned())
    }

    async fn addresses_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Address>> {
        let guard = self.tables.read().await;
        let mut mine: Vec<Address> = guard.addresses.values().filter(|a| a.user_id == user_id).cloned().collect();
        mine.sort_by(|a, b| b.is_default.cmp(&a.is_default).then(b.created_at.cmp(&a.created_at)));
        Ok(mine)
    }

    async fn delete_address(&self, user_id: Uuid, id: Uuid) -> StoreResult<bool> {
        let mut guard = self.tables.write().await;
        let owned = guard.addresses.get(&id).is_some_and(|a| a.user_id == user_id);
        if owned { guard.addresses.remove(&id); }
        Ok(owned)
    }
}

#[async_trait]
impl OfferStore for MemoryStore {
    async fn insert_offer(&self, offer: &Offer, coupons: &[Coupon]) -> StoreResult<()> {
        let mut guard = self.tables.write().await;
        for (i, coupon) in coupons.iter().enumerate() {
            let clash = guard.coupons.values().any(|c| c.code == coupon.code)
                || coupons[..i].iter().any(|c| c.code == coupon.code);
            if clash { return Err(duplicate_code(&coupon.code)); }
        }
        for coupon in coupons {
            guard.coupons.insert(coupon.id, coupon.clone());
        }
        guard.offers.insert(offer.id, offer.clone());
        Ok(())
    }

    async fn offer(&self, id: Uuid) -> StoreResult<Option<Offer>> {
        Ok(self.tables.read().await.offers.get(&id).cloned())
    }

    async fn list_offers(&self) -> StoreResult<Vec<Offer>> {
        let mut all: Vec<Offer> = self.tables.read().await.offers.values().cloned().collect();
        all.sort_by(|a, b| a.end_date.cmp(&b.end_date));
        Ok(all)
    }

    async fn update_offer(&self, offer: &Offer) -> StoreResult<()> {
        let mut guard = self.tables.write().await;
        let slot = guard.offers.get_mut(&offer.id).ok_or(StoreError::NotFound("Offer"))?;
        *slot = offer.clone();
        Ok(())
    }

    async fn delete_offer(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.tables.write().await.offers.remove(&id).is_some())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn upsert_by_email(&self, user: &User) -> StoreResult<User> {
        let mut guard = self.tables.write().await;
        if let Some(existing) = guard.users.values().find(|u| u.email == user.email) {
            return Ok(existing.clone());
        }
        guard.users.insert(user.id, user.clone());
        Ok(user.clone())
    }

    async fn user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn set_user_status(&self, id: Uuid, status: UserStatus) -> StoreResult<Option<User>> {
        let mut guard = self.tables.write().await;
        Ok(guard.users.get_mut(&id).map(|u| {
            u.status = status;
            u.updated_at = Utc::now();
            u.clone()
        }))
    }

    async fn update_user(&self, user: &User) -> StoreResult<()> {
        let mut guard = self.tables.write().await;
        if guard.users.values().any(|u| u.email == user.email && u.id != user.id) {
            return Err(duplicate_email(&user.email));
        }
        let slot = guard.users.get_mut(&user.id).ok_or(StoreError::NotFound("User"))?;
        // Role and status have their own write paths.
        let (role, status) = (slot.role, slot.status);
        *slot = user.clone();
        slot.role = role;
        slot.status = status;
        Ok(())
    }

    async fn list_users(&self, query: &UserQuery) -> StoreResult<Page<User>> {
        let guard = self.tables.read().await;
        let mut matched: Vec<User> = guard.users.values().filter(|u| query.matches(u)).cloned().collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(paginate(matched, query.page))
    }
}

impl Store for MemoryStore {
    fn backend(&self) -> &'static str { "memory" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::address::tests::address;
    use crate::domain::aggregates::coupon::tests::coupon;
    use crate::domain::aggregates::product::tests::product;
    use crate::domain::aggregates::PaymentMethod;
    use rust_decimal_macros::dec;

    async fn seeded(stock: u32) -> (MemoryStore, Product, Cart) {
        let store = MemoryStore::new();
        let p = product("Lamp", Uuid::now_v7(), dec!(500), stock);
        store.insert_product(&p).await.unwrap();
        let mut cart = Cart::new(Uuid::now_v7());
        cart.add_item(&p, 2).unwrap();
        store.save_cart(&cart).await.unwrap();
        (store, p, cart)
    }

    fn checkout(cart: &Cart, p: &Product, coupon_id: Option<Uuid>) -> Checkout {
        let order = Order::from_cart(cart, std::slice::from_ref(p), &address(cart.user_id()), PaymentMethod::Cod).unwrap();
        Checkout { order, cart_id: cart.id(), coupon_id }
    }

    #[tokio::test]
    async fn place_order_commits_everything() {
        let (store, p, cart) = seeded(5).await;
        store.place_order(&checkout(&cart, &p, None)).await.unwrap();
        assert_eq!(store.product(p.id).await.unwrap().unwrap().stock, 3);
        assert!(store.cart_for_user(cart.user_id()).await.unwrap().is_none());
        let page = store.list_orders(&OrderQuery { user_id: Some(cart.user_id()), ..Default::default() }).await.unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn shortfall_changes_nothing() {
        let (store, p, cart) = seeded(5).await;
        store.adjust_stock(p.id, StockAction::Remove, 4, None).await.unwrap();
        let err = store.place_order(&checkout(&cart, &p, None)).await.unwrap_err();
        assert_eq!(err.to_string(), "Insufficient stock for: Lamp");
        assert_eq!(store.product(p.id).await.unwrap().unwrap().stock, 1);
        assert!(store.cart_for_user(cart.user_id()).await.unwrap().is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn racing_checkouts_share_the_last_units() {
        let (store, p, first) = seeded(3).await;
        let mut second = Cart::new(Uuid::now_v7());
        second.add_item(&p, 2).unwrap();
        store.save_cart(&second).await.unwrap();

        let (req_a, req_b) = (checkout(&first, &p, None), checkout(&second, &p, None));
        let (a, b) = tokio::join!(store.place_order(&req_a), store.place_order(&req_b));
        assert!(a.is_ok() != b.is_ok());
        let err = a.err().or(b.err()).unwrap();
        assert!(matches!(err, StoreError::InsufficientStock(_)));
        assert_eq!(store.product(p.id).await.unwrap().unwrap().stock, 1);
        assert_eq!(store.list_orders(&OrderQuery::default()).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn exhausted_coupon_blocks_checkout() {
        let (store, p, cart) = seeded(5).await;
        let mut c = coupon("ONCE", dec!(10), vec![]);
        c.max_limit = 1;
        c.used_count = 1;
        store.insert_coupon(&c).await.unwrap();
        let err = store.place_order(&checkout(&cart, &p, Some(c.id))).await.unwrap_err();
        assert!(matches!(err, StoreError::CouponExhausted(_)));
        assert_eq!(store.product(p.id).await.unwrap().unwrap().stock, 5);
    }

    #[tokio::test]
    async fn status_change_is_guarded_and_restocks() {
        let (store, p, cart) = seeded(5).await;
        let co = checkout(&cart, &p, None);
        store.place_order(&co).await.unwrap();
        let mut order = co.order.clone();
        order.cancel_by_customer().unwrap();
        let change = StatusChange { order, expected: OrderStatus::Pending, restock: true };
        store.change_status(&change).await.unwrap();
        assert_eq!(store.product(p.id).await.unwrap().unwrap().stock, 5);
        let again = store.change_status(&change).await.unwrap_err();
        assert!(matches!(again, StoreError::StaleStatus { .. }));
        assert_eq!(store.product(p.id).await.unwrap().unwrap().stock, 5);
    }

    #[tokio::test]
    async fn category_cascade() {
        let store = MemoryStore::new();
        let cat = Category::create("Kitchen", None, None).unwrap();
        store.insert_category(&cat).await.unwrap();
        let dup = Category::create("KITCHEN", None, None).unwrap();
        assert!(matches!(store.insert_category(&dup).await, Err(StoreError::Conflict(_))));
        let p = product("Pan", cat.id, dec!(10), 3);
        store.insert_product(&p).await.unwrap();
        assert_eq!(store.set_category_deleted(cat.id, true).await.unwrap(), 1);
        assert!(store.product(p.id).await.unwrap().unwrap().is_deleted);
        store.set_category_deleted(cat.id, false).await.unwrap();
        assert!(!store.product(p.id).await.unwrap().unwrap().is_deleted);
    }

    #[tokio::test]
    async fn user_updates_keep_emails_unique() {
        let store = MemoryStore::new();
        let asha = store.upsert_by_email(&User::register("Asha", "asha@example.com", None).unwrap()).await.unwrap();
        let ravi = store.upsert_by_email(&User::register("Ravi", "ravi@example.com", None).unwrap()).await.unwrap();

        let mut taken = ravi.clone();
        taken.email = asha.email.clone();
        assert!(matches!(store.update_user(&taken).await, Err(StoreError::Conflict(_))));

        let mut renamed = ravi.clone();
        renamed.name = "Ravi K".into();
        renamed.status = UserStatus::Suspended;
        store.update_user(&renamed).await.unwrap();
        let stored = store.user(ravi.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Ravi K");
        assert_eq!(stored.status, UserStatus::Active);

        let page = store.list_users(&UserQuery { search: Some("ravi".into()), ..Default::default() }).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(store.list_users(&UserQuery::default()).await.unwrap().total, 2);
    }

    #[tokio::test]
    async fn single_default_address() {
        let store = MemoryStore::new();
        let user = Uuid::now_v7();
        let mut first = address(user);
        first.is_default = true;
        store.save_address(&first).await.unwrap();
        let mut second = address(user);
        second.is_default = true;
        store.save_address(&second).await.unwrap();
        let mine = store.addresses_for_user(user).await.unwrap();
        assert_eq!(mine.iter().filter(|a| a.is_default).count(), 1);
        assert_eq!(mine[0].id, second.id);
    }
}
