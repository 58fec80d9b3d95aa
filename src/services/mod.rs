//! Application services.
//!
//! One service per resource. Each holds the shared store and the outbound
//! messaging handles; handlers never touch the store directly.

use std::sync::Arc;

use crate::auth::SessionKeys;
use crate::config::AppConfig;
use crate::domain::events::DomainEvent;
use crate::messaging::{self, EventPublisher, LogBus, Notifier};
use crate::store::Store;

pub mod accounts;
pub mod address;
pub mod cart;
pub mod catalog;
pub mod coupon;
pub mod offer;
pub mod orders;

pub use accounts::AccountService;
pub use address::AddressService;
pub use cart::CartService;
pub use catalog::CatalogService;
pub use coupon::CouponService;
pub use offer::OfferService;
pub use orders::OrderService;

/// Where events and notifications go once a change is committed.
#[derive(Clone)]
pub struct Outbox {
    pub events: Arc<dyn EventPublisher>,
    pub notifier: Arc<dyn Notifier>,
}

impl Outbox {
    pub fn new(events: Arc<dyn EventPublisher>, notifier: Arc<dyn Notifier>) -> Self { Self { events, notifier } }

    pub fn logging() -> Self { Self::new(Arc::new(LogBus), Arc::new(LogBus)) }

    pub async fn emit(&self, event: DomainEvent) { messaging::emit(self.events.as_ref(), event).await }
}

/// Settings the services read at runtime.
#[derive(Clone, Debug)]
pub struct Settings {
    pub admin_password: String,
    pub storefront_url: String,
}

impl From<&AppConfig> for Settings {
    fn from(cfg: &AppConfig) -> Self {
        Self { admin_password: cfg.admin_password.clone(), storefront_url: cfg.storefront_url.clone() }
    }
}

#[derive(Clone)]
pub struct Services {
    pub catalog: CatalogService,
    pub carts: CartService,
    pub coupons: CouponService,
    pub orders: OrderService,
    pub addresses: AddressService,
    pub offers: OfferService,
    pub accounts: AccountService,
}

impl Services {
    pub fn new(store: Arc<dyn Store>, outbox: Outbox, keys: SessionKeys, settings: Settings) -> Self {
        Self {
            catalog: CatalogService::new(store.clone(), outbox.clone()),
            carts: CartService::new(store.clone(), outbox.clone()),
            coupons: CouponService::new(store.clone()),
            orders: OrderService::new(store.clone(), outbox, settings.storefront_url.clone()),
            addresses: AddressService::new(store.clone()),
            offers: OfferService::new(store.clone()),
            accounts: AccountService::new(store, keys, settings.admin_password),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::messaging::tests::Recorder;
    use crate::store::MemoryStore;
    use std::time::Duration;

    pub(crate) const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    pub(crate) struct Harness {
        pub services: Services,
        pub store: MemoryStore,
        pub recorder: Arc<Recorder>,
    }

    pub(crate) fn harness_with(recorder: Recorder) -> Harness {
        let store = MemoryStore::new();
        let recorder = Arc::new(recorder);
        let outbox = Outbox::new(recorder.clone(), recorder.clone());
        let keys = SessionKeys::new(SECRET, Duration::from_secs(600), Duration::from_secs(600));
        let settings = Settings {
            admin_password: "letmein".into(),
            storefront_url: "https://shop.test".into(),
        };
        let services = Services::new(Arc::new(store.clone()), outbox, keys, settings);
        Harness { services, store, recorder }
    }

    pub(crate) fn harness() -> Harness { harness_with(Recorder::default()) }
}
