//! In-memory store implementations for testing and development.
//!
//! Each store keeps its rows behind a `RwLock` and assigns sequential IDs
//! starting at 1, mirroring the identity columns of the `PostgreSQL` schema.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;

use koi_farm_core::{Email, FishId, OrderId, PaymentStatus, UserId, Username};

use super::{FishStore, OrderStore, RepositoryError, UserStore};
use crate::models::{Fish, NewFish, NewOrder, NewUser, Order, User};

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, RepositoryError> {
    lock.read()
        .map_err(|e| RepositoryError::DataCorruption(format!("failed to acquire read lock: {e}")))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, RepositoryError> {
    lock.write()
        .map_err(|e| RepositoryError::DataCorruption(format!("failed to acquire write lock: {e}")))
}

struct Table<K, V> {
    rows: BTreeMap<K, V>,
    next_id: i32,
}

impl<K, V> Default for Table<K, V> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl<K, V> Table<K, V> {
    const fn allocate(&mut self) -> i32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

/// In-memory [`OrderStore`].
#[derive(Default)]
pub struct MemoryOrderStore {
    orders: RwLock<Table<OrderId, Order>>,
}

fn newest_first(mut orders: Vec<Order>) -> Vec<Order> {
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    orders
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn get_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(read(&self.orders)?.rows.get(&id).cloned())
    }

    async fn list_by_customer(&self, customer_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let table = read(&self.orders)?;
        Ok(newest_first(
            table
                .rows
                .values()
                .filter(|o| o.customer_id == customer_id)
                .cloned()
                .collect(),
        ))
    }

    async fn list_all(&self) -> Result<Vec<Order>, RepositoryError> {
        let table = read(&self.orders)?;
        Ok(newest_first(table.rows.values().cloned().collect()))
    }

    async fn create(&self, order: NewOrder) -> Result<Order, RepositoryError> {
        let mut table = write(&self.orders)?;
        let now = Utc::now();
        let mut lines = order.lines;
        lines.sort_by_key(|l| l.fish_id);

        let created = Order {
            id: OrderId::new(table.allocate()),
            customer_id: order.customer_id,
            lines,
            status: PaymentStatus::Pending,
            version: 1,
            created_at: now,
            updated_at: now,
            paid_at: None,
        };
        table.rows.insert(created.id, created.clone());
        Ok(created)
    }

    async fn save(&self, order: &Order) -> Result<Order, RepositoryError> {
        let mut table = write(&self.orders)?;
        let stored = table
            .rows
            .get_mut(&order.id)
            .ok_or(RepositoryError::NotFound)?;

        if stored.version != order.version {
            return Err(RepositoryError::Conflict(format!(
                "order {} is at version {}, not {}",
                order.id, stored.version, order.version
            )));
        }

        let mut saved = order.clone();
        saved.lines.sort_by_key(|l| l.fish_id);
        saved.version += 1;
        saved.updated_at = Utc::now();
        saved.created_at = stored.created_at;
        saved.customer_id = stored.customer_id;
        *stored = saved.clone();
        Ok(saved)
    }
}

/// In-memory [`FishStore`].
#[derive(Default)]
pub struct MemoryFishStore {
    fish: RwLock<Table<FishId, Fish>>,
}

#[async_trait]
impl FishStore for MemoryFishStore {
    async fn get_by_id(&self, id: FishId) -> Result<Option<Fish>, RepositoryError> {
        Ok(read(&self.fish)?.rows.get(&id).cloned())
    }

    async fn list(&self, search: Option<&str>) -> Result<Vec<Fish>, RepositoryError> {
        let needle = search.map(str::trim).filter(|s| !s.is_empty());
        let table = read(&self.fish)?;
        let mut found: Vec<Fish> = table
            .rows
            .values()
            .filter(|f| needle.is_none_or(|n| f.name_matches(n)))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn upsert(&self, fish: NewFish) -> Result<Fish, RepositoryError> {
        let mut table = write(&self.fish)?;

        if let Some(existing) = table.rows.values_mut().find(|f| f.name == fish.name) {
            existing.breed = fish.breed;
            existing.price = fish.price;
            existing.image_url = fish.image_url;
            existing.description = fish.description;
            existing.available = fish.available;
            return Ok(existing.clone());
        }

        let created = Fish {
            id: FishId::new(table.allocate()),
            name: fish.name,
            breed: fish.breed,
            price: fish.price,
            image_url: fish.image_url,
            description: fish.description,
            available: fish.available,
            created_at: Utc::now(),
        };
        table.rows.insert(created.id, created.clone());
        Ok(created)
    }
}

struct StoredUser {
    user: User,
    password_hash: Option<String>,
}

/// In-memory [`UserStore`].
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<Table<UserId, StoredUser>>,
}

impl MemoryUserStore {
    fn find(
        &self,
        pred: impl Fn(&User) -> bool,
    ) -> Result<Option<User>, RepositoryError> {
        let table = read(&self.users)?;
        Ok(table
            .rows
            .values()
            .map(|s| &s.user)
            .find(|u| pred(u))
            .cloned())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, user: NewUser) -> Result<User, RepositoryError> {
        let mut table = write(&self.users)?;

        let taken = table.rows.values().any(|s| {
            s.user.username == user.username
                || (user.email.is_some() && s.user.email == user.email)
                || (user.google_subject.is_some() && s.user.google_subject == user.google_subject)
        });
        if taken {
            return Err(RepositoryError::Conflict("user already exists".to_owned()));
        }

        let now = Utc::now();
        let created = User {
            id: UserId::new(table.allocate()),
            username: user.username,
            email: user.email,
            full_name: user.full_name,
            role: user.role,
            google_subject: user.google_subject,
            created_at: now,
            updated_at: now,
        };
        table.rows.insert(
            created.id,
            StoredUser {
                user: created.clone(),
                password_hash: user.password_hash,
            },
        );
        Ok(created)
    }

    async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(read(&self.users)?.rows.get(&id).map(|s| s.user.clone()))
    }

    async fn get_by_username(&self, username: &Username) -> Result<Option<User>, RepositoryError> {
        self.find(|u| &u.username == username)
    }

    async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        self.find(|u| u.email.as_ref() == Some(email))
    }

    async fn get_by_google_subject(&self, subject: &str) -> Result<Option<User>, RepositoryError> {
        self.find(|u| u.google_subject.as_deref() == Some(subject))
    }

    async fn get_password_hash(
        &self,
        username: &Username,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        let table = read(&self.users)?;
        Ok(table
            .rows
            .values()
            .find(|s| &s.user.username == username)
            .and_then(|s| {
                s.password_hash
                    .as_ref()
                    .map(|h| (s.user.clone(), h.clone()))
            }))
    }

    async fn link_google_subject(
        &self,
        id: UserId,
        subject: &str,
    ) -> Result<User, RepositoryError> {
        let mut table = write(&self.users)?;

        if table
            .rows
            .values()
            .any(|s| s.user.id != id && s.user.google_subject.as_deref() == Some(subject))
        {
            return Err(RepositoryError::Conflict(
                "google account link already exists".to_owned(),
            ));
        }

        let stored = table.rows.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if let Some(linked) = stored.user.google_subject.as_deref()
            && linked != subject
        {
            return Err(RepositoryError::Conflict(format!(
                "user {id} is linked to a different google account"
            )));
        }
        stored.user.google_subject = Some(subject.to_owned());
        stored.user.updated_at = Utc::now();
        Ok(stored.user.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use koi_farm_core::{Price, Role};

    use super::*;
    use crate::models::OrderLine;

    fn new_user(name: &str) -> NewUser {
        NewUser {
            username: Username::parse(name).unwrap(),
            email: None,
            full_name: name.to_owned(),
            role: Role::Customer,
            password_hash: Some("hash".to_owned()),
            google_subject: None,
        }
    }

    #[tokio::test]
    async fn test_save_rejects_stale_version() {
        let store = MemoryOrderStore::default();
        let order = store.create(NewOrder::new(UserId::new(1))).await.unwrap();
        assert_eq!(order.version, 1);

        let mut first = order.clone();
        first.lines.push(OrderLine {
            fish_id: FishId::new(2),
            quantity: 1,
            unit_price: Price::new(Decimal::new(500, 0)).unwrap(),
        });
        let saved = store.save(&first).await.unwrap();
        assert_eq!(saved.version, 2);

        let stale = order;
        assert!(matches!(
            store.save(&stale).await,
            Err(RepositoryError::Conflict(_))
        ));

        let current = store.get_by_id(saved.id).await.unwrap().unwrap();
        assert_eq!(current.lines.len(), 1);
    }

    #[tokio::test]
    async fn test_save_missing_order_is_not_found() {
        let store = MemoryOrderStore::default();
        let mut ghost = store.create(NewOrder::new(UserId::new(1))).await.unwrap();
        ghost.id = OrderId::new(42);
        assert!(matches!(
            store.save(&ghost).await,
            Err(RepositoryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_user_uniqueness() {
        let store = MemoryUserStore::default();
        store.create(new_user("alice")).await.unwrap();
        assert!(matches!(
            store.create(new_user("alice")).await,
            Err(RepositoryError::Conflict(_))
        ));

        let (user, hash) = store
            .get_password_hash(&Username::parse("alice").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.id, UserId::new(1));
        assert_eq!(hash, "hash");
    }

    #[tokio::test]
    async fn test_google_link_keeps_existing_subject() {
        let store = MemoryUserStore::default();
        let alice = store.create(new_user("alice")).await.unwrap();

        let linked = store.link_google_subject(alice.id, "sub-1").await.unwrap();
        assert_eq!(linked.google_subject.as_deref(), Some("sub-1"));
        assert!(store.link_google_subject(alice.id, "sub-1").await.is_ok());

        assert!(matches!(
            store.link_google_subject(alice.id, "sub-2").await,
            Err(RepositoryError::Conflict(_))
        ));
        let kept = store.get_by_id(alice.id).await.unwrap().unwrap();
        assert_eq!(kept.google_subject.as_deref(), Some("sub-1"));
        assert!(store.get_by_google_subject("sub-2").await.unwrap().is_none());

        assert!(matches!(
            store.link_google_subject(UserId::new(99), "sub-3").await,
            Err(RepositoryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_fish_search_is_case_insensitive() {
        let store = MemoryFishStore::default();
        for name in ["Kohaku Prize", "Showa", "Tancho Kohaku"] {
            store
                .upsert(NewFish {
                    name: name.to_owned(),
                    breed: "koi".to_owned(),
                    price: Price::ZERO,
                    image_url: None,
                    description: None,
                    available: true,
                })
                .await
                .unwrap();
        }

        let found = store.list(Some("kohaku")).await.unwrap();
        let names: Vec<_> = found.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["Kohaku Prize", "Tancho Kohaku"]);
        assert_eq!(store.list(Some("  ")).await.unwrap().len(), 3);
    }
}
